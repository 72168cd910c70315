//! GreatFeel Client Core - session lifecycle and offline goal sync.
//!
//! This crate contains the client-side engine shared by the GreatFeel
//! apps: secure token storage, the authenticated HTTP transport, the
//! session manager (login/refresh/logout with coalesced token refresh),
//! and the offline-aware goal sync engine. It is platform-agnostic and
//! defines traits that are implemented by the embedding application
//! (secure storage, event delivery, HTTP backend).

pub mod auth;
pub mod constants;
pub mod errors;
pub mod events;
pub mod goals;
pub mod secrets;
pub mod tokens;
pub mod transport;

// Re-export the main entry points
pub use auth::{AuthState, SessionConfig, SessionManager, User};
pub use goals::{Goal, GoalDraft, GoalFilter, GoalSummary, GoalSyncEngine, GoalsApi, GoalsApiClient, SyncReport};
pub use tokens::TokenStore;
pub use transport::{ApiClient, ApiConfig};

// Re-export error types
pub use errors::{ApiError, AuthError, Error, Result};
