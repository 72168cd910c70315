pub mod auth_model;
pub mod session_service;

pub use auth_model::{AuthState, User};
pub use session_service::{DemoAccount, SessionConfig, SessionManager};
