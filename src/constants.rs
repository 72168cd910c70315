//! Shared constants: secure store keys and network defaults.

/// Secure store key for the raw access token string.
pub const ACCESS_TOKEN_KEY: &str = "gf_access_token";
/// Secure store key for the raw refresh token string.
pub const REFRESH_TOKEN_KEY: &str = "gf_refresh_token";
/// Secure store key for the current user's id.
pub const USER_ID_KEY: &str = "gf_user_id";
/// Secure store key for the current user's email.
pub const USER_EMAIL_KEY: &str = "gf_user_email";
/// Secure store key for the JSON-serialized user profile.
pub const USER_DATA_KEY: &str = "gf_user_data";
/// Secure store key for the JSON-serialized cached goal list.
pub const CACHED_GOALS_KEY: &str = "gf_cached_goals";
/// Secure store key for the JSON-serialized pending-change queue.
pub const PENDING_CHANGES_KEY: &str = "gf_pending_changes";
/// Secure store key for the biometric-login opt-in flag.
pub const BIOMETRIC_ENABLED_KEY: &str = "gf_biometric_enabled";

/// Default base URL for the GreatFeel API.
pub const DEFAULT_API_URL: &str = "https://api.greatfeel.com/api";

/// Base URL used by local development builds.
pub const DEV_API_URL: &str = "http://localhost:3000/api";

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Refresh the access token this many seconds before it expires.
pub const REFRESH_LEEWAY_SECS: i64 = 300;

/// Minimum accepted password length for registration.
pub const MIN_PASSWORD_LEN: usize = 8;
