mod helpers;
mod middleware;
mod password;
mod token;

pub use helpers::{SessionError, ValidatedSession, extract_bearer_token, validate_session};
pub use middleware::{AuthError, RequireAdmin, RequireAuth, RequireSession};
pub use password::{MIN_PASSWORD_LENGTH, SecretHasher, validate_password_policy};
pub use token::{TokenGenerator, generate_share_token, parse_token};
