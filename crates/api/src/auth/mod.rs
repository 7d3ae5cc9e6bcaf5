//! Authentication module for Stepping Stones

pub mod jwt;
pub mod middleware;
#[cfg(test)]
mod middleware_tests;
pub mod one_time_code;
pub mod password;
pub mod refresh;
pub mod session;

pub use jwt::{Claims, ClientKind, TokenError, TokenIssuer, TokenType};
pub use middleware::{
    optional_auth, require_admin, require_auth, require_role, AuthMethod, AuthState, AuthUser,
    REFRESH_COOKIE, SESSION_COOKIE,
};
pub use password::{hash_password, verify_password};
pub use session::{issue_session, IssuedSession, SessionManager};
