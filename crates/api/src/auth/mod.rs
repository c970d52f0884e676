//! Authentication module for EventHub

#[cfg(test)]
mod edge_case_tests;
pub mod jwt;
pub mod middleware;
#[cfg(test)]
mod middleware_tests;
pub mod otp;
pub mod password;
pub mod principal;
pub mod tokens;
pub mod transport;

pub use jwt::{JwtError, JwtManager, TokenType};
pub use middleware::{require_organizer, require_role, require_session, require_user};
pub use otp::{
    OtpEngine, OtpError, OtpPurpose, OtpVerification, ThrottleDecision, ThrottleWindow,
    EMAIL_OTP_MAX_AGE_MINUTES, PASSWORD_RESET_OTP_MAX_AGE_MINUTES,
};
pub use password::{CredentialHasher, HashError, PasswordHashParams};
pub use principal::Principal;
pub use tokens::{TokenError, TokenPair, TokenService};
pub use transport::{CookieTransport, HeaderTransport, SameSite, SessionTokens, SessionTransport};
