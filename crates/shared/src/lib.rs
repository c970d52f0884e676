#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! EventHub shared types
//!
//! Error codes, input validation, entity models and the persistence layer
//! used by the API server.

pub mod db;
pub mod error_code;
pub mod models;
pub mod store;
pub mod validation;

pub use db::{create_pool, run_migrations};
pub use error_code::ErrorCode;
pub use models::{
    EmailOtp, Event, EventChanges, EventType, NewEvent, NewUser, PasswordResetOtp,
    RefreshTokenRecord, Registration, RegistrationStatus, Role, User,
};
pub use store::{
    EventStore, MemoryStore, OtpStore, PgStore, Store, StoreError, StoreResult, TokenStore,
    UserStore,
};
pub use validation::ValidationError;
