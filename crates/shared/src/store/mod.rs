//! Persistence collaborator.
//!
//! Each concern gets its own trait so components can depend on the narrowest
//! surface they need. `Store` bundles them for the application state.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{
    EmailOtp, Event, NewUser, PasswordResetOtp, RefreshTokenRecord, Registration, User,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,

    #[error("record not found")]
    NotFound,

    #[error("stored value could not be decoded: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Emails passed to lookups are expected to be normalized already
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    /// Fails with `StoreError::Conflict` when the email is taken
    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;
    async fn mark_email_verified(&self, id: Uuid) -> StoreResult<()>;
    /// Adds `organizer_id` to the user's followed organizers if not already present
    async fn add_followed_organizer(&self, user_id: Uuid, organizer_id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn insert_email_otp(&self, otp: EmailOtp) -> StoreResult<()>;
    /// Newest first, created at or after `since`, at most `limit` records
    async fn recent_email_otps(
        &self,
        email: &str,
        since: OffsetDateTime,
        limit: usize,
    ) -> StoreResult<Vec<EmailOtp>>;
    async fn latest_email_otp(&self, email: &str) -> StoreResult<Option<EmailOtp>>;

    async fn insert_password_reset_otp(&self, otp: PasswordResetOtp) -> StoreResult<()>;
    async fn latest_password_reset_otp(&self, email: &str)
        -> StoreResult<Option<PasswordResetOtp>>;
    /// Flip `is_utilized` of reset code `reset_id` from false to true and store
    /// `password_hash` for `user_id`, both or neither. Returns false if the code
    /// was already used; a missing user is `StoreError::NotFound`.
    async fn redeem_password_reset(
        &self,
        reset_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
    ) -> StoreResult<bool>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> StoreResult<()>;
    /// Newest record for the user that has not been consumed
    async fn latest_live_refresh_token(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<RefreshTokenRecord>>;
    /// Flip `is_consumed` from false to true. Returns false if it was already set.
    async fn consume_refresh_token(&self, id: Uuid) -> StoreResult<bool>;
    /// Consume every live record of the user, returning how many were flipped
    async fn consume_all_refresh_tokens(&self, user_id: Uuid) -> StoreResult<u64>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(&self, event: Event) -> StoreResult<()>;
    async fn find_event(&self, id: Uuid) -> StoreResult<Option<Event>>;
    async fn list_events(&self) -> StoreResult<Vec<Event>>;
    async fn list_events_by_organizer(&self, organizer_id: Uuid) -> StoreResult<Vec<Event>>;
    async fn update_event(&self, event: &Event) -> StoreResult<()>;
    /// Deletes the event and its registrations
    async fn delete_event(&self, id: Uuid) -> StoreResult<bool>;

    async fn insert_registration(&self, registration: Registration) -> StoreResult<()>;
    async fn find_registration(&self, id: Uuid) -> StoreResult<Option<Registration>>;
    async fn mark_participated(&self, id: Uuid) -> StoreResult<()>;
    async fn delete_registration(&self, id: Uuid) -> StoreResult<bool>;
}

pub trait Store: UserStore + OtpStore + TokenStore + EventStore {}

impl<T> Store for T where T: UserStore + OtpStore + TokenStore + EventStore {}
