//! In-process store used by tests and local runs without a database

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{EventStore, OtpStore, StoreError, StoreResult, TokenStore, UserStore};
use crate::models::{
    EmailOtp, Event, NewUser, PasswordResetOtp, RefreshTokenRecord, Registration, User,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    email_otps: Vec<EmailOtp>,
    password_reset_otps: Vec<PasswordResetOtp>,
    refresh_tokens: Vec<RefreshTokenRecord>,
    events: Vec<Event>,
    registrations: Vec<Registration>,
}

/// Rows are kept in insertion order, so newest-first queries walk them in
/// reverse and then order by timestamp with a stable sort.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_password_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook for flags that no endpoint sets
    pub async fn set_user_flags(&self, id: Uuid, is_suspended: bool, is_admin: bool) {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == id) {
            user.is_suspended = is_suspended;
            user.is_admin = is_admin;
        }
    }

    /// Test hook for payment state, which no endpoint sets
    pub async fn set_registration_paid(&self, id: Uuid, is_paid: bool) {
        let mut tables = self.tables.write().await;
        if let Some(registration) = tables.registrations.iter_mut().find(|r| r.id == id) {
            registration.is_paid = is_paid;
        }
    }

    /// Test hook: make password hash writes fail as if the database were down
    pub fn fail_password_writes(&self, fail: bool) {
        self.fail_password_writes.store(fail, Ordering::SeqCst);
    }

    /// Test hook for account deletion, which no endpoint performs
    pub async fn remove_user(&self, id: Uuid) {
        self.tables.write().await.users.retain(|u| u.id != id);
    }

    pub async fn refresh_tokens_for(&self, user_id: Uuid) -> Vec<RefreshTokenRecord> {
        let tables = self.tables.read().await;
        tables
            .refresh_tokens
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }
}

fn newest_first<T: Clone>(
    rows: &[T],
    keep: impl Fn(&T) -> bool,
    created: impl Fn(&T) -> OffsetDateTime,
) -> Vec<T> {
    let mut out: Vec<T> = rows.iter().rev().filter(|r| keep(*r)).cloned().collect();
    out.sort_by(|a, b| created(b).cmp(&created(a)));
    out
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict);
        }
        let user = user.into_user();
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn mark_email_verified(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == id) {
            user.is_email_verified = true;
        }
        Ok(())
    }

    async fn add_followed_organizer(&self, user_id: Uuid, organizer_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.iter_mut().find(|u| u.id == user_id) {
            if !user.organizers.contains(&organizer_id) {
                user.organizers.push(organizer_id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn insert_email_otp(&self, otp: EmailOtp) -> StoreResult<()> {
        self.tables.write().await.email_otps.push(otp);
        Ok(())
    }

    async fn recent_email_otps(
        &self,
        email: &str,
        since: OffsetDateTime,
        limit: usize,
    ) -> StoreResult<Vec<EmailOtp>> {
        let tables = self.tables.read().await;
        let mut rows = newest_first(
            &tables.email_otps,
            |o| o.email == email && o.created_on >= since,
            |o| o.created_on,
        );
        rows.truncate(limit);
        Ok(rows)
    }

    async fn latest_email_otp(&self, email: &str) -> StoreResult<Option<EmailOtp>> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.email_otps, |o| o.email == email, |o| o.created_on)
            .into_iter()
            .next())
    }

    async fn insert_password_reset_otp(&self, otp: PasswordResetOtp) -> StoreResult<()> {
        self.tables.write().await.password_reset_otps.push(otp);
        Ok(())
    }

    async fn latest_password_reset_otp(
        &self,
        email: &str,
    ) -> StoreResult<Option<PasswordResetOtp>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            &tables.password_reset_otps,
            |o| o.email == email,
            |o| o.created_on,
        )
        .into_iter()
        .next())
    }

    async fn redeem_password_reset(
        &self,
        reset_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
    ) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(otp_index) = tables
            .password_reset_otps
            .iter()
            .position(|o| o.id == reset_id && !o.is_utilized)
        else {
            return Ok(false);
        };
        let Some(user_index) = tables.users.iter().position(|u| u.id == user_id) else {
            return Err(StoreError::NotFound);
        };
        if self.fail_password_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        tables.password_reset_otps[otp_index].is_utilized = true;
        tables.users[user_index].password_hash = password_hash.to_string();
        Ok(true)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> StoreResult<()> {
        self.tables.write().await.refresh_tokens.push(record);
        Ok(())
    }

    async fn latest_live_refresh_token(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            &tables.refresh_tokens,
            |r| r.user_id == user_id && !r.is_consumed,
            |r| r.created_on,
        )
        .into_iter()
        .next())
    }

    async fn consume_refresh_token(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables
            .refresh_tokens
            .iter_mut()
            .find(|r| r.id == id && !r.is_consumed)
        {
            Some(record) => {
                record.is_consumed = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn consume_all_refresh_tokens(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let mut flipped = 0;
        for record in tables
            .refresh_tokens
            .iter_mut()
            .filter(|r| r.user_id == user_id && !r.is_consumed)
        {
            record.is_consumed = true;
            flipped += 1;
        }
        Ok(flipped)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: Event) -> StoreResult<()> {
        self.tables.write().await.events.push(event);
        Ok(())
    }

    async fn find_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        let tables = self.tables.read().await;
        Ok(tables.events.iter().find(|e| e.id == id).cloned())
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.events, |_| true, |e| e.created_at))
    }

    async fn list_events_by_organizer(&self, organizer_id: Uuid) -> StoreResult<Vec<Event>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            &tables.events,
            |e| e.organizer_id == organizer_id,
            |e| e.created_at,
        ))
    }

    async fn update_event(&self, event: &Event) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.events.iter_mut().find(|e| e.id == event.id) {
            *existing = event.clone();
        }
        Ok(())
    }

    async fn delete_event(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.events.len();
        tables.events.retain(|e| e.id != id);
        let removed = tables.events.len() != before;
        if removed {
            tables.registrations.retain(|r| r.event_id != id);
        }
        Ok(removed)
    }

    async fn insert_registration(&self, registration: Registration) -> StoreResult<()> {
        self.tables.write().await.registrations.push(registration);
        Ok(())
    }

    async fn find_registration(&self, id: Uuid) -> StoreResult<Option<Registration>> {
        let tables = self.tables.read().await;
        Ok(tables.registrations.iter().find(|r| r.id == id).cloned())
    }

    async fn mark_participated(&self, id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(registration) = tables.registrations.iter_mut().find(|r| r.id == id) {
            registration.is_participated = true;
        }
        Ok(())
    }

    async fn delete_registration(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.registrations.len();
        tables.registrations.retain(|r| r.id != id);
        Ok(tables.registrations.len() != before)
    }
}
