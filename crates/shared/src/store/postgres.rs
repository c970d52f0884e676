//! PostgreSQL store backed by a sqlx pool

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{EventStore, OtpStore, StoreError, StoreResult, TokenStore, UserStore};
use crate::models::{
    EmailOtp, Event, EventType, NewUser, PasswordResetOtp, RefreshTokenRecord, Registration,
    RegistrationStatus, Role, User,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const USER_COLUMNS: &str = r#"
    u.id, u.user_name, u.email, u.password_hash, u.role,
    u.is_email_verified, u.is_suspended, u.is_admin, u.created_on,
    ARRAY(
        SELECT f.organizer_id FROM user_organizers f
        WHERE f.user_id = u.id ORDER BY f.followed_on
    ) AS organizers
"#;

const EVENT_COLUMNS: &str = r#"
    id, title, description, start_date, end_date, event_type,
    price, location, organizer_id, created_at
"#;

const REGISTRATION_COLUMNS: &str = r#"
    id, event_id, participant_id, status, is_paid, is_participated, created_at
"#;

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    user_name: String,
    email: String,
    password_hash: String,
    role: String,
    is_email_verified: bool,
    is_suspended: bool,
    is_admin: bool,
    created_on: OffsetDateTime,
    organizers: Vec<Uuid>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role)
            .map_err(|_| StoreError::Corrupt(format!("unknown role '{}'", row.role)))?;
        Ok(User {
            id: row.id,
            user_name: row.user_name,
            email: row.email,
            password_hash: row.password_hash,
            role,
            is_email_verified: row.is_email_verified,
            is_suspended: row.is_suspended,
            is_admin: row.is_admin,
            organizers: row.organizers,
            created_on: row.created_on,
        })
    }
}

#[derive(FromRow)]
struct EmailOtpRow {
    id: Uuid,
    email: String,
    otp_code_hash: String,
    created_on: OffsetDateTime,
}

impl From<EmailOtpRow> for EmailOtp {
    fn from(row: EmailOtpRow) -> Self {
        EmailOtp {
            id: row.id,
            email: row.email,
            otp_code_hash: row.otp_code_hash,
            created_on: row.created_on,
        }
    }
}

#[derive(FromRow)]
struct PasswordResetOtpRow {
    id: Uuid,
    email: String,
    otp_code_hash: String,
    is_utilized: bool,
    created_on: OffsetDateTime,
}

impl From<PasswordResetOtpRow> for PasswordResetOtp {
    fn from(row: PasswordResetOtpRow) -> Self {
        PasswordResetOtp {
            id: row.id,
            email: row.email,
            otp_code_hash: row.otp_code_hash,
            is_utilized: row.is_utilized,
            created_on: row.created_on,
        }
    }
}

#[derive(FromRow)]
struct RefreshTokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    is_consumed: bool,
    created_on: OffsetDateTime,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        RefreshTokenRecord {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            is_consumed: row.is_consumed,
            created_on: row.created_on,
        }
    }
}

#[derive(FromRow)]
struct EventRow {
    id: Uuid,
    title: String,
    description: String,
    start_date: OffsetDateTime,
    end_date: OffsetDateTime,
    event_type: String,
    price: String,
    location: Option<String>,
    organizer_id: Uuid,
    created_at: OffsetDateTime,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let event_type = EventType::parse(&row.event_type)
            .map_err(|_| StoreError::Corrupt(format!("unknown event type '{}'", row.event_type)))?;
        Ok(Event {
            id: row.id,
            title: row.title,
            description: row.description,
            start_date: row.start_date,
            end_date: row.end_date,
            event_type,
            price: row.price,
            location: row.location,
            organizer_id: row.organizer_id,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct RegistrationRow {
    id: Uuid,
    event_id: Uuid,
    participant_id: Uuid,
    status: String,
    is_paid: bool,
    is_participated: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = StoreError;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        let status = RegistrationStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status '{}'", row.status)))?;
        Ok(Registration {
            id: row.id,
            event_id: row.event_id,
            participant_id: row.participant_id,
            status,
            is_paid: row.is_paid,
            is_participated: row.is_participated,
            created_at: row.created_at,
        })
    }
}

fn conflict_or_database(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return StoreError::Conflict;
        }
    }
    StoreError::Database(e)
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from).transpose()
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        sqlx::query(
            r#"
            INSERT INTO users (id, user_name, email, password_hash, role, created_on)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.user_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.created_on)
        .execute(&self.pool)
        .await
        .map_err(conflict_or_database)?;

        Ok(user.into_user())
    }

    async fn mark_email_verified(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE users SET is_email_verified = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add_followed_organizer(&self, user_id: Uuid, organizer_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_organizers (user_id, organizer_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, organizer_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(organizer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OtpStore for PgStore {
    async fn insert_email_otp(&self, otp: EmailOtp) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO email_otps (id, email, otp_code_hash, created_on)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(otp.id)
        .bind(&otp.email)
        .bind(&otp.otp_code_hash)
        .bind(otp.created_on)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_email_otps(
        &self,
        email: &str,
        since: OffsetDateTime,
        limit: usize,
    ) -> StoreResult<Vec<EmailOtp>> {
        let rows: Vec<EmailOtpRow> = sqlx::query_as(
            r#"
            SELECT id, email, otp_code_hash, created_on
            FROM email_otps
            WHERE email = $1 AND created_on >= $2
            ORDER BY created_on DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(email)
        .bind(since)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EmailOtp::from).collect())
    }

    async fn latest_email_otp(&self, email: &str) -> StoreResult<Option<EmailOtp>> {
        let row: Option<EmailOtpRow> = sqlx::query_as(
            r#"
            SELECT id, email, otp_code_hash, created_on
            FROM email_otps
            WHERE email = $1
            ORDER BY created_on DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EmailOtp::from))
    }

    async fn insert_password_reset_otp(&self, otp: PasswordResetOtp) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO password_reset_otps (id, email, otp_code_hash, is_utilized, created_on)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(otp.id)
        .bind(&otp.email)
        .bind(&otp.otp_code_hash)
        .bind(otp.is_utilized)
        .bind(otp.created_on)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_password_reset_otp(
        &self,
        email: &str,
    ) -> StoreResult<Option<PasswordResetOtp>> {
        let row: Option<PasswordResetOtpRow> = sqlx::query_as(
            r#"
            SELECT id, email, otp_code_hash, is_utilized, created_on
            FROM password_reset_otps
            WHERE email = $1
            ORDER BY created_on DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PasswordResetOtp::from))
    }

    async fn redeem_password_reset(
        &self,
        reset_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
    ) -> StoreResult<bool> {
        // Dropping the transaction without commit rolls it back
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(
            "UPDATE password_reset_otps SET is_utilized = TRUE WHERE id = $1 AND is_utilized = FALSE",
        )
        .bind(reset_id)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        let updated = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(StoreError::NotFound);
        }

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert_refresh_token(&self, record: RefreshTokenRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, is_consumed, created_on)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.is_consumed)
        .bind(record.created_on)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_live_refresh_token(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        let row: Option<RefreshTokenRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, token_hash, is_consumed, created_on
            FROM refresh_tokens
            WHERE user_id = $1 AND is_consumed = FALSE
            ORDER BY created_on DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RefreshTokenRecord::from))
    }

    async fn consume_refresh_token(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_consumed = TRUE WHERE id = $1 AND is_consumed = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn consume_all_refresh_tokens(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET is_consumed = TRUE WHERE user_id = $1 AND is_consumed = FALSE",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn insert_event(&self, event: Event) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO events (id, title, description, start_date, end_date, event_type,
                                price, location, organizer_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(event.event_type.as_str())
        .bind(&event.price)
        .bind(&event.location)
        .bind(event.organizer_id)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_event(&self, id: Uuid) -> StoreResult<Option<Event>> {
        let row: Option<EventRow> =
            sqlx::query_as(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Event::try_from).transpose()
    }

    async fn list_events(&self) -> StoreResult<Vec<Event>> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Event::try_from).collect()
    }

    async fn list_events_by_organizer(&self, organizer_id: Uuid) -> StoreResult<Vec<Event>> {
        let rows: Vec<EventRow> = sqlx::query_as(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE organizer_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(organizer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Event::try_from).collect()
    }

    async fn update_event(&self, event: &Event) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE events
            SET title = $2, description = $3, start_date = $4, end_date = $5,
                event_type = $6, price = $7, location = $8
            WHERE id = $1
            "#,
        )
        .bind(event.id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(event.start_date)
        .bind(event.end_date)
        .bind(event.event_type.as_str())
        .bind(&event.price)
        .bind(&event.location)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_event(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_registration(&self, registration: Registration) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO registrations (id, event_id, participant_id, status, is_paid,
                                       is_participated, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(registration.id)
        .bind(registration.event_id)
        .bind(registration.participant_id)
        .bind(registration.status.as_str())
        .bind(registration.is_paid)
        .bind(registration.is_participated)
        .bind(registration.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_registration(&self, id: Uuid) -> StoreResult<Option<Registration>> {
        let row: Option<RegistrationRow> = sqlx::query_as(&format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Registration::try_from).transpose()
    }

    async fn mark_participated(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE registrations SET is_participated = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_registration(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM registrations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
