//! One-time codes for email verification and password reset
//!
//! Codes are six random digits. Only their Argon2 hash is stored. Email
//! verification codes are throttled with a count-and-recency rule table;
//! password reset codes are not throttled but can be used once.

use rand::Rng;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use eventhub_shared::{EmailOtp, ErrorCode, OtpStore, PasswordResetOtp, Store, StoreError};

use super::password::{CredentialHasher, HashError};
use crate::clock::Clock;

pub const EMAIL_OTP_MAX_AGE_MINUTES: i64 = 15;
pub const PASSWORD_RESET_OTP_MAX_AGE_MINUTES: i64 = 15;

/// How far back the throttle looks, and how many records it inspects
const THROTTLE_LOOKBACK: Duration = Duration::hours(24);
const THROTTLE_MAX_RECORDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    EmailVerification,
    PasswordReset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleWindow {
    FiveMinutes,
    SixtyMinutes,
    TwentyFourHours,
}

impl ThrottleWindow {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ThrottleWindow::FiveMinutes => ErrorCode::LimitExceedTryIn5Min,
            ThrottleWindow::SixtyMinutes => ErrorCode::LimitExceedTryIn60Min,
            ThrottleWindow::TwentyFourHours => ErrorCode::LimitExceedTryIn24Hr,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ThrottleWindow::FiveMinutes => "limit exceed, wait 5 minutes before sending another OTP",
            ThrottleWindow::SixtyMinutes => {
                "limit exceed, wait 60 minutes before sending another OTP"
            }
            ThrottleWindow::TwentyFourHours => "limit exceed, please try again in 24hr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Allow,
    Throttled {
        window: ThrottleWindow,
        retry_after: OffsetDateTime,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ThrottleRule {
    /// Matches when at least this many records fall inside the lookback
    pub min_records: usize,
    /// ...and the newest of them is at most this many whole minutes old
    pub window_minutes: i64,
    pub window: ThrottleWindow,
}

/// Evaluated top to bottom; the first matching rule governs
pub const THROTTLE_RULES: [ThrottleRule; 3] = [
    ThrottleRule {
        min_records: 3,
        window_minutes: 24 * 60,
        window: ThrottleWindow::TwentyFourHours,
    },
    ThrottleRule {
        min_records: 2,
        window_minutes: 60,
        window: ThrottleWindow::SixtyMinutes,
    },
    ThrottleRule {
        min_records: 1,
        window_minutes: 5,
        window: ThrottleWindow::FiveMinutes,
    },
];

/// Apply `THROTTLE_RULES` to the newest-first records of one email
pub fn evaluate_throttle(records: &[EmailOtp], now: OffsetDateTime) -> ThrottleDecision {
    let Some(newest) = records.first() else {
        return ThrottleDecision::Allow;
    };
    let elapsed = (now - newest.created_on).whole_minutes();

    THROTTLE_RULES
        .iter()
        .find(|rule| records.len() >= rule.min_records && elapsed <= rule.window_minutes)
        .map_or(ThrottleDecision::Allow, |rule| ThrottleDecision::Throttled {
            window: rule.window,
            retry_after: newest.created_on + Duration::minutes(rule.window_minutes),
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpVerification {
    Matched { record_id: Uuid },
    NotFound,
    AlreadyUsed,
    Expired,
    Mismatched,
}

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Hash(#[from] HashError),
}

#[derive(Clone)]
pub struct OtpEngine {
    store: Arc<dyn Store>,
    hasher: CredentialHasher,
    clock: Arc<dyn Clock>,
}

impl OtpEngine {
    pub fn new(store: Arc<dyn Store>, hasher: CredentialHasher, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            hasher,
            clock,
        }
    }

    /// Six uniformly random decimal digits
    pub fn generate() -> String {
        let code: u32 = rand::rng().random_range(0..1_000_000);
        format!("{code:06}")
    }

    /// Persist a hashed code and return the plaintext for delivery
    pub async fn issue(&self, email: &str, purpose: OtpPurpose) -> Result<String, OtpError> {
        let code = Self::generate();
        let hash = self.hasher.hash_async(&code).await?;
        let now = self.clock.now();

        match purpose {
            OtpPurpose::EmailVerification => {
                self.store
                    .insert_email_otp(EmailOtp::new(email, hash, now))
                    .await?
            }
            OtpPurpose::PasswordReset => {
                self.store
                    .insert_password_reset_otp(PasswordResetOtp::new(email, hash, now))
                    .await?
            }
        }

        tracing::debug!(?purpose, "Issued one-time code");
        Ok(code)
    }

    /// Applies to email verification codes only
    pub async fn check_throttle(&self, email: &str) -> Result<ThrottleDecision, StoreError> {
        let now = self.clock.now();
        let records = self
            .store
            .recent_email_otps(email, now - THROTTLE_LOOKBACK, THROTTLE_MAX_RECORDS)
            .await?;
        Ok(evaluate_throttle(&records, now))
    }

    /// Check the newest code for `email`. Never consumes a password reset code.
    pub async fn verify(
        &self,
        email: &str,
        code: &str,
        max_age_minutes: i64,
        purpose: OtpPurpose,
    ) -> Result<OtpVerification, StoreError> {
        let (record_id, hash, created_on) = match purpose {
            OtpPurpose::EmailVerification => match self.store.latest_email_otp(email).await? {
                Some(otp) => (otp.id, otp.otp_code_hash, otp.created_on),
                None => return Ok(OtpVerification::NotFound),
            },
            OtpPurpose::PasswordReset => {
                match self.store.latest_password_reset_otp(email).await? {
                    Some(otp) if otp.is_utilized => return Ok(OtpVerification::AlreadyUsed),
                    Some(otp) => (otp.id, otp.otp_code_hash, otp.created_on),
                    None => return Ok(OtpVerification::NotFound),
                }
            }
        };

        let age = (self.clock.now() - created_on).whole_minutes();
        if age > max_age_minutes {
            return Ok(OtpVerification::Expired);
        }

        if !self.hasher.verify_async(code, &hash).await {
            return Ok(OtpVerification::Mismatched);
        }

        Ok(OtpVerification::Matched { record_id })
    }

    /// Spend a reset code and store the new hash in one write.
    /// False means another request already spent the code.
    pub async fn redeem_password_reset(
        &self,
        record_id: Uuid,
        user_id: Uuid,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        self.store
            .redeem_password_reset(record_id, user_id, password_hash)
            .await
    }
}
