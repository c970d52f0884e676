//! Entity types and their validating factories.
//!
//! Factories normalize and validate input before anything reaches a store.
//! Ids are UUIDv7 so that id order follows creation order.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error_code::ErrorCode;
use crate::validation::{self, ValidationError};

/// Account role, stored as lowercase text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Organizer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Organizer => "organizer",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "user" => Ok(Role::User),
            "organizer" => Ok(Role::Organizer),
            _ => Err(ValidationError::new(
                ErrorCode::InvalidRole,
                "role must be either user or organizer",
            )),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub is_suspended: bool,
    pub is_admin: bool,
    /// Organizers whose events this user registered for
    pub organizers: Vec<Uuid>,
    pub created_on: OffsetDateTime,
}

/// A validated account ready to be inserted
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub user_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_on: OffsetDateTime,
}

impl NewUser {
    pub fn new(
        user_name: &str,
        email: &str,
        password_hash: String,
        role: Role,
        now: OffsetDateTime,
    ) -> Result<Self, ValidationError> {
        let user_name = user_name.trim();
        if user_name.chars().count() > validation::USER_NAME_MAX_LENGTH {
            return Err(ValidationError::new(
                ErrorCode::RequiredParameterMissing,
                format!(
                    "userName must be at most {} characters",
                    validation::USER_NAME_MAX_LENGTH
                ),
            ));
        }

        if !validation::is_valid_email(email) {
            return Err(ValidationError::new(
                ErrorCode::InvalidEmail,
                "email pattern does not match",
            ));
        }

        Ok(Self {
            id: Uuid::now_v7(),
            user_name: user_name.to_string(),
            email: validation::normalize_email(email),
            password_hash,
            role,
            created_on: now,
        })
    }

    pub fn into_user(self) -> User {
        User {
            id: self.id,
            user_name: self.user_name,
            email: self.email,
            password_hash: self.password_hash,
            role: self.role,
            is_email_verified: false,
            is_suspended: false,
            is_admin: false,
            organizers: Vec::new(),
            created_on: self.created_on,
        }
    }
}

/// Email verification code. Only the hash of the code is kept.
#[derive(Debug, Clone)]
pub struct EmailOtp {
    pub id: Uuid,
    pub email: String,
    pub otp_code_hash: String,
    pub created_on: OffsetDateTime,
}

impl EmailOtp {
    pub fn new(email: &str, otp_code_hash: String, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::now_v7(),
            email: validation::normalize_email(email),
            otp_code_hash,
            created_on: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PasswordResetOtp {
    pub id: Uuid,
    pub email: String,
    pub otp_code_hash: String,
    pub is_utilized: bool,
    pub created_on: OffsetDateTime,
}

impl PasswordResetOtp {
    pub fn new(email: &str, otp_code_hash: String, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::now_v7(),
            email: validation::normalize_email(email),
            otp_code_hash,
            is_utilized: false,
            created_on: now,
        }
    }
}

/// One issued refresh token, kept for rotation and replay detection
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 hex digest of the refresh token
    pub token_hash: String,
    pub is_consumed: bool,
    pub created_on: OffsetDateTime,
}

impl RefreshTokenRecord {
    pub fn new(user_id: Uuid, token_hash: String, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            token_hash,
            is_consumed: false,
            created_on: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Online,
    Onsite,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Online => "online",
            EventType::Onsite => "onsite",
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value {
            "online" => Ok(EventType::Online),
            "onsite" => Ok(EventType::Onsite),
            _ => Err(ValidationError::new(
                ErrorCode::InvalidEventType,
                "invalid event type value",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub start_date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_date: OffsetDateTime,
    pub event_type: EventType,
    pub price: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(rename = "organizer")]
    pub organizer_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fields of a new event as submitted by an organizer
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub start_date: OffsetDateTime,
    pub end_date: OffsetDateTime,
    pub event_type: EventType,
    pub price: String,
    pub location: Option<String>,
}

impl NewEvent {
    /// Validate and build the event owned by `organizer_id`
    pub fn into_event(
        self,
        organizer_id: Uuid,
        now: OffsetDateTime,
    ) -> Result<Event, ValidationError> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return Err(ValidationError::missing("title"));
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::missing("description"));
        }
        if self.price.trim().is_empty() {
            return Err(ValidationError::missing("price"));
        }
        check_date_order(self.start_date, self.end_date)?;
        let location = resolve_location(self.event_type, self.location)?;

        Ok(Event {
            id: Uuid::now_v7(),
            title,
            description: self.description,
            start_date: self.start_date,
            end_date: self.end_date,
            event_type: self.event_type,
            price: self.price,
            location,
            organizer_id,
            created_at: now,
        })
    }
}

/// Partial update of an event; `None` leaves a field untouched
#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub event_type: Option<EventType>,
    pub location: Option<String>,
    pub start_date: Option<OffsetDateTime>,
    pub end_date: Option<OffsetDateTime>,
}

impl Event {
    /// Apply `changes`, re-checking the invariants `NewEvent` enforces
    pub fn apply(&self, changes: EventChanges) -> Result<Event, ValidationError> {
        let mut next = self.clone();

        if let Some(title) = changes.title.filter(|t| !t.trim().is_empty()) {
            next.title = title.trim().to_string();
        }
        if let Some(description) = changes.description.filter(|d| !d.trim().is_empty()) {
            next.description = description;
        }
        if let Some(price) = changes.price.filter(|p| !p.trim().is_empty()) {
            next.price = price;
        }

        match changes.event_type {
            Some(EventType::Online) => {
                next.event_type = EventType::Online;
                next.location = None;
            }
            Some(EventType::Onsite) => {
                next.event_type = EventType::Onsite;
                next.location = resolve_location(EventType::Onsite, changes.location)?;
            }
            None => {
                if next.event_type == EventType::Onsite {
                    if let Some(location) = changes.location.filter(|l| !l.trim().is_empty()) {
                        next.location = Some(location);
                    }
                }
            }
        }

        if let Some(start) = changes.start_date {
            next.start_date = start;
        }
        if let Some(end) = changes.end_date {
            next.end_date = end;
        }
        check_date_order(next.start_date, next.end_date)?;

        Ok(next)
    }
}

fn check_date_order(start: OffsetDateTime, end: OffsetDateTime) -> Result<(), ValidationError> {
    if end <= start {
        return Err(ValidationError::new(
            ErrorCode::InvalidDate,
            "end date must be after start date",
        ));
    }
    Ok(())
}

fn resolve_location(
    event_type: EventType,
    location: Option<String>,
) -> Result<Option<String>, ValidationError> {
    match event_type {
        EventType::Online => Ok(None),
        EventType::Onsite => match location.filter(|l| !l.trim().is_empty()) {
            Some(location) => Ok(Some(location)),
            None => Err(ValidationError::new(
                ErrorCode::RequiredParameterMissing,
                "required field location missing",
            )),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Draft,
    Completed,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Draft => "draft",
            RegistrationStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(RegistrationStatus::Draft),
            "completed" => Some(RegistrationStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: Uuid,
    #[serde(rename = "event")]
    pub event_id: Uuid,
    #[serde(rename = "participant")]
    pub participant_id: Uuid,
    pub status: RegistrationStatus,
    pub is_paid: bool,
    pub is_participated: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Registration {
    pub fn draft(event_id: Uuid, participant_id: Uuid, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_id,
            participant_id,
            status: RegistrationStatus::Draft,
            is_paid: false,
            is_participated: false,
            created_at: now,
        }
    }
}
