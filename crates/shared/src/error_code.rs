//! Stable error codes carried in every API response envelope.
//!
//! Clients branch on these values, never on the human-readable message.

use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Success,
    RequiredParameterMissing,
    UnknownServerError,
    Unauthorized,

    EmailAlreadyVerified,
    EmailNotVerified,
    InvalidEmail,
    InvalidEmailOrPassword,
    EmailNotProvided,

    InvalidPassword,
    InvalidOtp,
    InvalidRole,
    UserAlreadyExist,
    UserNotExist,
    UserSuspended,
    InvalidDate,
    InvalidPhoneNumber,
    DateFieldMissing,
    LimitExceedTryIn24Hr,
    LimitExceedTryIn60Min,
    LimitExceedTryIn5Min,
    EventNotExist,
    InvalidEventId,
    InvalidEventType,
    RegistrationNotExist,
    NotAllowed,
    TooManyRequests,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Success => "SUCCESS",
            ErrorCode::RequiredParameterMissing => "REQUIRED_PARAMETER_MISSING",
            ErrorCode::UnknownServerError => "UNKNOWN_SERVER_ERROR",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::EmailAlreadyVerified => "EMAIL_ALREADY_VERIFIED",
            ErrorCode::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            ErrorCode::InvalidEmail => "INVALID_EMAIL",
            ErrorCode::InvalidEmailOrPassword => "INVALID_EMAIL_OR_PASSWORD",
            ErrorCode::EmailNotProvided => "EMAIL_NOT_PROVIDED",
            ErrorCode::InvalidPassword => "INVALID_PASSWORD",
            ErrorCode::InvalidOtp => "INVALID_OTP",
            ErrorCode::InvalidRole => "INVALID_ROLE",
            ErrorCode::UserAlreadyExist => "USER_ALREADY_EXIST",
            ErrorCode::UserNotExist => "USER_NOT_EXIST",
            ErrorCode::UserSuspended => "USER_SUSPENDED",
            ErrorCode::InvalidDate => "INVALID_DATE",
            ErrorCode::InvalidPhoneNumber => "INVALID_PHONE_NUMBER",
            ErrorCode::DateFieldMissing => "DATE_FIELD_MISSING",
            ErrorCode::LimitExceedTryIn24Hr => "LIMIT_EXCEED_TRY_IN_24HR",
            ErrorCode::LimitExceedTryIn60Min => "LIMIT_EXCEED_TRY_IN_60MIN",
            ErrorCode::LimitExceedTryIn5Min => "LIMIT_EXCEED_TRY_IN_5MIN",
            ErrorCode::EventNotExist => "EVENT_NOT_EXIST",
            ErrorCode::InvalidEventId => "INVALID_EVENT_ID",
            ErrorCode::InvalidEventType => "INVALID_EVENT_TYPE",
            ErrorCode::RegistrationNotExist => "REGISTRATION_NOT_EXIST",
            ErrorCode::NotAllowed => "NOT_ALLOWED",
            ErrorCode::TooManyRequests => "TOO_MANY_REQUESTS",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
