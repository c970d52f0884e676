//! Account routes: signup, email verification, login and password reset
//!
//! None of these pass through the session gate.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use eventhub_shared::{
    validation::{self, non_blank},
    ErrorCode, NewUser, Role, StoreError, User, UserStore,
};

use crate::{
    auth::{
        OtpPurpose, OtpVerification, Principal, ThrottleDecision, EMAIL_OTP_MAX_AGE_MINUTES,
        PASSWORD_RESET_OTP_MAX_AGE_MINUTES,
    },
    email::{password_reset_email, verification_email},
    error::{ApiError, ApiJson, ApiResponse, ApiResult},
    state::AppState,
};

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRequest {
    pub email: Option<String>,
    pub otp_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResetRequest {
    pub email: Option<String>,
    pub otp_code: Option<String>,
    pub new_password: Option<String>,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn check_email(email: &str) -> ApiResult<()> {
    if validation::is_valid_email(email) {
        Ok(())
    } else {
        Err(ApiError::validation(
            ErrorCode::InvalidEmail,
            "email is not valid",
        ))
    }
}

fn check_password(password: &str) -> ApiResult<()> {
    if validation::is_valid_password(password) {
        Ok(())
    } else {
        Err(ApiError::validation(
            ErrorCode::InvalidPassword,
            "password is not valid, it must be 6-100 characters with upper and lowercase letters and a digit",
        ))
    }
}

fn check_otp(code: &str) -> ApiResult<()> {
    if validation::is_valid_otp(code) {
        Ok(())
    } else {
        Err(ApiError::validation(
            ErrorCode::InvalidOtp,
            "otp is not valid, it must be 6 digits",
        ))
    }
}

fn invalid_otp(message: &str) -> ApiError {
    ApiError::validation(ErrorCode::InvalidOtp, message)
}

/// Reset flows report why the code failed; every reason shares INVALID_OTP
fn reset_otp_failure(outcome: OtpVerification) -> ApiError {
    match outcome {
        OtpVerification::NotFound => invalid_otp("Invalid otp code, not found"),
        OtpVerification::AlreadyUsed => invalid_otp("Invalid otp code, already used"),
        OtpVerification::Expired => invalid_otp(&format!(
            "Invalid otp code, older than {PASSWORD_RESET_OTP_MAX_AGE_MINUTES} minutes"
        )),
        OtpVerification::Mismatched | OtpVerification::Matched { .. } => {
            invalid_otp("Invalid otp code, not matched")
        }
    }
}

async fn find_user(state: &AppState, email: &str) -> ApiResult<User> {
    state
        .store
        .find_user_by_email(&validation::normalize_email(email))
        .await?
        .ok_or_else(|| ApiError::not_found(ErrorCode::UserNotExist, "user not exist"))
}

async fn send_verification_code(state: &AppState, user: &User) -> ApiResult<()> {
    let code = state
        .otp
        .issue(&user.email, OtpPurpose::EmailVerification)
        .await?;
    let mail = verification_email(&state.config.email_app_name, &user.user_name, &code);
    state.mailer.send(&user.email, &mail.subject, &mail.html).await?;
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn signup(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SignupRequest>,
) -> ApiResult<ApiResponse<()>> {
    let (Some(user_name), Some(email), Some(password), Some(role)) = (
        non_blank(&body.user_name),
        non_blank(&body.email),
        body.password.as_deref().filter(|p| !p.is_empty()),
        non_blank(&body.role),
    ) else {
        return Err(ApiError::validation(
            ErrorCode::RequiredParameterMissing,
            "required parameters missing: userName, email, password and role",
        ));
    };

    check_password(password)?;
    check_email(email)?;

    let normalized = validation::normalize_email(email);
    if state.store.find_user_by_email(&normalized).await?.is_some() {
        return Err(ApiError::conflict(
            ErrorCode::UserAlreadyExist,
            "user already exist with this email",
        ));
    }

    let role = Role::parse(role)?;
    let password_hash = state.hasher.hash_async(password).await?;
    let now = state.clock.now();
    let new_user = NewUser::new(user_name, email, password_hash, role, now)?;

    let user = match state.store.insert_user(new_user).await {
        Ok(user) => user,
        // Lost a race with a concurrent signup for the same email
        Err(StoreError::Conflict) => {
            return Err(ApiError::conflict(
                ErrorCode::UserAlreadyExist,
                "user already exist with this email",
            ))
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(user_id = %user.id, role = %user.role, "User signed up");

    send_verification_code(&state, &user).await?;

    Ok(ApiResponse::message("Signup successful, verify otp"))
}

pub async fn send_email_otp(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<EmailRequest>,
) -> ApiResult<ApiResponse<()>> {
    let email = non_blank(&body.email).ok_or_else(|| {
        ApiError::validation(
            ErrorCode::RequiredParameterMissing,
            "provide email in body",
        )
    })?;
    check_email(email)?;

    let user = find_user(&state, email).await?;
    if user.is_email_verified {
        return Err(ApiError::conflict(
            ErrorCode::EmailAlreadyVerified,
            "email is already verified, please login",
        ));
    }

    if let ThrottleDecision::Throttled {
        window,
        retry_after,
    } = state.otp.check_throttle(&user.email).await?
    {
        let wait = (retry_after - state.clock.now()).whole_seconds().max(0);
        tracing::warn!(user_id = %user.id, window = ?window, "Email otp throttled");
        return Err(ApiError::RateLimited {
            code: window.error_code(),
            message: window.message().to_string(),
            retry_after_secs: wait.unsigned_abs(),
        });
    }

    send_verification_code(&state, &user).await?;

    Ok(ApiResponse::message("email otp sent successfully"))
}

pub async fn verify_email_otp(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<OtpRequest>,
) -> ApiResult<ApiResponse<()>> {
    let (Some(email), Some(code)) = (non_blank(&body.email), non_blank(&body.otp_code)) else {
        return Err(ApiError::validation(
            ErrorCode::RequiredParameterMissing,
            "provide email and otpCode in body",
        ));
    };
    check_email(email)?;
    check_otp(code)?;

    let user = match state
        .store
        .find_user_by_email(&validation::normalize_email(email))
        .await?
    {
        Some(user) if !user.is_email_verified => user,
        _ => return Err(invalid_otp("invalid otp")),
    };

    let outcome = state
        .otp
        .verify(
            &user.email,
            code,
            EMAIL_OTP_MAX_AGE_MINUTES,
            OtpPurpose::EmailVerification,
        )
        .await?;
    if !matches!(outcome, OtpVerification::Matched { .. }) {
        tracing::warn!(user_id = %user.id, outcome = ?outcome, "Email otp rejected");
        return Err(invalid_otp("invalid otp"));
    }

    state.store.mark_email_verified(user.id).await?;
    tracing::info!(user_id = %user.id, "Email verified");

    Ok(ApiResponse::message("email verified successfully"))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> ApiResult<Response> {
    let (Some(email), Some(password)) = (
        non_blank(&body.email),
        body.password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::validation(
            ErrorCode::RequiredParameterMissing,
            "required parameters missing: email and password",
        ));
    };

    let user = state
        .store
        .find_user_by_email(&validation::normalize_email(email))
        .await?;

    // Unknown emails still pay for one verification
    let hash = user
        .as_ref()
        .map_or(state.hasher.dummy_hash(), |u| u.password_hash.as_str());
    let matched = state.hasher.verify_async(password, hash).await;

    let user = match user {
        Some(user) if matched => user,
        _ => return Err(ApiError::invalid_credentials()),
    };

    if !user.is_email_verified {
        return Err(ApiError::forbidden(
            ErrorCode::EmailNotVerified,
            "email not verified",
        ));
    }
    if user.is_suspended {
        tracing::warn!(user_id = %user.id, "Login refused for suspended user");
        return Err(ApiError::forbidden(
            ErrorCode::UserSuspended,
            "user is suspended",
        ));
    }

    let principal = Principal::from(&user);
    let pair = state.tokens.issue(&principal).await?;
    tracing::info!(user_id = %user.id, "User logged in");

    let mut response = ApiResponse::with_data("login successful", principal).into_response();
    state.transport.attach(response.headers_mut(), &pair);
    Ok(response)
}

pub async fn logout(State(state): State<AppState>) -> Response {
    let mut response = ApiResponse::message("logout successful").into_response();
    state.transport.revoke(response.headers_mut());
    response
}

pub async fn forget_password(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<EmailRequest>,
) -> ApiResult<ApiResponse<()>> {
    let email = non_blank(&body.email).ok_or_else(|| {
        ApiError::validation(
            ErrorCode::RequiredParameterMissing,
            "provide email in body",
        )
    })?;
    check_email(email)?;

    let user = find_user(&state, email).await?;

    let code = state
        .otp
        .issue(&user.email, OtpPurpose::PasswordReset)
        .await?;
    let mail = password_reset_email(&state.config.email_app_name, &user.user_name, &code);
    state.mailer.send(&user.email, &mail.subject, &mail.html).await?;
    tracing::info!(user_id = %user.id, "Password reset code sent");

    Ok(ApiResponse::message("otp sent on email successfully"))
}

pub async fn forget_password_verify_otp(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<OtpRequest>,
) -> ApiResult<ApiResponse<()>> {
    let (Some(email), Some(code)) = (non_blank(&body.email), non_blank(&body.otp_code)) else {
        return Err(ApiError::validation(
            ErrorCode::RequiredParameterMissing,
            "provide email and otpCode in body",
        ));
    };
    check_email(email)?;
    check_otp(code)?;

    let user = find_user(&state, email).await?;

    let outcome = state
        .otp
        .verify(
            &user.email,
            code,
            PASSWORD_RESET_OTP_MAX_AGE_MINUTES,
            OtpPurpose::PasswordReset,
        )
        .await?;
    if !matches!(outcome, OtpVerification::Matched { .. }) {
        return Err(reset_otp_failure(outcome));
    }

    Ok(ApiResponse::message(
        "otp is valid, do not use this message for condition checking, use errorCode instead",
    ))
}

pub async fn forget_password_complete(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CompleteResetRequest>,
) -> ApiResult<ApiResponse<()>> {
    let (Some(email), Some(code), Some(new_password)) = (
        non_blank(&body.email),
        non_blank(&body.otp_code),
        body.new_password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::validation(
            ErrorCode::RequiredParameterMissing,
            "provide email, otpCode and newPassword in body",
        ));
    };
    check_email(email)?;
    check_password(new_password)?;
    check_otp(code)?;

    let user = find_user(&state, email).await?;

    let record_id = match state
        .otp
        .verify(
            &user.email,
            code,
            PASSWORD_RESET_OTP_MAX_AGE_MINUTES,
            OtpPurpose::PasswordReset,
        )
        .await?
    {
        OtpVerification::Matched { record_id } => record_id,
        outcome => return Err(reset_otp_failure(outcome)),
    };

    // Hash before redeeming so a failure here leaves the code usable
    let password_hash = state.hasher.hash_async(new_password).await?;

    if !state
        .otp
        .redeem_password_reset(record_id, user.id, &password_hash)
        .await?
    {
        tracing::warn!(user_id = %user.id, "Password reset code consumed concurrently");
        return Err(reset_otp_failure(OtpVerification::AlreadyUsed));
    }

    // The password has changed; stale sessions only expire on their own if this fails
    match state.tokens.revoke_all(user.id).await {
        Ok(revoked) => {
            tracing::info!(user_id = %user.id, revoked_sessions = revoked, "Password reset completed")
        }
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Failed to revoke sessions after password reset")
        }
    }

    Ok(ApiResponse::message(
        "your password has been updated, proceed to login",
    ))
}
