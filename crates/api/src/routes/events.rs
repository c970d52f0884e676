//! Event and registration routes
//!
//! Everything here sits behind `require_session`; the organizer handlers are
//! additionally gated by `require_organizer`. Ownership is checked per record.

use axum::extract::{Extension, Path, State};
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use eventhub_shared::{
    validation::non_blank, ErrorCode, Event, EventChanges, EventStore, EventType, NewEvent,
    Registration, UserStore, ValidationError,
};

use crate::{
    auth::Principal,
    error::{ApiError, ApiJson, ApiResponse, ApiResult},
    state::AppState,
};

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub event_type: Option<String>,
    pub price: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub event_type: Option<String>,
    pub price: Option<String>,
    pub location: Option<String>,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_event_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::validation(ErrorCode::InvalidEventId, "INVALID_EVENT_ID"))
}

fn event_not_found() -> ApiError {
    ApiError::not_found(ErrorCode::EventNotExist, "Event not found")
}

fn registration_not_found() -> ApiError {
    ApiError::not_found(ErrorCode::RegistrationNotExist, "REGISTRATION_NOT_EXIST")
}

fn parse_date(field: &str, raw: &str) -> Result<OffsetDateTime, ValidationError> {
    OffsetDateTime::parse(raw.trim(), &Rfc3339).map_err(|_| {
        ValidationError::new(
            ErrorCode::InvalidDate,
            format!("{field} must be an RFC 3339 timestamp"),
        )
    })
}

fn parse_optional_date(
    field: &str,
    raw: &Option<String>,
) -> Result<Option<OffsetDateTime>, ValidationError> {
    non_blank(raw).map(|v| parse_date(field, v)).transpose()
}

/// An event owned by `organizer_id`; anybody else's reads as absent
async fn owned_event(state: &AppState, organizer_id: Uuid, raw_id: &str) -> ApiResult<Event> {
    let event_id = parse_event_id(raw_id)?;
    match state.store.find_event(event_id).await? {
        Some(event) if event.organizer_id == organizer_id => Ok(event),
        _ => Err(event_not_found()),
    }
}

/// A registration of `participant_id`; malformed ids read as absent
async fn owned_registration(
    state: &AppState,
    participant_id: Uuid,
    raw_id: &str,
) -> ApiResult<Registration> {
    let id = Uuid::parse_str(raw_id.trim()).map_err(|_| registration_not_found())?;
    let registration = state
        .store
        .find_registration(id)
        .await?
        .ok_or_else(registration_not_found)?;
    if registration.participant_id != participant_id {
        tracing::warn!(
            registration_id = %id,
            user_id = %participant_id,
            "Registration belongs to another user"
        );
        return Err(ApiError::forbidden(
            ErrorCode::NotAllowed,
            "registration belongs to another user",
        ));
    }
    Ok(registration)
}

impl TryFrom<CreateEventRequest> for NewEvent {
    type Error = ValidationError;

    fn try_from(body: CreateEventRequest) -> Result<Self, Self::Error> {
        let title = non_blank(&body.title).ok_or_else(|| ValidationError::missing("title"))?;
        let description =
            non_blank(&body.description).ok_or_else(|| ValidationError::missing("description"))?;
        let price = non_blank(&body.price).ok_or_else(|| ValidationError::missing("price"))?;
        let event_type =
            non_blank(&body.event_type).ok_or_else(|| ValidationError::missing("eventType"))?;
        let start_date =
            non_blank(&body.start_date).ok_or_else(|| ValidationError::missing("startDate"))?;
        let end_date =
            non_blank(&body.end_date).ok_or_else(|| ValidationError::missing("endDate"))?;

        Ok(NewEvent {
            title: title.to_string(),
            description: description.to_string(),
            start_date: parse_date("startDate", start_date)?,
            end_date: parse_date("endDate", end_date)?,
            event_type: EventType::parse(event_type)?,
            price: price.to_string(),
            location: body.location,
        })
    }
}

impl TryFrom<UpdateEventRequest> for EventChanges {
    type Error = ValidationError;

    fn try_from(body: UpdateEventRequest) -> Result<Self, Self::Error> {
        Ok(EventChanges {
            start_date: parse_optional_date("startDate", &body.start_date)?,
            end_date: parse_optional_date("endDate", &body.end_date)?,
            event_type: non_blank(&body.event_type)
                .map(EventType::parse)
                .transpose()?,
            title: body.title,
            description: body.description,
            price: body.price,
            location: body.location,
        })
    }
}

// =============================================================================
// Handlers: any authenticated user
// =============================================================================

pub async fn list_events(State(state): State<AppState>) -> ApiResult<ApiResponse<Vec<Event>>> {
    let events = state.store.list_events().await?;
    Ok(ApiResponse::with_data("Events fetched Successfully", events))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> ApiResult<ApiResponse<Event>> {
    let event_id = parse_event_id(&event_id)?;
    let event = state
        .store
        .find_event(event_id)
        .await?
        .ok_or_else(event_not_found)?;
    Ok(ApiResponse::with_data("Event", event))
}

pub async fn register_for_event(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<String>,
) -> ApiResult<ApiResponse<Registration>> {
    let event_id = parse_event_id(&event_id)?;
    // The session may outlive the account
    let user = state
        .store
        .find_user_by_id(principal.user_id)
        .await?
        .ok_or_else(ApiError::unauthorized)?;
    let event = state
        .store
        .find_event(event_id)
        .await?
        .ok_or_else(event_not_found)?;

    let registration = Registration::draft(event.id, user.id, state.clock.now());
    state.store.insert_registration(registration.clone()).await?;
    state
        .store
        .add_followed_organizer(user.id, event.organizer_id)
        .await?;

    tracing::info!(
        user_id = %user.id,
        event_id = %event.id,
        registration_id = %registration.id,
        "Registration created"
    );
    Ok(ApiResponse::with_data(
        "Participation created Successfully",
        registration,
    ))
}

pub async fn participate(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(registration_id): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    let registration = owned_registration(&state, principal.user_id, &registration_id).await?;

    if !registration.is_paid {
        return Err(ApiError::forbidden(
            ErrorCode::NotAllowed,
            "Not allowed first complete the payment",
        ));
    }

    state.store.mark_participated(registration.id).await?;
    Ok(ApiResponse::message("Participated Successfully"))
}

pub async fn cancel_registration(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(registration_id): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    let registration = owned_registration(&state, principal.user_id, &registration_id).await?;

    if !state.store.delete_registration(registration.id).await? {
        return Err(registration_not_found());
    }
    tracing::info!(user_id = %principal.user_id, registration_id = %registration.id, "Registration cancelled");
    Ok(ApiResponse::message("registration cancelled Successfully"))
}

// =============================================================================
// Handlers: organizers
// =============================================================================

pub async fn list_my_events(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<ApiResponse<Vec<Event>>> {
    let events = state
        .store
        .list_events_by_organizer(principal.user_id)
        .await?;
    Ok(ApiResponse::with_data("Events fetched Successfully", events))
}

pub async fn create_event(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ApiJson(body): ApiJson<CreateEventRequest>,
) -> ApiResult<ApiResponse<Event>> {
    let event = NewEvent::try_from(body)?.into_event(principal.user_id, state.clock.now())?;
    state.store.insert_event(event.clone()).await?;

    tracing::info!(user_id = %principal.user_id, event_id = %event.id, "Event created");
    Ok(ApiResponse::with_data("Event created Successfully", event))
}

pub async fn get_my_event(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<String>,
) -> ApiResult<ApiResponse<Event>> {
    let event = owned_event(&state, principal.user_id, &event_id).await?;
    Ok(ApiResponse::with_data("Event", event))
}

pub async fn update_event(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<String>,
    ApiJson(body): ApiJson<UpdateEventRequest>,
) -> ApiResult<ApiResponse<Event>> {
    let event = owned_event(&state, principal.user_id, &event_id).await?;
    let updated = event.apply(EventChanges::try_from(body)?)?;
    state.store.update_event(&updated).await?;

    tracing::info!(user_id = %principal.user_id, event_id = %updated.id, "Event updated");
    Ok(ApiResponse::with_data("Event updated Successfully", updated))
}

pub async fn delete_event(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(event_id): Path<String>,
) -> ApiResult<ApiResponse<()>> {
    let event = owned_event(&state, principal.user_id, &event_id).await?;
    if !state.store.delete_event(event.id).await? {
        return Err(event_not_found());
    }

    tracing::info!(user_id = %principal.user_id, event_id = %event.id, "Event deleted");
    Ok(ApiResponse::message("Event Deleted Successfully"))
}
