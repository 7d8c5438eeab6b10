//! HTTP surface for polling clients
//!
//! Every read is a snapshot safe to repeat on a timer; every mutation is
//! safe to retry after a timeout. Conflicts come back as 409 so a client
//! can tell "someone else already acted" from a failure.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    CheckParticipantBody, CreateMeetingRequest, DecideRequestBody, JoinRequestBody, Meeting,
    Participant, ParticipantStatus, ProposeHostBody, RespondHostBody, RoleRequest,
};
use crate::permissions;
use crate::AppState;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/meetings", post(create_meeting))
        .route("/api/meetings/join-request", post(join_request))
        .route("/api/meetings/check-participant", post(check_participant))
        .route("/api/meetings/participant-requests", post(decide_participant))
        .route("/api/meetings/:call_id/approval/:user_id", get(check_approval))
        .route("/api/meetings/:call_id/participants", get(fetch_participants))
        .route(
            "/api/meetings/:call_id/pending-participants",
            get(pending_participants),
        )
        .route("/api/meetings/:call_id/roles/:user_id", get(role_and_permissions))
        .route("/api/meetings/:call_id/end", post(end_meeting))
        .route("/api/host-requests", post(propose_host))
        .route("/api/host-requests/pending", get(pending_host_request))
        .route("/api/host-requests/respond", post(respond_host_request))
        .route("/api/media/token/:call_id/:user_id", get(media_token))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Serialize)]
struct CreateMeetingResponse {
    meeting: Meeting,
    participants: Vec<Participant>,
}

async fn create_meeting(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateMeetingRequest>,
) -> Result<impl IntoResponse> {
    require(&body.call_id, "call_id")?;
    require(&body.title, "title")?;
    require(&body.creator_id, "creator_id")?;
    require(&body.creator_name, "creator_name")?;

    let (meeting, participants) = state.store.create_meeting(&body).await?;

    // Membership state is committed; a media failure is the provider's
    // problem to retry, not a reason to roll back the meeting.
    if let Err(e) = state.media.create(&meeting.call_id, &meeting.creator_id).await {
        tracing::error!(call_id = %meeting.call_id, "media session create failed: {}", e);
    }

    Ok((
        StatusCode::CREATED,
        Json(CreateMeetingResponse {
            meeting,
            participants,
        }),
    ))
}

#[derive(Serialize)]
struct JoinRequestResponse {
    status: ParticipantStatus,
    participant: Participant,
    request: RoleRequest,
}

async fn join_request(
    State(state): State<Arc<AppState>>,
    Json(body): Json<JoinRequestBody>,
) -> Result<Json<JoinRequestResponse>> {
    require(&body.call_id, "call_id")?;
    require(&body.user_id, "user_id")?;
    require(&body.name, "name")?;
    require(&body.email, "email")?;

    let ticket = state
        .admission
        .request_admission(&body.call_id, &body.user_id, &body.name, &body.email)
        .await?;

    Ok(Json(JoinRequestResponse {
        status: ticket.participant.status,
        participant: ticket.participant,
        request: ticket.request,
    }))
}

async fn check_approval(
    State(state): State<Arc<AppState>>,
    Path((call_id, user_id)): Path<(String, String)>,
) -> Result<Json<crate::admission::StatusReport>> {
    let report = state.admission.check_status(&call_id, &user_id).await?;
    Ok(Json(report))
}

#[derive(Serialize)]
struct CheckParticipantResponse {
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<ParticipantStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

async fn check_participant(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CheckParticipantBody>,
) -> Result<Json<CheckParticipantResponse>> {
    require(&body.call_id, "call_id")?;
    require(&body.email, "email")?;

    let found = state
        .admission
        .check_by_email(&body.call_id, &body.email)
        .await?;

    Ok(Json(match found {
        Some(p) => CheckParticipantResponse {
            exists: true,
            status: Some(p.status),
            user_id: Some(p.user_id),
            name: Some(p.name),
            email: p.email,
        },
        None => CheckParticipantResponse {
            exists: false,
            status: None,
            user_id: None,
            name: None,
            email: None,
        },
    }))
}

#[derive(Serialize)]
struct ParticipantsResponse {
    participants: Vec<ParticipantView>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize)]
struct ParticipantView {
    user_id: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    status: ParticipantStatus,
    is_host: bool,
    is_creator: bool,
    kind: crate::models::ParticipantKind,
}

async fn fetch_participants(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Result<Json<ParticipantsResponse>> {
    let meeting = state.store.get_meeting(&call_id).await?;
    let approved = state
        .store
        .participants_with_status(&call_id, ParticipantStatus::Approved)
        .await?;

    let participants = approved
        .into_iter()
        .map(|p| ParticipantView {
            is_creator: p.user_id == meeting.creator_id,
            user_id: p.user_id,
            name: p.name,
            email: p.email,
            status: p.status,
            is_host: p.is_host,
            kind: p.kind,
        })
        .collect();

    Ok(Json(ParticipantsResponse {
        participants,
        updated_at: meeting.updated_at,
    }))
}

#[derive(Serialize)]
struct PendingParticipantsResponse {
    participants: Vec<PendingParticipantView>,
}

#[derive(Serialize)]
struct PendingParticipantView {
    request_id: Uuid,
    user_id: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

async fn pending_participants(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Result<Json<PendingParticipantsResponse>> {
    let pending = state.admission.pending_participants(&call_id).await?;

    let participants = pending
        .into_iter()
        .map(|p| PendingParticipantView {
            request_id: p.id,
            user_id: p.user_id,
            name: p.name,
            email: p.email,
        })
        .collect();

    Ok(Json(PendingParticipantsResponse { participants }))
}

#[derive(Serialize)]
struct DecideResponse {
    success: bool,
    request_id: Uuid,
    status: ParticipantStatus,
}

async fn decide_participant(
    State(state): State<Arc<AppState>>,
    Json(body): Json<DecideRequestBody>,
) -> Result<Json<DecideResponse>> {
    require(&body.call_id, "call_id")?;

    let participant = state
        .admission
        .decide(&body.call_id, body.request_id, body.action)
        .await?;

    Ok(Json(DecideResponse {
        success: true,
        request_id: body.request_id,
        status: participant.status,
    }))
}

#[derive(Serialize)]
struct RolesResponse {
    role: crate::models::Role,
    permissions: crate::models::Permissions,
    is_host: bool,
    is_creator: bool,
    updated_at: chrono::DateTime<chrono::Utc>,
}

async fn role_and_permissions(
    State(state): State<Arc<AppState>>,
    Path((call_id, user_id)): Path<(String, String)>,
) -> Result<Json<RolesResponse>> {
    let meeting = state.store.get_meeting(&call_id).await?;
    let participant = state
        .store
        .participant_by_user(&call_id, &user_id)
        .await?
        .ok_or_else(|| AppError::ParticipantNotFound(user_id))?;

    let grant = permissions::resolve(&meeting.creator_id, &participant);

    Ok(Json(RolesResponse {
        role: grant.role,
        permissions: grant.permissions,
        is_host: grant.is_host,
        is_creator: grant.is_creator,
        updated_at: meeting.updated_at,
    }))
}

#[derive(Deserialize)]
struct EndMeetingBody {
    user_id: String,
}

#[derive(Serialize)]
struct EndMeetingResponse {
    success: bool,
    call_id: String,
}

async fn end_meeting(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    Json(body): Json<EndMeetingBody>,
) -> Result<Json<EndMeetingResponse>> {
    require(&body.user_id, "user_id")?;

    let meeting = state.store.get_meeting(&call_id).await?;
    let participant = state
        .store
        .participant_by_user(&call_id, &body.user_id)
        .await?
        .ok_or_else(|| AppError::ParticipantNotFound(body.user_id.clone()))?;

    let grant = permissions::resolve(&meeting.creator_id, &participant);
    if !grant.permissions.can_end_call {
        return Err(AppError::Forbidden(
            "only hosts can end the call".to_string(),
        ));
    }

    state.media.end(&call_id).await?;

    tracing::info!(call_id, user_id = %body.user_id, "meeting ended");
    Ok(Json(EndMeetingResponse {
        success: true,
        call_id,
    }))
}

async fn propose_host(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProposeHostBody>,
) -> Result<Json<RoleRequest>> {
    require(&body.call_id, "call_id")?;
    require(&body.requester_id, "requester_id")?;
    require(&body.target_user_id, "target_user_id")?;

    let request = state
        .delegation
        .propose_host(&body.call_id, &body.requester_id, &body.target_user_id)
        .await?;

    Ok(Json(request))
}

#[derive(Deserialize)]
struct PendingHostQuery {
    call_id: String,
    user_id: String,
}

async fn pending_host_request(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PendingHostQuery>,
) -> Result<Json<Option<RoleRequest>>> {
    require(&query.call_id, "call_id")?;
    require(&query.user_id, "user_id")?;

    let pending = state
        .delegation
        .pending_host_request(&query.call_id, &query.user_id)
        .await?;

    Ok(Json(pending))
}

#[derive(Serialize)]
struct RespondHostResponse {
    success: bool,
    is_host: bool,
    call_id: String,
    message: &'static str,
}

async fn respond_host_request(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RespondHostBody>,
) -> Result<Json<RespondHostResponse>> {
    require(&body.user_id, "user_id")?;

    let outcome = state
        .delegation
        .respond(body.request_id, &body.user_id, body.accept)
        .await?;

    Ok(Json(RespondHostResponse {
        success: true,
        is_host: outcome.is_host,
        call_id: outcome.request.call_id,
        message: if body.accept {
            "You have accepted the host role"
        } else {
            "You have declined the host role"
        },
    }))
}

#[derive(Serialize)]
struct MediaTokenResponse {
    token: String,
}

async fn media_token(
    State(state): State<Arc<AppState>>,
    Path((call_id, user_id)): Path<(String, String)>,
) -> Result<Json<MediaTokenResponse>> {
    state.store.get_meeting(&call_id).await?;
    let participant = state
        .store
        .participant_by_user(&call_id, &user_id)
        .await?
        .ok_or_else(|| AppError::ParticipantNotFound(user_id.clone()))?;

    // Admission gates the media session: only approved participants may
    // fetch a join token.
    if participant.status != ParticipantStatus::Approved {
        return Err(AppError::Forbidden(
            "participant is not approved to join".to_string(),
        ));
    }

    let token = state.media.join_token(&call_id, &user_id).await?;
    Ok(Json(MediaTokenResponse { token }))
}

fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_rejects_empty_and_whitespace() {
        assert!(require("", "call_id").is_err());
        assert!(require("   ", "call_id").is_err());
        assert!(require("abc", "call_id").is_ok());
    }
}
