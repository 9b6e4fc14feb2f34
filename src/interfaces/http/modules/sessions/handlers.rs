//! Session API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use super::dto::{SessionDto, StartSessionRequest, StopSessionResponse};
use crate::application::engine::SharedAllocationEngine;
use crate::domain::Actor;
use crate::interfaces::http::common::{ok, ApiError, ApiResponse, ApiResult, ValidatedJson};

#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    tag = "Sessions",
    request_body = StartSessionRequest,
    responses(
        (status = 201, description = "Port reserved, session pending", body = ApiResponse<SessionDto>),
        (status = 404, description = "Port not found"),
        (status = 409, description = "Port, vehicle or station not available"),
        (status = 422, description = "Validation error")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn start_session(
    State(engine): State<SharedAllocationEngine>,
    Extension(actor): Extension<Actor>,
    ValidatedJson(body): ValidatedJson<StartSessionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SessionDto>>), ApiError> {
    let session = engine
        .start_session(&actor, &body.port_id, &body.user_id, &body.vehicle_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(session.into()))))
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions/{session_id}",
    tag = "Sessions",
    params(("session_id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Session details", body = ApiResponse<SessionDto>),
        (status = 403, description = "Session belongs to another user"),
        (status = 404, description = "Not found")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn get_session(
    State(engine): State<SharedAllocationEngine>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionDto> {
    ok(engine.get_session(&actor, &session_id).await?.into())
}

#[utoipa::path(
    post,
    path = "/api/v1/sessions/{session_id}/stop",
    tag = "Sessions",
    params(("session_id" = String, Path, description = "Session ID")),
    responses(
        (status = 200, description = "Stop accepted; repeated calls return the same session", body = ApiResponse<StopSessionResponse>),
        (status = 404, description = "Not found"),
        (status = 409, description = "Port busy")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn stop_session(
    State(engine): State<SharedAllocationEngine>,
    Extension(actor): Extension<Actor>,
    Path(session_id): Path<String>,
) -> ApiResult<StopSessionResponse> {
    ok(engine.stop_session(&actor, &session_id).await?.into())
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{user_id}/sessions",
    tag = "Sessions",
    params(("user_id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Sessions of the user, newest first", body = ApiResponse<Vec<SessionDto>>),
        (status = 403, description = "Not allowed to list another user's sessions")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn list_user_sessions(
    State(engine): State<SharedAllocationEngine>,
    Extension(actor): Extension<Actor>,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<SessionDto>> {
    let sessions = engine.sessions_for_user(&actor, &user_id).await?;
    ok(sessions.into_iter().map(Into::into).collect())
}
