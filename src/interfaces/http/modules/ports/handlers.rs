//! Port API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use super::dto::{
    AvailabilityRequest, HardwareAckDto, HardwareStatusRequest, PortDto, TransitionDto,
};
use crate::application::engine::{HardwareAck, SharedAllocationEngine};
use crate::domain::Actor;
use crate::interfaces::http::common::{ok, ApiError, ApiResponse, ApiResult, ValidatedJson};

#[utoipa::path(
    get,
    path = "/api/v1/ports/{port_id}",
    tag = "Ports",
    params(("port_id" = String, Path, description = "Port ID")),
    responses(
        (status = 200, description = "Current port snapshot", body = ApiResponse<PortDto>),
        (status = 404, description = "Not found")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn get_port(
    State(engine): State<SharedAllocationEngine>,
    Path(port_id): Path<String>,
) -> ApiResult<PortDto> {
    ok(engine.get_port_state(&port_id)?.into())
}

#[utoipa::path(
    delete,
    path = "/api/v1/ports/{port_id}",
    tag = "Ports",
    params(("port_id" = String, Path, description = "Port ID")),
    responses(
        (status = 200, description = "Port removed", body = ApiResponse<PortDto>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Port is not Available")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn delete_port(
    State(engine): State<SharedAllocationEngine>,
    Extension(actor): Extension<Actor>,
    Path(port_id): Path<String>,
) -> ApiResult<PortDto> {
    ok(engine.remove_port(&actor, &port_id).await?.into())
}

#[utoipa::path(
    post,
    path = "/api/v1/ports/{port_id}/hardware-status",
    tag = "Ports",
    params(("port_id" = String, Path, description = "Port ID")),
    request_body = HardwareStatusRequest,
    responses(
        (status = 200, description = "Report applied, recorded or ignored", body = ApiResponse<HardwareAckDto>),
        (status = 202, description = "Report contradicted the ledger; port faulted", body = ApiResponse<HardwareAckDto>),
        (status = 403, description = "Station or system only"),
        (status = 404, description = "Not found")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn report_hardware_status(
    State(engine): State<SharedAllocationEngine>,
    Extension(actor): Extension<Actor>,
    Path(port_id): Path<String>,
    ValidatedJson(body): ValidatedJson<HardwareStatusRequest>,
) -> Result<(StatusCode, Json<ApiResponse<HardwareAckDto>>), ApiError> {
    let report = body.into_report()?;
    let ack = engine.report_hardware_status(&actor, &port_id, report).await?;
    let status = match ack {
        HardwareAck::FaultRaised { .. } => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(ApiResponse::success(ack.into()))))
}

#[utoipa::path(
    post,
    path = "/api/v1/ports/{port_id}/reset",
    tag = "Ports",
    params(("port_id" = String, Path, description = "Port ID")),
    responses(
        (status = 200, description = "Faulted port returned to service", body = ApiResponse<TransitionDto>),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Port is not Faulted")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn reset_port(
    State(engine): State<SharedAllocationEngine>,
    Extension(actor): Extension<Actor>,
    Path(port_id): Path<String>,
) -> ApiResult<TransitionDto> {
    ok(engine.reset_port(&actor, &port_id).await?.into())
}

#[utoipa::path(
    post,
    path = "/api/v1/ports/{port_id}/availability",
    tag = "Ports",
    params(("port_id" = String, Path, description = "Port ID")),
    request_body = AvailabilityRequest,
    responses(
        (status = 200, description = "Port snapshot after the change", body = ApiResponse<PortDto>),
        (status = 400, description = "Malformed body"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Port is busy")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn set_availability(
    State(engine): State<SharedAllocationEngine>,
    Extension(actor): Extension<Actor>,
    Path(port_id): Path<String>,
    ValidatedJson(body): ValidatedJson<AvailabilityRequest>,
) -> ApiResult<PortDto> {
    let port = match engine
        .set_port_availability(&actor, &port_id, body.available)
        .await?
    {
        Some(committed) => committed.port,
        None => engine.get_port_state(&port_id)?,
    };
    ok(port.into())
}
