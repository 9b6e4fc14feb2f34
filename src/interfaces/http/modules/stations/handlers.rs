//! Station API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use super::dto::{CreateStationRequest, StationDto, UpdateStationRequest};
use crate::application::engine::SharedAllocationEngine;
use crate::domain::{Actor, Station};
use crate::interfaces::http::common::{ok, ApiError, ApiResponse, ApiResult, ValidatedJson};
use crate::interfaces::http::modules::ports::{AddPortRequest, PortDto};

fn dto(engine: &SharedAllocationEngine, station: Station) -> StationDto {
    let open = engine.ledger().open_count_for_station(&station.id);
    StationDto::from_domain(station, open)
}

#[utoipa::path(
    get,
    path = "/api/v1/stations",
    tag = "Stations",
    responses(
        (status = 200, description = "All stations", body = ApiResponse<Vec<StationDto>>)
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn list_stations(State(engine): State<SharedAllocationEngine>) -> ApiResult<Vec<StationDto>> {
    let stations = engine.list_stations();
    ok(stations.into_iter().map(|s| dto(&engine, s)).collect())
}

#[utoipa::path(
    post,
    path = "/api/v1/stations",
    tag = "Stations",
    request_body = CreateStationRequest,
    responses(
        (status = 201, description = "Station created", body = ApiResponse<StationDto>),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Already exists"),
        (status = 422, description = "Validation error")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn create_station(
    State(engine): State<SharedAllocationEngine>,
    Extension(actor): Extension<Actor>,
    ValidatedJson(body): ValidatedJson<CreateStationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<StationDto>>), ApiError> {
    let station = engine.create_station(&actor, body.into_domain()?).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(dto(&engine, station)))))
}

#[utoipa::path(
    get,
    path = "/api/v1/stations/{station_id}",
    tag = "Stations",
    params(("station_id" = String, Path, description = "Station ID")),
    responses(
        (status = 200, description = "Station details", body = ApiResponse<StationDto>),
        (status = 404, description = "Not found")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn get_station(
    State(engine): State<SharedAllocationEngine>,
    Path(station_id): Path<String>,
) -> ApiResult<StationDto> {
    let station = engine.get_station(&station_id)?;
    ok(dto(&engine, station))
}

#[utoipa::path(
    put,
    path = "/api/v1/stations/{station_id}",
    tag = "Stations",
    params(("station_id" = String, Path, description = "Station ID")),
    request_body = UpdateStationRequest,
    responses(
        (status = 200, description = "Station updated", body = ApiResponse<StationDto>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Existing ports use a dropped connector type")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn update_station(
    State(engine): State<SharedAllocationEngine>,
    Extension(actor): Extension<Actor>,
    Path(station_id): Path<String>,
    ValidatedJson(body): ValidatedJson<UpdateStationRequest>,
) -> ApiResult<StationDto> {
    let station = engine
        .update_station(&actor, body.into_domain(&station_id)?)
        .await?;
    ok(dto(&engine, station))
}

#[utoipa::path(
    delete,
    path = "/api/v1/stations/{station_id}",
    tag = "Stations",
    params(("station_id" = String, Path, description = "Station ID")),
    responses(
        (status = 200, description = "Station and its ports removed", body = ApiResponse<StationDto>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Station has open sessions")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn delete_station(
    State(engine): State<SharedAllocationEngine>,
    Extension(actor): Extension<Actor>,
    Path(station_id): Path<String>,
) -> ApiResult<StationDto> {
    let station = engine.remove_station(&actor, &station_id).await?;
    ok(StationDto::from_domain(station, 0))
}

#[utoipa::path(
    get,
    path = "/api/v1/stations/{station_id}/ports",
    tag = "Stations",
    params(("station_id" = String, Path, description = "Station ID")),
    responses(
        (status = 200, description = "Ports of the station", body = ApiResponse<Vec<PortDto>>),
        (status = 404, description = "Station not found")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn list_station_ports(
    State(engine): State<SharedAllocationEngine>,
    Path(station_id): Path<String>,
) -> ApiResult<Vec<PortDto>> {
    let ports = engine.ports_of_station(&station_id)?;
    ok(ports.into_iter().map(Into::into).collect())
}

#[utoipa::path(
    post,
    path = "/api/v1/stations/{station_id}/ports",
    tag = "Stations",
    params(("station_id" = String, Path, description = "Station ID")),
    request_body = AddPortRequest,
    responses(
        (status = 201, description = "Port added in state Available", body = ApiResponse<PortDto>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Station not found"),
        (status = 409, description = "Port already exists"),
        (status = 422, description = "Unsupported connector or bad power rating")
    ),
    security(("actor_id" = []), ("actor_role" = []))
)]
pub async fn add_port(
    State(engine): State<SharedAllocationEngine>,
    Extension(actor): Extension<Actor>,
    Path(station_id): Path<String>,
    ValidatedJson(body): ValidatedJson<AddPortRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PortDto>>), ApiError> {
    let port = engine.add_port(&actor, body.into_domain(&station_id)?).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(port.into()))))
}
