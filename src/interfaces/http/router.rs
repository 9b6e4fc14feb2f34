//! API router with Swagger UI

use std::sync::Arc;
use std::time::Instant;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sea_orm::DatabaseConnection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use super::common::ApiResponse;
use super::middleware::{actor_middleware, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};
use super::modules::health::{self, HealthState};
use super::modules::metrics::{http_metrics_middleware, prometheus_metrics, MetricsState};
use super::modules::request_id::request_id_middleware;
use super::modules::{ports, sessions, stations};
use crate::application::engine::SharedAllocationEngine;
use crate::interfaces::ws::ws_events_handler;

/// Actor header schemes for OpenAPI
struct ActorHeadersAddon;

impl Modify for ActorHeadersAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "actor_id",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(ACTOR_ID_HEADER))),
            );
            components.add_security_scheme(
                "actor_role",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(ACTOR_ROLE_HEADER))),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        stations::list_stations,
        stations::create_station,
        stations::get_station,
        stations::update_station,
        stations::delete_station,
        stations::list_station_ports,
        stations::add_port,
        ports::get_port,
        ports::delete_port,
        ports::report_hardware_status,
        ports::reset_port,
        ports::set_availability,
        sessions::start_session,
        sessions::get_session,
        sessions::stop_session,
        sessions::list_user_sessions,
    ),
    components(
        schemas(
            ApiResponse<String>,
            health::HealthResponse,
            health::ComponentHealth,
            stations::StationDto,
            stations::CreateStationRequest,
            stations::UpdateStationRequest,
            ports::PortDto,
            ports::PortEventDto,
            ports::TransitionDto,
            ports::AddPortRequest,
            ports::HardwareStatusRequest,
            ports::HardwareAckDto,
            ports::AvailabilityRequest,
            sessions::SessionDto,
            sessions::StartSessionRequest,
            sessions::StopSessionResponse,
        )
    ),
    modifiers(&ActorHeadersAddon),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Stations", description = "Station catalogue and port provisioning (writes are admin only)"),
        (name = "Ports", description = "Port snapshots, hardware status ingress and operator actions"),
        (name = "Sessions", description = "Charging session lifecycle"),
    ),
    info(
        title = "Charge Coordinator API",
        version = "0.1.0",
        description = "Charging session and port allocation core. Callers are identified by the X-Actor-Id and X-Actor-Role headers set by the gateway."
    )
)]
pub struct ApiDoc;

/// Everything the router needs from the running service
#[derive(Clone)]
pub struct RouterDeps {
    pub engine: SharedAllocationEngine,
    pub db: Option<DatabaseConnection>,
    /// `/metrics` is only mounted when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl RouterDeps {
    pub fn new(engine: SharedAllocationEngine) -> Self {
        Self {
            engine,
            db: None,
            metrics: None,
        }
    }
}

/// Create the API router with all routes
pub fn create_api_router(deps: RouterDeps) -> Router {
    let engine = deps.engine.clone();

    let api_routes = Router::new()
        .route(
            "/api/v1/stations",
            get(stations::list_stations).post(stations::create_station),
        )
        .route(
            "/api/v1/stations/{station_id}",
            get(stations::get_station)
                .put(stations::update_station)
                .delete(stations::delete_station),
        )
        .route(
            "/api/v1/stations/{station_id}/ports",
            get(stations::list_station_ports).post(stations::add_port),
        )
        .route(
            "/api/v1/ports/{port_id}",
            get(ports::get_port).delete(ports::delete_port),
        )
        .route(
            "/api/v1/ports/{port_id}/hardware-status",
            post(ports::report_hardware_status),
        )
        .route("/api/v1/ports/{port_id}/reset", post(ports::reset_port))
        .route(
            "/api/v1/ports/{port_id}/availability",
            post(ports::set_availability),
        )
        .route("/api/v1/sessions", post(sessions::start_session))
        .route("/api/v1/sessions/{session_id}", get(sessions::get_session))
        .route(
            "/api/v1/sessions/{session_id}/stop",
            post(sessions::stop_session),
        )
        .route(
            "/api/v1/users/{user_id}/sessions",
            get(sessions::list_user_sessions),
        )
        .layer(middleware::from_fn(actor_middleware))
        .with_state(engine.clone());

    // Event stream (read-only, no actor headers on the upgrade request)
    let ws_routes = Router::new()
        .route("/api/v1/ws/events", get(ws_events_handler))
        .with_state(engine.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health_check))
        .with_state(HealthState {
            db: deps.db,
            engine: engine.clone(),
            started_at: Arc::new(Instant::now()),
        });

    let mut router = Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(health_routes)
        .merge(api_routes)
        .merge(ws_routes);

    if let Some(handle) = deps.metrics {
        router = router.merge(
            Router::new()
                .route("/metrics", get(prometheus_metrics))
                .with_state(MetricsState { handle, engine }),
        );
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    router
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
