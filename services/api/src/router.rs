//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AircraftDetail, CommandView, EnqueuePayload, ErrorResponse, HealthResponse, ParsePayload,
        PhaseResponse, PositionPayload, QueueEntryView, QueuePositionResponse, RemovedResponse,
        TelemetryPayload, TransmissionPayload, TransmissionResponse,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::parse_transmission,
        handlers::transmit,
        handlers::push_telemetry,
        handlers::list_aircraft,
        handlers::get_aircraft,
        handlers::delete_aircraft,
        handlers::get_queue,
        handlers::enqueue,
        handlers::clear_queue,
        handlers::queue_position,
        handlers::remove_from_queue,
        handlers::health,
    ),
    components(
        schemas(
            ParsePayload, CommandView, TransmissionPayload, TransmissionResponse,
            TelemetryPayload, PositionPayload, PhaseResponse, AircraftDetail,
            QueueEntryView, EnqueuePayload, QueuePositionResponse, RemovedResponse,
            HealthResponse, ErrorResponse
        )
    ),
    tags(
        (name = "ATC API", description = "Radio transmissions, flight phases and runway queues")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/health", get(handlers::health))
        .route("/parse", post(handlers::parse_transmission))
        .route("/aircraft", get(handlers::list_aircraft))
        .route(
            "/aircraft/{callsign}",
            get(handlers::get_aircraft).delete(handlers::delete_aircraft),
        )
        .route(
            "/aircraft/{callsign}/transmissions",
            post(handlers::transmit),
        )
        .route(
            "/aircraft/{callsign}/telemetry",
            post(handlers::push_telemetry),
        )
        .route(
            "/queues/{tag}",
            get(handlers::get_queue)
                .post(handlers::enqueue)
                .delete(handlers::clear_queue),
        )
        .route(
            "/queues/{tag}/{callsign}",
            get(handlers::queue_position).delete(handlers::remove_from_queue),
        )
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
