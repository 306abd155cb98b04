//! Axum Handlers for the REST API
//!
//! Thin adapters between HTTP and [`AtcController`](atc_core::AtcController).
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use atc_core::Telemetry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

use crate::{
    models::{
        AircraftDetail, CommandView, EnqueuePayload, ErrorResponse, HealthResponse, ParsePayload,
        PhaseResponse, QueueEntryView, QueuePositionResponse, RemovedResponse, TelemetryPayload,
        TransmissionPayload, TransmissionResponse,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

fn not_tracked(callsign: &str) -> ApiError {
    ApiError::NotFound(format!("Aircraft '{}' is not tracked", callsign))
}

/// Parse a transmission without changing any state.
#[utoipa::path(
    post,
    path = "/parse",
    request_body = ParsePayload,
    responses(
        (status = 200, description = "Classified transmission", body = CommandView)
    )
)]
pub async fn parse_transmission(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ParsePayload>,
) -> Json<CommandView> {
    Json(state.controller.parse(&payload.text).into())
}

/// Process a pilot transmission and return the controller's reply.
#[utoipa::path(
    post,
    path = "/aircraft/{callsign}/transmissions",
    request_body = TransmissionPayload,
    responses(
        (status = 200, description = "Controller reply", body = TransmissionResponse),
        (status = 400, description = "Bad request", body = ErrorResponse)
    ),
    params(
        ("callsign" = String, Path, description = "Aircraft callsign")
    )
)]
pub async fn transmit(
    State(state): State<Arc<AppState>>,
    Path(callsign): Path<String>,
    Json(payload): Json<TransmissionPayload>,
) -> Result<Json<TransmissionResponse>, ApiError> {
    if callsign.trim().is_empty() {
        return Err(ApiError::BadRequest("callsign must not be empty".to_string()));
    }

    let telemetry = payload.telemetry.map(Telemetry::from);
    let transmission = state
        .controller
        .process_transmission(&callsign, &payload.text, telemetry.as_ref())
        .await;

    Ok(Json(TransmissionResponse {
        callsign,
        response: transmission.response,
        phase: transmission.phase.to_string(),
    }))
}

/// Push a telemetry sample for an aircraft.
#[utoipa::path(
    post,
    path = "/aircraft/{callsign}/telemetry",
    request_body = TelemetryPayload,
    responses(
        (status = 200, description = "Phase after the sample was applied", body = PhaseResponse)
    ),
    params(
        ("callsign" = String, Path, description = "Aircraft callsign")
    )
)]
pub async fn push_telemetry(
    State(state): State<Arc<AppState>>,
    Path(callsign): Path<String>,
    Json(payload): Json<TelemetryPayload>,
) -> Json<PhaseResponse> {
    let telemetry = Telemetry::from(payload);
    let phase = match state
        .controller
        .update_from_telemetry(&callsign, &telemetry)
        .await
    {
        Some(change) => change.to,
        None => state.controller.phase(&callsign).await,
    };

    Json(PhaseResponse {
        callsign,
        phase: phase.to_string(),
    })
}

/// List every tracked aircraft and its phase.
#[utoipa::path(
    get,
    path = "/aircraft",
    responses(
        (status = 200, description = "Phase by callsign", body = BTreeMap<String, String>)
    )
)]
pub async fn list_aircraft(State(state): State<Arc<AppState>>) -> Json<BTreeMap<String, String>> {
    let phases = state
        .controller
        .phases()
        .await
        .into_iter()
        .map(|(callsign, phase)| (callsign, phase.to_string()))
        .collect();
    Json(phases)
}

/// Get one aircraft's phase, recent transmissions and last known telemetry.
#[utoipa::path(
    get,
    path = "/aircraft/{callsign}",
    responses(
        (status = 200, description = "Aircraft details", body = AircraftDetail),
        (status = 404, description = "Aircraft not tracked", body = ErrorResponse)
    ),
    params(
        ("callsign" = String, Path, description = "Aircraft callsign")
    )
)]
pub async fn get_aircraft(
    State(state): State<Arc<AppState>>,
    Path(callsign): Path<String>,
) -> Result<Json<AircraftDetail>, ApiError> {
    let phase = state
        .controller
        .phases()
        .await
        .remove(&callsign)
        .ok_or_else(|| not_tracked(&callsign))?;
    let history = state
        .controller
        .history(&callsign)
        .await
        .into_iter()
        .map(CommandView::from)
        .collect();
    let telemetry = state
        .controller
        .last_telemetry(&callsign)
        .await
        .map(TelemetryPayload::from);

    Ok(Json(AircraftDetail {
        callsign,
        phase: phase.to_string(),
        history,
        telemetry,
    }))
}

/// Forget an aircraft's session.
#[utoipa::path(
    delete,
    path = "/aircraft/{callsign}",
    responses(
        (status = 204, description = "Session cleared"),
        (status = 404, description = "Aircraft not tracked", body = ErrorResponse)
    ),
    params(
        ("callsign" = String, Path, description = "Aircraft callsign")
    )
)]
pub async fn delete_aircraft(
    State(state): State<Arc<AppState>>,
    Path(callsign): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.controller.clear_session(&callsign).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_tracked(&callsign))
    }
}

/// List a queue in order.
#[utoipa::path(
    get,
    path = "/queues/{tag}",
    responses(
        (status = 200, description = "Queue entries, head first", body = [QueueEntryView])
    ),
    params(
        ("tag" = String, Path, description = "Queue tag, e.g. takeoff or landing")
    )
)]
pub async fn get_queue(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> Json<Vec<QueueEntryView>> {
    let entries = state
        .controller
        .queue(&tag)
        .await
        .into_iter()
        .map(QueueEntryView::from)
        .collect();
    Json(entries)
}

/// Add an aircraft to a queue.
#[utoipa::path(
    post,
    path = "/queues/{tag}",
    request_body = EnqueuePayload,
    responses(
        (status = 201, description = "Queued", body = QueuePositionResponse),
        (status = 400, description = "Bad request", body = ErrorResponse)
    ),
    params(
        ("tag" = String, Path, description = "Queue tag")
    )
)]
pub async fn enqueue(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
    Json(payload): Json<EnqueuePayload>,
) -> Result<(StatusCode, Json<QueuePositionResponse>), ApiError> {
    if payload.callsign.trim().is_empty() {
        return Err(ApiError::BadRequest("callsign must not be empty".to_string()));
    }
    let position = state
        .controller
        .enqueue(&tag, &payload.callsign, payload.priority)
        .await;
    Ok((StatusCode::CREATED, Json(QueuePositionResponse { position })))
}

/// Empty a queue.
#[utoipa::path(
    delete,
    path = "/queues/{tag}",
    responses(
        (status = 200, description = "Number of entries removed", body = RemovedResponse)
    ),
    params(
        ("tag" = String, Path, description = "Queue tag")
    )
)]
pub async fn clear_queue(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
) -> Json<RemovedResponse> {
    let removed = state.controller.clear(&tag).await;
    Json(RemovedResponse { removed })
}

/// Get an aircraft's position in a queue.
#[utoipa::path(
    get,
    path = "/queues/{tag}/{callsign}",
    responses(
        (status = 200, description = "0-based position", body = QueuePositionResponse),
        (status = 404, description = "Not queued", body = ErrorResponse)
    ),
    params(
        ("tag" = String, Path, description = "Queue tag"),
        ("callsign" = String, Path, description = "Aircraft callsign")
    )
)]
pub async fn queue_position(
    State(state): State<Arc<AppState>>,
    Path((tag, callsign)): Path<(String, String)>,
) -> Result<Json<QueuePositionResponse>, ApiError> {
    let position = state
        .controller
        .position_of(&tag, &callsign)
        .await
        .ok_or_else(|| {
            ApiError::NotFound(format!("'{}' is not in the {} queue", callsign, tag))
        })?;
    Ok(Json(QueuePositionResponse { position }))
}

/// Remove an aircraft from a queue. Removing an absent callsign is a no-op.
#[utoipa::path(
    delete,
    path = "/queues/{tag}/{callsign}",
    responses(
        (status = 200, description = "Number of entries removed", body = RemovedResponse)
    ),
    params(
        ("tag" = String, Path, description = "Queue tag"),
        ("callsign" = String, Path, description = "Aircraft callsign")
    )
)]
pub async fn remove_from_queue(
    State(state): State<Arc<AppState>>,
    Path((tag, callsign)): Path<(String, String)>,
) -> Json<RemovedResponse> {
    let removed = state.controller.remove(&tag, &callsign).await;
    Json(RemovedResponse { removed })
}

/// Service health, including whether free-form replies are available.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        generator_available: state.controller.generator_available().await,
        phraseology: state.config.phraseology.to_string(),
    })
}
