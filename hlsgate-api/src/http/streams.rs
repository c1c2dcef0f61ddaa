//! Stream control endpoints
//!
//! `POST /api/streams` starts or stops a stream, `GET` lists and describes them.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use hlsgate_core::StreamStatus;
use hlsgate_livestream::{StartSummary, StopSummary, StreamDetail, StreamSnapshot};
use serde::Deserialize;
use tracing::info;

use crate::http::{ApiResponse, AppError, AppResult, AppState};

/// Body of `POST /api/streams`
#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    #[serde(alias = "streamID", alias = "streamId")]
    pub stream_id: String,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    Start,
    Stop,
}

impl StreamAction {
    pub fn parse(action: &str) -> AppResult<Self> {
        match action.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            other => Err(AppError::bad_request(format!(
                "Unknown action '{other}', supported actions: start, stop"
            ))),
        }
    }
}

/// Start/stop result, tagged by what happened.
#[derive(Debug, serde::Serialize)]
#[serde(untagged)]
pub enum ControlResult {
    Started(StartSummary),
    Stopped(StopSummary),
}

/// POST /api/streams
pub async fn control_stream(
    State(state): State<AppState>,
    body: Result<Json<StreamRequest>, JsonRejection>,
) -> AppResult<ApiResponse<ControlResult>> {
    let Json(req) = body.map_err(|e| AppError::bad_request(format!("Invalid request body: {}", e.body_text())))?;
    let action = StreamAction::parse(&req.action)?;

    info!(stream_id = %req.stream_id, ?action, "Stream control request");
    match action {
        StreamAction::Start => {
            let summary = state.manager.start(&req.stream_id).await?;
            Ok(ApiResponse::ok("Stream started", ControlResult::Started(summary))
                .for_stream(req.stream_id, StreamStatus::Starting))
        }
        StreamAction::Stop => {
            let summary = state.manager.stop(&req.stream_id).await?;
            Ok(ApiResponse::ok("Stream stopped", ControlResult::Stopped(summary))
                .for_stream(req.stream_id, StreamStatus::Stopped))
        }
    }
}

/// GET /api/streams
pub async fn list_streams(State(state): State<AppState>) -> ApiResponse<Vec<StreamSnapshot>> {
    let streams = state.manager.list();
    ApiResponse::ok(format!("Found {} stream(s)", streams.len()), streams)
}

/// GET /api/streams/{stream_id}
pub async fn get_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> AppResult<ApiResponse<StreamDetail>> {
    let detail = state.manager.detail(&stream_id)?;
    let status = detail.snapshot.status;
    Ok(ApiResponse::ok("Stream details", detail).for_stream(stream_id, status))
}
