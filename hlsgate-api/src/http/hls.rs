//! HLS metadata and playlist debugging
//!
//! `GET /api/hls/{stream_id}` hands players a tokenized playlist URL;
//! `GET /api/debug/{stream_id}` dumps what the worker has written so far.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use hlsgate_core::StreamStatus;
use hlsgate_livestream::PlaylistDebug;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::http::{ApiResponse, AppResult, AppState};

/// Short access token: first 16 hex chars of `sha256("{stream_id}:{unix_ts}" + secret)`.
pub fn stream_token(stream_id: &str, unix_ts: i64, secret: &str) -> String {
    let digest = Sha256::digest(format!("{stream_id}:{unix_ts}{secret}").as_bytes());
    let mut token = hex::encode(digest);
    token.truncate(16);
    token
}

#[derive(Debug, Serialize)]
pub struct HlsMetadata {
    pub stream_id: String,
    pub status: StreamStatus,
    pub hls_url: String,
    pub stream_url: String,
    pub cdn_domain: String,
    pub access_token: String,
    pub start_time: DateTime<Utc>,
    pub is_live: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_start: Option<DateTime<Utc>>,
}

/// GET /api/hls/{stream_id}
pub async fn hls_metadata(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.manager.get(&stream_id)?;
    let config = state.manager.config();

    let access_token = stream_token(&stream_id, Utc::now().timestamp(), &state.token_secret);
    let hls_url = config.public_hls_url(&stream_id);
    let metadata = HlsMetadata {
        stream_url: format!("{hls_url}?token={access_token}"),
        hls_url,
        cdn_domain: config.public_host().to_string(),
        access_token,
        is_live: snapshot.is_live(),
        stream_start: snapshot.stream_start,
        start_time: snapshot.start_time,
        status: snapshot.status,
        stream_id: snapshot.stream_id,
    };

    let status = metadata.status;
    Ok((
        [(header::CACHE_CONTROL, "no-cache")],
        ApiResponse::ok("HLS stream metadata", metadata).for_stream(stream_id, status),
    ))
}

/// GET /api/debug/{stream_id}
pub async fn playlist_debug(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> AppResult<ApiResponse<PlaylistDebug>> {
    let debug = state.manager.playlist_debug(&stream_id).await?;
    let status = debug.status;
    Ok(ApiResponse::ok("Playlist debug", debug).for_stream(stream_id, status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let token = stream_token("cam-1", 1_700_000_000, "secret");
        assert_eq!(token.len(), 16);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_token_matches_digest_prefix() {
        let full = hex::encode(Sha256::digest(b"cam-1:1700000000secret"));
        assert_eq!(stream_token("cam-1", 1_700_000_000, "secret"), full[..16]);
    }

    #[test]
    fn test_token_depends_on_inputs() {
        let base = stream_token("cam-1", 1, "s");
        assert_ne!(base, stream_token("cam-2", 1, "s"));
        assert_ne!(base, stream_token("cam-1", 2, "s"));
        assert_ne!(base, stream_token("cam-1", 1, "t"));
    }
}
