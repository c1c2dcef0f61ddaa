//! HTTP client for the system of record.

use std::time::Duration;

use async_trait::async_trait;
use hlsgate_core::StreamStatus;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("request to system of record failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("system of record answered {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected response from system of record: {0}")]
    Decode(String),
}

/// Body of a status update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub stream_id: String,
    pub status: StreamStatus,
}

/// Stream row as returned by the status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedStream {
    #[serde(default)]
    pub id: u64,
    pub stream_id: String,
    #[serde(default)]
    pub name: String,
    /// Kept as text so an unknown value does not fail the whole query
    pub stream_status: String,
}

impl RecordedStream {
    pub fn status(&self) -> Option<StreamStatus> {
        self.stream_status.parse().ok()
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Option<Vec<RecordedStream>>,
}

/// Canonical store of stream status.
#[async_trait]
pub trait SystemOfRecord: Send + Sync {
    /// Streams whose recorded status equals `status`.
    async fn list_by_status(&self, status: StreamStatus) -> Result<Vec<RecordedStream>, RecordError>;

    /// Idempotent write of the current status of one stream.
    async fn update_status(&self, stream_id: &str, status: StreamStatus) -> Result<(), RecordError>;
}

/// [`SystemOfRecord`] reached over its internal HTTP API.
#[derive(Debug, Clone)]
pub struct HttpSystemOfRecord {
    client: Client,
    base_url: String,
    update_timeout: Duration,
    query_timeout: Duration,
}

impl HttpSystemOfRecord {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RecordError> {
        let client = Client::builder().user_agent("hlsgate").build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            update_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(10),
        })
    }

    #[must_use]
    pub const fn with_timeouts(mut self, update: Duration, query: Duration) -> Self {
        self.update_timeout = update;
        self.query_timeout = query;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn rejected(resp: reqwest::Response) -> RecordError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        RecordError::Rejected { status, body }
    }
}

#[async_trait]
impl SystemOfRecord for HttpSystemOfRecord {
    async fn list_by_status(&self, status: StreamStatus) -> Result<Vec<RecordedStream>, RecordError> {
        let resp = self
            .client
            .get(format!("{}/api/tasks", self.base_url))
            .query(&[("stream_status", status.as_str())])
            .timeout(self.query_timeout)
            .send()
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(Self::rejected(resp).await);
        }

        let body: QueryResponse = resp
            .json()
            .await
            .map_err(|e| RecordError::Decode(e.to_string()))?;
        let streams = body.data.unwrap_or_default();
        debug!(
            status = %status,
            count = streams.len(),
            message = %body.message,
            "Queried system of record"
        );
        Ok(streams)
    }

    async fn update_status(&self, stream_id: &str, status: StreamStatus) -> Result<(), RecordError> {
        let update = StatusUpdate {
            stream_id: stream_id.to_string(),
            status,
        };
        let resp = self
            .client
            .post(format!("{}/api/internal/stream-status", self.base_url))
            .json(&update)
            .timeout(self.update_timeout)
            .send()
            .await?;

        if resp.status() == StatusCode::OK {
            Ok(())
        } else {
            Err(Self::rejected(resp).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_update_status_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/internal/stream-status"))
            .and(body_json(serde_json::json!({"stream_id": "cam-1", "status": "running"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpSystemOfRecord::new(server.uri()).unwrap();
        client.update_status("cam-1", StreamStatus::Running).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_status_non_200_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid status transition"))
            .mount(&server)
            .await;

        let client = HttpSystemOfRecord::new(format!("{}/", server.uri())).unwrap();
        let err = client
            .update_status("cam-1", StreamStatus::Running)
            .await
            .unwrap_err();
        match err {
            RecordError::Rejected { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body, "invalid status transition");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .and(query_param("stream_status", "starting"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "ok",
                "data": [
                    {"id": 1, "stream_id": "a", "name": "Camera A", "stream_status": "starting"},
                    {"id": 2, "stream_id": "b", "name": "Camera B", "stream_status": "paused"}
                ]
            })))
            .mount(&server)
            .await;

        let client = HttpSystemOfRecord::new(server.uri()).unwrap();
        let streams = client.list_by_status(StreamStatus::Starting).await.unwrap();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].stream_id, "a");
        assert_eq!(streams[0].status(), Some(StreamStatus::Starting));
        assert_eq!(streams[1].status(), None);
    }

    #[tokio::test]
    async fn test_list_by_status_null_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tasks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"message": "ok", "data": null})),
            )
            .mount(&server)
            .await;

        let client = HttpSystemOfRecord::new(server.uri()).unwrap();
        assert!(client.list_by_status(StreamStatus::Running).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_status_bad_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = HttpSystemOfRecord::new(server.uri()).unwrap();
        assert!(matches!(
            client.list_by_status(StreamStatus::Running).await,
            Err(RecordError::Decode(_))
        ));
    }
}
