//! Activity log: a best-effort record of every dispatched event.
//!
//! The engine hands an [`ActivityRecord`] to an [`ActivitySink`] on a
//! detached task. Sink failures are logged once and dropped; they never
//! affect scheduling or playback.
//!
//! [`store`] and [`server`] implement the receiving side: an HTTP service
//! that persists records to SQLite.

pub mod server;
pub mod store;

use crate::error::{BellError, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One dispatched event as sent to the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub event_type: String,
    /// Local wall-clock time, `HH:MM:SS`.
    pub event_time: String,
    pub description: String,
}

impl ActivityRecord {
    pub fn new(
        event_type: impl Into<String>,
        at: NaiveDateTime,
        description: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            event_time: at.format("%H:%M:%S").to_string(),
            description: description.into(),
        }
    }
}

/// Destination for activity records.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    /// # Errors
    ///
    /// Returns [`BellError::SinkUnavailable`] when the record could not be delivered.
    async fn record(&self, record: &ActivityRecord) -> Result<()>;
}

/// Sink that drops every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopActivitySink;

#[async_trait]
impl ActivitySink for NoopActivitySink {
    async fn record(&self, _record: &ActivityRecord) -> Result<()> {
        Ok(())
    }
}

/// Posts records as JSON to a remote endpoint.
#[derive(Debug, Clone)]
pub struct HttpActivitySink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpActivitySink {
    /// # Errors
    ///
    /// Returns [`BellError::Config`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BellError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ActivitySink for HttpActivitySink {
    async fn record(&self, record: &ActivityRecord) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .map_err(|e| BellError::SinkUnavailable(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BellError::SinkUnavailable(format!(
                "{} answered {status}",
                self.endpoint
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use chrono::NaiveDate;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn record() -> ActivityRecord {
        let at = NaiveDate::from_ymd_opt(2024, 6, 3)
            .unwrap()
            .and_hms_opt(7, 50, 0)
            .unwrap();
        ActivityRecord::new("combined_daily", at, "Blok Nasional dimainkan")
    }

    #[test]
    fn event_time_is_wall_clock_seconds() {
        assert_eq!(record().event_time, "07:50:00");
    }

    #[tokio::test]
    async fn http_sink_posts_json_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/activity-log"))
            .and(body_json(serde_json::json!({
                "event_type": "combined_daily",
                "event_time": "07:50:00",
                "description": "Blok Nasional dimainkan"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = HttpActivitySink::new(
            format!("{}/api/activity-log", server.uri()),
            Duration::from_secs(2),
        )
        .unwrap();
        sink.record(&record()).await.unwrap();
    }

    #[tokio::test]
    async fn server_error_is_sink_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let sink = HttpActivitySink::new(server.uri(), Duration::from_secs(2)).unwrap();
        let err = sink.record(&record()).await.unwrap_err();
        assert!(matches!(err, BellError::SinkUnavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_sink_unavailable() {
        // Port 9 (discard) is not listening in test environments.
        let sink =
            HttpActivitySink::new("http://127.0.0.1:9/api/activity-log", Duration::from_secs(2))
                .unwrap();
        let err = sink.record(&record()).await.unwrap_err();
        assert!(matches!(err, BellError::SinkUnavailable(_)));
    }

    #[tokio::test]
    async fn noop_sink_accepts_everything() {
        NoopActivitySink.record(&record()).await.unwrap();
    }
}
