//! HTTP delivery to the survey collector.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Serialize;
use tracing::debug;

use sampler_core::{SurveyRecord, SurveyResponse};
use sampler_delivery::{DeliveryOutcome, RemoteTransport};

/// Collector timestamps are ISO-8601 with millisecond precision and no
/// trailing `Z`.
const DATE_TAKEN_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid collector url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("failed to build http client: {0}")]
    Client(String),
}

#[derive(Debug, Serialize)]
struct CollectorPayload<'a> {
    date_taken: String,
    participant_id: &'a str,
    responses: &'a [SurveyResponse],
    survey_type: &'a str,
}

impl<'a> CollectorPayload<'a> {
    fn from_record(record: &'a SurveyRecord) -> Self {
        Self {
            date_taken: record.date_taken.format(DATE_TAKEN_FORMAT).to_string(),
            participant_id: record.participant_id.as_str(),
            responses: &record.responses,
            survey_type: record.survey_type.as_str(),
        }
    }
}

/// POSTs survey records as JSON. Only `204 No Content` counts as delivered.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TransportError> {
        let endpoint = Url::parse(endpoint).map_err(|e| TransportError::InvalidUrl {
            url: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl {
                url: endpoint.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn send(&self, record: &SurveyRecord) -> DeliveryOutcome {
        let payload = CollectorPayload::from_record(record);
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(resp) if resp.status() == StatusCode::NO_CONTENT => DeliveryOutcome::Success,
            Ok(resp) => {
                let status = resp.status().as_u16();
                debug!(endpoint = %self.endpoint, status, "collector refused survey");
                DeliveryOutcome::Failure {
                    status: Some(status),
                }
            }
            Err(e) => {
                debug!(
                    endpoint = %self.endpoint,
                    timeout = e.is_timeout(),
                    error = %e,
                    "collector unreachable"
                );
                DeliveryOutcome::Failure {
                    status: e.status().map(|s| s.as_u16()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{extract::State, http::StatusCode as AxumStatus, routing::post, Json, Router};
    use chrono::{TimeZone, Utc};
    use sampler_core::SurveyType;

    use super::*;

    #[derive(Clone, Default)]
    struct Collector {
        bodies: Arc<Mutex<Vec<serde_json::Value>>>,
        status: Arc<Mutex<u16>>,
        delay: Arc<Mutex<Option<Duration>>>,
    }

    async fn submit(
        State(collector): State<Collector>,
        Json(body): Json<serde_json::Value>,
    ) -> AxumStatus {
        collector.bodies.lock().unwrap().push(body);
        let delay = *collector.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let status = *collector.status.lock().unwrap();
        AxumStatus::from_u16(status).unwrap()
    }

    async fn spawn_collector(status: u16) -> (String, Collector) {
        let collector = Collector::default();
        *collector.status.lock().unwrap() = status;

        let app = Router::new()
            .route("/submitsurvey", post(submit))
            .with_state(collector.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/submitsurvey"), collector)
    }

    fn record() -> SurveyRecord {
        SurveyRecord::new(
            SurveyType::Setup,
            "P1".parse().unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 15).unwrap()
                + chrono::Duration::milliseconds(250),
            vec![SurveyResponse::new("q1", "a1"), SurveyResponse::new("q2", "a2")],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn no_content_is_success_and_body_matches_collector_format() {
        let (url, collector) = spawn_collector(204).await;
        let transport = HttpTransport::new(&url, Duration::from_secs(4)).unwrap();

        assert_eq!(transport.send(&record()).await, DeliveryOutcome::Success);

        let bodies = collector.bodies.lock().unwrap().clone();
        assert_eq!(
            bodies,
            vec![serde_json::json!({
                "date_taken": "2024-05-01T09:30:15.250",
                "participant_id": "P1",
                "responses": [
                    {"question": "q1", "answer": "a1"},
                    {"question": "q2", "answer": "a2"},
                ],
                "survey_type": "setup",
            })]
        );
    }

    #[tokio::test]
    async fn other_statuses_fail_with_status() {
        for status in [200u16, 500] {
            let (url, _) = spawn_collector(status).await;
            let transport = HttpTransport::new(&url, Duration::from_secs(4)).unwrap();
            assert_eq!(
                transport.send(&record()).await,
                DeliveryOutcome::Failure {
                    status: Some(status)
                }
            );
        }
    }

    #[tokio::test]
    async fn timeout_fails_without_status() {
        let (url, collector) = spawn_collector(204).await;
        *collector.delay.lock().unwrap() = Some(Duration::from_secs(2));
        let transport = HttpTransport::new(&url, Duration::from_millis(100)).unwrap();

        assert_eq!(
            transport.send(&record()).await,
            DeliveryOutcome::Failure { status: None }
        );
    }

    #[test]
    fn rejects_non_http_endpoints() {
        assert!(matches!(
            HttpTransport::new("ftp://collector.example/submit", Duration::from_secs(4)),
            Err(TransportError::InvalidUrl { .. })
        ));
        assert!(matches!(
            HttpTransport::new("not a url", Duration::from_secs(4)),
            Err(TransportError::InvalidUrl { .. })
        ));
    }
}
