//! HTTP transport against the session backend.
//!
//! Reliable sends are plain awaited requests. Final sends are the
//! `sendBeacon` analog: detached, bounded by a short timeout, outcome never
//! observed by the caller.

use beacon_protocol::{
    CreateReply, CreateSession, SessionTransport, SessionUpdate, TrackerError, TrackerResult,
};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Final sends race page teardown; anything slower than this is lost anyway.
const FINAL_SEND_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    /// Full URL of the sessions endpoint, e.g. `https://host/api/sessions`.
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    fn classify_status(status: StatusCode, body: String) -> TrackerError {
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            TrackerError::UnknownSession
        } else if status.is_client_error() {
            TrackerError::Rejected(format!("{status}: {body}"))
        } else {
            TrackerError::Network(format!("unexpected status {status}"))
        }
    }
}

#[async_trait::async_trait]
impl SessionTransport for HttpTransport {
    async fn create(&self, request: CreateSession) -> TrackerResult<CreateReply> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|error| TrackerError::Network(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }
        response
            .json()
            .await
            .map_err(|error| TrackerError::Network(format!("create reply unreadable: {error}")))
    }

    async fn update(&self, update: SessionUpdate) -> TrackerResult<()> {
        let response = self
            .client
            .put(&self.endpoint)
            .json(&update)
            .send()
            .await
            .map_err(|error| TrackerError::Network(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, body));
        }
        Ok(())
    }

    fn send_final(&self, update: SessionUpdate) {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            let outcome = client
                .put(&endpoint)
                .timeout(FINAL_SEND_TIMEOUT)
                .json(&update)
                .send()
                .await;
            if let Err(error) = outcome {
                debug!(%error, "final update send failed");
            }
        });
    }

    fn create_final(&self, request: CreateSession) {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            let outcome = client
                .post(&endpoint)
                .timeout(FINAL_SEND_TIMEOUT)
                .json(&request)
                .send()
                .await;
            if let Err(error) = outcome {
                debug!(%error, "final create send failed");
            }
        });
    }
}
