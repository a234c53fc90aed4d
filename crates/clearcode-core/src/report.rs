//! Report payloads and their delivery to the collector.
//!
//! The flusher never talks to the network itself. It hands each payload to a
//! [`ReportSender`], which queues it for a background worker, waiting for room
//! when the queue is full. The worker sends payloads one at a time through a
//! [`ReportClient`], applying the [`RetryPolicy`]. A payload that still fails is logged and
//! discarded; nothing is persisted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Path of the push endpoint, relative to the collector base URL.
pub const PUSH_PATH: &str = "/api/v1/assignments/push";

/// One changed line attributed to one assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPayload {
    #[serde(rename = "AssignmentID")]
    pub assignment_id: String,

    #[serde(rename = "GitHubName")]
    pub identity: String,

    #[serde(rename = "GitHubLink")]
    pub repo_link: String,

    /// Base name of the edited file.
    #[serde(rename = "FilePath")]
    pub file_name: String,

    /// 1-based.
    #[serde(rename = "LineNumber")]
    pub line_number: usize,

    #[serde(rename = "LineContent")]
    pub line_content: String,

    /// RFC 3339 UTC timestamp with millisecond precision.
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

/// Current time in the `updatedAt` format, e.g. `2026-01-05T14:03:07.215Z`.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Errors delivering a single payload.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Collector returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Sends one payload.
#[async_trait]
pub trait ReportClient: Send + Sync {
    async fn send(&self, payload: &ReportPayload) -> Result<(), DeliveryError>;
}

/// Builds the shared HTTP client with a per-request timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build HTTP client, using defaults");
            reqwest::Client::new()
        })
}

/// POSTs payloads as JSON to the collector.
#[derive(Debug, Clone)]
pub struct HttpReportClient {
    client: reqwest::Client,
    url: String,
}

impl HttpReportClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), PUSH_PATH),
        }
    }

}

#[async_trait]
impl ReportClient for HttpReportClient {
    async fn send(&self, payload: &ReportPayload) -> Result<(), DeliveryError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(
            assignment = %payload.assignment_id,
            file = %payload.file_name,
            line = payload.line_number,
            "Report delivered"
        );
        Ok(())
    }
}

/// How many times a payload is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,

    /// Wait before the second attempt; doubled for each one after.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// One attempt, no retries.
    pub fn at_most_once() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(500),
        }
    }

    /// Wait before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << doublings)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::at_most_once()
    }
}

/// Sends `payload` through `client` under `policy`.
pub async fn deliver(
    client: &dyn ReportClient,
    payload: &ReportPayload,
    policy: &RetryPolicy,
) -> Result<(), DeliveryError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match client.send(payload).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => {
                let backoff = policy.backoff_after(attempt);
                warn!(
                    error = %e,
                    attempt,
                    max_attempts,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "Report delivery failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// Outcome counts of a delivery worker, returned when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: usize,
    pub dropped: usize,
}

/// Handle for queueing payloads.
#[derive(Debug, Clone)]
pub struct ReportSender {
    tx: mpsc::Sender<ReportPayload>,
}

impl ReportSender {
    /// Queues `payload` for delivery, waiting while the queue is full.
    /// Returns `false` if the worker has stopped and the payload was dropped.
    pub async fn submit(&self, payload: ReportPayload) -> bool {
        match self.tx.send(payload).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(payload)) => {
                warn!(
                    assignment = %payload.assignment_id,
                    file = %payload.file_name,
                    line = payload.line_number,
                    "Report worker stopped, dropping payload"
                );
                false
            }
        }
    }
}

pub(crate) fn report_queue(capacity: usize) -> (ReportSender, mpsc::Receiver<ReportPayload>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ReportSender { tx }, rx)
}

/// Starts the background worker. It runs until every [`ReportSender`] is
/// dropped and the queue is empty, then returns its counts.
pub fn spawn_delivery_worker(
    client: Arc<dyn ReportClient>,
    policy: RetryPolicy,
    capacity: usize,
) -> (ReportSender, JoinHandle<DeliveryStats>) {
    let (sender, mut rx) = report_queue(capacity);
    let handle = tokio::spawn(async move {
        let mut stats = DeliveryStats::default();
        while let Some(payload) = rx.recv().await {
            match deliver(client.as_ref(), &payload, &policy).await {
                Ok(()) => stats.delivered += 1,
                Err(e) => {
                    warn!(
                        error = %e,
                        assignment = %payload.assignment_id,
                        file = %payload.file_name,
                        line = payload.line_number,
                        "Report delivery failed, payload dropped"
                    );
                    stats.dropped += 1;
                }
            }
        }
        debug!(?stats, "Delivery worker stopped");
        stats
    });
    (sender, handle)
}
