//! # Notifier
//!
//! Outbound technician pages and the shape of inbound replies.
//!
//! Pages are fire-and-forget: [`Notifier::page`] spawns a task that runs
//! the send under its own retry budget and returns immediately. Dispatch
//! state never depends on whether a page was delivered; claims are driven
//! only by inbound replies.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use url::Url;

use triage_core::{DispatchId, Technician};
use triage_state::DispatchRecord;

/// Maximum number of retry attempts after the initial send.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay between retries (doubles each attempt: 200ms, 400ms, 800ms).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Per-attempt send timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Failure to hand a message to the SMS provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("SMS transport error: {0}")]
    Transport(String),

    #[error("SMS send timed out after {0:?}")]
    Timeout(Duration),

    #[error("SMS provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("SMS gateway misconfigured: {0}")]
    Config(String),
}

impl NotifyError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
            Self::Config(_) => false,
        }
    }
}

/// Outbound SMS channel.
#[async_trait]
pub trait SmsGateway: Send + Sync + 'static {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError>;
}

// -- HTTP gateway -------------------------------------------------------------

/// Posts `{"to", "body"}` as JSON to a provider endpoint.
#[derive(Clone)]
pub struct HttpSmsGateway {
    client: reqwest::Client,
    url: Url,
    token: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpSmsGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSmsGateway")
            .field("url", &self.url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct SmsRequest<'a> {
    to: &'a str,
    body: &'a str,
}

impl HttpSmsGateway {
    pub fn new(url: Url, token: Option<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?;
        Ok(Self {
            client,
            url,
            token,
            timeout,
        })
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        let mut request = self
            .client
            .post(self.url.clone())
            .json(&SmsRequest { to, body });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NotifyError::Timeout(self.timeout)
            } else {
                NotifyError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

// -- Development gateways -----------------------------------------------------

/// Logs messages instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogGateway;

#[async_trait]
impl SmsGateway for LogGateway {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        tracing::info!(to, body, "SMS (log gateway, not sent)");
        Ok(())
    }
}

/// A message captured by [`OutboxGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundSms {
    pub to: String,
    pub body: String,
}

/// Collects messages in memory. Can be told to fail the next sends.
#[derive(Debug, Clone, Default)]
pub struct OutboxGateway {
    sent: Arc<Mutex<Vec<OutboundSms>>>,
    failures: Arc<Mutex<Vec<NotifyError>>>,
}

impl OutboxGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages accepted so far, in send order.
    pub fn sent(&self) -> Vec<OutboundSms> {
        self.sent.lock().clone()
    }

    /// Messages accepted for `to`.
    pub fn sent_to(&self, to: &str) -> Vec<OutboundSms> {
        self.sent.lock().iter().filter(|m| m.to == to).cloned().collect()
    }

    /// Fail the next sends with these errors, in order.
    pub fn fail_next(&self, errors: impl IntoIterator<Item = NotifyError>) {
        let mut failures = self.failures.lock();
        failures.extend(errors);
    }
}

#[async_trait]
impl SmsGateway for OutboxGateway {
    async fn send(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        {
            let mut failures = self.failures.lock();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }
        self.sent.lock().push(OutboundSms {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

// -- Retry --------------------------------------------------------------------

/// Retry budget for a single outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

/// Send with exponential backoff on transient failures.
///
/// The gateway is called up to `max_retries + 1` times. Permanent
/// failures (4xx, misconfiguration) are returned without retry.
pub async fn send_with_retry(
    gateway: &dyn SmsGateway,
    to: &str,
    body: &str,
    policy: &RetryPolicy,
) -> Result<(), NotifyError> {
    let mut attempt = 0;
    loop {
        let result = match tokio::time::timeout(policy.attempt_timeout, gateway.send(to, body)).await
        {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(policy.attempt_timeout)),
        };
        match result {
            Ok(()) => return Ok(()),
            Err(e) if !e.is_transient() || attempt >= policy.max_retries => return Err(e),
            Err(e) => {
                let delay = policy.base_delay * 2u32.pow(attempt);
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    "SMS send failed, retrying in {delay:?}: {e}"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

// -- Notifier -----------------------------------------------------------------

/// Text of a technician page.
pub fn page_body(record: &DispatchRecord) -> String {
    format!(
        "[{}] Dispatch {}: {} Customer: {}. Reply ACCEPT or DECLINE.",
        record.triage.headline(),
        record.id,
        record.summary,
        record.customer_phone,
    )
}

/// Sends pages through an [`SmsGateway`] under a [`RetryPolicy`].
#[derive(Clone)]
pub struct Notifier {
    gateway: Arc<dyn SmsGateway>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    pub fn new(gateway: Arc<dyn SmsGateway>, policy: RetryPolicy) -> Self {
        Self { gateway, policy }
    }

    pub fn gateway(&self) -> Arc<dyn SmsGateway> {
        Arc::clone(&self.gateway)
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Page `technician` about `record` on a background task.
    ///
    /// The returned handle may be dropped; the task keeps running.
    pub fn page(&self, technician: &Technician, record: &DispatchRecord) -> JoinHandle<()> {
        let gateway = Arc::clone(&self.gateway);
        let policy = self.policy;
        let to = technician.phone.clone();
        let technician_id = technician.id.clone();
        let dispatch_id = record.id;
        let body = page_body(record);

        tokio::spawn(async move {
            match send_with_retry(gateway.as_ref(), &to, &body, &policy).await {
                Ok(()) => {
                    metrics::counter!("triage_pages_sent_total").increment(1);
                    tracing::info!(
                        dispatch_id = %dispatch_id,
                        technician_id = %technician_id,
                        "technician paged"
                    );
                }
                Err(e) => {
                    metrics::counter!("triage_pages_failed_total").increment(1);
                    tracing::warn!(
                        dispatch_id = %dispatch_id,
                        technician_id = %technician_id,
                        error = %e,
                        "technician page failed, awaiting claim deadline"
                    );
                }
            }
        })
    }
}

// -- Inbound replies ----------------------------------------------------------

/// What a technician answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplyVerb {
    Accept,
    Decline,
}

impl std::str::FromStr for ReplyVerb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACCEPT" => Ok(Self::Accept),
            "DECLINE" => Ok(Self::Decline),
            other => Err(format!("unknown reply verb: {other}")),
        }
    }
}

impl std::fmt::Display for ReplyVerb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Accept => "ACCEPT",
            Self::Decline => "DECLINE",
        })
    }
}

/// An inbound technician reply, routed to the coordinator's claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TechnicianReply {
    pub dispatch_id: DispatchId,
    /// Sender phone as received; normalized on lookup.
    pub from: String,
    pub verb: ReplyVerb,
}
