use anyhow::{anyhow, Result};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AlertSettings;
use crate::{DetectionEvent, EventType};

/// JSON body delivered to the alert ingestion endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub event_type: EventType,
    pub confidence: f32,
    /// RFC 3339 / ISO-8601, UTC.
    pub timestamp: String,
    pub frame_number: u64,
    pub person_count: usize,
    pub description: String,
    pub location: String,
}

impl From<&DetectionEvent> for AlertPayload {
    fn from(event: &DetectionEvent) -> Self {
        Self {
            event_type: event.event_type,
            confidence: event.confidence,
            timestamp: event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            frame_number: event.frame_number,
            person_count: event.person_count,
            description: event.description.clone(),
            location: event.location.clone(),
        }
    }
}

/// Delivery boundary for alerts.
///
/// A single call is one delivery attempt. Retrying is the dispatcher's job, so
/// implementations must not retry internally. Any `Err` counts as a failed
/// attempt.
pub trait AlertSink: Send + Sync {
    /// Sink identifier for logs.
    fn name(&self) -> &'static str;

    fn deliver(&self, payload: &AlertPayload) -> Result<()>;
}

/// POSTs alerts as JSON. Any 2xx response is a success.
pub struct HttpAlertSink {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpAlertSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.into();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(anyhow!(
                "alert endpoint must be an http:// or https:// url, got '{}'",
                endpoint
            ));
        }
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self { endpoint, agent })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl AlertSink for HttpAlertSink {
    fn name(&self) -> &'static str {
        "http"
    }

    fn deliver(&self, payload: &AlertPayload) -> Result<()> {
        let body = serde_json::to_string(payload)?;
        match self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_string(&body)
        {
            Ok(response) if (200..300).contains(&response.status()) => Ok(()),
            Ok(response) => Err(anyhow!(
                "alert endpoint returned status {}",
                response.status()
            )),
            Err(ureq::Error::Status(code, _)) => {
                Err(anyhow!("alert endpoint returned status {}", code))
            }
            Err(err) => Err(anyhow!("alert endpoint unreachable: {}", err)),
        }
    }
}

/// HTTP sink when an endpoint is configured, log sink otherwise.
pub fn build_sink(settings: &AlertSettings) -> Result<Arc<dyn AlertSink>> {
    match settings.endpoint.as_deref() {
        Some(endpoint) => {
            let sink = HttpAlertSink::new(endpoint, settings.timeout)?;
            log::info!("alerts will be posted to {}", sink.endpoint());
            Ok(Arc::new(sink))
        }
        None => {
            log::info!("no alert endpoint configured; alerts go to the log");
            Ok(Arc::new(LogAlertSink::new()))
        }
    }
}

/// Writes alerts to the log. Used when no endpoint is configured.
#[derive(Default)]
pub struct LogAlertSink;

impl LogAlertSink {
    pub fn new() -> Self {
        Self
    }
}

impl AlertSink for LogAlertSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn deliver(&self, payload: &AlertPayload) -> Result<()> {
        log::warn!(
            "ALERT {} at {} frame={} people={} conf={:.2}: {}",
            payload.event_type,
            payload.location,
            payload.frame_number,
            payload.person_count,
            payload.confidence,
            payload.description
        );
        Ok(())
    }
}
