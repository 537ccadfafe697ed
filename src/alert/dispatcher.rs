use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::AlertSettings;
use crate::DetectionEvent;

use super::cooldown::{CooldownGate, CooldownPermit};
use super::sink::{AlertPayload, AlertSink};

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total delivery attempts per alert.
    pub max_retries: u32,
    /// Pause between attempts (none after the last one).
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Upper bound on time spent sleeping between attempts for one alert.
    pub fn max_backoff(&self) -> Duration {
        self.retry_delay * self.max_retries.saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { attempts: u32 },
    Suppressed,
    Failed { attempts: u32, last_error: String },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

/// Result of delivering an already admitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Delivered { attempts: u32 },
    Failed { attempts: u32, last_error: String },
}

impl From<Delivery> for DispatchOutcome {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::Delivered { attempts } => DispatchOutcome::Delivered { attempts },
            Delivery::Failed {
                attempts,
                last_error,
            } => DispatchOutcome::Failed {
                attempts,
                last_error,
            },
        }
    }
}

/// Delivers alerts through a sink with bounded retries.
///
/// Owns the cooldown gate for its pipeline. The gate timestamp moves only after
/// a successful delivery.
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
    policy: RetryPolicy,
    gate: Arc<CooldownGate>,
    dispatched: Arc<AtomicU64>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>, policy: RetryPolicy, gate: Arc<CooldownGate>) -> Self {
        Self {
            sink,
            policy,
            gate,
            dispatched: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_settings(sink: Arc<dyn AlertSink>, settings: &AlertSettings) -> Self {
        Self::new(
            sink,
            RetryPolicy {
                max_retries: settings.max_retries,
                retry_delay: settings.retry_delay,
            },
            CooldownGate::new(settings.cooldown),
        )
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn gate(&self) -> &Arc<CooldownGate> {
        &self.gate
    }

    /// Total alerts delivered so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Shared handle to the delivered-alert counter.
    pub fn dispatched_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dispatched)
    }

    /// Cooldown admission for `event` at `now`.
    pub fn admit(&self, event: &DetectionEvent, now: Instant) -> Result<Option<CooldownPermit>> {
        let permit = self.gate.try_acquire(event.event_type, now)?;
        if permit.is_none() {
            log::debug!(
                "alert suppressed by cooldown: {} (frame {})",
                event.event_type,
                event.frame_number
            );
        }
        Ok(permit)
    }

    /// Admission followed by delivery, on the calling thread.
    pub fn send(&self, event: &DetectionEvent) -> Result<DispatchOutcome> {
        match self.admit(event, Instant::now())? {
            Some(permit) => Ok(self.deliver(event, permit).into()),
            None => Ok(DispatchOutcome::Suppressed),
        }
    }

    /// Attempts delivery of an admitted event, sleeping between attempts.
    ///
    /// Blocks the calling thread for up to `policy.max_backoff()` plus the
    /// sink's own timeouts.
    pub fn deliver(&self, event: &DetectionEvent, permit: CooldownPermit) -> Delivery {
        let payload = AlertPayload::from(event);
        let max_attempts = self.policy.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.sink.deliver(&payload) {
                Ok(()) => {
                    permit.mark_delivered();
                    self.dispatched.fetch_add(1, Ordering::Relaxed);
                    log::info!(
                        "alert sent via {}: {} (attempt {})",
                        self.sink.name(),
                        event.event_type,
                        attempt
                    );
                    return Delivery::Delivered { attempts: attempt };
                }
                Err(err) => {
                    log::warn!(
                        "alert delivery failed: {} (attempt {}/{}): {}",
                        event.event_type,
                        attempt,
                        max_attempts,
                        err
                    );
                    last_error = err.to_string();
                }
            }
            if attempt < max_attempts {
                std::thread::sleep(self.policy.retry_delay);
            }
        }

        log::error!(
            "failed to send alert after {} attempts: {}",
            max_attempts,
            event.event_type
        );
        // Dropping the permit releases the reservation without a timestamp.
        drop(permit);
        Delivery::Failed {
            attempts: max_attempts,
            last_error,
        }
    }
}
