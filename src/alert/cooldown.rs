use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::EventType;

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    last_sent: Option<Instant>,
    in_flight: bool,
}

/// Per-event-type alert deduplication.
///
/// `try_acquire` is an atomic check-and-reserve: a candidate is admitted only
/// when the type is outside its cooldown window and no other candidate of the
/// same type is in flight. The timestamp moves only when the returned permit is
/// marked delivered.
#[derive(Debug)]
pub struct CooldownGate {
    cooldown: Duration,
    slots: Mutex<HashMap<EventType, Slot>>,
}

impl CooldownGate {
    pub fn new(cooldown: Duration) -> Arc<Self> {
        Arc::new(Self {
            cooldown,
            slots: Mutex::new(HashMap::new()),
        })
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Reserves `event_type` for delivery at `now`, or returns `None` if suppressed.
    pub fn try_acquire(
        self: &Arc<Self>,
        event_type: EventType,
        now: Instant,
    ) -> Result<Option<CooldownPermit>> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow!("cooldown gate lock poisoned"))?;
        let slot = slots.entry(event_type).or_default();

        if slot.in_flight {
            return Ok(None);
        }
        if let Some(last) = slot.last_sent {
            if now.saturating_duration_since(last) < self.cooldown {
                return Ok(None);
            }
        }

        slot.in_flight = true;
        Ok(Some(CooldownPermit {
            gate: Arc::clone(self),
            event_type,
            admitted_at: now,
            delivered: false,
        }))
    }

    /// Instant of the last successful delivery for `event_type`.
    pub fn last_sent(&self, event_type: EventType) -> Option<Instant> {
        self.slots
            .lock()
            .ok()
            .and_then(|slots| slots.get(&event_type).and_then(|slot| slot.last_sent))
    }

    fn release(&self, event_type: EventType, delivered_at: Option<Instant>) {
        let Ok(mut slots) = self.slots.lock() else {
            log::error!("cooldown gate lock poisoned; {} reservation leaked", event_type);
            return;
        };
        let slot = slots.entry(event_type).or_default();
        slot.in_flight = false;
        if let Some(at) = delivered_at {
            slot.last_sent = Some(at);
        }
    }
}

/// Reservation for one in-flight candidate.
///
/// Dropping a permit without calling `mark_delivered` releases the reservation
/// and leaves the cooldown timestamp unchanged.
#[derive(Debug)]
pub struct CooldownPermit {
    gate: Arc<CooldownGate>,
    event_type: EventType,
    admitted_at: Instant,
    delivered: bool,
}

impl CooldownPermit {
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn admitted_at(&self) -> Instant {
        self.admitted_at
    }

    /// Starts the cooldown window at the admission instant.
    pub fn mark_delivered(mut self) {
        self.delivered = true;
        self.gate.release(self.event_type, Some(self.admitted_at));
    }
}

impl Drop for CooldownPermit {
    fn drop(&mut self) {
        if !self.delivered {
            self.gate.release(self.event_type, None);
        }
    }
}
