//! Alert deduplication and delivery.
//!
//! Admitted events flow `CooldownGate -> DispatchWorker -> AlertDispatcher ->
//! AlertSink`. The gate reserves an event type while a candidate is in flight
//! and only starts the cooldown window once delivery succeeds.

mod cooldown;
mod dispatcher;
mod sink;
mod worker;

pub use cooldown::{CooldownGate, CooldownPermit};
pub use dispatcher::{AlertDispatcher, Delivery, DispatchOutcome, RetryPolicy};
pub use sink::{build_sink, AlertPayload, AlertSink, HttpAlertSink, LogAlertSink};
pub use worker::{DispatchWorker, WorkerStats};
