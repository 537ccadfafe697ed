use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::DetectionEvent;

use super::cooldown::CooldownPermit;
use super::dispatcher::{AlertDispatcher, Delivery};

type Job = (DetectionEvent, CooldownPermit);

/// Delivery counters shared between the worker thread and its handle.
#[derive(Debug, Default)]
pub struct WorkerStats {
    pub delivered: AtomicU64,
    pub failed: AtomicU64,
    pub dropped: AtomicU64,
}

/// Runs alert delivery on a dedicated thread.
///
/// The frame loop hands admitted events over a channel and never waits on the
/// network. `finish` drains the queue; `shutdown` lets the in-flight delivery
/// complete and drops everything still queued.
#[derive(Debug)]
pub struct DispatchWorker {
    tx: Option<Sender<Job>>,
    stopping: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
    join: Option<JoinHandle<()>>,
}

impl DispatchWorker {
    pub fn spawn(dispatcher: Arc<AlertDispatcher>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let stopping = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(WorkerStats::default());

        let thread_stopping = Arc::clone(&stopping);
        let thread_stats = Arc::clone(&stats);
        let join = std::thread::Builder::new()
            .name("alert-dispatch".to_string())
            .spawn(move || run_worker(dispatcher, rx, thread_stopping, thread_stats))
            .map_err(|e| anyhow!("failed to spawn alert dispatch thread: {}", e))?;

        Ok(Self {
            tx: Some(tx),
            stopping,
            stats,
            join: Some(join),
        })
    }

    /// Queues an admitted event. The permit travels with it.
    pub fn submit(&self, event: DetectionEvent, permit: CooldownPermit) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| anyhow!("alert dispatch worker already stopped"))?;
        tx.send((event, permit))
            .map_err(|_| anyhow!("alert dispatch worker exited"))
    }

    /// Shared counters that outlive the worker.
    pub fn stats_handle(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Delivers everything already queued, then joins the thread.
    pub fn finish(mut self) -> Result<()> {
        self.close()
    }

    /// Waits for the in-flight delivery, drops queued events, joins the thread.
    pub fn shutdown(mut self) -> Result<()> {
        self.stopping.store(true, Ordering::SeqCst);
        self.close()
    }

    fn close(&mut self) -> Result<()> {
        self.tx.take();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("alert dispatch thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.stopping.store(true, Ordering::SeqCst);
            if let Err(e) = self.close() {
                log::error!("{}", e);
            }
        }
    }
}

fn run_worker(
    dispatcher: Arc<AlertDispatcher>,
    rx: Receiver<Job>,
    stopping: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
) {
    for (event, permit) in rx {
        if stopping.load(Ordering::SeqCst) {
            log::debug!("dropping queued {} alert on shutdown", event.event_type);
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            drop(permit);
            continue;
        }
        match dispatcher.deliver(&event, permit) {
            Delivery::Delivered { .. } => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::Failed { .. } => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    log::debug!("alert dispatch worker exiting");
}
