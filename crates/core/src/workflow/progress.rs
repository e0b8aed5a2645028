use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::results::ResultStore;

/// Status carried by a progress update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Executing,
    Completed,
    Failed,
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Human-readable status event. Ephemeral: dropped when nobody keeps up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub ordinal: usize,
    /// `None` when the emitter doesn't know the workflow size
    pub total_steps: Option<usize>,
    pub completed: usize,
    pub status: ProgressStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Display side of the progress stream
pub trait ProgressSink: Send + Sync {
    fn on_update(&self, update: &ProgressUpdate);
}

/// Writes progress through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_update(&self, update: &ProgressUpdate) {
        let total = update
            .total_steps
            .map(|t| t.to_string())
            .unwrap_or_else(|| "?".to_string());
        tracing::info!(
            ordinal = update.ordinal,
            status = %update.status,
            "Progress: [{}/{}] {}",
            update.completed,
            total,
            update.message
        );
    }
}

/// Create the lossy progress queue and the monitor that drains it
pub fn progress_channel(capacity: usize, results: ResultStore) -> (ProgressSender, ProgressMonitor) {
    let (tx, rx) = mpsc::channel(capacity);
    let sender = ProgressSender {
        tx,
        results: results.clone(),
        dropped: Arc::new(AtomicUsize::new(0)),
    };
    let monitor = ProgressMonitor { rx, results };
    (sender, monitor)
}

/// Producer handle cloned into every worker. Never blocks.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: mpsc::Sender<ProgressUpdate>,
    results: ResultStore,
    dropped: Arc<AtomicUsize>,
}

impl ProgressSender {
    pub async fn emit(
        &self,
        ordinal: usize,
        total_steps: Option<usize>,
        status: ProgressStatus,
        message: impl Into<String>,
    ) {
        let update = ProgressUpdate {
            ordinal,
            total_steps,
            completed: self.results.len().await,
            status,
            message: message.into(),
            timestamp: Utc::now(),
        };

        if self.tx.try_send(update).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Updates discarded because the queue was full or closed
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer side: forwards queued updates to a sink and watches the result
/// store for overall completion. Purely observational.
pub struct ProgressMonitor {
    rx: mpsc::Receiver<ProgressUpdate>,
    results: ResultStore,
}

impl ProgressMonitor {
    pub fn spawn(
        self,
        total_steps: usize,
        tick: Duration,
        sink: Arc<dyn ProgressSink>,
        stop: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(total_steps, tick, sink, stop))
    }

    /// Runs until `stop` fires or every step has a result, then flushes
    /// whatever is still queued.
    pub async fn run(
        mut self,
        total_steps: usize,
        tick: Duration,
        sink: Arc<dyn ProgressSink>,
        stop: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                update = self.rx.recv() => match update {
                    Some(update) => Self::forward(sink.as_ref(), update, total_steps),
                    None => break,
                },
                _ = ticker.tick() => {
                    if self.results.len().await >= total_steps {
                        break;
                    }
                }
            }
        }

        while let Ok(update) = self.rx.try_recv() {
            Self::forward(sink.as_ref(), update, total_steps);
        }
    }

    fn forward(sink: &dyn ProgressSink, mut update: ProgressUpdate, total_steps: usize) {
        update.total_steps.get_or_insert(total_steps);
        sink.on_update(&update);
    }
}
