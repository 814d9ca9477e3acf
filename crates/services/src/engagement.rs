use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::lesson::{Activation, EngagementReport, SessionController};

/// Periodic engagement tick for one activation of a vocabulary task.
///
/// Stops by itself once the activation goes stale, the task completes, or the
/// required time is reached. Dropping the ticker aborts it.
pub struct EngagementTicker {
    handle: JoinHandle<()>,
    reports: watch::Receiver<Option<EngagementReport>>,
}

impl EngagementTicker {
    /// Start ticking every `interval`; the first tick comes one interval from now.
    #[must_use]
    pub fn spawn(
        controller: Arc<Mutex<SessionController>>,
        activation: Activation,
        interval: Duration,
    ) -> Self {
        let (tx, reports) = watch::channel(None);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let report = controller.lock().await.engagement_tick(activation);
                let Some(report) = report else {
                    tracing::debug!(
                        task_id = %activation.task_id(),
                        generation = activation.generation(),
                        "engagement ticker stopped"
                    );
                    break;
                };
                let reached = report.tick.reached;
                tx.send_replace(Some(report));
                if reached {
                    break;
                }
            }
        });
        Self { handle, reports }
    }

    /// Latest report, updated on every tick.
    #[must_use]
    pub fn reports(&self) -> watch::Receiver<Option<EngagementReport>> {
        self.reports.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for EngagementTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
