// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::monitor::Monitor;

/// Handle to the periodic refresh task.
///
/// Cancelling stops future ticks only; a cycle that already started runs in
/// its own task and finishes normally.
pub struct SchedulerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn cancel(&self) {
        let _ = self.stop.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.stop.borrow()
    }

    /// Cancel and wait for the ticker loop to exit.
    pub async fn shutdown(self) {
        self.cancel();
        let _ = self.task.await;
    }
}

fn spawn_cycle(monitor: &Arc<Monitor>) {
    let m = Arc::clone(monitor);
    tokio::spawn(async move {
        match m.refresh().await {
            Ok(state) => tracing::info!(
                target: "scheduler",
                generation = state.generation,
                "scheduled refresh done"
            ),
            Err(e) => tracing::warn!(target: "scheduler", error = %e, "scheduled refresh failed"),
        }
    });
}

/// Spawn a ticker that starts a refresh cycle every `interval`, the first one
/// immediately. Each cycle runs as an independent task.
///
/// Dropping the handle without calling [`SchedulerHandle::cancel`] detaches
/// the ticker; it then runs for the life of the runtime.
pub fn spawn_refresh_scheduler(monitor: Arc<Monitor>, interval: Duration) -> SchedulerHandle {
    let (stop, mut stopped) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut detached = false;
        loop {
            tokio::select! {
                _ = ticker.tick() => spawn_cycle(&monitor),
                changed = stopped.changed(), if !detached => match changed {
                    Ok(()) if *stopped.borrow() => {
                        tracing::info!(target: "scheduler", "refresh scheduler stopped");
                        break;
                    }
                    Ok(()) => {}
                    // Handle dropped without cancel: keep ticking.
                    Err(_) => detached = true,
                },
            }
        }
    });

    SchedulerHandle { stop, task }
}
