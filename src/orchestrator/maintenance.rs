//! Background housekeeping: stale lock reaping and overload warnings

use super::MaintenanceReport;
use crate::context::SharedContext;
use crate::resources::ResourceManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// A running maintenance loop
pub(crate) struct MaintenanceHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    pub(crate) fn spawn(
        context: Arc<SharedContext>,
        resources: Arc<ResourceManager>,
        period: Duration,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(maintenance_loop(context, resources, period, shutdown_rx));
        Self { shutdown, task }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the loop and wait for it to exit
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!("Maintenance task ended abnormally: {}", e);
        }
    }
}

/// One housekeeping pass
///
/// Overload is only reported; running tasks are left alone.
pub(crate) fn run_tick(context: &SharedContext, resources: &ResourceManager) -> MaintenanceReport {
    let reaped_locks = context.reap_stale_locks(context.lock_timeout());
    let overloaded = resources.is_overloaded();

    if overloaded {
        let sample = resources.system_resources();
        warn!(
            cpu_percent = sample.cpu_percent,
            memory_percent = sample.memory_percent,
            disk_percent = sample.disk_percent,
            "System resources are critically low"
        );
    }
    debug!(reaped_locks, overloaded, "Maintenance pass complete");

    MaintenanceReport {
        reaped_locks,
        overloaded,
    }
}

async fn maintenance_loop(
    context: Arc<SharedContext>,
    resources: Arc<ResourceManager>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(period_secs = period.as_secs(), "Maintenance loop started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                run_tick(&context, &resources);
            }
        }
    }

    info!("Maintenance loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{SystemProbe, SystemSample};

    struct Load(f64);

    impl SystemProbe for Load {
        fn sample(&self) -> SystemSample {
            SystemSample {
                cpu_percent: self.0,
                ..Default::default()
            }
        }
    }

    #[test]
    fn tick_reaps_and_reports_overload() {
        let context = SharedContext::in_memory(Duration::from_secs(300), 10);
        context.acquire_lock("song.logicx", "logic_ai_plugin", Duration::from_secs(300));
        context.backdate_lock("song.logicx", Duration::from_secs(301));
        let resources = ResourceManager::default().with_system_probe(Load(99.0));

        let report = run_tick(&context, &resources);
        assert_eq!(
            report,
            MaintenanceReport {
                reaped_locks: 1,
                overloaded: true
            }
        );
        assert!(context.locked_resources().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_runs_until_shutdown() {
        let context = Arc::new(SharedContext::in_memory(Duration::from_secs(300), 10));
        let resources = Arc::new(ResourceManager::default().with_system_probe(Load(5.0)));
        let handle = MaintenanceHandle::spawn(
            Arc::clone(&context),
            Arc::clone(&resources),
            Duration::from_secs(30),
        );

        context.acquire_lock("a.rs", "cline", Duration::from_secs(300));
        context.backdate_lock("a.rs", Duration::from_secs(400));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(context.locked_resources().is_empty());
        assert!(handle.is_running());

        handle.stop().await;
    }
}
