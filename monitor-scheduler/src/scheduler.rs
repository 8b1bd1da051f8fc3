use monitor_core::{Error, Result, config::WorkerConfig};
use std::{sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::JobScheduler;
use tracing::{debug, error, info, warn};

use crate::{
    rotation::LogRotator,
    ticker::{TickSource, repeated_job, tick_channel},
    worker::CheckWorker,
};

/// Owns the timers and the two background loops: probing checks and
/// rotating logs. The loops share no state and may overlap in time.
pub struct MonitorScheduler {
    worker: Arc<CheckWorker>,
    rotator: Arc<LogRotator>,
    scheduler: JobScheduler,
    check_interval: Duration,
    rotation_interval: Duration,
    loops: Vec<JoinHandle<()>>,
}

impl MonitorScheduler {
    pub async fn new(
        worker: Arc<CheckWorker>,
        rotator: Arc<LogRotator>,
        config: &WorkerConfig,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| Error::scheduler(e.to_string()))?;

        Ok(Self {
            worker,
            rotator,
            scheduler,
            check_interval: config.check_interval(),
            rotation_interval: config.log_rotation_interval(),
            loops: Vec::new(),
        })
    }

    /// Start both loops. Checks are probed and logs rotated once right away,
    /// then on their own intervals.
    pub async fn start(&mut self) -> Result<()> {
        info!(
            check_interval_secs = self.check_interval.as_secs(),
            rotation_interval_secs = self.rotation_interval.as_secs(),
            "Starting monitor scheduler"
        );

        let (check_ticks, check_source) = tick_channel();
        let (rotation_ticks, rotation_source) = tick_channel();

        self.scheduler
            .add(repeated_job(self.check_interval, check_ticks.clone())?)
            .await
            .map_err(|e| Error::scheduler(e.to_string()))?;
        self.scheduler
            .add(repeated_job(self.rotation_interval, rotation_ticks.clone())?)
            .await
            .map_err(|e| Error::scheduler(e.to_string()))?;
        self.scheduler
            .start()
            .await
            .map_err(|e| Error::scheduler(e.to_string()))?;

        check_ticks.fire();
        rotation_ticks.fire();

        self.loops.push(tokio::spawn(run_check_loop(self.worker.clone(), check_source)));
        self.loops.push(tokio::spawn(run_rotation_loop(self.rotator.clone(), rotation_source)));

        info!("Monitor scheduler started successfully");
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping monitor scheduler");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| Error::scheduler(e.to_string()))?;
        for handle in self.loops.drain(..) {
            handle.abort();
        }
        info!("Monitor scheduler stopped");
        Ok(())
    }
}

/// Start a tick of check pipelines for every tick received. Never waits on a
/// tick's probes before accepting the next tick.
pub async fn run_check_loop(worker: Arc<CheckWorker>, mut ticks: impl TickSource) {
    while ticks.next_tick().await.is_some() {
        let handle = match worker.spawn_tick().await {
            Ok(handle) => handle,
            Err(e) => {
                error!("could not enumerate checks, skipping tick: {}", e);
                continue;
            }
        };

        debug!(started = handle.started(), "check tick started");
        tokio::spawn(async move {
            let (_, summary) = handle.join().await;
            info!(
                probed = summary.probed,
                in_flight = summary.in_flight,
                rejected = summary.rejected,
                read_failed = summary.read_failed,
                alerts = summary.alerts,
                commit_failures = summary.commit_failures,
                "check tick finished"
            );
        });
    }
    debug!("check tick source closed");
}

/// Rotate logs once per tick received.
pub async fn run_rotation_loop(rotator: Arc<LogRotator>, mut ticks: impl TickSource) {
    while ticks.next_tick().await.is_some() {
        if let Err(e) = rotator.rotate().await {
            warn!("could not find any logs to rotate: {}", e);
        }
    }
    debug!("rotation tick source closed");
}
