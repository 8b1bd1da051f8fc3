use monitor_core::{
    config::Config,
    logging,
    logs::{FileLogSink, LogSink},
    notify::{LogNotifier, Notifier, TwilioNotifier},
    store::{FileStore, RecordStore},
    Result,
};
use monitor_scheduler::{
    clock::{Clock, SystemClock},
    probe::{HttpTransport, ProbeExecutor},
    rotation::LogRotator,
    CheckWorker, MonitorScheduler,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();

    let config = Config::from_env()?;
    info!("Starting Monitor Scheduler with config: {:?}", config);

    let store = FileStore::new(config.storage.data_dir.clone());
    store.init().await?;
    let logs = FileLogSink::new(config.storage.log_dir.clone());
    logs.init().await?;
    info!("Storage directories ready");

    let notifier: Arc<dyn Notifier> = match config.twilio.clone() {
        Some(twilio) => Arc::new(TwilioNotifier::new(twilio)?),
        None => {
            warn!("Twilio is not configured, alerts will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let store: Arc<dyn RecordStore> = Arc::new(store);
    let logs: Arc<dyn LogSink> = Arc::new(logs);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let executor = ProbeExecutor::new(Arc::new(HttpTransport::new()?));

    let worker = Arc::new(CheckWorker::new(store, logs.clone(), notifier, executor, clock.clone()));
    let rotator = Arc::new(LogRotator::new(logs, clock));

    let mut scheduler = MonitorScheduler::new(worker, rotator, &config.worker).await?;
    scheduler.start().await?;

    info!("Background workers are running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received");
    scheduler.stop().await?;

    Ok(())
}
