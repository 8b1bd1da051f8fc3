//! Tick sources driving the probe and rotation loops.
//!
//! Loops only see a [`TickSource`]. In production the ticks come from
//! `tokio-cron-scheduler` jobs; tests push them by hand.

use async_trait::async_trait;
use monitor_core::{Error, Result};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_cron_scheduler::Job;
use tracing::debug;

#[async_trait]
pub trait TickSource: Send {
    /// Wait for the next tick. `None` once no more ticks will come.
    async fn next_tick(&mut self) -> Option<()>;
}

/// Sending half of a tick channel.
#[derive(Debug, Clone)]
pub struct TickSender {
    tx: mpsc::Sender<()>,
}

impl TickSender {
    /// Fire a tick. If one is already pending it is not queued twice and
    /// `false` is returned.
    pub fn fire(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("tick already pending, dropping this one");
                false
            }
            Err(TrySendError::Closed(())) => false,
        }
    }
}

pub struct ChannelTicks {
    rx: mpsc::Receiver<()>,
}

#[async_trait]
impl TickSource for ChannelTicks {
    async fn next_tick(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

/// A tick channel holding at most one pending tick.
pub fn tick_channel() -> (TickSender, ChannelTicks) {
    let (tx, rx) = mpsc::channel(1);
    (TickSender { tx }, ChannelTicks { rx })
}

/// A scheduler job that fires `ticks` every `every`.
pub fn repeated_job(every: Duration, ticks: TickSender) -> Result<Job> {
    Job::new_repeated_async(every, move |_uuid, _l| {
        let ticks = ticks.clone();
        Box::pin(async move {
            ticks.fire();
        })
    })
    .map_err(|e| Error::scheduler(e.to_string()))
}
