//! Check cycle orchestration.
//!
//! Each tick enumerates the stored checks and runs one pipeline per check id:
//! read, validate, probe, resolve, then commit (persist, log, alert). Pipelines
//! for different checks run concurrently. A check id whose previous pipeline is
//! still running is skipped for the tick rather than queued.

use monitor_core::{
    Error, Result,
    logs::LogSink,
    models::{Check, CheckLogEntry, CheckState, Collection, ProbeOutcome},
    notify::Notifier,
    store::RecordStore,
};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    clock::Clock,
    probe::ProbeExecutor,
    resolver::{Resolution, resolve},
    validator::{Rejection, validate_stored},
};

/// Upper bound on one alert delivery. The check stays claimed until the
/// commit finishes.
const ALERT_TIMEOUT: Duration = Duration::from_secs(15);

/// Ids of checks whose pipeline is currently running.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    ids: Arc<Mutex<HashSet<String>>>,
}

impl InFlight {
    /// Claim `id`, or `None` if a pipeline for it is still running.
    pub fn try_claim(&self, id: &str) -> Option<InFlightGuard> {
        let mut ids = self.ids.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !ids.insert(id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            ids: self.ids.clone(),
            id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(id)
    }
}

/// Releases its check id when dropped, whether the pipeline finished or panicked.
#[derive(Debug)]
pub struct InFlightGuard {
    ids: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
    }
}

/// Which side effects of a completed probe went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    pub persisted: bool,
    pub logged: bool,
    /// `None` when no alert was warranted.
    pub notified: Option<bool>,
}

impl CommitReport {
    pub fn is_clean(&self) -> bool {
        self.persisted && self.logged && self.notified != Some(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckReport {
    /// The previous pipeline for this id had not finished.
    InFlight { key: String },
    ReadFailed { key: String, error: String },
    Rejected { key: String, rejection: Rejection },
    Completed {
        key: String,
        outcome: ProbeOutcome,
        state: CheckState,
        alert: bool,
        commit: CommitReport,
    },
}

impl CheckReport {
    pub fn key(&self) -> &str {
        match self {
            CheckReport::InFlight { key }
            | CheckReport::ReadFailed { key, .. }
            | CheckReport::Rejected { key, .. }
            | CheckReport::Completed { key, .. } => key,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub probed: usize,
    pub in_flight: usize,
    pub rejected: usize,
    pub read_failed: usize,
    pub alerts: usize,
    pub commit_failures: usize,
    pub aborted: usize,
}

impl TickSummary {
    fn record(&mut self, report: &CheckReport) {
        match report {
            CheckReport::InFlight { .. } => self.in_flight += 1,
            CheckReport::ReadFailed { .. } => self.read_failed += 1,
            CheckReport::Rejected { .. } => self.rejected += 1,
            CheckReport::Completed { alert, commit, .. } => {
                self.probed += 1;
                if *alert {
                    self.alerts += 1;
                }
                if !commit.is_clean() {
                    self.commit_failures += 1;
                }
            }
        }
    }
}

/// The pipelines started by one tick.
///
/// Dropping the handle detaches the pipelines; they still run to completion.
pub struct TickHandle {
    skipped: Vec<CheckReport>,
    running: Vec<JoinHandle<CheckReport>>,
}

impl TickHandle {
    pub fn started(&self) -> usize {
        self.running.len()
    }

    /// Wait for every pipeline of the tick and collect their reports.
    pub async fn join(self) -> (Vec<CheckReport>, TickSummary) {
        let mut summary = TickSummary::default();
        let mut reports = self.skipped;
        for report in &reports {
            summary.record(report);
        }

        for handle in self.running {
            match handle.await {
                Ok(report) => {
                    summary.record(&report);
                    reports.push(report);
                }
                Err(e) => {
                    error!("check pipeline aborted: {}", e);
                    summary.aborted += 1;
                }
            }
        }
        (reports, summary)
    }
}

pub struct CheckWorker {
    store: Arc<dyn RecordStore>,
    logs: Arc<dyn LogSink>,
    notifier: Arc<dyn Notifier>,
    executor: ProbeExecutor,
    clock: Arc<dyn Clock>,
    in_flight: InFlight,
}

impl CheckWorker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        logs: Arc<dyn LogSink>,
        notifier: Arc<dyn Notifier>,
        executor: ProbeExecutor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            logs,
            notifier,
            executor,
            clock,
            in_flight: InFlight::default(),
        }
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Enumerate all checks and start a pipeline for each one not already in
    /// flight. Returns once the pipelines are spawned, without waiting on them.
    ///
    /// Failure to enumerate ends the tick with `Error::Enumeration`.
    pub async fn spawn_tick(self: &Arc<Self>) -> Result<TickHandle> {
        let keys = self.store.list(Collection::Checks).await.map_err(|e| match e {
            Error::Enumeration(msg) => Error::Enumeration(msg),
            other => Error::enumeration(other.to_string()),
        })?;

        if keys.is_empty() {
            debug!("no checks to process");
        }

        let mut skipped = Vec::new();
        let mut running = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(guard) = self.in_flight.try_claim(&key) else {
                debug!(check_id = %key, "previous probe still running, skipping");
                skipped.push(CheckReport::InFlight { key });
                continue;
            };

            let worker = Arc::clone(self);
            running.push(tokio::spawn(async move {
                let _guard = guard;
                worker.run_check(&key).await
            }));
        }

        Ok(TickHandle { skipped, running })
    }

    /// Run one tick to completion.
    pub async fn run_tick(self: &Arc<Self>) -> Result<TickSummary> {
        let (_, summary) = self.spawn_tick().await?.join().await;
        Ok(summary)
    }

    /// The full pipeline for one stored check.
    async fn run_check(&self, key: &str) -> CheckReport {
        let raw = match self.store.read(Collection::Checks, key).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(check_id = %key, "could not read check: {}", e);
                return CheckReport::ReadFailed { key: key.to_string(), error: e.to_string() };
            }
        };

        let check = match validate_stored(key, &raw) {
            Ok(check) => check,
            Err(rejection) => {
                warn!(check_id = %key, "check is not properly formatted, skipping: {}", rejection);
                return CheckReport::Rejected { key: key.to_string(), rejection };
            }
        };

        let outcome = self.executor.probe(&check).await;
        let now = self.clock.now_millis();
        let resolution = resolve(&check, &outcome, now);
        let state = resolution.check.state;
        let alert = resolution.alert_warranted;
        let commit = self.commit(&check, &outcome, resolution, now).await;

        info!(check_id = %check.id, %state, alert, "check processed");
        CheckReport::Completed { key: key.to_string(), outcome, state, alert, commit }
    }

    /// Persist, log, then alert. Each step runs regardless of the others.
    async fn commit(
        &self,
        previous: &Check,
        outcome: &ProbeOutcome,
        resolution: Resolution,
        now: i64,
    ) -> CommitReport {
        let Resolution { check: updated, alert_warranted } = resolution;

        let persisted = match self.persist(&updated).await {
            Ok(()) => true,
            Err(e) => {
                error!(check_id = %updated.id, "could not save check: {}", e);
                false
            }
        };

        let entry = CheckLogEntry {
            check: previous.clone(),
            outcome: outcome.clone(),
            state: updated.state,
            alert: alert_warranted,
            time: now,
        };
        let logged = match self.append_log(&entry).await {
            Ok(()) => true,
            Err(e) => {
                error!(check_id = %updated.id, "could not append check log: {}", e);
                false
            }
        };

        let notified = if alert_warranted {
            let message = updated.alert_message();
            match self.alert(&updated.owner_id, &message).await {
                Ok(()) => {
                    info!(check_id = %updated.id, state = %updated.state, "owner alerted to state change");
                    Some(true)
                }
                Err(e) => {
                    error!(check_id = %updated.id, "could not alert owner: {}", e);
                    Some(false)
                }
            }
        } else {
            debug!(check_id = %updated.id, "check outcome has not changed, no alert needed");
            None
        };

        CommitReport { persisted, logged, notified }
    }

    async fn alert(&self, recipient: &str, message: &str) -> Result<()> {
        tokio::time::timeout(ALERT_TIMEOUT, self.notifier.send(recipient, message))
            .await
            .map_err(|_| {
                Error::notification(format!(
                    "no answer from notifier within {}s",
                    ALERT_TIMEOUT.as_secs()
                ))
            })?
    }

    async fn persist(&self, updated: &Check) -> Result<()> {
        let record = serde_json::to_value(updated)?;
        self.store.update(Collection::Checks, &updated.id, &record).await
    }

    async fn append_log(&self, entry: &CheckLogEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        self.logs.append(&entry.check.id, &line).await
    }
}
