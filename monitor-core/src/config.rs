use serde::{Deserialize, Serialize};
use std::{env, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

const MAX_ROTATION_HOURS: u64 = 24 * 366;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub check_interval_secs: u64,
    pub log_rotation_hours: u64,
    /// Enforced by the router when checks are created.
    pub max_checks: u32,
}

impl WorkerConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn log_rotation_interval(&self) -> Duration {
        Duration::from_secs(self.log_rotation_hours.saturating_mul(60 * 60))
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_phone: String,
}

impl std::fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("from_phone", &self.from_phone)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub worker: WorkerConfig,
    #[serde(default)]
    pub twilio: Option<TwilioConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let mut cfg = config::Config::builder();

        cfg = cfg
            .set_default("storage.data_dir", ".data")?
            .set_default("storage.log_dir", ".logs")?
            .set_default("worker.check_interval_secs", 60)?
            .set_default("worker.log_rotation_hours", 24)?
            .set_default("worker.max_checks", 5)?;

        if let Ok(dir) = env::var("DATA_DIR") {
            cfg = cfg.set_override("storage.data_dir", dir)?;
        }
        if let Ok(dir) = env::var("LOG_DIR") {
            cfg = cfg.set_override("storage.log_dir", dir)?;
        }
        if let Ok(secs) = env::var("CHECK_INTERVAL_SECS") {
            cfg = cfg.set_override("worker.check_interval_secs", parse_number(&secs, "CHECK_INTERVAL_SECS")?)?;
        }
        if let Ok(hours) = env::var("LOG_ROTATION_HOURS") {
            cfg = cfg.set_override("worker.log_rotation_hours", parse_number(&hours, "LOG_ROTATION_HOURS")?)?;
        }
        if let Ok(max) = env::var("MAX_CHECKS") {
            cfg = cfg.set_override("worker.max_checks", parse_number(&max, "MAX_CHECKS")?)?;
        }

        if let (Ok(sid), Ok(token), Ok(from)) = (
            env::var("TWILIO_ACCOUNT_SID"),
            env::var("TWILIO_AUTH_TOKEN"),
            env::var("TWILIO_FROM_PHONE"),
        ) {
            cfg = cfg
                .set_override("twilio.account_sid", sid)?
                .set_override("twilio.auth_token", token)?
                .set_override("twilio.from_phone", from)?;
        }

        let config: Config = cfg.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker.check_interval_secs == 0 {
            return Err(Error::config("worker.check_interval_secs must be greater than zero"));
        }
        if self.worker.log_rotation_hours == 0 {
            return Err(Error::config("worker.log_rotation_hours must be greater than zero"));
        }
        if self.worker.log_rotation_hours > MAX_ROTATION_HOURS {
            return Err(Error::config(format!(
                "worker.log_rotation_hours must be at most {MAX_ROTATION_HOURS}"
            )));
        }
        Ok(())
    }
}

fn parse_number(raw: &str, name: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| Error::config(format!("{name} must be a non-negative integer: {e}")))
}
