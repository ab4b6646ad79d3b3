//! Supervisor configuration
//!
//! Loaded from YAML, for example:
//!
//! ```yaml
//! reports_dir: /var/tmp/reports
//! run_id: nightly-42        # optional, a random UUID when omitted
//! wait_timeout_secs: 2.5    # optional, defaults to 5; null waits forever
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::executor::DEFAULT_WAIT_TIMEOUT;

/// Settings shared by every supervised run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Directory that holds the artifacts of all runs
    pub reports_dir: PathBuf,
    /// Name of this run's directory under `reports_dir`
    #[serde(default = "generate_run_id")]
    pub run_id: String,
    /// Seconds to wait before killing a process; `None` waits forever
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: Option<f64>,
}

fn generate_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_wait_timeout_secs() -> Option<f64> {
    Some(DEFAULT_WAIT_TIMEOUT.as_secs_f64())
}

impl SupervisorConfig {
    /// Configuration with a fresh run id and the default timeout
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
            run_id: generate_run_id(),
            wait_timeout_secs: default_wait_timeout_secs(),
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Replace the run id
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// Replace the wait timeout
    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout_secs = timeout.map(|t| t.as_secs_f64());
        self
    }

    /// Check the values deserialisation cannot
    pub fn validate(&self) -> Result<()> {
        if let Some(secs) = self.wait_timeout_secs {
            if let Err(e) = Duration::try_from_secs_f64(secs) {
                return Err(Error::config(format!(
                    "wait_timeout_secs must be a non-negative number of seconds, got {secs}: {e}"
                )));
            }
        }

        let run_id = self.run_id.as_str();
        if run_id.is_empty() || run_id == "." || run_id == ".." {
            return Err(Error::config(format!("invalid run_id {run_id:?}")));
        }
        if run_id.contains(['/', '\\']) {
            return Err(Error::config(format!(
                "run_id {run_id:?} must not contain path separators"
            )));
        }

        Ok(())
    }

    /// Name of this run's directory under `reports_dir`
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// How long to wait before escalating to a kill
    ///
    /// Values [`validate`](Self::validate) would reject saturate: too large
    /// becomes [`Duration::MAX`], negative or NaN becomes zero.
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(|secs| {
            Duration::try_from_secs_f64(secs).unwrap_or(if secs > 0.0 {
                Duration::MAX
            } else {
                Duration::ZERO
            })
        })
    }

    /// Directory holding this run's artifacts
    pub fn run_dir(&self) -> PathBuf {
        self.reports_dir.join(&self.run_id)
    }
}
