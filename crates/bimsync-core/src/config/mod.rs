//! Synchronization run configuration.
//!
//! Provides [`SynchronizationConfig`], read by the CLI from a JSON file and
//! handed to the synchronizer for one run.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::normalize_text_option;

const DEFAULT_COMMIT_BATCH_SIZE: usize = 50;
const MAX_COMMIT_BATCH_SIZE: usize = 10_000;

/// What the synchronizer does after an entity fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and continue with the next entity
    #[default]
    Skip,
    /// Stop after the first failure; the report still carries it
    Abort,
}

/// Settings for one synchronization run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SynchronizationConfig {
    /// Label of the remote connection, used in logs
    #[serde(default)]
    pub connection_name: Option<String>,
    /// Connection context stamped onto dynamic fields
    #[serde(default)]
    pub connection_info_id: i64,
    /// Acting user linked to synchronized projects
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Root entities handled between commits; `0` commits once at the end
    #[serde(default = "default_commit_batch_size")]
    pub commit_batch_size: usize,
}

impl Default for SynchronizationConfig {
    fn default() -> Self {
        Self {
            connection_name: None,
            connection_info_id: 0,
            user_id: None,
            failure_policy: FailurePolicy::default(),
            commit_batch_size: DEFAULT_COMMIT_BATCH_SIZE,
        }
    }
}

impl SynchronizationConfig {
    /// Connection label for log lines.
    pub fn connection_label(&self) -> &str {
        self.connection_name.as_deref().unwrap_or("default")
    }

    /// Whether a commit is due after `handled` root entities.
    pub const fn commit_due(&self, handled: usize) -> bool {
        self.commit_batch_size != 0 && handled != 0 && handled % self.commit_batch_size == 0
    }

    fn validated(mut self) -> Result<Self> {
        if self.commit_batch_size > MAX_COMMIT_BATCH_SIZE {
            return Err(Error::Config(format!(
                "commit_batch_size {} exceeds the maximum of {MAX_COMMIT_BATCH_SIZE}",
                self.commit_batch_size
            )));
        }
        self.connection_name = normalize_text_option(self.connection_name);
        Ok(self)
    }
}

/// Parse and validate a synchronization config from a raw JSON payload.
pub fn parse_synchronization_config(payload: &str) -> Result<SynchronizationConfig> {
    let config: SynchronizationConfig = serde_json::from_str(payload)
        .map_err(|error| Error::Config(format!("invalid synchronization config JSON: {error}")))?;
    config.validated()
}

const fn default_commit_batch_size() -> usize {
    DEFAULT_COMMIT_BATCH_SIZE
}
