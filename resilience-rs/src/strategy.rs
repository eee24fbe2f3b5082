//! # Recovery Strategies
//!
//! One recovery action per [`FailureKind`]:
//!
//! | kind | action |
//! |---|---|
//! | resource_missing | download the resource into its configured path |
//! | connectivity | probe a known-good address |
//! | timeout | raise the shared search timeout |
//! | execution_fault | drop one worker thread (floor 1) |
//! | unknown | exponential backoff pause |
//!
//! Actions report success as a plain `bool`. A failed action is never itself
//! recovered. Every action is time bounded.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::classifier::FailureKind;
use crate::tuning::TuningState;
use crate::types::{Error, ErrorKind, Result};

/// Maximum number of recovery attempts for the lifetime of the process
pub const MAX_RECOVERY_ATTEMPTS: usize = 3;

/// Seconds added to the search timeout by each timeout recovery
pub const TIMEOUT_INCREMENT_SECS: u64 = 2;

/// Configuration for the recovery actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Remote source of the resource fetched on `resource_missing`
    pub resource_url: String,
    /// Local destination of the fetched resource
    pub resource_path: PathBuf,
    /// Upper bound on a whole resource download, headers to last byte
    pub download_timeout: Duration,
    /// Address probed on `connectivity`
    pub probe_url: String,
    pub probe_timeout: Duration,
    /// Unit of the `unknown` backoff (`2^attempts` units)
    pub backoff_unit: Duration,
    /// Number of error records retained by the coordinator
    pub history_capacity: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            resource_url: String::new(),
            resource_path: PathBuf::from("models/model.gguf"),
            download_timeout: Duration::from_secs(600),
            probe_url: "https://1.1.1.1".to_string(),
            probe_timeout: Duration::from_secs(5),
            backoff_unit: Duration::from_secs(1),
            history_capacity: 1000,
        }
    }
}

/// Kind-specific remediation attempted before a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    FetchResource,
    ProbeConnectivity,
    ExtendTimeout,
    ShedWorkerThread,
    Backoff,
}

impl RecoveryAction {
    pub fn for_kind(kind: FailureKind) -> Self {
        match kind {
            FailureKind::ResourceMissing => RecoveryAction::FetchResource,
            FailureKind::Connectivity => RecoveryAction::ProbeConnectivity,
            FailureKind::Timeout => RecoveryAction::ExtendTimeout,
            FailureKind::ExecutionFault => RecoveryAction::ShedWorkerThread,
            FailureKind::Unknown => RecoveryAction::Backoff,
        }
    }

    /// Remediation text handed back to callers when recovery gives up
    pub fn suggestion(&self) -> &'static str {
        match self {
            RecoveryAction::FetchResource => {
                "Check that the model file exists at the configured path or that the download source is reachable"
            }
            RecoveryAction::ProbeConnectivity => {
                "Check network connectivity and that the search endpoint is reachable"
            }
            RecoveryAction::ExtendTimeout => {
                "The search service is slow; raise SEARCH_TIMEOUT_SECS or try again later"
            }
            RecoveryAction::ShedWorkerThread => {
                "Generation is failing under load; lower LLM_THREADS or free system resources"
            }
            RecoveryAction::Backoff => "Retry the request later; restart the service if the problem persists",
        }
    }
}

/// Maps failure kinds to recovery actions and runs them
#[derive(Debug, Clone)]
pub struct RecoveryStrategyTable {
    config: RecoveryConfig,
    client: reqwest::Client,
}

impl RecoveryStrategyTable {
    pub fn new(config: RecoveryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                Error::new(ErrorKind::Initialization, format!("Failed to build recovery HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    pub fn action_for(&self, kind: FailureKind) -> RecoveryAction {
        RecoveryAction::for_kind(kind)
    }

    /// Runs `action`; `attempts_used` drives the backoff exponent.
    pub async fn run(&self, action: RecoveryAction, tuning: &TuningState, attempts_used: usize) -> bool {
        match action {
            RecoveryAction::FetchResource => match self.fetch_resource().await {
                Ok(bytes) => {
                    info!(
                        url = %self.config.resource_url,
                        path = %self.config.resource_path.display(),
                        bytes,
                        "Fetched missing resource"
                    );
                    true
                }
                Err(e) => {
                    warn!(url = %self.config.resource_url, error = %e, "Resource fetch failed");
                    false
                }
            },
            RecoveryAction::ProbeConnectivity => match self.probe().await {
                Ok(()) => {
                    info!(url = %self.config.probe_url, "Connectivity probe succeeded");
                    true
                }
                Err(e) => {
                    warn!(url = %self.config.probe_url, error = %e, "Connectivity probe failed");
                    false
                }
            },
            RecoveryAction::ExtendTimeout => {
                let timeout = tuning.extend_search_timeout(TIMEOUT_INCREMENT_SECS);
                info!(search_timeout_secs = timeout, "Extended search timeout");
                true
            }
            RecoveryAction::ShedWorkerThread => {
                let threads = tuning.shed_worker_thread();
                info!(worker_threads = threads, "Reduced worker threads");
                true
            }
            RecoveryAction::Backoff => {
                let delay = backoff_delay(self.config.backoff_unit, attempts_used);
                debug!(delay_ms = %delay.as_millis(), attempts_used, "Backing off before retry");
                sleep(delay).await;
                true
            }
        }
    }

    async fn fetch_resource(&self) -> Result<u64> {
        let target = &self.config.resource_path;
        if self.config.resource_url.is_empty() {
            return Err(Error::new(ErrorKind::Initialization, "No resource URL configured"));
        }

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(target);
        let download = tokio::time::timeout(self.config.download_timeout, self.download_to(&partial))
            .await
            .unwrap_or_else(|_| {
                Err(Error::new(
                    ErrorKind::Timeout,
                    format!("Download did not finish within {:?}", self.config.download_timeout),
                ))
            });

        // the recovery gate is held for the whole download, so it must end
        match download {
            Ok(bytes) => {
                tokio::fs::rename(&partial, target).await?;
                Ok(bytes)
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    debug!(path = %partial.display(), error = %cleanup, "No partial download to clean up");
                }
                Err(e)
            }
        }
    }

    async fn download_to(&self, path: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(&self.config.resource_url)
            .send()
            .await?
            .error_for_status()?;

        let mut file = tokio::fs::File::create(path).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    async fn probe(&self) -> Result<()> {
        // any HTTP answer proves reachability, whatever the status
        self.client
            .get(&self.config.probe_url)
            .timeout(self.config.probe_timeout)
            .send()
            .await?;
        Ok(())
    }
}

/// `unit * 2^attempts_used`
pub fn backoff_delay(unit: Duration, attempts_used: usize) -> Duration {
    let factor = 1u32.checked_shl(attempts_used as u32).unwrap_or(u32::MAX);
    unit.saturating_mul(factor)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(config: RecoveryConfig) -> RecoveryStrategyTable {
        RecoveryStrategyTable::new(config).unwrap()
    }

    #[test]
    fn test_action_table() {
        assert_eq!(RecoveryAction::for_kind(FailureKind::ResourceMissing), RecoveryAction::FetchResource);
        assert_eq!(RecoveryAction::for_kind(FailureKind::Connectivity), RecoveryAction::ProbeConnectivity);
        assert_eq!(RecoveryAction::for_kind(FailureKind::Timeout), RecoveryAction::ExtendTimeout);
        assert_eq!(RecoveryAction::for_kind(FailureKind::ExecutionFault), RecoveryAction::ShedWorkerThread);
        assert_eq!(RecoveryAction::for_kind(FailureKind::Unknown), RecoveryAction::Backoff);
    }

    #[test]
    fn test_backoff_delay() {
        let unit = Duration::from_millis(10);
        assert_eq!(backoff_delay(unit, 0), Duration::from_millis(10));
        assert_eq!(backoff_delay(unit, 1), Duration::from_millis(20));
        assert_eq!(backoff_delay(unit, 2), Duration::from_millis(40));
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("models/tiny.gguf")),
            PathBuf::from("models/tiny.gguf.part")
        );
    }

    #[tokio::test]
    async fn test_tuning_actions_always_succeed() {
        let strategies = table(RecoveryConfig::default());
        let tuning = TuningState::new(2, 2);

        assert!(strategies.run(RecoveryAction::ExtendTimeout, &tuning, 0).await);
        assert_eq!(tuning.search_timeout_secs(), 4);

        assert!(strategies.run(RecoveryAction::ShedWorkerThread, &tuning, 0).await);
        assert!(strategies.run(RecoveryAction::ShedWorkerThread, &tuning, 1).await);
        assert_eq!(tuning.worker_threads(), 1);
    }

    #[tokio::test]
    async fn test_backoff_action_succeeds() {
        let strategies = table(RecoveryConfig {
            backoff_unit: Duration::from_millis(1),
            ..Default::default()
        });
        let tuning = TuningState::new(2, 2);

        let started = std::time::Instant::now();
        assert!(strategies.run(RecoveryAction::Backoff, &tuning, 2).await);
        assert!(started.elapsed() >= Duration::from_millis(4));
    }

    #[tokio::test]
    async fn test_fetch_without_url_fails() {
        let dir = tempfile::tempdir().unwrap();
        let strategies = table(RecoveryConfig {
            resource_path: dir.path().join("model.gguf"),
            ..Default::default()
        });
        let tuning = TuningState::new(2, 2);

        assert!(!strategies.run(RecoveryAction::FetchResource, &tuning, 0).await);
        assert!(!dir.path().join("model.gguf").exists());
    }
}
