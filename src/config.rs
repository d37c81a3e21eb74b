//! Engine tuning knobs.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (`TRISK_*`)
//! 2. Config file (`trisk.yaml` in the working directory, or `TRISK_CONFIG`)
//! 3. Defaults matching the reference deployment

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{Plan, TriageStep, UnknownStep};

/// All timing and resilience parameters for one engine instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Per-attempt tool timeout in milliseconds (default: 1000)
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,

    /// Total wall-clock budget per run in milliseconds (default: 5000)
    #[serde(default = "default_flow_budget_ms")]
    pub flow_budget_ms: u64,

    /// Retries after the first attempt (default: 2, i.e. 3 attempts)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff schedule indexed by attempt number, in milliseconds
    /// (default: [150, 400])
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: Vec<u64>,

    /// Consecutive non-simulated failures before a step's circuit opens
    /// (default: 3)
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,

    /// How long an open circuit rejects attempts, in milliseconds
    /// (default: 30000)
    #[serde(default = "default_breaker_open_ms")]
    pub breaker_open_ms: u64,

    /// How long a finished run's event channel lingers before reclamation,
    /// in milliseconds (default: 30000)
    #[serde(default = "default_bus_linger_ms")]
    pub bus_linger_ms: u64,

    /// Idle interval after which stream consumers emit a keepalive,
    /// in milliseconds (default: 15000)
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,

    /// Optional plan override as wire step names; unknown names halt the
    /// run with `unknown_step`
    #[serde(default)]
    pub plan: Option<Vec<String>>,
}

fn default_tool_timeout_ms() -> u64 {
    1000
}
fn default_flow_budget_ms() -> u64 {
    5000
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_backoff_ms() -> Vec<u64> {
    vec![150, 400]
}
fn default_breaker_threshold() -> u32 {
    3
}
fn default_breaker_open_ms() -> u64 {
    30_000
}
fn default_bus_linger_ms() -> u64 {
    30_000
}
fn default_heartbeat_ms() -> u64 {
    15_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool_timeout_ms: default_tool_timeout_ms(),
            flow_budget_ms: default_flow_budget_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            breaker_threshold: default_breaker_threshold(),
            breaker_open_ms: default_breaker_open_ms(),
            bus_linger_ms: default_bus_linger_ms(),
            heartbeat_ms: default_heartbeat_ms(),
            plan: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from file (if present) and environment
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("TRISK_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => {
                let default_path = Path::new("trisk.yaml");
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_u64("TRISK_TOOL_TIMEOUT_MS") {
            self.tool_timeout_ms = v;
        }
        if let Some(v) = env_u64("TRISK_FLOW_BUDGET_MS") {
            self.flow_budget_ms = v;
        }
        if let Some(v) = env_u64("TRISK_MAX_RETRIES") {
            self.max_retries = v as u32;
        }
        if let Some(v) = env_u64("TRISK_BREAKER_OPEN_MS") {
            self.breaker_open_ms = v;
        }
        if let Some(v) = env_u64("TRISK_BUS_LINGER_MS") {
            self.bus_linger_ms = v;
        }
        if let Some(v) = env_u64("TRISK_HEARTBEAT_MS") {
            self.heartbeat_ms = v;
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }

    pub fn flow_budget(&self) -> Duration {
        Duration::from_millis(self.flow_budget_ms)
    }

    pub fn breaker_window(&self) -> Duration {
        Duration::from_millis(self.breaker_open_ms)
    }

    pub fn bus_linger(&self) -> Duration {
        Duration::from_millis(self.bus_linger_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    /// Backoff delay before retrying after the given attempt (1-indexed).
    /// Past the end of the schedule the last entry repeats.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let idx = attempt.saturating_sub(1) as usize;
        let ms = self
            .retry_backoff_ms
            .get(idx)
            .or_else(|| self.retry_backoff_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(ms)
    }

    /// Resolve the step plan for a new run
    pub fn plan(&self) -> Result<Plan, UnknownStep> {
        match &self.plan {
            None => Ok(TriageStep::DEFAULT_PLAN.to_vec()),
            Some(names) => names.iter().map(|name| name.parse()).collect(),
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
