//! Engine configuration
//!
//! Defines the configurable parameters for the execution engine: where
//! workspaces live, which provisioning tool to invoke, and the deadlines that
//! bound a pipeline.

use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
///
/// All deadlines are configurable to allow tuning for different providers
/// (a small sandbox applies in seconds, a managed cluster can take most of an hour).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory under which one workspace per deployment is created
    pub workspace_root: PathBuf,

    /// Provisioning tool executable (e.g., "terraform" or "tofu")
    pub tool_binary: String,

    /// Maximum wall-clock time for a single pipeline step before it is killed
    pub step_timeout: Duration,

    /// How long a pipeline lease stays valid without renewal
    pub lease_ttl: Duration,
}

impl EngineConfig {
    /// Creates a new configuration with defaults
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            workspace_root,
            tool_binary: "terraform".to_string(),
            step_timeout: Duration::from_secs(1800), // 30 minutes
            lease_ttl: Duration::from_secs(7200),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - STRATA_WORKSPACE_ROOT (optional, default: ./workspaces)
    /// - STRATA_TOOL_BINARY (optional, default: terraform)
    /// - STRATA_STEP_TIMEOUT (optional, seconds, default: 1800)
    /// - STRATA_LEASE_TTL (optional, seconds, default: 7200)
    pub fn from_env() -> anyhow::Result<Self> {
        let workspace_root = std::env::var("STRATA_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./workspaces"));

        let mut config = Self::new(workspace_root);

        if let Ok(binary) = std::env::var("STRATA_TOOL_BINARY") {
            config.tool_binary = binary;
        }

        if let Some(secs) = parse_secs("STRATA_STEP_TIMEOUT")? {
            config.step_timeout = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_secs("STRATA_LEASE_TTL")? {
            config.lease_ttl = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Overrides the provisioning tool executable
    pub fn with_tool_binary(mut self, binary: impl Into<String>) -> Self {
        self.tool_binary = binary.into();
        self
    }

    /// Overrides the per-step deadline
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.workspace_root.as_os_str().is_empty() {
            anyhow::bail!("workspace_root cannot be empty");
        }

        if self.tool_binary.trim().is_empty() {
            anyhow::bail!("tool_binary cannot be empty");
        }

        if self.step_timeout.is_zero() {
            anyhow::bail!("step_timeout must be greater than 0");
        }

        if self.lease_ttl <= self.step_timeout {
            anyhow::bail!("lease_ttl must be longer than step_timeout");
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./workspaces"))
    }
}

fn parse_secs(var: &str) -> anyhow::Result<Option<u64>> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} must be a number of seconds: {}", var, e)),
        Err(_) => Ok(None),
    }
}
