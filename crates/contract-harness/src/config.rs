//! Harness configuration.
//!
//! Loaded from TOML, with a couple of environment overrides so CI can point a
//! suite at an already running node without editing files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use error_stack::{Report, ResultExt};

use crate::constants::*;
use crate::errors::{HarnessError, HarnessResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub node: NodeConfig,
    pub deploy: DeployConfig,
    pub session: SessionConfig,
    /// Directory scanned for compiled artifacts.
    pub artifacts_dir: Option<PathBuf>,
}

/// How the ephemeral node is obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Connect to this endpoint instead of spawning a node.
    pub rpc_url: Option<String>,
    /// Port for a spawned node; 0 picks a free one.
    pub port: u16,
    pub accounts: u32,
    pub balance_eth: u64,
    pub mnemonic: String,
    pub chain_id: u64,
    /// Seconds between blocks. Unset means a block per transaction.
    pub block_time: Option<u64>,
    pub startup_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            port: 0,
            accounts: DEFAULT_ACCOUNT_COUNT,
            balance_eth: DEFAULT_ACCOUNT_BALANCE_ETH,
            mnemonic: TEST_MNEMONIC.to_string(),
            chain_id: DEFAULT_CHAIN_ID,
            block_time: None,
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub gas_limit: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self { gas_limit: DEFAULT_GAS_LIMIT }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub confirmation_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub case_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout_ms: DEFAULT_CONFIRMATION_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            case_timeout_ms: DEFAULT_CASE_TIMEOUT_MS,
        }
    }
}

impl SessionConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn case_timeout(&self) -> Duration {
        Duration::from_millis(self.case_timeout_ms)
    }
}

impl HarnessConfig {
    pub fn from_toml_str(source: &str) -> HarnessResult<Self> {
        let config: HarnessConfig = toml::from_str(source)
            .map_err(|e| Report::new(HarnessError::Config(e.to_string())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| Report::new(HarnessError::Config(e.to_string())))
            .attach_printable_lazy(|| format!("Reading harness config at {}", path.display()))?;
        Self::from_toml_str(&source)
            .attach_printable_lazy(|| format!("Parsing harness config at {}", path.display()))
    }

    /// Apply `CONTRACT_HARNESS_RPC_URL` and `CONTRACT_HARNESS_ARTIFACTS_DIR`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(ENV_RPC_URL) {
            if !url.trim().is_empty() {
                self.node.rpc_url = Some(url);
            }
        }
        if let Ok(dir) = std::env::var(ENV_ARTIFACTS_DIR) {
            if !dir.trim().is_empty() {
                self.artifacts_dir = Some(PathBuf::from(dir));
            }
        }
        self
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.deploy.gas_limit == 0 {
            return Err(Report::new(HarnessError::Config(
                "deploy.gas_limit must be positive".to_string(),
            )));
        }
        if self.node.rpc_url.is_none() && self.node.accounts == 0 {
            return Err(Report::new(HarnessError::Config(
                "node.accounts must be at least 1".to_string(),
            )));
        }
        if self.session.poll_interval_ms == 0 {
            return Err(Report::new(HarnessError::Config(
                "session.poll_interval_ms must be positive".to_string(),
            )));
        }
        if self.session.poll_interval_ms > self.session.confirmation_timeout_ms {
            return Err(Report::new(HarnessError::Config(format!(
                "session.poll_interval_ms ({}) exceeds session.confirmation_timeout_ms ({})",
                self.session.poll_interval_ms, self.session.confirmation_timeout_ms
            ))));
        }
        Ok(())
    }
}
