//! Per-test lifecycle over a single node.
//!
//! A session snapshots the node once at `init` and reverts to that baseline on
//! every `reset`, so nothing one test deploys or mutates is visible to the next.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::Address;
use error_stack::{Report, ResultExt};

use crate::accounts::{list_accounts, Accounts};
use crate::artifacts::ArtifactLoader;
use crate::config::HarnessConfig;
use crate::contract::ContractHandle;
use crate::deployer::{Deployer, DeploymentRequest};
use crate::errors::{HarnessError, HarnessResult};
use crate::node::AnvilNode;
use crate::rpc::{EvmRpc, NodeClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    AccountsLoaded,
    ContractDeployed,
    Verified,
    /// Torn down; no further operations are accepted.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::AccountsLoaded => "accounts-loaded",
            SessionState::ContractDeployed => "contract-deployed",
            SessionState::Verified => "verified",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Records whether a transaction was left unconfirmed because its confirmation
/// wait was dropped or timed out.
#[derive(Debug, Clone, Default)]
pub(crate) struct InFlightTracker {
    dirty: Arc<AtomicBool>,
}

impl InFlightTracker {
    pub(crate) fn begin(&self) -> InFlightGuard {
        InFlightGuard { dirty: self.dirty.clone(), finished: false }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub(crate) fn clear(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }
}

/// Marks the session dirty when dropped before [InFlightGuard::finish].
pub(crate) struct InFlightGuard {
    dirty: Arc<AtomicBool>,
    finished: bool,
}

impl InFlightGuard {
    pub(crate) fn finish(mut self) {
        self.finished = true;
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.dirty.store(true, Ordering::SeqCst);
        }
    }
}

/// Owns the node connection for a suite and walks each test through
/// `Uninitialized -> AccountsLoaded -> ContractDeployed -> Verified`.
pub struct TestSession<N> {
    client: Arc<N>,
    config: HarnessConfig,
    artifacts: ArtifactLoader,
    state: SessionState,
    baseline: Option<String>,
    accounts: Option<Accounts>,
    tracker: InFlightTracker,
    node: Option<AnvilNode>,
}

impl TestSession<EvmRpc> {
    /// Connect to `node.rpc_url`, or spawn an anvil node when none is set,
    /// then load artifacts from `artifacts_dir` and take the baseline snapshot.
    pub async fn launch(config: HarnessConfig) -> HarnessResult<Self> {
        config.validate()?;

        let (client, node) = match &config.node.rpc_url {
            Some(url) => (EvmRpc::new(url)?, None),
            None => {
                let node = AnvilNode::spawn(&config.node).await?;
                (node.client()?, Some(node))
            }
        };

        let artifacts = match &config.artifacts_dir {
            Some(dir) => ArtifactLoader::from_dir(dir)?,
            None => ArtifactLoader::new(),
        };

        let mut session = Self::init(Arc::new(client), config).await?;
        session.artifacts = artifacts;
        session.node = node;
        Ok(session)
    }
}

impl<N: NodeClient> TestSession<N> {
    /// Start a session on `client` and snapshot the node as the baseline every
    /// reset returns to.
    pub async fn init(client: Arc<N>, config: HarnessConfig) -> HarnessResult<Self> {
        let baseline = client
            .snapshot()
            .await
            .attach_printable("Taking the baseline snapshot")?;
        log::info!("session started on {} (baseline snapshot {})", client.endpoint(), baseline);

        Ok(Self {
            client,
            config,
            artifacts: ArtifactLoader::new(),
            state: SessionState::Uninitialized,
            baseline: Some(baseline),
            accounts: None,
            tracker: InFlightTracker::default(),
            node: None,
        })
    }

    pub fn with_artifacts(mut self, artifacts: ArtifactLoader) -> Self {
        self.artifacts = artifacts;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn client(&self) -> &Arc<N> {
        &self.client
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &ArtifactLoader {
        &self.artifacts
    }

    pub fn artifacts_mut(&mut self) -> &mut ArtifactLoader {
        &mut self.artifacts
    }

    /// Accounts loaded for the current test, if any.
    pub fn accounts(&self) -> Option<&Accounts> {
        self.accounts.as_ref()
    }

    /// True when a transaction of the current test was left unconfirmed.
    pub fn is_dirty(&self) -> bool {
        self.tracker.is_dirty()
    }

    pub fn node(&self) -> Option<&AnvilNode> {
        self.node.as_ref()
    }

    pub async fn load_accounts(&mut self) -> HarnessResult<Accounts> {
        self.expect_state(&[SessionState::Uninitialized], "uninitialized")?;
        let accounts = list_accounts(self.client.as_ref()).await?;
        log::debug!("session loaded {} account(s)", accounts.len());
        self.accounts = Some(accounts.clone());
        self.transition(SessionState::AccountsLoaded);
        Ok(accounts)
    }

    /// Deploy for the current test. A failed deployment leaves the state unchanged.
    pub async fn deploy(&mut self, request: DeploymentRequest) -> HarnessResult<ContractHandle<N>> {
        self.expect_state(
            &[SessionState::AccountsLoaded, SessionState::ContractDeployed],
            "accounts-loaded",
        )?;
        let handle = Deployer::new(self.client.clone(), &self.config)
            .with_tracker(self.tracker.clone())
            .deploy(request)
            .await?;
        self.transition(SessionState::ContractDeployed);
        Ok(handle)
    }

    /// Deploy the named artifact from `accounts[0]` with the configured gas limit.
    pub async fn deploy_artifact(
        &mut self,
        name: &str,
        constructor_args: Vec<DynSolValue>,
    ) -> HarnessResult<ContractHandle<N>> {
        let Some(accounts) = &self.accounts else {
            return Err(self.state_error("accounts-loaded"));
        };
        let artifact = self.artifacts.load(name)?;
        let request = DeploymentRequest::new(artifact, accounts.deployer())
            .with_args(constructor_args)
            .with_gas_limit(self.config.deploy.gas_limit);
        self.deploy(request).await
    }

    /// Handle for a contract already on the node, sharing this session's
    /// timeouts and in-flight tracking.
    pub fn bind(&self, address: Address, name: &str) -> HarnessResult<ContractHandle<N>> {
        if self.state == SessionState::Closed {
            return Err(self.state_error("open"));
        }
        let artifact = self.artifacts.load(name)?;
        Ok(ContractHandle::at(address, &artifact, self.client.clone())
            .with_config(&self.config)
            .with_tracker(self.tracker.clone()))
    }

    /// Record that the current test's assertions held.
    pub fn mark_verified(&mut self) -> HarnessResult<()> {
        self.expect_state(&[SessionState::ContractDeployed], "contract-deployed")?;
        self.transition(SessionState::Verified);
        Ok(())
    }

    /// Revert the node to the baseline and take a fresh baseline for the next test.
    ///
    /// A failed reset fails only the current test: the next reset retries the
    /// revert, or takes a new baseline when the previous one is gone.
    pub async fn reset(&mut self) -> HarnessResult<()> {
        if self.state == SessionState::Closed {
            return Err(self.state_error("open"));
        }
        if self.tracker.is_dirty() {
            log::warn!("resetting a session with an unconfirmed transaction");
        }

        if self.baseline.is_some() {
            self.revert_to_baseline().await?;
        } else {
            log::warn!(
                "no baseline snapshot on {}; taking one from the current state",
                self.client.endpoint()
            );
        }
        let baseline = self
            .client
            .snapshot()
            .await
            .attach_printable("Taking a fresh baseline snapshot")?;
        log::debug!("new baseline snapshot {}", baseline);

        self.baseline = Some(baseline);
        self.accounts = None;
        self.tracker.clear();
        self.transition(SessionState::Uninitialized);
        Ok(())
    }

    /// Revert to the baseline and release the node. Idempotent.
    pub async fn teardown(&mut self) -> HarnessResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        let result = match self.baseline {
            Some(_) => self.revert_to_baseline().await,
            None => Ok(()),
        };
        self.baseline = None;
        self.accounts = None;
        self.tracker.clear();
        self.transition(SessionState::Closed);
        self.node = None;
        result
    }

    /// Revert to the current baseline. A transport failure keeps the id for the
    /// next attempt.
    async fn revert_to_baseline(&mut self) -> HarnessResult<()> {
        let Some(baseline) = self.baseline.clone() else {
            return Err(Report::new(HarnessError::SessionState {
                expected: "baseline snapshot".to_string(),
                actual: "no baseline".to_string(),
            }));
        };

        let reverted = self
            .client
            .revert_to(baseline.clone())
            .await
            .attach_printable_lazy(|| format!("Reverting to snapshot {}", baseline))?;
        // Either way the id is spent: a refused id is unknown to the node.
        self.baseline = None;
        if !reverted {
            return Err(Report::new(HarnessError::Rpc(format!(
                "node refused to revert to snapshot {}",
                baseline
            ))));
        }
        log::debug!("reverted {} to snapshot {}", self.client.endpoint(), baseline);
        Ok(())
    }

    fn expect_state(&self, allowed: &[SessionState], expected: &str) -> HarnessResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.state_error(expected))
        }
    }

    fn state_error(&self, expected: &str) -> Report<HarnessError> {
        Report::new(HarnessError::SessionState {
            expected: expected.to_string(),
            actual: self.state.to_string(),
        })
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            log::info!("session {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

impl<N> fmt::Debug for TestSession<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSession")
            .field("state", &self.state)
            .field("baseline", &self.baseline)
            .field("node", &self.node)
            .finish()
    }
}
