//! Sequential test cases over one [TestSession], each starting from the baseline.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::dyn_abi::DynSolValue;
use error_stack::Report;

use crate::accounts::Accounts;
use crate::contract::ContractHandle;
use crate::deployer::DeploymentRequest;
use crate::errors::{HarnessError, HarnessResult};
use crate::rpc::NodeClient;
use crate::session::{SessionState, TestSession};

pub type CaseFuture = Pin<Box<dyn Future<Output = HarnessResult<()>> + Send>>;

type CaseBody<N> = Box<dyn FnOnce(CaseContext<N>) -> CaseFuture + Send>;

/// Deployment performed before every case.
#[derive(Debug, Clone)]
pub struct Setup {
    pub artifact: String,
    pub constructor_args: Vec<DynSolValue>,
    pub gas_limit: Option<u64>,
}

impl Setup {
    pub fn deploy(artifact: impl Into<String>) -> Self {
        Self { artifact: artifact.into(), constructor_args: vec![], gas_limit: None }
    }

    pub fn with_args(mut self, constructor_args: Vec<DynSolValue>) -> Self {
        self.constructor_args = constructor_args;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// What a case body gets to work with. Owned, so the body can run on its own task.
pub struct CaseContext<N> {
    pub accounts: Accounts,
    pub client: Arc<N>,
    contract: Option<ContractHandle<N>>,
}

impl<N: NodeClient> CaseContext<N> {
    /// The contract deployed by the suite's [Setup].
    pub fn contract(&self) -> HarnessResult<&ContractHandle<N>> {
        self.contract.as_ref().ok_or_else(|| {
            Report::new(HarnessError::SessionState {
                expected: "contract-deployed".to_string(),
                actual: "accounts-loaded".to_string(),
            })
            .attach_printable("The suite has no setup deployment")
        })
    }
}

pub enum CaseOutcome {
    Passed,
    Failed(Report<HarnessError>),
    Panicked(String),
    TimedOut(Duration),
}

impl CaseOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, CaseOutcome::Passed)
    }

    /// The harness error behind a failure, if the case failed with one.
    pub fn error(&self) -> Option<&HarnessError> {
        match self {
            CaseOutcome::Failed(report) => Some(report.current_context()),
            _ => None,
        }
    }
}

impl fmt::Debug for CaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseOutcome::Passed => write!(f, "passed"),
            CaseOutcome::Failed(report) => write!(f, "failed: {:?}", report),
            CaseOutcome::Panicked(message) => write!(f, "panicked: {}", message),
            CaseOutcome::TimedOut(limit) => write!(f, "timed out after {} ms", limit.as_millis()),
        }
    }
}

#[derive(Debug)]
pub struct CaseReport {
    pub name: String,
    pub outcome: CaseOutcome,
    pub duration: Duration,
}

#[derive(Debug)]
pub struct SuiteReport {
    pub suite: String,
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|case| case.outcome.is_pass()).count()
    }

    pub fn failed(&self) -> usize {
        self.cases.len() - self.passed()
    }

    pub fn success(&self) -> bool {
        self.failed() == 0
    }

    /// Process exit code: 1 when any case failed.
    pub fn exit_code(&self) -> i32 {
        if self.success() {
            0
        } else {
            1
        }
    }

    pub fn case(&self, name: &str) -> Option<&CaseReport> {
        self.cases.iter().find(|case| case.name == name)
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.suite)?;
        for case in &self.cases {
            let status = if case.outcome.is_pass() { "ok" } else { "FAILED" };
            writeln!(f, "  {} ... {} ({} ms)", case.name, status, case.duration.as_millis())?;
        }
        for case in self.cases.iter().filter(|case| !case.outcome.is_pass()) {
            writeln!(f, "\n---- {} ----\n{:?}", case.name, case.outcome)?;
        }
        write!(f, "\n{} passed; {} failed", self.passed(), self.failed())
    }
}

struct Case<N> {
    name: String,
    body: CaseBody<N>,
}

/// Named cases run in order. Before each one the session is reset, accounts
/// are loaded and the [Setup] contract is deployed.
pub struct Suite<N> {
    name: String,
    session: TestSession<N>,
    setup: Option<Setup>,
    cases: Vec<Case<N>>,
}

impl<N: NodeClient> Suite<N> {
    pub fn new(name: impl Into<String>, session: TestSession<N>) -> Self {
        Self { name: name.into(), session, setup: None, cases: vec![] }
    }

    pub fn setup(mut self, setup: Setup) -> Self {
        self.setup = Some(setup);
        self
    }

    pub fn case<F, Fut>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(CaseContext<N>) -> Fut + Send + 'static,
        Fut: Future<Output = HarnessResult<()>> + Send + 'static,
    {
        let body: CaseBody<N> = Box::new(move |context| Box::pin(body(context)));
        self.cases.push(Case { name: name.into(), body });
        self
    }

    /// Run every case, then tear the session down.
    pub async fn run(mut self) -> SuiteReport {
        log::info!("running {} case(s) in {}", self.cases.len(), self.name);
        let cases = std::mem::take(&mut self.cases);
        let mut reports = Vec::with_capacity(cases.len());

        for case in cases {
            let started = Instant::now();
            let outcome = self.run_case(case.body).await;
            let duration = started.elapsed();
            match &outcome {
                CaseOutcome::Passed => {
                    log::info!("{} / {} passed in {} ms", self.name, case.name, duration.as_millis())
                }
                other => log::warn!("{} / {} {:?}", self.name, case.name, other),
            }
            reports.push(CaseReport { name: case.name, outcome, duration });
        }

        if let Err(e) = self.session.teardown().await {
            log::warn!("teardown of {} failed: {:?}", self.name, e);
        }

        SuiteReport { suite: self.name, cases: reports }
    }

    async fn run_case(&mut self, body: CaseBody<N>) -> CaseOutcome {
        let context = match self.prepare().await {
            Ok(context) => context,
            Err(e) => return CaseOutcome::Failed(e),
        };

        let limit = self.session.config().session.case_timeout();
        let task = tokio::spawn(tokio::time::timeout(limit, body(context)));

        let outcome = match task.await {
            Ok(Ok(Ok(()))) => CaseOutcome::Passed,
            Ok(Ok(Err(report))) => CaseOutcome::Failed(report),
            Ok(Err(_elapsed)) => CaseOutcome::TimedOut(limit),
            Err(join_error) if join_error.is_panic() => {
                CaseOutcome::Panicked(panic_message(join_error.into_panic()))
            }
            Err(join_error) => CaseOutcome::Panicked(join_error.to_string()),
        };

        if outcome.is_pass() && self.session.state() == SessionState::ContractDeployed {
            if let Err(e) = self.session.mark_verified() {
                return CaseOutcome::Failed(e);
            }
        }
        outcome
    }

    /// Reset, load accounts and run the setup deployment.
    async fn prepare(&mut self) -> HarnessResult<CaseContext<N>> {
        self.session.reset().await?;
        let accounts = self.session.load_accounts().await?;

        let contract = match &self.setup {
            Some(setup) => {
                let artifact = self.session.artifacts().load(&setup.artifact)?;
                let gas_limit = setup.gas_limit.unwrap_or(self.session.config().deploy.gas_limit);
                let request = DeploymentRequest::new(artifact, accounts.deployer())
                    .with_args(setup.constructor_args.clone())
                    .with_gas_limit(gas_limit);
                Some(self.session.deploy(request).await?)
            }
            None => None,
        };

        Ok(CaseContext { accounts, client: self.session.client().clone(), contract })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
