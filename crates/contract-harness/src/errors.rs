use std::fmt;

use alloy::primitives::{Address, Bytes, B256, U256};
use error_stack::Report;

/// Failure modes surfaced by the harness.
///
/// Every variant reaches the calling test unchanged; the harness never retries
/// or recovers locally. Additional context travels as report attachments
/// ([RpcContext], [ContractInfo], [TransactionInfo], [RevertData], [Mismatch]).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HarnessError {
    /// The RPC endpoint could not be reached, or it reported no usable accounts.
    #[error("node unavailable: {0}")]
    NodeUnavailable(String),
    /// No artifact was compiled or registered under this name.
    #[error("artifact '{0}' not found")]
    ArtifactNotFound(String),
    /// The artifact exists but its ABI or bytecode cannot be used.
    #[error("invalid artifact '{name}': {reason}")]
    InvalidArtifact { name: String, reason: String },
    /// Invalid harness configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Sender balance is below value + gas cost.
    #[error("insufficient funds: account {address} has {available} wei but needs {required} wei")]
    InsufficientFunds { address: Address, required: U256, available: U256 },
    /// Execution consumed the whole gas limit without completing.
    #[error("gas exhausted (gas limit {gas_limit})")]
    GasExhausted { gas_limit: u64 },
    /// The constructor rejected its arguments.
    #[error("constructor reverted: {reason}")]
    ConstructorReverted { reason: String },
    /// The method name is absent from the bound ABI.
    #[error("method '{0}' not found in contract abi")]
    MethodNotFound(String),
    /// Argument arity or types disagree with the ABI signature.
    #[error("argument mismatch for '{method}': {detail}")]
    ArgumentMismatch { method: String, detail: String },
    /// Contract logic rejected a call or transaction.
    #[error("execution reverted: {reason}")]
    ExecutionReverted { reason: String },
    /// The node did not confirm the transaction in time.
    #[error("transaction {tx_hash} was not confirmed within {timeout_ms} ms")]
    ConfirmationTimeout { tx_hash: B256, timeout_ms: u64 },
    /// A session operation was issued out of lifecycle order.
    #[error("session is {actual}, expected {expected}")]
    SessionState { expected: String, actual: String },
    /// A test assertion did not hold.
    #[error("assertion failed")]
    AssertionFailed,
    /// Any other RPC failure. Transient errors are the caller's to retry.
    #[error("rpc error: {0}")]
    Rpc(String),
}

pub type HarnessResult<T> = Result<T, Report<HarnessError>>;

/// RPC request details for debugging
#[derive(Debug, Clone)]
pub struct RpcContext {
    pub endpoint: String,
    pub method: String,
    pub params: Option<String>,
}

impl fmt::Display for RpcContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC {} at {}", self.method, self.endpoint)?;
        if let Some(params) = &self.params {
            write!(f, " with params {}", params)?;
        }
        Ok(())
    }
}

/// Transaction details for debugging
#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas_limit: u64,
}

impl fmt::Display for TransactionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transaction from {}", self.from)?;
        match &self.to {
            Some(to) => write!(f, " to {}", to)?,
            None => write!(f, " (contract creation)")?,
        }
        write!(f, " value: {} gas: {}", self.value, self.gas_limit)
    }
}

/// Contract information for deployment/interaction errors
#[derive(Debug, Clone)]
pub struct ContractInfo {
    pub name: String,
    pub address: Option<Address>,
    pub method: Option<String>,
}

impl fmt::Display for ContractInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Contract: {}", self.name)?;
        if let Some(addr) = &self.address {
            write!(f, " at {}", addr)?;
        }
        if let Some(method) = &self.method {
            write!(f, " method: {}", method)?;
        }
        Ok(())
    }
}

/// Raw revert payload returned by the node.
#[derive(Debug, Clone)]
pub struct RevertData(pub Bytes);

impl fmt::Display for RevertData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "revert data: {}", self.0)
    }
}

/// Expected vs actual values of a failed assertion.
#[derive(Debug, Clone)]
pub struct Mismatch {
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected: {}\n  actual: {}", self.expected, self.actual)
    }
}

/// Helpers for attaching harness context to results
pub trait HarnessErrorExt {
    fn with_contract_info(
        self,
        name: impl Into<String>,
        address: Option<Address>,
        method: Option<String>,
    ) -> Self;

    fn with_transaction_info(self, tx: TransactionInfo) -> Self;

    fn with_rpc_context(
        self,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        params: Option<String>,
    ) -> Self;
}

impl<T> HarnessErrorExt for HarnessResult<T> {
    fn with_contract_info(
        self,
        name: impl Into<String>,
        address: Option<Address>,
        method: Option<String>,
    ) -> Self {
        self.map_err(|e| e.attach(ContractInfo { name: name.into(), address, method }))
    }

    fn with_transaction_info(self, tx: TransactionInfo) -> Self {
        self.map_err(|e| e.attach(tx))
    }

    fn with_rpc_context(
        self,
        endpoint: impl Into<String>,
        method: impl Into<String>,
        params: Option<String>,
    ) -> Self {
        self.map_err(|e| {
            e.attach(RpcContext { endpoint: endpoint.into(), method: method.into(), params })
        })
    }
}

/// Compare an observed value against the expected one, failing with
/// [HarnessError::AssertionFailed] and a [Mismatch] attachment.
pub fn expect_eq<T>(expected: T, actual: T) -> HarnessResult<()>
where
    T: PartialEq + fmt::Debug,
{
    if expected == actual {
        return Ok(());
    }
    Err(Report::new(HarnessError::AssertionFailed).attach(Mismatch {
        expected: format!("{:?}", expected),
        actual: format!("{:?}", actual),
    }))
}

/// Helper macro for creating harness errors with a printable note
#[macro_export]
macro_rules! harness_error {
    ($error:expr, $($arg:tt)*) => {{
        error_stack::Report::new($error).attach_printable(format!($($arg)*))
    }};
}
