#[macro_use]
extern crate serde_derive;

pub mod accounts;
pub mod artifacts;
pub mod codec;
pub mod config;
pub mod constants;
pub mod contract;
pub mod deployer;
pub mod errors;
pub mod node;
pub mod rpc;
pub mod session;
pub mod suite;

#[cfg(test)]
mod tests;

pub use accounts::{balance_of, list_accounts, Account, Accounts};
pub use artifacts::{Artifact, ArtifactLoader};
pub use codec::{ContractEvent, ReturnValue};
pub use config::HarnessConfig;
pub use contract::{ContractHandle, Method, SendOptions};
pub use deployer::{Deployer, DeploymentRequest};
pub use errors::{expect_eq, HarnessError, HarnessResult};
pub use node::AnvilNode;
pub use rpc::{EvmRpc, NodeClient, TransactionReceipt};
pub use session::{SessionState, TestSession};
pub use suite::{CaseContext, CaseOutcome, Setup, Suite, SuiteReport};

pub use alloy::dyn_abi::DynSolValue;
pub use alloy::primitives::{Address, U256};
