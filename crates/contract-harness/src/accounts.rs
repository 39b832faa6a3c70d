use std::fmt;

use alloy::primitives::{Address, U256};
use error_stack::Report;

use crate::errors::{HarnessError, HarnessErrorExt, HarnessResult};
use crate::rpc::NodeClient;

/// A pre-funded, node-unlocked account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Account {
    pub address: Address,
}

impl Account {
    pub fn new(address: Address) -> Self {
        Self { address }
    }
}

impl From<Address> for Account {
    fn from(address: Address) -> Self {
        Self::new(address)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Ordered accounts exposed by a node. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accounts {
    accounts: Vec<Account>,
}

impl Accounts {
    pub fn new(addresses: Vec<Address>) -> HarnessResult<Self> {
        if addresses.is_empty() {
            return Err(Report::new(HarnessError::NodeUnavailable(
                "node exposes no unlocked accounts".to_string(),
            )));
        }
        Ok(Self { accounts: addresses.into_iter().map(Account::new).collect() })
    }

    /// `accounts[0]`, used for deployments unless told otherwise.
    pub fn deployer(&self) -> Account {
        self.accounts[0]
    }

    pub fn get(&self, index: usize) -> Option<Account> {
        self.accounts.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.iter()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl std::ops::Index<usize> for Accounts {
    type Output = Account;

    fn index(&self, index: usize) -> &Account {
        &self.accounts[index]
    }
}

/// Query the node's pre-funded accounts, in node order.
pub async fn list_accounts<N: NodeClient>(client: &N) -> HarnessResult<Accounts> {
    let addresses = client.accounts().await?;
    log::debug!("node {} exposes {} account(s)", client.endpoint(), addresses.len());
    Accounts::new(addresses).with_rpc_context(client.endpoint(), "eth_accounts", None)
}

/// Current balance of `account` in wei.
pub async fn balance_of<N: NodeClient>(client: &N, account: Account) -> HarnessResult<U256> {
    client.balance(account.address).await
}
