//! In-process node double that runs `Inbox` semantics without an EVM.
//!
//! Deployments are recognized by the Inbox bytecode prefix; the constructor
//! argument and `setMessage` calls are decoded with the real ABI, so everything
//! above the [NodeClient] seam is exercised unchanged.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::json_abi::JsonAbi;
use alloy::primitives::{keccak256, Address, Bytes, TxKind, B256, U256};
use alloy::rpc::types::TransactionRequest;
use error_stack::Report;

use crate::artifacts::Artifact;
use crate::errors::{HarnessError, HarnessResult};
use crate::rpc::{CallOutcome, NodeClient, ReceiptLog, TransactionReceipt};

pub const GAS_PRICE: u128 = 1_000_000_000;
/// Below this, an Inbox deployment runs out of gas.
pub const INBOX_DEPLOY_GAS: u64 = 250_000;
pub const SET_MESSAGE_GAS: u64 = 35_000;
const REVERT_GAS: u64 = 24_000;

pub const EMPTY_MESSAGE_REASON: &str = "message must not be empty";
pub const EMPTY_INITIAL_MESSAGE_REASON: &str = "initial message required";

pub fn eth(amount: u64) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(18u64))
}

#[derive(Debug, Clone, Default)]
struct ChainState {
    balances: HashMap<Address, U256>,
    inboxes: HashMap<Address, String>,
    block_number: u64,
}

#[derive(Debug, Default)]
struct Inner {
    state: ChainState,
    snapshots: BTreeMap<u64, ChainState>,
    next_snapshot: u64,
    receipts: HashMap<B256, TransactionReceipt>,
    nonce: u64,
    requests: usize,
    sent: usize,
}

enum Execution {
    Created(Address),
    Called(Vec<ReceiptLog>),
    Reverted,
    OutOfGas,
}

pub struct ScriptedNode {
    accounts: Vec<Address>,
    inbox: Artifact,
    inner: Mutex<Inner>,
    unavailable: bool,
    automine: AtomicBool,
    fail_revert: AtomicBool,
    fail_snapshot: AtomicBool,
}

impl ScriptedNode {
    pub fn new(inbox: Artifact) -> Self {
        let accounts: Vec<Address> = (1..=3u8).map(Address::repeat_byte).collect();
        let mut inner = Inner::default();
        for account in &accounts {
            inner.state.balances.insert(*account, eth(10_000));
        }
        Self {
            accounts,
            inbox,
            inner: Mutex::new(inner),
            unavailable: false,
            automine: AtomicBool::new(true),
            fail_revert: AtomicBool::new(false),
            fail_snapshot: AtomicBool::new(false),
        }
    }

    /// Every request fails as if the endpoint were down.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Transactions are accepted but never mined.
    pub fn without_mining(self) -> Self {
        self.pause_mining();
        self
    }

    /// Stop mining from now on; already mined transactions keep their receipts.
    pub fn pause_mining(&self) {
        self.automine.store(false, Ordering::SeqCst);
    }

    /// The next `evm_revert` fails at the transport level, once.
    pub fn fail_next_revert(&self) {
        self.fail_revert.store(true, Ordering::SeqCst);
    }

    /// The next `evm_snapshot` fails at the transport level, once.
    pub fn fail_next_snapshot(&self) {
        self.fail_snapshot.store(true, Ordering::SeqCst);
    }

    pub fn with_balance(self, address: Address, balance: U256) -> Self {
        self.lock().state.balances.insert(address, balance);
        self
    }

    pub fn accounts_list(&self) -> Vec<Address> {
        self.accounts.clone()
    }

    /// Number of requests of any kind received so far.
    pub fn request_count(&self) -> usize {
        self.lock().requests
    }

    pub fn sent_count(&self) -> usize {
        self.lock().sent
    }

    pub fn inbox_count(&self) -> usize {
        self.lock().state.inboxes.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    fn enter(&self) -> HarnessResult<std::sync::MutexGuard<'_, Inner>> {
        if self.unavailable {
            return Err(Report::new(HarnessError::NodeUnavailable(
                "connection refused".to_string(),
            )));
        }
        let mut inner = self.lock();
        inner.requests += 1;
        Ok(inner)
    }

    fn abi(&self) -> &JsonAbi {
        &self.inbox.abi
    }

    fn constructor_message(&self, input: &[u8]) -> Option<String> {
        let args = input.strip_prefix(self.inbox.bytecode.as_ref())?;
        match DynSolType::Tuple(vec![DynSolType::String]).abi_decode_params(args).ok()? {
            DynSolValue::Tuple(values) => match values.first()? {
                DynSolValue::String(message) => Some(message.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    fn set_message_arg(&self, input: &[u8]) -> Option<String> {
        let function = &self.abi().functions.get("setMessage")?[0];
        let args = input.strip_prefix(function.selector().as_slice())?;
        match DynSolType::Tuple(vec![DynSolType::String]).abi_decode_params(args).ok()? {
            DynSolValue::Tuple(values) => match values.first()? {
                DynSolValue::String(message) => Some(message.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    fn is_message_call(&self, input: &[u8]) -> bool {
        self.abi()
            .functions
            .get("message")
            .map(|fs| fs.iter().any(|f| input.starts_with(f.selector().as_slice())))
            .unwrap_or(false)
    }

    /// Read-only execution against `state`.
    fn simulate(&self, state: &ChainState, tx: &TransactionRequest) -> CallOutcome {
        let input = tx.input.input().cloned().unwrap_or_default();
        match tx.to {
            Some(TxKind::Call(address)) => {
                let Some(message) = state.inboxes.get(&address) else {
                    return CallOutcome::Success(Bytes::new());
                };
                if self.is_message_call(&input) {
                    let encoded =
                        DynSolValue::Tuple(vec![DynSolValue::String(message.clone())]).abi_encode_params();
                    return CallOutcome::Success(Bytes::from(encoded));
                }
                match self.set_message_arg(&input) {
                    Some(new_message) if new_message.is_empty() => {
                        CallOutcome::Reverted(error_string(EMPTY_MESSAGE_REASON))
                    }
                    Some(_) => CallOutcome::Success(Bytes::new()),
                    None => CallOutcome::Reverted(Bytes::new()),
                }
            }
            _ => match self.constructor_message(&input) {
                Some(message) if message.is_empty() => {
                    CallOutcome::Reverted(error_string(EMPTY_INITIAL_MESSAGE_REASON))
                }
                Some(_) => CallOutcome::Success(Bytes::new()),
                None => CallOutcome::Reverted(Bytes::new()),
            },
        }
    }

    fn execute(&self, inner: &mut Inner, tx: &TransactionRequest, from: Address) -> (Execution, u64) {
        let input = tx.input.input().cloned().unwrap_or_default();
        let gas_limit = tx.gas.unwrap_or_default();

        match tx.to {
            Some(TxKind::Call(address)) => {
                if !inner.state.inboxes.contains_key(&address) {
                    return (Execution::Called(vec![]), 21_000);
                }
                if gas_limit < SET_MESSAGE_GAS {
                    return (Execution::OutOfGas, gas_limit);
                }
                match self.set_message_arg(&input) {
                    Some(message) if !message.is_empty() => {
                        inner.state.inboxes.insert(address, message.clone());
                        let event = self.abi().events().next().map(|e| e.selector()).unwrap_or_default();
                        let log = ReceiptLog {
                            address,
                            topics: vec![event, B256::left_padding_from(from.as_slice())],
                            data: Bytes::from(
                                DynSolValue::Tuple(vec![DynSolValue::String(message)])
                                    .abi_encode_params(),
                            ),
                        };
                        (Execution::Called(vec![log]), SET_MESSAGE_GAS)
                    }
                    _ => (Execution::Reverted, REVERT_GAS),
                }
            }
            _ => {
                if gas_limit < INBOX_DEPLOY_GAS {
                    return (Execution::OutOfGas, gas_limit);
                }
                match self.constructor_message(&input) {
                    Some(message) if !message.is_empty() => {
                        let word = B256::from(U256::from(0x1000 + inner.nonce).to_be_bytes::<32>());
                        let address = Address::from_slice(&word[12..]);
                        inner.state.inboxes.insert(address, message);
                        (Execution::Created(address), INBOX_DEPLOY_GAS - 10_000)
                    }
                    _ => (Execution::Reverted, REVERT_GAS),
                }
            }
        }
    }
}

/// `Error(string)` revert payload.
pub fn error_string(reason: &str) -> Bytes {
    let mut data = vec![0x08, 0xc3, 0x79, 0xa0];
    data.extend(DynSolValue::String(reason.to_string()).abi_encode());
    Bytes::from(data)
}

impl NodeClient for ScriptedNode {
    fn endpoint(&self) -> String {
        "scripted://inbox".to_string()
    }

    async fn accounts(&self) -> HarnessResult<Vec<Address>> {
        self.enter()?;
        Ok(self.accounts.clone())
    }

    async fn balance(&self, address: Address) -> HarnessResult<U256> {
        let inner = self.enter()?;
        Ok(inner.state.balances.get(&address).copied().unwrap_or_default())
    }

    async fn gas_price(&self) -> HarnessResult<u128> {
        self.enter()?;
        Ok(GAS_PRICE)
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> HarnessResult<B256> {
        let mut inner = self.enter()?;
        let Some(from) = tx.from.filter(|from| self.accounts.contains(from)) else {
            return Err(Report::new(HarnessError::Rpc("sender account not recognized".to_string())));
        };
        let gas_limit = tx.gas.unwrap_or_default();
        let value = tx.value.unwrap_or_default();
        let available = inner.state.balances.get(&from).copied().unwrap_or_default();
        let required = value + U256::from(gas_limit) * U256::from(GAS_PRICE);
        if available < required {
            return Err(Report::new(HarnessError::InsufficientFunds {
                address: from,
                required,
                available,
            }));
        }

        inner.nonce += 1;
        inner.sent += 1;
        let tx_hash = keccak256(inner.nonce.to_be_bytes());
        if !self.automine.load(Ordering::SeqCst) {
            return Ok(tx_hash);
        }

        let (execution, gas_used) = self.execute(&mut inner, &tx, from);
        let fee = U256::from(gas_used) * U256::from(GAS_PRICE);
        if let Some(balance) = inner.state.balances.get_mut(&from) {
            *balance -= fee;
        }
        inner.state.block_number += 1;

        let (status, contract_address, logs) = match execution {
            Execution::Created(address) => (true, Some(address), vec![]),
            Execution::Called(logs) => (true, None, logs),
            Execution::Reverted | Execution::OutOfGas => (false, None, vec![]),
        };
        let receipt = TransactionReceipt {
            tx_hash,
            status,
            contract_address,
            gas_used,
            gas_limit: None,
            block_number: Some(inner.state.block_number),
            logs,
            revert_reason: None,
        };
        inner.receipts.insert(tx_hash, receipt);
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: B256) -> HarnessResult<Option<TransactionReceipt>> {
        let inner = self.enter()?;
        Ok(inner.receipts.get(&tx_hash).cloned())
    }

    async fn call(&self, tx: TransactionRequest, _block: Option<u64>) -> HarnessResult<CallOutcome> {
        let inner = self.enter()?;
        Ok(self.simulate(&inner.state, &tx))
    }

    async fn code_at(&self, address: Address) -> HarnessResult<Bytes> {
        let inner = self.enter()?;
        if inner.state.inboxes.contains_key(&address) {
            Ok(Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]))
        } else {
            Ok(Bytes::new())
        }
    }

    async fn snapshot(&self) -> HarnessResult<String> {
        let mut inner = self.enter()?;
        if self.fail_snapshot.swap(false, Ordering::SeqCst) {
            return Err(Report::new(HarnessError::Rpc("evm_snapshot: connection reset".to_string())));
        }
        inner.next_snapshot += 1;
        let id = inner.next_snapshot;
        let state = inner.state.clone();
        inner.snapshots.insert(id, state);
        Ok(format!("0x{:x}", id))
    }

    async fn revert_to(&self, snapshot_id: String) -> HarnessResult<bool> {
        let mut inner = self.enter()?;
        if self.fail_revert.swap(false, Ordering::SeqCst) {
            return Err(Report::new(HarnessError::Rpc("evm_revert: connection reset".to_string())));
        }
        let Ok(id) = u64::from_str_radix(snapshot_id.trim_start_matches("0x"), 16) else {
            return Ok(false);
        };
        let Some(state) = inner.snapshots.get(&id).cloned() else {
            return Ok(false);
        };
        inner.state = state;
        inner.snapshots.retain(|existing, _| *existing < id);
        Ok(true)
    }
}
