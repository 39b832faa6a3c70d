use alloy::primitives::{Address, Bytes, LogData, B256};
use alloy::rpc::types::TransactionReceipt as RpcTransactionReceipt;

/// Outcome of a confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub tx_hash: B256,
    /// `true` when execution completed without reverting.
    pub status: bool,
    /// Set for successful contract creations.
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    /// Gas ceiling the transaction was submitted with, when known.
    pub gas_limit: Option<u64>,
    pub block_number: Option<u64>,
    pub logs: Vec<ReceiptLog>,
    /// Filled in by the harness when a failed transaction is replayed.
    pub revert_reason: Option<String>,
}

impl TransactionReceipt {
    pub fn is_success(&self) -> bool {
        self.status
    }

    /// True when the transaction burned its whole gas allowance.
    pub fn exhausted_gas(&self) -> bool {
        match self.gas_limit {
            Some(limit) => !self.status && self.gas_used >= limit,
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

impl ReceiptLog {
    pub fn log_data(&self) -> LogData {
        LogData::new_unchecked(self.topics.clone(), self.data.clone())
    }
}

impl From<RpcTransactionReceipt> for TransactionReceipt {
    fn from(receipt: RpcTransactionReceipt) -> Self {
        let logs = receipt
            .inner
            .logs()
            .iter()
            .map(|log| ReceiptLog {
                address: log.address(),
                topics: log.topics().to_vec(),
                data: log.data().data.clone(),
            })
            .collect();

        Self {
            tx_hash: receipt.transaction_hash,
            status: receipt.status(),
            contract_address: receipt.contract_address,
            gas_used: receipt.gas_used,
            gas_limit: None,
            block_number: receipt.block_number,
            logs,
            revert_reason: None,
        }
    }
}
