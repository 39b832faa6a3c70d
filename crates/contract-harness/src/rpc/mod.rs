use std::borrow::Cow;
use std::future::Future;

use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::providers::fillers::{
    BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller,
};
use alloy::providers::Identity;
use alloy::rpc::types::{BlockId, TransactionInput, TransactionRequest};
use alloy::transports::http::reqwest::Url;
use alloy::transports::TransportError;
use error_stack::{Report, ResultExt};

use crate::config::SessionConfig;
use crate::errors::{HarnessError, HarnessResult, RpcContext};

mod receipt;

pub use receipt::{ReceiptLog, TransactionReceipt};

/// Result of an `eth_call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success(Bytes),
    /// The node reported a revert; carries the raw revert payload (possibly empty).
    Reverted(Bytes),
}

/// The capability set the harness drives a node through.
///
/// Implementations only translate requests; they never retry and never
/// interpret contract semantics.
pub trait NodeClient: Send + Sync + 'static {
    /// Human-readable endpoint, used in error context.
    fn endpoint(&self) -> String;

    /// `eth_accounts`, in node order.
    fn accounts(&self) -> impl Future<Output = HarnessResult<Vec<Address>>> + Send;

    fn balance(&self, address: Address) -> impl Future<Output = HarnessResult<U256>> + Send;

    fn gas_price(&self) -> impl Future<Output = HarnessResult<u128>> + Send;

    /// `eth_sendTransaction` from an unlocked account. Returns the transaction hash.
    fn send_transaction(
        &self,
        tx: TransactionRequest,
    ) -> impl Future<Output = HarnessResult<B256>> + Send;

    /// `eth_getTransactionReceipt`; `None` while the transaction is pending.
    fn receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = HarnessResult<Option<TransactionReceipt>>> + Send;

    /// `eth_call` against `block`, or the latest block when `None`.
    fn call(
        &self,
        tx: TransactionRequest,
        block: Option<u64>,
    ) -> impl Future<Output = HarnessResult<CallOutcome>> + Send;

    fn code_at(&self, address: Address) -> impl Future<Output = HarnessResult<Bytes>> + Send;

    /// `evm_snapshot`; returns the snapshot id.
    fn snapshot(&self) -> impl Future<Output = HarnessResult<String>> + Send;

    /// `evm_revert`; the snapshot is consumed by a successful revert.
    fn revert_to(&self, snapshot_id: String) -> impl Future<Output = HarnessResult<bool>> + Send;
}

/// Assemble a request for `eth_sendTransaction` / `eth_call`.
pub fn build_transaction(
    from: Option<Address>,
    to: TxKind,
    input: Bytes,
    gas_limit: Option<u64>,
    value: U256,
) -> TransactionRequest {
    TransactionRequest {
        from,
        to: Some(to),
        gas: gas_limit,
        value: Some(value),
        input: TransactionInput::both(input),
        ..Default::default()
    }
}

/// Poll for a receipt until the node confirms `tx_hash`.
///
/// A single confirmation is final on an ephemeral node. Exceeding the
/// confirmation timeout fails with [HarnessError::ConfirmationTimeout].
pub async fn wait_for_receipt<N: NodeClient>(
    client: &N,
    tx_hash: B256,
    session: &SessionConfig,
) -> HarnessResult<TransactionReceipt> {
    let poll_interval = session.poll_interval();
    let timeout = session.confirmation_timeout();

    let polling = async {
        loop {
            if let Some(receipt) = client.receipt(tx_hash).await? {
                return HarnessResult::Ok(receipt);
            }
            tokio::time::sleep(poll_interval).await;
        }
    };

    match tokio::time::timeout(timeout, polling).await {
        Ok(result) => result,
        Err(_) => Err(Report::new(HarnessError::ConfirmationTimeout {
            tx_hash,
            timeout_ms: session.confirmation_timeout_ms,
        })
        .attach(RpcContext {
            endpoint: client.endpoint(),
            method: "eth_getTransactionReceipt".to_string(),
            params: Some(format!("[\"{}\"]", tx_hash)),
        })),
    }
}

pub type HttpProvider = FillProvider<
    JoinFill<
        Identity,
        JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
    >,
    RootProvider,
>;

/// [NodeClient] over HTTP JSON-RPC.
#[derive(Clone, Debug)]
pub struct EvmRpc {
    pub url: Url,
    pub provider: HttpProvider,
}

impl EvmRpc {
    pub fn new(url: &str) -> HarnessResult<Self> {
        let url = Url::parse(url).map_err(|e| {
            Report::new(HarnessError::Config(format!("invalid rpc_url '{}': {}", url, e)))
        })?;

        let provider = ProviderBuilder::new().on_http(url.clone());
        Ok(Self { url, provider })
    }

    pub async fn get_chain_id(&self) -> HarnessResult<u64> {
        self.provider
            .get_chain_id()
            .await
            .map_err(node_error)
            .attach(self.context("eth_chainId", None))
    }

    fn context(&self, method: &str, params: Option<String>) -> RpcContext {
        RpcContext { endpoint: self.url.to_string(), method: method.to_string(), params }
    }

    /// Build the report for a rejected submission, with balance context when
    /// the node complains about funds.
    async fn submission_error(
        &self,
        tx: &TransactionRequest,
        error: TransportError,
    ) -> Report<HarnessError> {
        let message = error.to_string();
        let lowered = message.to_lowercase();

        if error.is_transport_error() {
            return Report::new(HarnessError::NodeUnavailable(message));
        }

        if lowered.contains("insufficient funds") {
            let address = tx.from.unwrap_or_default();
            let available = self.provider.get_balance(address).await.unwrap_or_default();
            let mut required = tx.value.unwrap_or_default();
            if let Ok(gas_price) = self.provider.get_gas_price().await {
                let gas = tx.gas.unwrap_or_default() as u128;
                required = required.saturating_add(U256::from(gas_price.saturating_mul(gas)));
            }
            return Report::new(HarnessError::InsufficientFunds { address, required, available })
                .attach_printable(message);
        }

        if lowered.contains("intrinsic gas too low")
            || lowered.contains("out of gas")
            || lowered.contains("gas too low")
        {
            return Report::new(HarnessError::GasExhausted { gas_limit: tx.gas.unwrap_or_default() })
                .attach_printable(message);
        }

        Report::new(HarnessError::Rpc(message))
    }
}

/// Map a transport-level failure onto the harness taxonomy.
fn node_error(error: TransportError) -> Report<HarnessError> {
    if error.is_transport_error() {
        Report::new(HarnessError::NodeUnavailable(error.to_string()))
    } else {
        Report::new(HarnessError::Rpc(error.to_string()))
    }
}

impl NodeClient for EvmRpc {
    fn endpoint(&self) -> String {
        self.url.to_string()
    }

    async fn accounts(&self) -> HarnessResult<Vec<Address>> {
        self.provider
            .get_accounts()
            .await
            .map_err(node_error)
            .attach(self.context("eth_accounts", None))
    }

    async fn balance(&self, address: Address) -> HarnessResult<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(node_error)
            .attach(self.context("eth_getBalance", Some(format!("[\"{}\", \"latest\"]", address))))
    }

    async fn gas_price(&self) -> HarnessResult<u128> {
        self.provider
            .get_gas_price()
            .await
            .map_err(node_error)
            .attach(self.context("eth_gasPrice", None))
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> HarnessResult<B256> {
        log::debug!("eth_sendTransaction from {:?} to {:?}", tx.from, tx.to);
        match self.provider.send_transaction(tx.clone()).await {
            Ok(pending) => Ok(*pending.tx_hash()),
            Err(e) => Err(self
                .submission_error(&tx, e)
                .await
                .attach(self.context("eth_sendTransaction", Some(format!("{:?}", tx))))),
        }
    }

    async fn receipt(&self, tx_hash: B256) -> HarnessResult<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map(|receipt| receipt.map(TransactionReceipt::from))
            .map_err(node_error)
            .attach(self.context("eth_getTransactionReceipt", Some(format!("[\"{}\"]", tx_hash))))
    }

    async fn call(&self, tx: TransactionRequest, block: Option<u64>) -> HarnessResult<CallOutcome> {
        let block_id = block.map(BlockId::number).unwrap_or_else(BlockId::latest);
        match self.provider.call(tx.clone()).block(block_id).await {
            Ok(output) => Ok(CallOutcome::Success(output)),
            Err(e) => {
                if let Some(payload) = e.as_error_resp() {
                    if let Some(data) = payload.as_revert_data() {
                        return Ok(CallOutcome::Reverted(data));
                    }
                    if payload.message.to_lowercase().contains("revert") {
                        return Ok(CallOutcome::Reverted(Bytes::new()));
                    }
                }
                Err(node_error(e).attach(self.context("eth_call", Some(format!("{:?}", tx)))))
            }
        }
    }

    async fn code_at(&self, address: Address) -> HarnessResult<Bytes> {
        self.provider
            .get_code_at(address)
            .await
            .map_err(node_error)
            .attach(self.context("eth_getCode", Some(format!("[\"{}\", \"latest\"]", address))))
    }

    async fn snapshot(&self) -> HarnessResult<String> {
        let result: serde_json::Value = self
            .provider
            .raw_request(Cow::Borrowed("evm_snapshot"), serde_json::json!([]))
            .await
            .map_err(node_error)
            .attach(self.context("evm_snapshot", None))?;

        result.as_str().map(str::to_string).ok_or_else(|| {
            Report::new(HarnessError::Rpc(format!("unexpected evm_snapshot result: {}", result)))
        })
    }

    async fn revert_to(&self, snapshot_id: String) -> HarnessResult<bool> {
        let result: serde_json::Value = self
            .provider
            .raw_request(Cow::Borrowed("evm_revert"), serde_json::json!([snapshot_id]))
            .await
            .map_err(node_error)
            .attach(self.context("evm_revert", Some(format!("[\"{}\"]", snapshot_id))))?;

        Ok(result.as_bool().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evm_rpc_rejects_malformed_url() {
        let error = EvmRpc::new("not a url").unwrap_err();
        assert!(matches!(error.current_context(), HarnessError::Config(msg) if msg.contains("not a url")));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_node_unavailable() {
        // Port 9 (discard) is not expected to speak JSON-RPC.
        let rpc = EvmRpc::new("http://127.0.0.1:9").unwrap();
        let error = rpc.accounts().await.unwrap_err();
        assert!(matches!(error.current_context(), HarnessError::NodeUnavailable(_)));
        let context = error.downcast_ref::<RpcContext>().unwrap();
        assert_eq!(context.method, "eth_accounts");
    }
}
