//! Contract deployment from a funded account.

use std::sync::Arc;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{TxKind, U256};
use error_stack::{Report, ResultExt};

use crate::accounts::Account;
use crate::artifacts::Artifact;
use crate::codec::{decode_revert_reason, encode_init_code};
use crate::config::{HarnessConfig, SessionConfig};
use crate::constants::DEFAULT_GAS_LIMIT;
use crate::contract::ContractHandle;
use crate::errors::{
    ContractInfo, HarnessError, HarnessErrorExt, HarnessResult, RevertData, TransactionInfo,
};
use crate::rpc::{build_transaction, wait_for_receipt, CallOutcome, NodeClient};
use crate::session::InFlightTracker;

/// Everything needed to put one contract on chain.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    pub artifact: Artifact,
    pub constructor_args: Vec<DynSolValue>,
    pub sender: Account,
    pub gas_limit: u64,
    pub value: U256,
}

impl DeploymentRequest {
    pub fn new(artifact: Artifact, sender: Account) -> Self {
        Self {
            artifact,
            constructor_args: vec![],
            sender,
            gas_limit: DEFAULT_GAS_LIMIT,
            value: U256::ZERO,
        }
    }

    pub fn with_args(mut self, constructor_args: Vec<DynSolValue>) -> Self {
        self.constructor_args = constructor_args;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    fn transaction_info(&self) -> TransactionInfo {
        TransactionInfo {
            from: self.sender.address,
            to: None,
            value: self.value,
            gas_limit: self.gas_limit,
        }
    }

    fn contract_info(&self) -> ContractInfo {
        ContractInfo { name: self.artifact.name.clone(), address: None, method: None }
    }
}

/// Sends deployment transactions and binds the resulting contracts.
pub struct Deployer<N> {
    client: Arc<N>,
    config: HarnessConfig,
    tracker: InFlightTracker,
}

impl<N: NodeClient> Deployer<N> {
    pub fn new(client: Arc<N>, config: &HarnessConfig) -> Self {
        Self { client, config: config.clone(), tracker: InFlightTracker::default() }
    }

    pub(crate) fn with_tracker(mut self, tracker: InFlightTracker) -> Self {
        self.tracker = tracker;
        self
    }

    fn session(&self) -> &SessionConfig {
        &self.config.session
    }

    /// Deploy and wait for a single confirmation.
    ///
    /// No handle exists unless the deployment is confirmed successful. Failures
    /// are never retried.
    pub async fn deploy(&self, request: DeploymentRequest) -> HarnessResult<ContractHandle<N>> {
        let name = request.artifact.name.clone();
        let tx_info = request.transaction_info();
        let gas_limit = request.gas_limit;

        if gas_limit == 0 {
            return Err(Report::new(HarnessError::GasExhausted { gas_limit })
                .attach_printable("Deployment gas limit must be positive")
                .attach(tx_info)
                .attach(request.contract_info()));
        }

        let init_code = encode_init_code(
            &request.artifact.bytecode,
            &request.artifact.abi,
            &request.constructor_args,
        )
        .attach(request.contract_info())?;

        self.check_funds(&request).await?;

        log::info!(
            "deploying {} from {} (gas limit {}, {} byte(s) of init code)",
            name,
            request.sender,
            gas_limit,
            init_code.len()
        );

        let tx = build_transaction(
            Some(request.sender.address),
            TxKind::Create,
            init_code,
            Some(gas_limit),
            request.value,
        );

        let guard = self.tracker.begin();
        let tx_hash = match self.client.send_transaction(tx.clone()).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                guard.finish();
                return Err(e.attach(tx_info).attach(request.contract_info()));
            }
        };
        let mut receipt = wait_for_receipt(self.client.as_ref(), tx_hash, self.session())
            .await
            .with_transaction_info(tx_info.clone())
            .attach(request.contract_info())?;
        guard.finish();
        receipt.gas_limit = Some(gas_limit);

        if !receipt.is_success() {
            if receipt.exhausted_gas() {
                log::warn!("deployment of {} ran out of gas ({} used)", name, receipt.gas_used);
                return Err(Report::new(HarnessError::GasExhausted { gas_limit })
                    .attach(tx_info)
                    .attach(request.contract_info())
                    .attach(receipt));
            }

            let replay_block = receipt.block_number.map(|n| n.saturating_sub(1));
            let (reason, data) = match self.client.call(tx, replay_block).await {
                Ok(CallOutcome::Reverted(data)) => (decode_revert_reason(&data), data),
                Ok(CallOutcome::Success(_)) => (String::new(), Default::default()),
                Err(e) => {
                    log::debug!("could not replay failed deployment {}: {:?}", tx_hash, e);
                    (String::new(), Default::default())
                }
            };
            receipt.revert_reason = Some(reason.clone());
            log::warn!("constructor of {} reverted: {}", name, reason);
            return Err(Report::new(HarnessError::ConstructorReverted { reason })
                .attach(RevertData(data))
                .attach(tx_info)
                .attach(request.contract_info())
                .attach(receipt));
        }

        let Some(address) = receipt.contract_address else {
            return Err(Report::new(HarnessError::Rpc(format!(
                "receipt for deployment {} has no contract address",
                tx_hash
            )))
            .attach(request.contract_info()));
        };

        log::info!(
            "deployed {} at {} in block {:?} ({} gas)",
            name,
            address,
            receipt.block_number,
            receipt.gas_used
        );

        Ok(ContractHandle::at(address, &request.artifact, self.client.clone())
            .with_config(&self.config)
            .with_tracker(self.tracker.clone()))
    }

    /// Fail before submission when the sender cannot cover value plus the gas ceiling.
    async fn check_funds(&self, request: &DeploymentRequest) -> HarnessResult<()> {
        let address = request.sender.address;
        let available = self.client.balance(address).await?;
        let gas_price = self.client.gas_price().await?;
        let required = request
            .value
            .saturating_add(U256::from(request.gas_limit).saturating_mul(U256::from(gas_price)));

        if available < required {
            return Err(Report::new(HarnessError::InsufficientFunds {
                address,
                required,
                available,
            })
            .attach(request.transaction_info())
            .attach_printable(format!("Gas price: {} wei", gas_price)));
        }
        Ok(())
    }
}
