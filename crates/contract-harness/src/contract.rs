//! Live handle to a deployed contract.

use std::sync::Arc;

use alloy::dyn_abi::DynSolValue;
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{Address, TxKind, U256};
use error_stack::{Report, ResultExt};

use crate::accounts::Account;
use crate::artifacts::Artifact;
use crate::codec::{
    coerce_args, decode_logs, decode_output, decode_revert_reason, encode_call, is_read_only,
    ContractEvent, MethodTable, ReturnValue,
};
use crate::config::{HarnessConfig, SessionConfig};
use crate::errors::{
    ContractInfo, HarnessError, HarnessErrorExt, HarnessResult, RevertData, TransactionInfo,
};
use crate::rpc::{build_transaction, wait_for_receipt, CallOutcome, NodeClient, TransactionReceipt};
use crate::session::InFlightTracker;

/// Per-transaction overrides for [ContractHandle::send].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Defaults to the configured deployment gas limit.
    pub gas_limit: Option<u64>,
    pub value: U256,
}

impl SendOptions {
    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// A contract bound to its address and ABI.
///
/// Method names are resolved against a dispatch table built when the handle is
/// created; an unknown name fails before anything is sent to the node.
pub struct ContractHandle<N> {
    name: String,
    address: Address,
    abi: Arc<JsonAbi>,
    methods: Arc<MethodTable>,
    client: Arc<N>,
    session: SessionConfig,
    gas_limit: u64,
    tracker: InFlightTracker,
}

impl<N> Clone for ContractHandle<N> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            address: self.address,
            abi: self.abi.clone(),
            methods: self.methods.clone(),
            client: self.client.clone(),
            session: self.session.clone(),
            gas_limit: self.gas_limit,
            tracker: self.tracker.clone(),
        }
    }
}

impl<N> std::fmt::Debug for ContractHandle<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractHandle")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish()
    }
}

impl<N: NodeClient> ContractHandle<N> {
    /// Bind `artifact`'s ABI to a contract already deployed at `address`.
    pub fn at(address: Address, artifact: &Artifact, client: Arc<N>) -> Self {
        Self {
            name: artifact.name.clone(),
            address,
            methods: Arc::new(MethodTable::from_abi(&artifact.abi)),
            abi: Arc::new(artifact.abi.clone()),
            client,
            session: SessionConfig::default(),
            gas_limit: HarnessConfig::default().deploy.gas_limit,
            tracker: InFlightTracker::default(),
        }
    }

    pub fn with_config(mut self, config: &HarnessConfig) -> Self {
        self.session = config.session.clone();
        self.gas_limit = config.deploy.gas_limit;
        self
    }

    pub(crate) fn with_tracker(mut self, tracker: InFlightTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    pub fn client(&self) -> &Arc<N> {
        &self.client
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains(name)
    }

    /// Look up `name` in the dispatch table.
    pub fn method(&self, name: &str) -> HarnessResult<Method<'_, N>> {
        self.methods.overloads(name).with_contract_info(
            &self.name,
            Some(self.address),
            Some(name.to_string()),
        )?;
        Ok(Method {
            handle: self,
            name: name.to_string(),
            args: vec![],
            from: None,
            options: SendOptions::default(),
        })
    }

    /// Read-only invocation against the latest state. Nothing is mined and no
    /// gas is paid.
    pub async fn call(&self, method: &str, args: &[DynSolValue]) -> HarnessResult<ReturnValue> {
        self.method(method)?.args(args.to_vec()).call().await
    }

    /// State-changing invocation from `sender`, returning once the transaction
    /// is confirmed.
    pub async fn send(
        &self,
        method: &str,
        args: &[DynSolValue],
        sender: Account,
        options: SendOptions,
    ) -> HarnessResult<TransactionReceipt> {
        let mut builder = self.method(method)?.args(args.to_vec());
        builder.options = options;
        builder.send(sender).await
    }

    /// [Self::call] with arguments given as strings and coerced to the ABI types.
    pub async fn call_str(&self, method: &str, args: &[&str]) -> HarnessResult<ReturnValue> {
        let values = self.coerce(method, args)?;
        self.call(method, &values).await
    }

    /// [Self::send] with arguments given as strings and coerced to the ABI types.
    pub async fn send_str(
        &self,
        method: &str,
        args: &[&str],
        sender: Account,
        options: SendOptions,
    ) -> HarnessResult<TransactionReceipt> {
        let values = self.coerce(method, args)?;
        self.send(method, &values, sender, options).await
    }

    /// Events in `receipt` emitted by this contract.
    pub fn decode_logs(&self, receipt: &TransactionReceipt) -> HarnessResult<Vec<ContractEvent>> {
        decode_logs(&self.abi, self.address, &receipt.logs).with_contract_info(
            &self.name,
            Some(self.address),
            None,
        )
    }

    fn coerce(&self, method: &str, args: &[&str]) -> HarnessResult<Vec<DynSolValue>> {
        let overloads = self.methods.overloads(method).with_contract_info(
            &self.name,
            Some(self.address),
            Some(method.to_string()),
        )?;

        let mut last_error = None;
        for function in overloads.iter().filter(|f| f.inputs.len() == args.len()) {
            match coerce_args(method, &function.inputs, args) {
                Ok(values) => return Ok(values),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            Report::new(HarnessError::ArgumentMismatch {
                method: method.to_string(),
                detail: format!("no overload takes {} argument(s)", args.len()),
            })
        }))
    }

    fn contract_info(&self, function: &Function) -> ContractInfo {
        ContractInfo {
            name: self.name.clone(),
            address: Some(self.address),
            method: Some(function.signature()),
        }
    }

    async fn execute_call(
        &self,
        function: &Function,
        args: &[DynSolValue],
        from: Option<Address>,
    ) -> HarnessResult<ReturnValue> {
        let calldata = encode_call(function, args).attach(self.contract_info(function))?;
        if !is_read_only(function) {
            log::debug!("simulating state-changing method {} with eth_call", function.name);
        }
        log::debug!("eth_call {}.{}", self.name, function.signature());

        let tx = build_transaction(from, TxKind::Call(self.address), calldata, None, U256::ZERO);
        match self.client.call(tx, None).await.attach(self.contract_info(function))? {
            CallOutcome::Success(data) => {
                decode_output(function, &data).attach(self.contract_info(function))
            }
            CallOutcome::Reverted(data) => {
                let reason = decode_revert_reason(&data);
                Err(Report::new(HarnessError::ExecutionReverted { reason })
                    .attach(RevertData(data))
                    .attach(self.contract_info(function)))
            }
        }
    }

    async fn execute_send(
        &self,
        function: &Function,
        args: &[DynSolValue],
        sender: Account,
        options: SendOptions,
    ) -> HarnessResult<TransactionReceipt> {
        let gas_limit = options.gas_limit.unwrap_or(self.gas_limit);
        let tx_info = TransactionInfo {
            from: sender.address,
            to: Some(self.address),
            value: options.value,
            gas_limit,
        };
        if gas_limit == 0 {
            return Err(Report::new(HarnessError::GasExhausted { gas_limit }).attach(tx_info));
        }

        let calldata = encode_call(function, args).attach(self.contract_info(function))?;
        let tx = build_transaction(
            Some(sender.address),
            TxKind::Call(self.address),
            calldata,
            Some(gas_limit),
            options.value,
        );

        log::debug!("sending {}.{} from {}", self.name, function.signature(), sender);
        let guard = self.tracker.begin();
        let tx_hash = match self.client.send_transaction(tx.clone()).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => {
                guard.finish();
                return Err(e.attach(tx_info).attach(self.contract_info(function)));
            }
        };
        // Left armed on timeout: the transaction may still be mined.
        let mut receipt = wait_for_receipt(self.client.as_ref(), tx_hash, &self.session)
            .await
            .with_transaction_info(tx_info.clone())?;
        guard.finish();
        receipt.gas_limit = Some(gas_limit);

        if receipt.is_success() {
            return Ok(receipt);
        }

        if receipt.exhausted_gas() {
            return Err(Report::new(HarnessError::GasExhausted { gas_limit })
                .attach(tx_info)
                .attach(self.contract_info(function))
                .attach(receipt));
        }

        let replay_block = receipt.block_number.map(|n| n.saturating_sub(1));
        let reason = match self.client.call(tx, replay_block).await {
            Ok(CallOutcome::Reverted(data)) => decode_revert_reason(&data),
            Ok(CallOutcome::Success(_)) => String::new(),
            Err(e) => {
                log::debug!("could not replay failed transaction {}: {:?}", tx_hash, e);
                String::new()
            }
        };
        receipt.revert_reason = Some(reason.clone());
        log::warn!("{}.{} reverted: {}", self.name, function.name, reason);

        Err(Report::new(HarnessError::ExecutionReverted { reason })
            .attach(tx_info)
            .attach(self.contract_info(function))
            .attach(receipt))
    }
}

/// One method of a [ContractHandle], with its arguments and sender.
pub struct Method<'a, N> {
    handle: &'a ContractHandle<N>,
    name: String,
    args: Vec<DynSolValue>,
    from: Option<Account>,
    options: SendOptions,
}

impl<N> std::fmt::Debug for Method<'_, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("args", &self.args)
            .field("from", &self.from)
            .field("options", &self.options)
            .finish()
    }
}

impl<'a, N: NodeClient> Method<'a, N> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arg(mut self, value: DynSolValue) -> Self {
        self.args.push(value);
        self
    }

    pub fn args(mut self, values: Vec<DynSolValue>) -> Self {
        self.args = values;
        self
    }

    /// Caller address seen by the contract during [Self::call].
    pub fn from(mut self, account: Account) -> Self {
        self.from = Some(account);
        self
    }

    pub fn gas_limit(mut self, gas_limit: u64) -> Self {
        self.options.gas_limit = Some(gas_limit);
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.options.value = value;
        self
    }

    fn resolve(&self) -> HarnessResult<&'a Function> {
        let handle = self.handle;
        handle.methods.resolve(&self.name, &self.args).with_contract_info(
            &handle.name,
            Some(handle.address),
            Some(self.name.clone()),
        )
    }

    pub async fn call(self) -> HarnessResult<ReturnValue> {
        let function = self.resolve()?;
        self.handle.execute_call(function, &self.args, self.from.map(|a| a.address)).await
    }

    pub async fn send(self, sender: Account) -> HarnessResult<TransactionReceipt> {
        let function = self.resolve()?;
        self.handle.execute_send(function, &self.args, sender, self.options).await
    }
}
