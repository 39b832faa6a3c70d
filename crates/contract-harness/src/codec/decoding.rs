use alloy::dyn_abi::{DynSolType, DynSolValue, EventExt, Specifier};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{hex, Address, U256};
use error_stack::{Report, ResultExt};

use crate::errors::{HarnessError, HarnessResult};
use crate::rpc::ReceiptLog;

/// `Error(string)`
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];
/// `Panic(uint256)`
const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

/// Decode the return data of `function`.
///
/// A single output decodes to that value, several to a tuple, none to an
/// empty tuple.
pub fn decode_output(function: &Function, data: &[u8]) -> HarnessResult<DynSolValue> {
    let types = function
        .outputs
        .iter()
        .map(|param| param.resolve())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            Report::new(HarnessError::ArgumentMismatch {
                method: function.name.clone(),
                detail: format!("unsupported output type: {}", e),
            })
        })?;

    if types.is_empty() {
        return Ok(DynSolValue::Tuple(vec![]));
    }

    let decoded = DynSolType::Tuple(types)
        .abi_decode_params(data)
        .map_err(|e| Report::new(HarnessError::Rpc(format!("failed to decode return data: {}", e))))
        .attach_printable_lazy(|| {
            format!("Decoding output of '{}' from 0x{}", function.signature(), hex::encode(data))
        })?;

    match decoded {
        DynSolValue::Tuple(mut values) if values.len() == 1 => Ok(values.remove(0)),
        other => Ok(other),
    }
}

/// Human-readable reason for a revert payload.
///
/// `Error(string)` yields the message as written in the contract,
/// `Panic(uint256)` the panic code, anything else the raw hex.
pub fn decode_revert_reason(data: &[u8]) -> String {
    if data.is_empty() {
        return String::new();
    }

    if let Some(payload) = data.strip_prefix(ERROR_SELECTOR.as_slice()) {
        if let Ok(DynSolValue::String(reason)) = DynSolType::String.abi_decode(payload) {
            return reason;
        }
    }

    if let Some(payload) = data.strip_prefix(PANIC_SELECTOR.as_slice()) {
        if payload.len() == 32 {
            let code = u64::try_from(U256::from_be_slice(payload)).unwrap_or(u64::MAX);
            return format!("panic code 0x{:02x} ({})", code, panic_description(code));
        }
    }

    format!("0x{}", hex::encode(data))
}

fn panic_description(code: u64) -> &'static str {
    match code {
        0x01 => "assertion failed",
        0x11 => "arithmetic overflow or underflow",
        0x12 => "division or modulo by zero",
        0x21 => "invalid enum value",
        0x22 => "invalid storage byte array",
        0x31 => "pop on empty array",
        0x32 => "array index out of bounds",
        0x41 => "out of memory",
        0x51 => "call to zero-initialized function",
        _ => "unknown panic",
    }
}

/// An event emitted by a bound contract, decoded against its ABI.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractEvent {
    pub name: String,
    pub address: Address,
    pub indexed: Vec<DynSolValue>,
    pub body: Vec<DynSolValue>,
}

/// Decode the logs emitted by `address` whose first topic matches an event in `abi`.
/// Logs from other addresses and anonymous or unknown events are skipped.
pub fn decode_logs(
    abi: &JsonAbi,
    address: Address,
    logs: &[ReceiptLog],
) -> HarnessResult<Vec<ContractEvent>> {
    logs.iter()
        .filter(|log| log.address == address)
        .filter_map(|log| {
            let first_topic = log.topics.first()?;
            let event = abi.events().find(|e| !e.anonymous && e.selector() == *first_topic)?;

            let decoded = match event.decode_log(&log.log_data()) {
                Ok(decoded) => decoded,
                Err(e) => {
                    return Some(Err(Report::new(HarnessError::Rpc(format!(
                        "failed to decode log: {}",
                        e
                    )))
                    .attach_printable(format!(
                        "Decoding event '{}' at address {}",
                        event.name, log.address
                    ))))
                }
            };

            Some(Ok(ContractEvent {
                name: event.name.clone(),
                address: log.address,
                indexed: decoded.indexed,
                body: decoded.body,
            }))
        })
        .collect()
}
