//! ABI encoding and decoding for deployed contracts.

pub mod decoding;
pub mod dispatch;
pub mod encoding;

use alloy::dyn_abi::DynSolValue;

pub use decoding::{decode_logs, decode_output, decode_revert_reason, ContractEvent};
pub use dispatch::{is_read_only, MethodTable};
pub use encoding::{check_args, coerce_args, encode_call, encode_init_code};

/// Decoded value returned by a read-only call.
pub type ReturnValue = DynSolValue;
