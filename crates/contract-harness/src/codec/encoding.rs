use alloy::dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier};
use alloy::json_abi::{Function, JsonAbi, Param};
use alloy::primitives::Bytes;
use error_stack::{Report, ResultExt};

use crate::errors::{HarnessError, HarnessResult};

/// Check arity and types of `args` against `params`.
pub fn check_args(method: &str, params: &[Param], args: &[DynSolValue]) -> HarnessResult<()> {
    if params.len() != args.len() {
        let mut error = Report::new(HarnessError::ArgumentMismatch {
            method: method.to_string(),
            detail: format!("expects {} argument(s), got {}", params.len(), args.len()),
        });
        error = error.attach_printable("Expected arguments:");
        for (i, param) in params.iter().enumerate() {
            let status = if i < args.len() { "✓" } else { "✗ missing" };
            error = error.attach_printable(format!(
                "  [{}] {}: {} {}",
                i,
                if param.name.is_empty() { "arg" } else { &param.name },
                param.ty,
                status
            ));
        }
        return Err(error);
    }

    for (i, (param, arg)) in params.iter().zip(args).enumerate() {
        let expected = resolve_param(method, param)?;
        if !expected.matches(arg) {
            let received = arg
                .as_type()
                .map(|ty| ty.sol_type_name().into_owned())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(Report::new(HarnessError::ArgumentMismatch {
                method: method.to_string(),
                detail: format!(
                    "argument #{} ({}) expects {}, got {}",
                    i,
                    if param.name.is_empty() { "arg" } else { &param.name },
                    param.ty,
                    received
                ),
            }));
        }
    }
    Ok(())
}

fn resolve_param(method: &str, param: &Param) -> HarnessResult<DynSolType> {
    param.resolve().map_err(|e| {
        Report::new(HarnessError::ArgumentMismatch {
            method: method.to_string(),
            detail: format!("unsupported abi type '{}': {}", param.ty, e),
        })
    })
}

/// Selector-prefixed calldata for `function`.
pub fn encode_call(function: &Function, args: &[DynSolValue]) -> HarnessResult<Bytes> {
    check_args(&function.name, &function.inputs, args)?;
    function.abi_encode_input(args).map(Bytes::from).map_err(|e| {
        Report::new(HarnessError::ArgumentMismatch {
            method: function.name.clone(),
            detail: e.to_string(),
        })
    })
}

/// Creation code: the artifact bytecode followed by the encoded constructor arguments.
pub fn encode_init_code(
    bytecode: &Bytes,
    abi: &JsonAbi,
    constructor_args: &[DynSolValue],
) -> HarnessResult<Bytes> {
    let mut init_code = bytecode.to_vec();
    match &abi.constructor {
        Some(constructor) => {
            check_args("constructor", &constructor.inputs, constructor_args)?;
            let mut encoded = constructor.abi_encode_input(constructor_args).map_err(|e| {
                Report::new(HarnessError::ArgumentMismatch {
                    method: "constructor".to_string(),
                    detail: e.to_string(),
                })
            })?;
            init_code.append(&mut encoded);
        }
        None if !constructor_args.is_empty() => {
            return Err(Report::new(HarnessError::ArgumentMismatch {
                method: "constructor".to_string(),
                detail: "constructor arguments provided, but abi has no constructor".to_string(),
            }));
        }
        None => {}
    }
    Ok(Bytes::from(init_code))
}

/// Coerce string-form arguments (`"42"`, `"0xabc..."`, `"[1,2]"`, `"hello"`) into
/// values of the parameter types.
pub fn coerce_args(method: &str, params: &[Param], raw: &[&str]) -> HarnessResult<Vec<DynSolValue>> {
    if params.len() != raw.len() {
        return Err(Report::new(HarnessError::ArgumentMismatch {
            method: method.to_string(),
            detail: format!("expects {} argument(s), got {}", params.len(), raw.len()),
        }));
    }

    params
        .iter()
        .zip(raw)
        .enumerate()
        .map(|(i, (param, value))| {
            let ty = resolve_param(method, param)?;
            ty.coerce_str(value)
                .map_err(|e| {
                    Report::new(HarnessError::ArgumentMismatch {
                        method: method.to_string(),
                        detail: format!("argument #{} is not a valid {}: {}", i, param.ty, e),
                    })
                })
                .attach_printable_lazy(|| format!("Coercing '{}'", value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{hex, Address, U256};

    fn inbox_abi() -> JsonAbi {
        serde_json::from_str(
            r#"[
                {"type":"constructor","inputs":[{"name":"initialMessage","type":"string"}],"stateMutability":"nonpayable"},
                {"type":"function","name":"setMessage","inputs":[{"name":"newMessage","type":"string"}],"outputs":[],"stateMutability":"nonpayable"},
                {"type":"function","name":"transfer","inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],"outputs":[{"name":"","type":"bool"}],"stateMutability":"nonpayable"}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn encode_call_prefixes_selector() {
        let abi = inbox_abi();
        let function = &abi.functions["setMessage"][0];
        let calldata = encode_call(function, &[DynSolValue::String("loving it".into())]).unwrap();
        assert_eq!(&calldata[..4], function.selector().as_slice());
        // selector + offset word + length word + one data word
        assert_eq!(calldata.len(), 4 + 32 * 3);
    }

    #[test]
    fn wrong_type_is_argument_mismatch() {
        let abi = inbox_abi();
        let function = &abi.functions["setMessage"][0];
        let error = encode_call(function, &[DynSolValue::Bool(true)]).unwrap_err();
        match error.current_context() {
            HarnessError::ArgumentMismatch { method, detail } => {
                assert_eq!(method, "setMessage");
                assert!(detail.contains("expects string"), "{}", detail);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn init_code_appends_constructor_args() {
        let abi = inbox_abi();
        let bytecode = Bytes::from(hex::decode("6080604052").unwrap());
        let init_code =
            encode_init_code(&bytecode, &abi, &[DynSolValue::String("Hi there".into())]).unwrap();
        assert!(init_code.starts_with(&bytecode));
        assert_eq!(init_code.len(), bytecode.len() + 32 * 3);
    }

    #[test]
    fn init_code_validates_constructor_arity() {
        let abi = inbox_abi();
        let bytecode = Bytes::from_static(&[0x60, 0x80]);
        let error = encode_init_code(&bytecode, &abi, &[]).unwrap_err();
        assert!(matches!(error.current_context(), HarnessError::ArgumentMismatch { method, .. } if method == "constructor"));

        let no_constructor = JsonAbi::default();
        let error = encode_init_code(&bytecode, &no_constructor, &[DynSolValue::Bool(true)])
            .unwrap_err();
        assert!(matches!(error.current_context(), HarnessError::ArgumentMismatch { .. }));
        assert_eq!(encode_init_code(&bytecode, &no_constructor, &[]).unwrap(), bytecode);
    }

    #[test]
    fn coerce_string_arguments() {
        let abi = inbox_abi();
        let function = &abi.functions["transfer"][0];
        let values = coerce_args(
            "transfer",
            &function.inputs,
            &["0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb8", "1000"],
        )
        .unwrap();
        assert_eq!(
            values[0],
            DynSolValue::Address(
                "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb8".parse::<Address>().unwrap()
            )
        );
        assert_eq!(values[1], DynSolValue::Uint(U256::from(1000), 256));

        let error = coerce_args("transfer", &function.inputs, &["not-an-address", "1"]).unwrap_err();
        assert!(matches!(error.current_context(), HarnessError::ArgumentMismatch { .. }));
    }
}
