use std::collections::BTreeMap;

use alloy::dyn_abi::DynSolValue;
use alloy::json_abi::{Function, JsonAbi, StateMutability};
use error_stack::Report;

use crate::codec::encoding::check_args;
use crate::errors::{HarnessError, HarnessResult};

/// Method lookup table built once when a contract is bound.
///
/// Unknown names are rejected here, before any encoding or RPC traffic.
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    methods: BTreeMap<String, Vec<Function>>,
}

impl MethodTable {
    pub fn from_abi(abi: &JsonAbi) -> Self {
        Self { methods: abi.functions.clone() }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// All overloads registered under `name`.
    pub fn overloads(&self, name: &str) -> HarnessResult<&[Function]> {
        match self.methods.get(name) {
            Some(overloads) => Ok(overloads.as_slice()),
            None => Err(self.not_found(name)),
        }
    }

    /// Pick the overload of `name` whose inputs accept `args`.
    pub fn resolve(&self, name: &str, args: &[DynSolValue]) -> HarnessResult<&Function> {
        let overloads = self.overloads(name)?;
        if let [only] = overloads {
            check_args(name, &only.inputs, args)?;
            return Ok(only);
        }

        let same_arity: Vec<&Function> =
            overloads.iter().filter(|f| f.inputs.len() == args.len()).collect();
        if let [only] = same_arity.as_slice() {
            check_args(name, &only.inputs, args)?;
            return Ok(*only);
        }

        same_arity
            .into_iter()
            .find(|f| check_args(name, &f.inputs, args).is_ok())
            .ok_or_else(|| {
                let signatures: Vec<String> = overloads.iter().map(|f| f.signature()).collect();
                Report::new(HarnessError::ArgumentMismatch {
                    method: name.to_string(),
                    detail: format!("no overload accepts {} argument(s)", args.len()),
                })
                .attach_printable(format!("Available overloads: {}", signatures.join(", ")))
            })
    }

    fn not_found(&self, name: &str) -> Report<HarnessError> {
        let mut error = Report::new(HarnessError::MethodNotFound(name.to_string()));
        if !self.methods.is_empty() {
            let available: Vec<&str> = self.names().collect();
            error = error.attach_printable(format!("Available methods: {}", available.join(", ")));
            for candidate in available {
                if candidate.eq_ignore_ascii_case(name) {
                    error = error
                        .attach_printable(format!("Did you mean '{}'? (case-sensitive)", candidate));
                }
            }
        }
        error
    }
}

/// `view` and `pure` methods never change state.
pub fn is_read_only(function: &Function) -> bool {
    matches!(function.state_mutability, StateMutability::View | StateMutability::Pure)
}
