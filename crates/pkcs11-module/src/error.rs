use std::fmt;

use thiserror::Error;

use crate::{code::NativeCode, template::Template};

pub type ModuleResult<T> = Result<T, ModuleError>;

/// Native operations the guard forwards to the call layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Activate,
    Deactivate,
    Info,
    Slots,
    SlotInfo,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Activate => "activate",
            Operation::Deactivate => "deactivate",
            Operation::Info => "info",
            Operation::Slots => "slots",
            Operation::SlotInfo => "slot-info",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("failed to load PKCS#11 library `{library}`: {reason}")]
    Load { library: String, reason: String },
    #[error("template {template} does not match the library layout: {reason}")]
    Layout { template: Template, reason: String },
    #[error("the PKCS#11 module is not active; call activate() before using it")]
    NotActive,
    #[error("native {operation} call failed with {code}")]
    NativeCall {
        operation: Operation,
        code: NativeCode,
    },
    #[error("failed to dispose PKCS#11 module: {0}")]
    Disposal(#[source] Box<ModuleError>),
}

impl ModuleError {
    pub fn load<L: fmt::Display, E: fmt::Display>(library: L, err: E) -> Self {
        Self::Load {
            library: library.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn layout<E: fmt::Display>(template: Template, err: E) -> Self {
        Self::Layout {
            template,
            reason: err.to_string(),
        }
    }

    pub fn native(operation: Operation, code: NativeCode) -> Self {
        Self::NativeCall { operation, code }
    }

    /// The native return code behind this error, looking through disposal failures.
    pub fn native_code(&self) -> Option<NativeCode> {
        match self {
            Self::NativeCall { code, .. } => Some(*code),
            Self::Disposal(inner) => inner.native_code(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_call_message_names_operation_and_code() {
        let err = ModuleError::native(Operation::Deactivate, NativeCode::GENERAL_ERROR);
        assert_eq!(
            err.to_string(),
            "native deactivate call failed with CKR_GENERAL_ERROR (0x5)"
        );
    }

    #[test]
    fn disposal_exposes_underlying_cause() {
        let err = ModuleError::Disposal(Box::new(ModuleError::native(
            Operation::Deactivate,
            NativeCode::DEVICE_ERROR,
        )));
        assert_eq!(err.native_code(), Some(NativeCode::DEVICE_ERROR));
        let source = std::error::Error::source(&err).expect("disposal has a source");
        assert!(source.to_string().contains("CKR_DEVICE_ERROR"));
    }

    #[test]
    fn not_active_has_no_native_code() {
        assert_eq!(ModuleError::NotActive.native_code(), None);
    }
}
