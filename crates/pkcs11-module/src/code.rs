//! Return codes reported by the native PKCS#11 interface.

use std::fmt;

use cryptoki_sys::{
    CK_RV, CKR_ARGUMENTS_BAD, CKR_BUFFER_TOO_SMALL, CKR_CANT_LOCK,
    CKR_CRYPTOKI_ALREADY_INITIALIZED, CKR_CRYPTOKI_NOT_INITIALIZED, CKR_DEVICE_ERROR,
    CKR_DEVICE_REMOVED, CKR_FUNCTION_FAILED, CKR_FUNCTION_NOT_SUPPORTED, CKR_GENERAL_ERROR,
    CKR_HOST_MEMORY, CKR_NEED_TO_CREATE_THREADS, CKR_OK, CKR_SLOT_ID_INVALID,
    CKR_TOKEN_NOT_PRESENT, CKR_VENDOR_DEFINED,
};
use serde::{Serialize, Serializer};

/// A `CK_RV` value returned by a native call.
///
/// `CKR_OK` never appears inside an error; the layer converts it into `Ok(..)` via
/// [`NativeCode::check`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeCode(CK_RV);

impl NativeCode {
    pub const OK: Self = Self(CKR_OK);
    pub const HOST_MEMORY: Self = Self(CKR_HOST_MEMORY);
    pub const SLOT_ID_INVALID: Self = Self(CKR_SLOT_ID_INVALID);
    pub const GENERAL_ERROR: Self = Self(CKR_GENERAL_ERROR);
    pub const FUNCTION_FAILED: Self = Self(CKR_FUNCTION_FAILED);
    pub const ARGUMENTS_BAD: Self = Self(CKR_ARGUMENTS_BAD);
    pub const CANT_LOCK: Self = Self(CKR_CANT_LOCK);
    pub const NEED_TO_CREATE_THREADS: Self = Self(CKR_NEED_TO_CREATE_THREADS);
    pub const DEVICE_ERROR: Self = Self(CKR_DEVICE_ERROR);
    pub const DEVICE_REMOVED: Self = Self(CKR_DEVICE_REMOVED);
    pub const FUNCTION_NOT_SUPPORTED: Self = Self(CKR_FUNCTION_NOT_SUPPORTED);
    pub const TOKEN_NOT_PRESENT: Self = Self(CKR_TOKEN_NOT_PRESENT);
    pub const BUFFER_TOO_SMALL: Self = Self(CKR_BUFFER_TOO_SMALL);
    pub const CRYPTOKI_NOT_INITIALIZED: Self = Self(CKR_CRYPTOKI_NOT_INITIALIZED);
    pub const CRYPTOKI_ALREADY_INITIALIZED: Self = Self(CKR_CRYPTOKI_ALREADY_INITIALIZED);

    pub const fn new(raw: CK_RV) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> CK_RV {
        self.0
    }

    pub const fn is_ok(self) -> bool {
        self.0 == CKR_OK
    }

    /// Codes at or above `CKR_VENDOR_DEFINED` are middleware specific.
    pub const fn is_vendor_defined(self) -> bool {
        self.0 >= CKR_VENDOR_DEFINED
    }

    /// Convert a raw return value into a result.
    pub fn check(raw: CK_RV) -> Result<(), NativeCode> {
        let code = Self(raw);
        if code.is_ok() { Ok(()) } else { Err(code) }
    }

    /// Symbolic `CKR_*` name for the codes this crate deals with.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            CKR_OK => "CKR_OK",
            CKR_HOST_MEMORY => "CKR_HOST_MEMORY",
            CKR_SLOT_ID_INVALID => "CKR_SLOT_ID_INVALID",
            CKR_GENERAL_ERROR => "CKR_GENERAL_ERROR",
            CKR_FUNCTION_FAILED => "CKR_FUNCTION_FAILED",
            CKR_ARGUMENTS_BAD => "CKR_ARGUMENTS_BAD",
            CKR_CANT_LOCK => "CKR_CANT_LOCK",
            CKR_NEED_TO_CREATE_THREADS => "CKR_NEED_TO_CREATE_THREADS",
            CKR_DEVICE_ERROR => "CKR_DEVICE_ERROR",
            CKR_DEVICE_REMOVED => "CKR_DEVICE_REMOVED",
            CKR_FUNCTION_NOT_SUPPORTED => "CKR_FUNCTION_NOT_SUPPORTED",
            CKR_TOKEN_NOT_PRESENT => "CKR_TOKEN_NOT_PRESENT",
            CKR_BUFFER_TOO_SMALL => "CKR_BUFFER_TOO_SMALL",
            CKR_CRYPTOKI_NOT_INITIALIZED => "CKR_CRYPTOKI_NOT_INITIALIZED",
            CKR_CRYPTOKI_ALREADY_INITIALIZED => "CKR_CRYPTOKI_ALREADY_INITIALIZED",
            _ => return None,
        };
        Some(name)
    }
}

impl From<CK_RV> for NativeCode {
    fn from(raw: CK_RV) -> Self {
        Self(raw)
    }
}

impl fmt::Display for NativeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:X})", self.0),
            None if self.is_vendor_defined() => write!(f, "vendor-defined (0x{:X})", self.0),
            None => write!(f, "0x{:X}", self.0),
        }
    }
}

impl fmt::Debug for NativeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeCode({self})")
    }
}

impl Serialize for NativeCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_maps_ok_and_failures() {
        assert!(NativeCode::check(CKR_OK).is_ok());
        assert_eq!(
            NativeCode::check(CKR_GENERAL_ERROR).unwrap_err(),
            NativeCode::GENERAL_ERROR
        );
    }

    #[test]
    fn display_uses_symbolic_names() {
        assert_eq!(
            NativeCode::GENERAL_ERROR.to_string(),
            "CKR_GENERAL_ERROR (0x5)"
        );
        assert_eq!(
            NativeCode::CRYPTOKI_NOT_INITIALIZED.to_string(),
            "CKR_CRYPTOKI_NOT_INITIALIZED (0x190)"
        );
    }

    #[test]
    fn vendor_codes_are_recognised() {
        let code = NativeCode::new(CKR_VENDOR_DEFINED + 7);
        assert!(code.is_vendor_defined());
        assert_eq!(code.name(), None);
        assert_eq!(code.to_string(), "vendor-defined (0x80000007)");
    }

    #[test]
    fn unknown_codes_print_as_hex() {
        assert_eq!(NativeCode::new(0x1234).to_string(), "0x1234");
    }
}
