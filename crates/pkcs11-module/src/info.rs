//! Module and slot metadata as returned by the native interface, and the decoded
//! value objects handed to callers.

use std::fmt;

use cryptoki_sys::{
    CK_FLAGS, CK_INFO, CK_SLOT_INFO, CK_VERSION, CKF_HW_SLOT, CKF_REMOVABLE_DEVICE,
    CKF_TOKEN_PRESENT,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl From<CK_VERSION> for Version {
    fn from(version: CK_VERSION) -> Self {
        Self::new(version.major, version.minor)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// `CK_INFO` copied out of native memory, text fields still blank padded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawModuleInfo {
    pub cryptoki_version: Version,
    pub manufacturer_id: [u8; 32],
    pub flags: CK_FLAGS,
    pub library_description: [u8; 32],
    pub library_version: Version,
}

impl From<CK_INFO> for RawModuleInfo {
    fn from(info: CK_INFO) -> Self {
        // Fields are copied one by one; the struct is packed on Windows.
        let (cryptoki_version, library_version) = (info.cryptokiVersion, info.libraryVersion);
        Self {
            cryptoki_version: cryptoki_version.into(),
            manufacturer_id: info.manufacturerID,
            flags: info.flags,
            library_description: info.libraryDescription,
            library_version: library_version.into(),
        }
    }
}

/// `CK_SLOT_INFO` copied out of native memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSlotInfo {
    pub slot_description: [u8; 64],
    pub manufacturer_id: [u8; 32],
    pub flags: CK_FLAGS,
    pub hardware_version: Version,
    pub firmware_version: Version,
}

impl From<CK_SLOT_INFO> for RawSlotInfo {
    fn from(info: CK_SLOT_INFO) -> Self {
        let (hardware_version, firmware_version) = (info.hardwareVersion, info.firmwareVersion);
        Self {
            slot_description: info.slotDescription,
            manufacturer_id: info.manufacturerID,
            flags: info.flags,
            hardware_version: hardware_version.into(),
            firmware_version: firmware_version.into(),
        }
    }
}

/// Snapshot of the module's general information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    pub cryptoki_version: Version,
    pub manufacturer: String,
    pub flags: u64,
    pub library_description: String,
    pub library_version: Version,
}

impl From<RawModuleInfo> for ModuleInfo {
    fn from(raw: RawModuleInfo) -> Self {
        Self {
            cryptoki_version: raw.cryptoki_version,
            manufacturer: padded_text(&raw.manufacturer_id),
            flags: raw.flags as u64,
            library_description: padded_text(&raw.library_description),
            library_version: raw.library_version,
        }
    }
}

/// Description of a single slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    pub description: String,
    pub manufacturer: String,
    pub flags: u64,
    pub hardware_version: Version,
    pub firmware_version: Version,
}

impl SlotInfo {
    pub fn token_present(&self) -> bool {
        self.has_flag(CKF_TOKEN_PRESENT)
    }

    pub fn removable_device(&self) -> bool {
        self.has_flag(CKF_REMOVABLE_DEVICE)
    }

    pub fn hardware_slot(&self) -> bool {
        self.has_flag(CKF_HW_SLOT)
    }

    fn has_flag(&self, flag: CK_FLAGS) -> bool {
        self.flags & flag as u64 != 0
    }
}

impl From<RawSlotInfo> for SlotInfo {
    fn from(raw: RawSlotInfo) -> Self {
        Self {
            description: padded_text(&raw.slot_description),
            manufacturer: padded_text(&raw.manufacturer_id),
            flags: raw.flags as u64,
            hardware_version: raw.hardware_version,
            firmware_version: raw.firmware_version,
        }
    }
}

/// Decode a blank padded `CK_UTF8CHAR` field. Some middleware NUL-terminates instead.
fn padded_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end])
        .trim_end_matches(' ')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad_text<const N: usize>(text: &str) -> [u8; N] {
        let mut field = [b' '; N];
        let len = text.len().min(N);
        field[..len].copy_from_slice(&text.as_bytes()[..len]);
        field
    }

    fn raw_info() -> RawModuleInfo {
        RawModuleInfo {
            cryptoki_version: Version::new(2, 40),
            manufacturer_id: pad_text("SoftHSM project"),
            flags: 0,
            library_description: pad_text("Implementation of PKCS11"),
            library_version: Version::new(2, 6),
        }
    }

    #[test]
    fn module_info_trims_padding() {
        let info = ModuleInfo::from(raw_info());
        assert_eq!(info.manufacturer, "SoftHSM project");
        assert_eq!(info.library_description, "Implementation of PKCS11");
        assert_eq!(info.cryptoki_version.to_string(), "2.40");
        assert_eq!(info.library_version, Version::new(2, 6));
    }

    #[test]
    fn nul_terminated_text_is_accepted() {
        let mut field = [0u8; 32];
        field[..4].copy_from_slice(b"ACME");
        assert_eq!(padded_text(&field), "ACME");
    }

    #[test]
    fn slot_flags_are_decoded() {
        let info = SlotInfo::from(RawSlotInfo {
            slot_description: pad_text("Reader 0"),
            manufacturer_id: pad_text("ACME"),
            flags: CKF_TOKEN_PRESENT | CKF_HW_SLOT,
            hardware_version: Version::new(1, 0),
            firmware_version: Version::new(3, 2),
        });
        assert!(info.token_present());
        assert!(info.hardware_slot());
        assert!(!info.removable_device());
        assert_eq!(info.description, "Reader 0");
    }

    #[test]
    fn full_width_text_needs_no_terminator() {
        let info = ModuleInfo::from(RawModuleInfo {
            manufacturer_id: *b"0123456789abcdef0123456789abcdef",
            ..raw_info()
        });
        assert_eq!(info.manufacturer, "0123456789abcdef0123456789abcdef");
    }

    #[test]
    fn module_info_serializes_to_json() {
        let value = serde_json::to_value(ModuleInfo::from(raw_info())).unwrap();
        assert_eq!(value["manufacturer"], "SoftHSM project");
        assert_eq!(value["cryptoki_version"]["minor"], 40);
    }
}
