//! The seam between the lifecycle guard and whatever actually talks to the middleware.

use cryptoki_sys::CK_SLOT_ID;

use crate::{
    code::NativeCode,
    info::{RawModuleInfo, RawSlotInfo},
};

pub type SlotId = CK_SLOT_ID;

/// Calls into a PKCS#11 implementation.
///
/// Implementations report the raw return code on failure and keep no lifecycle
/// state of their own; deciding when a call is allowed is the guard's job.
pub trait NativeLayer {
    /// `C_Initialize`.
    fn activate(&self) -> Result<(), NativeCode>;

    /// `C_Finalize`.
    fn deactivate(&self) -> Result<(), NativeCode>;

    /// `C_GetInfo`.
    fn read_module_info(&self) -> Result<RawModuleInfo, NativeCode>;

    /// `C_GetSlotList`, returning at most `max_count` identifiers.
    fn list_slot_identifiers(
        &self,
        present: bool,
        max_count: usize,
    ) -> Result<Vec<SlotId>, NativeCode>;

    /// `C_GetSlotInfo`.
    fn read_slot_info(&self, slot: SlotId) -> Result<RawSlotInfo, NativeCode>;
}
