use std::fmt;

use crate::{
    error::{ModuleError, ModuleResult, Operation},
    info::SlotInfo,
    library::Pkcs11Library,
    native::{NativeLayer, SlotId},
};

/// A slot reported by the module.
///
/// The slot borrows the native layer from the [`Pkcs11Module`](crate::Pkcs11Module)
/// that listed it, so it cannot outlive that module. It does not re-check the
/// module's lifecycle state: calls made after the module was deactivated fail with
/// whatever the middleware reports, typically `CKR_CRYPTOKI_NOT_INITIALIZED`.
///
/// A slot can be sent to another thread whenever its layer is `Sync`.
pub struct Slot<'a, L: NativeLayer = Pkcs11Library> {
    layer: &'a L,
    id: SlotId,
}

impl<'a, L: NativeLayer> Slot<'a, L> {
    pub(crate) fn new(layer: &'a L, id: SlotId) -> Self {
        Self { layer, id }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Read the slot description from the middleware.
    pub fn info(&self) -> ModuleResult<SlotInfo> {
        self.layer
            .read_slot_info(self.id)
            .map(SlotInfo::from)
            .map_err(|code| ModuleError::native(Operation::SlotInfo, code))
    }
}

impl<L: NativeLayer> Clone for Slot<'_, L> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<L: NativeLayer> Copy for Slot<'_, L> {}

impl<L: NativeLayer> fmt::Debug for Slot<'_, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot").field("id", &self.id).finish()
    }
}

impl<L: NativeLayer> PartialEq for Slot<'_, L> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && std::ptr::eq(self.layer, other.layer)
    }
}

impl<L: NativeLayer> Eq for Slot<'_, L> {}
