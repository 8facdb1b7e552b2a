//! The lifecycle guard around a PKCS#11 native layer.

use std::{ffi::OsStr, fmt};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::{ModuleError, ModuleResult, Operation},
    info::ModuleInfo,
    library::Pkcs11Library,
    native::NativeLayer,
    slot::Slot,
    template::Template,
};

/// Owns a native layer and decides when it may be called.
///
/// The module starts inactive. Accessors such as [`info`](Self::info) and
/// [`slots`](Self::slots) activate it on first use; [`ensure_active`](Self::ensure_active)
/// with `strict` set refuses to. Dropping the module deactivates it if needed; call
/// [`close`](Self::close) instead to observe a failure.
///
/// The active flag and the native call it guards are updated under one lock, so a
/// module can be shared between threads when its layer is `Sync`.
pub struct Pkcs11Module<L: NativeLayer = Pkcs11Library> {
    layer: L,
    active: Mutex<bool>,
    disposed: bool,
}

impl Pkcs11Module<Pkcs11Library> {
    /// Load the middleware and bind it. The module is not activated.
    pub fn new(library: impl AsRef<OsStr>, template: Template) -> ModuleResult<Self> {
        let layer = Pkcs11Library::load(library, template)?;
        Ok(Self::with_layer(layer))
    }
}

impl<L: NativeLayer> Pkcs11Module<L> {
    pub fn with_layer(layer: L) -> Self {
        Self {
            layer,
            active: Mutex::new(false),
            disposed: false,
        }
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock()
    }

    /// Initialize the middleware. Does nothing when already active.
    pub fn activate(&self) -> ModuleResult<()> {
        let mut active = self.active.lock();
        self.activate_locked(&mut active)
    }

    /// Finalize the middleware. Does nothing when already inactive.
    ///
    /// A failed finalize leaves the module active so the call can be retried.
    pub fn deactivate(&self) -> ModuleResult<()> {
        let mut active = self.active.lock();
        self.deactivate_locked(&mut active)
    }

    /// Make sure the module is active before calling into it.
    ///
    /// With `strict` an inactive module is an error and nothing is activated;
    /// otherwise the module is activated on demand.
    pub fn ensure_active(&self, strict: bool) -> ModuleResult<()> {
        let mut active = self.active.lock();
        self.ensure_active_locked(&mut active, strict)
    }

    /// General information about the middleware.
    pub fn info(&self) -> ModuleResult<ModuleInfo> {
        let mut active = self.active.lock();
        self.ensure_active_locked(&mut active, false)?;
        let raw = self
            .layer
            .read_module_info()
            .map_err(|code| ModuleError::native(Operation::Info, code))?;
        debug!("read PKCS#11 module info");
        Ok(raw.into())
    }

    /// Slots known to the middleware, in the order it reports them.
    ///
    /// `present` restricts the list to slots holding a token. `max_count` caps the
    /// number of identifiers; the cap is applied by the native layer.
    pub fn slots(&self, present: bool, max_count: usize) -> ModuleResult<Vec<Slot<'_, L>>> {
        let mut active = self.active.lock();
        self.ensure_active_locked(&mut active, false)?;
        let ids = self
            .layer
            .list_slot_identifiers(present, max_count)
            .map_err(|code| ModuleError::native(Operation::Slots, code))?;
        debug!(present, max_count, found = ids.len(), "listed PKCS#11 slots");
        Ok(ids
            .into_iter()
            .map(|id| Slot::new(&self.layer, id))
            .collect())
    }

    /// Release the module, deactivating it if it is still active.
    ///
    /// Deactivation is attempted once; its failure is returned as
    /// [`ModuleError::Disposal`] and not retried when the module is dropped.
    pub fn close(mut self) -> ModuleResult<()> {
        self.dispose().map_err(|err| ModuleError::Disposal(Box::new(err)))
    }

    fn dispose(&mut self) -> ModuleResult<()> {
        if std::mem::replace(&mut self.disposed, true) {
            return Ok(());
        }
        let mut active = self.active.lock();
        self.deactivate_locked(&mut active)
    }

    fn activate_locked(&self, active: &mut bool) -> ModuleResult<()> {
        if *active {
            debug!("PKCS#11 module already active");
            return Ok(());
        }
        self.layer
            .activate()
            .map_err(|code| ModuleError::native(Operation::Activate, code))?;
        *active = true;
        info!("PKCS#11 module activated");
        Ok(())
    }

    fn deactivate_locked(&self, active: &mut bool) -> ModuleResult<()> {
        if !*active {
            debug!("PKCS#11 module already inactive");
            return Ok(());
        }
        self.layer
            .deactivate()
            .map_err(|code| ModuleError::native(Operation::Deactivate, code))?;
        *active = false;
        info!("PKCS#11 module deactivated");
        Ok(())
    }

    fn ensure_active_locked(&self, active: &mut bool, strict: bool) -> ModuleResult<()> {
        if *active {
            return Ok(());
        }
        if strict {
            return Err(ModuleError::NotActive);
        }
        self.activate_locked(active)
    }
}

impl<L: NativeLayer> Drop for Pkcs11Module<L> {
    fn drop(&mut self) {
        if let Err(err) = self.dispose() {
            warn!("PKCS#11 module dropped without a clean deactivation: {err}");
        }
    }
}

impl<L: NativeLayer + fmt::Debug> fmt::Debug for Pkcs11Module<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pkcs11Module")
            .field("layer", &self.layer)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        code::NativeCode,
        info::{RawModuleInfo, RawSlotInfo},
        native::SlotId,
    };

    struct StubLayer;

    impl NativeLayer for StubLayer {
        fn activate(&self) -> Result<(), NativeCode> {
            Ok(())
        }

        fn deactivate(&self) -> Result<(), NativeCode> {
            Ok(())
        }

        fn read_module_info(&self) -> Result<RawModuleInfo, NativeCode> {
            Err(NativeCode::FUNCTION_NOT_SUPPORTED)
        }

        fn list_slot_identifiers(
            &self,
            _present: bool,
            _max_count: usize,
        ) -> Result<Vec<SlotId>, NativeCode> {
            Ok(Vec::new())
        }

        fn read_slot_info(&self, _slot: SlotId) -> Result<RawSlotInfo, NativeCode> {
            Err(NativeCode::SLOT_ID_INVALID)
        }
    }

    #[test]
    fn starts_inactive_and_toggles() {
        let module = Pkcs11Module::with_layer(StubLayer);
        assert!(!module.is_active());
        module.activate().expect("activate");
        assert!(module.is_active());
        module.deactivate().expect("deactivate");
        assert!(!module.is_active());
    }

    #[test]
    fn strict_ensure_reports_not_active() {
        let module = Pkcs11Module::with_layer(StubLayer);
        assert!(matches!(
            module.ensure_active(true),
            Err(ModuleError::NotActive)
        ));
        assert!(!module.is_active());
    }

    #[test]
    fn info_failure_keeps_activation() {
        let module = Pkcs11Module::with_layer(StubLayer);
        let err = module.info().unwrap_err();
        assert_eq!(err.native_code(), Some(NativeCode::FUNCTION_NOT_SUPPORTED));
        assert!(module.is_active());
        module.close().expect("close");
    }

    #[test]
    fn empty_slot_list_is_not_an_error() {
        let module = Pkcs11Module::with_layer(StubLayer);
        assert!(module.slots(true, 8).expect("slots").is_empty());
    }

    #[test]
    fn module_is_shareable_across_threads() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<Pkcs11Module<StubLayer>>();
        assert_sync::<Pkcs11Module>();
        assert_sync::<Slot<'static, StubLayer>>();
        assert_sync::<Slot<'static>>();
    }
}
