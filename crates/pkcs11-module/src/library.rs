//! [`NativeLayer`] backed by a dynamically loaded PKCS#11 library.

use std::{
    ffi::OsStr,
    fmt,
    path::{Path, PathBuf},
    ptr::{self, NonNull},
};

use cryptoki_sys::{
    CK_BBOOL, CK_C_INITIALIZE_ARGS, CK_FUNCTION_LIST, CK_FUNCTION_LIST_PTR,
    CK_FUNCTION_LIST_PTR_PTR, CK_INFO, CK_RV, CK_SLOT_ID, CK_SLOT_INFO, CK_ULONG, CK_VOID_PTR,
    CKF_OS_LOCKING_OK,
};
use libloading::{Library, Symbol};
use tracing::debug;

use crate::{
    code::NativeCode,
    error::{ModuleError, ModuleResult},
    info::{RawModuleInfo, RawSlotInfo, Version},
    native::{NativeLayer, SlotId},
    template::Template,
};

type GetFunctionList = unsafe extern "C" fn(CK_FUNCTION_LIST_PTR_PTR) -> CK_RV;

const GET_FUNCTION_LIST: &[u8] = b"C_GetFunctionList\0";

pub struct Pkcs11Library {
    path: PathBuf,
    template: Template,
    functions: NonNull<CK_FUNCTION_LIST>,
    // Owns the code behind `functions`; unloaded when the layer is dropped.
    _library: Library,
}

// SAFETY: the function list is immutable after C_GetFunctionList and the library is
// initialized with CKF_OS_LOCKING_OK, so the middleware serializes concurrent calls.
unsafe impl Send for Pkcs11Library {}
unsafe impl Sync for Pkcs11Library {}

impl Pkcs11Library {
    /// Open `library` (a path or a name resolved by the platform loader) and bind its
    /// function list. No PKCS#11 function other than `C_GetFunctionList` is called.
    pub fn load(library: impl AsRef<OsStr>, template: Template) -> ModuleResult<Self> {
        let path = PathBuf::from(library.as_ref());
        template.validate()?;

        let name = path.display().to_string();
        // SAFETY: opening a library runs its initializers; the caller picked the module.
        let lib = unsafe { Library::new(path.as_os_str()) }
            .map_err(|err| ModuleError::load(&name, err))?;

        let list = {
            // SAFETY: the signature of C_GetFunctionList is fixed by the standard.
            let get_function_list: Symbol<GetFunctionList> =
                unsafe { lib.get(GET_FUNCTION_LIST) }
                    .map_err(|err| ModuleError::load(&name, err))?;
            let mut list: CK_FUNCTION_LIST_PTR = ptr::null_mut();
            // SAFETY: `list` is a valid out pointer for the duration of the call.
            let rv = unsafe { get_function_list(&mut list) };
            NativeCode::check(rv).map_err(|code| {
                ModuleError::load(&name, format!("C_GetFunctionList returned {code}"))
            })?;
            list
        };
        let functions = NonNull::new(list).ok_or_else(|| {
            ModuleError::load(&name, "C_GetFunctionList returned a null function list")
        })?;

        // SAFETY: non-null and owned by `lib`, which we keep alive alongside it.
        let version = unsafe { functions.as_ref() }.version;
        let version = Version::from(version);
        if !(2..=3).contains(&version.major) {
            return Err(ModuleError::layout(
                template,
                format!("function list reports unsupported cryptoki version {version}"),
            ));
        }

        debug!(library = %name, %template, %version, "bound PKCS#11 function list");
        Ok(Self {
            path,
            template,
            functions,
            _library: lib,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn template(&self) -> Template {
        self.template
    }

    /// Cryptoki version advertised by the function list.
    pub fn interface_version(&self) -> Version {
        self.functions().version.into()
    }

    fn functions(&self) -> &CK_FUNCTION_LIST {
        // SAFETY: validated non-null in `load`; valid while `_library` is loaded.
        unsafe { self.functions.as_ref() }
    }

    fn entry<F>(
        &self,
        select: impl FnOnce(&CK_FUNCTION_LIST) -> Option<F>,
    ) -> Result<F, NativeCode> {
        select(self.functions()).ok_or(NativeCode::FUNCTION_NOT_SUPPORTED)
    }
}

impl NativeLayer for Pkcs11Library {
    fn activate(&self) -> Result<(), NativeCode> {
        let initialize = self.entry(|list| list.C_Initialize)?;
        let mut args = CK_C_INITIALIZE_ARGS {
            CreateMutex: None,
            DestroyMutex: None,
            LockMutex: None,
            UnlockMutex: None,
            flags: CKF_OS_LOCKING_OK,
            pReserved: ptr::null_mut(),
        };
        // SAFETY: `args` outlives the call and the library does not retain it.
        let rv = unsafe { initialize(&mut args as *mut CK_C_INITIALIZE_ARGS as CK_VOID_PTR) };
        NativeCode::check(rv)
    }

    fn deactivate(&self) -> Result<(), NativeCode> {
        let finalize = self.entry(|list| list.C_Finalize)?;
        // SAFETY: pReserved must be NULL.
        NativeCode::check(unsafe { finalize(ptr::null_mut()) })
    }

    fn read_module_info(&self) -> Result<RawModuleInfo, NativeCode> {
        let get_info = self.entry(|list| list.C_GetInfo)?;
        // SAFETY: CK_INFO is plain data; the all-zero pattern is valid.
        let mut info: CK_INFO = unsafe { std::mem::zeroed() };
        // SAFETY: `info` is a valid out pointer for the duration of the call.
        NativeCode::check(unsafe { get_info(&mut info) })?;
        Ok(info.into())
    }

    fn list_slot_identifiers(
        &self,
        present: bool,
        max_count: usize,
    ) -> Result<Vec<SlotId>, NativeCode> {
        let get_slot_list = self.entry(|list| list.C_GetSlotList)?;
        let token_present = CK_BBOOL::from(present);
        loop {
            let mut count: CK_ULONG = 0;
            // SAFETY: a null list asks only for the count.
            NativeCode::check(unsafe {
                get_slot_list(token_present, ptr::null_mut(), &mut count)
            })?;
            if count == 0 {
                return Ok(Vec::new());
            }

            let mut slots: Vec<CK_SLOT_ID> = vec![0; count as usize];
            // SAFETY: `slots` holds `count` elements, which is what we report.
            let rv = unsafe { get_slot_list(token_present, slots.as_mut_ptr(), &mut count) };
            match NativeCode::check(rv) {
                Ok(()) => {
                    slots.truncate(count as usize);
                    slots.truncate(max_count);
                    return Ok(slots);
                }
                Err(NativeCode::BUFFER_TOO_SMALL) => {
                    debug!(library = %self.path.display(), "slot list grew between calls, retrying");
                }
                Err(code) => return Err(code),
            }
        }
    }

    fn read_slot_info(&self, slot: SlotId) -> Result<RawSlotInfo, NativeCode> {
        let get_slot_info = self.entry(|list| list.C_GetSlotInfo)?;
        // SAFETY: CK_SLOT_INFO is plain data; the all-zero pattern is valid.
        let mut info: CK_SLOT_INFO = unsafe { std::mem::zeroed() };
        // SAFETY: `info` is a valid out pointer for the duration of the call.
        NativeCode::check(unsafe { get_slot_info(slot, &mut info) })?;
        Ok(info.into())
    }
}

impl fmt::Debug for Pkcs11Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pkcs11Library")
            .field("path", &self.path)
            .field("template", &self.template)
            .field("interface_version", &self.interface_version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_a_load_error() {
        let err = Pkcs11Library::load("/nonexistent/libpkcs11-missing.so", Template::host())
            .unwrap_err();
        match err {
            ModuleError::Load { library, .. } => {
                assert_eq!(library, "/nonexistent/libpkcs11-missing.so")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn layout_is_checked_before_loading() {
        let foreign = if cfg!(target_pointer_width = "64") {
            Template::WindowsX86
        } else {
            Template::LinuxX64
        };
        let err = Pkcs11Library::load("/nonexistent/libpkcs11-missing.so", foreign).unwrap_err();
        assert!(matches!(err, ModuleError::Layout { .. }));
    }
}
