//! Lifecycle management for PKCS#11 middleware modules.
//!
//! [`Pkcs11Module`] owns the binding to a PKCS#11 library and tracks whether the
//! library has been initialized. Every call into the middleware goes through the
//! guard, which initializes on demand (or refuses, in strict mode) and finalizes the
//! library when the module is closed or dropped.
//!
//! The binding itself sits behind the [`NativeLayer`] trait. [`Pkcs11Library`] is the
//! default implementation, loading the middleware with `libloading` and calling it
//! through the `cryptoki-sys` function list.

pub mod code;
pub mod error;
pub mod info;
pub mod library;
pub mod module;
pub mod native;
pub mod slot;
pub mod template;

pub use code::NativeCode;
pub use error::{ModuleError, ModuleResult, Operation};
pub use info::{ModuleInfo, RawModuleInfo, RawSlotInfo, SlotInfo, Version};
pub use library::Pkcs11Library;
pub use module::Pkcs11Module;
pub use native::{NativeLayer, SlotId};
pub use slot::Slot;
pub use template::Template;
