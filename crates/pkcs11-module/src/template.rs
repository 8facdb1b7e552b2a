//! Architecture templates describing how native PKCS#11 structures are laid out.
//!
//! A template is chosen by the caller (or defaulted to the build target) and checked
//! against the structures this crate was compiled with before any library is bound.
//! Cross-architecture marshalling is not performed: a template that does not describe
//! the running process is rejected with a layout error.

use std::{fmt, mem, str::FromStr};

use cryptoki_sys::{CK_INFO, CK_SLOT_INFO, CK_ULONG};
use serde::{Deserialize, Serialize};

use crate::error::{ModuleError, ModuleResult};

const VERSION_SIZE: usize = 2;
const SHORT_TEXT: usize = 32;
const LONG_TEXT: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Template {
    LinuxX64,
    LinuxX86,
    LinuxAarch64,
    MacosX64,
    MacosAarch64,
    WindowsX64,
    WindowsX86,
}

/// A single structure member: size and natural alignment in bytes.
#[derive(Clone, Copy)]
struct Field {
    size: usize,
    align: usize,
}

impl Field {
    const fn bytes(size: usize) -> Self {
        Self { size, align: 1 }
    }
}

impl Template {
    pub const ALL: [Template; 7] = [
        Template::LinuxX64,
        Template::LinuxX86,
        Template::LinuxAarch64,
        Template::MacosX64,
        Template::MacosAarch64,
        Template::WindowsX64,
        Template::WindowsX86,
    ];

    /// The template matching the target this crate was built for.
    pub const fn host() -> Self {
        if cfg!(windows) {
            if cfg!(target_pointer_width = "64") {
                Template::WindowsX64
            } else {
                Template::WindowsX86
            }
        } else if cfg!(target_os = "macos") {
            if cfg!(target_arch = "aarch64") {
                Template::MacosAarch64
            } else {
                Template::MacosX64
            }
        } else if cfg!(target_arch = "aarch64") {
            Template::LinuxAarch64
        } else if cfg!(target_pointer_width = "64") {
            Template::LinuxX64
        } else {
            Template::LinuxX86
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Template::LinuxX64 => "linux-x64",
            Template::LinuxX86 => "linux-x86",
            Template::LinuxAarch64 => "linux-aarch64",
            Template::MacosX64 => "macos-x64",
            Template::MacosAarch64 => "macos-aarch64",
            Template::WindowsX64 => "windows-x64",
            Template::WindowsX86 => "windows-x86",
        }
    }

    pub const fn pointer_width(self) -> usize {
        match self {
            Template::LinuxX86 | Template::WindowsX86 => 4,
            _ => 8,
        }
    }

    /// Width of `CK_ULONG`, which follows the C `unsigned long` of the platform.
    pub const fn ulong_width(self) -> usize {
        match self {
            Template::LinuxX86 | Template::WindowsX64 | Template::WindowsX86 => 4,
            _ => 8,
        }
    }

    /// Maximum member alignment. Cryptoki headers use `#pragma pack(1)` on Windows.
    pub const fn packing(self) -> Option<usize> {
        match self {
            Template::WindowsX64 | Template::WindowsX86 => Some(1),
            _ => None,
        }
    }

    /// Expected `size_of::<CK_INFO>()` under this template.
    pub fn info_size(self) -> usize {
        self.struct_size(&[
            Field::bytes(VERSION_SIZE),
            Field::bytes(SHORT_TEXT),
            self.ulong(),
            Field::bytes(SHORT_TEXT),
            Field::bytes(VERSION_SIZE),
        ])
    }

    /// Expected `size_of::<CK_SLOT_INFO>()` under this template.
    pub fn slot_info_size(self) -> usize {
        self.struct_size(&[
            Field::bytes(LONG_TEXT),
            Field::bytes(SHORT_TEXT),
            self.ulong(),
            Field::bytes(VERSION_SIZE),
            Field::bytes(VERSION_SIZE),
        ])
    }

    /// Compare the template against the layout this process actually uses.
    pub fn validate(self) -> ModuleResult<()> {
        let checks = [
            ("pointer width", self.pointer_width(), mem::size_of::<usize>()),
            ("CK_ULONG width", self.ulong_width(), mem::size_of::<CK_ULONG>()),
            ("CK_INFO size", self.info_size(), mem::size_of::<CK_INFO>()),
            (
                "CK_SLOT_INFO size",
                self.slot_info_size(),
                mem::size_of::<CK_SLOT_INFO>(),
            ),
        ];
        for (what, expected, actual) in checks {
            if expected != actual {
                return Err(ModuleError::layout(
                    self,
                    format!("{what} is {expected} bytes in the template but {actual} bytes natively"),
                ));
            }
        }
        Ok(())
    }

    fn ulong(self) -> Field {
        Field {
            size: self.ulong_width(),
            align: self.ulong_width(),
        }
    }

    fn struct_size(self, fields: &[Field]) -> usize {
        let cap = self.packing().unwrap_or(usize::MAX);
        let mut offset: usize = 0;
        let mut struct_align: usize = 1;
        for field in fields {
            let align = field.align.min(cap);
            offset = offset.next_multiple_of(align) + field.size;
            struct_align = struct_align.max(align);
        }
        offset.next_multiple_of(struct_align)
    }
}

impl Default for Template {
    fn default() -> Self {
        Template::host()
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Template {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Template::ALL
            .into_iter()
            .find(|template| template.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let known = Template::ALL.map(Template::name).join(", ");
                format!("unknown template `{s}` (expected one of: {known})")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structure_sizes_follow_platform_rules() {
        assert_eq!(Template::LinuxX64.info_size(), 88);
        assert_eq!(Template::LinuxX64.slot_info_size(), 112);
        assert_eq!(Template::LinuxX86.info_size(), 76);
        assert_eq!(Template::LinuxX86.slot_info_size(), 104);
        assert_eq!(Template::WindowsX64.info_size(), 72);
        assert_eq!(Template::WindowsX86.slot_info_size(), 104);
    }

    #[test]
    fn packing_caps_field_alignment() {
        let fields = [
            Field { size: 1, align: 1 },
            Field { size: 8, align: 8 },
            Field { size: 2, align: 2 },
        ];
        assert_eq!(Template::LinuxX64.struct_size(&fields), 24);
        assert_eq!(Template::WindowsX64.struct_size(&fields), 11);
        assert_eq!(Template::LinuxX64.struct_size(&[]), 0);
    }

    #[test]
    fn host_template_matches_native_layout() {
        Template::host().validate().expect("host template must validate");
    }

    #[test]
    fn foreign_pointer_width_is_rejected() {
        let foreign = if cfg!(target_pointer_width = "64") {
            Template::LinuxX86
        } else {
            Template::LinuxX64
        };
        let err = foreign.validate().unwrap_err();
        assert!(matches!(err, ModuleError::Layout { template, .. } if template == foreign));
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for template in Template::ALL {
            assert_eq!(template.name().parse::<Template>(), Ok(template));
        }
        assert!("sparc-v9".parse::<Template>().is_err());
    }

    #[test]
    fn serde_uses_kebab_case_names() {
        let json = serde_json::to_string(&Template::MacosAarch64).unwrap();
        assert_eq!(json, "\"macos-aarch64\"");
    }
}
