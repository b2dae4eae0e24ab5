use core::{ffi::CStr, fmt::Debug};

use alloc::{string::String, vec::Vec};

use crate::{ModuleErr, Result};

/// Licenses that leave the kernel untainted.
///
/// See <https://elixir.bootlin.com/linux/v6.6/source/include/linux/license.h>
const GPL_COMPATIBLE_LICENSES: &[&str] = &[
    "GPL",
    "GPL v2",
    "GPL and additional rights",
    "Dual BSD/GPL",
    "Dual MIT/GPL",
    "Dual MPL/GPL",
];

/// The `key=value` pairs of a module's `.modinfo` section.
#[derive(Clone, Default)]
pub struct ModuleInfo {
    kv: Vec<(String, String)>,
}

impl Debug for ModuleInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ModuleInfo {{ ")?;
        for (idx, (k, v)) in self.kv.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        write!(f, " }}")
    }
}

impl ModuleInfo {
    pub fn new() -> Self {
        ModuleInfo { kv: Vec::new() }
    }

    /// Parses a `.modinfo` blob: `key=value\0key=value\0...`.
    ///
    /// NUL padding between entries is skipped.
    pub fn parse(mut data: &[u8]) -> Result<Self> {
        let mut info = ModuleInfo::new();
        while !data.is_empty() {
            if data[0] == 0 {
                data = &data[1..];
                continue;
            }
            let cstr = CStr::from_bytes_until_nul(data).map_err(|_| ModuleErr::InvalidModInfo)?;
            data = &data[cstr.to_bytes_with_nul().len()..];
            let entry = cstr.to_str().map_err(|_| ModuleErr::InvalidModInfo)?;
            let (key, value) = entry.split_once('=').ok_or(ModuleErr::InvalidModInfo)?;
            info.add_kv(String::from(key), String::from(value));
        }
        Ok(info)
    }

    pub fn add_kv(&mut self, key: String, value: String) {
        self.kv.push((key, value));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        for (k, v) in &self.kv {
            if k == key {
                return Some(v);
            }
        }
        None
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name")
    }

    pub fn license(&self) -> Option<&str> {
        self.get("license")
    }

    /// Whether loading the module keeps the kernel untainted.
    pub fn is_gpl_compatible(&self) -> bool {
        self.license()
            .is_some_and(|license| GPL_COMPATIBLE_LICENSES.contains(&license))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modinfo() {
        let data = b"name=hello\0version=0.0.1\0\0\0license=GPL\0author=Fox\0description=A sample kernel module\0";
        let info = ModuleInfo::parse(data).unwrap();
        assert_eq!(info.name(), Some("hello"));
        assert_eq!(info.get("version"), Some("0.0.1"));
        assert_eq!(info.get("author"), Some("Fox"));
        assert_eq!(info.get("description"), Some("A sample kernel module"));
        assert_eq!(info.get("alias"), None);
        assert!(info.is_gpl_compatible());
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            ModuleInfo::parse(b"name=hello\0license"),
            Err(ModuleErr::InvalidModInfo)
        ));
        assert!(matches!(
            ModuleInfo::parse(b"no_separator\0"),
            Err(ModuleErr::InvalidModInfo)
        ));
        assert!(ModuleInfo::parse(b"").unwrap().name().is_none());
    }

    #[test]
    fn test_license_taint() {
        let mut info = ModuleInfo::new();
        assert!(!info.is_gpl_compatible());
        info.add_kv(String::from("license"), String::from("Proprietary"));
        assert!(!info.is_gpl_compatible());
        let info = ModuleInfo::parse(b"license=Dual MIT/GPL\0").unwrap();
        assert!(info.is_gpl_compatible());
    }
}
