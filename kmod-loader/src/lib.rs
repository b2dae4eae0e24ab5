//! Host-side module management: reading a module's metadata out of its ELF
//! image and driving its init/exit entry points.
#![no_std]

mod loader;
mod module;

use axerrno::LinuxError;
pub use loader::{ModuleLoader, ModuleOwner, ModuleState};
pub use module::ModuleInfo;
extern crate alloc;

type Result<T> = core::result::Result<T, ModuleErr>;

#[derive(Debug)]
pub enum ModuleErr {
    InvalidElf,
    InvalidModInfo,
    InvalidOperation,
    UnsupportedArch,
    MissingModInfo(&'static str),
    InitFailed(LinuxError),
}

impl core::fmt::Display for ModuleErr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ModuleErr::InvalidElf => write!(f, "Invalid ELF file"),
            ModuleErr::InvalidModInfo => write!(f, "Malformed .modinfo section"),
            ModuleErr::InvalidOperation => write!(f, "Invalid operation"),
            ModuleErr::UnsupportedArch => write!(f, "Unsupported architecture"),
            ModuleErr::MissingModInfo(key) => write!(f, "Missing modinfo entry: {}", key),
            ModuleErr::InitFailed(err) => write!(f, "Module init failed: {:?}", err),
        }
    }
}

impl core::error::Error for ModuleErr {}
