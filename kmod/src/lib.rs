//! Safe building blocks for kernel modules.
//!
//! A module implements [`KernelModule`], declares itself with [`module!`] and
//! holds its registrations as RAII values so that dropping the module (or a
//! partially built one) tears everything down in reverse order.
#![no_std]
extern crate alloc;

pub mod chrdev;
pub mod class;
pub mod error;
pub mod file;
pub mod kalloc;
pub mod module;
pub mod print;
pub mod str;
pub mod uaccess;

pub use kbindings as bindings;
pub use kmacro::module;

pub use crate::{
    error::{KernelResult, LinuxError},
    module::{KernelModule, Module, ModuleSlot},
};
