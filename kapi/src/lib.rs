//! Kernel API exported to loadable modules.
//!
//! Every `#[capi_fn]` here keeps its C name and ABI so modules can bind to it
//! whether they are linked in or loaded. The rest is the host side: the
//! tables behind those calls and the views tests and tools read them through.
#![no_std]
#![allow(unsafe_op_in_unsafe_fn)]
extern crate alloc;

use axerrno::LinuxResult;

type Result<T> = LinuxResult<T>;

pub mod chrdev;
pub mod device;
pub mod devtmpfs;
pub mod error;
pub mod fault;
pub mod fs;
pub mod mm;
pub mod printk;
pub mod uaccess;
pub mod uevent;

#[cfg(test)]
mod testing;
