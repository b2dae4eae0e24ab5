//! C ABI definitions shared by the kernel API (`kapi`) and loadable modules.
//!
//! Layouts follow the subset of `include/linux/*.h` that character-device
//! drivers touch. Fields the in-tree drivers never read are left out.
#![no_std]
#![allow(warnings)]

use core::ffi::{c_char, c_int, c_uint, c_void};

pub type __s32 = core::ffi::c_int;
pub type __u16 = core::ffi::c_ushort;
pub type __u32 = core::ffi::c_uint;
pub type __s64 = core::ffi::c_longlong;

pub type dev_t = __u32;
pub type umode_t = __u16;
pub type loff_t = __s64;
pub type ssize_t = isize;
pub type gfp_t = core::ffi::c_uint;

/// See <https://elixir.bootlin.com/linux/v6.6/source/include/linux/kdev_t.h>
pub const MINORBITS: u32 = 20;
pub const MINORMASK: u32 = (1 << MINORBITS) - 1;

/// See <https://elixir.bootlin.com/linux/v6.6/source/include/linux/fs.h#L2794>
pub const CHRDEV_MAJOR_MAX: u32 = 512;
/// Marks the bottom of the first segment of free char majors
pub const CHRDEV_MAJOR_DYN_END: u32 = 234;
/// Marks the top and bottom of the second segment of free char majors
pub const CHRDEV_MAJOR_DYN_EXT_START: u32 = 511;
pub const CHRDEV_MAJOR_DYN_EXT_END: u32 = 384;
pub const CHRDEV_MAJOR_HASH_SIZE: u32 = 255;

pub const MAX_ERRNO: u32 = 4095;

pub const __GFP_ZERO: gfp_t = 0x100;
pub const GFP_ATOMIC: gfp_t = 0x820;
pub const GFP_KERNEL: gfp_t = 0xcc0;

/// `1 << (MAX_PAGE_ORDER + PAGE_SHIFT)` with 4K pages.
pub const KMALLOC_MAX_SIZE: usize = 1 << 22;
/// Returned by `kmalloc(0)`; dereferencing it faults, `kfree` ignores it.
pub const ZERO_SIZE_PTR: *mut c_void = 16 as *mut c_void;
pub const PAGE_SIZE: usize = 4096;

pub const KERN_SOH: u8 = 0x01;
pub const KERN_EMERG: &[u8; 3] = b"\x010\0";
pub const KERN_ALERT: &[u8; 3] = b"\x011\0";
pub const KERN_CRIT: &[u8; 3] = b"\x012\0";
pub const KERN_ERR: &[u8; 3] = b"\x013\0";
pub const KERN_WARNING: &[u8; 3] = b"\x014\0";
pub const KERN_NOTICE: &[u8; 3] = b"\x015\0";
pub const KERN_INFO: &[u8; 3] = b"\x016\0";
pub const KERN_DEBUG: &[u8; 3] = b"\x017\0";

pub const S_IFMT: umode_t = 0o170000;
pub const S_IFCHR: umode_t = 0o020000;
pub const S_IRUGO: umode_t = 0o444;
pub const S_IWUGO: umode_t = 0o222;

pub const UEVENT_NUM_ENVP: usize = 64;
pub const UEVENT_BUFFER_SIZE: usize = 2048;

pub const MODULE_NAME_LEN: usize = 64 - core::mem::size_of::<core::ffi::c_ulong>();

pub const module_state_MODULE_STATE_LIVE: module_state = 0;
pub const module_state_MODULE_STATE_COMING: module_state = 1;
pub const module_state_MODULE_STATE_GOING: module_state = 2;
pub const module_state_MODULE_STATE_UNFORMED: module_state = 3;
pub type module_state = core::ffi::c_uint;

macro_rules! zeroed_default {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Default for $ty {
                fn default() -> Self {
                    let mut s = ::core::mem::MaybeUninit::<Self>::uninit();
                    unsafe {
                        ::core::ptr::write_bytes(s.as_mut_ptr(), 0, 1);
                        s.assume_init()
                    }
                }
            }
        )*
    };
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct module {
    pub state: module_state,
    pub name: [c_char; MODULE_NAME_LEN],
    pub init: ::core::option::Option<unsafe extern "C" fn() -> c_int>,
    pub exit: ::core::option::Option<unsafe extern "C" fn()>,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct inode {
    pub i_mode: umode_t,
    pub i_rdev: dev_t,
    pub i_private: *mut c_void,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct file {
    pub f_pos: loff_t,
    pub f_flags: c_uint,
    pub f_inode: *mut inode,
    pub f_op: *const file_operations,
    pub private_data: *mut c_void,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct file_operations {
    pub owner: *mut module,
    pub read: ::core::option::Option<
        unsafe extern "C" fn(
            file: *mut file,
            buf: *mut c_char,
            count: usize,
            pos: *mut loff_t,
        ) -> ssize_t,
    >,
    pub write: ::core::option::Option<
        unsafe extern "C" fn(
            file: *mut file,
            buf: *const c_char,
            count: usize,
            pos: *mut loff_t,
        ) -> ssize_t,
    >,
    pub open: ::core::option::Option<unsafe extern "C" fn(inode: *mut inode, file: *mut file) -> c_int>,
    pub release:
        ::core::option::Option<unsafe extern "C" fn(inode: *mut inode, file: *mut file) -> c_int>,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct kobj_uevent_env {
    pub argv: [*mut c_char; 3],
    pub envp: [*mut c_char; UEVENT_NUM_ENVP],
    pub envp_idx: c_int,
    pub buf: [c_char; UEVENT_BUFFER_SIZE],
    pub buflen: c_int,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct class {
    pub name: *const c_char,
    pub dev_uevent: ::core::option::Option<
        unsafe extern "C" fn(dev: *const device, env: *mut kobj_uevent_env) -> c_int,
    >,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct device {
    pub parent: *mut device,
    pub init_name: *const c_char,
    pub devt: dev_t,
    pub class: *const class,
    pub driver_data: *mut c_void,
}

zeroed_default!(module, inode, file, file_operations, kobj_uevent_env, class, device);
