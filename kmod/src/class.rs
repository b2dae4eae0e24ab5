//! Device classes and class devices.
//!
//! C header: [`include/linux/device/class.h`](https://elixir.bootlin.com/linux/v6.6/source/include/linux/device/class.h)

use core::{
    ffi::{c_int, CStr},
    marker::PhantomData,
    ptr::NonNull,
};

use alloc::{ffi::CString, format};
use bitflags::bitflags;
use kbindings::{class, device, kobj_uevent_env, umode_t};

use crate::{
    chrdev::DevT,
    error::{from_err_ptr, to_errno, KernelResult, LinuxError},
};

bitflags! {
    /// Permission bits of a device node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mode: umode_t {
        const S_IRUSR = 0o400;
        const S_IWUSR = 0o200;
        const S_IRGRP = 0o040;
        const S_IWGRP = 0o020;
        const S_IROTH = 0o004;
        const S_IWOTH = 0o002;
        const S_IRUGO = Self::S_IRUSR.bits() | Self::S_IRGRP.bits() | Self::S_IROTH.bits();
        const S_IWUGO = Self::S_IWUSR.bits() | Self::S_IWGRP.bits() | Self::S_IWOTH.bits();
    }
}

/// The environment of a uevent being built, handed to [`DevUevent`].
pub struct UeventEnv<'a> {
    env: NonNull<kobj_uevent_env>,
    _env: PhantomData<&'a mut kobj_uevent_env>,
}

impl UeventEnv<'_> {
    /// Adds a `KEY=value` variable, failing with `ENOMEM` when the
    /// environment is full.
    pub fn add_var(&mut self, key: &str, value: core::fmt::Arguments<'_>) -> KernelResult {
        let var = CString::new(format!("{}={}", key, value)).map_err(|_| LinuxError::EINVAL)?;
        let ret = unsafe { kapi::device::add_uevent_var(self.env.as_ptr(), var.as_ptr()) };
        if ret < 0 {
            return Err(crate::error::from_errno(ret));
        }
        Ok(())
    }

    /// Advertises the permissions of the device node, as `DEVMODE=0<octal>`.
    pub fn add_devmode(&mut self, mode: Mode) -> KernelResult {
        self.add_var("DEVMODE", format_args!("0{:o}", mode.bits()))
    }
}

/// The `dev_uevent` hook of a class: adds variables to every uevent of the
/// class's devices.
pub trait DevUevent {
    fn dev_uevent(env: &mut UeventEnv<'_>) -> KernelResult;
}

unsafe extern "C" fn dev_uevent_callback<T: DevUevent>(
    _dev: *const device,
    env: *mut kobj_uevent_env,
) -> c_int {
    let Some(env) = NonNull::new(env) else {
        return to_errno(LinuxError::EINVAL);
    };
    let mut env = UeventEnv {
        env,
        _env: PhantomData,
    };
    match T::dev_uevent(&mut env) {
        Ok(()) => 0,
        Err(err) => to_errno(err),
    }
}

/// A registered device class. Destroyed when dropped.
pub struct Class {
    ptr: NonNull<class>,
}

// The class is only mutated through this handle; the driver core reads it
// under its own locks.
unsafe impl Send for Class {}
unsafe impl Sync for Class {}

impl Class {
    pub fn create(name: &'static CStr) -> KernelResult<Self> {
        let ptr = from_err_ptr(unsafe { kapi::device::class_create(name.as_ptr()) })?;
        let ptr = NonNull::new(ptr).ok_or(LinuxError::ENOMEM)?;
        Ok(Class { ptr })
    }

    /// Installs `T` as the class's `dev_uevent` hook.
    pub fn set_dev_uevent<T: DevUevent>(&mut self) {
        unsafe { (*self.ptr.as_ptr()).dev_uevent = Some(dev_uevent_callback::<T>) };
    }

    pub fn as_ptr(&self) -> *const class {
        self.ptr.as_ptr()
    }
}

impl Drop for Class {
    fn drop(&mut self) {
        unsafe { kapi::device::class_destroy(self.ptr.as_ptr()) };
    }
}

/// A device created in a [`Class`]; its node appears under `/dev`.
/// Destroyed when dropped, which must happen before the class is dropped.
pub struct Device {
    cls: *const class,
    devt: DevT,
}

unsafe impl Send for Device {}
unsafe impl Sync for Device {}

impl Device {
    pub fn create(cls: &Class, devt: DevT, name: &'static CStr) -> KernelResult<Self> {
        from_err_ptr(unsafe {
            kapi::device::device_create(
                cls.as_ptr(),
                core::ptr::null_mut(),
                devt.as_raw(),
                core::ptr::null_mut(),
                name.as_ptr(),
            )
        })?;
        Ok(Device {
            cls: cls.as_ptr(),
            devt,
        })
    }

    pub fn devt(&self) -> DevT {
        self.devt
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe { kapi::device::device_destroy(self.cls, self.devt.as_raw()) };
    }
}
