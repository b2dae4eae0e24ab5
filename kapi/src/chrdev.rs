//! Character device region table.
//!
//! References: <https://elixir.bootlin.com/linux/v6.6/source/fs/char_dev.c>

use core::ffi::{CStr, c_char, c_int, c_uint};

use alloc::{string::String, vec::Vec};
use axerrno::LinuxError;
use kbindings::{
    CHRDEV_MAJOR_DYN_END, CHRDEV_MAJOR_DYN_EXT_END, CHRDEV_MAJOR_DYN_EXT_START,
    CHRDEV_MAJOR_HASH_SIZE, CHRDEV_MAJOR_MAX, MINORBITS, MINORMASK, dev_t, file_operations,
};
use kmacro::capi_fn;
use spin::Mutex;

use crate::{
    Result,
    error::to_errno,
    fault::{self, FaultPoint},
};

pub const fn mkdev(major: u32, minor: u32) -> dev_t {
    (major << MINORBITS) | (minor & MINORMASK)
}

pub const fn major(dev: dev_t) -> u32 {
    dev >> MINORBITS
}

pub const fn minor(dev: dev_t) -> u32 {
    dev & MINORMASK
}

struct CharDeviceStruct {
    major: u32,
    baseminor: u32,
    minorct: u32,
    name: String,
    fops: *const file_operations,
}

// The fops table is a static owned by the registering module and only read
// through the shared pointer.
unsafe impl Send for CharDeviceStruct {}

impl CharDeviceStruct {
    fn overlaps(&self, major: u32, baseminor: u32, minorct: u32) -> bool {
        self.major == major
            && baseminor < self.baseminor + self.minorct
            && self.baseminor < baseminor + minorct
    }

    fn contains(&self, dev: dev_t) -> bool {
        major(dev) == self.major
            && minor(dev) >= self.baseminor
            && minor(dev) < self.baseminor + self.minorct
    }
}

static CHRDEVS: Mutex<Vec<CharDeviceStruct>> = Mutex::new(Vec::new());

fn find_dynamic_major(chrdevs: &[CharDeviceStruct]) -> Result<u32> {
    let in_use = |major: u32| chrdevs.iter().any(|cd| cd.major == major);
    (CHRDEV_MAJOR_DYN_END..CHRDEV_MAJOR_HASH_SIZE)
        .rev()
        .chain((CHRDEV_MAJOR_DYN_EXT_END..=CHRDEV_MAJOR_DYN_EXT_START).rev())
        .find(|major| !in_use(*major))
        .ok_or(LinuxError::EBUSY)
}

fn register_chrdev_region(
    major: u32,
    baseminor: u32,
    minorct: u32,
    name: &str,
    fops: *const file_operations,
) -> Result<u32> {
    if major >= CHRDEV_MAJOR_MAX {
        log::error!(
            "CHRDEV \"{}\" major requested ({}) is greater than the maximum ({})",
            name,
            major,
            CHRDEV_MAJOR_MAX - 1
        );
        return Err(LinuxError::EINVAL);
    }
    if minorct == 0 || minorct > MINORMASK + 1 - baseminor.min(MINORMASK + 1) {
        log::error!(
            "CHRDEV \"{}\" minor range requested ({}-{}) is out of range",
            name,
            baseminor,
            baseminor as u64 + minorct as u64
        );
        return Err(LinuxError::EINVAL);
    }
    if fault::should_fail(FaultPoint::ChrdevRegion) {
        return Err(LinuxError::ENOMEM);
    }

    let mut chrdevs = CHRDEVS.lock();
    let major = if major == 0 {
        find_dynamic_major(&chrdevs).inspect_err(|_| {
            log::error!("CHRDEV \"{}\" dynamic allocation region is full", name);
        })?
    } else {
        major
    };
    if chrdevs.iter().any(|cd| cd.overlaps(major, baseminor, minorct)) {
        return Err(LinuxError::EBUSY);
    }
    chrdevs.push(CharDeviceStruct {
        major,
        baseminor,
        minorct,
        name: String::from(name),
        fops,
    });
    Ok(major)
}

unsafe fn chrdev_name(name: *const c_char) -> String {
    if name.is_null() {
        return String::new();
    }
    CStr::from_ptr(name).to_string_lossy().into_owned()
}

/// __register_chrdev() - create and register a cdev occupying a range of minors
///
/// # Arguments
/// - major: major device number or 0 for dynamic allocation
/// - baseminor: first of the requested range of minor numbers
/// - count: the number of minor numbers required
/// - name: name of this range of devices
/// - fops: file operations associated with this devices
///
/// # Returns
/// If `major == 0` this function will dynamically allocate a major and return
/// its number. If `major > 0` this function will attempt to reserve a device
/// with the given major number and will return zero on success. Returns a
/// negative errno on failure.
#[capi_fn]
pub unsafe extern "C" fn __register_chrdev(
    major: c_uint,
    baseminor: c_uint,
    count: c_uint,
    name: *const c_char,
    fops: *const file_operations,
) -> c_int {
    let requested = major;
    let name = chrdev_name(name);
    match register_chrdev_region(major, baseminor, count, &name, fops) {
        Ok(major) => {
            log::info!("chrdev: registered \"{}\" at major {}", name, major);
            if requested == 0 { major as c_int } else { 0 }
        }
        Err(err) => to_errno(err),
    }
}

/// __unregister_chrdev - unregister and destroy a cdev
///
/// Unregister and destroy the cdev occupying the region described by
/// `major`, `baseminor` and `count`.
#[capi_fn]
pub unsafe extern "C" fn __unregister_chrdev(
    major: c_uint,
    baseminor: c_uint,
    count: c_uint,
    name: *const c_char,
) {
    let mut chrdevs = CHRDEVS.lock();
    let found = chrdevs
        .iter()
        .position(|cd| cd.major == major && cd.baseminor == baseminor && cd.minorct == count);
    match found {
        Some(index) => {
            let cd = chrdevs.remove(index);
            log::info!("chrdev: unregistered \"{}\" at major {}", cd.name, cd.major);
        }
        None => log::warn!(
            "chrdev: no region {}:{}+{} to unregister for \"{}\"",
            major,
            baseminor,
            count,
            chrdev_name(name)
        ),
    }
}

/// The file operations serving `dev`, if a region covers it.
pub fn chrdev_lookup(dev: dev_t) -> Option<*const file_operations> {
    CHRDEVS
        .lock()
        .iter()
        .find(|cd| cd.contains(dev))
        .map(|cd| cd.fops)
        .filter(|fops| !fops.is_null())
}

/// Registered regions as `(major, name)`, the "Character devices" part of
/// `/proc/devices`.
pub fn proc_devices() -> Vec<(u32, String)> {
    let mut devices: Vec<(u32, String)> = CHRDEVS
        .lock()
        .iter()
        .map(|cd| (cd.major, cd.name.clone()))
        .collect();
    devices.sort();
    devices
}
