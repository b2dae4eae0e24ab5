//! User address space and the copy primitives that cross into it.
//!
//! Userspace memory is a set of page-aligned mappings, each followed by an
//! unmapped guard page. User pointers are plain addresses into that space and
//! are never dereferenced directly; `_copy_to_user` / `_copy_from_user`
//! resolve them against the mappings and fault when a range is not mapped.
//!
//! References: <https://elixir.bootlin.com/linux/v6.6/source/include/linux/uaccess.h>

use core::{
    ffi::{c_ulong, c_void},
    sync::atomic::{AtomicUsize, Ordering},
};

use alloc::{collections::BTreeMap, vec, vec::Vec};
use axerrno::LinuxError;
use kbindings::PAGE_SIZE;
use kmacro::capi_fn;
use spin::Mutex;

use crate::Result;

/// The type used for userspace addresses.
pub type UserPtr = usize;

const USER_BASE: UserPtr = 0x1000_0000;

static NEXT_USER_ADDR: AtomicUsize = AtomicUsize::new(USER_BASE);
static USER_MAPPINGS: Mutex<BTreeMap<UserPtr, Vec<u8>>> = Mutex::new(BTreeMap::new());

const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

/// Maps `len` zeroed bytes of user memory and returns their address.
pub fn map_user(len: usize) -> Result<UserPtr> {
    if len == 0 || len > isize::MAX as usize - PAGE_SIZE {
        return Err(LinuxError::EINVAL);
    }
    let span = align_up(len, PAGE_SIZE) + PAGE_SIZE;
    let addr = NEXT_USER_ADDR.fetch_add(span, Ordering::Relaxed);
    USER_MAPPINGS.lock().insert(addr, vec![0; len]);
    Ok(addr)
}

/// Removes the mapping starting at `addr`.
pub fn unmap_user(addr: UserPtr) -> Result<()> {
    USER_MAPPINGS
        .lock()
        .remove(&addr)
        .map(|_| ())
        .ok_or(LinuxError::EINVAL)
}

/// Runs `f` over `len` bytes at `addr` if the whole range lies in one mapping.
fn with_user_range<R>(addr: UserPtr, len: usize, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
    let mut mappings = USER_MAPPINGS.lock();
    let (start, data) = mappings.range_mut(..=addr).next_back()?;
    let offset = addr - *start;
    let end = offset.checked_add(len)?;
    if end > data.len() {
        return None;
    }
    Some(f(&mut data[offset..end]))
}

/// Reads user memory the way the owning process would see it.
pub fn read_user(addr: UserPtr, len: usize) -> Result<Vec<u8>> {
    with_user_range(addr, len, |data| data.to_vec()).ok_or(LinuxError::EFAULT)
}

/// Writes user memory the way the owning process would.
pub fn write_user(addr: UserPtr, bytes: &[u8]) -> Result<()> {
    with_user_range(addr, bytes.len(), |data| data.copy_from_slice(bytes)).ok_or(LinuxError::EFAULT)
}

/// Copy a block of data into user space.
///
/// # Arguments
/// - to: destination address, in user space
/// - from: source address, in kernel space
/// - n: number of bytes to copy
///
/// # Returns
/// Number of bytes that could not be copied. On success, this will be zero.
/// A range that is not fully mapped copies nothing.
#[capi_fn]
pub unsafe extern "C" fn _copy_to_user(to: *mut c_void, from: *const c_void, n: c_ulong) -> c_ulong {
    let len = n as usize;
    if len == 0 {
        return 0;
    }
    let src = core::slice::from_raw_parts(from as *const u8, len);
    match with_user_range(to as UserPtr, len, |dst| dst.copy_from_slice(src)) {
        Some(()) => 0,
        None => n,
    }
}

/// Copy a block of data from user space.
///
/// # Returns
/// Number of bytes that could not be copied. On success, this will be zero.
/// If some data could not be copied, the destination is zero-padded.
#[capi_fn]
pub unsafe extern "C" fn _copy_from_user(to: *mut c_void, from: *const c_void, n: c_ulong) -> c_ulong {
    let len = n as usize;
    if len == 0 {
        return 0;
    }
    let dst = core::slice::from_raw_parts_mut(to as *mut u8, len);
    match with_user_range(from as UserPtr, len, |src| dst.copy_from_slice(src)) {
        Some(()) => 0,
        None => {
            dst.fill(0);
            n
        }
    }
}
