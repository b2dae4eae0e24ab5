//! Kernel errors.
//!
//! Errors are [`LinuxError`] values inside Rust and negative errnos at the C
//! boundary.

use core::ffi::c_int;

pub use axerrno::{LinuxError, LinuxResult};
pub use kapi::error::{from_errno, to_errno};

pub type KernelResult<T = ()> = LinuxResult<T>;

/// Converts an integer as returned by a C kernel function to a result.
pub fn to_result(ret: c_int) -> KernelResult {
    if ret < 0 {
        Err(from_errno(ret))
    } else {
        Ok(())
    }
}

/// Transform a kernel "error pointer" to a normal pointer.
///
/// Some kernel C API functions return an "error pointer" which optionally
/// embeds an `errno`. Callers are supposed to check the returned pointer
/// for errors. This function performs the check and converts the "error
/// pointer" to a normal pointer in an idiomatic fashion.
pub fn from_err_ptr<T>(ptr: *mut T) -> KernelResult<*mut T> {
    if kapi::error::is_err(ptr) {
        return Err(from_errno(kapi::error::ptr_err(ptr) as c_int));
    }
    Ok(ptr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_result() {
        assert_eq!(to_result(0), Ok(()));
        assert_eq!(to_result(250), Ok(()));
        assert_eq!(to_result(-14), Err(LinuxError::EFAULT));
    }

    #[test]
    fn test_from_err_ptr() {
        let ptr = kapi::error::err_ptr::<u32>(LinuxError::ENODEV);
        assert_eq!(from_err_ptr(ptr), Err(LinuxError::ENODEV));
        let mut value = 3u32;
        let raw = &mut value as *mut u32;
        assert_eq!(from_err_ptr(raw), Ok(raw));
    }
}
