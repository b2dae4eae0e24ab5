//! Errno plumbing between the C ABI (negative `int`, `ERR_PTR`) and
//! [`LinuxError`].
//!
//! References: <https://elixir.bootlin.com/linux/v6.6/source/include/linux/err.h>

use core::ffi::{c_int, c_long};

use axerrno::LinuxError;
use kbindings::MAX_ERRNO;

/// Returns the negative errno handed across the C ABI for `err`.
pub const fn to_errno(err: LinuxError) -> c_int {
    -(err as c_int)
}

/// Converts a negative errno coming back from C into a [`LinuxError`].
///
/// Values outside `[-MAX_ERRNO, 0)` or codes without a [`LinuxError`] map to
/// `EINVAL`.
pub fn from_errno(errno: c_int) -> LinuxError {
    if errno >= 0 || errno < -(MAX_ERRNO as c_int) {
        log::warn!("attempted to create an error from out of range errno: {}", errno);
        return LinuxError::EINVAL;
    }
    LinuxError::try_from(-errno).unwrap_or_else(|_| {
        log::warn!("unknown errno {}, reporting EINVAL", errno);
        LinuxError::EINVAL
    })
}

/// Encodes `err` in a pointer, like `ERR_PTR()`.
pub fn err_ptr<T>(err: LinuxError) -> *mut T {
    (to_errno(err) as isize) as usize as *mut T
}

/// Whether `ptr` carries an errno instead of an address, like `IS_ERR()`.
pub fn is_err<T>(ptr: *const T) -> bool {
    ptr as usize >= (-(MAX_ERRNO as isize)) as usize
}

/// Extracts the errno from an error pointer, like `PTR_ERR()`.
pub fn ptr_err<T>(ptr: *const T) -> c_long {
    ptr as isize as c_long
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_round_trip() {
        assert_eq!(from_errno(to_errno(LinuxError::EFAULT)), LinuxError::EFAULT);
        assert_eq!(from_errno(-12), LinuxError::ENOMEM);
        assert_eq!(to_errno(LinuxError::EBUSY), -16);
    }

    #[test]
    fn test_errno_beyond_common_codes() {
        assert_eq!(from_errno(-38), LinuxError::ENOSYS);
        assert_eq!(from_errno(-110), LinuxError::ETIMEDOUT);
        assert_eq!(from_errno(-95), LinuxError::EOPNOTSUPP);
        assert_eq!(from_errno(to_errno(LinuxError::ENODATA)), LinuxError::ENODATA);
    }

    #[test]
    fn test_unassigned_errno() {
        // In range, but no error code is assigned to it.
        assert_eq!(from_errno(-(MAX_ERRNO as c_int)), LinuxError::EINVAL);
    }

    #[test]
    fn test_out_of_range_errno() {
        assert_eq!(from_errno(0), LinuxError::EINVAL);
        assert_eq!(from_errno(5), LinuxError::EINVAL);
        assert_eq!(from_errno(-5000), LinuxError::EINVAL);
    }

    #[test]
    fn test_err_ptr() {
        let ptr = err_ptr::<u8>(LinuxError::EEXIST);
        assert!(is_err(ptr));
        assert_eq!(ptr_err(ptr), -17);
        assert!(!is_err(core::ptr::null::<u8>()));
        let value = 7u32;
        assert!(!is_err(&value as *const u32));
    }
}
