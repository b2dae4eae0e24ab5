//! Slices to user space memory regions.
//!
//! C header: [`include/linux/uaccess.h`](https://elixir.bootlin.com/linux/v6.6/source/include/linux/uaccess.h)

use core::{
    ffi::{c_ulong, c_void},
    mem::MaybeUninit,
};

pub use kapi::uaccess::UserPtr;

use crate::error::{KernelResult as Result, LinuxError};

/// A pointer to an area in userspace memory, which can be either read-only
/// or read-write.
///
/// All methods on this struct are safe: attempting to read or write on bad
/// addresses (either out of the bound of the slice or unmapped addresses)
/// will return [`LinuxError::EFAULT`]. Concurrent access, *including data
/// races to/from userspace memory*, is permitted, because fundamentally
/// another userspace thread/process could always be modifying memory at the
/// same time.
pub struct UserSlice {
    ptr: UserPtr,
    length: usize,
}

impl UserSlice {
    /// Constructs a user slice from a raw pointer and a length in bytes.
    ///
    /// Callers must be careful to avoid time-of-check-time-of-use (TOCTOU)
    /// issues: a user slice reads the same memory again on every access.
    pub fn new(ptr: UserPtr, length: usize) -> Self {
        UserSlice { ptr, length }
    }

    /// Constructs a [`UserSliceReader`].
    pub fn reader(self) -> UserSliceReader {
        UserSliceReader {
            ptr: self.ptr,
            length: self.length,
        }
    }

    /// Constructs a [`UserSliceWriter`].
    pub fn writer(self) -> UserSliceWriter {
        UserSliceWriter {
            ptr: self.ptr,
            length: self.length,
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// A reader for [`UserSlice`].
///
/// Used to incrementally read from the user slice.
pub struct UserSliceReader {
    ptr: UserPtr,
    length: usize,
}

impl UserSliceReader {
    /// Skip the provided number of bytes.
    ///
    /// Returns an error if skipping more than the length of the buffer.
    pub fn skip(&mut self, num_skip: usize) -> Result {
        self.length = self.length.checked_sub(num_skip).ok_or(LinuxError::EFAULT)?;
        self.ptr = self.ptr.wrapping_add(num_skip);
        Ok(())
    }

    /// Returns the number of bytes left to be read from this reader.
    ///
    /// Note that even reading less than this number of bytes may fail.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Reads raw data from the user slice into a kernel buffer.
    ///
    /// Fails with [`LinuxError::EFAULT`] if the read happens on a bad address,
    /// or if the read goes out of bounds of this [`UserSliceReader`]. This
    /// call may modify `out` even if it returns an error.
    pub fn read_raw(&mut self, out: &mut [MaybeUninit<u8>]) -> Result {
        let len = out.len();
        if len > self.length {
            return Err(LinuxError::EFAULT);
        }
        let Ok(len_ulong) = c_ulong::try_from(len) else {
            return Err(LinuxError::EFAULT);
        };
        let out_ptr = out.as_mut_ptr().cast::<c_void>();
        let res =
            unsafe { kapi::uaccess::_copy_from_user(out_ptr, self.ptr as *const c_void, len_ulong) };
        if res != 0 {
            return Err(LinuxError::EFAULT);
        }
        self.ptr = self.ptr.wrapping_add(len);
        self.length -= len;
        Ok(())
    }

    /// Reads raw data from the user slice into a kernel buffer.
    ///
    /// Fails with [`LinuxError::EFAULT`] if the read happens on a bad address,
    /// or if the read goes out of bounds of this [`UserSliceReader`].
    pub fn read_slice(&mut self, out: &mut [u8]) -> Result {
        // `read_raw` never writes uninitialized bytes to `out`.
        let out = unsafe { &mut *(out as *mut [u8] as *mut [MaybeUninit<u8>]) };
        self.read_raw(out)
    }
}

/// A writer for [`UserSlice`].
///
/// Used to incrementally write into the user slice.
pub struct UserSliceWriter {
    ptr: UserPtr,
    length: usize,
}

impl UserSliceWriter {
    /// Returns the amount of space remaining in this buffer.
    ///
    /// Note that even writing less than this number of bytes may fail.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Writes raw data to this user pointer from a kernel buffer.
    ///
    /// Fails with [`LinuxError::EFAULT`] if the write happens on a bad
    /// address, or if the write goes out of bounds of this
    /// [`UserSliceWriter`]. This call may modify the associated userspace
    /// slice even if it returns an error.
    pub fn write_slice(&mut self, data: &[u8]) -> Result {
        let len = data.len();
        if len > self.length {
            return Err(LinuxError::EFAULT);
        }
        let Ok(len_ulong) = c_ulong::try_from(len) else {
            return Err(LinuxError::EFAULT);
        };
        let data_ptr = data.as_ptr().cast::<c_void>();
        let res = unsafe { kapi::uaccess::_copy_to_user(self.ptr as *mut c_void, data_ptr, len_ulong) };
        if res != 0 {
            return Err(LinuxError::EFAULT);
        }
        self.ptr = self.ptr.wrapping_add(len);
        self.length -= len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use kapi::uaccess::{map_user, read_user, unmap_user, write_user};

    use super::*;

    #[test]
    fn test_reader_advances() {
        let addr = map_user(8).unwrap();
        write_user(addr, b"abcdefgh").unwrap();
        let mut reader = UserSlice::new(addr, 8).reader();
        let mut out = [0u8; 3];
        reader.read_slice(&mut out).unwrap();
        assert_eq!(&out, b"abc");
        reader.skip(2).unwrap();
        reader.read_slice(&mut out).unwrap();
        assert_eq!(&out, b"fgh");
        assert!(reader.is_empty());
        assert_eq!(reader.read_slice(&mut out), Err(LinuxError::EFAULT));
        assert_eq!(reader.skip(1), Err(LinuxError::EFAULT));
        unmap_user(addr).unwrap();
    }

    #[test]
    fn test_writer_bounds_and_faults() {
        let addr = map_user(4).unwrap();
        let mut writer = UserSlice::new(addr, 4).writer();
        assert_eq!(writer.write_slice(b"12345"), Err(LinuxError::EFAULT));
        writer.write_slice(b"12").unwrap();
        assert_eq!(writer.len(), 2);
        writer.write_slice(b"34").unwrap();
        assert_eq!(read_user(addr, 4).unwrap(), b"1234");

        // The slice claims more than is mapped.
        let mut writer = UserSlice::new(addr, 16).writer();
        assert_eq!(writer.write_slice(&[0u8; 16]), Err(LinuxError::EFAULT));
        assert_eq!(read_user(addr, 4).unwrap(), b"1234");
        unmap_user(addr).unwrap();
    }
}
