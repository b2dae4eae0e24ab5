//! Owned slab buffers.

use core::{ffi::c_void, ptr::NonNull};

pub use kbindings::{gfp_t, GFP_ATOMIC, GFP_KERNEL};

use crate::error::{KernelResult, LinuxError};

/// A zeroed `kmalloc` allocation, freed with `kfree` when dropped.
pub struct KBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

impl KBuffer {
    /// Allocates `len` zeroed bytes, failing with `ENOMEM` when the slab
    /// returns NULL.
    pub fn zeroed(len: usize, flags: gfp_t) -> KernelResult<Self> {
        let ptr = unsafe { kapi::mm::slab::kzalloc(len, flags) } as *mut u8;
        let ptr = NonNull::new(ptr).ok_or(LinuxError::ENOMEM)?;
        Ok(KBuffer { ptr, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // `ptr` is valid for `len` bytes; zero-sized buffers use ZERO_SIZE_PTR.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for KBuffer {
    fn drop(&mut self) {
        unsafe { kapi::mm::slab::kfree(self.ptr.as_ptr() as *const c_void) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_buffer() {
        let mut buf = KBuffer::zeroed(5, GFP_KERNEL).unwrap();
        assert_eq!(buf.as_slice(), [0u8; 5]);
        buf.as_mut_slice()[..4].copy_from_slice(b"test");
        assert_eq!(buf.as_slice(), b"test\0");
        let empty = KBuffer::zeroed(0, GFP_KERNEL).unwrap();
        assert!(empty.is_empty());
        assert!(empty.as_slice().is_empty());
    }

    #[test]
    fn test_oversized_is_enomem() {
        let err = KBuffer::zeroed(kbindings::KMALLOC_MAX_SIZE + 1, GFP_KERNEL).err();
        assert_eq!(err, Some(LinuxError::ENOMEM));
    }
}
