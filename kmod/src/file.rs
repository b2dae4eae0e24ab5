//! File operations of character devices.
//!
//! C header: [`include/linux/fs.h`](https://elixir.bootlin.com/linux/v6.6/source/include/linux/fs.h)

use core::{
    ffi::{c_char, c_int},
    marker::PhantomData,
};

use kbindings::{dev_t, file_operations, inode, loff_t, ssize_t};

use crate::{
    error::{to_errno, KernelResult, LinuxError},
    uaccess::UserPtr,
};

/// Wraps the kernel's `struct file`.
#[repr(transparent)]
pub struct File(kbindings::file);

impl File {
    /// # Safety
    ///
    /// `ptr` must point to a `struct file` that stays valid for `'a`.
    unsafe fn from_ptr<'a>(ptr: *const kbindings::file) -> &'a File {
        &*(ptr as *const File)
    }

    /// The current position of the file.
    pub fn pos(&self) -> loff_t {
        self.0.f_pos
    }

    /// The `O_*` flags the file was opened with.
    pub fn flags(&self) -> u32 {
        self.0.f_flags
    }

    /// The device number of the node the file was opened through.
    pub fn rdev(&self) -> Option<dev_t> {
        if self.0.f_inode.is_null() {
            return None;
        }
        Some(unsafe { (*self.0.f_inode).i_rdev })
    }
}

/// Corresponds to the kernel's `struct file_operations`, restricted to
/// `open`, `release`, `read` and `write`.
///
/// Methods that are not overridden behave like a NULL entry in the C table:
/// `open` and `release` succeed, `read` and `write` fail with `EINVAL`.
pub trait FileOperations: Sized + 'static {
    /// Called when a file is opened.
    fn open(_file: &File) -> KernelResult {
        Ok(())
    }

    /// Called when the last reference to an open file is dropped.
    fn release(_file: &File) {}

    /// Reads data from the device into the user buffer at `buf`, which the
    /// caller declared to be `count` bytes long. Returns the number of bytes
    /// produced; `offset` may be advanced.
    fn read(_file: &File, _buf: UserPtr, _count: usize, _offset: &mut loff_t) -> KernelResult<usize> {
        Err(LinuxError::EINVAL)
    }

    /// Writes `count` bytes from the user buffer at `buf` to the device.
    /// Returns the number of bytes consumed; `offset` may be advanced.
    fn write(_file: &File, _buf: UserPtr, _count: usize, _offset: &mut loff_t) -> KernelResult<usize> {
        Err(LinuxError::EINVAL)
    }
}

pub(crate) struct OperationsVtable<T>(PhantomData<T>);

impl<T: FileOperations> OperationsVtable<T> {
    unsafe extern "C" fn open_callback(_inode: *mut inode, file: *mut kbindings::file) -> c_int {
        match T::open(File::from_ptr(file)) {
            Ok(()) => 0,
            Err(err) => to_errno(err),
        }
    }

    unsafe extern "C" fn release_callback(_inode: *mut inode, file: *mut kbindings::file) -> c_int {
        T::release(File::from_ptr(file));
        0
    }

    unsafe extern "C" fn read_callback(
        file: *mut kbindings::file,
        buf: *mut c_char,
        count: usize,
        pos: *mut loff_t,
    ) -> ssize_t {
        let mut offset = if pos.is_null() { 0 } else { *pos };
        match T::read(File::from_ptr(file), buf as UserPtr, count, &mut offset) {
            Ok(n) => {
                if !pos.is_null() {
                    *pos = offset;
                }
                n as ssize_t
            }
            Err(err) => to_errno(err) as ssize_t,
        }
    }

    unsafe extern "C" fn write_callback(
        file: *mut kbindings::file,
        buf: *const c_char,
        count: usize,
        pos: *mut loff_t,
    ) -> ssize_t {
        let mut offset = if pos.is_null() { 0 } else { *pos };
        match T::write(File::from_ptr(file), buf as UserPtr, count, &mut offset) {
            Ok(n) => {
                if !pos.is_null() {
                    *pos = offset;
                }
                n as ssize_t
            }
            Err(err) => to_errno(err) as ssize_t,
        }
    }

    const VTABLE: file_operations = file_operations {
        owner: core::ptr::null_mut(),
        read: Some(Self::read_callback),
        write: Some(Self::write_callback),
        open: Some(Self::open_callback),
        release: Some(Self::release_callback),
    };

    /// The `file_operations` template for `T`, one static per type.
    /// Registrations copy it and fill in `owner`.
    pub(crate) const fn build() -> &'static file_operations {
        &Self::VTABLE
    }
}

#[cfg(test)]
mod tests {
    use core::ptr::null_mut;

    use super::*;

    struct Nothing;
    impl FileOperations for Nothing {}

    struct Counter;
    impl FileOperations for Counter {
        fn open(file: &File) -> KernelResult {
            if file.flags() & 1 != 0 {
                return Err(LinuxError::EACCES);
            }
            Ok(())
        }

        fn read(_file: &File, _buf: UserPtr, count: usize, offset: &mut loff_t) -> KernelResult<usize> {
            *offset += count as loff_t;
            Ok(count)
        }
    }

    fn raw_file(flags: u32) -> kbindings::file {
        kbindings::file {
            f_pos: 0,
            f_flags: flags,
            f_inode: null_mut(),
            f_op: null_mut(),
            private_data: null_mut(),
        }
    }

    #[test]
    fn test_defaults() {
        let fops = OperationsVtable::<Nothing>::build();
        let mut file = raw_file(0);
        let mut pos = 0;
        unsafe {
            assert_eq!((fops.open.unwrap())(null_mut(), &mut file), 0);
            assert_eq!((fops.read.unwrap())(&mut file, null_mut(), 4, &mut pos), -22);
            assert_eq!((fops.write.unwrap())(&mut file, core::ptr::null(), 4, &mut pos), -22);
            assert_eq!((fops.release.unwrap())(null_mut(), &mut file), 0);
        }
    }

    #[test]
    fn test_trampolines() {
        let fops = OperationsVtable::<Counter>::build();
        let mut pos = 10;
        unsafe {
            let mut file = raw_file(1);
            assert_eq!((fops.open.unwrap())(null_mut(), &mut file), -13);
            let mut file = raw_file(0);
            assert_eq!((fops.open.unwrap())(null_mut(), &mut file), 0);
            assert_eq!((fops.read.unwrap())(&mut file, null_mut(), 6, &mut pos), 6);
        }
        assert_eq!(pos, 16);
    }
}
