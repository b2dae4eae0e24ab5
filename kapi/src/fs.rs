//! The VFS path of a character device: open a `/dev` node, dispatch
//! read/write through the driver's `file_operations`, release on close.
//!
//! An [`OpenFile`] borrows the driver's `file_operations` table. Files must be
//! closed before the module that registered the table is unloaded.
//!
//! References:
//! - <https://elixir.bootlin.com/linux/v6.6/source/fs/char_dev.c>
//! - <https://elixir.bootlin.com/linux/v6.6/source/fs/read_write.c>

use core::ffi::{c_char, c_int, c_uint};

use alloc::boxed::Box;
use axerrno::LinuxError;
use kbindings::{file, file_operations, inode, loff_t, ssize_t};

use crate::{Result, chrdev, devtmpfs, error::from_errno, uaccess::UserPtr};

/// Upper bound of a single read or write, `INT_MAX & PAGE_MASK`.
pub const MAX_RW_COUNT: usize = (i32::MAX as usize) & !(kbindings::PAGE_SIZE - 1);

pub struct OpenFile {
    inode: Box<inode>,
    file: Box<file>,
    fops: *const file_operations,
    released: bool,
}

fn check_ret(ret: ssize_t) -> Result<usize> {
    if ret < 0 {
        Err(from_errno(ret as c_int))
    } else {
        Ok(ret as usize)
    }
}

impl OpenFile {
    /// Opens the device node at `path`, calling the driver's `open`.
    pub fn open(path: &str, flags: c_uint) -> Result<Self> {
        let node = devtmpfs::lookup(path).ok_or(LinuxError::ENOENT)?;
        let fops = chrdev::chrdev_lookup(node.devt).ok_or(LinuxError::ENXIO)?;
        let mut inode = Box::new(inode {
            i_mode: node.mode,
            i_rdev: node.devt,
            i_private: core::ptr::null_mut(),
        });
        let file = Box::new(file {
            f_pos: 0,
            f_flags: flags,
            f_inode: &mut *inode,
            f_op: fops,
            private_data: core::ptr::null_mut(),
        });
        let mut this = OpenFile {
            inode,
            file,
            fops,
            released: false,
        };
        if let Some(open) = unsafe { (*fops).open } {
            let ret = unsafe { open(&mut *this.inode, &mut *this.file) };
            if ret != 0 {
                // A failed open is never released.
                this.released = true;
                return Err(from_errno(ret));
            }
        }
        Ok(this)
    }

    fn do_read(&mut self, buf: UserPtr, count: usize, pos: &mut loff_t) -> Result<usize> {
        let read = unsafe { (*self.fops).read }.ok_or(LinuxError::EINVAL)?;
        let count = count.min(MAX_RW_COUNT);
        let ret = unsafe { read(&mut *self.file, buf as *mut c_char, count, pos) };
        check_ret(ret)
    }

    fn do_write(&mut self, buf: UserPtr, count: usize, pos: &mut loff_t) -> Result<usize> {
        let write = unsafe { (*self.fops).write }.ok_or(LinuxError::EINVAL)?;
        let count = count.min(MAX_RW_COUNT);
        let ret = unsafe { write(&mut *self.file, buf as *const c_char, count, pos) };
        check_ret(ret)
    }

    /// `read(2)`: reads at the file position and advances it.
    pub fn read(&mut self, buf: UserPtr, count: usize) -> Result<usize> {
        let mut pos = self.file.f_pos;
        let n = self.do_read(buf, count, &mut pos)?;
        self.file.f_pos = pos;
        Ok(n)
    }

    /// `pread(2)`: reads at `offset`, leaving the file position alone.
    pub fn pread(&mut self, buf: UserPtr, count: usize, offset: loff_t) -> Result<usize> {
        if offset < 0 {
            return Err(LinuxError::EINVAL);
        }
        let mut pos = offset;
        self.do_read(buf, count, &mut pos)
    }

    /// `write(2)`: writes at the file position and advances it.
    pub fn write(&mut self, buf: UserPtr, count: usize) -> Result<usize> {
        let mut pos = self.file.f_pos;
        let n = self.do_write(buf, count, &mut pos)?;
        self.file.f_pos = pos;
        Ok(n)
    }

    pub fn pos(&self) -> loff_t {
        self.file.f_pos
    }

    pub fn rdev(&self) -> kbindings::dev_t {
        self.inode.i_rdev
    }

    /// Closes the file, returning what the driver's `release` reported.
    pub fn release(mut self) -> Result<()> {
        self.do_release()
    }

    fn do_release(&mut self) -> Result<()> {
        if core::mem::replace(&mut self.released, true) {
            return Ok(());
        }
        match unsafe { (*self.fops).release } {
            Some(release) => match unsafe { release(&mut *self.inode, &mut *self.file) } {
                0 => Ok(()),
                ret => Err(from_errno(ret)),
            },
            None => Ok(()),
        }
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        if let Err(err) = self.do_release() {
            log::warn!("release of {:#x} failed: {:?}", self.inode.i_rdev, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use kbindings::S_IFCHR;

    use super::*;
    use crate::{
        chrdev::{__register_chrdev, __unregister_chrdev, mkdev},
        devtmpfs,
        uaccess::{map_user, read_user, unmap_user},
    };

    static RELEASED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn zero_read(
        _file: *mut file,
        buf: *mut c_char,
        count: usize,
        pos: *mut loff_t,
    ) -> ssize_t {
        let zeros = alloc::vec![0u8; count];
        let left = crate::uaccess::_copy_to_user(buf as _, zeros.as_ptr() as _, count as _);
        if left != 0 {
            return -(LinuxError::EFAULT as ssize_t);
        }
        *pos += count as loff_t;
        count as ssize_t
    }

    unsafe extern "C" fn count_release(_inode: *mut inode, _file: *mut file) -> c_int {
        RELEASED.fetch_add(1, Ordering::SeqCst);
        0
    }

    struct TestFops(file_operations);
    unsafe impl Sync for TestFops {}

    static ZERO_FOPS: TestFops = TestFops(file_operations {
        owner: core::ptr::null_mut(),
        read: Some(zero_read),
        write: None,
        open: None,
        release: Some(count_release),
    });

    #[test]
    fn test_open_read_release() {
        let _guard = crate::testing::serial();
        let major = unsafe { __register_chrdev(0, 0, 1, c"fs-zero".as_ptr(), &ZERO_FOPS.0) };
        assert!(major > 0);
        let devt = mkdev(major as u32, 0);
        devtmpfs::create_node("fs-zero", devt, 0o666).unwrap();

        let buf = map_user(8).unwrap();
        let mut file = OpenFile::open("/dev/fs-zero", 0).unwrap();
        assert_eq!(file.rdev(), devt);
        assert_eq!(file.inode.i_mode, S_IFCHR | 0o666);
        assert_eq!(file.read(buf, 8), Ok(8));
        assert_eq!(file.pos(), 8);
        assert_eq!(file.pread(buf, 4, 100), Ok(4));
        assert_eq!(file.pos(), 8);
        assert_eq!(read_user(buf, 8).unwrap(), [0u8; 8]);
        assert_eq!(file.read(buf, 9), Err(LinuxError::EFAULT));
        assert_eq!(file.write(buf, 1), Err(LinuxError::EINVAL));

        let before = RELEASED.load(Ordering::SeqCst);
        file.release().unwrap();
        assert_eq!(RELEASED.load(Ordering::SeqCst), before + 1);
        {
            let _dropped = OpenFile::open("fs-zero", 0).unwrap();
        }
        assert_eq!(RELEASED.load(Ordering::SeqCst), before + 2);

        unmap_user(buf).unwrap();
        devtmpfs::delete_node("fs-zero").unwrap();
        unsafe { __unregister_chrdev(major as u32, 0, 1, c"fs-zero".as_ptr()) };
    }

    #[test]
    fn test_open_errors() {
        let _guard = crate::testing::serial();
        assert_eq!(OpenFile::open("/dev/fs-missing", 0).err(), Some(LinuxError::ENOENT));
        devtmpfs::create_node("fs-orphan", mkdev(244, 0), 0o600).unwrap();
        assert_eq!(OpenFile::open("/dev/fs-orphan", 0).err(), Some(LinuxError::ENXIO));
        devtmpfs::delete_node("fs-orphan").unwrap();
    }
}
