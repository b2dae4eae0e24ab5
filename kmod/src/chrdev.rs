//! Character devices.
//!
//! C header: [`include/linux/fs.h`](https://elixir.bootlin.com/linux/v6.6/source/include/linux/fs.h)

use core::{ffi::CStr, fmt, ops::Range};

use alloc::boxed::Box;
use kbindings::{dev_t, file_operations};

use crate::{
    error::{KernelResult, LinuxError},
    file::{FileOperations, OperationsVtable},
    module::Module,
};

/// A device number, `MKDEV(major, minor)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevT(dev_t);

impl DevT {
    pub const fn new(major: u32, minor: u32) -> Self {
        DevT(kapi::chrdev::mkdev(major, minor))
    }

    pub const fn from_raw(dev: dev_t) -> Self {
        DevT(dev)
    }

    pub const fn major(self) -> u32 {
        kapi::chrdev::major(self.0)
    }

    pub const fn minor(self) -> u32 {
        kapi::chrdev::minor(self.0)
    }

    pub const fn as_raw(self) -> dev_t {
        self.0
    }
}

impl fmt::Debug for DevT {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major(), self.minor())
    }
}

/// A registered range of character device numbers served by one
/// `file_operations` table. Unregistered when dropped.
pub struct Registration {
    name: &'static CStr,
    major: u32,
    minors: Range<u32>,
    // Owned by the registration so that `owner` can point at the module.
    fops: Box<file_operations>,
}

// `fops` is only read by the kernel after registration.
unsafe impl Send for Registration {}
unsafe impl Sync for Registration {}

impl Registration {
    /// Registers `T` for `minors` of `major`; a `major` of 0 asks for a
    /// dynamically allocated one.
    pub fn register<T: FileOperations>(
        name: &'static CStr,
        major: u32,
        minors: Range<u32>,
        module: &'static Module,
    ) -> KernelResult<Self> {
        if minors.is_empty() {
            return Err(LinuxError::EINVAL);
        }
        let mut fops = Box::new(*OperationsVtable::<T>::build());
        fops.owner = module.as_ptr();
        let ret = unsafe {
            kapi::chrdev::__register_chrdev(
                major,
                minors.start,
                minors.end - minors.start,
                name.as_ptr(),
                &*fops,
            )
        };
        if ret < 0 {
            return Err(crate::error::from_errno(ret));
        }
        let major = if major == 0 { ret as u32 } else { major };
        Ok(Registration {
            name,
            major,
            minors,
            fops,
        })
    }

    /// The table the kernel dispatches to for this range.
    pub fn fops(&self) -> &file_operations {
        &self.fops
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    /// The device number of the first minor of the range.
    pub fn devt(&self) -> DevT {
        DevT::new(self.major, self.minors.start)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        unsafe {
            kapi::chrdev::__unregister_chrdev(
                self.major,
                self.minors.start,
                self.minors.end - self.minors.start,
                self.name.as_ptr(),
            )
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;
    impl FileOperations for Nothing {}

    static TEST_MODULE: Module = Module::new("chrdev_test", None, None);

    #[test]
    fn test_devt() {
        let devt = DevT::new(240, 7);
        assert_eq!(devt.major(), 240);
        assert_eq!(devt.minor(), 7);
        assert_eq!(DevT::from_raw(devt.as_raw()), devt);
        assert_eq!(alloc::format!("{:?}", devt), "240:7");
    }

    #[test]
    fn test_register_and_drop() {
        let reg = Registration::register::<Nothing>(c"kmod-chrdev", 0, 0..4, &TEST_MODULE).unwrap();
        let major = reg.major();
        assert!(major > 0);
        let fops = kapi::chrdev::chrdev_lookup(DevT::new(major, 3).as_raw()).unwrap();
        assert_eq!(fops, reg.fops() as *const file_operations);
        assert_eq!(unsafe { (*fops).owner }, TEST_MODULE.as_ptr());
        assert_eq!(reg.devt(), DevT::new(major, 0));
        drop(reg);
        assert!(kapi::chrdev::chrdev_lookup(DevT::new(major, 0).as_raw()).is_none());
        assert!(Registration::register::<Nothing>(c"kmod-chrdev", 0, 2..2, &TEST_MODULE).is_err());
    }
}
