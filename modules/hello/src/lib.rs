//! `/dev/hello`: every read returns a greeting, every write is echoed to the
//! kernel log.
#![no_std]

use kmod::{
    chrdev::{self, DevT},
    class::{Class, DevUevent, Device, Mode, UeventEnv},
    file::{File, FileOperations},
    kalloc::{KBuffer, GFP_KERNEL},
    module,
    pr_alert, pr_info,
    str::BStr,
    uaccess::{UserPtr, UserSlice},
    KernelModule, KernelResult, LinuxError, Module,
};

/// Prefix of every log line of the module.
const MODULE_NAME: &str = "Hello World";
const DEVICE_NAME: &core::ffi::CStr = c"hello";
/// What a read returns, NUL terminator included.
pub const MESSAGE: &[u8] = b"Hello World!\n\0";
/// Permissions udev gives `/dev/hello`.
pub const DEVICE_MODE: Mode = Mode::S_IRUGO.union(Mode::S_IWUGO);

const MINORS: u32 = 256;

struct HelloFile;

impl FileOperations for HelloFile {
    fn open(_file: &File) -> KernelResult {
        Ok(())
    }

    fn release(_file: &File) {}

    /// The requested length and offset are ignored: the whole message is
    /// copied to `buf` every time.
    fn read(_file: &File, buf: UserPtr, _count: usize, _offset: &mut i64) -> KernelResult<usize> {
        UserSlice::new(buf, MESSAGE.len())
            .writer()
            .write_slice(MESSAGE)?;
        Ok(MESSAGE.len())
    }

    /// Logs the input up to its first NUL. Like any `pr_info!` line, the log
    /// entry stops at [`kmod::print::LOG_LINE_MAX`] bytes; the whole `count`
    /// is still consumed.
    fn write(_file: &File, buf: UserPtr, count: usize, _offset: &mut i64) -> KernelResult<usize> {
        let size = count.checked_add(1).ok_or(LinuxError::ENOMEM)?;
        let mut input = KBuffer::zeroed(size, GFP_KERNEL)?;
        UserSlice::new(buf, count)
            .reader()
            .read_slice(&mut input.as_mut_slice()[..count])?;
        pr_info!(
            "{}: Input ({}): {}",
            MODULE_NAME,
            count,
            BStr::until_nul(input.as_slice())
        );
        Ok(count)
    }
}

struct HelloUevent;

impl DevUevent for HelloUevent {
    fn dev_uevent(env: &mut UeventEnv<'_>) -> KernelResult {
        env.add_devmode(DEVICE_MODE)
    }
}

struct HelloModule {
    // Dropped in declaration order: device, class, then the chrdev region.
    _device: Device,
    _class: Class,
    _chrdev: chrdev::Registration,
}

impl KernelModule for HelloModule {
    fn init(module: &'static Module) -> KernelResult<Self> {
        pr_info!("Loading {} module...", MODULE_NAME);

        let chrdev = chrdev::Registration::register::<HelloFile>(DEVICE_NAME, 0, 0..MINORS, module)
            .inspect_err(|err| {
                pr_alert!(
                    "Failed to register character device, {}, for module, {}. Error code is {}",
                    BStr::from_bytes(DEVICE_NAME.to_bytes()),
                    MODULE_NAME,
                    kmod::error::to_errno(*err)
                );
            })?;
        let devt = DevT::new(chrdev.major(), 0);

        let mut class = Class::create(DEVICE_NAME).inspect_err(|err| {
            pr_alert!(
                "Failed to create class pointer, {}, for module, {}. Error code is {}",
                BStr::from_bytes(DEVICE_NAME.to_bytes()),
                MODULE_NAME,
                kmod::error::to_errno(*err)
            );
        })?;
        class.set_dev_uevent::<HelloUevent>();

        let device = Device::create(&class, devt, DEVICE_NAME).inspect_err(|err| {
            pr_alert!(
                "Failed to create device file, {}, for module, {}. Error code is {}",
                BStr::from_bytes(DEVICE_NAME.to_bytes()),
                MODULE_NAME,
                kmod::error::to_errno(*err)
            );
        })?;

        Ok(HelloModule {
            _device: device,
            _class: class,
            _chrdev: chrdev,
        })
    }
}

impl Drop for HelloModule {
    fn drop(&mut self) {
        pr_info!("Unloading {} module...", MODULE_NAME);
    }
}

module! {
    type: HelloModule,
    name: "hello",
    author: "Fox",
    version: "0.0.1",
    license: "GPL",
    description: "A sample kernel module",
}
