//! Driver model: device classes, class devices and their uevents.
//!
//! A device with a `dev_t` gets a devtmpfs node. The node permissions come
//! from the `DEVMODE` variable of its `add` uevent (what udev applies), and
//! default to `0600` when the class adds none or the uevent is suppressed.
//!
//! References:
//! - <https://elixir.bootlin.com/linux/v6.6/source/drivers/base/class.c>
//! - <https://elixir.bootlin.com/linux/v6.6/source/drivers/base/core.c>

use core::ffi::{CStr, c_char, c_int, c_void};

use alloc::{
    borrow::ToOwned,
    boxed::Box,
    ffi::CString,
    format,
    string::{String, ToString},
    vec::Vec,
};
use axerrno::LinuxError;
use kbindings::{UEVENT_BUFFER_SIZE, UEVENT_NUM_ENVP, class, dev_t, device, kobj_uevent_env, umode_t};
use kmacro::capi_fn;
use spin::Mutex;

use crate::{
    Result,
    chrdev::{major, minor},
    devtmpfs,
    error::{err_ptr, is_err, to_errno},
    fault::{self, FaultPoint},
    uevent::{self, UeventAction},
};

/// Node permissions when the uevent carries no usable `DEVMODE`.
pub const DEVMODE_DEFAULT: umode_t = 0o600;

struct ClassEntry {
    cls: *mut class,
    name: CString,
}

struct DeviceEntry {
    dev: *mut device,
    name: CString,
    cls: *const class,
    class_name: String,
    devt: dev_t,
}

// Both entries own their allocations; the raw pointers are handed out to the
// creating module and only freed here.
unsafe impl Send for ClassEntry {}
unsafe impl Send for DeviceEntry {}

/// What a uevent needs to know about a device, detached from the table.
struct DeviceDesc {
    dev: *mut device,
    cls: *const class,
    name: String,
    class_name: String,
    devt: dev_t,
}

impl DeviceEntry {
    fn name(&self) -> String {
        self.name.to_string_lossy().into_owned()
    }

    fn desc(&self) -> DeviceDesc {
        DeviceDesc {
            dev: self.dev,
            cls: self.cls,
            name: self.name(),
            class_name: self.class_name.clone(),
            devt: self.devt,
        }
    }
}

impl DeviceDesc {
    fn devpath(&self) -> String {
        format!("/devices/virtual/{}/{}", self.class_name, self.name)
    }
}

static CLASSES: Mutex<Vec<ClassEntry>> = Mutex::new(Vec::new());
static DEVICES: Mutex<Vec<DeviceEntry>> = Mutex::new(Vec::new());

/// Appends one `KEY=value` string to `env`.
pub fn env_push(env: &mut kobj_uevent_env, var: &[u8]) -> Result<()> {
    let idx = env.envp_idx as usize;
    if idx >= UEVENT_NUM_ENVP {
        log::warn!("add_uevent_var: too many keys");
        return Err(LinuxError::ENOMEM);
    }
    let buflen = env.buflen as usize;
    let len = var.len() + 1;
    if buflen + len > UEVENT_BUFFER_SIZE {
        log::warn!("add_uevent_var: buffer size too small");
        return Err(LinuxError::ENOMEM);
    }
    let slot = &mut env.buf[buflen..buflen + len];
    for (dst, src) in slot.iter_mut().zip(var) {
        *dst = *src as c_char;
    }
    slot[var.len()] = 0;
    env.envp[idx] = slot.as_mut_ptr();
    env.envp_idx += 1;
    env.buflen += len as c_int;
    Ok(())
}

/// The variables of `env` in insertion order.
pub fn env_vars(env: &kobj_uevent_env) -> Vec<String> {
    env.buf[..env.buflen as usize]
        .split(|c| *c == 0)
        .take(env.envp_idx as usize)
        .map(|var| {
            let bytes: Vec<u8> = var.iter().map(|c| *c as u8).collect();
            String::from_utf8_lossy(&bytes).into_owned()
        })
        .collect()
}

/// add_uevent_var - add key value string to the environment buffer
///
/// Takes an already formatted `KEY=value` string.
///
/// # Returns
/// 0 if environment variable was added successfully or -ENOMEM if no space
/// was available.
#[capi_fn]
pub unsafe extern "C" fn add_uevent_var(env: *mut kobj_uevent_env, var: *const c_char) -> c_int {
    if env.is_null() || var.is_null() {
        return to_errno(LinuxError::EINVAL);
    }
    match env_push(&mut *env, CStr::from_ptr(var).to_bytes()) {
        Ok(()) => 0,
        Err(err) => to_errno(err),
    }
}

/// Builds the environment of a device uevent, running the class hook.
///
/// `None` means the uevent is suppressed.
unsafe fn device_uevent(action: UeventAction, desc: &DeviceDesc) -> Option<Vec<String>> {
    let mut env: Box<kobj_uevent_env> = Box::default();
    let mut vars = Vec::from([
        format!("ACTION={}", action),
        format!("DEVPATH={}", desc.devpath()),
        format!("SUBSYSTEM={}", desc.class_name),
    ]);
    if desc.devt != 0 {
        vars.push(format!("MAJOR={}", major(desc.devt)));
        vars.push(format!("MINOR={}", minor(desc.devt)));
        vars.push(format!("DEVNAME={}", desc.name));
    }
    for var in &vars {
        env_push(&mut env, var.as_bytes()).ok()?;
    }
    if let Some(dev_uevent) = (*desc.cls).dev_uevent {
        let ret = dev_uevent(desc.dev, &mut *env);
        if ret != 0 {
            log::warn!(
                "uevent: {}: dev_uevent() returned {}, event dropped",
                desc.name,
                ret
            );
            return None;
        }
    }
    Some(env_vars(&env))
}

fn devmode(env: &[String]) -> umode_t {
    let Some(value) = env.iter().find_map(|var| var.strip_prefix("DEVMODE=")) else {
        return DEVMODE_DEFAULT;
    };
    match umode_t::from_str_radix(value, 8) {
        Ok(mode) if mode <= 0o7777 => mode,
        _ => {
            log::warn!("uevent: ignoring invalid DEVMODE={}", value);
            DEVMODE_DEFAULT
        }
    }
}

fn class_name(cls: *const class) -> Option<String> {
    CLASSES
        .lock()
        .iter()
        .find(|entry| entry.cls as *const class == cls)
        .map(|entry| entry.name.to_string_lossy().into_owned())
}

/// class_create - create a struct class structure
///
/// The caller may install a `dev_uevent` hook on the returned class before
/// creating devices in it. Must be released with [`class_destroy`].
///
/// # Returns
/// A pointer to the class, or an `ERR_PTR()` on failure.
#[capi_fn]
pub unsafe extern "C" fn class_create(name: *const c_char) -> *mut class {
    if name.is_null() {
        return err_ptr(LinuxError::EINVAL);
    }
    if fault::should_fail(FaultPoint::ClassCreate) {
        return err_ptr(LinuxError::ENOMEM);
    }
    let name = CStr::from_ptr(name).to_owned();
    let mut classes = CLASSES.lock();
    if classes.iter().any(|entry| entry.name == name) {
        log::error!(
            "class_create: class '{}' already registered",
            name.to_string_lossy()
        );
        return err_ptr(LinuxError::EEXIST);
    }
    let cls = Box::into_raw(Box::new(class {
        name: name.as_ptr(),
        dev_uevent: None,
    }));
    log::info!("class: registered '{}'", name.to_string_lossy());
    classes.push(ClassEntry { cls, name });
    cls
}

/// class_destroy - destroys a struct class structure
///
/// Devices still attached to the class are destroyed first.
#[capi_fn]
pub unsafe extern "C" fn class_destroy(cls: *const class) {
    if cls.is_null() || is_err(cls) {
        return;
    }
    let entry = {
        let mut classes = CLASSES.lock();
        match classes.iter().position(|entry| entry.cls as *const class == cls) {
            Some(index) => classes.remove(index),
            None => {
                log::warn!("class_destroy: unknown class {:p}", cls);
                return;
            }
        }
    };
    let orphans = {
        let mut devices = DEVICES.lock();
        let (orphans, rest): (Vec<DeviceEntry>, Vec<DeviceEntry>) = core::mem::take(&mut *devices)
            .into_iter()
            .partition(|dev| dev.cls == cls);
        *devices = rest;
        orphans
    };
    for dev in orphans {
        log::warn!(
            "class_destroy: class '{}' still has device '{}'",
            entry.name.to_string_lossy(),
            dev.name()
        );
        device_del(dev);
    }
    log::info!("class: unregistered '{}'", entry.name.to_string_lossy());
    drop(Box::from_raw(entry.cls));
}

unsafe fn device_add(
    cls: *const class,
    parent: *mut device,
    devt: dev_t,
    drvdata: *mut c_void,
    name: *const c_char,
) -> Result<*mut device> {
    if cls.is_null() || is_err(cls) {
        return Err(LinuxError::ENODEV);
    }
    let class_name = class_name(cls).ok_or(LinuxError::ENODEV)?;
    if name.is_null() {
        return Err(LinuxError::EINVAL);
    }
    if fault::should_fail(FaultPoint::DeviceCreate) {
        return Err(LinuxError::ENOMEM);
    }
    let name = CStr::from_ptr(name).to_owned();

    let desc = {
        let mut devices = DEVICES.lock();
        if devices
            .iter()
            .any(|dev| dev.name == name || (devt != 0 && dev.devt == devt))
        {
            log::error!(
                "device_create: device '{}' ({}:{}) already exists",
                name.to_string_lossy(),
                major(devt),
                minor(devt)
            );
            return Err(LinuxError::EEXIST);
        }
        let dev = Box::into_raw(Box::new(device {
            parent,
            init_name: name.as_ptr(),
            devt,
            class: cls,
            driver_data: drvdata,
        }));
        let entry = DeviceEntry {
            dev,
            name,
            cls,
            class_name,
            devt,
        };
        let desc = entry.desc();
        devices.push(entry);
        desc
    };

    let env = device_uevent(UeventAction::Add, &desc);
    if devt != 0 {
        let perm = env.as_deref().map_or(DEVMODE_DEFAULT, devmode);
        if let Err(err) = devtmpfs::create_node(&desc.name, devt, perm) {
            log::warn!("devtmpfs: failed to create node for '{}': {:?}", desc.name, err);
        }
    }
    if let Some(env) = env {
        uevent::emit(UeventAction::Add, &desc.devpath(), env);
    }
    Ok(desc.dev)
}

/// device_create - creates a device and registers it with sysfs
///
/// # Arguments
/// - cls: pointer to the struct class that this device should be registered to
/// - parent: pointer to the parent struct device of this new device, if any
/// - devt: the dev_t for the char device to be added
/// - drvdata: the data to be added to the device for callbacks
/// - name: the name for the device
///
/// # Returns
/// The new device, or an `ERR_PTR()` on failure.
#[capi_fn]
pub unsafe extern "C" fn device_create(
    cls: *const class,
    parent: *mut device,
    devt: dev_t,
    drvdata: *mut c_void,
    name: *const c_char,
) -> *mut device {
    match device_add(cls, parent, devt, drvdata, name) {
        Ok(dev) => {
            log::info!("device: created '{}'", CStr::from_ptr((*dev).init_name).to_string_lossy());
            dev
        }
        Err(err) => err_ptr(err),
    }
}

/// Removes the node, broadcasts `remove` and frees the device.
unsafe fn device_del(entry: DeviceEntry) {
    let desc = entry.desc();
    let env = device_uevent(UeventAction::Remove, &desc);
    if desc.devt != 0 {
        if let Err(err) = devtmpfs::delete_node(&desc.name) {
            log::warn!("devtmpfs: failed to delete node for '{}': {:?}", desc.name, err);
        }
    }
    if let Some(env) = env {
        uevent::emit(UeventAction::Remove, &desc.devpath(), env);
    }
    log::info!("device: destroyed '{}'", desc.name);
    drop(Box::from_raw(entry.dev));
}

/// device_destroy - removes a device that was created with device_create()
#[capi_fn]
pub unsafe extern "C" fn device_destroy(cls: *const class, devt: dev_t) {
    let entry = {
        let mut devices = DEVICES.lock();
        devices
            .iter()
            .position(|dev| dev.cls == cls && dev.devt == devt)
            .map(|index| devices.remove(index))
    };
    match entry {
        Some(entry) => device_del(entry),
        None => log::warn!("device_destroy: no device {}:{}", major(devt), minor(devt)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub class: String,
    pub devt: dev_t,
}

/// Registered classes, the entries of `/sys/class`.
pub fn classes() -> Vec<String> {
    CLASSES
        .lock()
        .iter()
        .map(|entry| entry.name.to_string_lossy().to_string())
        .collect()
}

/// Registered class devices.
pub fn devices() -> Vec<DeviceInfo> {
    DEVICES
        .lock()
        .iter()
        .map(|entry| DeviceInfo {
            name: entry.name(),
            class: entry.class_name.clone(),
            devt: entry.devt,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chrdev::mkdev, error::ptr_err};

    unsafe extern "C" fn test_dev_uevent(_dev: *const device, env: *mut kobj_uevent_env) -> c_int {
        add_uevent_var(env, c"DEVMODE=0640".as_ptr())
    }

    unsafe extern "C" fn failing_dev_uevent(_dev: *const device, _env: *mut kobj_uevent_env) -> c_int {
        to_errno(LinuxError::ENOMEM)
    }

    #[test]
    fn test_env_push_limits() {
        let mut env: Box<kobj_uevent_env> = Box::default();
        env_push(&mut env, b"A=1").unwrap();
        env_push(&mut env, b"B=22").unwrap();
        assert_eq!(env_vars(&env), ["A=1", "B=22"]);
        assert_eq!(unsafe { CStr::from_ptr(env.envp[1]) }, c"B=22");

        let big = [b'x'; UEVENT_BUFFER_SIZE];
        assert_eq!(env_push(&mut env, &big), Err(LinuxError::ENOMEM));

        let mut env: Box<kobj_uevent_env> = Box::default();
        for _ in 0..UEVENT_NUM_ENVP {
            env_push(&mut env, b"K=v").unwrap();
        }
        assert_eq!(env_push(&mut env, b"K=v"), Err(LinuxError::ENOMEM));
    }

    #[test]
    fn test_class_create_errors() {
        let _guard = crate::testing::serial();
        unsafe {
            assert_eq!(ptr_err(class_create(core::ptr::null())), -22);
            let cls = class_create(c"dm-test-dup".as_ptr());
            assert!(!is_err(cls));
            assert_eq!(ptr_err(class_create(c"dm-test-dup".as_ptr())), -17);
            fault::inject(FaultPoint::ClassCreate, 1);
            assert_eq!(ptr_err(class_create(c"dm-test-other".as_ptr())), -12);
            class_destroy(cls);
            assert!(!classes().iter().any(|name| name == "dm-test-dup"));
        }
    }

    #[test]
    fn test_device_lifecycle() {
        let _guard = crate::testing::serial();
        let devt = mkdev(241, 0);
        unsafe {
            let cls = class_create(c"dm-test".as_ptr());
            (*cls).dev_uevent = Some(test_dev_uevent);
            let dev = device_create(cls, core::ptr::null_mut(), devt, core::ptr::null_mut(), c"dm-test0".as_ptr());
            assert!(!is_err(dev));
            assert_eq!((*dev).devt, devt);

            let node = devtmpfs::lookup("/dev/dm-test0").unwrap();
            assert_eq!(node.permissions(), 0o640);
            assert_eq!(node.devt, devt);

            let add = uevent::uevents()
                .into_iter()
                .rev()
                .find(|event| event.devpath == "/devices/virtual/dm-test/dm-test0")
                .unwrap();
            assert_eq!(add.action, UeventAction::Add);
            assert_eq!(add.var("MAJOR"), Some("241"));
            assert_eq!(add.var("MINOR"), Some("0"));
            assert_eq!(add.var("DEVNAME"), Some("dm-test0"));
            assert_eq!(add.var("SUBSYSTEM"), Some("dm-test"));
            assert_eq!(add.var("DEVMODE"), Some("0640"));

            let dup = device_create(cls, core::ptr::null_mut(), devt, core::ptr::null_mut(), c"dm-test1".as_ptr());
            assert_eq!(ptr_err(dup), -17);

            device_destroy(cls, devt);
            assert!(devtmpfs::lookup("/dev/dm-test0").is_none());
            let last = uevent::uevents().pop().unwrap();
            assert_eq!(last.action, UeventAction::Remove);
            assert_eq!(last.var("DEVNAME"), Some("dm-test0"));
            class_destroy(cls);
        }
        assert!(!devices().iter().any(|dev| dev.class == "dm-test"));
    }

    #[test]
    fn test_device_create_errors() {
        let _guard = crate::testing::serial();
        unsafe {
            let bogus = err_ptr::<class>(LinuxError::ENOMEM);
            let dev = device_create(bogus, core::ptr::null_mut(), 0, core::ptr::null_mut(), c"x".as_ptr());
            assert_eq!(ptr_err(dev), -19);
            let dev = device_create(core::ptr::null(), core::ptr::null_mut(), 0, core::ptr::null_mut(), c"x".as_ptr());
            assert_eq!(ptr_err(dev), -19);

            let cls = class_create(c"dm-test-fail".as_ptr());
            fault::inject(FaultPoint::DeviceCreate, 1);
            let dev = device_create(cls, core::ptr::null_mut(), mkdev(242, 0), core::ptr::null_mut(), c"dm-fail0".as_ptr());
            assert_eq!(ptr_err(dev), -12);
            assert!(devtmpfs::lookup("dm-fail0").is_none());
            class_destroy(cls);
        }
    }

    #[test]
    fn test_suppressed_uevent_uses_default_mode() {
        let _guard = crate::testing::serial();
        let devt = mkdev(243, 0);
        unsafe {
            let cls = class_create(c"dm-test-quiet".as_ptr());
            (*cls).dev_uevent = Some(failing_dev_uevent);
            let before = uevent::uevents().last().map(|event| event.seqnum);
            let dev = device_create(cls, core::ptr::null_mut(), devt, core::ptr::null_mut(), c"dm-quiet0".as_ptr());
            assert!(!is_err(dev));
            assert_eq!(uevent::uevents().last().map(|event| event.seqnum), before);
            assert_eq!(devtmpfs::lookup("dm-quiet0").unwrap().permissions(), DEVMODE_DEFAULT);

            // Destroying the class takes the device with it.
            class_destroy(cls);
            assert!(devtmpfs::lookup("dm-quiet0").is_none());
            assert!(!devices().iter().any(|dev| dev.name == "dm-quiet0"));
        }
    }
}
