use core::{
    cell::UnsafeCell,
    ffi::{c_char, c_int, CStr},
    ptr::{addr_of, addr_of_mut},
    sync::atomic::{AtomicU32, Ordering},
};

use kbindings::{module_state, module_state_MODULE_STATE_UNFORMED, MODULE_NAME_LEN};
use spin::Mutex;

use crate::error::{to_errno, KernelResult, LinuxError};

/// The `Module` struct represents a kernel module.
///
/// See <https://elixir.bootlin.com/linux/v6.6/source/include/linux/module.h#L402>
#[repr(transparent)]
pub struct Module(UnsafeCell<kbindings::module>);

// Only `state` changes after construction, and only through atomics.
unsafe impl Send for Module {}
unsafe impl Sync for Module {}

impl Module {
    /// Creates a new `Module` with the given name and entry points, in the
    /// `MODULE_STATE_UNFORMED` state.
    ///
    /// Names longer than `MODULE_NAME_LEN - 1` bytes are truncated.
    pub const fn new(
        name: &str,
        init_fn: Option<unsafe extern "C" fn() -> c_int>,
        exit_fn: Option<unsafe extern "C" fn()>,
    ) -> Self {
        let mut module = unsafe { core::mem::MaybeUninit::<kbindings::module>::zeroed().assume_init() };
        let bytes = name.as_bytes();
        let mut i = 0;
        while i < bytes.len() && i < MODULE_NAME_LEN - 1 {
            module.name[i] = bytes[i] as c_char;
            i += 1;
        }
        module.state = module_state_MODULE_STATE_UNFORMED;
        module.init = init_fn;
        module.exit = exit_fn;
        Module(UnsafeCell::new(module))
    }

    pub fn name(&self) -> &str {
        // `new` always leaves a NUL at the end of `name`.
        let name = unsafe { CStr::from_ptr(addr_of!((*self.0.get()).name) as *const c_char) };
        name.to_str().unwrap_or_default()
    }

    pub fn init_fn(&self) -> Option<unsafe extern "C" fn() -> c_int> {
        unsafe { (*self.0.get()).init }
    }

    pub fn exit_fn(&self) -> Option<unsafe extern "C" fn()> {
        unsafe { (*self.0.get()).exit }
    }

    fn state_cell(&self) -> &AtomicU32 {
        unsafe { AtomicU32::from_ptr(addr_of_mut!((*self.0.get()).state)) }
    }

    /// One of the `module_state_MODULE_STATE_*` values.
    pub fn state(&self) -> module_state {
        self.state_cell().load(Ordering::Acquire)
    }

    /// Moves the module to `state`. Driven by whoever loads the module.
    pub fn set_state(&self, state: module_state) {
        self.state_cell().store(state, Ordering::Release);
    }

    /// The `THIS_MODULE` pointer stored in `file_operations.owner`.
    pub fn as_ptr(&self) -> *mut kbindings::module {
        self.0.get()
    }
}

/// The top level entrypoint to implementing a kernel module.
///
/// For any teardown or cleanup operations, your type may implement [`Drop`].
/// Fields are dropped in declaration order, so declare the resources created
/// last first.
pub trait KernelModule: Sized + Send {
    /// Called at module initialization time.
    ///
    /// Equivalent to the `module_init` macro in the C API. An error leaves
    /// nothing registered: whatever was built is dropped before returning.
    fn init(module: &'static Module) -> KernelResult<Self>;
}

/// Storage for the live instance of a module, filled by `init_module` and
/// emptied by `cleanup_module`.
pub struct ModuleSlot<T> {
    inner: Mutex<Option<T>>,
}

impl<T> ModuleSlot<T> {
    pub const fn new() -> Self {
        ModuleSlot {
            inner: Mutex::new(None),
        }
    }

    pub fn is_live(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl<T: KernelModule> ModuleSlot<T> {
    /// Runs [`KernelModule::init`] and stores the result, returning 0 or a
    /// negative errno.
    pub fn init(&self, module: &'static Module) -> c_int {
        let mut slot = self.inner.lock();
        if slot.is_some() {
            log::warn!("module {} is already live", module.name());
            return to_errno(LinuxError::EBUSY);
        }
        match T::init(module) {
            Ok(instance) => {
                *slot = Some(instance);
                0
            }
            Err(err) => to_errno(err),
        }
    }

    /// Drops the live instance, if any.
    pub fn exit(&self) {
        let instance = self.inner.lock().take();
        drop(instance);
    }
}

impl<T> Default for ModuleSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Counted;

    impl KernelModule for Counted {
        fn init(module: &'static Module) -> KernelResult<Self> {
            if module.name() == "refuse" {
                return Err(LinuxError::ENODEV);
            }
            Ok(Counted)
        }
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    static OK_MODULE: Module = Module::new("counted", None, None);
    static REFUSING_MODULE: Module = Module::new("refuse", None, None);

    #[test]
    fn test_module_name() {
        assert_eq!(OK_MODULE.name(), "counted");
        let long = Module::new(
            "a_module_name_that_is_much_longer_than_fifty_five_bytes_in_total",
            None,
            None,
        );
        assert_eq!(long.name().len(), MODULE_NAME_LEN - 1);
    }

    #[test]
    fn test_module_state() {
        let module = Module::new("stateful", None, None);
        assert_eq!(module.state(), module_state_MODULE_STATE_UNFORMED);
        module.set_state(kbindings::module_state_MODULE_STATE_LIVE);
        assert_eq!(module.state(), kbindings::module_state_MODULE_STATE_LIVE);
        assert_eq!(
            unsafe { (*module.as_ptr()).state },
            kbindings::module_state_MODULE_STATE_LIVE
        );
    }

    #[test]
    fn test_slot_lifecycle() {
        let slot: ModuleSlot<Counted> = ModuleSlot::new();
        assert_eq!(slot.init(&OK_MODULE), 0);
        assert!(slot.is_live());
        assert_eq!(slot.init(&OK_MODULE), -16);
        let before = DROPS.load(Ordering::SeqCst);
        slot.exit();
        assert!(!slot.is_live());
        assert_eq!(DROPS.load(Ordering::SeqCst), before + 1);
        slot.exit();
        assert_eq!(DROPS.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_slot_init_failure() {
        let slot: ModuleSlot<Counted> = ModuleSlot::new();
        assert_eq!(slot.init(&REFUSING_MODULE), -19);
        assert!(!slot.is_live());
    }
}
