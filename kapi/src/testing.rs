use spin::{Mutex, MutexGuard};

static SERIAL: Mutex<()> = Mutex::new(());

/// Serialises tests that touch kernel-global tables or fault points, and
/// resets injected faults for the holder.
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let guard = SERIAL.lock();
    crate::fault::clear_all();
    guard
}
