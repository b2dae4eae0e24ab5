//! Kernel log buffer and console.
//!
//! `_printk` records every message in a bounded ring (what `dmesg` reads)
//! and forwards messages more severe than the console loglevel to the `log`
//! facade.
//!
//! References: <https://elixir.bootlin.com/linux/v6.6/source/kernel/printk/printk.c>

use core::{
    ffi::{CStr, c_char, c_int},
    sync::atomic::{AtomicI32, AtomicU64, Ordering},
};

use alloc::{collections::VecDeque, string::String, vec::Vec};
use kbindings::KERN_SOH;
use kmacro::capi_fn;
use spin::Mutex;

/// Records kept before the oldest ones are overwritten.
pub const LOG_BUF_LEN: usize = 1024;
pub const CONSOLE_LOGLEVEL_DEFAULT: i32 = 7;
/// Level of messages printed without a `KERN_*` prefix.
pub const MESSAGE_LOGLEVEL_DEFAULT: LogLevel = LogLevel::Warning;

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Emerg = 0,
    Alert = 1,
    Crit = 2,
    Err = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl LogLevel {
    fn from_digit(digit: u8) -> Option<LogLevel> {
        let level = match digit {
            b'0' => LogLevel::Emerg,
            b'1' => LogLevel::Alert,
            b'2' => LogLevel::Crit,
            b'3' => LogLevel::Err,
            b'4' => LogLevel::Warning,
            b'5' => LogLevel::Notice,
            b'6' => LogLevel::Info,
            b'7' => LogLevel::Debug,
            _ => return None,
        };
        Some(level)
    }

    /// Splits a `KERN_SOH <digit>` prefix off a format string.
    fn parse_prefix(fmt: &[u8]) -> (LogLevel, &[u8]) {
        match fmt {
            [KERN_SOH, digit, rest @ ..] => match LogLevel::from_digit(*digit) {
                Some(level) => (level, rest),
                None => (MESSAGE_LOGLEVEL_DEFAULT, rest),
            },
            _ => (MESSAGE_LOGLEVEL_DEFAULT, fmt),
        }
    }

    fn as_log_level(self) -> log::Level {
        match self {
            LogLevel::Emerg | LogLevel::Alert | LogLevel::Crit | LogLevel::Err => log::Level::Error,
            LogLevel::Warning => log::Level::Warn,
            LogLevel::Notice | LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub seq: u64,
    pub level: LogLevel,
    pub text: String,
}

const fn initial_console_loglevel() -> i32 {
    match option_env!("CONSOLE_LOGLEVEL") {
        Some(value) => match value.as_bytes() {
            [digit @ b'0'..=b'8'] => (*digit - b'0') as i32,
            _ => CONSOLE_LOGLEVEL_DEFAULT,
        },
        None => CONSOLE_LOGLEVEL_DEFAULT,
    }
}

static CONSOLE_LOGLEVEL: AtomicI32 = AtomicI32::new(initial_console_loglevel());
static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static LOG_BUF: Mutex<VecDeque<LogRecord>> = Mutex::new(VecDeque::new());

pub fn console_loglevel() -> i32 {
    CONSOLE_LOGLEVEL.load(Ordering::Relaxed)
}

/// Messages with a level below `level` reach the console.
pub fn set_console_loglevel(level: i32) {
    CONSOLE_LOGLEVEL.store(level.clamp(0, 8), Ordering::Relaxed);
}

fn log_store(level: LogLevel, text: String) {
    if (level as i32) < console_loglevel() {
        log::log!(target: "kernel", level.as_log_level(), "{}", text);
    }
    let seq = LOG_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut buf = LOG_BUF.lock();
    if buf.len() == LOG_BUF_LEN {
        buf.pop_front();
    }
    buf.push_back(LogRecord { seq, level, text });
}

/// printk - print a kernel message
///
/// Only the `KERN_<LEVEL> "%.*s"` form is supported: `fmt` carries the level
/// prefix, `len` and `s` the already formatted message.
#[capi_fn]
pub unsafe extern "C" fn _printk(fmt: *const c_char, len: c_int, s: *const u8) -> c_int {
    let (level, _) = if fmt.is_null() {
        (MESSAGE_LOGLEVEL_DEFAULT, &[][..])
    } else {
        LogLevel::parse_prefix(CStr::from_ptr(fmt).to_bytes())
    };
    let len = if s.is_null() { 0 } else { len.max(0) as usize };
    let bytes = if len == 0 {
        &[][..]
    } else {
        core::slice::from_raw_parts(s, len)
    };
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    log_store(level, String::from_utf8_lossy(bytes).into_owned());
    len as c_int
}

/// Snapshot of the log buffer, oldest first.
pub fn dmesg() -> Vec<LogRecord> {
    LOG_BUF.lock().iter().cloned().collect()
}

/// Whether any record in the log buffer contains `needle`.
pub fn dmesg_contains(needle: &str) -> bool {
    LOG_BUF.lock().iter().any(|record| record.text.contains(needle))
}

pub fn dmesg_clear() {
    LOG_BUF.lock().clear();
}

#[cfg(test)]
mod tests {
    use kbindings::{KERN_ALERT, KERN_INFO};

    use super::*;

    fn printk(prefix: &[u8], msg: &str) -> c_int {
        let mut fmt = alloc::vec::Vec::from(&prefix[..prefix.len() - 1]);
        fmt.extend_from_slice(b"%.*s\0");
        unsafe { _printk(fmt.as_ptr() as *const c_char, msg.len() as c_int, msg.as_ptr()) }
    }

    #[test]
    fn test_levels_are_recorded() {
        let _guard = crate::testing::serial();
        assert_eq!(printk(KERN_INFO, "printk info test\n"), 17);
        printk(KERN_ALERT, "printk alert test");
        printk(b"\0", "printk default test");
        let records = dmesg();
        let find = |text: &str| records.iter().find(|r| r.text == text).map(|r| r.level);
        assert_eq!(find("printk info test"), Some(LogLevel::Info));
        assert_eq!(find("printk alert test"), Some(LogLevel::Alert));
        assert_eq!(find("printk default test"), Some(MESSAGE_LOGLEVEL_DEFAULT));
    }

    #[test]
    fn test_ring_overwrites_oldest() {
        let _guard = crate::testing::serial();
        dmesg_clear();
        for i in 0..LOG_BUF_LEN + 3 {
            printk(KERN_INFO, &alloc::format!("line {}", i));
        }
        let records = dmesg();
        assert_eq!(records.len(), LOG_BUF_LEN);
        assert_eq!(records[0].text, "line 3");
        assert!(records.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[test]
    fn test_console_loglevel_clamped() {
        let _guard = crate::testing::serial();
        let saved = console_loglevel();
        set_console_loglevel(42);
        assert_eq!(console_loglevel(), 8);
        set_console_loglevel(saved);
    }
}
