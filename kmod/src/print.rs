//! Printing facilities.
//!
//! The `pr_*!` macros format into a bounded line buffer and hand it to
//! `_printk` at the matching loglevel.
//!
//! C header: [`include/linux/printk.h`](https://elixir.bootlin.com/linux/v6.6/source/include/linux/printk.h)

use core::{cmp, ffi::c_int, fmt};

/// Longest message a single `pr_*!` call logs; the rest is cut off.
///
/// From kernel/printk/printk.c
pub const LOG_LINE_MAX: usize = 1024 - 32;

#[doc(hidden)]
pub struct LogLineWriter {
    data: [u8; LOG_LINE_MAX],
    pos: usize,
}

#[allow(clippy::new_without_default)]
impl LogLineWriter {
    pub fn new() -> LogLineWriter {
        LogLineWriter {
            data: [0u8; LOG_LINE_MAX],
            pos: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.pos]
    }
}

impl fmt::Write for LogLineWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let copy_len = cmp::min(LOG_LINE_MAX - self.pos, s.len());
        self.data[self.pos..self.pos + copy_len].copy_from_slice(&s.as_bytes()[..copy_len]);
        self.pos += copy_len;
        Ok(())
    }
}

/// Prints `args` at the level given by the `KERN_*` prefix `level`.
#[doc(hidden)]
pub fn call_printk(level: &[u8; 3], args: fmt::Arguments<'_>) {
    let mut writer = LogLineWriter::new();
    let _ = fmt::write(&mut writer, args);
    // Don't copy the trailing NUL from the level.
    let mut fmt_str = [0u8; 2 + b"%.*s\0".len()];
    fmt_str[..2].copy_from_slice(&level[..2]);
    fmt_str[2..].copy_from_slice(b"%.*s\0");
    let line = writer.as_bytes();
    unsafe {
        kapi::printk::_printk(fmt_str.as_ptr() as _, line.len() as c_int, line.as_ptr());
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! print_macro {
    ($level:ident, $($arg:tt)+) => {
        $crate::print::call_printk($crate::bindings::$level, format_args!($($arg)+))
    };
}

/// Prints an emergency-level message (level 0).
#[macro_export]
macro_rules! pr_emerg {
    ($($arg:tt)+) => ($crate::print_macro!(KERN_EMERG, $($arg)+));
}

/// Prints an alert-level message (level 1).
#[macro_export]
macro_rules! pr_alert {
    ($($arg:tt)+) => ($crate::print_macro!(KERN_ALERT, $($arg)+));
}

/// Prints a critical-level message (level 2).
#[macro_export]
macro_rules! pr_crit {
    ($($arg:tt)+) => ($crate::print_macro!(KERN_CRIT, $($arg)+));
}

/// Prints an error-level message (level 3).
#[macro_export]
macro_rules! pr_err {
    ($($arg:tt)+) => ($crate::print_macro!(KERN_ERR, $($arg)+));
}

/// Prints a warning-level message (level 4).
#[macro_export]
macro_rules! pr_warn {
    ($($arg:tt)+) => ($crate::print_macro!(KERN_WARNING, $($arg)+));
}

/// Prints a notice-level message (level 5).
#[macro_export]
macro_rules! pr_notice {
    ($($arg:tt)+) => ($crate::print_macro!(KERN_NOTICE, $($arg)+));
}

/// Prints an info-level message (level 6).
#[macro_export]
macro_rules! pr_info {
    ($($arg:tt)+) => ($crate::print_macro!(KERN_INFO, $($arg)+));
}

/// Prints a debug-level message (level 7).
#[macro_export]
macro_rules! pr_debug {
    ($($arg:tt)+) => ($crate::print_macro!(KERN_DEBUG, $($arg)+));
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use core::fmt::Write;

    use kapi::printk::{dmesg, LogLevel};

    use super::*;

    #[test]
    fn test_line_is_truncated() {
        let mut writer = LogLineWriter::new();
        let long = String::from_utf8(alloc::vec![b'a'; LOG_LINE_MAX + 10]).unwrap();
        writer.write_str(&long).unwrap();
        writer.write_str("more").unwrap();
        assert_eq!(writer.as_bytes().len(), LOG_LINE_MAX);
    }

    #[test]
    fn test_levels() {
        crate::pr_alert!("print test alert {}", 1);
        crate::pr_info!("print test info {}", "two");
        crate::pr_debug!("print test debug");
        let level_of = |text: &str| {
            dmesg()
                .into_iter()
                .rev()
                .find(|record| record.text == text)
                .map(|record| record.level)
        };
        assert_eq!(level_of("print test alert 1"), Some(LogLevel::Alert));
        assert_eq!(level_of("print test info two"), Some(LogLevel::Info));
        assert_eq!(level_of("print test debug"), Some(LogLevel::Debug));
    }
}
