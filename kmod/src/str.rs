//! Byte strings as the kernel prints them.

use core::fmt;

/// A byte string printed the way `%s` would: up to the first NUL, with
/// invalid UTF-8 shown as U+FFFD.
#[repr(transparent)]
pub struct BStr([u8]);

impl BStr {
    pub fn from_bytes(bytes: &[u8]) -> &BStr {
        // `BStr` is a transparent wrapper over `[u8]`.
        unsafe { &*(bytes as *const [u8] as *const BStr) }
    }

    /// The prefix of `bytes` before its first NUL.
    pub fn until_nul(bytes: &[u8]) -> &BStr {
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        BStr::from_bytes(&bytes[..end])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for BStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for chunk in self.0.utf8_chunks() {
            f.write_str(chunk.valid())?;
            if !chunk.invalid().is_empty() {
                f.write_str("\u{FFFD}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for BStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.escape_ascii())
    }
}
