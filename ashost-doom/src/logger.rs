//! Console output from the guest.
//!
//! `js_console_log`, `js_stdout` and `js_stderr` pass a UTF-8 `(ptr, len)`
//! range. Each non-empty line is forwarded to `log` at the logger's level.

use ashost_core::heap::Heap;

/// `log` target for guest output.
pub const TARGET: &str = "doom";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GuestLogger {
    level: log::Level,
}

impl GuestLogger {
    pub fn new(level: log::Level) -> Self {
        Self { level }
    }

    /// Forward the string at `ptr..ptr + len`; returns how many lines were emitted.
    pub fn write(&self, memory: &[u8], ptr: u32, len: u32) -> ashost_core::Result<usize> {
        let bytes = Heap::new(memory).slice(ptr, len as usize)?;
        Ok(self.emit(bytes))
    }

    pub fn emit(&self, bytes: &[u8]) -> usize {
        let text = String::from_utf8_lossy(bytes);
        let mut count = 0;
        for line in lines(&text) {
            log::log!(target: TARGET, self.level, "{line}");
            count += 1;
        }
        count
    }
}

/// Non-empty lines of `text`.
pub fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').filter(|line| !line.is_empty())
}
