//! Host-side state carried in the Wasmtime store.
//!
//! Import callbacks (`abort`, `trace`, ...) run while the guest is mid-call, so
//! they only see what the store carries. The one thing they need is a way to
//! reach linear memory when the guest imports it instead of exporting it.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use wasmtime::{Caller, Extern, Memory};

use crate::abi::guest_exports;

/// Store data shared by every host import.
pub struct HostState {
    /// Memory defined by the embedder (e.g. an imported `env.memory`).
    pub memory: Option<Memory>,
    /// When the store was created; the reference point for relative clocks.
    pub started: Instant,
    /// xorshift64 state behind `Math.random`.
    rng: u64,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            memory: None,
            started: Instant::now(),
            rng: seed_from_clock(),
        }
    }
}

impl HostState {
    /// Milliseconds since the store was created.
    pub fn elapsed_millis(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    /// Uniform float in `[0, 1)`.
    pub fn next_random(&mut self) -> f64 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng = x;
        // Top 53 bits as the mantissa.
        (x >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn seed_from_clock() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    if nanos == 0 { 0x853c_49e6_748f_ea9b } else { nanos }
}

/// Memory visible to an import: the caller's own export, else the embedder's.
pub fn caller_memory(caller: &mut Caller<'_, HostState>) -> Option<Memory> {
    caller
        .get_export(guest_exports::MEMORY)
        .and_then(Extern::into_memory)
        .or(caller.data().memory)
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn system_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as f64
}
