//! ashost-core ABI module
//!
//! This module defines the contract between:
//! - **Host**: `ashost-core` (this crate)
//! - **Guest**: a WebAssembly module built against a managed runtime that exposes
//!   its allocator, collector and type table through exports
//!
//! ## Object model
//! Every managed object is a payload preceded by an 8-byte header:
//!
//! ```text
//!   ptr - 8: u32 runtime type id
//!   ptr - 4: u32 payload size in bytes
//!   ptr    : payload
//! ```
//!
//! Handles are the payload offsets (`ptr`), never the header offsets.
//!
//! ## Imports (guest -> host)
//! - `env.abort(msg: u32, file: u32, line: u32, column: u32)`
//! - `env.trace(msg: u32, n: i32, a0..a4: f64)`
//! - `env.seed() -> f64`
//! - `Math.*` and `Date.now`
//!
//! ## Exports (host -> guest)
//! - `memory` (or an imported `env.memory`)
//! - `__new(size: u32, id: u32) -> u32`
//! - `__pin(ptr: u32) -> u32`, `__unpin(ptr: u32)`, `__collect()`
//! - `__rtti_base` global (u32)
//! - optional: `table`, `__argumentsLength` global or `__setArgumentsLength(n)`

/// Import module name for the runtime imports.
pub const IMPORT_MODULE: &str = "env";

/// Offset of the type id relative to a handle.
pub const ID_OFFSET: i64 = -8;
/// Offset of the payload size relative to a handle.
pub const SIZE_OFFSET: i64 = -4;

/// Built-in runtime type ids.
pub mod type_ids {
    pub const ARRAY_BUFFER: u32 = 1;
    pub const STRING: u32 = 2;
}

/// Field layout of `ArrayBufferView`-derived objects (typed arrays, `Array<T>`).
pub mod view_layout {
    pub const BUFFER_OFFSET: u32 = 0;
    pub const DATASTART_OFFSET: u32 = 4;
    pub const BYTELENGTH_OFFSET: u32 = 8;
    /// Size of a plain view header.
    pub const VIEW_SIZE: u32 = 12;
    /// `Array<T>` additionally stores its element count.
    pub const LENGTH_OFFSET: u32 = 12;
    pub const ARRAY_SIZE: u32 = 16;
}

/// Strings up to this many code units are decoded without the strict decoder.
pub const STRING_SMALLSIZE: usize = 192;
/// Chunk size (code units) for the lenient fallback decoder.
pub const STRING_CHUNKSIZE: usize = 1024;

/// Guest export names consumed by the bridge.
pub mod guest_exports {
    pub const MEMORY: &str = "memory";
    pub const TABLE: &str = "table";
    pub const NEW: &str = "__new";
    pub const PIN: &str = "__pin";
    pub const UNPIN: &str = "__unpin";
    pub const COLLECT: &str = "__collect";
    pub const RTTI_BASE: &str = "__rtti_base";

    /// Arity signal, as a mutable global.
    pub const ARGUMENTS_LENGTH: &str = "__argumentsLength";
    /// Arity signal, as a setter function (newer and older runtimes).
    pub const SET_ARGUMENTS_LENGTH: &str = "__setArgumentsLength";
    pub const SETARGC: &str = "__setargc";
}

/// Host import names provided to the guest.
pub mod host_imports {
    pub const ABORT: &str = "abort";
    pub const TRACE: &str = "trace";
    pub const SEED: &str = "seed";
    /// Imported linear memory, when the guest does not export its own.
    pub const MEMORY: &str = "memory";

    pub const MATH_MODULE: &str = "Math";
    pub const DATE_MODULE: &str = "Date";
    pub const DATE_NOW: &str = "now";

    pub const MATH_UNARY: &[&str] = &[
        "abs", "acos", "acosh", "asin", "asinh", "atan", "atanh", "cbrt", "ceil", "cos", "cosh",
        "exp", "expm1", "floor", "fround", "log", "log10", "log1p", "log2", "round", "sign", "sin",
        "sinh", "sqrt", "tan", "tanh", "trunc",
    ];
    pub const MATH_BINARY: &[&str] = &["atan2", "hypot", "max", "min", "pow"];
    pub const MATH_RANDOM: &str = "random";
}

/// Placeholder used when a string is requested before any memory is known.
pub const UNKNOWN_STRING: &str = "<yet unknown>";
