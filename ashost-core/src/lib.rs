//! ashost-core: a host-side bridge for WebAssembly modules built on a managed
//! runtime (allocator, collector and RTTI exported by the guest).
//!
//! This crate implements the **object-header ABI** described in `crate::abi`:
//! - Strings, buffers and arrays live in guest memory behind an 8-byte header.
//! - The host allocates through `__new` and keeps intermediates alive with
//!   `__pin`/`__unpin`.
//! - Array element types come from the guest's RTTI table.
//! - Mangled export names (`ns.Class#method`) are regrouped into namespaces
//!   and classes.
//!
//! Entry points are [`instantiate`] / [`instantiate_streaming`], or a
//! [`Loader`] when the embedder needs its own imports.

pub mod abi;
mod bridge;
mod collector;
pub mod demangle;
mod error;
pub mod heap;
pub mod loader;
pub mod marshal;
pub mod rtti;
mod runtime;
pub mod state;

pub use bridge::{Bridge, ClassObject};
pub use collector::Collector;
pub use error::{BridgeError, Capability, Result};
pub use loader::{LoadError, ModuleSource};
pub use marshal::{ArrayInit, ArrayValues, ArrayView, ClampedU8, Element};
pub use rtti::{ElementKind, TypeFlags};
pub use runtime::{Instantiated, Loader, LoaderConfig, instantiate, instantiate_streaming};
pub use runtime::imports::format_trace;
pub use state::HostState;

pub use wasmtime::Val;
