//! Wasmtime-backed bootstrap for ashost-core.
//!
//! - `runtime`: engine/store/linker container and the instantiate entry points.
//! - `imports`: the default `env`/`Math`/`Date` host imports.

pub mod imports;
pub mod runtime;

pub use runtime::{Instantiated, Loader, LoaderConfig, instantiate, instantiate_streaming};
