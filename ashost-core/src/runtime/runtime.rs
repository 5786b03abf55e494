//! Wasmtime-backed bootstrap for ashost-core.
//!
//! Responsibilities:
//! - Create a Wasmtime `Engine`/`Store` with feature flags enabled.
//! - Define default host imports, then let the embedder add or override imports.
//! - Compile a module from any [`ModuleSource`] and instantiate it.
//! - Hand the instance to [`Bridge`], which resolves the runtime exports.

use wasmtime::{Linker, Memory, MemoryType, Module, Store};

use crate::bridge::Bridge;
use crate::error::Result;
use crate::loader::{self, ModuleSource};
use crate::state::HostState;

/// Engine settings.
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Fuel budget for the store; `None` disables metering.
    pub fuel: Option<u64>,
    /// Maximum wasm stack size in bytes.
    pub max_wasm_stack: Option<usize>,
    /// Install `env.abort`, `env.trace`, `env.seed`, `Math.*` and `Date.now`.
    pub default_imports: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            fuel: None,
            max_wasm_stack: None,
            default_imports: true,
        }
    }
}

/// Engine, store and linker for one module instance.
///
/// Embedders define their own imports on [`Loader::linker_mut`] before calling
/// [`Loader::instantiate`]; those definitions win over the defaults.
pub struct Loader {
    pub engine: wasmtime::Engine,
    pub store: Store<HostState>,
    pub linker: Linker<HostState>,
}

/// The result of instantiation.
pub struct Instantiated {
    pub module: Module,
    pub instance: wasmtime::Instance,
    pub exports: Bridge,
}

impl Loader {
    pub fn new() -> Result<Self> {
        Self::with_config(&LoaderConfig::default())
    }

    /// Create a loader with the common post-MVP proposals enabled.
    pub fn with_config(config: &LoaderConfig) -> Result<Self> {
        let mut cfg = wasmtime::Config::new();

        cfg.wasm_multi_value(true);
        cfg.wasm_bulk_memory(true);
        cfg.wasm_reference_types(true);
        cfg.wasm_simd(true);
        cfg.wasm_multi_memory(true);
        cfg.wasm_tail_call(true);

        if config.fuel.is_some() {
            cfg.consume_fuel(true);
        }
        if let Some(stack) = config.max_wasm_stack {
            cfg.max_wasm_stack(stack);
        }

        let engine = wasmtime::Engine::new(&cfg)?;
        let mut store = Store::new(&engine, HostState::default());
        if let Some(fuel) = config.fuel {
            store.set_fuel(fuel)?;
        }

        let mut linker = Linker::new(&engine);
        linker.allow_shadowing(true);
        if config.default_imports {
            super::imports::define_imports(&mut linker)?;
        }

        Ok(Self {
            engine,
            store,
            linker,
        })
    }

    pub fn linker_mut(&mut self) -> &mut Linker<HostState> {
        &mut self.linker
    }

    /// Create a memory and provide it as the import `module.name`.
    ///
    /// Host imports fall back to this memory when the guest does not export one.
    pub fn define_memory(&mut self, module: &str, name: &str, ty: MemoryType) -> Result<Memory> {
        let memory = Memory::new(&mut self.store, ty)?;
        self.linker.define(&self.store, module, name, memory)?;
        self.store.data_mut().memory = Some(memory);
        Ok(memory)
    }

    /// Compile (if needed) and instantiate `source`.
    ///
    /// Stream sources take the streaming path.
    pub fn instantiate(self, source: impl Into<ModuleSource>) -> Result<Instantiated> {
        let module = match source.into() {
            ModuleSource::Module(module) => module,
            ModuleSource::Bytes(bytes) => loader::compile_module(&self.engine, &bytes)?,
            other @ (ModuleSource::File(_) | ModuleSource::Stream(_)) => {
                return self.instantiate_streaming(other);
            }
        };
        self.finish(module)
    }

    /// Prefer compiling directly from the source; buffer it first when the
    /// source cannot be compiled in place.
    pub fn instantiate_streaming(self, source: impl Into<ModuleSource>) -> Result<Instantiated> {
        match source.into() {
            ModuleSource::File(path) => {
                let module = loader::compile_file(&self.engine, &path)?;
                self.finish(module)
            }
            ModuleSource::Stream(reader) => {
                let bytes = loader::buffer_stream(reader)?;
                self.instantiate(ModuleSource::Bytes(bytes))
            }
            other => self.instantiate(other),
        }
    }

    fn finish(mut self, module: Module) -> Result<Instantiated> {
        let instance = self.linker.instantiate(&mut self.store, &module)?;
        log::debug!(
            "instantiated module with {} exports",
            module.exports().len()
        );
        let exports = Bridge::new(self.store, instance)?;
        Ok(Instantiated {
            module,
            instance,
            exports,
        })
    }
}

/// Instantiate with default imports only.
pub fn instantiate(source: impl Into<ModuleSource>) -> Result<Instantiated> {
    Loader::new()?.instantiate(source)
}

/// Streaming variant of [`instantiate`].
pub fn instantiate_streaming(source: impl Into<ModuleSource>) -> Result<Instantiated> {
    Loader::new()?.instantiate_streaming(source)
}
