//! Allocation and collection entry points exported by the guest runtime.
//!
//! Anything that allocates object A and then object B which must reference A
//! has to pin A across B's allocation: `__new` may run a collection, and A is
//! not reachable from the guest's roots until B points at it.

use wasmtime::{AsContextMut, Instance, TypedFunc};

use crate::abi::guest_exports;
use crate::error::{BridgeError, Capability, Result};
use crate::state::HostState;

/// Typed handles to `__new`, `__pin`, `__unpin` and `__collect`.
#[derive(Clone, Default)]
pub struct Collector {
    new: Option<TypedFunc<(u32, u32), u32>>,
    pin: Option<TypedFunc<u32, u32>>,
    unpin: Option<TypedFunc<u32, ()>>,
    collect: Option<TypedFunc<(), ()>>,
}

impl Collector {
    /// Resolve whichever runtime exports the instance has.
    pub fn resolve(instance: &Instance, mut store: impl AsContextMut<Data = HostState>) -> Self {
        let mut store = store.as_context_mut();
        let collector = Self {
            new: instance
                .get_typed_func(&mut store, guest_exports::NEW)
                .ok(),
            pin: instance
                .get_typed_func(&mut store, guest_exports::PIN)
                .ok(),
            unpin: instance
                .get_typed_func(&mut store, guest_exports::UNPIN)
                .ok(),
            collect: instance
                .get_typed_func(&mut store, guest_exports::COLLECT)
                .ok(),
        };
        if collector.new.is_none() {
            log::debug!("module exports no allocator; marshaling writes are unavailable");
        }
        collector
    }

    pub fn has_allocator(&self) -> bool {
        self.new.is_some()
    }

    /// Allocate `size` payload bytes tagged with `id`.
    pub fn allocate(
        &self,
        mut store: impl AsContextMut<Data = HostState>,
        size: u32,
        id: u32,
    ) -> Result<u32> {
        let new = self
            .new
            .as_ref()
            .ok_or(BridgeError::Unsupported(Capability::Allocator))?;
        new.call(&mut store, (size, id))
            .map_err(BridgeError::from_call)
    }

    pub fn pin(&self, mut store: impl AsContextMut<Data = HostState>, ptr: u32) -> Result<u32> {
        let pin = self
            .pin
            .as_ref()
            .ok_or(BridgeError::Unsupported(Capability::Pin))?;
        pin.call(&mut store, ptr).map_err(BridgeError::from_call)
    }

    pub fn unpin(&self, mut store: impl AsContextMut<Data = HostState>, ptr: u32) -> Result<()> {
        let unpin = self
            .unpin
            .as_ref()
            .ok_or(BridgeError::Unsupported(Capability::Unpin))?;
        unpin.call(&mut store, ptr).map_err(BridgeError::from_call)
    }

    /// Run a full collection.
    pub fn collect(&self, mut store: impl AsContextMut<Data = HostState>) -> Result<()> {
        let collect = self
            .collect
            .as_ref()
            .ok_or(BridgeError::Unsupported(Capability::Collector))?;
        collect.call(&mut store, ()).map_err(BridgeError::from_call)
    }

    /// Keep `ptr` pinned while `then` allocates whatever references it, and
    /// unpin it again whether or not `then` succeeded.
    pub fn with_pinned<R>(
        &self,
        mut store: impl AsContextMut<Data = HostState>,
        ptr: u32,
        then: impl FnOnce(&mut wasmtime::StoreContextMut<'_, HostState>) -> Result<R>,
    ) -> Result<R> {
        let mut store = store.as_context_mut();
        self.pin(&mut store, ptr)?;
        let result = then(&mut store);
        let unpinned = self.unpin(&mut store, ptr);
        let value = result?;
        unpinned?;
        Ok(value)
    }
}
