//! The assembled host API for one instantiated module.

use wasmtime::{
    Extern, Func, Global, Instance, Memory, Mutability, Ref, Store, Table, TypedFunc, Val,
    ValType,
};

use crate::abi::{guest_exports, type_ids, view_layout};
use crate::collector::Collector;
use crate::demangle::{Entry, Exports};
use crate::error::{BridgeError, Capability, Result};
use crate::heap::{Heap, HeapMut};
use crate::marshal::array::{self, ArrayInit, ArrayView};
use crate::marshal::element::{ArrayValues, Element};
use crate::marshal::string;
use crate::rtti::{self, ElementKind, TypeFlags};
use crate::state::HostState;

/// How the guest learns how many arguments a call actually supplied.
#[derive(Clone)]
enum ArgumentsLength {
    Global(Global),
    Setter(TypedFunc<i32, ()>),
    Absent,
}

impl ArgumentsLength {
    fn resolve(instance: &Instance, store: &mut Store<HostState>) -> (Self, Option<&'static str>) {
        if let Some(global) = instance.get_global(&mut *store, guest_exports::ARGUMENTS_LENGTH)
            && global.ty(&*store).mutability() == Mutability::Var
        {
            return (ArgumentsLength::Global(global), None);
        }
        for name in [guest_exports::SET_ARGUMENTS_LENGTH, guest_exports::SETARGC] {
            if let Ok(setter) = instance.get_typed_func::<i32, ()>(&mut *store, name) {
                return (ArgumentsLength::Setter(setter), Some(name));
            }
        }
        (ArgumentsLength::Absent, None)
    }

    fn set(&self, store: &mut Store<HostState>, supplied: usize) -> Result<()> {
        let n = supplied as i32;
        match self {
            ArgumentsLength::Global(global) => global.set(&mut *store, Val::I32(n))?,
            ArgumentsLength::Setter(setter) => setter
                .call(&mut *store, n)
                .map_err(BridgeError::from_call)?,
            ArgumentsLength::Absent => {}
        }
        Ok(())
    }
}

/// An instance of a demangled class: the class path plus the guest handle.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ClassObject {
    class: String,
    this: u32,
}

impl ClassObject {
    pub fn class(&self) -> &str {
        &self.class
    }

    /// The raw handle (what the guest sees as `this`).
    pub fn handle(&self) -> u32 {
        self.this
    }
}

/// Marshaling, RTTI, collector and demangled exports over one instance.
///
/// Every operation re-reads linear memory from the store, so nothing here is
/// invalidated by memory growth. Views returned by `&self` methods borrow the
/// bridge and therefore cannot be held across a call that may allocate.
pub struct Bridge {
    store: Store<HostState>,
    instance: Instance,
    memory: Option<Memory>,
    table: Option<Table>,
    rtti_base: Option<u32>,
    collector: Collector,
    arity: ArgumentsLength,
    exports: Exports,
}

impl Bridge {
    pub(crate) fn new(mut store: Store<HostState>, instance: Instance) -> Result<Self> {
        let list: Vec<(String, Extern)> = instance
            .exports(&mut store)
            .map(|e| (e.name().to_string(), e.into_extern()))
            .collect();

        let memory = instance
            .get_memory(&mut store, guest_exports::MEMORY)
            .or(store.data().memory);
        let table = instance.get_table(&mut store, guest_exports::TABLE);
        let rtti_base = instance
            .get_global(&mut store, guest_exports::RTTI_BASE)
            .and_then(|g| g.get(&mut store).i32())
            .map(|base| base as u32);
        let collector = Collector::resolve(&instance, &mut store);
        let (arity, setter_name) = ArgumentsLength::resolve(&instance, &mut store);

        let skip: Vec<&str> = setter_name.into_iter().collect();
        let exports = Exports::assemble(&list, &skip);

        log::debug!(
            "bridge ready: memory={}, table={}, rtti={:?}, allocator={}",
            memory.is_some(),
            table.is_some(),
            rtti_base,
            collector.has_allocator()
        );

        Ok(Self {
            store,
            instance,
            memory,
            table,
            rtti_base,
            collector,
            arity,
            exports,
        })
    }

    pub fn store(&self) -> &Store<HostState> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<HostState> {
        &mut self.store
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn exports(&self) -> &Exports {
        &self.exports
    }

    pub fn memory(&self) -> Result<Memory> {
        self.memory
            .ok_or(BridgeError::Unsupported(Capability::Memory))
    }

    /// A view of linear memory as it is right now.
    pub fn heap(&self) -> Result<Heap<'_>> {
        let memory = self.memory()?;
        Ok(Heap::new(memory.data(&self.store)))
    }

    fn heap_mut(&mut self) -> Result<HeapMut<'_>> {
        let memory = self.memory()?;
        Ok(HeapMut::new(memory.data_mut(&mut self.store)))
    }

    // --- Type-layout resolver ---

    fn rtti_base(&self) -> Result<u32> {
        self.rtti_base
            .ok_or(BridgeError::Unsupported(Capability::Rtti))
    }

    /// Number of type ids in the RTTI table.
    pub fn declared_type_count(&self) -> Result<u32> {
        rtti::declared_count(self.heap()?.bytes(), self.rtti_base()?)
    }

    /// RTTI flags of `id`.
    pub fn layout_of(&self, id: u32) -> Result<TypeFlags> {
        rtti::layout_of(self.heap()?.bytes(), self.rtti_base()?, id)
    }

    /// RTTI flags of `id`, which must be an array kind.
    pub fn array_layout_of(&self, id: u32) -> Result<TypeFlags> {
        rtti::array_layout_of(self.heap()?.bytes(), self.rtti_base()?, id)
    }

    // --- Collector ---

    pub fn allocate(&mut self, size: u32, id: u32) -> Result<u32> {
        self.collector.allocate(&mut self.store, size, id)
    }

    pub fn pin(&mut self, ptr: u32) -> Result<u32> {
        self.collector.pin(&mut self.store, ptr)
    }

    pub fn unpin(&mut self, ptr: u32) -> Result<()> {
        self.collector.unpin(&mut self.store, ptr)
    }

    pub fn collect(&mut self) -> Result<()> {
        self.collector.collect(&mut self.store)
    }

    // --- Strings ---

    /// Allocate a string; `None` is the null handle `0`.
    pub fn write_string(&mut self, value: Option<&str>) -> Result<u32> {
        let Some(value) = value else {
            return Ok(0);
        };
        let units: Vec<u16> = value.encode_utf16().collect();
        self.write_string_utf16(&units)
    }

    /// Allocate a string from raw code units (which need not be valid UTF-16).
    pub fn write_string_utf16(&mut self, units: &[u16]) -> Result<u32> {
        let payload = string::encode_units(units);
        self.write_object(type_ids::STRING, &payload)
    }

    /// Read a string; the null handle reads as `None`.
    pub fn read_string(&self, ptr: u32) -> Result<Option<String>> {
        if ptr == 0 {
            return Ok(None);
        }
        let object = self.heap()?.object(ptr, type_ids::STRING)?;
        Ok(Some(string::decode(object.payload)))
    }

    /// Code units of a string, exactly as stored.
    pub fn read_string_utf16(&self, ptr: u32) -> Result<Option<Vec<u16>>> {
        if ptr == 0 {
            return Ok(None);
        }
        let object = self.heap()?.object(ptr, type_ids::STRING)?;
        Ok(Some(string::payload_units(object.payload)))
    }

    // --- Buffers ---

    pub fn write_buffer(&mut self, bytes: Option<&[u8]>) -> Result<u32> {
        match bytes {
            Some(bytes) => self.write_object(type_ids::ARRAY_BUFFER, bytes),
            None => Ok(0),
        }
    }

    /// Copy out an `ArrayBuffer`'s bytes.
    pub fn read_buffer(&self, ptr: u32) -> Result<Option<Vec<u8>>> {
        if ptr == 0 {
            return Ok(None);
        }
        let object = self.heap()?.object(ptr, type_ids::ARRAY_BUFFER)?;
        Ok(Some(object.payload.to_vec()))
    }

    fn write_object(&mut self, id: u32, payload: &[u8]) -> Result<u32> {
        self.memory()?;
        let size = byte_size(payload.len() as u64)?;
        let ptr = self.allocate(size, id)?;
        self.heap_mut()?.write_bytes(ptr, payload)?;
        Ok(ptr)
    }

    // --- Arrays ---

    /// Allocate an array of type `id` holding `init`.
    ///
    /// For types other than static arrays this is two allocations: the backing
    /// buffer, then the header pointing at it. The buffer stays pinned across
    /// the second one. Element references written into a managed array are
    /// not pinned here; keep them alive yourself until the array is written.
    pub fn write_array<'v, T: Element>(
        &mut self,
        id: u32,
        init: impl Into<ArrayInit<'v, T>>,
    ) -> Result<u32> {
        let init = init.into();
        let flags = self.array_layout_of(id)?;
        let kind = flags.element_kind()?;
        if !T::KIND.same_layout(kind) {
            return Err(BridgeError::ElementMismatch { id, expected: kind });
        }

        let length = init.len();
        let byte_len = byte_size((length as u64) << kind.align_log2())?;
        let is_static = flags.contains(TypeFlags::STATICARRAY);
        let buffer_id = if is_static { id } else { type_ids::ARRAY_BUFFER };
        let buf = self.collector.allocate(&mut self.store, byte_len, buffer_id)?;

        let result = if is_static {
            buf
        } else {
            let header_size = if flags.contains(TypeFlags::ARRAY) {
                view_layout::ARRAY_SIZE
            } else {
                view_layout::VIEW_SIZE
            };
            let collector = &self.collector;
            let arr = collector.with_pinned(&mut self.store, buf, |store| {
                collector.allocate(store, header_size, id)
            })?;

            let mut heap = self.heap_mut()?;
            heap.write_field(arr, view_layout::BUFFER_OFFSET, buf)?;
            heap.write_field(arr, view_layout::DATASTART_OFFSET, buf)?;
            heap.write_field(arr, view_layout::BYTELENGTH_OFFSET, byte_len)?;
            if flags.contains(TypeFlags::ARRAY) {
                heap.write_field(arr, view_layout::LENGTH_OFFSET, length)?;
            }
            arr
        };

        if let ArrayInit::Values(values) = init {
            let width = kind.width();
            let mut heap = self.heap_mut()?;
            if flags.contains(TypeFlags::VAL_MANAGED) {
                let slots = heap.slice_mut(buf, byte_len as usize)?;
                for (value, slot) in values.iter().zip(slots.chunks_exact_mut(width)) {
                    value.write_le(slot);
                }
            } else {
                let mut bytes = vec![0u8; values.len() * width];
                for (value, out) in values.iter().zip(bytes.chunks_exact_mut(width)) {
                    value.write_le(out);
                }
                heap.write_bytes(buf, &bytes)?;
            }
        }

        Ok(result)
    }

    /// Zero-copy view of the array at `ptr`, typed by its own RTTI entry.
    pub fn array_view(&self, ptr: u32) -> Result<ArrayView<'_>> {
        let heap = self.heap()?;
        let id = heap.header(ptr)?.id;
        let flags = rtti::array_layout_of(heap.bytes(), self.rtti_base()?, id)?;
        let kind = flags.element_kind()?;
        let (start, length) = array::locate(&heap, ptr, flags)?;
        let byte_len = length
            .checked_mul(kind.width())
            .ok_or(BridgeError::OutOfBounds {
                ptr: start as u64,
                len: length as u64 * kind.width() as u64,
            })?;
        Ok(ArrayView::new(kind, heap.slice(start, byte_len)?))
    }

    /// Owned copy of the array at `ptr`.
    pub fn read_array<T: Element>(&self, ptr: u32) -> Result<Vec<T>> {
        let view = self.array_view(ptr)?;
        if !T::KIND.same_layout(view.kind()) {
            let id = self.heap()?.header(ptr)?.id;
            return Err(BridgeError::ElementMismatch {
                id,
                expected: view.kind(),
            });
        }
        view.to_vec()
    }

    /// Owned copy of the array at `ptr`, in whatever element kind it has.
    pub fn read_array_values(&self, ptr: u32) -> Result<ArrayValues> {
        Ok(self.array_view(ptr)?.to_values())
    }

    /// View of a typed array read through its `dataStart`/`byteLength` fields.
    pub fn typed_array_view(&self, ptr: u32, kind: ElementKind) -> Result<ArrayView<'_>> {
        let heap = self.heap()?;
        let bytes = array::typed_view_bytes(&heap, ptr, kind)?;
        Ok(ArrayView::new(kind, bytes))
    }

    pub fn read_typed_array<T: Element>(&self, ptr: u32) -> Result<Vec<T>> {
        self.typed_array_view(ptr, T::KIND)?.to_vec()
    }

    // --- Function references ---

    /// Resolve the function-table index stored at `ptr`.
    pub fn read_function(&mut self, ptr: u32) -> Result<Option<Func>> {
        let table = self
            .table
            .as_ref()
            .ok_or(BridgeError::Unsupported(Capability::Table))?;
        let memory = self
            .memory
            .ok_or(BridgeError::Unsupported(Capability::Memory))?;
        let index = Heap::new(memory.data(&self.store)).u32_at(ptr)?;
        match table.get(&mut self.store, u64::from(index)) {
            Some(Ref::Func(func)) => Ok(func),
            _ => Ok(None),
        }
    }

    // --- Demangled exports ---

    /// Call the function at `path` with the supplied arguments.
    ///
    /// Omitted trailing parameters are passed as zero, and the guest is told
    /// how many were supplied.
    pub fn call(&mut self, path: &str, args: &[Val]) -> Result<Vec<Val>> {
        let func = match self.exports.resolve(path) {
            Some(Entry::Function(f)) => f.clone(),
            Some(_) => return Err(BridgeError::NotCallable { path: path.into() }),
            None => return Err(BridgeError::UnknownExport { path: path.into() }),
        };
        self.invoke(&func, None, args)
    }

    /// Construct an instance of the class at `class_path`.
    pub fn construct(&mut self, class_path: &str, args: &[Val]) -> Result<ClassObject> {
        let class = self.class(class_path)?;
        let ctor = class
            .constructor
            .clone()
            .ok_or_else(|| BridgeError::UnknownMember {
                class: class.path.clone(),
                member: "constructor".into(),
            })?;
        let path = class.path.clone();
        let results = self.invoke(&ctor, Some(0), args)?;
        let this = single(&path, results)?
            .i32()
            .ok_or_else(|| BridgeError::UnexpectedResult { path: path.clone() })?;
        Ok(ClassObject {
            class: path,
            this: this as u32,
        })
    }

    /// Treat an existing handle as an instance of `class_path`.
    pub fn wrap(&self, class_path: &str, handle: u32) -> Result<ClassObject> {
        let class = self.class(class_path)?;
        Ok(ClassObject {
            class: class.path.clone(),
            this: handle,
        })
    }

    /// Call an instance method; the handle is passed as the implicit first argument.
    pub fn call_method(&mut self, obj: &ClassObject, name: &str, args: &[Val]) -> Result<Vec<Val>> {
        let class = self.class(&obj.class)?;
        let method = class
            .methods
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownMember {
                class: class.path.clone(),
                member: name.into(),
            })?;
        self.invoke(&method, Some(obj.this), args)
    }

    pub fn get_property(&mut self, obj: &ClassObject, name: &str) -> Result<Val> {
        let getter = self.accessor(obj, name, true)?;
        let results = self.invoke_raw(&getter, &[Val::I32(obj.this as i32)])?;
        single(name, results)
    }

    pub fn set_property(&mut self, obj: &ClassObject, name: &str, value: Val) -> Result<()> {
        let setter = self.accessor(obj, name, false)?;
        self.invoke_raw(&setter, &[Val::I32(obj.this as i32), value])?;
        Ok(())
    }

    /// Read a namespace-level property (`ns.get:name`).
    pub fn get_static(&mut self, path: &str) -> Result<Val> {
        let getter = self.static_accessor(path, true)?;
        let results = self.invoke_raw(&getter, &[])?;
        single(path, results)
    }

    /// Write a namespace-level property (`ns.set:name`).
    pub fn set_static(&mut self, path: &str, value: Val) -> Result<()> {
        let setter = self.static_accessor(path, false)?;
        self.invoke_raw(&setter, &[value])?;
        Ok(())
    }

    /// A non-function export (global, memory, table).
    pub fn value(&self, path: &str) -> Result<Extern> {
        match self.exports.resolve(path) {
            Some(Entry::Value(v)) => Ok(v.clone()),
            _ => Err(BridgeError::UnknownExport { path: path.into() }),
        }
    }

    /// Current value of an exported global.
    pub fn global_value(&mut self, path: &str) -> Result<Val> {
        match self.value(path)? {
            Extern::Global(g) => Ok(g.get(&mut self.store)),
            _ => Err(BridgeError::UnknownExport { path: path.into() }),
        }
    }

    fn class(&self, path: &str) -> Result<&crate::demangle::Class> {
        self.exports
            .class(path)
            .ok_or_else(|| BridgeError::UnknownExport { path: path.into() })
    }

    fn accessor(&self, obj: &ClassObject, name: &str, getter: bool) -> Result<Func> {
        let class = self.class(&obj.class)?;
        let property = class
            .properties
            .get(name)
            .ok_or_else(|| BridgeError::UnknownMember {
                class: class.path.clone(),
                member: name.into(),
            })?;
        pick_accessor(name, property, getter)
    }

    fn static_accessor(&self, path: &str, getter: bool) -> Result<Func> {
        match self.exports.resolve(path) {
            Some(Entry::Property(p)) => pick_accessor(path, p, getter),
            Some(_) => Err(BridgeError::NotCallable { path: path.into() }),
            None => Err(BridgeError::UnknownExport { path: path.into() }),
        }
    }

    /// Call with the arity signal and zero-padding for omitted arguments.
    fn invoke(&mut self, func: &Func, this: Option<u32>, args: &[Val]) -> Result<Vec<Val>> {
        let ty = func.ty(&self.store);
        let params: Vec<ValType> = ty.params().collect();
        let leading = usize::from(this.is_some());
        if leading + args.len() > params.len() {
            return Err(BridgeError::Arity {
                expected: params.len().saturating_sub(leading),
                supplied: args.len(),
            });
        }

        let mut full = Vec::with_capacity(params.len());
        if let Some(this) = this {
            full.push(Val::I32(this as i32));
        }
        full.extend_from_slice(args);
        for param in &params[full.len()..] {
            full.push(zero_value(param)?);
        }

        self.arity.set(&mut self.store, args.len())?;
        let mut results = vec![Val::I32(0); ty.results().len()];
        func.call(&mut self.store, &full, &mut results)
            .map_err(BridgeError::from_call)?;
        Ok(results)
    }

    /// Call exactly as given; accessors carry no arity signal.
    fn invoke_raw(&mut self, func: &Func, args: &[Val]) -> Result<Vec<Val>> {
        let ty = func.ty(&self.store);
        let mut results = vec![Val::I32(0); ty.results().len()];
        func.call(&mut self.store, args, &mut results)
            .map_err(BridgeError::from_call)?;
        Ok(results)
    }
}

fn pick_accessor(name: &str, property: &crate::demangle::Property, getter: bool) -> Result<Func> {
    let (half, accessor) = if getter {
        (&property.getter, "getter")
    } else {
        (&property.setter, "setter")
    };
    half.clone().ok_or_else(|| BridgeError::MissingAccessor {
        name: name.into(),
        accessor,
    })
}

fn single(path: &str, results: Vec<Val>) -> Result<Val> {
    let mut results = results.into_iter();
    match (results.next(), results.next()) {
        (Some(v), None) => Ok(v),
        _ => Err(BridgeError::UnexpectedResult { path: path.into() }),
    }
}

/// Placeholder for an omitted argument.
fn zero_value(ty: &ValType) -> Result<Val> {
    match ty {
        ValType::I32 => Ok(Val::I32(0)),
        ValType::I64 => Ok(Val::I64(0)),
        ValType::F32 => Ok(Val::F32(0)),
        ValType::F64 => Ok(Val::F64(0)),
        other => Err(BridgeError::UnsupportedParameter {
            ty: other.to_string(),
        }),
    }
}

/// Payload sizes are `u32` in the object header.
fn byte_size(len: u64) -> Result<u32> {
    u32::try_from(len).map_err(|_| BridgeError::OutOfBounds { ptr: 0, len })
}
