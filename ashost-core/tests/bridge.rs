use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use ashost_core::{
    ArrayInit, ArrayValues, Bridge, BridgeError, Capability, ClampedU8, ElementKind, Loader,
    ModuleSource, Val, instantiate, instantiate_streaming,
};
use wasmtime::{Caller, Extern, MemoryType};

const RUNTIME: &str = include_str!("fixtures/runtime.wat");

const ARRAY_I32: u32 = 3;
const INT8_ARRAY: u32 = 4;
const FLOAT64_ARRAY: u32 = 13;
const STATIC_F64: u32 = 14;
const ARRAY_STRING: u32 = 15;
const FOO: u32 = 16;
const UINT8_CLAMPED: u32 = 17;

fn runtime() -> Bridge {
    instantiate(RUNTIME).expect("instantiate fixture").exports
}

fn counter(bridge: &mut Bridge, name: &str) -> i32 {
    bridge.global_value(name).unwrap().unwrap_i32()
}

fn i32_result(results: Vec<Val>) -> i32 {
    assert_eq!(results.len(), 1);
    results[0].unwrap_i32()
}

// --- strings and buffers ---

#[test]
fn strings_round_trip() {
    let mut bridge = runtime();
    for text in ["", "hello", "héllo wörld", "emoji 🦀 pair"] {
        let ptr = bridge.write_string(Some(text)).unwrap();
        assert_eq!(bridge.read_string(ptr).unwrap().as_deref(), Some(text));
    }
}

#[test]
fn long_strings_round_trip() {
    let mut bridge = runtime();
    let text = "é🦀".repeat(800);
    let ptr = bridge.write_string(Some(&text)).unwrap();
    assert_eq!(bridge.read_string(ptr).unwrap(), Some(text));
}

#[test]
fn null_string_is_handle_zero() {
    let mut bridge = runtime();
    assert_eq!(bridge.write_string(None).unwrap(), 0);
    assert_eq!(bridge.read_string(0).unwrap(), None);
    assert_eq!(bridge.read_buffer(0).unwrap(), None);
}

#[test]
fn lone_surrogates_read_lossily_but_units_are_kept() {
    let mut bridge = runtime();
    let units = [0x61, 0xD800, 0x62];
    let ptr = bridge.write_string_utf16(&units).unwrap();
    assert_eq!(bridge.read_string(ptr).unwrap().as_deref(), Some("a\u{FFFD}b"));
    assert_eq!(bridge.read_string_utf16(ptr).unwrap(), Some(units.to_vec()));
}

#[test]
fn static_strings_from_the_guest() {
    let mut bridge = runtime();
    let ptr = i32_result(bridge.call("greeting", &[]).unwrap()) as u32;
    assert_eq!(bridge.read_string(ptr).unwrap().as_deref(), Some("hello"));
}

#[test]
fn buffers_round_trip() {
    let mut bridge = runtime();
    let ptr = bridge.write_buffer(Some(&[1, 2, 3, 255])).unwrap();
    assert_eq!(bridge.heap().unwrap().header(ptr).unwrap().id, 1);
    assert_eq!(bridge.read_buffer(ptr).unwrap(), Some(vec![1, 2, 3, 255]));
}

#[test]
fn reads_check_the_type_tag() {
    let mut bridge = runtime();
    let buf = bridge.write_buffer(Some(&[0; 4])).unwrap();
    let s = bridge.write_string(Some("ab")).unwrap();
    assert!(matches!(
        bridge.read_string(buf),
        Err(BridgeError::TypeMismatch { expected: 2, found: 1, .. })
    ));
    assert!(matches!(
        bridge.read_buffer(s),
        Err(BridgeError::TypeMismatch { expected: 1, found: 2, .. })
    ));
}

#[test]
fn reads_survive_memory_growth() {
    let mut bridge = runtime();
    let s = bridge.write_string(Some("before growth")).unwrap();
    let pages = bridge.memory().unwrap().size(bridge.store());
    let big = vec![7u8; 200_000];
    let buf = bridge.write_buffer(Some(&big)).unwrap();
    assert!(bridge.memory().unwrap().size(bridge.store()) > pages);
    assert_eq!(bridge.read_string(s).unwrap().as_deref(), Some("before growth"));
    assert_eq!(bridge.read_buffer(buf).unwrap().map(|b| b.len()), Some(200_000));
}

// --- RTTI ---

#[test]
fn rtti_lookups() {
    let bridge = runtime();
    assert_eq!(bridge.declared_type_count().unwrap(), 18);
    assert!(bridge.layout_of(FOO).unwrap().is_empty());
    assert_eq!(
        bridge.array_layout_of(FLOAT64_ARRAY).unwrap().element_kind().unwrap(),
        ElementKind::F64
    );
    assert!(matches!(bridge.layout_of(18), Err(BridgeError::InvalidId { id: 18 })));
    assert!(matches!(
        bridge.array_layout_of(FOO),
        Err(BridgeError::NotAnArray { id: FOO, .. })
    ));
}

// --- arrays ---

#[test]
fn array_write_pins_the_buffer_across_the_header_allocation() {
    let mut bridge = runtime();
    let ptr = bridge.write_array::<i32>(ARRAY_I32, &[1, 2, 3]).unwrap();

    assert_eq!(counter(&mut bridge, "pinCount"), 1);
    assert_eq!(counter(&mut bridge, "unpinCount"), 1);
    assert_eq!(counter(&mut bridge, "depthAtLastNew"), 1);

    let heap = bridge.heap().unwrap();
    assert_eq!(heap.header(ptr).unwrap().id, ARRAY_I32);
    assert_eq!(heap.header(ptr).unwrap().size, 16);
    let buffer = heap.u32_at(ptr).unwrap();
    assert_eq!(heap.u32_at(ptr + 4).unwrap(), buffer);
    assert_eq!(heap.u32_at(ptr + 8).unwrap(), 12);
    assert_eq!(heap.u32_at(ptr + 12).unwrap(), 3);
    assert_eq!(heap.header(buffer).unwrap().id, 1);

    assert_eq!(bridge.read_array::<i32>(ptr).unwrap(), vec![1, 2, 3]);
    assert_eq!(
        bridge.read_array_values(ptr).unwrap(),
        ArrayValues::I32(vec![1, 2, 3])
    );
}

#[test]
fn typed_arrays_round_trip() {
    let mut bridge = runtime();
    let f = bridge.write_array::<f64>(FLOAT64_ARRAY, &[1.5, -2.0]).unwrap();
    assert_eq!(bridge.heap().unwrap().header(f).unwrap().size, 12);
    assert_eq!(bridge.read_array::<f64>(f).unwrap(), vec![1.5, -2.0]);
    assert_eq!(bridge.read_typed_array::<f64>(f).unwrap(), vec![1.5, -2.0]);

    let b = bridge.write_array::<i8>(INT8_ARRAY, &[-1, 2, -128]).unwrap();
    let view = bridge.array_view(b).unwrap();
    assert_eq!(view.kind(), ElementKind::I8);
    assert_eq!(view.len(), 3);
    assert_eq!(view.get::<i8>(2).unwrap(), Some(-128));
    assert_eq!(view.get::<i8>(3).unwrap(), None);
}

#[test]
fn clamped_arrays_saturate() {
    let mut bridge = runtime();
    let values = [
        ClampedU8::from(300.0),
        ClampedU8::from(-5.0),
        ClampedU8::from(1.5),
    ];
    let ptr = bridge.write_array::<ClampedU8>(UINT8_CLAMPED, &values).unwrap();
    assert_eq!(bridge.read_array::<u8>(ptr).unwrap(), vec![255, 0, 2]);
}

#[test]
fn static_arrays_are_a_single_allocation() {
    let mut bridge = runtime();
    let ptr = bridge.write_array::<f64>(STATIC_F64, &[0.5; 4]).unwrap();
    assert_eq!(counter(&mut bridge, "pinCount"), 0);
    let header = bridge.heap().unwrap().header(ptr).unwrap();
    assert_eq!((header.id, header.size), (STATIC_F64, 32));
    assert_eq!(bridge.read_array::<f64>(ptr).unwrap(), vec![0.5; 4]);
}

#[test]
fn capacity_arrays_are_zeroed() {
    let mut bridge = runtime();
    let ptr = bridge
        .write_array::<i32>(ARRAY_I32, ArrayInit::Capacity(4))
        .unwrap();
    assert_eq!(bridge.read_array::<i32>(ptr).unwrap(), vec![0; 4]);
}

#[test]
fn managed_arrays_hold_references() {
    let mut bridge = runtime();
    let a = bridge.write_string(Some("a")).unwrap();
    let b = bridge.write_string(Some("b")).unwrap();
    let ptr = bridge.write_array::<u32>(ARRAY_STRING, &[a, b]).unwrap();

    assert_eq!(counter(&mut bridge, "pinCount"), 1);
    assert_eq!(counter(&mut bridge, "unpinCount"), 1);
    assert_eq!(counter(&mut bridge, "depthAtLastNew"), 1);
    let buffer = bridge.heap().unwrap().u32_at(ptr).unwrap();
    assert_eq!(bridge.heap().unwrap().header(buffer).unwrap().size, 8);

    let strings: Vec<String> = bridge
        .read_array::<u32>(ptr)
        .unwrap()
        .into_iter()
        .map(|s| bridge.read_string(s).unwrap().unwrap_or_default())
        .collect();
    assert_eq!(strings, ["a", "b"]);
}

#[test]
fn buffer_is_unpinned_when_the_header_allocation_traps() {
    let mut bridge = runtime();
    let fail_for = bridge.value("failNewFor").unwrap().into_global().unwrap();
    fail_for
        .set(bridge.store_mut(), Val::I32(ARRAY_I32 as i32))
        .unwrap();

    assert!(bridge.write_array::<i32>(ARRAY_I32, &[1, 2]).is_err());
    assert_eq!(counter(&mut bridge, "pinCount"), 1);
    assert_eq!(counter(&mut bridge, "unpinCount"), 1);

    fail_for.set(bridge.store_mut(), Val::I32(-1)).unwrap();
    let ptr = bridge.write_array::<i32>(ARRAY_I32, &[3]).unwrap();
    assert_eq!(bridge.read_array::<i32>(ptr).unwrap(), vec![3]);
    assert_eq!(counter(&mut bridge, "pinCount"), counter(&mut bridge, "unpinCount"));
}

#[test]
fn handles_at_the_top_of_memory_are_out_of_bounds() {
    let bridge = runtime();
    assert!(matches!(
        bridge.typed_array_view(u32::MAX - 1, ElementKind::U8),
        Err(BridgeError::OutOfBounds { .. })
    ));
    assert!(matches!(
        bridge.array_view(u32::MAX - 1),
        Err(BridgeError::OutOfBounds { .. })
    ));
}

#[test]
fn array_element_types_are_checked() {
    let mut bridge = runtime();
    assert!(matches!(
        bridge.write_array::<f32>(ARRAY_I32, &[1.0]),
        Err(BridgeError::ElementMismatch { id: ARRAY_I32, expected: ElementKind::I32 })
    ));
    assert!(matches!(
        bridge.write_array::<i32>(FOO, &[1]),
        Err(BridgeError::NotAnArray { id: FOO, .. })
    ));
    assert!(matches!(
        bridge.write_array::<i32>(99, &[1]),
        Err(BridgeError::InvalidId { id: 99 })
    ));

    let ptr = bridge.write_array::<i32>(ARRAY_I32, &[1]).unwrap();
    assert!(matches!(
        bridge.read_array::<u64>(ptr),
        Err(BridgeError::ElementMismatch { .. })
    ));
}

// --- collector ---

#[test]
fn collector_exports_are_reachable() {
    let mut bridge = runtime();
    let ptr = bridge.allocate(8, FOO).unwrap();
    assert_eq!(bridge.pin(ptr).unwrap(), ptr);
    bridge.unpin(ptr).unwrap();
    bridge.collect().unwrap();
    assert_eq!(counter(&mut bridge, "collectCount"), 1);
}

// --- function references ---

#[test]
fn function_references_resolve_through_the_table() {
    let mut bridge = runtime();
    let func = bridge.read_function(600).unwrap().expect("table slot 1");
    let double = func.typed::<i32, i32>(bridge.store()).unwrap();
    assert_eq!(double.call(bridge.store_mut(), 21).unwrap(), 42);
    assert!(bridge.read_function(608).unwrap().is_none());
}

// --- demangled exports ---

#[test]
fn namespaced_functions() {
    let mut bridge = runtime();
    let sum = bridge.call("util.math.add", &[Val::I32(2), Val::I32(3)]).unwrap();
    assert_eq!(i32_result(sum), 5);
    assert!(matches!(
        bridge.call("util.math", &[]),
        Err(BridgeError::NotCallable { .. })
    ));
    assert!(matches!(
        bridge.call("util.nope", &[]),
        Err(BridgeError::UnknownExport { .. })
    ));
}

#[test]
fn omitted_arguments_are_signalled_and_zeroed() {
    let mut bridge = runtime();
    let all = bridge.call("optional", &[Val::I32(5), Val::I32(6)]).unwrap();
    assert_eq!(i32_result(all), 211);
    let one = bridge.call("optional", &[Val::I32(5)]).unwrap();
    assert_eq!(i32_result(one), 105);
    let none = bridge.call("optional", &[]).unwrap();
    assert_eq!(i32_result(none), 0);
    assert!(matches!(
        bridge.call("optional", &[Val::I32(1), Val::I32(2), Val::I32(3)]),
        Err(BridgeError::Arity { expected: 2, supplied: 3 })
    ));
}

#[test]
fn classes_construct_and_dispatch() {
    let mut bridge = runtime();
    let foo = bridge.construct("Foo", &[Val::I32(5)]).unwrap();
    assert_eq!(foo.class(), "Foo");
    assert_ne!(foo.handle(), 0);
    assert_eq!(bridge.heap().unwrap().header(foo.handle()).unwrap().id, FOO);

    let bar = bridge.call_method(&foo, "bar", &[Val::I32(1)]).unwrap();
    assert_eq!(i32_result(bar), 6);
    let bar = bridge.call_method(&foo, "bar", &[]).unwrap();
    assert_eq!(i32_result(bar), 5);

    // The guest defaults `x` when no argument was supplied.
    let defaulted = bridge.construct("Foo", &[]).unwrap();
    assert_eq!(bridge.get_property(&defaulted, "x").unwrap().unwrap_i32(), 7);
}

#[test]
fn class_properties_and_statics() {
    let mut bridge = runtime();
    let foo = bridge.construct("Foo", &[Val::I32(1)]).unwrap();
    bridge.set_property(&foo, "x", Val::I32(9)).unwrap();
    assert_eq!(bridge.get_property(&foo, "x").unwrap().unwrap_i32(), 9);

    let same = bridge.wrap("Foo", foo.handle()).unwrap();
    assert_eq!(same, foo);
    assert_eq!(bridge.get_property(&same, "x").unwrap().unwrap_i32(), 9);

    assert!(matches!(
        bridge.get_property(&foo, "y"),
        Err(BridgeError::UnknownMember { .. })
    ));
    assert!(matches!(
        bridge.call_method(&foo, "baz", &[]),
        Err(BridgeError::UnknownMember { .. })
    ));

    // Exported as `Foo.zero` before the class was seen.
    assert_eq!(i32_result(bridge.call("Foo.zero", &[]).unwrap()), 0);
    assert!(matches!(
        bridge.call("Foo", &[]),
        Err(BridgeError::NotCallable { .. })
    ));
}

#[test]
fn namespace_properties_and_values() {
    let mut bridge = runtime();
    assert_eq!(bridge.get_static("config.level").unwrap().unwrap_i32(), 1);
    bridge.set_static("config.level", Val::I32(4)).unwrap();
    assert_eq!(bridge.get_static("config.level").unwrap().unwrap_i32(), 4);

    assert!(matches!(bridge.value("answer").unwrap(), Extern::Global(_)));
    assert_eq!(bridge.global_value("answer").unwrap().unwrap_i32(), 42);
    assert!(matches!(bridge.value("memory").unwrap(), Extern::Memory(_)));
}

// --- imports ---

#[test]
fn abort_surfaces_as_a_bridge_error() {
    let mut bridge = runtime();
    match bridge.call("fail", &[]) {
        Err(BridgeError::Abort {
            message,
            file,
            line,
            column,
        }) => {
            assert_eq!(message, "bad state");
            assert_eq!(file, "main");
            assert_eq!((line, column), (10, 4));
        }
        other => panic!("expected abort, got {other:?}"),
    }
}

#[test]
fn trace_does_not_disturb_the_guest() {
    let mut bridge = runtime();
    assert!(bridge.call("traced", &[]).unwrap().is_empty());
}

#[test]
fn embedder_imports_override_the_defaults() {
    let aborts = Arc::new(AtomicU32::new(0));
    let mut loader = Loader::new().unwrap();
    let seen = aborts.clone();
    loader
        .linker_mut()
        .func_wrap(
            "env",
            "abort",
            move |_caller: Caller<'_, ashost_core::HostState>, _: u32, _: u32, line: u32, _: u32| {
                seen.store(line, Ordering::SeqCst);
            },
        )
        .unwrap();
    let mut bridge = loader.instantiate(RUNTIME).unwrap().exports;

    // The custom abort returns normally, so the guest reaches `unreachable`.
    let err = bridge.call("fail", &[]).unwrap_err();
    assert!(matches!(err, BridgeError::Wasm(_)), "{err}");
    assert_eq!(aborts.load(Ordering::SeqCst), 10);
}

// --- loading ---

#[test]
fn every_source_kind_instantiates() {
    let wasm = wat::parse_str(RUNTIME).unwrap();

    let from_bytes = instantiate(wasm.clone()).unwrap();
    assert!(from_bytes.module.get_export("__new").is_some());

    let from_stream =
        instantiate_streaming(ModuleSource::stream(std::io::Cursor::new(wasm.clone()))).unwrap();
    assert_eq!(from_stream.exports.declared_type_count().unwrap(), 18);

    let path = std::env::temp_dir().join(format!("ashost-runtime-{}.wasm", std::process::id()));
    std::fs::write(&path, &wasm).unwrap();
    let from_file = instantiate_streaming(path.clone());
    std::fs::remove_file(&path).ok();
    let mut bridge = from_file.unwrap().exports;
    assert_eq!(i32_result(bridge.call("util.math.add", &[Val::I32(1), Val::I32(1)]).unwrap()), 2);
}

#[test]
fn text_may_open_with_comments() {
    let source = ";; guest\n(; header ;)\n(module (global (export \"g\") i32 (i32.const 5)))";
    let mut bridge = instantiate(source).unwrap().exports;
    assert_eq!(bridge.global_value("g").unwrap().unwrap_i32(), 5);
}

#[test]
fn garbage_input_is_rejected() {
    assert!(matches!(
        instantiate(&b"\x00\x01\x02"[..]),
        Err(BridgeError::Load(_))
    ));
}

// --- modules without the runtime ---

#[test]
fn missing_capabilities_are_reported() {
    let mut bare = instantiate("(module (func (export \"nop\")))").unwrap().exports;
    assert!(matches!(
        bare.write_string(Some("x")),
        Err(BridgeError::Unsupported(Capability::Memory))
    ));
    assert!(matches!(bare.heap(), Err(BridgeError::Unsupported(Capability::Memory))));

    let mut plain = instantiate("(module (memory (export \"memory\") 1))")
        .unwrap()
        .exports;
    assert!(matches!(
        plain.write_string(Some("x")),
        Err(BridgeError::Unsupported(Capability::Allocator))
    ));
    assert!(matches!(plain.pin(8), Err(BridgeError::Unsupported(Capability::Pin))));
    assert!(matches!(plain.unpin(8), Err(BridgeError::Unsupported(Capability::Unpin))));
    assert!(matches!(plain.collect(), Err(BridgeError::Unsupported(Capability::Collector))));
    assert!(matches!(plain.layout_of(1), Err(BridgeError::Unsupported(Capability::Rtti))));
    assert!(matches!(
        plain.read_function(0),
        Err(BridgeError::Unsupported(Capability::Table))
    ));
    assert_eq!(plain.read_string(0).unwrap(), None);
}

#[test]
fn arity_setter_function_is_used_and_hidden() {
    let wat = r#"
        (module
          (global $n (mut i32) (i32.const -1))
          (func (export "__setArgumentsLength") (param i32)
            (global.set $n (local.get 0)))
          (func (export "seen") (param i32 i32) (result i32)
            (global.get $n)))
    "#;
    let mut bridge = instantiate(wat).unwrap().exports;
    assert_eq!(i32_result(bridge.call("seen", &[Val::I32(1)]).unwrap()), 1);
    assert_eq!(i32_result(bridge.call("seen", &[]).unwrap()), 0);
    assert!(bridge.exports().resolve("__setArgumentsLength").is_none());
}

#[test]
fn imported_memory_backs_the_heap() {
    let mut loader = Loader::new().unwrap();
    let memory = loader
        .define_memory("env", "memory", MemoryType::new(1, None))
        .unwrap();
    let wat = r#"
        (module
          (import "env" "memory" (memory 1))
          (data (i32.const 16) "\02\00\00\00\04\00\00\00\68\00\69\00"))
    "#;
    let bridge = loader.instantiate(wat).unwrap().exports;
    assert_eq!(bridge.memory().unwrap().data_size(bridge.store()), memory.data_size(bridge.store()));
    assert_eq!(bridge.read_string(24).unwrap().as_deref(), Some("hi"));
}

#[test]
fn every_element_kind_round_trips() {
    let mut bridge = runtime();
    macro_rules! round_trip {
        ($($id:expr => $ty:ty: $values:expr),* $(,)?) => {$(
            let values: Vec<$ty> = $values.to_vec();
            let ptr = bridge.write_array::<$ty>($id, &values).unwrap();
            assert_eq!(bridge.read_array::<$ty>(ptr).unwrap(), values, "id {}", $id);
        )*};
    }
    round_trip! {
        4 => i8: [i8::MIN, -1, 0, i8::MAX],
        5 => u8: [0u8, 1, u8::MAX],
        6 => i16: [i16::MIN, 0, i16::MAX],
        7 => u16: [0u16, u16::MAX],
        8 => i32: [i32::MIN, -7, i32::MAX],
        9 => u32: [0u32, u32::MAX],
        10 => i64: [i64::MIN, 0, i64::MAX],
        11 => u64: [0u64, u64::MAX],
        12 => f32: [1.5f32, -0.25, f32::MAX],
        13 => f64: [f64::MIN_POSITIVE, 2.5],
        17 => ClampedU8: [ClampedU8(0), ClampedU8(128), ClampedU8(255)],
    }
}

#[test]
fn layout_bounds_follow_the_declared_count() {
    let bridge = runtime();
    let count = bridge.declared_type_count().unwrap();
    assert!(bridge.layout_of(0).is_ok());
    assert!(bridge.layout_of(count - 1).is_ok());
    assert!(matches!(
        bridge.layout_of(count),
        Err(BridgeError::InvalidId { .. })
    ));
}

#[test]
fn empty_and_null_buffers() {
    let mut bridge = runtime();
    assert_eq!(bridge.write_buffer(None).unwrap(), 0);
    let ptr = bridge.write_buffer(Some(&[])).unwrap();
    assert_ne!(ptr, 0);
    assert_eq!(bridge.read_buffer(ptr).unwrap(), Some(vec![]));
}

#[test]
fn default_abort_message() {
    let mut bridge = runtime();
    let err = bridge.call("fail", &[]).unwrap_err();
    assert_eq!(err.to_string(), "abort: bad state at main:10:4");
}
