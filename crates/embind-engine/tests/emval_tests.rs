//! Emval tests: handle lifecycle, symbol interning, globals, reflective
//! property access, method callers, construction, and `_emval_as`.

use std::rc::Rc;

use embind_engine::testing::MockGuest;
use embind_engine::{EmbindResult, Engine, Reflect, Value};

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

/// Register the primitive types most tests need: void=1, int=2, emval=3,
/// bool=4.
fn register_basics(engine: &Engine, guest: &mut MockGuest) {
    let name_ptr = guest.mem.cstr("void");
    engine.embind_register_void(guest, 1, name_ptr).unwrap();
    let name_ptr = guest.mem.cstr("int");
    engine
        .embind_register_integer(guest, 2, name_ptr, 4, i32::MIN, i32::MAX)
        .unwrap();
    let name_ptr = guest.mem.cstr("emscripten::val");
    engine.embind_register_emval(guest, 3, name_ptr).unwrap();
    let name_ptr = guest.mem.cstr("bool");
    engine
        .embind_register_bool(guest, 4, name_ptr, 1, 1, 0)
        .unwrap();
}

/// Plant an i32 and take an emval handle to it.
fn take_int(engine: &Engine, guest: &mut MockGuest, value: i32) -> i32 {
    let ptr = guest.mem.alloc(8);
    guest.mem.write_u32_at(ptr, value as u32);
    engine.emval_take_value(guest, 2, ptr).unwrap()
}

// ─────────────────────────────────────────────────────────────────────
// Handle lifecycle
// ─────────────────────────────────────────────────────────────────────

#[test]
fn take_value_incref_decref_lifecycle() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_basics(&engine, &mut guest);

    let handle = take_int(&engine, &mut guest, 42);
    assert!(handle >= 5, "dynamic handles start past the sentinels");
    assert_eq!(engine.emval_value(handle).unwrap(), Value::I32(42));
    assert_eq!(engine.live_emval_handles(), 1);

    engine.emval_incref(handle).unwrap();
    engine.emval_incref(handle).unwrap();
    engine.emval_decref(handle).unwrap();
    engine.emval_decref(handle).unwrap();
    engine.emval_decref(handle).unwrap();
    assert_eq!(engine.live_emval_handles(), 0);

    // The slot is gone; a fourth decref is an error.
    assert!(engine.emval_decref(handle).is_err());
    assert!(engine.emval_value(handle).is_err());
}

#[test]
fn small_primitives_take_reserved_handles() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_basics(&engine, &mut guest);

    let ptr = guest.mem.alloc(1);
    guest.mem.bytes[ptr as usize] = 1;
    let handle = engine.emval_take_value(&mut guest, 4, ptr).unwrap();
    assert_eq!(handle, 3, "true is the reserved handle 3");

    // Sentinels shrug off refcounting and handle 0 is never valid.
    engine.emval_decref(3).unwrap();
    engine.emval_decref(3).unwrap();
    assert_eq!(engine.emval_value(3).unwrap(), Value::Bool(true));
    assert!(engine.emval_value(0).is_err());
}

// ─────────────────────────────────────────────────────────────────────
// Symbols and globals
// ─────────────────────────────────────────────────────────────────────

#[test]
fn registered_symbols_are_interned_by_address() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_basics(&engine, &mut guest);

    let addr = guest.mem.cstr("greeting");
    engine.emval_register_symbol(&mut guest, addr).unwrap();

    // Clobber the memory behind the symbol: the interned string must win.
    for i in 0..8 {
        guest.mem.bytes[(addr + i) as usize] = b'z';
    }
    let handle = engine.emval_new_cstring(&mut guest, addr).unwrap();
    assert_eq!(engine.emval_value(handle).unwrap(), Value::from("greeting"));
}

#[test]
fn get_global_returns_registered_host_values() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_basics(&engine, &mut guest);
    engine.register_symbol("answer", Value::I32(42)).unwrap();

    let name_ptr = guest.mem.cstr("answer");
    let handle = engine.emval_get_global(&mut guest, name_ptr).unwrap();
    assert_eq!(engine.emval_value(handle).unwrap(), Value::I32(42));

    // Unknown globals decode as undefined (the reserved handle).
    let name_ptr = guest.mem.cstr("missing");
    let handle = engine.emval_get_global(&mut guest, name_ptr).unwrap();
    assert_eq!(handle, 1);
}

// ─────────────────────────────────────────────────────────────────────
// Method callers and dispatch
// ─────────────────────────────────────────────────────────────────────

#[test]
fn method_callers_are_interned_by_signature() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_basics(&engine, &mut guest);

    let sig = guest.mem.i32_vec(&[2, 2]);
    let caller_a = engine.emval_get_method_caller(&mut guest, 2, sig).unwrap();
    let sig = guest.mem.i32_vec(&[2, 2]);
    let caller_b = engine.emval_get_method_caller(&mut guest, 2, sig).unwrap();
    assert_eq!(caller_a, caller_b, "same signature, same caller id");

    let sig = guest.mem.i32_vec(&[1]);
    let caller_c = engine.emval_get_method_caller(&mut guest, 1, sig).unwrap();
    assert_ne!(caller_a, caller_c);
}

#[test]
fn call_method_dispatches_into_host_functions() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_basics(&engine, &mut guest);

    engine
        .register_symbol(
            "add1",
            Value::function("add1", |args: &[Value]| {
                Ok(Value::I32(args[0].as_i32().unwrap_or(0) + 1))
            }),
        )
        .unwrap();

    // int add1(int) against the global scope object.
    let sig = guest.mem.i32_vec(&[2, 2]);
    let caller = engine.emval_get_method_caller(&mut guest, 2, sig).unwrap();
    let scope = engine.emval_get_global(&mut guest, 0).unwrap();

    let args_ptr = guest.mem.alloc(8);
    guest.mem.write_u32_at(args_ptr, 5);
    let name_ptr = guest.mem.cstr("add1");
    let destructors_ref = guest.mem.alloc(4);

    let result = engine
        .emval_call_method(&mut guest, caller, scope, name_ptr, destructors_ref, args_ptr)
        .unwrap();
    assert_eq!(result, 6.0);

    // The parked destructor list can be run and released.
    let list_handle = guest.mem.read_u32_at(destructors_ref) as i32;
    assert!(list_handle >= 5);
    engine
        .emval_run_destructors(&mut guest, list_handle)
        .unwrap();
}

#[test]
fn call_void_method_skips_return_marshalling() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_basics(&engine, &mut guest);

    let hits = Rc::new(std::cell::Cell::new(0));
    let hits_in = Rc::clone(&hits);
    engine
        .register_symbol(
            "ping",
            Value::function("ping", move |_: &[Value]| {
                hits_in.set(hits_in.get() + 1);
                Ok(Value::Undefined)
            }),
        )
        .unwrap();

    let sig = guest.mem.i32_vec(&[1]);
    let caller = engine.emval_get_method_caller(&mut guest, 1, sig).unwrap();
    let scope = engine.emval_get_global(&mut guest, 0).unwrap();
    let name_ptr = guest.mem.cstr("ping");
    engine
        .emval_call_void_method(&mut guest, caller, scope, name_ptr, 0)
        .unwrap();
    assert_eq!(hits.get(), 1);
}

#[test]
fn unknown_method_caller_ids_fail() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_basics(&engine, &mut guest);
    let name_ptr = guest.mem.cstr("anything");
    let err = engine
        .emval_call_method(&mut guest, 77, 1, name_ptr, 0, 0)
        .unwrap_err();
    assert!(err.to_string().contains("could not call method with ID 77"));
}

// ─────────────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────────────

#[test]
fn properties_round_trip_through_shared_objects() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_basics(&engine, &mut guest);
    engine.register_symbol("obj", Value::empty_object()).unwrap();

    let name_ptr = guest.mem.cstr("obj");
    let obj = engine.emval_get_global(&mut guest, name_ptr).unwrap();
    let key_ptr = guest.mem.cstr("x");
    let key = engine.emval_new_cstring(&mut guest, key_ptr).unwrap();
    let value = take_int(&engine, &mut guest, 7);

    engine.emval_set_property(obj, key, value).unwrap();
    let got = engine.emval_get_property(obj, key).unwrap();
    assert_eq!(engine.emval_value(got).unwrap(), Value::I32(7));

    // The host sees the same storage through the global scope.
    let name_ptr = guest.mem.cstr("obj");
    let again = engine.emval_get_global(&mut guest, name_ptr).unwrap();
    let key_ptr = guest.mem.cstr("x");
    let key2 = engine.emval_new_cstring(&mut guest, key_ptr).unwrap();
    let got = engine.emval_get_property(again, key2).unwrap();
    assert_eq!(engine.emval_value(got).unwrap(), Value::I32(7));

    // Missing keys read as undefined.
    let missing_ptr = guest.mem.cstr("nope");
    let missing = engine.emval_new_cstring(&mut guest, missing_ptr).unwrap();
    let got = engine.emval_get_property(obj, missing).unwrap();
    assert_eq!(got, 1);
}

// ─────────────────────────────────────────────────────────────────────
// Construction and emval_as
// ─────────────────────────────────────────────────────────────────────

struct PointFactory;

impl Reflect for PointFactory {
    fn type_name(&self) -> &str {
        "Point"
    }

    fn construct(&self, arg_types: &[&str], args: &[Value]) -> EmbindResult<Value> {
        assert_eq!(arg_types, ["int"]);
        Ok(Value::object([("x", args[0].clone())]))
    }
}

#[test]
fn emval_new_uses_the_reflect_capability() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_basics(&engine, &mut guest);
    engine
        .register_symbol("Point", Value::foreign(Rc::new(PointFactory)))
        .unwrap();

    let name_ptr = guest.mem.cstr("Point");
    let factory = engine.emval_get_global(&mut guest, name_ptr).unwrap();

    let types_ptr = guest.mem.i32_vec(&[2]);
    let args_ptr = guest.mem.alloc(8);
    guest.mem.write_u32_at(args_ptr, 3);

    let handle = engine
        .emval_new(&mut guest, factory, 1, types_ptr, args_ptr)
        .unwrap();
    let point = engine.emval_value(handle).unwrap();
    let object = point.as_object().expect("constructed value is an object");
    assert_eq!(object.borrow().get("x"), Some(&Value::I32(3)));
}

#[test]
fn emval_as_converts_through_the_registered_type() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_basics(&engine, &mut guest);

    let handle = take_int(&engine, &mut guest, 9);
    let destructors_ref = guest.mem.alloc(4);
    let result = engine
        .emval_as(&mut guest, handle, 2, destructors_ref)
        .unwrap();
    assert_eq!(result, 9.0);

    // A bool sentinel converts through the bool codec to its sentinel word.
    let destructors_ref = guest.mem.alloc(4);
    let result = engine
        .emval_as(&mut guest, 3, 4, destructors_ref)
        .unwrap();
    assert_eq!(result, 1.0);
}
