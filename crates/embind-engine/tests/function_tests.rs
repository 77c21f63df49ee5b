//! Free-function marshalling tests: primitives, overload dispatch, enums,
//! strings, memory views, tuples, value objects, and destructor discipline.

use std::cell::RefCell;
use std::rc::Rc;

use embind_engine::testing::MockGuest;
use embind_engine::{Engine, Value};
use embind_types::wire;

// ─────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────

fn register_int(engine: &Engine, guest: &mut MockGuest, raw: i32, name: &str) {
    let name_ptr = guest.mem.cstr(name);
    engine
        .embind_register_integer(guest, raw, name_ptr, 4, i32::MIN, i32::MAX)
        .unwrap();
}

fn register_function(
    engine: &Engine,
    guest: &mut MockGuest,
    name: &str,
    arg_type_ids: &[i32],
    invoker: u32,
) {
    let name_ptr = guest.mem.cstr(name);
    let types_ptr = guest.mem.i32_vec(arg_type_ids);
    engine
        .embind_register_function(
            guest,
            name_ptr,
            arg_type_ids.len() as i32,
            types_ptr,
            0,
            invoker,
            7,
            0,
        )
        .unwrap();
}

fn log_index(guest: &MockGuest, entry: &str) -> usize {
    guest
        .log()
        .iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("'{entry}' not in log: {:?}", guest.log()))
}

// ─────────────────────────────────────────────────────────────────────
// Booleans
// ─────────────────────────────────────────────────────────────────────

#[test]
fn bool_encodes_sentinels_and_decodes_any_nonzero_as_true() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    let name_ptr = guest.mem.cstr("bool");
    engine
        .embind_register_bool(&mut guest, 4, name_ptr, 1, 1, 0)
        .unwrap();

    // `check(bool) -> bool` echoes an ambiguous 42 back for true.
    let seen = Rc::new(RefCell::new(0u64));
    let seen_in = Rc::clone(&seen);
    guest.add_table_fn(22, move |_, args| {
        *seen_in.borrow_mut() = args[1];
        Ok(Some(if args[1] != 0 { 42 } else { 0 }))
    });
    register_function(&engine, &mut guest, "check", &[4, 4], 22);

    let result = engine
        .call_function(&mut guest, "check", &[Value::Bool(true)])
        .unwrap();
    assert_eq!(*seen.borrow(), 1, "true must encode the registered sentinel");
    assert_eq!(result, Value::Bool(true), "wire 42 decodes as true");

    let result = engine
        .call_function(&mut guest, "check", &[Value::Bool(false)])
        .unwrap();
    assert_eq!(result, Value::Bool(false));

    // Non-bool arguments are a kind mismatch, not a coercion.
    assert!(engine
        .call_function(&mut guest, "check", &[Value::I32(1)])
        .is_err());
}

// ─────────────────────────────────────────────────────────────────────
// Overload dispatch
// ─────────────────────────────────────────────────────────────────────

#[test]
fn overloads_dispatch_strictly_by_argument_count() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_int(&engine, &mut guest, 2, "int");

    guest.add_table_fn(20, |_, args| {
        Ok(Some(wire::encode_i32(
            wire::decode_i32(args[1]) + wire::decode_i32(args[2]),
        )))
    });
    guest.add_table_fn(21, |_, args| {
        Ok(Some(wire::encode_i32(
            wire::decode_i32(args[1]) + wire::decode_i32(args[2]) + wire::decode_i32(args[3]),
        )))
    });
    register_function(&engine, &mut guest, "add", &[2, 2, 2], 20);
    register_function(&engine, &mut guest, "add", &[2, 2, 2, 2], 21);

    assert_eq!(
        engine
            .call_function(&mut guest, "add", &[Value::I32(1), Value::I32(2)])
            .unwrap(),
        Value::I32(3)
    );
    assert_eq!(
        engine
            .call_function(
                &mut guest,
                "add",
                &[Value::I32(1), Value::I32(2), Value::I32(3)]
            )
            .unwrap(),
        Value::I32(6)
    );

    let err = engine
        .call_function(&mut guest, "add", &[Value::I32(1)])
        .unwrap_err();
    assert!(
        err.to_string().contains("expects one of (2, 3)"),
        "unexpected message: {err}"
    );
}

#[test]
fn duplicate_name_and_arity_fails() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_int(&engine, &mut guest, 2, "int");
    guest.add_table_fn(20, |_, args| Ok(Some(args[1])));
    register_function(&engine, &mut guest, "dup", &[2, 2], 20);

    let name_ptr = guest.mem.cstr("dup");
    let types_ptr = guest.mem.i32_vec(&[2, 2]);
    let err = engine
        .embind_register_function(&mut guest, name_ptr, 2, types_ptr, 0, 20, 7, 0)
        .unwrap_err();
    assert!(err.to_string().contains("cannot register public name twice"));
}

#[test]
fn async_bindings_are_rejected() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_int(&engine, &mut guest, 2, "int");
    let name_ptr = guest.mem.cstr("later");
    let types_ptr = guest.mem.i32_vec(&[2]);
    let err = engine
        .embind_register_function(&mut guest, name_ptr, 1, types_ptr, 0, 20, 7, 1)
        .unwrap_err();
    assert!(err.to_string().contains("JSPI"));
}

// ─────────────────────────────────────────────────────────────────────
// Numeric round trips
// ─────────────────────────────────────────────────────────────────────

#[test]
fn doubles_round_trip_bit_exactly() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    let name_ptr = guest.mem.cstr("double");
    engine
        .embind_register_float(&mut guest, 10, name_ptr, 8)
        .unwrap();
    guest.add_table_fn(20, |_, args| Ok(Some(args[1])));
    register_function(&engine, &mut guest, "echo", &[10, 10], 20);

    for v in [0.0f64, -0.0, 1.5, f64::INFINITY, f64::MIN_POSITIVE] {
        let result = engine
            .call_function(&mut guest, "echo", &[Value::F64(v)])
            .unwrap();
        match result {
            Value::F64(out) => assert_eq!(out.to_bits(), v.to_bits()),
            other => panic!("expected F64, got {other:?}"),
        }
    }
}

#[test]
fn big_integers_round_trip() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    let name_ptr = guest.mem.cstr("int64_t");
    engine
        .embind_register_bigint(&mut guest, 12, name_ptr, 8, i64::MIN, i64::MAX)
        .unwrap();
    let name_ptr = guest.mem.cstr("uint64_t");
    engine
        .embind_register_bigint(&mut guest, 13, name_ptr, 8, 0, -1)
        .unwrap();

    guest.add_table_fn(20, |_, args| Ok(Some(args[1])));
    register_function(&engine, &mut guest, "echo_i64", &[12, 12], 20);
    guest.add_table_fn(21, |_, args| Ok(Some(args[1])));
    register_function(&engine, &mut guest, "echo_u64", &[13, 13], 21);

    assert_eq!(
        engine
            .call_function(&mut guest, "echo_i64", &[Value::I64(i64::MIN)])
            .unwrap(),
        Value::I64(i64::MIN)
    );
    assert_eq!(
        engine
            .call_function(&mut guest, "echo_u64", &[Value::U64(u64::MAX)])
            .unwrap(),
        Value::U64(u64::MAX)
    );
    // Signedness must match exactly.
    assert!(engine
        .call_function(&mut guest, "echo_u64", &[Value::I64(1)])
        .is_err());
}

// ─────────────────────────────────────────────────────────────────────
// Enums
// ─────────────────────────────────────────────────────────────────────

fn register_color(engine: &Engine, guest: &mut MockGuest) {
    let name_ptr = guest.mem.cstr("Color");
    engine
        .embind_register_enum(guest, 5, name_ptr, 4, 1)
        .unwrap();
    for (name, value) in [("RED", 0), ("GREEN", 1), ("BLUE", 2)] {
        let name_ptr = guest.mem.cstr(name);
        engine
            .embind_register_enum_value(guest, 5, name_ptr, value)
            .unwrap();
    }
}

#[test]
fn enums_map_between_members_and_wire_values() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_color(&engine, &mut guest);

    let seen = Rc::new(RefCell::new(0u64));
    let seen_in = Rc::clone(&seen);
    guest.add_table_fn(23, move |_, args| {
        *seen_in.borrow_mut() = args[1];
        Ok(Some(args[1] + 1))
    });
    register_function(&engine, &mut guest, "next", &[5, 5], 23);

    let members = engine.enum_members("Color").unwrap();
    let green = members.iter().find(|m| &*m.name == "GREEN").unwrap().clone();

    let result = engine
        .call_function(&mut guest, "next", &[Value::Enum(green)])
        .unwrap();
    assert_eq!(*seen.borrow(), 1, "GREEN encodes as wire 1");
    let blue = result.as_enum().expect("expected an enum result");
    assert_eq!(&*blue.name, "BLUE");
    assert_eq!(blue.value, 2);

    // Members can also be passed by name.
    let result = engine
        .call_function(&mut guest, "next", &[Value::from("RED")])
        .unwrap();
    assert_eq!(&*result.as_enum().unwrap().name, "GREEN");
}

#[test]
fn unknown_enum_wire_values_fail() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_color(&engine, &mut guest);
    guest.add_table_fn(24, |_, _| Ok(Some(99)));
    register_function(&engine, &mut guest, "bad", &[5], 24);

    let err = engine.call_function(&mut guest, "bad", &[]).unwrap_err();
    assert!(
        err.to_string().contains("unknown enum value 99"),
        "unexpected message: {err}"
    );
}

#[test]
fn duplicate_enum_member_registration_fails() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_color(&engine, &mut guest);
    let name_ptr = guest.mem.cstr("RED");
    assert!(engine
        .embind_register_enum_value(&mut guest, 5, name_ptr, 3)
        .is_err());
}

#[test]
fn host_declared_enum_members_are_validated() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    engine
        .register_enum("Color", &[("RED", 0), ("GREEN", 1)])
        .unwrap();
    register_color(&engine, &mut guest); // agrees → fine

    engine.register_enum("Mood", &[("UP", 1)]).unwrap();
    let name_ptr = guest.mem.cstr("Mood");
    engine
        .embind_register_enum(&mut guest, 6, name_ptr, 4, 1)
        .unwrap();
    let name_ptr = guest.mem.cstr("UP");
    assert!(engine
        .embind_register_enum_value(&mut guest, 6, name_ptr, 2)
        .is_err());
}

// ─────────────────────────────────────────────────────────────────────
// Strings
// ─────────────────────────────────────────────────────────────────────

#[test]
fn narrow_strings_marshal_and_release_their_blocks() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    let name_ptr = guest.mem.cstr("std::string");
    engine
        .embind_register_std_string(&mut guest, 6, name_ptr)
        .unwrap();

    // `shout(string) -> string` checks its input and returns "ok!".
    guest.add_table_fn(25, |mem, args| {
        let base = wire::decode_u32(args[1]);
        let len = mem.read_u32_at(base) as usize;
        let text =
            String::from_utf8_lossy(&mem.bytes[base as usize + 4..base as usize + 4 + len])
                .into_owned();
        assert_eq!(text, "hi");

        let out = mem.alloc(4 + 3);
        mem.write_u32_at(out, 3);
        mem.bytes[out as usize + 4..out as usize + 7].copy_from_slice(b"ok!");
        Ok(Some(wire::encode_u32(out)))
    });
    register_function(&engine, &mut guest, "shout", &[6, 6], 25);

    guest.clear_log();
    let result = engine
        .call_function(&mut guest, "shout", &[Value::from("hi")])
        .unwrap();
    assert_eq!(result, Value::from("ok!"));

    // The argument block is malloc'd before the call and freed after it;
    // the returned block is freed during decoding.
    let malloc_at = log_index(&guest, "export:malloc");
    let invoke_at = log_index(&guest, "table:25");
    assert!(malloc_at < invoke_at);
    let frees = guest.log().iter().filter(|e| *e == "export:free").count();
    assert_eq!(frees, 2, "argument and return blocks both freed");
    assert!(guest.log().iter().rposition(|e| e == "export:free").unwrap() > invoke_at);
}

#[test]
fn wide_strings_decode_utf16() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    let name_ptr = guest.mem.cstr("std::wstring");
    engine
        .embind_register_std_wstring(&mut guest, 15, 2, name_ptr)
        .unwrap();

    guest.add_table_fn(26, |mem, args| {
        let base = wire::decode_u32(args[1]);
        assert_eq!(mem.read_u32_at(base), 2, "two code units sent");

        let out = mem.alloc(4 + 3 * 2);
        mem.write_u32_at(out, 2);
        mem.bytes[out as usize + 4] = b'o';
        mem.bytes[out as usize + 6] = b'k';
        Ok(Some(wire::encode_u32(out)))
    });
    register_function(&engine, &mut guest, "wide", &[15, 15], 26);

    let result = engine
        .call_function(&mut guest, "wide", &[Value::from("hi")])
        .unwrap();
    assert_eq!(result, Value::from("ok"));
}

#[test]
fn failed_encoding_still_releases_scheduled_destructors() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_int(&engine, &mut guest, 2, "int");
    let name_ptr = guest.mem.cstr("std::string");
    engine
        .embind_register_std_string(&mut guest, 6, name_ptr)
        .unwrap();

    guest.add_table_fn(27, |_, _| Ok(Some(0)));
    register_function(&engine, &mut guest, "pair", &[2, 6, 2], 27);

    guest.clear_log();
    let err = engine
        .call_function(
            &mut guest,
            "pair",
            &[Value::from("x"), Value::from("not an int")],
        )
        .unwrap_err();
    assert!(err.is_binding());
    // The first argument's block was already allocated; it must be freed
    // even though the call never reached the guest.
    assert!(guest.log().iter().any(|e| e == "export:malloc"));
    assert!(guest.log().iter().any(|e| e == "export:free"));
    assert!(!guest.log().iter().any(|e| e == "table:27"));
}

// ─────────────────────────────────────────────────────────────────────
// Memory views
// ─────────────────────────────────────────────────────────────────────

#[test]
fn memory_views_window_guest_memory_without_copying() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    let name_ptr = guest.mem.cstr("memory_view<int>");
    engine
        .embind_register_memory_view(&mut guest, 14, 4, name_ptr)
        .unwrap();

    let data = guest.mem.alloc(12);
    for (i, v) in [1u32, 2, 3].iter().enumerate() {
        guest.mem.write_u32_at(data + i as u32 * 4, *v);
    }
    let header = guest.mem.alloc(8);
    guest.mem.write_u32_at(header, 3);
    guest.mem.write_u32_at(header + 4, data);

    guest.add_table_fn(28, move |_, _| Ok(Some(wire::encode_u32(header))));
    register_function(&engine, &mut guest, "view", &[14], 28);

    let result = engine.call_function(&mut guest, "view", &[]).unwrap();
    let Value::View(view) = result else {
        panic!("expected a memory view, got {result:?}");
    };
    assert_eq!(view.len, 3);
    assert_eq!(
        engine.read_memory_view(&mut guest, &view).unwrap(),
        vec![Value::I32(1), Value::I32(2), Value::I32(3)]
    );

    // The view follows guest writes: nothing was copied.
    guest.mem.write_u32_at(data + 4, 99);
    assert_eq!(
        engine.read_memory_view(&mut guest, &view).unwrap()[1],
        Value::I32(99)
    );
}

// ─────────────────────────────────────────────────────────────────────
// Tuples and value objects
// ─────────────────────────────────────────────────────────────────────

/// Pair = (int32, float32): constructor 10, setters 11/12, getters 13/14,
/// destructor 15. The guest-side temporary is 8 bytes: i32 then f32.
fn register_pair(engine: &Engine, guest: &mut MockGuest) {
    register_int(engine, guest, 2, "int");
    let name_ptr = guest.mem.cstr("float");
    engine
        .embind_register_float(guest, 16, name_ptr, 4)
        .unwrap();

    guest.add_table_fn(10, |mem, _| Ok(Some(wire::encode_u32(mem.alloc(8)))));
    guest.add_table_fn(11, |mem, args| {
        mem.write_u32_at(wire::decode_u32(args[1]), wire::decode_u32(args[2]));
        Ok(None)
    });
    guest.add_table_fn(12, |mem, args| {
        mem.write_u32_at(wire::decode_u32(args[1]) + 4, wire::decode_u32(args[2]));
        Ok(None)
    });
    guest.add_table_fn(13, |mem, args| {
        Ok(Some(u64::from(mem.read_u32_at(wire::decode_u32(args[1])))))
    });
    guest.add_table_fn(14, |mem, args| {
        Ok(Some(u64::from(
            mem.read_u32_at(wire::decode_u32(args[1]) + 4),
        )))
    });
    guest.add_table_fn(15, |_, _| Ok(None));

    let name_ptr = guest.mem.cstr("Pair");
    engine
        .embind_register_value_array(guest, 30, name_ptr, 0, 10, 0, 15)
        .unwrap();
    engine
        .embind_register_value_array_element(30, 2, 0, 13, 0, 2, 0, 11, 0)
        .unwrap();
    engine
        .embind_register_value_array_element(30, 16, 0, 14, 0, 16, 0, 12, 0)
        .unwrap();
    engine.embind_finalize_value_array(guest, 30).unwrap();
}

#[test]
fn tuples_construct_write_call_and_destroy_in_order() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_pair(&engine, &mut guest);

    // `first(Pair) -> int` reads the first element out of the temporary.
    guest.add_table_fn(17, |mem, args| {
        Ok(Some(u64::from(mem.read_u32_at(wire::decode_u32(args[1])))))
    });
    register_function(&engine, &mut guest, "first", &[2, 30], 17);

    guest.clear_log();
    let result = engine
        .call_function(
            &mut guest,
            "first",
            &[Value::array(vec![Value::I32(7), Value::F32(1.5)])],
        )
        .unwrap();
    assert_eq!(result, Value::I32(7));

    let order: Vec<usize> = ["table:10", "table:11", "table:12", "table:17", "table:15"]
        .iter()
        .map(|entry| log_index(&guest, entry))
        .collect();
    let mut sorted = order.clone();
    sorted.sort_unstable();
    assert_eq!(order, sorted, "ctor, writers, invoker, dtor — in order");
}

#[test]
fn tuples_decode_through_getters_and_destroy_the_temporary() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_pair(&engine, &mut guest);

    // `make() -> Pair` builds the temporary itself.
    guest.add_table_fn(18, |mem, _| {
        let ptr = mem.alloc(8);
        mem.write_u32_at(ptr, 7);
        mem.write_u32_at(ptr + 4, 1.5f32.to_bits());
        Ok(Some(wire::encode_u32(ptr)))
    });
    register_function(&engine, &mut guest, "make", &[30], 18);

    guest.clear_log();
    let result = engine.call_function(&mut guest, "make", &[]).unwrap();
    assert_eq!(
        result,
        Value::array(vec![Value::I32(7), Value::F32(1.5)])
    );
    assert!(log_index(&guest, "table:13") < log_index(&guest, "table:15"));
    assert!(log_index(&guest, "table:14") < log_index(&guest, "table:15"));
}

#[test]
fn tuple_arity_must_match() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_pair(&engine, &mut guest);
    guest.add_table_fn(17, |_, _| Ok(Some(0)));
    register_function(&engine, &mut guest, "first", &[2, 30], 17);

    let err = engine
        .call_function(&mut guest, "first", &[Value::array(vec![Value::I32(1)])])
        .unwrap_err();
    assert!(err.to_string().contains("incorrect number of tuple elements"));
}

#[test]
fn value_objects_marshal_by_field_name() {
    let engine = Engine::new();
    let mut guest = MockGuest::new();
    register_int(&engine, &mut guest, 2, "int");

    guest.add_table_fn(50, |mem, _| Ok(Some(wire::encode_u32(mem.alloc(8)))));
    guest.add_table_fn(51, |mem, args| {
        mem.write_u32_at(wire::decode_u32(args[1]), wire::decode_u32(args[2]));
        Ok(None)
    });
    guest.add_table_fn(52, |mem, args| {
        mem.write_u32_at(wire::decode_u32(args[1]) + 4, wire::decode_u32(args[2]));
        Ok(None)
    });
    guest.add_table_fn(53, |mem, args| {
        Ok(Some(u64::from(mem.read_u32_at(wire::decode_u32(args[1])))))
    });
    guest.add_table_fn(54, |mem, args| {
        Ok(Some(u64::from(
            mem.read_u32_at(wire::decode_u32(args[1]) + 4),
        )))
    });
    guest.add_table_fn(55, |_, _| Ok(None));

    let name_ptr = guest.mem.cstr("Point");
    engine
        .embind_register_value_object(&mut guest, 31, name_ptr, 0, 50, 0, 55)
        .unwrap();
    let x_ptr = guest.mem.cstr("x");
    engine
        .embind_register_value_object_field(&mut guest, 31, x_ptr, 2, 0, 53, 0, 2, 0, 51, 0)
        .unwrap();
    let y_ptr = guest.mem.cstr("y");
    engine
        .embind_register_value_object_field(&mut guest, 31, y_ptr, 2, 0, 54, 0, 2, 0, 52, 0)
        .unwrap();
    engine.embind_finalize_value_object(&mut guest, 31).unwrap();

    // `norm1(Point) -> int` sums both fields from the temporary.
    guest.add_table_fn(56, |mem, args| {
        let ptr = wire::decode_u32(args[1]);
        Ok(Some(u64::from(
            mem.read_u32_at(ptr) + mem.read_u32_at(ptr + 4),
        )))
    });
    register_function(&engine, &mut guest, "norm1", &[2, 31], 56);

    let point = Value::object([("x", Value::I32(3)), ("y", Value::I32(4))]);
    assert_eq!(
        engine
            .call_function(&mut guest, "norm1", &[point])
            .unwrap(),
        Value::I32(7)
    );

    // A missing field is an error, not a zero.
    let partial = Value::object([("x", Value::I32(3))]);
    let err = engine
        .call_function(&mut guest, "norm1", &[partial])
        .unwrap_err();
    assert!(err.to_string().contains("missing field 'y'"));
}
