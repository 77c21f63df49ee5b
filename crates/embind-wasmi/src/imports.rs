//! The `env` host imports a `-lembind` module expects.
//!
//! Every import retrieves the engine from the store data, wraps the caller
//! as a [`WasmiGuest`], and forwards to the engine's registration surface.
//! Engine errors become traps: a registration failure is fatal to guest
//! initialization, a call-time failure unwinds the offending guest call.

use wasmi::core::{Trap, F64};
use wasmi::{Caller, Linker};

use crate::guest::{into_trap, WasmiGuest};
use crate::EmbindHost;

/// Install every embind/emval import into the linker's `env` module.
pub fn register_imports<T: EmbindHost>(
    linker: &mut Linker<T>,
) -> Result<(), wasmi::errors::LinkerError> {
    linker.func_wrap(
        "env",
        "_embind_register_void",
        |mut caller: Caller<'_, T>, raw_type: i32, name_ptr: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_void(&mut guest, raw_type, name_ptr as u32)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_bool",
        |mut caller: Caller<'_, T>,
         raw_type: i32,
         name_ptr: i32,
         size: i32,
         true_value: i32,
         false_value: i32|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_bool(
                    &mut guest,
                    raw_type,
                    name_ptr as u32,
                    size,
                    true_value,
                    false_value,
                )
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_integer",
        |mut caller: Caller<'_, T>,
         raw_type: i32,
         name_ptr: i32,
         size: i32,
         min_range: i32,
         max_range: i32|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_integer(
                    &mut guest,
                    raw_type,
                    name_ptr as u32,
                    size,
                    min_range,
                    max_range,
                )
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_bigint",
        |mut caller: Caller<'_, T>,
         primitive_type: i32,
         name_ptr: i32,
         size: i32,
         min_range: i64,
         max_range: i64|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_bigint(
                    &mut guest,
                    primitive_type,
                    name_ptr as u32,
                    size,
                    min_range,
                    max_range,
                )
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_float",
        |mut caller: Caller<'_, T>, raw_type: i32, name_ptr: i32, size: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_float(&mut guest, raw_type, name_ptr as u32, size)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_std_string",
        |mut caller: Caller<'_, T>, raw_type: i32, name_ptr: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_std_string(&mut guest, raw_type, name_ptr as u32)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_std_wstring",
        |mut caller: Caller<'_, T>, raw_type: i32, char_size: i32, name_ptr: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_std_wstring(&mut guest, raw_type, char_size, name_ptr as u32)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_emval",
        |mut caller: Caller<'_, T>, raw_type: i32, name_ptr: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_emval(&mut guest, raw_type, name_ptr as u32)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_memory_view",
        |mut caller: Caller<'_, T>, raw_type: i32, data_type_index: i32, name_ptr: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_memory_view(&mut guest, raw_type, data_type_index, name_ptr as u32)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_constant",
        |mut caller: Caller<'_, T>, name_ptr: i32, raw_type: i32, value: F64| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_constant(&mut guest, name_ptr as u32, raw_type, value.into())
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_enum",
        |mut caller: Caller<'_, T>, raw_type: i32, name_ptr: i32, size: i32, is_signed: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_enum(&mut guest, raw_type, name_ptr as u32, size, is_signed)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_enum_value",
        |mut caller: Caller<'_, T>, raw_enum_type: i32, name_ptr: i32, enum_value: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_enum_value(&mut guest, raw_enum_type, name_ptr as u32, enum_value)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_function",
        |mut caller: Caller<'_, T>,
         name_ptr: i32,
         arg_count: i32,
         raw_arg_types_addr: i32,
         signature_ptr: i32,
         raw_invoker: i32,
         fn_ptr: i32,
         is_async: i32|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_function(
                    &mut guest,
                    name_ptr as u32,
                    arg_count,
                    raw_arg_types_addr as u32,
                    signature_ptr as u32,
                    raw_invoker as u32,
                    fn_ptr,
                    is_async,
                )
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_value_array",
        |mut caller: Caller<'_, T>,
         raw_type: i32,
         name_ptr: i32,
         constructor_sig: i32,
         raw_constructor: i32,
         destructor_sig: i32,
         raw_destructor: i32|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_value_array(
                    &mut guest,
                    raw_type,
                    name_ptr as u32,
                    constructor_sig as u32,
                    raw_constructor as u32,
                    destructor_sig as u32,
                    raw_destructor as u32,
                )
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_value_array_element",
        |caller: Caller<'_, T>,
         raw_tuple_type: i32,
         getter_return_type: i32,
         getter_sig: i32,
         getter: i32,
         getter_context: i32,
         setter_arg_type: i32,
         setter_sig: i32,
         setter: i32,
         setter_context: i32|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            engine
                .embind_register_value_array_element(
                    raw_tuple_type,
                    getter_return_type,
                    getter_sig as u32,
                    getter as u32,
                    getter_context,
                    setter_arg_type,
                    setter_sig as u32,
                    setter as u32,
                    setter_context,
                )
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_finalize_value_array",
        |mut caller: Caller<'_, T>, raw_tuple_type: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_finalize_value_array(&mut guest, raw_tuple_type)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_value_object",
        |mut caller: Caller<'_, T>,
         raw_type: i32,
         name_ptr: i32,
         constructor_sig: i32,
         raw_constructor: i32,
         destructor_sig: i32,
         raw_destructor: i32|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_value_object(
                    &mut guest,
                    raw_type,
                    name_ptr as u32,
                    constructor_sig as u32,
                    raw_constructor as u32,
                    destructor_sig as u32,
                    raw_destructor as u32,
                )
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_value_object_field",
        |mut caller: Caller<'_, T>,
         struct_type: i32,
         field_name_ptr: i32,
         getter_return_type: i32,
         getter_sig: i32,
         getter: i32,
         getter_context: i32,
         setter_arg_type: i32,
         setter_sig: i32,
         setter: i32,
         setter_context: i32|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_value_object_field(
                    &mut guest,
                    struct_type,
                    field_name_ptr as u32,
                    getter_return_type,
                    getter_sig as u32,
                    getter as u32,
                    getter_context,
                    setter_arg_type,
                    setter_sig as u32,
                    setter as u32,
                    setter_context,
                )
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_finalize_value_object",
        |mut caller: Caller<'_, T>, struct_type: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_finalize_value_object(&mut guest, struct_type)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_class",
        |mut caller: Caller<'_, T>,
         raw_type: i32,
         raw_pointer_type: i32,
         raw_const_pointer_type: i32,
         base_class_raw_type: i32,
         get_actual_type_sig: i32,
         get_actual_type: i32,
         upcast_sig: i32,
         upcast: i32,
         downcast_sig: i32,
         downcast: i32,
         name_ptr: i32,
         destructor_sig: i32,
         raw_destructor: i32|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_class(
                    &mut guest,
                    raw_type,
                    raw_pointer_type,
                    raw_const_pointer_type,
                    base_class_raw_type,
                    get_actual_type_sig as u32,
                    get_actual_type as u32,
                    upcast_sig as u32,
                    upcast as u32,
                    downcast_sig as u32,
                    downcast as u32,
                    name_ptr as u32,
                    destructor_sig as u32,
                    raw_destructor as u32,
                )
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_class_constructor",
        |mut caller: Caller<'_, T>,
         raw_class_type: i32,
         arg_count: i32,
         raw_arg_types_addr: i32,
         invoker_sig: i32,
         invoker: i32,
         raw_constructor: i32|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_class_constructor(
                    &mut guest,
                    raw_class_type,
                    arg_count,
                    raw_arg_types_addr as u32,
                    invoker_sig as u32,
                    invoker as u32,
                    raw_constructor,
                )
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_class_function",
        |mut caller: Caller<'_, T>,
         raw_class_type: i32,
         method_name_ptr: i32,
         arg_count: i32,
         raw_arg_types_addr: i32,
         invoker_sig: i32,
         raw_invoker: i32,
         context: i32,
         is_pure_virtual: i32,
         is_async: i32|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_class_function(
                    &mut guest,
                    raw_class_type,
                    method_name_ptr as u32,
                    arg_count,
                    raw_arg_types_addr as u32,
                    invoker_sig as u32,
                    raw_invoker as u32,
                    context,
                    is_pure_virtual,
                    is_async,
                )
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_class_class_function",
        |mut caller: Caller<'_, T>,
         raw_class_type: i32,
         method_name_ptr: i32,
         arg_count: i32,
         raw_arg_types_addr: i32,
         invoker_sig: i32,
         raw_invoker: i32,
         fn_ptr: i32,
         is_async: i32|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_class_class_function(
                    &mut guest,
                    raw_class_type,
                    method_name_ptr as u32,
                    arg_count,
                    raw_arg_types_addr as u32,
                    invoker_sig as u32,
                    raw_invoker as u32,
                    fn_ptr,
                    is_async,
                )
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_class_property",
        |mut caller: Caller<'_, T>,
         class_type: i32,
         field_name_ptr: i32,
         getter_return_type: i32,
         getter_sig: i32,
         getter: i32,
         getter_context: i32,
         setter_arg_type: i32,
         setter_sig: i32,
         setter: i32,
         setter_context: i32|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_class_property(
                    &mut guest,
                    class_type,
                    field_name_ptr as u32,
                    getter_return_type,
                    getter_sig as u32,
                    getter as u32,
                    getter_context,
                    setter_arg_type,
                    setter_sig as u32,
                    setter as u32,
                    setter_context,
                )
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_embind_register_smart_ptr",
        |mut caller: Caller<'_, T>,
         raw_type: i32,
         raw_pointee_type: i32,
         name_ptr: i32,
         sharing_policy: i32,
         get_pointee_sig: i32,
         raw_get_pointee: i32,
         constructor_sig: i32,
         raw_constructor: i32,
         share_sig: i32,
         raw_share: i32,
         destructor_sig: i32,
         raw_destructor: i32|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .embind_register_smart_ptr(
                    &mut guest,
                    raw_type,
                    raw_pointee_type,
                    name_ptr as u32,
                    sharing_policy,
                    get_pointee_sig as u32,
                    raw_get_pointee as u32,
                    constructor_sig as u32,
                    raw_constructor as u32,
                    share_sig as u32,
                    raw_share as u32,
                    destructor_sig as u32,
                    raw_destructor as u32,
                )
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_emval_take_value",
        |mut caller: Caller<'_, T>, raw_type: i32, arg_ptr: i32| -> Result<i32, Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .emval_take_value(&mut guest, raw_type, arg_ptr as u32)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_emval_incref",
        |caller: Caller<'_, T>, handle: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            engine.emval_incref(handle).map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_emval_decref",
        |caller: Caller<'_, T>, handle: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            engine.emval_decref(handle).map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_emval_register_symbol",
        |mut caller: Caller<'_, T>, address: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .emval_register_symbol(&mut guest, address as u32)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_emval_get_global",
        |mut caller: Caller<'_, T>, name_ptr: i32| -> Result<i32, Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .emval_get_global(&mut guest, name_ptr as u32)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_emval_as",
        |mut caller: Caller<'_, T>, handle: i32, return_type: i32, destructors_ref: i32| -> Result<F64, Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .emval_as(&mut guest, handle, return_type, destructors_ref as u32)
                .map(F64::from)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_emval_new",
        |mut caller: Caller<'_, T>, handle: i32, arg_count: i32, arg_types_ptr: i32, args_ptr: i32| -> Result<i32, Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .emval_new(&mut guest, handle, arg_count, arg_types_ptr as u32, args_ptr as u32)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_emval_set_property",
        |caller: Caller<'_, T>, handle: i32, key: i32, value: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            engine.emval_set_property(handle, key, value).map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_emval_get_property",
        |caller: Caller<'_, T>, handle: i32, key: i32| -> Result<i32, Trap> {
            let engine = caller.data().embind().engine().clone();
            engine.emval_get_property(handle, key).map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_emval_new_cstring",
        |mut caller: Caller<'_, T>, symbol_addr: i32| -> Result<i32, Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .emval_new_cstring(&mut guest, symbol_addr as u32)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_emval_run_destructors",
        |mut caller: Caller<'_, T>, handle: i32| -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .emval_run_destructors(&mut guest, handle)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_emval_get_method_caller",
        |mut caller: Caller<'_, T>, arg_count: i32, arg_types_ptr: i32| -> Result<i32, Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .emval_get_method_caller(&mut guest, arg_count, arg_types_ptr as u32)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_emval_call_method",
        |mut caller: Caller<'_, T>,
         method_caller: i32,
         handle: i32,
         method_name_ptr: i32,
         destructors_ref: i32,
         args_ptr: i32|
         -> Result<F64, Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .emval_call_method(
                    &mut guest,
                    method_caller,
                    handle,
                    method_name_ptr as u32,
                    destructors_ref as u32,
                    args_ptr as u32,
                )
                .map(F64::from)
                .map_err(into_trap)
        },
    )?;

    linker.func_wrap(
        "env",
        "_emval_call_void_method",
        |mut caller: Caller<'_, T>,
         method_caller: i32,
         handle: i32,
         method_name_ptr: i32,
         args_ptr: i32|
         -> Result<(), Trap> {
            let engine = caller.data().embind().engine().clone();
            let mut guest = WasmiGuest::from_caller(&mut caller);
            engine
                .emval_call_void_method(
                    &mut guest,
                    method_caller,
                    handle,
                    method_name_ptr as u32,
                    args_ptr as u32,
                )
                .map_err(into_trap)
        },
    )?;

    Ok(())
}
