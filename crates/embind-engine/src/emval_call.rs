//! Emval reflective dispatch: the method cache and the imports that let the
//! guest construct host values, call their methods, and touch properties.
//!
//! Call sites intern their signature once through `_emval_get_method_caller`
//! (canonicalized as `"<ret>_$<arg1>_<arg2>…$"`) and then dispatch with the
//! cached argument types. Dispatch is polymorphic: a [`Reflect`] value takes
//! precedence, plain objects fall back to field/method lookup by exact name.

use std::cell::RefCell;
use std::rc::Rc;

use embind_types::{EmbindError, EmbindResult, Value};

use crate::emval::EmvalMethod;
use crate::engine::Engine;
use crate::guest::Guest;
use crate::invoker::Destructor;
use crate::wire::{wire_to_abi_f64, RegisteredType};

/// Numeric index lookup for array property access.
fn key_as_index(key: &Value) -> Option<usize> {
    match key {
        Value::I32(v) if *v >= 0 => Some(*v as usize),
        Value::U32(v) => Some(*v as usize),
        Value::F64(v) if *v >= 0.0 && v.fract() == 0.0 => Some(*v as usize),
        _ => None,
    }
}

/// Read a value's property the way the guest sees it.
fn property_get(target: &Value, key: &Value) -> EmbindResult<Value> {
    match target {
        Value::Foreign(foreign) => {
            let Some(name) = key.as_str() else {
                return Err(EmbindError::binding(
                    foreign.0.type_name().to_string(),
                    "property key is not a string",
                ));
            };
            foreign.0.get(name)
        }
        Value::Object(map) => {
            let Some(name) = key.as_str() else {
                return Err(EmbindError::binding(
                    "object",
                    "property key is not a string",
                ));
            };
            Ok(map.borrow().get(name).cloned().unwrap_or(Value::Undefined))
        }
        Value::Array(array) => match key_as_index(key) {
            Some(index) => Ok(array
                .borrow()
                .get(index)
                .cloned()
                .unwrap_or(Value::Undefined)),
            None => Err(EmbindError::binding(
                "array",
                "property key is not an index",
            )),
        },
        other => Err(EmbindError::binding(
            other.kind_name(),
            "value has no properties",
        )),
    }
}

/// Write a value's property the way the guest sees it.
fn property_set(target: &Value, key: &Value, value: Value) -> EmbindResult<()> {
    match target {
        Value::Foreign(foreign) => {
            let Some(name) = key.as_str() else {
                return Err(EmbindError::binding(
                    foreign.0.type_name().to_string(),
                    "property key is not a string",
                ));
            };
            foreign.0.set(name, value)
        }
        Value::Object(map) => {
            let Some(name) = key.as_str() else {
                return Err(EmbindError::binding(
                    "object",
                    "property key is not a string",
                ));
            };
            map.borrow_mut().insert(name.to_string(), value);
            Ok(())
        }
        Value::Array(array) => match key_as_index(key) {
            Some(index) => {
                let mut array = array.borrow_mut();
                if index >= array.len() {
                    array.resize(index + 1, Value::Undefined);
                }
                array[index] = value;
                Ok(())
            }
            None => Err(EmbindError::binding(
                "array",
                "property key is not an index",
            )),
        },
        other => Err(EmbindError::binding(
            other.kind_name(),
            "value has no properties",
        )),
    }
}

/// Invoke a method on a host value by exact name.
fn dispatch_call(target: &Value, method: &str, args: &[Value]) -> EmbindResult<Value> {
    match target {
        Value::Foreign(foreign) => foreign.0.call(method, args),
        Value::Object(map) => {
            let member = map.borrow().get(method).cloned();
            match member {
                Some(Value::Function(func)) => func.call(args),
                Some(other) => Err(EmbindError::binding(
                    method,
                    format!("member is not callable ({})", other.kind_name()),
                )),
                None => Err(EmbindError::binding(method, "no such method")),
            }
        }
        other => Err(EmbindError::binding(
            method,
            format!("cannot call methods on {}", other.kind_name()),
        )),
    }
}

impl Engine {
    /// `_emval_get_method_caller`: intern a call-site signature and return
    /// its caller id (stable per canonical signature).
    pub fn emval_get_method_caller(
        &self,
        guest: &mut dyn Guest,
        arg_count: i32,
        arg_types_ptr: u32,
    ) -> EmbindResult<i32> {
        let type_ids = guest.read_i32_vec(arg_types_ptr, arg_count as u32)?;
        let mut arg_types = Vec::with_capacity(type_ids.len());
        for (i, type_id) in type_ids.iter().enumerate() {
            arg_types.push(self.require_registered_type(
                guest,
                *type_id,
                &format!("argument {i}"),
            )?);
        }

        let names: Vec<&str> = arg_types.iter().map(|t| t.name.as_str()).collect();
        let signature = format!("{}_${}$", names[0], names[1..].join("_"));

        let mut state = self.state_mut();
        if let Some(&id) = state.emval.method_ids.get(&signature) {
            return Ok(id);
        }
        let id = state.emval.method_count;
        state.emval.method_count += 1;
        state.emval.method_ids.insert(signature, id);
        state.emval.methods.insert(id, EmvalMethod { arg_types });
        Ok(id)
    }

    fn cached_method(&self, caller: i32) -> EmbindResult<Vec<Rc<RegisteredType>>> {
        let state = self.state();
        state
            .emval
            .methods
            .get(&caller)
            .map(|m| m.arg_types.clone())
            .ok_or_else(|| {
                EmbindError::binding("emval", format!("could not call method with ID {caller}"))
            })
    }

    /// Decode the argument pack at `args_ptr` using the cached types.
    fn read_method_args(
        &self,
        guest: &mut dyn Guest,
        arg_types: &[Rc<RegisteredType>],
        args_ptr: u32,
    ) -> EmbindResult<Vec<Value>> {
        let mut args = Vec::with_capacity(arg_types.len().saturating_sub(1));
        let mut offset = 0;
        for ty in &arg_types[1..] {
            args.push(self.read_value_from_pointer(guest, ty, args_ptr + offset)?);
            offset += ty.arg_pack_advance;
        }
        Ok(args)
    }

    /// Encode a dispatch result for the f64-returning emval imports, parking
    /// destructors behind a handle written to `destructors_ref` (when it is
    /// non-zero).
    fn return_method_value(
        &self,
        guest: &mut dyn Guest,
        ret: &Rc<RegisteredType>,
        destructors_ref: u32,
        result: &Value,
    ) -> EmbindResult<f64> {
        if ret.is_void() {
            if destructors_ref != 0 {
                let handle = self
                    .state_mut()
                    .emval
                    .to_handle_destructors(Rc::new(RefCell::new(Vec::new())));
                guest.write_u32(destructors_ref, handle as u32)?;
            }
            return Ok(0.0);
        }

        let mut destructors: Vec<Destructor> = Vec::new();
        let word = self.to_wire(guest, ret, Some(&mut destructors), result)?;
        if destructors_ref != 0 {
            let handle = self
                .state_mut()
                .emval
                .to_handle_destructors(Rc::new(RefCell::new(destructors)));
            guest.write_u32(destructors_ref, handle as u32)?;
        }
        Ok(wire_to_abi_f64(ret, word))
    }

    /// `_emval_call_method`.
    pub fn emval_call_method(
        &self,
        guest: &mut dyn Guest,
        caller: i32,
        handle: i32,
        method_name_ptr: u32,
        destructors_ref: u32,
        args_ptr: u32,
    ) -> EmbindResult<f64> {
        let arg_types = self.cached_method(caller)?;
        let target = self.state().emval.to_value(handle)?;
        let method = self.string_or_symbol(guest, method_name_ptr)?;
        let args = self.read_method_args(guest, &arg_types, args_ptr)?;
        let result = dispatch_call(&target, &method, &args)?;
        self.return_method_value(guest, &arg_types[0], destructors_ref, &result)
    }

    /// `_emval_call_void_method`.
    pub fn emval_call_void_method(
        &self,
        guest: &mut dyn Guest,
        caller: i32,
        handle: i32,
        method_name_ptr: u32,
        args_ptr: u32,
    ) -> EmbindResult<()> {
        let arg_types = self.cached_method(caller)?;
        let target = self.state().emval.to_value(handle)?;
        let method = self.string_or_symbol(guest, method_name_ptr)?;
        let args = self.read_method_args(guest, &arg_types, args_ptr)?;
        dispatch_call(&target, &method, &args)?;
        Ok(())
    }

    /// `_emval_new`: construct a new host value from the one behind
    /// `handle`, decoding `arg_count` constructor arguments.
    pub fn emval_new(
        &self,
        guest: &mut dyn Guest,
        handle: i32,
        arg_count: i32,
        arg_types_ptr: u32,
        args_ptr: u32,
    ) -> EmbindResult<i32> {
        let target = self.state().emval.to_value(handle)?;

        let type_ids = guest.read_i32_vec(arg_types_ptr, arg_count as u32)?;
        let mut arg_types = Vec::with_capacity(type_ids.len());
        for (i, type_id) in type_ids.iter().enumerate() {
            arg_types.push(self.require_registered_type(
                guest,
                *type_id,
                &format!("argument {i}"),
            )?);
        }

        let mut args = Vec::with_capacity(arg_types.len());
        let mut offset = 0;
        for ty in &arg_types {
            args.push(self.read_value_from_pointer(guest, ty, args_ptr + offset)?);
            offset += ty.arg_pack_advance;
        }
        let type_names: Vec<&str> = arg_types.iter().map(|t| t.name.as_str()).collect();

        let result = match &target {
            Value::Foreign(foreign) => foreign.0.construct(&type_names, &args)?,
            Value::Function(func) => func.call(&args)?,
            Value::Object(_) if args.is_empty() => Value::empty_object(),
            other => {
                return Err(EmbindError::binding(
                    other.kind_name(),
                    "value cannot be constructed from the guest",
                ));
            }
        };
        Ok(self.state_mut().emval.to_handle(result))
    }

    /// `_emval_get_property`.
    pub fn emval_get_property(&self, handle: i32, key: i32) -> EmbindResult<i32> {
        let (target, key) = {
            let state = self.state();
            (state.emval.to_value(handle)?, state.emval.to_value(key)?)
        };
        let value = property_get(&target, &key)?;
        Ok(self.state_mut().emval.to_handle(value))
    }

    /// `_emval_set_property`.
    pub fn emval_set_property(&self, handle: i32, key: i32, value: i32) -> EmbindResult<()> {
        let (target, key, value) = {
            let state = self.state();
            (
                state.emval.to_value(handle)?,
                state.emval.to_value(key)?,
                state.emval.to_value(value)?,
            )
        };
        property_set(&target, &key, value)
    }
}
