//! The invoker factory: host-callable wrappers around indirect guest calls.
//!
//! Given the resolved argument types (`[0]` return, `[1]` the `this` type or
//! `None` for free functions, `[2..]` parameters), a table index for the
//! C++-side invoker thunk, and the target C++ function pointer, the factory
//! produces the closure installed behind a public symbol, constructor slot,
//! or method entry.

use std::rc::Rc;

use embind_types::{wire, EmbindError, EmbindResult, Value};

use crate::engine::Engine;
use crate::guest::{Guest, EXPORT_FREE};
use crate::symbols::SymbolFn;
use crate::wire::RegisteredType;

/// A deallocation scheduled while encoding arguments, run after the guest
/// call returns.
#[derive(Debug, Clone)]
pub(crate) enum Destructor {
    /// Call a guest export (the `free` of a marshalled string).
    Export { name: &'static str, args: Vec<u64> },
    /// Call through the indirect table (a raw C++ destructor).
    Table { index: u32, args: Vec<u64> },
}

/// Run destructors in schedule order. Failures are logged and do not
/// override the call result that scheduled them.
pub(crate) fn run_destructors(guest: &mut dyn Guest, destructors: &[Destructor]) {
    for destructor in destructors {
        let result = match destructor {
            Destructor::Export { name, args } => guest.call_export(name, args).map(|_| ()),
            Destructor::Table { index, args } => guest.call_table(*index, args).map(|_| ()),
        };
        if let Err(err) = result {
            log::warn!("destructor failed: {err}");
        }
    }
}

/// Schedule a guest `free` of `ptr`.
pub(crate) fn free_destructor(ptr: u32) -> Destructor {
    Destructor::Export {
        name: EXPORT_FREE,
        args: vec![wire::encode_u32(ptr)],
    }
}

/// Everything needed to build one invoker.
pub(crate) struct InvokerSpec {
    /// Human-readable name for error messages (`add`, `Widget.resize`, …).
    pub human_name: String,
    /// `[0]` return type, `[1]` `this` type (`None` for free functions),
    /// `[2..]` parameter types.
    pub arg_types: Vec<Option<Rc<RegisteredType>>>,
    /// Table index of the C++ invoker thunk.
    pub invoker: u32,
    /// C++ function pointer, passed as the thunk's first argument.
    pub fn_ptr: i32,
}

/// Build the host-callable wrapper. The wrapper encodes `this` (if any) and
/// every parameter, calls the thunk indirectly, decodes the return value,
/// and releases every destructor scheduled during encoding before returning
/// — on the failure paths too.
pub(crate) fn craft_invoker(spec: InvokerSpec) -> EmbindResult<SymbolFn> {
    if spec.arg_types.len() < 2 {
        return Err(EmbindError::internal(
            "argTypes array size mismatch! Must at least get return value and 'this' types",
        ));
    }

    let is_class_method = spec.arg_types[1].is_some();
    let param_count = spec.arg_types.len() - 2;

    // A dynamic destructor list is only allocated when some argument type can
    // schedule one; otherwise the fast path below settles each argument
    // individually.
    let needs_destructor_stack = spec.arg_types[1..]
        .iter()
        .flatten()
        .any(|ty| ty.has_destructor());

    let returns = spec.arg_types[0]
        .as_ref()
        .map(|ty| !ty.is_void())
        .unwrap_or(false);

    let InvokerSpec {
        human_name,
        arg_types,
        invoker,
        fn_ptr,
    } = spec;

    let invoke = move |engine: &Engine,
                       guest: &mut dyn Guest,
                       this: Option<&Value>,
                       args: &[Value]|
          -> EmbindResult<Value> {
        if args.len() != param_count {
            return Err(EmbindError::binding(
                human_name.clone(),
                format!(
                    "function called with {} arguments, expected {} args",
                    args.len(),
                    param_count
                ),
            ));
        }

        let mut destructors = if needs_destructor_stack {
            Some(Vec::new())
        } else {
            None
        };

        // Encode `this` and the parameters, releasing anything already
        // scheduled if an encode fails partway.
        let encoded = encode_arguments(
            engine,
            guest,
            &human_name,
            &arg_types,
            is_class_method,
            this,
            args,
            destructors.as_mut(),
        );
        let (this_wired, args_wired) = match encoded {
            Ok(words) => words,
            Err(err) => {
                if let Some(list) = &destructors {
                    run_destructors(guest, list);
                }
                return Err(err);
            }
        };

        let mut call_args = Vec::with_capacity(2 + args_wired.len());
        call_args.push(wire::encode_i32(fn_ptr));
        if let Some(this_word) = this_wired {
            call_args.push(this_word);
        }
        call_args.extend_from_slice(&args_wired);

        let call_result = guest.call_table(invoker, &call_args);
        let result_word = match call_result {
            Ok(word) => word,
            Err(err) => {
                if let Some(list) = &destructors {
                    run_destructors(guest, list);
                }
                return Err(err);
            }
        };

        let return_value = if returns {
            let ret_type = arg_types[0].as_ref().ok_or_else(|| {
                EmbindError::internal("non-void invoker without a return type")
            })?;
            let word = result_word.ok_or_else(|| {
                EmbindError::internal(format!("{human_name}: guest invoker returned no value"))
            })?;
            match engine.from_wire(guest, ret_type, word) {
                Ok(value) => value,
                Err(err) => {
                    if let Some(list) = &destructors {
                        run_destructors(guest, list);
                    }
                    return Err(EmbindError::binding(
                        human_name.clone(),
                        format!(
                            "could not decode return value ({}): {err}",
                            ret_type.name
                        ),
                    ));
                }
            }
        } else {
            Value::Undefined
        };

        match destructors {
            Some(list) => run_destructors(guest, &list),
            None => {
                // Fast path: no argument type carries a destructor, so settle
                // each wire word through its per-pointer destructor (a no-op
                // for every type that can reach this branch).
                let start = if is_class_method { 1 } else { 2 };
                for (i, ty) in arg_types.iter().enumerate().skip(start) {
                    if let Some(ty) = ty {
                        let word = if i == 1 {
                            this_wired.unwrap_or(0)
                        } else {
                            args_wired.get(i - 2).copied().unwrap_or(0)
                        };
                        ty.run_wire_destructor(guest, word);
                    }
                }
            }
        }

        Ok(return_value)
    };
    Ok(Rc::new(invoke))
}

#[allow(clippy::too_many_arguments)]
fn encode_arguments(
    engine: &Engine,
    guest: &mut dyn Guest,
    human_name: &str,
    arg_types: &[Option<Rc<RegisteredType>>],
    is_class_method: bool,
    this: Option<&Value>,
    args: &[Value],
    mut destructors: Option<&mut Vec<Destructor>>,
) -> EmbindResult<(Option<u64>, Vec<u64>)> {
    let this_wired = if is_class_method {
        let class_type = arg_types[1]
            .as_ref()
            .ok_or_else(|| EmbindError::internal("class method without a 'this' type"))?;
        let undefined = Value::Undefined;
        let this_value = this.unwrap_or(&undefined);
        let word = engine
            .to_wire(guest, class_type, destructors.as_mut().map(|d| &mut **d), this_value)
            .map_err(|err| {
                EmbindError::binding(
                    human_name.to_string(),
                    format!("could not encode 'this': {err}"),
                )
            })?;
        Some(word)
    } else {
        None
    };

    let mut args_wired = Vec::with_capacity(args.len());
    for (i, value) in args.iter().enumerate() {
        let ty = arg_types[i + 2]
            .as_ref()
            .ok_or_else(|| EmbindError::internal("parameter slot without a type"))?;
        let word = engine
            .to_wire(guest, ty, destructors.as_mut().map(|d| &mut **d), value)
            .map_err(|err| {
                EmbindError::binding(
                    human_name.to_string(),
                    format!("could not encode argument {i} ({}): {err}", ty.name),
                )
            })?;
        args_wired.push(word);
    }

    Ok((this_wired, args_wired))
}
