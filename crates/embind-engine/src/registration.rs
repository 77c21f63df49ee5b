//! The `_embind_register_*` registration surface.
//!
//! One entry point per host import, taking the import's raw parameters
//! (pointers are 32-bit guest addresses) and driving the registry, symbol
//! table, class subsystem, and invoker factory. The runtime adapter is a
//! thin layer over these, so the whole surface is exercisable without a
//! WebAssembly runtime.

use std::collections::HashMap;
use std::rc::Rc;

use embind_types::{wire, EmbindError, EmbindResult, ViewKind};

use crate::classes::{
    BoundProperty, ClassRecord, MethodTable, PointerRecord, PropertyRecord,
    RegisteredPointerEntry,
};
use crate::engine::{Engine, StagedComposite, StagedElement};
use crate::guest::Guest;
use crate::invoker::{craft_invoker, InvokerSpec};
use crate::symbols::SymbolFn;
use crate::wire::composite::ElementBinding;
use crate::wire::{IntWidth, ObjectType, RegisteredType, TupleType, TypeKind};

impl Engine {
    /// `_embind_register_void`.
    pub fn embind_register_void(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        name_ptr: u32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        self.register_type(
            guest,
            raw_type,
            RegisteredType::new(raw_type, name, TypeKind::Void),
            false,
        )
    }

    /// `_embind_register_bool`.
    pub fn embind_register_bool(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        name_ptr: u32,
        size: i32,
        true_value: i32,
        false_value: i32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        self.register_type(
            guest,
            raw_type,
            RegisteredType::new(
                raw_type,
                name,
                TypeKind::Bool {
                    size: size as u32,
                    true_val: true_value,
                    false_val: false_value,
                },
            ),
            false,
        )
    }

    /// `_embind_register_integer`. Signedness comes from the registered name
    /// (names containing "unsigned" decode unsigned); the range parameters
    /// are accepted for ABI compatibility and otherwise unused.
    pub fn embind_register_integer(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        name_ptr: u32,
        size: i32,
        _min_range: i32,
        _max_range: i32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        if !matches!(size, 1 | 2 | 4) {
            return Err(EmbindError::binding(
                name,
                format!("unknown integer type size {size}"),
            ));
        }
        let signed = !name.contains("unsigned");
        self.register_type(
            guest,
            raw_type,
            RegisteredType::new(
                raw_type,
                name,
                TypeKind::Int(IntWidth {
                    size: size as u32,
                    signed,
                }),
            ),
            false,
        )
    }

    /// `_embind_register_bigint`. Unsigned iff the name starts with `u`.
    pub fn embind_register_bigint(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        name_ptr: u32,
        _size: i32,
        _min_range: i64,
        _max_range: i64,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        let signed = !name.starts_with('u');
        self.register_type(
            guest,
            raw_type,
            RegisteredType::new(raw_type, name, TypeKind::BigInt { signed }),
            false,
        )
    }

    /// `_embind_register_float`.
    pub fn embind_register_float(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        name_ptr: u32,
        size: i32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        if !matches!(size, 4 | 8) {
            return Err(EmbindError::binding(
                name,
                format!("unknown float type size {size}"),
            ));
        }
        self.register_type(
            guest,
            raw_type,
            RegisteredType::new(raw_type, name, TypeKind::Float { size: size as u32 }),
            false,
        )
    }

    /// `_embind_register_std_string`. The exact name `std::string` marks the
    /// UTF-8 variant; any other narrow string carries raw bytes.
    pub fn embind_register_std_string(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        name_ptr: u32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        let utf8 = name == "std::string";
        self.register_type(
            guest,
            raw_type,
            RegisteredType::new(raw_type, name, TypeKind::StdString { utf8 }),
            false,
        )
    }

    /// `_embind_register_std_wstring`.
    pub fn embind_register_std_wstring(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        char_size: i32,
        name_ptr: u32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        if !matches!(char_size, 2 | 4) {
            return Err(EmbindError::binding(
                name,
                format!("unknown wide string char size {char_size}"),
            ));
        }
        self.register_type(
            guest,
            raw_type,
            RegisteredType::new(
                raw_type,
                name,
                TypeKind::WString {
                    char_size: char_size as u32,
                },
            ),
            false,
        )
    }

    /// `_embind_register_emval`. Duplicate registrations are ignored: every
    /// translation unit registers the same id.
    pub fn embind_register_emval(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        name_ptr: u32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        self.register_type(
            guest,
            raw_type,
            RegisteredType::new(raw_type, name, TypeKind::Emval),
            true,
        )
    }

    /// `_embind_register_memory_view`.
    pub fn embind_register_memory_view(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        data_type_index: i32,
        name_ptr: u32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        let Some(kind) = ViewKind::from_index(data_type_index) else {
            return Err(EmbindError::binding(
                name,
                format!("invalid memory view data type index {data_type_index}"),
            ));
        };
        self.register_type(
            guest,
            raw_type,
            RegisteredType::new(raw_type, name, TypeKind::MemoryView { kind }),
            true,
        )
    }

    /// `_embind_register_constant`. The value arrives in a single f64 slot
    /// regardless of the constant's type; it is re-encoded into the target
    /// type's wire word once that type resolves, then validated against any
    /// host-declared constant of the same name.
    pub fn embind_register_constant(
        &self,
        guest: &mut dyn Guest,
        name_ptr: u32,
        raw_type: i32,
        value: f64,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        self.when_dependent_types_are_resolved(
            guest,
            Vec::new(),
            vec![raw_type],
            Box::new(move |engine, guest, resolved| {
                let ty = &resolved[0];
                let word = constant_wire_word(ty, value)?;
                let decoded = engine.from_wire(guest, ty, word).map_err(|err| {
                    EmbindError::binding(
                        name.clone(),
                        format!("could not initialize constant: {err}"),
                    )
                })?;
                {
                    let mut state = engine.state_mut();
                    let record = state.constants.entry(name.clone()).or_default();
                    record.cpp = Some((decoded, word));
                    record.validate(&name)?;
                }
                Ok(Vec::new())
            }),
        )
    }

    /// `_embind_register_enum`.
    pub fn embind_register_enum(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        name_ptr: u32,
        size: i32,
        is_signed: i32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        let enum_id = self.ensure_enum_record(&name);
        self.enum_attach_guest(
            enum_id,
            IntWidth {
                size: size as u32,
                signed: is_signed > 0,
            },
        );
        self.register_type(
            guest,
            raw_type,
            RegisteredType::new(raw_type, name, TypeKind::Enum(enum_id)),
            false,
        )
    }

    /// `_embind_register_enum_value`.
    pub fn embind_register_enum_value(
        &self,
        guest: &mut dyn Guest,
        raw_enum_type: i32,
        name_ptr: u32,
        enum_value: i32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        let ty = self.require_registered_type(guest, raw_enum_type, &name)?;
        let TypeKind::Enum(enum_id) = &ty.kind else {
            return Err(EmbindError::binding(
                name,
                format!("{} is not an enum type", ty.name),
            ));
        };
        let enum_id = *enum_id;
        let width = {
            // The enum's own integer codec decodes the member value.
            let state = self.state();
            state.enums[enum_id].int
        };
        let width = width.ok_or_else(|| {
            EmbindError::binding(&*ty.name, "enum has no registered integer representation")
        })?;
        let cpp_value = width.wire_to_i64(wire::encode_i32(enum_value));
        self.enum_add_cpp_value(enum_id, &name, cpp_value)
    }

    /// `_embind_register_function`: installs a stub that reports unbound
    /// types until every argument type resolves, then swaps in the real
    /// invoker.
    #[allow(clippy::too_many_arguments)]
    pub fn embind_register_function(
        &self,
        guest: &mut dyn Guest,
        name_ptr: u32,
        arg_count: i32,
        raw_arg_types_addr: u32,
        _signature_ptr: u32,
        raw_invoker: u32,
        fn_ptr: i32,
        is_async: i32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        if is_async != 0 {
            return Err(EmbindError::binding(
                name,
                "async bindings are only supported with JSPI",
            ));
        }
        let arg_type_ids = guest.read_i32_vec(raw_arg_types_addr, arg_count as u32)?;

        self.expose_public_symbol(
            &name,
            unbound_stub(name.clone(), arg_type_ids.clone()),
            Some(arg_count - 1),
        )?;

        let replace_name = name;
        self.when_dependent_types_are_resolved(
            guest,
            Vec::new(),
            arg_type_ids,
            Box::new(move |engine, _guest, resolved| {
                let mut arg_types = Vec::with_capacity(resolved.len() + 1);
                arg_types.push(Some(Rc::clone(&resolved[0]))); // return value
                arg_types.push(None); // no class 'this'
                arg_types.extend(resolved[1..].iter().map(|t| Some(Rc::clone(t))));

                let invoker = craft_invoker(InvokerSpec {
                    human_name: replace_name.clone(),
                    arg_types,
                    invoker: raw_invoker,
                    fn_ptr,
                })?;
                engine.replace_public_symbol(&replace_name, invoker, Some(arg_count - 1))?;
                Ok(Vec::new())
            }),
        )
    }

    // ── value arrays and value objects ──────────────────────────────────

    /// `_embind_register_value_array`.
    pub fn embind_register_value_array(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        name_ptr: u32,
        _constructor_sig: u32,
        raw_constructor: u32,
        _destructor_sig: u32,
        raw_destructor: u32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        self.state_mut().staged_tuples.insert(
            raw_type,
            StagedComposite {
                name,
                raw_constructor,
                raw_destructor,
                elements: Vec::new(),
            },
        );
        Ok(())
    }

    /// `_embind_register_value_array_element`.
    #[allow(clippy::too_many_arguments)]
    pub fn embind_register_value_array_element(
        &self,
        raw_tuple_type: i32,
        getter_return_type: i32,
        _getter_sig: u32,
        getter: u32,
        getter_context: i32,
        setter_arg_type: i32,
        _setter_sig: u32,
        setter: u32,
        setter_context: i32,
    ) -> EmbindResult<()> {
        let mut state = self.state_mut();
        let Some(staged) = state.staged_tuples.get_mut(&raw_tuple_type) else {
            return Err(EmbindError::binding(
                "value array",
                format!("cannot add element to unknown tuple type {raw_tuple_type}"),
            ));
        };
        staged.elements.push(StagedElement {
            field_name: String::new(),
            getter_return_type,
            getter,
            getter_context,
            setter_arg_type,
            setter,
            setter_context,
        });
        Ok(())
    }

    /// `_embind_finalize_value_array`: bind every element once its getter
    /// and setter types resolve, then register the tuple type itself.
    pub fn embind_finalize_value_array(
        &self,
        guest: &mut dyn Guest,
        raw_tuple_type: i32,
    ) -> EmbindResult<()> {
        let Some(staged) = self.state_mut().staged_tuples.remove(&raw_tuple_type) else {
            return Err(EmbindError::binding(
                "value array",
                format!("cannot finalize unknown tuple type {raw_tuple_type}"),
            ));
        };
        let deps = composite_deps(&staged);
        self.when_dependent_types_are_resolved(
            guest,
            vec![raw_tuple_type],
            deps,
            Box::new(move |_engine, _guest, resolved| {
                let elements = bind_elements(&staged, &resolved);
                Ok(vec![RegisteredType::new(
                    raw_tuple_type,
                    staged.name.clone(),
                    TypeKind::Tuple(Rc::new(TupleType {
                        raw_constructor: staged.raw_constructor,
                        raw_destructor: staged.raw_destructor,
                        elements,
                    })),
                )])
            }),
        )
    }

    /// `_embind_register_value_object`.
    pub fn embind_register_value_object(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        name_ptr: u32,
        _constructor_sig: u32,
        raw_constructor: u32,
        _destructor_sig: u32,
        raw_destructor: u32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        self.state_mut().staged_objects.insert(
            raw_type,
            StagedComposite {
                name,
                raw_constructor,
                raw_destructor,
                elements: Vec::new(),
            },
        );
        Ok(())
    }

    /// `_embind_register_value_object_field`.
    #[allow(clippy::too_many_arguments)]
    pub fn embind_register_value_object_field(
        &self,
        guest: &mut dyn Guest,
        struct_type: i32,
        field_name_ptr: u32,
        getter_return_type: i32,
        _getter_sig: u32,
        getter: u32,
        getter_context: i32,
        setter_arg_type: i32,
        _setter_sig: u32,
        setter: u32,
        setter_context: i32,
    ) -> EmbindResult<()> {
        let field_name = guest.read_c_string(field_name_ptr)?;
        let mut state = self.state_mut();
        let Some(staged) = state.staged_objects.get_mut(&struct_type) else {
            return Err(EmbindError::binding(
                field_name,
                format!("cannot add field to unknown struct type {struct_type}"),
            ));
        };
        staged.elements.push(StagedElement {
            field_name,
            getter_return_type,
            getter,
            getter_context,
            setter_arg_type,
            setter,
            setter_context,
        });
        Ok(())
    }

    /// `_embind_finalize_value_object`.
    pub fn embind_finalize_value_object(
        &self,
        guest: &mut dyn Guest,
        struct_type: i32,
    ) -> EmbindResult<()> {
        let Some(staged) = self.state_mut().staged_objects.remove(&struct_type) else {
            return Err(EmbindError::binding(
                "value object",
                format!("cannot finalize unknown struct type {struct_type}"),
            ));
        };
        let deps = composite_deps(&staged);
        self.when_dependent_types_are_resolved(
            guest,
            vec![struct_type],
            deps,
            Box::new(move |_engine, _guest, resolved| {
                let bindings = bind_elements(&staged, &resolved);
                let fields = staged
                    .elements
                    .iter()
                    .map(|e| e.field_name.clone())
                    .zip(bindings)
                    .collect();
                Ok(vec![RegisteredType::new(
                    struct_type,
                    staged.name.clone(),
                    TypeKind::Object(Rc::new(ObjectType {
                        raw_constructor: staged.raw_constructor,
                        raw_destructor: staged.raw_destructor,
                        fields,
                    })),
                )])
            }),
        )
    }

    // ── classes ─────────────────────────────────────────────────────────

    /// `_embind_register_class`: defers class creation on the base class,
    /// then registers the by-reference, pointer, and const-pointer
    /// converters and swaps the stub constructor symbol for the real
    /// arity-dispatching one.
    #[allow(clippy::too_many_arguments)]
    pub fn embind_register_class(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        raw_pointer_type: i32,
        raw_const_pointer_type: i32,
        base_class_raw_type: i32,
        _get_actual_type_sig: u32,
        get_actual_type: u32,
        _upcast_sig: u32,
        upcast: u32,
        _downcast_sig: u32,
        downcast: u32,
        name_ptr: u32,
        _destructor_sig: u32,
        raw_destructor: u32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;

        self.expose_public_symbol(
            &name,
            unbound_stub(name.clone(), vec![raw_type]),
            None,
        )?;

        let deps = if base_class_raw_type != 0 {
            vec![base_class_raw_type]
        } else {
            Vec::new()
        };
        let class_name = name;
        self.when_dependent_types_are_resolved(
            guest,
            vec![raw_type, raw_pointer_type, raw_const_pointer_type],
            deps,
            Box::new(move |engine, _guest, resolved| {
                let base = match resolved.first() {
                    Some(base_ty) => match &base_ty.kind {
                        TypeKind::ClassPointer(ptr_id) => Some(engine.pointer_class(*ptr_id)),
                        _ => {
                            return Err(EmbindError::binding(
                                class_name.clone(),
                                format!("base class {} is not a class type", base_ty.name),
                            ));
                        }
                    },
                    None => None,
                };

                let class_id = engine.alloc_class(ClassRecord {
                    name: class_name.clone(),
                    base,
                    derived: Vec::new(),
                    get_actual_type,
                    upcast: (upcast != 0).then_some(upcast),
                    downcast: (downcast != 0).then_some(downcast),
                    raw_destructor,
                    constructors: HashMap::new(),
                    methods: HashMap::new(),
                    statics: HashMap::new(),
                    properties: HashMap::new(),
                    pure_virtuals: Vec::new(),
                });
                if let Some(base) = base {
                    engine.state_mut().classes[base.0].derived.push(class_id);
                }

                let plain = |name: String, is_reference: bool, is_const: bool| PointerRecord {
                    name,
                    class: class_id,
                    is_reference,
                    is_const,
                    is_smart: false,
                    pointee: None,
                    sharing_policy: None,
                    raw_get_pointee: None,
                    raw_constructor: None,
                    raw_share: None,
                    raw_destructor: None,
                };
                let reference = engine.alloc_pointer(plain(class_name.clone(), true, false));
                let pointer = engine.alloc_pointer(plain(format!("{class_name}*"), false, false));
                let const_pointer =
                    engine.alloc_pointer(plain(format!("{class_name} const*"), false, true));
                engine.state_mut().registered_pointers.insert(
                    raw_type,
                    RegisteredPointerEntry {
                        pointer,
                        const_pointer,
                    },
                );

                let ctor_class_name = class_name.clone();
                engine.replace_public_symbol(
                    &class_name,
                    Rc::new(move |engine: &Engine,
                                  guest: &mut dyn Guest,
                                  _this: Option<&embind_types::Value>,
                                  args: &[embind_types::Value]| {
                        let func = {
                            let state = engine.state();
                            let constructors = &state.classes[class_id.0].constructors;
                            match constructors.get(&(args.len() as i32)) {
                                Some(func) => Rc::clone(func),
                                None => {
                                    if constructors.is_empty() {
                                        return Err(EmbindError::binding(
                                            ctor_class_name.clone(),
                                            "has no accessible constructor",
                                        ));
                                    }
                                    let mut arities: Vec<i32> =
                                        constructors.keys().copied().collect();
                                    arities.sort_unstable();
                                    return Err(EmbindError::binding(
                                        ctor_class_name.clone(),
                                        format!(
                                            "called with an invalid number of arguments ({}) - expects one of ({})",
                                            args.len(),
                                            arities
                                                .iter()
                                                .map(|a| a.to_string())
                                                .collect::<Vec<_>>()
                                                .join(", ")
                                        ),
                                    ));
                                }
                            }
                        };
                        (*func)(engine, guest, None, args)
                    }),
                    None,
                )?;

                Ok(vec![
                    RegisteredType::new(
                        raw_type,
                        class_name.clone(),
                        TypeKind::ClassPointer(reference),
                    ),
                    RegisteredType::new(
                        raw_pointer_type,
                        format!("{class_name}*"),
                        TypeKind::ClassPointer(pointer),
                    ),
                    RegisteredType::new(
                        raw_const_pointer_type,
                        format!("{class_name} const*"),
                        TypeKind::ClassPointer(const_pointer),
                    ),
                ])
            }),
        )
    }

    /// `_embind_register_class_constructor`: one overload per parameter
    /// count in the class's constructor table.
    pub fn embind_register_class_constructor(
        &self,
        guest: &mut dyn Guest,
        raw_class_type: i32,
        arg_count: i32,
        raw_arg_types_addr: u32,
        _invoker_sig: u32,
        invoker: u32,
        raw_constructor: i32,
    ) -> EmbindResult<()> {
        let arg_type_ids = guest.read_i32_vec(raw_arg_types_addr, arg_count as u32)?;
        let param_count = arg_count - 1;

        self.when_dependent_types_are_resolved(
            guest,
            Vec::new(),
            vec![raw_class_type],
            Box::new(move |engine, guest, resolved| {
                let class_id = class_of(engine, &resolved[0])?;
                let class_name = engine.class_name(class_id);
                let human_name = format!("constructor {class_name}");

                {
                    let mut state = engine.state_mut();
                    let constructors = &mut state.classes[class_id.0].constructors;
                    if constructors.contains_key(&param_count) {
                        return Err(EmbindError::binding(
                            class_name,
                            format!(
                                "cannot register multiple constructors with identical number of parameters ({param_count})"
                            ),
                        ));
                    }
                    constructors.insert(
                        param_count,
                        unbound_stub(human_name.clone(), arg_type_ids.clone()),
                    );
                }

                engine.when_dependent_types_are_resolved(
                    guest,
                    Vec::new(),
                    arg_type_ids.clone(),
                    Box::new(move |engine, _guest, resolved| {
                        let mut arg_types = Vec::with_capacity(resolved.len() + 1);
                        arg_types.push(Some(Rc::clone(&resolved[0])));
                        arg_types.push(None); // constructors have no 'this'
                        arg_types.extend(resolved[1..].iter().map(|t| Some(Rc::clone(t))));

                        let func = craft_invoker(InvokerSpec {
                            human_name: human_name.clone(),
                            arg_types,
                            invoker,
                            fn_ptr: raw_constructor,
                        })?;
                        engine.state_mut().classes[class_id.0]
                            .constructors
                            .insert(param_count, func);
                        Ok(Vec::new())
                    }),
                )?;
                Ok(Vec::new())
            }),
        )
    }

    /// `_embind_register_class_function` (instance methods).
    #[allow(clippy::too_many_arguments)]
    pub fn embind_register_class_function(
        &self,
        guest: &mut dyn Guest,
        raw_class_type: i32,
        method_name_ptr: u32,
        arg_count: i32,
        raw_arg_types_addr: u32,
        _invoker_sig: u32,
        raw_invoker: u32,
        context: i32,
        is_pure_virtual: i32,
        is_async: i32,
    ) -> EmbindResult<()> {
        let method_name = self.method_name(guest, method_name_ptr)?;
        if is_async != 0 {
            return Err(EmbindError::binding(
                method_name,
                "async bindings are only supported with JSPI",
            ));
        }
        let arg_type_ids = guest.read_i32_vec(raw_arg_types_addr, arg_count as u32)?;
        let arity = arg_count - 2;

        self.when_dependent_types_are_resolved(
            guest,
            Vec::new(),
            vec![raw_class_type],
            Box::new(move |engine, guest, resolved| {
                let class_id = class_of(engine, &resolved[0])?;
                let class_name = engine.class_name(class_id);
                let human_name = format!("{class_name}.{method_name}");

                {
                    let mut state = engine.state_mut();
                    let record = &mut state.classes[class_id.0];
                    if is_pure_virtual != 0 {
                        record.pure_virtuals.push(method_name.clone());
                    }
                    record
                        .methods
                        .entry(method_name.clone())
                        .or_insert_with(MethodTable::default)
                        .overloads
                        .insert(arity, unbound_stub(human_name.clone(), arg_type_ids.clone()));
                }

                let method_name = method_name.clone();
                engine.when_dependent_types_are_resolved(
                    guest,
                    Vec::new(),
                    arg_type_ids.clone(),
                    Box::new(move |engine, _guest, resolved| {
                        let arg_types = resolved.iter().map(|t| Some(Rc::clone(t))).collect();
                        let func = craft_invoker(InvokerSpec {
                            human_name: human_name.clone(),
                            arg_types,
                            invoker: raw_invoker,
                            fn_ptr: context,
                        })?;
                        engine.state_mut().classes[class_id.0]
                            .methods
                            .entry(method_name.clone())
                            .or_insert_with(MethodTable::default)
                            .overloads
                            .insert(arity, func);
                        Ok(Vec::new())
                    }),
                )?;
                Ok(Vec::new())
            }),
        )
    }

    /// `_embind_register_class_class_function` (static methods).
    #[allow(clippy::too_many_arguments)]
    pub fn embind_register_class_class_function(
        &self,
        guest: &mut dyn Guest,
        raw_class_type: i32,
        method_name_ptr: u32,
        arg_count: i32,
        raw_arg_types_addr: u32,
        _invoker_sig: u32,
        raw_invoker: u32,
        fn_ptr: i32,
        is_async: i32,
    ) -> EmbindResult<()> {
        let method_name = self.method_name(guest, method_name_ptr)?;
        if is_async != 0 {
            return Err(EmbindError::binding(
                method_name,
                "async bindings are only supported with JSPI",
            ));
        }
        let arg_type_ids = guest.read_i32_vec(raw_arg_types_addr, arg_count as u32)?;
        let arity = arg_count - 1;

        self.when_dependent_types_are_resolved(
            guest,
            Vec::new(),
            vec![raw_class_type],
            Box::new(move |engine, guest, resolved| {
                let class_id = class_of(engine, &resolved[0])?;
                let class_name = engine.class_name(class_id);
                let human_name = format!("{class_name}.{method_name}");

                engine.state_mut().classes[class_id.0]
                    .statics
                    .entry(method_name.clone())
                    .or_insert_with(MethodTable::default)
                    .overloads
                    .insert(arity, unbound_stub(human_name.clone(), arg_type_ids.clone()));

                let method_name = method_name.clone();
                engine.when_dependent_types_are_resolved(
                    guest,
                    Vec::new(),
                    arg_type_ids.clone(),
                    Box::new(move |engine, _guest, resolved| {
                        let mut arg_types = Vec::with_capacity(resolved.len() + 1);
                        arg_types.push(Some(Rc::clone(&resolved[0])));
                        arg_types.push(None); // statics take no 'this'
                        arg_types.extend(resolved[1..].iter().map(|t| Some(Rc::clone(t))));

                        let func = craft_invoker(InvokerSpec {
                            human_name: human_name.clone(),
                            arg_types,
                            invoker: raw_invoker,
                            fn_ptr,
                        })?;
                        engine.state_mut().classes[class_id.0]
                            .statics
                            .entry(method_name.clone())
                            .or_insert_with(MethodTable::default)
                            .overloads
                            .insert(arity, func);
                        Ok(Vec::new())
                    }),
                )?;
                Ok(Vec::new())
            }),
        )
    }

    /// `_embind_register_class_property`. A zero setter registers the
    /// property read-only.
    #[allow(clippy::too_many_arguments)]
    pub fn embind_register_class_property(
        &self,
        guest: &mut dyn Guest,
        class_type: i32,
        field_name_ptr: u32,
        getter_return_type: i32,
        _getter_sig: u32,
        getter: u32,
        getter_context: i32,
        setter_arg_type: i32,
        _setter_sig: u32,
        setter: u32,
        setter_context: i32,
    ) -> EmbindResult<()> {
        let field_name = guest.read_c_string(field_name_ptr)?;

        self.when_dependent_types_are_resolved(
            guest,
            Vec::new(),
            vec![class_type],
            Box::new(move |engine, guest, resolved| {
                let class_id = class_of(engine, &resolved[0])?;
                let mut deps = vec![getter_return_type];
                if setter != 0 {
                    deps.push(setter_arg_type);
                }

                engine.state_mut().classes[class_id.0].properties.insert(
                    field_name.clone(),
                    PropertyRecord {
                        bound: None,
                        deps: deps.clone(),
                    },
                );

                let field_name = field_name.clone();
                engine.when_dependent_types_are_resolved(
                    guest,
                    Vec::new(),
                    deps,
                    Box::new(move |engine, _guest, resolved| {
                        let bound = BoundProperty {
                            getter,
                            getter_context,
                            getter_ty: Rc::clone(&resolved[0]),
                            setter: (setter != 0).then(|| {
                                (setter, setter_context, Rc::clone(&resolved[1]))
                            }),
                        };
                        if let Some(record) = engine.state_mut().classes[class_id.0]
                            .properties
                            .get_mut(&field_name)
                        {
                            record.bound = Some(bound);
                        }
                        Ok(Vec::new())
                    }),
                )?;
                Ok(Vec::new())
            }),
        )
    }

    /// `_embind_register_smart_ptr`: wraps an already-registered class
    /// pointer with smart-pointer semantics driven through the supplied
    /// indirect handles.
    #[allow(clippy::too_many_arguments)]
    pub fn embind_register_smart_ptr(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        raw_pointee_type: i32,
        name_ptr: u32,
        sharing_policy: i32,
        _get_pointee_sig: u32,
        raw_get_pointee: u32,
        _constructor_sig: u32,
        raw_constructor: u32,
        _share_sig: u32,
        raw_share: u32,
        _destructor_sig: u32,
        raw_destructor: u32,
    ) -> EmbindResult<()> {
        let name = guest.read_c_string(name_ptr)?;
        self.when_dependent_types_are_resolved(
            guest,
            vec![raw_type],
            vec![raw_pointee_type],
            Box::new(move |engine, _guest, resolved| {
                let TypeKind::ClassPointer(pointee) = &resolved[0].kind else {
                    return Err(EmbindError::binding(
                        name.clone(),
                        format!("pointee type {} is not a class", resolved[0].name),
                    ));
                };
                let pointee = *pointee;
                let class = engine.pointer_class(pointee);
                let ptr_id = engine.alloc_pointer(PointerRecord {
                    name: name.clone(),
                    class,
                    is_reference: false,
                    is_const: false,
                    is_smart: true,
                    pointee: Some(pointee),
                    sharing_policy: Some(sharing_policy),
                    raw_get_pointee: Some(raw_get_pointee),
                    raw_constructor: Some(raw_constructor),
                    raw_share: Some(raw_share),
                    raw_destructor: Some(raw_destructor),
                });
                Ok(vec![RegisteredType::new(
                    raw_type,
                    name.clone(),
                    TypeKind::ClassPointer(ptr_id),
                )])
            }),
        )
    }

    /// Method names starting with `@@` refer to well-known symbols and are
    /// rewritten through the emval globals table before insertion.
    fn method_name(&self, guest: &mut dyn Guest, name_ptr: u32) -> EmbindResult<String> {
        let raw = guest.read_c_string(name_ptr)?;
        let Some(symbol) = raw.strip_prefix("@@") else {
            return Ok(raw);
        };
        let global = self.state().emval.globals().borrow().get(symbol).cloned();
        match global {
            Some(embind_types::Value::Str(rewritten)) => Ok(rewritten),
            _ => Err(EmbindError::binding(
                raw,
                "unknown well-known symbol",
            )),
        }
    }
}

/// A callable that fails with the unbound-type list until replaced.
fn unbound_stub(context: String, dep_type_ids: Vec<i32>) -> SymbolFn {
    Rc::new(
        move |engine: &Engine,
              guest: &mut dyn Guest,
              _this: Option<&embind_types::Value>,
              _args: &[embind_types::Value]| {
            Err(engine.unbound_type_error(
                guest,
                &format!("Cannot call {context} due to unbound types"),
                &dep_type_ids,
            ))
        },
    )
}

/// The class behind a resolved class-reference type.
fn class_of(engine: &Engine, ty: &Rc<RegisteredType>) -> EmbindResult<embind_types::ClassId> {
    match &ty.kind {
        TypeKind::ClassPointer(ptr_id) => Ok(engine.pointer_class(*ptr_id)),
        _ => Err(EmbindError::binding(
            ty.name.clone(),
            "is not a class type",
        )),
    }
}

/// Dependency list of a staged composite: getter types first, then setters,
/// in element order.
fn composite_deps(staged: &StagedComposite) -> Vec<i32> {
    let mut deps = Vec::with_capacity(staged.elements.len() * 2);
    deps.extend(staged.elements.iter().map(|e| e.getter_return_type));
    deps.extend(staged.elements.iter().map(|e| e.setter_arg_type));
    deps
}

/// Zip the staged accessors with their resolved types.
fn bind_elements(
    staged: &StagedComposite,
    resolved: &[Rc<RegisteredType>],
) -> Vec<ElementBinding> {
    let count = staged.elements.len();
    staged
        .elements
        .iter()
        .enumerate()
        .map(|(i, element)| ElementBinding {
            getter: element.getter,
            getter_context: element.getter_context,
            getter_ty: Rc::clone(&resolved[i]),
            setter: element.setter,
            setter_context: element.setter_context,
            setter_ty: Rc::clone(&resolved[count + i]),
        })
        .collect()
}

/// Re-encode the f64 the constant ABI delivers into the target type's wire
/// word, validating integral-ness and range on the way.
fn constant_wire_word(ty: &RegisteredType, value: f64) -> EmbindResult<u64> {
    match &ty.kind {
        TypeKind::Bool { true_val, false_val, .. } => Ok(wire::encode_i32(if value != 0.0 {
            *true_val
        } else {
            *false_val
        })),
        TypeKind::Int(width) => {
            if value.fract() != 0.0 {
                return Err(EmbindError::binding(
                    ty.name.clone(),
                    format!("constant value {value} is not an integer"),
                ));
            }
            let bits = u64::from(width.size) * 8;
            let (min, max) = if width.signed {
                (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
            } else {
                (0, ((1i64 << (bits - 1)) - 1) * 2 + 1)
            };
            let value = value as i64;
            if value < min || value > max {
                return Err(EmbindError::binding(
                    ty.name.clone(),
                    format!("constant value {value} is out of range [{min}, {max}]"),
                ));
            }
            Ok(width.i64_to_wire(value))
        }
        TypeKind::BigInt { signed } => {
            if value.fract() != 0.0 {
                return Err(EmbindError::binding(
                    ty.name.clone(),
                    format!("constant value {value} is not an integer"),
                ));
            }
            if *signed {
                Ok(wire::encode_i64(value as i64))
            } else {
                Ok(value as u64)
            }
        }
        TypeKind::Float { size: 4 } => Ok(wire::encode_f32(value as f32)),
        TypeKind::Float { .. } => Ok(wire::encode_f64(value)),
        _ => Err(EmbindError::binding(
            ty.name.clone(),
            "constants of this type are not supported",
        )),
    }
}
