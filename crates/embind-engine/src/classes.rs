//! Registered classes, pointer converters, and instance handles.
//!
//! The class graph (base/derived back edges) lives in an arena with stable
//! ids. Every class owns three pointer converters (by-reference, by-value
//! pointer, const pointer); smart-pointer registrations wrap the same class
//! with their own converter. Instance handles share one record per C++
//! object (keyed by the base-most raw pointer), so two wire values pointing
//! at the same object produce the same host identity.

use std::collections::HashMap;
use std::rc::Rc;

use embind_types::{wire, ClassHandle, ClassId, EmbindError, EmbindResult, PtrId, Value};

use crate::engine::Engine;
use crate::guest::Guest;
use crate::invoker::run_destructors;
use crate::symbols::SymbolFn;
use crate::wire::RegisteredType;

/// Arity-keyed callables behind one method name.
#[derive(Default)]
pub(crate) struct MethodTable {
    pub overloads: HashMap<i32, SymbolFn>,
}

impl MethodTable {
    fn select(&self, name: &str, arg_count: i32) -> EmbindResult<SymbolFn> {
        if let Some(func) = self.overloads.get(&arg_count) {
            return Ok(Rc::clone(func));
        }
        let mut arities: Vec<i32> = self.overloads.keys().copied().collect();
        arities.sort_unstable();
        Err(EmbindError::binding(
            name,
            format!(
                "called with an invalid number of arguments ({arg_count}) - expects one of ({})",
                arities
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ))
    }
}

/// A property once its getter (and optional setter) types have resolved.
pub(crate) struct BoundProperty {
    pub getter: u32,
    pub getter_context: i32,
    pub getter_ty: Rc<RegisteredType>,
    /// `(table index, context, type)`; absent for read-only properties.
    pub setter: Option<(u32, i32, Rc<RegisteredType>)>,
}

/// A registered property; unbound until its types resolve.
pub(crate) struct PropertyRecord {
    pub bound: Option<BoundProperty>,
    /// Raw type ids the binding waits on, for unbound-type errors.
    pub deps: Vec<i32>,
}

/// One registered class.
pub(crate) struct ClassRecord {
    pub name: String,
    pub base: Option<ClassId>,
    /// Back edges; dispatch walks `base` instead, so these are bookkeeping.
    #[allow(dead_code)]
    pub derived: Vec<ClassId>,
    pub get_actual_type: u32,
    pub upcast: Option<u32>,
    pub downcast: Option<u32>,
    pub raw_destructor: u32,
    /// Constructor overloads keyed by parameter count.
    pub constructors: HashMap<i32, SymbolFn>,
    pub methods: HashMap<String, MethodTable>,
    pub statics: HashMap<String, MethodTable>,
    pub properties: HashMap<String, PropertyRecord>,
    pub pure_virtuals: Vec<String>,
}

/// One pointer converter over a registered class.
pub(crate) struct PointerRecord {
    pub name: String,
    pub class: ClassId,
    pub is_reference: bool,
    pub is_const: bool,
    pub is_smart: bool,
    /// The pointee's plain pointer converter (smart pointers only).
    pub pointee: Option<PtrId>,
    pub sharing_policy: Option<i32>,
    pub raw_get_pointee: Option<u32>,
    pub raw_constructor: Option<u32>,
    /// Recorded for the re-sharing protocol; unused until a sharing policy
    /// needs it.
    #[allow(dead_code)]
    pub raw_share: Option<u32>,
    /// Smart-pointer destructor; plain pointers destroy through the class.
    pub raw_destructor: Option<u32>,
}

/// The plain and const pointer converters of one class, consulted when
/// downcasting decoded pointers to their actual type.
#[derive(Clone, Copy)]
pub(crate) struct RegisteredPointerEntry {
    pub pointer: PtrId,
    pub const_pointer: PtrId,
}

impl Engine {
    pub(crate) fn alloc_class(&self, record: ClassRecord) -> ClassId {
        let mut state = self.state_mut();
        let id = ClassId(state.classes.len());
        state.classes_by_name.insert(record.name.clone(), id.0);
        state.classes.push(record);
        id
    }

    pub(crate) fn alloc_pointer(&self, record: PointerRecord) -> PtrId {
        let mut state = self.state_mut();
        let id = PtrId(state.pointers.len());
        state.pointers.push(record);
        id
    }

    pub(crate) fn class_name(&self, class: ClassId) -> String {
        self.state().classes[class.0].name.clone()
    }

    pub(crate) fn pointer_class(&self, ptr_type: PtrId) -> ClassId {
        self.state().pointers[ptr_type.0].class
    }

    /// Walk `ptr` up from `class` to its root base, upcasting at every edge.
    pub(crate) fn basest_pointer(
        &self,
        guest: &mut dyn Guest,
        mut class: ClassId,
        mut ptr: u32,
    ) -> EmbindResult<(ClassId, u32)> {
        loop {
            let (base, upcast) = {
                let state = self.state();
                let record = &state.classes[class.0];
                (record.base, record.upcast)
            };
            let Some(base) = base else {
                return Ok((class, ptr));
            };
            if let Some(upcast) = upcast {
                ptr = wire::decode_u32(
                    guest.call_table_expect(upcast, &[wire::encode_u32(ptr)])?,
                );
            }
            class = base;
        }
    }

    /// Upcast `ptr` from `from` to `to`, or `None` when `to` is not a base.
    pub(crate) fn upcast_pointer(
        &self,
        guest: &mut dyn Guest,
        mut ptr: u32,
        mut from: ClassId,
        to: ClassId,
    ) -> EmbindResult<Option<u32>> {
        loop {
            if from == to {
                return Ok(Some(ptr));
            }
            let (base, upcast) = {
                let state = self.state();
                let record = &state.classes[from.0];
                (record.base, record.upcast)
            };
            let Some(base) = base else {
                return Ok(None);
            };
            if let Some(upcast) = upcast {
                ptr = wire::decode_u32(
                    guest.call_table_expect(upcast, &[wire::encode_u32(ptr)])?,
                );
            }
            from = base;
        }
    }

    /// Downcast `ptr` from `from` to the derived class `to`, or `None` when
    /// the classes are unrelated.
    pub(crate) fn downcast_pointer(
        &self,
        guest: &mut dyn Guest,
        ptr: u32,
        from: ClassId,
        to: ClassId,
    ) -> EmbindResult<Option<u32>> {
        if from == to {
            return Ok(Some(ptr));
        }
        let (base, downcast) = {
            let state = self.state();
            let record = &state.classes[to.0];
            (record.base, record.downcast)
        };
        let Some(base) = base else {
            return Ok(None);
        };
        let Some(intermediate) = self.downcast_pointer(guest, ptr, from, base)? else {
            return Ok(None);
        };
        match downcast {
            Some(downcast) => Ok(Some(wire::decode_u32(
                guest.call_table_expect(downcast, &[wire::encode_u32(intermediate)])?,
            ))),
            None => Ok(Some(intermediate)),
        }
    }

    fn checked_handle<'v>(&self, value: &'v Value, action: &str) -> EmbindResult<&'v ClassHandle> {
        let Some(handle) = value.as_instance() else {
            return Err(EmbindError::binding(
                action,
                format!("expected a class instance, got {}", value.kind_name()),
            ));
        };
        if handle.is_deleted() {
            return Err(EmbindError::binding(action, "instance already deleted"));
        }
        Ok(handle)
    }

    /// Another handle to the same instance; the shared refcount is bumped.
    pub fn clone_handle(&self, value: &Value) -> EmbindResult<Value> {
        let handle = self.checked_handle(value, "clone")?;
        Ok(Value::Instance(handle.acquire()))
    }

    /// Drop one reference. The last reference runs the raw (or smart)
    /// destructor and neuters the shared record.
    pub fn delete_handle(&self, guest: &mut dyn Guest, value: &Value) -> EmbindResult<()> {
        let handle = self.checked_handle(value, "delete")?.clone();
        let record = handle.record();
        let (count, ptr, smart, ptr_type) = {
            let r = record.borrow();
            (r.count.get(), r.ptr, r.smart_type.zip(r.smart_ptr), r.ptr_type)
        };
        if count > 1 {
            record.borrow().count.set(count - 1);
            return Ok(());
        }

        let destructor = match smart {
            Some((smart_type, smart_ptr)) => {
                let state = self.state();
                state.pointers[smart_type.0]
                    .raw_destructor
                    .map(|index| (index, smart_ptr))
            }
            None => {
                let state = self.state();
                let class = state.pointers[ptr_type.0].class;
                Some((state.classes[class.0].raw_destructor, ptr))
            }
        };
        if let Some((index, target)) = destructor {
            guest.call_table(index, &[wire::encode_u32(target)])?;
        }

        let mut r = record.borrow_mut();
        r.count.set(0);
        r.ptr = 0;
        r.smart_type = None;
        r.smart_ptr = None;
        Ok(())
    }

    /// Find a method table entry walking the class chain (locally defined
    /// names shadow inherited ones).
    fn find_method(
        &self,
        mut class: ClassId,
        name: &str,
        arg_count: i32,
        statics: bool,
    ) -> EmbindResult<Option<SymbolFn>> {
        loop {
            {
                let state = self.state();
                let record = &state.classes[class.0];
                let table = if statics {
                    record.statics.get(name)
                } else {
                    record.methods.get(name)
                };
                if let Some(table) = table {
                    let human = format!("{}.{name}", record.name);
                    return table.select(&human, arg_count).map(Some);
                }
            }
            let base = self.state().classes[class.0].base;
            match base {
                Some(base) => class = base,
                None => return Ok(None),
            }
        }
    }

    fn pure_virtual_in_chain(&self, mut class: ClassId, name: &str) -> bool {
        loop {
            let (found, base) = {
                let state = self.state();
                let record = &state.classes[class.0];
                (record.pure_virtuals.iter().any(|m| m == name), record.base)
            };
            if found {
                return true;
            }
            match base {
                Some(base) => class = base,
                None => return false,
            }
        }
    }

    /// Invoke an instance method by name; overloads dispatch on arity and
    /// `this` is validated against the declaring class during encoding.
    pub fn call_method(
        &self,
        guest: &mut dyn Guest,
        this: &Value,
        name: &str,
        args: &[Value],
    ) -> EmbindResult<Value> {
        let handle = self.checked_handle(this, name)?;
        let class = self.pointer_class(handle.ptr_type());
        match self.find_method(class, name, args.len() as i32, false)? {
            Some(func) => (*func)(self, guest, Some(this), args),
            None => {
                let class_name = self.class_name(class);
                if self.pure_virtual_in_chain(class, name) {
                    Err(EmbindError::binding(
                        format!("{class_name}.{name}"),
                        "pure virtual function has no override",
                    ))
                } else {
                    Err(EmbindError::binding(
                        format!("{class_name}.{name}"),
                        "no such method",
                    ))
                }
            }
        }
    }

    /// Invoke a static (class) method by class and method name.
    pub fn call_static(
        &self,
        guest: &mut dyn Guest,
        class_name: &str,
        name: &str,
        args: &[Value],
    ) -> EmbindResult<Value> {
        let class = {
            let state = self.state();
            match state.classes_by_name.get(class_name) {
                Some(&id) => ClassId(id),
                None => {
                    return Err(EmbindError::binding(class_name, "no such class"));
                }
            }
        };
        match self.find_method(class, name, args.len() as i32, true)? {
            Some(func) => (*func)(self, guest, None, args),
            None => Err(EmbindError::binding(
                format!("{class_name}.{name}"),
                "no such static method",
            )),
        }
    }

    fn find_property(
        &self,
        mut class: ClassId,
        name: &str,
    ) -> Option<(ClassId, Vec<i32>, Option<BoundPropertyCopy>)> {
        loop {
            {
                let state = self.state();
                let record = &state.classes[class.0];
                if let Some(property) = record.properties.get(name) {
                    let bound = property.bound.as_ref().map(|b| BoundPropertyCopy {
                        getter: b.getter,
                        getter_context: b.getter_context,
                        getter_ty: Rc::clone(&b.getter_ty),
                        setter: b
                            .setter
                            .as_ref()
                            .map(|(i, c, t)| (*i, *c, Rc::clone(t))),
                    });
                    return Some((class, property.deps.clone(), bound));
                }
            }
            let base = self.state().classes[class.0].base;
            match base {
                Some(base) => class = base,
                None => return None,
            }
        }
    }

    /// Read a property through its bound getter.
    pub fn get_property(
        &self,
        guest: &mut dyn Guest,
        this: &Value,
        name: &str,
    ) -> EmbindResult<Value> {
        let handle = self.checked_handle(this, name)?;
        let class = self.pointer_class(handle.ptr_type());
        let class_name = self.class_name(class);
        let Some((owner, deps, bound)) = self.find_property(class, name) else {
            return Err(EmbindError::binding(
                format!("{class_name}.{name}"),
                "no such property",
            ));
        };
        let Some(bound) = bound else {
            return Err(self.unbound_type_error(
                guest,
                &format!("Cannot access {class_name}.{name} due to unbound types"),
                &deps,
            ));
        };

        let ptr = self.validate_this(guest, handle, owner, &class_name)?;
        let word = guest.call_table_expect(
            bound.getter,
            &[wire::encode_i32(bound.getter_context), wire::encode_u32(ptr)],
        )?;
        self.from_wire(guest, &bound.getter_ty, word)
    }

    /// Write a property through its bound setter; read-only properties fail.
    pub fn set_property(
        &self,
        guest: &mut dyn Guest,
        this: &Value,
        name: &str,
        value: &Value,
    ) -> EmbindResult<()> {
        let handle = self.checked_handle(this, name)?;
        let class = self.pointer_class(handle.ptr_type());
        let class_name = self.class_name(class);
        let Some((owner, deps, bound)) = self.find_property(class, name) else {
            return Err(EmbindError::binding(
                format!("{class_name}.{name}"),
                "no such property",
            ));
        };
        let Some(bound) = bound else {
            return Err(self.unbound_type_error(
                guest,
                &format!("Cannot access {class_name}.{name} due to unbound types"),
                &deps,
            ));
        };
        let Some((setter, setter_context, setter_ty)) = bound.setter else {
            return Err(EmbindError::binding(
                format!("{class_name}.{name}"),
                "is a read-only property",
            ));
        };

        let ptr = self.validate_this(guest, handle, owner, &class_name)?;
        let mut local = Vec::new();
        let word = self.to_wire(guest, &setter_ty, Some(&mut local), value)?;
        let result = guest.call_table(
            setter,
            &[
                wire::encode_i32(setter_context),
                wire::encode_u32(ptr),
                word,
            ],
        );
        run_destructors(guest, &local);
        result.map(|_| ())
    }

    /// Upcast the handle's pointer to the class that declared the member
    /// being accessed; fails when the handle is not an instance of it.
    fn validate_this(
        &self,
        guest: &mut dyn Guest,
        handle: &ClassHandle,
        declaring: ClassId,
        human_name: &str,
    ) -> EmbindResult<u32> {
        let handle_class = self.pointer_class(handle.ptr_type());
        match self.upcast_pointer(guest, handle.ptr(), handle_class, declaring)? {
            Some(ptr) => Ok(ptr),
            None => Err(EmbindError::binding(
                human_name,
                format!(
                    "expected instance of {}, got an instance of {}",
                    self.class_name(declaring),
                    self.class_name(handle_class)
                ),
            )),
        }
    }
}

/// Owned copy of a bound property, detached from the engine borrow.
struct BoundPropertyCopy {
    getter: u32,
    getter_context: i32,
    getter_ty: Rc<RegisteredType>,
    setter: Option<(u32, i32, Rc<RegisteredType>)>,
}
