//! Engine state and the host-facing façade.
//!
//! One [`Engine`] owns every registration table for exactly one guest module
//! instance. The handle is cheap to clone (shared interior state); all entry
//! points take `&self` plus the [`Guest`] to operate on, and internal borrows
//! are scoped so that re-entrant guest calls — a resolver callback reading a
//! type name, an invoker running destructors — never observe a held borrow.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::rc::Rc;

use embind_types::{EmbindError, EmbindResult, Value};

use crate::classes::{ClassRecord, PointerRecord, RegisteredPointerEntry};
use crate::emval::EmvalState;
use crate::guest::Guest;
use crate::registry::AwaitingCallback;
use crate::symbols::PublicSymbol;
use crate::wire::enums::EnumRecord;
use crate::wire::RegisteredType;

/// A host-declared or guest-declared named constant. Both sides must agree
/// when both are present.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConstantRecord {
    /// Value decoded from the guest registration, with its raw wire word.
    pub cpp: Option<(Value, u64)>,
    /// Value declared by the host through [`Engine::register_constant`].
    pub host: Option<Value>,
}

impl ConstantRecord {
    /// Both sides, when present, must hold the same value (same kind too).
    pub fn validate(&self, name: &str) -> EmbindResult<()> {
        if let (Some((cpp, _)), Some(host)) = (&self.cpp, &self.host) {
            if cpp != host {
                return Err(EmbindError::binding(
                    name,
                    format!(
                        "constant registered with inconsistent values ({} on the guest side, {} on the host side)",
                        cpp.kind_name(),
                        host.kind_name()
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// All mutable engine state. Access only through [`Engine`].
pub(crate) struct EngineState {
    /// Raw type id → registered type. Immutable once inserted.
    pub registered_types: HashMap<i32, Rc<RegisteredType>>,
    /// Target type id → ids it is waiting on.
    pub type_dependencies: HashMap<i32, Vec<i32>>,
    /// Dependency id → callbacks to fire when it registers, in enqueue order.
    pub awaiting_dependencies: HashMap<i32, Vec<AwaitingCallback>>,
    /// Name → callable (or overload table).
    pub public_symbols: HashMap<String, PublicSymbol>,
    /// Name → constant record.
    pub constants: HashMap<String, ConstantRecord>,
    /// Enum arena; `TypeKind::Enum` holds indexes into it.
    pub enums: Vec<EnumRecord>,
    /// Enum name → arena index.
    pub enums_by_name: HashMap<String, usize>,
    /// Class arena; stable `ClassId` indexes.
    pub classes: Vec<ClassRecord>,
    /// Class name → arena index.
    pub classes_by_name: HashMap<String, usize>,
    /// Pointer-converter arena; stable `PtrId` indexes.
    pub pointers: Vec<PointerRecord>,
    /// Raw *class* type id → the class's plain/const pointer converters,
    /// consulted when downcasting decoded pointers.
    pub registered_pointers: HashMap<i32, RegisteredPointerEntry>,
    /// Base-most raw pointer → the shared instance record for that object.
    pub instances: HashMap<u32, embind_types::ClassHandle>,
    /// Value-array registrations between `register` and `finalize`.
    pub staged_tuples: HashMap<i32, StagedComposite>,
    /// Value-object registrations between `register` and `finalize`.
    pub staged_objects: HashMap<i32, StagedComposite>,
    /// The emval handle table, symbol table, and method cache.
    pub emval: EmvalState,
}

/// One element (or named field) accessor pair staged until finalization.
pub(crate) struct StagedElement {
    /// Field name; empty for tuple elements.
    pub field_name: String,
    pub getter_return_type: i32,
    pub getter: u32,
    pub getter_context: i32,
    pub setter_arg_type: i32,
    pub setter: u32,
    pub setter_context: i32,
}

/// A value-array or value-object registration waiting for its finalize call.
pub(crate) struct StagedComposite {
    pub name: String,
    pub raw_constructor: u32,
    pub raw_destructor: u32,
    pub elements: Vec<StagedElement>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            registered_types: HashMap::new(),
            type_dependencies: HashMap::new(),
            awaiting_dependencies: HashMap::new(),
            public_symbols: HashMap::new(),
            constants: HashMap::new(),
            enums: Vec::new(),
            enums_by_name: HashMap::new(),
            classes: Vec::new(),
            classes_by_name: HashMap::new(),
            pointers: Vec::new(),
            registered_pointers: HashMap::new(),
            instances: HashMap::new(),
            staged_tuples: HashMap::new(),
            staged_objects: HashMap::new(),
            emval: EmvalState::new(),
        }
    }
}

/// The embind engine: registration tables, marshalling, and dispatch for one
/// guest module instance.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<RefCell<EngineState>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// A fresh, empty engine.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(EngineState::new())),
        }
    }

    pub(crate) fn state(&self) -> Ref<'_, EngineState> {
        self.inner.borrow()
    }

    pub(crate) fn state_mut(&self) -> RefMut<'_, EngineState> {
        self.inner.borrow_mut()
    }

    /// Invoke a public symbol by name with host values. Overloaded symbols
    /// dispatch on the number of arguments.
    pub fn call_function(
        &self,
        guest: &mut dyn Guest,
        name: &str,
        args: &[Value],
    ) -> EmbindResult<Value> {
        self.call_public_symbol(guest, name, None, args)
    }

    /// Declare the host-side value of a named constant. If the guest has
    /// already registered the constant (or does so later), the two values
    /// must agree.
    pub fn register_constant(&self, name: &str, value: Value) -> EmbindResult<()> {
        let mut state = self.state_mut();
        let record = state.constants.entry(name.to_string()).or_default();
        record.host = Some(value);
        record.validate(name)
    }

    /// The current value of a named constant, guest-registered values first.
    pub fn constant(&self, name: &str) -> Option<Value> {
        let state = self.state();
        let record = state.constants.get(name)?;
        record
            .cpp
            .as_ref()
            .map(|(v, _)| v.clone())
            .or_else(|| record.host.clone())
    }

    /// Publish a host value (including host functions) into the emval global
    /// scope, where `_emval_get_global` can reach it.
    pub fn register_symbol(&self, name: &str, value: Value) -> EmbindResult<()> {
        let state = self.state();
        state
            .emval
            .globals()
            .borrow_mut()
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Number of live emval handles beyond the reserved sentinels.
    pub fn live_emval_handles(&self) -> usize {
        self.state().emval.live_handles()
    }

    /// Number of C++ instance records that have not been deleted.
    pub fn live_instances(&self) -> usize {
        self.state()
            .instances
            .values()
            .filter(|h| !h.is_deleted())
            .count()
    }

    /// The registered name of a raw type id, if it has been registered.
    pub fn registered_type_name(&self, raw_type: i32) -> Option<String> {
        self.state()
            .registered_types
            .get(&raw_type)
            .map(|t| t.name.clone())
    }
}
