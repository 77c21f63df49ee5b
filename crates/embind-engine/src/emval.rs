//! The emval handle table: refcounted ids the guest uses to hold host
//! values, plus the symbol table and global scope it reaches them through.
//!
//! Ids are slots in a dense table with a free list, so a new id never
//! collides with a live one. Id 0 is "no handle"; slots 1–4 are the reserved
//! sentinels `undefined`, `null`, `true`, and `false`, whose refcounts are
//! never touched.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use embind_types::{EmbindError, EmbindResult, Reflect, Value};

use crate::engine::Engine;
use crate::guest::Guest;
use crate::invoker::{run_destructors, Destructor};
use crate::wire::{wire_to_abi_f64, RegisteredType};

/// First id past the reserved sentinels.
const FIRST_DYNAMIC_HANDLE: usize = 5;

/// What a live slot holds: a host value, or a destructor list parked for a
/// later `_emval_run_destructors`.
pub(crate) enum EmvalPayload {
    Value(Value),
    Destructors(Rc<RefCell<Vec<Destructor>>>),
}

enum Slot {
    Empty,
    Live { payload: EmvalPayload, refs: u32 },
}

/// A call-site signature interned by `_emval_get_method_caller`.
pub(crate) struct EmvalMethod {
    /// `[0]` return type, `[1..]` argument types.
    pub arg_types: Vec<Rc<RegisteredType>>,
}

/// Emval tables: handles, interned symbols, globals, and the method cache.
pub(crate) struct EmvalState {
    slots: Vec<Slot>,
    free_list: Vec<usize>,
    /// Guest address → interned symbol string.
    symbols: HashMap<u32, String>,
    globals: Rc<RefCell<BTreeMap<String, Value>>>,
    pub methods: HashMap<i32, EmvalMethod>,
    pub method_ids: HashMap<String, i32>,
    pub method_count: i32,
}

impl EmvalState {
    pub fn new() -> Self {
        let sentinel = |value: Value| Slot::Live {
            payload: EmvalPayload::Value(value),
            refs: 1,
        };
        Self {
            slots: vec![
                Slot::Empty, // id 0: "no handle"
                sentinel(Value::Undefined),
                sentinel(Value::Null),
                sentinel(Value::Bool(true)),
                sentinel(Value::Bool(false)),
            ],
            free_list: Vec::new(),
            symbols: HashMap::new(),
            globals: Rc::new(RefCell::new(BTreeMap::new())),
            methods: HashMap::new(),
            method_ids: HashMap::new(),
            method_count: 0,
        }
    }

    fn alloc(&mut self, payload: EmvalPayload) -> i32 {
        let id = match self.free_list.pop() {
            Some(id) => {
                self.slots[id] = Slot::Live { payload, refs: 1 };
                id
            }
            None => {
                self.slots.push(Slot::Live { payload, refs: 1 });
                self.slots.len() - 1
            }
        };
        id as i32
    }

    /// A handle for a host value; the four small sentinels always map to
    /// their reserved ids.
    pub fn to_handle(&mut self, value: Value) -> i32 {
        match value {
            Value::Undefined => 1,
            Value::Null => 2,
            Value::Bool(true) => 3,
            Value::Bool(false) => 4,
            other => self.alloc(EmvalPayload::Value(other)),
        }
    }

    /// A handle holding a destructor list.
    pub fn to_handle_destructors(&mut self, list: Rc<RefCell<Vec<Destructor>>>) -> i32 {
        self.alloc(EmvalPayload::Destructors(list))
    }

    fn live_slot(&self, id: i32) -> EmbindResult<&Slot> {
        let slot = usize::try_from(id)
            .ok()
            .filter(|&i| i != 0)
            .and_then(|i| self.slots.get(i));
        match slot {
            Some(slot @ Slot::Live { .. }) => Ok(slot),
            _ => Err(EmbindError::binding(
                "emval",
                format!("no such handle {id}"),
            )),
        }
    }

    /// The host value behind a handle.
    pub fn to_value(&self, id: i32) -> EmbindResult<Value> {
        match self.live_slot(id)? {
            Slot::Live {
                payload: EmvalPayload::Value(value),
                ..
            } => Ok(value.clone()),
            _ => Err(EmbindError::internal(format!(
                "emval handle {id} holds a destructor list, not a value"
            ))),
        }
    }

    /// The destructor list behind a handle.
    pub fn destructor_list(&self, id: i32) -> EmbindResult<Rc<RefCell<Vec<Destructor>>>> {
        match self.live_slot(id)? {
            Slot::Live {
                payload: EmvalPayload::Destructors(list),
                ..
            } => Ok(Rc::clone(list)),
            _ => Err(EmbindError::internal(format!(
                "emval handle {id} does not hold a destructor list"
            ))),
        }
    }

    /// Bump a handle's refcount. A no-op for the reserved sentinels.
    pub fn incref(&mut self, id: i32) -> EmbindResult<()> {
        if (1..FIRST_DYNAMIC_HANDLE as i32).contains(&id) {
            return Ok(());
        }
        match usize::try_from(id)
            .ok()
            .filter(|&i| i != 0)
            .and_then(|i| self.slots.get_mut(i))
        {
            Some(Slot::Live { refs, .. }) => {
                *refs += 1;
                Ok(())
            }
            _ => Err(EmbindError::binding(
                "emval",
                format!("no such handle {id}"),
            )),
        }
    }

    /// Drop a reference; at zero the slot returns to the free list. A no-op
    /// for the reserved sentinels (the count never goes below zero).
    pub fn decref(&mut self, id: i32) -> EmbindResult<()> {
        if (1..FIRST_DYNAMIC_HANDLE as i32).contains(&id) {
            return Ok(());
        }
        let index = usize::try_from(id)
            .ok()
            .filter(|&i| i != 0)
            .ok_or_else(|| EmbindError::binding("emval", format!("no such handle {id}")))?;
        match self.slots.get_mut(index) {
            Some(slot @ Slot::Live { .. }) => {
                if let Slot::Live { refs, .. } = slot {
                    *refs -= 1;
                    if *refs == 0 {
                        *slot = Slot::Empty;
                        self.free_list.push(index);
                    }
                }
                Ok(())
            }
            _ => Err(EmbindError::binding(
                "emval",
                format!("no such handle {id}"),
            )),
        }
    }

    /// Live handles beyond the reserved sentinels.
    pub fn live_handles(&self) -> usize {
        self.slots[FIRST_DYNAMIC_HANDLE..]
            .iter()
            .filter(|slot| matches!(slot, Slot::Live { .. }))
            .count()
    }

    /// Intern a symbol read from guest memory at `address`.
    pub fn register_symbol(&mut self, address: u32, name: String) {
        self.symbols.insert(address, name);
    }

    /// A previously interned symbol.
    pub fn symbol(&self, address: u32) -> Option<&str> {
        self.symbols.get(&address).map(String::as_str)
    }

    /// The emval global scope storage.
    pub fn globals(&self) -> &Rc<RefCell<BTreeMap<String, Value>>> {
        &self.globals
    }
}

/// The emval global scope as a reflectable object, handed to the guest by
/// `_emval_get_global(0)`.
struct GlobalScope {
    map: Rc<RefCell<BTreeMap<String, Value>>>,
}

impl Reflect for GlobalScope {
    fn type_name(&self) -> &str {
        "global"
    }

    fn get(&self, property: &str) -> EmbindResult<Value> {
        Ok(self
            .map
            .borrow()
            .get(property)
            .cloned()
            .unwrap_or(Value::Undefined))
    }

    fn set(&self, property: &str, value: Value) -> EmbindResult<()> {
        self.map.borrow_mut().insert(property.to_string(), value);
        Ok(())
    }

    fn call(&self, method: &str, args: &[Value]) -> EmbindResult<Value> {
        let target = self.map.borrow().get(method).cloned();
        match target {
            Some(Value::Function(func)) => func.call(args),
            Some(other) => Err(EmbindError::binding(
                method,
                format!("global is not callable ({})", other.kind_name()),
            )),
            None => Err(EmbindError::binding(method, "no such global")),
        }
    }
}

impl Engine {
    /// Encode a host value as a fresh emval handle (the emval type codec).
    pub(crate) fn emval_to_wire(&self, value: Value) -> i32 {
        self.state_mut().emval.to_handle(value)
    }

    /// Decode an emval wire handle, consuming the reference the guest
    /// transferred with it.
    pub(crate) fn emval_from_wire(&self, id: i32) -> EmbindResult<Value> {
        let mut state = self.state_mut();
        let value = state.emval.to_value(id)?;
        state.emval.decref(id)?;
        Ok(value)
    }

    /// Read a string argument that may be an interned symbol address.
    pub(crate) fn string_or_symbol(
        &self,
        guest: &mut dyn Guest,
        address: u32,
    ) -> EmbindResult<String> {
        if let Some(symbol) = self.state().emval.symbol(address) {
            return Ok(symbol.to_string());
        }
        guest.read_c_string(address)
    }

    /// `_emval_take_value`: read a value of `raw_type` at `arg_ptr` and
    /// return a handle to it.
    pub fn emval_take_value(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        arg_ptr: u32,
    ) -> EmbindResult<i32> {
        let ty = self.require_registered_type(guest, raw_type, "_emval_take_value")?;
        let value = self.read_value_from_pointer(guest, &ty, arg_ptr)?;
        Ok(self.state_mut().emval.to_handle(value))
    }

    /// The host value behind a live emval handle.
    pub fn emval_value(&self, handle: i32) -> EmbindResult<Value> {
        self.state().emval.to_value(handle)
    }

    /// `_emval_incref`.
    pub fn emval_incref(&self, handle: i32) -> EmbindResult<()> {
        self.state_mut().emval.incref(handle)
    }

    /// `_emval_decref`.
    pub fn emval_decref(&self, handle: i32) -> EmbindResult<()> {
        self.state_mut().emval.decref(handle)
    }

    /// `_emval_register_symbol`: intern the C string at `address`.
    pub fn emval_register_symbol(&self, guest: &mut dyn Guest, address: u32) -> EmbindResult<()> {
        let name = guest.read_c_string(address)?;
        self.state_mut().emval.register_symbol(address, name);
        Ok(())
    }

    /// `_emval_get_global`: the global scope itself for address 0, one
    /// member otherwise (missing members are `undefined`).
    pub fn emval_get_global(&self, guest: &mut dyn Guest, name_ptr: u32) -> EmbindResult<i32> {
        let value = if name_ptr == 0 {
            let map = Rc::clone(self.state().emval.globals());
            Value::foreign(Rc::new(GlobalScope { map }))
        } else {
            let name = self.string_or_symbol(guest, name_ptr)?;
            let map = Rc::clone(self.state().emval.globals());
            let value = map.borrow().get(&name).cloned();
            value.unwrap_or(Value::Undefined)
        };
        Ok(self.state_mut().emval.to_handle(value))
    }

    /// `_emval_new_cstring`: a handle to the (possibly interned) string at
    /// `address`.
    pub fn emval_new_cstring(&self, guest: &mut dyn Guest, address: u32) -> EmbindResult<i32> {
        let name = self.string_or_symbol(guest, address)?;
        Ok(self.state_mut().emval.to_handle(Value::Str(name)))
    }

    /// `_emval_as`: encode the handle's value as `return_type`, parking the
    /// destructors behind a fresh handle written to `destructors_ref`.
    pub fn emval_as(
        &self,
        guest: &mut dyn Guest,
        handle: i32,
        return_type: i32,
        destructors_ref: u32,
    ) -> EmbindResult<f64> {
        let value = self.state().emval.to_value(handle)?;
        let ty = self.require_registered_type(guest, return_type, "emval::as")?;
        let mut destructors = Vec::new();
        let word = self.to_wire(guest, &ty, Some(&mut destructors), &value)?;
        let list_handle = self
            .state_mut()
            .emval
            .to_handle_destructors(Rc::new(RefCell::new(destructors)));
        guest.write_u32(destructors_ref, list_handle as u32)?;
        Ok(wire_to_abi_f64(&ty, word))
    }

    /// `_emval_run_destructors`: run and release a parked destructor list.
    pub fn emval_run_destructors(&self, guest: &mut dyn Guest, handle: i32) -> EmbindResult<()> {
        let list = self.state().emval.destructor_list(handle)?;
        run_destructors(guest, &list.borrow());
        self.state_mut().emval.decref(handle)
    }
}
