//! The [`Guest`] implementation over a live wasmi instance.
//!
//! Two access paths exist: inside a host import the engine works through the
//! wasmi [`Caller`]; for host-initiated calls it works through the store and
//! the bound [`Instance`]. Resolved export handles (memory, the indirect
//! table, `malloc`/`free`/`__getTypeName`, table functions) are cached in
//! the [`Binding`] living in the store data — the handles are stable even
//! when memory grows, so only addresses are re-read, never cached.

use embind_engine::{EmbindError, EmbindResult, Guest};
use wasmi::core::{Trap, ValueType, F32, F64};
use wasmi::{Caller, Extern, Func, Instance, Memory, Store, Table, Value};

use crate::{Binding, EmbindHost};

enum GuestRef<'a, 'c, T> {
    Caller(&'a mut Caller<'c, T>),
    Store(&'a mut Store<T>, Instance),
}

/// Engine-facing view of one wasmi instance.
pub struct WasmiGuest<'a, 'c, T: EmbindHost> {
    inner: GuestRef<'a, 'c, T>,
}

impl<'a, 'c, T: EmbindHost> WasmiGuest<'a, 'c, T> {
    /// View through a host-import [`Caller`].
    pub fn from_caller(caller: &'a mut Caller<'c, T>) -> Self {
        Self {
            inner: GuestRef::Caller(caller),
        }
    }

    /// View through the store and the bound instance.
    pub fn from_store(store: &'a mut Store<T>, instance: Instance) -> Self {
        Self {
            inner: GuestRef::Store(store, instance),
        }
    }

    fn binding(&mut self) -> &mut Binding {
        match &mut self.inner {
            GuestRef::Caller(caller) => caller.data_mut().embind_mut(),
            GuestRef::Store(store, _) => store.data_mut().embind_mut(),
        }
    }

    fn get_export(&mut self, name: &str) -> Option<Extern> {
        match &mut self.inner {
            GuestRef::Caller(caller) => caller.get_export(name),
            GuestRef::Store(store, instance) => instance.get_export(&mut **store, name),
        }
    }

    fn memory(&mut self) -> EmbindResult<Memory> {
        if let Some(memory) = self.binding().memory {
            return Ok(memory);
        }
        let memory = self
            .get_export("memory")
            .and_then(Extern::into_memory)
            .ok_or_else(|| EmbindError::internal("guest module does not export 'memory'"))?;
        self.binding().memory = Some(memory);
        Ok(memory)
    }

    fn table(&mut self) -> EmbindResult<Table> {
        if let Some(table) = self.binding().table {
            return Ok(table);
        }
        let table = self
            .get_export("__indirect_function_table")
            .and_then(Extern::into_table)
            .ok_or_else(|| {
                EmbindError::internal("guest module does not export '__indirect_function_table'")
            })?;
        self.binding().table = Some(table);
        Ok(table)
    }

    fn export_func(&mut self, name: &str) -> EmbindResult<Func> {
        if let Some(func) = self.binding().export_funcs.get(name) {
            return Ok(*func);
        }
        let func = self
            .get_export(name)
            .and_then(Extern::into_func)
            .ok_or_else(|| {
                EmbindError::internal(format!("guest module does not export '{name}'"))
            })?;
        self.binding().export_funcs.insert(name.to_string(), func);
        Ok(func)
    }

    fn table_func(&mut self, index: u32) -> EmbindResult<Func> {
        if let Some(func) = self.binding().table_funcs.get(&index) {
            return Ok(*func);
        }
        let table = self.table()?;
        let value = match &self.inner {
            GuestRef::Caller(caller) => table.get(&**caller, index),
            GuestRef::Store(store, _) => table.get(&**store, index),
        };
        let func = match value {
            Some(Value::FuncRef(func_ref)) => func_ref.func().copied().ok_or_else(|| {
                EmbindError::internal(format!("table slot {index} holds a null funcref"))
            })?,
            _ => {
                return Err(EmbindError::internal(format!(
                    "table slot {index} does not hold a funcref"
                )));
            }
        };
        self.binding().table_funcs.insert(index, func);
        Ok(func)
    }

    /// Call a wasmi function with raw wire words, coercing each word to the
    /// callee's parameter types and the (optional) result back into a word.
    /// Traps surface as [`EmbindError::Cpp`]: uncaught guest exceptions are
    /// the only expected source once a module is running.
    fn call_func(&mut self, func: Func, args: &[u64]) -> EmbindResult<Option<u64>> {
        let ty = match &self.inner {
            GuestRef::Caller(caller) => func.ty(&**caller),
            GuestRef::Store(store, _) => func.ty(&**store),
        };
        let params = ty.params();
        if params.len() != args.len() {
            return Err(EmbindError::internal(format!(
                "guest function expects {} arguments, got {}",
                params.len(),
                args.len()
            )));
        }
        let inputs: Vec<Value> = params
            .iter()
            .zip(args)
            .map(|(param, &word)| match param {
                ValueType::I32 => Value::I32(word as u32 as i32),
                ValueType::I64 => Value::I64(word as i64),
                ValueType::F32 => Value::F32(F32::from_bits(word as u32)),
                ValueType::F64 => Value::F64(F64::from_bits(word)),
                ValueType::FuncRef | ValueType::ExternRef => Value::I32(word as u32 as i32),
            })
            .collect();
        let mut outputs = vec![Value::I32(0); ty.results().len()];

        let result = match &mut self.inner {
            GuestRef::Caller(caller) => func.call(&mut **caller, &inputs, &mut outputs),
            GuestRef::Store(store, _) => func.call(&mut **store, &inputs, &mut outputs),
        };
        result.map_err(|err| EmbindError::Cpp(err.to_string()))?;

        Ok(outputs.first().map(|value| match value {
            Value::I32(v) => *v as u32 as u64,
            Value::I64(v) => *v as u64,
            Value::F32(v) => u64::from(v.to_bits()),
            Value::F64(v) => v.to_bits(),
            Value::FuncRef(_) | Value::ExternRef(_) => 0,
        }))
    }
}

impl<T: EmbindHost> Guest for WasmiGuest<'_, '_, T> {
    fn read_bytes(&mut self, ptr: u32, out: &mut [u8]) -> EmbindResult<()> {
        let memory = self.memory()?;
        let result = match &self.inner {
            GuestRef::Caller(caller) => memory.read(&**caller, ptr as usize, out),
            GuestRef::Store(store, _) => memory.read(&**store, ptr as usize, out),
        };
        result.map_err(|err| EmbindError::internal(format!("memory read at {ptr} failed: {err}")))
    }

    fn write_bytes(&mut self, ptr: u32, bytes: &[u8]) -> EmbindResult<()> {
        let memory = self.memory()?;
        let result = match &mut self.inner {
            GuestRef::Caller(caller) => memory.write(&mut **caller, ptr as usize, bytes),
            GuestRef::Store(store, _) => memory.write(&mut **store, ptr as usize, bytes),
        };
        result.map_err(|err| EmbindError::internal(format!("memory write at {ptr} failed: {err}")))
    }

    fn call_export(&mut self, name: &str, args: &[u64]) -> EmbindResult<Option<u64>> {
        let func = self.export_func(name)?;
        self.call_func(func, args)
    }

    fn call_table(&mut self, index: u32, args: &[u64]) -> EmbindResult<Option<u64>> {
        let func = self.table_func(index)?;
        self.call_func(func, args)
    }
}

/// Convert an engine error into a wasmi trap for the host-import boundary.
pub(crate) fn into_trap(err: EmbindError) -> Trap {
    Trap::new(err.to_string())
}
