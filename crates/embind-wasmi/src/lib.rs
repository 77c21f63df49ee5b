//! wasmi adapter for the embind host engine.
//!
//! Wires the engine into a [`wasmi::Linker`] as the `env` imports a module
//! compiled with `-lembind` expects, and gives the host a way to call bound
//! functions once the module is instantiated.
//!
//! # Usage
//!
//! ```no_run
//! use embind_wasmi::{Binding, EmbindHost};
//!
//! struct HostState {
//!     embind: Binding,
//! }
//!
//! impl EmbindHost for HostState {
//!     fn embind(&self) -> &Binding {
//!         &self.embind
//!     }
//!     fn embind_mut(&mut self) -> &mut Binding {
//!         &mut self.embind
//!     }
//! }
//!
//! # fn run(wasm: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = wasmi::Engine::default();
//! let module = wasmi::Module::new(&engine, wasm)?;
//! let mut store = wasmi::Store::new(
//!     &engine,
//!     HostState { embind: Binding::new(embind_engine::Engine::new()) },
//! );
//! let mut linker = <wasmi::Linker<HostState>>::new(&engine);
//! embind_wasmi::register_imports(&mut linker)?;
//!
//! // Registrations run from the module's start function.
//! let instance = linker.instantiate(&mut store, &module)?.start(&mut store)?;
//! embind_wasmi::bind_instance(&mut store, instance)?;
//!
//! let sum = embind_wasmi::call_function(
//!     &mut store,
//!     "add",
//!     &[embind_engine::Value::I32(1), embind_engine::Value::I32(2)],
//! )?;
//! # let _ = sum;
//! # Ok(())
//! # }
//! ```

mod guest;
mod imports;

use std::collections::HashMap;

use embind_engine::{EmbindError, EmbindResult, Engine, Guest, Value};
use wasmi::{Instance, Memory, Store, Table};

pub use guest::WasmiGuest;
pub use imports::register_imports;

/// The engine plus cached instance handles, stored inside the wasmi store
/// data. This is the "context value keyed by a distinguished sentinel" of
/// the original design: every host import reaches the engine through it.
pub struct Binding {
    engine: Engine,
    pub(crate) instance: Option<Instance>,
    pub(crate) memory: Option<Memory>,
    pub(crate) table: Option<Table>,
    pub(crate) export_funcs: HashMap<String, wasmi::Func>,
    pub(crate) table_funcs: HashMap<u32, wasmi::Func>,
}

impl Binding {
    /// A binding for a fresh engine.
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            instance: None,
            memory: None,
            table: None,
            export_funcs: HashMap::new(),
            table_funcs: HashMap::new(),
        }
    }

    /// The engine behind this binding.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

/// Store data that carries a [`Binding`].
pub trait EmbindHost: 'static {
    /// Shared access to the binding.
    fn embind(&self) -> &Binding;
    /// Mutable access to the binding.
    fn embind_mut(&mut self) -> &mut Binding;
}

/// Bind the engine to the instantiated module. Call once after `start` has
/// run; binding a second instance to the same engine fails.
pub fn bind_instance<T: EmbindHost>(
    store: &mut Store<T>,
    instance: Instance,
) -> EmbindResult<()> {
    let binding = store.data_mut().embind_mut();
    if binding.instance.is_some() {
        return Err(EmbindError::internal(
            "engine is already bound to a module instance",
        ));
    }
    binding.instance = Some(instance);
    Ok(())
}

fn bound_instance<T: EmbindHost>(store: &Store<T>) -> EmbindResult<Instance> {
    store.data().embind().instance.ok_or_else(|| {
        EmbindError::internal("engine is not bound to a module instance; call bind_instance first")
    })
}

/// Run `f` with the engine and a guest view over the bound instance. The
/// escape hatch for host-side operations beyond [`call_function`] (class
/// methods, properties, handle lifecycle).
pub fn with_guest<T: EmbindHost, R>(
    store: &mut Store<T>,
    f: impl FnOnce(&Engine, &mut dyn Guest) -> EmbindResult<R>,
) -> EmbindResult<R> {
    let engine = store.data().embind().engine().clone();
    let instance = bound_instance(store)?;
    let mut guest = WasmiGuest::from_store(store, instance);
    f(&engine, &mut guest)
}

/// Invoke a bound public symbol by name.
pub fn call_function<T: EmbindHost>(
    store: &mut Store<T>,
    name: &str,
    args: &[Value],
) -> EmbindResult<Value> {
    with_guest(store, |engine, guest| engine.call_function(guest, name, args))
}

/// Invoke a bound instance method on a class handle.
pub fn call_method<T: EmbindHost>(
    store: &mut Store<T>,
    this: &Value,
    name: &str,
    args: &[Value],
) -> EmbindResult<Value> {
    with_guest(store, |engine, guest| engine.call_method(guest, this, name, args))
}

/// Drop one reference to a class handle, destroying the instance on the
/// last one.
pub fn delete_handle<T: EmbindHost>(store: &mut Store<T>, handle: &Value) -> EmbindResult<()> {
    with_guest(store, |engine, guest| engine.delete_handle(guest, handle))
}
