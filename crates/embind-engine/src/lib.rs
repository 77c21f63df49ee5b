//! Host-side engine for Emscripten's embind and emval ABIs.
//!
//! A module compiled with `-lembind` declares its bound types, functions,
//! classes, enums, and constants by calling `_embind_register_*` imports
//! from its start function. This crate is everything behind those imports
//! except the WebAssembly runtime itself:
//!
//! - the type registry and dependency resolver (registrations arrive in any
//!   order; work is deferred until every dependency resolves),
//! - per-kind wire codecs for the 8-byte-slot ABI,
//! - the public-symbol table with arity-based overload routing,
//! - the invoker factory wrapping indirect guest calls,
//! - the emval handle table and method cache through which C++ reaches back
//!   into host values,
//! - the class/pointer subsystem (inheritance, up/downcasting, smart
//!   pointers, refcounted instance handles).
//!
//! The engine talks to the instantiated module through the [`Guest`] trait;
//! a runtime adapter (see the `embind-wasmi` crate) implements it and wires
//! the registration surface into the runtime's import mechanism.

mod classes;
mod emval;
mod emval_call;
mod engine;
mod guest;
mod invoker;
mod registration;
mod registry;
mod symbols;
pub mod testing;
mod wire;

pub use embind_types::{
    ClassHandle, EmbindError, EmbindResult, EnumValue, HostFunction, MemoryView, Reflect, Value,
    ViewKind,
};
pub use engine::Engine;
pub use guest::{Guest, EXPORT_FREE, EXPORT_GET_TYPE_NAME, EXPORT_MALLOC};
