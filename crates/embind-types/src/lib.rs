//! Shared types for the embind host engine.
//!
//! This crate defines the host [`Value`] model, the error types, the
//! wire-word helpers, and the [`Reflect`] capability trait used across all
//! engine layers.

mod error;
mod reflect;
mod value;
pub mod wire;

pub use error::{EmbindError, EmbindResult};
pub use reflect::Reflect;
pub use value::{
    ArrayRef, ClassHandle, ClassId, EnumValue, ForeignRef, HostFunction, InstanceRecord,
    MemoryView, ObjectRef, PtrId, Value, ViewKind,
};
