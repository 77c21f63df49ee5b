//! Wire codecs: the registered-type model and per-kind marshalling.
//!
//! Every registered type is a [`RegisteredType`]: its raw id, its C++ name,
//! how many bytes it advances an argument pack (one 8-byte slot for
//! everything except `void`), and a sealed [`TypeKind`] selecting the codec.
//! The four codec operations — decode a wire word, encode into a wire word,
//! read a value a pointer points at, destroy a wire value — dispatch on the
//! kind here and live with their kind in the submodules.

pub(crate) mod class_ptr;
pub(crate) mod composite;
pub(crate) mod enums;
pub(crate) mod primitives;
pub(crate) mod strings;
pub(crate) mod view;

use std::rc::Rc;

use embind_types::{wire, EmbindResult, PtrId, Value, ViewKind};

use crate::engine::Engine;
use crate::guest::Guest;
use crate::invoker::Destructor;

pub(crate) use composite::{ObjectType, TupleType};
pub(crate) use primitives::IntWidth;

/// Sealed variant selecting a codec.
#[derive(Clone)]
pub(crate) enum TypeKind {
    Void,
    Bool {
        size: u32,
        true_val: i32,
        false_val: i32,
    },
    Int(IntWidth),
    BigInt {
        signed: bool,
    },
    Float {
        size: u32,
    },
    /// Narrow `std::string`; `utf8` when the registered name is exactly the
    /// UTF-8 variant, raw bytes otherwise.
    StdString {
        utf8: bool,
    },
    /// Wide string with 2- or 4-byte code units.
    WString {
        char_size: u32,
    },
    Emval,
    MemoryView {
        kind: ViewKind,
    },
    /// Index into the engine's enum arena.
    Enum(usize),
    Tuple(Rc<TupleType>),
    Object(Rc<ObjectType>),
    ClassPointer(PtrId),
}

/// A type interned in the registry.
#[derive(Clone)]
pub(crate) struct RegisteredType {
    pub raw_type: i32,
    pub name: String,
    /// Wire slots one value consumes in an argument pack; 8 for everything
    /// except `void`.
    pub arg_pack_advance: u32,
    pub kind: TypeKind,
}

impl RegisteredType {
    pub fn new(raw_type: i32, name: String, kind: TypeKind) -> Self {
        let arg_pack_advance = match kind {
            TypeKind::Void => 0,
            _ => 8,
        };
        Self {
            raw_type,
            name,
            arg_pack_advance,
            kind,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }

    /// True when encoding this type can schedule a destructor, which forces
    /// the invoker onto the dynamic destructor stack.
    pub fn has_destructor(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::StdString { .. }
                | TypeKind::WString { .. }
                | TypeKind::Tuple(_)
                | TypeKind::Object(_)
        )
    }

    /// Destroy one wire value of this type. Only meaningful for the kinds
    /// reporting [`Self::has_destructor`]; failures are logged, not raised.
    pub fn run_wire_destructor(&self, guest: &mut dyn Guest, word: u64) {
        let destructor = match &self.kind {
            TypeKind::StdString { .. } | TypeKind::WString { .. } => {
                Some(crate::invoker::free_destructor(wire::decode_u32(word)))
            }
            TypeKind::Tuple(tuple) => Some(Destructor::Table {
                index: tuple.raw_destructor,
                args: vec![wire::encode_u32(wire::decode_u32(word))],
            }),
            TypeKind::Object(object) => Some(Destructor::Table {
                index: object.raw_destructor,
                args: vec![wire::encode_u32(wire::decode_u32(word))],
            }),
            _ => None,
        };
        if let Some(destructor) = destructor {
            crate::invoker::run_destructors(guest, &[destructor]);
        }
    }
}

/// Convert a wire word to the `f64` the `_emval_as`/`_emval_call_method`
/// ABI returns: bit-faithful for float types, numeric for everything backed
/// by an integer word (pointers, handles, ints, enums, bools).
pub(crate) fn wire_to_abi_f64(ty: &RegisteredType, word: u64) -> f64 {
    match &ty.kind {
        TypeKind::Float { size: 8 } => wire::decode_f64(word),
        TypeKind::Float { .. } => f64::from(wire::decode_f32(word)),
        TypeKind::BigInt { signed: true } => wire::decode_i64(word) as f64,
        TypeKind::BigInt { signed: false } => word as f64,
        TypeKind::Int(width) if width.signed => f64::from(wire::decode_i32(word)),
        _ => f64::from(wire::decode_u32(word)),
    }
}

impl Engine {
    /// Decode a wire word into a host value.
    pub(crate) fn from_wire(
        &self,
        guest: &mut dyn Guest,
        ty: &RegisteredType,
        word: u64,
    ) -> EmbindResult<Value> {
        match &ty.kind {
            TypeKind::Void => Ok(Value::Undefined),
            TypeKind::Bool { .. } => Ok(Value::Bool(word != 0)),
            TypeKind::Int(width) => Ok(primitives::int_from_wire(*width, word)),
            TypeKind::BigInt { signed } => Ok(primitives::bigint_from_wire(*signed, word)),
            TypeKind::Float { size } => Ok(primitives::float_from_wire(*size, word)),
            TypeKind::StdString { utf8 } => {
                strings::narrow_from_wire(guest, *utf8, wire::decode_u32(word))
            }
            TypeKind::WString { char_size } => {
                strings::wide_from_wire(guest, *char_size, wire::decode_u32(word))
            }
            TypeKind::Emval => self.emval_from_wire(wire::decode_i32(word)),
            TypeKind::MemoryView { kind } => {
                view::view_from_wire(guest, *kind, wire::decode_u32(word))
            }
            TypeKind::Enum(enum_id) => self.enum_from_wire(guest, &ty.name, *enum_id, word),
            TypeKind::Tuple(tuple) => {
                self.tuple_from_wire(guest, tuple, wire::decode_u32(word))
            }
            TypeKind::Object(object) => {
                self.object_from_wire(guest, object, wire::decode_u32(word))
            }
            TypeKind::ClassPointer(ptr_id) => {
                self.pointer_from_wire(guest, *ptr_id, wire::decode_u32(word))
            }
        }
    }

    /// Encode a host value into a wire word, scheduling destructors for
    /// anything allocated in the guest on the way.
    pub(crate) fn to_wire(
        &self,
        guest: &mut dyn Guest,
        ty: &RegisteredType,
        destructors: Option<&mut Vec<Destructor>>,
        value: &Value,
    ) -> EmbindResult<u64> {
        match &ty.kind {
            TypeKind::Void => Err(embind_types::EmbindError::binding(
                ty.name.clone(),
                "void cannot be passed as an argument",
            )),
            TypeKind::Bool {
                true_val,
                false_val,
                ..
            } => primitives::bool_to_wire(&ty.name, *true_val, *false_val, value),
            TypeKind::Int(width) => primitives::int_to_wire(&ty.name, *width, value),
            TypeKind::BigInt { signed } => primitives::bigint_to_wire(&ty.name, *signed, value),
            TypeKind::Float { size } => primitives::float_to_wire(&ty.name, *size, value),
            TypeKind::StdString { utf8 } => {
                strings::narrow_to_wire(guest, &ty.name, *utf8, destructors, value)
            }
            TypeKind::WString { char_size } => {
                strings::wide_to_wire(guest, &ty.name, *char_size, destructors, value)
            }
            TypeKind::Emval => Ok(wire::encode_i32(self.emval_to_wire(value.clone()))),
            TypeKind::MemoryView { .. } => Err(embind_types::EmbindError::binding(
                ty.name.clone(),
                "memory views cannot be passed to the guest",
            )),
            TypeKind::Enum(enum_id) => self.enum_to_wire(&ty.name, *enum_id, value),
            TypeKind::Tuple(tuple) => self
                .tuple_to_wire(guest, &ty.name, tuple, destructors, value)
                .map(wire::encode_u32),
            TypeKind::Object(object) => self
                .object_to_wire(guest, &ty.name, object, destructors, value)
                .map(wire::encode_u32),
            TypeKind::ClassPointer(ptr_id) => self
                .pointer_to_wire(guest, *ptr_id, destructors, value)
                .map(wire::encode_u32),
        }
    }

    /// Read a value of this type from a pointer into guest memory: primitives
    /// read their native width, everything else reads a pointer-sized word
    /// and decodes it as a wire value.
    pub(crate) fn read_value_from_pointer(
        &self,
        guest: &mut dyn Guest,
        ty: &RegisteredType,
        ptr: u32,
    ) -> EmbindResult<Value> {
        match &ty.kind {
            TypeKind::Bool { size, .. } => {
                let raw = primitives::read_unsigned_by_size(guest, *size, ptr, &ty.name)?;
                Ok(Value::Bool(raw != 0))
            }
            TypeKind::Int(width) => primitives::int_read(guest, *width, ptr),
            TypeKind::BigInt { signed } => {
                let word = guest.read_u64(ptr)?;
                Ok(primitives::bigint_from_wire(*signed, word))
            }
            TypeKind::Float { size } => primitives::float_read(guest, *size, ptr, &ty.name),
            TypeKind::Enum(enum_id) => {
                let raw = self.enum_read_raw(guest, *enum_id, ptr)?;
                self.enum_lookup_by_value(&ty.name, *enum_id, raw)
            }
            _ => {
                let word = wire::encode_u32(guest.read_u32(ptr)?);
                self.from_wire(guest, ty, word)
            }
        }
    }
}
