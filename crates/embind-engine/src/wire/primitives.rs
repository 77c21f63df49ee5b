//! Codecs for `void`, booleans, sized integers, big integers, and floats.
//!
//! Integers are strict: the host value's width and signedness must match the
//! registered type; narrowing is never performed. Booleans are lenient on
//! decode (the ABI sends either 0/1 or the registered sentinels, so any
//! non-zero word is true) and exact on encode (the registered sentinel word).

use embind_types::{wire, EmbindError, EmbindResult, Value};

use crate::guest::Guest;

/// Width and signedness of a registered integer type.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IntWidth {
    pub size: u32,
    pub signed: bool,
}

impl IntWidth {
    /// Truncate a wire word to this width and widen it to `i64`.
    pub fn wire_to_i64(self, word: u64) -> i64 {
        match (self.size, self.signed) {
            (1, true) => i64::from(word as u8 as i8),
            (1, false) => i64::from(word as u8),
            (2, true) => i64::from(word as u16 as i16),
            (2, false) => i64::from(word as u16),
            (4, true) => i64::from(word as u32 as i32),
            _ => i64::from(word as u32),
        }
    }

    /// Encode an `i64` into a wire word of this width.
    pub fn i64_to_wire(self, value: i64) -> u64 {
        match self.size {
            1 => u64::from(value as u8),
            2 => u64::from(value as u16),
            _ => u64::from(value as u32),
        }
    }

    /// Read a value of this width from guest memory and widen it to `i64`.
    pub fn read_i64(self, guest: &mut dyn Guest, ptr: u32) -> EmbindResult<i64> {
        Ok(match (self.size, self.signed) {
            (1, true) => i64::from(guest.read_u8(ptr)? as i8),
            (1, false) => i64::from(guest.read_u8(ptr)?),
            (2, true) => i64::from(guest.read_u16(ptr)? as i16),
            (2, false) => i64::from(guest.read_u16(ptr)?),
            (4, true) => i64::from(guest.read_u32(ptr)? as i32),
            _ => i64::from(guest.read_u32(ptr)?),
        })
    }
}

fn kind_mismatch(name: &str, expected: &str, got: &Value) -> EmbindError {
    EmbindError::binding(
        name,
        format!("expected a {expected} value, got {}", got.kind_name()),
    )
}

/// Decode a wire word as a sized integer.
pub(crate) fn int_from_wire(width: IntWidth, word: u64) -> Value {
    match (width.size, width.signed) {
        (1, true) => Value::I8(word as u8 as i8),
        (1, false) => Value::U8(word as u8),
        (2, true) => Value::I16(word as u16 as i16),
        (2, false) => Value::U16(word as u16),
        (4, true) => Value::I32(word as u32 as i32),
        _ => Value::U32(word as u32),
    }
}

/// Encode a sized integer; the value's width and signedness must match.
pub(crate) fn int_to_wire(name: &str, width: IntWidth, value: &Value) -> EmbindResult<u64> {
    match (width.size, width.signed, value) {
        (1, true, Value::I8(v)) => Ok(u64::from(*v as u8)),
        (1, false, Value::U8(v)) => Ok(u64::from(*v)),
        (2, true, Value::I16(v)) => Ok(u64::from(*v as u16)),
        (2, false, Value::U16(v)) => Ok(u64::from(*v)),
        (4, true, Value::I32(v)) => Ok(wire::encode_i32(*v)),
        (4, false, Value::U32(v)) => Ok(wire::encode_u32(*v)),
        _ => {
            let expected = match (width.size, width.signed) {
                (1, true) => "signed 8-bit integer",
                (1, false) => "unsigned 8-bit integer",
                (2, true) => "signed 16-bit integer",
                (2, false) => "unsigned 16-bit integer",
                (4, true) => "signed 32-bit integer",
                _ => "unsigned 32-bit integer",
            };
            Err(kind_mismatch(name, expected, value))
        }
    }
}

/// Read a sized integer at a pointer.
pub(crate) fn int_read(guest: &mut dyn Guest, width: IntWidth, ptr: u32) -> EmbindResult<Value> {
    let raw = width.read_i64(guest, ptr)?;
    Ok(int_from_wire(width, width.i64_to_wire(raw)))
}

/// Decode a 64-bit integer wire word.
pub(crate) fn bigint_from_wire(signed: bool, word: u64) -> Value {
    if signed {
        Value::I64(wire::decode_i64(word))
    } else {
        Value::U64(word)
    }
}

/// Encode a 64-bit integer; signedness must match.
pub(crate) fn bigint_to_wire(name: &str, signed: bool, value: &Value) -> EmbindResult<u64> {
    match (signed, value) {
        (true, Value::I64(v)) => Ok(wire::encode_i64(*v)),
        (false, Value::U64(v)) => Ok(*v),
        _ => {
            let expected = if signed {
                "signed 64-bit integer"
            } else {
                "unsigned 64-bit integer"
            };
            Err(kind_mismatch(name, expected, value))
        }
    }
}

/// Decode a float wire word of the given size.
pub(crate) fn float_from_wire(size: u32, word: u64) -> Value {
    if size == 4 {
        Value::F32(wire::decode_f32(word))
    } else {
        Value::F64(wire::decode_f64(word))
    }
}

/// Encode a float. The other float width is converted (the way every number
/// reaches a `float` parameter in the ABI this mirrors); integers are not.
pub(crate) fn float_to_wire(name: &str, size: u32, value: &Value) -> EmbindResult<u64> {
    match (size, value) {
        (4, Value::F32(v)) => Ok(wire::encode_f32(*v)),
        (4, Value::F64(v)) => Ok(wire::encode_f32(*v as f32)),
        (8, Value::F64(v)) => Ok(wire::encode_f64(*v)),
        (8, Value::F32(v)) => Ok(wire::encode_f64(f64::from(*v))),
        _ => {
            let expected = if size == 4 { "32-bit float" } else { "64-bit float" };
            Err(kind_mismatch(name, expected, value))
        }
    }
}

/// Read a float at a pointer.
pub(crate) fn float_read(
    guest: &mut dyn Guest,
    size: u32,
    ptr: u32,
    name: &str,
) -> EmbindResult<Value> {
    match size {
        4 => Ok(Value::F32(guest.read_f32(ptr)?)),
        8 => Ok(Value::F64(guest.read_f64(ptr)?)),
        _ => Err(EmbindError::binding(
            name,
            format!("unknown float type size {size}"),
        )),
    }
}

/// Encode a boolean as the registered sentinel word.
pub(crate) fn bool_to_wire(
    name: &str,
    true_val: i32,
    false_val: i32,
    value: &Value,
) -> EmbindResult<u64> {
    match value.as_bool() {
        Some(true) => Ok(wire::encode_i32(true_val)),
        Some(false) => Ok(wire::encode_i32(false_val)),
        None => Err(kind_mismatch(name, "bool", value)),
    }
}

/// Read an unsigned value of `size` bytes, for boolean decoding.
pub(crate) fn read_unsigned_by_size(
    guest: &mut dyn Guest,
    size: u32,
    ptr: u32,
    name: &str,
) -> EmbindResult<u64> {
    match size {
        1 => Ok(u64::from(guest.read_u8(ptr)?)),
        2 => Ok(u64::from(guest.read_u16(ptr)?)),
        4 => Ok(u64::from(guest.read_u32(ptr)?)),
        _ => Err(EmbindError::binding(
            name,
            format!("unknown boolean type size {size}"),
        )),
    }
}
