//! Narrow (`std::string`) and wide (`std::wstring`/`std::u16string`/
//! `std::u32string`) codecs.
//!
//! Both travel as a pointer to a `{ u32 length, payload }` block, where the
//! wire pointer is the header address and the length counts bytes for narrow
//! strings and code units for wide ones. Encoding allocates the block with
//! the guest's `malloc` and schedules a `free` of the header for after the
//! call.

use embind_types::{wire, EmbindError, EmbindResult, Value};

use crate::guest::Guest;
use crate::invoker::{free_destructor, Destructor};

/// Decode a narrow string: UTF-8 text for the `std::string` registration,
/// raw bytes otherwise. The guest block is owned by the wire value and is
/// freed once read.
pub(crate) fn narrow_from_wire(
    guest: &mut dyn Guest,
    utf8: bool,
    ptr: u32,
) -> EmbindResult<Value> {
    let len = guest.read_u32(ptr)?;
    let mut bytes = vec![0u8; len as usize];
    guest.read_bytes(ptr + 4, &mut bytes)?;
    guest.free(ptr)?;
    if utf8 {
        Ok(Value::Str(String::from_utf8_lossy(&bytes).into_owned()))
    } else {
        Ok(Value::Bytes(bytes))
    }
}

/// Encode a narrow string. Accepts text for the UTF-8 variant and either
/// text or raw bytes for the byte variant.
pub(crate) fn narrow_to_wire(
    guest: &mut dyn Guest,
    name: &str,
    utf8: bool,
    destructors: Option<&mut Vec<Destructor>>,
    value: &Value,
) -> EmbindResult<u64> {
    let bytes: &[u8] = match (value, utf8) {
        (Value::Str(s), _) => s.as_bytes(),
        (Value::Bytes(b), false) => b,
        _ => {
            return Err(EmbindError::binding(
                name,
                format!("expected a string value, got {}", value.kind_name()),
            ));
        }
    };

    let len = bytes.len() as u32;
    let base = guest.malloc(4 + len)?;
    guest.write_u32(base, len)?;
    guest.write_bytes(base + 4, bytes)?;
    if let Some(destructors) = destructors {
        destructors.push(free_destructor(base));
    }
    Ok(wire::encode_u32(base))
}

/// Decode a wide string with 2- or 4-byte code units.
pub(crate) fn wide_from_wire(
    guest: &mut dyn Guest,
    char_size: u32,
    ptr: u32,
) -> EmbindResult<Value> {
    let len = guest.read_u32(ptr)?;
    let data = ptr + 4;
    let text = match char_size {
        2 => {
            let mut units = Vec::with_capacity(len as usize);
            for i in 0..len {
                units.push(guest.read_u16(data + i * 2)?);
            }
            String::from_utf16_lossy(&units)
        }
        4 => {
            let mut text = String::with_capacity(len as usize);
            for i in 0..len {
                let unit = guest.read_u32(data + i * 4)?;
                text.push(char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER));
            }
            text
        }
        _ => {
            return Err(EmbindError::internal(format!(
                "unknown wide string char size {char_size}"
            )));
        }
    };
    guest.free(ptr)?;
    Ok(Value::Str(text))
}

/// Encode a wide string, NUL-terminated after the counted code units.
pub(crate) fn wide_to_wire(
    guest: &mut dyn Guest,
    name: &str,
    char_size: u32,
    destructors: Option<&mut Vec<Destructor>>,
    value: &Value,
) -> EmbindResult<u64> {
    let Some(text) = value.as_str() else {
        return Err(EmbindError::binding(
            name,
            format!("expected a string value, got {}", value.kind_name()),
        ));
    };

    let units: Vec<u32> = match char_size {
        2 => text.encode_utf16().map(u32::from).collect(),
        4 => text.chars().map(u32::from).collect(),
        _ => {
            return Err(EmbindError::internal(format!(
                "unknown wide string char size {char_size}"
            )));
        }
    };

    let len = units.len() as u32;
    let base = guest.malloc(4 + (len + 1) * char_size)?;
    guest.write_u32(base, len)?;
    let data = base + 4;
    for (i, unit) in units.iter().enumerate() {
        let at = data + i as u32 * char_size;
        if char_size == 2 {
            guest.write_bytes(at, &(*unit as u16).to_le_bytes())?;
        } else {
            guest.write_bytes(at, &unit.to_le_bytes())?;
        }
    }
    // NUL terminator.
    let nul_at = data + len * char_size;
    if char_size == 2 {
        guest.write_bytes(nul_at, &[0, 0])?;
    } else {
        guest.write_bytes(nul_at, &[0, 0, 0, 0])?;
    }

    if let Some(destructors) = destructors {
        destructors.push(free_destructor(base));
    }
    Ok(wire::encode_u32(base))
}
