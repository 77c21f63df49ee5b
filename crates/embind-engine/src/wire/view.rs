//! Memory-view decoding: a typed window into guest memory.
//!
//! The wire value points at `{ u32 element_count, u32 data_ptr }`. The view
//! records the element kind and location only; element reads go back through
//! the guest so the data is never copied and memory growth cannot strand a
//! stale buffer.

use embind_types::{EmbindResult, MemoryView, Value, ViewKind};

use crate::engine::Engine;
use crate::guest::Guest;

/// Decode the `{ count, data }` header into a [`MemoryView`].
pub(crate) fn view_from_wire(
    guest: &mut dyn Guest,
    kind: ViewKind,
    ptr: u32,
) -> EmbindResult<Value> {
    let len = guest.read_u32(ptr)?;
    let data = guest.read_u32(ptr + 4)?;
    Ok(Value::View(MemoryView {
        kind,
        ptr: data,
        len,
    }))
}

impl Engine {
    /// Materialize the elements of a view as host values.
    pub fn read_memory_view(
        &self,
        guest: &mut dyn Guest,
        view: &MemoryView,
    ) -> EmbindResult<Vec<Value>> {
        let mut out = Vec::with_capacity(view.len as usize);
        let stride = view.kind.element_size();
        for i in 0..view.len {
            let at = view.ptr + i * stride;
            out.push(match view.kind {
                ViewKind::I8 => Value::I8(guest.read_u8(at)? as i8),
                ViewKind::U8 => Value::U8(guest.read_u8(at)?),
                ViewKind::I16 => Value::I16(guest.read_u16(at)? as i16),
                ViewKind::U16 => Value::U16(guest.read_u16(at)?),
                ViewKind::I32 => Value::I32(guest.read_u32(at)? as i32),
                ViewKind::U32 => Value::U32(guest.read_u32(at)?),
                ViewKind::F32 => Value::F32(guest.read_f32(at)?),
                ViewKind::F64 => Value::F64(guest.read_f64(at)?),
                ViewKind::I64 => Value::I64(guest.read_u64(at)? as i64),
                ViewKind::U64 => Value::U64(guest.read_u64(at)?),
            });
        }
        Ok(out)
    }
}
