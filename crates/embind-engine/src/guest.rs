//! The guest-module abstraction the engine runs against.
//!
//! The engine never talks to a WebAssembly runtime directly; it consumes a
//! [`Guest`]: byte-level access to linear memory, exported-function calls by
//! name, and indirect calls through the module's function table. Everything
//! else — little-endian scalars, C strings, the `malloc`/`free` pair, the
//! `__getTypeName` round trip — is layered on top as provided methods so that
//! adapters only implement the four primitives.
//!
//! Addresses never get cached across calls that can re-enter the guest:
//! memory growth would invalidate them.

use embind_types::{wire, EmbindError, EmbindResult};

/// Guest exports the engine relies on by name.
pub const EXPORT_MALLOC: &str = "malloc";
/// See [`EXPORT_MALLOC`].
pub const EXPORT_FREE: &str = "free";
/// See [`EXPORT_MALLOC`].
pub const EXPORT_GET_TYPE_NAME: &str = "__getTypeName";

/// Access to one instantiated guest module.
pub trait Guest {
    /// Read `out.len()` bytes starting at `ptr`.
    fn read_bytes(&mut self, ptr: u32, out: &mut [u8]) -> EmbindResult<()>;

    /// Write `bytes` starting at `ptr`.
    fn write_bytes(&mut self, ptr: u32, bytes: &[u8]) -> EmbindResult<()>;

    /// Call an exported function by name with raw wire words. Returns the
    /// first result, if the function has one.
    fn call_export(&mut self, name: &str, args: &[u64]) -> EmbindResult<Option<u64>>;

    /// Call through the indirect function table with raw wire words.
    fn call_table(&mut self, index: u32, args: &[u64]) -> EmbindResult<Option<u64>>;

    /// Read one little-endian byte.
    fn read_u8(&mut self, ptr: u32) -> EmbindResult<u8> {
        let mut buf = [0u8; 1];
        self.read_bytes(ptr, &mut buf)?;
        Ok(buf[0])
    }

    /// Read a little-endian `u16`.
    fn read_u16(&mut self, ptr: u32) -> EmbindResult<u16> {
        let mut buf = [0u8; 2];
        self.read_bytes(ptr, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Read a little-endian `u32`.
    fn read_u32(&mut self, ptr: u32) -> EmbindResult<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(ptr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Read a little-endian `u64`.
    fn read_u64(&mut self, ptr: u32) -> EmbindResult<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(ptr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a little-endian `f32`.
    fn read_f32(&mut self, ptr: u32) -> EmbindResult<f32> {
        Ok(f32::from_bits(self.read_u32(ptr)?))
    }

    /// Read a little-endian `f64`.
    fn read_f64(&mut self, ptr: u32) -> EmbindResult<f64> {
        Ok(f64::from_bits(self.read_u64(ptr)?))
    }

    /// Write a little-endian `u32`.
    fn write_u32(&mut self, ptr: u32, value: u32) -> EmbindResult<()> {
        self.write_bytes(ptr, &value.to_le_bytes())
    }

    /// Read a NUL-terminated C string.
    fn read_c_string(&mut self, ptr: u32) -> EmbindResult<String> {
        let mut bytes = Vec::new();
        let mut addr = ptr;
        loop {
            let b = self.read_u8(addr)?;
            if b == 0 {
                break;
            }
            bytes.push(b);
            addr += 1;
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read `count` consecutive little-endian `i32`s (the ABI's raw-type-id
    /// vectors).
    fn read_i32_vec(&mut self, ptr: u32, count: u32) -> EmbindResult<Vec<i32>> {
        let mut out = Vec::with_capacity(count as usize);
        for i in 0..count {
            out.push(self.read_u32(ptr + i * 4)? as i32);
        }
        Ok(out)
    }

    /// Allocate `size` bytes in the guest via its `malloc` export.
    fn malloc(&mut self, size: u32) -> EmbindResult<u32> {
        let res = self
            .call_export(EXPORT_MALLOC, &[wire::encode_u32(size)])?
            .ok_or_else(|| EmbindError::internal("malloc returned no value"))?;
        let ptr = wire::decode_u32(res);
        if ptr == 0 {
            return Err(EmbindError::internal(format!(
                "guest malloc failed for {size} bytes"
            )));
        }
        Ok(ptr)
    }

    /// Free a guest allocation via its `free` export.
    fn free(&mut self, ptr: u32) -> EmbindResult<()> {
        self.call_export(EXPORT_FREE, &[wire::encode_u32(ptr)])?;
        Ok(())
    }

    /// Ask the guest for the C++ name of a raw type id: calls
    /// `__getTypeName`, reads the returned C string, then frees it.
    fn type_name(&mut self, type_id: i32) -> EmbindResult<String> {
        let res = self
            .call_export(EXPORT_GET_TYPE_NAME, &[wire::encode_i32(type_id)])?
            .ok_or_else(|| EmbindError::internal("__getTypeName returned no value"))?;
        let ptr = wire::decode_u32(res);
        let name = self.read_c_string(ptr)?;
        self.free(ptr)?;
        Ok(name)
    }

    /// Call a table function and require a result.
    fn call_table_expect(&mut self, index: u32, args: &[u64]) -> EmbindResult<u64> {
        self.call_table(index, args)?.ok_or_else(|| {
            EmbindError::internal(format!("table function {index} returned no value"))
        })
    }
}
