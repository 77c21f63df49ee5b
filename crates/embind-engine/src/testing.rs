//! Scriptable guest module for engine tests.
//!
//! [`MockGuest`] implements [`Guest`] over a plain byte vector with a bump
//! allocator, a `__getTypeName` backed by a type-id table, and closure-backed
//! exports and table functions. Every guest call is appended to a log so
//! tests can assert call ordering (constructor before writers before the
//! invoker before the destructor, and so on).

use std::collections::HashMap;

use embind_types::{wire, EmbindError, EmbindResult};

use crate::guest::Guest;

/// The mock guest's memory, allocator, and bookkeeping, split from the
/// function tables so closures can borrow it while being invoked.
pub struct MockMemory {
    pub bytes: Vec<u8>,
    heap_top: u32,
    type_names: HashMap<i32, String>,
    /// Chronological record of every export and table call.
    pub log: Vec<String>,
}

impl MockMemory {
    fn check(&self, ptr: u32, len: usize) -> EmbindResult<()> {
        if ptr as usize + len > self.bytes.len() {
            return Err(EmbindError::internal(format!(
                "memory access out of bounds: {ptr}+{len}"
            )));
        }
        Ok(())
    }

    /// Bump-allocate `size` bytes, 8-aligned.
    pub fn alloc(&mut self, size: u32) -> u32 {
        let ptr = self.heap_top;
        self.heap_top += (size + 7) & !7;
        assert!(
            (self.heap_top as usize) <= self.bytes.len(),
            "mock guest heap exhausted"
        );
        ptr
    }

    /// Plant a NUL-terminated C string and return its address.
    pub fn cstr(&mut self, s: &str) -> u32 {
        let ptr = self.alloc(s.len() as u32 + 1);
        self.bytes[ptr as usize..ptr as usize + s.len()].copy_from_slice(s.as_bytes());
        self.bytes[ptr as usize + s.len()] = 0;
        ptr
    }

    /// Plant a little-endian i32 vector (raw type id lists) and return its
    /// address.
    pub fn i32_vec(&mut self, values: &[i32]) -> u32 {
        let ptr = self.alloc(values.len() as u32 * 4);
        for (i, v) in values.iter().enumerate() {
            self.write_u32_at(ptr + i as u32 * 4, *v as u32);
        }
        ptr
    }

    /// Write a little-endian u32 without bounds ceremony (test setup only).
    pub fn write_u32_at(&mut self, ptr: u32, value: u32) {
        self.bytes[ptr as usize..ptr as usize + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Write a little-endian u64.
    pub fn write_u64_at(&mut self, ptr: u32, value: u64) {
        self.bytes[ptr as usize..ptr as usize + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Read a little-endian u32.
    pub fn read_u32_at(&self, ptr: u32) -> u32 {
        u32::from_le_bytes(
            self.bytes[ptr as usize..ptr as usize + 4]
                .try_into()
                .unwrap(),
        )
    }
}

/// A closure-backed export or table function.
pub type MockFn = Box<dyn FnMut(&mut MockMemory, &[u64]) -> EmbindResult<Option<u64>>>;

/// A scriptable in-memory guest module.
pub struct MockGuest {
    pub mem: MockMemory,
    exports: HashMap<String, MockFn>,
    table: HashMap<u32, MockFn>,
}

impl Default for MockGuest {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGuest {
    /// A guest with 64 KiB of memory and a heap starting past address 8.
    pub fn new() -> Self {
        Self {
            mem: MockMemory {
                bytes: vec![0; 64 * 1024],
                heap_top: 8,
                type_names: HashMap::new(),
                log: Vec::new(),
            },
            exports: HashMap::new(),
            table: HashMap::new(),
        }
    }

    /// Teach `__getTypeName` the C++ name of a raw type id.
    pub fn set_type_name(&mut self, type_id: i32, name: &str) {
        self.mem.type_names.insert(type_id, name.to_string());
    }

    /// Install an export under `name`.
    pub fn add_export(
        &mut self,
        name: &str,
        func: impl FnMut(&mut MockMemory, &[u64]) -> EmbindResult<Option<u64>> + 'static,
    ) {
        self.exports.insert(name.to_string(), Box::new(func));
    }

    /// Install a table function at `index`.
    pub fn add_table_fn(
        &mut self,
        index: u32,
        func: impl FnMut(&mut MockMemory, &[u64]) -> EmbindResult<Option<u64>> + 'static,
    ) {
        self.table.insert(index, Box::new(func));
    }

    /// The call log accumulated so far.
    pub fn log(&self) -> &[String] {
        &self.mem.log
    }

    /// Clear the call log.
    pub fn clear_log(&mut self) {
        self.mem.log.clear();
    }
}

impl Guest for MockGuest {
    fn read_bytes(&mut self, ptr: u32, out: &mut [u8]) -> EmbindResult<()> {
        self.mem.check(ptr, out.len())?;
        out.copy_from_slice(&self.mem.bytes[ptr as usize..ptr as usize + out.len()]);
        Ok(())
    }

    fn write_bytes(&mut self, ptr: u32, bytes: &[u8]) -> EmbindResult<()> {
        self.mem.check(ptr, bytes.len())?;
        self.mem.bytes[ptr as usize..ptr as usize + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn call_export(&mut self, name: &str, args: &[u64]) -> EmbindResult<Option<u64>> {
        self.mem.log.push(format!("export:{name}"));
        match name {
            "malloc" => {
                let size = wire::decode_u32(args[0]);
                Ok(Some(wire::encode_u32(self.mem.alloc(size))))
            }
            "free" => Ok(None),
            "__getTypeName" => {
                let type_id = wire::decode_i32(args[0]);
                let name = self
                    .mem
                    .type_names
                    .get(&type_id)
                    .cloned()
                    .ok_or_else(|| {
                        EmbindError::internal(format!("mock guest has no name for type {type_id}"))
                    })?;
                Ok(Some(wire::encode_u32(self.mem.cstr(&name))))
            }
            _ => match self.exports.get_mut(name) {
                Some(func) => func(&mut self.mem, args),
                None => Err(EmbindError::internal(format!("no such export {name}"))),
            },
        }
    }

    fn call_table(&mut self, index: u32, args: &[u64]) -> EmbindResult<Option<u64>> {
        self.mem.log.push(format!("table:{index}"));
        match self.table.get_mut(&index) {
            Some(func) => func(&mut self.mem, args),
            None => Err(EmbindError::internal(format!(
                "no table function at index {index}"
            ))),
        }
    }
}
