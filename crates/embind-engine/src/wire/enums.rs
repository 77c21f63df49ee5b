//! Registered enums: bidirectional name/value maps over an integer codec.
//!
//! An enum record can be born from either side. The guest registers the type
//! and its members during startup; the host may declare its own members with
//! [`Engine::register_enum`] before or after. Wherever both sides declare a
//! member, the names and wire values must agree.

use std::collections::HashMap;
use std::rc::Rc;

use embind_types::{EmbindError, EmbindResult, EnumValue, Value};

use crate::engine::Engine;
use crate::guest::Guest;
use crate::wire::primitives::IntWidth;

/// One enum member, possibly declared by only one side so far.
pub(crate) struct EnumMember {
    pub name: Rc<str>,
    /// Wire value registered by the guest.
    pub cpp_value: Option<i64>,
    /// Value declared by the host.
    pub host_value: Option<i64>,
}

/// One enum in the engine's enum arena.
pub(crate) struct EnumRecord {
    pub name: Rc<str>,
    /// Integer codec, known once the guest registers the type.
    pub int: Option<IntWidth>,
    pub members: Vec<EnumMember>,
    /// Guest wire value → member index.
    pub by_value: HashMap<i64, usize>,
    /// Member name → member index.
    pub by_name: HashMap<String, usize>,
}

impl EnumRecord {
    fn new(name: Rc<str>) -> Self {
        Self {
            name,
            int: None,
            members: Vec::new(),
            by_value: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    fn member_index(&mut self, member: &str) -> usize {
        if let Some(&i) = self.by_name.get(member) {
            return i;
        }
        let i = self.members.len();
        self.members.push(EnumMember {
            name: Rc::from(member),
            cpp_value: None,
            host_value: None,
        });
        self.by_name.insert(member.to_string(), i);
        i
    }
}

impl Engine {
    /// Declare host-side members for an enum. Validated against any values
    /// the guest has registered (or registers later) under the same names.
    pub fn register_enum(&self, name: &str, members: &[(&str, i64)]) -> EmbindResult<()> {
        let enum_id = self.ensure_enum_record(name);
        let mut state = self.state_mut();
        let record = &mut state.enums[enum_id];
        for (member, value) in members {
            let i = record.member_index(member);
            let entry = &mut record.members[i];
            entry.host_value = Some(*value);
            if let Some(cpp) = entry.cpp_value {
                if cpp != *value {
                    return Err(EmbindError::binding(
                        format!("{name}.{member}"),
                        format!(
                            "enum value registered with inconsistent values ({cpp} on the guest side, {value} on the host side)"
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// The members of an enum the engine currently knows, as host values.
    pub fn enum_members(&self, name: &str) -> Option<Vec<EnumValue>> {
        let state = self.state();
        let enum_id = *state.enums_by_name.get(name)?;
        let record = &state.enums[enum_id];
        Some(
            record
                .members
                .iter()
                .filter_map(|m| {
                    m.cpp_value.or(m.host_value).map(|value| EnumValue {
                        enum_name: Rc::clone(&record.name),
                        name: Rc::clone(&m.name),
                        value,
                    })
                })
                .collect(),
        )
    }

    /// Arena index for an enum name, creating an empty record if new.
    pub(crate) fn ensure_enum_record(&self, name: &str) -> usize {
        let mut state = self.state_mut();
        if let Some(&id) = state.enums_by_name.get(name) {
            return id;
        }
        let id = state.enums.len();
        state.enums.push(EnumRecord::new(Rc::from(name)));
        state.enums_by_name.insert(name.to_string(), id);
        id
    }

    /// Attach the guest-registered integer codec to an enum record.
    pub(crate) fn enum_attach_guest(&self, enum_id: usize, width: IntWidth) {
        self.state_mut().enums[enum_id].int = Some(width);
    }

    /// Record a guest-registered member value (I-side of the bidirectional
    /// maps). Registering the same member twice from the guest fails, as does
    /// disagreeing with a host declaration.
    pub(crate) fn enum_add_cpp_value(
        &self,
        enum_id: usize,
        member: &str,
        cpp_value: i64,
    ) -> EmbindResult<()> {
        let mut state = self.state_mut();
        let record = &mut state.enums[enum_id];
        let enum_name = Rc::clone(&record.name);
        let i = record.member_index(member);
        let entry = &mut record.members[i];
        if entry.cpp_value.is_some() {
            return Err(EmbindError::binding(
                member,
                format!("enum value for enum {enum_name} was already registered"),
            ));
        }
        if let Some(host) = entry.host_value {
            if host != cpp_value {
                return Err(EmbindError::binding(
                    format!("{enum_name}.{member}"),
                    format!(
                        "enum value registered with inconsistent values ({cpp_value} on the guest side, {host} on the host side)"
                    ),
                ));
            }
        }
        entry.cpp_value = Some(cpp_value);
        record.by_value.insert(cpp_value, i);
        Ok(())
    }

    fn enum_width(&self, name: &str, enum_id: usize) -> EmbindResult<IntWidth> {
        self.state().enums[enum_id].int.ok_or_else(|| {
            EmbindError::binding(name, "enum has no registered integer representation")
        })
    }

    /// Decode an enum wire word into its member.
    pub(crate) fn enum_from_wire(
        &self,
        _guest: &mut dyn Guest,
        name: &str,
        enum_id: usize,
        word: u64,
    ) -> EmbindResult<Value> {
        let width = self.enum_width(name, enum_id)?;
        self.enum_lookup_by_value(name, enum_id, width.wire_to_i64(word))
    }

    /// Map a decoded wire value to its member.
    pub(crate) fn enum_lookup_by_value(
        &self,
        name: &str,
        enum_id: usize,
        raw: i64,
    ) -> EmbindResult<Value> {
        let state = self.state();
        let record = &state.enums[enum_id];
        let Some(&i) = record.by_value.get(&raw) else {
            return Err(EmbindError::binding(
                name,
                format!("unknown enum value {raw}"),
            ));
        };
        Ok(Value::Enum(EnumValue {
            enum_name: Rc::clone(&record.name),
            name: Rc::clone(&record.members[i].name),
            value: raw,
        }))
    }

    /// Read the enum's integer representation at a pointer.
    pub(crate) fn enum_read_raw(
        &self,
        guest: &mut dyn Guest,
        enum_id: usize,
        ptr: u32,
    ) -> EmbindResult<i64> {
        let width = {
            let state = self.state();
            let record = &state.enums[enum_id];
            record.int.ok_or_else(|| {
                EmbindError::binding(
                    record.name.to_string(),
                    "enum has no registered integer representation",
                )
            })?
        };
        width.read_i64(guest, ptr)
    }

    /// Encode an enum member (or its name) as the enum's wire word.
    pub(crate) fn enum_to_wire(
        &self,
        name: &str,
        enum_id: usize,
        value: &Value,
    ) -> EmbindResult<u64> {
        let width = self.enum_width(name, enum_id)?;
        let state = self.state();
        let record = &state.enums[enum_id];
        let raw = match value {
            Value::Enum(ev) => {
                if ev.enum_name != record.name {
                    return Err(EmbindError::binding(
                        name,
                        format!("expected a {} value, got a {} value", record.name, ev.enum_name),
                    ));
                }
                ev.value
            }
            Value::Str(member) => {
                let Some(&i) = record.by_name.get(member.as_str()) else {
                    return Err(EmbindError::binding(
                        name,
                        format!("unknown enum member '{member}'"),
                    ));
                };
                record.members[i]
                    .cpp_value
                    .or(record.members[i].host_value)
                    .ok_or_else(|| {
                        EmbindError::binding(
                            name,
                            format!("enum member '{member}' has no registered value"),
                        )
                    })?
            }
            other => {
                return Err(EmbindError::binding(
                    name,
                    format!("expected an enum value, got {}", other.kind_name()),
                ));
            }
        };
        Ok(width.i64_to_wire(raw))
    }
}
