//! Value-array (tuple) and value-object (struct) codecs.
//!
//! Both kinds marshal through a guest-side temporary: decoding reads every
//! element through its getter and then destroys the temporary; encoding
//! constructs a fresh temporary, writes every element through its setter,
//! and schedules the temporary's destructor for after the call. Element
//! readers and writers only exist once every element type has resolved —
//! finalization binds them through the dependency resolver.

use std::rc::Rc;

use embind_types::{wire, EmbindError, EmbindResult, Value};

use crate::engine::Engine;
use crate::guest::Guest;
use crate::invoker::{run_destructors, Destructor};
use crate::wire::RegisteredType;

/// One bound element accessor pair.
pub(crate) struct ElementBinding {
    pub getter: u32,
    pub getter_context: i32,
    pub getter_ty: Rc<RegisteredType>,
    pub setter: u32,
    pub setter_context: i32,
    pub setter_ty: Rc<RegisteredType>,
}

impl ElementBinding {
    /// Read one element out of the guest temporary at `ptr`.
    fn read(&self, engine: &Engine, guest: &mut dyn Guest, ptr: u32) -> EmbindResult<Value> {
        let word = guest.call_table_expect(
            self.getter,
            &[wire::encode_i32(self.getter_context), wire::encode_u32(ptr)],
        )?;
        engine.from_wire(guest, &self.getter_ty, word)
    }

    /// Write one element into the guest temporary at `ptr`. Destructors the
    /// element encoding schedules are run as soon as the setter returns.
    fn write(
        &self,
        engine: &Engine,
        guest: &mut dyn Guest,
        ptr: u32,
        value: &Value,
    ) -> EmbindResult<()> {
        let mut local = Vec::new();
        let word = engine.to_wire(guest, &self.setter_ty, Some(&mut local), value)?;
        let result = guest.call_table(
            self.setter,
            &[
                wire::encode_i32(self.setter_context),
                wire::encode_u32(ptr),
                word,
            ],
        );
        run_destructors(guest, &local);
        result.map(|_| ())
    }
}

/// A finalized value-array registration.
pub(crate) struct TupleType {
    pub raw_constructor: u32,
    pub raw_destructor: u32,
    pub elements: Vec<ElementBinding>,
}

/// A finalized value-object registration; field order is registration order.
pub(crate) struct ObjectType {
    pub raw_constructor: u32,
    pub raw_destructor: u32,
    pub fields: Vec<(String, ElementBinding)>,
}

impl Engine {
    /// Decode a tuple: read every element from the temporary the wire points
    /// at, then destroy the temporary.
    pub(crate) fn tuple_from_wire(
        &self,
        guest: &mut dyn Guest,
        tuple: &TupleType,
        ptr: u32,
    ) -> EmbindResult<Value> {
        let mut elements = Vec::with_capacity(tuple.elements.len());
        for element in &tuple.elements {
            elements.push(element.read(self, guest, ptr)?);
        }
        guest.call_table(tuple.raw_destructor, &[wire::encode_u32(ptr)])?;
        Ok(Value::array(elements))
    }

    /// Encode a tuple: construct a temporary, write every element in order,
    /// and schedule the temporary's destructor.
    pub(crate) fn tuple_to_wire(
        &self,
        guest: &mut dyn Guest,
        name: &str,
        tuple: &TupleType,
        destructors: Option<&mut Vec<Destructor>>,
        value: &Value,
    ) -> EmbindResult<u32> {
        let elements: Vec<Value> = match value.as_array() {
            Some(array) => array.borrow().clone(),
            None => {
                return Err(EmbindError::binding(
                    name,
                    format!("expected an array value, got {}", value.kind_name()),
                ));
            }
        };
        if elements.len() != tuple.elements.len() {
            return Err(EmbindError::binding(
                name,
                format!(
                    "incorrect number of tuple elements: expected {}, got {}",
                    tuple.elements.len(),
                    elements.len()
                ),
            ));
        }

        let ptr = wire::decode_u32(guest.call_table_expect(tuple.raw_constructor, &[])?);
        for (element, value) in tuple.elements.iter().zip(&elements) {
            element.write(self, guest, ptr, value)?;
        }
        if let Some(destructors) = destructors {
            destructors.push(Destructor::Table {
                index: tuple.raw_destructor,
                args: vec![wire::encode_u32(ptr)],
            });
        }
        Ok(ptr)
    }

    /// Decode a value object into a field-name keyed object.
    pub(crate) fn object_from_wire(
        &self,
        guest: &mut dyn Guest,
        object: &ObjectType,
        ptr: u32,
    ) -> EmbindResult<Value> {
        let mut fields = Vec::with_capacity(object.fields.len());
        for (field_name, element) in &object.fields {
            fields.push((field_name.clone(), element.read(self, guest, ptr)?));
        }
        guest.call_table(object.raw_destructor, &[wire::encode_u32(ptr)])?;
        Ok(Value::object(fields))
    }

    /// Encode a value object from a host object; every registered field must
    /// be present.
    pub(crate) fn object_to_wire(
        &self,
        guest: &mut dyn Guest,
        name: &str,
        object: &ObjectType,
        destructors: Option<&mut Vec<Destructor>>,
        value: &Value,
    ) -> EmbindResult<u32> {
        let Some(map) = value.as_object() else {
            return Err(EmbindError::binding(
                name,
                format!("expected an object value, got {}", value.kind_name()),
            ));
        };

        let mut field_values = Vec::with_capacity(object.fields.len());
        {
            let map = map.borrow();
            for (field_name, _) in &object.fields {
                match map.get(field_name) {
                    Some(v) => field_values.push(v.clone()),
                    None => {
                        return Err(EmbindError::binding(
                            name,
                            format!("missing field '{field_name}'"),
                        ));
                    }
                }
            }
        }

        let ptr = wire::decode_u32(guest.call_table_expect(object.raw_constructor, &[])?);
        for ((_, element), value) in object.fields.iter().zip(&field_values) {
            element.write(self, guest, ptr, value)?;
        }
        if let Some(destructors) = destructors {
            destructors.push(Destructor::Table {
                index: object.raw_destructor,
                args: vec![wire::encode_u32(ptr)],
            });
        }
        Ok(ptr)
    }
}
