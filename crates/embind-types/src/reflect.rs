//! Reflective dispatch onto opaque host values.
//!
//! The guest can ask the host, through emval, to construct values, call
//! methods, and read or write properties on an arbitrary host object. A host
//! type opts into that traffic by implementing [`Reflect`]; every operation
//! defaults to a binding error naming the type, so implementors only override
//! what they actually support.

use crate::{EmbindError, EmbindResult, Value};

/// Capability interface for host values reachable from the guest.
pub trait Reflect {
    /// Name used in error messages and diagnostics.
    fn type_name(&self) -> &str;

    /// Construct a new value, given the registered type names and decoded
    /// values of the constructor arguments.
    fn construct(&self, arg_types: &[&str], args: &[Value]) -> EmbindResult<Value> {
        let _ = (arg_types, args);
        Err(EmbindError::binding(
            self.type_name().to_string(),
            "value cannot be constructed from the guest",
        ))
    }

    /// Invoke a method by name.
    fn call(&self, method: &str, args: &[Value]) -> EmbindResult<Value> {
        let _ = args;
        Err(EmbindError::binding(
            self.type_name().to_string(),
            format!("no method named '{method}'"),
        ))
    }

    /// Read a property by name.
    fn get(&self, property: &str) -> EmbindResult<Value> {
        Err(EmbindError::binding(
            self.type_name().to_string(),
            format!("no readable property named '{property}'"),
        ))
    }

    /// Write a property by name.
    fn set(&self, property: &str, value: Value) -> EmbindResult<()> {
        let _ = value;
        Err(EmbindError::binding(
            self.type_name().to_string(),
            format!("no writable property named '{property}'"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Opaque;

    impl Reflect for Opaque {
        fn type_name(&self) -> &str {
            "Opaque"
        }
    }

    #[test]
    fn defaults_reject_with_the_type_name() {
        let v = Opaque;
        let err = v.call("frob", &[]).unwrap_err();
        assert_eq!(err.to_string(), "Opaque: no method named 'frob'");
        assert!(v.get("x").is_err());
        assert!(v.set("x", Value::Null).is_err());
        assert!(v.construct(&[], &[]).is_err());
    }
}
