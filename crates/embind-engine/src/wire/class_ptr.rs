//! Class-pointer codecs: decoding wire pointers into instance handles and
//! encoding handles (with up/downcasting) back into wire pointers.

use embind_types::{wire, ClassHandle, EmbindError, EmbindResult, PtrId, Value};

use crate::engine::Engine;
use crate::guest::Guest;
use crate::invoker::Destructor;

/// Owned copy of the pointer record fields the codecs need, detached from
/// the engine borrow so guest calls can re-enter freely.
struct PointerInfo {
    name: String,
    class: embind_types::ClassId,
    is_reference: bool,
    is_const: bool,
    is_smart: bool,
    pointee: Option<PtrId>,
    sharing_policy: Option<i32>,
    raw_get_pointee: Option<u32>,
    raw_constructor: Option<u32>,
    raw_destructor: Option<u32>,
}

impl Engine {
    fn pointer_info(&self, ptr_type: PtrId) -> PointerInfo {
        let state = self.state();
        let record = &state.pointers[ptr_type.0];
        PointerInfo {
            name: record.name.clone(),
            class: record.class,
            is_reference: record.is_reference,
            is_const: record.is_const,
            is_smart: record.is_smart,
            pointee: record.pointee,
            sharing_policy: record.sharing_policy,
            raw_get_pointee: record.raw_get_pointee,
            raw_constructor: record.raw_constructor,
            raw_destructor: record.raw_destructor,
        }
    }

    /// Destroy an incoming smart pointer we did not take ownership of.
    fn destroy_incoming(
        &self,
        guest: &mut dyn Guest,
        info: &PointerInfo,
        ptr: u32,
    ) -> EmbindResult<()> {
        if let Some(destructor) = info.raw_destructor {
            guest.call_table(destructor, &[wire::encode_u32(ptr)])?;
        }
        Ok(())
    }

    /// Decode a wire pointer into an instance handle, sharing identity with
    /// any live handle for the same object and downcasting to the pointee's
    /// actual type when it is registered.
    pub(crate) fn pointer_from_wire(
        &self,
        guest: &mut dyn Guest,
        ptr_type: PtrId,
        ptr: u32,
    ) -> EmbindResult<Value> {
        let info = self.pointer_info(ptr_type);

        let raw = match (info.is_smart, info.raw_get_pointee) {
            (true, Some(get_pointee)) => wire::decode_u32(
                guest.call_table_expect(get_pointee, &[wire::encode_u32(ptr)])?,
            ),
            _ => ptr,
        };
        if raw == 0 {
            if info.is_smart {
                self.destroy_incoming(guest, &info, ptr)?;
            }
            return Ok(Value::Null);
        }

        let (_, basest) = self.basest_pointer(guest, info.class, raw)?;
        let existing = self.state().instances.get(&basest).cloned();
        if let Some(handle) = existing {
            if handle.count() == 0 {
                // Neutered record for this address: repopulate and revive it.
                {
                    let mut record = handle.record().borrow_mut();
                    record.ptr = raw;
                    if info.is_smart {
                        record.smart_type = Some(ptr_type);
                        record.smart_ptr = Some(ptr);
                    }
                    record.count.set(1);
                }
                return Ok(Value::Instance(handle));
            }
            // Same object already held: share identity, drop our copy of the
            // incoming smart pointer.
            let shared = handle.acquire();
            if info.is_smart {
                self.destroy_incoming(guest, &info, ptr)?;
            }
            return Ok(Value::Instance(shared));
        }

        let get_actual_type = self.state().classes[info.class.0].get_actual_type;
        let actual_type = wire::decode_i32(
            guest.call_table_expect(get_actual_type, &[wire::encode_u32(raw)])?,
        );
        let entry = self.state().registered_pointers.get(&actual_type).copied();

        let smart_fields = if info.is_smart {
            Some((ptr_type, ptr))
        } else {
            None
        };
        let handle = match entry {
            None => self.default_handle(ptr_type, &info, raw, smart_fields)?,
            Some(entry) => {
                let to_type = if info.is_const {
                    entry.const_pointer
                } else {
                    entry.pointer
                };
                let to_class = self.pointer_class(to_type);
                match self.downcast_pointer(guest, raw, info.class, to_class)? {
                    None => self.default_handle(ptr_type, &info, raw, smart_fields)?,
                    Some(downcast) => ClassHandle::new(to_type, downcast, smart_fields)?,
                }
            }
        };

        self.state_mut().instances.insert(basest, handle.clone());
        Ok(Value::Instance(handle))
    }

    fn default_handle(
        &self,
        ptr_type: PtrId,
        info: &PointerInfo,
        raw: u32,
        smart_fields: Option<(PtrId, u32)>,
    ) -> EmbindResult<ClassHandle> {
        if info.is_smart {
            let pointee = info.pointee.ok_or_else(|| {
                EmbindError::internal(format!("smart pointer {} has no pointee type", info.name))
            })?;
            ClassHandle::new(pointee, raw, smart_fields)
        } else {
            ClassHandle::new(ptr_type, raw, None)
        }
    }

    /// Encode a handle (or null) into a wire pointer, upcasting to the
    /// parameter's class and applying the smart-pointer sharing policy.
    pub(crate) fn pointer_to_wire(
        &self,
        guest: &mut dyn Guest,
        ptr_type: PtrId,
        destructors: Option<&mut Vec<Destructor>>,
        value: &Value,
    ) -> EmbindResult<u32> {
        let info = self.pointer_info(ptr_type);

        let handle = match value {
            Value::Null | Value::Undefined => {
                if info.is_reference {
                    return Err(EmbindError::binding(
                        info.name.clone(),
                        "null is not a valid value",
                    ));
                }
                if info.is_smart {
                    let constructor = info.raw_constructor.ok_or_else(|| {
                        EmbindError::internal(format!(
                            "smart pointer {} has no raw constructor",
                            info.name
                        ))
                    })?;
                    let ptr =
                        wire::decode_u32(guest.call_table_expect(constructor, &[])?);
                    if let Some(destructors) = destructors {
                        if let Some(destructor) = info.raw_destructor {
                            destructors.push(Destructor::Table {
                                index: destructor,
                                args: vec![wire::encode_u32(ptr)],
                            });
                        }
                    }
                    return Ok(ptr);
                }
                return Ok(0);
            }
            Value::Instance(handle) => handle,
            other => {
                return Err(EmbindError::binding(
                    info.name.clone(),
                    format!(
                        "expected null or a class instance, got {}",
                        other.kind_name()
                    ),
                ));
            }
        };

        if handle.is_deleted() {
            return Err(EmbindError::binding(
                info.name.clone(),
                "cannot pass deleted object as a pointer",
            ));
        }

        let handle_type = handle.ptr_type();
        let (handle_type_name, handle_is_const, handle_class) = {
            let state = self.state();
            let record = &state.pointers[handle_type.0];
            (record.name.clone(), record.is_const, record.class)
        };
        if !info.is_const && handle_is_const {
            return Err(EmbindError::binding(
                info.name.clone(),
                format!(
                    "cannot convert argument of type {handle_type_name} to parameter type {}",
                    info.name
                ),
            ));
        }

        let upcast = self.upcast_pointer(guest, handle.ptr(), handle_class, info.class)?;
        let mut ptr = upcast.ok_or_else(|| {
            EmbindError::binding(
                info.name.clone(),
                format!(
                    "expected null or instance of {}, got an instance of {}",
                    self.class_name(info.class),
                    self.class_name(handle_class)
                ),
            )
        })?;

        if info.is_smart {
            let Some((smart_type, smart_ptr)) = handle.smart() else {
                return Err(EmbindError::binding(
                    info.name.clone(),
                    "passing raw pointer to smart pointer is illegal",
                ));
            };
            match info.sharing_policy.unwrap_or(0) {
                // NONE: only the exact same smart type passes through.
                0 => {
                    if smart_type == ptr_type {
                        ptr = smart_ptr;
                    } else {
                        let smart_name = self.state().pointers[smart_type.0].name.clone();
                        return Err(EmbindError::binding(
                            info.name.clone(),
                            format!(
                                "cannot convert argument of type {smart_name} to parameter type {}",
                                info.name
                            ),
                        ));
                    }
                }
                // INTRUSIVE: the raw smart pointer is shared as-is.
                1 => ptr = smart_ptr,
                // BY_EMVAL: pass-through for the same smart type; re-sharing
                // across smart types is not supported on this host.
                2 => {
                    if smart_type == ptr_type {
                        ptr = smart_ptr;
                    } else {
                        return Err(EmbindError::binding(
                            info.name.clone(),
                            "smart pointer sharing across smart-pointer types is not supported",
                        ));
                    }
                }
                policy => {
                    return Err(EmbindError::binding(
                        info.name.clone(),
                        format!("unsupported sharing policy {policy}"),
                    ));
                }
            }
        }

        Ok(ptr)
    }
}
