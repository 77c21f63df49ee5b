//! Type registry and dependency resolver.
//!
//! Registrations arrive in whatever order the guest's start function emits
//! them, so any registration whose meaning depends on other types parks a
//! callback per missing dependency and is completed when the last one lands.
//! Callbacks fire strictly in enqueue order, and they are popped out of the
//! engine before running so a callback can itself register types.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use embind_types::{EmbindError, EmbindResult};

use crate::engine::Engine;
use crate::guest::Guest;
use crate::wire::RegisteredType;

/// A callback waiting for one dependency type id to register.
pub(crate) type AwaitingCallback = Box<dyn FnOnce(&Engine, &mut dyn Guest) -> EmbindResult<()>>;

/// Producer invoked once every dependency is resolved: receives the resolved
/// dependency types and returns one new type per target id.
pub(crate) type ProduceFn =
    Box<dyn FnOnce(&Engine, &mut dyn Guest, Vec<Rc<RegisteredType>>) -> EmbindResult<Vec<RegisteredType>>>;

/// Shared progress of one `when_dependent_types_are_resolved` call.
struct PendingResolution {
    targets: Vec<i32>,
    slots: RefCell<Vec<Option<Rc<RegisteredType>>>>,
    outstanding: Cell<usize>,
    produce: RefCell<Option<ProduceFn>>,
}

impl PendingResolution {
    fn complete(&self, engine: &Engine, guest: &mut dyn Guest) -> EmbindResult<()> {
        let produce = self
            .produce
            .borrow_mut()
            .take()
            .ok_or_else(|| EmbindError::internal("type resolution completed twice"))?;
        let resolved = self
            .slots
            .borrow_mut()
            .iter_mut()
            .map(|slot| {
                slot.take()
                    .ok_or_else(|| EmbindError::internal("dependency slot left unresolved"))
            })
            .collect::<EmbindResult<Vec<_>>>()?;

        let produced = produce(engine, guest, resolved)?;
        if produced.len() != self.targets.len() {
            return Err(EmbindError::internal(format!(
                "type resolution produced {} types for {} target ids",
                produced.len(),
                self.targets.len()
            )));
        }
        for (target, ty) in self.targets.iter().zip(produced) {
            engine.register_type(guest, *target, ty, false)?;
        }
        Ok(())
    }
}

impl Engine {
    /// Intern a type at its raw id and fire every callback waiting for it.
    ///
    /// Duplicate ids fail unless `ignore_duplicate` is set, in which case the
    /// existing mapping is kept. Callbacks drained here may re-enter the
    /// registry; the engine borrow is released before each one runs.
    pub fn register_type(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        ty: RegisteredType,
        ignore_duplicate: bool,
    ) -> EmbindResult<()> {
        let callbacks = {
            let mut state = self.state_mut();
            if raw_type <= 0 {
                return Err(EmbindError::binding(
                    ty.name.clone(),
                    "type must have a positive integer typeid pointer",
                ));
            }
            if state.registered_types.contains_key(&raw_type) {
                if ignore_duplicate {
                    return Ok(());
                }
                return Err(EmbindError::binding(
                    ty.name.clone(),
                    "cannot register type twice",
                ));
            }
            log::trace!("registered type {raw_type} as '{}'", ty.name);
            state.registered_types.insert(raw_type, Rc::new(ty));
            state.type_dependencies.remove(&raw_type);
            state
                .awaiting_dependencies
                .remove(&raw_type)
                .unwrap_or_default()
        };

        for callback in callbacks {
            callback(self, guest)?;
        }
        Ok(())
    }

    /// The registered type for a raw id.
    pub(crate) fn lookup_type(&self, raw_type: i32) -> Option<Rc<RegisteredType>> {
        self.state().registered_types.get(&raw_type).cloned()
    }

    /// The registered type for a raw id, or a binding error naming the
    /// context and the guest-reported type name.
    pub(crate) fn require_registered_type(
        &self,
        guest: &mut dyn Guest,
        raw_type: i32,
        context: &str,
    ) -> EmbindResult<Rc<RegisteredType>> {
        if let Some(ty) = self.lookup_type(raw_type) {
            return Ok(ty);
        }
        let name = self.type_name_or_placeholder(guest, raw_type);
        Err(EmbindError::binding(
            context.to_string(),
            format!("has unknown type {name}"),
        ))
    }

    /// Record that each target id depends on `dependencies`, then run
    /// `produce` as soon as every dependency is registered — immediately if
    /// they already all are. The produced types are registered at the target
    /// ids, which may cascade into further resolutions.
    pub(crate) fn when_dependent_types_are_resolved(
        &self,
        guest: &mut dyn Guest,
        targets: Vec<i32>,
        dependencies: Vec<i32>,
        produce: ProduceFn,
    ) -> EmbindResult<()> {
        {
            let mut state = self.state_mut();
            for target in &targets {
                state.type_dependencies.insert(*target, dependencies.clone());
            }
        }

        let pending = Rc::new(PendingResolution {
            targets,
            slots: RefCell::new(vec![None; dependencies.len()]),
            outstanding: Cell::new(0),
            produce: RefCell::new(Some(produce)),
        });

        for (i, dep) in dependencies.iter().copied().enumerate() {
            if let Some(ty) = self.lookup_type(dep) {
                pending.slots.borrow_mut()[i] = Some(ty);
            } else {
                pending.outstanding.set(pending.outstanding.get() + 1);
                let pending = Rc::clone(&pending);
                let mut state = self.state_mut();
                state
                    .awaiting_dependencies
                    .entry(dep)
                    .or_default()
                    .push(Box::new(move |engine, guest| {
                        let ty = engine.lookup_type(dep).ok_or_else(|| {
                            EmbindError::internal(format!(
                                "dependency {dep} fired its callbacks while unregistered"
                            ))
                        })?;
                        pending.slots.borrow_mut()[i] = Some(ty);
                        pending.outstanding.set(pending.outstanding.get() - 1);
                        if pending.outstanding.get() == 0 {
                            pending.complete(engine, guest)?;
                        }
                        Ok(())
                    }));
            }
        }

        if pending.outstanding.get() == 0 {
            pending.complete(self, guest)?;
        }
        Ok(())
    }

    /// Build the `UnboundTypes` error for a call blocked on unresolved
    /// types: transitively walk `type_dependencies` down to the still-missing
    /// leaf ids and resolve their names through the guest.
    pub(crate) fn unbound_type_error(
        &self,
        guest: &mut dyn Guest,
        context: &str,
        types: &[i32],
    ) -> EmbindError {
        let mut seen = HashSet::new();
        let mut missing_ids = Vec::new();
        for ty in types {
            self.collect_unbound(*ty, &mut seen, &mut missing_ids);
        }

        let missing = missing_ids
            .into_iter()
            .map(|id| self.type_name_or_placeholder(guest, id))
            .collect();
        EmbindError::UnboundTypes {
            context: context.to_string(),
            missing,
        }
    }

    fn collect_unbound(&self, type_id: i32, seen: &mut HashSet<i32>, out: &mut Vec<i32>) {
        if !seen.insert(type_id) {
            return;
        }
        if self.state().registered_types.contains_key(&type_id) {
            return;
        }
        let deps = self.state().type_dependencies.get(&type_id).cloned();
        match deps {
            Some(deps) => {
                for dep in deps {
                    self.collect_unbound(dep, seen, out);
                }
            }
            None => out.push(type_id),
        }
    }

    fn type_name_or_placeholder(&self, guest: &mut dyn Guest, type_id: i32) -> String {
        match guest.type_name(type_id) {
            Ok(name) => name,
            Err(err) => {
                log::warn!("could not resolve name of type {type_id}: {err}");
                format!("<type {type_id}>")
            }
        }
    }
}
