//! Public-symbol table and overload routing.
//!
//! A symbol is either a single callable with a recorded arity (or no arity
//! for constructors, which accept anything) or an overload table keyed by
//! argument count. Overloading is strictly by argument count; registering a
//! second arity promotes the existing entry into a table.

use std::collections::HashMap;
use std::rc::Rc;

use embind_types::{EmbindError, EmbindResult, Value};

use crate::engine::Engine;
use crate::guest::Guest;

/// The callable behind a public symbol, class method, or constructor slot.
pub(crate) type SymbolFn =
    Rc<dyn Fn(&Engine, &mut dyn Guest, Option<&Value>, &[Value]) -> EmbindResult<Value>>;

/// One resolved overload.
pub(crate) struct Overload {
    pub func: SymbolFn,
}

/// A named callable, possibly promoted into an overload table.
pub(crate) struct PublicSymbol {
    /// Recorded arity; `None` accepts any argument count.
    pub arg_count: Option<i32>,
    pub func: SymbolFn,
    /// Present once two arities share the name; keys are distinct arities.
    pub overloads: Option<HashMap<i32, Overload>>,
}

impl PublicSymbol {
    fn new(func: SymbolFn, arg_count: Option<i32>) -> Self {
        Self {
            arg_count,
            func,
            overloads: None,
        }
    }

    /// Move a single implementation into a fresh overload table keyed by its
    /// recorded arity.
    fn promote_to_overload_table(&mut self, name: &str) -> EmbindResult<()> {
        if self.overloads.is_some() {
            return Ok(());
        }
        let arg_count = self.arg_count.ok_or_else(|| {
            EmbindError::binding(name, "cannot overload a symbol that accepts any arity")
        })?;
        let mut table = HashMap::new();
        table.insert(
            arg_count,
            Overload {
                func: Rc::clone(&self.func),
            },
        );
        self.overloads = Some(table);
        Ok(())
    }
}

/// Sorted arity list for "expects one of (…)" messages.
fn arity_list(table: &HashMap<i32, Overload>) -> String {
    let mut arities: Vec<i32> = table.keys().copied().collect();
    arities.sort_unstable();
    arities
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Engine {
    /// Install `func` at `name`. A second registration with a different arity
    /// promotes the symbol to an overload table; a duplicate `(name, arity)`
    /// fails.
    pub(crate) fn expose_public_symbol(
        &self,
        name: &str,
        func: SymbolFn,
        arg_count: Option<i32>,
    ) -> EmbindResult<()> {
        let mut state = self.state_mut();
        if !state.public_symbols.contains_key(name) {
            state
                .public_symbols
                .insert(name.to_string(), PublicSymbol::new(func, arg_count));
            return Ok(());
        }

        let Some(existing) = state.public_symbols.get_mut(name) else {
            return Err(EmbindError::internal("symbol table lookup failed"));
        };
        let arg_count = arg_count
            .ok_or_else(|| EmbindError::binding(name, "cannot register public name twice"))?;
        if existing.arg_count == Some(arg_count)
            || existing
                .overloads
                .as_ref()
                .is_some_and(|table| table.contains_key(&arg_count))
        {
            return Err(EmbindError::binding(name, "cannot register public name twice"));
        }
        existing.promote_to_overload_table(name)?;
        if let Some(table) = existing.overloads.as_mut() {
            table.insert(arg_count, Overload { func });
        }
        Ok(())
    }

    /// Replace a previously exposed symbol: the arity-keyed slot when an
    /// overload table exists and the arity is non-negative, the top-level
    /// entry otherwise. Replacing an unknown name fails.
    pub(crate) fn replace_public_symbol(
        &self,
        name: &str,
        func: SymbolFn,
        arg_count: Option<i32>,
    ) -> EmbindResult<()> {
        let mut state = self.state_mut();
        let Some(existing) = state.public_symbols.get_mut(name) else {
            return Err(EmbindError::binding(
                name,
                "tried to replace a nonexistent public symbol",
            ));
        };
        match (&mut existing.overloads, arg_count) {
            (Some(table), Some(n)) if n >= 0 => {
                table.insert(n, Overload { func });
            }
            _ => {
                *existing = PublicSymbol::new(func, arg_count);
            }
        }
        Ok(())
    }

    /// Look up `name` and dispatch: by argument count through the overload
    /// table when one exists, directly otherwise.
    pub(crate) fn call_public_symbol(
        &self,
        guest: &mut dyn Guest,
        name: &str,
        this: Option<&Value>,
        args: &[Value],
    ) -> EmbindResult<Value> {
        let func = {
            let state = self.state();
            let Some(symbol) = state.public_symbols.get(name) else {
                return Err(EmbindError::binding(name, "could not find public symbol"));
            };
            match &symbol.overloads {
                Some(table) => match table.get(&(args.len() as i32)) {
                    Some(overload) => Rc::clone(&overload.func),
                    None => {
                        return Err(EmbindError::binding(
                            name,
                            format!(
                                "called with an invalid number of arguments ({}) - expects one of ({})",
                                args.len(),
                                arity_list(table)
                            ),
                        ));
                    }
                },
                None => Rc::clone(&symbol.func),
            }
        };
        (*func)(self, guest, this, args)
    }

    /// True when a public symbol with this name exists.
    pub fn has_public_symbol(&self, name: &str) -> bool {
        self.state().public_symbols.contains_key(name)
    }

    /// The arities a symbol dispatches on: `None` for an any-arity symbol,
    /// sorted arities otherwise.
    pub fn public_symbol_arities(&self, name: &str) -> Option<Vec<i32>> {
        let state = self.state();
        let symbol = state.public_symbols.get(name)?;
        match &symbol.overloads {
            Some(table) => {
                let mut arities: Vec<i32> = table.keys().copied().collect();
                arities.sort_unstable();
                Some(arities)
            }
            None => symbol.arg_count.map(|a| vec![a]),
        }
    }
}
