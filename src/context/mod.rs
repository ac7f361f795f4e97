//! Context Storage (C4): the two shapes a scope can take, per spec.md
//! §3.3, §4.4. [`varlist`] holds the indexed keylist+varlist form (FRAME!,
//! OBJECT!, ERROR!, PORT!); [`sea`] holds the symbol-hung patch-chain form
//! (MODULE!).

pub mod sea;
pub mod varlist;

use crate::arena::{Arena, StubContent, StubId};
use crate::cell::{Cell, Heart};
use crate::symbol::{Symbol, SymbolTable};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextKind {
    Frame,
    Object,
    Error,
    Port,
    Module,
}

impl ContextKind {
    pub fn heart(self) -> Heart {
        match self {
            ContextKind::Frame => Heart::Frame,
            ContextKind::Object => Heart::Object,
            ContextKind::Error => Heart::Warning,
            ContextKind::Port => Heart::Port,
            ContextKind::Module => Heart::Module,
        }
    }
}

/// A scope, in either storage shape. Most call sites want
/// [`Context::get`]/[`Context::set`], which dispatch to the right shape
/// without callers needing to match on it themselves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Context {
    Varlist(StubId),
    Sea(StubId),
}

impl Context {
    pub fn from_stub(arena: &Arena, id: StubId) -> Self {
        match &arena.get(id).content {
            StubContent::Varlist { .. } => Context::Varlist(id),
            StubContent::Sea => Context::Sea(id),
            other => panic!("stub is not a context: {other:?}"),
        }
    }

    pub fn stub_id(self) -> StubId {
        match self {
            Context::Varlist(id) | Context::Sea(id) => id,
        }
    }

    /// Read a variable by symbol. `None` means unbound in this context
    /// (not necessarily an error — callers fall through to an inherited
    /// context on miss, spec.md §4.3).
    pub fn get(self, arena: &Arena, symbols: &SymbolTable, symbol: Symbol) -> Option<Cell> {
        match self {
            Context::Varlist(id) => {
                let index = varlist::index_of(arena, id, symbol)?;
                Some(varlist::var_at(arena, id, index).clone())
            }
            Context::Sea(id) => {
                let patch = sea::find_patch(arena, symbols, id, symbol)?;
                Some(sea::patch_value(arena, patch).clone())
            }
        }
    }

    /// Write a variable by symbol; `None` means the symbol is not a
    /// member of this context at all (distinct from being merely unset).
    pub fn set(
        self,
        arena: &mut Arena,
        symbols: &SymbolTable,
        symbol: Symbol,
        value: Cell,
    ) -> Option<()> {
        match self {
            Context::Varlist(id) => {
                let index = varlist::index_of(arena, id, symbol)?;
                *varlist::var_at_mut(arena, id, index) = value;
                Some(())
            }
            Context::Sea(id) => {
                let patch = sea::find_patch(arena, symbols, id, symbol)?;
                sea::set_patch_value(arena, patch, value);
                Some(())
            }
        }
    }

    /// Append a new, currently-unset member and return whether it was
    /// newly added (`false` if it already existed).
    pub fn ensure_member(
        self,
        arena: &mut Arena,
        symbols: &mut SymbolTable,
        symbol: Symbol,
    ) -> bool {
        match self {
            Context::Varlist(id) => {
                if varlist::index_of(arena, id, symbol).is_some() {
                    return false;
                }
                varlist::append_key(arena, id, symbol);
                true
            }
            Context::Sea(id) => {
                if sea::find_patch(arena, symbols, id, symbol).is_some() {
                    return false;
                }
                sea::append_to_sea(arena, symbols, id, symbol);
                true
            }
        }
    }
}

/// `link-inherit-bind`: a context may fall through to a parent on miss
/// (spec.md §3.3, §4.3). Kept as a plain side table here (parent id per
/// varlist/sea) rather than another stub slot, since only a handful of
/// contexts (module bodies, object extensions) ever use it.
#[derive(Debug, Default)]
pub struct InheritanceTable {
    parents: std::collections::HashMap<StubId, StubId>,
}

impl InheritanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_parent(&mut self, child: StubId, parent: StubId) {
        self.parents.insert(child, parent);
    }

    pub fn parent_of(&self, child: StubId) -> Option<StubId> {
        self.parents.get(&child).copied()
    }

    /// Resolve `symbol` in `context`, falling through the inheritance
    /// chain on miss.
    pub fn get_inherited(
        &self,
        arena: &Arena,
        symbols: &SymbolTable,
        context: Context,
        symbol: Symbol,
    ) -> Option<Cell> {
        let mut current = context;
        loop {
            if let Some(value) = current.get(arena, symbols, symbol) {
                return Some(value);
            }
            current = Context::from_stub(arena, self.parent_of(current.stub_id())?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varlist_set_then_get_returns_written_value() {
        let mut arena = Arena::new();
        let mut symbols = SymbolTable::new();
        let v = varlist::alloc_varlist(&mut arena, ContextKind::Object, 1);
        let x = symbols.intern("x");
        varlist::append_key(&mut arena, v, x);
        let ctx = Context::Varlist(v);
        ctx.set(&mut arena, &symbols, x, Cell::integer(10)).unwrap();
        assert_eq!(ctx.get(&arena, &symbols, x), Some(Cell::integer(10)));
    }

    #[test]
    fn inheritance_falls_through_on_miss() {
        let mut arena = Arena::new();
        let mut symbols = SymbolTable::new();
        let parent = varlist::alloc_varlist(&mut arena, ContextKind::Object, 1);
        let x = symbols.intern("x");
        varlist::append_key(&mut arena, parent, x);
        Context::Varlist(parent)
            .set(&mut arena, &symbols, x, Cell::integer(99))
            .unwrap();

        let child = varlist::alloc_varlist(&mut arena, ContextKind::Object, 0);
        let mut table = InheritanceTable::new();
        table.set_parent(child, parent);

        let got = table.get_inherited(&arena, &symbols, Context::Varlist(child), x);
        assert_eq!(got, Some(Cell::integer(99)));
    }
}
