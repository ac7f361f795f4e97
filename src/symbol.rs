//! Global symbol table: interning, case-insensitive synonyms, and the
//! binder/patch-chain hooks used by [`crate::collector`] and
//! [`crate::context::sea`].

use std::collections::HashMap;

/// A canonical, interned symbol. Cheap to copy; equality is by index, not
/// by spelling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(pub(crate) u32);

/// Chain head for the sea/patch mechanism (see [`crate::context::sea`]):
/// the first patch stub hung off this symbol, if any.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PatchChainHead(pub(crate) Option<crate::arena::StubId>);

#[derive(Debug)]
struct SymbolRecord {
    spelling: String,
    /// Transient per-symbol hook used by [`crate::collector::Binder`] to
    /// detect duplicates in O(1). `None` when no collector session has
    /// this symbol bound.
    binder_index: Option<u32>,
    /// Head of the circular patch chain for sea-style contexts.
    patch_chain: PatchChainHead,
}

/// Low (preallocated) symbol indices, statically assigned so boot code can
/// branch on them without a table lookup. Mirrors spec.md §3.4.
pub mod low {
    use super::Symbol;

    pub const NULL: Symbol = Symbol(0);
    pub const TRUE: Symbol = Symbol(1);
    pub const FALSE: Symbol = Symbol(2);
    pub const SELF: Symbol = Symbol(3);
    pub const RETURN: Symbol = Symbol(4);
    pub const VALUE: Symbol = Symbol(5);

    pub(super) const SPELLINGS: &[&str] =
        &["null", "true", "false", "self", "return", "value"];
}

/// The interning table. One per [`crate::vm::Vm`]; never shared across
/// instances (spec.md §5: single-threaded, process-wide per interpreter).
#[derive(Debug)]
pub struct SymbolTable {
    records: Vec<SymbolRecord>,
    /// Case-insensitive spelling -> canonical symbol.
    by_spelling: HashMap<String, Symbol>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable {
            records: Vec::new(),
            by_spelling: HashMap::new(),
        };
        for spelling in low::SPELLINGS {
            let sym = table.intern_fresh(spelling);
            debug_assert_eq!(
                sym.0 as usize,
                table.records.len() - 1,
                "low symbol indices must be assigned in declaration order"
            );
        }
        table
    }

    fn intern_fresh(&mut self, spelling: &str) -> Symbol {
        let sym = Symbol(self.records.len() as u32);
        self.records.push(SymbolRecord {
            spelling: spelling.to_ascii_lowercase(),
            binder_index: None,
            patch_chain: PatchChainHead::default(),
        });
        self.by_spelling
            .insert(spelling.to_ascii_lowercase(), sym);
        sym
    }

    /// Intern `spelling`, returning the canonical symbol. Case folds to the
    /// synonym ring's representative (lowercase), matching Rebol-family
    /// case-insensitive word comparison.
    pub fn intern(&mut self, spelling: &str) -> Symbol {
        let key = spelling.to_ascii_lowercase();
        if let Some(&sym) = self.by_spelling.get(&key) {
            return sym;
        }
        self.intern_fresh(spelling)
    }

    pub fn spelling(&self, sym: Symbol) -> &str {
        &self.records[sym.0 as usize].spelling
    }

    /// Reverse lookup without interning — `None` if `spelling` has never
    /// been seen by this table.
    pub fn spelling_to_symbol(&self, spelling: &str) -> Option<Symbol> {
        self.by_spelling.get(&spelling.to_ascii_lowercase()).copied()
    }

    /// Every interned spelling in intern order — diagnostic use (e.g. the
    /// `symbols` tool subcommand), not evaluator-facing.
    pub fn all_spellings(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|record| record.spelling.as_str())
    }

    pub fn binder_index(&self, sym: Symbol) -> Option<u32> {
        self.records[sym.0 as usize].binder_index
    }

    pub fn set_binder_index(&mut self, sym: Symbol, index: Option<u32>) {
        self.records[sym.0 as usize].binder_index = index;
    }

    pub fn patch_chain_head(&self, sym: Symbol) -> Option<crate::arena::StubId> {
        self.records[sym.0 as usize].patch_chain.0
    }

    pub fn set_patch_chain_head(
        &mut self,
        sym: Symbol,
        head: Option<crate::arena::StubId>,
    ) {
        self.records[sym.0 as usize].patch_chain.0 = head;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn low_symbols_are_stable_indices() {
        let table = SymbolTable::new();
        assert_eq!(table.spelling(low::NULL), "null");
        assert_eq!(table.spelling(low::RETURN), "return");
    }

    #[test]
    fn intern_is_case_insensitive_and_idempotent() {
        let mut table = SymbolTable::new();
        let a = table.intern("Foo");
        let b = table.intern("FOO");
        let c = table.intern("foo");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(table.spelling(a), "foo");
    }

    #[test]
    fn binder_hook_round_trips() {
        let mut table = SymbolTable::new();
        let sym = table.intern("x");
        assert_eq!(table.binder_index(sym), None);
        table.set_binder_index(sym, Some(3));
        assert_eq!(table.binder_index(sym), Some(3));
        table.set_binder_index(sym, None);
        assert_eq!(table.binder_index(sym), None);
    }
}
