//! Sea-style context storage ("sea of words"): an empty identity stub,
//! with variables hung off each symbol's own circular patch chain instead
//! of living in the context. Used for MODULE! (spec.md §3.3, §4.4).

use crate::arena::{Arena, Flavor, StubContent, StubId};
use crate::cell::Cell;
use crate::symbol::{Symbol, SymbolTable};

pub fn alloc_sea(arena: &mut Arena) -> StubId {
    arena.alloc(Flavor::Sea, StubContent::Sea)
}

/// Find the patch belonging to `sea` in `symbol`'s chain, if one exists.
pub fn find_patch(
    arena: &Arena,
    symbols: &SymbolTable,
    sea: StubId,
    symbol: Symbol,
) -> Option<StubId> {
    let mut current = symbols.patch_chain_head(symbol);
    while let Some(id) = current {
        match &arena.get(id).content {
            StubContent::Patch { sea: s, next, .. } => {
                if *s == sea {
                    return Some(id);
                }
                current = *next;
            }
            _ => unreachable!("patch chain must only contain Patch stubs"),
        }
    }
    None
}

/// Splice a new patch for `(sea, symbol)` into the circular chain headed
/// at `symbol`. Panics (debug-assertion equivalent, spec.md §3.3's "every
/// patch in a sea's chain has a unique (sea, symbol) pair") if one already
/// exists for this sea.
pub fn append_to_sea(
    arena: &mut Arena,
    symbols: &mut SymbolTable,
    sea: StubId,
    symbol: Symbol,
) -> StubId {
    debug_assert!(
        find_patch(arena, symbols, sea, symbol).is_none(),
        "duplicate (sea, symbol) patch insertion"
    );
    let existing_head = symbols.patch_chain_head(symbol);
    let patch = arena.alloc(
        Flavor::Patch,
        StubContent::Patch {
            sea,
            symbol,
            value: Cell::erased(),
            next: existing_head,
        },
    );
    symbols.set_patch_chain_head(symbol, Some(patch));
    patch
}

pub fn patch_value(arena: &Arena, patch: StubId) -> &Cell {
    match &arena.get(patch).content {
        StubContent::Patch { value, .. } => value,
        _ => panic!("patch_value called on a non-patch stub"),
    }
}

pub fn set_patch_value(arena: &mut Arena, patch: StubId, value: Cell) {
    match &mut arena.get_mut(patch).content {
        StubContent::Patch { value: slot, .. } => *slot = value,
        _ => panic!("set_patch_value called on a non-patch stub"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_most_one_patch_per_sea_per_symbol() {
        let mut arena = Arena::new();
        let mut symbols = SymbolTable::new();
        let sea_a = alloc_sea(&mut arena);
        let sea_b = alloc_sea(&mut arena);
        let x = symbols.intern("x");

        append_to_sea(&mut arena, &mut symbols, sea_a, x);
        append_to_sea(&mut arena, &mut symbols, sea_b, x);

        assert!(find_patch(&arena, &symbols, sea_a, x).is_some());
        assert!(find_patch(&arena, &symbols, sea_b, x).is_some());
    }

    #[test]
    #[should_panic(expected = "duplicate")]
    fn duplicate_insertion_into_same_sea_panics() {
        let mut arena = Arena::new();
        let mut symbols = SymbolTable::new();
        let sea = alloc_sea(&mut arena);
        let x = symbols.intern("x");
        append_to_sea(&mut arena, &mut symbols, sea, x);
        append_to_sea(&mut arena, &mut symbols, sea, x);
    }
}
