//! Varlist-style context storage: a keylist (ordered symbols) paired with
//! a varlist (cells at matching indices, rootvar at index 0).
//! See spec.md §3.3, §4.4.

use crate::arena::{Arena, Flavor, StubContent, StubId};
use crate::cell::{Cell, Heart, Payload};
use crate::symbol::Symbol;

use super::ContextKind;

/// Allocate a varlist-style context of initial capacity `n` (no keys yet
/// beyond the rootvar). Keylist length + 1 == varlist length is maintained
/// as an invariant from construction onward (spec.md §3.3, §8.1).
pub fn alloc_varlist(arena: &mut Arena, kind: ContextKind, capacity: usize) -> StubId {
    let keylist = arena.alloc(
        Flavor::Keylist,
        StubContent::Keylist(Vec::with_capacity(capacity)),
    );
    let varlist = arena.alloc(
        Flavor::Varlist,
        StubContent::Varlist {
            keylist,
            cells: Vec::with_capacity(capacity + 1),
        },
    );
    // rootvar: a cell identifying the container itself.
    let rootvar = Cell::new(kind.heart(), Payload::Context(varlist));
    if let StubContent::Varlist { cells, .. } = &mut arena.get_mut(varlist).content {
        cells.push(rootvar);
    }
    varlist
}

pub fn keylist_of(arena: &Arena, varlist: StubId) -> StubId {
    match &arena.get(varlist).content {
        StubContent::Varlist { keylist, .. } => *keylist,
        _ => panic!("keylist_of called on a non-varlist stub"),
    }
}

pub fn key_count(arena: &Arena, varlist: StubId) -> usize {
    let keylist = keylist_of(arena, varlist);
    match &arena.get(keylist).content {
        StubContent::Keylist(keys) => keys.len(),
        _ => unreachable!(),
    }
}

pub fn var_count(arena: &Arena, varlist: StubId) -> usize {
    match &arena.get(varlist).content {
        StubContent::Varlist { cells, .. } => cells.len(),
        _ => panic!("var_count called on a non-varlist stub"),
    }
}

/// spec.md §8.1: `keylist_length(V) + 1 = varlist_length(V)`.
pub fn check_length_invariant(arena: &Arena, varlist: StubId) -> bool {
    key_count(arena, varlist) + 1 == var_count(arena, varlist)
}

pub fn rootvar(arena: &Arena, varlist: StubId) -> &Cell {
    match &arena.get(varlist).content {
        StubContent::Varlist { cells, .. } => &cells[0],
        _ => panic!("rootvar called on a non-varlist stub"),
    }
}

/// Linear search of the keylist; callers that hot-loop this should cache
/// the resulting index on the word cell themselves (spec.md §4.3).
pub fn index_of(arena: &Arena, varlist: StubId, symbol: Symbol) -> Option<usize> {
    let keylist = keylist_of(arena, varlist);
    match &arena.get(keylist).content {
        StubContent::Keylist(keys) => keys.iter().position(|&k| k == symbol),
        _ => unreachable!(),
    }
}

pub fn var_at(arena: &Arena, varlist: StubId, index: usize) -> &Cell {
    match &arena.get(varlist).content {
        StubContent::Varlist { cells, .. } => &cells[index + 1],
        _ => panic!("var_at called on a non-varlist stub"),
    }
}

pub fn var_at_mut(arena: &mut Arena, varlist: StubId, index: usize) -> &mut Cell {
    match &mut arena.get_mut(varlist).content {
        StubContent::Varlist { cells, .. } => &mut cells[index + 1],
        _ => panic!("var_at_mut called on a non-varlist stub"),
    }
}

/// Append a new key, extending both keylist and varlist (spec.md §4.4).
/// If the keylist is shared with another context, it is cloned first
/// (copy-on-write) — the first expander to hit a shared keylist pays the
/// clone; later expanders of the *original* owner keep referencing the
/// pre-clone copy (spec.md §8.3).
pub fn append_key(arena: &mut Arena, varlist: StubId, symbol: Symbol) -> usize {
    let keylist = keylist_of(arena, varlist);
    let shared = arena.get(keylist).flags.contains(crate::arena::StubFlags::SHARED_KEYLIST);
    let keylist = if shared {
        let cloned_keys = match &arena.get(keylist).content {
            StubContent::Keylist(keys) => keys.clone(),
            _ => unreachable!(),
        };
        let new_keylist = arena.alloc(Flavor::Keylist, StubContent::Keylist(cloned_keys));
        if let StubContent::Varlist { keylist, .. } = &mut arena.get_mut(varlist).content {
            *keylist = new_keylist;
        }
        new_keylist
    } else {
        keylist
    };

    let index = match &mut arena.get_mut(keylist).content {
        StubContent::Keylist(keys) => {
            keys.push(symbol);
            keys.len() - 1
        }
        _ => unreachable!(),
    };
    if let StubContent::Varlist { cells, .. } = &mut arena.get_mut(varlist).content {
        // "ghost for unset" cell: readable, but GET must report it unset.
        cells.push(Cell::erased());
    }
    index
}

/// Mark a varlist's keylist as shared so the next appender clones it
/// rather than mutating in place (spec.md §4.4 step 1, §8.3).
pub fn share_keylist(arena: &mut Arena, varlist: StubId) {
    let keylist = keylist_of(arena, varlist);
    arena
        .get_mut(keylist)
        .flags
        .insert(crate::arena::StubFlags::SHARED_KEYLIST);
}

/// `make-varlist-detect`: collect set-words from `source` (via
/// [`crate::collector`]) into a fresh context, optionally inheriting a
/// parent's keys by sharing its keylist when no new keys were added
/// (spec.md §4.4).
pub fn make_varlist_detect(
    arena: &mut Arena,
    symbols: &mut crate::symbol::SymbolTable,
    kind: ContextKind,
    source: &[Cell],
    deep: bool,
    parent: Option<StubId>,
) -> StubId {
    let collected = crate::collector::Collector::new().collect(symbols, source, deep);
    match parent {
        None => {
            let varlist = alloc_varlist(arena, kind, collected.len());
            for sym in collected {
                append_key(arena, varlist, sym);
            }
            varlist
        }
        Some(parent_varlist) => {
            if collected.is_empty() {
                // no new keys: share the parent's keylist outright.
                let parent_keylist = keylist_of(arena, parent_varlist);
                let varlist = arena.alloc(
                    Flavor::Varlist,
                    StubContent::Varlist {
                        keylist: parent_keylist,
                        cells: vec![Cell::new(kind.heart(), Payload::None)],
                    },
                );
                share_keylist(arena, parent_varlist);
                let n = key_count(arena, varlist);
                if let StubContent::Varlist { cells, .. } = &mut arena.get_mut(varlist).content {
                    cells.resize(n + 1, Cell::erased());
                    cells[0] = Cell::new(kind.heart(), Payload::Context(varlist));
                }
                varlist
            } else {
                let parent_keys: Vec<Symbol> = match &arena.get(keylist_of(arena, parent_varlist)).content {
                    StubContent::Keylist(keys) => keys.clone(),
                    _ => unreachable!(),
                };
                let varlist = alloc_varlist(arena, kind, parent_keys.len() + collected.len());
                for sym in parent_keys {
                    append_key(arena, varlist, sym);
                }
                for sym in collected {
                    if index_of(arena, varlist, sym).is_none() {
                        append_key(arena, varlist, sym);
                    }
                }
                varlist
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    #[test]
    fn fresh_varlist_satisfies_length_invariant() {
        let mut arena = Arena::new();
        let mut symbols = SymbolTable::new();
        let v = alloc_varlist(&mut arena, ContextKind::Object, 2);
        let x = symbols.intern("x");
        append_key(&mut arena, v, x);
        assert!(check_length_invariant(&arena, v));
        assert_eq!(key_count(&arena, v), 1);
        assert_eq!(var_count(&arena, v), 2);
    }

    #[test]
    fn shared_keylist_is_cloned_on_first_expand() {
        let mut arena = Arena::new();
        let mut symbols = SymbolTable::new();
        let v1 = alloc_varlist(&mut arena, ContextKind::Object, 1);
        let x = symbols.intern("x");
        append_key(&mut arena, v1, x);
        let original_keylist = keylist_of(&arena, v1);
        share_keylist(&mut arena, v1);

        // simulate a second owner of the same keylist
        let v2 = arena.alloc(
            Flavor::Varlist,
            StubContent::Varlist {
                keylist: original_keylist,
                cells: vec![Cell::new(ContextKind::Object.heart(), Payload::None), Cell::erased()],
            },
        );

        let y = symbols.intern("y");
        append_key(&mut arena, v2, y);
        assert_ne!(
            keylist_of(&arena, v2),
            original_keylist,
            "expanding a shared keylist must clone it"
        );
        assert_eq!(
            keylist_of(&arena, v1),
            original_keylist,
            "the non-expanding owner keeps the pre-clone keylist"
        );
    }
}
