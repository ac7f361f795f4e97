//! PATH!, CHAIN!, TUPLE!: compact aggregates displayed with `/ : .`
//! respectively (spec.md §3.5). A 2-element sequence where one side is a
//! "space" compresses inline (no SOURCE stub at all); longer sequences or
//! ones holding arbitrary cells use a frozen array.

use crate::arena::{Arena, Flavor, StubContent, StubId};
use crate::cell::{Binding, Cell, Heart, Payload};
use crate::symbol::Symbol;

/// What fits in the inline slot of a 2-element compressed sequence. Spec.md
/// §3.5 mentions symbols, pairing stubs, and byte-packed integers as the
/// compression targets; this crate only needs symbols and small integers
/// to express SET-WORD!/GET-WORD!-shaped chains and simple tuples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompactElem {
    /// The blank/space side of a 2-element sequence: `word:` is really
    /// the chain `[word space]`, `:word` is `[space word]`.
    Space,
    Symbol(Symbol),
    Integer(i64),
}

#[derive(Clone, Debug, PartialEq)]
pub enum SequenceRepr {
    /// Exactly two elements, at least one a [`CompactElem::Space`] or both
    /// small enough to need no heap array.
    Compact([CompactElem; 2]),
    /// Arbitrary length / content: a frozen SOURCE stub of cells.
    Array(StubId),
}

impl SequenceRepr {
    pub fn referenced_stub(&self) -> Option<StubId> {
        match self {
            SequenceRepr::Compact(_) => None,
            SequenceRepr::Array(id) => Some(*id),
        }
    }

    pub fn len(&self, arena: &Arena) -> usize {
        match self {
            SequenceRepr::Compact(_) => 2,
            SequenceRepr::Array(id) => match &arena.get(*id).content {
                StubContent::Source(cells) => cells.len(),
                _ => unreachable!("sequence array stub must be SOURCE flavor"),
            },
        }
    }

    pub fn get(&self, index: usize, arena: &Arena) -> Option<Cell> {
        match self {
            SequenceRepr::Compact(elems) => elems.get(index).map(|e| match e {
                CompactElem::Space => Cell::new(Heart::Space, Payload::None),
                CompactElem::Symbol(sym) => Cell::word(*sym, Binding::Unbound),
                CompactElem::Integer(n) => Cell::integer(*n),
            }),
            SequenceRepr::Array(id) => match &arena.get(*id).content {
                StubContent::Source(cells) => cells.get(index).cloned(),
                _ => unreachable!(),
            },
        }
    }

    /// A leading space marks a GET form (`.foo`, `:foo`); a trailing space
    /// marks a SET form (`foo.`, `foo:`) or a refinement slot
    /// (spec.md §3.5, §4.8 step 3).
    pub fn has_leading_space(&self, arena: &Arena) -> bool {
        matches!(self.get(0, arena), Some(c) if c.heart() == Heart::Space)
    }

    pub fn has_trailing_space(&self, arena: &Arena) -> bool {
        let len = self.len(arena);
        len > 0 && matches!(self.get(len - 1, arena), Some(c) if c.heart() == Heart::Space)
    }

    /// Build the most compact representation that fits `elements`.
    pub fn from_elements(elements: Vec<Cell>, arena: &mut Arena) -> Self {
        if elements.len() == 2 {
            if let (Some(a), Some(b)) =
                (compact_of(&elements[0]), compact_of(&elements[1]))
            {
                return SequenceRepr::Compact([a, b]);
            }
        }
        let id = arena.alloc(Flavor::Source, StubContent::Source(elements));
        arena.freeze(id);
        SequenceRepr::Array(id)
    }
}

fn compact_of(cell: &Cell) -> Option<CompactElem> {
    match (cell.heart(), cell.payload()) {
        (Heart::Space, _) => Some(CompactElem::Space),
        (Heart::Word, Payload::Word { symbol, .. }) => Some(CompactElem::Symbol(*symbol)),
        (Heart::Integer, Payload::Integer(n)) => Some(CompactElem::Integer(*n)),
        _ => None,
    }
}
