//! Collector & Binder (C11): duplicate-aware symbol collection for
//! context construction. See spec.md §4.11.

use crate::arena::{Arena, StubContent};
use crate::cell::{Cell, Heart, Payload};
use crate::symbol::{Symbol, SymbolTable};
use crate::value::sequence::{CompactElem, SequenceRepr};

/// Which words in a source list count as "ought to become a key": only
/// set-words (the default), or any word at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectMode {
    SetWordsOnly,
    AnyWord,
}

/// What happens when the same symbol is seen twice in one collection pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicatePolicy {
    Skip,
    Error,
    Permit,
}

/// Transient per-symbol hook store (spec.md §4.11). Bound symbols are
/// recorded in `stumps` so teardown can cleanly unset exactly the symbols
/// this session touched — even if a later error aborts collection early.
pub struct Binder<'s> {
    symbols: &'s mut SymbolTable,
    stumps: Vec<Symbol>,
    next_index: u32,
}

impl<'s> Binder<'s> {
    pub fn new(symbols: &'s mut SymbolTable) -> Self {
        Binder {
            symbols,
            stumps: Vec::new(),
            next_index: 0,
        }
    }

    /// Preload the binder with a parent context's keys so collecting a
    /// child doesn't re-add inherited ones.
    pub fn preload(&mut self, existing: impl IntoIterator<Item = Symbol>) {
        for sym in existing {
            if self.symbols.binder_index(sym).is_none() {
                self.symbols.set_binder_index(sym, Some(self.next_index));
                self.stumps.push(sym);
                self.next_index += 1;
            }
        }
    }

    /// `try-add`: returns `true` if newly bound, `false` if it was already
    /// present (a duplicate within this session).
    pub fn try_add(&mut self, sym: Symbol) -> bool {
        if self.symbols.binder_index(sym).is_some() {
            return false;
        }
        self.symbols.set_binder_index(sym, Some(self.next_index));
        self.stumps.push(sym);
        self.next_index += 1;
        true
    }

    pub fn contains(&self, sym: Symbol) -> bool {
        self.symbols.binder_index(sym).is_some()
    }
}

impl Drop for Binder<'_> {
    /// Teardown: unset every binder hook this session set, regardless of
    /// how collection ended (spec.md §4.11 step 4, §8.1's invariant that
    /// no binder hook survives a session).
    fn drop(&mut self) {
        for sym in &self.stumps {
            self.symbols.set_binder_index(*sym, None);
        }
    }
}

pub struct Collector {
    mode: CollectMode,
    on_duplicate: DuplicatePolicy,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub fn new() -> Self {
        Collector {
            mode: CollectMode::SetWordsOnly,
            on_duplicate: DuplicatePolicy::Skip,
        }
    }

    pub fn with_mode(mut self, mode: CollectMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.on_duplicate = policy;
        self
    }

    /// Walk `source`, optionally deep into nested BLOCK!/FENCE! (and
    /// SET-BLOCK! targets, which force deep collection regardless of the
    /// `deep` flag — spec.md §4.11 step 3), returning the unique symbols
    /// found in encounter order. Overlapping collector sessions are
    /// forbidden (spec.md §5); this is enforced structurally here since
    /// each call owns its own [`Binder`] for its whole duration.
    pub fn collect(&self, symbols: &mut SymbolTable, source: &[Cell], deep: bool) -> Vec<Symbol> {
        self.collect_in(symbols, source, deep, None)
    }

    pub fn collect_in(
        &self,
        symbols: &mut SymbolTable,
        source: &[Cell],
        deep: bool,
        arena: Option<&Arena>,
    ) -> Vec<Symbol> {
        let mut binder = Binder::new(symbols);
        let mut out = Vec::new();
        self.walk(&mut binder, &mut out, source, deep, arena);
        out
        // `binder` drops here, tearing down every hook it set.
    }

    fn walk(
        &self,
        binder: &mut Binder,
        out: &mut Vec<Symbol>,
        source: &[Cell],
        deep: bool,
        arena: Option<&Arena>,
    ) {
        for cell in source {
            let is_set_word = is_set_form(cell, arena);
            let eligible = match self.mode {
                CollectMode::AnyWord => cell.heart() == Heart::Word,
                CollectMode::SetWordsOnly => is_set_word,
            };
            if eligible {
                if let Payload::Word { symbol, .. } = cell.payload() {
                    self.offer(binder, out, *symbol);
                } else if let Payload::Sequence(repr) = cell.payload() {
                    // SET-TUPLE!/SET-CHAIN! head word.
                    if let Some(arena) = arena {
                        if let Some(head) = repr.get(0, arena) {
                            if let Payload::Word { symbol, .. } = head.payload() {
                                self.offer(binder, out, *symbol);
                            }
                        }
                    }
                }
            }
            if matches!(cell.heart(), Heart::Block | Heart::Fence) {
                if let (Payload::List(id), Some(arena)) = (cell.payload(), arena) {
                    if deep {
                        if let StubContent::Source(nested) = &arena.get(*id).content {
                            self.walk(binder, out, nested, deep, Some(arena));
                        }
                    }
                }
            } else if cell.heart() == Heart::Chain && is_set_word {
                // `[a b c]:` — a SET-BLOCK! target forces deep collection
                // of its contents regardless of the `deep` flag
                // (spec.md §4.11 step 3).
                if let (Payload::Sequence(repr), Some(arena)) = (cell.payload(), arena) {
                    if let Some(block) = repr.get(0, arena) {
                        if let Payload::List(id) = block.payload() {
                            if let StubContent::Source(nested) = &arena.get(*id).content {
                                self.walk(binder, out, nested, true, Some(arena));
                            }
                        }
                    }
                }
            }
        }
    }

    fn offer(&self, binder: &mut Binder, out: &mut Vec<Symbol>, symbol: Symbol) {
        if binder.try_add(symbol) {
            out.push(symbol);
        } else {
            match self.on_duplicate {
                DuplicatePolicy::Skip | DuplicatePolicy::Permit => {}
                DuplicatePolicy::Error => {
                    panic!("duplicate symbol during collection (strict mode)")
                }
            }
        }
    }
}

fn is_set_form(cell: &Cell, arena: Option<&Arena>) -> bool {
    match cell.payload() {
        Payload::Sequence(repr) => match arena {
            Some(arena) => repr.has_trailing_space(arena),
            None => matches!(repr, SequenceRepr::Compact([_, CompactElem::Space])),
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Binding;

    #[test]
    fn collect_set_words_only() {
        let mut arena = Arena::new();
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        let y = symbols.intern("y");
        let x_set = Cell::new(
            Heart::Chain,
            Payload::Sequence(SequenceRepr::from_elements(
                vec![
                    Cell::word(x, Binding::Unbound),
                    Cell::new(Heart::Space, Payload::None),
                ],
                &mut arena,
            )),
        );
        let plain_y = Cell::word(y, Binding::Unbound);
        let collected =
            Collector::new().collect_in(&mut symbols, &[x_set, plain_y], false, Some(&arena));
        assert_eq!(collected, vec![x]);
    }

    #[test]
    fn binder_hooks_are_cleared_after_collection() {
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        let set_x = Cell::new(
            Heart::Chain,
            Payload::Sequence(SequenceRepr::Compact([
                crate::value::sequence::CompactElem::Symbol(x),
                crate::value::sequence::CompactElem::Space,
            ])),
        );
        Collector::new().collect(&mut symbols, &[set_x], false);
        assert_eq!(symbols.binder_index(x), None);
    }

    #[test]
    fn duplicate_set_words_collected_once() {
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        let set_x = Cell::new(
            Heart::Chain,
            Payload::Sequence(SequenceRepr::Compact([
                crate::value::sequence::CompactElem::Symbol(x),
                crate::value::sequence::CompactElem::Space,
            ])),
        );
        let collected =
            Collector::new().collect(&mut symbols, &[set_x.clone(), set_x], false);
        assert_eq!(collected, vec![x]);
    }
}
