//! Error-Antiform Propagation (C10). See spec.md §4.10, §7.
//!
//! Two error channels exist in this crate and are never conflated: this
//! module deals only with the in-language one (ERROR antiforms, throws,
//! vetoes) — host-level invariant violations still use `anyhow::Result`
//! exactly as the rest of the crate does.

use crate::arena::Arena;
use crate::cell::{Cell, Payload};
use crate::context::{Context, ContextKind};
use crate::symbol::{Symbol, SymbolTable};

/// The label attached to a throw, distinguishing a RETURN/BREAK/HALT from
/// an escalated definitional error (spec.md §7's taxonomy).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThrowLabel {
    Return,
    Break,
    Halt,
    /// Invariant violation / unreachable state, catchable only by a
    /// privileged `ENRECOVER`-equivalent (spec.md §7 item 3). This crate
    /// does not implement ENRECOVER; panics of this kind simply propagate
    /// to the top of `Trampoline::run`.
    Panic,
    /// An ERROR antiform that crossed a non-meta boundary (spec.md §4.10).
    Error,
    /// A user-named throw label (`THROW 'foo value`).
    Named(Symbol),
}

/// Build a minimal error object: a varlist with `id` (a WORD naming the
/// error) and `message` (a TEXT), matching the shape `obj.id`/`obj.message`
/// access in 4.10's worked examples would expect. Returns the ERROR
/// antiform directly, ready to place in OUT.
pub fn make_error(arena: &mut Arena, symbols: &mut SymbolTable, id: &str, message: &str) -> Cell {
    let varlist = crate::context::varlist::alloc_varlist(arena, ContextKind::Error, 2);
    let id_sym = symbols.intern("id");
    let message_sym = symbols.intern("message");
    crate::context::varlist::append_key(arena, varlist, id_sym);
    crate::context::varlist::append_key(arena, varlist, message_sym);
    let id_word_sym = symbols.intern(id);
    let ctx = Context::Varlist(varlist);
    ctx.set(arena, symbols, id_sym, Cell::word(id_word_sym, crate::cell::Binding::Unbound))
        .expect("id was just appended");
    let message_stub = arena.alloc(
        crate::arena::Flavor::Strand,
        crate::arena::StubContent::Strand(message.to_string()),
    );
    ctx.set(arena, symbols, message_sym, Cell::new(crate::cell::Heart::Text, Payload::Text(message_stub)))
        .expect("message was just appended");
    Cell::error(varlist)
}

/// The designated "abandon this composition" error (spec.md §4.10, §7
/// item 4). `COMPOSE`/`REDUCE`/`MAP` special-case this id.
pub fn make_veto(arena: &mut Arena, symbols: &mut SymbolTable) -> Cell {
    make_error(arena, symbols, "veto", "composition vetoed")
}

pub fn is_veto(arena: &Arena, symbols: &SymbolTable, value: &Cell) -> bool {
    error_id(arena, symbols, value)
        .map(|id| symbols.spelling(id) == "veto")
        .unwrap_or(false)
}

/// The error's `id` symbol, if `value` is an ERROR antiform with one.
pub fn error_id(arena: &Arena, symbols: &SymbolTable, value: &Cell) -> Option<Symbol> {
    if !value.is_error() {
        return None;
    }
    let Payload::Warning(obj) = value.payload() else {
        return None;
    };
    let id_sym = symbols
        .spelling_to_symbol("id")
        .expect("\"id\" must already be interned by the time an error is read");
    let ctx = Context::from_stub(arena, *obj);
    match ctx.get(arena, symbols, id_sym)?.payload() {
        Payload::Word { symbol, .. } => Some(*symbol),
        _ => None,
    }
}

/// TRY: coerce an ERROR antiform to NULL; anything else passes through
/// unchanged (spec.md §4.10).
pub fn try_(value: Cell) -> Cell {
    if value.is_error() {
        Cell::null()
    } else {
        value
    }
}

/// EXCEPT: run `branch` with the error if `value` is one; otherwise pass
/// `value` through (spec.md §4.10).
pub fn except(value: Cell, branch: impl FnOnce(Cell) -> Cell) -> Cell {
    if value.is_error() {
        branch(value)
    } else {
        value
    }
}

/// REQUIRE: the inverse of TRY — escalate immediately if `value` is an
/// ERROR antiform (spec.md §4.10).
pub fn require(value: Cell) -> Result<Cell, (ThrowLabel, Cell)> {
    if value.is_error() {
        Err((ThrowLabel::Error, value))
    } else {
        Ok(value)
    }
}

/// Whether `target` is a meta target (`^word:` and friends): errors pass
/// through such targets as lifted WARNING rather than escalating
/// (spec.md §4.10, §7's propagation policy).
pub fn is_meta_target(cell: &Cell) -> bool {
    matches!(cell.sigil(), Some(crate::cell::Sigil::Meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::symbol::SymbolTable;

    #[test]
    fn try_coerces_error_to_null() {
        let mut arena = Arena::new();
        let mut symbols = SymbolTable::new();
        symbols.intern("id");
        symbols.intern("message");
        let err = make_error(&mut arena, &mut symbols, "bad-thing", "oops");
        assert!(try_(err).is_null());
        assert_eq!(try_(Cell::integer(5)), Cell::integer(5));
    }

    #[test]
    fn veto_is_detected_by_id() {
        let mut arena = Arena::new();
        let mut symbols = SymbolTable::new();
        symbols.intern("id");
        symbols.intern("message");
        let veto = make_veto(&mut arena, &mut symbols);
        assert!(is_veto(&arena, &symbols, &veto));
        let other = make_error(&mut arena, &mut symbols, "not-veto", "x");
        assert!(!is_veto(&arena, &symbols, &other));
    }
}
