//! Dual-Protocol Variable Access (C5): the single `tweak` operation GET
//! and SET both reduce to. See spec.md §4.5.

use crate::arena::Arena;
use crate::cell::{Binding, Cell, Heart, Payload};
use crate::context::{Context, ContextKind, InheritanceTable};
use crate::error::{is_meta_target, make_error};
use crate::symbol::SymbolTable;
use crate::value::sequence::SequenceRepr;

/// The "dual cell" direction: read (null-dual) or write a lifted value
/// (spec.md §4.5).
#[derive(Clone, Debug)]
pub enum Dual {
    Read,
    Write(Cell),
}

/// `tweak`'s result is always a plain `Cell`: on success a lifted value
/// (GET) or the prior dual (SET); on failure, an ERROR antiform, per
/// spec.md §4.5's error list — never a Rust `Result`, since an error here
/// is in-language data the caller (stepper/natives) decides whether to
/// escalate.
/// The context a bare (unbound) word or sequence head falls back to when
/// its own payload carries no binding of its own — the block/feed it was
/// read from (spec.md §4.3: "binding is installed when the word is
/// encountered during evaluation of a bound block, by walking outward
/// from the surrounding context"). Compact-represented sequences
/// (`crate::value::sequence::SequenceRepr::Compact`) regenerate their word
/// elements fresh and unbound on every `.get()` — for those, `ambient` is
/// the *only* source of a binding.
pub type Ambient = Option<crate::arena::StubId>;

pub fn tweak(
    arena: &mut Arena,
    symbols: &mut SymbolTable,
    inherits: &InheritanceTable,
    location: &Cell,
    dual: Dual,
    ambient: Ambient,
) -> Cell {
    match location.heart() {
        Heart::Word => tweak_word(arena, symbols, inherits, location, dual, ambient),
        Heart::Tuple | Heart::Chain | Heart::Path => {
            tweak_sequence(arena, symbols, inherits, location, dual, ambient)
        }
        other => make_error(
            arena,
            symbols,
            "bad-tweak-target",
            &format!("cannot tweak a value of heart {other:?}"),
        ),
    }
}

/// GET: tweak with a read dual, then unlift the result (spec.md §4.5).
pub fn get(
    arena: &mut Arena,
    symbols: &mut SymbolTable,
    inherits: &InheritanceTable,
    location: &Cell,
    ambient: Ambient,
) -> Cell {
    let result = tweak(arena, symbols, inherits, location, Dual::Read, ambient);
    if result.is_error() {
        return result;
    }
    result
        .unlift()
        .unwrap_or_else(|e| make_error(arena, symbols, "bad-unlift", &e.to_string()))
}

/// SET: tweak with the argument lifted, then unlift the echoed prior
/// value (spec.md §4.5).
pub fn set(
    arena: &mut Arena,
    symbols: &mut SymbolTable,
    inherits: &InheritanceTable,
    location: &Cell,
    value: Cell,
    ambient: Ambient,
) -> Cell {
    if value.is_error() {
        // spec.md §4.10, §7: an ERROR antiform passes through an
        // assignment unchanged, skipping the store, unless the target is
        // a meta target (`^word:`), which receives it lifted.
        if is_meta_target(location) {
            tweak(arena, symbols, inherits, location, Dual::Write(value.clone().lift()), ambient);
        }
        return value;
    }
    value.assert_storable();
    let result = tweak(arena, symbols, inherits, location, Dual::Write(value.lift()), ambient);
    if result.is_error() {
        return result;
    }
    result
        .unlift()
        .unwrap_or_else(|e| make_error(arena, symbols, "bad-unlift", &e.to_string()))
}

fn tweak_word(
    arena: &mut Arena,
    symbols: &mut SymbolTable,
    inherits: &InheritanceTable,
    location: &Cell,
    dual: Dual,
    ambient: Ambient,
) -> Cell {
    let Payload::Word { symbol, binding } = location.payload() else {
        unreachable!("tweak_word called on a non-word cell")
    };
    let ctx_id = match (binding, ambient) {
        (Binding::Context(id), _) => *id,
        (Binding::Unbound, Some(id)) => id,
        (Binding::Unbound, None) => {
            return make_error(arena, symbols, "not-bound", &format!("{} has no binding", symbols.spelling(*symbol)))
        }
    };
    let symbol = *symbol;
    let root = Context::from_stub(arena, ctx_id);
    match dual {
        Dual::Read => {
            match inherits.get_inherited(arena, symbols, root, symbol) {
                Some(cell) if cell.is_unreadable() => {
                    make_error(arena, symbols, "unset-variable", &format!("{} is unset", symbols.spelling(symbol)))
                }
                Some(cell) => cell.lift(),
                None => make_error(arena, symbols, "unbound-word", &format!("{} has no value", symbols.spelling(symbol))),
            }
        }
        Dual::Write(new_value) => {
            // SET writes into the word's own bound context, vivifying the
            // member there if it isn't already one; it does not search the
            // inheritance chain the way GET does (spec.md §4.5, §4.3).
            let stable = match new_value.unlift() {
                Ok(v) => v,
                Err(e) => return make_error(arena, symbols, "bad-tweak-dual", &e.to_string()),
            };
            let prior = root.get(arena, symbols, symbol).unwrap_or_else(Cell::erased);
            root.ensure_member(arena, symbols, symbol);
            root.set(arena, symbols, symbol, stable)
                .expect("member was just ensured");
            if prior.is_unreadable() {
                prior
            } else {
                prior.lift()
            }
        }
    }
}

/// A value's fields can be picked through `.` access if it carries a
/// context: OBJECT!/PORT!/MODULE! directly, or FRAME! (whose varlist holds
/// its named parameters — `f.value1` reads a captured call's argument,
/// spec.md §4.9's "enclose").
fn context_of(cell: &Cell) -> Option<crate::arena::StubId> {
    match cell.payload() {
        Payload::Context(id) => Some(*id),
        Payload::Frame { varlist, .. } => Some(*varlist),
        _ => None,
    }
}

/// Field-picking walk shared by TUPLE! (`a.b.c`), PATH! (`a/b`), and a
/// CHAIN! with only one resolvable segment (`word:`, `:word`). A CHAIN!
/// with *two or more* resolvable segments (`a:b:c`) is a specialization,
/// not a field pick — its head must resolve to an ACTION and the rest
/// become refinements pushed on the data stack (spec.md §4.5, §4.9) — and
/// is resolved one layer up, in `src/stepper.rs`'s `begin_chain_specialization`,
/// before this function is ever reached for such a sequence.
fn tweak_sequence(
    arena: &mut Arena,
    symbols: &mut SymbolTable,
    inherits: &InheritanceTable,
    location: &Cell,
    dual: Dual,
    ambient: Ambient,
) -> Cell {
    let Payload::Sequence(repr) = location.payload().clone() else {
        unreachable!("tweak_sequence called on a non-sequence cell")
    };
    let len = repr.len(arena);
    let leading_space = repr.has_leading_space(arena);
    let trailing_space = repr.has_trailing_space(arena);

    if location.heart() == Heart::Path && trailing_space {
        // `action/` referenced as a value, not invoked (spec.md §9 open
        // question: resolved here as "return the action cell as-is").
        return match (repr.get(0, arena), dual) {
            (Some(head), Dual::Read) => tweak(arena, symbols, inherits, &head, Dual::Read, ambient),
            (Some(_), Dual::Write(_)) => {
                make_error(arena, symbols, "bad-tweak-target", "cannot SET a bare action-reference PATH!")
            }
            (None, _) => make_error(arena, symbols, "bad-path", "empty PATH!"),
        };
    }

    let start = if leading_space { 1 } else { 0 };
    let end = if trailing_space { len - 1 } else { len };
    if start >= end {
        return make_error(arena, symbols, "bad-sequence", "sequence has no resolvable segments");
    }

    let head = repr.get(start, arena).expect("start index checked above");
    if start + 1 == end {
        // Only one resolvable segment (e.g. the `word` in a `word:`/`:word`
        // CHAIN!, or a single-field GET-TUPLE!): it's both head and last
        // segment, so the dual applies to it directly rather than to some
        // field reached through it.
        return tweak(arena, symbols, inherits, &head, dual, ambient);
    }
    let mut current = get(arena, symbols, inherits, &head, ambient);
    if current.is_error() {
        return current;
    }

    for index in (start + 1)..end {
        let segment = repr.get(index, arena).expect("index within [start, end)");
        let Some(ctx_id) = context_of(&current) else {
            return make_error(arena, symbols, "cannot-pick", "segment target is not an object");
        };
        let Payload::Word { symbol, .. } = segment.payload() else {
            return make_error(arena, symbols, "bad-picker", "sequence segment must be a word");
        };
        let ctx = Context::from_stub(arena, ctx_id);
        let is_last = index == end - 1;
        if is_last {
            return match dual {
                Dual::Read => match ctx.get(arena, symbols, *symbol) {
                    Some(v) if v.is_unreadable() => {
                        make_error(arena, symbols, "unset-variable", &format!("{} is unset", symbols.spelling(*symbol)))
                    }
                    Some(v) => v.lift(),
                    None => make_error(arena, symbols, "no-such-field", &format!("no field {}", symbols.spelling(*symbol))),
                },
                Dual::Write(value) => {
                    let sym = *symbol;
                    let Some(prior) = ctx.get(arena, symbols, sym) else {
                        return make_error(arena, symbols, "no-such-field", &format!("no field {}", symbols.spelling(sym)));
                    };
                    let unlifted = match value.unlift() {
                        Ok(v) => v,
                        Err(e) => return make_error(arena, symbols, "bad-tweak-dual", &e.to_string()),
                    };
                    ctx.set(arena, symbols, sym, unlifted).expect("field existence checked above");
                    if prior.is_unreadable() {
                        prior
                    } else {
                        prior.lift()
                    }
                }
            };
        }
        match ctx.get(arena, symbols, *symbol) {
            Some(v) => current = v,
            None => return make_error(arena, symbols, "no-such-field", &format!("no field {}", symbols.spelling(*symbol))),
        }
    }
    current
}
