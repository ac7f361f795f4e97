//! Minimal Scanner (supplemented, spec.md treats the scanner as an opaque
//! collaborator — §1, §6.1). Literal-forms-only: INTEGER, WORD, SET-WORD,
//! GET-WORD, BLOCK!, GROUP!, TUPLE!, CHAIN!, PATH!, COMMA!, and the `@ ^ $
//! &` sigils (spec.md §4.8 step 3). No radix forms, no decimal/money/
//! time/date literals, no file-path datatypes — just enough to drive the
//! stepper end-to-end on the forms spec.md §8.4's scenarios use.

use std::iter::Peekable;
use std::str::Chars;

use anyhow::{bail, Context as _, Result};

use crate::arena::{Arena, Flavor, StubContent, StubId};
use crate::cell::{Binding, Cell, Heart, Payload, Sigil};
use crate::symbol::SymbolTable;
use crate::value::sequence::SequenceRepr;
use crate::vm::Vm;

/// A swappable source-to-cells front end (spec.md §6's embedding sketch).
/// `DefaultScanner` is this crate's own minimal implementation; an
/// embedding with a full Rebol-family lexer/loader would implement this
/// trait instead and never touch `src/scan.rs`.
pub trait Scanner {
    fn scan(&self, vm: &mut Vm, src: &str, filename: &str) -> Result<StubId>;
}

pub struct DefaultScanner;

impl Scanner for DefaultScanner {
    fn scan(&self, vm: &mut Vm, src: &str, filename: &str) -> Result<StubId> {
        let elements =
            scan_str(&mut vm.arena, &mut vm.symbols, src).with_context(|| format!("scanning {filename}"))?;
        let stub = vm.arena.alloc(Flavor::Source, StubContent::Source(elements));
        vm.arena.freeze(stub);
        Ok(stub)
    }
}

/// Scan `src` into a flat top-level element list, as if it were the body of
/// an implicit outer BLOCK!.
pub fn scan_str(arena: &mut Arena, symbols: &mut SymbolTable, src: &str) -> Result<Vec<Cell>> {
    let mut chars = src.chars().peekable();
    let elements = scan_elements(&mut chars, arena, symbols, None)?;
    Ok(elements)
}

fn skip_whitespace(chars: &mut Peekable<Chars>) {
    while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
        chars.next();
    }
}

/// Parse a run of elements up to (and consuming) `terminator`, or to
/// end-of-input if `terminator` is `None`.
fn scan_elements(
    chars: &mut Peekable<Chars>,
    arena: &mut Arena,
    symbols: &mut SymbolTable,
    terminator: Option<char>,
) -> Result<Vec<Cell>> {
    let mut out = Vec::new();
    loop {
        skip_whitespace(chars);
        match chars.peek() {
            None => {
                if terminator.is_some() {
                    bail!("unexpected end of input, expected {:?}", terminator.unwrap());
                }
                return Ok(out);
            }
            Some(&c) if Some(c) == terminator => {
                chars.next();
                return Ok(out);
            }
            _ => out.push(scan_value(chars, arena, symbols)?),
        }
    }
}

fn scan_value(chars: &mut Peekable<Chars>, arena: &mut Arena, symbols: &mut SymbolTable) -> Result<Cell> {
    let c = *chars.peek().expect("caller already checked for end-of-input");

    match c {
        '[' => {
            chars.next();
            let elements = scan_elements(chars, arena, symbols, Some(']'))?;
            let stub = arena.alloc(Flavor::Source, StubContent::Source(elements));
            arena.freeze(stub);
            let block = Cell::new(Heart::Block, Payload::List(stub));
            // A BLOCK! can itself be chained with a trailing `:` into a
            // SET-BLOCK!, the multi-return target form (spec.md §8.4 #3).
            return scan_sequence_tail(chars, arena, symbols, block);
        }
        '(' => {
            chars.next();
            let elements = scan_elements(chars, arena, symbols, Some(')'))?;
            let stub = arena.alloc(Flavor::Source, StubContent::Source(elements));
            arena.freeze(stub);
            return Ok(Cell::new(Heart::Group, Payload::List(stub)));
        }
        ',' => {
            chars.next();
            return Ok(Cell::new(Heart::Comma, Payload::None));
        }
        '@' | '^' | '$' | '&' => {
            chars.next();
            skip_whitespace(chars);
            let mut inner = scan_value(chars, arena, symbols)?;
            inner.set_sigil(Some(match c {
                '@' => Sigil::The,
                '^' => Sigil::Meta,
                '$' => Sigil::Bind,
                '&' => Sigil::TypeOf,
                _ => unreachable!(),
            }));
            return Ok(inner);
        }
        ':' => {
            chars.next();
            let target = scan_atom(chars, symbols)?;
            let segments = vec![Cell::new(Heart::Space, Payload::None), target];
            return Ok(Cell::new(Heart::Chain, Payload::Sequence(SequenceRepr::from_elements(segments, arena))));
        }
        _ => {}
    }

    let first = scan_atom(chars, symbols)?;
    scan_sequence_tail(chars, arena, symbols, first)
}

/// After a bare atom, greedily consume `. / :` continuations with no
/// intervening whitespace into a TUPLE!/PATH!/CHAIN! (spec.md §3.5).
fn scan_sequence_tail(
    chars: &mut Peekable<Chars>,
    arena: &mut Arena,
    symbols: &mut SymbolTable,
    first: Cell,
) -> Result<Cell> {
    let mut segments = vec![first];
    let mut heart: Option<Heart> = None;

    loop {
        let Some(&sep) = chars.peek() else { break };
        if !matches!(sep, '.' | '/' | ':') {
            break;
        }

        // A `:` immediately followed by whitespace/EOF/a closer is the
        // universal SET-form trailing marker (SET-WORD!/SET-TUPLE!/
        // SET-PATH!/SET-BLOCK!): it never decides the sequence's own
        // heart, just appends a trailing Space and ends the scan — so it
        // never conflicts with a `.`/`/` that chose the heart earlier.
        let mut lookahead = chars.clone();
        lookahead.next();
        let is_trailing_colon =
            sep == ':' && matches!(lookahead.peek(), None | Some(' ') | Some('\t') | Some('\r') | Some('\n') | Some(']') | Some(')') | Some(','));
        if is_trailing_colon {
            chars.next();
            segments.push(Cell::new(Heart::Space, Payload::None));
            heart.get_or_insert(Heart::Chain);
            break;
        }

        let this_heart = match sep {
            '.' => Heart::Tuple,
            '/' => Heart::Path,
            ':' => Heart::Chain,
            _ => unreachable!("checked above"),
        };
        if let Some(existing) = heart {
            if existing != this_heart {
                bail!("cannot mix '.', '/', ':' within one sequence literal");
            }
        }
        chars.next();
        heart = Some(this_heart);
        segments.push(scan_atom(chars, symbols)?);
    }

    if segments.len() == 1 {
        return Ok(segments.pop().expect("just pushed"));
    }
    let heart = heart.expect("multi-segment sequence always set its heart");
    Ok(Cell::new(heart, Payload::Sequence(SequenceRepr::from_elements(segments, arena))))
}

/// A single WORD! or INTEGER! token — the atoms that make up a sequence's
/// segments. Never itself a bracketed form or a further sequence.
fn scan_atom(chars: &mut Peekable<Chars>, symbols: &mut SymbolTable) -> Result<Cell> {
    let &c = chars.peek().ok_or_else(|| anyhow::anyhow!("unexpected end of input, expected a value"))?;

    if c == '-' || c.is_ascii_digit() {
        return scan_integer(chars);
    }
    if is_word_start(c) {
        let mut spelling = String::new();
        while matches!(chars.peek(), Some(&ch) if is_word_continue(ch)) {
            spelling.push(chars.next().expect("just peeked"));
        }
        let sym = symbols.intern(&spelling);
        return Ok(Cell::word(sym, Binding::Unbound));
    }
    bail!("unexpected character {c:?} while scanning")
}

fn scan_integer(chars: &mut Peekable<Chars>) -> Result<Cell> {
    let mut text = String::new();
    if matches!(chars.peek(), Some('-')) {
        text.push(chars.next().expect("just peeked"));
    }
    while matches!(chars.peek(), Some(c) if c.is_ascii_digit()) {
        text.push(chars.next().expect("just peeked"));
    }
    let value: i64 = text.parse().with_context(|| format!("invalid integer literal {text:?}"))?;
    Ok(Cell::integer(value))
}

fn is_word_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_word_continue(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '?' | '!')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_a_set_word_integer_and_plain_word() {
        let mut arena = Arena::new();
        let mut symbols = SymbolTable::new();
        let elements = scan_str(&mut arena, &mut symbols, "x: 5 x").unwrap();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].heart(), Heart::Chain);
        assert_eq!(elements[1], Cell::integer(5));
        assert_eq!(elements[2].heart(), Heart::Word);
    }

    #[test]
    fn scans_nested_blocks_and_groups() {
        let mut arena = Arena::new();
        let mut symbols = SymbolTable::new();
        let elements = scan_str(&mut arena, &mut symbols, "[1 (2 3)]").unwrap();
        assert_eq!(elements.len(), 1);
        let Payload::List(block_stub) = elements[0].payload() else { panic!("expected a BLOCK!") };
        let StubContent::Source(block_cells) = &arena.get(*block_stub).content else { unreachable!() };
        assert_eq!(block_cells.len(), 2);
        assert_eq!(block_cells[0], Cell::integer(1));
        assert_eq!(block_cells[1].heart(), Heart::Group);
    }

    #[test]
    fn scans_a_tuple_and_a_get_word() {
        let mut arena = Arena::new();
        let mut symbols = SymbolTable::new();
        let elements = scan_str(&mut arena, &mut symbols, "obj.field :x").unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].heart(), Heart::Tuple);
        assert_eq!(elements[1].heart(), Heart::Chain);
        let Payload::Sequence(repr) = elements[1].payload() else { panic!("expected a sequence payload") };
        assert!(repr.has_leading_space(&arena));
    }
}
