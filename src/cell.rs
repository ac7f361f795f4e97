//! Cell & Lift Protocol (C1). The uniform tagged value every subsystem
//! passes around. See spec.md §3.1, §4.1.

use crate::arena::StubId;
use crate::macros::bitflags_like;
use crate::symbol::{self, Symbol};

/// The primary-kind byte. Independent of quoting/antiform state.
/// Mirrors the heart list named across spec.md §3.1, §3.5, §6.2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Heart {
    Integer,
    Word,
    Block,
    Group,
    Fence,
    Tuple,
    Chain,
    Path,
    /// Stable value heart for a built frame (an action call in progress,
    /// or a captured call for [`crate::action`]'s enclose). Its antiform
    /// is ACTION.
    Frame,
    /// Stable error-object heart ("WARNING" per spec.md §3.1: "ERROR =
    /// antiform WARNING"). A plain WARNING value is just data; only its
    /// antiform form is treated as a propagating signal.
    Warning,
    Text,
    File,
    Tag,
    Rune,
    Blob,
    Comma,
    /// The "absent value" heart; its antiform is VOID.
    Space,
    Object,
    Port,
    Module,
    /// Unstable-only heart for a not-yet-forced lazy computation; never
    /// appears except as an antiform (spec.md §3.1's unstable list).
    Lazy,
}

impl Heart {
    /// Whether this heart admits the antiform (out-of-band signal) state
    /// at all. Only a subset of hearts do (spec.md §3.1).
    pub fn is_antiform_eligible(self) -> bool {
        matches!(
            self,
            Heart::Frame
                | Heart::Warning
                | Heart::Group
                | Heart::Word
                | Heart::Block
                | Heart::Comma
                | Heart::Space
                | Heart::Lazy
        )
    }

    /// Antiforms of this heart that are *unstable*: they may exist
    /// transiently in OUT but can never be copied into a variable slot
    /// (spec.md §3.1).
    pub fn antiform_is_unstable(self) -> bool {
        matches!(self, Heart::Block | Heart::Warning | Heart::Comma | Heart::Lazy)
    }
}

/// `@ ^ $ &` — a visible decoration preserved through binding
/// (spec.md §3.1, §4.8 step 3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sigil {
    /// `@` THE — literal value, binding preserved.
    The,
    /// `^` META — lift the next element's evaluated result.
    Meta,
    /// `$` — rebind at the current context.
    Bind,
    /// `&` TYPE OF.
    TypeOf,
}

bitflags_like! {
    pub struct CellFlags: u8 {
        const NEWLINE_BEFORE = 1 << 0;
        const PROTECTED      = 1 << 1;
        const CONST          = 1 << 2;
        const LEADING_SPACE  = 1 << 3;
        const UNREADABLE     = 1 << 4;
    }
}

/// The lift byte: how many quote levels are on top of the base value, or
/// whether it is instead the "rendered `~x~`" quasi state. Exactly one of
/// `NoQuote`/`Quasi`/`Quoted(n)`, `n >= 1` (spec.md §3.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiftByte {
    NoQuote,
    Quasi,
    Quoted(u8),
}

impl LiftByte {
    pub fn quote_depth(self) -> u8 {
        match self {
            LiftByte::NoQuote | LiftByte::Quasi => 0,
            LiftByte::Quoted(n) => n,
        }
    }
}

/// The binding of a word or sequence: a context it resolves in, or
/// unbound. Contexts are referenced through the same arena as everything
/// else (spec.md §4.3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    Unbound,
    Context(StubId),
}

/// Per-heart content. Deliberately modeled as a Rust enum rather than the
/// C implementation's raw two-slots-plus-extra-word layout: spec.md's
/// Non-goals explicitly waive bit-exact layout, and an enum is the
/// idiomatic way to express "interpretation determined by Heart"
/// (spec.md §3.1) without a pile of `unsafe` union accessors.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    None,
    Integer(i64),
    Word {
        symbol: Symbol,
        binding: Binding,
    },
    /// BLOCK!/GROUP!/FENCE! and other list-like values: a SOURCE stub.
    List(StubId),
    /// PATH!/CHAIN!/TUPLE!: see [`crate::value::sequence`].
    Sequence(crate::value::sequence::SequenceRepr),
    /// FRAME!: references a varlist built for a specific action.
    Frame {
        varlist: StubId,
        /// The action this frame was built to call; `None` once the
        /// call has returned and the varlist is kept only as a plain
        /// captured frame (spec.md §4.9 "enclose").
        action: Option<StubId>,
    },
    /// WARNING!: references an ERROR-shaped varlist/object.
    Warning(StubId),
    Text(StubId),
    Blob(StubId),
    /// OBJECT!/PORT!/MODULE!: a context (varlist or sea).
    Context(StubId),
}

impl Payload {
    /// The single stub this payload keeps alive, if any — used by the GC
    /// trace (spec.md §4.2).
    pub fn referenced_stub(&self) -> Option<StubId> {
        match self {
            Payload::None | Payload::Integer(_) => None,
            Payload::Word { binding, .. } => match binding {
                Binding::Unbound => None,
                Binding::Context(id) => Some(*id),
            },
            Payload::List(id)
            | Payload::Warning(id)
            | Payload::Text(id)
            | Payload::Blob(id)
            | Payload::Context(id) => Some(*id),
            Payload::Sequence(repr) => repr.referenced_stub(),
            Payload::Frame { varlist, .. } => Some(*varlist),
        }
    }
}

/// The uniform tagged value. See spec.md §3.1.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    heart: Heart,
    lift: LiftByte,
    /// Meaningful only when `lift == NoQuote`; see
    /// [`Heart::is_antiform_eligible`].
    antiform: bool,
    sigil: Option<Sigil>,
    flags: CellFlags,
    payload: Payload,
}

impl Cell {
    pub fn new(heart: Heart, payload: Payload) -> Self {
        Cell {
            heart,
            lift: LiftByte::NoQuote,
            antiform: false,
            sigil: None,
            flags: CellFlags::EMPTY,
            payload,
        }
    }

    pub fn integer(value: i64) -> Self {
        Cell::new(Heart::Integer, Payload::Integer(value))
    }

    pub fn word(symbol: Symbol, binding: Binding) -> Self {
        Cell::new(Heart::Word, Payload::Word { symbol, binding })
    }

    /// The "uninitialized" distinguished state from spec.md §3.1's erase
    /// contract: reading it should trip an assertion, so it is flagged
    /// unreadable rather than given an ordinary heart.
    pub fn erased() -> Self {
        let mut cell = Cell::new(Heart::Space, Payload::None);
        cell.flags.insert(CellFlags::UNREADABLE);
        cell
    }

    /// A harmless placeholder used by tests and by slots that are
    /// logically "no value yet" but must be readable (e.g. freshly
    /// appended varlist slots before [`crate::context`] fills them in).
    pub fn none() -> Self {
        Cell::new(Heart::Space, Payload::None)
    }

    pub fn heart(&self) -> Heart {
        self.heart
    }

    pub fn lift_byte(&self) -> LiftByte {
        self.lift
    }

    pub fn sigil(&self) -> Option<Sigil> {
        self.sigil
    }

    pub fn set_sigil(&mut self, sigil: Option<Sigil>) {
        self.sigil = sigil;
    }

    pub fn flags(&self) -> CellFlags {
        self.flags
    }

    pub fn flags_mut(&mut self) -> &mut CellFlags {
        &mut self.flags
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    pub fn is_unreadable(&self) -> bool {
        self.flags.contains(CellFlags::UNREADABLE)
    }

    pub fn is_antiform(&self) -> bool {
        self.lift == LiftByte::NoQuote && self.antiform
    }

    /// `c` is stable iff it's not an antiform of one of the five
    /// inherently-transient hearts (spec.md §3.1).
    pub fn is_stable(&self) -> bool {
        !(self.is_antiform() && self.heart.antiform_is_unstable())
    }

    pub fn is_null(&self) -> bool {
        self.is_antiform()
            && self.heart == Heart::Word
            && matches!(&self.payload, Payload::Word { symbol, .. } if *symbol == symbol::low::NULL)
    }

    pub fn is_void(&self) -> bool {
        self.is_antiform() && self.heart == Heart::Space
    }

    pub fn is_ghost(&self) -> bool {
        self.is_antiform() && self.heart == Heart::Comma
    }

    pub fn is_action(&self) -> bool {
        self.is_antiform() && self.heart == Heart::Frame
    }

    pub fn is_error(&self) -> bool {
        self.is_antiform() && self.heart == Heart::Warning
    }

    pub fn is_pack(&self) -> bool {
        self.is_antiform() && self.heart == Heart::Block
    }

    pub fn is_splice(&self) -> bool {
        self.is_antiform() && self.heart == Heart::Group
    }

    pub fn null() -> Self {
        let mut cell = Cell::word(symbol::low::NULL, Binding::Unbound);
        cell.antiform = true;
        cell
    }

    pub fn okay() -> Self {
        let mut cell = Cell::word(symbol::low::TRUE, Binding::Unbound);
        cell.antiform = true;
        cell
    }

    pub fn void() -> Self {
        let mut cell = Cell::new(Heart::Space, Payload::None);
        cell.antiform = true;
        cell
    }

    pub fn ghost() -> Self {
        let mut cell = Cell::new(Heart::Comma, Payload::None);
        cell.antiform = true;
        cell
    }

    pub fn pack(items: StubId) -> Self {
        let mut cell = Cell::new(Heart::Block, Payload::List(items));
        cell.antiform = true;
        cell
    }

    pub fn splice(group: StubId) -> Self {
        let mut cell = Cell::new(Heart::Group, Payload::List(group));
        cell.antiform = true;
        cell
    }

    pub fn action(varlist: StubId) -> Self {
        let mut cell = Cell::new(
            Heart::Frame,
            Payload::Frame {
                varlist,
                action: Some(varlist),
            },
        );
        cell.antiform = true;
        cell
    }

    pub fn error(object: StubId) -> Self {
        let mut cell = Cell::new(Heart::Warning, Payload::Warning(object));
        cell.antiform = true;
        cell
    }

    /// Turn this cell into its own antiform in place, if its heart admits
    /// one. Errors (as a Rust `Result`, not an ERROR antiform — this is a
    /// host-level invariant check) if the heart doesn't support it
    /// (spec.md §4.1).
    pub fn antiformize(mut self) -> anyhow::Result<Self> {
        anyhow::ensure!(
            self.lift == LiftByte::NoQuote,
            "antiformize requires a NOQUOTE cell"
        );
        anyhow::ensure!(
            self.heart.is_antiform_eligible(),
            "heart {:?} cannot be an antiform",
            self.heart
        );
        self.antiform = true;
        Ok(self)
    }

    pub fn deantiformize(mut self) -> anyhow::Result<Self> {
        anyhow::ensure!(self.is_antiform(), "deantiformize requires an antiform");
        self.antiform = false;
        Ok(self)
    }

    /// LIFT: NOQUOTE -> QUOTED1 -> QUOTED2 ...; antiform -> QUASI.
    /// Always produces a storable (stable) value (spec.md §3.1, §4.1).
    pub fn lift(mut self) -> Self {
        if self.is_antiform() {
            self.antiform = false;
            self.lift = LiftByte::Quasi;
            return self;
        }
        self.lift = match self.lift {
            LiftByte::NoQuote => LiftByte::Quoted(1),
            LiftByte::Quasi => LiftByte::Quoted(1), // one quote atop a quasi literal
            LiftByte::Quoted(n) => LiftByte::Quoted(n + 1),
        };
        self
    }

    /// UNLIFT: the partial inverse of [`Cell::lift`]. QUASI -> antiform;
    /// QUOTED(n>1) -> QUOTED(n-1); QUOTED(1) -> NOQUOTE.
    pub fn unlift(mut self) -> anyhow::Result<Self> {
        match self.lift {
            LiftByte::Quasi => {
                self.lift = LiftByte::NoQuote;
                self.antiform = true;
                Ok(self)
            }
            LiftByte::Quoted(1) => {
                self.lift = LiftByte::NoQuote;
                Ok(self)
            }
            LiftByte::Quoted(n) => {
                self.lift = LiftByte::Quoted(n - 1);
                Ok(self)
            }
            LiftByte::NoQuote => anyhow::bail!("unlift requires a lifted (QUASI/QUOTED) cell"),
        }
    }

    pub fn quotify(mut self, n: u8) -> Self {
        if self.is_antiform() {
            self = self.lift(); // antiform first unlifts to quasi (spec.md §4.1)
        }
        self.lift = match self.lift {
            LiftByte::NoQuote => LiftByte::Quoted(n),
            LiftByte::Quasi => {
                if n == 0 {
                    LiftByte::Quasi
                } else {
                    LiftByte::Quoted(n)
                }
            }
            LiftByte::Quoted(existing) => LiftByte::Quoted(existing + n),
        };
        self
    }

    pub fn unquotify(mut self, n: u8) -> anyhow::Result<Self> {
        match self.lift {
            LiftByte::Quoted(existing) => {
                anyhow::ensure!(existing >= n, "unquotify: not enough quote levels");
                self.lift = if existing == n {
                    LiftByte::NoQuote
                } else {
                    LiftByte::Quoted(existing - n)
                };
                Ok(self)
            }
            LiftByte::NoQuote if n == 0 => Ok(self),
            _ => anyhow::bail!("unquotify: cell has no quote levels"),
        }
    }

    pub fn quasify(mut self) -> anyhow::Result<Self> {
        anyhow::ensure!(
            self.lift == LiftByte::NoQuote && !self.antiform,
            "quasify requires a plain NOQUOTE value"
        );
        anyhow::ensure!(
            self.heart.is_antiform_eligible(),
            "heart {:?} has no quasi/antiform form",
            self.heart
        );
        self.lift = LiftByte::Quasi;
        Ok(self)
    }

    pub fn unquasify(mut self) -> anyhow::Result<Self> {
        anyhow::ensure!(self.lift == LiftByte::Quasi, "unquasify requires a QUASI cell");
        self.lift = LiftByte::NoQuote;
        Ok(self)
    }

    /// Reduce an unstable antiform to a stable value, per spec.md §4.1:
    /// PACK decays to its first element (or errors if empty), LAZY
    /// reifies then decays, ERROR propagates (returned unchanged — the
    /// caller is expected to escalate via [`crate::error`]).
    pub fn decay_if_unstable(self, arena: &crate::arena::Arena) -> anyhow::Result<Self> {
        if !self.is_antiform() {
            return Ok(self);
        }
        match self.heart {
            Heart::Block => {
                let Payload::List(stub) = self.payload else {
                    unreachable!("PACK antiform must carry a List payload")
                };
                let crate::arena::StubContent::Source(items) = &arena.get(stub).content else {
                    anyhow::bail!("PACK payload is not a SOURCE stub")
                };
                let first = items
                    .first()
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("decay of an empty PACK"))?;
                first.unlift()
            }
            Heart::Warning => Ok(self), // propagate; escalation is the caller's job
            Heart::Comma => anyhow::bail!("decay of a GHOST (barrier) antiform"),
            Heart::Lazy => anyhow::bail!("LAZY reification is not implemented by this engine"),
            _ => Ok(self),
        }
    }

    /// Erase `self`, returning its prior contents. Mirrors the spec's
    /// "move leaves source erased" contract (spec.md §4.1).
    pub fn take(&mut self) -> Self {
        std::mem::replace(self, Cell::erased())
    }

    /// Assert stability before copying into a variable slot (spec.md
    /// §4.1: "attempting to store an unstable cell is a programming
    /// error and panics").
    pub fn assert_storable(&self) {
        assert!(
            self.is_stable(),
            "attempt to store an unstable antiform ({:?}) in a variable slot",
            self.heart
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Cell::integer(3))]
    #[case(Cell::word(symbol::low::SELF, Binding::Unbound))]
    fn unlift_lift_round_trips_for_stable_cells(#[case] cell: Cell) {
        let lifted = cell.clone().lift();
        let back = lifted.unlift().unwrap();
        assert_eq!(cell, back);
    }

    #[test]
    fn null_is_a_stable_antiform() {
        let n = Cell::null();
        assert!(n.is_antiform());
        assert!(n.is_stable());
        assert!(n.is_null());
    }

    #[test]
    fn pack_is_unstable() {
        let mut arena = crate::arena::Arena::new();
        let items = arena.alloc(
            crate::arena::Flavor::Source,
            crate::arena::StubContent::Source(vec![]),
        );
        let p = Cell::pack(items);
        assert!(p.is_antiform());
        assert!(!p.is_stable());
    }

    #[test]
    #[should_panic(expected = "unstable antiform")]
    fn storing_an_unstable_antiform_panics() {
        let mut arena = crate::arena::Arena::new();
        let items = arena.alloc(
            crate::arena::Flavor::Source,
            crate::arena::StubContent::Source(vec![]),
        );
        Cell::pack(items).assert_storable();
    }

    #[test]
    fn quasify_unquasify_round_trips() {
        let word = Cell::word(symbol::low::SELF, Binding::Unbound);
        let quasi = word.clone().quasify().unwrap();
        assert_eq!(quasi.lift_byte(), LiftByte::Quasi);
        let back = quasi.unquasify().unwrap();
        assert_eq!(back, word);
    }

    #[test]
    fn quotify_on_antiform_unlifts_then_quotes() {
        let n = Cell::null();
        let quoted = n.quotify(1);
        assert_eq!(quoted.lift_byte(), LiftByte::Quoted(1));
        assert!(!quoted.is_antiform());
    }

    #[test]
    fn decay_of_empty_pack_is_an_error() {
        let mut arena = crate::arena::Arena::new();
        let items = arena.alloc(
            crate::arena::Flavor::Source,
            crate::arena::StubContent::Source(vec![]),
        );
        let p = Cell::pack(items);
        assert!(p.decay_if_unstable(&arena).is_err());
    }

    #[test]
    fn decay_of_pack_returns_first_element_unlifted() {
        let mut arena = crate::arena::Arena::new();
        let lifted_ten = Cell::integer(10).lift();
        let items = arena.alloc(
            crate::arena::Flavor::Source,
            crate::arena::StubContent::Source(vec![lifted_ten, Cell::integer(20).lift()]),
        );
        let p = Cell::pack(items);
        let decayed = p.decay_if_unstable(&arena).unwrap();
        assert_eq!(decayed, Cell::integer(10));
    }
}
