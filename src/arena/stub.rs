//! The Stub: a heap-managed container. See spec.md §3.2.

use crate::cell::Cell;
use crate::macros::bitflags_like;
use crate::symbol::Symbol;

/// Handle to a stub in the [`super::Arena`]. Cheap to copy; stable across
/// GC sweeps (the arena never moves live stubs).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StubId(pub(crate) u32);

/// Which concrete shape a stub carries. Mirrors the table in spec.md §3.2;
/// this tag is the "flavor byte" that selects marking/teardown behavior
/// (spec.md §9's "multiple inheritance of behavior" note).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flavor {
    /// Sequence of cells: BLOCK!, GROUP!, FENCE!, and other list-like values.
    Source,
    /// Interned UTF-8 word spelling. Not heap-duplicated; see [`crate::symbol`].
    SymbolSpelling,
    /// UTF-8 string data backing TEXT!, FILE!, TAG!, RUNE!.
    Strand,
    /// Raw bytes backing BLOB!.
    Binary,
    /// Ordered keys (symbols) of a varlist-style context.
    Keylist,
    /// Cells at indices matching a keylist; index 0 is the rootvar.
    Varlist,
    /// Header-only marker identifying a sea-style context.
    Sea,
    /// One variable slot of a sea context, chained off its symbol.
    Patch,
    /// Exactly two cells, no dynamic buffer.
    Pairing,
}

bitflags_like! {
    /// Per-stub bits, independent of flavor.
    pub struct StubFlags: u8 {
        const MANAGED          = 1 << 0;
        const SHARED_KEYLIST    = 1 << 1;
        const FIXED_SIZE        = 1 << 2;
        const FROZEN            = 1 << 3;
        const NEWLINE_AT_TAIL   = 1 << 4;
    }
}

/// The content a stub carries, shaped by its [`Flavor`].
#[derive(Clone, Debug)]
pub enum StubContent {
    Source(Vec<Cell>),
    SymbolSpelling(String),
    Strand(String),
    Binary(Vec<u8>),
    Keylist(Vec<Symbol>),
    /// `cells[0]` is the rootvar; variables start at `cells[1]`.
    Varlist {
        keylist: StubId,
        cells: Vec<Cell>,
    },
    Sea,
    Patch {
        sea: StubId,
        symbol: Symbol,
        value: Cell,
        /// Next patch in the circular chain hung off `symbol`.
        next: Option<StubId>,
    },
    Pairing([Cell; 2]),
}

#[derive(Clone, Debug)]
pub struct Stub {
    pub flavor: Flavor,
    pub flags: StubFlags,
    pub content: StubContent,
    /// Incremented each time the GC guards this stub; nonzero pins it
    /// against collection regardless of the managed bit (spec.md §4.2).
    pub(crate) guard_count: u32,
    /// Scratch bit used by the mark phase; cleared after each sweep.
    pub(crate) marked: bool,
}

impl Stub {
    pub fn is_frozen(&self) -> bool {
        self.flags.contains(StubFlags::FROZEN)
    }

    pub fn is_managed(&self) -> bool {
        self.flags.contains(StubFlags::MANAGED)
    }

    pub fn is_guarded(&self) -> bool {
        self.guard_count > 0
    }
}
