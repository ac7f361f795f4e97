//! Mark-and-sweep collector driven by an embedder-supplied root provider
//! (spec.md §6.1, §9's "cyclic references" note).

use super::{Arena, StubId};

/// A stub pinned during a critical section (spec.md §4.2's "guarded"
/// stubs). Release with [`Arena::unguard`] — explicit, paired calls, per
/// the embedding interface in spec.md §6.1, rather than RAII: a guard can
/// legitimately outlive the stack frame that created it (e.g. held across
/// several trampoline bounces).
#[derive(Debug)]
pub struct GuardToken(pub(crate) StubId);

impl GuardToken {
    pub fn id(&self) -> StubId {
        self.0
    }
}

/// Anything that can enumerate the stubs currently reachable as roots:
/// the data stack, level cells (spare/output), root-protected cells, and
/// the symbol table's patch chains. The trampoline and symbol table
/// implement this; the collector itself stays agnostic of call-stack
/// shape (spec.md §6.1).
pub trait RootProvider {
    fn for_each_root(&self, visit: &mut dyn FnMut(StubId));
}

/// Trace every root, marking stubs reachable from it (transitively, via
/// each stub's own child references), then free any GC-managed stub left
/// unmarked and unguarded.
pub fn collect(arena: &mut Arena, roots: &dyn RootProvider) -> usize {
    for (id, _) in arena.iter_live() {
        arena.clear_mark(id);
    }

    let mut worklist = Vec::new();
    roots.for_each_root(&mut |id| worklist.push(id));

    while let Some(id) = worklist.pop() {
        if arena.set_mark(id) {
            continue; // already visited
        }
        for child in children_of(arena, id) {
            worklist.push(child);
        }
    }

    arena.free_unmarked_managed()
}

/// Enumerate the stub ids a stub directly references, so the collector can
/// trace through containers without each flavor needing its own marking
/// entry point registered elsewhere (spec.md §9 "flavor-specific flags
/// which link/misc/info slots need marking" — modeled here as one match
/// instead of per-flavor vtables, since Rust enums already give us that).
fn children_of(arena: &Arena, id: StubId) -> Vec<StubId> {
    use crate::cell::Payload;
    use super::StubContent;

    let stub = arena.get(id);
    let mut out = Vec::new();
    let mut visit_cell_payload = |payload: &Payload| {
        if let Some(child) = payload.referenced_stub() {
            out.push(child);
        }
    };
    match &stub.content {
        StubContent::Source(cells) => {
            for cell in cells {
                visit_cell_payload(cell.payload());
            }
        }
        StubContent::Varlist { keylist, cells } => {
            out.push(*keylist);
            for cell in cells {
                visit_cell_payload(cell.payload());
            }
        }
        StubContent::Patch { sea, value, next, .. } => {
            out.push(*sea);
            visit_cell_payload(value.payload());
            if let Some(next) = next {
                out.push(*next);
            }
        }
        StubContent::Pairing(cells) => {
            for cell in cells {
                visit_cell_payload(cell.payload());
            }
        }
        StubContent::Keylist(_)
        | StubContent::SymbolSpelling(_)
        | StubContent::Strand(_)
        | StubContent::Binary(_)
        | StubContent::Sea => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Flavor, StubContent};
    use crate::cell::Cell;

    struct NoRoots;
    impl RootProvider for NoRoots {
        fn for_each_root(&self, _visit: &mut dyn FnMut(StubId)) {}
    }

    #[test]
    fn unreachable_managed_stub_is_collected() {
        let mut arena = Arena::new();
        let id = arena.alloc(Flavor::Source, StubContent::Source(vec![Cell::none()]));
        arena.promote(id);
        let freed = collect(&mut arena, &NoRoots);
        assert_eq!(freed, 1);
    }

    #[test]
    fn guarded_stub_survives_collection() {
        let mut arena = Arena::new();
        let id = arena.alloc(Flavor::Source, StubContent::Source(Vec::new()));
        arena.promote(id);
        let _token = arena.guard(id);
        let freed = collect(&mut arena, &NoRoots);
        assert_eq!(freed, 0);
    }
}
