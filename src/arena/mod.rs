//! Arena & Stub Lifetimes (C2). A single growable pool of [`Stub`]s,
//! indexed by [`StubId`], with manual/managed lifetime and a stop-the-world
//! mark-sweep collector driven by the embedding's root provider
//! (spec.md §4.2, §6.1).

pub mod gc;
pub mod stub;

pub use stub::{Flavor, Stub, StubContent, StubFlags, StubId};

use anyhow::{ensure, Result};

/// Owns every [`Stub`] live in one interpreter instance. Never shared
/// across threads (spec.md §5: one arena per interpreter instance).
#[derive(Debug, Default)]
pub struct Arena {
    slots: Vec<Option<Stub>>,
    /// Indices of freed (manual, unreferenced) slots, reused by `alloc`.
    free_list: Vec<u32>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `page_size` slots up front, avoiding the first few
    /// reallocations a freshly-booted `Vm` would otherwise pay for.
    pub fn with_capacity(page_size: usize) -> Self {
        Arena { slots: Vec::with_capacity(page_size), free_list: Vec::new() }
    }

    /// Allocate a stub. Starts out on the manual list (`MANAGED` unset)
    /// until [`Arena::promote`] hands it to the GC, matching spec.md
    /// §3.2's "manual allocation list until promoted".
    pub fn alloc(&mut self, flavor: Flavor, content: StubContent) -> StubId {
        let stub = Stub {
            flavor,
            flags: StubFlags::EMPTY,
            content,
            guard_count: 0,
            marked: false,
        };
        if let Some(index) = self.free_list.pop() {
            self.slots[index as usize] = Some(stub);
            StubId(index)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Some(stub));
            StubId(index)
        }
    }

    pub fn get(&self, id: StubId) -> &Stub {
        self.slots[id.0 as usize]
            .as_ref()
            .expect("use of a freed stub")
    }

    pub fn get_mut(&mut self, id: StubId) -> &mut Stub {
        self.slots[id.0 as usize]
            .as_mut()
            .expect("use of a freed stub")
    }

    /// Hand a manually-allocated stub to the GC; it survives from then on
    /// only while reachable from a root.
    pub fn promote(&mut self, id: StubId) {
        self.get_mut(id).flags.insert(StubFlags::MANAGED);
    }

    /// Free a manual stub immediately. Panics (a programming error, per
    /// spec.md §4.2) if the stub is already GC-managed or still guarded.
    pub fn free_manual(&mut self, id: StubId) {
        let stub = self.get(id);
        assert!(
            !stub.is_managed(),
            "free_manual called on a GC-managed stub"
        );
        assert!(!stub.is_guarded(), "free_manual called on a guarded stub");
        self.slots[id.0 as usize] = None;
        self.free_list.push(id.0);
    }

    /// Pin a stub against collection for the duration of a critical
    /// section. Returns a token whose `Drop` unguards it, so call sites
    /// can't forget to release the guard on an early return.
    pub fn guard(&mut self, id: StubId) -> gc::GuardToken {
        self.get_mut(id).guard_count += 1;
        gc::GuardToken(id)
    }

    pub(crate) fn unguard(&mut self, id: StubId) {
        let stub = self.get_mut(id);
        assert!(stub.guard_count > 0, "unguard without matching guard");
        stub.guard_count -= 1;
    }

    pub fn mutate(&mut self, id: StubId) -> Result<&mut Stub> {
        let stub = self.get_mut(id);
        ensure!(!stub.is_frozen(), "attempt to mutate a frozen stub");
        Ok(stub)
    }

    pub fn freeze(&mut self, id: StubId) {
        self.get_mut(id).flags.insert(StubFlags::FROZEN);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn iter_live(&self) -> impl Iterator<Item = (StubId, &Stub)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (StubId(i as u32), s)))
    }

    pub(crate) fn iter_live_mut(
        &mut self,
    ) -> impl Iterator<Item = (StubId, &mut Stub)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|s| (StubId(i as u32), s)))
    }

    pub(crate) fn clear_mark(&mut self, id: StubId) {
        self.get_mut(id).marked = false;
    }

    pub(crate) fn set_mark(&mut self, id: StubId) -> bool {
        let stub = self.get_mut(id);
        let was_marked = stub.marked;
        stub.marked = true;
        was_marked
    }

    pub(crate) fn is_marked(&self, id: StubId) -> bool {
        self.get(id).marked
    }

    pub(crate) fn free_unmarked_managed(&mut self) -> usize {
        let mut freed = 0;
        for index in 0..self.slots.len() {
            let should_free = matches!(
                &self.slots[index],
                Some(s) if s.is_managed() && !s.marked && !s.is_guarded()
            );
            if should_free {
                self.slots[index] = None;
                self.free_list.push(index as u32);
                freed += 1;
            }
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_reuses_freed_slots() {
        let mut arena = Arena::new();
        let a = arena.alloc(Flavor::Source, StubContent::Source(Vec::new()));
        arena.free_manual(a);
        let b = arena.alloc(Flavor::Source, StubContent::Source(Vec::new()));
        assert_eq!(a, b, "freed manual slots should be recycled");
    }

    #[test]
    fn frozen_stub_rejects_mutation() {
        let mut arena = Arena::new();
        let a = arena.alloc(Flavor::Source, StubContent::Source(Vec::new()));
        arena.freeze(a);
        assert!(arena.mutate(a).is_err());
    }

    #[test]
    #[should_panic(expected = "guarded")]
    fn guarded_stub_cannot_be_freed() {
        let mut arena = Arena::new();
        let a = arena.alloc(Flavor::Source, StubContent::Source(Vec::new()));
        let _token = arena.guard(a);
        arena.free_manual(a);
    }
}
