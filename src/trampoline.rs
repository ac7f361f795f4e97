//! Trampoline & Executors (C7). See spec.md §4.7.
//!
//! [`Trampoline::run`] is the single loop that drives every Level to
//! completion: it never recurses through the host call stack to evaluate
//! a nested GROUP!, dispatch an action, or fill an argument. Each of
//! those instead pushes its own Level and returns [`Step::Continue`], and
//! `run` steps whichever Level is on top until the one it was asked to
//! drive (`floor`) finishes. `src/stepper.rs`'s `step_eval` and
//! `src/action.rs`'s `step_action` are the two executors Levels resume
//! through and are the only things that see a [`Step`]; everything else
//! in the crate (`dispatch`, `eval_one`, `eval_source_stub`, ...) is a
//! thin entry point that pushes one Level, calls `Trampoline::run`, and
//! gets back the narrower [`Bounce`] (no `Continue` case — it never
//! escapes the loop).

use crate::arena::{gc::RootProvider, StubId};
use crate::cell::Cell;
use crate::error::ThrowLabel;
use crate::feed::Feed;
use crate::level::{Executor, Level, LevelBody, LevelId};
use crate::vm::Vm;

/// What one call to `step_eval`/`step_action` produced: a finished value,
/// a throw unwinding toward a catch boundary, or a request to keep
/// driving the Level stack because a child Level was just pushed (spec.md
/// §4.7, §9). Internal to [`Trampoline::run`]'s loop — `Continue` never
/// escapes it.
#[derive(Debug)]
pub enum Step {
    Done(Cell),
    Continue,
    Thrown { label: ThrowLabel, value: Cell },
}

/// What driving a Level stack to completion produced: a finished value or
/// an unhandled throw. The public shape every entry point
/// (`action::dispatch*`, `stepper::eval_*`) returns.
#[derive(Debug)]
pub enum Bounce {
    Done(Cell),
    Thrown { label: ThrowLabel, value: Cell },
}

/// The Level stack. One per [`crate::vm::Vm`].
#[derive(Debug, Default)]
pub struct Trampoline {
    stack: Vec<Level>,
}

impl Trampoline {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_id(&self) -> Option<LevelId> {
        if self.stack.is_empty() {
            None
        } else {
            Some(LevelId((self.stack.len() - 1) as u32))
        }
    }

    /// Push a Level, chaining its `prior` to the current top (spec.md
    /// §3.6).
    pub fn push_level(&mut self, mut level: Level) -> LevelId {
        level.prior = self.current_id();
        self.stack.push(level);
        LevelId((self.stack.len() - 1) as u32)
    }

    pub fn pop_level(&mut self) -> Option<Level> {
        self.stack.pop()
    }

    pub fn current(&self) -> Option<&Level> {
        self.stack.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut Level> {
        self.stack.last_mut()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Drive the Level stack until it returns to `floor` levels deep
    /// (the height it was at when the caller pushed its own Level),
    /// looping on [`Bounce::Continue`] and propagating a finished value or
    /// throw up through however many Levels are in between. Every entry
    /// point in the crate (`action::dispatch*`, `stepper::eval_*`) pushes
    /// exactly one Level, records `floor = vm.trampoline.depth()` from
    /// *before* that push, and calls this.
    ///
    /// Returns the feed reclaimed from the Level that finished at
    /// `floor`, if that Level was marked [`Level::return_feed_to_parent`]
    /// — the caller restores it into its own `&mut Feed`, if it has one.
    pub fn run(vm: &mut Vm, floor: usize) -> (Bounce, Option<Feed>) {
        loop {
            let executor = vm
                .trampoline
                .current()
                .expect("Trampoline::run requires a level on top")
                .executor;
            let step = match executor {
                Executor::Eval => crate::stepper::step_eval(vm),
                Executor::Action => crate::action::step_action(vm),
            };
            match step {
                Step::Continue => {}
                Step::Done(value) => {
                    let popped = vm.trampoline.pop_level().expect("level was on top");
                    vm.data_stack.reset_to(popped.baseline);
                    let return_feed = popped.return_feed_to_parent;
                    let feed = popped.into_feed();
                    if vm.trampoline.depth() == floor {
                        return (Bounce::Done(value), if return_feed { feed } else { None });
                    }
                    let top = vm
                        .trampoline
                        .current_mut()
                        .expect("depth > floor implies a level remains");
                    if return_feed {
                        if let Some(feed) = feed {
                            top.accept_feed(feed);
                        }
                    }
                    top.pending_value = Some(value);
                }
                Step::Thrown { label, value } => {
                    loop {
                        if vm.trampoline.depth() <= floor {
                            return (Bounce::Thrown { label, value }, None);
                        }
                        let top = vm
                            .trampoline
                            .current_mut()
                            .expect("depth > floor implies a level exists");
                        if top.catch.as_ref().is_some_and(|c| c.label == label) {
                            top.begin_catch(value);
                            break;
                        }
                        let popped = vm.trampoline.pop_level().expect("checked depth > floor");
                        vm.data_stack.reset_to(popped.baseline);
                    }
                }
            }
        }
    }
}

impl RootProvider for Trampoline {
    fn for_each_root(&self, visit: &mut dyn FnMut(StubId)) {
        for level in &self.stack {
            if let Some(frame) = level.frame {
                visit(frame);
            }
            match &level.body {
                LevelBody::Eval(state) => {
                    if let Some(id) = state.acc.payload().referenced_stub() {
                        visit(id);
                    }
                    for cell in state.feed.remaining_cells() {
                        if let Some(id) = cell.payload().referenced_stub() {
                            visit(id);
                        }
                    }
                    if let Some((_, value)) = &state.caught {
                        if let Some(id) = value.payload().referenced_stub() {
                            visit(id);
                        }
                    }
                }
                LevelBody::Action(state) => {
                    if let Some(left) = &state.left {
                        if let Some(id) = left.payload().referenced_stub() {
                            visit(id);
                        }
                    }
                    if let Some(feed) = &state.feed {
                        for cell in feed.remaining_cells() {
                            if let Some(id) = cell.payload().referenced_stub() {
                                visit(id);
                            }
                        }
                    }
                }
            }
            if let Some(value) = &level.pending_value {
                if let Some(id) = value.payload().referenced_stub() {
                    visit(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_stack::Baseline;

    #[test]
    fn push_then_pop_restores_empty_stack() {
        let mut trampoline = Trampoline::new();
        let baseline = Baseline::default();
        trampoline.push_level(Level::new_eval(Feed::default(), true, false, true, baseline, None, false));
        assert_eq!(trampoline.depth(), 1);
        trampoline.pop_level();
        assert_eq!(trampoline.depth(), 0);
    }

    #[test]
    fn nested_levels_chain_prior_pointers() {
        let mut trampoline = Trampoline::new();
        let baseline = Baseline::default();
        let outer = trampoline.push_level(Level::new_eval(Feed::default(), true, false, true, baseline, None, false));
        let _inner = trampoline.push_level(Level::new_eval(Feed::default(), true, false, true, baseline, None, false));
        assert_eq!(trampoline.current().unwrap().prior, Some(outer));
    }
}
