//! Level (C6): the per-operation execution-frame record. See spec.md
//! §3.6, §4.7.
//!
//! A Level pairs an [`Executor`] (which stepping function resumes it) with
//! a [`LevelBody`] carrying that executor's own resumption state — spec.md
//! §3.6's "pointer to executor function" plus "one-byte state for
//! resumption", here an enum tag and its payload rather than a raw byte,
//! since Rust's enum already encodes both. `src/trampoline.rs`'s
//! `Trampoline::run` is the only thing that steps a Level; it never
//! recurses through the host call stack to do it (spec.md §4.7).

use crate::arena::StubId;
use crate::cell::Cell;
use crate::data_stack::Baseline;
use crate::error::ThrowLabel;
use crate::feed::{Feed, FeedBinding};
use crate::macros::bitflags_like;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LevelId(pub(crate) u32);

bitflags_like! {
    pub struct LevelFlags: u8 {
        const FULFILLING_ARG   = 1 << 0;
        const META_RESULT      = 1 << 1;
        const RAISED_RESULT_OK = 1 << 2;
        const BARRIER_SEEN     = 1 << 3;
    }
}

/// Which stepping function in `src/trampoline.rs`'s `Trampoline::run`
/// drives this level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Executor {
    /// `src/stepper.rs`'s `step_eval` — stepping a feed to a value.
    Eval,
    /// `src/action.rs`'s `step_action` — fulfilling an action's arguments,
    /// then dispatching.
    Action,
}

/// Where a re-stepped Eval level picks back up (spec.md §4.8's step
/// sequence, spelled out as resumption points rather than a single
/// recursive call).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalResume {
    /// About to dispatch on the feed's current element.
    Primary,
    /// A primary value is in hand; check for an enfix word to its right.
    Lookahead,
    /// Waiting on a pushed child level's result before anything else can
    /// happen (no work of this level's own to do meanwhile).
    AwaitChild,
}

/// What a pending child value means to the level that spawned the child —
/// recorded on the parent's [`EvalState`] at push time so the parent's
/// next step knows how to use the value once it arrives (spec.md §4.7's
/// suspension points: GROUP! bodies, action dispatch, SET right-hand
/// sides, and SET-BLOCK! right-hand sides each resume differently).
#[derive(Clone, Debug)]
pub enum PendingOp {
    /// A GROUP!'s sub-evaluation, or an enfix right operand: use the
    /// value as this level's own primary/lookahead result.
    PrimaryValue,
    /// The right-hand side of a plain SET-form sequence: write it through
    /// `tweak::set` once it arrives.
    SetRhs { target: Cell, ambient: FeedBinding },
    /// The right-hand side of a SET-BLOCK!: distribute it across targets
    /// positionally once it arrives.
    SetBlockRhs { targets: StubId, ambient: FeedBinding },
}

/// A RESCUE/ENRESCUE catch boundary installed on an Eval level (spec.md
/// §4.10). `Trampoline::run`'s unwind checks every level's `catch` in
/// turn as a throw propagates outward.
#[derive(Clone, Copy, Debug)]
pub struct CatchSpec {
    pub label: ThrowLabel,
    /// `None` for ENRESCUE (resolve directly to the caught value); `Some`
    /// for RESCUE (call the handler action with the caught value).
    pub handler: Option<StubId>,
}

/// Resumption state for an [`Executor::Eval`] level.
#[derive(Debug)]
pub struct EvalState {
    pub feed: Feed,
    /// Keep stepping until the feed is exhausted (a whole block body)
    /// rather than stopping after one expression.
    pub until_end: bool,
    /// Never chase enfix lookahead — set for argument fulfillment and for
    /// an enfix action's own right-hand operand (spec.md §4.8's
    /// left-to-right, no-precedence order).
    pub no_lookahead: bool,
    /// Escalate an ERROR result to a throw once a primary value and its
    /// lookahead chain (if any) finish — set for every entry point except
    /// `eval_single`'s raw one-shot step, which argument fulfillment
    /// relies on staying an in-band value so it can apply its own
    /// per-parameter-class rule instead (spec.md §4.8 step 5).
    pub escalate: bool,
    /// The running/accumulated value: the last expression's result when
    /// `until_end`, or this step's result otherwise.
    pub acc: Cell,
    pub resume: EvalResume,
    pub op: Option<PendingOp>,
    /// Set by `Trampoline::run`'s unwind when a throw matched this
    /// level's `catch`; consumed by `step_eval` on its next step.
    pub caught: Option<(Option<StubId>, Cell)>,
}

/// Resumption state for an [`Executor::Action`] level.
#[derive(Debug)]
pub struct ActionState {
    pub action_id: StubId,
    pub frame: StubId,
    pub params_len: usize,
    /// How many parameters have been filled (or skipped) so far; equal to
    /// `params_len` once fulfillment is complete and dispatch is due.
    pub param_index: usize,
    /// The left operand, for an enfix call's first parameter.
    pub left: Option<Cell>,
    /// The feed arguments are pulled from, while fulfillment is pulling
    /// from one (absent for `dispatch_frame`/`dispatch_with_args`, whose
    /// frame arrives already filled).
    pub feed: Option<Feed>,
}

#[derive(Debug)]
pub enum LevelBody {
    Eval(EvalState),
    Action(ActionState),
}

/// An in-flight operation record (spec.md §3.6).
#[derive(Debug)]
pub struct Level {
    pub executor: Executor,
    pub body: LevelBody,
    pub flags: LevelFlags,
    /// The varlist this level is filling/calling, for `Executor::Action`.
    pub frame: Option<StubId>,
    /// Data-stack height at entry, for rollback on abort/completion
    /// (spec.md §3.7, §8.1) and for reading a CHAIN!'s pushed refinements
    /// (spec.md §4.5, §4.9).
    pub baseline: Baseline,
    pub prior: Option<LevelId>,
    /// A finished child level's result, set by `Trampoline::run` just
    /// before re-stepping this level.
    pub pending_value: Option<Cell>,
    pub catch: Option<CatchSpec>,
    /// Whether `Trampoline::run` should reclaim this level's feed into
    /// the new top level once this one finishes — true only for
    /// same-feed continuations (argument fulfillment, SET right-hand
    /// sides, prefix/enfix action dispatch); false for a brand-new feed
    /// nothing is waiting to get back (GROUP! bodies, func/rescue
    /// bodies).
    pub return_feed_to_parent: bool,
}

impl Level {
    #[allow(clippy::too_many_arguments)]
    pub fn new_eval(
        feed: Feed,
        until_end: bool,
        no_lookahead: bool,
        escalate: bool,
        baseline: Baseline,
        prior: Option<LevelId>,
        return_feed_to_parent: bool,
    ) -> Self {
        Level {
            executor: Executor::Eval,
            body: LevelBody::Eval(EvalState {
                feed,
                until_end,
                no_lookahead,
                escalate,
                acc: Cell::ghost(),
                resume: EvalResume::Primary,
                op: None,
                caught: None,
            }),
            flags: LevelFlags::EMPTY,
            frame: None,
            baseline,
            prior,
            pending_value: None,
            catch: None,
            return_feed_to_parent,
        }
    }

    pub fn new_action(
        action_id: StubId,
        frame: StubId,
        params_len: usize,
        feed: Option<Feed>,
        baseline: Baseline,
        prior: Option<LevelId>,
    ) -> Self {
        Level {
            executor: Executor::Action,
            body: LevelBody::Action(ActionState {
                action_id,
                frame,
                params_len,
                param_index: 0,
                left: None,
                feed,
            }),
            flags: LevelFlags::EMPTY,
            frame: Some(frame),
            baseline,
            prior,
            pending_value: None,
            catch: None,
            return_feed_to_parent: true,
        }
    }

    pub fn with_flags(mut self, flags: LevelFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn eval_mut(&mut self) -> &mut EvalState {
        match &mut self.body {
            LevelBody::Eval(state) => state,
            LevelBody::Action(_) => panic!("level is not an Eval level"),
        }
    }

    pub fn eval_ref(&self) -> &EvalState {
        match &self.body {
            LevelBody::Eval(state) => state,
            LevelBody::Action(_) => panic!("level is not an Eval level"),
        }
    }

    pub fn action_mut(&mut self) -> &mut ActionState {
        match &mut self.body {
            LevelBody::Action(state) => state,
            LevelBody::Eval(_) => panic!("level is not an Action level"),
        }
    }

    pub fn action_ref(&self) -> &ActionState {
        match &self.body {
            LevelBody::Action(state) => state,
            LevelBody::Eval(_) => panic!("level is not an Action level"),
        }
    }

    /// Take this level's feed, for a pushed child to borrow exclusively
    /// while the caller suspends (spec.md §4.7's "hot potato": only one
    /// level holds a given feed at a time).
    pub fn take_feed(&mut self) -> Feed {
        match &mut self.body {
            LevelBody::Eval(state) => std::mem::take(&mut state.feed),
            LevelBody::Action(state) => state.feed.take().unwrap_or_default(),
        }
    }

    /// Accept a reclaimed feed back from a finished child (the other half
    /// of [`Level::take_feed`]).
    pub fn accept_feed(&mut self, feed: Feed) {
        match &mut self.body {
            LevelBody::Eval(state) => state.feed = feed,
            LevelBody::Action(state) => state.feed = Some(feed),
        }
    }

    /// Extract whichever feed this level (as it's being popped) owns, for
    /// `Trampoline::run` to hand to the new top level when
    /// `return_feed_to_parent` is set.
    pub fn into_feed(self) -> Option<Feed> {
        match self.body {
            LevelBody::Eval(state) => Some(state.feed),
            LevelBody::Action(state) => state.feed,
        }
    }

    /// Install an unwound throw's value into this level's Eval body ahead
    /// of re-stepping it, consuming the catch spec that matched (spec.md
    /// §4.10's RESCUE/ENRESCUE).
    pub fn begin_catch(&mut self, value: Cell) {
        let handler = self.catch.take().and_then(|c| c.handler);
        self.eval_mut().caught = Some((handler, value));
    }
}
