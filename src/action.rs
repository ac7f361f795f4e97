//! Action Dispatch & Argument Fulfillment (C9). See spec.md §4.9.
//!
//! [`step_action`] is the `Executor::Action` resumption function every
//! Action Level is driven through from `src/trampoline.rs`'s
//! `Trampoline::run`: filling one argument slot that itself requires
//! evaluation pushes an Eval child Level and returns [`Step::Continue`]
//! rather than recursing, exactly like `src/stepper.rs`'s Eval-side
//! suspension points. `dispatch`/`dispatch_enfix`/`dispatch_frame`/
//! `dispatch_with_args` are the crate's action-calling entry points: each
//! pushes one Action Level and drives it with `Trampoline::run`.

use crate::arena::StubId;
use crate::cell::{Cell, Heart};
use crate::context::{varlist, Context, ContextKind};
use crate::data_stack::Baseline;
use crate::error::{make_error, ThrowLabel};
use crate::feed::Feed;
use crate::level::Level;
use crate::symbol::Symbol;
use crate::trampoline::{Bounce, Step, Trampoline};
use crate::vm::Vm;

/// Which of spec.md §4.9's parameter classes a formal argument has.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamClass {
    /// Evaluate one expression from the feed.
    Normal,
    /// `just` — take the next feed element literally.
    Quoted,
    /// `@` — take literally, preserving binding.
    The,
    /// `@word`-style — literal unless the element is a GROUP!, which is
    /// evaluated.
    SoftEscapable,
    /// `^` — evaluate, then lift the result into the slot.
    Meta,
    /// Leave the slot vacant (VOID) if the feed is at end instead of
    /// erroring.
    EndTolerant,
    /// Pulls from the feed on demand rather than eagerly. This crate does
    /// not implement true variadic proxies; it degrades to end-tolerant
    /// fulfillment (documented limitation — no supplemented native needs
    /// true variadics).
    Variadic,
    /// Consumes no feed element of its own: filled from a refinement WORD
    /// cell pushed on the data stack during CHAIN!/PATH! resolution
    /// rather than pulled from the call's feed (spec.md §4.5, §4.9).
    Refinement,
}

#[derive(Clone, Debug)]
pub struct ParamSpec {
    pub name: Symbol,
    pub class: ParamClass,
    /// The hearts this slot accepts; `None` means untyped (spec.md §4.9
    /// step 4). Checked, not coerced — none of this crate's supplemented
    /// natives need numeric/string coercion, so `typecheck_param` only
    /// ever rejects or passes a value through unchanged.
    pub type_spec: Option<Vec<Heart>>,
}

impl ParamSpec {
    pub fn normal(name: Symbol) -> Self {
        ParamSpec { name, class: ParamClass::Normal, type_spec: None }
    }
    pub fn quoted(name: Symbol) -> Self {
        ParamSpec { name, class: ParamClass::Quoted, type_spec: None }
    }
    pub fn meta(name: Symbol) -> Self {
        ParamSpec { name, class: ParamClass::Meta, type_spec: None }
    }
    pub fn refinement(name: Symbol) -> Self {
        ParamSpec { name, class: ParamClass::Refinement, type_spec: None }
    }

    pub fn with_types(mut self, hearts: Vec<Heart>) -> Self {
        self.type_spec = Some(hearts);
        self
    }
}

/// A native dispatcher: given the action it was invoked through (so a
/// shared dispatcher — `func`'s or `enclose`'s — can look its own
/// per-action data back up in [`Vm::actions`]) and the already-fulfilled
/// call frame, produce a result bounce.
pub type NativeFn = fn(&mut Vm, StubId, StubId) -> Bounce;

#[derive(Clone)]
pub struct ActionSpec {
    pub params: Vec<ParamSpec>,
    pub dispatcher: NativeFn,
    /// Enfix actions bind to their left operand during the stepper's
    /// lookahead (spec.md §4.8 step 4) instead of being called prefix.
    pub enfix: bool,
    /// Intrinsic fast path: exactly one Normal argument, dispatcher
    /// invoked without allocating a frame varlist (spec.md §4.9). None of
    /// this crate's supplemented natives need it, so it is tracked but
    /// dispatch does not yet special-case it — recorded here as the seam
    /// a real implementation would extend.
    pub intrinsic: bool,
    /// `func`'s single-instance simplification: the call frame is the
    /// action's own archetype varlist, reused on every invocation, rather
    /// than a fresh varlist per call (no recursion/re-entrancy support —
    /// see DESIGN.md).
    pub reuse_archetype: bool,
    /// The evaluable body a `func`-dispatched action runs once its frame
    /// is filled (spec.md §6's user-function sketch).
    pub user_body: Option<StubId>,
    /// `(inner, outer)` for an `enclose`-built action: `inner` is the
    /// action being wrapped, `outer` the handler invoked with the
    /// captured frame (spec.md §4.9's "Enclose").
    pub enclose: Option<(StubId, StubId)>,
}

impl ActionSpec {
    /// A plain native: no reuse, no body, no enclosing.
    pub fn native(params: Vec<ParamSpec>, dispatcher: NativeFn) -> Self {
        ActionSpec {
            params,
            dispatcher,
            enfix: false,
            intrinsic: false,
            reuse_archetype: false,
            user_body: None,
            enclose: None,
        }
    }

    pub fn enfix(mut self) -> Self {
        self.enfix = true;
        self
    }
}

/// Register a native action in `lib`, binding `name` to its ACTION
/// antiform (spec.md §6.1's "native dispatcher registration").
pub fn register_native(vm: &mut Vm, lib: StubId, name: &str, spec: ActionSpec) {
    let archetype = varlist::alloc_varlist(&mut vm.arena, ContextKind::Frame, 0);
    vm.actions.insert(archetype, spec);
    let sym = vm.symbols.intern(name);
    Context::Sea(lib).ensure_member(&mut vm.arena, &mut vm.symbols, sym);
    Context::Sea(lib)
        .set(&mut vm.arena, &vm.symbols, sym, Cell::action(archetype))
        .expect("member was just ensured");
}

/// Thrown when an ACTION antiform's varlist id has no registered
/// [`ActionSpec`] — a dangling reference, never produced by the stepper's
/// own lookups but guarded against defensively at every dispatch site.
pub(crate) fn missing_action(vm: &mut Vm) -> Step {
    let err = make_error(&mut vm.arena, &mut vm.symbols, "bad-action", "dispatch of an unregistered action");
    Step::Thrown { label: ThrowLabel::Panic, value: err }
}

fn bounce_missing_action(vm: &mut Vm) -> Bounce {
    match missing_action(vm) {
        Step::Thrown { label, value } => Bounce::Thrown { label, value },
        _ => unreachable!("missing_action always returns Thrown"),
    }
}

fn build_frame(vm: &mut Vm, action_id: StubId, spec: &ActionSpec) -> StubId {
    if spec.reuse_archetype {
        action_id
    } else {
        let frame = varlist::alloc_varlist(&mut vm.arena, ContextKind::Frame, spec.params.len());
        for param in &spec.params {
            varlist::append_key(&mut vm.arena, frame, param.name);
        }
        frame
    }
}

/// Push an Action Level for `action_id`, pulling unspecialized arguments
/// from `feed` once it steps (spec.md §4.9 steps 1-5). `left` fills the
/// first parameter directly, for enfix calls and CHAIN!/PATH!
/// specializations whose head already resolved. Returns [`Step::Thrown`]
/// without pushing anything if `action_id` isn't registered.
pub(crate) fn push_action_call(vm: &mut Vm, action_id: StubId, left: Option<Cell>, feed: Feed, baseline: Baseline) -> Step {
    let Some(spec) = vm.actions.get(&action_id).cloned() else {
        return missing_action(vm);
    };
    let frame = build_frame(vm, action_id, &spec);
    let mut level = Level::new_action(action_id, frame, spec.params.len(), Some(feed), baseline, None);
    if left.is_some() {
        level.action_mut().left = left;
    }
    vm.trampoline.push_level(level);
    Step::Continue
}

/// Invoke `action_id`, pulling unspecialized arguments from `feed`
/// (spec.md §4.9 steps 1-5).
pub fn dispatch(vm: &mut Vm, action_id: StubId, feed: &mut Feed) -> Bounce {
    if !vm.actions.contains_key(&action_id) {
        return bounce_missing_action(vm);
    }
    let floor = vm.trampoline.depth();
    let baseline = vm.data_stack.baseline();
    let taken = std::mem::take(feed);
    push_action_call(vm, action_id, None, taken, baseline);
    let (bounce, returned_feed) = Trampoline::run(vm, floor);
    if let Some(f) = returned_feed {
        *feed = f;
    }
    bounce
}

/// Invoke an enfix action: its first parameter is filled directly from
/// `left` (the already-evaluated operand to its left), the rest pulled
/// from `feed` as usual (spec.md §4.8 step 4).
pub fn dispatch_enfix(vm: &mut Vm, action_id: StubId, left: Cell, feed: &mut Feed) -> Bounce {
    if !vm.actions.contains_key(&action_id) {
        return bounce_missing_action(vm);
    }
    let floor = vm.trampoline.depth();
    let baseline = vm.data_stack.baseline();
    let taken = std::mem::take(feed);
    push_action_call(vm, action_id, Some(left), taken, baseline);
    let (bounce, returned_feed) = Trampoline::run(vm, floor);
    if let Some(f) = returned_feed {
        *feed = f;
    }
    bounce
}

/// Invoke `action_id` against an already-built frame (used by `eval` on a
/// captured FRAME!, and by `enclose`'s outer handler re-entering `inner` —
/// spec.md §4.9's "Enclose"). Every parameter is considered already
/// filled.
pub fn dispatch_frame(vm: &mut Vm, action_id: StubId, frame: StubId) -> Bounce {
    if !vm.actions.contains_key(&action_id) {
        return bounce_missing_action(vm);
    }
    let floor = vm.trampoline.depth();
    let baseline = vm.data_stack.baseline();
    let params_len = vm.actions.get(&action_id).expect("checked above").params.len();
    let mut level = Level::new_action(action_id, frame, params_len, None, baseline, None);
    level.action_mut().param_index = params_len;
    vm.trampoline.push_level(level);
    let (bounce, _feed) = Trampoline::run(vm, floor);
    bounce
}

/// Invoke `action_id` with arguments supplied directly (not pulled from a
/// feed) — used by `enclose`'s generated action to call `outer` with the
/// captured inner frame as its single argument, and by RESCUE to call its
/// handler with the caught value.
pub fn dispatch_with_args(vm: &mut Vm, action_id: StubId, args: Vec<Cell>) -> Bounce {
    if !vm.actions.contains_key(&action_id) {
        return bounce_missing_action(vm);
    }
    let floor = vm.trampoline.depth();
    let baseline = vm.data_stack.baseline();
    let spec = vm.actions.get(&action_id).cloned().expect("checked above");
    let frame = build_frame(vm, action_id, &spec);
    for (param, value) in spec.params.iter().zip(args.into_iter()) {
        Context::Varlist(frame)
            .set(&mut vm.arena, &vm.symbols, param.name, value)
            .expect("param was appended above");
    }
    let mut level = Level::new_action(action_id, frame, spec.params.len(), None, baseline, None);
    level.action_mut().param_index = spec.params.len();
    vm.trampoline.push_level(level);
    let (bounce, _feed) = Trampoline::run(vm, floor);
    bounce
}

/// The `Executor::Action` resumption function (spec.md §4.9). A
/// `pending_value` means a pushed child Eval Level just finished
/// evaluating the in-flight parameter's argument; otherwise keep filling
/// from `param_index`.
pub fn step_action(vm: &mut Vm) -> Step {
    let pending = vm.trampoline.current_mut().unwrap().pending_value.take();
    match pending {
        Some(value) => resume_fulfillment(vm, value),
        None => continue_fulfilling(vm),
    }
}

fn continue_fulfilling(vm: &mut Vm) -> Step {
    let (action_id, param_index, params_len, baseline, left) = {
        let lvl = vm.trampoline.current().unwrap();
        let state = lvl.action_ref();
        (state.action_id, state.param_index, state.params_len, lvl.baseline, state.left.clone())
    };
    if param_index >= params_len {
        return begin_dispatch(vm, action_id);
    }
    let Some(spec) = vm.actions.get(&action_id).cloned() else {
        return missing_action(vm);
    };
    let param = spec.params[param_index].clone();

    if param_index == 0 && left.is_some() {
        return store_param(vm, left.expect("checked above"));
    }

    match param.class {
        ParamClass::Normal | ParamClass::Meta => push_arg_eval_child(vm),
        ParamClass::EndTolerant | ParamClass::Variadic => {
            let at_end = match &vm.trampoline.current().unwrap().action_ref().feed {
                Some(feed) => feed.is_at_end(),
                None => true,
            };
            if at_end {
                store_param(vm, Cell::void())
            } else {
                push_arg_eval_child(vm)
            }
        }
        ParamClass::Quoted | ParamClass::The => take_literal_sync(vm, false),
        ParamClass::SoftEscapable => take_literal_sync(vm, true),
        ParamClass::Refinement => {
            let present = vm
                .data_stack
                .slice_from(baseline)
                .iter()
                .any(|cell| refinement_matches(cell, param.name));
            store_param(vm, if present { Cell::okay() } else { Cell::null() })
        }
    }
}

fn refinement_matches(cell: &Cell, name: Symbol) -> bool {
    matches!(cell.payload(), crate::cell::Payload::Word { symbol, .. } if *symbol == name && cell.heart() == Heart::Word)
}

/// Push an Eval child over the in-flight parameter's feed to evaluate one
/// argument (spec.md §4.9's argument fulfillment). Deliberately the
/// no-lookahead, single-step shape `eval_single` wraps: an enfix word
/// immediately following an argument belongs to the *outer* expression,
/// not this one (spec.md §4.8's left-to-right, no-precedence order —
/// `1 + 2 * 3` must bind as `(1 + 2) * 3`).
fn push_arg_eval_child(vm: &mut Vm) -> Step {
    let baseline = vm.data_stack.baseline();
    let feed = {
        let lvl = vm.trampoline.current_mut().unwrap();
        lvl.take_feed()
    };
    let child = Level::new_eval(feed, false, true, false, baseline, None, true);
    vm.trampoline.push_level(child);
    Step::Continue
}

/// Quoted/The/SoftEscapable argument classes read the next feed element
/// without evaluating it, except that SoftEscapable (`escape_groups`)
/// evaluates a literal GROUP! instead of quoting it (spec.md §4.9).
fn take_literal_sync(vm: &mut Vm, escape_groups: bool) -> Step {
    if escape_groups {
        let is_group = {
            let lvl = vm.trampoline.current().unwrap();
            lvl.action_ref().feed.as_ref().and_then(|f| f.at()).map(|c| c.heart() == Heart::Group).unwrap_or(false)
        };
        if is_group {
            return push_arg_eval_child(vm);
        }
    }
    let taken = {
        let lvl = vm.trampoline.current_mut().unwrap();
        let feed = lvl.action_mut().feed.as_mut().expect("literal fulfillment requires a feed");
        match feed.at().cloned() {
            Some(cell) => {
                feed.fetch_next();
                Some(cell)
            }
            None => None,
        }
    };
    match taken {
        Some(cell) => store_param(vm, cell),
        None => {
            let err = make_error(&mut vm.arena, &mut vm.symbols, "need-non-end", "argument required but feed is at end");
            Step::Thrown { label: ThrowLabel::Error, value: err }
        }
    }
}

/// A pushed argument-evaluation child finished: apply the in-flight
/// parameter's own decay/escalate-or-lift rule to its result, then store
/// it (spec.md §4.9 step 4, §4.10's error propagation policy). Re-derives
/// the parameter class from `param_index` rather than carrying it on
/// [`crate::level::ActionState`] — `param_index` isn't advanced until
/// `store_param` succeeds, so it still names the in-flight parameter.
fn resume_fulfillment(vm: &mut Vm, value: Cell) -> Step {
    let (action_id, param_index) = {
        let lvl = vm.trampoline.current().unwrap();
        let state = lvl.action_ref();
        (state.action_id, state.param_index)
    };
    let Some(spec) = vm.actions.get(&action_id).cloned() else {
        return missing_action(vm);
    };
    if spec.params[param_index].class == ParamClass::Meta {
        return store_param(vm, value.lift());
    }
    match value.decay_if_unstable(&vm.arena) {
        Ok(stable) if stable.is_error() => Step::Thrown { label: ThrowLabel::Error, value: stable },
        Ok(stable) => store_param(vm, stable),
        Err(e) => {
            let err = make_error(&mut vm.arena, &mut vm.symbols, "bad-decay", &e.to_string());
            Step::Thrown { label: ThrowLabel::Panic, value: err }
        }
    }
}

/// Typecheck the in-flight parameter's slot (spec.md §4.9 step 4), then
/// write it into the frame and advance to the next parameter.
fn store_param(vm: &mut Vm, value: Cell) -> Step {
    let (action_id, param_index, frame) = {
        let lvl = vm.trampoline.current().unwrap();
        let state = lvl.action_ref();
        (state.action_id, state.param_index, state.frame)
    };
    let Some(spec) = vm.actions.get(&action_id).cloned() else {
        return missing_action(vm);
    };
    let param = &spec.params[param_index];
    if let Some(step) = typecheck_param(vm, param, &value) {
        return step;
    }
    Context::Varlist(frame)
        .set(&mut vm.arena, &vm.symbols, param.name, value)
        .expect("param was appended at registration");
    vm.trampoline.current_mut().unwrap().action_mut().param_index += 1;
    Step::Continue
}

fn typecheck_param(vm: &mut Vm, param: &ParamSpec, value: &Cell) -> Option<Step> {
    let hearts = param.type_spec.as_ref()?;
    if value.is_error() {
        // An ERROR antiform reaching a typed slot already decided its own
        // fate in `resume_fulfillment`/`store_param`'s caller — typechecking
        // doesn't second-guess it (spec.md §4.9 step 4, §4.10).
        return None;
    }
    if hearts.contains(&value.heart()) {
        None
    } else {
        let message = format!("{} does not accept a value of this type", vm.symbols.spelling(param.name));
        let err = make_error(&mut vm.arena, &mut vm.symbols, "bad-arg-type", &message);
        Some(Step::Thrown { label: ThrowLabel::Error, value: err })
    }
}

fn begin_dispatch(vm: &mut Vm, action_id: StubId) -> Step {
    let Some(spec) = vm.actions.get(&action_id).cloned() else {
        return missing_action(vm);
    };
    let frame = vm.trampoline.current().unwrap().action_ref().frame;
    match (spec.dispatcher)(vm, action_id, frame) {
        Bounce::Done(value) => Step::Done(value),
        Bounce::Thrown { label, value } => Step::Thrown { label, value },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{Binding, Payload};
    use crate::context::varlist;

    fn double(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
        let n = vm.symbols.intern("n");
        let value = Context::Varlist(frame).get(&vm.arena, &vm.symbols, n).unwrap();
        let Payload::Integer(i) = value.payload() else { unreachable!() };
        Bounce::Done(Cell::integer(i * 2))
    }

    #[test]
    fn dispatch_fulfills_one_normal_argument_and_calls_dispatcher() {
        let mut vm = Vm::new();
        let lib = vm.library;
        let n = vm.symbols.intern("n");
        register_native(&mut vm, lib, "double", ActionSpec::native(vec![ParamSpec::normal(n)], double));
        let double_sym = vm.symbols.spelling_to_symbol("double").unwrap();
        let action_cell = Context::Sea(lib).get(&vm.arena, &vm.symbols, double_sym).unwrap();
        let Payload::Frame { action: Some(action_id), .. } = action_cell.payload() else {
            panic!("expected an action cell")
        };
        let mut feed = Feed::new(vec![Cell::integer(21)], None);
        match dispatch(&mut vm, *action_id, &mut feed) {
            Bounce::Done(value) => assert_eq!(value, Cell::integer(42)),
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }
    }

    #[test]
    fn quoted_param_takes_next_element_literally() {
        let mut vm = Vm::new();
        let x = vm.symbols.intern("x");
        fn identity(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
            let x = vm.symbols.intern("x");
            Bounce::Done(Context::Varlist(frame).get(&vm.arena, &vm.symbols, x).unwrap())
        }
        let archetype = varlist::alloc_varlist(&mut vm.arena, ContextKind::Frame, 0);
        vm.actions
            .insert(archetype, ActionSpec::native(vec![ParamSpec::quoted(x)], identity));
        let word = vm.symbols.intern("word-shaped-arg");
        let mut feed = Feed::new(vec![Cell::word(word, Binding::Unbound)], None);
        match dispatch(&mut vm, archetype, &mut feed) {
            Bounce::Done(value) => assert!(matches!(value.payload(), Payload::Word { .. })),
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }
    }

    #[test]
    fn enfix_dispatch_fills_first_param_from_left_operand() {
        let mut vm = Vm::new();
        let a = vm.symbols.intern("a");
        let b = vm.symbols.intern("b");
        fn sum(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
            let a = vm.symbols.intern("a");
            let b = vm.symbols.intern("b");
            let Payload::Integer(x) = Context::Varlist(frame).get(&vm.arena, &vm.symbols, a).unwrap().payload().clone() else {
                unreachable!()
            };
            let Payload::Integer(y) = Context::Varlist(frame).get(&vm.arena, &vm.symbols, b).unwrap().payload().clone() else {
                unreachable!()
            };
            Bounce::Done(Cell::integer(x + y))
        }
        let archetype = varlist::alloc_varlist(&mut vm.arena, ContextKind::Frame, 0);
        vm.actions.insert(
            archetype,
            ActionSpec::native(vec![ParamSpec::normal(a), ParamSpec::normal(b)], sum).enfix(),
        );
        let mut feed = Feed::new(vec![Cell::integer(5)], None);
        match dispatch_enfix(&mut vm, archetype, Cell::integer(10), &mut feed) {
            Bounce::Done(value) => assert_eq!(value, Cell::integer(15)),
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }
    }

    #[test]
    fn refinement_param_is_present_when_pushed_on_the_data_stack_at_baseline() {
        let mut vm = Vm::new();
        let only = vm.symbols.intern("only");
        fn check(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
            let only = vm.symbols.intern("only");
            Bounce::Done(Context::Varlist(frame).get(&vm.arena, &vm.symbols, only).unwrap())
        }
        let archetype = varlist::alloc_varlist(&mut vm.arena, ContextKind::Frame, 0);
        vm.actions
            .insert(archetype, ActionSpec::native(vec![ParamSpec::refinement(only)], check));
        let baseline = vm.data_stack.baseline();
        vm.data_stack.push(Cell::word(only, Binding::Unbound));
        let mut feed = Feed::new(vec![], None);
        match push_action_call(&mut vm, archetype, None, std::mem::take(&mut feed), baseline) {
            Step::Continue => {}
            other => panic!("expected Continue, got {other:?}"),
        }
        let floor = vm.trampoline.depth() - 1;
        match Trampoline::run(&mut vm, floor).0 {
            Bounce::Done(value) => assert!(value.is_antiform() && value.heart() == Heart::Word),
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }
    }
}
