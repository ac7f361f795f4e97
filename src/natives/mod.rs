//! Supplemented intrinsic natives: arithmetic, the multi-return/compose
//! family, the full `try`/`except`/`require`/`rescue`/`enrescue`/`trap`
//! error-handling family, and the three "build an action" natives
//! (`func`, `enclose`) plus `eval` for re-entering a captured frame.
//! Registered into [`crate::vm::Vm::library`] by [`register_all`].

use crate::action::{self, ActionSpec, ParamSpec};
use crate::arena::{Flavor, StubContent, StubId};
use crate::cell::{Cell, Heart, Payload};
use crate::context::{varlist, Context, ContextKind};
use crate::error::{self, is_veto, make_error, make_veto, try_, ThrowLabel};
use crate::trampoline::Bounce;
use crate::vm::Vm;

fn type_error(vm: &mut Vm, id: &str, message: &str) -> Bounce {
    let err = make_error(&mut vm.arena, &mut vm.symbols, id, message);
    Bounce::Thrown { label: ThrowLabel::Error, value: err }
}

fn arg(vm: &Vm, frame: StubId, name: &str) -> Cell {
    let sym = vm
        .symbols
        .spelling_to_symbol(name)
        .expect("native parameter symbols are interned at registration time");
    Context::Varlist(frame)
        .get(&vm.arena, &vm.symbols, sym)
        .expect("parameter was fulfilled by action::dispatch before the native ran")
}

fn add_native(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
    let (Payload::Integer(x), Payload::Integer(y)) =
        (arg(vm, frame, "a").payload().clone(), arg(vm, frame, "b").payload().clone())
    else {
        return type_error(vm, "bad-arg", "add requires two INTEGER! arguments");
    };
    Bounce::Done(Cell::integer(x + y))
}

fn multiply_native(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
    let (Payload::Integer(x), Payload::Integer(y)) =
        (arg(vm, frame, "a").payload().clone(), arg(vm, frame, "b").payload().clone())
    else {
        return type_error(vm, "bad-arg", "multiply requires two INTEGER! arguments");
    };
    Bounce::Done(Cell::integer(x * y))
}

/// `pack [1 2 3]`: lift each element of a block into a fresh PACK
/// (spec.md §4.1's multi-return antiform).
fn pack_native(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
    let value = arg(vm, frame, "value");
    let Payload::List(stub) = value.payload() else {
        return type_error(vm, "bad-arg", "pack requires a BLOCK!");
    };
    let elements = match &vm.arena.get(*stub).content {
        StubContent::Source(cells) => cells.clone(),
        _ => unreachable!("BLOCK! payload must be a SOURCE stub"),
    };
    let lifted: Vec<Cell> = elements.into_iter().map(Cell::lift).collect();
    let new_stub = vm.arena.alloc(Flavor::Source, StubContent::Source(lifted));
    Bounce::Done(Cell::pack(new_stub))
}

/// `spread [1 2 3]`: mark a block's elements for positional splicing into
/// an enclosing `compose` (spec.md §4.1's SPLICE antiform).
fn spread_native(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
    let value = arg(vm, frame, "value");
    let Payload::List(stub) = value.payload() else {
        return type_error(vm, "bad-arg", "spread requires a BLOCK!");
    };
    Bounce::Done(Cell::splice(*stub))
}

/// `compose [a (1 + 2) (spread [3 4]) (veto)]`: walk a literal template,
/// evaluating each GROUP! in place; a SPLICE result inserts positionally,
/// a thrown veto aborts the whole composition to NULL rather than
/// propagating (spec.md §4.10's designated "abandon this composition"
/// error).
fn compose_native(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
    let template = arg(vm, frame, "template");
    let Payload::List(stub) = template.payload() else {
        return type_error(vm, "bad-arg", "compose requires a BLOCK!");
    };
    let elements = match &vm.arena.get(*stub).content {
        StubContent::Source(cells) => cells.clone(),
        _ => unreachable!("BLOCK! payload must be a SOURCE stub"),
    };

    let mut out = Vec::new();
    for element in elements {
        if element.heart() != Heart::Group {
            out.push(element);
            continue;
        }
        let Payload::List(group_stub) = element.payload() else {
            unreachable!("GROUP! payload must be a SOURCE stub")
        };
        let globals = vm.globals;
        match crate::stepper::eval_source_stub(vm, *group_stub, Some(globals)) {
            Bounce::Done(value) if value.is_splice() => {
                let Payload::List(items_stub) = value.payload() else {
                    unreachable!("SPLICE antiform must carry a List payload")
                };
                if let StubContent::Source(items) = &vm.arena.get(*items_stub).content {
                    out.extend(items.clone());
                }
            }
            Bounce::Done(value) => match value.decay_if_unstable(&vm.arena) {
                Ok(stable) => out.push(stable),
                Err(e) => return type_error(vm, "bad-decay", &e.to_string()),
            },
            Bounce::Thrown { label, value } => {
                if is_veto(&vm.arena, &vm.symbols, &value) {
                    return Bounce::Done(Cell::null());
                }
                return Bounce::Thrown { label, value };
            }
        }
    }

    let new_stub = vm.arena.alloc(Flavor::Source, StubContent::Source(out));
    Bounce::Done(Cell::new(Heart::Block, Payload::List(new_stub)))
}

/// `veto`: the designated abort-composition error (spec.md §4.10, §7 item
/// 4). Escalates to a throw the moment `compose`'s own `eval_source_stub`
/// call reaches `eval_one`'s final step; `compose_native` catches it
/// specifically by id rather than letting it propagate further.
fn veto_native(vm: &mut Vm, _action_id: StubId, _frame: StubId) -> Bounce {
    Bounce::Done(make_veto(&mut vm.arena, &mut vm.symbols))
}

/// `try value`: coerce an ERROR antiform to NULL. Its parameter is Meta so
/// the raw (possibly-error) result arrives without premature escalation
/// (spec.md §4.10).
fn try_native(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
    let lifted = arg(vm, frame, "value");
    let stable = lifted.unlift().expect("a Meta parameter always holds a lifted value");
    Bounce::Done(try_(stable))
}

/// `except value handler`: run `handler` with the error if `value` is one,
/// otherwise pass `value` through untouched (spec.md §4.10). Simplification:
/// `handler` is a one-argument callable ACTION, not a bare block implicitly
/// bound to the error — see DESIGN.md.
fn except_native(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
    let lifted = arg(vm, frame, "value");
    let stable = lifted.unlift().expect("a Meta parameter always holds a lifted value");
    if !stable.is_error() {
        return Bounce::Done(stable);
    }
    let handler = arg(vm, frame, "handler");
    let Payload::Frame { action: Some(handler_id), .. } = handler.payload() else {
        return type_error(vm, "bad-arg", "except requires an ACTION! handler");
    };
    action::dispatch_with_args(vm, *handler_id, vec![stable])
}

/// `rescue body handler`: run `body`, catching an escalated ERROR antiform
/// and calling `handler` with it rather than letting the throw propagate
/// further (spec.md §4.10's RESCUE). `body` is Quoted so the unevaluated
/// BLOCK! reaches the native rather than whatever running it would
/// produce.
fn rescue_native(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
    let body = arg(vm, frame, "body");
    let handler = arg(vm, frame, "handler");
    let Payload::List(body_stub) = body.payload() else {
        return type_error(vm, "bad-arg", "rescue requires a BLOCK! body");
    };
    let Payload::Frame { action: Some(handler_id), .. } = handler.payload() else {
        return type_error(vm, "bad-arg", "rescue requires an ACTION! handler");
    };
    let (body_stub, handler_id) = (*body_stub, *handler_id);
    crate::stepper::push_catching_body(vm, body_stub, Some(frame), ThrowLabel::Error, Some(handler_id))
}

/// `enrescue body`: run `body`, resolving directly to an escalated ERROR
/// antiform instead of propagating the throw (spec.md §4.10's ENRESCUE —
/// RESCUE without a handler).
fn enrescue_native(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
    let body = arg(vm, frame, "body");
    let Payload::List(body_stub) = body.payload() else {
        return type_error(vm, "bad-arg", "enrescue requires a BLOCK! body");
    };
    let body_stub = *body_stub;
    crate::stepper::push_catching_body(vm, body_stub, Some(frame), ThrowLabel::Error, None)
}

/// `require value`: the inverse of `try` — escalate immediately if `value`
/// is an ERROR antiform, otherwise pass it through (spec.md §4.10's
/// REQUIRE). `value` is Meta so the raw result arrives without premature
/// escalation, same as `try`/`except`.
fn require_native(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
    let lifted = arg(vm, frame, "value");
    let stable = lifted.unlift().expect("a Meta parameter always holds a lifted value");
    match error::require(stable) {
        Ok(value) => Bounce::Done(value),
        Err((label, value)) => Bounce::Thrown { label, value },
    }
}

/// `trap label body`: run `body`, catching a throw named `label` (a bare
/// WORD!, e.g. from a user `throw 'retry value`) and resolving directly to
/// the caught value, the way ENRESCUE does for the generic ERROR label
/// (spec.md §4.10's TRAP). `label` and `body` are both Quoted.
fn trap_native(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
    let label = arg(vm, frame, "label");
    let body = arg(vm, frame, "body");
    let Payload::Word { symbol, .. } = label.payload() else {
        return type_error(vm, "bad-arg", "trap requires a WORD! label");
    };
    let Payload::List(body_stub) = body.payload() else {
        return type_error(vm, "bad-arg", "trap requires a BLOCK! body");
    };
    let (symbol, body_stub) = (*symbol, *body_stub);
    crate::stepper::push_catching_body(vm, body_stub, Some(frame), ThrowLabel::Named(symbol), None)
}

/// `func [spec...] [body...]`: collect WORD!s from `spec` as Normal
/// parameters of a fresh archetype, reusing it as the call frame on every
/// invocation — this crate's documented single-instance simplification for
/// user functions (no recursion/re-entrancy; see DESIGN.md).
fn func_native(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
    let spec = arg(vm, frame, "spec");
    let body = arg(vm, frame, "body");
    let (Payload::List(spec_stub), Payload::List(body_stub)) = (spec.payload(), body.payload()) else {
        return type_error(vm, "bad-arg", "func requires two BLOCK! arguments");
    };
    let spec_elements = match &vm.arena.get(*spec_stub).content {
        StubContent::Source(cells) => cells.clone(),
        _ => unreachable!("BLOCK! payload must be a SOURCE stub"),
    };
    let body_stub = *body_stub;

    let mut params = Vec::new();
    for cell in &spec_elements {
        if let Payload::Word { symbol, .. } = cell.payload() {
            if cell.heart() == Heart::Word {
                params.push(ParamSpec::normal(*symbol));
            }
        }
    }

    let archetype = varlist::alloc_varlist(&mut vm.arena, ContextKind::Frame, params.len());
    for param in &params {
        varlist::append_key(&mut vm.arena, archetype, param.name);
    }
    vm.actions.insert(
        archetype,
        ActionSpec {
            params,
            dispatcher: user_func_dispatcher,
            enfix: false,
            intrinsic: false,
            reuse_archetype: true,
            user_body: Some(body_stub),
            enclose: None,
        },
    );
    Bounce::Done(Cell::action(archetype))
}

/// Shared dispatcher for every `func`-built action: runs its body against
/// its own call frame as the ambient binding, so parameter words resolve
/// to whatever was passed in this call (spec.md §4.3's binding-on-
/// encounter mechanism, threaded through [`crate::tweak`]).
fn user_func_dispatcher(vm: &mut Vm, action_id: StubId, frame: StubId) -> Bounce {
    let body_stub = vm
        .actions
        .get(&action_id)
        .and_then(|spec| spec.user_body)
        .expect("a func-dispatched action always carries a user_body");
    crate::stepper::eval_source_stub(vm, body_stub, Some(frame))
}

/// `enclose inner outer`: build an action with `inner`'s own parameter
/// shape whose call captures its filled frame and hands it to `outer`
/// rather than running `inner` directly (spec.md §4.9's "Enclose").
fn enclose_native(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
    let inner = arg(vm, frame, "inner");
    let outer = arg(vm, frame, "outer");
    let (Payload::Frame { action: Some(inner_id), .. }, Payload::Frame { action: Some(outer_id), .. }) =
        (inner.payload(), outer.payload())
    else {
        return type_error(vm, "bad-arg", "enclose requires two ACTION! arguments");
    };
    let (inner_id, outer_id) = (*inner_id, *outer_id);
    let inner_params = vm
        .actions
        .get(&inner_id)
        .expect("inner action must already be registered")
        .params
        .clone();

    let archetype = varlist::alloc_varlist(&mut vm.arena, ContextKind::Frame, inner_params.len());
    for param in &inner_params {
        varlist::append_key(&mut vm.arena, archetype, param.name);
    }
    vm.actions.insert(
        archetype,
        ActionSpec {
            params: inner_params,
            dispatcher: enclose_dispatch,
            enfix: false,
            intrinsic: false,
            reuse_archetype: false,
            user_body: None,
            enclose: Some((inner_id, outer_id)),
        },
    );
    Bounce::Done(Cell::action(archetype))
}

fn enclose_dispatch(vm: &mut Vm, action_id: StubId, frame: StubId) -> Bounce {
    let (inner_id, outer_id) = vm
        .actions
        .get(&action_id)
        .and_then(|spec| spec.enclose)
        .expect("an enclose-dispatched action always carries (inner, outer)");
    let captured = Cell::new(Heart::Frame, Payload::Frame { varlist: frame, action: Some(inner_id) });
    action::dispatch_with_args(vm, outer_id, vec![captured])
}

/// `eval f`: re-enter a FRAME! value captured by `enclose`'s outer handler
/// (spec.md §4.9's "Enclose" worked example).
fn eval_native(vm: &mut Vm, _action_id: StubId, frame: StubId) -> Bounce {
    let captured = arg(vm, frame, "f");
    let Payload::Frame { varlist, action: Some(inner_id) } = captured.payload() else {
        return type_error(vm, "bad-arg", "eval requires a FRAME! captured from enclose");
    };
    action::dispatch_frame(vm, *inner_id, *varlist)
}

/// Register every native this crate supplements beyond the teacher's own
/// subject matter, into `vm.library` (spec.md §6.1).
pub fn register_all(vm: &mut Vm) {
    let lib = vm.library;
    let a = vm.symbols.intern("a");
    let b = vm.symbols.intern("b");
    action::register_native(vm, lib, "add", ActionSpec::native(vec![ParamSpec::normal(a), ParamSpec::normal(b)], add_native).enfix());
    action::register_native(vm, lib, "multiply", ActionSpec::native(vec![ParamSpec::normal(a), ParamSpec::normal(b)], multiply_native).enfix());

    let value = vm.symbols.intern("value");
    action::register_native(vm, lib, "pack", ActionSpec::native(vec![ParamSpec::normal(value)], pack_native));
    action::register_native(vm, lib, "spread", ActionSpec::native(vec![ParamSpec::normal(value)], spread_native));
    action::register_native(vm, lib, "try", ActionSpec::native(vec![ParamSpec::meta(value)], try_native));

    let template = vm.symbols.intern("template");
    action::register_native(vm, lib, "compose", ActionSpec::native(vec![ParamSpec::quoted(template)], compose_native));
    action::register_native(vm, lib, "veto", ActionSpec::native(vec![], veto_native));

    let handler = vm.symbols.intern("handler");
    action::register_native(
        vm,
        lib,
        "except",
        ActionSpec::native(vec![ParamSpec::meta(value), ParamSpec::normal(handler)], except_native),
    );
    action::register_native(vm, lib, "require", ActionSpec::native(vec![ParamSpec::meta(value)], require_native));

    let body = vm.symbols.intern("body");
    action::register_native(
        vm,
        lib,
        "rescue",
        ActionSpec::native(vec![ParamSpec::quoted(body), ParamSpec::normal(handler)], rescue_native),
    );
    action::register_native(vm, lib, "enrescue", ActionSpec::native(vec![ParamSpec::quoted(body)], enrescue_native));

    let label = vm.symbols.intern("label");
    action::register_native(
        vm,
        lib,
        "trap",
        ActionSpec::native(vec![ParamSpec::quoted(label), ParamSpec::quoted(body)], trap_native),
    );

    let spec = vm.symbols.intern("spec");
    let body = vm.symbols.intern("body");
    action::register_native(vm, lib, "func", ActionSpec::native(vec![ParamSpec::quoted(spec), ParamSpec::quoted(body)], func_native));

    let inner = vm.symbols.intern("inner");
    let outer = vm.symbols.intern("outer");
    action::register_native(vm, lib, "enclose", ActionSpec::native(vec![ParamSpec::normal(inner), ParamSpec::normal(outer)], enclose_native));

    let f = vm.symbols.intern("f");
    action::register_native(vm, lib, "eval", ActionSpec::native(vec![ParamSpec::normal(f)], eval_native));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Binding;
    use crate::feed::Feed;

    fn global_word(vm: &mut Vm, name: &str) -> Cell {
        let sym = vm.symbols.intern(name);
        Cell::word(sym, Binding::Context(vm.globals))
    }

    #[test]
    fn add_and_multiply_chain_left_to_right() {
        // `1 add 2 multiply 3` must read as `(1 add 2) multiply 3` == 9,
        // never `1 add (2 multiply 3)` == 7 (spec.md §4.8's no-precedence
        // evaluation order).
        let mut vm = Vm::boot();
        let add = global_word(&mut vm, "add");
        let multiply = global_word(&mut vm, "multiply");
        let mut feed = Feed::new(vec![Cell::integer(1), add, Cell::integer(2), multiply, Cell::integer(3)], None);
        match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => assert_eq!(value, Cell::integer(9)),
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }
    }

    #[test]
    fn pack_then_spread_round_trips_through_compose() {
        let mut vm = Vm::boot();
        let pack = global_word(&mut vm, "pack");
        let spread = global_word(&mut vm, "spread");

        let inner = vm.arena.alloc(Flavor::Source, StubContent::Source(vec![Cell::integer(1), Cell::integer(2)]));
        let spread_call = vm.arena.alloc(
            Flavor::Source,
            StubContent::Source(vec![spread, Cell::new(Heart::Block, Payload::List(inner))]),
        );
        let template = vm.arena.alloc(
            Flavor::Source,
            StubContent::Source(vec![Cell::new(Heart::Group, Payload::List(spread_call))]),
        );
        let compose = global_word(&mut vm, "compose");
        let mut feed = Feed::new(vec![compose, Cell::new(Heart::Block, Payload::List(template))], None);
        match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => {
                let Payload::List(out_stub) = value.payload() else { panic!("expected a BLOCK!") };
                let StubContent::Source(items) = &vm.arena.get(*out_stub).content else { unreachable!() };
                assert_eq!(items, &vec![Cell::integer(1), Cell::integer(2)]);
            }
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }

        // `pack`'s own round trip, exercised separately.
        let pack_items = vm.arena.alloc(Flavor::Source, StubContent::Source(vec![Cell::integer(5)]));
        let mut feed = Feed::new(vec![pack, Cell::new(Heart::Block, Payload::List(pack_items))], None);
        match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => assert!(value.is_pack()),
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }
    }

    #[test]
    fn compose_swallows_a_veto_and_yields_null() {
        let mut vm = Vm::boot();
        let veto = global_word(&mut vm, "veto");
        let veto_call = vm.arena.alloc(Flavor::Source, StubContent::Source(vec![veto]));
        let template = vm.arena.alloc(
            Flavor::Source,
            StubContent::Source(vec![Cell::new(Heart::Group, Payload::List(veto_call))]),
        );
        let compose = global_word(&mut vm, "compose");
        let mut feed = Feed::new(vec![compose, Cell::new(Heart::Block, Payload::List(template))], None);
        match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => assert!(value.is_null()),
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }
    }

    #[test]
    fn try_coerces_a_field_read_error_to_null() {
        let mut vm = Vm::boot();
        let try_word = global_word(&mut vm, "try");
        let missing = vm.symbols.intern("nowhere");
        let word = Cell::word(missing, Binding::Unbound);
        let mut feed = Feed::new(vec![try_word, word], None);
        match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => assert!(value.is_null()),
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }
    }

    #[test]
    fn require_escalates_an_error_and_passes_a_plain_value_through() {
        let mut vm = Vm::boot();
        let require_word = global_word(&mut vm, "require");
        let missing = vm.symbols.intern("nowhere");
        let mut feed = Feed::new(vec![require_word, Cell::word(missing, Binding::Unbound)], None);
        match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Thrown { label, value } => {
                assert_eq!(label, ThrowLabel::Error);
                assert!(value.is_error());
            }
            Bounce::Done(value) => panic!("expected a throw, got {value:?}"),
        }

        let require_word = global_word(&mut vm, "require");
        let mut feed = Feed::new(vec![require_word, Cell::integer(5)], None);
        match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => assert_eq!(value, Cell::integer(5)),
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }
    }

    #[test]
    fn rescue_calls_its_handler_with_the_caught_error() {
        let mut vm = Vm::boot();
        let missing = vm.symbols.intern("nowhere");
        let body = vm.arena.alloc(Flavor::Source, StubContent::Source(vec![Cell::word(missing, Binding::Unbound)]));

        // handler: func [e] [e] -- returns the caught error unchanged, as
        // proof it actually ran with the escalated value.
        let e_sym = vm.symbols.intern("e");
        let handler_spec = vm.arena.alloc(Flavor::Source, StubContent::Source(vec![Cell::word(e_sym, Binding::Unbound)]));
        let handler_body = vm.arena.alloc(Flavor::Source, StubContent::Source(vec![Cell::word(e_sym, Binding::Unbound)]));
        let func_word = global_word(&mut vm, "func");
        let mut feed = Feed::new(
            vec![func_word, Cell::new(Heart::Block, Payload::List(handler_spec)), Cell::new(Heart::Block, Payload::List(handler_body))],
            None,
        );
        let handler_action = match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => value,
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        };

        let rescue_word = global_word(&mut vm, "rescue");
        let mut feed = Feed::new(vec![rescue_word, Cell::new(Heart::Block, Payload::List(body)), handler_action], None);
        match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => assert!(value.is_error()),
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }
    }

    #[test]
    fn enrescue_resolves_directly_to_the_caught_error() {
        let mut vm = Vm::boot();
        let missing = vm.symbols.intern("nowhere");
        let body = vm.arena.alloc(Flavor::Source, StubContent::Source(vec![Cell::word(missing, Binding::Unbound)]));
        let enrescue_word = global_word(&mut vm, "enrescue");
        let mut feed = Feed::new(vec![enrescue_word, Cell::new(Heart::Block, Payload::List(body))], None);
        match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => assert!(value.is_error()),
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }
    }

    #[test]
    fn trap_catches_only_its_own_named_label() {
        fn raise_retry(vm: &mut Vm, _action_id: StubId, _frame: StubId) -> Bounce {
            let retry = vm.symbols.intern("retry");
            Bounce::Thrown { label: ThrowLabel::Named(retry), value: Cell::integer(99) }
        }
        let mut vm = Vm::boot();
        let retry_sym = vm.symbols.intern("retry");
        let raiser = varlist::alloc_varlist(&mut vm.arena, ContextKind::Frame, 0);
        vm.actions.insert(raiser, ActionSpec::native(vec![], raise_retry));
        let raiser_sym = vm.symbols.intern("raise-retry");
        Context::Sea(vm.globals).ensure_member(&mut vm.arena, &mut vm.symbols, raiser_sym);
        Context::Sea(vm.globals).set(&mut vm.arena, &vm.symbols, raiser_sym, Cell::action(raiser)).unwrap();

        let body = vm.arena.alloc(
            Flavor::Source,
            StubContent::Source(vec![Cell::word(raiser_sym, Binding::Context(vm.globals))]),
        );
        let trap_word = global_word(&mut vm, "trap");
        let mut feed = Feed::new(
            vec![trap_word, Cell::word(retry_sym, Binding::Unbound), Cell::new(Heart::Block, Payload::List(body))],
            None,
        );
        match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => assert_eq!(value, Cell::integer(99)),
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }
    }

    #[test]
    fn func_builds_a_callable_that_runs_its_body_against_its_call_frame() {
        let mut vm = Vm::boot();
        let spec_word = vm.symbols.intern("n");
        let spec_stub = vm.arena.alloc(Flavor::Source, StubContent::Source(vec![Cell::word(spec_word, Binding::Unbound)]));
        let double_call_args = vm.arena.alloc(
            Flavor::Source,
            StubContent::Source(vec![Cell::word(spec_word, Binding::Unbound), global_word(&mut vm, "add"), Cell::word(spec_word, Binding::Unbound)]),
        );
        let func_word = global_word(&mut vm, "func");
        let mut feed = Feed::new(
            vec![
                func_word,
                Cell::new(Heart::Block, Payload::List(spec_stub)),
                Cell::new(Heart::Block, Payload::List(double_call_args)),
            ],
            None,
        );
        let double_action = match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => value,
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        };
        assert!(double_action.is_action());

        let Payload::Frame { action: Some(action_id), .. } = double_action.payload() else {
            panic!("func must return an ACTION!")
        };
        let mut call_feed = Feed::new(vec![Cell::integer(21)], None);
        match action::dispatch(&mut vm, *action_id, &mut call_feed) {
            Bounce::Done(value) => assert_eq!(value, Cell::integer(42)),
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }
    }

    #[test]
    fn enclose_lets_outer_read_the_captured_argument_before_running_inner() {
        let mut vm = Vm::boot();
        let f_sym = vm.symbols.intern("f");
        let value_sym = vm.symbols.intern("value");

        // inner: func [value] [value]  -- the identity function.
        let inner_spec = vm.arena.alloc(Flavor::Source, StubContent::Source(vec![Cell::word(value_sym, Binding::Unbound)]));
        let inner_body = vm.arena.alloc(Flavor::Source, StubContent::Source(vec![Cell::word(value_sym, Binding::Unbound)]));
        let func_word = global_word(&mut vm, "func");
        let mut feed = Feed::new(
            vec![func_word, Cell::new(Heart::Block, Payload::List(inner_spec)), Cell::new(Heart::Block, Payload::List(inner_body))],
            None,
        );
        let inner_action = match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => value,
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        };

        // outer: func [f] [eval f] -- re-enters the captured frame as-is.
        let outer_spec = vm.arena.alloc(Flavor::Source, StubContent::Source(vec![Cell::word(f_sym, Binding::Unbound)]));
        let outer_body = vm.arena.alloc(
            Flavor::Source,
            StubContent::Source(vec![global_word(&mut vm, "eval"), Cell::word(f_sym, Binding::Unbound)]),
        );
        let func_word = global_word(&mut vm, "func");
        let mut feed = Feed::new(
            vec![func_word, Cell::new(Heart::Block, Payload::List(outer_spec)), Cell::new(Heart::Block, Payload::List(outer_body))],
            None,
        );
        let outer_action = match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => value,
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        };

        let enclose_word = global_word(&mut vm, "enclose");
        let mut feed = Feed::new(vec![enclose_word, inner_action, outer_action], None);
        let enclosed = match crate::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => value,
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        };
        let Payload::Frame { action: Some(enclosed_id), .. } = enclosed.payload() else {
            panic!("enclose must return an ACTION!")
        };
        let mut call_feed = Feed::new(vec![Cell::integer(7)], None);
        match action::dispatch(&mut vm, *enclosed_id, &mut call_feed) {
            Bounce::Done(value) => assert_eq!(value, Cell::integer(7)),
            Bounce::Thrown { value, .. } => panic!("unexpected throw: {value:?}"),
        }
    }
}
