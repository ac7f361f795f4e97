//! The VM (C0): the single owner of every subsystem's state, and the
//! embedding's entry point for running source. See spec.md §5, §6.

use std::collections::HashMap;

use crate::action::ActionSpec;
use crate::arena::gc::RootProvider;
use crate::arena::{gc, Arena, StubId};
use crate::cell::Cell;
use crate::config::VmConfig;
use crate::context::{sea, Context, ContextKind, InheritanceTable};
use crate::data_stack::DataStack;
use crate::feed::Feed;
use crate::symbol::SymbolTable;
use crate::trampoline::{Bounce, Trampoline};

/// Every interpreter subsystem in one place. Never shared across threads
/// (spec.md §5); an embedding that wants concurrency runs one `Vm` per
/// worker.
pub struct Vm {
    pub arena: Arena,
    pub symbols: SymbolTable,
    pub inherits: InheritanceTable,
    pub data_stack: DataStack,
    pub trampoline: Trampoline,
    /// Native/user-function dispatch tables, keyed by the action's
    /// archetype varlist id (spec.md §4.9).
    pub actions: HashMap<StubId, ActionSpec>,
    /// The top-level user-visible module ("user context" in Rebol
    /// parlance) — a sea context, since top-level scripts extend it one
    /// symbol at a time (spec.md §4.4).
    pub globals: StubId,
    /// The native library's own sea context; distinct from `globals` so a
    /// user can shadow a native name without mutating the library's own
    /// binding (spec.md §6.1).
    pub library: StubId,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// A bare VM with no natives registered — used by unit tests in the
    /// other modules that only need a handful of hand-built actions.
    /// [`Vm::boot`] is the embedding-facing constructor.
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let symbols = SymbolTable::new();
        let globals = sea::alloc_sea(&mut arena);
        let library = sea::alloc_sea(&mut arena);
        Vm {
            arena,
            symbols,
            inherits: InheritanceTable::new(),
            data_stack: DataStack::new(),
            trampoline: Trampoline::new(),
            actions: HashMap::new(),
            globals,
            library,
        }
    }

    /// The embedding-facing constructor: a VM with every supplemented
    /// native registered and `globals` set up to fall through to
    /// `library` on a miss (spec.md §4.3's inheritance chain, §6.1).
    /// Sized from `REBOL_CORE_*` environment overrides; see
    /// [`Vm::boot_with_config`] to pass sizing explicitly.
    pub fn boot() -> Self {
        Vm::boot_with_config(VmConfig::from_env())
    }

    /// Like [`Vm::boot`], but with explicit stack/arena sizing instead of
    /// reading it from the environment — what a host that already has its
    /// own config file/flags parsed would call.
    pub fn boot_with_config(config: VmConfig) -> Self {
        let mut arena = Arena::with_capacity(config.arena_page_size);
        let symbols = SymbolTable::new();
        let globals = sea::alloc_sea(&mut arena);
        let library = sea::alloc_sea(&mut arena);
        let mut vm = Vm {
            arena,
            symbols,
            inherits: InheritanceTable::new(),
            data_stack: DataStack::with_capacity(config.data_stack_initial),
            trampoline: Trampoline::new(),
            actions: HashMap::new(),
            globals,
            library,
        };
        vm.inherits.set_parent(vm.globals, vm.library);
        crate::natives::register_all(&mut vm);
        vm
    }

    /// Run a whole program's worth of already-scanned source, discarding
    /// all but the last expression's result — the embedding's top-level
    /// entry point (spec.md §6's `run` sketch).
    pub fn run(&mut self, elements: Vec<Cell>) -> anyhow::Result<Cell> {
        let mut feed = Feed::new(elements, Some(self.globals));
        let mut last = Cell::ghost();
        while !feed.is_at_end() {
            match crate::stepper::eval_one(self, &mut feed) {
                Bounce::Done(value) => last = value,
                Bounce::Thrown { label, value } => {
                    anyhow::bail!("unhandled throw ({label:?}): {value:?}")
                }
            }
        }
        Ok(last)
    }

    /// Run the mark-sweep collector, rooting at the data stack and the
    /// trampoline's own level stack (spec.md §4.2, §6.1).
    pub fn collect_garbage(&mut self) -> usize {
        struct Roots<'a> {
            data_stack: &'a DataStack,
            trampoline: &'a Trampoline,
            globals: StubId,
            library: StubId,
        }
        impl gc::RootProvider for Roots<'_> {
            fn for_each_root(&self, visit: &mut dyn FnMut(StubId)) {
                for cell in self.data_stack.iter() {
                    if let Some(id) = cell.payload().referenced_stub() {
                        visit(id);
                    }
                }
                self.trampoline.for_each_root(visit);
                visit(self.globals);
                visit(self.library);
            }
        }
        let roots = Roots {
            data_stack: &self.data_stack,
            trampoline: &self.trampoline,
            globals: self.globals,
            library: self.library,
        };
        gc::collect(&mut self.arena, &roots)
    }

    /// Build a context as `make_varlist_detect` would, for a host-facing
    /// `make object [...]`/`make module [...]` helper: collect set-words
    /// from `body`, allocate the context, then evaluate `body` against it
    /// as its own ambient binding (spec.md §4.3's binding-on-encounter,
    /// §4.4's context construction).
    pub fn make_object(&mut self, body: &[Cell]) -> anyhow::Result<StubId> {
        let ctx = crate::context::varlist::make_varlist_detect(
            &mut self.arena,
            &mut self.symbols,
            ContextKind::Object,
            body,
            false,
            None,
        );
        let stub = self
            .arena
            .alloc(crate::arena::Flavor::Source, crate::arena::StubContent::Source(body.to_vec()));
        match crate::stepper::eval_source_stub(self, stub, Some(ctx)) {
            Bounce::Done(_) => Ok(ctx),
            Bounce::Thrown { value, .. } => anyhow::bail!("make object body threw: {value:?}"),
        }
    }

    pub fn make_module(&mut self, body: &[Cell]) -> anyhow::Result<StubId> {
        let ctx = sea::alloc_sea(&mut self.arena);
        for symbol in crate::collector::Collector::new().collect(&mut self.symbols, body, false) {
            Context::Sea(ctx).ensure_member(&mut self.arena, &mut self.symbols, symbol);
        }
        let stub = self
            .arena
            .alloc(crate::arena::Flavor::Source, crate::arena::StubContent::Source(body.to_vec()));
        match crate::stepper::eval_source_stub(self, stub, Some(ctx)) {
            Bounce::Done(_) => Ok(ctx),
            Bounce::Thrown { value, .. } => anyhow::bail!("make module body threw: {value:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Binding;

    #[test]
    fn boot_registers_natives_reachable_from_globals() {
        let mut vm = Vm::boot();
        let add = vm.symbols.spelling_to_symbol("add").expect("add should be registered");
        let value = vm.inherits.get_inherited(&vm.arena, &vm.symbols, Context::Sea(vm.globals), add);
        assert!(value.is_some_and(|v| v.is_action()));
    }

    #[test]
    fn run_evaluates_a_simple_expression() {
        let mut vm = Vm::boot();
        let plus = vm.symbols.spelling_to_symbol("add").unwrap();
        let elements = vec![
            Cell::integer(1),
            Cell::word(plus, Binding::Context(vm.globals)),
            Cell::integer(2),
        ];
        let result = vm.run(elements).unwrap();
        assert_eq!(result, Cell::integer(3));
    }

    #[test]
    fn make_object_binds_body_words_to_the_new_context() {
        let mut vm = Vm::boot();
        let a = vm.symbols.intern("a");
        let set_a = Cell::new(
            crate::cell::Heart::Chain,
            crate::cell::Payload::Sequence(crate::value::sequence::SequenceRepr::from_elements(
                vec![Cell::word(a, Binding::Unbound), Cell::new(crate::cell::Heart::Space, crate::cell::Payload::None)],
                &mut vm.arena,
            )),
        );
        let ctx = vm.make_object(&[set_a, Cell::integer(1)]).unwrap();
        let got = Context::Varlist(ctx).get(&vm.arena, &vm.symbols, a);
        assert_eq!(got, Some(Cell::integer(1)));
    }
}
