//! `rebol-core-tools`: a small CLI for exercising the evaluator from the
//! shell — load a file, run it, and optionally trace bounces. One
//! subcommand per inspection operation, each wiring up its own tracing
//! level before handing off to the VM.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rebol_core::scan::{DefaultScanner, Scanner};
use rebol_core::trampoline::Bounce;
use rebol_core::vm::Vm;

#[derive(Parser)]
#[command(name = "rebol-core-tools", about = "Inspect and drive the rebol-core evaluator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan and run a source file, printing the final value.
    Eval { file: PathBuf },
    /// Like `eval`, but with `RUST_LOG=trace` bounce tracing forced on.
    Trace { file: PathBuf },
    /// Dump every interned symbol spelling.
    Symbols,
    /// Scan a file and step through it one expression at a time, printing
    /// each intermediate result without ever invoking side-effecting
    /// natives' own further recursion (one `eval_one` call per top-level
    /// element — still runs natives, but doesn't loop on its own).
    DisasmSteps { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Trace { file } => {
            init_tracing("trace");
            run_eval(&file)
        }
        Command::Eval { file } => {
            init_tracing("warn");
            run_eval(&file)
        }
        Command::Symbols => {
            init_tracing("warn");
            let vm = Vm::boot();
            for spelling in vm.symbols.all_spellings() {
                println!("{spelling}");
            }
            Ok(())
        }
        Command::DisasmSteps { file } => {
            init_tracing("debug");
            run_disasm_steps(&file)
        }
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn run_eval(file: &PathBuf) -> Result<()> {
    let mut vm = Vm::boot();
    let source = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let stub = DefaultScanner.scan(&mut vm, &source, &file.display().to_string())?;
    let rebol_core::arena::StubContent::Source(elements) = vm.arena.get(stub).content.clone() else {
        unreachable!("DefaultScanner always allocates a Source stub")
    };
    let result = vm.run(elements)?;
    println!("{result:?}");
    Ok(())
}

fn run_disasm_steps(file: &PathBuf) -> Result<()> {
    let mut vm = Vm::boot();
    let source = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let stub = DefaultScanner.scan(&mut vm, &source, &file.display().to_string())?;
    let rebol_core::arena::StubContent::Source(elements) = vm.arena.get(stub).content.clone() else {
        unreachable!("DefaultScanner always allocates a Source stub")
    };

    let mut feed = rebol_core::feed::Feed::new(elements, Some(vm.globals));
    let mut step = 0usize;
    while !feed.is_at_end() {
        step += 1;
        match rebol_core::stepper::eval_one(&mut vm, &mut feed) {
            Bounce::Done(value) => println!("step {step}: {value:?}"),
            Bounce::Thrown { label, value } => {
                println!("step {step}: thrown {label:?} {value:?}");
                break;
            }
        }
    }
    Ok(())
}
