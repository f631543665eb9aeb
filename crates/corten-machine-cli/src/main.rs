//! Command-line front end: load an ELF, run it, pass the guest's exit code
//! through, optionally tracing every executed instruction.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use corten_machine::cpu::state::reg;
use corten_machine::cpu::step::StepContext;
use corten_machine::{Machine, StatusCode};

#[derive(Parser)]
#[command(name = "corten", about = "ARMv7-M Thumb-2 functional emulator")]
struct Args {
    /// Path to the guest ELF image.
    elf_file: String,

    /// Take the entry point from the ELF header instead of the reset vector.
    #[arg(short = 'e', long)]
    elf_entry_point: bool,

    /// Stop after this many instructions.
    #[arg(short = 'i', long)]
    instr_limit: Option<u64>,

    /// Print every executed instruction to stdout.
    #[arg(short = 't', long)]
    trace: bool,

    /// With --trace, also print registers that changed.
    #[arg(long)]
    trace_regs: bool,

    /// Log filter, e.g. "debug" or "corten_cpu_core=trace".
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&args.log_level)
                .context("invalid --log-level filter")?,
        )
        .with_writer(std::io::stderr)
        .init();

    let mut machine = Machine::new();
    machine
        .load(&args.elf_file, args.elf_entry_point)
        .with_context(|| format!("loading {}", args.elf_file))?;

    let trace = args.trace;
    let trace_regs = args.trace_regs;
    let mut pre = |ctx: &StepContext<'_>| {
        if ctx.opcode.wide {
            println!(
                "{:08x}: {:04x} {:04x}  {}",
                ctx.pc, ctx.opcode.low, ctx.opcode.high, ctx.instr
            );
        } else {
            println!("{:08x}: {:04x}       {}", ctx.pc, ctx.opcode.low, ctx.instr);
        }
    };

    let mut shadow = [0u32; 16];
    let mut post = move |ctx: &StepContext<'_>| {
        for r in 0..13u8 {
            let value = ctx.state.read_reg(r);
            if value != shadow[usize::from(r)] {
                println!("          r{r} = {value:#010x}");
                shadow[usize::from(r)] = value;
            }
        }
        let sp = ctx.state.read_reg(reg::SP);
        if sp != shadow[13] {
            println!("          sp = {sp:#010x}");
            shadow[13] = sp;
        }
    };

    let result = machine.exec(
        args.instr_limit,
        if trace { Some(&mut pre) } else { None },
        if trace && trace_regs { Some(&mut post) } else { None },
    );

    match result.status {
        StatusCode::Success => Ok(ExitCode::from(result.program_exit_code as u8)),
        StatusCode::MaxInstructionsReached => {
            eprintln!("instruction limit reached");
            Ok(ExitCode::from(0))
        }
        status => {
            eprintln!("emulator error: {}", status.as_str());
            Ok(ExitCode::from(2))
        }
    }
}
