//! logicpu - CLI Entry Point
//!
//! Commands:
//! - `logicpu run <images..>` - Run memory images until halt
//! - `logicpu debug <images..>` - Interactive debugger
//! - `logicpu disasm <image>` - Disassemble a memory image
//! - `logicpu fib` - Built-in Fibonacci demo
//! - `logicpu test` - Built-in self-test

use clap::{Args, Parser, Subcommand};
use logicpu::cpu::op;
use logicpu::{ClockDriver, Cpu, CpuConfig, HaltReason, MemoryImage, Pulse};
use slog::{o, Discard, Drain, Logger};
use slog_term::{FullFormat, TermDecorator};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "logicpu")]
#[command(version = "0.1.0")]
#[command(about = "Cycle-accurate simulator of a homebrew discrete-logic CPU")]
struct Cli {
    /// Log engine events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options shared by every command that builds a machine.
#[derive(Args)]
struct MachineArgs {
    /// JSON machine configuration
    #[arg(short, long)]
    config: Option<String>,
    /// Use the extended instruction set preset
    #[arg(short, long)]
    extended: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run memory images until the machine halts
    Run {
        /// JSON memory images, applied in order
        #[arg(required = true)]
        images: Vec<String>,
        #[command(flatten)]
        machine: MachineArgs,
        /// Clock frequency in Hz (default: as fast as possible)
        #[arg(long)]
        hz: Option<f64>,
        /// Maximum number of pulses to run
        #[arg(short, long, default_value = "1000000")]
        max_cycles: u64,
        /// Print every pulse
        #[arg(short, long)]
        trace: bool,
        /// Write memory to this JSON image when done
        #[arg(long)]
        save: Option<String>,
    },
    /// Interactive debugger
    Debug {
        /// JSON memory images, applied in order
        images: Vec<String>,
        #[command(flatten)]
        machine: MachineArgs,
        /// Initial clock frequency in Hz
        #[arg(long, default_value = "10")]
        hz: f64,
    },
    /// Disassemble a memory image
    Disasm {
        /// JSON memory image
        image: String,
        #[command(flatten)]
        machine: MachineArgs,
    },
    /// Run the Fibonacci demo and print its output
    Fib {
        /// Number of values to print
        #[arg(short, long, default_value = "12")]
        count: usize,
    },
    /// Run the built-in self-test
    Test,
}

fn main() {
    let cli = Cli::parse();
    let logger = build_logger(cli.verbose);

    match cli.command {
        Some(Commands::Run { images, machine, hz, max_cycles, trace, save }) => {
            let cpu = build_cpu(&machine, &images, logger);
            run_program(cpu, hz, max_cycles, trace, save);
        }
        Some(Commands::Debug { images, machine, hz }) => {
            let cpu = build_cpu(&machine, &images, logger);
            debug_program(cpu, hz);
        }
        Some(Commands::Disasm { image, machine }) => {
            let cpu = build_cpu(&machine, &[image], logger);
            disassemble_image(&cpu);
        }
        Some(Commands::Fib { count }) => {
            run_fibonacci(count, logger);
        }
        Some(Commands::Test) => {
            run_self_test();
        }
        None => {
            println!("logicpu v0.1.0");
            println!("A cycle-accurate discrete-logic CPU simulator");
            println!();
            println!("Use --help for available commands");
        }
    }
}

fn build_logger(verbose: bool) -> Logger {
    if !verbose {
        return Logger::root(Discard, o!());
    }
    let decorator = TermDecorator::new().build();
    let drain = FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!())
}

fn build_cpu<S: AsRef<str>>(machine: &MachineArgs, images: &[S], logger: Logger) -> Cpu {
    let config = match &machine.config {
        Some(path) => match CpuConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("❌ Failed to load config {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None if machine.extended => CpuConfig::extended(),
        None => CpuConfig::base(),
    };

    let mut cpu = match Cpu::with_logger(config, logger) {
        Ok(cpu) => cpu,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    for path in images {
        let path = path.as_ref();
        let image = match logicpu::load_image_file(path) {
            Ok(image) => image,
            Err(e) => {
                eprintln!("❌ Failed to read image {}: {}", path, e);
                std::process::exit(1);
            }
        };
        if let Err(e) = cpu.load_image(&image) {
            eprintln!("❌ Failed to load image {}: {}", path, e);
            std::process::exit(1);
        }
        println!("📂 Loaded {} words from {}", image.len(), path);
    }
    cpu
}

fn run_program(mut cpu: Cpu, hz: Option<f64>, max_cycles: u64, trace: bool, save: Option<String>) {
    println!();
    println!("━━━ Execution ━━━");

    let report = |cycle: u64, pulse: &Pulse| {
        if trace {
            println!(
                "{:>8}  T{}  {:<24} bus={}",
                cycle,
                pulse.microstep,
                pulse.signals.to_string(),
                pulse.bus.map_or("-".to_string(), |b| b.to_string())
            );
        }
        if let Some(value) = pulse.output {
            println!("OUT {}", value);
        }
    };

    match hz {
        Some(hz) => {
            let mut clock = ClockDriver::new(hz);
            let mut last = Instant::now();
            while !cpu.is_halted() && cpu.cycles() < max_cycles {
                std::thread::sleep(Duration::from_millis(1));
                let now = Instant::now();
                let elapsed = now.duration_since(last).as_secs_f64();
                last = now;
                let mut cycle = cpu.cycles();
                clock.advance_with(&mut cpu, elapsed, |pulse| {
                    cycle += 1;
                    report(cycle, pulse);
                });
            }
        }
        None => {
            while !cpu.is_halted() && cpu.cycles() < max_cycles {
                let pulse = cpu.pulse();
                report(cpu.cycles(), &pulse);
            }
        }
    }

    let regs = cpu.registers();
    println!();
    println!("━━━ Result ━━━");
    println!("Cycles: {}", cpu.cycles());
    match cpu.halt_reason() {
        Some(reason) => println!("State:  {}", reason),
        None => println!("State:  running"),
    }
    println!("PC={:<5} A={:<5} B={:<5} OUT={:<5} SP={}", regs.pc, regs.a, regs.b, regs.out, regs.sp);
    println!("Flags: carry={} zero={}", regs.flags.carry, regs.flags.zero);

    if let Some(path) = save {
        match logicpu::save_image(&path, "memory", cpu.memory()) {
            Ok(()) => println!("✓ Saved memory to {}", path),
            Err(e) => {
                eprintln!("❌ Failed to save memory: {}", e);
                std::process::exit(1);
            }
        }
    }

    if let Some(HaltReason::Fault(_)) = cpu.halt_reason() {
        std::process::exit(2);
    }
    if !cpu.is_halted() {
        println!();
        println!("⚠️  Reached max cycles limit ({}). Use --max-cycles to increase.", max_cycles);
    }
}

#[cfg(feature = "tui")]
fn debug_program(cpu: Cpu, hz: f64) {
    println!("🚀 Launching debugger...");
    if let Err(e) = logicpu::run_debugger(cpu, hz) {
        eprintln!("❌ Debugger error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_program(_cpu: Cpu, _hz: f64) {
    eprintln!("❌ Built without the `tui` feature");
    std::process::exit(1);
}

fn disassemble_image(cpu: &Cpu) {
    let memory = cpu.memory();
    // list up to the last non-zero word
    let end = memory.iter().rposition(|&w| w != 0).map_or(0, |i| i + 1);
    for line in logicpu::image::disassemble(cpu.table(), &memory[..end], 0, end) {
        println!("{}", line);
    }
}

fn run_fibonacci(count: usize, logger: Logger) {
    let mut cpu = match Cpu::with_logger(CpuConfig::base(), logger) {
        Ok(cpu) => cpu,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = cpu.load_image(&logicpu::programs::fibonacci()) {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    let mut printed = 0;
    while printed < count && !cpu.is_halted() {
        if let Some(value) = cpu.pulse().output {
            println!("{}", value);
            printed += 1;
        }
    }
    println!("({} pulses)", cpu.cycles());
}

fn run_self_test() {
    println!("━━━ logicpu Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;
    let mut check = |name: &str, ok: bool| {
        if ok {
            println!("{}... ✓", name);
            passed += 1;
        } else {
            println!("{}... ✗", name);
            failed += 1;
        }
    };

    check("Control tables compile", Cpu::new(CpuConfig::base()).is_ok() && Cpu::new(CpuConfig::extended()).is_ok());

    let alu = logicpu::cpu::alu::evaluate(250, 10, false, 0xFF);
    check("ALU add carry", alu.value == 4 && alu.carry);

    let alu = logicpu::cpu::alu::evaluate(3, 5, true, 0xFF);
    check("ALU subtract borrow", alu.value == 254 && !alu.carry);

    check("HLT takes four pulses", run_words(&[op::HLT]).map(|cpu| cpu.cycles()) == Some(4));

    let sum = run_words(&[op::LDI, 40, op::ADI, 2, op::OUT, op::HLT]).map(|cpu| cpu.output());
    check("Load/add/output", sum == Some(42));

    let call = run_words(&[op::JSR, 5, op::OUT, op::HLT, op::NOP, op::LDI, 9, op::RET]);
    check("Call and return", call.map(|cpu| (cpu.output(), cpu.registers().sp)) == Some((9, 0)));

    let mut cpu = run_words(&[op::LDI, 7, op::STA, 100, op::HLT]);
    let preserved = cpu.as_mut().map(|cpu| {
        cpu.reset();
        cpu.memory()[100] == 7 && cpu.registers().a == 0
    });
    check("Reset preserves memory", preserved == Some(true));

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        std::process::exit(1);
    }
}

fn run_words(words: &[u64]) -> Option<Cpu> {
    let mut cpu = Cpu::new(CpuConfig::base()).ok()?;
    cpu.load_image(&MemoryImage::from_words(0, words)).ok()?;
    cpu.run_until_halt(10_000).ok()?;
    Some(cpu)
}
