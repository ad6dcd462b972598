//! Mano Emulator - CLI Entry Point
//!
//! Commands:
//! - `mano-emu run <image>` - Run an image until it halts
//! - `mano-emu debug <image>` - Interactive debugger
//! - `mano-emu console [image]` - Line-oriented command console
//! - `mano-emu disasm <image>` - Disassemble an image
//! - `mano-emu test` - Built-in self-test

use clap::{Parser, Subcommand};
use mano::{Config, Image};
use std::io::{BufRead, Write};
use std::ops::ControlFlow;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mano-emu")]
#[command(version = "0.1.0")]
#[command(about = "A microcycle-accurate emulator of the Mano basic computer")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an image until it halts
    Run {
        /// Path to the image file
        image: String,
        /// Maximum number of microcycles to run (default: 10000)
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Print every microcycle
        #[arg(short, long)]
        trace: bool,
        /// Honor the indirect bit of memory-reference words
        #[arg(short, long)]
        indirect: bool,
        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
        /// JSON config file
        #[arg(short, long)]
        config: Option<String>,
        /// Write the final memory contents as an image
        #[arg(long)]
        dump: Option<String>,
    },
    /// Interactive debugger
    Debug {
        /// Path to the image file
        image: String,
        /// Delay between microcycles while running, in ms (min 10)
        #[arg(short, long)]
        speed: Option<u64>,
        /// Honor the indirect bit of memory-reference words
        #[arg(short, long)]
        indirect: bool,
        /// JSON config file
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Line-oriented command console on stdin
    Console {
        /// Image to load first
        image: Option<String>,
        /// JSON config file
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Disassemble an image
    Disasm {
        /// Path to the image file
        image: String,
    },
    /// Run the built-in self-test
    Test,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { image, max_cycles, trace, indirect, json, config, dump }) => {
            let mut cfg = load_config(config.as_deref());
            if let Some(max) = max_cycles {
                cfg.max_cycles = max;
            }
            cfg.indirect_addressing |= indirect;
            run_image(&image, &cfg, trace, json, dump.as_deref());
        }
        Some(Commands::Debug { image, speed, indirect, config }) => {
            let mut cfg = load_config(config.as_deref());
            if let Some(ms) = speed {
                cfg.speed_ms = ms;
            }
            cfg.indirect_addressing |= indirect;
            debug_image(&image, cfg);
        }
        Some(Commands::Console { image, config }) => {
            let cfg = load_config(config.as_deref());
            run_console(image.as_deref(), &cfg);
        }
        Some(Commands::Disasm { image }) => {
            disassemble_file(&image);
        }
        Some(Commands::Test) => {
            run_self_test();
        }
        None => {
            println!("Mano Emulator v0.1.0");
            println!("A microcycle-accurate basic computer emulator");
            println!();
            println!("Use --help for available commands");
            println!();
            demo_microcycles();
        }
    }
}

fn load_config(path: Option<&str>) -> Config {
    let Some(path) = path else {
        return Config::default();
    };
    match Config::load(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }
}

/// Load an image, reporting skipped lines. Exits when the file is unreadable.
fn load_image(path: &str) -> Image {
    match mano::load_image_file(path) {
        Ok(loaded) => {
            for d in &loaded.diagnostics {
                eprintln!("⚠️  skipped {}", d);
            }
            loaded.image
        }
        Err(e) => {
            eprintln!("❌ Failed to load image: {}", e);
            std::process::exit(1);
        }
    }
}

fn run_image(path: &str, cfg: &Config, trace: bool, json: bool, dump: Option<&str>) {
    use mano::console::format_step;
    use mano::{Machine, Register, RunSummary, StopReason};

    let image = load_image(path);
    if !json {
        println!("🔧 Running: {}", path);
        println!("📂 Loaded {} cells", image.len());
    }

    if image.is_empty() {
        eprintln!("❌ No cells to execute");
        std::process::exit(1);
    }

    let mut machine = Machine::with_image(cfg.engine(), &image);

    if !json {
        println!();
        println!("━━━ Execution ━━━");
    }

    let result = machine.run_limited_with(cfg.max_cycles, |report| {
        if trace && !json {
            println!("{}", format_step(report));
        }
    });
    let RunSummary { cycles, stop } = match result {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    if let Some(out) = dump {
        if let Err(e) = std::fs::write(out, mano::image::format_memory(machine.memory())) {
            eprintln!("❌ Failed to write {}: {}", out, e);
            std::process::exit(1);
        }
    }

    if json {
        let p = machine.profiler();
        let value = serde_json::json!({
            "cycles": cycles,
            "stop": stop,
            "phase": machine.phase(),
            "indirect_addressing": machine.config().indirect_addressing,
            "registers": machine.registers(),
            "profiler": {
                "cycles": p.cycles(),
                "instructions": p.instructions(),
                "reads": p.reads(),
                "writes": p.writes(),
                "cpi": p.cpi(),
            },
        });
        println!("{}", value);
        return;
    }

    println!();
    println!("━━━ Result ━━━");
    println!("Cycles: {}", cycles);
    println!("State: {:?} at {}", stop, machine.phase());
    for reg in Register::ALL {
        println!("{:<3} {}", reg, machine.registers().format(reg));
    }
    println!();
    println!("{}", machine.profiler());

    if stop == StopReason::CycleLimit {
        println!();
        println!("⚠️  Reached max cycles limit ({}). Use --max-cycles to increase.", cfg.max_cycles);
    }
}

#[cfg(feature = "tui")]
fn debug_image(path: &str, cfg: Config) {
    use mano::tui::run_debugger;

    println!("🔍 Loading: {}", path);
    let image = load_image(path);

    println!("🚀 Launching debugger...");
    println!();

    if let Err(e) = run_debugger(image, cfg) {
        eprintln!("❌ Debugger error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "tui"))]
fn debug_image(_path: &str, _cfg: Config) {
    eprintln!("❌ Built without the `tui` feature");
    std::process::exit(1);
}

fn run_console(path: Option<&str>, cfg: &Config) {
    use mano::{Console, Machine};

    let mut machine = Machine::new(cfg.engine());
    if let Some(path) = path {
        machine.load_image(&load_image(path));
    }
    let console = Console::new(cfg.max_cycles);

    println!("Mano console. Type 'help' for commands, 'quit' to leave.");
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("mano> ");
        let _ = std::io::stdout().flush();

        let Some(Ok(line)) = lines.next() else {
            break;
        };
        if matches!(line.trim(), "quit" | "exit") {
            break;
        }
        match console.execute(&mut machine, &line) {
            Ok(out) if out.is_empty() => {}
            Ok(out) => println!("{}", out),
            Err(e) => println!("error: {}", e),
        }
    }
}

fn disassemble_file(path: &str) {
    println!("📖 Disassembling: {}", path);
    println!();

    let image = load_image(path);
    println!("{}", mano::disassemble(&image));
}

fn demo_microcycles() {
    use mano::console::format_step;
    use mano::Machine;

    println!("━━━ Microcycle Demo ━━━");
    println!();

    // LDA 10, ADD 11, STA 12, HLT
    let image = Image::from([
        (0x000, 0x2010),
        (0x001, 0x1011),
        (0x002, 0x3012),
        (0x003, 0x7001),
        (0x010, 0x0007),
        (0x011, 0x0023),
    ]);
    let mut machine = Machine::with_image(Default::default(), &image);

    println!("Program:");
    for (addr, word) in image.iter().take(4) {
        println!("  {}: {:04X}  {}", addr, word, mano::image::disassemble_word(word));
    }
    println!();

    println!("First instruction, one timing state at a time:");
    if let Ok(report) = machine.step_instruction() {
        for step in &report.steps {
            println!("  {}", format_step(step));
        }
    }
    println!();

    if let Err(e) = machine.run(|_| ControlFlow::Continue(())) {
        eprintln!("❌ {}", e);
        return;
    }
    println!("7 + 0x23 = {:04X} stored at 012", machine.read(mano::Address::new(0x012)));
    println!();
    println!("{}", machine.profiler());
    println!();
    println!("✓ Machine working!");
}

fn run_self_test() {
    use mano::cpu::{decode, encode, MicroOps};
    use mano::{EngineConfig, Machine, Register};

    println!("━━━ Mano Emulator Self-Test ━━━");
    println!();

    let mut passed = 0;
    let mut failed = 0;

    let run = |cells: &[(u16, u16)], config: EngineConfig| {
        let image: Image = cells.iter().map(|&(a, w)| (mano::Address::new(a), w)).collect();
        let mut m = Machine::with_image(config, &image);
        let _ = m.run_limited(10_000);
        m
    };

    // Test 1: Decode/encode inverse
    print!("Decode/encode inverse... ");
    if (0..=u16::MAX).all(|w| encode(&decode(w)) == w) {
        println!("✓");
        passed += 1;
    } else {
        println!("✗");
        failed += 1;
    }

    // Test 2: Load and halt
    print!("LDA then HLT... ");
    let m = run(&[(0, 0x2005), (1, 0x7001), (5, 0x1234)], EngineConfig::default());
    if m.is_halted() && m.register(Register::Ac) == 0x1234 && m.profiler().instructions() == 2 {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (AC={:04X})", m.register(Register::Ac));
        failed += 1;
    }

    // Test 3: Carry out of ADD
    print!("ADD carry into E... ");
    let m = run(&[(0, 0x2010), (1, 0x1011), (2, 0x7001), (0x10, 0xFFFF), (0x11, 0x0002)], EngineConfig::default());
    if m.register(Register::Ac) == 0x0001 && m.register(Register::E) == 1 {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (AC={:04X}, E={})", m.register(Register::Ac), m.register(Register::E));
        failed += 1;
    }

    // Test 4: Subroutine call
    print!("BSA saves the return address... ");
    let m = run(&[(0, 0x5010), (1, 0x7001), (0x11, 0x7001)], EngineConfig::default());
    if m.read(mano::Address::new(0x10)) == 0x0001 && m.registers().pc == mano::Address::new(0x12) {
        println!("✓");
        passed += 1;
    } else {
        println!("✗");
        failed += 1;
    }

    // Test 5: ISZ loop
    print!("ISZ countdown loop... ");
    let m = run(&[(0, 0x6010), (1, 0x4000), (2, 0x7001), (0x10, 0xFFFB)], EngineConfig::default());
    if m.is_halted() && m.read(mano::Address::new(0x10)) == 0 {
        println!("✓");
        passed += 1;
    } else {
        println!("✗");
        failed += 1;
    }

    // Test 6: Micro-op ordering
    print!("CLA CMA INC ordering... ");
    let word = 0x7000 | (MicroOps::CLA | MicroOps::CMA | MicroOps::INC | MicroOps::HLT).bits();
    let m = run(&[(0, word)], EngineConfig::default());
    if m.register(Register::Ac) == 0x0000 {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (AC={:04X})", m.register(Register::Ac));
        failed += 1;
    }

    // Test 7: Indirect addressing
    print!("Indirect LDA... ");
    let m = run(&[(0, 0xA010), (1, 0x7001), (0x10, 0x0020), (0x20, 0xCAFE)], EngineConfig { indirect_addressing: true });
    if m.register(Register::Ac) == 0xCAFE {
        println!("✓");
        passed += 1;
    } else {
        println!("✗ (AC={:04X})", m.register(Register::Ac));
        failed += 1;
    }

    println!();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Results: {} passed, {} failed", passed, failed);

    if failed == 0 {
        println!("✓ All tests passed!");
    } else {
        std::process::exit(1);
    }
}
