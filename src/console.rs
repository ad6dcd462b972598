//! Text command console.
//!
//! A line-oriented front end over [`Machine`]. Each command returns the
//! text to show; nothing is printed here, so the same console backs the
//! CLI REPL, the TUI command line, and the browser bindings.
//!
//! Commands (case-insensitive):
//! - `show <pc|ar|ir|ac|dr|e>`
//! - `show mem <hex-address> [count]`
//! - `show all`, `show profiler`
//! - `step` (one microcycle), `next` (one instruction)
//! - `run` (until halt, bounded by the cycle limit)
//! - `halt`, `reset`, `help`

use crate::cpu::{Address, EngineError, Register, StepReport};
use crate::image::disassemble_word;
use crate::machine::{Machine, StopReason};
use std::fmt::Write;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Default bound for `run`.
pub const DEFAULT_MAX_CYCLES: u64 = 10_000;

pub const HELP: &str = "\
show <pc|ar|ir|ac|dr|e>       show one register
show mem <hex-addr> [count]   show memory cells
show all                      show every register
show profiler                 show execution counters
step                          execute one microcycle
next                          execute one instruction
run                           run until halt
halt                          stop the machine
reset                         clear memory, registers and counters
help                          this text";

/// A parsed console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Show(Register),
    ShowMem { start: Address, count: usize },
    ShowAll,
    ShowProfiler,
    Step,
    Next,
    Run,
    Halt,
    Reset,
    Help,
}

impl FromStr for Command {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let lowered = line.trim().to_ascii_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();

        match words.as_slice() {
            ["step"] => Ok(Command::Step),
            ["next"] => Ok(Command::Next),
            ["run"] => Ok(Command::Run),
            ["halt"] => Ok(Command::Halt),
            ["reset"] => Ok(Command::Reset),
            ["help"] => Ok(Command::Help),
            ["show", "all"] => Ok(Command::ShowAll),
            ["show", "profiler"] => Ok(Command::ShowProfiler),
            ["show", "mem", addr] => Ok(Command::ShowMem { start: parse_address(addr)?, count: 1 }),
            ["show", "mem", addr, count] => Ok(Command::ShowMem {
                start: parse_address(addr)?,
                count: count
                    .parse::<usize>()
                    .map_err(|_| ConsoleError::InvalidCount(count.to_string()))?
                    .max(1),
            }),
            ["show", "mem"] => Err(ConsoleError::InvalidAddress(String::new())),
            ["show", reg] => reg
                .parse::<Register>()
                .map(Command::Show)
                .map_err(|_| ConsoleError::UnknownCommand(line.trim().to_string())),
            _ => Err(ConsoleError::UnknownCommand(line.trim().to_string())),
        }
    }
}

fn parse_address(token: &str) -> Result<Address, ConsoleError> {
    let digits = token.strip_prefix("0x").unwrap_or(token);
    u32::from_str_radix(digits, 16)
        .ok()
        .and_then(Address::checked)
        .ok_or_else(|| ConsoleError::InvalidAddress(token.to_string()))
}

/// Console errors. None of them change machine state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid hex address: {0}")]
    InvalidAddress(String),

    #[error("invalid count: {0}")]
    InvalidCount(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Executes console commands against a machine.
#[derive(Debug, Clone, Copy)]
pub struct Console {
    max_cycles: u64,
}

impl Default for Console {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CYCLES)
    }
}

impl Console {
    pub fn new(max_cycles: u64) -> Self {
        Self { max_cycles }
    }

    /// Parse and execute one line. Blank lines produce no output.
    pub fn execute(&self, machine: &mut Machine, line: &str) -> Result<String, ConsoleError> {
        if line.trim().is_empty() {
            return Ok(String::new());
        }
        let command: Command = line.parse()?;
        debug!(?command, "console");
        self.apply(machine, command)
    }

    /// Execute an already parsed command.
    pub fn apply(&self, machine: &mut Machine, command: Command) -> Result<String, ConsoleError> {
        let out = match command {
            Command::Show(reg) => format!("{reg} = {}", machine.registers().format(reg)),
            Command::ShowMem { start, count } => machine
                .memory_range(start, count)
                .into_iter()
                .map(|(addr, word)| format!("{addr}: {word:04X}  {}", disassemble_word(word)))
                .collect::<Vec<_>>()
                .join("\n"),
            Command::ShowAll => format_registers(machine),
            Command::ShowProfiler => machine.profiler().to_string(),
            Command::Step => format_step(&machine.step_micro()?),
            Command::Next => {
                let report = machine.step_instruction()?;
                let mut out = String::new();
                for step in &report.steps {
                    let _ = writeln!(out, "{}", format_step(step));
                }
                if !report.complete {
                    out.push_str("halted before the instruction completed\n");
                }
                let _ = write!(out, "changed: {}", report.changed);
                out
            }
            Command::Run => {
                let summary = machine.run_limited(self.max_cycles)?;
                match summary.stop {
                    StopReason::CycleLimit => format!(
                        "stopped after {} cycles (limit {})",
                        summary.cycles, self.max_cycles
                    ),
                    _ => format!("halted after {} cycles", summary.cycles),
                }
            }
            Command::Halt => {
                machine.halt();
                "halted".to_string()
            }
            Command::Reset => {
                machine.reset();
                "reset".to_string()
            }
            Command::Help => HELP.to_string(),
        };
        Ok(out)
    }
}

fn format_registers(machine: &Machine) -> String {
    let regs = machine.registers();
    let fields: Vec<String> = Register::ALL
        .into_iter()
        .map(|reg| format!("{reg}={}", regs.format(reg)))
        .collect();
    let state = if machine.is_halted() { "halted" } else { "running" };
    format!("{}  {} {state}", fields.join(" "), machine.phase())
}

/// One line describing a transition.
pub fn format_step(report: &StepReport) -> String {
    let mut line = format!("{}: {}", report.phase, report.op);
    if !report.changed.is_empty() {
        let _ = write!(line, "  [{}]", report.changed);
    }
    if report.halted {
        line.push_str("  HALT");
    }
    line
}
