//! Control API: the façade front ends drive.
//!
//! A [`Machine`] wraps one [`Engine`] and adds instruction-level stepping,
//! caller-driven runs, and read-only inspection. It never schedules
//! anything on its own; every call returns synchronously with the changes
//! it caused.

use crate::cpu::{
    Address, ChangedRegisters, Engine, EngineConfig, EngineError, Memory, Phase, Profiler,
    Register, Registers, StepReport, Word, MEMORY_SIZE,
};
use crate::image::Image;
use serde::{Serialize, Deserialize};
use std::ops::ControlFlow;

/// Result of [`Machine::step_instruction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionReport {
    /// One report per microcycle executed.
    pub steps: Vec<StepReport>,
    /// Union of the registers changed by those microcycles.
    pub changed: ChangedRegisters,
    /// False when the machine halted before control returned to T0.
    pub complete: bool,
}

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Halted,
    /// The cadence callback asked to stop.
    Cancelled,
    CycleLimit,
}

/// Result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Microcycles executed by this run.
    pub cycles: u64,
    pub stop: StopReason,
}

/// The machine as seen by its collaborators.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    engine: Engine,
}

impl Machine {
    pub fn new(config: EngineConfig) -> Self {
        Self { engine: Engine::new(config) }
    }

    /// Create a machine and load an image into it.
    pub fn with_image(config: EngineConfig, image: &Image) -> Self {
        let mut machine = Self::new(config);
        machine.load_image(image);
        machine
    }

    // ==================== Control ====================

    /// Execute one microcycle.
    pub fn step_micro(&mut self) -> Result<StepReport, EngineError> {
        self.engine.micro_step()
    }

    /// Execute microcycles until control is back at T0.
    ///
    /// At least one microcycle always runs, so calling this at T0 executes
    /// a whole instruction, and calling it mid-instruction finishes the
    /// current one. Stops early if the machine halts.
    pub fn step_instruction(&mut self) -> Result<InstructionReport, EngineError> {
        let mut steps = Vec::new();
        let mut changed = ChangedRegisters::empty();

        loop {
            let report = self.engine.micro_step()?;
            changed = changed.union(report.changed);
            let complete = report.instruction_complete;
            let halted = report.halted;
            steps.push(report);

            if complete || halted {
                return Ok(InstructionReport { steps, changed, complete });
            }
        }
    }

    /// Step microcycles until the machine halts or `cadence` breaks.
    ///
    /// `cadence` sees every transition; it is where a front end paces the
    /// run, renders, or checks a cancel signal.
    pub fn run<F>(&mut self, mut cadence: F) -> Result<RunSummary, EngineError>
    where
        F: FnMut(&StepReport) -> ControlFlow<()>,
    {
        if self.engine.is_halted() {
            return Err(EngineError::Halted);
        }

        let mut cycles = 0;
        while !self.engine.is_halted() {
            let report = self.engine.micro_step()?;
            cycles += 1;
            if cadence(&report).is_break() {
                return Ok(RunSummary { cycles, stop: StopReason::Cancelled });
            }
        }
        Ok(RunSummary { cycles, stop: StopReason::Halted })
    }

    /// Run for at most `max_cycles` microcycles.
    pub fn run_limited(&mut self, max_cycles: u64) -> Result<RunSummary, EngineError> {
        self.run_limited_with(max_cycles, |_| {})
    }

    /// Run for at most `max_cycles` microcycles, showing every transition
    /// to `observe`.
    pub fn run_limited_with<F>(&mut self, max_cycles: u64, mut observe: F) -> Result<RunSummary, EngineError>
    where
        F: FnMut(&StepReport),
    {
        let mut remaining = max_cycles;
        if remaining == 0 {
            return Ok(RunSummary { cycles: 0, stop: StopReason::CycleLimit });
        }
        let summary = self.run(|report| {
            observe(report);
            remaining -= 1;
            if remaining == 0 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;

        Ok(match summary.stop {
            StopReason::Cancelled if !self.engine.is_halted() => {
                RunSummary { stop: StopReason::CycleLimit, ..summary }
            }
            StopReason::Cancelled => RunSummary { stop: StopReason::Halted, ..summary },
            _ => summary,
        })
    }

    /// Zero memory, registers, halt flag, and counters.
    pub fn reset(&mut self) {
        self.engine.reset();
    }

    /// Load an image into freshly cleared memory and reset the CPU.
    pub fn load_image(&mut self, image: &Image) {
        self.engine.load_image(image);
    }

    /// Stop the machine from outside.
    pub fn halt(&mut self) {
        self.engine.halt();
    }

    // ==================== Inspection ====================

    pub fn registers(&self) -> &Registers {
        self.engine.registers()
    }

    pub fn register(&self, reg: Register) -> Word {
        self.engine.registers().get(reg)
    }

    pub fn memory(&self) -> &Memory {
        self.engine.memory()
    }

    pub fn read(&self, addr: Address) -> Word {
        self.engine.memory().read(addr)
    }

    /// Up to `count` cells from `start`, stopping at the top of memory.
    pub fn memory_range(&self, start: Address, count: usize) -> Vec<(Address, Word)> {
        self.engine.memory().dump(start, count.min(MEMORY_SIZE))
    }

    pub fn profiler(&self) -> Profiler {
        self.engine.profiler()
    }

    pub fn phase(&self) -> Phase {
        self.engine.phase()
    }

    pub fn is_halted(&self) -> bool {
        self.engine.is_halted()
    }

    pub fn config(&self) -> EngineConfig {
        self.engine.config()
    }
}
