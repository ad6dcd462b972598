//! Microcycle execution engine.
//!
//! Every instruction runs as a sequence of timing states:
//!
//! | State | Register-reference        | Memory-reference                |
//! |-------|---------------------------|---------------------------------|
//! | T0    | AR <- PC                  | AR <- PC                        |
//! | T1    | IR <- M[AR], PC <- PC + 1 | IR <- M[AR], PC <- PC + 1       |
//! | T2    | decode                    | decode                          |
//! | T3    | execute enabled micro-ops | AR <- address(IR)               |
//! | T4    |                           | STA/BUN/BSA finish, else DR <- M[AR] |
//! | T5    |                           | AND/ADD/LDA/ISZ finish          |
//!
//! The engine only exposes single transitions. Continuous runs, timers
//! and display belong to the caller.

use crate::cpu::decode::{self, Instruction, MemoryOp, MicroOps};
use crate::cpu::registers::{Address, ChangedRegisters, Word};
use crate::cpu::{Memory, Profiler, Registers};
use crate::image::Image;
use serde::{Serialize, Deserialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Timing state of the microcycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Phase {
    /// T0: AR <- PC
    #[default]
    FetchAddr,
    /// T1: IR <- M[AR], PC <- PC + 1
    FetchInstr,
    /// T2: decode IR
    Decode,
    /// T3: execute a register-reference word, or load the operand address
    AddrOrExec,
    /// T4: memory access
    MemAccess,
    /// T5: ALU commit
    AluCommit,
}

impl Phase {
    /// Timing state number (0-5).
    pub const fn index(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.index())
    }
}

/// Engine options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Honor bit 15 of memory-reference words: T4 first replaces AR with
    /// the low 12 bits of M[AR], at the cost of one extra read.
    pub indirect_addressing: bool,
}

/// Direction of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessKind {
    Read,
    Write,
}

/// One memory access performed during a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryAccess {
    pub addr: Address,
    pub value: Word,
    pub kind: AccessKind,
}

/// The T5 commit performed by an operand-reading instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AluOp {
    And,
    Add,
    Lda,
    Isz { skipped: bool },
    /// Unassigned opcode: the operand is dropped.
    Discard,
}

/// Description of the micro-operation a transition performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MicroOp {
    LoadAr,
    Fetch { word: Word },
    Decode(Instruction),
    Register(MicroOps),
    OperandAddress { addr: Address },
    Store { indirect: bool },
    Branch { indirect: bool },
    BranchAndSave { indirect: bool },
    ReadOperand { indirect: bool },
    Commit(AluOp),
}

impl fmt::Display for MicroOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deref = |indirect: bool| if indirect { "AR <- M[AR]; " } else { "" };
        match self {
            MicroOp::LoadAr => f.write_str("AR <- PC"),
            MicroOp::Fetch { word } => write!(f, "IR <- M[AR] ({word:04X}), PC <- PC+1"),
            MicroOp::Decode(instr) => write!(f, "decode {instr} ({})", instr.category()),
            MicroOp::Register(ops) => write!(f, "execute {ops}"),
            MicroOp::OperandAddress { addr } => write!(f, "AR <- address(IR) ({addr})"),
            MicroOp::Store { indirect } => write!(f, "{}M[AR] <- AC", deref(*indirect)),
            MicroOp::Branch { indirect } => write!(f, "{}PC <- AR", deref(*indirect)),
            MicroOp::BranchAndSave { indirect } => {
                write!(f, "{}M[AR] <- PC, PC <- AR+1", deref(*indirect))
            }
            MicroOp::ReadOperand { indirect } => write!(f, "{}DR <- M[AR]", deref(*indirect)),
            MicroOp::Commit(AluOp::And) => f.write_str("AC <- AC & DR"),
            MicroOp::Commit(AluOp::Add) => f.write_str("AC <- AC + DR, E <- carry"),
            MicroOp::Commit(AluOp::Lda) => f.write_str("AC <- DR"),
            MicroOp::Commit(AluOp::Isz { skipped: false }) => f.write_str("M[AR] <- DR+1"),
            MicroOp::Commit(AluOp::Isz { skipped: true }) => {
                f.write_str("M[AR] <- DR+1, PC <- PC+1 (zero)")
            }
            MicroOp::Commit(AluOp::Discard) => f.write_str("no commit"),
        }
    }
}

/// Everything an observer may want to know about one transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// State that was executed.
    pub phase: Phase,
    /// State the engine moved to.
    pub next: Phase,
    pub op: MicroOp,
    /// Registers whose value differs from before the transition.
    pub changed: ChangedRegisters,
    /// Memory traffic, in order.
    pub accesses: Vec<MemoryAccess>,
    pub registers: Registers,
    pub profiler: Profiler,
    pub halted: bool,
    /// The transition finished an instruction (control is back at T0).
    pub instruction_complete: bool,
}

/// The execution engine: owns the machine state and advances it one
/// microcycle at a time.
#[derive(Clone, Serialize, Deserialize)]
pub struct Engine {
    regs: Registers,
    mem: Memory,
    phase: Phase,
    halted: bool,
    profiler: Profiler,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine with zeroed state.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            regs: Registers::new(),
            mem: Memory::new(),
            phase: Phase::FetchAddr,
            halted: false,
            profiler: Profiler::new(),
            config,
        }
    }

    /// Zero registers, memory, halt flag, and counters.
    pub fn reset(&mut self) {
        self.mem.clear();
        self.reset_registers();
        info!("machine reset");
    }

    /// Replace memory with an image, then zero registers, halt flag, and
    /// counters.
    pub fn load_image(&mut self, image: &Image) {
        self.mem.load_image(image);
        self.reset_registers();
        info!(entries = image.len(), "image loaded");
    }

    /// Stop the machine from outside, as the front panel's halt switch does.
    pub fn halt(&mut self) {
        if !self.halted {
            self.halted = true;
            info!(pc = %self.regs.pc, "halted by request");
        }
    }

    fn reset_registers(&mut self) {
        self.regs.reset();
        self.phase = Phase::FetchAddr;
        self.halted = false;
        self.profiler.reset();
    }

    /// Perform exactly one transition.
    ///
    /// Fails without touching any state once the machine has halted.
    pub fn micro_step(&mut self) -> Result<StepReport, EngineError> {
        if self.halted {
            return Err(EngineError::Halted);
        }

        let before = self.regs;
        let phase = self.phase;
        let mut accesses = Vec::new();
        self.profiler.record_cycle();

        let (op, next) = match phase {
            Phase::FetchAddr => {
                self.regs.ar = self.regs.pc;
                (MicroOp::LoadAr, Phase::FetchInstr)
            }
            Phase::FetchInstr => {
                let word = self.read(self.regs.ar, &mut accesses);
                self.regs.ir = word;
                self.regs.advance_pc();
                (MicroOp::Fetch { word }, Phase::Decode)
            }
            Phase::Decode => (MicroOp::Decode(decode::decode(self.regs.ir)), Phase::AddrOrExec),
            Phase::AddrOrExec => self.address_or_execute(),
            Phase::MemAccess => self.memory_access(&mut accesses),
            Phase::AluCommit => (self.alu_commit(&mut accesses), Phase::FetchAddr),
        };

        self.phase = next;
        let instruction_complete = next == Phase::FetchAddr;
        if instruction_complete {
            self.profiler.record_instruction();
        }

        let changed = ChangedRegisters::between(&before, &self.regs);
        trace!(%phase, %op, %changed, "microcycle");
        if instruction_complete {
            debug!(
                instruction = %decode::decode(self.regs.ir),
                instructions = self.profiler.instructions(),
                "instruction complete"
            );
        }
        if self.halted {
            info!(pc = %self.regs.pc, cycles = self.profiler.cycles(), "halted");
        }

        Ok(StepReport {
            phase,
            next,
            op,
            changed,
            accesses,
            registers: self.regs,
            profiler: self.profiler,
            halted: self.halted,
            instruction_complete,
        })
    }

    /// T3.
    fn address_or_execute(&mut self) -> (MicroOp, Phase) {
        match decode::decode(self.regs.ir) {
            Instruction::Register(ops) => {
                self.execute_register(ops);
                (MicroOp::Register(ops), Phase::FetchAddr)
            }
            Instruction::Memory { addr, .. } | Instruction::Unassigned { addr } => {
                self.regs.ar = addr;
                (MicroOp::OperandAddress { addr }, Phase::MemAccess)
            }
        }
    }

    /// Apply every enabled micro-operation in fixed order. Later bits see
    /// the effects of earlier ones; HLT does not suppress its siblings.
    fn execute_register(&mut self, ops: MicroOps) {
        let mut halt = false;
        let r = &mut self.regs;

        for op in ops.iter() {
            match op {
                MicroOps::CLA => r.ac = 0,
                MicroOps::CLE => r.e = false,
                MicroOps::CMA => r.ac = !r.ac,
                MicroOps::CME => r.e = !r.e,
                MicroOps::CIR => {
                    let new_e = r.ac & 0x0001 != 0;
                    r.ac = (r.ac >> 1) | (r.e_bit() << 15);
                    r.e = new_e;
                }
                MicroOps::CIL => {
                    let new_e = r.ac & 0x8000 != 0;
                    r.ac = (r.ac << 1) | r.e_bit();
                    r.e = new_e;
                }
                MicroOps::INC => r.ac = r.ac.wrapping_add(1),
                MicroOps::SPA => {
                    if r.ac & 0x8000 == 0 {
                        r.advance_pc();
                    }
                }
                MicroOps::SNA => {
                    if r.ac & 0x8000 != 0 {
                        r.advance_pc();
                    }
                }
                MicroOps::SZA => {
                    if r.ac == 0 {
                        r.advance_pc();
                    }
                }
                MicroOps::SZE => {
                    if !r.e {
                        r.advance_pc();
                    }
                }
                MicroOps::HLT => halt = true,
                _ => {}
            }
        }

        if halt {
            self.halted = true;
        }
    }

    /// T4.
    fn memory_access(&mut self, accesses: &mut Vec<MemoryAccess>) -> (MicroOp, Phase) {
        let Instruction::Memory { op, indirect, .. } = decode::decode(self.regs.ir) else {
            // Unassigned opcode: fetch the operand, drop it at T5.
            self.regs.dr = self.read(self.regs.ar, accesses);
            return (MicroOp::ReadOperand { indirect: false }, Phase::AluCommit);
        };

        let indirect = indirect && self.config.indirect_addressing;
        if indirect {
            let pointer = self.read(self.regs.ar, accesses);
            self.regs.ar = Address::new(pointer);
        }
        let ar = self.regs.ar;

        match op {
            MemoryOp::Sta => {
                let ac = self.regs.ac;
                self.write(ar, ac, accesses);
                (MicroOp::Store { indirect }, Phase::FetchAddr)
            }
            MemoryOp::Bun => {
                self.regs.pc = ar;
                (MicroOp::Branch { indirect }, Phase::FetchAddr)
            }
            MemoryOp::Bsa => {
                let ret = self.regs.pc.value();
                self.write(ar, ret, accesses);
                self.regs.pc = ar.next();
                (MicroOp::BranchAndSave { indirect }, Phase::FetchAddr)
            }
            MemoryOp::And | MemoryOp::Add | MemoryOp::Lda | MemoryOp::Isz => {
                self.regs.dr = self.read(ar, accesses);
                (MicroOp::ReadOperand { indirect }, Phase::AluCommit)
            }
        }
    }

    /// T5.
    fn alu_commit(&mut self, accesses: &mut Vec<MemoryAccess>) -> MicroOp {
        let dr = self.regs.dr;
        let alu = match decode::decode(self.regs.ir) {
            Instruction::Memory { op: MemoryOp::And, .. } => {
                self.regs.ac &= dr;
                AluOp::And
            }
            Instruction::Memory { op: MemoryOp::Add, .. } => {
                let (sum, carry) = self.regs.ac.overflowing_add(dr);
                self.regs.ac = sum;
                self.regs.e = carry;
                AluOp::Add
            }
            Instruction::Memory { op: MemoryOp::Lda, .. } => {
                self.regs.ac = dr;
                AluOp::Lda
            }
            Instruction::Memory { op: MemoryOp::Isz, .. } => {
                let value = dr.wrapping_add(1);
                let ar = self.regs.ar;
                self.write(ar, value, accesses);
                let skipped = value == 0;
                if skipped {
                    self.regs.advance_pc();
                }
                AluOp::Isz { skipped }
            }
            _ => AluOp::Discard,
        };
        MicroOp::Commit(alu)
    }

    fn read(&mut self, addr: Address, accesses: &mut Vec<MemoryAccess>) -> Word {
        let value = self.mem.read(addr);
        self.profiler.record_read();
        accesses.push(MemoryAccess { addr, value, kind: AccessKind::Read });
        value
    }

    fn write(&mut self, addr: Address, value: Word, accesses: &mut Vec<MemoryAccess>) {
        self.mem.write(addr, value);
        self.profiler.record_write();
        accesses.push(MemoryAccess { addr, value, kind: AccessKind::Write });
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn profiler(&self) -> Profiler {
        self.profiler
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("phase", &self.phase)
            .field("halted", &self.halted)
            .field("profiler", &self.profiler)
            .field("regs", &self.regs)
            .finish()
    }
}

/// Errors that can occur while stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A step was attempted after the halt flag was set. Nothing changed;
    /// reset or load a new image to continue.
    #[error("machine halted")]
    Halted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn engine_with(image: Image) -> Engine {
        let mut engine = Engine::default();
        engine.load_image(&image);
        engine
    }

    /// Step until the current instruction completes or the machine halts.
    fn step_instruction(engine: &mut Engine) -> Vec<StepReport> {
        let mut reports = Vec::new();
        loop {
            let report = engine.micro_step().unwrap();
            let done = report.instruction_complete || report.halted;
            reports.push(report);
            if done {
                return reports;
            }
        }
    }

    fn run_program(image: Image, instructions: usize) -> Engine {
        let mut engine = engine_with(image);
        for _ in 0..instructions {
            step_instruction(&mut engine);
        }
        engine
    }

    #[test]
    fn test_fetch_cycle() {
        let mut engine = engine_with(Image::from([(0, 0x7800)]));

        let t0 = engine.micro_step().unwrap();
        assert_eq!(t0.phase, Phase::FetchAddr);
        assert_eq!(t0.op, MicroOp::LoadAr);
        assert_eq!(engine.phase(), Phase::FetchInstr);

        let t1 = engine.micro_step().unwrap();
        assert_eq!(t1.op, MicroOp::Fetch { word: 0x7800 });
        assert_eq!(engine.registers().ir, 0x7800);
        assert_eq!(engine.registers().pc, Address::new(1));
        assert_eq!(engine.profiler().reads(), 1);

        let t2 = engine.micro_step().unwrap();
        assert_eq!(t2.op, MicroOp::Decode(Instruction::Register(MicroOps::CLA)));
        assert!(t2.changed.is_empty());
    }

    #[test]
    fn test_register_ref_takes_four_cycles() {
        let mut engine = engine_with(Image::from([(0, 0x7020)]));
        let reports = step_instruction(&mut engine);

        assert_eq!(reports.len(), 4);
        assert_eq!(engine.registers().ac, 1);
        assert_eq!(engine.profiler().cycles(), 4);
        assert_eq!(engine.profiler().instructions(), 1);
        assert_eq!(engine.phase(), Phase::FetchAddr);
    }

    #[test]
    fn test_lda_takes_six_cycles() {
        let mut engine = engine_with(Image::from([(0, 0x2005), (5, 0x1234)]));
        let reports = step_instruction(&mut engine);

        let phases: Vec<_> = reports.iter().map(|r| r.phase.index()).collect();
        assert_eq!(phases, [0, 1, 2, 3, 4, 5]);
        assert_eq!(engine.registers().ac, 0x1234);
        assert_eq!(engine.registers().dr, 0x1234);
        assert_eq!(engine.registers().ar, Address::new(5));
        assert_eq!(engine.profiler().reads(), 2);
        assert_eq!(engine.profiler().writes(), 0);
    }

    #[test]
    fn test_add_overflow() {
        let engine = run_program(
            Image::from([(0, 0x2010), (1, 0x1011), (0x10, 0xFFFF), (0x11, 0x0001)]),
            2,
        );
        assert_eq!(engine.registers().ac, 0x0000);
        assert!(engine.registers().e);
    }

    #[test]
    fn test_and() {
        let engine = run_program(
            Image::from([(0, 0x2010), (1, 0x0011), (0x10, 0xF0F0), (0x11, 0x3C3C)]),
            2,
        );
        assert_eq!(engine.registers().ac, 0x3030);
    }

    #[test]
    fn test_cir() {
        // LDA 10; CIR
        let engine = run_program(Image::from([(0, 0x2010), (1, 0x7080), (0x10, 0x0001)]), 2);
        assert_eq!(engine.registers().ac, 0x0000);
        assert!(engine.registers().e);
    }

    #[test]
    fn test_cil_carries_e_in() {
        // LDA 10; CME; CIL
        let engine = run_program(
            Image::from([(0, 0x2010), (1, 0x7100), (2, 0x7040), (0x10, 0x8001)]),
            3,
        );
        assert_eq!(engine.registers().ac, 0x0003);
        assert!(engine.registers().e);
    }

    #[test]
    fn test_cma_and_inc() {
        // CMA INC on zero: two's complement of 0 is 0
        let engine = run_program(Image::from([(0, 0x7220)]), 1);
        assert_eq!(engine.registers().ac, 0x0000);

        let engine = run_program(Image::from([(0, 0x7200)]), 1);
        assert_eq!(engine.registers().ac, 0xFFFF);
    }

    #[test]
    fn test_combined_bits_apply_in_order() {
        // CMA then SNA in one word: the skip sees the complemented AC.
        let engine = run_program(Image::from([(0, 0x7208)]), 1);
        assert_eq!(engine.registers().ac, 0xFFFF);
        assert_eq!(engine.registers().pc, Address::new(2));

        // CLE then CME then SZE: E ends up set, so no skip.
        let engine = run_program(Image::from([(0, 0x7502)]), 1);
        assert!(engine.registers().e);
        assert_eq!(engine.registers().pc, Address::new(1));
    }

    #[test]
    fn test_skips() {
        // SZA with AC == 0
        let engine = run_program(Image::from([(0, 0x7004)]), 1);
        assert_eq!(engine.registers().pc, Address::new(2));
        // SPA with AC == 0
        let engine = run_program(Image::from([(0, 0x7010)]), 1);
        assert_eq!(engine.registers().pc, Address::new(2));
        // SNA with AC == 0
        let engine = run_program(Image::from([(0, 0x7008)]), 1);
        assert_eq!(engine.registers().pc, Address::new(1));
        // SZE with E == 0
        let engine = run_program(Image::from([(0, 0x7002)]), 1);
        assert_eq!(engine.registers().pc, Address::new(2));
    }

    #[test]
    fn test_hlt_does_not_suppress_siblings() {
        let mut engine = engine_with(Image::from([(0, 0x7021)]));
        let reports = step_instruction(&mut engine);

        assert!(engine.is_halted());
        assert_eq!(engine.registers().ac, 1);
        assert!(reports.last().unwrap().instruction_complete);
        assert_eq!(engine.profiler().instructions(), 1);
    }

    #[test]
    fn test_sta() {
        // LDA 10; STA 11
        let engine = run_program(Image::from([(0, 0x2010), (1, 0x3011), (0x10, 0xABCD)]), 2);
        assert_eq!(engine.memory().read(Address::new(0x11)), 0xABCD);
        assert_eq!(engine.profiler().writes(), 1);
        assert_eq!(engine.profiler().cycles(), 11);
    }

    #[test]
    fn test_bun() {
        let engine = run_program(Image::from([(0, 0x4123)]), 1);
        assert_eq!(engine.registers().pc, Address::new(0x123));
        assert_eq!(engine.profiler().cycles(), 5);
    }

    #[test]
    fn test_bsa_saves_return_address() {
        let engine = run_program(Image::from([(0, 0x4010), (0x10, 0x5020)]), 2);
        // BSA at 0x10 stores PC (0x11) at 0x20 and jumps to 0x21.
        assert_eq!(engine.memory().read(Address::new(0x20)), 0x0011);
        assert_eq!(engine.registers().pc, Address::new(0x21));
        assert_eq!(engine.profiler().writes(), 1);
    }

    #[test]
    fn test_isz_skips_on_zero() {
        let engine = run_program(Image::from([(0, 0x6005), (5, 0xFFFF)]), 1);
        assert_eq!(engine.memory().read(Address::new(5)), 0x0000);
        assert_eq!(engine.registers().pc, Address::new(2));
        assert_eq!(engine.profiler().writes(), 1);

        let engine = run_program(Image::from([(0, 0x6005), (5, 0x0001)]), 1);
        assert_eq!(engine.memory().read(Address::new(5)), 0x0002);
        assert_eq!(engine.registers().pc, Address::new(1));
    }

    #[test]
    fn test_pc_wraps() {
        let mut engine = engine_with(Image::from([(0, 0x4FFF), (0xFFF, 0x7000)]));
        step_instruction(&mut engine);
        step_instruction(&mut engine);
        assert_eq!(engine.registers().pc, Address::zero());
    }

    #[test]
    fn test_halted_step_fails_without_change() {
        let mut engine = engine_with(Image::from([(0, 0x7001)]));
        step_instruction(&mut engine);
        assert!(engine.is_halted());

        let regs = *engine.registers();
        let profiler = engine.profiler();
        let phase = engine.phase();

        assert_eq!(engine.micro_step(), Err(EngineError::Halted));
        assert_eq!(*engine.registers(), regs);
        assert_eq!(engine.profiler(), profiler);
        assert_eq!(engine.phase(), phase);
    }

    #[test]
    fn test_halt_request() {
        let mut engine = engine_with(Image::from([(0, 0x7020)]));
        engine.micro_step().unwrap();
        engine.halt();
        assert!(engine.is_halted());
        assert_eq!(engine.profiler().cycles(), 1);
        assert!(engine.micro_step().is_err());
    }

    #[test]
    fn test_indirect_off_by_default() {
        // ADD I 10 with the extension off behaves as ADD 10.
        let engine = run_program(Image::from([(0, 0x9010), (0x10, 0x0020), (0x20, 0x0005)]), 1);
        assert_eq!(engine.registers().ac, 0x0020);
        assert_eq!(engine.profiler().reads(), 2);
    }

    #[test]
    fn test_indirect_enabled() {
        let mut engine = Engine::new(EngineConfig { indirect_addressing: true });
        engine.load_image(&Image::from([
            (0, 0x9010),
            (1, 0xB011),
            (0x10, 0x0020),
            (0x11, 0x0030),
            (0x20, 0x0005),
        ]));

        let reports = step_instruction(&mut engine);
        assert_eq!(engine.registers().ac, 0x0005);
        assert_eq!(engine.registers().ar, Address::new(0x20));
        assert_eq!(engine.profiler().reads(), 3);
        assert_eq!(reports[4].accesses.len(), 2);
        assert_eq!(reports[4].op, MicroOp::ReadOperand { indirect: true });

        // STA I 11 stores through the pointer at 0x11.
        step_instruction(&mut engine);
        assert_eq!(engine.memory().read(Address::new(0x30)), 0x0005);
        assert_eq!(engine.memory().read(Address::new(0x11)), 0x0030);
    }

    #[test]
    fn test_unassigned_opcode_reads_and_discards() {
        let mut engine = engine_with(Image::from([(0, 0x2010), (1, 0xF011), (0x10, 7), (0x11, 9)]));
        step_instruction(&mut engine);
        let reports = step_instruction(&mut engine);

        assert_eq!(reports.len(), 6);
        assert_eq!(reports[5].op, MicroOp::Commit(AluOp::Discard));
        assert_eq!(engine.registers().ac, 7);
        assert_eq!(engine.registers().dr, 9);
        assert_eq!(engine.profiler().instructions(), 2);
    }

    #[test]
    fn test_changed_registers_reported() {
        let mut engine = engine_with(Image::from([(0, 0x7080)]));
        let reports = step_instruction(&mut engine);

        assert!(reports[0].changed.is_empty()); // AR <- PC with both zero
        assert!(reports[1].changed.contains(crate::cpu::Register::Ir));
        assert!(reports[1].changed.contains(crate::cpu::Register::Pc));
        // CIR on AC=0, E=0 changes nothing.
        assert!(reports[3].changed.is_empty());
    }

    #[test]
    fn test_load_image_resets_state() {
        let mut engine = run_program(Image::from([(0, 0x7021)]), 1);
        assert!(engine.is_halted());

        engine.load_image(&Image::from([(3, 0x1234)]));
        assert!(!engine.is_halted());
        assert_eq!(*engine.registers(), Registers::new());
        assert_eq!(engine.profiler(), Profiler::new());
        assert_eq!(engine.memory().read(Address::new(0)), 0);
        assert_eq!(engine.memory().read(Address::new(3)), 0x1234);
    }

    #[test]
    fn test_micro_op_display() {
        assert_eq!(MicroOp::LoadAr.to_string(), "AR <- PC");
        assert_eq!(MicroOp::Store { indirect: true }.to_string(), "AR <- M[AR]; M[AR] <- AC");
        assert_eq!(Phase::AluCommit.to_string(), "T5");
        assert_eq!(
            MicroOp::Decode(decode::decode(0x2005)).to_string(),
            "decode LDA 005 (memory-reference)"
        );
        assert_eq!(
            MicroOp::Decode(decode::decode(0x7001)).to_string(),
            "decode HLT (register-reference)"
        );
    }

    #[test]
    fn test_snapshot_round_trip() {
        let engine = run_program(Image::from([(0, 0x2005), (1, 0x7001), (5, 0x1234)]), 1);
        let json = serde_json::to_string(&engine).unwrap();
        let restored: Engine = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.registers(), engine.registers());
        assert_eq!(restored.memory(), engine.memory());
        assert_eq!(restored.profiler(), engine.profiler());
    }

    #[test]
    fn test_snapshot_with_wide_pc_is_rejected() {
        let mut json = serde_json::to_value(Engine::default()).unwrap();
        json["regs"]["pc"] = serde_json::json!(65535);
        assert!(serde_json::from_value::<Engine>(json).is_err());

        let mut json = serde_json::to_value(Engine::default()).unwrap();
        json["mem"] = serde_json::json!([0, 0, 0]);
        assert!(serde_json::from_value::<Engine>(json).is_err());
    }

    proptest! {
        #[test]
        fn add_overflow_law(a: u16, b: u16) {
            let engine = run_program(
                Image::from([(0, 0x2010), (1, 0x1011), (0x10, a), (0x11, b)]),
                2,
            );
            let sum = u32::from(a) + u32::from(b);
            prop_assert_eq!(engine.registers().ac, (sum % 65536) as u16);
            prop_assert_eq!(engine.registers().e, sum > 0xFFFF);
        }

        #[test]
        fn cir_then_cil_restores(value in any::<u16>(), e in any::<bool>()) {
            // LDA 10; optionally CME; CIR; CIL
            let cme = if e { 0x7100 } else { 0x7000 };
            let program = [(0, 0x2010), (1, cme), (2, 0x7080), (3, 0x7040), (0x10, value)];
            let engine = run_program(Image::from(program), 4);
            prop_assert_eq!(engine.registers().ac, value);
            prop_assert_eq!(engine.registers().e, e);
        }

        #[test]
        fn halted_engine_is_frozen(extra in 1usize..20) {
            let mut engine = run_program(Image::from([(0, 0x7021), (1, 0x7020)]), 1);
            let regs = *engine.registers();
            let profiler = engine.profiler();
            let memory = engine.memory().clone();
            for _ in 0..extra {
                prop_assert_eq!(engine.micro_step(), Err(EngineError::Halted));
            }
            prop_assert_eq!(*engine.registers(), regs);
            prop_assert_eq!(engine.profiler(), profiler);
            prop_assert!(engine.memory() == &memory);
        }
    }
}
