//! CPU emulation for the Mano basic computer.
//!
//! This module implements the complete machine:
//! - 4096 sixteen-bit memory words
//! - 6 registers: PC, AR, IR, AC, DR and the E flag
//! - 7 memory-reference and 12 register-reference operations
//! - A T0-T5 microcycle engine with execution counters

pub mod memory;
pub mod registers;
pub mod decode;
pub mod profiler;
pub mod execute;

pub use memory::{Memory, WrongMemorySize, MEMORY_SIZE};
pub use registers::{Address, AddressOutOfRange, ChangedRegisters, Register, Registers, Word};
pub use decode::{decode, encode, Category, Instruction, MemoryOp, MicroOps};
pub use profiler::Profiler;
pub use execute::{
    AccessKind, AluOp, Engine, EngineConfig, EngineError, MemoryAccess, MicroOp, Phase, StepReport,
};
