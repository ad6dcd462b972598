//! # Mano Emulator
//!
//! A microcycle-accurate emulator of the Mano basic computer.
//!
//! The machine has 4096 words of 16-bit memory, a 16-bit accumulator,
//! and a one-bit carry E. Every instruction is executed as a sequence of
//! timing states T0..T5, and each state can be stepped and inspected on
//! its own, which makes the emulator suited to teaching how a simple
//! control unit works.

pub mod cpu;
pub mod image;
pub mod machine;
pub mod console;
pub mod config;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use cpu::{Address, Engine, EngineConfig, EngineError, Phase, Profiler, Register, Registers, StepReport, Word};
pub use image::{disassemble, load_image_file, parse_image, save_image, Image, ImageError, LoadedImage};
pub use machine::{InstructionReport, Machine, RunSummary, StopReason};
pub use console::{Command, Console, ConsoleError};
pub use config::{Config, ConfigError};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
