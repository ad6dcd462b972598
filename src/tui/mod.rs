//! TUI debugger for the Mano emulator.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register view highlighting what the last step changed
//! - Profiler counters and a microcycle trace
//! - Memory and disassembly views
//! - Step/next/run/breakpoint controls and a `:` command line

mod app;
mod ui;

pub use app::{DebuggerApp, run_debugger};
