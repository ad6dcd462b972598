//! Execution counters.

use serde::{Serialize, Deserialize};
use std::fmt;

/// Cycle, instruction, and memory-traffic counters.
///
/// Only the execution engine advances these; everyone else sees copies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profiler {
    cycles: u64,
    instructions: u64,
    reads: u64,
    writes: u64,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Microcycles executed.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Instructions completed.
    pub fn instructions(&self) -> u64 {
        self.instructions
    }

    /// Memory reads, including instruction fetches.
    pub fn reads(&self) -> u64 {
        self.reads
    }

    /// Memory writes.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Cycles per instruction; 0.0 before the first instruction completes.
    pub fn cpi(&self) -> f64 {
        if self.instructions == 0 {
            0.0
        } else {
            self.cycles as f64 / self.instructions as f64
        }
    }

    pub(crate) fn record_cycle(&mut self) {
        self.cycles += 1;
    }

    pub(crate) fn record_instruction(&mut self) {
        self.instructions += 1;
    }

    pub(crate) fn record_read(&mut self) {
        self.reads += 1;
    }

    pub(crate) fn record_write(&mut self) {
        self.writes += 1;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cycles = {}", self.cycles)?;
        writeln!(f, "Instructions = {}", self.instructions)?;
        writeln!(f, "Reads = {}", self.reads)?;
        writeln!(f, "Writes = {}", self.writes)?;
        write!(f, "CPI = {:.2}", self.cpi())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpi() {
        let mut p = Profiler::new();
        assert_eq!(p.cpi(), 0.0);

        for _ in 0..6 {
            p.record_cycle();
        }
        p.record_instruction();
        p.record_instruction();
        assert!((p.cpi() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_display() {
        let mut p = Profiler::new();
        p.record_cycle();
        p.record_read();
        let text = p.to_string();
        assert!(text.contains("Cycles = 1"));
        assert!(text.contains("Reads = 1"));
        assert!(text.ends_with("CPI = 0.00"));
    }
}
