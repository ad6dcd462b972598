//! WebAssembly bindings for the Mano emulator.
//!
//! This module provides JavaScript-friendly wrappers around [`Machine`].
//! Snapshots cross the boundary as JSON strings.

use wasm_bindgen::prelude::*;
use crate::config::Config;
use crate::console::{format_step, Console};
use crate::cpu::{Address, EngineConfig};
use crate::image::{disassemble_word, parse_image, Image};
use crate::machine::Machine;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn js_error(e: impl std::fmt::Display) -> JsError {
    JsError::new(&e.to_string())
}

/// WebAssembly-friendly machine wrapper.
#[wasm_bindgen]
pub struct WasmMachine {
    machine: Machine,
    image: Image,
    console: Console,
}

#[wasm_bindgen]
impl WasmMachine {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        let config = Config::default();
        Self {
            machine: Machine::new(config.engine()),
            image: Image::new(),
            console: Console::new(config.max_cycles),
        }
    }

    /// Enable or disable indirect addressing. Reloads the current image.
    #[wasm_bindgen]
    pub fn set_indirect(&mut self, enabled: bool) {
        self.machine = Machine::with_image(EngineConfig { indirect_addressing: enabled }, &self.image);
    }

    /// Load image text. Returns the diagnostics for skipped lines.
    #[wasm_bindgen]
    pub fn load_image(&mut self, text: &str) -> js_sys::Array {
        let loaded = parse_image(text);
        self.image = loaded.image;
        self.machine.load_image(&self.image);

        loaded
            .diagnostics
            .iter()
            .map(|d| JsValue::from_str(&d.to_string()))
            .collect()
    }

    /// Execute one microcycle. Returns its trace line.
    #[wasm_bindgen]
    pub fn step_micro(&mut self) -> Result<String, JsError> {
        let report = self.machine.step_micro().map_err(js_error)?;
        Ok(format_step(&report))
    }

    /// Finish the current instruction. Returns the step reports as JSON.
    #[wasm_bindgen]
    pub fn next_instruction(&mut self) -> Result<String, JsError> {
        let report = self.machine.step_instruction().map_err(js_error)?;
        serde_json::to_string(&report).map_err(js_error)
    }

    /// Run for at most `max_cycles` microcycles. Returns cycles executed.
    #[wasm_bindgen]
    pub fn run(&mut self, max_cycles: u32) -> Result<u32, JsError> {
        let summary = self.machine.run_limited(u64::from(max_cycles)).map_err(js_error)?;
        Ok(summary.cycles as u32)
    }

    /// Reload the last image.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.machine.load_image(&self.image);
    }

    #[wasm_bindgen]
    pub fn halt(&mut self) {
        self.machine.halt();
    }

    /// Whether indirect addressing is enabled.
    #[wasm_bindgen]
    pub fn indirect(&self) -> bool {
        self.machine.config().indirect_addressing
    }

    #[wasm_bindgen]
    pub fn is_halted(&self) -> bool {
        self.machine.is_halted()
    }

    /// Current timing state, `T0`..`T5`.
    #[wasm_bindgen]
    pub fn phase(&self) -> String {
        self.machine.phase().to_string()
    }

    /// Run a console command.
    #[wasm_bindgen]
    pub fn console(&mut self, line: &str) -> Result<String, JsError> {
        self.console.execute(&mut self.machine, line).map_err(js_error)
    }

    /// Get memory cell value at an address (0-FFF).
    #[wasm_bindgen]
    pub fn memory_at(&self, addr: u16) -> u16 {
        Address::checked(u32::from(addr))
            .map(|a| self.machine.read(a))
            .unwrap_or(0)
    }

    /// `count` memory cells from `start`, clamped at the top of memory.
    #[wasm_bindgen]
    pub fn memory_range(&self, start: u16, count: usize) -> Vec<u16> {
        self.machine
            .memory_range(Address::new(start), count)
            .into_iter()
            .map(|(_, word)| word)
            .collect()
    }

    /// Get registers as JSON string.
    #[wasm_bindgen]
    pub fn registers_json(&self) -> Result<String, JsError> {
        serde_json::to_string(self.machine.registers()).map_err(js_error)
    }

    /// Get profiler counters as JSON string, CPI included.
    #[wasm_bindgen]
    pub fn profiler_json(&self) -> Result<String, JsError> {
        let p = self.machine.profiler();
        let value = serde_json::json!({
            "cycles": p.cycles(),
            "instructions": p.instructions(),
            "reads": p.reads(),
            "writes": p.writes(),
            "cpi": p.cpi(),
        });
        Ok(value.to_string())
    }
}

impl Default for WasmMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Disassemble a single word.
#[wasm_bindgen]
pub fn wasm_disassemble(word: u16) -> String {
    disassemble_word(word)
}
