//! WebAssembly bindings for the simulator.
//!
//! This module provides JavaScript-friendly wrappers around the core engine.
//! State crosses the boundary as JSON strings.

use crate::config::CpuConfig;
use crate::cpu::{ClockDriver, Cpu};
use crate::image::{disassemble, MemoryImage};
use crate::keypad::Key;
use wasm_bindgen::prelude::*;

/// Initialize panic hook for better error messages in console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn js_err<E: std::fmt::Display>(e: E) -> JsError {
    JsError::new(&e.to_string())
}

/// WebAssembly-friendly CPU wrapper with its own clock.
#[wasm_bindgen]
pub struct WasmCpu {
    cpu: Cpu,
    clock: ClockDriver,
}

impl WasmCpu {
    fn with_config(config: CpuConfig) -> Result<WasmCpu, JsError> {
        Ok(Self {
            cpu: Cpu::new(config).map_err(js_err)?,
            clock: ClockDriver::default(),
        })
    }
}

#[wasm_bindgen]
impl WasmCpu {
    /// Create a machine with the base or extended preset.
    #[wasm_bindgen(constructor)]
    pub fn new(extended: bool) -> Result<WasmCpu, JsError> {
        let config = if extended { CpuConfig::extended() } else { CpuConfig::base() };
        Self::with_config(config)
    }

    /// Create a machine from a JSON configuration.
    pub fn from_config_json(text: &str) -> Result<WasmCpu, JsError> {
        Self::with_config(CpuConfig::from_json(text).map_err(js_err)?)
    }

    /// Load a JSON memory image. Returns the number of words written.
    pub fn load_json(&mut self, text: &str) -> Result<usize, JsError> {
        let image = MemoryImage::from_json(text).map_err(js_err)?;
        self.cpu.load_image(&image).map_err(js_err)?;
        Ok(image.len())
    }

    /// Execute one pulse. Returns the pulse report as JSON.
    pub fn pulse(&mut self) -> Result<String, JsError> {
        let pulse = self.cpu.pulse();
        serde_json::to_string(&pulse).map_err(js_err)
    }

    /// Execute one instruction. Returns the number of pulses.
    pub fn step(&mut self) -> u64 {
        self.cpu.step_instruction()
    }

    /// Run the pulses owed for `elapsed` seconds at the clock target.
    pub fn advance(&mut self, elapsed: f64) -> u64 {
        self.clock.advance(&mut self.cpu, elapsed)
    }

    pub fn set_hz(&mut self, hz: f64) {
        self.clock.configure(hz);
    }

    pub fn hz(&self) -> f64 {
        self.clock.hz()
    }

    /// Hold a keypad key given as a one-character string, or release with
    /// an empty string.
    pub fn set_key(&mut self, key: &str) {
        self.cpu.set_key(key.chars().next().and_then(Key::from_char));
    }

    /// Reset registers. Memory is kept.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.clock.reset();
    }

    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    pub fn cycles(&self) -> u64 {
        self.cpu.cycles()
    }

    pub fn output(&self) -> u64 {
        self.cpu.output()
    }

    /// Full machine snapshot as JSON.
    pub fn snapshot_json(&self) -> Result<String, JsError> {
        serde_json::to_string(&self.cpu.snapshot()).map_err(js_err)
    }

    /// All of memory.
    pub fn memory_all(&self) -> Vec<u32> {
        self.cpu.memory().iter().map(|&w| w as u32).collect()
    }

    /// Disassembly listing of `count` instructions from `start`.
    pub fn disassemble(&self, start: usize, count: usize) -> String {
        disassemble(self.cpu.table(), self.cpu.memory(), start, count)
            .iter()
            .map(|line| line.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
