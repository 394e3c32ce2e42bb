//! # logicpu
//!
//! A cycle-accurate simulator of a homebrew discrete-logic CPU.
//!
//! Each instruction is a short sequence of clock pulses, and each pulse
//! asserts a set of control signals looked up from a microcode table.
//! Two instruction sets are provided: the 8-bit base machine and an
//! extended machine with wider words and a few more register moves.

pub mod config;
pub mod cpu;
pub mod image;
pub mod keypad;
pub mod programs;

#[cfg(feature = "tui")]
pub mod tui;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-export commonly used types
pub use config::{ConfigError, CpuConfig, InvalidOpcodePolicy, Variant};
pub use cpu::{ClockDriver, Cpu, CpuError, Fault, HaltReason, Pulse, Signals, Snapshot};
pub use image::{load_image_file, save_image, ImageError, MemoryImage};
pub use keypad::Key;

#[cfg(feature = "tui")]
pub use tui::run_debugger;
