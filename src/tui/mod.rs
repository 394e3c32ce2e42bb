//! TUI debugger.
//!
//! Provides an interactive terminal-based debugger with:
//! - Register, flag and ALU panel
//! - Live control-signal lights for the next pulse
//! - Hex memory view and disassembly around the PC
//! - Pulse, instruction and clocked run controls, plus the keypad

mod app;
mod ui;

pub use app::{run_debugger, DebuggerApp};
