//! CPU emulation for the discrete-logic machine.
//!
//! The machine is modelled pulse by pulse:
//! - a named control-signal set per pulse, looked up from a data table
//! - register file, flat memory with a fixed stack window
//! - combinational adder/subtractor with latched carry/zero flags
//! - a micro-step sequencer reset by the control table itself
//! - a clock driver that maps wall time onto pulses

pub mod alu;
pub mod clock;
pub mod decode;
pub mod execute;
pub mod memory;
pub mod registers;
pub mod signals;

pub use alu::AluOutput;
pub use clock::ClockDriver;
pub use decode::{op, ControlTable, DecodeError, OpcodeDescriptor, OperandKind};
pub use execute::{Cpu, CpuError, Fault, HaltReason, Pulse, Snapshot};
pub use memory::{Memory, MemoryError};
pub use registers::{Flags, Registers};
pub use signals::Signals;
