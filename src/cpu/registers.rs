//! The register file.
//!
//! Every register is a fixed-width unsigned value. Writes go through
//! [`Registers::mask`] so no register ever holds more bits than the bus.

use serde::{Deserialize, Serialize};

/// The latched carry/zero flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flags {
    pub carry: bool,
    pub zero: bool,
}

/// The register file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registers {
    /// Program counter.
    pub pc: u64,
    /// Memory address register.
    pub mar: u64,
    /// Instruction register A (opcode).
    pub ir_a: u64,
    /// Instruction register B (operand scratch).
    pub ir_b: u64,
    /// General register A.
    pub a: u64,
    /// General register B.
    pub b: u64,
    /// Output register.
    pub out: u64,
    /// Stack pointer, an index into the stack window.
    pub sp: u64,
    pub flags: Flags,
    /// Display data register.
    pub display_data: u64,
    /// Display control register (3 bits).
    pub display_control: u64,
    #[serde(skip)]
    mask: u64,
}

impl Registers {
    /// Create a zeroed register file for words masked by `mask`.
    pub fn new(mask: u64) -> Self {
        Self {
            pc: 0,
            mar: 0,
            ir_a: 0,
            ir_b: 0,
            a: 0,
            b: 0,
            out: 0,
            sp: 0,
            flags: Flags::default(),
            display_data: 0,
            display_control: 0,
            mask,
        }
    }

    /// Zero every register, keeping the word width.
    pub fn reset(&mut self) {
        *self = Self::new(self.mask);
    }

    /// Mask a value to the word width.
    #[inline]
    pub fn mask(&self, value: u64) -> u64 {
        value & self.mask
    }

    /// The word mask (`2^word_bits - 1`).
    pub fn word_mask(&self) -> u64 {
        self.mask
    }

    /// Advance the program counter by one, wrapping at `memory_size`.
    pub fn increment_pc(&mut self, memory_size: usize) {
        self.pc = (self.pc + 1) % memory_size as u64;
    }

    /// Push side of the stack counter.
    pub fn increment_sp(&mut self, capacity: usize) {
        self.sp = (self.sp + 1) % capacity as u64;
    }

    /// Pop side of the stack counter.
    pub fn decrement_sp(&mut self, capacity: usize) {
        let capacity = capacity as u64;
        self.sp = (self.sp + capacity - 1) % capacity;
    }

    /// Reposition the stack pointer. The value is reduced modulo the stack
    /// capacity, so it can never point outside the window.
    pub fn load_sp(&mut self, value: u64, capacity: usize) {
        self.sp = value % capacity as u64;
    }
}
