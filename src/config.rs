//! Machine configuration.
//!
//! A [`CpuConfig`] fixes everything about the simulated machine that cannot
//! change while it runs: the instruction set variant, word width, memory
//! size, the stack window and what happens on an undefined opcode.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Instruction set variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// The 8-bit base instruction set.
    Base,
    /// The wider-word instruction set with the extra register moves,
    /// pointer loads and stack-pointer opcodes.
    Extended,
}

/// What the engine does when the instruction register holds an opcode
/// with no control table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidOpcodePolicy {
    /// Halt with [`Fault::InvalidOpcode`](crate::cpu::Fault::InvalidOpcode).
    Fault,
    /// Execute the NOP sequence (three pulses) and carry on.
    NoOp,
}

/// Static machine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuConfig {
    pub variant: Variant,
    /// Width of registers, bus and memory words in bits.
    pub word_bits: u32,
    /// Number of addressable memory words.
    pub memory_size: usize,
    /// First address of the stack window.
    pub stack_base: usize,
    /// The stack holds `2^stack_bits` words.
    pub stack_bits: u32,
    #[serde(default = "default_policy")]
    pub invalid_opcode: InvalidOpcodePolicy,
}

fn default_policy() -> InvalidOpcodePolicy {
    InvalidOpcodePolicy::Fault
}

impl CpuConfig {
    /// The 8-bit machine: 256 words, stack at 0xE0..0xEF.
    pub fn base() -> Self {
        Self {
            variant: Variant::Base,
            word_bits: 8,
            memory_size: 256,
            stack_base: 224,
            stack_bits: 4,
            invalid_opcode: InvalidOpcodePolicy::Fault,
        }
    }

    /// The extended machine: 16-bit words, full 64K address space and a
    /// 256-word stack just below the top of memory.
    pub fn extended() -> Self {
        let word_bits = 16;
        let stack_bits = 8;
        let memory_size = 1usize << word_bits;
        Self {
            variant: Variant::Extended,
            word_bits,
            memory_size,
            stack_base: memory_size - (1 << stack_bits) - 1,
            stack_bits,
            invalid_opcode: InvalidOpcodePolicy::Fault,
        }
    }

    /// Preset for a variant.
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Base => Self::base(),
            Variant::Extended => Self::extended(),
        }
    }

    /// Load a configuration from a JSON file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&text)
    }

    /// Parse a configuration from JSON text and validate it.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: CpuConfig =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Largest value a word can hold.
    pub fn word_mask(&self) -> u64 {
        if self.word_bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.word_bits) - 1
        }
    }

    /// Number of words in the stack window.
    pub fn stack_capacity(&self) -> usize {
        1usize << self.stack_bits
    }

    /// Check the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(4..=32).contains(&self.word_bits) {
            return Err(ConfigError::WordBits(self.word_bits));
        }
        if self.memory_size == 0 || self.memory_size as u64 > self.word_mask() + 1 {
            return Err(ConfigError::MemorySize {
                size: self.memory_size,
                word_bits: self.word_bits,
            });
        }
        if self.stack_bits >= usize::BITS
            || self.stack_base + self.stack_capacity() > self.memory_size
        {
            return Err(ConfigError::StackWindow {
                base: self.stack_base,
                bits: self.stack_bits,
                memory_size: self.memory_size,
            });
        }
        Ok(())
    }
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self::base()
    }
}

/// Errors raised while building a machine configuration or its control table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("word width of {0} bits is not supported (4..=32)")]
    WordBits(u32),

    #[error("memory size {size} does not fit a {word_bits}-bit address")]
    MemorySize { size: usize, word_bits: u32 },

    #[error("stack window {base}+2^{bits} exceeds memory size {memory_size}")]
    StackWindow { base: usize, bits: u32, memory_size: usize },

    #[error("opcode {code} ({mnemonic}) is defined twice")]
    DuplicateOpcode { code: u64, mnemonic: &'static str },

    #[error("opcode {mnemonic} has {steps} execute steps (at most {max})")]
    TooManySteps { mnemonic: &'static str, steps: usize, max: usize },

    #[error("opcode {mnemonic} step {step}: conflicting signals {signals}")]
    ConflictingSignals { mnemonic: &'static str, step: usize, signals: String },

    #[error("config I/O error: {0}")]
    Io(String),

    #[error("config parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert_eq!(CpuConfig::base().validate(), Ok(()));
        assert_eq!(CpuConfig::extended().validate(), Ok(()));
    }

    #[test]
    fn test_base_stack_window() {
        let config = CpuConfig::base();
        assert_eq!(config.stack_capacity(), 16);
        assert_eq!(config.word_mask(), 0xFF);
        assert_eq!(config.stack_base, 0xE0);
    }

    #[test]
    fn test_extended_stack_sits_below_top() {
        let config = CpuConfig::extended();
        assert_eq!(config.stack_base + config.stack_capacity(), config.memory_size - 1);
    }

    #[test]
    fn test_rejects_stack_outside_memory() {
        let mut config = CpuConfig::base();
        config.stack_base = 250;
        assert!(matches!(config.validate(), Err(ConfigError::StackWindow { .. })));
    }

    #[test]
    fn test_rejects_memory_larger_than_address_space() {
        let mut config = CpuConfig::base();
        config.memory_size = 512;
        assert!(matches!(config.validate(), Err(ConfigError::MemorySize { .. })));
    }

    #[test]
    fn test_from_json() {
        let config = CpuConfig::from_json(
            r#"{"variant":"base","word_bits":8,"memory_size":256,
                "stack_base":224,"stack_bits":4,"invalid_opcode":"noop"}"#,
        )
        .unwrap();
        assert_eq!(config.invalid_opcode, InvalidOpcodePolicy::NoOp);
        assert_eq!(config.variant, Variant::Base);
    }

    #[test]
    fn test_policy_defaults_to_fault() {
        let config = CpuConfig::from_json(
            r#"{"variant":"extended","word_bits":12,"memory_size":4096,
                "stack_base":3000,"stack_bits":6}"#,
        )
        .unwrap();
        assert_eq!(config.invalid_opcode, InvalidOpcodePolicy::Fault);
    }
}
