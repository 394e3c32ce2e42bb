//! Control word decoder.
//!
//! The decoder is a lookup table from `(opcode, microstep)` to the set of
//! control signals asserted during that pulse. The instruction sets are
//! plain data: each opcode lists only its execute steps, and the table
//! compiler prepends the shared fetch steps and appends the operation reset
//! to the final step. Adding an opcode never touches the sequencer.

use crate::config::{ConfigError, InvalidOpcodePolicy, Variant};
use crate::cpu::signals::Signals;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Number of fetch microsteps shared by every opcode.
pub const FETCH_STEPS: usize = 3;

/// Most execute microsteps any opcode may use.
pub const MAX_EXECUTE_STEPS: usize = 4;

/// Longest instruction, in pulses.
pub const MAX_CYCLES: usize = FETCH_STEPS + MAX_EXECUTE_STEPS;

/// The fetch phase: PC into MAR, memory into instruction register A while
/// the PC counts past the opcode, then PC into MAR again so the operand
/// word is addressed for the execute phase.
///
/// The third step runs for every opcode, including those with no operand,
/// so each instruction costs one pulse more than a two-step fetch would:
/// KEI, OUT and HLT take 4 pulses, PHA takes 5.
pub fn fetch_steps() -> [Signals; FETCH_STEPS] {
    [
        Signals::CO | Signals::MI,
        Signals::RO | Signals::IAI | Signals::CE,
        Signals::CO | Signals::MI,
    ]
}

/// What the word following an opcode means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperandKind {
    /// Single-word instruction.
    None,
    /// The operand is the address of the data.
    Address,
    /// The operand is the data itself.
    Immediate,
    /// The operand is a jump or call target.
    Label,
}

impl OperandKind {
    /// Words occupied by the instruction including its operand.
    pub fn size(self) -> usize {
        match self {
            OperandKind::None => 1,
            _ => 2,
        }
    }
}

/// Opcode numbers, for building memory images by hand.
pub mod op {
    pub const NOP: u64 = 0;
    pub const LDA: u64 = 1;
    pub const ADD: u64 = 2;
    pub const SUB: u64 = 3;
    pub const STA: u64 = 4;
    pub const LDI: u64 = 5;
    pub const JMP: u64 = 6;
    pub const JPC: u64 = 7;
    pub const JPZ: u64 = 8;
    pub const KEI: u64 = 9;
    pub const ADI: u64 = 10;
    pub const SUI: u64 = 11;
    pub const CMP: u64 = 12;
    pub const PHA: u64 = 13;
    pub const PLA: u64 = 14;
    pub const LDS: u64 = 15;
    pub const JSR: u64 = 16;
    pub const RET: u64 = 17;
    pub const SAS: u64 = 18;
    pub const LAS: u64 = 19;
    pub const LDB: u64 = 20;
    pub const CPI: u64 = 21;
    pub const RSA: u64 = 22;
    pub const LSA: u64 = 23;
    pub const DIS: u64 = 24;
    pub const DIC: u64 = 25;
    pub const LDD: u64 = 26;
    // Extended variant only.
    pub const JNZ: u64 = 27;
    pub const STB: u64 = 28;
    pub const MOVBA: u64 = 29;
    pub const MOVAB: u64 = 30;
    pub const LSP: u64 = 31;
    pub const MVASP: u64 = 32;
    pub const MVBSP: u64 = 33;
    pub const SUM: u64 = 34;
    pub const LAP: u64 = 35;
    pub const LPA: u64 = 36;
    pub const DIA: u64 = 37;

    pub const OUT: u64 = 254;
    pub const HLT: u64 = 255;
}

/// Source definition of one opcode: only its execute steps.
struct OpcodeDef {
    code: u64,
    mnemonic: &'static str,
    operand: OperandKind,
    execute: Vec<Signals>,
}

fn def(code: u64, mnemonic: &'static str, operand: OperandKind, execute: Vec<Signals>) -> OpcodeDef {
    OpcodeDef { code, mnemonic, operand, execute }
}

fn base_set() -> Vec<OpcodeDef> {
    use OperandKind::*;
    use crate::cpu::signals::Signals as S;

    vec![
        def(op::NOP, "NOP", None, vec![]),
        def(op::LDA, "LDA", Address, vec![S::RO | S::MI | S::CE, S::RO | S::AI]),
        def(op::ADD, "ADD", Address, vec![S::RO | S::MI | S::CE, S::RO | S::BI, S::EO | S::AI | S::FI]),
        def(op::SUB, "SUB", Address, vec![S::RO | S::MI | S::CE, S::RO | S::BI, S::EO | S::AI | S::FI | S::SU]),
        def(op::STA, "STA", Address, vec![S::RO | S::MI | S::CE, S::AO | S::RI]),
        def(op::LDI, "LDI", Immediate, vec![S::RO | S::AI | S::CE]),
        def(op::JMP, "JMP", Label, vec![S::RO | S::JMP | S::CE]),
        def(op::JPC, "JPC", Label, vec![S::RO | S::JC | S::CE]),
        def(op::JPZ, "JPZ", Label, vec![S::RO | S::JZ | S::CE]),
        def(op::KEI, "KEI", None, vec![S::KEO | S::AI]),
        def(op::ADI, "ADI", Immediate, vec![S::RO | S::BI | S::CE, S::EO | S::AI | S::FI]),
        def(op::SUI, "SUI", Immediate, vec![S::RO | S::BI | S::CE, S::EO | S::AI | S::FI | S::SU]),
        def(op::CMP, "CMP", Address, vec![S::RO | S::MI | S::CE, S::RO | S::BI, S::FI | S::SU]),
        def(op::PHA, "PHA", None, vec![S::STO | S::MI, S::AO | S::RI | S::INS]),
        def(op::PLA, "PLA", None, vec![S::DES, S::STO | S::MI, S::RO | S::AI]),
        def(op::LDS, "LDS", None, vec![S::STO | S::AI]),
        def(op::JSR, "JSR", Label, vec![
            S::RO | S::IBI | S::CE,
            S::STO | S::MI,
            S::CO | S::RI | S::INS,
            S::IBO | S::JMP,
        ]),
        def(op::RET, "RET", None, vec![S::DES, S::STO | S::MI, S::RO | S::JMP]),
        def(op::SAS, "SAS", None, vec![S::DES, S::STO | S::MI, S::RO | S::MI, S::AO | S::RI]),
        def(op::LAS, "LAS", None, vec![S::DES, S::STO | S::MI, S::RO | S::MI, S::RO | S::AI]),
        def(op::LDB, "LDB", Address, vec![S::RO | S::MI | S::CE, S::RO | S::BI]),
        def(op::CPI, "CPI", Immediate, vec![S::RO | S::BI | S::CE, S::FI | S::SU]),
        def(op::RSA, "RSA", None, vec![S::RSA]),
        def(op::LSA, "LSA", None, vec![S::LSA]),
        def(op::DIS, "DIS", Immediate, vec![S::RO | S::IBI | S::CE, S::IBO | S::DDI]),
        def(op::DIC, "DIC", Immediate, vec![S::RO | S::IBI | S::CE, S::IBO | S::DCI]),
        def(op::LDD, "LDD", Address, vec![S::RO | S::IBI | S::CE, S::IBO | S::MI, S::RO | S::DDI]),
        def(op::OUT, "OUT", None, vec![S::AO | S::OI]),
        def(op::HLT, "HLT", None, vec![S::HLT]),
    ]
}

fn extended_set() -> Vec<OpcodeDef> {
    use OperandKind::*;
    use crate::cpu::signals::Signals as S;

    let mut set = base_set();
    set.extend(vec![
        def(op::JNZ, "JNZ", Label, vec![S::RO | S::JNZ | S::CE]),
        def(op::STB, "STB", Address, vec![S::RO | S::MI | S::CE, S::BO | S::RI]),
        def(op::MOVBA, "MOVBA", None, vec![S::BO | S::AI]),
        def(op::MOVAB, "MOVAB", None, vec![S::AO | S::BI]),
        def(op::LSP, "LSP", Immediate, vec![S::RO | S::SPI | S::CE]),
        def(op::MVASP, "MVASP", None, vec![S::AO | S::SPI]),
        def(op::MVBSP, "MVBSP", None, vec![S::BO | S::SPI]),
        def(op::SUM, "SUM", None, vec![S::EO | S::AI | S::FI]),
        def(op::LAP, "LAP", None, vec![S::AO | S::MI, S::RO | S::AI]),
        def(op::LPA, "LPA", Address, vec![S::RO | S::MI | S::CE, S::RO | S::MI, S::RO | S::AI]),
        def(op::DIA, "DIA", None, vec![S::AO | S::DDI]),
    ]);
    set
}

/// Compiled description of one opcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpcodeDescriptor {
    pub mnemonic: &'static str,
    pub code: u64,
    pub operand: OperandKind,
    /// Total pulses from fetch step 1 to the next fetch step 1.
    pub cycles: usize,
    /// Active signals for microsteps `1..=cycles`.
    pub steps: Vec<Signals>,
    /// Whether the opcode can change the flags register.
    pub affects_flags: bool,
}

impl OpcodeDescriptor {
    fn compile(def: OpcodeDef) -> Result<Self, ConfigError> {
        if def.execute.len() > MAX_EXECUTE_STEPS {
            return Err(ConfigError::TooManySteps {
                mnemonic: def.mnemonic,
                steps: def.execute.len(),
                max: MAX_EXECUTE_STEPS,
            });
        }

        let mut steps: Vec<Signals> = fetch_steps().to_vec();
        steps.extend(def.execute.iter().copied());
        if let Some(last) = steps.last_mut() {
            *last |= Signals::ORE;
        }

        for (i, signals) in steps.iter().enumerate() {
            if let Some(conflict) = conflict_in(*signals) {
                return Err(ConfigError::ConflictingSignals {
                    mnemonic: def.mnemonic,
                    step: i + 1,
                    signals: conflict.to_string(),
                });
            }
        }

        let affects_flags = def
            .execute
            .iter()
            .any(|s| s.intersects(Signals::FI | Signals::RSA | Signals::LSA));

        Ok(Self {
            mnemonic: def.mnemonic,
            code: def.code,
            operand: def.operand,
            cycles: steps.len(),
            steps,
            affects_flags,
        })
    }

    /// Signals for a 1-based microstep. Steps past the end are empty.
    pub fn signals(&self, microstep: usize) -> Signals {
        microstep
            .checked_sub(1)
            .and_then(|i| self.steps.get(i))
            .copied()
            .unwrap_or_default()
    }
}

/// Returns the offending subset if `signals` cannot be applied in one pulse.
pub(crate) fn conflict_in(signals: Signals) -> Option<Signals> {
    let drivers = signals.intersection(Signals::BUS_DRIVERS);
    if drivers.count() > 1 {
        return Some(drivers);
    }
    let loads = signals.intersection(Signals::PC_LOADS);
    if loads.count() > 1 {
        return Some(loads);
    }
    let a_writers = signals.intersection(Signals::AI | Signals::RSA | Signals::LSA);
    if a_writers.count() > 1 {
        return Some(a_writers);
    }
    None
}

/// The `(opcode, microstep) -> signals` table for one variant.
#[derive(Debug, Clone)]
pub struct ControlTable {
    variant: Variant,
    policy: InvalidOpcodePolicy,
    descriptors: Vec<OpcodeDescriptor>,
    by_code: HashMap<u64, usize>,
    nop: usize,
}

impl ControlTable {
    /// Compile and validate the table for a variant.
    pub fn new(variant: Variant, policy: InvalidOpcodePolicy) -> Result<Self, ConfigError> {
        let defs = match variant {
            Variant::Base => base_set(),
            Variant::Extended => extended_set(),
        };

        let mut descriptors = Vec::with_capacity(defs.len());
        let mut by_code = HashMap::new();
        for def in defs {
            let descriptor = OpcodeDescriptor::compile(def)?;
            if by_code.insert(descriptor.code, descriptors.len()).is_some() {
                return Err(ConfigError::DuplicateOpcode {
                    code: descriptor.code,
                    mnemonic: descriptor.mnemonic,
                });
            }
            descriptors.push(descriptor);
        }
        let nop = by_code[&op::NOP];

        Ok(Self { variant, policy, descriptors, by_code, nop })
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn policy(&self) -> InvalidOpcodePolicy {
        self.policy
    }

    /// Descriptor for an opcode, if the variant defines it.
    pub fn descriptor(&self, opcode: u64) -> Option<&OpcodeDescriptor> {
        self.by_code.get(&opcode).map(|&i| &self.descriptors[i])
    }

    /// Descriptor by mnemonic (case-insensitive).
    pub fn by_mnemonic(&self, mnemonic: &str) -> Option<&OpcodeDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.mnemonic.eq_ignore_ascii_case(mnemonic))
    }

    /// All descriptors in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &OpcodeDescriptor> {
        self.descriptors.iter()
    }

    /// The descriptor that actually runs for `opcode`, honouring the
    /// invalid-opcode policy.
    pub fn resolve(&self, opcode: u64) -> Result<&OpcodeDescriptor, DecodeError> {
        match self.descriptor(opcode) {
            Some(descriptor) => Ok(descriptor),
            None => match self.policy {
                InvalidOpcodePolicy::Fault => Err(DecodeError::InvalidOpcode(opcode)),
                InvalidOpcodePolicy::NoOp => Ok(&self.descriptors[self.nop]),
            },
        }
    }

    /// Active signals for `(opcode, microstep)`.
    ///
    /// The first two fetch steps do not depend on the opcode, which is
    /// still being loaded. A microstep past an opcode's last step yields
    /// the empty set.
    pub fn lookup(&self, opcode: u64, microstep: usize) -> Result<Signals, DecodeError> {
        if microstep < FETCH_STEPS {
            return Ok(microstep
                .checked_sub(1)
                .map(|i| fetch_steps()[i])
                .unwrap_or_default());
        }
        Ok(self.resolve(opcode)?.signals(microstep))
    }
}

/// Errors raised by the decoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode: {0:#x}")]
    InvalidOpcode(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ControlTable {
        ControlTable::new(Variant::Base, InvalidOpcodePolicy::Fault).unwrap()
    }

    fn extended() -> ControlTable {
        ControlTable::new(Variant::Extended, InvalidOpcodePolicy::Fault).unwrap()
    }

    #[test]
    fn test_fetch_is_shared() {
        let table = extended();
        for d in table.iter() {
            assert_eq!(d.steps[0], fetch_steps()[0], "{}", d.mnemonic);
            assert_eq!(d.steps[1], fetch_steps()[1], "{}", d.mnemonic);
            assert!(d.steps[2].contains(fetch_steps()[2]), "{}", d.mnemonic);
        }
    }

    #[test]
    fn test_cycle_counts() {
        let table = base();
        let expect = [
            ("NOP", 3), ("LDA", 5), ("ADD", 6), ("SUB", 6), ("STA", 5), ("LDI", 4),
            ("JMP", 4), ("JPC", 4), ("JPZ", 4), ("KEI", 4), ("ADI", 5), ("SUI", 5),
            ("CMP", 6), ("PHA", 5), ("PLA", 6), ("LDS", 4), ("JSR", 7), ("RET", 6),
            ("SAS", 7), ("LAS", 7), ("LDB", 5), ("CPI", 5), ("RSA", 4), ("LSA", 4),
            ("DIS", 5), ("DIC", 5), ("LDD", 6), ("OUT", 4), ("HLT", 4),
        ];
        for (mnemonic, cycles) in expect {
            assert_eq!(table.by_mnemonic(mnemonic).unwrap().cycles, cycles, "{}", mnemonic);
        }
    }

    #[test]
    fn test_operation_reset_only_on_last_step() {
        for d in extended().iter() {
            for (i, signals) in d.steps.iter().enumerate() {
                assert_eq!(signals.contains(Signals::ORE), i + 1 == d.cycles, "{}", d.mnemonic);
            }
            assert!((3..=MAX_CYCLES).contains(&d.cycles));
        }
    }

    #[test]
    fn test_lookup_miss_is_empty() {
        let table = base();
        assert_eq!(table.lookup(op::NOP, 5).unwrap(), Signals::empty());
        assert_eq!(table.lookup(op::NOP, 3).unwrap(), Signals::CO | Signals::MI | Signals::ORE);
    }

    #[test]
    fn test_invalid_opcode_policy() {
        assert_eq!(base().lookup(200, 3), Err(DecodeError::InvalidOpcode(200)));
        // fetch steps never need the opcode
        assert!(base().lookup(200, 2).is_ok());

        let lenient = ControlTable::new(Variant::Base, InvalidOpcodePolicy::NoOp).unwrap();
        assert_eq!(lenient.resolve(200).unwrap().mnemonic, "NOP");
    }

    #[test]
    fn test_extended_only_opcodes() {
        assert!(base().descriptor(op::JNZ).is_none());
        assert_eq!(extended().descriptor(op::LPA).unwrap().cycles, 6);
        assert_eq!(extended().descriptor(op::MOVBA).unwrap().operand, OperandKind::None);
    }

    #[test]
    fn test_flag_affecting() {
        let table = base();
        assert!(table.by_mnemonic("add").unwrap().affects_flags);
        assert!(table.by_mnemonic("cpi").unwrap().affects_flags);
        assert!(table.by_mnemonic("lsa").unwrap().affects_flags);
        assert!(!table.by_mnemonic("lda").unwrap().affects_flags);
    }

    #[test]
    fn test_conflict_detection() {
        assert!(conflict_in(Signals::RO | Signals::AO).is_some());
        assert!(conflict_in(Signals::JMP | Signals::JZ).is_some());
        assert!(conflict_in(Signals::AI | Signals::LSA).is_some());
        assert!(conflict_in(Signals::RO | Signals::JC | Signals::CE).is_none());
    }

    #[test]
    fn test_too_many_steps_rejected() {
        let long = def(99, "LONG", OperandKind::None, vec![Signals::empty(); 5]);
        assert!(matches!(
            OpcodeDescriptor::compile(long),
            Err(ConfigError::TooManySteps { .. })
        ));
    }
}
