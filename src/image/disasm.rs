//! Disassembler.
//!
//! Walks memory using the control table's descriptors: each opcode knows
//! whether it takes an operand word, so the listing stays aligned.

use crate::cpu::decode::{ControlTable, OperandKind};

/// One disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub address: usize,
    /// Words covered by this line (1 or 2).
    pub size: usize,
    pub text: String,
}

impl std::fmt::Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04x}: {}", self.address, self.text)
    }
}

/// Disassemble the single instruction at `address`.
pub fn disassemble_at(table: &ControlTable, memory: &[u64], address: usize) -> Option<Line> {
    let word = *memory.get(address)?;
    let line = match table.descriptor(word) {
        Some(d) => {
            let operand = memory.get(address + 1).copied();
            let text = match (d.operand, operand) {
                (OperandKind::None, _) => d.mnemonic.to_string(),
                (OperandKind::Address, Some(v)) => format!("{} [{}]", d.mnemonic, v),
                (OperandKind::Immediate, Some(v)) => format!("{} #{}", d.mnemonic, v),
                (OperandKind::Label, Some(v)) => format!("{} {}", d.mnemonic, v),
                (_, None) => format!("{} ???", d.mnemonic),
            };
            Line {
                address,
                size: d.operand.size().min(memory.len() - address),
                text,
            }
        }
        None => Line {
            address,
            size: 1,
            text: format!(".word {}", word),
        },
    };
    Some(line)
}

/// Disassemble `count` instructions starting at `start`.
pub fn disassemble(table: &ControlTable, memory: &[u64], start: usize, count: usize) -> Vec<Line> {
    let mut lines = Vec::with_capacity(count);
    let mut address = start;
    while lines.len() < count {
        match disassemble_at(table, memory, address) {
            Some(line) => {
                address += line.size;
                lines.push(line);
            }
            None => break,
        }
    }
    lines
}
