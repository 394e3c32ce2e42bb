//! Main memory.
//!
//! A flat array of word-width values. The top of the address space holds a
//! fixed stack window addressed through the stack pointer.

use serde::Serialize;
use std::ops::Range;
use thiserror::Error;

/// Flat word-addressed memory.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Memory {
    cells: Vec<u64>,
    #[serde(skip)]
    mask: u64,
    #[serde(skip)]
    stack: Range<usize>,
}

impl Memory {
    /// Create zeroed memory of `size` words with values masked by `mask`
    /// and a stack window starting at `stack_base`.
    pub fn new(size: usize, mask: u64, stack_base: usize, stack_capacity: usize) -> Self {
        Self {
            cells: vec![0; size],
            mask,
            stack: stack_base..stack_base + stack_capacity,
        }
    }

    /// Number of words.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// The stack window as an address range.
    pub fn stack_window(&self) -> Range<usize> {
        self.stack.clone()
    }

    /// Read a word.
    pub fn read(&self, addr: u64) -> Result<u64, MemoryError> {
        let index = self.index(addr)?;
        Ok(self.cells[index])
    }

    /// Write a word, masking it to the word width.
    pub fn write(&mut self, addr: u64, value: u64) -> Result<(), MemoryError> {
        let index = self.index(addr)?;
        self.cells[index] = value & self.mask;
        Ok(())
    }

    /// Address of stack slot `sp`.
    pub fn stack_address(&self, sp: u64) -> Result<u64, MemoryError> {
        let addr = self.stack.start as u64 + sp;
        if addr >= self.stack.end as u64 {
            return Err(MemoryError::AddressOutOfRange(addr));
        }
        Ok(addr)
    }

    /// Whole memory contents.
    pub fn as_slice(&self) -> &[u64] {
        &self.cells
    }

    fn index(&self, addr: u64) -> Result<usize, MemoryError> {
        if addr >= self.cells.len() as u64 {
            return Err(MemoryError::AddressOutOfRange(addr));
        }
        Ok(addr as usize)
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.cells.len())
            .field("stack", &self.stack)
            .finish()
    }
}

/// Errors raised by memory accesses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("memory address {0:#x} out of range")]
    AddressOutOfRange(u64),
}
