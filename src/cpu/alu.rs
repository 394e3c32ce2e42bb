//! The adder/subtractor and the A-register shifter.
//!
//! The ALU is combinational: its output is a pure function of registers A
//! and B and the subtract line, recomputed whenever it is looked at. The
//! flags register only captures carry and zero when the flags-in signal
//! fires.

use serde::Serialize;

/// Combinational ALU output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AluOutput {
    /// Result masked to the word width.
    pub value: u64,
    /// Addition: the unmasked sum overflowed the word.
    /// Subtraction: `a >= b` (no borrow), the two's-complement convention.
    pub carry: bool,
    pub zero: bool,
}

/// Evaluate the adder for `a` and `b` under `mask` (`2^word_bits - 1`).
///
/// Operands are widened to 128 bits so the raw result never wraps before
/// masking.
pub fn evaluate(a: u64, b: u64, subtract: bool, mask: u64) -> AluOutput {
    let (a, b) = (a & mask, b & mask);
    let modulus = mask as u128 + 1;

    let (raw, carry) = if subtract {
        // a + (2^n - b): the carry out is set exactly when a >= b
        let raw = a as u128 + (modulus - b as u128);
        (raw, a >= b)
    } else {
        let raw = a as u128 + b as u128;
        (raw, raw > mask as u128)
    };

    let value = (raw % modulus) as u64;
    AluOutput { value, carry, zero: value == 0 }
}

/// Shift left by one. The outgoing high bit becomes the carry.
pub fn shift_left(a: u64, word_bits: u32, mask: u64) -> AluOutput {
    let a = a & mask;
    let carry = (a >> (word_bits - 1)) & 1 == 1;
    let value = (a << 1) & mask;
    AluOutput { value, carry, zero: value == 0 }
}

/// Shift right by one. The outgoing low bit becomes the carry.
pub fn shift_right(a: u64, mask: u64) -> AluOutput {
    let a = a & mask;
    let value = a >> 1;
    AluOutput { value, carry: a & 1 == 1, zero: value == 0 }
}
