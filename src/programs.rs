//! Built-in demo programs for the base instruction set.

use crate::cpu::op;
use crate::image::MemoryImage;

/// Address of the Fibonacci loop.
pub const FIBONACCI_LOOP: u64 = 8;

/// Values the Fibonacci demo outputs before the sum overflows and it
/// starts over.
pub const FIBONACCI_OUTPUT: [u64; 12] = [1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 233];

/// Fibonacci numbers on the output register, restarting on carry.
pub fn fibonacci() -> MemoryImage {
    const X: u64 = 28;
    const Y: u64 = 29;
    const Z: u64 = 30;

    MemoryImage::from_words(
        0,
        &[
            op::LDI, 0,
            op::STA, X,
            op::LDI, 1,
            op::STA, Y,
            // loop
            op::LDA, X,
            op::ADD, Y,
            op::JPC, 0,
            op::OUT,
            op::STA, Z,
            op::LDA, Y,
            op::STA, X,
            op::LDA, Z,
            op::STA, Y,
            op::JMP, FIBONACCI_LOOP,
        ],
    )
}

/// Counts down from the held keypad digit to zero, outputting each value.
pub fn countdown() -> MemoryImage {
    MemoryImage::from_words(
        0,
        &[
            // wait for a key
            op::KEI,
            op::CPI, 0,
            op::JPZ, 0,
            op::SUI, 0x80,
            // loop
            op::OUT,
            op::CPI, 0,
            op::JPZ, 16,
            op::SUI, 1,
            op::JMP, 7,
            op::HLT,
        ],
    )
}
