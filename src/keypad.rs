//! Keypad peripheral.
//!
//! The keypad drives the bus through KEO with the code of the key held at
//! that moment. Every code has bit 7 set so a program can tell "no key"
//! (zero) from the digit 0.

use serde::{Deserialize, Serialize};

/// A key on the front-panel keypad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    /// Digit 0..=9.
    Digit(u8),
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Key {
    /// Code placed on the bus for an optional held key.
    pub fn code(key: Option<Key>) -> u64 {
        match key {
            None => 0,
            Some(Key::Digit(d)) => 0x80 | (d % 10) as u64,
            Some(Key::Add) => 0xC0,
            Some(Key::Subtract) => 0xA0,
            Some(Key::Multiply) => 0x90,
            Some(Key::Divide) => 0xE0,
        }
    }

    /// Map a typed character to a key.
    pub fn from_char(c: char) -> Option<Key> {
        match c {
            '0'..='9' => c.to_digit(10).map(|d| Key::Digit(d as u8)),
            '+' => Some(Key::Add),
            '-' => Some(Key::Subtract),
            '*' => Some(Key::Multiply),
            '/' => Some(Key::Divide),
            _ => None,
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Digit(d) => write!(f, "{}", d),
            Key::Add => write!(f, "+"),
            Key::Subtract => write!(f, "-"),
            Key::Multiply => write!(f, "*"),
            Key::Divide => write!(f, "/"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(Key::code(None), 0);
        assert_eq!(Key::code(Some(Key::Digit(0))), 0x80);
        assert_eq!(Key::code(Some(Key::Digit(9))), 0x89);
        assert_eq!(Key::code(Some(Key::Add)), 0xC0);
        assert_eq!(Key::code(Some(Key::Subtract)), 0xA0);
        assert_eq!(Key::code(Some(Key::Multiply)), 0x90);
        assert_eq!(Key::code(Some(Key::Divide)), 0xE0);
    }

    #[test]
    fn test_from_char() {
        assert_eq!(Key::from_char('4'), Some(Key::Digit(4)));
        assert_eq!(Key::from_char('/'), Some(Key::Divide));
        assert_eq!(Key::from_char('x'), None);
    }
}
