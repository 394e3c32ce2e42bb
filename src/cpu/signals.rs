//! Control signals.
//!
//! Every pulse the control-word decoder produces a [`Signals`] set naming
//! the control lines that are asserted. The bit positions are private to
//! this crate; callers only ever deal with the named constants.

use serde::ser::{Serialize, SerializeSeq, Serializer};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// A set of asserted control lines for one pulse.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Signals(u32);

macro_rules! signals {
    ($($(#[$doc:meta])* $name:ident = $bit:expr, $label:expr;)*) => {
        impl Signals {
            $(
                $(#[$doc])*
                pub const $name: Signals = Signals(1 << $bit);
            )*

            /// Every signal with its short mnemonic, in control-word order.
            pub const ALL: &'static [(Signals, &'static str)] = &[
                $((Signals::$name, $label),)*
            ];
        }
    };
}

signals! {
    /// Halt the clock.
    HLT = 31, "HLT";
    /// Memory address register in.
    MI = 30, "MI";
    /// RAM in (write memory[MAR]).
    RI = 29, "RI";
    /// RAM out.
    RO = 28, "RO";
    /// Instruction register A out.
    IAO = 27, "IAO";
    /// Instruction register A in.
    IAI = 26, "IAI";
    /// Instruction register B out.
    IBO = 25, "IBO";
    /// Instruction register B in.
    IBI = 24, "IBI";
    /// Register A in.
    AI = 23, "AI";
    /// Register A out.
    AO = 22, "AO";
    /// ALU (sum) out.
    EO = 21, "EO";
    /// ALU subtract.
    SU = 20, "SU";
    /// Register B in.
    BI = 19, "BI";
    /// Register B out.
    BO = 18, "BO";
    /// Output register in.
    OI = 17, "OI";
    /// Program counter enable (increment).
    CE = 16, "CE";
    /// Program counter out.
    CO = 15, "CO";
    /// Unconditional jump.
    JMP = 14, "JMP";
    /// Flags register in.
    FI = 13, "FI";
    /// Jump if the latched carry flag is set.
    JC = 12, "JC";
    /// Jump if the latched zero flag is set.
    JZ = 11, "JZ";
    /// Jump if the latched zero flag is clear.
    JNZ = 10, "JNZ";
    /// Keypad register out.
    KEO = 9, "KEO";
    /// Operation reset: the next pulse starts a new fetch.
    ORE = 8, "ORE";
    /// Increment stack pointer.
    INS = 7, "INS";
    /// Decrement stack pointer.
    DES = 6, "DES";
    /// Stack address (base + pointer) out.
    STO = 5, "STO";
    /// Stack pointer in, masked to the stack capacity.
    SPI = 4, "SPI";
    /// Shift register A right by one.
    RSA = 3, "RSA";
    /// Shift register A left by one.
    LSA = 2, "LSA";
    /// Display data register in.
    DDI = 1, "DDI";
    /// Display control register in.
    DCI = 0, "DCI";
}

impl Signals {
    /// Signals that drive a value onto the bus.
    pub const BUS_DRIVERS: Signals = Signals(
        Self::IAO.0
            | Self::IBO.0
            | Self::RO.0
            | Self::AO.0
            | Self::BO.0
            | Self::EO.0
            | Self::CO.0
            | Self::KEO.0
            | Self::STO.0,
    );

    /// Signals that may load the program counter.
    pub const PC_LOADS: Signals = Signals(Self::JMP.0 | Self::JC.0 | Self::JZ.0 | Self::JNZ.0);

    /// The empty set (no-op pulse).
    pub const fn empty() -> Self {
        Signals(0)
    }

    /// True when no signal is asserted.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every signal in `other` is asserted.
    pub const fn contains(self, other: Signals) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any signal in `other` is asserted.
    pub const fn intersects(self, other: Signals) -> bool {
        self.0 & other.0 != 0
    }

    /// The signals present in both sets.
    pub const fn intersection(self, other: Signals) -> Signals {
        Signals(self.0 & other.0)
    }

    /// The union of both sets. Usable in `const` tables.
    pub const fn union(self, other: Signals) -> Signals {
        Signals(self.0 | other.0)
    }

    /// Number of asserted signals.
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterate over the asserted signals as `(signal, mnemonic)` pairs.
    pub fn iter(self) -> impl Iterator<Item = (Signals, &'static str)> {
        Self::ALL
            .iter()
            .copied()
            .filter(move |(signal, _)| self.contains(*signal))
    }

    /// Mnemonics of the asserted signals.
    pub fn names(self) -> Vec<&'static str> {
        self.iter().map(|(_, name)| name).collect()
    }
}

impl BitOr for Signals {
    type Output = Signals;

    fn bitor(self, rhs: Signals) -> Signals {
        self.union(rhs)
    }
}

impl BitOrAssign for Signals {
    fn bitor_assign(&mut self, rhs: Signals) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Signals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "-");
        }
        let mut first = true;
        for (_, name) in self.iter() {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{}", name)?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for Signals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signals({})", self)
    }
}

impl Serialize for Signals {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.count() as usize))?;
        for (_, name) in self.iter() {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}
