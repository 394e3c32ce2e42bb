//! Pulse-level execution engine.
//!
//! One call to [`Cpu::pulse`] is one clock pulse. Within a pulse:
//! - the decoder yields the control signals for `(opcode, microstep)`
//! - the single bus driver and the ALU are evaluated from start-of-pulse
//!   register values
//! - registers latch from the bus, then memory is written at the MAR
//!   value from the start of the pulse
//! - the microstep advances, or returns to 1 on operation reset
//!
//! Every check that can fault runs before anything is written, so a
//! faulting pulse leaves the machine exactly as it was.

use crate::config::{ConfigError, CpuConfig, Variant};
use crate::cpu::alu::{self, AluOutput};
use crate::cpu::decode::{ControlTable, DecodeError, OpcodeDescriptor, MAX_CYCLES};
use crate::cpu::memory::MemoryError;
use crate::cpu::signals::Signals;
use crate::cpu::{Flags, Memory, Registers};
use crate::image::{ImageError, MemoryImage};
use crate::keypad::Key;
use serde::Serialize;
use slog::{debug, error, info, o, trace, Discard, Logger};
use thiserror::Error;

/// A detected invariant violation. The engine halts on any of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
pub enum Fault {
    #[error("address {address:#x} out of range")]
    AddressOutOfRange { address: u64 },

    #[error("invalid opcode {opcode:#x}")]
    InvalidOpcode { opcode: u64 },

    #[error("bus contention between {signals}")]
    BusContention { signals: Signals },

    #[error("conflicting program counter loads {signals}")]
    JumpContention { signals: Signals },
}

impl From<MemoryError> for Fault {
    fn from(e: MemoryError) -> Self {
        match e {
            MemoryError::AddressOutOfRange(address) => Fault::AddressOutOfRange { address },
        }
    }
}

/// Why the machine stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HaltReason {
    /// The program executed HLT.
    Halted,
    /// The engine detected a fault.
    Fault(Fault),
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HaltReason::Halted => write!(f, "halted"),
            HaltReason::Fault(fault) => write!(f, "fault: {}", fault),
        }
    }
}

/// Errors returned by the public engine API.
#[derive(Debug, Error)]
pub enum CpuError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("image error: {0}")]
    Image(#[from] ImageError),

    #[error("{0}")]
    Fault(#[from] Fault),

    #[error("no halt within {0} pulses")]
    PulseLimit(u64),
}

/// Report for one executed pulse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pulse {
    /// Microstep that was executed.
    pub microstep: usize,
    /// Signals asserted during the pulse.
    pub signals: Signals,
    /// Value on the bus, if anything drove it.
    pub bus: Option<u64>,
    /// New output register value when OI fired.
    pub output: Option<u64>,
    /// The fault detected during this pulse, if any.
    pub fault: Option<Fault>,
}

impl Pulse {
    fn idle(microstep: usize) -> Self {
        Self {
            microstep,
            signals: Signals::empty(),
            bus: None,
            output: None,
            fault: None,
        }
    }
}

/// Complete machine state between two pulses.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub variant: Variant,
    pub registers: Registers,
    pub microstep: usize,
    pub opcode: u64,
    pub mnemonic: Option<&'static str>,
    /// Signals the next pulse will assert.
    pub signals: Signals,
    /// Live ALU output for the current A, B and subtract line.
    pub alu: AluOutput,
    /// Pending keypad code.
    pub input: u64,
    pub halted: bool,
    pub halt_reason: Option<HaltReason>,
    pub cycles: u64,
}

/// Register and memory writes computed for one pulse, not yet applied.
struct Latch {
    registers: Registers,
    write: Option<(u64, u64)>,
    bus: Option<u64>,
    output: Option<u64>,
}

/// The simulated CPU.
#[derive(Clone)]
pub struct Cpu {
    config: CpuConfig,
    table: ControlTable,
    regs: Registers,
    mem: Memory,
    microstep: usize,
    halted: bool,
    halt_reason: Option<HaltReason>,
    cycles: u64,
    input: u64,
    log: Logger,
}

impl Cpu {
    /// Build a machine from a configuration. Memory starts zeroed.
    pub fn new(config: CpuConfig) -> Result<Self, CpuError> {
        Self::with_logger(config, None)
    }

    /// Build a machine that logs to `logger`.
    pub fn with_logger<L>(config: CpuConfig, logger: L) -> Result<Self, CpuError>
    where
        L: Into<Option<Logger>>,
    {
        config.validate()?;
        let table = ControlTable::new(config.variant, config.invalid_opcode)?;
        let mask = config.word_mask();
        let log = logger
            .into()
            .unwrap_or(Logger::root(Discard, o!()))
            .new(o!("variant" => format!("{:?}", config.variant)));

        Ok(Self {
            regs: Registers::new(mask),
            mem: Memory::new(config.memory_size, mask, config.stack_base, config.stack_capacity()),
            table,
            config,
            microstep: 1,
            halted: false,
            halt_reason: None,
            cycles: 0,
            input: 0,
            log,
        })
    }

    /// Replace the logger.
    pub fn set_logger(&mut self, logger: Logger) {
        self.log = logger;
    }

    /// Load memory images in order.
    ///
    /// Each image is checked as a whole before any of its words are
    /// written. Loading is refused once the machine has been pulsed.
    pub fn load_images(&mut self, images: &[MemoryImage]) -> Result<(), CpuError> {
        for image in images {
            self.load_image(image)?;
        }
        Ok(())
    }

    /// Load one memory image. Values are masked to the word width.
    pub fn load_image(&mut self, image: &MemoryImage) -> Result<(), CpuError> {
        if self.cycles > 0 {
            return Err(ImageError::AlreadyRunning.into());
        }
        if let Some(address) = image.addresses().find(|&a| a >= self.mem.len() as u64) {
            return Err(ImageError::AddressOutOfRange {
                address,
                memory_size: self.mem.len(),
            }
            .into());
        }
        for (address, value) in image.iter() {
            self.mem.write(address, value).map_err(Fault::from)?;
        }
        debug!(self.log, "image loaded"; "words" => image.len());
        Ok(())
    }

    /// Reinitialize registers, flags, microstep and halt state. Memory
    /// is left untouched, as is any held key.
    pub fn reset(&mut self) {
        self.regs.reset();
        self.microstep = 1;
        self.halted = false;
        self.halt_reason = None;
        self.cycles = 0;
        debug!(self.log, "reset");
    }

    /// Set the pending keypad key, or release it.
    pub fn set_key(&mut self, key: Option<Key>) {
        self.input = Key::code(key);
    }

    /// Set the raw keypad register.
    pub fn set_input(&mut self, code: u64) {
        self.input = self.regs.mask(code);
    }

    /// Execute one clock pulse. Does nothing once halted.
    pub fn pulse(&mut self) -> Pulse {
        if self.halted {
            return Pulse::idle(self.microstep);
        }

        let microstep = self.microstep;
        let signals = match self.table.lookup(self.regs.ir_a, microstep) {
            Ok(signals) => signals,
            Err(DecodeError::InvalidOpcode(opcode)) => {
                return self.fault(Fault::InvalidOpcode { opcode }, microstep, Signals::empty());
            }
        };

        let latch = match self.latch(signals) {
            Ok(latch) => latch,
            Err(fault) => return self.fault(fault, microstep, signals),
        };
        if let Some((address, value)) = latch.write {
            if let Err(e) = self.mem.write(address, value) {
                return self.fault(e.into(), microstep, signals);
            }
        }

        if signals.contains(Signals::IAI) {
            trace!(self.log, "fetch";
                "pc" => self.regs.pc,
                "opcode" => latch.registers.ir_a,
                "mnemonic" => self.table.descriptor(latch.registers.ir_a).map_or("???", |d| d.mnemonic));
        }
        self.regs = latch.registers;
        self.cycles += 1;

        if signals.contains(Signals::HLT) {
            self.halted = true;
            self.halt_reason = Some(HaltReason::Halted);
            info!(self.log, "halted"; "pc" => self.regs.pc, "cycles" => self.cycles);
        } else if signals.contains(Signals::ORE) || microstep >= MAX_CYCLES {
            self.microstep = 1;
        } else {
            self.microstep += 1;
        }

        Pulse {
            microstep,
            signals,
            bus: latch.bus,
            output: latch.output,
            fault: None,
        }
    }

    /// Pulse until the current instruction completes or the machine halts.
    /// Returns the number of pulses executed.
    pub fn step_instruction(&mut self) -> u64 {
        let mut pulses = 0;
        while !self.halted {
            self.pulse();
            pulses += 1;
            if self.microstep == 1 {
                break;
            }
        }
        pulses
    }

    /// Run at most `max_pulses` pulses. Returns the number executed.
    pub fn run_limited(&mut self, max_pulses: u64) -> u64 {
        let mut pulses = 0;
        while !self.halted && pulses < max_pulses {
            self.pulse();
            pulses += 1;
        }
        pulses
    }

    /// Run until HLT. A fault or an exhausted pulse budget is an error.
    pub fn run_until_halt(&mut self, max_pulses: u64) -> Result<u64, CpuError> {
        let pulses = self.run_limited(max_pulses);
        match &self.halt_reason {
            Some(HaltReason::Halted) => Ok(pulses),
            Some(HaltReason::Fault(fault)) => Err(fault.clone().into()),
            None => Err(CpuError::PulseLimit(max_pulses)),
        }
    }

    /// Compute the complete effect of one pulse without applying it.
    fn latch(&self, signals: Signals) -> Result<Latch, Fault> {
        let drivers = signals.intersection(Signals::BUS_DRIVERS);
        if drivers.count() > 1 {
            return Err(Fault::BusContention { signals: drivers });
        }
        let loads = self.active_loads(signals);
        if loads.count() > 1 {
            return Err(Fault::JumpContention { signals: loads });
        }

        let regs = &self.regs;
        let alu = self.alu_for(signals);
        let bus = if drivers.is_empty() {
            None
        } else {
            Some(regs.mask(self.drive(drivers, alu)?))
        };
        // undriven bus reads as zero
        let value = bus.unwrap_or(0);

        let mut next = regs.clone();
        let mut output = None;

        if signals.contains(Signals::MI) {
            if value >= self.mem.len() as u64 {
                return Err(Fault::AddressOutOfRange { address: value });
            }
            next.mar = value;
        }
        if signals.contains(Signals::IAI) {
            next.ir_a = value;
        }
        if signals.contains(Signals::IBI) {
            next.ir_b = value;
        }
        if signals.contains(Signals::AI) {
            next.a = value;
        }
        if signals.contains(Signals::BI) {
            next.b = value;
        }
        if signals.contains(Signals::OI) {
            next.out = value;
            output = Some(value);
        }
        if signals.contains(Signals::DDI) {
            next.display_data = value;
        }
        if signals.contains(Signals::DCI) {
            next.display_control = (value >> 5) & 0b111;
        }

        if signals.contains(Signals::CE) {
            next.increment_pc(self.mem.len());
        }
        if !loads.is_empty() {
            if value >= self.mem.len() as u64 {
                return Err(Fault::AddressOutOfRange { address: value });
            }
            next.pc = value;
        }

        if signals.contains(Signals::FI) {
            next.flags = Flags { carry: alu.carry, zero: alu.zero };
        }
        let shifted = if signals.contains(Signals::LSA) {
            Some(alu::shift_left(regs.a, self.config.word_bits, regs.word_mask()))
        } else if signals.contains(Signals::RSA) {
            Some(alu::shift_right(regs.a, regs.word_mask()))
        } else {
            None
        };
        if let Some(shifted) = shifted {
            next.a = shifted.value;
            next.flags = Flags { carry: shifted.carry, zero: shifted.zero };
        }

        let capacity = self.config.stack_capacity();
        if signals.contains(Signals::INS) {
            next.increment_sp(capacity);
        }
        if signals.contains(Signals::DES) {
            next.decrement_sp(capacity);
        }
        if signals.contains(Signals::SPI) {
            next.load_sp(value, capacity);
        }

        let write = if signals.contains(Signals::RI) {
            if regs.mar >= self.mem.len() as u64 {
                return Err(Fault::AddressOutOfRange { address: regs.mar });
            }
            Some((regs.mar, value))
        } else {
            None
        };

        Ok(Latch { registers: next, write, bus, output })
    }

    /// Value put on the bus by a single driver.
    fn drive(&self, driver: Signals, alu: AluOutput) -> Result<u64, Fault> {
        let regs = &self.regs;
        let value = if driver == Signals::RO {
            self.mem.read(regs.mar)?
        } else if driver == Signals::STO {
            self.mem.stack_address(regs.sp)?
        } else if driver == Signals::CO {
            regs.pc
        } else if driver == Signals::AO {
            regs.a
        } else if driver == Signals::BO {
            regs.b
        } else if driver == Signals::EO {
            alu.value
        } else if driver == Signals::IAO {
            regs.ir_a
        } else if driver == Signals::IBO {
            regs.ir_b
        } else {
            self.input
        };
        Ok(value)
    }

    /// PC-load signals whose condition holds for the latched flags.
    fn active_loads(&self, signals: Signals) -> Signals {
        let flags = self.regs.flags;
        let mut active = signals.intersection(Signals::JMP);
        if flags.carry {
            active |= signals.intersection(Signals::JC);
        }
        if flags.zero {
            active |= signals.intersection(Signals::JZ);
        } else {
            active |= signals.intersection(Signals::JNZ);
        }
        active
    }

    fn alu_for(&self, signals: Signals) -> AluOutput {
        alu::evaluate(
            self.regs.a,
            self.regs.b,
            signals.contains(Signals::SU),
            self.regs.word_mask(),
        )
    }

    fn fault(&mut self, fault: Fault, microstep: usize, signals: Signals) -> Pulse {
        error!(self.log, "fault";
            "fault" => %fault,
            "pc" => self.regs.pc,
            "opcode" => self.regs.ir_a,
            "microstep" => microstep);
        self.halted = true;
        self.halt_reason = Some(HaltReason::Fault(fault.clone()));

        Pulse {
            microstep,
            signals,
            bus: None,
            output: None,
            fault: Some(fault),
        }
    }

    /// Signals the next pulse will assert. Empty when halted or when the
    /// next lookup would fault.
    pub fn active_signals(&self) -> Signals {
        if self.halted {
            return Signals::empty();
        }
        self.table
            .lookup(self.regs.ir_a, self.microstep)
            .unwrap_or_default()
    }

    /// Live ALU output for the current registers and next pulse's
    /// subtract line.
    pub fn alu_output(&self) -> AluOutput {
        self.alu_for(self.active_signals())
    }

    /// Take a consistent copy of the whole machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            variant: self.config.variant,
            registers: self.regs.clone(),
            microstep: self.microstep,
            opcode: self.regs.ir_a,
            mnemonic: self.current_descriptor().map(|d| d.mnemonic),
            signals: self.active_signals(),
            alu: self.alu_output(),
            input: self.input,
            halted: self.halted,
            halt_reason: self.halt_reason.clone(),
            cycles: self.cycles,
        }
    }

    pub fn config(&self) -> &CpuConfig {
        &self.config
    }

    pub fn table(&self) -> &ControlTable {
        &self.table
    }

    pub fn registers(&self) -> &Registers {
        &self.regs
    }

    /// Whole memory contents.
    pub fn memory(&self) -> &[u64] {
        self.mem.as_slice()
    }

    /// Addresses reachable through the stack pointer.
    pub fn stack_window(&self) -> std::ops::Range<usize> {
        self.mem.stack_window()
    }

    pub fn microstep(&self) -> usize {
        self.microstep
    }

    /// Opcode in instruction register A.
    pub fn current_opcode(&self) -> u64 {
        self.regs.ir_a
    }

    pub fn current_descriptor(&self) -> Option<&OpcodeDescriptor> {
        self.table.descriptor(self.regs.ir_a)
    }

    pub fn output(&self) -> u64 {
        self.regs.out
    }

    /// Pulses executed since construction or the last reset.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn halt_reason(&self) -> Option<&HaltReason> {
        self.halt_reason.as_ref()
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("variant", &self.config.variant)
            .field("regs", &self.regs)
            .field("microstep", &self.microstep)
            .field("halted", &self.halted)
            .field("cycles", &self.cycles)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InvalidOpcodePolicy;
    use crate::cpu::decode::op;

    fn cpu_with(words: &[u64]) -> Cpu {
        let mut cpu = Cpu::new(CpuConfig::base()).unwrap();
        cpu.load_image(&MemoryImage::from_words(0, words)).unwrap();
        cpu
    }

    #[test]
    fn test_cpu_halt() {
        let mut cpu = cpu_with(&[op::HLT]);
        let pulses = cpu.run_until_halt(100).unwrap();
        assert_eq!(pulses, 4);
        assert_eq!(cpu.halt_reason(), Some(&HaltReason::Halted));
        // halted pulses are no-ops
        let before = cpu.snapshot().registers;
        let pulse = cpu.pulse();
        assert!(pulse.signals.is_empty());
        assert_eq!(cpu.registers(), &before);
        assert_eq!(cpu.cycles(), 4);
    }

    #[test]
    fn test_cpu_nop_is_three_pulses() {
        let mut cpu = cpu_with(&[op::NOP, op::HLT]);
        assert_eq!(cpu.step_instruction(), 3);
        assert_eq!(cpu.microstep(), 1);
        assert_eq!(cpu.registers().pc, 1);
    }

    #[test]
    fn test_cycle_counts_match_table() {
        let program = [
            (vec![op::LDI, 7], 4),
            (vec![op::LDA, 10], 5),
            (vec![op::ADD, 10], 6),
            (vec![op::STA, 11], 5),
            (vec![op::OUT], 4),
        ];
        for (words, cycles) in program {
            let mut cpu = cpu_with(&words);
            assert_eq!(cpu.step_instruction(), cycles, "{:?}", words);
        }
    }

    #[test]
    fn test_cpu_load_add_store() {
        let mut cpu = cpu_with(&[op::LDA, 20, op::ADD, 21, op::STA, 22, op::HLT]);
        cpu.mem.write(20, 40).unwrap();
        cpu.mem.write(21, 2).unwrap();
        cpu.run_until_halt(100).unwrap();
        assert_eq!(cpu.memory()[22], 42);
        assert_eq!(cpu.registers().a, 42);
        assert!(!cpu.registers().flags.carry);
    }

    #[test]
    fn test_flags_latch_only_on_fi() {
        // ADI 10 overflows and latches carry; LDI leaves flags alone
        let mut cpu = cpu_with(&[op::LDI, 250, op::ADI, 10, op::LDI, 0, op::HLT]);
        cpu.run_until_halt(100).unwrap();
        assert_eq!(cpu.registers().a, 0);
        assert!(cpu.registers().flags.carry);
        assert!(!cpu.registers().flags.zero);
    }

    #[test]
    fn test_conditional_jump_on_latched_carry() {
        // 0: LDI 5; 2: CPI 5 (carry set); 4: JPC 8; 6: HLT; 7: NOP; 8: LDI 9; 10: HLT
        let mut cpu = cpu_with(&[
            op::LDI, 5, op::CPI, 5, op::JPC, 8, op::HLT, op::NOP, op::LDI, 9, op::HLT,
        ]);
        cpu.run_until_halt(100).unwrap();
        assert_eq!(cpu.registers().a, 9);

        // 3 < 5 borrows: no carry, no jump
        let mut cpu = cpu_with(&[op::LDI, 3, op::CPI, 5, op::JPC, 8, op::HLT, op::NOP, op::LDI, 9, op::HLT]);
        cpu.run_until_halt(100).unwrap();
        assert_eq!(cpu.registers().a, 3);
    }

    #[test]
    fn test_conditional_jump_ignores_live_carry() {
        // A + B would carry, but the latched flag is clear
        let mut cpu = cpu_with(&[op::JPC, 8, op::HLT, op::NOP, op::NOP, op::NOP, op::NOP, op::NOP, op::LDI, 9, op::HLT]);
        cpu.regs.a = 250;
        cpu.regs.b = 10;
        cpu.regs.flags.carry = false;
        assert!(cpu.alu_output().carry);

        cpu.run_until_halt(100).unwrap();
        assert_eq!(cpu.registers().a, 250);
        assert_eq!(cpu.registers().pc, 3);
    }

    #[test]
    fn test_jump_overrides_increment() {
        let mut cpu = cpu_with(&[op::JMP, 40]);
        cpu.step_instruction();
        assert_eq!(cpu.registers().pc, 40);
    }

    #[test]
    fn test_call_and_return() {
        // 0: JSR 10; 2: OUT; 3: HLT; 10: LDI 77; 12: RET
        let mut cpu = cpu_with(&[op::JSR, 10, op::OUT, op::HLT]);
        cpu.load_image(&MemoryImage::from_words(10, &[op::LDI, 77, op::RET])).unwrap();

        assert_eq!(cpu.step_instruction(), 7);
        assert_eq!(cpu.registers().pc, 10);
        assert_eq!(cpu.registers().sp, 1);
        // return address is the word after the operand
        assert_eq!(cpu.memory()[224], 2);

        cpu.run_until_halt(100).unwrap();
        assert_eq!(cpu.output(), 77);
        assert_eq!(cpu.registers().sp, 0);
    }

    #[test]
    fn test_push_pull() {
        let mut cpu = cpu_with(&[op::LDI, 3, op::PHA, op::LDI, 4, op::PHA, op::PLA, op::PLA, op::HLT]);
        cpu.run_until_halt(200).unwrap();
        assert_eq!(cpu.registers().a, 3);
        assert_eq!(cpu.registers().sp, 0);
    }

    #[test]
    fn test_stack_pointer_wraps() {
        let mut cpu = cpu_with(&[op::PLA, op::HLT]);
        cpu.run_until_halt(100).unwrap();
        assert_eq!(cpu.registers().sp, 15);
    }

    #[test]
    fn test_shifts_write_flags() {
        let mut cpu = cpu_with(&[op::LDI, 0x81, op::LSA, op::HLT]);
        cpu.run_until_halt(100).unwrap();
        assert_eq!(cpu.registers().a, 0x02);
        assert!(cpu.registers().flags.carry);

        let mut cpu = cpu_with(&[op::LDI, 1, op::RSA, op::HLT]);
        cpu.run_until_halt(100).unwrap();
        assert_eq!(cpu.registers().a, 0);
        assert!(cpu.registers().flags.carry);
        assert!(cpu.registers().flags.zero);
    }

    #[test]
    fn test_keypad_input() {
        let mut cpu = cpu_with(&[op::KEI, op::HLT]);
        cpu.set_key(Some(Key::Digit(7)));
        cpu.run_until_halt(100).unwrap();
        assert_eq!(cpu.registers().a, 0x87);
    }

    #[test]
    fn test_display_registers() {
        let mut cpu = cpu_with(&[op::DIS, 0x41, op::DIC, 0xE0, op::HLT]);
        cpu.run_until_halt(100).unwrap();
        assert_eq!(cpu.registers().display_data, 0x41);
        assert_eq!(cpu.registers().display_control, 0b111);
    }

    #[test]
    fn test_output_reported_by_pulse() {
        let mut cpu = cpu_with(&[op::LDI, 12, op::OUT]);
        let outputs: Vec<_> = (0..8).filter_map(|_| cpu.pulse().output).collect();
        assert_eq!(outputs, vec![12]);
    }

    #[test]
    fn test_invalid_opcode_faults() {
        let mut cpu = cpu_with(&[200]);
        let pulses = cpu.run_limited(10);
        assert_eq!(pulses, 3);
        assert_eq!(
            cpu.halt_reason(),
            Some(&HaltReason::Fault(Fault::InvalidOpcode { opcode: 200 }))
        );
        assert!(matches!(cpu.run_until_halt(10), Err(CpuError::Fault(_))));
    }

    #[test]
    fn test_invalid_opcode_as_noop() {
        let mut config = CpuConfig::base();
        config.invalid_opcode = InvalidOpcodePolicy::NoOp;
        let mut cpu = Cpu::new(config).unwrap();
        cpu.load_image(&MemoryImage::from_words(0, &[200, op::HLT])).unwrap();
        assert_eq!(cpu.step_instruction(), 3);
        cpu.run_until_halt(10).unwrap();
    }

    #[test]
    fn test_address_fault_leaves_state() {
        let mut config = CpuConfig::base();
        config.memory_size = 128;
        config.stack_base = 100;
        let mut cpu = Cpu::new(config).unwrap();
        cpu.load_image(&MemoryImage::from_words(0, &[op::LDA, 200])).unwrap();
        cpu.run_limited(10);
        assert_eq!(
            cpu.halt_reason(),
            Some(&HaltReason::Fault(Fault::AddressOutOfRange { address: 200 }))
        );
        // MAR kept the operand address from fetch step 3
        assert_eq!(cpu.registers().mar, 1);
    }

    #[test]
    fn test_jump_outside_memory_faults() {
        let mut config = CpuConfig::base();
        config.memory_size = 128;
        config.stack_base = 100;
        let mut cpu = Cpu::new(config.clone()).unwrap();
        cpu.load_image(&MemoryImage::from_words(0, &[op::JMP, 200])).unwrap();
        cpu.step_instruction();
        assert_eq!(
            cpu.halt_reason(),
            Some(&HaltReason::Fault(Fault::AddressOutOfRange { address: 200 }))
        );
        assert!(cpu.registers().pc < 128);
        assert_eq!(cpu.registers().pc, 1);

        // an untaken jump never checks its target
        let mut cpu = Cpu::new(config).unwrap();
        cpu.load_image(&MemoryImage::from_words(0, &[op::JPC, 200, op::HLT])).unwrap();
        cpu.run_until_halt(100).unwrap();
        assert_eq!(cpu.halt_reason(), Some(&HaltReason::Halted));
        assert_eq!(cpu.stack_window(), 100..116);
    }

    #[test]
    fn test_bus_contention_is_fatal() {
        let cpu = cpu_with(&[]);
        let fault = cpu.latch(Signals::RO | Signals::AO | Signals::AI).err();
        assert!(matches!(fault, Some(Fault::BusContention { .. })));
    }

    #[test]
    fn test_jump_contention_counts_active_conditions() {
        let mut cpu = cpu_with(&[]);
        // JC without carry is inactive
        assert!(cpu.latch(Signals::RO | Signals::JMP | Signals::JC).is_ok());
        cpu.regs.flags.carry = true;
        let fault = cpu.latch(Signals::RO | Signals::JMP | Signals::JC).err();
        assert!(matches!(fault, Some(Fault::JumpContention { .. })));
    }

    #[test]
    fn test_undriven_bus_reads_zero() {
        let mut cpu = cpu_with(&[]);
        cpu.regs.a = 9;
        let latch = cpu.latch(Signals::AI).unwrap();
        assert_eq!(latch.bus, None);
        assert_eq!(latch.registers.a, 0);
    }

    #[test]
    fn test_memory_write_uses_start_of_pulse_mar() {
        let mut cpu = cpu_with(&[]);
        cpu.regs.mar = 5;
        cpu.regs.a = 33;
        let latch = cpu.latch(Signals::AO | Signals::RI | Signals::MI).unwrap();
        assert_eq!(latch.write, Some((5, 33)));
        assert_eq!(latch.registers.mar, 33);
    }

    #[test]
    fn test_reset_preserves_memory() {
        let mut cpu = cpu_with(&[op::LDI, 1, op::STA, 50, op::HLT]);
        cpu.run_until_halt(100).unwrap();
        let memory = cpu.memory().to_vec();
        cpu.reset();
        assert_eq!(cpu.memory(), &memory[..]);
        assert_eq!(cpu.registers().a, 0);
        assert_eq!(cpu.microstep(), 1);
        assert!(!cpu.is_halted());
        assert_eq!(cpu.halt_reason(), None);
    }

    #[test]
    fn test_load_refused_after_first_pulse() {
        let mut cpu = cpu_with(&[op::NOP]);
        cpu.pulse();
        let result = cpu.load_image(&MemoryImage::from_words(0, &[1]));
        assert!(matches!(result, Err(CpuError::Image(ImageError::AlreadyRunning))));
    }

    #[test]
    fn test_out_of_range_image_is_not_applied() {
        let mut cpu = Cpu::new(CpuConfig::base()).unwrap();
        let image = MemoryImage::from_pairs(vec![(0, 1), (300, 2)]);
        assert!(cpu.load_image(&image).is_err());
        assert_eq!(cpu.memory()[0], 0);
    }

    #[test]
    fn test_snapshot_reports_next_signals() {
        let cpu = cpu_with(&[op::NOP]);
        let snap = cpu.snapshot();
        assert_eq!(snap.signals, Signals::CO | Signals::MI);
        assert_eq!(snap.microstep, 1);
        assert_eq!(snap.mnemonic, Some("NOP"));
    }

    #[test]
    fn test_extended_register_moves() {
        let mut cpu = Cpu::new(CpuConfig::extended()).unwrap();
        cpu.load_image(&MemoryImage::from_words(
            0,
            &[op::LDI, 1000, op::MOVAB, op::LDI, 234, op::SUM, op::MVASP, op::JNZ, 12, op::HLT, op::NOP, op::NOP, op::OUT, op::HLT],
        ))
        .unwrap();
        cpu.run_until_halt(200).unwrap();
        assert_eq!(cpu.output(), 1234);
        assert_eq!(cpu.registers().sp, 1234 % 256);
    }
}
