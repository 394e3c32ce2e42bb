//! Property-based tests for machine invariants.
//!
//! These tests use proptest to check that the engine holds its invariants
//! for arbitrary operands, memory contents and programs.

use logicpu::cpu::alu;
use logicpu::{Cpu, CpuConfig, InvalidOpcodePolicy, MemoryImage, Variant};
use proptest::prelude::*;

/// Base machine that runs anything: undefined opcodes are NOPs.
fn lenient_base() -> CpuConfig {
    let mut config = CpuConfig::base();
    config.invalid_opcode = InvalidOpcodePolicy::NoOp;
    config
}

/// Opcodes defined for a variant.
fn opcodes(variant: Variant) -> Vec<u64> {
    let cpu = Cpu::new(CpuConfig::for_variant(variant)).unwrap();
    cpu.table().iter().map(|d| d.code).collect()
}

proptest! {
    #[test]
    fn prop_alu_add_matches_arithmetic(a in 0u64..256, b in 0u64..256) {
        let out = alu::evaluate(a, b, false, 0xFF);
        prop_assert_eq!(out.value, (a + b) % 256);
        prop_assert_eq!(out.carry, a + b > 255);
        prop_assert_eq!(out.zero, out.value == 0);
    }

    #[test]
    fn prop_alu_subtract_carry_is_no_borrow(a in 0u64..256, b in 0u64..256) {
        let out = alu::evaluate(a, b, true, 0xFF);
        prop_assert_eq!(out.value, (a + 256 - b) % 256);
        prop_assert_eq!(out.carry, a >= b);
        prop_assert_eq!(out.zero, a == b);
    }

    #[test]
    fn prop_alu_wide_words(a in any::<u32>(), b in any::<u32>(), subtract in any::<bool>()) {
        let mask = u32::MAX as u64;
        let out = alu::evaluate(a as u64, b as u64, subtract, mask);
        let expected = if subtract { a.wrapping_sub(b) } else { a.wrapping_add(b) };
        prop_assert_eq!(out.value, expected as u64);
    }

    #[test]
    fn prop_shifts_keep_outgoing_bit(a in 0u64..256) {
        let left = alu::shift_left(a, 8, 0xFF);
        prop_assert_eq!(left.value, (a << 1) & 0xFF);
        prop_assert_eq!(left.carry, a & 0x80 != 0);

        let right = alu::shift_right(a, 0xFF);
        prop_assert_eq!(right.value, a >> 1);
        prop_assert_eq!(right.carry, a & 1 != 0);
    }

    /// Random memory run as a program never breaks a register invariant.
    #[test]
    fn prop_random_programs_stay_in_range(
        memory in prop::collection::vec(0u64..256, 256),
        key in 0u64..256,
        pulses in 1u64..2_000,
    ) {
        let mut cpu = Cpu::new(lenient_base()).unwrap();
        cpu.load_image(&MemoryImage::from_words(0, &memory)).unwrap();
        cpu.set_input(key);

        for _ in 0..pulses {
            cpu.pulse();
            let regs = cpu.registers();
            prop_assert!(regs.sp < 16);
            prop_assert!(regs.pc < 256 && regs.mar < 256);
            prop_assert!(regs.a <= 0xFF && regs.b <= 0xFF && regs.out <= 0xFF);
            prop_assert!(regs.display_control < 8);
            prop_assert!((1..=7).contains(&cpu.microstep()));
            if cpu.is_halted() {
                break;
            }
        }
        prop_assert!(cpu.memory().iter().all(|&w| w <= 0xFF));
        // 8-bit addresses cannot leave 256 words, so only HLT stops the machine
        if let Some(reason) = cpu.halt_reason() {
            prop_assert_eq!(reason, &logicpu::HaltReason::Halted);
        }
    }

    /// Every defined opcode takes exactly its documented number of pulses.
    #[test]
    fn prop_instruction_takes_documented_cycles(
        index in any::<prop::sample::Index>(),
        operand in 0u64..256,
        memory in prop::collection::vec(0u64..256, 256),
    ) {
        let codes = opcodes(Variant::Base);
        let code = codes[index.index(codes.len())];

        let mut cpu = Cpu::new(CpuConfig::base()).unwrap();
        cpu.load_image(&MemoryImage::from_words(0, &memory)).unwrap();
        cpu.load_image(&MemoryImage::from_words(0, &[code, operand])).unwrap();

        let descriptor = cpu.table().descriptor(code).unwrap().clone();
        let pulses = cpu.step_instruction();
        prop_assert_eq!(pulses as usize, descriptor.cycles, "{}", descriptor.mnemonic);
        prop_assert!(cpu.halt_reason().map_or(true, |r| r == &logicpu::HaltReason::Halted));

        // the PC moves past the operand unless the opcode loaded it
        let jumps = matches!(descriptor.mnemonic, "JMP" | "JPC" | "JPZ" | "JSR" | "RET");
        if !jumps && descriptor.mnemonic != "HLT" {
            prop_assert_eq!(cpu.registers().pc, descriptor.operand.size() as u64);
        }
    }

    /// Reset clears every register but leaves memory as it was.
    #[test]
    fn prop_reset_preserves_memory(
        memory in prop::collection::vec(0u64..256, 256),
        pulses in 0u64..500,
    ) {
        let mut cpu = Cpu::new(lenient_base()).unwrap();
        cpu.load_image(&MemoryImage::from_words(0, &memory)).unwrap();
        cpu.run_limited(pulses);
        let before = cpu.memory().to_vec();

        cpu.reset();
        prop_assert_eq!(cpu.memory(), &before[..]);
        prop_assert_eq!(cpu.microstep(), 1);
        prop_assert_eq!(cpu.registers().pc, 0);
        prop_assert_eq!(cpu.registers().sp, 0);
        prop_assert!(!cpu.is_halted());
        prop_assert_eq!(cpu.cycles(), 0);
    }

    /// Loading any value into the stack pointer keeps it inside the window.
    #[test]
    fn prop_stack_pointer_load_masks(value in 0u64..0x10000) {
        let mut cpu = Cpu::new(CpuConfig::extended()).unwrap();
        cpu.load_image(&MemoryImage::from_words(0, &[logicpu::cpu::op::LSP, value])).unwrap();
        cpu.step_instruction();
        prop_assert_eq!(cpu.registers().sp, value % 256);
    }
}
