//! Minimal all-RAM-backed test fixtures: a blank ROM-only cartridge and an
//! `Emulator` already seeded with `PC = 0x0100` and the boot ROM disabled,
//! so each scenario test only has to write its program bytes.
#![allow(dead_code)]

use dmg_core::cartridge::Cartridge;
use dmg_core::emulator::Emulator;

/// A 32KB ROM-only (cartridge type 0x00) cartridge with the header filled
/// in just enough to pass `Cartridge::new`'s validation.
pub fn blank_cartridge() -> Cartridge {
    let mut rom = vec![0u8; 0x8000];
    rom[0x0147] = 0x00; // ROM only
    rom[0x0148] = 0x00; // 2 banks (32KB)
    rom[0x0149] = 0x00; // no external RAM
    Cartridge::new(&rom).unwrap()
}

/// Builds an `Emulator` with `program` loaded at 0x0100 and no boot ROM, so
/// construction already leaves the CPU at the canonical post-boot state
/// with `PC = 0x0100`.
pub fn emulator_with_program(program: &[u8]) -> Emulator {
    let mut rom = vec![0u8; 0x8000];
    rom[0x0147] = 0x00;
    rom[0x0148] = 0x00;
    rom[0x0149] = 0x00;
    rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
    let cartridge = Cartridge::new(&rom).unwrap();
    Emulator::new(cartridge, None)
}

/// Runs T-cycles until the CPU reaches an instruction boundary; returns the
/// number of T-cycles the instruction took.
pub fn run_one_instruction(emu: &mut Emulator) -> u32 {
    let mut ticks = 0;
    loop {
        ticks += 1;
        if emu.cpu.step(&mut emu.bus).unwrap() {
            break;
        }
        assert!(ticks < 1000, "instruction never completed");
    }
    ticks
}
