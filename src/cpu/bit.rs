//! The CB-prefixed table: rotates/shifts, `BIT`/`RES`/`SET`, as one
//! dispatch-by-opcode-shape entry point. The CPU's CB fetch already
//! consumed its own machine cycle, so a register-only CB op finishes
//! inline at `mcycle 0` exactly like a main-table register op.

use crate::cpu::{Cpu, FLAG_C, FLAG_H, FLAG_N, FLAG_Z};
use crate::error::EmulatorError;
use crate::memory::MemoryBus;

fn rotate_shift(cpu: &mut Cpu, group: u8, v: u8) -> u8 {
    let (result, carry_out) = match group {
        0 => (v.rotate_left(1), v & 0x80 != 0), // RLC
        1 => (v.rotate_right(1), v & 0x01 != 0), // RRC
        2 => ((v << 1) | cpu.flag(FLAG_C) as u8, v & 0x80 != 0), // RL
        3 => ((v >> 1) | ((cpu.flag(FLAG_C) as u8) << 7), v & 0x01 != 0), // RR
        4 => (v << 1, v & 0x80 != 0), // SLA
        5 => ((v >> 1) | (v & 0x80), v & 0x01 != 0), // SRA
        6 => (v.rotate_left(4), false), // SWAP
        _ => (v >> 1, v & 0x01 != 0), // SRL
    };
    cpu.set_flag(FLAG_Z, result == 0);
    cpu.set_flag(FLAG_N, false);
    cpu.set_flag(FLAG_H, false);
    cpu.set_flag(FLAG_C, group != 6 && carry_out);
    result
}

/// Dispatch a CB-prefixed opcode. `mcycle` is relative the same way the main
/// table's is: 0 is the inline call sharing the CB-operand fetch cycle.
pub(crate) fn dispatch(
    cpu: &mut Cpu,
    bus: &mut MemoryBus,
    opcode: u8,
    mcycle: u8,
) -> Result<bool, EmulatorError> {
    let group = opcode >> 6;
    let bit = (opcode >> 3) & 0x07;
    let r = opcode & 0x07;

    if r != 6 {
        // Register operand: always finishes inline, no bus traffic, 8T total
        // once the CB-prefix and operand fetches are counted.
        match group {
            0 => {
                let v = rotate_shift(cpu, bit, cpu.reg8(r));
                cpu.set_reg8(r, v);
            }
            1 => {
                cpu.set_flag(FLAG_Z, cpu.reg8(r) & (1 << bit) == 0);
                cpu.set_flag(FLAG_N, false);
                cpu.set_flag(FLAG_H, true);
            }
            2 => cpu.set_reg8(r, cpu.reg8(r) & !(1 << bit)),
            _ => cpu.set_reg8(r, cpu.reg8(r) | (1 << bit)),
        }
        return Ok(true);
    }

    // (HL) operand.
    match group {
        1 => match mcycle {
            0 => Ok(false),
            _ => {
                let v = cpu.read_u8(bus, cpu.hl())?;
                cpu.set_flag(FLAG_Z, v & (1 << bit) == 0);
                cpu.set_flag(FLAG_N, false);
                cpu.set_flag(FLAG_H, true);
                Ok(true)
            }
        },
        _ => match mcycle {
            0 => Ok(false),
            1 => {
                let v = cpu.read_u8(bus, cpu.hl())?;
                cpu.scratch = match group {
                    0 => rotate_shift(cpu, bit, v),
                    2 => v & !(1 << bit),
                    _ => v | (1 << bit),
                };
                Ok(false)
            }
            _ => {
                cpu.write_u8(bus, cpu.hl(), cpu.scratch)?;
                Ok(true)
            }
        },
    }
}
