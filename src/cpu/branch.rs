//! Jumps, calls, returns, and `RST`, each keyed to the SM83's condition
//! codes. A not-taken conditional instruction returns early rather than
//! padding through the taken path's cycle count: it still consumes its
//! fetch and operand cycles, but skips the jump/push/pop steps.

use crate::cpu::{Cpu, cond_holds};
use crate::error::EmulatorError;
use crate::memory::MemoryBus;

/// `JR e` / `JR cc,e` — unconditional 12T; conditional 12T taken, 8T not.
pub(crate) fn step_jr(
    cpu: &mut Cpu,
    bus: &mut MemoryBus,
    mcycle: u8,
    cc: Option<u8>,
) -> Result<bool, EmulatorError> {
    match mcycle {
        0 => Ok(false),
        1 => {
            let e = cpu.read_u8(bus, cpu.pc)?;
            cpu.pc = cpu.pc.wrapping_add(1);
            cpu.scratch = e;
            let taken = cc.map(|c| cond_holds(cpu, c)).unwrap_or(true);
            Ok(!taken)
        }
        _ => {
            let e = cpu.scratch as i8 as i16;
            cpu.pc = (cpu.pc as i16).wrapping_add(e) as u16;
            Ok(true)
        }
    }
}

fn latch_a16(cpu: &mut Cpu, mcycle: u8, bus: &mut MemoryBus) -> Result<bool, EmulatorError> {
    match mcycle {
        1 => {
            cpu.scratch = cpu.read_u8(bus, cpu.pc)?;
            cpu.pc = cpu.pc.wrapping_add(1);
            Ok(false)
        }
        _ => {
            let hi = cpu.read_u8(bus, cpu.pc)?;
            cpu.pc = cpu.pc.wrapping_add(1);
            cpu.target = ((hi as u16) << 8) | cpu.scratch as u16;
            Ok(false)
        }
    }
}

/// `JP a16` / `JP cc,a16` — unconditional 16T; conditional 16T taken, 12T not.
pub(crate) fn step_jp(
    cpu: &mut Cpu,
    bus: &mut MemoryBus,
    mcycle: u8,
    cc: Option<u8>,
) -> Result<bool, EmulatorError> {
    match mcycle {
        0 => Ok(false),
        1 => latch_a16(cpu, mcycle, bus),
        2 => {
            latch_a16(cpu, mcycle, bus)?;
            let taken = cc.map(|c| cond_holds(cpu, c)).unwrap_or(true);
            Ok(!taken)
        }
        _ => {
            cpu.pc = cpu.target;
            Ok(true)
        }
    }
}

/// `CALL a16` / `CALL cc,a16` — unconditional 24T; conditional 24T taken,
/// 12T not.
pub(crate) fn step_call(
    cpu: &mut Cpu,
    bus: &mut MemoryBus,
    mcycle: u8,
    cc: Option<u8>,
) -> Result<bool, EmulatorError> {
    match mcycle {
        0 => Ok(false),
        1 => latch_a16(cpu, mcycle, bus),
        2 => {
            latch_a16(cpu, mcycle, bus)?;
            let taken = cc.map(|c| cond_holds(cpu, c)).unwrap_or(true);
            Ok(!taken)
        }
        3 => Ok(false), // internal delay before the push
        4 => {
            cpu.sp = cpu.sp.wrapping_sub(1);
            let hi = (cpu.pc >> 8) as u8;
            cpu.write_u8(bus, cpu.sp, hi)?;
            Ok(false)
        }
        _ => {
            cpu.sp = cpu.sp.wrapping_sub(1);
            let lo = cpu.pc as u8;
            cpu.write_u8(bus, cpu.sp, lo)?;
            cpu.pc = cpu.target;
            Ok(true)
        }
    }
}

/// `RET` / `RET cc` / `RETI` — unconditional (and `RETI`) 16T; conditional
/// 20T taken, 8T not. `reti` schedules IME the same way `EI` does, through
/// the CPU's existing `ime_pending_delay` counter.
pub(crate) fn step_ret(
    cpu: &mut Cpu,
    bus: &mut MemoryBus,
    mcycle: u8,
    cc: Option<u8>,
    reti: bool,
) -> Result<bool, EmulatorError> {
    let first_pop_mcycle = if cc.is_some() { 2 } else { 1 };
    match mcycle {
        0 => Ok(false),
        1 if cc.is_some() => {
            let taken = cond_holds(cpu, cc.unwrap());
            Ok(!taken)
        }
        m if m == first_pop_mcycle => {
            cpu.scratch = cpu.read_u8(bus, cpu.sp)?;
            cpu.sp = cpu.sp.wrapping_add(1);
            Ok(false)
        }
        m if m == first_pop_mcycle + 1 => {
            let hi = cpu.read_u8(bus, cpu.sp)?;
            cpu.sp = cpu.sp.wrapping_add(1);
            cpu.target = ((hi as u16) << 8) | cpu.scratch as u16;
            Ok(false)
        }
        _ => {
            cpu.pc = cpu.target;
            if reti {
                cpu.ime_pending_delay = 2;
            }
            Ok(true)
        }
    }
}

/// `RST n` — always 16T: fetch, internal delay, push high, push low.
pub(crate) fn step_rst(
    cpu: &mut Cpu,
    bus: &mut MemoryBus,
    opcode: u8,
    mcycle: u8,
) -> Result<bool, EmulatorError> {
    match mcycle {
        0 => Ok(false),
        1 => Ok(false),
        2 => {
            cpu.sp = cpu.sp.wrapping_sub(1);
            let hi = (cpu.pc >> 8) as u8;
            cpu.write_u8(bus, cpu.sp, hi)?;
            Ok(false)
        }
        _ => {
            cpu.sp = cpu.sp.wrapping_sub(1);
            let lo = cpu.pc as u8;
            cpu.write_u8(bus, cpu.sp, lo)?;
            cpu.pc = (opcode & 0x38) as u16;
            Ok(true)
        }
    }
}
