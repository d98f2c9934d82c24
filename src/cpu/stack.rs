//! `PUSH`/`POP` and their shared cycle shape.

use crate::cpu::Cpu;
use crate::error::EmulatorError;
use crate::memory::MemoryBus;

/// `PUSH rr2` — opcode mask `11 rr0 101` (rr2: 0=BC,1=DE,2=HL,3=AF), 16T.
pub(crate) fn step_push(
    cpu: &mut Cpu,
    bus: &mut MemoryBus,
    opcode: u8,
    mcycle: u8,
) -> Result<bool, EmulatorError> {
    let rp = (opcode >> 4) & 0x03;
    match mcycle {
        0 => Ok(false),
        1 => Ok(false), // internal delay before the first write
        2 => {
            let v = cpu.rp2(rp);
            cpu.sp = cpu.sp.wrapping_sub(1);
            cpu.write_u8(bus, cpu.sp, (v >> 8) as u8)?;
            Ok(false)
        }
        _ => {
            let v = cpu.rp2(rp);
            cpu.sp = cpu.sp.wrapping_sub(1);
            cpu.write_u8(bus, cpu.sp, v as u8)?;
            Ok(true)
        }
    }
}

/// `POP rr2` — opcode mask `11 rr0 001` (rr2: 0=BC,1=DE,2=HL,3=AF), 12T.
pub(crate) fn step_pop(
    cpu: &mut Cpu,
    bus: &mut MemoryBus,
    opcode: u8,
    mcycle: u8,
) -> Result<bool, EmulatorError> {
    let rp = (opcode >> 4) & 0x03;
    match mcycle {
        0 => Ok(false),
        1 => {
            cpu.scratch = cpu.read_u8(bus, cpu.sp)?;
            cpu.sp = cpu.sp.wrapping_add(1);
            Ok(false)
        }
        _ => {
            let hi = cpu.read_u8(bus, cpu.sp)?;
            cpu.sp = cpu.sp.wrapping_add(1);
            cpu.set_rp2(rp, ((hi as u16) << 8) | cpu.scratch as u16);
            Ok(true)
        }
    }
}
