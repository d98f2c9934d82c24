//! 8/16-bit arithmetic, rotates, and the `DAA`/`CPL`/`SCF`/`CCF` miscellany.
//! Shared `do_add`/`do_sub`/`perform_alu_op` helpers update the SM83's
//! four-flag register; the micro-step `mcycle` is threaded through each
//! entry point rather than a bus generic.

use crate::cpu::{Cpu, FLAG_C, FLAG_H, FLAG_N, FLAG_Z};
use crate::error::EmulatorError;
use crate::memory::MemoryBus;

fn do_add(cpu: &mut Cpu, val: u8, carry_in: bool) {
    let a = cpu.a;
    let c = if carry_in && cpu.flag(FLAG_C) { 1u8 } else { 0 };
    let (r1, o1) = a.overflowing_add(val);
    let (result, o2) = r1.overflowing_add(c);
    cpu.a = result;
    cpu.set_flag(FLAG_Z, result == 0);
    cpu.set_flag(FLAG_N, false);
    cpu.set_flag(FLAG_H, (a & 0xF) + (val & 0xF) + c > 0xF);
    cpu.set_flag(FLAG_C, o1 || o2);
}

fn do_sub(cpu: &mut Cpu, val: u8, carry_in: bool, store: bool) {
    let a = cpu.a;
    let c = if carry_in && cpu.flag(FLAG_C) { 1u8 } else { 0 };
    let full = a as i16 - val as i16 - c as i16;
    let result = full as u8;
    cpu.set_flag(FLAG_Z, result == 0);
    cpu.set_flag(FLAG_N, true);
    cpu.set_flag(FLAG_H, (a & 0xF) < (val & 0xF) + c);
    cpu.set_flag(FLAG_C, full < 0);
    if store {
        cpu.a = result;
    }
}

fn perform_alu_op(cpu: &mut Cpu, op: u8, val: u8) {
    match op {
        0 => do_add(cpu, val, false),
        1 => do_add(cpu, val, true),
        2 => do_sub(cpu, val, false, true),
        3 => do_sub(cpu, val, true, true),
        4 => {
            cpu.a &= val;
            cpu.f = if cpu.a == 0 { FLAG_Z } else { 0 } | FLAG_H;
        }
        5 => {
            cpu.a ^= val;
            cpu.f = if cpu.a == 0 { FLAG_Z } else { 0 };
        }
        6 => {
            cpu.a |= val;
            cpu.f = if cpu.a == 0 { FLAG_Z } else { 0 };
        }
        7 => do_sub(cpu, val, false, false),
        _ => unreachable!("alu op {op}"),
    }
}

/// ALU A,r8 (including `(HL)`) — opcode mask `10 ooo rrr`. 4T for a plain
/// register, 8T for `(HL)`.
pub(crate) fn step_alu_a_r(
    cpu: &mut Cpu,
    bus: &mut MemoryBus,
    opcode: u8,
    mcycle: u8,
) -> Result<bool, EmulatorError> {
    let op = (opcode >> 3) & 0x07;
    let r = opcode & 0x07;
    if r == 6 {
        match mcycle {
            0 => Ok(false),
            _ => {
                let val = cpu.read_u8(bus, cpu.hl())?;
                perform_alu_op(cpu, op, val);
                Ok(true)
            }
        }
    } else {
        perform_alu_op(cpu, op, cpu.reg8(r));
        Ok(true)
    }
}

/// ALU A,d8 — opcode mask `11 ooo 110`, always 8T.
pub(crate) fn step_alu_a_d8(
    cpu: &mut Cpu,
    bus: &mut MemoryBus,
    opcode: u8,
    mcycle: u8,
) -> Result<bool, EmulatorError> {
    let op = (opcode >> 3) & 0x07;
    match mcycle {
        0 => Ok(false),
        _ => {
            let val = cpu.read_u8(bus, cpu.pc)?;
            cpu.pc = cpu.pc.wrapping_add(1);
            perform_alu_op(cpu, op, val);
            Ok(true)
        }
    }
}

/// INC/DEC rr — register pair only, no flags, 8T.
pub(crate) fn step_inc_dec_rp(
    cpu: &mut Cpu,
    opcode: u8,
    mcycle: u8,
    inc: bool,
) -> Result<bool, EmulatorError> {
    let rp = (opcode >> 4) & 0x03;
    match mcycle {
        0 => Ok(false),
        _ => {
            let v = cpu.rp(rp);
            cpu.set_rp(rp, if inc { v.wrapping_add(1) } else { v.wrapping_sub(1) });
            Ok(true)
        }
    }
}

fn inc_dec_flags(cpu: &mut Cpu, old: u8, inc: bool) -> u8 {
    let new = if inc { old.wrapping_add(1) } else { old.wrapping_sub(1) };
    cpu.set_flag(FLAG_Z, new == 0);
    cpu.set_flag(FLAG_N, !inc);
    if inc {
        cpu.set_flag(FLAG_H, (old & 0xF) + 1 > 0xF);
    } else {
        cpu.set_flag(FLAG_H, old & 0xF == 0);
    }
    new
}

/// INC/DEC r8 — opcode mask `00 rrr 10i`. 4T for a register, 12T for `(HL)`.
pub(crate) fn step_inc_dec_r8(
    cpu: &mut Cpu,
    bus: &mut MemoryBus,
    opcode: u8,
    mcycle: u8,
    inc: bool,
) -> Result<bool, EmulatorError> {
    let r = (opcode >> 3) & 0x07;
    if r == 6 {
        match mcycle {
            0 => Ok(false),
            1 => {
                let old = cpu.read_u8(bus, cpu.hl())?;
                cpu.scratch = inc_dec_flags(cpu, old, inc);
                Ok(false)
            }
            _ => {
                cpu.write_u8(bus, cpu.hl(), cpu.scratch)?;
                Ok(true)
            }
        }
    } else {
        let old = cpu.reg8(r);
        let new = inc_dec_flags(cpu, old, inc);
        cpu.set_reg8(r, new);
        Ok(true)
    }
}

/// ADD HL,rr — 8T, affects N/H/C but not Z.
pub(crate) fn step_add_hl_rp(cpu: &mut Cpu, opcode: u8, mcycle: u8) -> Result<bool, EmulatorError> {
    let rp = (opcode >> 4) & 0x03;
    match mcycle {
        0 => Ok(false),
        _ => {
            let hl = cpu.hl();
            let rhs = cpu.rp(rp);
            let (result, carry) = hl.overflowing_add(rhs);
            cpu.set_flag(FLAG_N, false);
            cpu.set_flag(FLAG_H, (hl & 0x0FFF) + (rhs & 0x0FFF) > 0x0FFF);
            cpu.set_flag(FLAG_C, carry);
            cpu.set_hl(result);
            Ok(true)
        }
    }
}

/// Shared low-byte-only flag computation for `ADD SP,e8` and `LD HL,SP+e8`:
/// flags are computed on the unsigned low byte, not the sign-extended sum.
fn add_sp_signed(cpu: &mut Cpu, e: u8) -> u16 {
    let sp = cpu.sp;
    let e16 = e as i8 as i16 as u16;
    let result = sp.wrapping_add(e16);
    cpu.set_flag(FLAG_Z, false);
    cpu.set_flag(FLAG_N, false);
    cpu.set_flag(FLAG_H, (sp & 0x0F) + (e as u16 & 0x0F) > 0x0F);
    cpu.set_flag(FLAG_C, (sp & 0xFF) + (e as u16 & 0xFF) > 0xFF);
    result
}

/// ADD SP,e8 — 16T.
pub(crate) fn step_add_sp_e(
    cpu: &mut Cpu,
    bus: &mut MemoryBus,
    mcycle: u8,
) -> Result<bool, EmulatorError> {
    match mcycle {
        0 => Ok(false),
        1 => {
            let e = cpu.read_u8(bus, cpu.pc)?;
            cpu.pc = cpu.pc.wrapping_add(1);
            cpu.target = add_sp_signed(cpu, e);
            Ok(false)
        }
        2 => Ok(false),
        _ => {
            cpu.sp = cpu.target;
            Ok(true)
        }
    }
}

/// LD HL,SP+e8 — 12T.
pub(crate) fn step_ld_hl_sp_e(
    cpu: &mut Cpu,
    bus: &mut MemoryBus,
    mcycle: u8,
) -> Result<bool, EmulatorError> {
    match mcycle {
        0 => Ok(false),
        1 => {
            let e = cpu.read_u8(bus, cpu.pc)?;
            cpu.pc = cpu.pc.wrapping_add(1);
            let result = add_sp_signed(cpu, e);
            cpu.set_hl(result);
            Ok(false)
        }
        _ => Ok(true),
    }
}

/// LD SP,HL — 8T, register-only.
pub(crate) fn step_ld_sp_hl(cpu: &mut Cpu, mcycle: u8) -> Result<bool, EmulatorError> {
    match mcycle {
        0 => Ok(false),
        _ => {
            cpu.sp = cpu.hl();
            Ok(true)
        }
    }
}

pub(crate) fn rlca(cpu: &mut Cpu) {
    let carry = cpu.a & 0x80 != 0;
    cpu.a = cpu.a.rotate_left(1);
    cpu.f = if carry { FLAG_C } else { 0 };
}

pub(crate) fn rrca(cpu: &mut Cpu) {
    let carry = cpu.a & 0x01 != 0;
    cpu.a = cpu.a.rotate_right(1);
    cpu.f = if carry { FLAG_C } else { 0 };
}

pub(crate) fn rla(cpu: &mut Cpu) {
    let carry_in = cpu.flag(FLAG_C);
    let carry_out = cpu.a & 0x80 != 0;
    cpu.a = (cpu.a << 1) | (carry_in as u8);
    cpu.f = if carry_out { FLAG_C } else { 0 };
}

pub(crate) fn rra(cpu: &mut Cpu) {
    let carry_in = cpu.flag(FLAG_C);
    let carry_out = cpu.a & 0x01 != 0;
    cpu.a = (cpu.a >> 1) | ((carry_in as u8) << 7);
    cpu.f = if carry_out { FLAG_C } else { 0 };
}

/// DAA — re-bias `A` into valid BCD using the flags left by the preceding
/// add/subtract. `H` is unconditionally cleared at exit.
pub(crate) fn daa(cpu: &mut Cpu) {
    let mut a = cpu.a;
    let mut carry = cpu.flag(FLAG_C);
    if !cpu.flag(FLAG_N) {
        if carry || a > 0x99 {
            a = a.wrapping_add(0x60);
            carry = true;
        }
        if cpu.flag(FLAG_H) || (a & 0x0F) > 0x09 {
            a = a.wrapping_add(0x06);
        }
    } else {
        if carry {
            a = a.wrapping_sub(0x60);
        }
        if cpu.flag(FLAG_H) {
            a = a.wrapping_sub(0x06);
        }
    }
    cpu.a = a;
    cpu.set_flag(FLAG_Z, a == 0);
    cpu.set_flag(FLAG_H, false);
    cpu.set_flag(FLAG_C, carry);
}

pub(crate) fn cpl(cpu: &mut Cpu) {
    cpu.a = !cpu.a;
    cpu.set_flag(FLAG_N, true);
    cpu.set_flag(FLAG_H, true);
}

pub(crate) fn scf(cpu: &mut Cpu) {
    cpu.set_flag(FLAG_N, false);
    cpu.set_flag(FLAG_H, false);
    cpu.set_flag(FLAG_C, true);
}

pub(crate) fn ccf(cpu: &mut Cpu) {
    let carry = cpu.flag(FLAG_C);
    cpu.set_flag(FLAG_N, false);
    cpu.set_flag(FLAG_H, false);
    cpu.set_flag(FLAG_C, !carry);
}
