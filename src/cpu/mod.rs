//! The Sharp SM83 instruction pipeline: fetch/decode/execute as a per-T-cycle
//! state machine (`ExecState(opcode, cycle)`-style dispatch, with
//! `reg8`/`rp` register-index helpers) driven against a concrete
//! `MemoryBus`.
//!
//! Every opcode's micro-program is driven by a single convention: the very
//! first dispatch of an opcode (`mcycle == 0`) runs *inline*, sharing the
//! fetch's own machine cycle rather than paying for one of its own — this is
//! only safe because that inline call either finishes a register-only
//! instruction outright, or (for anything that needs a further bus
//! transaction) does nothing at all. Every `mcycle >= 1` dispatch pays for
//! its own fresh machine cycle and may issue exactly one bus read or write.
//! This keeps only one component ever touching the bus in a given T-cycle.

mod alu;
mod bit;
mod branch;
mod load_store;
pub mod state;
mod stack;

use crate::error::{EmulatorError, EmulatorErrorKind};
use crate::memory::MemoryBus;

pub const FLAG_Z: u8 = 0x80;
pub const FLAG_N: u8 = 0x40;
pub const FLAG_H: u8 = 0x20;
pub const FLAG_C: u8 = 0x10;

const ILLEGAL_OPCODES: [u8; 11] = [
    0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    /// Waiting to accumulate the fetch machine cycle's 4 T-cycles.
    Fetch,
    /// Opcode byte was 0xCB; waiting on the second (operand) byte's cycle.
    FetchCbOperand,
    /// Executing the main table entry for `opcode`, at machine cycle `mcycle`.
    Main,
    /// Executing the CB-prefixed table entry for `cb_opcode`.
    Cb,
    /// Five-machine-cycle interrupt dispatch sequence.
    Interrupt,
    /// Halted: every accumulated machine cycle just re-runs the
    /// interrupt-check boundary until something wakes the CPU.
    Halted,
}

/// The Sharp SM83 register file and micro-step scheduling state. Registers
/// are public; the scheduling fields are crate-visible so the
/// instruction-category submodules can drive them.
pub struct Cpu {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
    pub ime: bool,
    pub halted: bool,
    pub stopped: bool,

    pub(crate) ime_pending_delay: u8,

    stage: Stage,
    sub_tick: u8,
    pub(crate) mcycle: u8,
    pub(crate) opcode: u8,
    pub(crate) cb_opcode: u8,
    /// PC at the start of the currently executing instruction; used as the
    /// location reported in any error raised mid-instruction.
    pub(crate) instr_pc: u16,
    /// Scratch latched address/bytes for instructions spanning multiple
    /// machine cycles (LD rr,d16; JP/CALL/RET targets; etc).
    pub(crate) addr: u16,
    pub(crate) scratch: u8,
    pub(crate) target: u16,
    pub(crate) cond_false: bool,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            sp: 0,
            pc: 0,
            ime: false,
            halted: false,
            stopped: false,
            ime_pending_delay: 0,
            stage: Stage::Fetch,
            sub_tick: 0,
            mcycle: 0,
            opcode: 0,
            cb_opcode: 0,
            instr_pc: 0,
            addr: 0,
            scratch: 0,
            target: 0,
            cond_false: false,
        }
    }

    /// The canonical post-boot register state, applied by `Emulator::new`
    /// when no boot ROM is supplied and by the bus-observed write to BOOT
    /// (0xFF50) when one is.
    pub fn set_post_boot_registers(&mut self) {
        self.a = 0x01;
        self.f = 0xB0;
        self.b = 0x00;
        self.c = 0x13;
        self.d = 0x00;
        self.e = 0xD8;
        self.h = 0x01;
        self.l = 0x4D;
        self.sp = 0xFFFE;
        self.pc = 0x0100;
    }

    // -- register pair views, little-endian low byte in C/E/L/F --

    pub fn af(&self) -> u16 {
        ((self.a as u16) << 8) | self.f as u16
    }
    pub fn set_af(&mut self, v: u16) {
        self.a = (v >> 8) as u8;
        self.f = (v as u8) & 0xF0; // low nibble of F always reads as zero
    }
    pub fn bc(&self) -> u16 {
        ((self.b as u16) << 8) | self.c as u16
    }
    pub fn set_bc(&mut self, v: u16) {
        self.b = (v >> 8) as u8;
        self.c = v as u8;
    }
    pub fn de(&self) -> u16 {
        ((self.d as u16) << 8) | self.e as u16
    }
    pub fn set_de(&mut self, v: u16) {
        self.d = (v >> 8) as u8;
        self.e = v as u8;
    }
    pub fn hl(&self) -> u16 {
        ((self.h as u16) << 8) | self.l as u16
    }
    pub fn set_hl(&mut self, v: u16) {
        self.h = (v >> 8) as u8;
        self.l = v as u8;
    }

    pub(crate) fn flag(&self, mask: u8) -> bool {
        self.f & mask != 0
    }
    pub(crate) fn set_flag(&mut self, mask: u8, value: bool) {
        if value {
            self.f |= mask;
        } else {
            self.f &= !mask;
        }
    }

    /// 8-bit register by the standard SM83 index (0=B,1=C,2=D,3=E,4=H,5=L,
    /// 7=A). Index 6 is `(HL)` and is never routed here.
    pub(crate) fn reg8(&self, index: u8) -> u8 {
        match index {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            7 => self.a,
            _ => unreachable!("reg8({index})"),
        }
    }
    pub(crate) fn set_reg8(&mut self, index: u8, value: u8) {
        match index {
            0 => self.b = value,
            1 => self.c = value,
            2 => self.d = value,
            3 => self.e = value,
            4 => self.h = value,
            5 => self.l = value,
            7 => self.a = value,
            _ => unreachable!("set_reg8({index})"),
        }
    }

    /// 16-bit register pair by index (0=BC,1=DE,2=HL,3=SP).
    pub(crate) fn rp(&self, index: u8) -> u16 {
        match index {
            0 => self.bc(),
            1 => self.de(),
            2 => self.hl(),
            3 => self.sp,
            _ => unreachable!("rp({index})"),
        }
    }
    pub(crate) fn set_rp(&mut self, index: u8, value: u16) {
        match index {
            0 => self.set_bc(value),
            1 => self.set_de(value),
            2 => self.set_hl(value),
            3 => self.sp = value,
            _ => unreachable!("set_rp({index})"),
        }
    }

    /// 16-bit register pair by index for PUSH/POP (0=BC,1=DE,2=HL,3=AF).
    pub(crate) fn rp2(&self, index: u8) -> u16 {
        match index {
            0 => self.bc(),
            1 => self.de(),
            2 => self.hl(),
            3 => self.af(),
            _ => unreachable!("rp2({index})"),
        }
    }
    pub(crate) fn set_rp2(&mut self, index: u8, value: u16) {
        match index {
            0 => self.set_bc(value),
            1 => self.set_de(value),
            2 => self.set_hl(value),
            3 => self.set_af(value),
            _ => unreachable!("set_rp2({index})"),
        }
    }

    fn read_u8(&mut self, bus: &mut MemoryBus, addr: u16) -> Result<u8, EmulatorError> {
        bus.cpu_read(addr, self.instr_pc)
    }
    fn write_u8(&mut self, bus: &mut MemoryBus, addr: u16, value: u8) -> Result<(), EmulatorError> {
        bus.cpu_write(addr, value, self.instr_pc)?;
        if bus.take_boot_just_disabled() {
            self.ime = true;
            self.ime_pending_delay = 0;
        }
        Ok(())
    }

    /// Advance exactly one T-cycle. Returns `Ok(true)` on the tick an
    /// instruction boundary is reached (a fresh instruction, interrupt
    /// dispatch, or halted wake-check just completed).
    pub fn step(&mut self, bus: &mut MemoryBus) -> Result<bool, EmulatorError> {
        self.sub_tick += 1;
        if self.sub_tick < 4 {
            return Ok(false);
        }
        self.sub_tick = 0;

        match self.stage {
            Stage::Fetch => self.do_fetch(bus),
            Stage::FetchCbOperand => self.do_fetch_cb_operand(bus),
            Stage::Main => self.do_main(bus),
            Stage::Cb => self.do_cb(bus),
            Stage::Interrupt => self.do_interrupt(bus),
            Stage::Halted => self.do_halted(bus),
        }
    }

    fn do_fetch(&mut self, bus: &mut MemoryBus) -> Result<bool, EmulatorError> {
        self.instr_pc = self.pc;
        let opcode = self.read_u8(bus, self.pc)?;
        self.pc = self.pc.wrapping_add(1);

        if ILLEGAL_OPCODES.contains(&opcode) {
            return Err(EmulatorError::at(
                EmulatorErrorKind::IllegalOpcode,
                format!("illegal opcode {opcode:#04x}"),
                self.instr_pc,
            ));
        }
        if opcode == 0xCB {
            self.stage = Stage::FetchCbOperand;
            return Ok(false);
        }

        self.opcode = opcode;
        let done = dispatch_main(self, bus, opcode, 0)?;
        if done {
            self.finish_instruction(bus);
            Ok(true)
        } else {
            self.mcycle = 1;
            self.stage = Stage::Main;
            Ok(false)
        }
    }

    fn do_fetch_cb_operand(&mut self, bus: &mut MemoryBus) -> Result<bool, EmulatorError> {
        let cb_opcode = self.read_u8(bus, self.pc)?;
        self.pc = self.pc.wrapping_add(1);
        self.cb_opcode = cb_opcode;
        let done = bit::dispatch(self, bus, cb_opcode, 0)?;
        if done {
            self.finish_instruction(bus);
            Ok(true)
        } else {
            self.mcycle = 1;
            self.stage = Stage::Cb;
            Ok(false)
        }
    }

    fn do_main(&mut self, bus: &mut MemoryBus) -> Result<bool, EmulatorError> {
        let opcode = self.opcode;
        let mcycle = self.mcycle;
        let done = dispatch_main(self, bus, opcode, mcycle)?;
        if done {
            self.finish_instruction(bus);
            Ok(true)
        } else {
            self.mcycle += 1;
            Ok(false)
        }
    }

    fn do_cb(&mut self, bus: &mut MemoryBus) -> Result<bool, EmulatorError> {
        let cb_opcode = self.cb_opcode;
        let mcycle = self.mcycle;
        let done = bit::dispatch(self, bus, cb_opcode, mcycle)?;
        if done {
            self.finish_instruction(bus);
            Ok(true)
        } else {
            self.mcycle += 1;
            Ok(false)
        }
    }

    /// HALT's continuation: every machine cycle, just re-run the boundary
    /// check until a pending interrupt appears. A cycle that stays halted
    /// is itself the completed unit of work for that tick; the cycle that
    /// wakes is not -- it falls through into the resumed fetch (or the
    /// interrupt dispatch sequence) in the same `step` loop, rather than
    /// reporting a boundary one T-cycle before the CPU has actually done
    /// anything.
    fn do_halted(&mut self, bus: &mut MemoryBus) -> Result<bool, EmulatorError> {
        if self.ime_pending_delay > 0 {
            self.ime_pending_delay -= 1;
            if self.ime_pending_delay == 0 {
                self.ime = true;
            }
        }
        if bus.interrupts.pending().is_some() {
            self.halted = false;
            self.stage = if self.ime { Stage::Interrupt } else { Stage::Fetch };
            if self.stage == Stage::Interrupt {
                self.mcycle = 0;
            }
            return Ok(false);
        }
        Ok(true)
    }

    /// Five machine-cycle (20 T-cycle) interrupt acknowledge sequence:
    /// 2 idle cycles, clear IME, push PC high then low, then read IF,
    /// select the lowest pending bit, clear it, and jump to its vector.
    fn do_interrupt(&mut self, bus: &mut MemoryBus) -> Result<bool, EmulatorError> {
        match self.mcycle {
            0 => {
                self.mcycle = 1;
                Ok(false)
            }
            1 => {
                self.ime = false;
                self.ime_pending_delay = 0;
                self.mcycle = 2;
                Ok(false)
            }
            2 => {
                self.sp = self.sp.wrapping_sub(1);
                let hi = (self.pc >> 8) as u8;
                self.write_u8(bus, self.sp, hi)?;
                self.mcycle = 3;
                Ok(false)
            }
            3 => {
                self.sp = self.sp.wrapping_sub(1);
                let lo = self.pc as u8;
                self.write_u8(bus, self.sp, lo)?;
                self.mcycle = 4;
                Ok(false)
            }
            _ => {
                let bit = bus.interrupts.pending().unwrap_or(0);
                bus.interrupts.clear(bit);
                self.pc = crate::interrupt::InterruptController::vector_for(bit);
                self.stage = Stage::Fetch;
                Ok(true)
            }
        }
    }

    /// Runs at every instruction's final step: advances the EI enable
    /// delay, and either dispatches a pending interrupt or returns to
    /// fetching, matching up with HALT's own wake-up path.
    fn finish_instruction(&mut self, bus: &mut MemoryBus) {
        if self.ime_pending_delay > 0 {
            self.ime_pending_delay -= 1;
            if self.ime_pending_delay == 0 {
                self.ime = true;
            }
        }
        if self.halted {
            self.stage = Stage::Halted;
            return;
        }
        if bus.interrupts.pending().is_some() && self.ime {
            self.stage = Stage::Interrupt;
            self.mcycle = 0;
        } else {
            self.stage = Stage::Fetch;
        }
    }
}

/// Entry point shared by the inline (mcycle 0) and deferred (mcycle >= 1)
/// calls for the 256-entry main opcode table.
fn dispatch_main(
    cpu: &mut Cpu,
    bus: &mut MemoryBus,
    opcode: u8,
    mcycle: u8,
) -> Result<bool, EmulatorError> {
    match opcode {
        0x00 => Ok(true), // NOP
        0x10 => step_stop(cpu, bus, mcycle),
        0x76 => {
            cpu.halted = true;
            Ok(true)
        }
        0xF3 => {
            cpu.ime = false;
            cpu.ime_pending_delay = 0;
            Ok(true)
        }
        0xFB => {
            cpu.ime_pending_delay = 2;
            Ok(true)
        }
        0x01 | 0x11 | 0x21 | 0x31 => load_store::step_ld_rp_d16(cpu, bus, opcode, mcycle),
        0x02 | 0x12 | 0x22 | 0x32 => load_store::step_ld_mem_rp_a(cpu, bus, opcode, mcycle),
        0x0A | 0x1A | 0x2A | 0x3A => load_store::step_ld_a_mem_rp(cpu, bus, opcode, mcycle),
        0x08 => load_store::step_ld_a16_sp(cpu, bus, mcycle),
        0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
            load_store::step_ld_r_d8(cpu, bus, opcode, mcycle)
        }
        0xE0 | 0xF0 => load_store::step_ldh_a8(cpu, bus, opcode, mcycle),
        0xE2 | 0xF2 => load_store::step_ld_c_a(cpu, bus, opcode, mcycle),
        0xEA | 0xFA => load_store::step_ld_a16_a(cpu, bus, opcode, mcycle),
        0x40..=0x7F => load_store::step_ld_r_r(cpu, bus, opcode, mcycle),
        0x03 | 0x13 | 0x23 | 0x33 => alu::step_inc_dec_rp(cpu, opcode, mcycle, true),
        0x0B | 0x1B | 0x2B | 0x3B => alu::step_inc_dec_rp(cpu, opcode, mcycle, false),
        0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
            alu::step_inc_dec_r8(cpu, bus, opcode, mcycle, true)
        }
        0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
            alu::step_inc_dec_r8(cpu, bus, opcode, mcycle, false)
        }
        0x07 => {
            alu::rlca(cpu);
            Ok(true)
        }
        0x0F => {
            alu::rrca(cpu);
            Ok(true)
        }
        0x17 => {
            alu::rla(cpu);
            Ok(true)
        }
        0x1F => {
            alu::rra(cpu);
            Ok(true)
        }
        0x27 => {
            alu::daa(cpu);
            Ok(true)
        }
        0x2F => {
            alu::cpl(cpu);
            Ok(true)
        }
        0x37 => {
            alu::scf(cpu);
            Ok(true)
        }
        0x3F => {
            alu::ccf(cpu);
            Ok(true)
        }
        0x09 | 0x19 | 0x29 | 0x39 => alu::step_add_hl_rp(cpu, opcode, mcycle),
        0xE8 => alu::step_add_sp_e(cpu, bus, mcycle),
        0xF8 => alu::step_ld_hl_sp_e(cpu, bus, mcycle),
        0xF9 => alu::step_ld_sp_hl(cpu, mcycle),
        0x80..=0xBF => alu::step_alu_a_r(cpu, bus, opcode, mcycle),
        0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
            alu::step_alu_a_d8(cpu, bus, opcode, mcycle)
        }
        0xC1 | 0xD1 | 0xE1 | 0xF1 => stack::step_pop(cpu, bus, opcode, mcycle),
        0xC5 | 0xD5 | 0xE5 | 0xF5 => stack::step_push(cpu, bus, opcode, mcycle),
        0x18 => branch::step_jr(cpu, bus, mcycle, None),
        0x20 | 0x28 | 0x30 | 0x38 => branch::step_jr(cpu, bus, mcycle, Some((opcode >> 3) & 3)),
        0xC3 => branch::step_jp(cpu, bus, mcycle, None),
        0xC2 | 0xCA | 0xD2 | 0xDA => branch::step_jp(cpu, bus, mcycle, Some((opcode >> 3) & 3)),
        0xE9 => {
            cpu.pc = cpu.hl();
            Ok(true)
        }
        0xCD => branch::step_call(cpu, bus, mcycle, None),
        0xC4 | 0xCC | 0xD4 | 0xDC => branch::step_call(cpu, bus, mcycle, Some((opcode >> 3) & 3)),
        0xC9 => branch::step_ret(cpu, bus, mcycle, None, false),
        0xD9 => branch::step_ret(cpu, bus, mcycle, None, true),
        0xC0 | 0xC8 | 0xD0 | 0xD8 => {
            branch::step_ret(cpu, bus, mcycle, Some((opcode >> 3) & 3), false)
        }
        0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
            branch::step_rst(cpu, bus, opcode, mcycle)
        }
        _ => unreachable!("opcode {opcode:#04x} not covered by the main dispatch table"),
    }
}

fn step_stop(cpu: &mut Cpu, bus: &mut MemoryBus, mcycle: u8) -> Result<bool, EmulatorError> {
    match mcycle {
        0 => Ok(false),
        _ => {
            let _padding = cpu.read_u8(bus, cpu.pc)?;
            cpu.pc = cpu.pc.wrapping_add(1);
            cpu.stopped = true;
            Ok(true)
        }
    }
}

pub(crate) fn cond_holds(cpu: &Cpu, cc: u8) -> bool {
    match cc {
        0 => !cpu.flag(FLAG_Z),
        1 => cpu.flag(FLAG_Z),
        2 => !cpu.flag(FLAG_C),
        3 => cpu.flag(FLAG_C),
        _ => unreachable!("condition code {cc}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Cartridge;

    fn test_bus_with_program(program: &[u8]) -> MemoryBus {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0147] = 0x00;
        rom[0x0148] = 0x00;
        rom[0x0149] = 0x00;
        rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
        MemoryBus::new(Cartridge::new(&rom).unwrap(), None)
    }

    fn run_one_instruction(cpu: &mut Cpu, bus: &mut MemoryBus) -> u32 {
        let mut ticks = 0;
        loop {
            ticks += 1;
            if cpu.step(bus).unwrap() {
                break;
            }
            assert!(ticks < 1000, "instruction never completed");
        }
        ticks
    }

    #[test]
    fn add_sets_flags_and_takes_one_machine_cycle() {
        let mut bus = test_bus_with_program(&[0x80]); // ADD A,B
        let mut cpu = Cpu::new();
        cpu.pc = 0x0100;
        cpu.a = 0x3A;
        cpu.b = 0xC6;
        let ticks = run_one_instruction(&mut cpu, &mut bus);
        assert_eq!(ticks, 4);
        assert_eq!(cpu.a, 0x00);
        assert!(cpu.flag(FLAG_Z));
        assert!(!cpu.flag(FLAG_N));
        assert!(cpu.flag(FLAG_H));
        assert!(cpu.flag(FLAG_C));
    }

    #[test]
    fn jr_not_taken_is_eight_ticks() {
        let mut bus = test_bus_with_program(&[0x28, 0x05]); // JR Z,+5
        let mut cpu = Cpu::new();
        cpu.pc = 0x0100;
        cpu.set_flag(FLAG_Z, false);
        let ticks = run_one_instruction(&mut cpu, &mut bus);
        assert_eq!(ticks, 8);
        assert_eq!(cpu.pc, 0x0102);
    }

    #[test]
    fn pop_af_clears_low_nibble() {
        let mut bus = test_bus_with_program(&[0xF1]); // POP AF
        let mut cpu = Cpu::new();
        cpu.pc = 0x0100;
        cpu.sp = 0xFFFC;
        bus.write(0xFFFC, 0xFF);
        bus.write(0xFFFD, 0x12);
        run_one_instruction(&mut cpu, &mut bus);
        assert_eq!(cpu.f & 0x0F, 0);
        assert_eq!(cpu.a, 0x12);
    }

    #[test]
    fn ei_takes_effect_after_the_following_instruction() {
        // DI; EI; NOP; DI -- EI's effect is delayed by one instruction, so
        // IME becomes set once the NOP's boundary runs, and the trailing DI
        // clears it again immediately.
        let mut bus = test_bus_with_program(&[0xF3, 0xFB, 0x00, 0xF3]);
        let mut cpu = Cpu::new();
        cpu.pc = 0x0100;
        run_one_instruction(&mut cpu, &mut bus); // DI
        run_one_instruction(&mut cpu, &mut bus); // EI
        assert!(!cpu.ime);
        run_one_instruction(&mut cpu, &mut bus); // NOP; EI's delay elapses here
        assert!(cpu.ime);
        run_one_instruction(&mut cpu, &mut bus); // DI clears it again
        assert!(!cpu.ime);
    }

    #[test]
    fn halt_wakes_without_pushing_pc_when_ime_clear() {
        let mut bus = test_bus_with_program(&[0x76, 0x00]); // HALT; NOP
        let mut cpu = Cpu::new();
        cpu.pc = 0x0100;
        cpu.ime = false;
        bus.interrupts.ie = 0x01;
        run_one_instruction(&mut cpu, &mut bus); // HALT
        assert!(cpu.halted);
        let pc_before = cpu.pc;
        run_one_instruction(&mut cpu, &mut bus); // still halted, no pending IF
        assert!(cpu.halted);
        assert_eq!(cpu.pc, pc_before);
        bus.interrupts.request(crate::interrupt::VBLANK);
        run_one_instruction(&mut cpu, &mut bus); // wakes, resumes at NOP
        assert!(!cpu.halted);
        assert_eq!(cpu.pc, 0x0102);
        assert_eq!(cpu.sp, 0); // nothing pushed
    }
}
