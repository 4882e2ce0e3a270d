use crate::clock::Clock;
use crate::error::{EmuError, Result};
use crate::mmu::Mmu;
use crate::opcodes::{self, AluOp, Cond, Indirect, Instr, Operand, R8, R16, R16Stack, ShiftOp};
use crate::registers::{FLAG_C, FLAG_H, FLAG_N, FLAG_Z, Flag, Registers};

#[cfg(feature = "cpu-trace")]
macro_rules! cpu_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*);
    };
}
#[cfg(not(feature = "cpu-trace"))]
macro_rules! cpu_trace {
    ($($arg:tt)*) => {};
}

// Interrupt vectors (gbdev.io/pandocs/Interrupts.html)
const INTERRUPT_VBLANK: u16 = 0x40;
const INTERRUPT_STAT: u16 = 0x48;
const INTERRUPT_TIMER: u16 = 0x50;
const INTERRUPT_SERIAL: u16 = 0x58;
const INTERRUPT_JOYPAD: u16 = 0x60;

/// Machine cycles spent dispatching an interrupt.
const INTERRUPT_CYCLES: u32 = 5;
/// Machine cycles a halted CPU idles per step.
const HALT_IDLE_CYCLES: u32 = 1;

pub struct Cpu {
    pub regs: Registers,
    pub clock: Clock,
    halted: bool,
    /// Address execution resumes from when HALT ends.
    halt_pc: Option<u16>,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            regs: Registers::post_boot(false),
            clock: Clock::new(),
            halted: false,
            halt_pc: None,
        }
    }

    /// Return to the state the boot ROM leaves behind.
    pub fn reset(&mut self, cgb: bool) {
        self.regs = Registers::post_boot(cgb);
        self.clock.reset();
        self.exit_halt();
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    fn enter_halt(&mut self, next_pc: u16) {
        self.halted = true;
        self.halt_pc = Some(next_pc);
    }

    /// Drop any pending HALT, e.g. when a saved state replaces the registers.
    pub(crate) fn exit_halt(&mut self) {
        self.halted = false;
        self.halt_pc = None;
    }

    fn next_interrupt(pending: u8) -> (u8, u16) {
        if pending & 0x01 != 0 {
            (0x01, INTERRUPT_VBLANK)
        } else if pending & 0x02 != 0 {
            (0x02, INTERRUPT_STAT)
        } else if pending & 0x04 != 0 {
            (0x04, INTERRUPT_TIMER)
        } else if pending & 0x08 != 0 {
            (0x08, INTERRUPT_SERIAL)
        } else {
            (0x10, INTERRUPT_JOYPAD)
        }
    }

    fn fetch8(&mut self, mmu: &Mmu) -> u8 {
        let val = mmu.read_byte(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        val
    }

    fn fetch16(&mut self, mmu: &Mmu) -> u16 {
        let lo = self.fetch8(mmu) as u16;
        let hi = self.fetch8(mmu) as u16;
        (hi << 8) | lo
    }

    fn push_stack(&mut self, mmu: &mut Mmu, val: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mmu.write_byte(self.regs.sp, (val >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        mmu.write_byte(self.regs.sp, val as u8);
    }

    fn pop_stack(&mut self, mmu: &Mmu) -> u16 {
        let lo = mmu.read_byte(self.regs.sp) as u16;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = mmu.read_byte(self.regs.sp) as u16;
        self.regs.sp = self.regs.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    fn read_r8(&self, mmu: &Mmu, reg: R8) -> u8 {
        match reg {
            R8::B => self.regs.b,
            R8::C => self.regs.c,
            R8::D => self.regs.d,
            R8::E => self.regs.e,
            R8::H => self.regs.h,
            R8::L => self.regs.l,
            R8::HlInd => mmu.read_byte(self.regs.hl()),
            R8::A => self.regs.a,
        }
    }

    fn write_r8(&mut self, mmu: &mut Mmu, reg: R8, val: u8) {
        match reg {
            R8::B => self.regs.b = val,
            R8::C => self.regs.c = val,
            R8::D => self.regs.d = val,
            R8::E => self.regs.e = val,
            R8::H => self.regs.h = val,
            R8::L => self.regs.l = val,
            R8::HlInd => mmu.write_byte(self.regs.hl(), val),
            R8::A => self.regs.a = val,
        }
    }

    fn read_r16(&self, reg: R16) -> u16 {
        match reg {
            R16::Bc => self.regs.bc(),
            R16::De => self.regs.de(),
            R16::Hl => self.regs.hl(),
            R16::Sp => self.regs.sp,
        }
    }

    fn write_r16(&mut self, reg: R16, val: u16) {
        match reg {
            R16::Bc => self.regs.set_bc(val),
            R16::De => self.regs.set_de(val),
            R16::Hl => self.regs.set_hl(val),
            R16::Sp => self.regs.sp = val,
        }
    }

    /// Resolve an indirect operand, applying the HL post-increment or
    /// post-decrement.
    fn indirect_addr(&mut self, ind: Indirect) -> u16 {
        match ind {
            Indirect::Bc => self.regs.bc(),
            Indirect::De => self.regs.de(),
            Indirect::HlInc => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_add(1));
                hl
            }
            Indirect::HlDec => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_sub(1));
                hl
            }
        }
    }

    fn condition(&self, cond: Option<Cond>) -> bool {
        match cond {
            None => true,
            Some(Cond::Nz) => !self.regs.flag(Flag::Z),
            Some(Cond::Z) => self.regs.flag(Flag::Z),
            Some(Cond::Nc) => !self.regs.flag(Flag::C),
            Some(Cond::C) => self.regs.flag(Flag::C),
        }
    }

    fn service_interrupt(&mut self, mmu: &mut Mmu, pending: u8) {
        let (bit, vector) = Self::next_interrupt(pending);
        let return_pc = self.halt_pc.unwrap_or(self.regs.pc);
        self.exit_halt();
        self.regs.ime = false;
        mmu.acknowledge_interrupt(bit);
        self.push_stack(mmu, return_pc);
        self.regs.pc = vector;
        self.clock.add(INTERRUPT_CYCLES);
        cpu_trace!("Interrupt {:#04X} -> {:04X}", bit, vector);
    }

    /// Execute one instruction (or service one interrupt, or idle one cycle
    /// while halted) and return the machine cycles it took.
    pub fn step(&mut self, mmu: &mut Mmu) -> Result<u32> {
        let pending = mmu.pending_interrupts();
        if pending != 0 && self.regs.ime {
            self.service_interrupt(mmu, pending);
            return Ok(self.clock.accept());
        }
        if pending != 0 && self.halted {
            self.exit_halt();
        }
        if self.halted {
            self.clock.add(HALT_IDLE_CYCLES);
            return Ok(self.clock.accept());
        }

        let pc = self.regs.pc;
        let opcode = self.fetch8(mmu);
        let Some(mut op) = opcodes::unprefixed()[opcode as usize] else {
            self.clock.reject();
            return Err(EmuError::UnsupportedOpcode { opcode, pc });
        };
        if op.instr == Instr::Prefix {
            let cb = self.fetch8(mmu);
            op = opcodes::cb_prefixed()[cb as usize];
        }
        let operand = match op.operand {
            Operand::None => 0,
            Operand::U8 => self.fetch8(mmu) as u16,
            Operand::U16 => self.fetch16(mmu),
        };
        cpu_trace!(
            "{:04X}: {:<16} {}",
            pc,
            opcodes::disassemble(&op, operand),
            self.regs.debug_state()
        );

        let taken = self.execute(mmu, op.instr, operand);
        let cycles = if taken { op.taken_cycles } else { op.cycles };
        self.clock.add(cycles as u32);
        Ok(self.clock.accept())
    }

    /// Apply an instruction's effect. Returns whether a conditional branch was
    /// taken.
    fn execute(&mut self, mmu: &mut Mmu, instr: Instr, operand: u16) -> bool {
        match instr {
            // STOP's padding byte was already consumed as its operand.
            Instr::Nop | Instr::Stop | Instr::Prefix => {}
            Instr::Halt => self.enter_halt(self.regs.pc),
            Instr::Di => self.regs.ime = false,
            Instr::Ei => self.regs.ime = true,

            Instr::Ld(dst, src) => {
                let val = self.read_r8(mmu, src);
                self.write_r8(mmu, dst, val);
            }
            Instr::LdImm(dst) => self.write_r8(mmu, dst, operand as u8),
            Instr::LdR16Imm(dst) => self.write_r16(dst, operand),
            Instr::StoreA(ind) => {
                let addr = self.indirect_addr(ind);
                mmu.write_byte(addr, self.regs.a);
            }
            Instr::LoadA(ind) => {
                let addr = self.indirect_addr(ind);
                self.regs.a = mmu.read_byte(addr);
            }
            Instr::StoreAAbs => mmu.write_byte(operand, self.regs.a),
            Instr::LoadAAbs => self.regs.a = mmu.read_byte(operand),
            Instr::StoreHigh => mmu.write_byte(0xFF00 | operand, self.regs.a),
            Instr::LoadHigh => self.regs.a = mmu.read_byte(0xFF00 | operand),
            Instr::StoreHighC => mmu.write_byte(0xFF00 | self.regs.c as u16, self.regs.a),
            Instr::LoadHighC => self.regs.a = mmu.read_byte(0xFF00 | self.regs.c as u16),
            Instr::StoreSp => mmu.write_word(operand, self.regs.sp),
            Instr::LdSpHl => self.regs.sp = self.regs.hl(),
            Instr::LdHlSpOffset => {
                let res = self.sp_offset(operand as u8);
                self.regs.set_hl(res);
            }
            Instr::AddSpOffset => self.regs.sp = self.sp_offset(operand as u8),

            Instr::Inc(reg) => {
                let val = self.read_r8(mmu, reg);
                let res = val.wrapping_add(1);
                self.write_r8(mmu, reg, res);
                self.regs.set_f(
                    (self.regs.f() & FLAG_C)
                        | if res == 0 { FLAG_Z } else { 0 }
                        | if val & 0x0F == 0x0F { FLAG_H } else { 0 },
                );
            }
            Instr::Dec(reg) => {
                let val = self.read_r8(mmu, reg);
                let res = val.wrapping_sub(1);
                self.write_r8(mmu, reg, res);
                self.regs.set_f(
                    (self.regs.f() & FLAG_C)
                        | FLAG_N
                        | if res == 0 { FLAG_Z } else { 0 }
                        | if val & 0x0F == 0 { FLAG_H } else { 0 },
                );
            }
            Instr::Inc16(reg) => {
                let val = self.read_r16(reg).wrapping_add(1);
                self.write_r16(reg, val);
            }
            Instr::Dec16(reg) => {
                let val = self.read_r16(reg).wrapping_sub(1);
                self.write_r16(reg, val);
            }
            Instr::AddHl(reg) => {
                let hl = self.regs.hl();
                let val = self.read_r16(reg);
                self.regs.set_f(
                    (self.regs.f() & FLAG_Z)
                        | if (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF {
                            FLAG_H
                        } else {
                            0
                        }
                        | if hl as u32 + val as u32 > 0xFFFF {
                            FLAG_C
                        } else {
                            0
                        },
                );
                self.regs.set_hl(hl.wrapping_add(val));
            }
            Instr::Alu(op, reg) => {
                let val = self.read_r8(mmu, reg);
                self.alu(op, val);
            }
            Instr::AluImm(op) => self.alu(op, operand as u8),

            Instr::Rlca => {
                let a = self.regs.a;
                self.regs.a = a.rotate_left(1);
                self.regs.set_f(if a & 0x80 != 0 { FLAG_C } else { 0 });
            }
            Instr::Rrca => {
                let a = self.regs.a;
                self.regs.a = a.rotate_right(1);
                self.regs.set_f(if a & 0x01 != 0 { FLAG_C } else { 0 });
            }
            Instr::Rla => {
                let a = self.regs.a;
                self.regs.a = (a << 1) | self.regs.flag(Flag::C) as u8;
                self.regs.set_f(if a & 0x80 != 0 { FLAG_C } else { 0 });
            }
            Instr::Rra => {
                let a = self.regs.a;
                self.regs.a = (a >> 1) | ((self.regs.flag(Flag::C) as u8) << 7);
                self.regs.set_f(if a & 0x01 != 0 { FLAG_C } else { 0 });
            }
            Instr::Daa => self.daa(),
            Instr::Cpl => {
                self.regs.a = !self.regs.a;
                self.regs.set_f(self.regs.f() | FLAG_N | FLAG_H);
            }
            Instr::Scf => self.regs.set_f((self.regs.f() & FLAG_Z) | FLAG_C),
            Instr::Ccf => self
                .regs
                .set_f((self.regs.f() & FLAG_Z) | ((self.regs.f() & FLAG_C) ^ FLAG_C)),

            Instr::Jr(cond) => {
                if self.condition(cond) {
                    let offset = operand as u8 as i8;
                    self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
                    return true;
                }
            }
            Instr::Jp(cond) => {
                if self.condition(cond) {
                    self.regs.pc = operand;
                    return true;
                }
            }
            Instr::JpHl => self.regs.pc = self.regs.hl(),
            Instr::Call(cond) => {
                if self.condition(cond) {
                    self.push_stack(mmu, self.regs.pc);
                    self.regs.pc = operand;
                    return true;
                }
            }
            Instr::Ret(cond) => {
                if self.condition(cond) {
                    self.regs.pc = self.pop_stack(mmu);
                    return true;
                }
            }
            Instr::Reti => {
                self.regs.pc = self.pop_stack(mmu);
                self.regs.ime = true;
            }
            Instr::Rst(vector) => {
                self.push_stack(mmu, self.regs.pc);
                self.regs.pc = vector;
            }
            Instr::Push(reg) => {
                let val = match reg {
                    R16Stack::Bc => self.regs.bc(),
                    R16Stack::De => self.regs.de(),
                    R16Stack::Hl => self.regs.hl(),
                    R16Stack::Af => self.regs.af(),
                };
                self.push_stack(mmu, val);
            }
            Instr::Pop(reg) => {
                let val = self.pop_stack(mmu);
                match reg {
                    R16Stack::Bc => self.regs.set_bc(val),
                    R16Stack::De => self.regs.set_de(val),
                    R16Stack::Hl => self.regs.set_hl(val),
                    R16Stack::Af => self.regs.set_af(val),
                }
            }

            Instr::Shift(op, reg) => {
                let val = self.read_r8(mmu, reg);
                let res = self.shift(op, val);
                self.write_r8(mmu, reg, res);
            }
            Instr::Bit(bit, reg) => {
                let val = self.read_r8(mmu, reg);
                self.regs.set_f(
                    (self.regs.f() & FLAG_C)
                        | FLAG_H
                        | if val & (1 << bit) == 0 { FLAG_Z } else { 0 },
                );
            }
            Instr::Res(bit, reg) => {
                let val = self.read_r8(mmu, reg);
                self.write_r8(mmu, reg, val & !(1 << bit));
            }
            Instr::Set(bit, reg) => {
                let val = self.read_r8(mmu, reg);
                self.write_r8(mmu, reg, val | (1 << bit));
            }
        }
        false
    }

    fn alu(&mut self, op: AluOp, val: u8) {
        let a = self.regs.a;
        let carry = self.regs.flag(Flag::C) as u8;
        match op {
            AluOp::Add | AluOp::Adc => {
                let carry = if op == AluOp::Adc { carry } else { 0 };
                let sum = a as u16 + val as u16 + carry as u16;
                let res = sum as u8;
                self.regs.set_f(
                    if res == 0 { FLAG_Z } else { 0 }
                        | if (a & 0x0F) + (val & 0x0F) + carry > 0x0F {
                            FLAG_H
                        } else {
                            0
                        }
                        | if sum > 0xFF { FLAG_C } else { 0 },
                );
                self.regs.a = res;
            }
            AluOp::Sub | AluOp::Sbc | AluOp::Cp => {
                let carry = if op == AluOp::Sbc { carry } else { 0 };
                let rhs = val as u16 + carry as u16;
                let res = (a as u16).wrapping_sub(rhs) as u8;
                self.regs.set_f(
                    FLAG_N
                        | if res == 0 { FLAG_Z } else { 0 }
                        | if ((a & 0x0F) as u16) < (val & 0x0F) as u16 + carry as u16 {
                            FLAG_H
                        } else {
                            0
                        }
                        | if (a as u16) < rhs { FLAG_C } else { 0 },
                );
                if op != AluOp::Cp {
                    self.regs.a = res;
                }
            }
            AluOp::And => {
                self.regs.a = a & val;
                self.regs
                    .set_f(FLAG_H | if self.regs.a == 0 { FLAG_Z } else { 0 });
            }
            AluOp::Xor => {
                self.regs.a = a ^ val;
                self.regs.set_f(if self.regs.a == 0 { FLAG_Z } else { 0 });
            }
            AluOp::Or => {
                self.regs.a = a | val;
                self.regs.set_f(if self.regs.a == 0 { FLAG_Z } else { 0 });
            }
        }
    }

    fn shift(&mut self, op: ShiftOp, val: u8) -> u8 {
        let carry_in = self.regs.flag(Flag::C) as u8;
        let (res, carry_out) = match op {
            ShiftOp::Rlc => (val.rotate_left(1), val & 0x80 != 0),
            ShiftOp::Rrc => (val.rotate_right(1), val & 0x01 != 0),
            ShiftOp::Rl => ((val << 1) | carry_in, val & 0x80 != 0),
            ShiftOp::Rr => ((val >> 1) | (carry_in << 7), val & 0x01 != 0),
            ShiftOp::Sla => (val << 1, val & 0x80 != 0),
            ShiftOp::Sra => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
            ShiftOp::Swap => (val.rotate_left(4), false),
            ShiftOp::Srl => (val >> 1, val & 0x01 != 0),
        };
        self.regs
            .set_f(if res == 0 { FLAG_Z } else { 0 } | if carry_out { FLAG_C } else { 0 });
        res
    }

    /// SP plus a signed offset, with H and C taken from the low byte.
    fn sp_offset(&mut self, offset: u8) -> u16 {
        let sp = self.regs.sp;
        let val = offset as i8 as i16 as u16;
        self.regs.set_f(
            if (sp & 0x0F) + (val & 0x0F) > 0x0F {
                FLAG_H
            } else {
                0
            } | if (sp & 0xFF) + (val & 0xFF) > 0xFF {
                FLAG_C
            } else {
                0
            },
        );
        sp.wrapping_add(val)
    }

    fn daa(&mut self) {
        let f = self.regs.f();
        let mut correction = 0u8;
        let mut carry = false;
        if f & FLAG_H != 0 || (f & FLAG_N == 0 && (self.regs.a & 0x0F) > 9) {
            correction |= 0x06;
        }
        if f & FLAG_C != 0 || (f & FLAG_N == 0 && self.regs.a > 0x99) {
            correction |= 0x60;
            carry = true;
        }
        if f & FLAG_N == 0 {
            self.regs.a = self.regs.a.wrapping_add(correction);
        } else {
            self.regs.a = self.regs.a.wrapping_sub(correction);
        }
        self.regs.set_f(
            if self.regs.a == 0 { FLAG_Z } else { 0 } | (f & FLAG_N) | if carry { FLAG_C } else { 0 },
        );
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
