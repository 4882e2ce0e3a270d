//! Operation descriptors for the unprefixed and CB-prefixed opcode spaces.
//!
//! Both tables are decoded once from the regular bit layout of the LR35902
//! encoding (`xx yyy zzz`, see gbdev.io/gb-opcodes) and cached for the life of
//! the process. The CPU only ever looks operations up; it never re-decodes.

use once_cell::sync::Lazy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Unprefixed,
    CbPrefixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    U8,
    U16,
}

/// 8-bit operand slot, in encoding order. `HlInd` is the byte at (HL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R8 {
    B,
    C,
    D,
    E,
    H,
    L,
    HlInd,
    A,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R16 {
    Bc,
    De,
    Hl,
    Sp,
}

/// Register pairs as addressed by PUSH/POP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum R16Stack {
    Bc,
    De,
    Hl,
    Af,
}

/// Indirect addressing forms used by `LD (rr),A` / `LD A,(rr)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indirect {
    Bc,
    De,
    HlInc,
    HlDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Nz,
    Z,
    Nc,
    C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
}

/// The effect of an operation, interpreted by [`crate::cpu::Cpu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    Nop,
    Stop,
    Halt,
    Di,
    Ei,
    Prefix,
    Ld(R8, R8),
    LdImm(R8),
    LdR16Imm(R16),
    StoreA(Indirect),
    LoadA(Indirect),
    StoreAAbs,
    LoadAAbs,
    StoreHigh,
    LoadHigh,
    StoreHighC,
    LoadHighC,
    StoreSp,
    LdSpHl,
    LdHlSpOffset,
    AddSpOffset,
    Inc(R8),
    Dec(R8),
    Inc16(R16),
    Dec16(R16),
    AddHl(R16),
    Alu(AluOp, R8),
    AluImm(AluOp),
    Rlca,
    Rrca,
    Rla,
    Rra,
    Daa,
    Cpl,
    Scf,
    Ccf,
    Jr(Option<Cond>),
    Jp(Option<Cond>),
    JpHl,
    Call(Option<Cond>),
    Ret(Option<Cond>),
    Reti,
    Rst(u16),
    Push(R16Stack),
    Pop(R16Stack),
    Shift(ShiftOp, R8),
    Bit(u8, R8),
    Res(u8, R8),
    Set(u8, R8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub opcode: u8,
    pub table: Table,
    pub mnemonic: &'static str,
    pub operand: Operand,
    /// Machine cycles including the opcode fetch (and the CB prefix fetch for
    /// CB-prefixed entries). For conditional branches this is the not-taken
    /// cost.
    pub cycles: u8,
    pub taken_cycles: u8,
    pub instr: Instr,
}

impl Operation {
    pub fn operand_len(&self) -> u16 {
        match self.operand {
            Operand::None => 0,
            Operand::U8 => 1,
            Operand::U16 => 2,
        }
    }
}

#[rustfmt::skip]
const MNEMONICS: [&str; 256] = [
    "NOP", "LD BC,d16", "LD (BC),A", "INC BC", "INC B", "DEC B", "LD B,d8", "RLCA",
    "LD (a16),SP", "ADD HL,BC", "LD A,(BC)", "DEC BC", "INC C", "DEC C", "LD C,d8", "RRCA",
    "STOP", "LD DE,d16", "LD (DE),A", "INC DE", "INC D", "DEC D", "LD D,d8", "RLA",
    "JR r8", "ADD HL,DE", "LD A,(DE)", "DEC DE", "INC E", "DEC E", "LD E,d8", "RRA",
    "JR NZ,r8", "LD HL,d16", "LD (HL+),A", "INC HL", "INC H", "DEC H", "LD H,d8", "DAA",
    "JR Z,r8", "ADD HL,HL", "LD A,(HL+)", "DEC HL", "INC L", "DEC L", "LD L,d8", "CPL",
    "JR NC,r8", "LD SP,d16", "LD (HL-),A", "INC SP", "INC (HL)", "DEC (HL)", "LD (HL),d8", "SCF",
    "JR C,r8", "ADD HL,SP", "LD A,(HL-)", "DEC SP", "INC A", "DEC A", "LD A,d8", "CCF",
    "LD B,B", "LD B,C", "LD B,D", "LD B,E", "LD B,H", "LD B,L", "LD B,(HL)", "LD B,A",
    "LD C,B", "LD C,C", "LD C,D", "LD C,E", "LD C,H", "LD C,L", "LD C,(HL)", "LD C,A",
    "LD D,B", "LD D,C", "LD D,D", "LD D,E", "LD D,H", "LD D,L", "LD D,(HL)", "LD D,A",
    "LD E,B", "LD E,C", "LD E,D", "LD E,E", "LD E,H", "LD E,L", "LD E,(HL)", "LD E,A",
    "LD H,B", "LD H,C", "LD H,D", "LD H,E", "LD H,H", "LD H,L", "LD H,(HL)", "LD H,A",
    "LD L,B", "LD L,C", "LD L,D", "LD L,E", "LD L,H", "LD L,L", "LD L,(HL)", "LD L,A",
    "LD (HL),B", "LD (HL),C", "LD (HL),D", "LD (HL),E", "LD (HL),H", "LD (HL),L", "HALT", "LD (HL),A",
    "LD A,B", "LD A,C", "LD A,D", "LD A,E", "LD A,H", "LD A,L", "LD A,(HL)", "LD A,A",
    "ADD A,B", "ADD A,C", "ADD A,D", "ADD A,E", "ADD A,H", "ADD A,L", "ADD A,(HL)", "ADD A,A",
    "ADC A,B", "ADC A,C", "ADC A,D", "ADC A,E", "ADC A,H", "ADC A,L", "ADC A,(HL)", "ADC A,A",
    "SUB B", "SUB C", "SUB D", "SUB E", "SUB H", "SUB L", "SUB (HL)", "SUB A",
    "SBC A,B", "SBC A,C", "SBC A,D", "SBC A,E", "SBC A,H", "SBC A,L", "SBC A,(HL)", "SBC A,A",
    "AND B", "AND C", "AND D", "AND E", "AND H", "AND L", "AND (HL)", "AND A",
    "XOR B", "XOR C", "XOR D", "XOR E", "XOR H", "XOR L", "XOR (HL)", "XOR A",
    "OR B", "OR C", "OR D", "OR E", "OR H", "OR L", "OR (HL)", "OR A",
    "CP B", "CP C", "CP D", "CP E", "CP H", "CP L", "CP (HL)", "CP A",
    "RET NZ", "POP BC", "JP NZ,a16", "JP a16", "CALL NZ,a16", "PUSH BC", "ADD A,d8", "RST 00H",
    "RET Z", "RET", "JP Z,a16", "PREFIX CB", "CALL Z,a16", "CALL a16", "ADC A,d8", "RST 08H",
    "RET NC", "POP DE", "JP NC,a16", "-", "CALL NC,a16", "PUSH DE", "SUB d8", "RST 10H",
    "RET C", "RETI", "JP C,a16", "-", "CALL C,a16", "-", "SBC A,d8", "RST 18H",
    "LDH (a8),A", "POP HL", "LD (C),A", "-", "-", "PUSH HL", "AND d8", "RST 20H",
    "ADD SP,r8", "JP (HL)", "LD (a16),A", "-", "-", "-", "XOR d8", "RST 28H",
    "LDH A,(a8)", "POP AF", "LD A,(C)", "DI", "-", "PUSH AF", "OR d8", "RST 30H",
    "LD HL,SP+r8", "LD SP,HL", "LD A,(a16)", "EI", "-", "-", "CP d8", "RST 38H",
];

// Machine cycles per unprefixed opcode; conditional branches list the
// not-taken cost. Zero marks an unused opcode.
#[rustfmt::skip]
const CYCLES: [u8; 256] = [
    1, 3, 2, 2, 1, 1, 2, 1, 5, 2, 2, 2, 1, 1, 2, 1,
    1, 3, 2, 2, 1, 1, 2, 1, 3, 2, 2, 2, 1, 1, 2, 1,
    2, 3, 2, 2, 1, 1, 2, 1, 2, 2, 2, 2, 1, 1, 2, 1,
    2, 3, 2, 2, 3, 3, 3, 1, 2, 2, 2, 2, 1, 1, 2, 1,
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1,
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1,
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1,
    2, 2, 2, 2, 2, 2, 1, 2, 1, 1, 1, 1, 1, 1, 2, 1,
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1,
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1,
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1,
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1,
    2, 3, 3, 4, 3, 4, 2, 4, 2, 4, 3, 1, 3, 6, 2, 4,
    2, 3, 3, 0, 3, 4, 2, 4, 2, 4, 3, 0, 3, 0, 2, 4,
    3, 3, 2, 0, 0, 4, 2, 4, 4, 1, 4, 0, 0, 0, 2, 4,
    3, 3, 2, 1, 0, 4, 2, 4, 3, 2, 4, 1, 0, 0, 2, 4,
];

const UNUSED_OPCODES: [u8; 11] = [
    0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
];

const R8_NAMES: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];
const SHIFT_NAMES: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SWAP", "SRL"];

static UNPREFIXED: Lazy<[Option<Operation>; 256]> =
    Lazy::new(|| std::array::from_fn(|i| decode_unprefixed(i as u8)));

static CB_MNEMONICS: Lazy<Vec<String>> = Lazy::new(|| (0..=255u8).map(cb_mnemonic).collect());

static CB_PREFIXED: Lazy<[Operation; 256]> =
    Lazy::new(|| std::array::from_fn(|i| decode_cb(i as u8)));

/// The unprefixed opcode table. Unused opcodes have no entry.
pub fn unprefixed() -> &'static [Option<Operation>; 256] {
    &UNPREFIXED
}

/// The CB-prefixed opcode table. Every byte is a valid operation.
pub fn cb_prefixed() -> &'static [Operation; 256] {
    &CB_PREFIXED
}

/// Render an operation with its immediate operand, e.g. `LD A,$3C`.
pub fn disassemble(op: &Operation, operand: u16) -> String {
    let m = op.mnemonic;
    if m.contains("d16") {
        m.replace("d16", &format!("${operand:04X}"))
    } else if m.contains("a16") {
        m.replace("a16", &format!("${operand:04X}"))
    } else if m.contains("d8") {
        m.replace("d8", &format!("${:02X}", operand as u8))
    } else if m.contains("a8") {
        m.replace("a8", &format!("$FF{:02X}", operand as u8))
    } else if m.contains("r8") {
        let rel = operand as u8 as i8;
        let sign = if rel < 0 { '-' } else { '+' };
        m.replace("r8", &format!("{sign}${:02X}", rel.unsigned_abs()))
    } else {
        m.to_string()
    }
}

fn r8(index: u8) -> R8 {
    match index & 0x07 {
        0 => R8::B,
        1 => R8::C,
        2 => R8::D,
        3 => R8::E,
        4 => R8::H,
        5 => R8::L,
        6 => R8::HlInd,
        _ => R8::A,
    }
}

fn r16(index: u8) -> R16 {
    match index & 0x03 {
        0 => R16::Bc,
        1 => R16::De,
        2 => R16::Hl,
        _ => R16::Sp,
    }
}

fn r16_stack(index: u8) -> R16Stack {
    match index & 0x03 {
        0 => R16Stack::Bc,
        1 => R16Stack::De,
        2 => R16Stack::Hl,
        _ => R16Stack::Af,
    }
}

fn indirect(index: u8) -> Indirect {
    match index & 0x03 {
        0 => Indirect::Bc,
        1 => Indirect::De,
        2 => Indirect::HlInc,
        _ => Indirect::HlDec,
    }
}

fn cond(index: u8) -> Cond {
    match index & 0x03 {
        0 => Cond::Nz,
        1 => Cond::Z,
        2 => Cond::Nc,
        _ => Cond::C,
    }
}

fn alu(index: u8) -> AluOp {
    match index & 0x07 {
        0 => AluOp::Add,
        1 => AluOp::Adc,
        2 => AluOp::Sub,
        3 => AluOp::Sbc,
        4 => AluOp::And,
        5 => AluOp::Xor,
        6 => AluOp::Or,
        _ => AluOp::Cp,
    }
}

fn shift(index: u8) -> ShiftOp {
    match index & 0x07 {
        0 => ShiftOp::Rlc,
        1 => ShiftOp::Rrc,
        2 => ShiftOp::Rl,
        3 => ShiftOp::Rr,
        4 => ShiftOp::Sla,
        5 => ShiftOp::Sra,
        6 => ShiftOp::Swap,
        _ => ShiftOp::Srl,
    }
}

fn decode_instr(opcode: u8) -> Instr {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 0x07;
    let z = opcode & 0x07;
    let p = y >> 1;
    let q = y & 0x01;

    match (x, z) {
        (0, 0) => match y {
            0 => Instr::Nop,
            1 => Instr::StoreSp,
            2 => Instr::Stop,
            3 => Instr::Jr(None),
            _ => Instr::Jr(Some(cond(y - 4))),
        },
        (0, 1) if q == 0 => Instr::LdR16Imm(r16(p)),
        (0, 1) => Instr::AddHl(r16(p)),
        (0, 2) if q == 0 => Instr::StoreA(indirect(p)),
        (0, 2) => Instr::LoadA(indirect(p)),
        (0, 3) if q == 0 => Instr::Inc16(r16(p)),
        (0, 3) => Instr::Dec16(r16(p)),
        (0, 4) => Instr::Inc(r8(y)),
        (0, 5) => Instr::Dec(r8(y)),
        (0, 6) => Instr::LdImm(r8(y)),
        (0, _) => match y {
            0 => Instr::Rlca,
            1 => Instr::Rrca,
            2 => Instr::Rla,
            3 => Instr::Rra,
            4 => Instr::Daa,
            5 => Instr::Cpl,
            6 => Instr::Scf,
            _ => Instr::Ccf,
        },
        (1, 6) if y == 6 => Instr::Halt,
        (1, _) => Instr::Ld(r8(y), r8(z)),
        (2, _) => Instr::Alu(alu(y), r8(z)),
        _ => match opcode {
            0xC0 | 0xC8 | 0xD0 | 0xD8 => Instr::Ret(Some(cond(y))),
            0xC9 => Instr::Ret(None),
            0xD9 => Instr::Reti,
            0xC2 | 0xCA | 0xD2 | 0xDA => Instr::Jp(Some(cond(y))),
            0xC3 => Instr::Jp(None),
            0xE9 => Instr::JpHl,
            0xC4 | 0xCC | 0xD4 | 0xDC => Instr::Call(Some(cond(y))),
            0xCD => Instr::Call(None),
            0xC1 | 0xD1 | 0xE1 | 0xF1 => Instr::Pop(r16_stack(p)),
            0xC5 | 0xD5 | 0xE5 | 0xF5 => Instr::Push(r16_stack(p)),
            0xCB => Instr::Prefix,
            0xE0 => Instr::StoreHigh,
            0xF0 => Instr::LoadHigh,
            0xE2 => Instr::StoreHighC,
            0xF2 => Instr::LoadHighC,
            0xEA => Instr::StoreAAbs,
            0xFA => Instr::LoadAAbs,
            0xE8 => Instr::AddSpOffset,
            0xF8 => Instr::LdHlSpOffset,
            0xF9 => Instr::LdSpHl,
            0xF3 => Instr::Di,
            0xFB => Instr::Ei,
            _ if z == 6 => Instr::AluImm(alu(y)),
            _ => Instr::Rst((y as u16) * 8),
        },
    }
}

fn operand_for(instr: Instr) -> Operand {
    match instr {
        Instr::LdR16Imm(_)
        | Instr::StoreSp
        | Instr::StoreAAbs
        | Instr::LoadAAbs
        | Instr::Jp(_)
        | Instr::Call(_) => Operand::U16,
        Instr::LdImm(_)
        | Instr::Stop
        | Instr::Jr(_)
        | Instr::AluImm(_)
        | Instr::StoreHigh
        | Instr::LoadHigh
        | Instr::AddSpOffset
        | Instr::LdHlSpOffset => Operand::U8,
        _ => Operand::None,
    }
}

fn taken_cycles_for(instr: Instr, cycles: u8) -> u8 {
    match instr {
        Instr::Jr(Some(_)) => 3,
        Instr::Jp(Some(_)) => 4,
        Instr::Call(Some(_)) => 6,
        Instr::Ret(Some(_)) => 5,
        _ => cycles,
    }
}

fn decode_unprefixed(opcode: u8) -> Option<Operation> {
    if UNUSED_OPCODES.contains(&opcode) {
        return None;
    }
    let instr = decode_instr(opcode);
    let cycles = CYCLES[opcode as usize];
    Some(Operation {
        opcode,
        table: Table::Unprefixed,
        mnemonic: MNEMONICS[opcode as usize],
        operand: operand_for(instr),
        cycles,
        taken_cycles: taken_cycles_for(instr, cycles),
        instr,
    })
}

fn cb_mnemonic(opcode: u8) -> String {
    let reg = R8_NAMES[(opcode & 0x07) as usize];
    let y = (opcode >> 3) & 0x07;
    match opcode >> 6 {
        0 => format!("{} {reg}", SHIFT_NAMES[y as usize]),
        1 => format!("BIT {y},{reg}"),
        2 => format!("RES {y},{reg}"),
        _ => format!("SET {y},{reg}"),
    }
}

fn decode_cb(opcode: u8) -> Operation {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 0x07;
    let reg = r8(opcode);
    let instr = match x {
        0 => Instr::Shift(shift(y), reg),
        1 => Instr::Bit(y, reg),
        2 => Instr::Res(y, reg),
        _ => Instr::Set(y, reg),
    };
    let cycles = match (x, reg) {
        (1, R8::HlInd) => 3,
        (_, R8::HlInd) => 4,
        _ => 2,
    };
    Operation {
        opcode,
        table: Table::CbPrefixed,
        mnemonic: CB_MNEMONICS[opcode as usize].as_str(),
        operand: Operand::None,
        cycles,
        taken_cycles: cycles,
        instr,
    }
}
