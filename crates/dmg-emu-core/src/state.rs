//! Serializable console snapshots.
//!
//! A [`ConsoleState`] captures what is needed to compare two consoles or to
//! put one back where it was: the CPU register file, the PPU registers with
//! VRAM and OAM, and the cartridge RAM banks. Timer, serial and joypad state
//! are not part of it.

use serde::{Deserialize, Serialize};

use crate::registers::Registers;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
    pub ime: bool,
}

impl From<&Registers> for CpuState {
    fn from(regs: &Registers) -> Self {
        Self {
            a: regs.a,
            b: regs.b,
            c: regs.c,
            d: regs.d,
            e: regs.e,
            f: regs.f(),
            h: regs.h,
            l: regs.l,
            sp: regs.sp,
            pc: regs.pc,
            ime: regs.ime,
        }
    }
}

impl CpuState {
    pub fn apply(&self, regs: &mut Registers) {
        regs.a = self.a;
        regs.b = self.b;
        regs.c = self.c;
        regs.d = self.d;
        regs.e = self.e;
        regs.set_f(self.f);
        regs.h = self.h;
        regs.l = self.l;
        regs.sp = self.sp;
        regs.pc = self.pc;
        regs.ime = self.ime;
    }
}

/// PPU registers plus raw VRAM (8 KiB) and OAM (160 bytes). `stat` holds the
/// value a STAT read would return, mode bits included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PpuState {
    pub lcdc: u8,
    pub stat: u8,
    pub scx: u8,
    pub scy: u8,
    pub wx: u8,
    pub wy: u8,
    pub lyc: u8,
    pub ly: u8,
    pub bgp: u8,
    pub obp0: u8,
    pub obp1: u8,
    pub oam: Vec<u8>,
    pub vram: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartState {
    pub ram_banks: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleState {
    pub cpu: CpuState,
    pub ppu: PpuState,
    pub cart: CartState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_state_masks_flags_on_apply() {
        let mut regs = Registers::post_boot(false);
        let mut state = CpuState::from(&regs);
        assert_eq!(state.f, 0xB0);
        state.f = 0xFF;
        state.pc = 0x1234;
        state.apply(&mut regs);
        assert_eq!(regs.f(), 0xF0);
        assert_eq!(regs.pc, 0x1234);
    }
}
