use log::debug;

use crate::{
    input::Input,
    mbc::Mbc,
    memory::{HighRam, WorkRam},
    ppu::Ppu,
    serial::Serial,
    timer::Timer,
};

// Interrupt request bits, shared by IE and IF.
pub const INT_VBLANK: u8 = 0x01;
pub const INT_STAT: u8 = 0x02;
pub const INT_TIMER: u8 = 0x04;
pub const INT_SERIAL: u8 = 0x08;
pub const INT_JOYPAD: u8 = 0x10;
pub const INT_MASK: u8 = 0x1F;

const OAM_DMA_LEN: u16 = 0xA0;

/// A hardware block mapped into the address space.
///
/// Devices receive the full 16-bit address; the bus decides which device
/// owns it.
pub trait BusDevice {
    fn read(&self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, val: u8);
    fn reset(&mut self);
}

/// Owner of an address, as decoded by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    RomBank0,
    RomBankN,
    Vram,
    ExternalRam,
    WorkRam,
    Echo,
    Oam,
    Unusable,
    Joypad,
    Serial,
    Timer,
    InterruptFlag,
    Audio,
    Ppu,
    OamDma,
    HighRam,
    InterruptEnable,
    Unmapped,
}

fn decode_page(page: u8) -> Region {
    match page {
        0x00..=0x3F => Region::RomBank0,
        0x40..=0x7F => Region::RomBankN,
        0x80..=0x9F => Region::Vram,
        0xA0..=0xBF => Region::ExternalRam,
        0xC0..=0xDF => Region::WorkRam,
        0xE0..=0xFD => Region::Echo,
        0xFE => Region::Oam,
        // 0xFF is decoded per byte through the IO table
        0xFF => Region::Unmapped,
    }
}

fn decode_io(low: u8) -> Region {
    match low {
        0x00 => Region::Joypad,
        0x01..=0x02 => Region::Serial,
        0x04..=0x07 => Region::Timer,
        0x0F => Region::InterruptFlag,
        0x10..=0x3F => Region::Audio,
        0x40..=0x45 | 0x47..=0x4B => Region::Ppu,
        0x46 => Region::OamDma,
        0x80..=0xFE => Region::HighRam,
        0xFF => Region::InterruptEnable,
        _ => Region::Unmapped,
    }
}

pub struct Mmu {
    pages: [Region; 256],
    io: [Region; 256],
    wram: WorkRam,
    hram: HighRam,
    cart: Option<Mbc>,
    pub ppu: Ppu,
    pub timer: Timer,
    pub serial: Serial,
    pub input: Input,
    if_reg: u8,
    ie_reg: u8,
    /// Last value written to the OAM DMA register.
    dma: u8,
}

impl Mmu {
    pub fn new() -> Self {
        Self {
            pages: std::array::from_fn(|i| decode_page(i as u8)),
            io: std::array::from_fn(|i| decode_io(i as u8)),
            wram: WorkRam::new(),
            hram: HighRam::new(),
            cart: None,
            ppu: Ppu::new(),
            timer: Timer::new(),
            serial: Serial::new(),
            input: Input::new(),
            if_reg: 0,
            ie_reg: 0,
            dma: 0,
        }
    }

    pub fn region(&self, addr: u16) -> Region {
        let [page, low] = addr.to_be_bytes();
        match page {
            0xFF => self.io[low as usize],
            0xFE if low >= 0xA0 => Region::Unusable,
            _ => self.pages[page as usize],
        }
    }

    pub fn load_cartridge(&mut self, mbc: Mbc) {
        self.cart = Some(mbc);
    }

    pub fn cartridge(&self) -> Option<&Mbc> {
        self.cart.as_ref()
    }

    pub fn cartridge_mut(&mut self) -> Option<&mut Mbc> {
        self.cart.as_mut()
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        match self.region(addr) {
            Region::RomBank0 | Region::RomBankN | Region::ExternalRam => {
                self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            Region::Vram | Region::Oam | Region::Ppu => self.ppu.read(addr),
            Region::WorkRam | Region::Echo => self.wram.read(addr),
            Region::Unusable | Region::Audio => 0,
            Region::Joypad => self.input.read(addr),
            Region::Serial => self.serial.read(addr),
            Region::Timer => self.timer.read(addr),
            Region::InterruptFlag => self.if_reg | 0xE0,
            Region::OamDma => self.dma,
            Region::HighRam => self.hram.read(addr),
            Region::InterruptEnable => self.ie_reg,
            Region::Unmapped => 0xFF,
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        match self.region(addr) {
            Region::RomBank0 | Region::RomBankN | Region::ExternalRam => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            Region::Vram | Region::Oam | Region::Ppu => self.ppu.write(addr, val),
            Region::WorkRam | Region::Echo => self.wram.write(addr, val),
            Region::Unusable | Region::Audio | Region::Unmapped => {}
            Region::Joypad => self.input.write(addr, val),
            Region::Serial => {
                self.serial.write(addr, val);
                if self.serial.take_interrupt() {
                    self.request_interrupt(INT_SERIAL);
                }
            }
            Region::Timer => {
                self.timer.write(addr, val);
                if self.timer.take_interrupt() {
                    self.request_interrupt(INT_TIMER);
                }
            }
            Region::InterruptFlag => self.if_reg = val & INT_MASK,
            Region::OamDma => {
                self.dma = val;
                self.oam_dma(val);
            }
            Region::HighRam => self.hram.write(addr, val),
            Region::InterruptEnable => self.ie_reg = val,
        }
    }

    pub fn read_word(&self, addr: u16) -> u16 {
        let lo = self.read_byte(addr);
        let hi = self.read_byte(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    pub fn write_word(&mut self, addr: u16, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.write_byte(addr, lo);
        self.write_byte(addr.wrapping_add(1), hi);
    }

    // The whole 160-byte block is copied at once.
    fn oam_dma(&mut self, page: u8) {
        let src = (page as u16) << 8;
        for i in 0..OAM_DMA_LEN {
            let byte = self.read_byte(src.wrapping_add(i));
            self.ppu.write_oam(i as usize, byte);
        }
    }

    pub fn request_interrupt(&mut self, mask: u8) {
        self.if_reg |= mask & INT_MASK;
    }

    pub(crate) fn acknowledge_interrupt(&mut self, mask: u8) {
        self.if_reg &= !mask;
    }

    /// Interrupts that are both requested and enabled.
    pub fn pending_interrupts(&self) -> u8 {
        self.ie_reg & self.if_reg & INT_MASK
    }

    pub fn interrupt_flags(&self) -> u8 {
        self.if_reg
    }

    pub fn interrupt_enable(&self) -> u8 {
        self.ie_reg
    }

    /// Reset every device and both interrupt registers. A loaded cartridge
    /// stays in its slot with its controller reset.
    pub fn reset(&mut self) {
        debug!("Resetting memory bus");
        self.wram.reset();
        self.hram.reset();
        self.ppu.reset();
        self.timer.reset();
        self.serial.reset();
        self.input.reset();
        if let Some(cart) = self.cart.as_mut() {
            cart.reset();
        }
        self.if_reg = 0;
        self.ie_reg = 0;
        self.dma = 0;
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}
