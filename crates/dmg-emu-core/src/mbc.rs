//! Memory bank controllers.
//!
//! The controller family is closed, so it is modelled as an enum and
//! dispatched with `match`. Every variant shares the cartridge ROM through an
//! `Arc<[u8]>` and owns its RAM banks outright.

use std::sync::Arc;

use log::warn;

use crate::cartridge::{CartKind, Cartridge, MBC2_RAM_SIZE, RAM_BANK_SIZE, ROM_BANK_SIZE};
use crate::mmu::BusDevice;
use crate::rtc::{Rtc, RtcClock, SystemClock};

const RAM_ENABLE_VALUE: u8 = 0x0A;

/// Read-only ROM view with bank masking.
#[derive(Debug, Clone)]
struct Rom {
    data: Arc<[u8]>,
    bank_mask: usize,
}

impl Rom {
    fn new(cart: &Cartridge) -> Self {
        let banks = cart.header().rom.banks.max(2);
        Self {
            data: cart.rom_handle(),
            bank_mask: banks.next_power_of_two() - 1,
        }
    }

    #[inline]
    fn read(&self, bank: usize, addr: u16) -> u8 {
        let offset = (bank & self.bank_mask) * ROM_BANK_SIZE + (addr as usize & 0x3FFF);
        self.data.get(offset).copied().unwrap_or(0xFF)
    }
}

/// External RAM split into 8 KiB banks.
#[derive(Debug, Clone)]
struct RamBanks {
    banks: Vec<[u8; RAM_BANK_SIZE]>,
    bank_mask: usize,
}

impl RamBanks {
    fn new(count: usize) -> Self {
        Self {
            banks: vec![[0u8; RAM_BANK_SIZE]; count],
            bank_mask: count.max(1).next_power_of_two() - 1,
        }
    }

    fn read(&self, bank: usize, addr: u16) -> u8 {
        self.banks
            .get(bank & self.bank_mask)
            .map(|b| b[addr as usize & 0x1FFF])
            .unwrap_or(0xFF)
    }

    fn write(&mut self, bank: usize, addr: u16, val: u8) {
        if let Some(b) = self.banks.get_mut(bank & self.bank_mask) {
            b[addr as usize & 0x1FFF] = val;
        }
    }

    fn clear(&mut self) {
        for bank in &mut self.banks {
            bank.fill(0);
        }
    }

    fn export(&self) -> Vec<Vec<u8>> {
        self.banks.iter().map(|b| b.to_vec()).collect()
    }

    fn import(&mut self, banks: &[Vec<u8>]) {
        self.clear();
        for (dst, src) in self.banks.iter_mut().zip(banks) {
            let len = src.len().min(RAM_BANK_SIZE);
            dst[..len].copy_from_slice(&src[..len]);
        }
    }
}

#[derive(Debug, Clone)]
pub struct NoMbc {
    rom: Rom,
    ram: RamBanks,
}

#[derive(Debug, Clone)]
pub struct Mbc1 {
    rom: Rom,
    ram: RamBanks,
    ram_enable: bool,
    bank_low: u8,
    bank_high: u8,
    advanced_mode: bool,
}

#[derive(Debug, Clone)]
pub struct Mbc2 {
    rom: Rom,
    ram: [u8; MBC2_RAM_SIZE],
    ram_enable: bool,
    rom_bank: u8,
}

#[derive(Debug)]
pub struct Mbc3 {
    rom: Rom,
    ram: RamBanks,
    rtc: Option<Rtc>,
    ram_enable: bool,
    rom_bank: u8,
    select: u8,
    latch_armed: bool,
}

#[derive(Debug, Clone)]
pub struct Mbc5 {
    rom: Rom,
    ram: RamBanks,
    ram_enable: bool,
    rom_bank: u16,
    ram_bank: u8,
    rumble: bool,
}

/// The cartridge controller, selected from the header's type byte.
#[derive(Debug)]
pub enum Mbc {
    NoMbc(NoMbc),
    Mbc1(Mbc1),
    Mbc2(Mbc2),
    Mbc3(Mbc3),
    Mbc5(Mbc5),
}

impl Mbc {
    pub fn new(cart: &Cartridge) -> Self {
        Self::with_clock(cart, Box::new(SystemClock))
    }

    /// Build the controller, giving an MBC3 timer the supplied clock source.
    /// Other controllers drop the clock.
    pub fn with_clock(cart: &Cartridge, clock: Box<dyn RtcClock>) -> Self {
        let header = cart.header();
        let rom = Rom::new(cart);
        let ram = RamBanks::new(header.ram.banks);
        match header.kind {
            CartKind::RomOnly => Mbc::NoMbc(NoMbc { rom, ram }),
            CartKind::Mbc1 => Mbc::Mbc1(Mbc1 {
                rom,
                ram,
                ram_enable: false,
                bank_low: 1,
                bank_high: 0,
                advanced_mode: false,
            }),
            CartKind::Mbc2 => Mbc::Mbc2(Mbc2 {
                rom,
                ram: [0; MBC2_RAM_SIZE],
                ram_enable: false,
                rom_bank: 1,
            }),
            CartKind::Mbc3 => Mbc::Mbc3(Mbc3 {
                rom,
                ram,
                rtc: header.has_rtc.then(|| Rtc::new(clock)),
                ram_enable: false,
                rom_bank: 1,
                select: 0,
                latch_armed: false,
            }),
            CartKind::Mbc5 => Mbc::Mbc5(Mbc5 {
                rom,
                ram,
                ram_enable: false,
                rom_bank: 1,
                ram_bank: 0,
                rumble: header.has_rumble,
            }),
        }
    }

    pub fn kind(&self) -> CartKind {
        match self {
            Mbc::NoMbc(_) => CartKind::RomOnly,
            Mbc::Mbc1(_) => CartKind::Mbc1,
            Mbc::Mbc2(_) => CartKind::Mbc2,
            Mbc::Mbc3(_) => CartKind::Mbc3,
            Mbc::Mbc5(_) => CartKind::Mbc5,
        }
    }

    /// Export external RAM, one buffer per bank.
    pub fn ram_banks(&self) -> Vec<Vec<u8>> {
        match self {
            Mbc::NoMbc(m) => m.ram.export(),
            Mbc::Mbc1(m) => m.ram.export(),
            Mbc::Mbc2(m) => vec![m.ram.to_vec()],
            Mbc::Mbc3(m) => m.ram.export(),
            Mbc::Mbc5(m) => m.ram.export(),
        }
    }

    /// Replace external RAM. Banks are zeroed first; surplus banks or bytes
    /// are dropped.
    pub fn load_ram_banks(&mut self, banks: &[Vec<u8>]) {
        let expected = self.ram_bank_count();
        if banks.len() != expected {
            warn!(
                "RAM image has {} banks, cartridge has {}",
                banks.len(),
                expected
            );
        }
        match self {
            Mbc::NoMbc(m) => m.ram.import(banks),
            Mbc::Mbc1(m) => m.ram.import(banks),
            Mbc::Mbc2(m) => {
                m.ram.fill(0);
                if let Some(src) = banks.first() {
                    let len = src.len().min(MBC2_RAM_SIZE);
                    for (dst, &b) in m.ram[..len].iter_mut().zip(src) {
                        *dst = b & 0x0F;
                    }
                }
            }
            Mbc::Mbc3(m) => m.ram.import(banks),
            Mbc::Mbc5(m) => m.ram.import(banks),
        }
    }

    pub fn ram_bank_count(&self) -> usize {
        match self {
            Mbc::NoMbc(m) => m.ram.banks.len(),
            Mbc::Mbc1(m) => m.ram.banks.len(),
            Mbc::Mbc2(_) => 1,
            Mbc::Mbc3(m) => m.ram.banks.len(),
            Mbc::Mbc5(m) => m.ram.banks.len(),
        }
    }

    pub fn rtc(&self) -> Option<&Rtc> {
        match self {
            Mbc::Mbc3(m) => m.rtc.as_ref(),
            _ => None,
        }
    }
}

impl BusDevice for Mbc {
    fn read(&self, addr: u16) -> u8 {
        match self {
            Mbc::NoMbc(m) => m.read(addr),
            Mbc::Mbc1(m) => m.read(addr),
            Mbc::Mbc2(m) => m.read(addr),
            Mbc::Mbc3(m) => m.read(addr),
            Mbc::Mbc5(m) => m.read(addr),
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match self {
            Mbc::NoMbc(m) => m.write(addr, val),
            Mbc::Mbc1(m) => m.write(addr, val),
            Mbc::Mbc2(m) => m.write(addr, val),
            Mbc::Mbc3(m) => m.write(addr, val),
            Mbc::Mbc5(m) => m.write(addr, val),
        }
    }

    fn reset(&mut self) {
        match self {
            Mbc::NoMbc(m) => m.ram.clear(),
            Mbc::Mbc1(m) => {
                m.ram.clear();
                m.ram_enable = false;
                m.bank_low = 1;
                m.bank_high = 0;
                m.advanced_mode = false;
            }
            Mbc::Mbc2(m) => {
                m.ram.fill(0);
                m.ram_enable = false;
                m.rom_bank = 1;
            }
            Mbc::Mbc3(m) => {
                m.ram.clear();
                if let Some(rtc) = m.rtc.as_mut() {
                    rtc.reset();
                }
                m.ram_enable = false;
                m.rom_bank = 1;
                m.select = 0;
                m.latch_armed = false;
            }
            Mbc::Mbc5(m) => {
                m.ram.clear();
                m.ram_enable = false;
                m.rom_bank = 1;
                m.ram_bank = 0;
            }
        }
    }
}

impl NoMbc {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self.rom.read((addr >> 14) as usize, addr),
            0xA000..=0xBFFF => self.ram.read(0, addr),
            _ => 0xFF,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        if let 0xA000..=0xBFFF = addr {
            self.ram.write(0, addr, val);
        }
    }
}

impl Mbc1 {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => {
                let bank = if self.advanced_mode {
                    (self.bank_high as usize) << 5
                } else {
                    0
                };
                self.rom.read(bank, addr)
            }
            0x4000..=0x7FFF => {
                let bank = ((self.bank_high as usize) << 5) | self.bank_low as usize;
                self.rom.read(bank, addr)
            }
            0xA000..=0xBFFF if self.ram_enable => self.ram.read(self.ram_bank(), addr),
            _ => 0xFF,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enable = val & 0x0F == RAM_ENABLE_VALUE,
            0x2000..=0x3FFF => {
                // Zero in the low five bits always selects the next bank, which
                // is why banks 0x20/0x40/0x60 are unreachable.
                self.bank_low = val & 0x1F;
                if self.bank_low == 0 {
                    self.bank_low = 1;
                }
            }
            0x4000..=0x5FFF => self.bank_high = val & 0x03,
            0x6000..=0x7FFF => self.advanced_mode = val & 0x01 != 0,
            0xA000..=0xBFFF if self.ram_enable => {
                let bank = self.ram_bank();
                self.ram.write(bank, addr, val);
            }
            _ => {}
        }
    }

    fn ram_bank(&self) -> usize {
        if self.advanced_mode {
            self.bank_high as usize
        } else {
            0
        }
    }
}

impl Mbc2 {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom.read(0, addr),
            0x4000..=0x7FFF => self.rom.read(self.rom_bank as usize, addr),
            0xA000..=0xBFFF if self.ram_enable => {
                // 512x4-bit RAM, mirrored across the whole window.
                0xF0 | self.ram[(addr as usize - 0xA000) & (MBC2_RAM_SIZE - 1)]
            }
            _ => 0xFF,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            // Address bit 8 picks the register: clear for RAM enable, set for
            // ROM bank.
            0x0000..=0x3FFF if addr & 0x0100 == 0 => {
                self.ram_enable = val & 0x0F == RAM_ENABLE_VALUE;
            }
            0x0000..=0x3FFF => {
                self.rom_bank = val & 0x0F;
                if self.rom_bank == 0 {
                    self.rom_bank = 1;
                }
            }
            0xA000..=0xBFFF if self.ram_enable => {
                self.ram[(addr as usize - 0xA000) & (MBC2_RAM_SIZE - 1)] = val & 0x0F;
            }
            _ => {}
        }
    }
}

impl Mbc3 {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom.read(0, addr),
            0x4000..=0x7FFF => self.rom.read(self.rom_bank as usize, addr),
            0xA000..=0xBFFF if self.ram_enable => match self.select {
                0x00..=0x03 => self.ram.read(self.select as usize, addr),
                0x08..=0x0C => self
                    .rtc
                    .as_ref()
                    .map(|rtc| rtc.read_latched(self.select))
                    .unwrap_or(0xFF),
                _ => 0xFF,
            },
            _ => 0xFF,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enable = val & 0x0F == RAM_ENABLE_VALUE,
            0x2000..=0x3FFF => {
                self.rom_bank = val & 0x7F;
                if self.rom_bank == 0 {
                    self.rom_bank = 1;
                }
            }
            0x4000..=0x5FFF => self.select = val,
            0x6000..=0x7FFF => {
                if self.latch_armed && val == 0x01 {
                    if let Some(rtc) = self.rtc.as_mut() {
                        rtc.latch();
                    }
                }
                self.latch_armed = val == 0x00;
            }
            0xA000..=0xBFFF if self.ram_enable => match self.select {
                0x00..=0x03 => self.ram.write(self.select as usize, addr, val),
                0x08..=0x0C => {
                    if let Some(rtc) = self.rtc.as_mut() {
                        rtc.write_register(self.select, val);
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
}

impl Mbc5 {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom.read(0, addr),
            0x4000..=0x7FFF => self.rom.read(self.rom_bank as usize, addr),
            0xA000..=0xBFFF if self.ram_enable => self.ram.read(self.ram_bank as usize, addr),
            _ => 0xFF,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x1FFF => self.ram_enable = val & 0x0F == RAM_ENABLE_VALUE,
            0x2000..=0x2FFF => self.rom_bank = (self.rom_bank & 0x100) | val as u16,
            0x3000..=0x3FFF => {
                self.rom_bank = (self.rom_bank & 0x0FF) | (((val & 0x01) as u16) << 8);
            }
            0x4000..=0x5FFF => {
                // Bit 3 drives the rumble motor on rumble carts.
                self.ram_bank = if self.rumble { val & 0x07 } else { val & 0x0F };
            }
            0xA000..=0xBFFF if self.ram_enable => {
                let bank = self.ram_bank as usize;
                self.ram.write(bank, addr, val);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtc::ManualClock;

    fn banked_rom(cart_type: u8, rom_code: u8, ram_code: u8) -> Cartridge {
        let banks = 2usize << rom_code;
        let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
        for bank in 0..banks {
            rom[bank * ROM_BANK_SIZE] = bank as u8;
            rom[bank * ROM_BANK_SIZE + 1] = (bank >> 8) as u8;
        }
        rom[0x0147] = cart_type;
        rom[0x0148] = rom_code;
        rom[0x0149] = ram_code;
        Cartridge::from_bytes(rom).unwrap()
    }

    #[test]
    fn mbc1_bank_zero_maps_to_one() {
        let mut mbc = Mbc::new(&banked_rom(0x01, 0x06, 0x00));
        mbc.write(0x2000, 0x00);
        assert_eq!(mbc.read(0x4000), 1);
        mbc.write(0x4000, 0x01);
        mbc.write(0x2000, 0x00);
        assert_eq!(mbc.read(0x4000), 0x21);
    }

    #[test]
    fn mbc1_bank_index_is_masked_by_rom_size() {
        let mut mbc = Mbc::new(&banked_rom(0x01, 0x02, 0x00));
        mbc.write(0x2000, 0x0B);
        assert_eq!(mbc.read(0x4000), 0x0B & 0x07);
    }

    #[test]
    fn mbc1_advanced_mode_switches_ram_and_low_rom() {
        let mut mbc = Mbc::new(&banked_rom(0x03, 0x06, 0x03));
        mbc.write(0x0000, 0x0A);
        mbc.write(0xA000, 0x11);
        mbc.write(0x6000, 0x01);
        mbc.write(0x4000, 0x01);
        assert_eq!(mbc.read(0x0000), 0x20);
        assert_eq!(mbc.read(0xA000), 0x00);
        mbc.write(0xA000, 0x22);
        mbc.write(0x6000, 0x00);
        assert_eq!(mbc.read(0xA000), 0x11);
        assert_eq!(mbc.read(0x0000), 0x00);
    }

    #[test]
    fn disabled_ram_reads_open_bus_and_ignores_writes() {
        let mut mbc = Mbc::new(&banked_rom(0x03, 0x01, 0x02));
        mbc.write(0xA000, 0x55);
        assert_eq!(mbc.read(0xA000), 0xFF);
        mbc.write(0x0000, 0x0A);
        assert_eq!(mbc.read(0xA000), 0x00);
        mbc.write(0x0000, 0x00);
        assert_eq!(mbc.read(0xA000), 0xFF);
    }

    #[test]
    fn mbc2_uses_address_bit_eight() {
        let mut mbc = Mbc::new(&banked_rom(0x06, 0x03, 0x00));
        mbc.write(0x0100, 0x03);
        assert_eq!(mbc.read(0x4000), 3);
        mbc.write(0x0000, 0x0A);
        mbc.write(0xA000, 0xAB);
        assert_eq!(mbc.read(0xA000), 0xFB);
        assert_eq!(mbc.read(0xA200), 0xFB);
        mbc.write(0x2100, 0x00);
        assert_eq!(mbc.read(0x4000), 1);
    }

    #[test]
    fn mbc3_rtc_register_replaces_ram() {
        let clock = ManualClock::new(0);
        let cart = banked_rom(0x10, 0x02, 0x03);
        let mut mbc = Mbc::with_clock(&cart, Box::new(clock.clone()));
        mbc.write(0x0000, 0x0A);
        mbc.write(0xA000, 0x77);

        clock.advance(42);
        mbc.write(0x6000, 0x00);
        mbc.write(0x6000, 0x01);
        mbc.write(0x4000, 0x08);
        assert_eq!(mbc.read(0xA000), 42);

        mbc.write(0x4000, 0x00);
        assert_eq!(mbc.read(0xA000), 0x77);
    }

    #[test]
    fn mbc3_latch_needs_zero_then_one() {
        let clock = ManualClock::new(0);
        let cart = banked_rom(0x0F, 0x02, 0x00);
        let mut mbc = Mbc::with_clock(&cart, Box::new(clock.clone()));
        mbc.write(0x0000, 0x0A);
        mbc.write(0x4000, 0x08);
        clock.advance(9);
        mbc.write(0x6000, 0x01);
        assert_eq!(mbc.read(0xA000), 0);
        mbc.write(0x6000, 0x00);
        mbc.write(0x6000, 0x01);
        assert_eq!(mbc.read(0xA000), 9);
    }

    #[test]
    fn mbc5_allows_bank_zero_and_ninth_bit() {
        let mut mbc = Mbc::new(&banked_rom(0x19, 0x08, 0x00));
        mbc.write(0x2000, 0x00);
        assert_eq!(mbc.read(0x4000), 0);
        mbc.write(0x2000, 0x05);
        mbc.write(0x3000, 0x01);
        assert_eq!(mbc.read(0x4000), 0x05);
        assert_eq!(mbc.read(0x4001), 0x01);
    }

    #[test]
    fn ram_import_zeroes_then_copies() {
        let mut mbc = Mbc::new(&banked_rom(0x1B, 0x01, 0x03));
        mbc.write(0x0000, 0x0A);
        mbc.write(0x4000, 0x03);
        mbc.write(0xA000, 0x99);

        mbc.load_ram_banks(&[vec![0x12; 4]]);
        let banks = mbc.ram_banks();
        assert_eq!(banks.len(), 4);
        assert_eq!(&banks[0][..5], &[0x12, 0x12, 0x12, 0x12, 0x00]);
        assert!(banks[3].iter().all(|&b| b == 0));
    }

    #[test]
    fn reset_restores_power_on_banking() {
        let mut mbc = Mbc::new(&banked_rom(0x13, 0x03, 0x03));
        mbc.write(0x2000, 0x06);
        mbc.write(0x0000, 0x0A);
        mbc.write(0xA000, 0x42);
        mbc.reset();
        assert_eq!(mbc.read(0x4000), 1);
        assert_eq!(mbc.read(0xA000), 0xFF);
        assert!(mbc.ram_banks()[0].iter().all(|&b| b == 0));
    }
}
