use std::sync::Arc;

use log::warn;

use crate::error::{EmuError, Result};

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;
pub const MBC2_RAM_SIZE: usize = 0x200;

// Header layout (gbdev.io/pandocs/The_Cartridge_Header.html)
const HEADER_END: usize = 0x0150;
const TITLE: std::ops::Range<usize> = 0x0134..0x0144;
const MANUFACTURER: std::ops::Range<usize> = 0x013F..0x0143;
const CGB_FLAG: usize = 0x0143;
const NEW_LICENSEE: std::ops::Range<usize> = 0x0144..0x0146;
const SGB_FLAG: usize = 0x0146;
const CART_TYPE: usize = 0x0147;
const ROM_SIZE: usize = 0x0148;
const RAM_SIZE: usize = 0x0149;
const DESTINATION: usize = 0x014A;
const VERSION: usize = 0x014C;
const HEADER_CHECKSUM: usize = 0x014D;
const GLOBAL_CHECKSUM: usize = 0x014E;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartKind {
    RomOnly,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgbSupport {
    None,
    Allowed,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Japanese,
    Overseas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomSize {
    pub bytes: usize,
    pub banks: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamSize {
    pub bytes: usize,
    pub banks: usize,
}

/// Metadata decoded from the cartridge header at 0x0134-0x014F.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub title: String,
    pub manufacturer: String,
    pub cgb: CgbSupport,
    pub new_licensee: String,
    pub sgb: bool,
    pub cart_type: u8,
    pub kind: CartKind,
    pub has_ram: bool,
    pub has_battery: bool,
    pub has_rtc: bool,
    pub has_rumble: bool,
    pub rom: RomSize,
    pub ram: RamSize,
    pub region: Region,
    pub version: u8,
    pub header_checksum: u8,
    pub global_checksum: u16,
    computed_checksum: u8,
}

/// Features implied by a cartridge type byte.
struct TypeInfo {
    kind: CartKind,
    ram: bool,
    battery: bool,
    rtc: bool,
    rumble: bool,
}

impl TypeInfo {
    const fn new(kind: CartKind) -> Self {
        Self {
            kind,
            ram: false,
            battery: false,
            rtc: false,
            rumble: false,
        }
    }

    const fn ram(mut self) -> Self {
        self.ram = true;
        self
    }

    const fn battery(mut self) -> Self {
        self.battery = true;
        self
    }

    const fn rtc(mut self) -> Self {
        self.rtc = true;
        self
    }

    const fn rumble(mut self) -> Self {
        self.rumble = true;
        self
    }
}

fn type_info(code: u8) -> Result<TypeInfo> {
    use CartKind::*;
    let info = match code {
        0x00 => TypeInfo::new(RomOnly),
        0x08 => TypeInfo::new(RomOnly).ram(),
        0x09 => TypeInfo::new(RomOnly).ram().battery(),
        0x01 => TypeInfo::new(Mbc1),
        0x02 => TypeInfo::new(Mbc1).ram(),
        0x03 => TypeInfo::new(Mbc1).ram().battery(),
        // MBC2 RAM is on the controller itself.
        0x05 => TypeInfo::new(Mbc2).ram(),
        0x06 => TypeInfo::new(Mbc2).ram().battery(),
        0x0F => TypeInfo::new(Mbc3).rtc().battery(),
        0x10 => TypeInfo::new(Mbc3).rtc().ram().battery(),
        0x11 => TypeInfo::new(Mbc3),
        0x12 => TypeInfo::new(Mbc3).ram(),
        0x13 => TypeInfo::new(Mbc3).ram().battery(),
        0x19 => TypeInfo::new(Mbc5),
        0x1A => TypeInfo::new(Mbc5).ram(),
        0x1B => TypeInfo::new(Mbc5).ram().battery(),
        0x1C => TypeInfo::new(Mbc5).rumble(),
        0x1D => TypeInfo::new(Mbc5).rumble().ram(),
        0x1E => TypeInfo::new(Mbc5).rumble().ram().battery(),
        other => return Err(EmuError::UnrecognizedCartridgeType(other)),
    };
    Ok(info)
}

fn rom_size(code: u8) -> Result<RomSize> {
    let banks = match code {
        0x00..=0x08 => 2usize << code,
        0x52 => 72,
        0x53 => 80,
        0x54 => 96,
        other => return Err(EmuError::UnsupportedRomSize(other)),
    };
    Ok(RomSize {
        bytes: banks * ROM_BANK_SIZE,
        banks,
    })
}

fn ram_size(code: u8) -> Result<RamSize> {
    let (bytes, banks) = match code {
        0x00 => (0, 0),
        0x01 => (0x800, 1),
        0x02 => (0x2000, 1),
        0x03 => (0x8000, 4),
        0x04 => (0x20000, 16),
        0x05 => (0x10000, 8),
        other => return Err(EmuError::UnsupportedRamSize(other)),
    };
    Ok(RamSize { bytes, banks })
}

// Titles are NUL padded, and on newer carts the last bytes double as the
// manufacturer code and CGB flag, so stop at the first non-printable byte.
fn ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b.is_ascii_graphic() || b == b' ')
        .map(|&b| b as char)
        .collect::<String>()
        .trim_end()
        .to_string()
}

impl Header {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_END {
            return Err(EmuError::TruncatedRom { len: data.len() });
        }

        let cart_type = data[CART_TYPE];
        let info = type_info(cart_type)?;
        let rom = rom_size(data[ROM_SIZE])?;
        let mut ram = ram_size(data[RAM_SIZE])?;
        match info.kind {
            CartKind::Mbc2 => {
                ram = RamSize {
                    bytes: MBC2_RAM_SIZE,
                    banks: 1,
                };
            }
            CartKind::RomOnly if info.ram => {
                ram = RamSize {
                    bytes: RAM_BANK_SIZE,
                    banks: 1,
                };
            }
            _ if !info.ram => ram = RamSize { bytes: 0, banks: 0 },
            _ => {}
        }

        let cgb = match data[CGB_FLAG] {
            0xC0 => CgbSupport::Required,
            0x80 => CgbSupport::Allowed,
            _ => CgbSupport::None,
        };

        let computed_checksum = data[TITLE.start..HEADER_CHECKSUM]
            .iter()
            .fold(0u8, |x, &b| x.wrapping_sub(b).wrapping_sub(1));

        Ok(Self {
            title: ascii(&data[TITLE]),
            manufacturer: ascii(&data[MANUFACTURER]),
            cgb,
            new_licensee: ascii(&data[NEW_LICENSEE]),
            sgb: data[SGB_FLAG] == 0x03,
            cart_type,
            kind: info.kind,
            has_ram: info.ram,
            has_battery: info.battery,
            has_rtc: info.rtc,
            has_rumble: info.rumble,
            rom,
            ram,
            region: if data[DESTINATION] == 0x00 {
                Region::Japanese
            } else {
                Region::Overseas
            },
            version: data[VERSION],
            header_checksum: data[HEADER_CHECKSUM],
            global_checksum: u16::from_be_bytes([data[GLOBAL_CHECKSUM], data[GLOBAL_CHECKSUM + 1]]),
            computed_checksum,
        })
    }

    /// Header checksum over 0x0134-0x014C as computed by the boot ROM.
    pub fn computed_checksum(&self) -> u8 {
        self.computed_checksum
    }

    pub fn checksum_ok(&self) -> bool {
        self.computed_checksum == self.header_checksum
    }

    pub fn cgb_flag(&self) -> bool {
        self.cgb != CgbSupport::None
    }
}

/// An immutable cartridge image plus its decoded header.
#[derive(Debug, Clone)]
pub struct Cartridge {
    rom: Arc<[u8]>,
    header: Header,
}

impl Cartridge {
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let header = Header::parse(&data)?;
        if !header.checksum_ok() {
            warn!(
                "Header checksum mismatch for '{}': header {:02X}, computed {:02X}",
                header.title,
                header.header_checksum,
                header.computed_checksum()
            );
        }
        if data.len() < header.rom.bytes {
            warn!(
                "ROM image is {} bytes but the header declares {}",
                data.len(),
                header.rom.bytes
            );
        }
        Ok(Self {
            rom: data.into(),
            header,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub(crate) fn rom_handle(&self) -> Arc<[u8]> {
        Arc::clone(&self.rom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with(cart_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[CART_TYPE] = cart_type;
        rom[ROM_SIZE] = rom_code;
        rom[RAM_SIZE] = ram_code;
        rom
    }

    #[test]
    fn parses_title_and_flags() {
        let mut rom = rom_with(0x03, 0x01, 0x03);
        rom[0x0134..0x013B].copy_from_slice(b"TETRIS ");
        rom[CGB_FLAG] = 0x80;
        rom[SGB_FLAG] = 0x03;
        rom[DESTINATION] = 0x01;
        rom[VERSION] = 0x02;
        rom[GLOBAL_CHECKSUM] = 0xBE;
        rom[GLOBAL_CHECKSUM + 1] = 0xEF;

        let header = Header::parse(&rom).unwrap();
        assert_eq!(header.title, "TETRIS");
        assert_eq!(header.cgb, CgbSupport::Allowed);
        assert!(header.sgb);
        assert_eq!(header.kind, CartKind::Mbc1);
        assert!(header.has_ram && header.has_battery && !header.has_rtc);
        assert_eq!(header.rom, RomSize { bytes: 0x10000, banks: 4 });
        assert_eq!(header.ram, RamSize { bytes: 0x8000, banks: 4 });
        assert_eq!(header.region, Region::Overseas);
        assert_eq!(header.version, 2);
        assert_eq!(header.global_checksum, 0xBEEF);
    }

    #[test]
    fn rom_size_codes() {
        assert_eq!(rom_size(0x00).unwrap().banks, 2);
        assert_eq!(rom_size(0x05).unwrap().bytes, 1024 * 1024);
        assert_eq!(rom_size(0x08).unwrap().banks, 512);
        assert_eq!(rom_size(0x52).unwrap().banks, 72);
        assert_eq!(rom_size(0x09), Err(EmuError::UnsupportedRomSize(0x09)));
    }

    #[test]
    fn unknown_type_is_rejected() {
        for code in [0x0B, 0x20, 0x22, 0xFC, 0xFF] {
            let rom = rom_with(code, 0, 0);
            assert_eq!(
                Cartridge::from_bytes(rom).unwrap_err(),
                EmuError::UnrecognizedCartridgeType(code)
            );
        }
    }

    #[test]
    fn truncated_image_is_rejected() {
        assert_eq!(
            Cartridge::from_bytes(vec![0; 0x100]).unwrap_err(),
            EmuError::TruncatedRom { len: 0x100 }
        );
    }

    #[test]
    fn mbc2_always_has_internal_ram() {
        let header = Header::parse(&rom_with(0x05, 0x01, 0x00)).unwrap();
        assert_eq!(header.ram, RamSize { bytes: MBC2_RAM_SIZE, banks: 1 });
    }

    #[test]
    fn ramless_types_ignore_ram_code() {
        let header = Header::parse(&rom_with(0x01, 0x01, 0x03)).unwrap();
        assert_eq!(header.ram.banks, 0);
    }

    #[test]
    fn header_checksum_matches_boot_rom_algorithm() {
        let mut rom = rom_with(0x00, 0x00, 0x00);
        rom[0x0134..0x0138].copy_from_slice(b"TEST");
        let expected = rom[0x0134..0x014D]
            .iter()
            .fold(0u8, |x, &b| x.wrapping_sub(b).wrapping_sub(1));
        rom[HEADER_CHECKSUM] = expected;
        let header = Header::parse(&rom).unwrap();
        assert!(header.checksum_ok());

        rom[HEADER_CHECKSUM] = expected.wrapping_add(1);
        assert!(!Header::parse(&rom).unwrap().checksum_ok());
    }
}
