use crate::mmu::BusDevice;

const WRAM_SIZE: usize = 0x2000;
const HRAM_SIZE: usize = 0x7F;
const HRAM_BASE: u16 = 0xFF80;

/// Internal work RAM at 0xC000-0xDFFF. The echo range 0xE000-0xFDFF aliases it.
pub struct WorkRam {
    data: Box<[u8; WRAM_SIZE]>,
}

impl WorkRam {
    pub fn new() -> Self {
        Self {
            data: Box::new([0; WRAM_SIZE]),
        }
    }
}

impl Default for WorkRam {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDevice for WorkRam {
    fn read(&self, addr: u16) -> u8 {
        self.data[addr as usize & (WRAM_SIZE - 1)]
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.data[addr as usize & (WRAM_SIZE - 1)] = val;
    }

    fn reset(&mut self) {
        self.data.fill(0);
    }
}

/// Zero-page RAM at 0xFF80-0xFFFE.
pub struct HighRam {
    data: [u8; HRAM_SIZE],
}

impl HighRam {
    pub fn new() -> Self {
        Self {
            data: [0; HRAM_SIZE],
        }
    }
}

impl Default for HighRam {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDevice for HighRam {
    fn read(&self, addr: u16) -> u8 {
        self.data
            .get(addr.wrapping_sub(HRAM_BASE) as usize)
            .copied()
            .unwrap_or(0xFF)
    }

    fn write(&mut self, addr: u16, val: u8) {
        if let Some(b) = self.data.get_mut(addr.wrapping_sub(HRAM_BASE) as usize) {
            *b = val;
        }
    }

    fn reset(&mut self) {
        self.data.fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_aliases_work_ram() {
        let mut wram = WorkRam::new();
        wram.write(0xC123, 0x5A);
        assert_eq!(wram.read(0xE123), 0x5A);
        wram.write(0xFDFF, 0xA5);
        assert_eq!(wram.read(0xDDFF), 0xA5);
    }

    #[test]
    fn high_ram_bounds() {
        let mut hram = HighRam::new();
        hram.write(0xFF80, 1);
        hram.write(0xFFFE, 2);
        assert_eq!(hram.read(0xFF80), 1);
        assert_eq!(hram.read(0xFFFE), 2);
        assert_eq!(hram.read(0xFFFF), 0xFF);
        hram.reset();
        assert_eq!(hram.read(0xFFFE), 0);
    }
}
