use crate::mmu::BusDevice;

const T_CYCLES_PER_M_CYCLE: u32 = 4;
const TAC_ENABLE: u8 = 0x04;

/// Divider and programmable timer (DIV/TIMA/TMA/TAC).
///
/// TIMA is clocked by the falling edge of one bit of the 16-bit divider,
/// ANDed with the enable bit, so DIV resets and TAC writes can both produce
/// an extra increment exactly as on hardware.
#[derive(Debug, Default)]
pub struct Timer {
    /// 16-bit internal divider counter. DIV register is the upper 8 bits.
    div: u16,
    tima: u8,
    tma: u8,
    tac: u8,
    last_signal: bool,
    irq_pending: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn div(&self) -> u16 {
        self.div
    }

    /// Advance by `m_cycles` machine cycles. Returns true when TIMA
    /// overflowed at least once, which requests the timer interrupt.
    pub fn step(&mut self, m_cycles: u32) -> bool {
        for _ in 0..m_cycles * T_CYCLES_PER_M_CYCLE {
            self.div = self.div.wrapping_add(1);
            self.update_signal();
        }
        std::mem::take(&mut self.irq_pending)
    }

    /// Take an overflow caused by a register write rather than by stepping.
    pub fn take_interrupt(&mut self) -> bool {
        std::mem::take(&mut self.irq_pending)
    }

    fn update_signal(&mut self) {
        let signal = Self::signal_with(self.div, self.tac);
        if self.last_signal && !signal {
            self.increment();
        }
        self.last_signal = signal;
    }

    fn increment(&mut self) {
        let (val, overflow) = self.tima.overflowing_add(1);
        if overflow {
            self.tima = self.tma;
            self.irq_pending = true;
        } else {
            self.tima = val;
        }
    }

    fn timer_bit_with(div: u16, tac: u8) -> u8 {
        match tac & 0x03 {
            0x00 => ((div >> 9) & 1) as u8,
            0x01 => ((div >> 3) & 1) as u8,
            0x02 => ((div >> 5) & 1) as u8,
            _ => ((div >> 7) & 1) as u8,
        }
    }

    fn signal_with(div: u16, tac: u8) -> bool {
        tac & TAC_ENABLE != 0 && Self::timer_bit_with(div, tac) != 0
    }
}

impl BusDevice for Timer {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.div >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04 => {
                self.div = 0;
                self.update_signal();
            }
            0xFF05 => self.tima = val,
            0xFF06 => self.tma = val,
            0xFF07 => {
                self.tac = val & 0x07;
                self.update_signal();
            }
            _ => {}
        }
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}
