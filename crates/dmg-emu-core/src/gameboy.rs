use log::{debug, info, warn};

use crate::{
    bitmap::Bitmap,
    cartridge::{CartKind, Cartridge, MBC2_RAM_SIZE, RAM_BANK_SIZE},
    cpu::Cpu,
    error::{EmuError, Result},
    input::Key,
    mbc::Mbc,
    mmu::{INT_JOYPAD, INT_TIMER, Mmu},
    ppu::FRAME_CYCLES,
    rtc::{RtcClock, SystemClock},
    serial::LinkPort,
    state::{CartState, ConsoleState, CpuState},
};

// IO register values the boot ROM leaves behind.
const BOOT_LCDC: u8 = 0x91;
const BOOT_BGP: u8 = 0xFC;
const BOOT_OBP: u8 = 0xFF;

type ClockFactory = Box<dyn Fn() -> Box<dyn RtcClock> + Send>;

/// The console: CPU, bus and every device behind it, advanced in lockstep.
pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    cartridge: Option<Cartridge>,
    rtc_clock: ClockFactory,
    /// Set once the CPU hits an opcode it cannot execute. Stepping refuses to
    /// continue until a cartridge is loaded again.
    fault: Option<(u8, u16)>,
}

impl GameBoy {
    pub fn new() -> Self {
        Self::with_clock(|| Box::new(SystemClock))
    }

    /// Like [`GameBoy::new`], but every cartridge loaded afterwards gets its
    /// real-time clock from `factory`.
    pub fn with_clock<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn RtcClock> + Send + 'static,
    {
        let mut gb = Self {
            cpu: Cpu::new(),
            mmu: Mmu::new(),
            cartridge: None,
            rtc_clock: Box::new(factory),
            fault: None,
        };
        gb.reset();
        gb
    }

    /// Return to the post-boot state, keeping the cartridge in its slot.
    pub fn reset(&mut self) {
        debug!("Resetting console");
        let cgb = self
            .cartridge
            .as_ref()
            .is_some_and(|c| c.header().cgb_flag());
        self.mmu.reset();
        self.cpu.reset(cgb);
        self.mmu.write_byte(0xFF40, BOOT_LCDC);
        self.mmu.write_byte(0xFF47, BOOT_BGP);
        self.mmu.write_byte(0xFF48, BOOT_OBP);
        self.mmu.write_byte(0xFF49, BOOT_OBP);
        self.mmu.write_byte(0xFFFF, 0x00);
        self.fault = None;
    }

    /// Insert a cartridge and restart the console with it.
    pub fn load_cartridge(&mut self, cart: Cartridge) {
        let mbc = Mbc::with_clock(&cart, (self.rtc_clock)());
        let header = cart.header();
        info!(
            "Loaded '{}': {:?}, {} ROM banks, {} RAM banks{}",
            header.title,
            header.kind,
            header.rom.banks,
            mbc.ram_bank_count(),
            if header.has_battery { ", battery" } else { "" }
        );
        self.mmu.load_cartridge(mbc);
        self.cartridge = Some(cart);
        self.reset();
    }

    /// Parse `rom` and load it.
    pub fn load_rom(&mut self, rom: Vec<u8>) -> Result<()> {
        let cart = Cartridge::from_bytes(rom)?;
        self.load_cartridge(cart);
        Ok(())
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn mmu_mut(&mut self) -> &mut Mmu {
        &mut self.mmu
    }

    /// The last complete frame.
    pub fn canvas(&self) -> &Bitmap {
        self.mmu.ppu.canvas()
    }

    /// Run one CPU step, then advance the PPU and timer by the same number of
    /// machine cycles. Returns the cycles consumed.
    pub fn dispatch(&mut self) -> Result<u32> {
        if let Some((opcode, pc)) = self.fault {
            return Err(EmuError::Faulted { opcode, pc });
        }
        if self.cartridge.is_none() {
            return Err(EmuError::NoCartridge);
        }

        let cycles = match self.cpu.step(&mut self.mmu) {
            Ok(cycles) => cycles,
            Err(err) => {
                warn!("Console faulted: {err}");
                if let EmuError::UnsupportedOpcode { opcode, pc, .. } = err {
                    self.fault = Some((opcode, pc));
                }
                return Err(err);
            }
        };

        let ppu_irq = self.mmu.ppu.step(cycles);
        self.mmu.request_interrupt(ppu_irq);
        if self.mmu.timer.step(cycles) {
            self.mmu.request_interrupt(INT_TIMER);
        }
        Ok(cycles)
    }

    /// Dispatch until the PPU finishes a frame and return it.
    ///
    /// With the LCD off no frame ever completes, so once a full frame period
    /// has passed with the display disabled the previous canvas is returned
    /// unchanged.
    pub fn dispatch_until_buffer_flush(&mut self) -> Result<&Bitmap> {
        let mut dark_cycles = 0;
        loop {
            let cycles = self.dispatch()?;
            if self.mmu.ppu.has_buffer_just_flushed() {
                return Ok(self.mmu.ppu.canvas());
            }
            if self.mmu.ppu.lcd_enabled() {
                dark_cycles = 0;
            } else {
                dark_cycles += cycles;
                if dark_cycles >= FRAME_CYCLES {
                    return Ok(self.mmu.ppu.canvas());
                }
            }
        }
    }

    pub fn key_down(&mut self, key: Key) {
        if self.mmu.input.press(key) {
            self.mmu.request_interrupt(INT_JOYPAD);
        }
    }

    pub fn key_up(&mut self, key: Key) {
        self.mmu.input.release(key);
    }

    pub fn connect_serial(&mut self, port: Box<dyn LinkPort>) {
        self.mmu.serial.connect(port);
    }

    pub fn serial_output(&self) -> &[u8] {
        self.mmu.serial.peek_output()
    }

    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.mmu.serial.take_output()
    }

    pub fn get_state(&self) -> ConsoleState {
        ConsoleState {
            cpu: CpuState::from(&self.cpu.regs),
            ppu: self.mmu.ppu.state(),
            cart: CartState {
                ram_banks: self
                    .mmu
                    .cartridge()
                    .map(|mbc| mbc.ram_banks())
                    .unwrap_or_default(),
            },
        }
    }

    /// Restore a snapshot taken with [`GameBoy::get_state`]. Nothing is
    /// changed unless every buffer has the expected size and the PPU
    /// position is reachable. A pending HALT or a sticky fault is dropped.
    pub fn set_state(&mut self, state: &ConsoleState) -> Result<()> {
        self.validate_cart_state(&state.cart)?;
        self.mmu.ppu.restore_state(&state.ppu)?;
        state.cpu.apply(&mut self.cpu.regs);
        self.cpu.exit_halt();
        self.fault = None;
        if let Some(mbc) = self.mmu.cartridge_mut() {
            mbc.load_ram_banks(&state.cart.ram_banks);
        }
        debug!("Restored console state at PC={:04X}", state.cpu.pc);
        Ok(())
    }

    fn validate_cart_state(&self, cart: &CartState) -> Result<()> {
        let Some(mbc) = self.mmu.cartridge() else {
            return if cart.ram_banks.is_empty() {
                Ok(())
            } else {
                Err(EmuError::InvalidState("no cartridge to receive RAM banks"))
            };
        };
        if cart.ram_banks.len() != mbc.ram_bank_count() {
            return Err(EmuError::InvalidState("RAM bank count mismatch"));
        }
        let bank_size = if mbc.kind() == CartKind::Mbc2 {
            MBC2_RAM_SIZE
        } else {
            RAM_BANK_SIZE
        };
        if cart.ram_banks.iter().any(|bank| bank.len() != bank_size) {
            return Err(EmuError::InvalidState("RAM bank size mismatch"));
        }
        Ok(())
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}
