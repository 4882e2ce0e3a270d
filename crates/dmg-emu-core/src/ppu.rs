use crate::bitmap::{Bitmap, Colour, PaletteGroup, Shade};
use crate::error::{EmuError, Result};
use crate::mmu::{BusDevice, INT_STAT, INT_VBLANK};
use crate::state::PpuState;
use crate::vram::{self, MapView, OAM_SIZE, SpriteView, TileAddressing, TileView, VRAM_SIZE};

#[cfg(feature = "ppu-trace")]
macro_rules! ppu_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*);
    };
}
#[cfg(not(feature = "ppu-trace"))]
macro_rules! ppu_trace {
    ($($arg:tt)*) => {};
}

// Screen resolution used by the Game Boy PPU
pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

// Timing per LCD mode in M-cycles
const OAM_SCAN_CYCLES: u32 = 20;
const DRAWING_CYCLES: u32 = 43;
const HBLANK_CYCLES: u32 = 51;
const VBLANK_LINE_CYCLES: u32 = 114;

pub const LINE_CYCLES: u32 = OAM_SCAN_CYCLES + DRAWING_CYCLES + HBLANK_CYCLES;
pub const FRAME_CYCLES: u32 = LINE_CYCLES * (LAST_LINE as u32 + 1);

const LAST_VISIBLE_LINE: u8 = SCREEN_HEIGHT as u8 - 1;
const LAST_LINE: u8 = 153;

// LCDC bits
const LCDC_BG_ENABLE: u8 = 0x01;
const LCDC_OBJ_ENABLE: u8 = 0x02;
const LCDC_OBJ_TALL: u8 = 0x04;
const LCDC_BG_MAP_HIGH: u8 = 0x08;
const LCDC_TILES_UNSIGNED: u8 = 0x10;
const LCDC_WINDOW_ENABLE: u8 = 0x20;
const LCDC_WINDOW_MAP_HIGH: u8 = 0x40;
const LCDC_LCD_ENABLE: u8 = 0x80;

// STAT interrupt enables
const STAT_HBLANK_IRQ: u8 = 0x08;
const STAT_VBLANK_IRQ: u8 = 0x10;
const STAT_OAM_IRQ: u8 = 0x20;
const STAT_LYC_IRQ: u8 = 0x40;
const STAT_ENABLE_MASK: u8 = 0x78;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mode {
    HBlank = 0,
    VBlank = 1,
    OamScan = 2,
    Drawing = 3,
}

impl Mode {
    fn budget(self) -> u32 {
        match self {
            Mode::OamScan => OAM_SCAN_CYCLES,
            Mode::Drawing => DRAWING_CYCLES,
            Mode::HBlank => HBLANK_CYCLES,
            Mode::VBlank => VBLANK_LINE_CYCLES,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Mode::HBlank,
            1 => Mode::VBlank,
            2 => Mode::OamScan,
            _ => Mode::Drawing,
        }
    }
}

/// Sprite pixel that currently wins a column of the scanline.
#[derive(Clone, Copy)]
struct ObjectPixel {
    x: u8,
    colour_id: u8,
    palette: u8,
    below_background: bool,
}

pub struct Ppu {
    vram: Box<[u8; VRAM_SIZE]>,
    oam: [u8; OAM_SIZE],

    lcdc: u8,
    stat: u8,
    scy: u8,
    scx: u8,
    ly: u8,
    lyc: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,

    mode: Mode,
    mode_clock: u32,

    /// Front buffer, the last complete frame.
    canvas: Bitmap,
    /// Back buffer the scanlines are composited into.
    buffer: Bitmap,
    just_flushed: bool,
    frames: u64,
}

impl Ppu {
    pub fn new() -> Self {
        let mut ppu = Self {
            vram: Box::new([0; VRAM_SIZE]),
            oam: [0; OAM_SIZE],
            lcdc: 0,
            stat: 0,
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            mode: Mode::VBlank,
            mode_clock: 0,
            canvas: Bitmap::new(SCREEN_WIDTH, SCREEN_HEIGHT),
            buffer: Bitmap::new(SCREEN_WIDTH, SCREEN_HEIGHT),
            just_flushed: false,
            frames: 0,
        };
        ppu.reset();
        ppu
    }

    pub fn lcd_enabled(&self) -> bool {
        self.lcdc & LCDC_LCD_ENABLE != 0
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn lcdc(&self) -> u8 {
        self.lcdc
    }

    pub fn vram(&self) -> &[u8] {
        &self.vram[..]
    }

    pub fn oam(&self) -> &[u8] {
        &self.oam
    }

    /// Store one OAM byte. Used by the DMA unit, which bypasses the bus.
    pub fn write_oam(&mut self, index: usize, val: u8) {
        if let Some(byte) = self.oam.get_mut(index) {
            *byte = val;
        }
    }

    /// The most recently completed frame.
    pub fn canvas(&self) -> &Bitmap {
        &self.canvas
    }

    /// True when the last [`Ppu::step`] swapped the frame buffers.
    pub fn has_buffer_just_flushed(&self) -> bool {
        self.just_flushed
    }

    /// Completed frames since reset.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn stat_value(&self) -> u8 {
        (self.stat & STAT_ENABLE_MASK)
            | 0x80
            | self.mode as u8
            | if self.ly == self.lyc { 0x04 } else { 0 }
    }

    fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc,
            0xFF41 => self.stat_value(),
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            _ => 0xFF,
        }
    }

    fn write_reg(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF40 => {
                let was_on = self.lcd_enabled();
                self.lcdc = val;
                match (was_on, self.lcd_enabled()) {
                    (false, true) => {
                        self.ly = 0;
                        self.mode_clock = 0;
                        self.mode = Mode::OamScan;
                        ppu_trace!("LCD on");
                    }
                    (true, false) => {
                        self.ly = 0;
                        self.mode_clock = 0;
                        self.mode = Mode::VBlank;
                        ppu_trace!("LCD off");
                    }
                    _ => {}
                }
            }
            0xFF41 => self.stat = val & STAT_ENABLE_MASK,
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            0xFF44 => {}
            0xFF45 => self.lyc = val,
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            _ => {}
        }
    }

    /// Advance by `m_cycles` machine cycles and return the interrupt
    /// requests (VBlank and/or STAT) raised on the way.
    pub fn step(&mut self, m_cycles: u32) -> u8 {
        self.just_flushed = false;

        // With the LCD off the PPU idles in a permanent VBlank.
        if !self.lcd_enabled() {
            self.ly = 0;
            self.mode_clock = 0;
            self.mode = Mode::VBlank;
            return 0;
        }

        let mut irq = 0;
        self.mode_clock += m_cycles;
        while self.mode_clock >= self.mode.budget() {
            self.mode_clock -= self.mode.budget();
            irq |= self.advance_mode();
        }
        irq
    }

    fn advance_mode(&mut self) -> u8 {
        let old = self.mode;
        let mut irq = 0;
        match old {
            Mode::OamScan => self.mode = Mode::Drawing,
            Mode::Drawing => {
                self.render_scanline();
                self.mode = Mode::HBlank;
            }
            Mode::HBlank => {
                if self.ly == LAST_VISIBLE_LINE {
                    self.mode = Mode::VBlank;
                    self.flush_buffer();
                    irq |= INT_VBLANK;
                } else {
                    self.mode = Mode::OamScan;
                }
                self.ly += 1;
            }
            Mode::VBlank => {
                self.ly += 1;
                if self.ly > LAST_LINE {
                    self.ly = 0;
                    self.mode = Mode::OamScan;
                }
            }
        }

        if self.mode != old {
            ppu_trace!("LY={} mode {:?} -> {:?}", self.ly, old, self.mode);
            let fire = match self.mode {
                Mode::OamScan => self.stat & STAT_OAM_IRQ != 0,
                Mode::Drawing => self.stat & STAT_LYC_IRQ != 0 && self.ly == self.lyc,
                Mode::HBlank => self.stat & STAT_HBLANK_IRQ != 0,
                Mode::VBlank => self.stat & STAT_VBLANK_IRQ != 0,
            };
            if fire {
                irq |= INT_STAT;
            }
        }
        irq
    }

    fn flush_buffer(&mut self) {
        std::mem::swap(&mut self.canvas, &mut self.buffer);
        self.just_flushed = true;
        self.frames = self.frames.wrapping_add(1);
    }

    #[inline(always)]
    fn dmg_shade(palette: u8, colour_id: u8) -> Shade {
        Shade::from_palette_value(palette >> (colour_id * 2))
    }

    fn tile_addressing(&self) -> TileAddressing {
        if self.lcdc & LCDC_TILES_UNSIGNED != 0 {
            TileAddressing::Unsigned
        } else {
            TileAddressing::Signed
        }
    }

    fn render_scanline(&mut self) {
        let ly = self.ly as usize;
        if ly >= SCREEN_HEIGHT {
            return;
        }

        // Background colour ids decide sprite priority, so keep them apart
        // from the shaded pixels.
        let mut bg_ids = [0u8; SCREEN_WIDTH];
        let mut line = [Colour::BACKGROUND_WHITE; SCREEN_WIDTH];
        let vram = &self.vram[..];
        let addressing = self.tile_addressing();

        if self.lcdc & LCDC_BG_ENABLE != 0 {
            let map = MapView::new(vram, self.lcdc & LCDC_BG_MAP_HIGH != 0);
            let y = (ly + self.scy as usize) & 0xFF;
            for (x, pixel) in line.iter_mut().enumerate() {
                let bx = (x + self.scx as usize) & 0xFF;
                let tile = TileView::new(vram, addressing.tile_number(map.tile_index(bx / 8, y / 8)));
                let id = tile.pixel(bx % 8, y % 8);
                bg_ids[x] = id;
                *pixel = Colour::new(PaletteGroup::Background, Self::dmg_shade(self.bgp, id));
            }
        }

        if self.lcdc & LCDC_WINDOW_ENABLE != 0 && self.wy <= self.ly {
            let map = MapView::new(vram, self.lcdc & LCDC_WINDOW_MAP_HIGH != 0);
            let left = self.wx as isize - 7;
            let y = (self.ly - self.wy) as usize;
            for x in left.max(0) as usize..SCREEN_WIDTH {
                let wx = (x as isize - left) as usize & 0xFF;
                let tile = TileView::new(vram, addressing.tile_number(map.tile_index(wx / 8, y / 8)));
                let id = tile.pixel(wx % 8, y % 8);
                bg_ids[x] = id;
                line[x] = Colour::new(PaletteGroup::Background, Self::dmg_shade(self.bgp, id));
            }
        }

        if self.lcdc & LCDC_OBJ_ENABLE != 0 {
            let objects = self.resolve_objects(ly as i16);
            for (x, obj) in objects.iter().enumerate() {
                let Some(obj) = obj else { continue };
                if obj.below_background && bg_ids[x] != 0 {
                    continue;
                }
                let (group, palette) = if obj.palette == 0 {
                    (PaletteGroup::Object0, self.obp0)
                } else {
                    (PaletteGroup::Object1, self.obp1)
                };
                line[x] = Colour::new(group, Self::dmg_shade(palette, obj.colour_id));
            }
        }

        self.buffer.row_mut(ly).copy_from_slice(&line);
    }

    /// For each column, the opaque sprite pixel with the smallest
    /// (X, OAM index) among all sprites covering `line`.
    fn resolve_objects(&self, line: i16) -> [Option<ObjectPixel>; SCREEN_WIDTH] {
        let mut owners: [Option<ObjectPixel>; SCREEN_WIDTH] = [None; SCREEN_WIDTH];
        let height: i16 = if self.lcdc & LCDC_OBJ_TALL != 0 { 16 } else { 8 };
        let vram = &self.vram[..];

        for sprite in vram::sprites(&self.oam) {
            let mut row = line - sprite.top();
            if !(0..height).contains(&row) {
                continue;
            }
            if sprite.flip_y() {
                row = height - 1 - row;
            }
            let tile = Self::sprite_tile(&sprite, height, row);
            let tile = TileView::new(vram, tile);
            for px in 0..8i16 {
                let sx = sprite.left() + px;
                if !(0..SCREEN_WIDTH as i16).contains(&sx) {
                    continue;
                }
                let tx = if sprite.flip_x() { 7 - px } else { px };
                let colour_id = tile.pixel(tx as usize, (row & 7) as usize);
                if colour_id == 0 {
                    continue;
                }
                let slot = &mut owners[sx as usize];
                // OAM is walked in index order, so only a strictly smaller X
                // takes over a column.
                if slot.is_some_and(|owner| owner.x <= sprite.x()) {
                    continue;
                }
                *slot = Some(ObjectPixel {
                    x: sprite.x(),
                    colour_id,
                    palette: sprite.palette(),
                    below_background: sprite.below_background(),
                });
            }
        }
        owners
    }

    fn sprite_tile(sprite: &SpriteView<'_>, height: i16, row: i16) -> usize {
        if height == 16 {
            ((sprite.tile() & 0xFE) | (row >= 8) as u8) as usize
        } else {
            sprite.tile() as usize
        }
    }

    pub fn state(&self) -> PpuState {
        PpuState {
            lcdc: self.lcdc,
            stat: self.stat_value(),
            scx: self.scx,
            scy: self.scy,
            wx: self.wx,
            wy: self.wy,
            lyc: self.lyc,
            ly: self.ly,
            bgp: self.bgp,
            obp0: self.obp0,
            obp1: self.obp1,
            oam: self.oam.to_vec(),
            vram: self.vram.to_vec(),
        }
    }

    pub fn restore_state(&mut self, state: &PpuState) -> Result<()> {
        if state.oam.len() != OAM_SIZE {
            return Err(EmuError::InvalidState("OAM must be 160 bytes"));
        }
        if state.vram.len() != VRAM_SIZE {
            return Err(EmuError::InvalidState("VRAM must be 8192 bytes"));
        }
        let mode = Mode::from_bits(state.stat);
        if state.ly > LAST_LINE {
            return Err(EmuError::InvalidState("LY must be at most 153"));
        }
        // Lines past the visible area only exist inside VBlank.
        if state.ly > LAST_VISIBLE_LINE && mode != Mode::VBlank {
            return Err(EmuError::InvalidState("LY is past the screen outside VBlank"));
        }
        self.lcdc = state.lcdc;
        self.stat = state.stat & STAT_ENABLE_MASK;
        self.mode = mode;
        self.mode_clock = 0;
        self.scx = state.scx;
        self.scy = state.scy;
        self.wx = state.wx;
        self.wy = state.wy;
        self.lyc = state.lyc;
        self.ly = state.ly;
        self.bgp = state.bgp;
        self.obp0 = state.obp0;
        self.obp1 = state.obp1;
        self.oam.copy_from_slice(&state.oam);
        self.vram.copy_from_slice(&state.vram);
        Ok(())
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDevice for Ppu {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x8000..=0x9FFF => self.vram[(addr & 0x1FFF) as usize],
            0xFE00..=0xFE9F => self.oam[(addr - 0xFE00) as usize],
            _ => self.read_reg(addr),
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x8000..=0x9FFF => self.vram[(addr & 0x1FFF) as usize] = val,
            0xFE00..=0xFE9F => self.oam[(addr - 0xFE00) as usize] = val,
            _ => self.write_reg(addr, val),
        }
    }

    fn reset(&mut self) {
        self.lcdc = 0;
        self.stat = 0;
        self.scy = 0;
        self.scx = 0;
        self.ly = 0;
        self.lyc = 0;
        self.bgp = 0;
        self.obp0 = 0;
        self.obp1 = 0;
        self.wy = 0;
        self.wx = 0;
        self.mode = Mode::VBlank;
        self.mode_clock = 0;
        self.vram.fill(0);
        self.oam.fill(0);
        self.canvas.fill(Colour::BACKGROUND_WHITE);
        self.buffer.fill(Colour::BACKGROUND_WHITE);
        self.just_flushed = false;
        self.frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcd_on(lcdc: u8) -> Ppu {
        let mut ppu = Ppu::new();
        ppu.write(0xFF47, 0xE4);
        ppu.write(0xFF48, 0xE4);
        ppu.write(0xFF49, 0x1B);
        ppu.write(0xFF40, LCDC_LCD_ENABLE | lcdc);
        ppu
    }

    fn solid_tile(ppu: &mut Ppu, tile: usize, colour_id: u8) {
        let lo = if colour_id & 1 != 0 { 0xFF } else { 0 };
        let hi = if colour_id & 2 != 0 { 0xFF } else { 0 };
        for row in 0..8 {
            ppu.vram[tile * 16 + row * 2] = lo;
            ppu.vram[tile * 16 + row * 2 + 1] = hi;
        }
    }

    fn run_frame(ppu: &mut Ppu) {
        for _ in 0..FRAME_CYCLES {
            ppu.step(1);
            if ppu.has_buffer_just_flushed() {
                return;
            }
        }
    }

    #[test]
    fn line_and_frame_timing() {
        assert_eq!(LINE_CYCLES, 114);
        assert_eq!(FRAME_CYCLES, 17_556);

        let mut ppu = lcd_on(0);
        assert_eq!(ppu.mode(), Mode::OamScan);
        ppu.step(20);
        assert_eq!(ppu.mode(), Mode::Drawing);
        ppu.step(43);
        assert_eq!(ppu.mode(), Mode::HBlank);
        ppu.step(51);
        assert_eq!(ppu.mode(), Mode::OamScan);
        assert_eq!(ppu.ly(), 1);
    }

    #[test]
    fn large_steps_carry_the_remainder() {
        let mut ppu = lcd_on(0);
        let irq = ppu.step(LINE_CYCLES * 144);
        assert_eq!(irq & INT_VBLANK, INT_VBLANK);
        assert!(ppu.has_buffer_just_flushed());
        assert_eq!(ppu.ly(), 144);
        assert_eq!(ppu.mode(), Mode::VBlank);

        ppu.step(LINE_CYCLES * 10 - 1);
        assert!(!ppu.has_buffer_just_flushed());
        assert_eq!(ppu.ly(), 153);
        ppu.step(1);
        assert_eq!(ppu.ly(), 0);
        assert_eq!(ppu.mode(), Mode::OamScan);
    }

    #[test]
    fn lcd_off_idles_in_vblank() {
        let mut ppu = lcd_on(0);
        ppu.step(300);
        ppu.write(0xFF40, 0);
        assert_eq!(ppu.step(10_000), 0);
        assert_eq!(ppu.mode(), Mode::VBlank);
        assert_eq!(ppu.ly(), 0);
        assert_eq!(ppu.read(0xFF41) & 0x03, Mode::VBlank as u8);
    }

    #[test]
    fn stat_interrupts_follow_enables() {
        let mut ppu = lcd_on(0);
        ppu.write(0xFF41, STAT_HBLANK_IRQ);
        assert_eq!(ppu.step(20), 0);
        assert_eq!(ppu.step(43), INT_STAT);
        assert_eq!(ppu.step(51), 0);

        ppu.write(0xFF41, STAT_LYC_IRQ);
        ppu.write(0xFF45, 1);
        assert_eq!(ppu.step(20), INT_STAT);
        assert_eq!(ppu.read(0xFF41) & 0x04, 0x04);
    }

    #[test]
    fn stat_reads_and_writes_mask_bits() {
        let mut ppu = Ppu::new();
        ppu.write(0xFF41, 0xFF);
        assert_eq!(ppu.read(0xFF41), 0x80 | 0x78 | 0x04 | Mode::VBlank as u8);
        ppu.write(0xFF44, 0x22);
        assert_eq!(ppu.read(0xFF44), 0);
    }

    #[test]
    fn background_scrolls_and_wraps() {
        let mut ppu = lcd_on(LCDC_BG_ENABLE | LCDC_TILES_UNSIGNED);
        solid_tile(&mut ppu, 1, 3);
        // Map column 31 holds tile 1, everything else tile 0.
        for row in 0..32 {
            ppu.vram[0x1800 + row * 32 + 31] = 1;
        }
        ppu.write(0xFF43, 252);
        run_frame(&mut ppu);

        let dark = Colour::new(PaletteGroup::Background, Shade::Dark);
        let white = Colour::BACKGROUND_WHITE;
        assert_eq!(ppu.canvas().get(0, 0), dark);
        assert_eq!(ppu.canvas().get(3, 100), dark);
        assert_eq!(ppu.canvas().get(4, 0), white);
    }

    #[test]
    fn signed_tiles_and_window() {
        let mut ppu = lcd_on(LCDC_BG_ENABLE | LCDC_WINDOW_ENABLE | LCDC_WINDOW_MAP_HIGH);
        // Signed index 0 is tile 256.
        solid_tile(&mut ppu, 256, 1);
        for i in 0..0x400 {
            ppu.vram[0x1C00 + i] = 0x80;
        }
        solid_tile(&mut ppu, 128, 2);
        ppu.write(0xFF4A, 10);
        ppu.write(0xFF4B, 7 + 40);
        run_frame(&mut ppu);

        let light = Colour::new(PaletteGroup::Background, Shade::Light);
        let medium = Colour::new(PaletteGroup::Background, Shade::Medium);
        assert_eq!(ppu.canvas().get(50, 5), light);
        assert_eq!(ppu.canvas().get(39, 20), light);
        assert_eq!(ppu.canvas().get(40, 20), medium);
    }

    #[test]
    fn sprite_priority_by_x_then_index() {
        let mut ppu = lcd_on(LCDC_OBJ_ENABLE);
        solid_tile(&mut ppu, 1, 1);
        solid_tile(&mut ppu, 2, 3);
        // Sprite 0 at x=20 (tile 1), sprite 1 at x=16 (tile 2), same rows.
        ppu.oam[0..4].copy_from_slice(&[16, 20 + 8, 1, 0]);
        ppu.oam[4..8].copy_from_slice(&[16, 16 + 8, 2, 0x10]);
        // Sprite 2 overlaps sprite 1 exactly but has a higher index.
        ppu.oam[8..12].copy_from_slice(&[16, 16 + 8, 1, 0]);
        run_frame(&mut ppu);

        let c = ppu.canvas();
        // OBP1 = 0x1B maps colour id 3 to white.
        assert_eq!(c.get(16, 0), Colour::new(PaletteGroup::Object1, Shade::White));
        assert_eq!(c.get(23, 0), Colour::new(PaletteGroup::Object1, Shade::White));
        assert_eq!(c.get(24, 0), Colour::new(PaletteGroup::Object0, Shade::Light));
        assert_eq!(c.get(27, 7), Colour::new(PaletteGroup::Object0, Shade::Light));
        assert_eq!(c.get(28, 0), Colour::BACKGROUND_WHITE);
        assert_eq!(c.get(16, 8), Colour::BACKGROUND_WHITE);
    }

    #[test]
    fn below_background_sprite_yields_to_opaque_background() {
        let mut ppu = lcd_on(LCDC_BG_ENABLE | LCDC_OBJ_ENABLE | LCDC_TILES_UNSIGNED);
        solid_tile(&mut ppu, 1, 2);
        solid_tile(&mut ppu, 2, 3);
        ppu.vram[0x1800] = 1;
        ppu.oam[0..4].copy_from_slice(&[16, 8 + 4, 2, 0x80]);
        run_frame(&mut ppu);

        let c = ppu.canvas();
        assert_eq!(c.get(4, 0), Colour::new(PaletteGroup::Background, Shade::Medium));
        assert_eq!(c.get(8, 0), Colour::new(PaletteGroup::Object0, Shade::Dark));
    }

    #[test]
    fn tall_sprites_flip_vertically() {
        let mut ppu = lcd_on(LCDC_OBJ_ENABLE | LCDC_OBJ_TALL);
        solid_tile(&mut ppu, 4, 1);
        solid_tile(&mut ppu, 5, 2);
        ppu.oam[0..4].copy_from_slice(&[16, 8, 5, 0x40]);
        run_frame(&mut ppu);

        let c = ppu.canvas();
        assert_eq!(c.get(0, 0), Colour::new(PaletteGroup::Object0, Shade::Medium));
        assert_eq!(c.get(0, 15), Colour::new(PaletteGroup::Object0, Shade::Light));
    }

    #[test]
    fn state_round_trip_restores_mode() {
        let mut ppu = lcd_on(0);
        ppu.write(0xFF41, STAT_OAM_IRQ);
        ppu.step(25);
        let state = ppu.state();

        let mut other = Ppu::new();
        other.restore_state(&state).expect("valid state");
        assert_eq!(other.mode(), Mode::Drawing);
        assert_eq!(other.state(), state);

        let mut bad = state.clone();
        bad.oam.pop();
        assert!(other.restore_state(&bad).is_err());
    }

    #[test]
    fn restore_rejects_impossible_lines() {
        let mut ppu = lcd_on(0);
        let good = ppu.state();

        let mut bad = good.clone();
        bad.ly = 250;
        assert_eq!(
            ppu.restore_state(&bad),
            Err(EmuError::InvalidState("LY must be at most 153"))
        );

        // Line 150 while in HBlank.
        bad.ly = 150;
        bad.stat &= !0x03;
        assert!(ppu.restore_state(&bad).is_err());
        assert_eq!(ppu.state(), good);

        // Line 150 in VBlank is a real position and keeps stepping safely.
        bad.stat |= Mode::VBlank as u8;
        ppu.restore_state(&bad).expect("vblank line");
        for _ in 0..FRAME_CYCLES {
            ppu.step(1);
        }
        assert!(ppu.state().ly <= LAST_LINE);
    }
}
