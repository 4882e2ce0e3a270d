//! Read-only views over VRAM and OAM.
//!
//! The PPU owns the raw bytes; these types borrow slices of them and decode
//! tiles, background maps and sprite attributes on demand.

pub const VRAM_SIZE: usize = 0x2000;
pub const OAM_SIZE: usize = 0xA0;
pub const TILE_COUNT: usize = 384;
pub const SPRITE_COUNT: usize = 40;

const TILE_BYTES: usize = 16;
const MAP_9800: usize = 0x1800;
const MAP_9C00: usize = 0x1C00;
const MAP_SIZE: usize = 0x400;

// OAM attribute flags
const FLAG_BELOW_BG: u8 = 0x80;
const FLAG_FLIP_Y: u8 = 0x40;
const FLAG_FLIP_X: u8 = 0x20;
const FLAG_PALETTE: u8 = 0x10;

/// How a background/window map entry selects its tile (LCDC bit 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileAddressing {
    /// Base 0x8000, unsigned index.
    Unsigned,
    /// Base 0x9000, signed index.
    Signed,
}

impl TileAddressing {
    pub fn tile_number(self, index: u8) -> usize {
        match self {
            TileAddressing::Unsigned => index as usize,
            TileAddressing::Signed => (256 + (index as i8) as isize) as usize,
        }
    }
}

/// One 8x8 tile, two bytes per row, low bitplane first.
#[derive(Debug, Clone, Copy)]
pub struct TileView<'a> {
    number: usize,
    bytes: &'a [u8],
}

impl<'a> TileView<'a> {
    /// `number` is taken modulo [`TILE_COUNT`].
    pub fn new(vram: &'a [u8], number: usize) -> Self {
        let number = number % TILE_COUNT;
        let start = number * TILE_BYTES;
        Self {
            number,
            bytes: &vram[start..start + TILE_BYTES],
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    /// The 2-bit colour id at (`x`, `y`), both in 0..8.
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        let lo = self.bytes[(y & 7) * 2];
        let hi = self.bytes[(y & 7) * 2 + 1];
        let bit = 7 - (x & 7);
        (((hi >> bit) & 1) << 1) | ((lo >> bit) & 1)
    }
}

/// A 32x32 grid of tile indices.
#[derive(Debug, Clone, Copy)]
pub struct MapView<'a> {
    bytes: &'a [u8],
}

impl<'a> MapView<'a> {
    /// The map at 0x9C00 when `high` is set, otherwise 0x9800.
    pub fn new(vram: &'a [u8], high: bool) -> Self {
        let start = if high { MAP_9C00 } else { MAP_9800 };
        Self {
            bytes: &vram[start..start + MAP_SIZE],
        }
    }

    pub fn tile_index(&self, col: usize, row: usize) -> u8 {
        self.bytes[(row & 31) * 32 + (col & 31)]
    }
}

/// One four-byte OAM entry.
#[derive(Debug, Clone, Copy)]
pub struct SpriteView<'a> {
    index: usize,
    bytes: &'a [u8],
}

impl<'a> SpriteView<'a> {
    pub fn new(oam: &'a [u8], index: usize) -> Self {
        let start = (index % SPRITE_COUNT) * 4;
        Self {
            index: index % SPRITE_COUNT,
            bytes: &oam[start..start + 4],
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn y(&self) -> u8 {
        self.bytes[0]
    }

    pub fn x(&self) -> u8 {
        self.bytes[1]
    }

    pub fn tile(&self) -> u8 {
        self.bytes[2]
    }

    pub fn flags(&self) -> u8 {
        self.bytes[3]
    }

    /// Screen row of the sprite's first line.
    pub fn top(&self) -> i16 {
        self.y() as i16 - 16
    }

    /// Screen column of the sprite's first pixel.
    pub fn left(&self) -> i16 {
        self.x() as i16 - 8
    }

    pub fn below_background(&self) -> bool {
        self.flags() & FLAG_BELOW_BG != 0
    }

    pub fn flip_y(&self) -> bool {
        self.flags() & FLAG_FLIP_Y != 0
    }

    pub fn flip_x(&self) -> bool {
        self.flags() & FLAG_FLIP_X != 0
    }

    /// 0 for OBP0, 1 for OBP1.
    pub fn palette(&self) -> u8 {
        (self.flags() & FLAG_PALETTE != 0) as u8
    }
}

/// Every OAM entry in index order.
pub fn sprites(oam: &[u8]) -> impl Iterator<Item = SpriteView<'_>> {
    (0..SPRITE_COUNT).map(move |i| SpriteView::new(oam, i))
}
