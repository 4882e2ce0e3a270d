use crate::mmu::BusDevice;

const SELECT_DIRECTIONS: u8 = 0x10;
const SELECT_BUTTONS: u8 = 0x20;
const SELECT_MASK: u8 = SELECT_DIRECTIONS | SELECT_BUTTONS;

/// A key on the console. Directions and buttons live in separate rows of
/// the joypad matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Right,
    Left,
    Up,
    Down,
    A,
    B,
    Select,
    Start,
}

impl Key {
    pub const ALL: [Key; 8] = [
        Key::Right,
        Key::Left,
        Key::Up,
        Key::Down,
        Key::A,
        Key::B,
        Key::Select,
        Key::Start,
    ];

    fn bit(self) -> u8 {
        match self {
            Key::Right | Key::A => 0x01,
            Key::Left | Key::B => 0x02,
            Key::Up | Key::Select => 0x04,
            Key::Down | Key::Start => 0x08,
        }
    }

    fn is_direction(self) -> bool {
        matches!(self, Key::Right | Key::Left | Key::Up | Key::Down)
    }
}

/// Joypad register at 0xFF00. Both rows are active low.
#[derive(Debug, Clone)]
pub struct Input {
    directions: u8,
    buttons: u8,
    select: u8,
}

impl Input {
    pub fn new() -> Self {
        Self {
            directions: 0x0F,
            buttons: 0x0F,
            select: SELECT_MASK,
        }
    }

    fn row_mut(&mut self, key: Key) -> &mut u8 {
        if key.is_direction() {
            &mut self.directions
        } else {
            &mut self.buttons
        }
    }

    /// Mark `key` as held. Returns `true` when the key was previously up,
    /// which is the edge that raises the joypad interrupt.
    pub fn press(&mut self, key: Key) -> bool {
        let bit = key.bit();
        let row = self.row_mut(key);
        let was_up = *row & bit != 0;
        *row &= !bit;
        was_up
    }

    pub fn release(&mut self, key: Key) {
        let bit = key.bit();
        *self.row_mut(key) |= bit;
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        let row = if key.is_direction() {
            self.directions
        } else {
            self.buttons
        };
        row & key.bit() == 0
    }

    fn selected_row(&self) -> u8 {
        let mut row = 0x0F;
        if self.select & SELECT_DIRECTIONS == 0 {
            row &= self.directions;
        }
        if self.select & SELECT_BUTTONS == 0 {
            row &= self.buttons;
        }
        row
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}

impl BusDevice for Input {
    fn read(&self, _addr: u16) -> u8 {
        0xC0 | self.select | self.selected_row()
    }

    fn write(&mut self, _addr: u16, val: u8) {
        self.select = val & SELECT_MASK;
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}
