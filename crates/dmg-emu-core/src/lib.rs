//! Game Boy (DMG) emulation core.
//!
//! This crate contains the platform-agnostic emulator logic: the LR35902
//! interpreter, the memory bus, cartridge controllers, the PPU compositor and
//! the small IO devices. Frontends drive it through the [`gameboy`] facade,
//! which advances everything in lockstep one CPU step at a time.

/// Palette-tagged frame buffers.
pub mod bitmap;

/// Cartridge images and header parsing.
pub mod cartridge;

/// Machine-cycle accounting for the CPU.
pub mod clock;

/// LR35902 CPU core.
pub mod cpu;

/// Error types shared by the whole core.
pub mod error;

/// High-level facade that wires the CPU and bus into a single machine.
pub mod gameboy;

/// Joypad register.
pub mod input;

/// Memory bank controllers (MBC1/2/3/5).
pub mod mbc;

/// Work RAM and zero-page RAM.
pub mod memory;

/// Memory map and interrupt plumbing.
pub mod mmu;

/// Operation tables for both opcode spaces.
pub mod opcodes;

/// Pixel Processing Unit (PPU) emulation.
pub mod ppu;

/// CPU register file.
pub mod registers;

/// MBC3 real-time clock.
pub mod rtc;

/// Serial unit and link cable plumbing.
pub mod serial;

/// Save-state snapshots.
pub mod state;

/// Divider/timer unit.
pub mod timer;

/// Tile, map and sprite views over video memory.
pub mod vram;

pub use error::{EmuError, Result};
pub use gameboy::GameBoy;
