use thiserror::Error;

/// Failures surfaced by the emulator core.
///
/// Out-of-range bank indices and unmapped addresses are never errors; those
/// are masked or read back as open bus. Only decode-time problems that make
/// further execution meaningless are reported here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmuError {
    /// Only the unprefixed table has holes; every CB-prefixed byte decodes.
    #[error("unsupported opcode {opcode:#04X} at {pc:#06X}")]
    UnsupportedOpcode { opcode: u8, pc: u16 },
    #[error("unrecognized cartridge type {0:#04X}")]
    UnrecognizedCartridgeType(u8),
    #[error("unsupported ROM size code {0:#04X}")]
    UnsupportedRomSize(u8),
    #[error("unsupported RAM size code {0:#04X}")]
    UnsupportedRamSize(u8),
    #[error("ROM image is {len} bytes, too short to contain a cartridge header")]
    TruncatedRom { len: usize },
    #[error("no cartridge loaded")]
    NoCartridge,
    #[error("console halted after unsupported opcode {opcode:#04X} at {pc:#06X}; load a cartridge to continue")]
    Faulted { opcode: u8, pc: u16 },
    #[error("invalid console state: {0}")]
    InvalidState(&'static str),
}

pub type Result<T> = std::result::Result<T, EmuError>;
