/// Outcome of a single `Chip8::step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip8Result {
    /// The instruction executed without touching the display.
    Continue,
    /// The instruction cleared or drew to the display buffer.
    DisplayChanged,
    /// `Fx0A` found no pressed key; the program counter was not advanced.
    WaitingForKey,
}

/// Error types that can occur during CHIP-8 emulation
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Chip8Error {
    #[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
    RomTooLarge { size: usize, max_size: usize },

    #[error("Memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: usize },

    #[error("Index register overflow: I={index:#06X} + {value:#04X}")]
    IndexOverflow { index: u16, value: u8 },

    #[error("Stack underflow: attempted to return from a subroutine with empty call stack")]
    StackUnderflow,

    #[error("Stack overflow: subroutine nesting exceeds {depth} levels")]
    StackOverflow { depth: usize },

    #[error("Unknown opcode: {opcode:#06X}")]
    UnknownOpcode { opcode: u16 },

    #[error("Key index out of range: {key:#04X}")]
    InvalidKey { key: u8 },

    #[error("Invalid machine state snapshot: {0}")]
    InvalidSnapshot(String),
}

pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;
/// A type alias for the CHIP-8 display buffer representation
pub type Display<T> = [[T; DISPLAY_X]; DISPLAY_Y];
