//! A CHIP-8 virtual machine.
//!
//! [`emu::Chip8`] is the interpreter core: memory, registers, stack, timers,
//! display buffer and keypad, advanced one instruction at a time by
//! [`emu::Chip8::step`]. Pacing, input and rendering belong to the caller;
//! [`emu::Chip8Runner`] and the [`debugger`] module are the drivers used by
//! the `chip8-dbg` binary.

pub mod debugger;
pub mod emu;
mod nibble;

pub use nibble::u4;
