//! Interactive debugger commands layered over [`crate::emu::Chip8Runner`].

mod commands;
mod executor;

pub use commands::*;
pub use executor::*;
