mod chip8;
mod execute;
mod font;
mod opcode;
mod runner;
mod state;
mod types;

pub use chip8::*;
pub use font::*;
pub use opcode::*;
pub use runner::*;
pub use state::*;
pub use types::*;
