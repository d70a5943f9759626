use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;
use tracing::debug;

use super::{Chip8, Chip8Error, DISPLAY_X, DISPLAY_Y, MEMORY_SIZE, STACK_DEPTH};

/// Serializable copy of every piece of machine state.
///
/// Display rows are packed into 64-bit masks, the leftmost pixel in the most
/// significant bit. The random source is not included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineState {
    pub pc: u16,
    pub i: u16,
    pub v: [u8; 16],
    pub stack: Vec<u16>,
    pub delay_timer: u8,
    pub sound_timer: u8,
    #[serde(with = "BigArray")]
    pub memory: [u8; MEMORY_SIZE],
    pub display: [u64; DISPLAY_Y],
    pub keypad: [bool; 16],
}

impl MachineState {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl Chip8 {
    /// Captures the complete machine state.
    pub fn snapshot(&self) -> MachineState {
        let mut display = [0u64; DISPLAY_Y];
        for (mask, row) in display.iter_mut().zip(self.display.iter()) {
            *mask = row
                .iter()
                .fold(0u64, |acc, &pixel| (acc << 1) | u64::from(pixel));
        }

        MachineState {
            pc: self.pc,
            i: self.i,
            v: self.v,
            stack: self.stack.clone(),
            delay_timer: self.delay_timer,
            sound_timer: self.sound_timer,
            memory: self.memory,
            display,
            keypad: self.keypad,
        }
    }

    /// Replaces the machine state with a previously captured snapshot.
    ///
    /// The snapshot is validated first; on error the machine is unchanged.
    /// A program counter past the end of memory is accepted: the machine can
    /// reach one through `Bnnn` or `00EE`, and the next fetch faults on it.
    pub fn restore(&mut self, state: &MachineState) -> Result<(), Chip8Error> {
        if state.stack.len() > STACK_DEPTH {
            return Err(Chip8Error::InvalidSnapshot(format!(
                "stack holds {} entries, at most {STACK_DEPTH} allowed",
                state.stack.len()
            )));
        }

        self.pc = state.pc;
        self.i = state.i;
        self.v = state.v;
        self.stack.clone_from(&state.stack);
        self.delay_timer = state.delay_timer;
        self.sound_timer = state.sound_timer;
        self.memory = state.memory;
        self.keypad = state.keypad;
        for (row, mask) in self.display.iter_mut().zip(state.display) {
            for (x, pixel) in row.iter_mut().enumerate() {
                *pixel = (mask >> (DISPLAY_X - 1 - x)) & 1 == 1;
            }
        }

        debug!(pc = self.pc, "machine state restored");
        Ok(())
    }
}
