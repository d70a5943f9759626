use std::ops::Range;

use rand::{SeedableRng, rngs::StdRng};
use tracing::{debug, trace, warn};

use super::{
    Chip8Error, Chip8Result, DISPLAY_X, DISPLAY_Y, Display, FONT, FONT_END_ADDRESS,
    FONT_START_ADDRESS, Opcode,
};
use crate::u4;

// The constants are specified by the CHIP-8 specification
pub const ROM_START_ADDRESS: usize = 0x200;
pub const MEMORY_SIZE: usize = 4096;
pub const MAX_ROM_SIZE: usize = MEMORY_SIZE - ROM_START_ADDRESS;
pub const STACK_DEPTH: usize = 16;

/// CHIP-8 virtual machine state
pub struct Chip8 {
    /// 4KB memory array
    pub(crate) memory: [u8; MEMORY_SIZE],
    /// Display buffer: 64x32 monochrome pixels
    pub(crate) display: Display<bool>,

    /// Program counter: address of the next instruction to execute
    pub(crate) pc: u16,
    /// Index register: used for memory operations, never masked to 12 bits
    pub(crate) i: u16,
    /// General-purpose registers V0-VF (VF is used as a flag register)
    pub(crate) v: [u8; 16],
    /// Call stack holding the addresses of pending call instructions
    pub(crate) stack: Vec<u16>,

    /// Delay timer: decrements once per cycle until it reaches 0
    pub(crate) delay_timer: u8,
    /// Sound timer: decrements once per cycle, beeps while non-zero
    pub(crate) sound_timer: u8,

    /// Keypad state: 16 keys mapped as booleans (true = pressed)
    pub(crate) keypad: [bool; 16],

    /// Source for `Cxnn`; not part of the machine state.
    pub(crate) rng: StdRng,
}

impl Chip8 {
    /// Creates a reset machine whose random source is seeded from the OS.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Creates a reset machine with a deterministic random source.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let mut chip8 = Chip8 {
            memory: [0; MEMORY_SIZE],
            display: [[false; DISPLAY_X]; DISPLAY_Y],
            pc: ROM_START_ADDRESS as u16,
            i: 0,
            v: [0; 16],
            stack: Vec::with_capacity(STACK_DEPTH),
            delay_timer: 0,
            sound_timer: 0,
            keypad: [false; 16],
            rng,
        };
        chip8.reset();
        chip8
    }

    /// Returns every entity of the machine to its power-on state and
    /// reloads the font set.
    pub fn reset(&mut self) {
        self.memory = [0; MEMORY_SIZE];
        self.memory[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);
        self.display = [[false; DISPLAY_X]; DISPLAY_Y];
        self.pc = ROM_START_ADDRESS as u16;
        self.i = 0;
        self.v = [0; 16];
        self.stack.clear();
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.keypad = [false; 16];

        debug!("machine reset");
    }

    /// Resets the machine and loads a ROM at 0x200.
    ///
    /// A ROM larger than `MAX_ROM_SIZE` is rejected rather than truncated;
    /// the machine is left in its reset state.
    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        self.reset();

        let rom_end = ROM_START_ADDRESS + rom.len();
        self.memory
            .get_mut(ROM_START_ADDRESS..rom_end)
            .ok_or(Chip8Error::RomTooLarge {
                size: rom.len(),
                max_size: MAX_ROM_SIZE,
            })?
            .copy_from_slice(rom);

        debug!(size = rom.len(), "ROM loaded");
        Ok(())
    }

    /// Executes a single cycle: fetch, decode, execute, then tick both timers.
    ///
    /// On error the program counter still points at the faulting instruction
    /// and the timers are not ticked.
    pub fn step(&mut self) -> Result<Chip8Result, Chip8Error> {
        let opcode = self.fetch()?;
        let decoded_opcode = Opcode::decode(opcode);
        trace!(pc = self.pc, opcode, "{decoded_opcode}");

        let result = self.execute(decoded_opcode).inspect_err(|err| {
            warn!(pc = self.pc, opcode, "instruction failed: {err}");
        })?;

        self.tick_timers();
        Ok(result)
    }

    /// Decrements the delay and sound timers, stopping at zero.
    pub fn tick_timers(&mut self) {
        self.delay_timer = self.delay_timer.saturating_sub(1);
        self.sound_timer = self.sound_timer.saturating_sub(1);
    }

    /// Returns true if the sound timer is greater than zero, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.sound_timer > 0
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.keypad[key] = pressed;
    }

    pub fn is_key_pressed(&self, key: u4) -> bool {
        self.keypad[key]
    }

    pub fn display(&self) -> &Display<bool> {
        &self.display
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    ///
    /// Returns `None` for coordinates outside the 64x32 screen.
    pub fn pixel(&self, x: usize, y: usize) -> Option<bool> {
        self.display.get(y)?.get(x).copied()
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn index(&self) -> u16 {
        self.i
    }

    pub fn registers(&self) -> &[u8; 16] {
        &self.v
    }

    pub fn stack(&self) -> &[u16] {
        &self.stack
    }

    pub fn keypad(&self) -> &[bool; 16] {
        &self.keypad
    }

    pub fn memory(&self) -> &[u8; MEMORY_SIZE] {
        &self.memory
    }

    /// Fetches the big-endian instruction word at PC.
    fn fetch(&self) -> Result<u16, Chip8Error> {
        let range = Self::mem_range(self.pc, 2)?;
        Ok(u16::from_be_bytes([
            self.memory[range.start],
            self.memory[range.start + 1],
        ]))
    }

    /// Bounds-checked memory range `addr..addr + len`.
    ///
    /// Reports the first address that falls outside memory.
    pub(crate) fn mem_range(addr: u16, len: usize) -> Result<Range<usize>, Chip8Error> {
        let start = usize::from(addr);
        let end = start + len;
        if end > MEMORY_SIZE {
            return Err(Chip8Error::MemoryOutOfBounds {
                address: start.max(MEMORY_SIZE),
            });
        }
        Ok(start..end)
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}
