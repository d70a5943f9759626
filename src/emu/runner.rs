use super::{Chip8, Chip8Error};
use crate::u4;
use std::collections::HashSet;

pub const DEFAULT_CPU_HZ: f32 = 500.0;

/// Longest stretch of elapsed time a single update will catch up on.
const MAX_CATCH_UP: f32 = 0.1;

/// Drive loop that turns elapsed wall-clock time into CPU cycles.
///
/// The interpreter itself has no notion of time; the runner decides how many
/// `step` calls a frame gets.
pub struct Chip8Runner {
    chip8: Chip8,
    cpu_time_step: f32,
    cpu_dt_accumulator: f32,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Chip8RunnerResult {
    HitBreakpoint,
    Ok,
}

impl Chip8Runner {
    pub fn new(chip8: Chip8) -> Self {
        Self::with_hz(chip8, DEFAULT_CPU_HZ)
    }

    pub fn with_hz(chip8: Chip8, cpu_hz: f32) -> Self {
        Self {
            chip8,
            cpu_time_step: 1.0 / cpu_hz.max(1.0),
            cpu_dt_accumulator: 0.0,
        }
    }

    /// Update emulator by delta time.
    ///
    /// Runs as many CPU cycles as fit in the elapsed time `dt`.
    pub fn update(&mut self, dt: f32) -> Result<Chip8RunnerResult, Chip8Error> {
        self.update_with_breakpoints(dt, None)
    }

    /// Like `update` but stops once the program counter lands on a breakpoint.
    pub fn update_with_breakpoints(
        &mut self,
        dt: f32,
        breakpoints: Option<&HashSet<u16>>,
    ) -> Result<Chip8RunnerResult, Chip8Error> {
        // A long stall (debugger pause, window drag) should not turn into a burst.
        self.cpu_dt_accumulator = (self.cpu_dt_accumulator + dt).min(MAX_CATCH_UP);

        while self.cpu_dt_accumulator >= self.cpu_time_step {
            self.cpu_dt_accumulator -= self.cpu_time_step;

            if let Err(err) = self.chip8.step() {
                self.cpu_dt_accumulator = 0.0;
                return Err(err);
            }

            if let Some(breakpoints) = breakpoints
                && breakpoints.contains(&self.chip8.pc())
            {
                self.cpu_dt_accumulator = 0.0;
                return Ok(Chip8RunnerResult::HitBreakpoint);
            }
        }

        Ok(Chip8RunnerResult::Ok)
    }

    /// Returns true if the sound timer is active, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.chip8.should_beep()
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.chip8.set_key(key, pressed)
    }

    pub fn chip8_ref(&self) -> &Chip8 {
        &self.chip8
    }

    pub fn chip8_mut(&mut self) -> &mut Chip8 {
        &mut self.chip8
    }
}
