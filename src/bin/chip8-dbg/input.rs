use std::time::{Duration, Instant};

use crossterm::event::KeyCode;

use chip8_vm::{emu::Chip8Runner, u4};

/// Hex keypad as laid out on the original hardware, paired with the keyboard
/// keys in the same physical position.
pub const LAYOUT: [[(char, u8); 4]; 4] = [
    [('1', 0x1), ('2', 0x2), ('3', 0x3), ('4', 0xC)],
    [('q', 0x4), ('w', 0x5), ('e', 0x6), ('r', 0xD)],
    [('a', 0x7), ('s', 0x8), ('d', 0x9), ('f', 0xE)],
    [('z', 0xA), ('x', 0x0), ('c', 0xB), ('v', 0xF)],
];

/// Terminals on Linux report presses but not releases, so a key counts as
/// released once no repeat has arrived for this long.
pub const DEFAULT_RELEASE_AFTER: Duration = Duration::from_millis(50);

/// Keyboard side of the keypad: turns terminal key events into
/// `Chip8::set_key` calls and applies the release timeout.
pub struct KeypadInput {
    last_seen: [Option<Instant>; 16],
    release_after: Duration,
}

impl KeypadInput {
    pub fn new(release_after: Duration) -> Self {
        Self {
            last_seen: [None; 16],
            release_after,
        }
    }

    pub fn key_for(code: KeyCode) -> Option<u4> {
        let KeyCode::Char(c) = code else {
            return None;
        };
        let c = c.to_ascii_lowercase();
        LAYOUT
            .iter()
            .flatten()
            .find(|(label, _)| *label == c)
            .map(|&(_, key)| u4::new(key))
    }

    /// Presses the mapped key; returns false for keys outside the keypad.
    pub fn press(&mut self, runner: &mut Chip8Runner, code: KeyCode, now: Instant) -> bool {
        let Some(key) = Self::key_for(code) else {
            return false;
        };
        self.last_seen[usize::from(key)] = Some(now);
        runner.set_key(key, true);
        true
    }

    /// Releases every key whose last repeat is older than the timeout.
    pub fn release_expired(&mut self, runner: &mut Chip8Runner, now: Instant) {
        for (idx, seen) in self.last_seen.iter_mut().enumerate() {
            if let Some(at) = *seen
                && now.duration_since(at) > self.release_after
            {
                *seen = None;
                runner.set_key(u4::new(idx as u8), false);
            }
        }
    }
}
