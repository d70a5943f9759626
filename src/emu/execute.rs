use rand::Rng;

use super::{
    Chip8, Chip8Error, Chip8Result, DISPLAY_X, DISPLAY_Y, FONT_GLYPH_SIZE, FONT_START_ADDRESS,
    Opcode, OpcodeALU, STACK_DEPTH,
};
use crate::u4;

impl Chip8 {
    /// Applies one decoded instruction.
    ///
    /// The program counter is only written once every check has passed, so a
    /// failing instruction leaves the machine untouched.
    pub(crate) fn execute(&mut self, opcode: Opcode) -> Result<Chip8Result, Chip8Error> {
        let next_pc = self.pc.wrapping_add(2);
        let mut result = Chip8Result::Continue;

        self.pc = match opcode {
            Opcode::ClearDisplay => {
                self.display = [[false; DISPLAY_X]; DISPLAY_Y];
                result = Chip8Result::DisplayChanged;
                next_pc
            }
            Opcode::Return => {
                let caller = self.stack.pop().ok_or(Chip8Error::StackUnderflow)?;
                caller.wrapping_add(2)
            }
            Opcode::Jump { nnn } => nnn,
            Opcode::JumpWithOffset { nnn } => nnn + u16::from(self.v[0]),
            Opcode::Call { nnn } => {
                if self.stack.len() >= STACK_DEPTH {
                    return Err(Chip8Error::StackOverflow { depth: STACK_DEPTH });
                }
                self.stack.push(self.pc);
                nnn
            }
            Opcode::SkipRegEqualImm { x, nn } => skip_if(next_pc, self.v[x] == nn),
            Opcode::SkipRegNotEqualImm { x, nn } => skip_if(next_pc, self.v[x] != nn),
            Opcode::SkipRegEqualReg { x, y } => skip_if(next_pc, self.v[x] == self.v[y]),
            Opcode::SkipRegNotEqualReg { x, y } => skip_if(next_pc, self.v[x] != self.v[y]),
            Opcode::SetRegImm { x, nn } => {
                self.v[x] = nn;
                next_pc
            }
            Opcode::AddRegImm { x, nn } => {
                self.v[x] = self.v[x].wrapping_add(nn);
                next_pc
            }
            Opcode::ALU { x, y, op } => {
                self.execute_alu(x, y, op);
                next_pc
            }
            Opcode::SetIndexImm { nnn } => {
                self.i = nnn;
                next_pc
            }
            Opcode::Random { x, nn } => {
                let rand_byte: u8 = self.rng.random();
                self.v[x] = rand_byte & nn;
                next_pc
            }
            Opcode::Draw { x, y, n } => {
                self.execute_draw(x, y, n)?;
                result = Chip8Result::DisplayChanged;
                next_pc
            }
            Opcode::SkipIfPressed { x } => skip_if(next_pc, self.key_in(x)?),
            Opcode::SkipIfNotPressed { x } => skip_if(next_pc, !self.key_in(x)?),
            Opcode::WaitForKey { x } => match self.execute_wait_for_key(x) {
                Some(()) => next_pc,
                None => {
                    result = Chip8Result::WaitingForKey;
                    self.pc
                }
            },
            Opcode::ReadDelayTimer { x } => {
                self.v[x] = self.delay_timer;
                next_pc
            }
            Opcode::SetDelayTimer { x } => {
                self.delay_timer = self.v[x];
                next_pc
            }
            Opcode::SetSoundTimer { x } => {
                self.sound_timer = self.v[x];
                next_pc
            }
            Opcode::AddIndexReg { x } => {
                let value = self.v[x];
                self.i = self
                    .i
                    .checked_add(value.into())
                    .ok_or(Chip8Error::IndexOverflow {
                        index: self.i,
                        value,
                    })?;
                next_pc
            }
            Opcode::FontChar { x } => {
                self.i = FONT_START_ADDRESS as u16 + u16::from(self.v[x]) * FONT_GLYPH_SIZE;
                next_pc
            }
            Opcode::BCD { x } => {
                let value = self.v[x];
                let range = Self::mem_range(self.i, 3)?;
                self.memory[range].copy_from_slice(&[value / 100, (value / 10) % 10, value % 10]);
                next_pc
            }
            Opcode::StoreRegs { x } => {
                let count = usize::from(x) + 1;
                let range = Self::mem_range(self.i, count)?;
                self.memory[range].copy_from_slice(&self.v[..count]);
                next_pc
            }
            Opcode::LoadRegs { x } => {
                let count = usize::from(x) + 1;
                let range = Self::mem_range(self.i, count)?;
                self.v[..count].copy_from_slice(&self.memory[range]);
                next_pc
            }
            Opcode::Unknown(opcode) => {
                return Err(Chip8Error::UnknownOpcode { opcode });
            }
        };

        Ok(result)
    }

    fn execute_alu(&mut self, x: u4, y: u4, op: OpcodeALU) {
        match op {
            OpcodeALU::Set => self.v[x] = self.v[y],
            OpcodeALU::Or => self.v[x] |= self.v[y],
            OpcodeALU::And => self.v[x] &= self.v[y],
            OpcodeALU::Xor => self.v[x] ^= self.v[y],
            OpcodeALU::Add => {
                let (res, overflow) = self.v[x].overflowing_add(self.v[y]);
                self.v[x] = res;
                self.v[0xF] = u8::from(overflow);
            }
            OpcodeALU::Sub => {
                let (res, borrow) = self.v[x].overflowing_sub(self.v[y]);
                self.v[x] = res;
                self.v[0xF] = u8::from(!borrow); // Notice that borrow is inverted
            }
            OpcodeALU::SubReverse => {
                let (res, borrow) = self.v[y].overflowing_sub(self.v[x]);
                self.v[x] = res;
                self.v[0xF] = u8::from(!borrow);
            }
            OpcodeALU::ShiftRight => {
                let lsb = self.v[x] & 1;
                self.v[x] >>= 1;
                self.v[0xF] = lsb;
            }
            OpcodeALU::ShiftLeft => {
                let msb = self.v[x] >> 7;
                self.v[x] <<= 1;
                self.v[0xF] = msb;
            }
        }
    }

    /// XORs an 8xN sprite from memory at I onto the display, wrapping both axes.
    fn execute_draw(&mut self, x: u4, y: u4, n: u4) -> Result<(), Chip8Error> {
        let x_pos = usize::from(self.v[x]);
        let y_pos = usize::from(self.v[y]);
        let rows = Self::mem_range(self.i, n.into())?;

        let mut any_erased = false;
        for (row, &sprite_byte) in self.memory[rows].iter().enumerate() {
            let py = (y_pos + row) % DISPLAY_Y;

            for col in 0..8 {
                // If current sprite bit is non-zero
                if (sprite_byte & (0x80 >> col)) != 0 {
                    let pixel = &mut self.display[py][(x_pos + col) % DISPLAY_X];

                    // Flip the pixel
                    *pixel ^= true;

                    if !*pixel {
                        any_erased = true;
                    }
                }
            }
        }

        self.v[0xF] = u8::from(any_erased);
        Ok(())
    }

    /// Scans keys 0 to F; the highest pressed key ends up in Vx.
    fn execute_wait_for_key(&mut self, x: u4) -> Option<()> {
        let key = (0..16u8).filter(|&key| self.keypad[usize::from(key)]).last()?;
        self.v[x] = key;
        Some(())
    }

    /// Reads the keypad entry named by Vx.
    fn key_in(&self, x: u4) -> Result<bool, Chip8Error> {
        let key = u4::try_from(self.v[x]).map_err(|key| Chip8Error::InvalidKey { key })?;
        Ok(self.keypad[key])
    }
}

fn skip_if(next_pc: u16, condition: bool) -> u16 {
    if condition {
        next_pc.wrapping_add(2)
    } else {
        next_pc
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn machine(program: &[u16]) -> Chip8 {
        let rom: Vec<u8> = program.iter().flat_map(|op| op.to_be_bytes()).collect();
        let mut chip8 = Chip8::with_seed(42);
        chip8.load_rom(&rom).unwrap();
        chip8
    }

    #[test]
    fn jump_and_call_set_pc() {
        let mut chip8 = machine(&[0x2208]);
        chip8.step().unwrap();
        assert_eq!(chip8.pc, 0x208);
        assert_eq!(chip8.stack, vec![0x200]);

        let mut chip8 = machine(&[0x1ABC]);
        chip8.step().unwrap();
        assert_eq!(chip8.pc, 0xABC);
    }

    #[test]
    fn return_resumes_after_call() {
        // 0x200: CALL 0x204, 0x202: JP 0x202, 0x204: RET
        let mut chip8 = machine(&[0x2204, 0x1202, 0x00EE]);
        chip8.step().unwrap();
        chip8.step().unwrap();
        assert_eq!(chip8.pc, 0x202);
        assert!(chip8.stack.is_empty());
    }

    #[test]
    fn call_beyond_sixteen_levels_overflows() {
        let mut chip8 = machine(&[0x2200]);
        for _ in 0..STACK_DEPTH {
            chip8.step().unwrap();
        }
        assert_eq!(
            chip8.step(),
            Err(Chip8Error::StackOverflow { depth: STACK_DEPTH })
        );
        assert_eq!(chip8.stack.len(), STACK_DEPTH);
    }

    #[test]
    fn skips_advance_by_four_when_true() {
        let mut chip8 = machine(&[0x3A05, 0x0000, 0x4A05]);
        chip8.v[0xA] = 5;
        chip8.step().unwrap();
        assert_eq!(chip8.pc, 0x204);
        chip8.step().unwrap();
        assert_eq!(chip8.pc, 0x206);

        let mut chip8 = machine(&[0x5120, 0x9120]);
        chip8.v[1] = 3;
        chip8.v[2] = 4;
        chip8.step().unwrap();
        assert_eq!(chip8.pc, 0x202);
        chip8.step().unwrap();
        assert_eq!(chip8.pc, 0x206);
    }

    #[test]
    fn add_immediate_wraps_without_touching_vf() {
        let mut chip8 = machine(&[0x7AFF]);
        chip8.v[0xA] = 2;
        chip8.v[0xF] = 7;
        chip8.step().unwrap();
        assert_eq!(chip8.v[0xA], 1);
        assert_eq!(chip8.v[0xF], 7);
    }

    #[test]
    fn bitwise_ops_leave_vf_alone() {
        let mut chip8 = machine(&[0x8011, 0x8012, 0x8013]);
        chip8.v[0] = 0b1100;
        chip8.v[1] = 0b1010;
        chip8.v[0xF] = 9;
        chip8.step().unwrap();
        assert_eq!(chip8.v[0], 0b1110);
        chip8.step().unwrap();
        assert_eq!(chip8.v[0], 0b1010);
        chip8.step().unwrap();
        assert_eq!(chip8.v[0], 0);
        assert_eq!(chip8.v[0xF], 9);
    }

    #[test]
    fn add_registers_sets_carry() {
        let mut chip8 = machine(&[0x8014, 0x8014]);
        chip8.v[0] = 0xFF;
        chip8.v[1] = 0x01;
        chip8.step().unwrap();
        assert_eq!((chip8.v[0], chip8.v[0xF]), (0x00, 1));
        chip8.step().unwrap();
        assert_eq!((chip8.v[0], chip8.v[0xF]), (0x01, 0));
    }

    #[test]
    fn subtract_sets_no_borrow_flag() {
        let mut chip8 = machine(&[0x8015]);
        chip8.v[0] = 0x01;
        chip8.v[1] = 0x01;
        chip8.step().unwrap();
        assert_eq!((chip8.v[0], chip8.v[0xF]), (0x00, 1));

        let mut chip8 = machine(&[0x8015]);
        chip8.v[0] = 0x00;
        chip8.v[1] = 0x01;
        chip8.step().unwrap();
        assert_eq!((chip8.v[0], chip8.v[0xF]), (0xFF, 0));
    }

    #[test]
    fn reverse_subtract() {
        let mut chip8 = machine(&[0x8017]);
        chip8.v[0] = 0x03;
        chip8.v[1] = 0x05;
        chip8.step().unwrap();
        assert_eq!((chip8.v[0], chip8.v[0xF]), (0x02, 1));

        let mut chip8 = machine(&[0x8017]);
        chip8.v[0] = 0x05;
        chip8.v[1] = 0x03;
        chip8.step().unwrap();
        assert_eq!((chip8.v[0], chip8.v[0xF]), (0xFE, 0));
    }

    #[test]
    fn shifts_operate_on_vx_and_report_shifted_bit() {
        let mut chip8 = machine(&[0x8126]);
        chip8.v[1] = 0x01;
        chip8.v[2] = 0xFF;
        chip8.step().unwrap();
        assert_eq!((chip8.v[1], chip8.v[0xF]), (0x00, 1));

        let mut chip8 = machine(&[0x812E]);
        chip8.v[1] = 0x80;
        chip8.step().unwrap();
        assert_eq!((chip8.v[1], chip8.v[0xF]), (0x00, 1));

        let mut chip8 = machine(&[0x812E]);
        chip8.v[1] = 0x41;
        chip8.step().unwrap();
        assert_eq!((chip8.v[1], chip8.v[0xF]), (0x82, 0));
    }

    #[test]
    fn flag_register_as_destination_keeps_flag() {
        let mut chip8 = machine(&[0x8F14]);
        chip8.v[0xF] = 0xFF;
        chip8.v[1] = 0x02;
        chip8.step().unwrap();
        assert_eq!(chip8.v[0xF], 1);
    }

    #[test]
    fn jump_with_offset_adds_v0() {
        let mut chip8 = machine(&[0xB300]);
        chip8.v[0] = 0x10;
        chip8.step().unwrap();
        assert_eq!(chip8.pc, 0x310);
    }

    #[test]
    fn random_is_masked() {
        let mut chip8 = machine(&[0xC30F, 0xC400]);
        chip8.step().unwrap();
        chip8.step().unwrap();
        assert_eq!(chip8.v[3] & 0xF0, 0);
        assert_eq!(chip8.v[4], 0);
    }

    #[test]
    fn random_is_reproducible_with_seed() {
        let mut a = machine(&[0xC0FF]);
        let mut b = machine(&[0xC0FF]);
        a.step().unwrap();
        b.step().unwrap();
        assert_eq!(a.v[0], b.v[0]);
    }

    #[test]
    fn draw_font_glyph_and_detect_collision() {
        // LD F, V0 ; DRW V1, V2, 5 ; DRW V1, V2, 5
        let mut chip8 = machine(&[0xF029, 0xD125, 0xD125]);
        chip8.v[0] = 0x0;
        chip8.v[1] = 10;
        chip8.v[2] = 4;
        chip8.step().unwrap();
        assert_eq!(chip8.i, 0);

        assert_eq!(chip8.step(), Ok(Chip8Result::DisplayChanged));
        assert_eq!(chip8.v[0xF], 0);
        // Top row of "0" is 0xF0
        assert!(chip8.display[4][10..14].iter().all(|&p| p));
        assert!(!chip8.display[4][14]);
        // Middle rows of "0" are 0x90
        assert!(chip8.display[5][10] && chip8.display[5][13]);
        assert!(!chip8.display[5][11]);

        chip8.step().unwrap();
        assert_eq!(chip8.v[0xF], 1);
        assert!(chip8.display.iter().flatten().all(|&p| !p));
    }

    #[test]
    fn draw_wraps_vertically() {
        let mut chip8 = machine(&[0xA300, 0xD012]);
        chip8.memory[0x300] = 0x80;
        chip8.memory[0x301] = 0x80;
        chip8.v[0] = 5;
        chip8.v[1] = 31;
        chip8.step().unwrap();
        chip8.step().unwrap();
        assert!(chip8.display[31][5]);
        assert!(chip8.display[0][5]);
    }

    #[test]
    fn draw_coordinates_wrap_modulo_screen_size() {
        let mut chip8 = machine(&[0xA300, 0xD011]);
        chip8.memory[0x300] = 0x80;
        chip8.v[0] = 64 + 3;
        chip8.v[1] = 32 + 2;
        chip8.step().unwrap();
        chip8.step().unwrap();
        assert!(chip8.display[2][3]);
    }

    #[test]
    fn draw_reading_past_memory_fails() {
        let mut chip8 = machine(&[0xAFFE, 0xD013]);
        chip8.step().unwrap();
        assert_eq!(
            chip8.step(),
            Err(Chip8Error::MemoryOutOfBounds { address: 0x1000 })
        );
        assert_eq!(chip8.pc, 0x202);
    }

    #[test]
    fn clear_display_reports_change() {
        let mut chip8 = machine(&[0x00E0]);
        chip8.display[0][0] = true;
        assert_eq!(chip8.step(), Ok(Chip8Result::DisplayChanged));
        assert!(!chip8.display[0][0]);
    }

    #[test]
    fn key_skips() {
        let mut chip8 = machine(&[0xE39E, 0x0000, 0xE3A1]);
        chip8.v[3] = 0xC;
        chip8.set_key(u4::new(0xC), true);
        chip8.step().unwrap();
        assert_eq!(chip8.pc, 0x204);
        chip8.step().unwrap();
        assert_eq!(chip8.pc, 0x206);
    }

    #[test]
    fn key_skip_with_out_of_range_key_fails() {
        let mut chip8 = machine(&[0xE39E]);
        chip8.v[3] = 0x10;
        assert_eq!(chip8.step(), Err(Chip8Error::InvalidKey { key: 0x10 }));
    }

    #[test]
    fn wait_for_key_keeps_highest_pressed_key() {
        let mut chip8 = machine(&[0xF50A]);
        assert_eq!(chip8.step(), Ok(Chip8Result::WaitingForKey));
        assert_eq!(chip8.pc, 0x200);

        chip8.set_key(u4::new(0x2), true);
        chip8.set_key(u4::new(0x9), true);
        assert_eq!(chip8.step(), Ok(Chip8Result::Continue));
        assert_eq!(chip8.v[5], 0x9);
        assert_eq!(chip8.pc, 0x202);
    }

    #[test]
    fn timer_transfers() {
        let mut chip8 = machine(&[0xF115, 0xF218, 0xF307]);
        chip8.v[1] = 10;
        chip8.v[2] = 20;
        chip8.step().unwrap();
        // Timers tick at the end of every step
        assert_eq!(chip8.delay_timer, 9);
        chip8.step().unwrap();
        assert_eq!(chip8.sound_timer, 19);
        assert_eq!(chip8.delay_timer, 8);
        chip8.step().unwrap();
        assert_eq!(chip8.v[3], 8);
    }

    #[test]
    fn add_to_index_is_unmasked_and_checked() {
        let mut chip8 = machine(&[0xAFFF, 0xF01E]);
        chip8.v[0] = 0x10;
        chip8.step().unwrap();
        chip8.step().unwrap();
        assert_eq!(chip8.i, 0x100F);

        let mut chip8 = machine(&[0xF01E]);
        chip8.i = 0xFFF0;
        chip8.v[0] = 0x20;
        assert_eq!(
            chip8.step(),
            Err(Chip8Error::IndexOverflow {
                index: 0xFFF0,
                value: 0x20
            })
        );
    }

    #[test]
    fn font_char_is_five_times_vx() {
        let mut chip8 = machine(&[0xF429]);
        chip8.v[4] = 0xB;
        chip8.step().unwrap();
        assert_eq!(chip8.i, 55);
    }

    #[test]
    fn bcd_stores_hundreds_tens_units() {
        let mut chip8 = machine(&[0xA300, 0xF233]);
        chip8.v[2] = 254;
        chip8.step().unwrap();
        chip8.step().unwrap();
        assert_eq!(&chip8.memory[0x300..0x303], &[2, 5, 4]);
    }

    #[test]
    fn store_and_load_registers_leave_index_unchanged() {
        let mut chip8 = machine(&[0xA300, 0xF255, 0xA400, 0xF165]);
        chip8.v[..3].copy_from_slice(&[1, 2, 3]);
        chip8.memory[0x400..0x402].copy_from_slice(&[9, 8]);
        chip8.step().unwrap();
        chip8.step().unwrap();
        assert_eq!(&chip8.memory[0x300..0x304], &[1, 2, 3, 0]);
        assert_eq!(chip8.i, 0x300);
        chip8.step().unwrap();
        chip8.step().unwrap();
        assert_eq!(&chip8.v[..3], &[9, 8, 3]);
        assert_eq!(chip8.i, 0x400);
    }

    #[test]
    fn store_registers_past_memory_writes_nothing() {
        let mut chip8 = machine(&[0xAFFE, 0xF355]);
        chip8.v[..4].copy_from_slice(&[1, 2, 3, 4]);
        chip8.step().unwrap();
        assert!(chip8.step().is_err());
        assert_eq!(&chip8.memory[0xFFE..], &[0, 0]);
    }

    #[test]
    fn unknown_opcode_is_an_error() {
        let mut chip8 = machine(&[0xE0FF]);
        assert_eq!(
            chip8.step(),
            Err(Chip8Error::UnknownOpcode { opcode: 0xE0FF })
        );
        assert_eq!(chip8.pc, 0x200);
    }
}
