use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::info;

use super::commands::{BreakpointAction, Command, CommandError, CommandResult, SetTarget};
use crate::emu::{
    Chip8, Chip8Error, Chip8Runner, Chip8RunnerResult, MEMORY_SIZE, MachineState, Opcode,
};

pub struct Executor {
    is_running: bool,
    runner: Chip8Runner,
    breakpoints: HashSet<u16>,
    rom: Vec<u8>,
}

impl Executor {
    /// Loads `rom` into the runner's machine and keeps a copy for `reset`.
    pub fn new(mut runner: Chip8Runner, rom: Vec<u8>) -> Result<Self, Chip8Error> {
        runner.chip8_mut().load_rom(&rom)?;

        Ok(Self {
            is_running: false,
            runner,
            breakpoints: HashSet::new(),
            rom,
        })
    }

    pub fn poll(&mut self, dt: f32) -> Result<Chip8RunnerResult, Chip8Error> {
        if !self.is_running {
            return Ok(Chip8RunnerResult::Ok);
        }

        let result = self
            .runner
            .update_with_breakpoints(dt, Some(&self.breakpoints));

        if matches!(result, Err(_) | Ok(Chip8RunnerResult::HitBreakpoint)) {
            self.is_running = false;
        }

        result
    }

    pub fn execute(&mut self, command: Command) -> Result<CommandResult, CommandError> {
        match command {
            Command::Run => {
                self.execute_run();
                Ok(CommandResult::Ok)
            }
            Command::Pause => {
                self.execute_pause();
                Ok(CommandResult::Ok)
            }
            Command::Step { count } => self.execute_step(count),
            Command::Breakpoint { action } => self.handle_breakpoint(action),
            Command::Set { target, value } => self.handle_set(target, value),
            Command::Mem { start, len } => self.handle_mem(start, len),
            Command::Disasm { start, len } => self.handle_disasm(start, len),
            Command::Reset => {
                self.runner.chip8_mut().load_rom(&self.rom)?;
                Ok(CommandResult::Ok)
            }
            Command::Save { path } => {
                self.save_state(&path)?;
                Ok(CommandResult::Ok)
            }
            Command::Load { path } => {
                self.load_state(&path)?;
                Ok(CommandResult::Ok)
            }
            Command::Quit => Ok(CommandResult::Quit),
        }
    }

    pub fn execute_run(&mut self) {
        self.is_running = true;
    }

    pub fn execute_pause(&mut self) {
        self.is_running = false;
    }

    /// Steps `count` instructions, stopping early on a breakpoint.
    pub fn execute_step(&mut self, count: u32) -> Result<CommandResult, CommandError> {
        for _ in 0..count {
            self.runner.chip8_mut().step()?;
            if self.breakpoints.contains(&self.runner.chip8_ref().pc()) {
                break;
            }
        }
        Ok(CommandResult::Ok)
    }

    pub fn save_state(&self, path: &Path) -> Result<(), CommandError> {
        let json = self.runner.chip8_ref().snapshot().to_json()?;
        fs::write(path, json)?;
        info!(path = %path.display(), "saved machine state");
        Ok(())
    }

    pub fn load_state(&mut self, path: &Path) -> Result<(), CommandError> {
        let json = fs::read_to_string(path)?;
        let state = MachineState::from_json(&json)?;
        self.runner.chip8_mut().restore(&state)?;
        info!(path = %path.display(), "restored machine state");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn chip8(&self) -> &Chip8 {
        self.runner.chip8_ref()
    }

    pub fn runner(&self) -> &Chip8Runner {
        &self.runner
    }

    /// Decodes the instruction at the program counter, if it lies in memory.
    pub fn current_instruction(&self) -> Option<Opcode> {
        let chip8 = self.chip8();
        let pc = usize::from(chip8.pc());
        let memory = chip8.memory();
        let bytes = memory.get(pc..pc + 2)?;
        Some(Opcode::decode(u16::from_be_bytes([bytes[0], bytes[1]])))
    }

    pub fn runner_mut(&mut self) -> &mut Chip8Runner {
        &mut self.runner
    }

    fn handle_breakpoint(
        &mut self,
        action: BreakpointAction,
    ) -> Result<CommandResult, CommandError> {
        match action {
            BreakpointAction::Set { addr } => {
                self.breakpoints.insert(addr);
            }
            BreakpointAction::Clear { addr } => {
                self.breakpoints.remove(&addr);
            }
            BreakpointAction::ClearAll => {
                self.breakpoints.clear();
            }
            BreakpointAction::List => {
                let mut bps: Vec<u16> = self.breakpoints.iter().cloned().collect();
                bps.sort();
                return Ok(CommandResult::Breakpoints(bps));
            }
        };

        Ok(CommandResult::Ok)
    }

    fn handle_set(&mut self, target: SetTarget, value: u16) -> Result<CommandResult, CommandError> {
        let chip8 = self.runner.chip8_mut();
        let byte = || u8::try_from(value).map_err(|_| CommandError::ValueOutOfRange);

        match target {
            SetTarget::V(reg) => {
                chip8.v[reg] = byte()?;
            }
            SetTarget::I => {
                chip8.i = value;
            }
            SetTarget::Pc => {
                if usize::from(value) >= MEMORY_SIZE {
                    return Err(CommandError::ValueOutOfRange);
                }
                chip8.pc = value;
            }
            SetTarget::DelayTimer => {
                chip8.delay_timer = byte()?;
            }
            SetTarget::SoundTimer => {
                chip8.sound_timer = byte()?;
            }
        }

        Ok(CommandResult::Ok)
    }

    fn handle_mem(&self, start: u16, len: u16) -> Result<CommandResult, CommandError> {
        let memory = self.runner.chip8_ref().memory();
        let start_idx = usize::from(start);
        if start_idx >= MEMORY_SIZE {
            return Err(CommandError::ValueOutOfRange);
        }
        let end = (start_idx + usize::from(len)).min(MEMORY_SIZE);

        Ok(CommandResult::MemDump {
            data: memory[start_idx..end].to_vec(),
            offset: start,
        })
    }

    fn handle_disasm(&self, start: u16, len: u16) -> Result<CommandResult, CommandError> {
        let memory = self.runner.chip8_ref().memory();
        if usize::from(start) >= MEMORY_SIZE {
            return Err(CommandError::ValueOutOfRange);
        }

        let instructions = memory[usize::from(start)..]
            .chunks_exact(2)
            .take(usize::from(len))
            .map(|word| u16::from_be_bytes([word[0], word[1]]))
            .map(|raw| (raw, Opcode::decode(raw)))
            .collect();

        Ok(CommandResult::Disasm {
            instructions,
            offset: start,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::u4;

    fn executor(rom: &[u8]) -> Executor {
        Executor::new(Chip8Runner::new(Chip8::with_seed(3)), rom.to_vec()).unwrap()
    }

    #[test]
    fn step_count_stops_at_breakpoint() {
        let mut exec = executor(&[0x70, 0x01, 0x70, 0x01, 0x70, 0x01]);
        exec.execute(Command::Breakpoint {
            action: BreakpointAction::Set { addr: 0x202 },
        })
        .unwrap();
        exec.execute(Command::Step { count: 3 }).unwrap();
        assert_eq!(exec.chip8().pc(), 0x202);
        assert_eq!(exec.chip8().registers()[0], 1);
    }

    #[test]
    fn breakpoints_are_listed_sorted() {
        let mut exec = executor(&[]);
        for addr in [0x300, 0x200, 0x250] {
            exec.execute(Command::Breakpoint {
                action: BreakpointAction::Set { addr },
            })
            .unwrap();
        }
        match exec.execute(Command::Breakpoint {
            action: BreakpointAction::List,
        }) {
            Ok(CommandResult::Breakpoints(bps)) => assert_eq!(bps, vec![0x200, 0x250, 0x300]),
            _ => panic!("expected breakpoint list"),
        }
    }

    #[test]
    fn set_rejects_values_wider_than_target() {
        let mut exec = executor(&[]);
        assert!(matches!(
            exec.execute(Command::Set {
                target: SetTarget::V(u4::new(1)),
                value: 0x100
            }),
            Err(CommandError::ValueOutOfRange)
        ));
        exec.execute(Command::Set {
            target: SetTarget::DelayTimer,
            value: 0x20,
        })
        .unwrap();
        assert_eq!(exec.chip8().delay_timer(), 0x20);
    }

    #[test]
    fn reset_reloads_rom() {
        let mut exec = executor(&[0x60, 0x05]);
        exec.execute(Command::Step { count: 1 }).unwrap();
        assert_eq!(exec.chip8().registers()[0], 5);
        exec.execute(Command::Reset).unwrap();
        assert_eq!(exec.chip8().registers()[0], 0);
        assert_eq!(exec.chip8().pc(), 0x200);
        assert_eq!(exec.current_instruction().unwrap().to_string(), "LD V0, 0x05");
    }

    #[test]
    fn disassembles_from_start() {
        let exec = executor(&[0x00, 0xE0, 0xA2, 0x2A]);
        match exec.handle_disasm(0x200, 2) {
            Ok(CommandResult::Disasm {
                instructions,
                offset,
            }) => {
                assert_eq!(offset, 0x200);
                assert_eq!(instructions[0], (0x00E0, Opcode::ClearDisplay));
                assert_eq!(instructions[1].1.to_string(), "LD I, 0x22A");
            }
            _ => panic!("expected disassembly"),
        }
    }

    #[test]
    fn mem_dump_is_clamped_to_memory() {
        let mut exec = executor(&[]);
        match exec.execute(Command::Mem {
            start: 0xFF8,
            len: 64,
        }) {
            Ok(CommandResult::MemDump { data, .. }) => assert_eq!(data.len(), 8),
            _ => panic!("expected memory dump"),
        }
        assert!(matches!(
            exec.execute(Command::Mem {
                start: 0x1000,
                len: 1
            }),
            Err(CommandError::ValueOutOfRange)
        ));
    }

    #[test]
    fn save_and_load_state_file() {
        let path = std::env::temp_dir().join(format!("chip8-vm-state-{}.json", std::process::id()));
        let mut exec = executor(&[0x60, 0x05, 0x61, 0x06]);
        exec.execute(Command::Step { count: 1 }).unwrap();
        exec.save_state(&path).unwrap();

        exec.execute(Command::Step { count: 1 }).unwrap();
        assert_eq!(exec.chip8().registers()[1], 6);

        exec.load_state(&path).unwrap();
        assert_eq!(exec.chip8().pc(), 0x202);
        assert_eq!(exec.chip8().registers()[..2], [5, 0]);
        fs::remove_file(path).unwrap();
    }
}
