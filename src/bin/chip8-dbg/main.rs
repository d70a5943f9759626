mod input;
mod ui;

use std::{
    fs::File,
    path::PathBuf,
    sync::Mutex,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::DefaultTerminal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use chip8_vm::{
    debugger::{Cli, Command, CommandResult, Executor},
    emu::{Chip8, Chip8Runner, Chip8RunnerResult, DEFAULT_CPU_HZ, Opcode},
};

use input::{DEFAULT_RELEASE_AFTER, KeypadInput};
use ui::View;

/// How long one pass of the loop waits for terminal input.
const FRAME_TIME: Duration = Duration::from_millis(16);

struct App {
    executor: Executor,
    keypad: KeypadInput,
    input: String,
    output: String,
    last_command: Option<Command>,
    should_quit: bool,
}

impl App {
    fn new(rom: Vec<u8>, args: &Args) -> anyhow::Result<Self> {
        let chip8 = args.seed.map_or_else(Chip8::new, Chip8::with_seed);
        let mut executor = Executor::new(Chip8Runner::with_hz(chip8, args.hz), rom)
            .context("Failed to load ROM into CHIP-8 memory")?;

        if let Some(state) = &args.state {
            executor
                .load_state(state)
                .with_context(|| format!("Failed to restore state from {}", state.display()))?;
        }
        if args.run {
            executor.execute_run();
        }

        Ok(Self {
            executor,
            keypad: KeypadInput::new(DEFAULT_RELEASE_AFTER),
            input: String::new(),
            output: "Type `run` to start, `help` for commands".to_string(),
            last_command: None,
            should_quit: false,
        })
    }

    fn run(&mut self, terminal: &mut DefaultTerminal) -> anyhow::Result<()> {
        let mut last_tick = Instant::now();

        while !self.should_quit {
            let now = Instant::now();
            self.tick(now.duration_since(last_tick).as_secs_f32());
            last_tick = now;

            terminal.draw(|frame| {
                let view = View::capture(&self.executor, &self.output, &self.input);
                frame.render_widget(&view, frame.area());
            })?;

            self.keypad
                .release_expired(self.executor.runner_mut(), Instant::now());

            if event::poll(FRAME_TIME)?
                && let Event::Key(key) = event::read()?
            {
                self.on_key(key);
            }
        }

        Ok(())
    }

    /// Advances the machine while in running mode.
    fn tick(&mut self, dt: f32) {
        match self.executor.poll(dt) {
            Ok(Chip8RunnerResult::HitBreakpoint) => {
                self.output = format!("Breakpoint reached at {:03X}", self.executor.chip8().pc());
            }
            Ok(Chip8RunnerResult::Ok) => {}
            Err(e) => {
                error!("execution halted: {e}");
                self.output = format!("Halted: {e}");
            }
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        // While running the keyboard belongs to the program, except Esc.
        if self.executor.is_running() {
            if key.code == KeyCode::Esc {
                self.executor.execute_pause();
                self.output = "Paused".to_string();
            } else {
                self.keypad
                    .press(self.executor.runner_mut(), key.code, Instant::now());
            }
            return;
        }

        if key.kind != KeyEventKind::Press {
            return;
        }
        match key.code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => self.input.push(c),
            _ => {}
        }
    }

    /// Runs the typed command; an empty line repeats the previous one.
    fn submit(&mut self) {
        let line = std::mem::take(&mut self.input);

        let command = if line.trim().is_empty() {
            self.last_command.clone()
        } else {
            match Cli::try_parse_from(line.split_whitespace()) {
                Ok(cli) => Some(cli.command),
                Err(e) => {
                    self.output = e.to_string();
                    None
                }
            }
        };
        self.last_command = command.clone();

        if let Some(command) = command {
            info!(?command, "debugger command");
            self.output = match self.executor.execute(command) {
                Ok(CommandResult::Quit) => {
                    self.should_quit = true;
                    String::new()
                }
                Ok(result) => describe(result),
                Err(e) => e.to_string(),
            };
        }
    }
}

/// Formats a command result for the output pane.
fn describe(result: CommandResult) -> String {
    match result {
        CommandResult::Ok | CommandResult::Quit => "OK".to_string(),
        CommandResult::Breakpoints(breakpoints) if breakpoints.is_empty() => {
            "No breakpoints".to_string()
        }
        CommandResult::Breakpoints(breakpoints) => breakpoints
            .iter()
            .map(|addr| format!("{addr:03X}"))
            .collect::<Vec<_>>()
            .join(" "),
        CommandResult::MemDump { data, offset } => data
            .chunks(16)
            .enumerate()
            .map(|(row, bytes)| {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
                format!("{:03X}: {}", usize::from(offset) + row * 16, hex.join(" "))
            })
            .collect::<Vec<_>>()
            .join("\n"),
        CommandResult::Disasm {
            instructions,
            offset,
        } => instructions
            .iter()
            .enumerate()
            .map(|(idx, (raw, opcode))| {
                format!("{:03X}: {raw:04X}  {opcode}", usize::from(offset) + idx * 2)
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Terminal front-end and debugger for the CHIP-8 virtual machine.
///
/// While running, keys 1-4, Q-R, A-F and Z-V form the hex keypad and Escape
/// pauses. While paused, type debugger commands (run, step, mem, disasm,
/// breakpoint, set, save, load, reset, quit); Escape exits.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Path to the ROM file to load
    rom_path: PathBuf,

    /// Instructions executed per second
    #[arg(long, default_value_t = DEFAULT_CPU_HZ)]
    hz: f32,

    /// Seed for the random number instruction
    #[arg(long)]
    seed: Option<u64>,

    /// Machine state file to restore after loading the ROM
    #[arg(long)]
    state: Option<PathBuf>,

    /// Start executing immediately instead of paused
    #[arg(long)]
    run: bool,

    /// Write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn init_logging(args: &Args) -> anyhow::Result<()> {
    // The terminal UI owns stdout, so logs only go to a file.
    let Some(path) = &args.log_file else {
        return Ok(());
    };

    let file = File::create(path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid log filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .init();

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;
    let mut app = App::new(rom, &args).context("Failed to initialize application")?;

    let mut terminal = ratatui::init();
    let app_result = app.run(&mut terminal);
    ratatui::restore();

    app_result
}
