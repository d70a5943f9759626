use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Paragraph, Widget},
};

use chip8_vm::{
    debugger::Executor,
    emu::{DISPLAY_X, DISPLAY_Y, MachineState, Opcode},
    u4,
};

use crate::input::LAYOUT;

const DISPLAY_LINES: u16 = DISPLAY_Y as u16 / 2;
const SIDE_WIDTH: u16 = 22;
const MIN_WIDTH: u16 = DISPLAY_X as u16 + 2 + SIDE_WIDTH * 2;
const MIN_HEIGHT: u16 = DISPLAY_LINES + 2 + 3 + 3;

/// Everything one frame draws, captured from the machine up front so
/// rendering never holds a borrow of the executor.
pub struct View<'a> {
    state: MachineState,
    keys: [bool; 16],
    current: Option<Opcode>,
    running: bool,
    beeping: bool,
    output: &'a str,
    input: &'a str,
}

impl<'a> View<'a> {
    pub fn capture(executor: &Executor, output: &'a str, input: &'a str) -> Self {
        let chip8 = executor.chip8();
        Self {
            state: chip8.snapshot(),
            keys: std::array::from_fn(|key| chip8.is_key_pressed(u4::new(key as u8))),
            current: executor.current_instruction(),
            running: executor.is_running(),
            beeping: executor.runner().should_beep(),
            output,
            input,
        }
    }
}

/// Packs two display rows into one text line using half-block glyphs.
pub fn display_lines(rows: &[u64; DISPLAY_Y]) -> Vec<String> {
    rows.chunks_exact(2)
        .map(|pair| {
            (0..DISPLAY_X)
                .map(|x| {
                    let bit = 1u64 << (DISPLAY_X - 1 - x);
                    match (pair[0] & bit != 0, pair[1] & bit != 0) {
                        (true, true) => '█',
                        (true, false) => '▀',
                        (false, true) => '▄',
                        (false, false) => ' ',
                    }
                })
                .collect()
        })
        .collect()
}

impl Widget for &View<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
            Paragraph::new(format!("Need at least {MIN_WIDTH}x{MIN_HEIGHT}"))
                .style(Style::default().fg(Color::Red))
                .render(area, buf);
            return;
        }

        let [top, console, command] = Layout::vertical([
            Constraint::Length(DISPLAY_LINES + 2),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .areas(area);

        let [display, registers, machine] = Layout::horizontal([
            Constraint::Length(DISPLAY_X as u16 + 2),
            Constraint::Length(SIDE_WIDTH),
            Constraint::Min(SIDE_WIDTH),
        ])
        .areas(top);

        let [keypad, stack] =
            Layout::vertical([Constraint::Length(4 + 2), Constraint::Min(3)]).areas(machine);

        self.render_display(display, buf);
        self.render_registers(registers, buf);
        self.render_keypad(keypad, buf);
        self.render_stack(stack, buf);

        Paragraph::new(self.output)
            .block(Block::bordered().title(" Output "))
            .render(console, buf);

        let (mode, color) = if self.running {
            (" RUNNING (Esc pauses) ", Color::Green)
        } else {
            (" PAUSED ", Color::Yellow)
        };
        Paragraph::new(format!("> {}", self.input))
            .block(
                Block::bordered()
                    .title(" Command ")
                    .title(Line::styled(mode, Style::default().fg(color)).right_aligned()),
            )
            .render(command, buf);
    }
}

impl View<'_> {
    fn render_display(&self, area: Rect, buf: &mut Buffer) {
        let lines: Vec<Line> = display_lines(&self.state.display)
            .into_iter()
            .map(|text| Line::styled(text, Style::default().fg(Color::Green)))
            .collect();

        Paragraph::new(lines)
            .block(Block::bordered().title(" Display "))
            .render(area, buf);
    }

    fn render_registers(&self, area: Rect, buf: &mut Buffer) {
        let state = &self.state;
        let mut lines = vec![
            Line::from(format!("PC {:04X}  I {:04X}", state.pc, state.i)),
            Line::from(format!("DT {:02X}    ST {:02X}", state.delay_timer, state.sound_timer)),
            Line::from(
                self.current
                    .map_or_else(|| "--".to_string(), |opcode| opcode.to_string()),
            ),
        ];
        lines.extend(state.v.chunks_exact(2).enumerate().map(|(row, pair)| {
            Line::from(format!(
                "V{:X} {:02X}    V{:X} {:02X}",
                row * 2,
                pair[0],
                row * 2 + 1,
                pair[1]
            ))
        }));

        let mut block = Block::bordered().title(" Registers ");
        if self.beeping {
            block = block
                .title(Line::styled(" BEEP ", Style::default().fg(Color::Yellow)).right_aligned());
        }

        Paragraph::new(lines).block(block).render(area, buf);
    }

    fn render_keypad(&self, area: Rect, buf: &mut Buffer) {
        let lines: Vec<Line> = LAYOUT
            .iter()
            .map(|row| {
                let spans: Vec<Span> = row
                    .iter()
                    .map(|&(label, key)| {
                        let style = if self.keys[usize::from(key)] {
                            Style::default().fg(Color::Black).bg(Color::Green)
                        } else {
                            Style::default()
                        };
                        Span::styled(format!(" {key:X}/{label} "), style)
                    })
                    .collect();
                Line::from(spans)
            })
            .collect();

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Keypad "))
            .render(area, buf);
    }

    fn render_stack(&self, area: Rect, buf: &mut Buffer) {
        let visible = usize::from(area.height.saturating_sub(2));
        let stack = &self.state.stack;

        // Innermost call on top; older frames drop off the bottom.
        let lines: Vec<Line> = if stack.is_empty() {
            vec![Line::from("(empty)")]
        } else {
            stack
                .iter()
                .enumerate()
                .rev()
                .take(visible)
                .map(|(depth, addr)| Line::from(format!("#{depth:<2} call @ {addr:03X}")))
                .collect()
        };

        Paragraph::new(lines)
            .block(Block::bordered().title(format!(" Stack {}/16 ", stack.len())))
            .render(area, buf);
    }
}
