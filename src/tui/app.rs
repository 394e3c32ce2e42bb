//! Debugger application state and logic.

use crate::cpu::{ClockDriver, Cpu, Pulse};
use crate::image::{disassemble, disassemble_at};
use crate::keypad::Key;
use std::time::{Duration, Instant};

/// How long a typed keypad key stays held.
pub const KEY_HOLD: Duration = Duration::from_millis(250);

/// Words per memory view row.
pub const MEMORY_ROW: usize = 8;

/// Outputs kept for the output panel.
const OUTPUT_HISTORY: usize = 16;

/// Debugger application state.
pub struct DebuggerApp {
    /// The CPU being debugged.
    pub cpu: Cpu,
    pub clock: ClockDriver,
    /// Is the clock running?
    pub running: bool,
    /// Should we quit?
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Memory view scroll offset, in rows.
    pub mem_scroll: usize,
    /// Most recent output register values, oldest first.
    pub outputs: Vec<u64>,
    /// Keypad key held down and when it was pressed.
    held_key: Option<(Key, Instant)>,
    last_tick: Instant,
}

impl DebuggerApp {
    /// Create a debugger around a loaded machine.
    pub fn new(cpu: Cpu, hz: f64) -> Self {
        Self {
            cpu,
            clock: ClockDriver::new(hz),
            running: false,
            should_quit: false,
            status: "Ready. space: pulse, n: instruction, r: run, q: quit.".into(),
            mem_scroll: 0,
            outputs: Vec::new(),
            held_key: None,
            last_tick: Instant::now(),
        }
    }

    /// Execute one pulse.
    pub fn pulse(&mut self) {
        self.running = false;
        if self.cpu.is_halted() {
            self.report_halt();
            return;
        }
        let pulse = self.cpu.pulse();
        self.status = format!("T{}: {}", pulse.microstep, pulse.signals);
        self.record(&pulse);
        self.report_halt();
    }

    /// Execute pulses until the current instruction completes.
    pub fn step_instruction(&mut self) {
        self.running = false;
        if self.cpu.is_halted() {
            self.report_halt();
            return;
        }
        let pc = self.cpu.registers().pc;
        let mut pulses = 0;
        while !self.cpu.is_halted() {
            let pulse = self.cpu.pulse();
            pulses += 1;
            self.record(&pulse);
            if self.cpu.microstep() == 1 {
                break;
            }
        }
        self.status = format!("Stepped {} pulses from PC={}", pulses, pc);
        self.report_halt();
    }

    /// Start or pause the clock.
    pub fn toggle_run(&mut self) {
        self.running = !self.running;
        self.last_tick = Instant::now();
        self.clock.reset();
        self.status = if self.running {
            format!("Running at {} Hz", self.clock.hz())
        } else {
            "Paused.".into()
        };
    }

    /// Multiply the clock target by `factor`.
    pub fn scale_hz(&mut self, factor: f64) {
        let hz = (self.clock.hz() * factor).clamp(0.125, 1_000_000.0);
        self.clock.configure(hz);
        self.status = format!("Clock target {} Hz", hz);
    }

    /// Press a keypad key. It is released after [`KEY_HOLD`].
    pub fn press(&mut self, key: Key) {
        self.cpu.set_key(Some(key));
        self.held_key = Some((key, Instant::now()));
        self.status = format!("Key {} (0x{:02x})", key, Key::code(Some(key)));
    }

    /// Reset the machine. Memory is kept.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.clock.reset();
        self.running = false;
        self.outputs.clear();
        self.status = "Reset. Ready.".into();
    }

    /// Advance wall-clock driven state: key release and clocked pulses.
    pub fn tick(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick).as_secs_f64();
        self.last_tick = now;

        if let Some((_, pressed)) = self.held_key {
            if now.duration_since(pressed) >= KEY_HOLD {
                self.cpu.set_key(None);
                self.held_key = None;
            }
        }

        if !self.running {
            return;
        }
        let mut outputs = Vec::new();
        self.clock.advance_with(&mut self.cpu, elapsed, |pulse: &Pulse| {
            outputs.extend(pulse.output);
        });
        for value in outputs {
            self.push_output(value);
        }
        if self.cpu.is_halted() {
            self.running = false;
            self.report_halt();
        }
    }

    /// Key currently held on the keypad.
    pub fn held_key(&self) -> Option<Key> {
        self.held_key.map(|(key, _)| key)
    }

    /// Scroll the memory view, clamped to the memory size.
    pub fn scroll_memory(&mut self, rows: isize) {
        let max = self.cpu.memory().len().saturating_sub(1) / MEMORY_ROW;
        self.mem_scroll = self.mem_scroll.saturating_add_signed(rows).min(max);
    }

    /// Disassembly around the PC: `(address, text, is_current)`.
    pub fn get_disassembly(&self, lines: usize) -> Vec<(usize, String, bool)> {
        let memory = self.cpu.memory();
        let pc = self.cpu.registers().pc as usize;

        // walk forward from a few instructions back so the PC line is aligned
        let mut start = pc.saturating_sub(lines / 2);
        while start < pc {
            match disassemble_at(self.cpu.table(), memory, start) {
                Some(line) if start + line.size <= pc => break,
                _ => start += 1,
            }
        }

        disassemble(self.cpu.table(), memory, start, lines)
            .into_iter()
            .map(|line| (line.address, line.text, line.address == pc))
            .collect()
    }

    fn record(&mut self, pulse: &Pulse) {
        if let Some(value) = pulse.output {
            self.push_output(value);
        }
    }

    fn push_output(&mut self, value: u64) {
        self.outputs.push(value);
        if self.outputs.len() > OUTPUT_HISTORY {
            self.outputs.remove(0);
        }
    }

    fn report_halt(&mut self) {
        if let Some(reason) = self.cpu.halt_reason() {
            self.status = format!("Stopped after {} pulses: {}", self.cpu.cycles(), reason);
        }
    }
}

/// Run the debugger on a loaded machine.
pub fn run_debugger(cpu: Cpu, hz: f64) -> std::io::Result<()> {
    use crossterm::{
        event::{self, Event, KeyCode, KeyEventKind},
        terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
        ExecutableCommand,
    };
    use ratatui::prelude::*;
    use std::io::stdout;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let mut app = DebuggerApp::new(cpu, hz);

    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        if event::poll(Duration::from_millis(16))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => app.should_quit = true,
                        KeyCode::Char(' ') => app.pulse(),
                        KeyCode::Char('n') => app.step_instruction(),
                        KeyCode::Char('r') => app.toggle_run(),
                        KeyCode::Char('[') => app.scale_hz(0.5),
                        KeyCode::Char(']') => app.scale_hz(2.0),
                        KeyCode::Char('x') => app.reset(),
                        KeyCode::Up => app.scroll_memory(-1),
                        KeyCode::Down => app.scroll_memory(1),
                        KeyCode::PageUp => app.scroll_memory(-16),
                        KeyCode::PageDown => app.scroll_memory(16),
                        KeyCode::Char(c) => {
                            if let Some(k) = Key::from_char(c) {
                                app.press(k);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }

        app.tick();

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}
