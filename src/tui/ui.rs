//! UI rendering for the debugger.

use super::app::{DebuggerApp, MEMORY_ROW};
use crate::cpu::Signals;
use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
};

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(frame.area());

    // Left side: code, registers and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(9),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_registers(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: control signals, memory and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Min(8),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_signals(frame, right_chunks[0], app);
    draw_memory(frame, right_chunks[1], app);
    draw_help(frame, right_chunks[2]);
}

/// Hex digits needed for one word.
fn hex_width(app: &DebuggerApp) -> usize {
    (app.cpu.config().word_bits as usize + 3) / 4
}

fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, text, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(format!("{}{:04x}: {}", prefix, addr, text)).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    frame.render_widget(list, area);
}

fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let snap = app.cpu.snapshot();
    let regs = &snap.registers;
    let value = |v: u64| Span::styled(format!("{:<6}", v), Style::default().fg(Color::White));
    let flag = |on: bool, name: &'static str| {
        Span::styled(
            name,
            if on {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            },
        )
    };
    let outputs: Vec<String> = app.outputs.iter().map(|v| v.to_string()).collect();

    let content = vec![
        Line::from(vec![
            Span::raw("PC: "),
            Span::styled(format!("{:<6}", regs.pc), Style::default().fg(Color::Yellow)),
            Span::raw("MAR: "),
            value(regs.mar),
            Span::raw("SP: "),
            value(regs.sp),
        ]),
        Line::from(vec![
            Span::raw("A:  "),
            value(regs.a),
            Span::raw("B:   "),
            value(regs.b),
            Span::raw("ALU: "),
            value(snap.alu.value),
        ]),
        Line::from(vec![
            Span::raw("IA: "),
            value(regs.ir_a),
            Span::raw("IB:  "),
            value(regs.ir_b),
            Span::raw("Flags: "),
            flag(regs.flags.carry, "C"),
            Span::raw(" "),
            flag(regs.flags.zero, "Z"),
        ]),
        Line::from(vec![
            Span::raw("OUT: "),
            Span::styled(format!("{:<5}", regs.out), Style::default().fg(Color::LightGreen)),
            Span::raw("Disp: "),
            value(regs.display_data),
            Span::raw("Ctl: "),
            Span::raw(format!("{:03b}", regs.display_control)),
        ]),
        Line::from(vec![
            Span::raw("Key: "),
            Span::raw(match app.held_key() {
                Some(key) => format!("{} (0x{:02x})", key, snap.input),
                None => "-".to_string(),
            }),
            Span::raw("   Cycles: "),
            Span::styled(format!("{}", snap.cycles), Style::default().fg(Color::Cyan)),
        ]),
        Line::from(vec![
            Span::raw("Clock: "),
            Span::styled(
                format!("{} Hz", app.clock.hz()),
                if app.running {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default().fg(Color::DarkGray)
                },
            ),
            Span::raw("   State: "),
            Span::styled(
                match &snap.halt_reason {
                    Some(reason) => reason.to_string(),
                    None if app.running => "running".to_string(),
                    None => "stopped".to_string(),
                },
                if snap.halted {
                    Style::default().fg(Color::Red)
                } else {
                    Style::default().fg(Color::Green)
                },
            ),
        ]),
        Line::from(format!("Output: {}", outputs.join(" "))),
    ];

    let paragraph = Paragraph::new(content).block(
        Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)),
    );

    frame.render_widget(paragraph, area);
}

/// Every control line, lit when the next pulse asserts it.
fn draw_signals(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let snap = app.cpu.snapshot();
    let active = snap.signals;

    let spans: Vec<Span> = Signals::ALL
        .iter()
        .flat_map(|(signal, name)| {
            let style = if active.contains(*signal) {
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            [Span::styled(*name, style), Span::raw(" ")]
        })
        .collect();

    let title = format!(
        " Control  T{}  {} ",
        snap.microstep,
        snap.mnemonic.unwrap_or("???")
    );
    let paragraph = Paragraph::new(Line::from(spans))
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        );

    frame.render_widget(paragraph, area);
}

/// Hex memory view. The PC, MAR and stack top are highlighted and the
/// stack window is tinted.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let memory = app.cpu.memory();
    let regs = app.cpu.registers();
    let width = hex_width(app);
    let stack = app.cpu.stack_window();
    let stack_top = stack.start as u64 + regs.sp;

    let visible_rows = (area.height as usize).saturating_sub(2);
    let items: Vec<ListItem> = (app.mem_scroll..)
        .take(visible_rows)
        .map(|row| row * MEMORY_ROW)
        .take_while(|&base| base < memory.len())
        .map(|base| {
            let mut spans = vec![Span::styled(
                format!("{:04x}:", base),
                Style::default().fg(Color::Magenta),
            )];
            for (offset, &word) in memory[base..(base + MEMORY_ROW).min(memory.len())].iter().enumerate() {
                let addr = (base + offset) as u64;
                let style = if addr == regs.pc {
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
                } else if addr == regs.mar {
                    Style::default().fg(Color::Cyan)
                } else if addr == stack_top {
                    Style::default().fg(Color::LightMagenta)
                } else if stack.contains(&(addr as usize)) {
                    Style::default().fg(Color::Magenta)
                } else if word != 0 {
                    Style::default().fg(Color::White)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                spans.push(Span::raw(" "));
                spans.push(Span::styled(format!("{:0w$x}", word, w = width), style));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );

    frame.render_widget(list, area);
}

fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let status = Paragraph::new(app.status.clone())
        .style(Style::default().fg(Color::White))
        .block(Block::default().title(" Status ").borders(Borders::ALL));

    frame.render_widget(status, area);
}

fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("space: Pulse  n: Instruction  r: Run/Pause  [ ]: Clock  x: Reset"),
        Line::from("0-9 + - * /: Keypad  ↑↓ PgUp PgDn: Scroll memory  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default().title(" Help ").borders(Borders::ALL));

    frame.render_widget(help, area);
}
