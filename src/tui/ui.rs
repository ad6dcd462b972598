//! UI rendering for the debugger.

use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, List, ListItem},
    style::{Color, Style, Modifier},
};
use crate::cpu::{Address, Register};
use super::app::DebuggerApp;

/// Main draw function.
pub fn draw(frame: &mut Frame, app: &DebuggerApp) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(55),
            Constraint::Percentage(45),
        ])
        .split(frame.area());

    // Left side: code, trace and status
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),
            Constraint::Length(10),
            Constraint::Length(3),
        ])
        .split(chunks[0]);

    draw_disassembly(frame, left_chunks[0], app);
    draw_trace(frame, left_chunks[1], app);
    draw_status(frame, left_chunks[2], app);

    // Right side: machine state, memory and help
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Length(7),
            Constraint::Min(6),
            Constraint::Length(4),
        ])
        .split(chunks[1]);

    draw_registers(frame, right_chunks[0], app);
    draw_profiler(frame, right_chunks[1], app);
    draw_memory(frame, right_chunks[2], app);
    draw_help(frame, right_chunks[3]);
}

/// Draw disassembly view around PC.
fn draw_disassembly(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let disasm = app.get_disassembly((area.height as usize).saturating_sub(2));

    let items: Vec<ListItem> = disasm
        .iter()
        .map(|(addr, instr, is_current)| {
            let prefix = if *is_current { "▶ " } else { "  " };
            let bp = if app.breakpoints.contains(addr) { "●" } else { " " };
            let text = format!("{}{}: {}", prefix, addr, instr);

            let style = if *is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if app.breakpoints.contains(addr) {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };

            ListItem::new(format!("{} {}", bp, text)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Disassembly ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)));

    frame.render_widget(list, area);
}

/// Draw registers; the ones the last step changed are highlighted.
fn draw_registers(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let regs = app.machine.registers();
    let spans: Vec<Span> = Register::ALL
        .into_iter()
        .flat_map(|reg| {
            let style = if app.changed.contains(reg) {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            [
                Span::raw(format!("{reg}: ")),
                Span::styled(regs.format(reg), style),
                Span::raw("  "),
            ]
        })
        .collect();

    let content = vec![
        Line::from(spans),
        Line::from(vec![
            Span::raw("Phase: "),
            Span::styled(app.machine.phase().to_string(), Style::default().fg(Color::Cyan)),
            Span::raw("   State: "),
            if app.machine.is_halted() {
                Span::styled("HALTED", Style::default().fg(Color::Red))
            } else {
                Span::styled("READY", Style::default().fg(Color::Green))
            },
        ]),
    ];

    let paragraph = Paragraph::new(content)
        .block(Block::default()
            .title(" Registers ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Green)));

    frame.render_widget(paragraph, area);
}

fn draw_profiler(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let content: Vec<Line> = app
        .machine
        .profiler()
        .to_string()
        .lines()
        .map(|l| Line::from(l.to_string()))
        .collect();

    let paragraph = Paragraph::new(content)
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(" Profiler ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)));

    frame.render_widget(paragraph, area);
}

/// Draw the newest trace lines.
fn draw_trace(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible = (area.height as usize).saturating_sub(2);
    let skip = app.trace.len().saturating_sub(visible);

    let items: Vec<ListItem> = app
        .trace
        .iter()
        .skip(skip)
        .map(|line| ListItem::new(line.as_str()))
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Trace ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)));

    frame.render_widget(list, area);
}

/// Draw memory view.
fn draw_memory(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let visible_rows = (area.height as usize).saturating_sub(2);
    let regs = app.machine.registers();

    let items: Vec<ListItem> = app
        .machine
        .memory_range(Address::new(app.mem_scroll as u16), visible_rows)
        .into_iter()
        .map(|(addr, value)| {
            let text = format!("{}: {:04X}", addr, value);

            let style = if addr == regs.pc {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else if addr == regs.ar {
                Style::default().fg(Color::Cyan)
            } else if value != 0 {
                Style::default().fg(Color::White)
            } else {
                Style::default().fg(Color::DarkGray)
            };

            ListItem::new(text).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(Block::default()
            .title(" Memory ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)));

    frame.render_widget(list, area);
}

/// Draw status bar, or the command line while it is open.
fn draw_status(frame: &mut Frame, area: Rect, app: &DebuggerApp) {
    let (title, text) = match &app.input {
        Some(input) => (" Command ", format!(":{}_", input)),
        None => (" Status ", app.status.clone()),
    };

    let status = Paragraph::new(text)
        .style(Style::default().fg(Color::White))
        .block(Block::default()
            .title(title)
            .borders(Borders::ALL));

    frame.render_widget(status, area);
}

/// Draw help panel.
fn draw_help(frame: &mut Frame, area: Rect) {
    let help = Paragraph::new(vec![
        Line::from("s: Step  n: Next  r: Run  p: Pause  h: Halt  b: Breakpoint"),
        Line::from("x: Reset  +/-: Speed  ↑↓: Scroll  :: Command  q: Quit"),
    ])
    .style(Style::default().fg(Color::DarkGray))
    .block(Block::default()
        .title(" Help ")
        .borders(Borders::ALL));

    frame.render_widget(help, area);
}
