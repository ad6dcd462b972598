//! Debugger application state and logic.

use crate::config::Config;
use crate::console::{format_step, Console};
use crate::cpu::{Address, ChangedRegisters, Phase, StepReport};
use crate::image::{disassemble_word, Image};
use crate::machine::Machine;
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::info;

/// Lines kept in the trace panel.
const TRACE_CAPACITY: usize = 256;

/// Debugger application state.
pub struct DebuggerApp {
    /// The machine being debugged.
    pub machine: Machine,
    /// Image reloaded by reset.
    pub image: Image,
    /// Breakpoints, checked at T0 against PC.
    pub breakpoints: HashSet<Address>,
    /// Is the debugger running continuously?
    pub running: bool,
    pub should_quit: bool,
    /// Status message to display.
    pub status: String,
    /// Most recent transitions, newest last.
    pub trace: VecDeque<String>,
    /// Registers changed by the last step.
    pub changed: ChangedRegisters,
    /// First address shown in the memory panel.
    pub mem_scroll: usize,
    /// Text typed after `:`, while command mode is open.
    pub input: Option<String>,
    /// Delay between microcycles while running.
    pub speed: Duration,
    console: Console,
    resume: bool,
}

impl DebuggerApp {
    /// Create a new debugger with a loaded image.
    pub fn new(image: Image, config: Config) -> Self {
        let machine = Machine::with_image(config.engine(), &image);

        Self {
            machine,
            image,
            breakpoints: HashSet::new(),
            running: false,
            should_quit: false,
            status: "Ready. Press 's' to step, 'n' for next, 'r' to run, 'q' to quit.".into(),
            trace: VecDeque::with_capacity(TRACE_CAPACITY),
            changed: ChangedRegisters::empty(),
            mem_scroll: 0,
            input: None,
            speed: config.speed(),
            console: Console::new(config.max_cycles),
            resume: false,
        }
    }

    /// Step one microcycle.
    pub fn step(&mut self) {
        match self.machine.step_micro() {
            Ok(report) => {
                self.status = format_step(&report);
                self.record(&report);
            }
            Err(e) => {
                self.status = format!("Error: {}", e);
                self.running = false;
            }
        }
    }

    /// Finish the current instruction.
    pub fn next_instruction(&mut self) {
        match self.machine.step_instruction() {
            Ok(report) => {
                for step in &report.steps {
                    self.record(step);
                }
                self.changed = report.changed;
                let pc = self.machine.registers().pc;
                self.status = if self.machine.is_halted() {
                    "Halted.".into()
                } else {
                    format!("PC={pc}: {}", disassemble_word(self.machine.read(pc)))
                };
            }
            Err(e) => self.status = format!("Error: {}", e),
        }
    }

    /// Start continuous execution.
    pub fn run(&mut self) {
        if self.machine.is_halted() {
            self.status = "Machine halted. Press 'x' to reload.".into();
            return;
        }
        self.running = true;
        self.resume = true;
        self.status = "Running...".into();
    }

    pub fn pause(&mut self) {
        self.running = false;
        self.status = "Paused.".into();
    }

    /// Run one microcycle of continuous execution.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }

        if self.machine.is_halted() {
            self.running = false;
            self.status = format!("Halted after {} cycles", self.machine.profiler().cycles());
            return;
        }

        // A breakpoint stops the run before the instruction at PC is fetched.
        let pc = self.machine.registers().pc;
        if !self.resume && self.machine.phase() == Phase::FetchAddr && self.breakpoints.contains(&pc) {
            self.running = false;
            self.status = format!("Breakpoint at PC={pc}");
            return;
        }
        self.resume = false;

        self.step();
    }

    /// Toggle breakpoint at current PC.
    pub fn toggle_breakpoint(&mut self) {
        let pc = self.machine.registers().pc;
        if self.breakpoints.remove(&pc) {
            self.status = format!("Removed breakpoint at PC={pc}");
        } else {
            self.breakpoints.insert(pc);
            self.status = format!("Set breakpoint at PC={pc}");
        }
    }

    /// Reload the image and clear the trace.
    pub fn reset(&mut self) {
        self.machine.load_image(&self.image);
        self.running = false;
        self.trace.clear();
        self.changed = ChangedRegisters::empty();
        self.status = "Reset. Ready.".into();
        info!(cells = self.image.len(), "debugger reset");
    }

    pub fn faster(&mut self) {
        self.speed = (self.speed / 2).max(Duration::from_millis(crate::config::MIN_SPEED_MS));
        self.status = format!("Speed: {} ms", self.speed.as_millis());
    }

    pub fn slower(&mut self) {
        self.speed = (self.speed * 2).min(Duration::from_secs(5));
        self.status = format!("Speed: {} ms", self.speed.as_millis());
    }

    pub fn scroll_memory(&mut self, delta: isize) {
        self.mem_scroll = self
            .mem_scroll
            .saturating_add_signed(delta)
            .min(crate::cpu::MEMORY_SIZE - 1);
    }

    /// Run a console command typed in command mode.
    pub fn submit_command(&mut self) {
        let Some(line) = self.input.take() else {
            return;
        };
        let before = *self.machine.registers();
        match self.console.execute(&mut self.machine, &line) {
            Ok(out) => {
                self.push_trace(format!(":{}", line.trim()));
                for l in out.lines() {
                    self.push_trace(l.to_string());
                }
                self.changed = ChangedRegisters::between(&before, self.machine.registers());
                self.status = format!("ok: {}", line.trim());
            }
            Err(e) => self.status = format!("Error: {}", e),
        }
    }

    /// Disassembly around the current PC: (address, text, is_pc).
    pub fn get_disassembly(&self, lines: usize) -> Vec<(Address, String, bool)> {
        let pc = self.machine.registers().pc;
        let start = pc.value().saturating_sub((lines / 2) as u16);

        self.machine
            .memory_range(Address::new(start), lines)
            .into_iter()
            .map(|(addr, word)| {
                let text = format!("{word:04X}  {}", disassemble_word(word));
                (addr, text, addr == pc)
            })
            .collect()
    }

    fn record(&mut self, report: &StepReport) {
        self.changed = report.changed;
        self.push_trace(format_step(report));
    }

    fn push_trace(&mut self, line: String) {
        if self.trace.len() == TRACE_CAPACITY {
            self.trace.pop_front();
        }
        self.trace.push_back(line);
    }
}

/// Run the debugger with an image.
pub fn run_debugger(image: Image, config: Config) -> std::io::Result<()> {
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

    let mut app = DebuggerApp::new(image, config);
    let mut last_tick = Instant::now();

    // Main loop
    loop {
        terminal.draw(|frame| {
            super::ui::draw(frame, &app);
        })?;

        let timeout = if app.running {
            app.speed.saturating_sub(last_tick.elapsed())
        } else {
            Duration::from_millis(50)
        };

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(input) = app.input.as_mut() {
                        match key.code {
                            KeyCode::Enter => app.submit_command(),
                            KeyCode::Esc => app.input = None,
                            KeyCode::Backspace => {
                                input.pop();
                            }
                            KeyCode::Char(c) => input.push(c),
                            _ => {}
                        }
                    } else {
                        match key.code {
                            KeyCode::Char('q') => app.should_quit = true,
                            KeyCode::Char('s') => {
                                app.running = false;
                                app.step();
                            }
                            KeyCode::Char('n') => {
                                app.running = false;
                                app.next_instruction();
                            }
                            KeyCode::Char('r') => app.run(),
                            KeyCode::Char('p') => app.pause(),
                            KeyCode::Char('h') => {
                                app.machine.halt();
                                app.running = false;
                                app.status = "Halted by user.".into();
                            }
                            KeyCode::Char('b') => app.toggle_breakpoint(),
                            KeyCode::Char('x') => app.reset(),
                            KeyCode::Char('+') => app.faster(),
                            KeyCode::Char('-') => app.slower(),
                            KeyCode::Char(':') => app.input = Some(String::new()),
                            KeyCode::Up => app.scroll_memory(-1),
                            KeyCode::Down => app.scroll_memory(1),
                            KeyCode::PageUp => app.scroll_memory(-16),
                            KeyCode::PageDown => app.scroll_memory(16),
                            _ => {}
                        }
                    }
                }
            }
        }

        // Tick for continuous running
        if app.running && last_tick.elapsed() >= app.speed {
            app.tick();
            last_tick = Instant::now();
        }

        if app.should_quit {
            break;
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Register;

    fn app() -> DebuggerApp {
        // LDA 10, ADD 11, STA 12, HLT
        let image = Image::from([
            (0, 0x2010),
            (1, 0x1011),
            (2, 0x3012),
            (3, 0x7001),
            (0x10, 2),
            (0x11, 3),
        ]);
        DebuggerApp::new(image, Config::default())
    }

    #[test]
    fn test_step_records_trace() {
        let mut app = app();
        app.step();
        assert_eq!(app.trace.len(), 1);
        assert_eq!(app.machine.phase(), Phase::FetchInstr);
        app.next_instruction();
        assert!(app.changed.contains(Register::Ac));
        assert_eq!(app.trace.len(), 6);
        assert_eq!(app.machine.register(Register::Ac), 2);
    }

    #[test]
    fn test_run_stops_at_breakpoint() {
        let mut app = app();
        app.machine.step_instruction().unwrap();
        app.breakpoints.insert(Address::new(2));
        app.run();
        for _ in 0..20 {
            app.tick();
        }
        assert!(!app.running);
        assert_eq!(app.machine.registers().pc, Address::new(2));
        assert_eq!(app.machine.phase(), Phase::FetchAddr);

        // Resuming passes the breakpoint it stopped on.
        app.run();
        for _ in 0..40 {
            app.tick();
        }
        assert!(app.machine.is_halted());
        assert_eq!(app.machine.read(Address::new(0x12)), 5);
    }

    #[test]
    fn test_reset_reloads_image() {
        let mut app = app();
        app.run();
        for _ in 0..40 {
            app.tick();
        }
        assert!(app.machine.is_halted());
        app.reset();
        assert!(!app.machine.is_halted());
        assert!(app.trace.is_empty());
        assert_eq!(app.machine.read(Address::zero()), 0x2010);
    }

    #[test]
    fn test_command_mode() {
        let mut app = app();
        app.input = Some("show mem 10 2".into());
        app.submit_command();
        assert!(app.input.is_none());
        assert!(app.trace.iter().any(|l| l.starts_with("010: 0002")));

        app.input = Some("bogus".into());
        app.submit_command();
        assert!(app.status.starts_with("Error: unknown command"));
    }

    #[test]
    fn test_speed_bounds() {
        let mut app = app();
        for _ in 0..10 {
            app.faster();
        }
        assert_eq!(app.speed, Duration::from_millis(crate::config::MIN_SPEED_MS));
    }
}
