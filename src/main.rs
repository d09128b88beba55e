use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{backend::CrosstermBackend, prelude::*};

mod app;
mod autosave;
mod clipboard;
mod db;
mod document;
mod error;
mod export;
mod paste;
mod rich;
mod sanitize;
mod schedule;
mod snapshot;
mod style;
mod ui;

use app::{App, AppMode, Focus};
use clipboard::SystemClipboard;
use db::{Request, Response, start_worker};
use paste::ClipboardPayload;
use rich::Format;
use schedule::Target;

#[derive(Parser, Debug)]
#[command(author, version, about = "Class schedule editor")]
struct Args {
    /// SQLite file holding the autosaved schedule
    #[arg(long, value_name = "PATH")]
    store: Option<PathBuf>,

    /// Directory PDF exports are written to
    #[arg(long, value_name = "DIR", default_value = ".")]
    export_dir: PathBuf,

    /// Log file (RUST_LOG sets the level, default info)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("class-schedule")
}

/// Logs go to a file; anything on stderr would draw over the TUI.
fn init_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
    Ok(())
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(|| data_dir().join("schedule.log"));
    init_logging(&log_file)?;
    let store = args
        .store
        .clone()
        .unwrap_or_else(|| data_dir().join("state.sqlite3"));
    log::info!("store {}, exports to {}", store.display(), args.export_dir.display());

    let mut terminal = setup_terminal()?;

    // Worker channels
    let (req_tx, req_rx) = crossbeam_channel::unbounded::<Request>();
    let (resp_tx, resp_rx) = crossbeam_channel::unbounded::<Response>();

    let export_dir = args.export_dir.clone();
    let worker = std::thread::spawn(move || start_worker(store, export_dir, req_rx, resp_tx));

    let mut app = App::new(req_tx, resp_rx, Box::new(SystemClipboard));
    app.request_load();

    let mut last_tick = Instant::now();
    let tick_rate = Duration::from_millis(100);

    let res = run_app(&mut terminal, &mut app, tick_rate, &mut last_tick);

    app.flush();
    drop(app);
    let _ = worker.join();

    restore_terminal(terminal)?;
    if let Err(e) = res {
        log::error!("{e:?}");
        eprintln!("Error: {e:?}");
    }
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    tick_rate: Duration,
    last_tick: &mut Instant,
) -> Result<()> {
    // Redraw only when state changes or on tick
    let mut dirty = true;
    loop {
        // Process any worker responses without blocking
        while let Ok(msg) = app.resp_rx.try_recv() {
            app.handle_response(msg, Instant::now());
            dirty = true;
        }

        let tick_due = last_tick.elapsed() >= tick_rate;
        if tick_due {
            if app.on_tick(Instant::now()) {
                dirty = true;
            }
            *last_tick = Instant::now();
        }
        if dirty {
            terminal.draw(|f| ui::draw(f, app))?;
            dirty = false;
        }

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::from_secs(0));

        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => {
                    handle_key(app, key);
                    dirty = true;
                }
                Event::Paste(text) => {
                    if matches!(app.mode, AppMode::Prompt { .. }) {
                        text.chars().filter(|c| !c.is_control()).for_each(|c| app.prompt_input(c));
                    } else {
                        app.paste_payload(&ClipboardPayload::plain(text), Instant::now());
                    }
                    dirty = true;
                }
                Event::Resize(..) => dirty = true,
                _ => {}
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.code != KeyCode::Char('q') {
        app.quit_armed = false;
    }
    match app.mode {
        AppMode::Editing { .. } => handle_key_editing(app, key),
        AppMode::Prompt { .. } => handle_key_prompt(app, key),
        AppMode::Normal if app.show_help => {
            if matches!(key.code, KeyCode::Char('?') | KeyCode::Esc) {
                app.toggle_help();
            }
        }
        AppMode::Normal => {
            if handle_key_global(app, key) {
                return;
            }
            if key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
                return;
            }
            match app.focus {
                Focus::Table => handle_key_table(app, key.code),
                Focus::Controls => handle_key_controls(app, key.code),
            }
        }
    }
}

/// Ctrl+P exports and Ctrl+Shift+P prints, in every mode but prompts.
fn handle_key_output(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char(c)
            if key.modifiers.contains(KeyModifiers::CONTROL) && c.eq_ignore_ascii_case(&'p') =>
        {
            if c == 'P' || key.modifiers.contains(KeyModifiers::SHIFT) {
                app.print(Instant::now());
            } else {
                app.export_pdf();
            }
            true
        }
        _ => false,
    }
}

/// Keys shared by both panes in normal mode; returns true when consumed.
fn handle_key_global(app: &mut App, key: KeyEvent) -> bool {
    if handle_key_output(app, key) {
        return true;
    }
    let now = Instant::now();
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('k') if ctrl => app.begin_custom_color(),
        KeyCode::Char('v') if ctrl => app.paste_from_clipboard(now),
        KeyCode::Char('q') => app.request_quit(),
        KeyCode::Char('?') => app.toggle_help(),
        KeyCode::Tab | KeyCode::BackTab => app.toggle_focus(),
        _ => return false,
    }
    true
}

fn handle_key_table(app: &mut App, code: KeyCode) {
    let now = Instant::now();
    match code {
        KeyCode::Up | KeyCode::Char('k') => app.move_cursor(-1, 0),
        KeyCode::Down | KeyCode::Char('j') => app.move_cursor(1, 0),
        KeyCode::Left | KeyCode::Char('h') => app.move_cursor(0, -1),
        KeyCode::Right | KeyCode::Char('l') => app.move_cursor(0, 1),
        KeyCode::Enter | KeyCode::Char('e') => app.begin_edit_at_cursor(),
        KeyCode::Char('t') => app.begin_edit(Target::Title),
        KeyCode::Char('c') => app.add_column(now),
        KeyCode::Char('C') => app.remove_column(now),
        KeyCode::Char('r') => app.add_row(now),
        KeyCode::Char('R') => app.remove_row(now),
        KeyCode::Char(']') => app.cycle_theme(true, now),
        KeyCode::Char('[') => app.cycle_theme(false, now),
        KeyCode::Char('f') => app.cycle_font_family(true, now),
        KeyCode::Char('F') => app.cycle_font_family(false, now),
        KeyCode::Char('s') => app.cycle_font_size(true, now),
        KeyCode::Char('b') => app.begin_prompt(app::PromptKind::Background),
        KeyCode::Char('+') | KeyCode::Char('=') => app.adjust_opacity(true),
        KeyCode::Char('-') | KeyCode::Char('_') => app.adjust_opacity(false),
        KeyCode::Char('x') => app.remove_background(),
        KeyCode::Char('p') => app.print(now),
        _ => {}
    }
}

fn handle_key_controls(app: &mut App, code: KeyCode) {
    let now = Instant::now();
    match code {
        KeyCode::Up | KeyCode::Char('k') => app.move_control(-1),
        KeyCode::Down | KeyCode::Char('j') => app.move_control(1),
        KeyCode::Left | KeyCode::Char('h') => app.control_adjust(false, now),
        KeyCode::Right | KeyCode::Char('l') => app.control_adjust(true, now),
        KeyCode::Enter | KeyCode::Char(' ') => app.control_activate(now),
        KeyCode::Esc => app.toggle_focus(),
        _ => {}
    }
}

fn handle_key_editing(app: &mut App, key: KeyEvent) {
    if handle_key_output(app, key) {
        return;
    }
    let now = Instant::now();
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let shift = key.modifiers.contains(KeyModifiers::SHIFT);

    match key.code {
        KeyCode::Enter | KeyCode::Esc => app.finish_edit(),
        KeyCode::Backspace => app.edit_backspace(now),
        KeyCode::Delete => app.edit_delete(now),
        KeyCode::Left => app.edit_move(-1, shift),
        KeyCode::Right => app.edit_move(1, shift),
        KeyCode::Home => app.edit_jump(false, shift),
        KeyCode::End => app.edit_jump(true, shift),
        KeyCode::Char('a') if ctrl => app.edit_select_all(),
        KeyCode::Char('b') if ctrl => app.toggle_format(Format::Bold, now),
        KeyCode::Char('i') if ctrl => app.toggle_format(Format::Italic, now),
        KeyCode::Char('u') if ctrl => app.toggle_format(Format::Underline, now),
        KeyCode::Char('k') if ctrl => app.begin_custom_color(),
        KeyCode::Char('v') if ctrl => app.paste_from_clipboard(now),
        KeyCode::Char(_) if ctrl => {}
        KeyCode::Char(c) => {
            let mut buf = [0u8; 4];
            app.edit_insert(c.encode_utf8(&mut buf), now);
        }
        _ => {}
    }
}

fn handle_key_prompt(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => app.prompt_submit(Instant::now()),
        KeyCode::Esc => app.prompt_cancel(),
        KeyCode::Backspace => app.prompt_backspace(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => app.prompt_input(c),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{Receiver, unbounded};

    fn app() -> (App, Receiver<Request>) {
        let (req_tx, req_rx) = unbounded();
        let (_resp_tx, resp_rx) = unbounded();
        (App::new(req_tx, resp_rx, Box::new(SystemClipboard)), req_rx)
    }

    fn press(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
        handle_key(app, KeyEvent::new(code, modifiers));
    }

    #[test]
    fn control_chords_leave_the_table_alone() {
        let (mut app, req_rx) = app();
        let before = app.doc.clone();
        for c in ['c', 'r', 'b', 'R', 'x'] {
            press(&mut app, KeyCode::Char(c), KeyModifiers::CONTROL);
        }
        press(&mut app, KeyCode::Char('c'), KeyModifiers::ALT);
        assert_eq!(app.doc, before);
        assert!(matches!(app.mode, AppMode::Normal));
        assert!(!app.autosave.is_pending());
        assert!(req_rx.try_recv().is_err());

        press(&mut app, KeyCode::Char('c'), KeyModifiers::NONE);
        assert_eq!(app.doc.schedule.column_count(), before.schedule.column_count() + 1);
    }

    #[test]
    fn export_and_print_work_while_editing() {
        let (mut app, req_rx) = app();
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        press(&mut app, KeyCode::Char('x'), KeyModifiers::NONE);
        press(&mut app, KeyCode::Char('p'), KeyModifiers::CONTROL);
        press(&mut app, KeyCode::Char('P'), KeyModifiers::CONTROL | KeyModifiers::SHIFT);

        assert!(matches!(app.mode, AppMode::Editing { .. }));
        assert_eq!(app.doc.schedule.rows[0].cells[0].content.text(), "x");
        let sent: Vec<Request> = req_rx.try_iter().collect();
        assert!(matches!(sent.as_slice(), [Request::ExportPdf { .. }, Request::Print { .. }]));
    }
}
