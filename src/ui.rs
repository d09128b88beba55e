use crate::app::{App, AppMode, Focus, PromptKind, ToastKind};
use crate::rich::{Rgb, RichText, Selection};
use crate::schedule::{CELL_PLACEHOLDER, TIME_COLUMN_PERCENT, Target};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Cell, Clear, List, ListItem, ListState, Paragraph, Row, Table, Wrap},
};

const HELP: &[(&str, &str)] = &[
    ("arrows / hjkl", "move between cells"),
    ("Enter / e", "edit cell (Esc or Enter to finish)"),
    ("t", "edit title"),
    ("Shift+Left/Right", "select while editing"),
    ("Ctrl+A", "select all while editing"),
    ("Ctrl+B / I / U", "bold, italic, underline selection"),
    ("Ctrl+K", "custom colour (selection or whole schedule)"),
    ("Ctrl+V", "paste from clipboard"),
    ("c / C", "add / remove day column"),
    ("r / R", "add / remove time slot"),
    ("[ / ]", "previous / next theme"),
    ("f / F", "next / previous font"),
    ("s", "cycle font size"),
    ("b", "load background image"),
    ("- / +", "background opacity"),
    ("x", "remove background"),
    ("Ctrl+P", "export PDF"),
    ("Ctrl+Shift+P / p", "print"),
    ("Tab", "switch to controls"),
    ("?", "toggle this help"),
    ("q", "quit"),
];

fn rgb(c: Rgb) -> Color {
    Color::Rgb(c.0, c.1, c.2)
}

pub fn draw(f: &mut Frame, app: &App) {
    if app.controls_hidden() {
        draw_canvas(f, f.size(), app);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(AsRef::<[Constraint]>::as_ref(&[Constraint::Min(1), Constraint::Length(1)]))
        .split(f.size());

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(AsRef::<[Constraint]>::as_ref(&[Constraint::Length(32), Constraint::Min(10)]))
        .split(chunks[0]);

    draw_controls(f, body_chunks[0], app);
    draw_canvas(f, body_chunks[1], app);
    draw_status(f, chunks[1], app);

    if app.show_help {
        draw_help(f, f.size());
    }
}

fn draw_controls(f: &mut Frame, area: Rect, app: &App) {
    let items: Vec<ListItem> = app
        .controls()
        .into_iter()
        .map(|c| {
            let value = app.control_value(c);
            let line = if value.is_empty() {
                Line::from(Span::raw(c.label()))
            } else {
                Line::from(vec![
                    Span::styled(format!("{}: ", c.label()), Style::default().fg(Color::Gray)),
                    Span::raw(value),
                ])
            };
            ListItem::new(line)
        })
        .collect();

    let border = if app.focus == Focus::Controls {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border)
                .title("Controls"),
        )
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .fg(Color::Yellow),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if app.focus == Focus::Controls {
        state.select(Some(app.control_index));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_canvas(f: &mut Frame, area: Rect, app: &App) {
    let style = &app.doc.style;
    let palette = style.palette();
    let mut title = String::from("Schedule");
    if let Some(bg) = &style.background {
        title.push_str(&format!(" | background {} at {}%", bg.name, style.background_opacity));
    }
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .style(Style::default().bg(rgb(palette.fill)).fg(rgb(palette.text)));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints(AsRef::<[Constraint]>::as_ref(&[Constraint::Length(2), Constraint::Min(1)]))
        .split(inner);

    let editing = editing_selection(app);
    let title_sel = editing.filter(|(t, _)| *t == Target::Title).map(|(_, s)| s);
    let title_style = Style::default()
        .fg(rgb(palette.text))
        .add_modifier(Modifier::BOLD);
    let title = Paragraph::new(rich_text(&app.doc.schedule.title, title_style, title_sel))
        .alignment(Alignment::Center);
    f.render_widget(title, parts[0]);

    draw_table(f, parts[1], app);
}

fn editing_selection(app: &App) -> Option<(Target, Selection)> {
    match &app.mode {
        AppMode::Editing { target, selection } => Some((*target, *selection)),
        AppMode::Prompt {
            kind: PromptKind::CustomColor { resume },
            ..
        } => *resume,
        _ => None,
    }
}

fn draw_table(f: &mut Frame, area: Rect, app: &App) {
    let schedule = &app.doc.schedule;
    let palette = app.doc.style.palette();
    let editing = editing_selection(app);
    let row_height = app.doc.style.font_size.row_height();
    let base = Style::default().fg(rgb(palette.text));
    let cursor_style = Style::default().bg(Color::Blue).fg(Color::Black);
    let show_cursor = app.focus == Focus::Table && matches!(app.mode, AppMode::Normal);

    let selection_for = |target: Target| {
        editing
            .filter(|(t, _)| *t == target)
            .map(|(_, s)| s)
    };
    let at_cursor = |target: Target| show_cursor && app.cursor_target() == target;

    let header_style = Style::default()
        .fg(rgb(palette.header_text))
        .bg(rgb(palette.header_fill))
        .add_modifier(Modifier::BOLD);
    let header = Row::new(schedule.headers.iter().enumerate().map(|(col, h)| {
        let target = Target::Header(col);
        let cell = Cell::from(rich_text(h, header_style, selection_for(target)));
        if at_cursor(target) { cell.style(cursor_style) } else { cell }
    }))
    .style(header_style);

    let rows = schedule.rows.iter().enumerate().map(|(r, row)| {
        let mut cells = Vec::with_capacity(row.cells.len() + 1);
        let time_target = Target::Cell { row: r, col: 0 };
        let time = Cell::from(rich_text(
            &row.time,
            base.add_modifier(Modifier::BOLD),
            selection_for(time_target),
        ));
        cells.push(if at_cursor(time_target) { time.style(cursor_style) } else { time });

        for (c, cell) in row.cells.iter().enumerate() {
            let target = Target::Cell { row: r, col: c + 1 };
            let selection = selection_for(target);
            let text = if cell.empty && selection.is_none() {
                Text::from(Span::styled(
                    CELL_PLACEHOLDER,
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                ))
            } else {
                rich_text(&cell.content, base, selection)
            };
            let ui_cell = Cell::from(text);
            cells.push(if at_cursor(target) { ui_cell.style(cursor_style) } else { ui_cell });
        }

        let mut ui_row = Row::new(cells).height(row_height);
        if r % 2 == 1 {
            ui_row = ui_row.style(Style::default().bg(rgb(palette.alternate)));
        }
        ui_row
    });

    let mut widths = vec![Constraint::Percentage(TIME_COLUMN_PERCENT)];
    widths.extend((0..schedule.day_count()).map(|_| Constraint::Percentage(schedule.day_column_percent())));

    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::TOP).border_style(Style::default().fg(rgb(palette.line))))
        .style(base)
        .column_spacing(1);
    f.render_widget(table, area);
}

/// Styled lines for rich content, with the selection (or caret) reversed.
pub fn rich_text(rich: &RichText, base: Style, selection: Option<Selection>) -> Text<'static> {
    let (sel_start, sel_end) = selection.map(|s| s.range()).unwrap_or((0, 0));
    let caret = selection.filter(Selection::is_collapsed).map(|s| s.focus);
    let highlighted = |i: usize| match caret {
        Some(c) => i == c,
        None => selection.is_some() && i >= sel_start && i < sel_end,
    };

    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut offset = 0;
    for run in rich.runs() {
        let mut style = base;
        if let Some(color) = run.style.color {
            style = style.fg(rgb(color));
        }
        if run.style.is_strong() {
            style = style.add_modifier(Modifier::BOLD);
        }
        if run.style.italic {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if run.style.underline {
            style = style.add_modifier(Modifier::UNDERLINED);
        }

        let mut chunk = String::new();
        let mut chunk_hl = false;
        for ch in run.text.chars() {
            let hl = highlighted(offset);
            offset += 1;
            if ch == '\n' {
                flush(&mut spans, &mut chunk, style, chunk_hl);
                if hl {
                    spans.push(Span::styled(" ", style.add_modifier(Modifier::REVERSED)));
                }
                lines.push(Line::from(std::mem::take(&mut spans)));
                continue;
            }
            if hl != chunk_hl {
                flush(&mut spans, &mut chunk, style, chunk_hl);
                chunk_hl = hl;
            }
            chunk.push(ch);
        }
        flush(&mut spans, &mut chunk, style, chunk_hl);
    }
    if caret == Some(offset) {
        spans.push(Span::styled(" ", base.add_modifier(Modifier::REVERSED)));
    }
    lines.push(Line::from(spans));
    Text::from(lines)
}

fn flush(spans: &mut Vec<Span<'static>>, chunk: &mut String, style: Style, highlighted: bool) {
    if chunk.is_empty() {
        return;
    }
    let style = if highlighted {
        style.add_modifier(Modifier::REVERSED)
    } else {
        style
    };
    spans.push(Span::styled(std::mem::take(chunk), style));
}

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
    let mode = match app.mode {
        AppMode::Normal => "NORMAL",
        AppMode::Editing { .. } => "EDIT",
        AppMode::Prompt { .. } => "INPUT",
    };
    let mut spans = vec![Span::styled(
        format!("[{mode}] "),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];

    if let AppMode::Prompt { kind, buffer } = &app.mode {
        let label = match kind {
            PromptKind::CustomColor { .. } => "Custom color (#rrggbb)",
            PromptKind::Background => "Background image path",
        };
        spans.push(Span::raw(format!("{label}: {buffer}_")));
    } else if let Some(toast) = &app.toast {
        let color = match toast.kind {
            ToastKind::Success => Color::Green,
            ToastKind::Error => Color::Red,
            ToastKind::Info => Color::Yellow,
        };
        spans.push(Span::styled(
            toast.message.clone(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));
    } else {
        spans.push(Span::raw(app.status.clone()));
    }

    let saved = if app.autosave.is_disabled() {
        " | autosave off".to_string()
    } else if app.autosave.is_pending() {
        " | saving...".to_string()
    } else {
        app.last_saved
            .map(|t| format!(" | saved {}", t.format("%H:%M:%S")))
            .unwrap_or_default()
    };
    spans.push(Span::styled(saved, Style::default().fg(Color::DarkGray)));

    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let popup = centered_rect(60, (HELP.len() as u16) + 2, area);
    let lines: Vec<Line> = HELP
        .iter()
        .map(|(keys, what)| {
            Line::from(vec![
                Span::styled(
                    format!("{keys:<18}"),
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw(*what),
            ])
        })
        .collect();
    let p = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Keys (? to close)"))
        .wrap(Wrap { trim: false });
    f.render_widget(Clear, popup);
    f.render_widget(p, popup);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::SystemClipboard;
    use crate::rich::{Format, Run};
    use ratatui::{Terminal, backend::TestBackend};

    fn screen(app: &App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(140, 30)).unwrap();
        terminal.draw(|f| draw(f, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|c| c.symbol())
            .collect()
    }

    fn app() -> App {
        let (req_tx, _req_rx) = crossbeam_channel::unbounded();
        let (_resp_tx, resp_rx) = crossbeam_channel::unbounded();
        App::new(req_tx, resp_rx, Box::new(SystemClipboard))
    }

    #[test]
    fn rich_text_styles_runs() {
        let mut rich = RichText::from_runs(vec![Run::plain("Math "), Run::plain("101")]);
        rich.toggle(0, 4, Format::Bold);
        let text = rich_text(&rich, Style::default(), None);
        assert_eq!(text.lines.len(), 1);
        let spans = &text.lines[0].spans;
        assert_eq!(spans[0].content, "Math");
        assert!(spans[0].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(spans[1].content, " 101");
    }

    #[test]
    fn caret_at_end_adds_a_block() {
        let rich = RichText::plain("ab");
        let text = rich_text(&rich, Style::default(), Some(Selection::caret(2)));
        let last = text.lines[0].spans.last().unwrap();
        assert_eq!(last.content, " ");
        assert!(last.style.add_modifier.contains(Modifier::REVERSED));
    }

    #[test]
    fn selection_is_reversed_and_newlines_split_lines() {
        let rich = RichText::plain("ab\ncd");
        let sel = Selection { anchor: 1, focus: 4 };
        let text = rich_text(&rich, Style::default(), Some(sel));
        assert_eq!(text.lines.len(), 2);
        let first = &text.lines[0].spans;
        assert_eq!(first[0].content, "a");
        assert_eq!(first[1].content, "b");
        assert!(first[1].style.add_modifier.contains(Modifier::REVERSED));
        let second = &text.lines[1].spans;
        assert_eq!(second[0].content, "c");
        assert!(second[0].style.add_modifier.contains(Modifier::REVERSED));
        assert_eq!(second[1].content, "d");
    }

    #[test]
    fn renders_skeleton_and_controls() {
        let app = app();
        let s = screen(&app);
        assert!(s.contains("Class Schedule"));
        assert!(s.contains("Monday"));
        assert!(s.contains("6:00 PM"));
        assert!(s.contains("Controls"));
        assert!(s.contains("[NORMAL]"));
    }

    #[test]
    fn print_hides_controls() {
        let mut app = app();
        app.print_hide_until = Some(std::time::Instant::now());
        let s = screen(&app);
        assert!(!s.contains("Controls"));
        assert!(s.contains("Monday"));
    }
}
