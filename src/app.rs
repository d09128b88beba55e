use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, Utc};
use crossbeam_channel::{Receiver, Sender};

use crate::autosave::Autosave;
use crate::clipboard::ClipboardSource;
use crate::db::{Request, Response};
use crate::document::Document;
use crate::error::ScheduleError;
use crate::export::ExportDocument;
use crate::paste::{self, ClipboardPayload, EditTarget};
use crate::rich::{Format, Rgb, RichText, Selection};
use crate::schedule::Target;
use crate::snapshot;
use crate::style::{self, OPACITY_STEP, Theme};

pub const TOAST_DURATION: Duration = Duration::from_secs(3);
/// How long the controls stay hidden after a print request.
pub const PRINT_HIDE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// `resume` is the edit session to return to, if Ctrl+K came from one.
    CustomColor { resume: Option<(Target, Selection)> },
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppMode {
    Normal,
    Editing { target: Target, selection: Selection },
    Prompt { kind: PromptKind, buffer: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Table,
    Controls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Theme,
    CustomColor,
    FontFamily,
    FontSize,
    Background,
    Opacity,
    RemoveBackground,
    ExportPdf,
    Print,
}

impl Control {
    pub fn label(self) -> &'static str {
        match self {
            Control::Theme => "Theme",
            Control::CustomColor => "Custom color",
            Control::FontFamily => "Font",
            Control::FontSize => "Size",
            Control::Background => "Background",
            Control::Opacity => "Opacity",
            Control::RemoveBackground => "Remove background",
            Control::ExportPdf => "Export PDF",
            Control::Print => "Print",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
    pub shown_at: Instant,
}

pub struct App {
    pub should_quit: bool,

    pub mode: AppMode,
    pub focus: Focus,
    pub status: String,
    pub toast: Option<Toast>,
    pub show_help: bool,

    pub doc: Document,

    /// Table cursor; row 0 is the header row, rows 1.. are time slots.
    pub cursor_row: usize,
    pub cursor_col: usize,
    pub control_index: usize,

    pub autosave: Autosave,
    pub last_saved: Option<DateTime<Local>>,
    /// Set by the first quit request while classes are present.
    pub quit_armed: bool,
    pub print_hide_until: Option<Instant>,

    clipboard: Box<dyn ClipboardSource>,

    pub req_tx: Sender<Request>,
    pub resp_rx: Receiver<Response>,
}

impl App {
    pub fn new(
        req_tx: Sender<Request>,
        resp_rx: Receiver<Response>,
        clipboard: Box<dyn ClipboardSource>,
    ) -> Self {
        Self {
            should_quit: false,
            mode: AppMode::Normal,
            focus: Focus::Table,
            status: "Enter edits a cell, Tab switches to controls, ? shows keys.".into(),
            toast: None,
            show_help: false,
            doc: Document::default(),
            cursor_row: 1,
            cursor_col: 1,
            control_index: 0,
            autosave: Autosave::default(),
            last_saved: None,
            quit_armed: false,
            print_hide_until: None,
            clipboard,
            req_tx,
            resp_rx,
        }
    }

    pub fn request_load(&mut self) {
        let _ = self.req_tx.send(Request::Load);
        self.status = "Loading saved schedule...".into();
    }

    pub fn toast(&mut self, kind: ToastKind, message: impl Into<String>) {
        let message = message.into();
        match kind {
            ToastKind::Error => log::warn!("{message}"),
            _ => log::info!("{message}"),
        }
        self.toast = Some(Toast {
            kind,
            message,
            shown_at: Instant::now(),
        });
    }

    /// Periodic work: fire due saves, expire the toast and print hiding.
    pub fn on_tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if self.autosave.take_due(now) {
            self.save_now();
            changed = true;
        }
        if self
            .toast
            .as_ref()
            .is_some_and(|t| now.duration_since(t.shown_at) >= TOAST_DURATION)
        {
            self.toast = None;
            changed = true;
        }
        if self.print_hide_until.is_some_and(|until| now >= until) {
            self.print_hide_until = None;
            changed = true;
        }
        changed
    }

    /// Capture the document as it is now and hand it to the worker.
    pub fn save_now(&mut self) {
        let snap = snapshot::capture(&self.doc, Utc::now());
        match snapshot::to_json(&snap) {
            Ok(json) => {
                let _ = self.req_tx.send(Request::Save { json });
            }
            Err(e) => {
                log::error!("autosave skipped: {e}");
                self.status = format!("Autosave failed: {e}");
            }
        }
    }

    /// Save immediately if a save is still waiting on its deadline.
    pub fn flush(&mut self) {
        if self.autosave.is_pending() {
            self.autosave = Autosave::default();
            self.save_now();
        }
    }

    pub fn handle_response(&mut self, resp: Response, now: Instant) {
        match resp {
            Response::Loaded(None) => {
                self.status = "New schedule".into();
            }
            Response::Loaded(Some(raw)) => match snapshot::from_json(&raw) {
                Ok(snap) => {
                    let report = snapshot::restore(&snap, &mut self.doc);
                    self.clamp_cursor();
                    if report.style_changed() {
                        self.autosave.schedule_control(now);
                    }
                    let title = if report.title_restored {
                        format!(" \"{}\"", self.doc.schedule.title.text())
                    } else {
                        String::new()
                    };
                    self.status = format!(
                        "Restored saved schedule{title} ({} cells{})",
                        report.cells_restored,
                        snap.timestamp
                            .map(|t| format!(", saved {t}"))
                            .unwrap_or_default()
                    );
                }
                Err(e) => {
                    log::warn!("{e}; starting with the default schedule");
                    self.status = "Saved schedule was unreadable; starting fresh".into();
                }
            },
            Response::Saved { ok: true, .. } => {
                self.last_saved = Some(Local::now());
            }
            Response::Saved { ok: false, message } => {
                if !self.autosave.is_disabled() {
                    self.status = format!("Autosave failed: {}", message.unwrap_or_default());
                }
            }
            Response::Exported { ok: true, path, .. } => {
                let shown = path.map(|p| p.display().to_string()).unwrap_or_default();
                self.toast(ToastKind::Success, format!("PDF exported to {shown}"));
            }
            Response::Exported { ok: false, message, .. } => {
                self.toast(
                    ToastKind::Error,
                    format!("PDF export failed: {}", message.unwrap_or_default()),
                );
            }
            Response::Printed { ok, message } => {
                let message = message.unwrap_or_default();
                if ok {
                    self.toast(ToastKind::Success, message);
                } else {
                    self.toast(ToastKind::Error, format!("Print failed: {message}"));
                }
            }
            Response::StorageUnavailable(reason) => {
                self.autosave.disable();
                self.status = format!("Storage unavailable ({reason}); changes will not be saved");
                self.toast(
                    ToastKind::Error,
                    "Local storage is not available. Your changes will not be saved.",
                );
            }
            Response::Error(msg) => {
                self.status = format!("Error: {msg}");
            }
        }
    }

    // ===== Table navigation =====

    pub fn cursor_target(&self) -> Target {
        if self.cursor_row == 0 {
            Target::Header(self.cursor_col)
        } else {
            Target::Cell {
                row: self.cursor_row - 1,
                col: self.cursor_col,
            }
        }
    }

    pub fn move_cursor(&mut self, d_row: isize, d_col: isize) {
        let max_row = self.doc.schedule.rows.len();
        let max_col = self.doc.schedule.column_count().saturating_sub(1);
        self.cursor_row = self.cursor_row.saturating_add_signed(d_row).min(max_row);
        self.cursor_col = self.cursor_col.saturating_add_signed(d_col).min(max_col);
    }

    fn clamp_cursor(&mut self) {
        self.move_cursor(0, 0);
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Table => Focus::Controls,
            Focus::Controls => Focus::Table,
        };
    }

    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    // ===== Editing =====

    pub fn begin_edit_at_cursor(&mut self) {
        self.begin_edit(self.cursor_target());
    }

    pub fn begin_edit(&mut self, target: Target) {
        let Some(len) = self.doc.schedule.content(target).map(RichText::char_len) else {
            return;
        };
        if let Some(cell) = self.doc.schedule.class_cell_mut(target) {
            cell.empty = false;
        }
        self.mode = AppMode::Editing {
            target,
            selection: Selection::caret(len),
        };
        self.status = "Editing: Esc or Enter to finish, Shift+arrows select, Ctrl+B/I/U format".into();
    }

    pub fn finish_edit(&mut self) {
        let AppMode::Editing { target, .. } = self.mode else {
            return;
        };
        if let Some(cell) = self.doc.schedule.class_cell_mut(target) {
            cell.refresh_empty();
        }
        self.mode = AppMode::Normal;
        self.status = "Ready".into();
    }

    fn edit_parts(&mut self) -> Option<(EditTarget<'_>, Target)> {
        let AppMode::Editing { target, selection } = &mut self.mode else {
            return None;
        };
        let content = self.doc.schedule.content_mut(*target)?;
        Some((EditTarget { content, selection }, *target))
    }

    /// Input notification: refresh the placeholder flag and debounce a save.
    fn after_edit(&mut self, target: Target, now: Instant) {
        if let Some(cell) = self.doc.schedule.class_cell_mut(target) {
            cell.refresh_empty();
        }
        self.autosave.schedule_input(now);
    }

    pub fn edit_insert(&mut self, text: &str, now: Instant) {
        let Some((EditTarget { content, selection }, target)) = self.edit_parts() else {
            return;
        };
        let (start, end) = selection.range();
        content.delete_range(start, end);
        let caret = content.insert_text(start, text);
        selection.collapse_to(caret);
        self.after_edit(target, now);
    }

    pub fn edit_backspace(&mut self, now: Instant) {
        let Some((EditTarget { content, selection }, target)) = self.edit_parts() else {
            return;
        };
        let (start, end) = selection.range();
        let from = if start == end { start.saturating_sub(1) } else { start };
        if from == end {
            return;
        }
        content.delete_range(from, end);
        selection.collapse_to(from);
        self.after_edit(target, now);
    }

    pub fn edit_delete(&mut self, now: Instant) {
        let Some((EditTarget { content, selection }, target)) = self.edit_parts() else {
            return;
        };
        let (start, end) = selection.range();
        let to = if start == end { (end + 1).min(content.char_len()) } else { end };
        if start == to {
            return;
        }
        content.delete_range(start, to);
        selection.collapse_to(start);
        self.after_edit(target, now);
    }

    /// Move the caret by `delta` characters; `extend` grows the selection.
    pub fn edit_move(&mut self, delta: isize, extend: bool) {
        let Some((EditTarget { content, selection }, _)) = self.edit_parts() else {
            return;
        };
        let len = content.char_len();
        if extend {
            selection.focus = selection.focus.saturating_add_signed(delta).min(len);
        } else if !selection.is_collapsed() {
            let (start, end) = selection.range();
            selection.collapse_to(if delta < 0 { start } else { end });
        } else {
            let pos = selection.focus.saturating_add_signed(delta).min(len);
            selection.collapse_to(pos);
        }
    }

    pub fn edit_jump(&mut self, to_end: bool, extend: bool) {
        let Some((EditTarget { content, selection }, _)) = self.edit_parts() else {
            return;
        };
        let pos = if to_end { content.char_len() } else { 0 };
        if extend {
            selection.focus = pos;
        } else {
            selection.collapse_to(pos);
        }
    }

    pub fn edit_select_all(&mut self) {
        let Some((EditTarget { content, selection }, _)) = self.edit_parts() else {
            return;
        };
        selection.anchor = 0;
        selection.focus = content.char_len();
    }

    pub fn toggle_format(&mut self, format: Format, now: Instant) {
        let Some((EditTarget { content, selection }, target)) = self.edit_parts() else {
            return;
        };
        if selection.is_collapsed() {
            self.status = "Select some text first (Shift+arrows)".into();
            return;
        }
        let (start, end) = selection.range();
        content.toggle(start, end, format);
        self.after_edit(target, now);
    }

    // ===== Paste =====

    pub fn paste_from_clipboard(&mut self, now: Instant) {
        if !matches!(self.mode, AppMode::Editing { .. }) {
            self.paste_payload(&ClipboardPayload::default(), now);
            return;
        }
        let payload = self.clipboard.read();
        if payload.is_empty() {
            log::debug!("clipboard is empty");
        }
        self.paste_payload(&payload, now);
    }

    pub fn paste_payload(&mut self, payload: &ClipboardPayload, now: Instant) {
        let parts = self.edit_parts();
        let target = parts.as_ref().map(|(_, t)| *t);
        match paste::paste(parts.map(|(edit, _)| edit), payload) {
            Ok(outcome) => {
                if let Some(target) = target {
                    self.after_edit(target, now);
                }
                match outcome.fallback {
                    Some(reason) => self.toast(
                        ToastKind::Info,
                        format!("Pasted as plain text ({reason})"),
                    ),
                    None if payload.is_empty() => {
                        self.status = "Clipboard is empty".into();
                    }
                    None => {
                        self.status = format!(
                            "Pasted {} characters{}",
                            outcome.inserted_chars,
                            if outcome.used_html { " with formatting" } else { "" }
                        )
                    }
                }
            }
            Err(ScheduleError::NotEditableTarget) => {
                self.toast(ToastKind::Error, "Press Enter to edit a cell before pasting.");
            }
            Err(e) => self.toast(ToastKind::Error, e.to_string()),
        }
    }

    // ===== Structure =====

    pub fn add_column(&mut self, now: Instant) {
        self.doc.schedule.add_column();
        self.autosave.schedule_control(now);
        self.toast(ToastKind::Success, "Column added successfully!");
    }

    pub fn remove_column(&mut self, now: Instant) {
        match self.doc.schedule.remove_column() {
            Ok(()) => {
                self.clamp_cursor();
                self.autosave.schedule_control(now);
                self.toast(ToastKind::Success, "Column removed successfully!");
            }
            Err(e) => self.toast(ToastKind::Error, e.to_string()),
        }
    }

    pub fn add_row(&mut self, now: Instant) {
        self.doc.schedule.add_row();
        self.autosave.schedule_control(now);
        self.toast(ToastKind::Success, "Time slot added successfully!");
    }

    pub fn remove_row(&mut self, now: Instant) {
        match self.doc.schedule.remove_row() {
            Ok(()) => {
                self.clamp_cursor();
                self.autosave.schedule_control(now);
                self.toast(ToastKind::Success, "Time slot removed successfully!");
            }
            Err(e) => self.toast(ToastKind::Error, e.to_string()),
        }
    }

    // ===== Style =====

    pub fn apply_theme(&mut self, theme: Theme, now: Instant) {
        self.doc.style.theme = theme;
        self.autosave.schedule_control(now);
        self.status = format!("Theme: {}", theme.label());
    }

    pub fn cycle_theme(&mut self, forward: bool, now: Instant) {
        let presets = Theme::PRESETS;
        let at = presets
            .iter()
            .position(|t| *t == self.doc.style.theme)
            .unwrap_or(0);
        let next = if forward {
            (at + 1) % presets.len()
        } else {
            (at + presets.len() - 1) % presets.len()
        };
        self.apply_theme(presets[next], now);
    }

    /// Apply `#rrggbb` to the resumed selection, or to the whole schedule.
    pub fn apply_custom_color(
        &mut self,
        input: &str,
        resume: Option<(Target, Selection)>,
        now: Instant,
    ) {
        let Some(color) = Rgb::from_hex(input.trim()) else {
            self.toast(ToastKind::Error, format!("{:?} is not a colour like #3366cc", input.trim()));
            if let Some((target, selection)) = resume {
                self.mode = AppMode::Editing { target, selection };
            }
            return;
        };
        self.doc.style.custom_color = Some(color);

        if let Some((target, selection)) = resume.filter(|(_, s)| !s.is_collapsed()) {
            let (start, end) = selection.range();
            if let Some(content) = self.doc.schedule.content_mut(target) {
                content.apply_color(start, end, color);
            }
            self.mode = AppMode::Editing { target, selection };
            self.after_edit(target, now);
            self.autosave.schedule_control(now);
            self.toast(ToastKind::Success, "Custom color applied to selected text!");
            return;
        }

        if let Some((target, selection)) = resume {
            self.mode = AppMode::Editing { target, selection };
        }
        self.doc.style.theme = Theme::Custom;
        self.autosave.schedule_control(now);
        self.toast(ToastKind::Success, "Custom color applied to entire schedule!");
    }

    pub fn cycle_font_family(&mut self, forward: bool, now: Instant) {
        let family = self.doc.style.font_family;
        self.doc.style.font_family = if forward { family.next() } else { family.prev() };
        self.autosave.schedule_control(now);
        self.status = format!("Font: {}", self.doc.style.font_family.label());
    }

    pub fn cycle_font_size(&mut self, forward: bool, now: Instant) {
        let size = self.doc.style.font_size;
        self.doc.style.font_size = if forward { size.next() } else { size.prev() };
        self.autosave.schedule_control(now);
        self.status = format!("Size: {}", self.doc.style.font_size.id());
    }

    pub fn load_background(&mut self, path: &str) {
        match style::load_background(Path::new(path.trim())) {
            Ok(bg) => {
                let name = bg.name.clone();
                self.doc.style.set_background(bg);
                self.toast(ToastKind::Success, format!("Background image {name} loaded"));
            }
            Err(e) => self.toast(ToastKind::Error, e.to_string()),
        }
    }

    pub fn adjust_opacity(&mut self, up: bool) {
        if !self.doc.style.background_controls_visible() {
            return;
        }
        let step = i16::from(OPACITY_STEP);
        self.doc.style.adjust_opacity(if up { step } else { -step });
        self.status = format!("Background opacity: {}%", self.doc.style.background_opacity);
    }

    pub fn remove_background(&mut self) {
        if self.doc.style.background.is_none() {
            return;
        }
        self.doc.style.remove_background();
        self.control_index = self.control_index.min(self.controls().len() - 1);
        self.toast(ToastKind::Info, "Background image removed");
    }

    // ===== Control panel =====

    pub fn controls(&self) -> Vec<Control> {
        let mut out = vec![
            Control::Theme,
            Control::CustomColor,
            Control::FontFamily,
            Control::FontSize,
            Control::Background,
        ];
        if self.doc.style.background_controls_visible() {
            out.extend([Control::Opacity, Control::RemoveBackground]);
        }
        out.extend([Control::ExportPdf, Control::Print]);
        out
    }

    pub fn control_value(&self, control: Control) -> String {
        let style = &self.doc.style;
        match control {
            Control::Theme => style.theme.label().to_string(),
            Control::CustomColor => style
                .custom_color
                .map(Rgb::to_hex)
                .unwrap_or_else(|| "none".into()),
            Control::FontFamily => style.font_family.label().to_string(),
            Control::FontSize => style.font_size.id().to_string(),
            Control::Background => style
                .background
                .as_ref()
                .map(|b| b.name.clone())
                .unwrap_or_else(|| "none".into()),
            Control::Opacity => format!("{}%", style.background_opacity),
            Control::RemoveBackground | Control::ExportPdf | Control::Print => String::new(),
        }
    }

    pub fn move_control(&mut self, delta: isize) {
        let last = self.controls().len() - 1;
        self.control_index = self.control_index.saturating_add_signed(delta).min(last);
    }

    pub fn selected_control(&self) -> Option<Control> {
        self.controls().get(self.control_index).copied()
    }

    /// Left/Right on the selected control.
    pub fn control_adjust(&mut self, forward: bool, now: Instant) {
        match self.selected_control() {
            Some(Control::Theme) => self.cycle_theme(forward, now),
            Some(Control::FontFamily) => self.cycle_font_family(forward, now),
            Some(Control::FontSize) => self.cycle_font_size(forward, now),
            Some(Control::Opacity) => self.adjust_opacity(forward),
            _ => {}
        }
    }

    /// Enter on the selected control.
    pub fn control_activate(&mut self, now: Instant) {
        match self.selected_control() {
            Some(Control::CustomColor) => self.begin_custom_color(),
            Some(Control::Background) => self.begin_prompt(PromptKind::Background),
            Some(Control::RemoveBackground) => self.remove_background(),
            Some(Control::ExportPdf) => self.export_pdf(),
            Some(Control::Print) => self.print(now),
            Some(_) => self.control_adjust(true, now),
            None => {}
        }
    }

    // ===== Prompts =====

    /// Open the colour prompt, remembering any edit session to return to.
    pub fn begin_custom_color(&mut self) {
        let resume = match self.mode {
            AppMode::Editing { target, selection } => Some((target, selection)),
            _ => None,
        };
        self.begin_prompt(PromptKind::CustomColor { resume });
    }

    pub fn begin_prompt(&mut self, kind: PromptKind) {
        let buffer = match kind {
            PromptKind::CustomColor { .. } => self
                .doc
                .style
                .custom_color
                .map(Rgb::to_hex)
                .unwrap_or_else(|| "#".into()),
            PromptKind::Background => String::new(),
        };
        self.mode = AppMode::Prompt { kind, buffer };
    }

    pub fn prompt_input(&mut self, ch: char) {
        if let AppMode::Prompt { buffer, .. } = &mut self.mode {
            buffer.push(ch);
        }
    }

    pub fn prompt_backspace(&mut self) {
        if let AppMode::Prompt { buffer, .. } = &mut self.mode {
            buffer.pop();
        }
    }

    pub fn prompt_cancel(&mut self) {
        if let AppMode::Prompt { kind, .. } = &self.mode {
            self.mode = match *kind {
                PromptKind::CustomColor {
                    resume: Some((target, selection)),
                } => AppMode::Editing { target, selection },
                _ => AppMode::Normal,
            };
        }
    }

    pub fn prompt_submit(&mut self, now: Instant) {
        let AppMode::Prompt { kind, buffer } = std::mem::replace(&mut self.mode, AppMode::Normal)
        else {
            return;
        };
        match kind {
            PromptKind::CustomColor { resume } => self.apply_custom_color(&buffer, resume, now),
            PromptKind::Background if buffer.trim().is_empty() => {}
            PromptKind::Background => self.load_background(&buffer),
        }
    }

    // ===== Export =====

    pub fn export_pdf(&mut self) {
        let doc = ExportDocument::from_document(&self.doc);
        let _ = self.req_tx.send(Request::ExportPdf { doc: Box::new(doc) });
        self.status = "Generating PDF...".into();
    }

    pub fn print(&mut self, now: Instant) {
        let doc = ExportDocument::from_document(&self.doc);
        let _ = self.req_tx.send(Request::Print { doc: Box::new(doc) });
        self.print_hide_until = Some(now + PRINT_HIDE);
        self.status = "Sending to printer...".into();
    }

    pub fn controls_hidden(&self) -> bool {
        self.print_hide_until.is_some()
    }

    // ===== Quit =====

    /// First request warns when classes would be left behind; the second quits.
    pub fn request_quit(&mut self) {
        if self.doc.schedule.has_content() && !self.quit_armed {
            self.quit_armed = true;
            self.toast(
                ToastKind::Info,
                "You have classes in your schedule. Press q again to quit.",
            );
            return;
        }
        self.should_quit = true;
    }
}
