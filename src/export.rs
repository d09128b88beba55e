//! PDF export and printing through an embedded typst compiler.
//!
//! The schedule is rendered to typst markup, compiled in memory by a minimal
//! `typst::World`, and written out (export) or handed to the system print
//! command (print).

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use typst::diag::{FileError, FileResult};
use typst::foundations::{Bytes, Datetime};
use typst::layout::PagedDocument;
use typst::syntax::{FileId, Source, VirtualPath};
use typst::text::{Font, FontBook, FontInfo};
use typst::utils::LazyHash;
use typst::{Library, World};

use crate::document::Document;
use crate::error::{Result, ScheduleError};
use crate::rich::Rgb;
use crate::style::{Background, Palette, PdfFont};

/// Letter width minus half-inch side margins.
const AVAILABLE_WIDTH_IN: f32 = 7.5;
const TIME_COLUMN_IN: f32 = 0.8;
const TITLE_PT: f32 = 18.0;
const PRINT_TITLE_PT: f32 = 16.0;
const HEADER_FILL: Rgb = Rgb(248, 249, 250);
const TIME_FILL: Rgb = Rgb(236, 240, 241);
const ALTERNATE_FILL: Rgb = Rgb(252, 252, 252);
const RULE_COLOR: Rgb = Rgb(221, 221, 221);

/// Print commands tried in order.
const PRINT_COMMANDS: &[(&str, &[&str])] = &[("lp", &[]), ("lpr", &[])];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Pdf,
    Print,
}

/// Plain-data copy of what gets rendered, safe to hand to the worker thread.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportDocument {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub palette: Palette,
    pub font: PdfFont,
    pub font_px: u8,
    pub background: Option<Background>,
    pub background_opacity: u8,
}

impl ExportDocument {
    pub fn from_document(doc: &Document) -> Self {
        Self {
            title: doc.schedule.title.text().trim().to_string(),
            headers: doc.schedule.header_texts(),
            rows: doc.schedule.row_texts(),
            palette: doc.style.palette(),
            font: doc.style.font_family.pdf(),
            font_px: doc.style.font_size.px(),
            background: doc.style.background.clone(),
            background_opacity: doc.style.background_opacity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfLayout {
    pub body_pt: f32,
    pub header_pt: f32,
    pub time_pt: f32,
    pub time_col_in: f32,
    pub day_col_in: f32,
}

/// Font sizes and column widths so every day column fits the page width.
pub fn pdf_layout(columns: usize, font_px: u8) -> PdfLayout {
    let px = f32::from(font_px);
    let mut body_pt = (px * 0.75).clamp(8.0, 14.0);
    let mut header_pt = (px + 1.0).clamp(9.0, 15.0);
    let mut time_pt = (px - 1.0).clamp(7.0, 13.0);
    if columns > 7 {
        body_pt = body_pt.min(8.0);
        header_pt = header_pt.min(8.0);
        time_pt = time_pt.min(8.0);
    }
    let days = columns.saturating_sub(1).max(1) as f32;
    PdfLayout {
        body_pt,
        header_pt,
        time_pt,
        time_col_in: TIME_COLUMN_IN,
        day_col_in: (AVAILABLE_WIDTH_IN - TIME_COLUMN_IN) / days,
    }
}

pub fn pdf_filename(now: DateTime<Utc>) -> String {
    format!("class-schedule-{}.pdf", now.format("%Y-%m-%dT%H-%M-%S"))
}

pub fn typst_source(doc: &ExportDocument, mode: RenderMode) -> String {
    match mode {
        RenderMode::Pdf => pdf_source(doc),
        RenderMode::Print => print_source(doc),
    }
}

fn pdf_source(doc: &ExportDocument) -> String {
    let layout = pdf_layout(doc.headers.len(), doc.font_px);
    let text = rgb(doc.palette.text);
    let mut out = String::new();

    let _ = writeln!(out, "#set document(title: \"Class Schedule\", author: \"Schedule App\")");
    let background = doc
        .background
        .as_ref()
        .map(|bg| {
            let alpha = (255.0 * (1.0 - f32::from(doc.background_opacity.min(100)) / 100.0)).round() as u8;
            format!(
                ", background: box(width: 100%, height: 100%)[#image({}, width: 100%, height: 100%, fit: \"stretch\")#place(top + left, rect(width: 100%, height: 100%, fill: rgb(255, 255, 255, {alpha})))]",
                quote(&background_file(bg))
            )
        })
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "#set page(paper: \"us-letter\", margin: (top: 1.2in, right: 0.5in, bottom: 0.5in, left: 0.5in){background})"
    );
    let _ = writeln!(
        out,
        "#set text(font: {}, size: {}pt, fill: {text})",
        font_list(doc.font),
        layout.body_pt
    );
    let _ = writeln!(
        out,
        "#place(top + center, dy: -0.55in, text(size: {TITLE_PT}pt, weight: \"bold\", fill: {text}, {}))",
        quote(&doc.title)
    );

    let mut columns = vec![format!("{:.3}in", layout.time_col_in)];
    columns.extend((1..doc.headers.len()).map(|_| format!("{:.3}in", layout.day_col_in)));
    let _ = writeln!(out, "#table(");
    let _ = writeln!(out, "  columns: ({}),", columns.join(", "));
    let _ = writeln!(out, "  inset: 0.06in,");
    let _ = writeln!(out, "  stroke: 0.01in + {},", rgb(RULE_COLOR));
    let _ = writeln!(
        out,
        "  fill: (x, y) => if y == 0 {{ {} }} else if x == 0 {{ {} }} else if calc.even(y) {{ {} }} else {{ none }},",
        rgb(HEADER_FILL),
        rgb(TIME_FILL),
        rgb(ALTERNATE_FILL)
    );
    let header_cells: Vec<String> = doc
        .headers
        .iter()
        .map(|h| format!("text(size: {}pt, weight: \"bold\", {})", layout.header_pt, quote(h)))
        .collect();
    let _ = writeln!(out, "  table.header({}),", header_cells.join(", "));
    for row in &doc.rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                if i == 0 {
                    format!("text(size: {}pt, weight: \"bold\", {})", layout.time_pt, quote(cell))
                } else {
                    format!("text(size: {}pt, {})", layout.body_pt, quote(cell))
                }
            })
            .collect();
        let _ = writeln!(out, "  {},", cells.join(", "));
    }
    let _ = writeln!(out, ")");
    out
}

fn print_source(doc: &ExportDocument) -> String {
    let text = rgb(doc.palette.text);
    let mut out = String::new();
    let _ = writeln!(out, "#set document(title: \"Class Schedule\")");
    let _ = writeln!(out, "#set page(paper: \"us-letter\", margin: 0.5in, fill: white)");
    let _ = writeln!(out, "#set text(font: {}, size: 8pt, fill: {text})", font_list(doc.font));
    let _ = writeln!(
        out,
        "#align(center, text(size: {PRINT_TITLE_PT}pt, weight: \"bold\", {}))",
        quote(&doc.title)
    );
    let _ = writeln!(out, "#v(11pt)");

    let mut columns = vec!["12%".to_string()];
    columns.extend((1..doc.headers.len()).map(|_| "1fr".to_string()));
    let _ = writeln!(out, "#table(");
    let _ = writeln!(out, "  columns: ({}),", columns.join(", "));
    let _ = writeln!(out, "  stroke: 0.75pt + rgb(\"#333333\"),");
    let _ = writeln!(out, "  inset: (x: 2pt, y: 3pt),");
    let _ = writeln!(
        out,
        "  align: (x, y) => if y == 0 {{ center + horizon }} else {{ left + top }},"
    );
    let _ = writeln!(
        out,
        "  fill: (x, y) => if y == 0 {{ rgb(240, 240, 240) }} else {{ none }},"
    );
    let header_cells: Vec<String> = doc
        .headers
        .iter()
        .map(|h| format!("text(size: 9pt, weight: \"bold\", {})", quote(h)))
        .collect();
    let _ = writeln!(out, "  table.header({}),", header_cells.join(", "));
    for row in &doc.rows {
        let cells: Vec<String> = row.iter().map(|c| quote(c)).collect();
        let _ = writeln!(out, "  {},", cells.join(", "));
    }
    let _ = writeln!(out, ")");
    out
}

fn rgb(c: Rgb) -> String {
    format!("rgb({}, {}, {})", c.0, c.1, c.2)
}

fn font_list(font: PdfFont) -> String {
    let names: Vec<String> = font.typst_families().iter().map(|f| quote(f)).collect();
    format!("({},)", names.join(", "))
}

fn background_file(bg: &Background) -> String {
    format!("background.{}", bg.format.extension())
}

/// Typst string literal.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// Compile and write the PDF into `dir`; returns the written path.
pub fn export_pdf(doc: &ExportDocument, dir: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
    let pdf = compile(doc, RenderMode::Pdf)?;
    let path = dir.join(pdf_filename(now));
    fs::write(&path, &pdf)
        .map_err(|e| ScheduleError::ExportFailure(format!("write {}: {e}", path.display())))?;
    log::info!("exported {} ({} bytes)", path.display(), pdf.len());
    Ok(path)
}

/// Compile the print layout and send it to the first print command that works.
pub fn print(doc: &ExportDocument, now: DateTime<Utc>) -> Result<String> {
    let pdf = compile(doc, RenderMode::Print)?;
    let path = std::env::temp_dir().join(format!(
        "class-schedule-print-{}.pdf",
        now.format("%Y%m%d%H%M%S")
    ));
    fs::write(&path, &pdf)
        .map_err(|e| ScheduleError::ExportFailure(format!("write {}: {e}", path.display())))?;
    for (prog, args) in PRINT_COMMANDS {
        if try_print_prog(prog, args, &path) {
            log::info!("sent {} to {prog}", path.display());
            return Ok((*prog).to_string());
        }
    }
    Err(ScheduleError::ExportFailure(
        "no print command succeeded (tried lp, lpr)".into(),
    ))
}

fn try_print_prog(prog: &str, args: &[&str], file: &Path) -> bool {
    Command::new(prog)
        .args(args)
        .arg(file)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn compile(doc: &ExportDocument, mode: RenderMode) -> Result<Vec<u8>> {
    let source = typst_source(doc, mode);
    let mut files = HashMap::new();
    if mode == RenderMode::Pdf
        && let Some(bg) = &doc.background
    {
        files.insert(file_id(&background_file(bg)), Bytes::new(bg.bytes.clone()));
    }
    let world = ScheduleWorld::new(source, files);

    let result = typst::compile::<PagedDocument>(&world);
    for warning in result.warnings.iter() {
        log::debug!("typst warning: {}", warning.message);
    }
    let document = result.output.map_err(|errors| {
        let msg: Vec<String> = errors.iter().map(|d| d.message.to_string()).collect();
        ScheduleError::ExportFailure(msg.join("; "))
    })?;
    typst_pdf::pdf(&document, &typst_pdf::PdfOptions::default()).map_err(|errors| {
        let msg: Vec<String> = errors.iter().map(|d| d.message.to_string()).collect();
        ScheduleError::ExportFailure(msg.join("; "))
    })
}

fn file_id(name: &str) -> FileId {
    FileId::new(None, VirtualPath::new(format!("/{name}")))
}

struct FontSet {
    book: LazyHash<FontBook>,
    fonts: Vec<Font>,
}

/// System fonts, discovered on first export.
fn font_set() -> &'static FontSet {
    static FONTS: OnceLock<FontSet> = OnceLock::new();
    FONTS.get_or_init(|| {
        let mut book = FontBook::new();
        let mut fonts = Vec::new();
        let mut dirs = vec![
            PathBuf::from("/usr/share/fonts"),
            PathBuf::from("/usr/local/share/fonts"),
            PathBuf::from("/System/Library/Fonts"),
            PathBuf::from("/Library/Fonts"),
            PathBuf::from("C:\\Windows\\Fonts"),
        ];
        if let Some(home) = dirs::home_dir() {
            dirs.push(home.join(".fonts"));
            dirs.push(home.join(".local/share/fonts"));
            dirs.push(home.join("Library/Fonts"));
        }
        for dir in dirs.iter().filter(|d| d.is_dir()) {
            load_fonts_from_dir(dir, &mut book, &mut fonts);
        }
        log::info!("typst: {} fonts available", fonts.len());
        FontSet {
            book: LazyHash::new(book),
            fonts,
        }
    })
}

fn load_fonts_from_dir(dir: &Path, book: &mut FontBook, fonts: &mut Vec<Font>) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            load_fonts_from_dir(&path, book, fonts);
        } else if is_font_file(&path)
            && let Ok(data) = fs::read(&path)
        {
            let bytes = Bytes::new(data);
            for (i, info) in FontInfo::iter(&bytes).enumerate() {
                book.push(info);
                if let Some(font) = Font::new(bytes.clone(), i as u32) {
                    fonts.push(font);
                }
            }
        }
    }
}

fn is_font_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e.to_lowercase().as_str(), "ttf" | "otf" | "ttc"))
}

/// In-memory world: one generated source plus embedded assets.
struct ScheduleWorld {
    library: LazyHash<Library>,
    fonts: &'static FontSet,
    main: Source,
    files: HashMap<FileId, Bytes>,
}

impl ScheduleWorld {
    fn new(source: String, files: HashMap<FileId, Bytes>) -> Self {
        Self {
            library: LazyHash::new(Library::default()),
            fonts: font_set(),
            main: Source::new(file_id("schedule.typ"), source),
            files,
        }
    }
}

impl World for ScheduleWorld {
    fn library(&self) -> &LazyHash<Library> {
        &self.library
    }

    fn book(&self) -> &LazyHash<FontBook> {
        &self.fonts.book
    }

    fn main(&self) -> FileId {
        self.main.id()
    }

    fn source(&self, id: FileId) -> FileResult<Source> {
        if id == self.main.id() {
            Ok(self.main.clone())
        } else {
            Err(FileError::NotFound(id.vpath().as_rootless_path().to_path_buf()))
        }
    }

    fn file(&self, id: FileId) -> FileResult<Bytes> {
        self.files
            .get(&id)
            .cloned()
            .ok_or_else(|| FileError::NotFound(id.vpath().as_rootless_path().to_path_buf()))
    }

    fn font(&self, index: usize) -> Option<Font> {
        self.fonts.fonts.get(index).cloned()
    }

    fn today(&self, offset: Option<i64>) -> Option<Datetime> {
        use chrono::{Datelike, Local, Timelike};
        let naive = match offset {
            Some(hours) => (Utc::now() + chrono::Duration::hours(hours)).naive_utc(),
            None => Local::now().naive_local(),
        };
        Datetime::from_ymd_hms(
            naive.year(),
            naive.month() as u8,
            naive.day() as u8,
            naive.hour() as u8,
            naive.minute() as u8,
            naive.second() as u8,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rich::RichText;
    use crate::style::{FontSize, ImageFormat, Theme};
    use chrono::TimeZone;

    fn sample() -> ExportDocument {
        let mut doc = Document::default();
        doc.schedule.title = RichText::plain("  Fall \"Term\"  ");
        doc.schedule.rows[0].cells[0].content = RichText::plain("Math 101");
        doc.style.theme = Theme::Modern;
        ExportDocument::from_document(&doc)
    }

    #[test]
    fn layout_for_medium_font_and_five_days() {
        let layout = pdf_layout(6, FontSize::Medium.px());
        assert_eq!(layout.body_pt, 9.75);
        assert_eq!(layout.header_pt, 14.0);
        assert_eq!(layout.time_pt, 12.0);
        assert!((layout.day_col_in - 1.34).abs() < 1e-5);
        let total = layout.time_col_in + 5.0 * layout.day_col_in;
        assert!((total - AVAILABLE_WIDTH_IN).abs() < 1e-4);
    }

    #[test]
    fn wide_tables_force_small_type() {
        let layout = pdf_layout(9, FontSize::Large.px());
        assert_eq!(layout.body_pt, 8.0);
        assert_eq!(layout.header_pt, 8.0);
        assert_eq!(layout.time_pt, 8.0);
    }

    #[test]
    fn small_font_is_clamped_up() {
        let layout = pdf_layout(6, FontSize::Small.px());
        assert_eq!(layout.body_pt, 8.25);
        assert_eq!(layout.header_pt, 12.0);
        assert_eq!(layout.time_pt, 10.0);
    }

    #[test]
    fn filename_embeds_utc_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 8, 5, 9).unwrap();
        assert_eq!(pdf_filename(now), "class-schedule-2026-10-19T08-05-09.pdf");
    }

    #[test]
    fn export_document_uses_trimmed_texts_and_theme() {
        let doc = sample();
        assert_eq!(doc.title, "Fall \"Term\"");
        assert_eq!(doc.headers.len(), 6);
        assert_eq!(doc.rows[0][1], "Math 101");
        assert_eq!(doc.palette.text, Rgb(70, 130, 180));
    }

    #[test]
    fn pdf_source_escapes_and_colors() {
        let src = typst_source(&sample(), RenderMode::Pdf);
        assert!(src.contains("\"Fall \\\"Term\\\"\""));
        assert!(src.contains("fill: rgb(70, 130, 180)"));
        assert!(src.contains("paper: \"us-letter\""));
        assert!(src.contains("text(size: 9.75pt, \"Math 101\")"));
        assert!(src.contains("text(size: 12pt, weight: \"bold\", \"6:00 PM\")"));
        assert!(!src.contains("background"));
    }

    #[test]
    fn background_is_embedded_with_opacity_overlay() {
        let mut doc = sample();
        doc.background = Some(Background {
            name: "bg.jpg".into(),
            format: ImageFormat::Jpeg,
            bytes: vec![0xff, 0xd8],
        });
        doc.background_opacity = 10;
        let src = typst_source(&doc, RenderMode::Pdf);
        assert!(src.contains("image(\"background.jpg\""));
        assert!(src.contains("rgb(255, 255, 255, 230)"));

        let print = typst_source(&doc, RenderMode::Print);
        assert!(!print.contains("background"));
    }

    #[test]
    fn print_source_has_bordered_fixed_layout() {
        let src = typst_source(&sample(), RenderMode::Print);
        assert!(src.contains("margin: 0.5in"));
        assert!(src.contains("stroke: 0.75pt + rgb(\"#333333\")"));
        assert!(src.contains("columns: (12%, 1fr, 1fr, 1fr, 1fr, 1fr)"));
        assert!(src.contains("text(size: 16pt, weight: \"bold\""));
    }

    #[test]
    fn quote_escapes_typst_specials() {
        assert_eq!(quote("a\\b\"c\nd"), "\"a\\\\b\\\"c\\nd\"");
    }
}
