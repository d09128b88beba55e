//! Inline rich text held by every editable cell.
//!
//! Content is a flat list of styled runs. Nested `<b>`/`<i>`/`<u>` and colour
//! spans collapse into per-run flags, so editing works on character offsets
//! and the HTML form is regenerated on demand.

use crate::sanitize::{self, FormatTag, Inline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

const NAMED_COLORS: &[(&str, Rgb)] = &[
    ("black", Rgb(0, 0, 0)),
    ("silver", Rgb(192, 192, 192)),
    ("gray", Rgb(128, 128, 128)),
    ("grey", Rgb(128, 128, 128)),
    ("white", Rgb(255, 255, 255)),
    ("maroon", Rgb(128, 0, 0)),
    ("red", Rgb(255, 0, 0)),
    ("purple", Rgb(128, 0, 128)),
    ("fuchsia", Rgb(255, 0, 255)),
    ("green", Rgb(0, 128, 0)),
    ("lime", Rgb(0, 255, 0)),
    ("olive", Rgb(128, 128, 0)),
    ("yellow", Rgb(255, 255, 0)),
    ("navy", Rgb(0, 0, 128)),
    ("blue", Rgb(0, 0, 255)),
    ("teal", Rgb(0, 128, 128)),
    ("aqua", Rgb(0, 255, 255)),
    ("orange", Rgb(255, 165, 0)),
];

impl Rgb {
    /// Parse `#rrggbb`, `#rgb`, or the same without the leading `#`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim();
        let hex = s.strip_prefix('#').unwrap_or(s);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match hex.len() {
            6 => {
                let v = u32::from_str_radix(hex, 16).ok()?;
                Some(Rgb((v >> 16) as u8, (v >> 8) as u8, v as u8))
            }
            3 => {
                let mut digits = hex.chars().filter_map(|c| c.to_digit(16)).map(|d| d as u8 * 17);
                Some(Rgb(digits.next()?, digits.next()?, digits.next()?))
            }
            _ => None,
        }
    }

    /// Resolve a CSS colour value: hex, `rgb()`/`rgba()`, or a basic name.
    /// Keywords such as `inherit` or `currentcolor` do not resolve.
    pub fn parse_css(value: &str) -> Option<Self> {
        let v = value.trim().to_ascii_lowercase();
        if v.starts_with('#') {
            return Self::from_hex(&v);
        }
        if let Some(args) = v
            .strip_prefix("rgba(")
            .or_else(|| v.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let mut parts = args.split([',', ' ', '/']).filter(|p| !p.is_empty());
            let r = css_channel(parts.next()?)?;
            let g = css_channel(parts.next()?)?;
            let b = css_channel(parts.next()?)?;
            return Some(Rgb(r, g, b));
        }
        NAMED_COLORS
            .iter()
            .find(|(name, _)| *name == v)
            .map(|(_, rgb)| *rgb)
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

fn css_channel(part: &str) -> Option<u8> {
    let part = part.trim();
    let value = if let Some(pct) = part.strip_suffix('%') {
        pct.parse::<f32>().ok()? * 255.0 / 100.0
    } else {
        part.parse::<f32>().ok()?
    };
    Some(value.round().clamp(0.0, 255.0) as u8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

impl FontWeight {
    pub fn parse_css(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bold" | "bolder" => Some(FontWeight::Bold),
            "normal" | "lighter" => Some(FontWeight::Normal),
            other => other.parse::<u16>().ok().map(|n| {
                if n >= 600 {
                    FontWeight::Bold
                } else {
                    FontWeight::Normal
                }
            }),
        }
    }

    pub fn css(self) -> &'static str {
        match self {
            FontWeight::Normal => "normal",
            FontWeight::Bold => "bold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Bold,
    Italic,
    Underline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub color: Option<Rgb>,
    /// Only meaningful together with `color`; `None` means inherit.
    pub weight: Option<FontWeight>,
}

impl RunStyle {
    fn has(&self, format: Format) -> bool {
        match format {
            Format::Bold => self.bold,
            Format::Italic => self.italic,
            Format::Underline => self.underline,
        }
    }

    fn set(&mut self, format: Format, on: bool) {
        match format {
            Format::Bold => self.bold = on,
            Format::Italic => self.italic = on,
            Format::Underline => self.underline = on,
        }
    }

    /// True when the run renders heavier than normal text.
    pub fn is_strong(&self) -> bool {
        self.bold || self.weight == Some(FontWeight::Bold)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Run {
    pub text: String,
    pub style: RunStyle,
}

impl Run {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: normalize_newlines(text.into()),
            style: RunStyle::default(),
        }
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Caret/selection inside one `RichText`, in character offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub anchor: usize,
    pub focus: usize,
}

impl Selection {
    pub fn caret(pos: usize) -> Self {
        Self {
            anchor: pos,
            focus: pos,
        }
    }

    pub fn range(&self) -> (usize, usize) {
        (self.anchor.min(self.focus), self.anchor.max(self.focus))
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn collapse_to(&mut self, pos: usize) {
        self.anchor = pos;
        self.focus = pos;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RichText {
    runs: Vec<Run>,
}

impl RichText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::from_runs(vec![Run::plain(text)])
    }

    pub fn from_runs(runs: Vec<Run>) -> Self {
        let mut rich = Self { runs };
        rich.normalize();
        rich
    }

    /// Flatten a sanitized fragment into runs.
    pub fn from_fragment(fragment: &[Inline]) -> Self {
        let mut runs = Vec::new();
        flatten(fragment, RunStyle::default(), &mut runs);
        Self::from_runs(runs)
    }

    /// Rebuild content from stored HTML, passing it through the sanitizer.
    pub fn from_html(html: &str) -> Self {
        match sanitize::sanitize_html(html) {
            Ok(fragment) => Self::from_fragment(&fragment),
            Err(e) => {
                log::warn!("stored cell html rejected ({e}); keeping its text only");
                Self::plain(sanitize::text_content(html))
            }
        }
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }

    pub fn char_len(&self) -> usize {
        self.runs.iter().map(Run::char_len).sum()
    }

    pub fn is_blank(&self) -> bool {
        self.runs.iter().all(|r| r.text.trim().is_empty())
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for run in &self.runs {
            let style = run.style;
            let mut open = String::new();
            let mut close = String::new();
            if let Some(color) = style.color {
                open.push_str("<span style=\"color: ");
                open.push_str(&color.to_hex());
                if let Some(weight) = style.weight {
                    open.push_str("; font-weight: ");
                    open.push_str(weight.css());
                }
                open.push_str("\">");
                close.insert_str(0, "</span>");
            }
            for (on, tag) in [(style.bold, "b"), (style.italic, "i"), (style.underline, "u")] {
                if on {
                    open.push_str(&format!("<{tag}>"));
                    close.insert_str(0, &format!("</{tag}>"));
                }
            }
            out.push_str(&open);
            out.push_str(&escape_html(&run.text));
            out.push_str(&close);
        }
        out
    }

    /// Remove characters in `start..end` (clamped).
    pub fn delete_range(&mut self, start: usize, end: usize) {
        let len = self.char_len();
        let (start, end) = (start.min(len), end.min(len));
        if start >= end {
            return;
        }
        let first = self.split_at(start);
        let last = self.split_at(end);
        self.runs.drain(first..last);
        self.normalize();
    }

    /// Insert runs at `at` (clamped); returns the offset just after them.
    pub fn insert_runs(&mut self, at: usize, runs: Vec<Run>) -> usize {
        let at = at.min(self.char_len());
        let inserted: usize = runs.iter().map(Run::char_len).sum();
        let idx = self.split_at(at);
        self.runs.splice(idx..idx, runs);
        self.normalize();
        at + inserted
    }

    /// Insert text carrying the style in effect at the caret, like typing.
    pub fn insert_text(&mut self, at: usize, text: &str) -> usize {
        let at = at.min(self.char_len());
        let style = self.style_at(at);
        self.insert_runs(
            at,
            vec![Run {
                text: normalize_newlines(text.to_string()),
                style,
            }],
        )
    }

    /// Wrap `start..end` in a colour span; the weight is inherited.
    pub fn apply_color(&mut self, start: usize, end: usize, color: Rgb) {
        self.restyle(start, end, |style| style.color = Some(color));
    }

    /// Turn a format on for the range, or off if the whole range has it.
    pub fn toggle(&mut self, start: usize, end: usize, format: Format) {
        let (first, last) = self.span_indices(start, end);
        if first >= last {
            return;
        }
        let all_on = self.runs[first..last].iter().all(|r| r.style.has(format));
        for run in &mut self.runs[first..last] {
            run.style.set(format, !all_on);
        }
        self.normalize();
    }

    fn restyle(&mut self, start: usize, end: usize, f: impl Fn(&mut RunStyle)) {
        let (first, last) = self.span_indices(start, end);
        for run in &mut self.runs[first..last] {
            f(&mut run.style);
        }
        self.normalize();
    }

    fn span_indices(&mut self, start: usize, end: usize) -> (usize, usize) {
        let len = self.char_len();
        let (start, end) = (start.min(len), end.min(len));
        if start >= end {
            return (0, 0);
        }
        let first = self.split_at(start);
        let last = self.split_at(end);
        (first, last)
    }

    fn style_at(&self, at: usize) -> RunStyle {
        if at == 0 {
            return self.runs.first().map(|r| r.style).unwrap_or_default();
        }
        let mut offset = 0;
        for run in &self.runs {
            offset += run.char_len();
            if offset >= at {
                return run.style;
            }
        }
        self.runs.last().map(|r| r.style).unwrap_or_default()
    }

    /// Ensure a run boundary at `pos`; returns the index of the run starting there.
    fn split_at(&mut self, pos: usize) -> usize {
        let mut start = 0;
        for i in 0..self.runs.len() {
            let len = self.runs[i].char_len();
            if pos == start {
                return i;
            }
            if pos < start + len {
                let byte = self.runs[i]
                    .text
                    .char_indices()
                    .nth(pos - start)
                    .map(|(b, _)| b)
                    .unwrap_or(self.runs[i].text.len());
                let tail = self.runs[i].text.split_off(byte);
                let style = self.runs[i].style;
                self.runs.insert(i + 1, Run { text: tail, style });
                return i + 1;
            }
            start += len;
        }
        self.runs.len()
    }

    fn normalize(&mut self) {
        let mut merged: Vec<Run> = Vec::with_capacity(self.runs.len());
        for run in self.runs.drain(..) {
            if run.text.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(prev) if prev.style == run.style => prev.text.push_str(&run.text),
                _ => merged.push(run),
            }
        }
        self.runs = merged;
    }
}

fn flatten(nodes: &[Inline], style: RunStyle, out: &mut Vec<Run>) {
    for node in nodes {
        match node {
            Inline::Text(text) => out.push(Run {
                text: text.clone(),
                style,
            }),
            Inline::Format { tag, children } => {
                let mut inner = style;
                match tag {
                    FormatTag::B | FormatTag::Strong => inner.bold = true,
                    FormatTag::I | FormatTag::Em => inner.italic = true,
                    FormatTag::U => inner.underline = true,
                }
                flatten(children, inner, out);
            }
            Inline::Color {
                color,
                weight,
                children,
            } => {
                let mut inner = style;
                inner.color = Some(*color);
                inner.weight = weight.or(style.weight);
                flatten(children, inner, out);
            }
        }
    }
}

/// `\r\n` and lone `\r` become `\n`, the only line break content holds.
fn normalize_newlines(text: String) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text
    }
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bold(text: &str) -> Run {
        Run {
            text: text.into(),
            style: RunStyle {
                bold: true,
                ..RunStyle::default()
            },
        }
    }

    #[test]
    fn hex_parsing() {
        assert_eq!(Rgb::from_hex("#ff8000"), Some(Rgb(255, 128, 0)));
        assert_eq!(Rgb::from_hex("FF8000"), Some(Rgb(255, 128, 0)));
        assert_eq!(Rgb::from_hex("#f80"), Some(Rgb(255, 136, 0)));
        assert_eq!(Rgb::from_hex("#ff80"), None);
        assert_eq!(Rgb::from_hex("#gg0000"), None);
        assert_eq!(Rgb(1, 2, 255).to_hex(), "#0102ff");
    }

    #[test]
    fn css_color_forms() {
        assert_eq!(Rgb::parse_css("rgb(255, 0, 0)"), Some(Rgb(255, 0, 0)));
        assert_eq!(Rgb::parse_css("rgba(0, 128, 0, 0.5)"), Some(Rgb(0, 128, 0)));
        assert_eq!(Rgb::parse_css("RED"), Some(Rgb(255, 0, 0)));
        assert_eq!(Rgb::parse_css("inherit"), None);
        assert_eq!(Rgb::parse_css(""), None);
    }

    #[test]
    fn insert_and_delete_across_runs() {
        let mut rich = RichText::from_runs(vec![Run::plain("Math "), bold("101")]);
        assert_eq!(rich.char_len(), 8);

        let end = rich.insert_runs(5, vec![Run::plain("II ")]);
        assert_eq!(end, 8);
        assert_eq!(rich.text(), "Math II 101");

        rich.delete_range(3, 9);
        assert_eq!(rich.text(), "Mat01");
        assert_eq!(rich.runs().len(), 2);
        assert!(rich.runs()[1].style.bold);
    }

    #[test]
    fn insert_text_inherits_style_before_caret() {
        let mut rich = RichText::from_runs(vec![bold("Bio"), Run::plain(" lab")]);
        rich.insert_text(3, "logy");
        assert_eq!(rich.runs()[0].text, "Biology");
        assert!(rich.runs()[0].style.bold);
    }

    #[test]
    fn carriage_returns_become_newlines() {
        assert_eq!(RichText::plain("Math\r\nRoom 4").text(), "Math\nRoom 4");
        let mut rich = RichText::plain("Lab");
        let caret = rich.insert_text(3, "\rB\r\n");
        assert_eq!(rich.text(), "Lab\nB\n");
        assert_eq!(caret, 6);
    }

    #[test]
    fn delete_handles_multibyte_characters() {
        let mut rich = RichText::plain("Café Élan");
        rich.delete_range(3, 6);
        assert_eq!(rich.text(), "Caflan");
    }

    #[test]
    fn apply_color_splits_runs() {
        let mut rich = RichText::plain("Room 204");
        rich.apply_color(5, 8, Rgb(255, 0, 0));
        assert_eq!(rich.runs().len(), 2);
        assert_eq!(rich.runs()[1].text, "204");
        assert_eq!(rich.to_html(), "Room <span style=\"color: #ff0000\">204</span>");
    }

    #[test]
    fn apply_color_keeps_existing_weight() {
        let mut rich = RichText::from_html("<span style=\"color: red; font-weight: bold\">Lab B</span>");
        rich.apply_color(4, 5, Rgb(0, 0, 255));
        assert!(rich.runs().iter().all(|r| r.style.is_strong()));
        assert_eq!(rich.runs()[1].style.color, Some(Rgb(0, 0, 255)));
    }

    #[test]
    fn nested_color_span_inherits_outer_weight() {
        let rich = RichText::from_html(
            "<span style=\"color: red; font-weight: bold\"><span style=\"color: blue\">x</span></span>",
        );
        assert_eq!(rich.runs().len(), 1);
        assert_eq!(rich.runs()[0].style.color, Some(Rgb(0, 0, 255)));
        assert!(rich.runs()[0].style.is_strong());
        assert_eq!(
            rich.to_html(),
            "<span style=\"color: #0000ff; font-weight: bold\">x</span>"
        );
    }

    #[test]
    fn toggle_turns_format_off_when_fully_applied() {
        let mut rich = RichText::plain("Chem");
        rich.toggle(0, 4, Format::Italic);
        assert!(rich.runs()[0].style.italic);
        rich.toggle(0, 4, Format::Italic);
        assert_eq!(rich, RichText::plain("Chem"));
    }

    #[test]
    fn html_escapes_text_and_nests_formats() {
        let rich = RichText::from_runs(vec![Run {
            text: "A<B & C".into(),
            style: RunStyle {
                bold: true,
                underline: true,
                color: Some(Rgb(0, 0, 255)),
                weight: Some(FontWeight::Bold),
                ..RunStyle::default()
            },
        }]);
        assert_eq!(
            rich.to_html(),
            "<span style=\"color: #0000ff; font-weight: bold\"><b><u>A&lt;B &amp; C</u></b></span>"
        );
    }

    #[test]
    fn html_round_trips_through_sanitizer() {
        let mut rich = RichText::plain("Physics 2");
        rich.toggle(0, 7, Format::Bold);
        rich.apply_color(8, 9, Rgb(39, 174, 96));
        assert_eq!(RichText::from_html(&rich.to_html()), rich);
    }

    #[test]
    fn blank_detection_ignores_whitespace() {
        assert!(RichText::plain("   ").is_blank());
        assert!(RichText::default().is_blank());
        assert!(!RichText::plain(" x ").is_blank());
    }

    #[test]
    fn selection_range_is_ordered() {
        let sel = Selection { anchor: 7, focus: 2 };
        assert_eq!(sel.range(), (2, 7));
        assert!(!sel.is_collapsed());
    }
}
