//! Paste into the cell being edited.

use crate::error::{Result, ScheduleError};
use crate::rich::{RichText, Run, Selection};
use crate::sanitize::{self, SanitizeError};

/// The flavours a clipboard read produced; any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipboardPayload {
    pub html: Option<String>,
    pub rtf: Option<String>,
    pub text: Option<String>,
}

impl ClipboardPayload {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        [&self.html, &self.rtf, &self.text]
            .iter()
            .all(|flavour| flavour.as_deref().is_none_or(str::is_empty))
    }
}

/// Content plus caret of the region receiving the paste.
pub struct EditTarget<'a> {
    pub content: &'a mut RichText,
    pub selection: &'a mut Selection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasteOutcome {
    pub inserted_chars: usize,
    pub used_html: bool,
    /// Set when the sanitized path failed and plain text was inserted instead.
    pub fallback: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum PasteFault {
    #[error(transparent)]
    Sanitize(#[from] SanitizeError),

    #[error("selection {start}..{end} lies outside content of {len} characters")]
    SelectionOutOfRange { start: usize, end: usize, len: usize },
}

/// Replace the target's selection with sanitized clipboard content.
///
/// Everything fallible runs before the content is touched, so the selected
/// range is removed exactly once and exactly one replacement goes in.
pub fn paste(target: Option<EditTarget<'_>>, payload: &ClipboardPayload) -> Result<PasteOutcome> {
    let Some(EditTarget { content, selection }) = target else {
        return Err(ScheduleError::NotEditableTarget);
    };
    log::debug!(
        "paste: html={} rtf={} text={} bytes",
        payload.html.as_deref().map_or(0, str::len),
        payload.rtf.as_deref().map_or(0, str::len),
        payload.text.as_deref().map_or(0, str::len),
    );
    let plain = payload.text.as_deref().unwrap_or_default();

    match prepare(content, *selection, payload) {
        Ok(((start, end), runs, used_html)) => {
            content.delete_range(start, end);
            let caret = content.insert_runs(start, runs);
            selection.collapse_to(caret);
            Ok(PasteOutcome {
                inserted_chars: caret - start,
                used_html,
                fallback: None,
            })
        }
        Err(fault) => {
            log::warn!("paste fell back to plain text: {fault}");
            let len = content.char_len();
            let (start, end) = selection.range();
            let (start, end) = (start.min(len), end.min(len));
            content.delete_range(start, end);
            let caret = if plain.is_empty() {
                start
            } else {
                content.insert_text(start, plain)
            };
            selection.collapse_to(caret);
            Ok(PasteOutcome {
                inserted_chars: caret - start,
                used_html: false,
                fallback: Some(fault.to_string()),
            })
        }
    }
}

type Prepared = ((usize, usize), Vec<Run>, bool);

fn prepare(
    content: &RichText,
    selection: Selection,
    payload: &ClipboardPayload,
) -> std::result::Result<Prepared, PasteFault> {
    let len = content.char_len();
    let (start, end) = selection.range();
    if end > len {
        return Err(PasteFault::SelectionOutOfRange { start, end, len });
    }

    if let Some(html) = payload.html.as_deref().filter(|h| !h.trim().is_empty()) {
        let fragment = sanitize::sanitize_html(html)?;
        if !fragment.is_empty() {
            let rich = RichText::from_fragment(&fragment);
            return Ok(((start, end), rich.runs().to_vec(), true));
        }
    }

    let runs = match payload.text.as_deref() {
        Some(text) if !text.is_empty() => vec![Run::plain(text)],
        _ => Vec::new(),
    };
    Ok(((start, end), runs, false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rich::Format;

    fn target<'a>(content: &'a mut RichText, selection: &'a mut Selection) -> Option<EditTarget<'a>> {
        Some(EditTarget { content, selection })
    }

    #[test]
    fn plain_text_only_inserts_unstyled_run() {
        let mut content = RichText::default();
        let mut sel = Selection::caret(0);
        let out = paste(target(&mut content, &mut sel), &ClipboardPayload::plain("Math 101")).unwrap();

        assert_eq!(content, RichText::plain("Math 101"));
        assert_eq!(sel, Selection::caret(8));
        assert_eq!(out.inserted_chars, 8);
        assert!(!out.used_html);
        assert!(out.fallback.is_none());
    }

    #[test]
    fn html_bold_inserted_and_script_gone() {
        let mut content = RichText::plain("[]");
        let mut sel = Selection::caret(1);
        let payload = ClipboardPayload {
            html: Some("<b>x</b><script>evil</script>".into()),
            text: Some("xevil".into()),
            ..ClipboardPayload::default()
        };
        let out = paste(target(&mut content, &mut sel), &payload).unwrap();

        assert!(out.used_html);
        assert_eq!(content.text(), "[x]");
        assert_eq!(content.to_html(), "[<b>x</b>]");
        assert!(!content.to_html().contains("script"));
        assert_eq!(sel, Selection::caret(2));
    }

    #[test]
    fn selection_is_replaced_once() {
        let mut content = RichText::plain("Room 101 today");
        let mut sel = Selection { anchor: 8, focus: 5 };
        paste(target(&mut content, &mut sel), &ClipboardPayload::plain("204")).unwrap();
        assert_eq!(content.text(), "Room 204 today");
        assert_eq!(sel, Selection::caret(8));
    }

    #[test]
    fn empty_fragment_falls_back_to_plain_text() {
        let mut content = RichText::default();
        let mut sel = Selection::caret(0);
        let payload = ClipboardPayload {
            html: Some("<div></div>".into()),
            text: Some("Gym".into()),
            ..ClipboardPayload::default()
        };
        let out = paste(target(&mut content, &mut sel), &payload).unwrap();
        assert!(!out.used_html);
        assert_eq!(content.text(), "Gym");
    }

    #[test]
    fn empty_clipboard_removes_selection_and_collapses() {
        let mut content = RichText::plain("abcdef");
        let mut sel = Selection { anchor: 2, focus: 4 };
        let out = paste(target(&mut content, &mut sel), &ClipboardPayload::default()).unwrap();
        assert_eq!(out.inserted_chars, 0);
        assert_eq!(content.text(), "abef");
        assert_eq!(sel, Selection::caret(2));
    }

    #[test]
    fn no_target_is_not_editable_and_untouched() {
        let err = paste(None, &ClipboardPayload::plain("x")).unwrap_err();
        assert!(matches!(err, ScheduleError::NotEditableTarget));
    }

    #[test]
    fn oversized_html_falls_back_to_plain_text_with_caret_style() {
        let mut content = RichText::plain("Lab");
        content.toggle(0, 3, Format::Bold);
        let mut sel = Selection::caret(3);
        let payload = ClipboardPayload {
            html: Some(format!("<i>{}</i>", "y".repeat(crate::sanitize::MAX_HTML_BYTES))),
            text: Some(" A".into()),
            ..ClipboardPayload::default()
        };
        let out = paste(target(&mut content, &mut sel), &payload).unwrap();

        assert!(out.fallback.is_some());
        assert_eq!(content.text(), "Lab A");
        assert_eq!(content.runs().len(), 1);
        assert!(content.runs()[0].style.bold);
        assert_eq!(sel, Selection::caret(5));
    }

    #[test]
    fn stale_selection_is_clamped_in_fallback() {
        let mut content = RichText::plain("abc");
        let mut sel = Selection { anchor: 1, focus: 10 };
        let out = paste(target(&mut content, &mut sel), &ClipboardPayload::plain("Z")).unwrap();
        assert!(out.fallback.is_some());
        assert_eq!(content.text(), "aZ");
        assert_eq!(sel, Selection::caret(2));
    }

    #[test]
    fn payload_emptiness() {
        assert!(ClipboardPayload::default().is_empty());
        assert!(ClipboardPayload::plain("").is_empty());
        assert!(!ClipboardPayload::plain("x").is_empty());
    }
}
