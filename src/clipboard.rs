//! Clipboard reads through the platform's command-line tools.

use std::process::{Command, Stdio};

use crate::paste::ClipboardPayload;

type Candidate = (&'static str, &'static [&'static str]);

const HTML_READERS: &[Candidate] = &[
    ("wl-paste", &["--no-newline", "--type", "text/html"]),
    ("xclip", &["-selection", "clipboard", "-t", "text/html", "-o"]),
];

const RTF_READERS: &[Candidate] = &[
    ("wl-paste", &["--no-newline", "--type", "text/rtf"]),
    ("xclip", &["-selection", "clipboard", "-t", "text/rtf", "-o"]),
];

const TEXT_READERS: &[Candidate] = &[
    // macOS
    ("pbpaste", &[]),
    // Wayland
    ("wl-paste", &["--no-newline"]),
    // X11
    ("xclip", &["-selection", "clipboard", "-o"]),
    ("xsel", &["--clipboard", "--output"]),
    // Windows
    ("powershell", &["-NoProfile", "-Command", "Get-Clipboard"]),
];

pub trait ClipboardSource {
    fn read(&self) -> ClipboardPayload;
}

/// Tries each known clipboard program in turn per flavour.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl ClipboardSource for SystemClipboard {
    fn read(&self) -> ClipboardPayload {
        let payload = ClipboardPayload {
            html: read_first(HTML_READERS),
            rtf: read_first(RTF_READERS),
            text: read_first(TEXT_READERS),
        };
        log::debug!(
            "clipboard read: html={} rtf={} text={}",
            payload.html.is_some(),
            payload.rtf.is_some(),
            payload.text.is_some()
        );
        payload
    }
}

fn read_first(candidates: &[Candidate]) -> Option<String> {
    candidates
        .iter()
        .find_map(|(prog, args)| try_clipboard_prog(prog, args))
}

fn try_clipboard_prog(prog: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(prog)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_reads_nothing() {
        assert_eq!(try_clipboard_prog("definitely-not-a-clipboard-tool", &[]), None);
    }

    #[test]
    fn every_flavour_has_a_reader() {
        assert!(!HTML_READERS.is_empty());
        assert!(!RTF_READERS.is_empty());
        assert!(TEXT_READERS.iter().any(|(p, _)| *p == "pbpaste"));
    }
}
