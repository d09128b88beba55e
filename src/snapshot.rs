//! Saved form of the editor state and its replay onto a live document.
//!
//! Cells are keyed by their position among class cells at save time, not by
//! identity: inserting a row earlier in the table shifts which cell owns
//! which index on the next load.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::document::Document;
use crate::error::{Result, ScheduleError};
use crate::rich::{Rgb, RichText};
use crate::style::{FontFamily, FontSize, Theme};

/// Key the snapshot lives under in the key-value store.
pub const STORAGE_KEY: &str = "scheduleAppState";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default, deserialize_with = "lenient_cells")]
    pub table_data: Option<BTreeMap<usize, CellEntry>>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub custom_color: Option<String>,
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default)]
    pub font_size: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// One class cell. Older saves stored only the text as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellEntry {
    Legacy(String),
    Rich {
        #[serde(default)]
        text: String,
        #[serde(default)]
        html: String,
    },
}

/// Reads `tableData` entry by entry. Entries that are null or of an unknown
/// shape, and keys that are not indices, are skipped rather than failing the
/// whole snapshot.
fn lenient_cells<'de, D>(deserializer: D) -> std::result::Result<Option<BTreeMap<usize, CellEntry>>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Vec<(String, Value)> = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Object(map)) => map.into_iter().collect(),
        Some(Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Some(other) => {
            log::warn!("ignoring tableData of unexpected shape: {other}");
            return Ok(None);
        }
        None => return Ok(None),
    };
    let cells = entries
        .into_iter()
        .filter_map(|(key, value)| {
            let Ok(index) = key.parse::<usize>() else {
                log::debug!("skipping cell entry under non-index key {key:?}");
                return None;
            };
            match serde_json::from_value::<CellEntry>(value) {
                Ok(entry) => Some((index, entry)),
                Err(e) => {
                    log::debug!("skipping cell entry {index}: {e}");
                    None
                }
            }
        })
        .collect();
    Ok(Some(cells))
}

/// What a restore changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub title_restored: bool,
    pub cells_restored: usize,
    pub theme_applied: bool,
    pub font_family_applied: bool,
    pub font_size_applied: bool,
}

impl RestoreReport {
    pub fn style_changed(&self) -> bool {
        self.theme_applied || self.font_family_applied || self.font_size_applied
    }
}

/// Capture the document as it is right now.
pub fn capture(doc: &Document, now: DateTime<Utc>) -> Snapshot {
    let table_data = doc
        .schedule
        .class_cells()
        .enumerate()
        .map(|(index, cell)| {
            (
                index,
                CellEntry::Rich {
                    text: cell.content.text(),
                    html: cell.content.to_html(),
                },
            )
        })
        .collect();
    Snapshot {
        table_data: Some(table_data),
        title: Some(doc.schedule.title.text()),
        theme: Some(doc.style.active_theme_id().to_string()),
        custom_color: doc.style.custom_color.map(Rgb::to_hex),
        font_family: Some(doc.style.font_family.css().to_string()),
        font_size: Some(doc.style.font_size.id().to_string()),
        timestamp: Some(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    }
}

pub fn to_json(snapshot: &Snapshot) -> Result<String> {
    serde_json::to_string(snapshot).map_err(|e| ScheduleError::StorageFailure(e.to_string()))
}

pub fn from_json(raw: &str) -> Result<Snapshot> {
    serde_json::from_str(raw).map_err(|e| ScheduleError::ParseFailure(e.to_string()))
}

/// Replay a snapshot: title, cells by position, theme, then fonts.
///
/// Live cells without an entry keep their current state and entries past
/// the last live cell are ignored. Running it twice gives the same result.
pub fn restore(snapshot: &Snapshot, doc: &mut Document) -> RestoreReport {
    let mut report = RestoreReport::default();

    if let Some(title) = snapshot.title.as_deref().filter(|t| !t.is_empty()) {
        doc.schedule.title = RichText::plain(title);
        report.title_restored = true;
    }

    if let Some(data) = &snapshot.table_data {
        for (index, cell) in doc.schedule.class_cells_mut().enumerate() {
            let Some(entry) = data.get(&index) else {
                continue;
            };
            match entry {
                CellEntry::Legacy(text) if text.is_empty() => continue,
                CellEntry::Legacy(text) => cell.content = RichText::plain(text.as_str()),
                CellEntry::Rich { html, .. } if !html.is_empty() => {
                    cell.content = RichText::from_html(html)
                }
                CellEntry::Rich { text, .. } if !text.is_empty() => {
                    cell.content = RichText::plain(text.as_str())
                }
                CellEntry::Rich { .. } => {}
            }
            cell.empty = false;
            report.cells_restored += 1;
        }
        if data.len() > report.cells_restored {
            log::debug!(
                "snapshot has {} cell entries, {} applied",
                data.len(),
                report.cells_restored
            );
        }
    }

    if let Some(theme) = snapshot.theme.as_deref() {
        let custom = snapshot.custom_color.as_deref().and_then(Rgb::from_hex);
        match (theme, custom) {
            ("custom", Some(color)) => {
                doc.style.custom_color = Some(color);
                doc.style.theme = Theme::Custom;
                report.theme_applied = true;
            }
            _ => match Theme::preset(theme) {
                Some(preset) => {
                    doc.style.theme = preset;
                    report.theme_applied = true;
                }
                None => log::warn!("saved theme {theme:?} is not available; keeping current theme"),
            },
        }
    }

    if let Some(css) = snapshot.font_family.as_deref() {
        match FontFamily::from_css(css) {
            Some(family) => {
                doc.style.font_family = family;
                report.font_family_applied = true;
            }
            None => log::warn!("saved font family {css:?} is not available"),
        }
    }

    if let Some(id) = snapshot.font_size.as_deref() {
        match FontSize::from_id(id) {
            Some(size) => {
                doc.style.font_size = size;
                report.font_size_applied = true;
            }
            None => log::warn!("saved font size {id:?} is not available"),
        }
    }

    report
}
