//! Table structure: title, column headers, and time-slot rows of class cells.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, ScheduleError};
use crate::rich::RichText;

/// Used when the last row's label is not a recognisable time.
pub const FALLBACK_TIME_SLOT: &str = "6:00 PM";
pub const DEFAULT_TITLE: &str = "Class Schedule";
pub const CELL_PLACEHOLDER: &str = "Click to add class";
/// Share of the table width reserved for the time column, in percent.
pub const TIME_COLUMN_PERCENT: u16 = 12;

const DEFAULT_DAYS: [&str; 5] = ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"];
const DEFAULT_TIMES: [&str; 4] = ["6:00 PM", "7:00 PM", "8:00 PM", "9:00 PM"];

static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+):(\d+)\s*(AM|PM)").expect("time slot pattern"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    pub content: RichText,
    /// Placeholder flag; refreshed on input/blur, cleared on focus and restore.
    pub empty: bool,
}

impl Cell {
    pub fn blank() -> Self {
        Self {
            content: RichText::default(),
            empty: true,
        }
    }

    pub fn refresh_empty(&mut self) {
        self.empty = self.content.is_blank();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub time: RichText,
    pub cells: Vec<Cell>,
}

/// Something the user can type into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Title,
    Header(usize),
    /// `col == 0` is the row's time slot; higher columns are class cells.
    Cell { row: usize, col: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub title: RichText,
    /// Header 0 is the fixed time column.
    pub headers: Vec<RichText>,
    pub rows: Vec<Row>,
}

impl Default for Schedule {
    fn default() -> Self {
        let mut headers = vec![RichText::plain("Time")];
        headers.extend(DEFAULT_DAYS.iter().map(|d| RichText::plain(*d)));
        let rows = DEFAULT_TIMES
            .iter()
            .map(|t| Row {
                time: RichText::plain(*t),
                cells: (0..DEFAULT_DAYS.len()).map(|_| Cell::blank()).collect(),
            })
            .collect();
        Self {
            title: RichText::plain(DEFAULT_TITLE),
            headers,
            rows,
        }
    }
}

impl Schedule {
    /// Columns including the time column.
    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    pub fn day_count(&self) -> usize {
        self.headers.len().saturating_sub(1)
    }

    pub fn add_column(&mut self) {
        let label = format!("Day {}", self.headers.len());
        self.headers.push(RichText::plain(label));
        for row in &mut self.rows {
            row.cells.push(Cell::blank());
        }
    }

    pub fn remove_column(&mut self) -> Result<()> {
        if self.headers.len() <= 2 {
            return Err(ScheduleError::StructuralLimit(
                "Cannot remove column. At least one day column is required.",
            ));
        }
        self.headers.pop();
        for row in &mut self.rows {
            row.cells.pop();
        }
        Ok(())
    }

    pub fn add_row(&mut self) {
        let last = self
            .rows
            .last()
            .map(|r| r.time.text())
            .unwrap_or_default();
        self.rows.push(Row {
            time: RichText::plain(next_time_slot(&last)),
            cells: (0..self.day_count()).map(|_| Cell::blank()).collect(),
        });
    }

    pub fn remove_row(&mut self) -> Result<()> {
        if self.rows.len() <= 1 {
            return Err(ScheduleError::StructuralLimit(
                "Cannot remove row. At least one time slot is required.",
            ));
        }
        self.rows.pop();
        Ok(())
    }

    /// Class cells in document order (row-major).
    pub fn class_cells(&self) -> impl Iterator<Item = &Cell> {
        self.rows.iter().flat_map(|r| r.cells.iter())
    }

    pub fn class_cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.rows.iter_mut().flat_map(|r| r.cells.iter_mut())
    }

    pub fn has_content(&self) -> bool {
        self.class_cells().any(|c| !c.content.is_blank())
    }

    pub fn content(&self, target: Target) -> Option<&RichText> {
        match target {
            Target::Title => Some(&self.title),
            Target::Header(col) => self.headers.get(col),
            Target::Cell { row, col: 0 } => self.rows.get(row).map(|r| &r.time),
            Target::Cell { row, col } => self
                .rows
                .get(row)
                .and_then(|r| r.cells.get(col - 1))
                .map(|c| &c.content),
        }
    }

    pub fn content_mut(&mut self, target: Target) -> Option<&mut RichText> {
        match target {
            Target::Title => Some(&mut self.title),
            Target::Header(col) => self.headers.get_mut(col),
            Target::Cell { row, col: 0 } => self.rows.get_mut(row).map(|r| &mut r.time),
            Target::Cell { row, col } => self
                .rows
                .get_mut(row)
                .and_then(|r| r.cells.get_mut(col - 1))
                .map(|c| &mut c.content),
        }
    }

    /// The class cell behind a target, if it is one.
    pub fn class_cell_mut(&mut self, target: Target) -> Option<&mut Cell> {
        match target {
            Target::Cell { row, col } if col > 0 => {
                self.rows.get_mut(row).and_then(|r| r.cells.get_mut(col - 1))
            }
            _ => None,
        }
    }

    /// Width of each day column, in percent of the table.
    pub fn day_column_percent(&self) -> u16 {
        let days = self.day_count().max(1) as u16;
        (100 - TIME_COLUMN_PERCENT) / days
    }

    pub fn header_texts(&self) -> Vec<String> {
        self.headers.iter().map(|h| h.text().trim().to_string()).collect()
    }

    pub fn row_texts(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|r| {
                std::iter::once(r.time.text().trim().to_string())
                    .chain(r.cells.iter().map(|c| c.content.text().trim().to_string()))
                    .collect()
            })
            .collect()
    }
}

/// Label of the slot one hour after `current` (`H:MM AM|PM`).
///
/// Period rules, checked in order after adding the hour: 12 in the AM
/// becomes PM; 13 in the PM becomes 1 PM; 12 in the PM becomes 1 AM.
/// 13 in the AM is left as is.
pub fn next_time_slot(current: &str) -> String {
    let Some(caps) = TIME_RE.captures(current) else {
        return FALLBACK_TIME_SLOT.to_string();
    };
    let (Ok(hour), Ok(minute)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
        return FALLBACK_TIME_SLOT.to_string();
    };
    let Some(mut hour) = hour.checked_add(1) else {
        return FALLBACK_TIME_SLOT.to_string();
    };
    let mut period = &caps[3];

    if hour == 12 && period == "AM" {
        period = "PM";
    } else if hour == 13 && period == "PM" {
        hour = 1;
    } else if hour == 12 && period == "PM" {
        hour = 1;
        period = "AM";
    }

    format!("{hour}:{minute:02} {period}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_slot_transitions() {
        let table = [
            ("6:00 PM", "7:00 PM"),
            ("11:00 AM", "12:00 PM"),
            ("11:00 PM", "1:00 AM"),
            ("12:30 PM", "1:30 PM"),
            ("12:00 AM", "13:00 AM"),
            ("9:05 AM", "10:05 AM"),
            ("  8:7 PM ", "9:07 PM"),
        ];
        for (from, to) in table {
            assert_eq!(next_time_slot(from), to, "from {from}");
        }
    }

    #[test]
    fn unparsable_time_uses_fallback() {
        assert_eq!(next_time_slot("noon"), "6:00 PM");
        assert_eq!(next_time_slot("6:00 pm"), "6:00 PM");
        assert_eq!(next_time_slot(""), "6:00 PM");
    }

    #[test]
    fn hour_at_integer_limit_uses_fallback() {
        assert_eq!(next_time_slot("4294967295:00 PM"), "6:00 PM");
        assert_eq!(next_time_slot("99999999999:00 AM"), "6:00 PM");
        assert_eq!(next_time_slot("4294967294:00 AM"), "4294967295:00 AM");
    }

    #[test]
    fn default_skeleton_is_rectangular() {
        let s = Schedule::default();
        assert_eq!(s.column_count(), 6);
        assert_eq!(s.rows.len(), 4);
        assert!(s.rows.iter().all(|r| r.cells.len() == 5));
        assert!(s.class_cells().all(|c| c.empty));
    }

    #[test]
    fn add_column_labels_by_header_count() {
        let mut s = Schedule::default();
        s.add_column();
        assert_eq!(s.headers.last().map(|h| h.text()), Some("Day 6".to_string()));
        assert!(s.rows.iter().all(|r| r.cells.len() == 6));
    }

    #[test]
    fn add_row_continues_from_last_slot() {
        let mut s = Schedule::default();
        s.add_row();
        let last = s.rows.last().unwrap();
        assert_eq!(last.time.text(), "10:00 PM");
        assert_eq!(last.cells.len(), s.day_count());
    }

    #[test]
    fn structural_floor_holds_under_mixed_operations() {
        let mut s = Schedule::default();
        let ops = "RRRRRCCCCCCrcRRCCrrcRRRRCCCC";
        for op in ops.chars() {
            let before = s.clone();
            let res = match op {
                'r' => {
                    s.add_row();
                    Ok(())
                }
                'c' => {
                    s.add_column();
                    Ok(())
                }
                'R' => s.remove_row(),
                _ => s.remove_column(),
            };
            if let Err(e) = res {
                assert!(matches!(e, ScheduleError::StructuralLimit(_)));
                assert_eq!(s, before, "failed removal must not mutate");
            }
            assert!(s.day_count() >= 1);
            assert!(!s.rows.is_empty());
            assert!(s.rows.iter().all(|r| r.cells.len() == s.day_count()));
        }
    }

    #[test]
    fn day_column_width_shares_remaining_space() {
        let mut s = Schedule::default();
        assert_eq!(s.day_column_percent(), 17);
        s.add_column();
        s.add_column();
        assert_eq!(s.day_column_percent(), 12);
    }

    #[test]
    fn targets_resolve_to_content() {
        let mut s = Schedule::default();
        assert_eq!(s.content(Target::Cell { row: 0, col: 0 }).map(|t| t.text()), Some("6:00 PM".into()));
        assert_eq!(s.content(Target::Header(1)).map(|t| t.text()), Some("Monday".into()));
        assert!(s.content(Target::Cell { row: 9, col: 1 }).is_none());
        assert!(s.class_cell_mut(Target::Cell { row: 0, col: 0 }).is_none());
        assert!(s.class_cell_mut(Target::Cell { row: 0, col: 5 }).is_some());
    }

    #[test]
    fn texts_for_export_are_trimmed() {
        let mut s = Schedule::default();
        s.rows[0].cells[0].content = RichText::plain("  Math  ");
        assert_eq!(s.row_texts()[0][1], "Math");
        assert_eq!(s.header_texts()[0], "Time");
    }
}
