//! Debounced save scheduling, driven by the UI tick.

use std::time::{Duration, Instant};

/// Quiet period after typing or pasting before a save fires.
pub const INPUT_DEBOUNCE: Duration = Duration::from_millis(500);
/// Delay after a discrete control change (theme, font, structure).
pub const CONTROL_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Default)]
pub struct Autosave {
    deadline: Option<Instant>,
    disabled: bool,
}

impl Autosave {
    /// Every keystroke pushes the save back.
    pub fn schedule_input(&mut self, now: Instant) {
        self.deadline = Some(now + INPUT_DEBOUNCE);
    }

    /// Never delays a save that is already due sooner.
    pub fn schedule_control(&mut self, now: Instant) {
        let at = now + CONTROL_DELAY;
        self.deadline = Some(self.deadline.map_or(at, |d| d.min(at)));
    }

    /// Consume the pending save if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(d) if d <= now => {
                self.deadline = None;
                !self.disabled
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some() && !self.disabled
    }

    /// Storage turned out to be unavailable; stop saving for this session.
    pub fn disable(&mut self) {
        self.disabled = true;
        self.deadline = None;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rapid_input_coalesces_into_one_save() {
        let t0 = Instant::now();
        let mut a = Autosave::default();
        for ms in [0, 100, 200, 300] {
            a.schedule_input(t0 + Duration::from_millis(ms));
        }
        assert!(!a.take_due(t0 + Duration::from_millis(700)));
        assert!(a.take_due(t0 + Duration::from_millis(800)));
        assert!(!a.take_due(t0 + Duration::from_millis(900)));
    }

    #[test]
    fn control_change_pulls_deadline_forward_only() {
        let t0 = Instant::now();
        let mut a = Autosave::default();
        a.schedule_input(t0);
        a.schedule_control(t0);
        assert!(a.take_due(t0 + CONTROL_DELAY));

        a.schedule_control(t0);
        a.schedule_control(t0 + Duration::from_millis(50));
        assert!(a.take_due(t0 + CONTROL_DELAY));
    }

    #[test]
    fn disabled_autosave_never_fires() {
        let t0 = Instant::now();
        let mut a = Autosave::default();
        a.disable();
        a.schedule_control(t0);
        assert!(!a.is_pending());
        assert!(!a.take_due(t0 + Duration::from_secs(1)));
    }
}
