use crate::schedule::Schedule;
use crate::style::StyleState;

/// Everything the editor shows and saves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub schedule: Schedule,
    pub style: StyleState,
}
