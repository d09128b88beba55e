/// Failures the editor reports while working on a schedule.
///
/// None of these are fatal: every path that produces one leaves the
/// document usable.
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    /// Paste (or another content edit) arrived while no cell was being edited.
    #[error("Paste target is not editable")]
    NotEditableTarget,

    /// Writing the snapshot failed (quota or serialization).
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// A saved snapshot could not be decoded.
    #[error("could not parse saved schedule: {0}")]
    ParseFailure(String),

    /// Removing a row or column would go below the structural floor.
    #[error("{0}")]
    StructuralLimit(&'static str),

    /// PDF generation or printing failed.
    #[error("export failed: {0}")]
    ExportFailure(String),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
