use thiserror::Error;

/// Synchronous rejections from the workflow controller.
///
/// Failures of a dispatched generation are not errors here; they land in
/// `WorkflowStatus::Failed` as a display string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("slot {0} does not exist (expected 0 for person or 1 for outfit)")]
    InvalidSlot(usize),
    #[error("{0} is not a recognizable image")]
    NotAnImage(String),
    #[error("failed to encode {0}")]
    Encode(String),
}
