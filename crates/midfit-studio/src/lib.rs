pub mod controller;
pub mod encode;
pub mod error;
pub mod preview;
pub mod slots;
pub mod status;
pub mod transport;

#[cfg(test)]
mod testing;

pub use controller::WorkflowController;
pub use error::WorkflowError;
pub use preview::{PreviewRegistry, PreviewUri};
pub use slots::{ImageFile, ImageSlot, SelectedFile, SlotIndex};
pub use status::{GenerationToken, WorkflowStatus, WorkflowView};
pub use transport::{Generated, GenerationTransport, HttpTransport};
