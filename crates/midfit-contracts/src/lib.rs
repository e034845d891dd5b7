pub mod data_uri;
pub mod events;
pub mod models;
pub mod wire;

pub use data_uri::EncodedImage;
pub use wire::{GeneratedImage, GenerationRequest, GenerationResult};
