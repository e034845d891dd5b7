mod registry;

pub use registry::{ModelRegistry, ModelSpec, ProviderKind, IMAGE_CAPABILITY};
