use std::fmt;

use anyhow::{bail, Result};
use indexmap::IndexMap;

pub const IMAGE_CAPABILITY: &str = "image";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Gemini,
    OpenRouter,
    Dryrun,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenRouter => "openrouter",
            Self::Dryrun => "dryrun",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: String,
    pub provider: ProviderKind,
    pub capabilities: Vec<String>,
}

impl ModelSpec {
    fn new(name: &str, provider: ProviderKind, capabilities: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            provider,
            capabilities: capabilities
                .iter()
                .map(|item| (*item).to_string())
                .collect(),
        }
    }

    pub fn supports(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|item| item == capability)
    }
}

/// Known model ids and the provider that serves each of them.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: IndexMap<String, ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ModelRegistry {
    pub fn new(models: Option<IndexMap<String, ModelSpec>>) -> Self {
        Self {
            models: models.unwrap_or_else(default_models),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn by_capability(&self, capability: &str) -> Vec<ModelSpec> {
        self.models
            .values()
            .filter(|model| model.supports(capability))
            .cloned()
            .collect()
    }

    /// Resolves a configured model id to its spec.
    ///
    /// Registered ids win. Unregistered ids are routed by shape: `dryrun*`,
    /// `vendor/model` (OpenRouter) and `gemini-*`. The result must support
    /// `capability`.
    pub fn resolve(&self, name: &str, capability: &str) -> Result<ModelSpec> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            bail!("No model configured.");
        }
        let spec = match self.get(trimmed) {
            Some(spec) => spec.clone(),
            None => match route_by_shape(trimmed) {
                Some(provider) => ModelSpec::new(trimmed, provider, &[IMAGE_CAPABILITY, "edit"]),
                None => bail!(
                    "Unknown model '{trimmed}'; expected a registered id, 'gemini-*', 'vendor/model' or 'dryrun-*'."
                ),
            },
        };
        if !spec.supports(capability) {
            bail!("Model '{trimmed}' does not support capability '{capability}'.");
        }
        Ok(spec)
    }
}

fn route_by_shape(name: &str) -> Option<ProviderKind> {
    let lowered = name.to_ascii_lowercase();
    if lowered.starts_with("dryrun") {
        return Some(ProviderKind::Dryrun);
    }
    if lowered.contains('/') && !lowered.starts_with("models/") {
        return Some(ProviderKind::OpenRouter);
    }
    let bare = lowered.strip_prefix("models/").unwrap_or(&lowered);
    if bare.starts_with("gemini-") {
        return Some(ProviderKind::Gemini);
    }
    None
}

fn default_models() -> IndexMap<String, ModelSpec> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, provider: ProviderKind, capabilities: &[&str]| {
        map.insert(name.to_string(), ModelSpec::new(name, provider, capabilities));
    };

    insert("dryrun-image-1", ProviderKind::Dryrun, &["image", "edit"]);
    insert(
        "gemini-2.5-flash-image-preview",
        ProviderKind::Gemini,
        &["image", "edit"],
    );
    insert("gemini-2.5-flash-image", ProviderKind::Gemini, &["image", "edit"]);
    insert(
        "gemini-3-pro-image-preview",
        ProviderKind::Gemini,
        &["image", "edit"],
    );
    insert("gemini-2.5-flash", ProviderKind::Gemini, &["text", "vision"]);
    insert(
        "google/gemini-2.5-flash-image-preview",
        ProviderKind::OpenRouter,
        &["image", "edit"],
    );
    insert(
        "google/gemini-2.5-flash-image",
        ProviderKind::OpenRouter,
        &["image", "edit"],
    );
    insert(
        "google/gemini-3-pro-image-preview",
        ProviderKind::OpenRouter,
        &["image", "edit"],
    );

    map
}
