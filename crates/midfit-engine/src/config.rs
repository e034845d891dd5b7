use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_DURATION_SECS: u64 = 60;
/// Two phone photos as base64 data URIs, with headroom.
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub openrouter_api_key: Option<String>,
    pub openrouter_api_base: String,
}

impl Default for ProviderCredentials {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            openrouter_api_key: None,
            openrouter_api_base: DEFAULT_OPENROUTER_API_BASE.to_string(),
        }
    }
}

/// Everything the proxy needs at construction. Nothing is read from the
/// environment after this is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub model: String,
    pub bind: SocketAddr,
    pub max_duration: Duration,
    pub max_body_bytes: usize,
    pub events_path: Option<PathBuf>,
    pub credentials: ProviderCredentials,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_duration: Duration::from_secs(DEFAULT_MAX_DURATION_SECS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            events_path: None,
            credentials: ProviderCredentials::default(),
        }
    }
}

impl ProxyConfig {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let bind_raw = value("MIDFIT_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .parse::<SocketAddr>()
            .with_context(|| format!("MIDFIT_BIND '{bind_raw}' is not a socket address"))?;

        let max_duration_secs = match value("MIDFIT_MAX_DURATION_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("MIDFIT_MAX_DURATION_SECS '{raw}' must be a number"))?,
            None => DEFAULT_MAX_DURATION_SECS,
        };

        let max_body_bytes = match value("MIDFIT_MAX_BODY_BYTES") {
            Some(raw) => raw
                .parse::<usize>()
                .with_context(|| format!("MIDFIT_MAX_BODY_BYTES '{raw}' must be a number"))?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        Ok(Self {
            model: value("MIDFIT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            bind,
            max_duration: Duration::from_secs(max_duration_secs.max(1)),
            max_body_bytes,
            events_path: value("MIDFIT_EVENTS").map(PathBuf::from),
            credentials: ProviderCredentials {
                gemini_api_key: value("GEMINI_API_KEY").or_else(|| value("GOOGLE_API_KEY")),
                gemini_api_base: value("GEMINI_API_BASE")
                    .map(|base| base.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
                openrouter_api_key: value("OPENROUTER_API_KEY"),
                openrouter_api_base: value("OPENROUTER_API_BASE")
                    .map(|base| base.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_OPENROUTER_API_BASE.to_string()),
            },
        })
    }
}
