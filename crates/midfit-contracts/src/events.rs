use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Append-only JSONL audit log for generation requests.
///
/// Each line carries `event`, `service` and `ts`; payload keys are merged
/// last and win. The file is opened on first emit and kept open. Clones
/// share the handle, so concurrent emitters never interleave lines.
#[derive(Debug, Clone)]
pub struct EventLog {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    path: PathBuf,
    service: String,
    file: Mutex<Option<File>>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, service: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                path: path.into(),
                service: service.into(),
                file: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    pub fn service(&self) -> &str {
        &self.shared.service
    }

    pub fn emit(&self, event: &str, payload: EventPayload) -> anyhow::Result<Value> {
        let mut row: EventPayload = [
            ("event", Value::from(event)),
            ("service", Value::from(self.shared.service.as_str())),
            ("ts", Value::from(timestamp())),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect();
        row.extend(payload);
        let row = Value::Object(row);
        let line = serde_json::to_string(&row)?;

        let mut slot = self
            .shared
            .file
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        let file = match slot.take() {
            Some(file) => file,
            None => self.open()?,
        };
        let file = slot.insert(file);
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to {}", self.shared.path.display()))?;
        Ok(row)
    }

    fn open(&self) -> anyhow::Result<File> {
        let path = &self.shared.path;
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open event log {}", path.display()))
    }
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
