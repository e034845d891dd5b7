use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;

use crate::capability::{GeneratedFile, ImageModel, ModelOutput, ModelRequest};

/// Scripted model: returns queued outputs in order and records every request.
pub(crate) struct FakeModel {
    outputs: Mutex<Vec<anyhow::Result<ModelOutput>>>,
    calls: Mutex<Vec<ModelRequest>>,
    delay: Duration,
}

impl FakeModel {
    pub(crate) fn returning(output: anyhow::Result<ModelOutput>) -> Arc<Self> {
        Self::delayed(output, Duration::ZERO)
    }

    pub(crate) fn delayed(output: anyhow::Result<ModelOutput>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outputs: Mutex::new(vec![output]),
            calls: Mutex::new(Vec::new()),
            delay,
        })
    }

    pub(crate) fn png(base64: &str) -> Arc<Self> {
        Self::returning(Ok(ModelOutput {
            files: vec![GeneratedFile {
                media_type: "image/png".to_string(),
                base64: base64.to_string(),
            }],
            text: "fake commentary".to_string(),
        }))
    }

    pub(crate) fn calls(&self) -> Vec<ModelRequest> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls().len()
    }
}

impl ImageModel for FakeModel {
    fn name(&self) -> &str {
        "fake"
    }

    fn generate(&self, request: &ModelRequest) -> anyhow::Result<ModelOutput> {
        self.calls
            .lock()
            .map_err(|_| anyhow!("calls lock poisoned"))?
            .push(request.clone());
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let mut outputs = self
            .outputs
            .lock()
            .map_err(|_| anyhow!("outputs lock poisoned"))?;
        if outputs.is_empty() {
            return Err(anyhow!("no scripted output left"));
        }
        outputs.remove(0)
    }
}
