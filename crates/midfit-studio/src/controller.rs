use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::encode::encode_pair;
use crate::error::WorkflowError;
use crate::preview::PreviewRegistry;
use crate::slots::{ImageFile, ImageSlot, SelectedFile, SlotIndex};
use crate::status::{GenerationToken, WorkflowStatus, WorkflowView};
use crate::transport::{Generated, GenerationTransport};

const UNKNOWN_FAILURE_MESSAGE: &str = "Something went wrong";

struct Outcome {
    token: GenerationToken,
    result: Result<Generated, String>,
}

/// Client side of the try-on workflow: two input slots, one request at a time.
///
/// Generations run on a worker thread and report back over a channel; call
/// [`poll`](Self::poll) or [`wait`](Self::wait) to apply what has arrived.
/// An outcome is applied only while its token is still the one generating.
pub struct WorkflowController {
    transport: Arc<dyn GenerationTransport>,
    previews: PreviewRegistry,
    slots: [Option<ImageSlot>; 2],
    status: WorkflowStatus,
    last_token: GenerationToken,
    outcomes_tx: Sender<Outcome>,
    outcomes_rx: Receiver<Outcome>,
}

impl WorkflowController {
    pub fn new(transport: Arc<dyn GenerationTransport>) -> Self {
        Self::with_previews(transport, PreviewRegistry::new())
    }

    pub fn with_previews(transport: Arc<dyn GenerationTransport>, previews: PreviewRegistry) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::channel();
        Self {
            transport,
            previews,
            slots: [None, None],
            status: WorkflowStatus::Idle,
            last_token: 0,
            outcomes_tx,
            outcomes_rx,
        }
    }

    /// Fills `slot` with `file` if its content sniffs as an image.
    ///
    /// The replaced preview is released and any in-flight generation is
    /// superseded.
    pub fn upload(&mut self, slot: usize, file: SelectedFile) -> Result<(), WorkflowError> {
        let index = SlotIndex::try_from(slot)?;
        let file = ImageFile::sniff(file)?;
        let preview = self.previews.issue(file.name());
        info!(
            slot = %index,
            file = file.name(),
            media_type = file.media_type(),
            bytes = file.bytes().len(),
            "image selected"
        );
        self.slots[index.position()] = Some(ImageSlot { file, preview });
        self.reset();
        Ok(())
    }

    pub fn remove(&mut self, slot: usize) -> Result<(), WorkflowError> {
        let index = SlotIndex::try_from(slot)?;
        if self.slots[index.position()].take().is_some() {
            info!(slot = %index, "image removed");
        }
        self.reset();
        Ok(())
    }

    /// Starts a generation and returns its token, or `None` when a slot is
    /// empty, one is already running, or encoding fails.
    pub fn generate(&mut self) -> Option<GenerationToken> {
        if !self.can_generate() {
            debug!(status = ?self.status, "generate ignored");
            return None;
        }
        let (Some(person), Some(outfit)) = (&self.slots[0], &self.slots[1]) else {
            return None;
        };

        self.last_token += 1;
        let token = self.last_token;
        self.status = WorkflowStatus::Generating { token };

        let request = match encode_pair(&person.file, &outfit.file) {
            Ok(request) => request,
            Err(err) => {
                warn!(token, error = %err, "encoding failed");
                self.status = WorkflowStatus::Failed {
                    message: err.to_string(),
                };
                return None;
            }
        };

        let transport = Arc::clone(&self.transport);
        let outcomes = self.outcomes_tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("midfit-generate-{token}"))
            .spawn(move || {
                let result = transport.send(&request).map_err(|err| one_line(&err));
                // The controller may be gone; nothing to deliver to then.
                let _ = outcomes.send(Outcome { token, result });
            });
        if let Err(err) = spawned {
            warn!(token, error = %err, "failed to start generation worker");
            self.status = WorkflowStatus::Failed {
                message: format!("failed to start generation: {err}"),
            };
            return None;
        }
        info!(token, "generation dispatched");
        Some(token)
    }

    /// Applies every outcome that has already arrived. Never blocks.
    /// Returns whether the status changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(outcome) = self.outcomes_rx.try_recv() {
            changed |= self.apply(outcome);
        }
        changed
    }

    /// Blocks until the current generation settles or `timeout` elapses.
    pub fn wait(&mut self, timeout: Duration) -> &WorkflowStatus {
        let deadline = Instant::now() + timeout;
        self.poll();
        while self.status.is_generating() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.outcomes_rx.recv_timeout(remaining) {
                Ok(outcome) => {
                    self.apply(outcome);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        &self.status
    }

    pub fn status(&self) -> &WorkflowStatus {
        &self.status
    }

    pub fn view(&self) -> WorkflowView {
        WorkflowView::derive(&self.status, self.slots_filled())
    }

    pub fn slot(&self, index: SlotIndex) -> Option<&ImageSlot> {
        self.slots[index.position()].as_ref()
    }

    pub fn can_generate(&self) -> bool {
        self.slots_filled() && !self.status.is_generating()
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    fn slots_filled(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    fn reset(&mut self) {
        if let WorkflowStatus::Generating { token } = self.status {
            debug!(token, "generation superseded");
        }
        self.status = WorkflowStatus::Idle;
    }

    fn apply(&mut self, outcome: Outcome) -> bool {
        match self.status {
            WorkflowStatus::Generating { token } if token == outcome.token => {}
            _ => {
                debug!(token = outcome.token, "discarding stale generation outcome");
                return false;
            }
        }
        self.status = match outcome.result {
            Ok(generated) => {
                info!(
                    token = outcome.token,
                    media_type = %generated.image.media_type,
                    "generation succeeded"
                );
                WorkflowStatus::Succeeded {
                    image: generated.image.to_data_uri(),
                    text: generated.text,
                }
            }
            Err(message) => {
                warn!(token = outcome.token, error = %message, "generation failed");
                WorkflowStatus::Failed { message }
            }
        };
        true
    }
}

fn one_line(err: &anyhow::Error) -> String {
    let text = format!("{err:#}");
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<&str>>()
        .join(" ");
    if joined.is_empty() {
        UNKNOWN_FAILURE_MESSAGE.to_string()
    } else {
        joined
    }
}
