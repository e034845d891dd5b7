use midfit_contracts::EncodedImage;

/// Monotonic id of one dispatched generation.
pub type GenerationToken = u64;

pub const AWAITING_UPLOADS_HINT: &str = "Upload both images to unlock generation";

/// Where the request lifecycle stands. Only the controller changes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WorkflowStatus {
    #[default]
    Idle,
    Generating {
        token: GenerationToken,
    },
    Succeeded {
        image: EncodedImage,
        text: String,
    },
    Failed {
        message: String,
    },
}

impl WorkflowStatus {
    pub fn is_generating(&self) -> bool {
        matches!(self, Self::Generating { .. })
    }
}

/// What the presentation layer shows. Exactly one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowView {
    AwaitingUploads,
    Ready,
    Generating,
    Succeeded { image_uri: String },
    Failed { message: String },
}

impl WorkflowView {
    pub fn derive(status: &WorkflowStatus, slots_filled: bool) -> Self {
        match status {
            WorkflowStatus::Generating { .. } => Self::Generating,
            WorkflowStatus::Succeeded { image, .. } => Self::Succeeded {
                image_uri: image.as_str().to_string(),
            },
            WorkflowStatus::Failed { message } => Self::Failed {
                message: message.clone(),
            },
            WorkflowStatus::Idle if slots_filled => Self::Ready,
            WorkflowStatus::Idle => Self::AwaitingUploads,
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::AwaitingUploads => Some(AWAITING_UPLOADS_HINT),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_view_depends_on_slots() {
        let awaiting = WorkflowView::derive(&WorkflowStatus::Idle, false);
        assert_eq!(awaiting, WorkflowView::AwaitingUploads);
        assert_eq!(awaiting.hint(), Some(AWAITING_UPLOADS_HINT));
        assert_eq!(
            WorkflowView::derive(&WorkflowStatus::Idle, true),
            WorkflowView::Ready
        );
    }

    #[test]
    fn non_idle_status_wins_over_slots() {
        let succeeded = WorkflowStatus::Succeeded {
            image: EncodedImage::from_base64("AAA", "image/png"),
            text: String::new(),
        };
        assert_eq!(
            WorkflowView::derive(&succeeded, true),
            WorkflowView::Succeeded {
                image_uri: "data:image/png;base64,AAA".to_string()
            }
        );
        assert_eq!(
            WorkflowView::derive(&WorkflowStatus::Generating { token: 3 }, true),
            WorkflowView::Generating
        );
        assert_eq!(WorkflowView::Generating.hint(), None);
    }
}
