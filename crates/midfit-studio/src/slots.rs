use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::WorkflowError;
use crate::preview::PreviewUri;

/// The two required inputs, by their fixed positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotIndex {
    Person,
    Outfit,
}

impl SlotIndex {
    pub const ALL: [SlotIndex; 2] = [SlotIndex::Person, SlotIndex::Outfit];

    pub fn position(self) -> usize {
        match self {
            Self::Person => 0,
            Self::Outfit => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Outfit => "outfit",
        }
    }
}

impl TryFrom<usize> for SlotIndex {
    type Error = WorkflowError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Person),
            1 => Ok(Self::Outfit),
            other => Err(WorkflowError::InvalidSlot(other)),
        }
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A file as the user picked it: a name plus unverified bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }
}

/// A selected file whose bytes were sniffed as an image format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    name: String,
    media_type: &'static str,
    bytes: Vec<u8>,
}

impl ImageFile {
    /// Accepts the file only if its leading bytes match a known image format.
    /// The extension and any declared type are ignored.
    pub fn sniff(file: SelectedFile) -> Result<Self, WorkflowError> {
        let format = image::guess_format(&file.bytes)
            .map_err(|_| WorkflowError::NotAnImage(file.name.clone()))?;
        Ok(Self {
            name: file.name,
            media_type: format.to_mime_type(),
            bytes: file.bytes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> &str {
        self.media_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Skips sniffing, for files that could never pass it.
    #[cfg(test)]
    pub(crate) fn unchecked(name: &str, media_type: &'static str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            media_type,
            bytes,
        }
    }
}

/// A filled slot. Dropping it releases the preview.
#[derive(Debug)]
pub struct ImageSlot {
    pub file: ImageFile,
    pub preview: PreviewUri,
}
