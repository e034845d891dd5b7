use serde::{Deserialize, Deserializer, Serialize};

use crate::data_uri::EncodedImage;

pub const GENERATE_OUTFIT_ROUTE: &str = "/api/generate-outfit";

pub const MISSING_INPUTS_MESSAGE: &str = "Both person image and outfit image are required";
pub const NO_IMAGE_MESSAGE: &str = "No image was generated. Please try again.";
pub const GENERATION_FALLBACK_MESSAGE: &str = "Failed to generate image";

/// Body of `POST /api/generate-outfit`.
///
/// Absent and `null` keys deserialize as empty strings so that the proxy
/// reports them through its own validation instead of a decoder error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub person_image: EncodedImage,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub outfit_image: EncodedImage,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<EncodedImage, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .map(EncodedImage::from_data)
        .unwrap_or_default())
}

impl GenerationRequest {
    pub fn new(person_image: EncodedImage, outfit_image: EncodedImage) -> Self {
        Self {
            person_image,
            outfit_image,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.person_image.is_empty() && !self.outfit_image.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub base64: String,
    pub media_type: String,
}

impl GeneratedImage {
    pub fn to_data_uri(&self) -> EncodedImage {
        EncodedImage::from_base64(&self.base64, &self.media_type)
    }
}

/// Response body of the generation endpoint: an image or an error, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationResult {
    Success {
        image: GeneratedImage,
        #[serde(default)]
        text: String,
    },
    Failure {
        error: String,
    },
}

impl GenerationResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            error: message.into(),
        }
    }

    pub fn image(&self) -> Option<&GeneratedImage> {
        match self {
            Self::Success { image, .. } => Some(image),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error.as_str()),
        }
    }
}
