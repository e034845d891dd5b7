use anyhow::Result;
use midfit_contracts::EncodedImage;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    Text { text: String },
    Image { image: EncodedImage },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

/// One call to an external image model: a model id plus a multimodal conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<Message>,
}

impl ModelRequest {
    pub fn parts(&self) -> impl Iterator<Item = &ContentPart> {
        self.messages.iter().flat_map(|message| message.content.iter())
    }
}

/// An asset returned by the model. Not necessarily an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub media_type: String,
    pub base64: String,
}

impl GeneratedFile {
    pub fn is_image(&self) -> bool {
        self.media_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image/")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelOutput {
    pub files: Vec<GeneratedFile>,
    pub text: String,
}

/// The opaque generative capability the proxy delegates to.
///
/// Implementations perform exactly one upstream call per `generate` and do
/// not retry; a call that answers without images is still `Ok`.
pub trait ImageModel: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &ModelRequest) -> Result<ModelOutput>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn content_parts_serialize_with_type_tags() -> anyhow::Result<()> {
        let request = ModelRequest {
            model: "dryrun-image-1".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: vec![
                    ContentPart::Text {
                        text: "hello".to_string(),
                    },
                    ContentPart::Image {
                        image: EncodedImage::from_base64("AAA", "image/png"),
                    },
                ],
            }],
        };
        assert_eq!(
            serde_json::to_value(&request)?,
            json!({
                "model": "dryrun-image-1",
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "text", "text": "hello" },
                        { "type": "image", "image": "data:image/png;base64,AAA" },
                    ],
                }],
            })
        );
        assert_eq!(request.parts().count(), 2);
        Ok(())
    }

    #[test]
    fn image_detection_is_by_media_type_prefix() {
        let file = |media_type: &str| GeneratedFile {
            media_type: media_type.to_string(),
            base64: String::new(),
        };
        assert!(file("image/png").is_image());
        assert!(file(" IMAGE/webp").is_image());
        assert!(!file("text/plain").is_image());
        assert!(!file("application/json").is_image());
        assert!(!file("").is_image());
    }
}
