use midfit_contracts::EncodedImage;

use crate::capability::{ContentPart, Message, ModelRequest, Role};

/// Fixed try-on instruction. Sent verbatim on every request.
pub const TRY_ON_INSTRUCTION: &str = "You are a professional fashion photo editor. Two images follow.

IMAGE 1 (Person): a photo of a person. Keep everything about this person exactly as it is: face, facial features, skin tone, hair, body type, body proportions, pose, stance, background, lighting and overall composition.

IMAGE 2 (Outfit): the outfit or clothing to apply.

TASK: Produce a new image showing the exact same person from Image 1, with the same face, body, pose, background and lighting, now wearing the outfit from Image 2. The clothing must fit the body naturally and follow the lighting and perspective of the original photo. The result must look like a real, unedited photograph, not a collage or an obvious edit. Do not change the face, hair, skin, body shape, pose or background. Only change what the person is wearing.";

/// Builds the single-message request: instruction, then person, then outfit.
pub fn build_try_on_request(
    model: &str,
    person_image: &EncodedImage,
    outfit_image: &EncodedImage,
) -> ModelRequest {
    ModelRequest {
        model: model.to_string(),
        messages: vec![Message {
            role: Role::User,
            content: vec![
                ContentPart::Text {
                    text: TRY_ON_INSTRUCTION.to_string(),
                },
                ContentPart::Image {
                    image: person_image.clone(),
                },
                ContentPart::Image {
                    image: outfit_image.clone(),
                },
            ],
        }],
    }
}
