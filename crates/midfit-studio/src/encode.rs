use std::thread;

use midfit_contracts::{EncodedImage, GenerationRequest};

use crate::error::WorkflowError;
use crate::slots::ImageFile;

pub fn encode_file(file: &ImageFile) -> Result<EncodedImage, WorkflowError> {
    if file.bytes().is_empty() {
        return Err(WorkflowError::Encode(file.name().to_string()));
    }
    Ok(EncodedImage::from_bytes(file.bytes(), file.media_type()))
}

/// Encodes both inputs on scoped threads. Both must finish before the
/// request exists; either failure fails the pair.
pub fn encode_pair(
    person: &ImageFile,
    outfit: &ImageFile,
) -> Result<GenerationRequest, WorkflowError> {
    thread::scope(|scope| {
        let person_job = scope.spawn(|| encode_file(person));
        let outfit_job = scope.spawn(|| encode_file(outfit));
        let person_image = person_job
            .join()
            .map_err(|_| WorkflowError::Encode(person.name().to_string()))??;
        let outfit_image = outfit_job
            .join()
            .map_err(|_| WorkflowError::Encode(outfit.name().to_string()))??;
        Ok(GenerationRequest::new(person_image, outfit_image))
    })
}
