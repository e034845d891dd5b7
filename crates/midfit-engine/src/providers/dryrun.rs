use std::io::Cursor;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use crate::capability::{GeneratedFile, ImageModel, ModelOutput, ModelRequest};

const DRYRUN_WIDTH: u32 = 96;
const DRYRUN_HEIGHT: u32 = 128;

/// Offline provider: a solid-colour PNG whose colour is derived from the request.
pub struct DryrunModel;

impl ImageModel for DryrunModel {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &ModelRequest) -> Result<ModelOutput> {
        let (r, g, b) = color_from_request(request)?;
        let mut image = RgbImage::new(DRYRUN_WIDTH, DRYRUN_HEIGHT);
        for pixel in image.pixels_mut() {
            *pixel = Rgb([r, g, b]);
        }
        let mut bytes = Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, ImageFormat::Png)
            .context("dryrun PNG encode failed")?;

        Ok(ModelOutput {
            files: vec![GeneratedFile {
                media_type: "image/png".to_string(),
                base64: BASE64.encode(bytes.into_inner()),
            }],
            text: format!("dryrun composite for {}", request.model.trim()),
        })
    }
}

fn color_from_request(request: &ModelRequest) -> Result<(u8, u8, u8)> {
    let payload = serde_json::to_vec(request).context("dryrun request serialization failed")?;
    let digest = Sha256::digest(payload);
    Ok((digest[0], digest[1], digest[2]))
}
