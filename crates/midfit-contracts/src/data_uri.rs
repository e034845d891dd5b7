use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// An image serialized as `data:<mediaType>;base64,<payload>` for JSON transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage {
    data: String,
}

/// Borrowed view over the two halves of a base64 data URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataUri<'a> {
    pub media_type: &'a str,
    pub payload: &'a str,
}

impl EncodedImage {
    pub fn from_bytes(bytes: &[u8], media_type: &str) -> Self {
        Self::from_base64(&BASE64.encode(bytes), media_type)
    }

    pub fn from_base64(payload: &str, media_type: &str) -> Self {
        Self {
            data: format!("data:{};base64,{}", media_type.trim(), payload.trim()),
        }
    }

    /// Wraps an already-encoded string without validating it.
    pub fn from_data(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.data
    }

    pub fn into_string(self) -> String {
        self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.trim().is_empty()
    }

    pub fn parts(&self) -> Result<DataUri<'_>> {
        parse_data_uri(&self.data)
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        let parts = self.parts()?;
        BASE64
            .decode(parts.payload.as_bytes())
            .context("data URI base64 decode failed")
    }
}

impl From<String> for EncodedImage {
    fn from(data: String) -> Self {
        Self::from_data(data)
    }
}

pub fn parse_data_uri(raw: &str) -> Result<DataUri<'_>> {
    let trimmed = raw.trim();
    let rest = trimmed
        .strip_prefix("data:")
        .ok_or_else(|| anyhow!("not a data URI"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| anyhow!("data URI has no payload separator"))?;
    let mut params = meta.split(';');
    let media_type = params.next().map(str::trim).unwrap_or_default();
    if !params.any(|param| param.trim().eq_ignore_ascii_case("base64")) {
        bail!("data URI is not base64 encoded");
    }
    if media_type.is_empty() {
        bail!("data URI is missing a media type");
    }
    Ok(DataUri {
        media_type,
        payload: payload.trim(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_builds_self_describing_uri() {
        let encoded = EncodedImage::from_bytes(b"abc", "image/png");
        assert_eq!(encoded.as_str(), "data:image/png;base64,YWJj");
        assert!(!encoded.is_empty());
    }

    #[test]
    fn parts_split_media_type_and_payload() -> anyhow::Result<()> {
        let encoded = EncodedImage::from_data("data:image/jpeg;base64,AAA=");
        let parts = encoded.parts()?;
        assert_eq!(parts.media_type, "image/jpeg");
        assert_eq!(parts.payload, "AAA=");
        Ok(())
    }

    #[test]
    fn parse_accepts_extra_parameters_before_base64_marker() -> anyhow::Result<()> {
        let parts = parse_data_uri("data:image/webp;name=look.webp;base64,UklG")?;
        assert_eq!(parts.media_type, "image/webp");
        assert_eq!(parts.payload, "UklG");
        Ok(())
    }

    #[test]
    fn decode_recovers_original_bytes() -> anyhow::Result<()> {
        let encoded = EncodedImage::from_bytes(&[0x89, b'P', b'N', b'G'], "image/png");
        assert_eq!(encoded.decode()?, vec![0x89, b'P', b'N', b'G']);
        Ok(())
    }

    #[test]
    fn parse_rejects_malformed_inputs() {
        assert!(parse_data_uri("image/png;base64,AAA").is_err());
        assert!(parse_data_uri("data:image/png;base64").is_err());
        assert!(parse_data_uri("data:image/png,plain").is_err());
        assert!(parse_data_uri("data:;base64,AAA").is_err());
    }

    #[test]
    fn serializes_as_plain_string() -> anyhow::Result<()> {
        let encoded = EncodedImage::from_base64("AAA", "image/png");
        let value = serde_json::to_value(&encoded)?;
        assert_eq!(value, serde_json::json!("data:image/png;base64,AAA"));
        Ok(())
    }
}
