//! Identification request contracts and pre-stream validation.
//!
//! Validation failures are classification errors: they are returned
//! synchronously with the HTTP response, never as stream events.

use crate::error::IdentifyError;
use serde::{Deserialize, Serialize};

pub const MIN_TEXT_LEN: usize = 3;
pub const MAX_TEXT_LEN: usize = 500;

/// Free-form text identification request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextIdentifyRequest {
    pub text: String,
}

/// Label-photo identification request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageIdentifyRequest {
    /// Base64-encoded image bytes
    pub image: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "supplementaryText", skip_serializing_if = "Option::is_none")]
    pub supplementary_text: Option<String>,
}

impl TextIdentifyRequest {
    /// Trim and validate. Returns the trimmed text on success.
    pub fn validate(&self) -> Result<String, IdentifyError> {
        let text = self.text.trim();
        // Bounds are character counts, not bytes. Accented input is common here.
        let chars = text.chars().count();
        if chars < MIN_TEXT_LEN {
            return Err(IdentifyError::Classification(format!(
                "Input too short: need at least {} characters",
                MIN_TEXT_LEN
            )));
        }
        if chars > MAX_TEXT_LEN {
            return Err(IdentifyError::Classification(format!(
                "Input too long: maximum {} characters",
                MAX_TEXT_LEN
            )));
        }
        if !text.chars().any(|c| c.is_alphanumeric()) {
            return Err(IdentifyError::Classification(
                "Input must contain at least one letter or digit".to_string(),
            ));
        }
        Ok(text.to_string())
    }
}

impl ImageIdentifyRequest {
    const SUPPORTED_MIME: &'static [&'static str] =
        &["image/jpeg", "image/png", "image/webp", "image/heic"];

    pub fn validate(&self) -> Result<(), IdentifyError> {
        if self.image.is_empty() {
            return Err(IdentifyError::Classification(
                "Image payload is empty".to_string(),
            ));
        }
        if !Self::SUPPORTED_MIME.contains(&self.mime_type.as_str()) {
            return Err(IdentifyError::Classification(format!(
                "Unsupported image type: {}",
                self.mime_type
            )));
        }
        Ok(())
    }
}
