//! Profile-picture upload boundary.
//!
//! Uploads are checked here (image mimetype, at most 5 MB) and turned into a
//! `data:` URL before anything reaches the credential store, which enforces
//! no limits of its own.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Largest accepted upload. Exactly this size is allowed.
pub const MAX_PICTURE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PictureError {
    #[error("please select a valid image file (got '{mime}')")]
    NotAnImage { mime: String },
    #[error("file size must be less than 5MB (got {size} bytes)")]
    TooLarge { size: usize },
    #[error("picture file is empty")]
    Empty,
}

/// A picture selected by the user, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureUpload {
    mime: String,
    bytes: Vec<u8>,
}

impl PictureUpload {
    #[must_use]
    pub fn new(mime: &str, bytes: Vec<u8>) -> Self {
        Self { mime: mime.trim().to_ascii_lowercase(), bytes }
    }

    #[must_use]
    pub fn mime(&self) -> &str {
        &self.mime
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Apply the boundary checks.
    ///
    /// # Errors
    ///
    /// [`PictureError::NotAnImage`] for a non-`image/*` mimetype,
    /// [`PictureError::TooLarge`] above [`MAX_PICTURE_BYTES`], and
    /// [`PictureError::Empty`] for a zero-byte file.
    pub fn validate(&self) -> Result<(), PictureError> {
        if !self.mime.starts_with("image/") {
            return Err(PictureError::NotAnImage { mime: self.mime.clone() });
        }
        if self.bytes.len() > MAX_PICTURE_BYTES {
            return Err(PictureError::TooLarge { size: self.bytes.len() });
        }
        if self.bytes.is_empty() {
            return Err(PictureError::Empty);
        }
        Ok(())
    }

    /// Validate and encode as a `data:<mime>;base64,...` URL.
    ///
    /// # Errors
    ///
    /// Same as [`PictureUpload::validate`].
    pub fn into_data_url(self) -> Result<String, PictureError> {
        self.validate()?;
        Ok(format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes)))
    }
}

/// Guess an image mimetype from a file extension. Non-image extensions
/// return `None`.
#[must_use]
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "bmp" => Some("image/bmp"),
        "avif" => Some("image/avif"),
        _ => None,
    }
}

#[cfg(test)]
#[path = "picture_test.rs"]
mod tests;
