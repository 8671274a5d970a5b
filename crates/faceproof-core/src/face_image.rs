//! Caller-owned face image and the validation gate.

use crate::error::PipelineError;
use image::{DynamicImage, RgbaImage};
use std::path::Path;

/// Both axes must be strictly greater than this.
pub const MIN_SIZE: u32 = 64;
/// Both axes must be strictly less than this.
pub const MAX_SIZE: u32 = 4096;

/// Decoded pixel data handed to the pipeline. The pipeline only borrows it.
#[derive(Debug, Clone)]
pub struct FaceImage {
    pixels: DynamicImage,
}

impl FaceImage {
    pub fn new(pixels: DynamicImage) -> Self {
        Self { pixels }
    }

    /// Wrap a raw RGBA8 buffer. Returns `None` if the buffer is shorter than
    /// `width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, data).map(|buf| Self::new(DynamicImage::ImageRgba8(buf)))
    }

    /// Decode an encoded image (PNG, JPEG, ...) from memory.
    pub fn decode(bytes: &[u8]) -> Result<Self, PipelineError> {
        image::load_from_memory(bytes)
            .map(Self::new)
            .map_err(|e| PipelineError::invalid_image("image data is not decodable").with_source(e))
    }

    /// Decode an image file.
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        image::open(path).map(Self::new).map_err(|e| {
            PipelineError::invalid_image(format!("cannot decode {}", path.display())).with_source(e)
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    /// Whether any pixel data backs this image.
    pub fn has_pixel_data(&self) -> bool {
        !self.pixels.as_bytes().is_empty()
    }
}

impl From<DynamicImage> for FaceImage {
    fn from(pixels: DynamicImage) -> Self {
        Self::new(pixels)
    }
}

/// Fail-closed validity predicate: pixel data present and
/// `MIN_SIZE < width, height < MAX_SIZE`.
pub fn is_valid(image: &FaceImage) -> bool {
    image_problem(image).is_none()
}

/// Validation gate. Runs before every other stage.
pub fn validate(image: &FaceImage) -> Result<(), PipelineError> {
    match image_problem(image) {
        None => Ok(()),
        Some(problem) => Err(PipelineError::invalid_image(problem)),
    }
}

fn image_problem(image: &FaceImage) -> Option<String> {
    if !image.has_pixel_data() {
        return Some("image has no pixel data".to_string());
    }

    let (w, h) = (image.width(), image.height());
    let in_bounds = |v: u32| v > MIN_SIZE && v < MAX_SIZE;
    if !in_bounds(w) || !in_bounds(h) {
        return Some(format!(
            "image is {w}x{h}; both sides must be in ({MIN_SIZE}, {MAX_SIZE})"
        ));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn gray(w: u32, h: u32) -> FaceImage {
        FaceImage::from_rgba(w, h, vec![128; (w * h * 4) as usize]).unwrap()
    }

    #[test]
    fn accepts_typical_selfie() {
        assert!(is_valid(&gray(480, 640)));
        assert!(validate(&gray(480, 640)).is_ok());
    }

    #[test]
    fn boundaries_are_exclusive() {
        assert!(!is_valid(&gray(64, 200)));
        assert!(!is_valid(&gray(200, 64)));
        assert!(is_valid(&gray(65, 65)));
        assert!(is_valid(&gray(4095, 65)));
        assert!(!is_valid(&gray(4096, 65)));
    }

    #[test]
    fn empty_image_is_invalid() {
        let empty = FaceImage::new(DynamicImage::ImageRgba8(RgbaImage::new(0, 0)));
        assert!(!empty.has_pixel_data());
        let err = validate(&empty).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidImage);
    }

    #[test]
    fn short_buffer_is_rejected() {
        assert!(FaceImage::from_rgba(100, 100, vec![0; 10]).is_none());
    }

    #[test]
    fn undecodable_bytes_are_invalid_image() {
        let err = FaceImage::decode(b"not an image").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidImage);
    }
}
