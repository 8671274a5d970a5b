//! Image → model-ready `[1, 3, N, N]` float tensor.
//!
//! The tensor contract shared by both classifiers:
//!
//! - stretch-resize to `N×N` (aspect ratio is not preserved),
//! - planar layout, channel-major then row-major within a channel,
//! - plane order **R, G, B** (RGBA bytes 0, 1, 2; alpha is dropped),
//! - each plane standardised as `(byte / 255 − mean_c) / std_c`.

use crate::face_image::FaceImage;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use ndarray::{Array4, ShapeError};

/// Side length of the liveness model input.
pub const LIVENESS_INPUT_SIZE: u32 = 224;
/// Side length of the occlusion model input.
pub const OCCLUSION_INPUT_SIZE: u32 = 224;

// ImageNet statistics, RGB order.
pub const CHANNEL_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const CHANNEL_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// RGBA byte offset read for each tensor plane.
pub const CHANNEL_BYTE_OFFSET: [usize; 3] = [0, 1, 2];

const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Planar `[1, 3, N, N]` f32 tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Vec<f32>,
    size: usize,
}

impl NormalizedTensor {
    /// NCHW shape.
    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.size, self.size]
    }

    pub fn side(&self) -> usize {
        self.size
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// One channel plane (0 = R, 1 = G, 2 = B); `None` past the last channel.
    pub fn plane(&self, channel: usize) -> Option<&[f32]> {
        let plane_len = self.size * self.size;
        self.data.get(channel * plane_len..(channel + 1) * plane_len)
    }

    /// Copy into an `ndarray` tensor for the inference engine.
    pub fn to_array(&self) -> Result<Array4<f32>, ShapeError> {
        Array4::from_shape_vec((1, 3, self.size, self.size), self.data.clone())
    }
}

/// Resize `image` to `size × size` and normalise it.
///
/// Returns `None` when the raster cannot be produced at exactly the requested
/// size; callers map that to their stage's image-processing failure.
pub fn normalize(image: &FaceImage, size: u32) -> Option<NormalizedTensor> {
    if size == 0 || !image.has_pixel_data() {
        return None;
    }

    let rgba = image.pixels().to_rgba8();
    let resized = imageops::resize(&rgba, size, size, RESIZE_FILTER);
    normalize_rgba(&resized, size)
}

/// Normalise an RGBA raster that is already `size × size`.
pub fn normalize_rgba(raster: &RgbaImage, size: u32) -> Option<NormalizedTensor> {
    if raster.width() != size || raster.height() != size {
        return None;
    }

    let side = size as usize;
    let plane_len = side * side;
    let bytes = raster.as_raw();
    if bytes.len() != plane_len * 4 {
        return None;
    }

    let mut data = Vec::with_capacity(3 * plane_len);
    for (channel, &offset) in CHANNEL_BYTE_OFFSET.iter().enumerate() {
        let mean = CHANNEL_MEAN[channel];
        let std = CHANNEL_STD[channel];
        data.extend(
            bytes
                .chunks_exact(4)
                .map(|px| (px[offset] as f32 / 255.0 - mean) / std),
        );
    }

    Some(NormalizedTensor { data, size: side })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba};

    fn uniform(w: u32, h: u32, px: [u8; 4]) -> FaceImage {
        FaceImage::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba(px))))
    }

    #[test]
    fn output_length_is_three_planes() {
        let tensor = normalize(&uniform(300, 120, [10, 20, 30, 255]), 224).unwrap();
        assert_eq!(tensor.len(), 3 * 224 * 224);
        assert_eq!(tensor.shape(), [1, 3, 224, 224]);
    }

    #[test]
    fn uniform_gray_normalizes_per_channel() {
        let tensor = normalize(&uniform(100, 100, [128, 128, 128, 255]), 32).unwrap();
        for c in 0..3 {
            let expected = (128.0f32 / 255.0 - CHANNEL_MEAN[c]) / CHANNEL_STD[c];
            assert!(tensor.plane(c).unwrap().iter().all(|&v| v == expected), "channel {c}");
        }
    }

    #[test]
    fn planes_are_rgb_ordered() {
        let tensor = normalize(&uniform(80, 80, [255, 0, 51, 7]), 16).unwrap();
        let r = (1.0 - CHANNEL_MEAN[0]) / CHANNEL_STD[0];
        let g = (0.0 - CHANNEL_MEAN[1]) / CHANNEL_STD[1];
        let b = (0.2 - CHANNEL_MEAN[2]) / CHANNEL_STD[2];
        assert!((tensor.plane(0).unwrap()[0] - r).abs() < 1e-6);
        assert!((tensor.plane(1).unwrap()[0] - g).abs() < 1e-6);
        assert!((tensor.plane(2).unwrap()[0] - b).abs() < 1e-6);
    }

    #[test]
    fn row_major_within_plane() {
        let mut raster = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        raster.put_pixel(3, 1, Rgba([255, 0, 0, 255]));
        let tensor = normalize_rgba(&raster, 4).unwrap();
        let hot = (1.0 - CHANNEL_MEAN[0]) / CHANNEL_STD[0];
        assert_eq!(tensor.plane(0).unwrap()[4 + 3], hot);
        assert_ne!(tensor.plane(0).unwrap()[3 * 4 + 1], hot);
    }

    #[test]
    fn rejects_wrong_raster_size() {
        let raster = RgbaImage::new(8, 9);
        assert!(normalize_rgba(&raster, 8).is_none());
    }

    #[test]
    fn deterministic() {
        let img = uniform(90, 70, [3, 140, 250, 255]);
        assert_eq!(normalize(&img, 24), normalize(&img, 24));
    }

    #[test]
    fn ndarray_view_matches_planar_layout() {
        let mut raster = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        raster.put_pixel(1, 0, Rgba([0, 255, 0, 255]));
        let tensor = normalize_rgba(&raster, 2).unwrap();
        let array = tensor.to_array().unwrap();
        assert_eq!(array[[0, 1, 0, 1]], tensor.plane(1).unwrap()[1]);
        assert_eq!(array.shape(), &[1, 3, 2, 2]);
    }

    #[test]
    fn plane_past_blue_is_none() {
        let tensor = normalize_rgba(&RgbaImage::new(2, 2), 2).unwrap();
        assert_eq!(tensor.plane(2).map(<[f32]>::len), Some(4));
        assert!(tensor.plane(3).is_none());
    }
}
