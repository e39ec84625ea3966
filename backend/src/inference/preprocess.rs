use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};

use super::model::{IMAGE_SIZE, InputTensor};

const DATA_URL_MARKER: &str = "data:image";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Data URL has no ',' separating the header from the payload")]
    MalformedDataUrl,
    #[error("Invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Resampling used when squashing uploads to the model's input size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    #[default]
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Strips a leading `data:image/...,` header, leaving the base64 payload.
pub fn strip_data_url(image: &str) -> Result<&str, DecodeError> {
    if !image.starts_with(DATA_URL_MARKER) {
        return Ok(image);
    }
    image
        .split_once(',')
        .map(|(_, payload)| payload)
        .ok_or(DecodeError::MalformedDataUrl)
}

fn is_base64_symbol(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')
}

/// Non-alphabet characters (line breaks, stray punctuation) are skipped
/// before decoding; padding is still required.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, DecodeError> {
    let compact: String = payload.chars().filter(|&c| is_base64_symbol(c)).collect();
    Ok(STANDARD.decode(compact)?)
}

/// 16-bit samples clip at 255 rather than being rescaled.
fn clip_luma16(samples: impl Fn(u32, u32) -> u16, width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([samples(x, y).min(u16::from(u8::MAX)) as u8])
    })
}

/// ITU-R 601-2 luma with the fixed-point rounding the model's training
/// pipeline used, so gray levels match what the network saw.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        DynamicImage::ImageLumaA8(_) => image.to_luma8(),
        DynamicImage::ImageLuma16(gray) => clip_luma16(
            |x, y| gray.get_pixel(x, y).0[0],
            gray.width(),
            gray.height(),
        ),
        DynamicImage::ImageLumaA16(gray) => clip_luma16(
            |x, y| gray.get_pixel(x, y).0[0],
            gray.width(),
            gray.height(),
        ),
        _ => {
            let rgb = image.to_rgb8();
            GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                let [r, g, b] = rgb.get_pixel(x, y).0;
                let weighted =
                    u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000;
                let luma = weighted >> 16;
                Luma([luma as u8])
            })
        }
    }
}

/// Turns an upload into the model's input tensor. Pixel values stay in
/// 0..=255: the model was trained on unnormalized intensities.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor {
    filter: ResizeFilter,
}

impl Preprocessor {
    pub fn new(filter: ResizeFilter) -> Self {
        Self { filter }
    }

    pub fn resize(&self, gray: &GrayImage) -> GrayImage {
        let side = IMAGE_SIZE as u32;
        if gray.dimensions() == (side, side) {
            return gray.clone();
        }
        imageops::resize(gray, side, side, self.filter.into())
    }

    pub fn to_tensor(gray: &GrayImage) -> InputTensor {
        InputTensor::from_shape_fn(
            (1, gray.height() as usize, gray.width() as usize, 1),
            |(_, y, x, _)| f32::from(gray.get_pixel(x as u32, y as u32).0[0]),
        )
    }

    pub fn prepare(&self, image: &DynamicImage) -> InputTensor {
        let gray = to_grayscale(image);
        let resized = self.resize(&gray);
        Self::to_tensor(&resized)
    }
}
