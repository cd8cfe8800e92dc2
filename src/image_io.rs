//!
//! # Calibration image files
//!
//! The phase screen, the telescope aperture and the actuator influence pattern are
//! 8 bits gray images (PGM or PNG).
//! A missing or corrupted file is fatal: the simulator cannot run without them.

use std::path::{Path, PathBuf};

use image::{ImageBuffer, Luma};

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image file {0} does not exist")]
    Missing(PathBuf),
    #[error("cannot decode image file {1}")]
    Decode(#[source] image::ImageError, PathBuf),
    #[error("cannot encode image file {1}")]
    Encode(#[source] image::ImageError, PathBuf),
    #[error("{len} samples do not fill a {width}x{height} image")]
    Size {
        len: usize,
        width: usize,
        height: usize,
    },
}

/// 8 bits gray image samples
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    pub samples: Vec<u8>,
    pub width: usize,
    pub height: usize,
}
impl ImageData {
    /// Creates an image from row major samples
    pub fn new(samples: Vec<u8>, width: usize, height: usize) -> Result<Self, ImageError> {
        if samples.len() != width * height {
            return Err(ImageError::Size {
                len: samples.len(),
                width,
                height,
            });
        }
        Ok(Self {
            samples,
            width,
            height,
        })
    }
    /// Creates an image with all the samples set to `value`
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            samples: vec![value; width * height],
            width,
            height,
        }
    }
    /// Loads an image from a file, color images are converted to gray levels
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ImageError> {
        load(path)
    }
    /// Returns the image resolution as (width,height)
    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }
    /// Saves the image, the format is deduced from the file extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ImageError> {
        save_u8_image(&self.samples, self.width, self.height, path)
    }
}

/// Loads an image file into an [ImageData]
pub fn load<P: AsRef<Path>>(path: P) -> Result<ImageData, ImageError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ImageError::Missing(path.to_path_buf()));
    }
    let gray = image::open(path)
        .map_err(|e| ImageError::Decode(e, path.to_path_buf()))?
        .into_luma8();
    let (width, height) = gray.dimensions();
    log::debug!("loaded {:?}: {}x{}", path, width, height);
    ImageData::new(gray.into_raw(), width as usize, height as usize)
}

/// Saves 8 bits samples to an image file
pub fn save_u8_image<P: AsRef<Path>>(
    samples: &[u8],
    width: usize,
    height: usize,
    path: P,
) -> Result<(), ImageError> {
    let buffer: ImageBuffer<Luma<u8>, Vec<u8>> =
        ImageBuffer::from_raw(width as u32, height as u32, samples.to_vec()).ok_or(
            ImageError::Size {
                len: samples.len(),
                width,
                height,
            },
        )?;
    buffer
        .save(&path)
        .map_err(|e| ImageError::Encode(e, path.as_ref().to_path_buf()))
}

/// Saves 16 bits samples to an image file
pub fn save_u16_image<P: AsRef<Path>>(
    samples: &[u16],
    width: usize,
    height: usize,
    path: P,
) -> Result<(), ImageError> {
    let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(width as u32, height as u32, samples.to_vec()).ok_or(
            ImageError::Size {
                len: samples.len(),
                width,
                height,
            },
        )?;
    buffer
        .save(&path)
        .map_err(|e| ImageError::Encode(e, path.as_ref().to_path_buf()))
}
