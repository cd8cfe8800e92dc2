//!
//! # Telescope aperture
//!
//! The telescope pupil is a binary mask over the detector frame: a wavefront sample goes
//! through the telescope unchanged where the mask is set and is zeroed elsewhere.
//!
//! The mask is either read from an image file (any non-zero pixel is inside the pupil) or
//! generated as a centered disk:
//! ```
//! use aosim::{Builder, FromBuilder, Telescope, Wavefront};
//! let mut tel = Telescope::builder().resolution(32, 32).circular(0.5).build().unwrap();
//! let mut wf = Wavefront::new(32, 32);
//! wf.flat(1.).through(&mut tel);
//! assert_eq!(wf.phase().iter().filter(|&&x| x > 0.).count(), tel.n_inside());
//! ```

use std::path::PathBuf;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{image_io::ImageData, Builder, FromBuilder, Propagation, Wavefront};

#[derive(Debug, thiserror::Error)]
pub enum TelescopeError {
    #[error("aperture is {aperture:?} but the frame is {frame:?}")]
    Size {
        aperture: (usize, usize),
        frame: (usize, usize),
    },
    #[error("aperture radius must be in ]0,1], found {0}")]
    Radius(f64),
}

/// Pupil shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aperture {
    /// every pixel of the frame
    Open,
    /// a centered disk, the radius is a fraction of half the smallest frame dimension
    Circular(f64),
    /// a mask image file
    File(PathBuf),
}

/// [`Telescope`] builder type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelescopeBuilder {
    /// Frame resolution as (width,height)
    pub resolution: (usize, usize),
    pub aperture: Aperture,
    #[serde(skip)]
    mask: Option<ImageData>,
}
/// Default properties:
///  * resolution : 256x256
///  * aperture   : open
impl Default for TelescopeBuilder {
    fn default() -> Self {
        Self {
            resolution: (256, 256),
            aperture: Aperture::Open,
            mask: None,
        }
    }
}
impl TelescopeBuilder {
    pub fn resolution(self, width: usize, height: usize) -> Self {
        Self {
            resolution: (width, height),
            ..self
        }
    }
    /// Sets a circular pupil of radius `radius` times half the smallest frame dimension
    pub fn circular(self, radius: f64) -> Self {
        Self {
            aperture: Aperture::Circular(radius),
            ..self
        }
    }
    /// Sets the aperture mask image file
    pub fn aperture_file<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            aperture: Aperture::File(path.into()),
            ..self
        }
    }
    /// Sets the aperture mask from an image in memory, takes precedence over the aperture
    pub fn mask(self, mask: ImageData) -> Self {
        Self {
            mask: Some(mask),
            ..self
        }
    }
}
impl Builder for TelescopeBuilder {
    type Component = Telescope;
    fn build(self) -> crate::Result<Telescope> {
        let (width, height) = self.resolution;
        let image = match (self.mask, &self.aperture) {
            (Some(image), _) => Some(image),
            (None, Aperture::File(path)) => Some(ImageData::load(path)?),
            _ => None,
        };
        let mask: Vec<bool> = match (image, &self.aperture) {
            (Some(image), _) => {
                if image.resolution() != self.resolution {
                    return Err(TelescopeError::Size {
                        aperture: image.resolution(),
                        frame: self.resolution,
                    }
                    .into());
                }
                image.samples.into_iter().map(|x| x > 0).collect()
            }
            (None, Aperture::Circular(radius)) => {
                if *radius <= 0. || *radius > 1. {
                    return Err(TelescopeError::Radius(*radius).into());
                }
                disk(width, height, *radius)
            }
            (None, _) => vec![true; width * height],
        };
        let tel = Telescope {
            width,
            height,
            mask,
        };
        log::info!(
            "Telescope: {}x{} aperture, {} pixels inside the pupil",
            width,
            height,
            tel.n_inside()
        );
        Ok(tel)
    }
}

// Legacy "telradius" generator
fn disk(width: usize, height: usize, radius: f64) -> Vec<bool> {
    let r = radius * width.min(height) as f64 * 0.5;
    let (xc, yc) = ((width as f64 - 1.) * 0.5, (height as f64 - 1.) * 0.5);
    (0..height)
        .flat_map(|i| (0..width).map(move |j| (i, j)))
        .map(|(i, j)| (j as f64 - xc).hypot(i as f64 - yc) <= r)
        .collect()
}

/// Telescope binary aperture
#[derive(Debug, Clone, PartialEq)]
pub struct Telescope {
    width: usize,
    height: usize,
    mask: Vec<bool>,
}
impl FromBuilder for Telescope {
    type ComponentBuilder = TelescopeBuilder;
}
impl Telescope {
    /// Returns the aperture resolution as (width,height)
    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }
    /// Returns the mask, row major
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }
    /// Returns true if pixel (`x`,`y`) is inside the pupil, false outside the frame
    pub fn is_inside(&self, x: usize, y: usize) -> bool {
        x < self.width && self.mask.get(y * self.width + x).copied().unwrap_or(false)
    }
    /// Returns the number of pixels inside the pupil
    pub fn n_inside(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }
    /// Returns the mask as a 0/255 image
    pub fn to_image(&self) -> ImageData {
        ImageData {
            samples: self.mask.iter().map(|&m| if m { 255 } else { 0 }).collect(),
            width: self.width,
            height: self.height,
        }
    }
}
impl Propagation for Telescope {
    /// Zeroes the wavefront outside the pupil
    ///
    /// The wavefront is left untouched if its size does not match the aperture
    fn propagate(&mut self, wavefront: &mut Wavefront) {
        if wavefront.resolution() != self.resolution() {
            log::warn!(
                "wavefront {:?} does not match the telescope aperture {:?}",
                wavefront.resolution(),
                self.resolution()
            );
            return;
        }
        wavefront
            .phase_mut()
            .par_iter_mut()
            .zip(self.mask.par_iter())
            .for_each(|(x, &m)| {
                if !m {
                    *x = 0.;
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimError;

    #[test]
    fn open() {
        let mut tel = Telescope::builder().resolution(8, 4).build().unwrap();
        assert_eq!(tel.n_inside(), 32);
        let mut wf = Wavefront::new(8, 4);
        wf.flat(3.).through(&mut tel);
        assert!(wf.phase().iter().all(|&x| x == 3.));
    }

    #[test]
    fn mask_image() {
        let samples: Vec<u8> = (0..16).map(|i| if i % 3 == 0 { 0 } else { 200 }).collect();
        let mask = ImageData::new(samples.clone(), 4, 4).unwrap();
        let mut tel = Telescope::builder()
            .resolution(4, 4)
            .mask(mask)
            .build()
            .unwrap();
        let mut wf = Wavefront::new(4, 4);
        wf.phase_mut()
            .iter_mut()
            .enumerate()
            .for_each(|(i, x)| *x = i as f32 + 1.);
        wf.through(&mut tel);
        for (i, (&x, &s)) in wf.phase().iter().zip(&samples).enumerate() {
            if s == 0 {
                assert_eq!(x, 0.);
            } else {
                assert_eq!(x, i as f32 + 1.);
            }
        }
    }

    #[test]
    fn disk_is_symmetric() {
        let tel = Telescope::builder()
            .resolution(33, 33)
            .circular(0.8)
            .build()
            .unwrap();
        assert!(tel.is_inside(16, 16));
        assert!(!tel.is_inside(0, 0));
        assert_eq!(tel.is_inside(3, 16), tel.is_inside(29, 16));
        assert_eq!(tel.is_inside(16, 3), tel.is_inside(16, 29));
        assert!(!tel.is_inside(40, 16));
        assert!(!tel.is_inside(16, 40));
        let n = tel.n_inside() as f64;
        let area = std::f64::consts::PI * (0.8f64 * 16.5).powi(2);
        assert!((n - area).abs() / area < 0.1);
    }

    #[test]
    fn wrong_size() {
        let tel = Telescope::builder()
            .resolution(8, 8)
            .mask(ImageData::filled(4, 4, 1))
            .build();
        assert!(matches!(
            tel,
            Err(SimError::Telescope(TelescopeError::Size { .. }))
        ));
    }
}
