//!
//! # Shack-Hartmann wavefront sensor imaging
//!
//! Each lenslet of the array images the part of the wavefront falling onto its subaperture.
//! The image is the Fraunhofer diffraction pattern of the subaperture: the squared modulus of
//! the Fourier transform of the complex field `exp(i k φ)`, where `φ` is the wavefront phase
//! and `k` the seeing factor.
//! The field is zero-padded to twice the subaperture size before the transform and the
//! central half of the diffraction pattern is written back onto the subaperture.
//!
//! # Examples
//!
//! ```
//! use aosim::{Builder, FromBuilder, ShackHartmann, Wavefront};
//! let mut wfs = ShackHartmann::builder()
//!     .resolution(64, 64)
//!     .regular_grid(4, 4)
//!     .build()
//!     .unwrap();
//! let mut wf = Wavefront::new(64, 64);
//! wf.flat(32.).through(&mut wfs);
//! // the spot of a flat wavefront is at the center of its subaperture
//! assert_eq!(wf.phase()[8 * 64 + 8], 255.);
//! ```

use std::path::PathBuf;

use rustfft::num_complex::Complex64;

use crate::{FromBuilder, Propagation, Wavefront};

mod builder;
pub mod fft;
pub mod grid;
pub use builder::{GridSource, ShackHartmannBuilder};
pub use fft::{FftPlanCache, Wisdom};
pub use grid::{GridLayout, GridShape, Subaperture, SubapertureGrid};

#[derive(Debug, thiserror::Error)]
pub enum ShackHartmannError {
    #[error("subaperture #{0} at {1:?} is outside the {2:?} frame")]
    Grid(usize, Subaperture, (usize, usize)),
    #[error("subaperture at {0:?} is empty")]
    EmptySubaperture((usize, usize)),
    #[error("no subaperture in the lenslet array")]
    NoSubaperture,
    #[error("cannot read or write subaperture grid file {1}")]
    GridFile(#[source] csv::Error, PathBuf),
    #[error("cannot open FFT wisdom file {1}")]
    WisdomFile(#[source] std::io::Error, PathBuf),
    #[error("cannot (de)serialize FFT wisdom")]
    Wisdom(#[from] serde_pickle::Error),
    #[error("seeing factor must be in [0,1], found {0}")]
    Seeing(f64),
}

/// Shack-Hartmann wavefront sensor
pub struct ShackHartmann {
    width: usize,
    height: usize,
    grid: SubapertureGrid,
    seeing: f64,
    plans: FftPlanCache,
    field: Vec<Complex64>,
    image: Vec<f32>,
}
impl FromBuilder for ShackHartmann {
    type ComponentBuilder = ShackHartmannBuilder;
}
impl ShackHartmann {
    /// Returns the frame resolution as (width,height)
    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }
    pub fn grid(&self) -> &SubapertureGrid {
        &self.grid
    }
    pub fn seeing(&self) -> f64 {
        self.seeing
    }
    /// Sets the seeing factor, clamped to [0,1]
    pub fn set_seeing(&mut self, seeing: f64) -> &mut Self {
        if !(0. ..=1.).contains(&seeing) {
            log::warn!("seeing factor {} clamped to [0,1]", seeing);
        }
        self.seeing = seeing.clamp(0., 1.);
        self
    }
    /// Returns the last sensor image
    pub fn image(&self) -> &[f32] {
        &self.image
    }
    /// Returns the FFT plans
    pub fn plans(&self) -> &FftPlanCache {
        &self.plans
    }
    /// Computes the sensor image of the wavefront phase
    ///
    /// Subapertures with more than a quarter of their pixels at zero are vignetted and
    /// left dark; pixels outside the subapertures are zero.
    /// Images are scaled to [0,255] with the running minimum and maximum of the intensity
    /// over the subapertures already processed in this frame.
    pub fn process(&mut self, wavefront: &Wavefront) -> &[f32] {
        if wavefront.resolution() != self.resolution() {
            log::warn!(
                "wavefront {:?} does not match the Shack-Hartmann frame {:?}",
                wavefront.resolution(),
                self.resolution()
            );
            return &self.image;
        }
        let width = self.width;
        let phase = wavefront.phase();
        let seeing = self.seeing;
        self.image.fill(0.);
        let (mut min, mut max) = (0f64, 0f64);
        for subaperture in self.grid.iter() {
            let (sx, sy) = subaperture.size;
            let (x0, y0) = subaperture.corner;
            let zeropix = subaperture.pixels(width).filter(|&k| phase[k] == 0.).count();
            if zeropix > sx * sy / 4 {
                continue;
            }
            let (nx, ny) = (2 * sx, 2 * sy);
            self.field.clear();
            self.field.resize(nx * ny, Complex64::default());
            for ip in 0..sy {
                for jp in 0..sx {
                    let phi = seeing * phase[(y0 + ip) * width + x0 + jp] as f64;
                    self.field[(ip + ny / 4) * nx + jp + nx / 4] =
                        Complex64::new(phi.cos(), phi.sin());
                }
            }
            self.plans.plan(nx, ny).forward(&mut self.field);
            for z in self.field.iter_mut() {
                let tmp = z.norm_sqr();
                if tmp > max {
                    max = tmp;
                } else if tmp < min {
                    min = tmp;
                }
                z.re = tmp;
            }
            let range = max - min;
            for ip in ny / 4..3 * ny / 4 {
                for jp in nx / 4..3 * nx / 4 {
                    let v = self.field[((ip + ny / 2) % ny) * nx + (jp + nx / 2) % nx].re;
                    let pixel = (y0 + ip - ny / 4) * width + x0 + jp - nx / 4;
                    self.image[pixel] = if range > 0. {
                        (255. * (v - min) / range) as f32
                    } else {
                        0.
                    };
                }
            }
        }
        &self.image
    }
}
impl Propagation for ShackHartmann {
    /// Replaces the wavefront phase with the sensor image
    fn propagate(&mut self, wavefront: &mut Wavefront) {
        self.process(wavefront);
        if wavefront.resolution() == self.resolution() {
            wavefront.phase_mut().copy_from_slice(&self.image);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Builder;

    fn wfs(cells: usize) -> ShackHartmann {
        ShackHartmann::builder()
            .resolution(64, 64)
            .regular_grid(cells, cells)
            .build()
            .unwrap()
    }

    fn argmax(values: &[f32]) -> usize {
        values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap()
    }

    #[test]
    fn flat_spot_at_center() {
        let mut sh = wfs(2);
        let mut wf = Wavefront::new(64, 64);
        wf.flat(32.);
        let image = sh.process(&wf).to_vec();
        for subaperture in sh.grid().iter() {
            let (x0, y0) = subaperture.corner;
            let values: Vec<f32> = subaperture.pixels(64).map(|k| image[k]).collect();
            let k = argmax(&values);
            assert_eq!((k % 32, k / 32), (16, 16), "subaperture at {:?}", (x0, y0));
            assert_eq!(values.iter().filter(|&&v| v == values[k]).count(), 1);
        }
    }

    #[test]
    fn tilt_moves_spot() {
        let mut sh = ShackHartmann::builder()
            .resolution(32, 32)
            .regular_grid(1, 1)
            .seeing(1.)
            .build()
            .unwrap();
        let mut wf = Wavefront::new(32, 32);
        // 4 phase cycles over the 64 pixels of the padded field move the spot by 4 pixels
        wf.phase_mut().chunks_mut(32).for_each(|row| {
            row.iter_mut()
                .enumerate()
                .for_each(|(j, x)| *x = 1. + 2. * std::f32::consts::PI * 4. * j as f32 / 64.)
        });
        let k = argmax(sh.process(&wf));
        assert_eq!((k % 32, k / 32), (20, 16));
    }

    #[test]
    fn vignetted_subaperture_is_dark() {
        let mut sh = wfs(2);
        let mut wf = Wavefront::new(64, 64);
        wf.flat(32.);
        // zero 300 of the 1024 pixels of the upper left subaperture
        wf.phase_mut()
            .iter_mut()
            .enumerate()
            .filter(|(k, _)| k % 64 < 30 && k / 64 < 10)
            .for_each(|(_, x)| *x = 0.);
        let image = sh.process(&wf).to_vec();
        let grid = sh.grid().clone();
        let mut subapertures = grid.iter();
        let first = subapertures.next().unwrap();
        assert!(first.pixels(64).all(|k| image[k] == 0.));
        for subaperture in subapertures {
            assert!(subaperture.pixels(64).any(|k| image[k] > 0.));
        }
    }

    #[test]
    fn uncovered_pixels_are_zero() {
        let mut sh = ShackHartmann::builder()
            .resolution(64, 64)
            .subapertures(SubapertureGrid::new(vec![Subaperture::new((8, 8), (16, 16))]))
            .build()
            .unwrap();
        let mut wf = Wavefront::new(64, 64);
        wf.flat(10.).through(&mut sh);
        let inside: Vec<usize> = sh.grid().as_slice()[0].pixels(64).collect();
        assert!(wf
            .phase()
            .iter()
            .enumerate()
            .filter(|(k, _)| !inside.contains(k))
            .all(|(_, &x)| x == 0.));
        assert!(wf.phase().iter().all(|&x| (0. ..=255.).contains(&x)));
    }
}
