use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{Builder, Frame, FromBuilder, Wavefront};

#[derive(Debug, thiserror::Error)]
pub enum CcdError {
    #[error("bit depth must be in [1,16], found {0}")]
    BitDepth(u8),
    #[error("exposure must be positive, found {0}")]
    Exposure(f64),
}

/// [`Ccd`] builder type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CcdBuilder {
    pub exposure: f64,
    pub offset: f64,
    pub gain: f64,
    /// Amplitude of the uniform noise
    pub noise: f64,
    pub bit_depth: u8,
    pub seed: u64,
}
/// Default properties:
///  * exposure  : 1
///  * offset    : 0
///  * gain      : 1
///  * noise     : 0
///  * bit depth : 8
///  * seed      : 0
impl Default for CcdBuilder {
    fn default() -> Self {
        Self {
            exposure: 1.,
            offset: 0.,
            gain: 1.,
            noise: 0.,
            bit_depth: 8,
            seed: 0,
        }
    }
}
impl CcdBuilder {
    pub fn exposure(self, exposure: f64) -> Self {
        Self { exposure, ..self }
    }
    pub fn offset(self, offset: f64) -> Self {
        Self { offset, ..self }
    }
    pub fn gain(self, gain: f64) -> Self {
        Self { gain, ..self }
    }
    pub fn noise(self, noise: f64) -> Self {
        Self { noise, ..self }
    }
    pub fn bit_depth(self, bit_depth: u8) -> Self {
        Self { bit_depth, ..self }
    }
    pub fn seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }
}
impl Builder for CcdBuilder {
    type Component = Ccd;
    fn build(self) -> crate::Result<Ccd> {
        if !(1..=16).contains(&self.bit_depth) {
            return Err(CcdError::BitDepth(self.bit_depth).into());
        }
        if !(self.exposure >= 0.) {
            return Err(CcdError::Exposure(self.exposure).into());
        }
        log::info!(
            "Ccd: {} bits, exposure: {}, offset: {}, noise: {}",
            self.bit_depth,
            self.exposure,
            self.offset,
            self.noise
        );
        Ok(Ccd {
            exposure: self.exposure,
            offset: self.offset,
            gain: self.gain,
            noise: self.noise.abs(),
            bit_depth: self.bit_depth,
            rng: StdRng::seed_from_u64(self.seed),
        })
    }
}

/// CCD detector model
///
/// Scales the sensor image by the exposure, adds the offset and the noise and saturates
/// the result to the bit depth of the detector.
/// The gain is recorded but does not change the image.
pub struct Ccd {
    exposure: f64,
    offset: f64,
    gain: f64,
    noise: f64,
    bit_depth: u8,
    rng: StdRng,
}
impl FromBuilder for Ccd {
    type ComponentBuilder = CcdBuilder;
}
impl Ccd {
    pub fn exposure(&self) -> f64 {
        self.exposure
    }
    pub fn offset(&self) -> f64 {
        self.offset
    }
    pub fn gain(&self) -> f64 {
        self.gain
    }
    pub fn noise(&self) -> f64 {
        self.noise
    }
    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }
    /// Returns the saturation value `2^bit_depth-1`
    pub fn max_value(&self) -> u16 {
        ((1u32 << self.bit_depth) - 1) as u16
    }
    pub fn set_exposure(&mut self, exposure: f64) -> &mut Self {
        if exposure >= 0. {
            self.exposure = exposure;
        } else {
            log::warn!("Ccd: negative exposure {} ignored", exposure);
        }
        self
    }
    pub fn set_offset(&mut self, offset: f64) -> &mut Self {
        self.offset = offset;
        self
    }
    pub fn set_gain(&mut self, gain: f64) -> &mut Self {
        self.gain = gain;
        self
    }
    pub fn set_noise(&mut self, noise: f64) -> &mut Self {
        self.noise = noise.abs();
        self
    }
    /// Records the sensor image into the frame
    pub fn capture(&mut self, image: &Wavefront, frame: &mut Frame) {
        let (width, height) = image.resolution();
        frame.resize(width, height, self.bit_depth);
        let max = self.max_value() as f64;
        let (exposure, offset) = (self.exposure, self.offset);
        frame
            .data
            .par_iter_mut()
            .zip(image.phase().par_iter())
            .for_each(|(pixel, &x)| {
                *pixel = ((x as f64 * exposure).round() + offset).clamp(0., max) as u16;
            });
        self.add_noise(frame);
        frame.update_stats();
    }
    // A pixel that would saturate with the noise keeps its noiseless value
    fn add_noise(&mut self, frame: &mut Frame) {
        if self.noise <= 0. {
            return;
        }
        let max = self.max_value() as f64;
        for pixel in frame.data.iter_mut() {
            let noisy = *pixel as f64 + (self.rng.gen::<f64>() * self.noise).floor();
            if noisy <= max {
                *pixel = noisy as u16;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimError;

    fn ramp() -> Wavefront {
        let mut wf = Wavefront::new(16, 16);
        wf.phase_mut()
            .iter_mut()
            .enumerate()
            .for_each(|(i, x)| *x = i as f32);
        wf
    }

    #[test]
    fn exposure_and_offset() {
        let mut ccd = Ccd::builder().exposure(0.5).offset(3.).build().unwrap();
        let mut frame = Frame::default();
        ccd.capture(&ramp(), &mut frame);
        assert_eq!(frame.resolution(), (16, 16));
        assert_eq!(frame.data[0], 3);
        assert_eq!(frame.data[10], 8);
        assert_eq!(frame.data[255], 131);
        assert_eq!(frame.stats.min, 3.);
    }

    #[test]
    fn monotonic_and_bounded() {
        let wf = ramp();
        for bit_depth in [4u8, 8, 12] {
            let mut previous: Option<Frame> = None;
            for exposure in [0., 0.1, 0.5, 1., 2., 10., 100.] {
                let mut ccd = Ccd::builder()
                    .exposure(exposure)
                    .offset(-2.)
                    .bit_depth(bit_depth)
                    .build()
                    .unwrap();
                let mut frame = Frame::default();
                ccd.capture(&wf, &mut frame);
                assert!(frame.data.iter().all(|&x| x <= ccd.max_value()));
                if let Some(previous) = previous {
                    assert!(frame.data.iter().zip(&previous.data).all(|(a, b)| a >= b));
                }
                previous = Some(frame);
            }
        }
    }

    #[test]
    fn noise_never_decreases_a_pixel() {
        // noise that would overflow the bit depth is dropped, not clipped
        let wf = ramp();
        let mut clean = Frame::default();
        Ccd::builder().build().unwrap().capture(&wf, &mut clean);
        let mut ccd = Ccd::builder().noise(20.).seed(3).build().unwrap();
        let mut noisy = Frame::default();
        ccd.capture(&wf, &mut noisy);
        assert!(noisy.data.iter().zip(&clean.data).all(|(n, c)| n >= c));
        assert!(noisy.data.iter().zip(&clean.data).any(|(n, c)| n > c));
        assert!(noisy.data.iter().all(|&x| x <= 255));
        assert_eq!(noisy.data[255], 255);
    }

    #[test]
    fn huge_noise_keeps_noiseless_values() {
        let mut wf = Wavefront::new(8, 8);
        wf.flat(100.);
        let mut ccd = Ccd::builder().noise(5e9).seed(1).build().unwrap();
        let mut frame = Frame::default();
        ccd.capture(&wf, &mut frame);
        assert!(frame.data.iter().all(|&x| x >= 100 && x <= 255));
        ccd.set_noise(f64::MAX);
        ccd.capture(&wf, &mut frame);
        assert!(frame.data.iter().all(|&x| x == 100));
    }

    #[test]
    fn reproducible_noise() {
        let wf = ramp();
        let mut a = Frame::default();
        let mut b = Frame::default();
        Ccd::builder().noise(8.).seed(11).build().unwrap().capture(&wf, &mut a);
        Ccd::builder().noise(8.).seed(11).build().unwrap().capture(&wf, &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_bit_depth() {
        assert!(matches!(
            Ccd::builder().bit_depth(17).build(),
            Err(SimError::Ccd(CcdError::BitDepth(17)))
        ));
    }
}
