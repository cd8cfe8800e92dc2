use crate::frame::Stats;

/// A system that mutates the [Wavefront] should implement the `Propagation` trait
pub trait Propagation {
    fn propagate(&mut self, wavefront: &mut Wavefront);
}

/// Wavefront frame buffer
///
/// Holds the phase samples of the simulated optical train over the detector frame.
/// After the Shack-Hartmann stage, the same buffer holds the sensor intensity image.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Wavefront {
    width: usize,
    height: usize,
    phase: Vec<f32>,
}
impl Wavefront {
    /// Creates a `width`x`height` zero wavefront
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            phase: vec![0f32; width * height],
        }
    }
    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }
    /// Returns the resolution as (width,height)
    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }
    pub fn len(&self) -> usize {
        self.phase.len()
    }
    pub fn is_empty(&self) -> bool {
        self.phase.is_empty()
    }
    /// Resizes the wavefront, the samples are zeroed only if the size changes
    pub fn resize(&mut self, width: usize, height: usize) -> &mut Self {
        if self.width != width || self.height != height {
            *self = Self::new(width, height);
        }
        self
    }
    pub fn phase(&self) -> &[f32] {
        &self.phase
    }
    pub fn phase_mut(&mut self) -> &mut [f32] {
        &mut self.phase
    }
    /// Sets all the samples to `value`
    pub fn flat(&mut self, value: f32) -> &mut Self {
        self.phase.fill(value);
        self
    }
    /// Propagates the wavefront through an optical `system`
    pub fn through<T: Propagation + ?Sized>(&mut self, system: &mut T) -> &mut Self {
        system.propagate(self);
        self
    }
    /// Returns the minimum, maximum and mean of the samples
    pub fn stats(&self) -> Stats {
        Stats::from_values(self.phase.iter().map(|&x| x as f64))
    }
    /// Returns the wavefront root mean square
    pub fn rms(&self) -> f64 {
        if self.phase.is_empty() {
            return 0.;
        }
        let n = self.phase.len() as f64;
        let mean = self.phase.iter().map(|&x| x as f64).sum::<f64>() / n;
        (self
            .phase
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / n)
            .sqrt()
    }
    /// Truncates the samples to bytes, saturating at 0 and 255
    pub fn to_bytes(&self) -> Vec<u8> {
        self.phase.iter().map(|&x| x.clamp(0., 255.) as u8).collect()
    }
}
