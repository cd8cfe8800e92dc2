use crate::{
    corrector::{ActuationMode, WavefrontCorrector},
    Wavefront,
};

/// Tip-tilt stage
///
/// A 2 actuators corrector adding a linear slope to the wavefront:
/// actuator 0 tilts the wavefront along the x axis and actuator 1 along the y axis.
#[derive(Debug, Clone, PartialEq)]
pub struct TipTilt {
    amplitude: f32,
    offset: f32,
    control: [f32; 2],
}
impl Default for TipTilt {
    fn default() -> Self {
        Self {
            amplitude: 127.,
            offset: 128.,
            control: [0.; 2],
        }
    }
}
impl TipTilt {
    pub fn new() -> Self {
        Default::default()
    }
    /// Returns the last applied control
    pub fn control(&self) -> [f32; 2] {
        self.control
    }
    /// Writes (or adds) the tip-tilt slope into the wavefront
    pub fn apply(&self, mode: ActuationMode, wavefront: &mut Wavefront) {
        let (width, height) = wavefront.resolution();
        let amp = self.amplitude;
        let [cx, cy] = self.control;
        let wx = if width > 1 { (width - 1) as f32 } else { 1. };
        let hy = if height > 1 { (height - 1) as f32 } else { 1. };
        let offset = self.offset;
        wavefront
            .phase_mut()
            .chunks_mut(width.max(1))
            .enumerate()
            .for_each(|(i, row)| {
                let y = (i as f32 / hy - 0.5) * 2. * amp * cy;
                row.iter_mut().enumerate().for_each(|(j, x)| {
                    let slope = y + (j as f32 / wx - 0.5) * 2. * amp * cx;
                    match mode {
                        ActuationMode::Set => *x = offset + slope,
                        ActuationMode::Add => *x += slope,
                    }
                })
            });
    }
}
impl WavefrontCorrector for TipTilt {
    fn n_actuator(&self) -> usize {
        2
    }
    fn actuate(&mut self, control: &[f32], mode: ActuationMode, wavefront: &mut Wavefront) {
        self.control = [0.; 2];
        self.control
            .iter_mut()
            .zip(control)
            .for_each(|(c, &x)| *c = x.clamp(-1., 1.));
        self.apply(mode, wavefront);
    }
    fn reset(&mut self) {
        self.control = [0.; 2];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set() {
        let mut tt = TipTilt::new();
        let mut wf = Wavefront::new(5, 3);
        tt.actuate(&[1., 0.], ActuationMode::Set, &mut wf);
        let row = &wf.phase()[..5];
        assert_eq!(row, &[1., 64.5, 128., 191.5, 255.]);
        assert!(wf.phase()[5..10].iter().zip(row).all(|(a, b)| a == b));
        tt.actuate(&[0., -1.], ActuationMode::Set, &mut wf);
        assert_eq!(wf.phase()[0], 255.);
        assert_eq!(wf.phase()[14], 1.);
    }

    #[test]
    fn add_then_cancel() {
        let mut tt = TipTilt::new();
        let mut wf = Wavefront::new(16, 16);
        tt.actuate(&[0.3, -0.7], ActuationMode::Set, &mut wf);
        tt.actuate(&[-0.3, 0.7], ActuationMode::Add, &mut wf);
        assert!(wf.phase().iter().all(|x| (x - 128.).abs() < 1e-4));
    }

    #[test]
    fn clamped() {
        let mut tt = TipTilt::new();
        let mut wf = Wavefront::new(4, 4);
        tt.actuate(&[4.], ActuationMode::Add, &mut wf);
        assert_eq!(tt.control(), [1., 0.]);
    }
}
