//!
//! # Deformable mirror
//!
//! The mirror membrane is driven by electrostatic actuators.
//! Each actuator command in [-1,1] is turned into an 8 bits voltage and every pixel of the
//! actuator footprint, given by the [InfluencePattern], pulls the membrane with a force
//! proportional to the voltage squared.
//! The mirror figure is the solution of the Poisson equation `∇²resp = forcing` with the
//! membrane pinned outside the pupil, found by successive over-relaxation (SOR) starting from
//! the previous figure.

use crate::{
    corrector::{ActuationMode, WavefrontCorrector},
    image_io::ImageData,
    FromBuilder, Wavefront,
};

mod builder;
pub use builder::{DeformableMirrorBuilder, PatternSource};

#[derive(Debug, thiserror::Error)]
pub enum DeformableMirrorError {
    #[error("influence pattern is {pattern:?} but the frame is {frame:?}")]
    Size {
        pattern: (usize, usize),
        frame: (usize, usize),
    },
    #[error("influence pattern does not drive any actuator")]
    NoActuator,
    #[error("actuator grid {0:?} does not fit in the frame")]
    Grid((usize, usize)),
}

/// Electrostatic pressure scaling
pub const FORCE_SCALING: f32 = 75.7856;
/// Mirror figure to wavefront phase scaling
pub const AMPLITUDE: f32 = 5.0;
/// SOR convergence limit
pub const CONVERGENCE_LIMIT: f64 = 1e-8;

/// Converts an actuator command in [-1,1] into an 8 bits voltage
///
/// `v(-1)=0`, `v(0)=180` and `v(1)=255`
pub fn voltage(command: f32) -> f32 {
    (65025. * (command.clamp(-1., 1.) + 1.) * 0.5).sqrt().round()
}
/// Membrane forcing of an actuator at voltage `v`
pub fn forcing(v: f32) -> f32 {
    (v / 255.).powi(2) / FORCE_SCALING
}

/// Actuator influence pattern
///
/// Each pixel holds the id of the actuator driving it: 0 for none, `n` for actuator `n-1`
#[derive(Debug, Clone, PartialEq)]
pub struct InfluencePattern {
    ids: Vec<u8>,
    width: usize,
    height: usize,
}
impl InfluencePattern {
    /// Returns the pattern resolution as (width,height)
    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }
    pub fn ids(&self) -> &[u8] {
        &self.ids
    }
    /// Returns the number of actuators, i.e. the largest actuator id
    pub fn n_actuator(&self) -> usize {
        self.ids.iter().max().map_or(0, |&x| x as usize)
    }
    /// Square footprint actuators on a regular `nx`x`ny` grid
    pub fn grid(
        width: usize,
        height: usize,
        nx: usize,
        ny: usize,
    ) -> Result<Self, DeformableMirrorError> {
        if nx == 0 || ny == 0 || nx > width || ny > height || nx * ny > u8::MAX as usize {
            return Err(DeformableMirrorError::Grid((nx, ny)));
        }
        let (dx, dy) = (width / nx, height / ny);
        let (x0, y0) = ((width - nx * dx) / 2, (height - ny * dy) / 2);
        let ids = (0..height)
            .flat_map(|i| (0..width).map(move |j| (i, j)))
            .map(|(i, j)| {
                if i < y0 || j < x0 || i >= y0 + ny * dy || j >= x0 + nx * dx {
                    0
                } else {
                    (((i - y0) / dy) * nx + (j - x0) / dx + 1) as u8
                }
            })
            .collect();
        Ok(Self { ids, width, height })
    }
}
impl From<ImageData> for InfluencePattern {
    fn from(image: ImageData) -> Self {
        Self {
            ids: image.samples,
            width: image.width,
            height: image.height,
        }
    }
}

/// Outcome of a mirror figure computation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SolveReport {
    /// Number of SOR sweeps
    pub iterations: usize,
    /// Relative residual of the last sweep
    pub residual: f64,
    pub converged: bool,
}

/// Deformable mirror model
pub struct DeformableMirror {
    width: usize,
    height: usize,
    pattern: InfluencePattern,
    pupil: Vec<bool>,
    n_actuator: usize,
    amplitude: f32,
    max_iterations: usize,
    limit: f64,
    subtract_bias: bool,
    omega: f64,
    commands: Vec<f32>,
    forcing: Vec<f32>,
    resp: Vec<f32>,
    report: SolveReport,
}
impl FromBuilder for DeformableMirror {
    type ComponentBuilder = DeformableMirrorBuilder;
}
impl DeformableMirror {
    /// Returns the mirror resolution as (width,height)
    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }
    pub fn pattern(&self) -> &InfluencePattern {
        &self.pattern
    }
    /// Returns the mirror figure
    pub fn response(&self) -> &[f32] {
        &self.resp
    }
    /// Returns the last applied actuator commands
    pub fn commands(&self) -> &[f32] {
        &self.commands
    }
    /// Returns the report of the last mirror figure computation
    pub fn report(&self) -> SolveReport {
        self.report
    }
    /// Returns the SOR over-relaxation parameter
    pub fn omega(&self) -> f64 {
        self.omega
    }
    /// Reallocates the mirror buffers for a new frame size, resetting the mirror figure
    ///
    /// The influence pattern and the pupil are dropped if they do not match the new size,
    /// leaving a mirror without actuators until [DeformableMirror::set_pattern] is called
    pub fn resize(&mut self, width: usize, height: usize) -> &mut Self {
        if (width, height) == self.resolution() {
            return self;
        }
        log::info!("DeformableMirror: resizing to {}x{}", width, height);
        self.width = width;
        self.height = height;
        if self.pattern.resolution() != (width, height) {
            log::warn!("DeformableMirror: influence pattern dropped");
            self.pattern = InfluencePattern {
                ids: vec![0; width * height],
                width,
                height,
            };
            self.n_actuator = 0;
            self.commands.clear();
        }
        if self.pupil.len() != width * height {
            self.pupil = vec![true; width * height];
        }
        self.omega = sor_omega(width, height);
        self.max_iterations = default_max_iterations(width, height);
        self.forcing = vec![0f32; width * height];
        self.resp = vec![0f32; width * height];
        self
    }
    /// Replaces the influence pattern, the commands are zeroed
    pub fn set_pattern(
        &mut self,
        pattern: InfluencePattern,
    ) -> Result<&mut Self, DeformableMirrorError> {
        if pattern.resolution() != self.resolution() {
            return Err(DeformableMirrorError::Size {
                pattern: pattern.resolution(),
                frame: self.resolution(),
            });
        }
        let n_actuator = pattern.n_actuator();
        if n_actuator == 0 {
            return Err(DeformableMirrorError::NoActuator);
        }
        log::info!("DeformableMirror: new pattern with {} actuators", n_actuator);
        self.pattern = pattern;
        self.n_actuator = n_actuator;
        self.commands = vec![0f32; n_actuator];
        Ok(self)
    }
    /// Sets the pupil mask, pixels outside the pupil are pinned to 0
    pub fn set_pupil(&mut self, pupil: &[bool]) -> &mut Self {
        if pupil.len() == self.pupil.len() {
            self.pupil.copy_from_slice(pupil);
        } else {
            log::warn!(
                "DeformableMirror: pupil with {} pixels ignored, expected {}",
                pupil.len(),
                self.pupil.len()
            );
        }
        self
    }
    /// Zeroes the mirror figure and the commands
    pub fn reset(&mut self) -> &mut Self {
        self.commands.fill(0.);
        self.resp.fill(0.);
        self
    }
    /// Computes the mirror figure for the actuator `commands`
    ///
    /// Commands are clamped to [-1,1]; actuators without command are not driven
    pub fn solve(&mut self, commands: &[f32]) -> SolveReport {
        let n = self.n_actuator.min(commands.len());
        self.commands.fill(0.);
        self.commands[..n]
            .iter_mut()
            .zip(commands)
            .for_each(|(c, &x)| *c = x.clamp(-1., 1.));
        let forces: Vec<f32> = self
            .commands
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                if i < n {
                    self.actuator_forcing(c)
                } else {
                    0.
                }
            })
            .collect();
        let ids = self.pattern.ids();
        self.forcing.iter_mut().zip(ids).for_each(|(f, &id)| {
            *f = match id as usize {
                0 => 0.,
                id => forces.get(id - 1).copied().unwrap_or(0.),
            }
        });
        self.report = self.relax();
        log::debug!("DeformableMirror: {:?}", self.report);
        self.report
    }
    fn actuator_forcing(&self, command: f32) -> f32 {
        let f = forcing(voltage(command));
        if self.subtract_bias {
            f - forcing(voltage(0.))
        } else {
            f
        }
    }
    // Successive over-relaxation of the Poisson equation, warm started from the current figure
    fn relax(&mut self) -> SolveReport {
        let (w, h) = (self.width, self.height);
        let omega = self.omega;
        let mut report = SolveReport::default();
        if w < 3 || h < 3 {
            return report;
        }
        for iteration in 1..=self.max_iterations {
            let mut sdif = 0f64;
            let mut sum = 0f64;
            for i in 1..h - 1 {
                for j in 1..w - 1 {
                    let k = i * w + j;
                    if !self.pupil[k] {
                        self.resp[k] = 0.;
                        continue;
                    }
                    let neighbours = self.resp[k - 1] as f64
                        + self.resp[k + 1] as f64
                        + self.resp[k - w] as f64
                        + self.resp[k + w] as f64;
                    let update =
                        -(self.resp[k] as f64) - (self.forcing[k] as f64 - neighbours) * 0.25;
                    let delta = omega * update;
                    self.resp[k] += delta as f32;
                    sdif += delta * delta;
                    sum += self.resp[k] as f64;
                }
            }
            report.iterations = iteration;
            if sdif == 0. {
                report.residual = 0.;
                report.converged = true;
                break;
            }
            if sum != 0. {
                report.residual = (sdif / (sum * sum)).sqrt();
                if report.residual < self.limit {
                    report.converged = true;
                    break;
                }
            } else {
                report.residual = f64::INFINITY;
            }
        }
        report
    }
    /// Writes (or adds) the mirror figure into the wavefront
    pub fn apply(&self, mode: ActuationMode, wavefront: &mut Wavefront) {
        if wavefront.resolution() != self.resolution() {
            log::warn!(
                "wavefront {:?} does not match the deformable mirror {:?}",
                wavefront.resolution(),
                self.resolution()
            );
            return;
        }
        let a = self.amplitude;
        let phase = wavefront.phase_mut().iter_mut().zip(&self.resp);
        match mode {
            ActuationMode::Set => phase.for_each(|(x, &r)| *x = a * r),
            ActuationMode::Add => phase.for_each(|(x, &r)| *x += a * r),
        }
    }
}
impl WavefrontCorrector for DeformableMirror {
    fn n_actuator(&self) -> usize {
        self.n_actuator
    }
    fn actuate(&mut self, control: &[f32], mode: ActuationMode, wavefront: &mut Wavefront) {
        self.solve(control);
        self.apply(mode, wavefront);
    }
    fn reset(&mut self) {
        DeformableMirror::reset(self);
    }
}

pub(crate) fn sor_omega(width: usize, height: usize) -> f64 {
    use std::f64::consts::PI;
    let rho = ((PI / width as f64).cos() + (PI / height as f64).cos()) * 0.5;
    2. / (1. + (1. - rho * rho).sqrt())
}
pub(crate) fn default_max_iterations(width: usize, height: usize) -> usize {
    2 * ((width * height) as f64).sqrt() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Builder, Telescope};

    fn mirror(width: usize, height: usize) -> DeformableMirror {
        let tel = Telescope::builder()
            .resolution(width, height)
            .circular(0.9)
            .build()
            .unwrap();
        DeformableMirror::builder()
            .resolution(width, height)
            .actuator_grid(4, 4)
            .pupil(&tel)
            .build()
            .unwrap()
    }

    #[test]
    fn voltage_mapping() {
        assert_eq!(voltage(-1.), 0.);
        assert!((voltage(0.) - 180.).abs() <= 1.);
        assert_eq!(voltage(1.), 255.);
        assert_eq!(voltage(3.), 255.);
        let mut previous = voltage(-1.);
        for i in 1..=200 {
            let v = voltage(-1. + i as f32 * 0.01);
            assert!(v >= previous);
            previous = v;
        }
    }

    #[test]
    fn grid_pattern() {
        let pattern = InfluencePattern::grid(11, 11, 3, 3).unwrap();
        assert_eq!(pattern.n_actuator(), 9);
        // 3x3 pixels per actuator, 1 pixel border
        assert_eq!(pattern.ids()[0], 0);
        assert_eq!(pattern.ids()[12], 1);
        assert_eq!(pattern.ids()[108], 9);
        assert_eq!(pattern.ids()[120], 0);
        // the leftover pixels go to the right and bottom borders
        let pattern = InfluencePattern::grid(10, 10, 3, 3).unwrap();
        assert_eq!(pattern.ids()[0], 1);
        assert_eq!(pattern.ids()[9], 0);
        assert_eq!(pattern.ids()[88], 9);
        assert!(InfluencePattern::grid(4, 4, 5, 1).is_err());
    }

    #[test]
    fn zero_command_is_flat() {
        let mut dm = mirror(48, 48);
        let n = dm.n_actuator();
        dm.solve(&vec![0f32; n]);
        assert!(dm.response().iter().all(|x| x.abs() < 1e-6));
    }

    #[test]
    fn zero_command_after_warm_start() {
        let mut dm = mirror(48, 48);
        let n = dm.n_actuator();
        dm.solve(&vec![0.8f32; n]);
        let peak = dm.response().iter().fold(0f32, |a, x| a.max(x.abs()));
        assert!(peak > 0.);
        dm.solve(&vec![0f32; n]);
        let residual = dm.response().iter().fold(0f32, |a, x| a.max(x.abs()));
        assert!(residual < 1e-2 * peak, "{residual} vs {peak}");
    }

    #[test]
    fn pinned_outside_pupil() {
        let mut dm = mirror(32, 32);
        let n = dm.n_actuator();
        dm.solve(&vec![-0.5f32; n]);
        let (w, h) = dm.resolution();
        for i in 0..h {
            for j in 0..w {
                let k = i * w + j;
                if i == 0 || j == 0 || i == h - 1 || j == w - 1 || !dm.pupil[k] {
                    assert_eq!(dm.response()[k], 0.);
                }
            }
        }
    }

    #[test]
    fn converges() {
        let mut dm = mirror(32, 32);
        let n = dm.n_actuator();
        let commands: Vec<f32> = (0..n).map(|i| 0.2 + 0.5 * i as f32 / n as f32).collect();
        let report = dm.solve(&commands);
        assert!(report.iterations <= default_max_iterations(32, 32));
        assert!(report.residual.is_finite());
        // a second solve with the same commands starts from the solution
        let mut dm = DeformableMirror::builder()
            .resolution(32, 32)
            .actuator_grid(4, 4)
            .convergence_limit(1e-5)
            .build()
            .unwrap();
        dm.solve(&commands);
        let report = dm.solve(&commands);
        assert!(report.converged, "{report:?}");
        assert!(report.iterations < default_max_iterations(32, 32));
    }

    #[test]
    fn missing_commands_are_not_driven() {
        let mut dm = mirror(32, 32);
        dm.solve(&[1.]);
        assert_eq!(dm.commands()[0], 1.);
        assert!(dm.commands()[1..].iter().all(|&c| c == 0.));
        let mut wf = Wavefront::new(32, 32);
        dm.actuate(&[0.5, -0.5], ActuationMode::Set, &mut wf);
        assert!(wf.rms() > 0.);
    }

    #[test]
    fn resize_then_set_pattern() {
        let mut dm = mirror(32, 32);
        dm.solve(&vec![0.5f32; dm.n_actuator()]);
        dm.resize(48, 48);
        assert_eq!(dm.resolution(), (48, 48));
        assert_eq!(dm.response().len(), 48 * 48);
        assert_eq!(dm.n_actuator(), 0);
        assert!(dm.response().iter().all(|&x| x == 0.));
        dm.solve(&[0.5; 16]);
        assert!(dm.response().iter().all(|&x| x == 0.));
        assert!(dm.commands().is_empty());

        assert!(matches!(
            dm.set_pattern(InfluencePattern::grid(32, 32, 4, 4).unwrap()),
            Err(DeformableMirrorError::Size { .. })
        ));
        dm.set_pattern(InfluencePattern::grid(48, 48, 4, 4).unwrap())
            .unwrap();
        assert_eq!(dm.n_actuator(), 16);
        let tel = Telescope::builder()
            .resolution(48, 48)
            .circular(0.9)
            .build()
            .unwrap();
        dm.set_pupil(tel.mask());
        dm.solve(&[0.5; 16]);
        assert!(dm.response().iter().any(|&x| x != 0.));
        assert!(dm.response()[..48].iter().all(|&x| x == 0.));
        assert!(dm.response()[47 * 48..].iter().all(|&x| x == 0.));
        assert_eq!(dm.omega(), sor_omega(48, 48));
    }

    // Actuators 2, 5 and 7 on a 32x32 frame, actuators 1, 3, 4 and 6 have no pixel
    fn sparse_mirror() -> DeformableMirror {
        let samples: Vec<u8> = (0..32 * 32)
            .map(|k| (k / 32, k % 32))
            .map(|(i, j)| match (i, j) {
                (0 | 31, _) | (_, 0 | 31) => 0,
                (_, 1..=10) => 2,
                (_, 11..=20) => 5,
                _ => 7,
            })
            .collect();
        DeformableMirror::builder()
            .resolution(32, 32)
            .influence(ImageData::new(samples, 32, 32).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn sparse_pattern_zero_command() {
        let mut dm = sparse_mirror();
        assert_eq!(dm.n_actuator(), 7);
        dm.solve(&[0.; 7]);
        assert!(dm.response().iter().all(|x| x.abs() < 1e-6));
    }

    #[test]
    fn sparse_pattern_drives_addressed_actuators_only() {
        let mut dm = sparse_mirror();
        dm.solve(&[0.5; 3]);
        for (&id, &f) in dm.pattern.ids().iter().zip(&dm.forcing) {
            match id {
                2 => assert!(f != 0.),
                _ => assert_eq!(f, 0.),
            }
        }
        assert!(dm.response().iter().any(|&x| x != 0.));
        dm.solve(&[0.; 3]);
        assert!(dm.forcing.iter().all(|&f| f == 0.));
    }

    #[test]
    fn add_accumulates() {
        let mut dm = mirror(32, 32);
        let n = dm.n_actuator();
        let mut wf = Wavefront::new(32, 32);
        wf.flat(10.);
        dm.actuate(&vec![0.3; n], ActuationMode::Add, &mut wf);
        let k = 16 * 32 + 16;
        assert!((wf.phase()[k] - 10. - AMPLITUDE * dm.response()[k]).abs() < 1e-5);
    }
}
