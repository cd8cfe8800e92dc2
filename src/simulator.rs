//!
//! # Adaptive optics simulator
//!
//! The [Simulator] chains the optical elements into the frame pipeline of a simulated
//! Shack-Hartmann camera:
//!
//! error source → corrector → telescope → Shack-Hartmann → CCD
//!
//! The error source is either the atmosphere, a second corrector driven by a synthetic
//! disturbance or nothing (a flat wavefront).
//! Calibration frames replace the error source and, for dark and flat frames, the optical
//! train as well.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    calibration::{CalibrationError, CalibrationField},
    camera::CameraBackend,
    corrector::{ActuationMode, Corrector, WavefrontCorrector},
    Atmosphere, Ccd, Disturbance, Frame, FromBuilder, ShackHartmann, Telescope, Wavefront,
    WfcErrorInjector, WindMode, WindVector,
};

mod builder;
pub use builder::{SimulatorBuilder, SimulatorBuilderError};

/// Intensity of the flat wavefront used without error source and for calibration
pub const FLAT_INTENSITY: f32 = 32.;

/// Origin of the wavefront errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
    /// atmospheric turbulence scrolled by the wind
    #[default]
    Seeing,
    /// a corrector of the same kind as the one in the loop
    Wfc,
    /// a flat wavefront
    None,
}

/// Calibration frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    /// no light: noise only
    Dark,
    /// uniform illumination of the detector: flat wavefront and noise
    Flat,
    /// flat wavefront through the telescope and the Shack-Hartmann
    SubapSel,
    /// same as subaperture selection frames
    Pinhole,
    /// flat wavefront shaped by the corrector, through the telescope and the Shack-Hartmann
    Influence,
}

#[derive(Debug, Default)]
struct Snapshot {
    prefix: PathBuf,
    remaining: usize,
}

/// Simulated adaptive optics camera
pub struct Simulator {
    atmosphere: Atmosphere,
    telescope: Telescope,
    corrector: Corrector,
    error_corrector: Corrector,
    injector: WfcErrorInjector,
    wfs: ShackHartmann,
    ccd: Ccd,
    wavefront: Wavefront,
    control: Vec<f32>,
    error_source: ErrorSource,
    calibration: Option<CalibrationMode>,
    interval: Duration,
    snapshot: Snapshot,
    frame_count: u64,
}
impl FromBuilder for Simulator {
    type ComponentBuilder = SimulatorBuilder;
}
impl Simulator {
    /// Returns the frame resolution as (width,height)
    pub fn resolution(&self) -> (usize, usize) {
        self.wavefront.resolution()
    }
    pub fn atmosphere(&self) -> &Atmosphere {
        &self.atmosphere
    }
    pub fn telescope(&self) -> &Telescope {
        &self.telescope
    }
    pub fn corrector(&self) -> &Corrector {
        &self.corrector
    }
    pub fn wfs(&self) -> &ShackHartmann {
        &self.wfs
    }
    pub fn ccd(&self) -> &Ccd {
        &self.ccd
    }
    pub fn injector(&self) -> &WfcErrorInjector {
        &self.injector
    }
    /// Returns the wavefront at the last stage of the pipeline
    pub fn wavefront(&self) -> &Wavefront {
        &self.wavefront
    }
    /// Returns the corrector control vector
    pub fn control(&self) -> &[f32] {
        &self.control
    }
    pub fn n_actuator(&self) -> usize {
        self.corrector.n_actuator()
    }
    pub fn error_source(&self) -> ErrorSource {
        self.error_source
    }
    pub fn calibration(&self) -> Option<CalibrationMode> {
        self.calibration
    }
    /// Returns the number of frames captured so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
    /// Returns the time between 2 frames
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sets the wind, see [Atmosphere::set_wind]
    pub fn set_wind(&mut self, wind: WindVector) -> &mut Self {
        self.atmosphere.set_wind(wind);
        self
    }
    pub fn set_wind_mode(&mut self, wind_mode: WindMode) -> &mut Self {
        self.atmosphere.set_wind_mode(wind_mode);
        self
    }
    pub fn set_seeing(&mut self, seeing: f64) -> &mut Self {
        self.wfs.set_seeing(seeing);
        self
    }
    pub fn set_noise(&mut self, noise: f64) -> &mut Self {
        self.ccd.set_noise(noise);
        self
    }
    pub fn set_exposure(&mut self, exposure: f64) -> &mut Self {
        self.ccd.set_exposure(exposure);
        self
    }
    pub fn set_offset(&mut self, offset: f64) -> &mut Self {
        self.ccd.set_offset(offset);
        self
    }
    pub fn set_gain(&mut self, gain: f64) -> &mut Self {
        self.ccd.set_gain(gain);
        self
    }
    pub fn set_interval(&mut self, interval: Duration) -> &mut Self {
        self.interval = interval;
        self
    }
    /// Sets the corrector control vector
    ///
    /// Values are clamped to [-1,1]; missing values are set to 0 and extra values are ignored
    pub fn set_control(&mut self, control: &[f32]) -> &mut Self {
        if control.len() != self.control.len() {
            log::debug!(
                "control vector with {} values for {} actuators",
                control.len(),
                self.control.len()
            );
        }
        self.control.fill(0.);
        self.control
            .iter_mut()
            .zip(control)
            .for_each(|(c, &x)| *c = x.clamp(-1., 1.));
        self
    }
    pub fn set_error_source(&mut self, error_source: ErrorSource) -> &mut Self {
        log::info!("error source: {:?}", error_source);
        self.error_source = error_source;
        self
    }
    pub fn set_disturbance(&mut self, disturbance: Disturbance) -> &mut Self {
        self.injector.set_disturbance(disturbance);
        self
    }
    /// Sets the calibration mode, `None` returns to normal frames
    pub fn set_calibration(&mut self, calibration: Option<CalibrationMode>) -> &mut Self {
        log::info!("calibration mode: {:?}", calibration);
        self.calibration = calibration;
        self
    }
    /// Saves the next `n` frames into PGM files
    pub fn save_next(&mut self, n: usize) -> &mut Self {
        self.snapshot.remaining = n;
        self
    }
    /// Sets the prefix of the snapshot files: `<prefix>-cap-<frame number>.pgm`
    pub fn set_snapshot_prefix<P: Into<PathBuf>>(&mut self, prefix: P) -> &mut Self {
        self.snapshot.prefix = prefix.into();
        self
    }
    /// Zeroes the control vector and brings both correctors and the error injector to rest
    pub fn reset(&mut self) -> &mut Self {
        self.control.fill(0.);
        self.corrector.reset();
        self.error_corrector.reset();
        self.injector.reset();
        self
    }

    // Wavefront errors
    fn disturb(&mut self) {
        match self.error_source {
            ErrorSource::Seeing => {
                self.wavefront.through(&mut self.atmosphere);
            }
            ErrorSource::Wfc => self
                .injector
                .inject(&mut self.error_corrector, &mut self.wavefront),
            ErrorSource::None => {
                self.wavefront.flat(FLAT_INTENSITY);
            }
        }
    }
    /// Computes the corrected wavefront in the telescope pupil
    ///
    /// The error source moves one step forward
    pub fn residual_wavefront(&mut self) -> &Wavefront {
        self.disturb();
        self.corrector
            .actuate(&self.control, ActuationMode::Add, &mut self.wavefront);
        self.wavefront.through(&mut self.telescope);
        &self.wavefront
    }
    /// Computes the detector image before the CCD
    pub fn sensor_image(&mut self) -> &Wavefront {
        match self.calibration {
            Some(CalibrationMode::Dark) => {
                self.wavefront.flat(0.);
            }
            Some(CalibrationMode::Flat) => {
                self.wavefront.flat(FLAT_INTENSITY);
            }
            Some(CalibrationMode::SubapSel) | Some(CalibrationMode::Pinhole) => {
                self.wavefront
                    .flat(FLAT_INTENSITY)
                    .through(&mut self.telescope)
                    .through(&mut self.wfs);
            }
            Some(CalibrationMode::Influence) => {
                self.wavefront.flat(FLAT_INTENSITY);
                self.corrector
                    .actuate(&self.control, ActuationMode::Add, &mut self.wavefront);
                self.wavefront
                    .through(&mut self.telescope)
                    .through(&mut self.wfs);
            }
            None => {
                self.residual_wavefront();
                self.wavefront.through(&mut self.wfs);
            }
        }
        &self.wavefront
    }
    /// Runs the frame pipeline, writing the result into `frame`
    pub fn capture_into(&mut self, frame: &mut Frame) -> crate::Result<()> {
        self.sensor_image();
        self.ccd.capture(&self.wavefront, frame);
        self.frame_count += 1;
        frame.number = self.frame_count;
        log::debug!("frame #{}: {:?}", frame.number, frame.stats);
        if self.snapshot.remaining > 0 {
            let path = PathBuf::from(format!(
                "{}-cap-{:05}.pgm",
                self.snapshot.prefix.display(),
                frame.number
            ));
            self.snapshot.remaining -= 1;
            match frame.save(&path) {
                Ok(()) => log::info!("saved frame #{} to {:?}", frame.number, path),
                Err(e) => log::warn!("snapshot of frame #{} failed: {}", frame.number, e),
            }
        }
        Ok(())
    }
    /// Runs the frame pipeline
    pub fn capture(&mut self) -> crate::Result<Frame> {
        let (width, height) = self.resolution();
        let mut frame = Frame::new(width, height, self.ccd.bit_depth());
        self.capture_into(&mut frame)?;
        Ok(frame)
    }
    /// Captures `n` frames and returns their pixel average
    pub fn average_frames(&mut self, n: usize) -> crate::Result<CalibrationField> {
        if n == 0 {
            return Err(CalibrationError::NoFrame.into());
        }
        let (width, height) = self.resolution();
        let mut field = CalibrationField::new(width, height);
        let mut frame = Frame::new(width, height, self.ccd.bit_depth());
        for _ in 0..n {
            self.capture_into(&mut frame)?;
            field.accumulate(&frame)?;
        }
        field.scale(n);
        log::info!("average of {} frames: {:?}", n, field.stats());
        Ok(field)
    }
    /// Averages `n` frames in calibration `mode`
    ///
    /// The calibration mode in use before the call is restored afterwards
    pub fn calibrate(&mut self, mode: CalibrationMode, n: usize) -> crate::Result<CalibrationField> {
        let previous = self.calibration.replace(mode);
        log::info!("{:?} calibration with {} frames", mode, n);
        let field = self.average_frames(n);
        self.calibration = previous;
        field
    }
}
impl CameraBackend for Simulator {
    fn name(&self) -> &str {
        "simulcam"
    }
    fn capture(&mut self, frame: &mut Frame) -> crate::Result<()> {
        self.capture_into(frame)
    }
    fn interval(&self) -> Duration {
        self.interval
    }
    fn park(&mut self) {
        self.reset();
    }
}
