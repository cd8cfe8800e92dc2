use std::{
    fs::File,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{
    corrector::WavefrontCorrector, image_io::ImageData, AtmosphereBuilder, Builder, CcdBuilder,
    CorrectorKind, Disturbance, ShackHartmannBuilder, TelescopeBuilder, Wavefront,
    WfcErrorInjector, WindMode,
};

use super::{ErrorSource, Simulator, Snapshot};

#[derive(Debug, thiserror::Error)]
pub enum SimulatorBuilderError {
    #[error("cannot open `::aosim::SimulatorBuilder` toml file: {1}")]
    Open(#[source] std::io::Error, PathBuf),
    #[error("cannot create `::aosim::SimulatorBuilder` toml file: {1}")]
    Create(#[source] std::io::Error, PathBuf),
    #[error("cannot read `::aosim::SimulatorBuilder` toml file: {1}")]
    Read(#[source] std::io::Error, PathBuf),
    #[error("cannot write `::aosim::SimulatorBuilder` toml file: {1}")]
    Write(#[source] std::io::Error, PathBuf),
    #[error("cannot deserialize `::aosim::SimulatorBuilder` from toml")]
    Load(#[from] toml::de::Error),
    #[error("cannot serialize `::aosim::SimulatorBuilder` into toml")]
    Save(#[from] toml::ser::Error),
    #[error("frame interval must be positive and finite, found {0}s")]
    Interval(f64),
}

/// [`Simulator`] builder type
///
/// The frame resolution of the builder overrides the resolution of every element and the
/// random generators of the elements are seeded from the builder seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorBuilder {
    /// Frame resolution as (width,height)
    pub resolution: (usize, usize),
    pub atmosphere: AtmosphereBuilder,
    pub telescope: TelescopeBuilder,
    pub corrector: CorrectorKind,
    pub shack_hartmann: ShackHartmannBuilder,
    pub ccd: CcdBuilder,
    pub disturbance: Disturbance,
    pub error_source: ErrorSource,
    /// Time between 2 frames in seconds
    pub interval: f64,
    /// Snapshot files prefix
    pub snapshot_prefix: PathBuf,
    pub seed: u64,
}
/// Default properties:
///  * resolution      : 256x256
///  * atmosphere      : [`AtmosphereBuilder`] default
///  * telescope       : [`TelescopeBuilder`] default
///  * corrector       : deformable mirror
///  * shack-hartmann  : [`ShackHartmannBuilder`] default
///  * ccd             : [`CcdBuilder`] default
///  * disturbance     : periodic, 40 frames
///  * error source    : seeing
///  * interval        : 0.1s
///  * snapshot prefix : simulcam
///  * seed            : 0
impl Default for SimulatorBuilder {
    fn default() -> Self {
        Self {
            resolution: (256, 256),
            atmosphere: Default::default(),
            telescope: Default::default(),
            corrector: Default::default(),
            shack_hartmann: Default::default(),
            ccd: Default::default(),
            disturbance: Default::default(),
            error_source: Default::default(),
            interval: 0.1,
            snapshot_prefix: PathBuf::from("simulcam"),
            seed: 0,
        }
    }
}
impl SimulatorBuilder {
    /// Loads the simulator builder from a toml file
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, SimulatorBuilderError> {
        let mut file = File::open(&path)
            .map_err(|e| SimulatorBuilderError::Open(e, path.as_ref().to_path_buf()))?;
        let mut toml = String::new();
        file.read_to_string(&mut toml)
            .map_err(|e| SimulatorBuilderError::Read(e, path.as_ref().to_path_buf()))?;
        let builder: SimulatorBuilder = toml::from_str(&toml)?;
        log::info!("simulator configuration loaded from {:?}", path.as_ref());
        Ok(builder)
    }
    /// Saves the simulator builder into a toml file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), SimulatorBuilderError> {
        let toml = toml::to_string_pretty(self)?;
        let mut file = File::create(&path)
            .map_err(|e| SimulatorBuilderError::Create(e, path.as_ref().to_path_buf()))?;
        write!(file, "# ::aosim::SimulatorBuilder\n\n{}", toml)
            .map_err(|e| SimulatorBuilderError::Write(e, path.as_ref().to_path_buf()))?;
        Ok(())
    }
    pub fn resolution(self, width: usize, height: usize) -> Self {
        Self {
            resolution: (width, height),
            ..self
        }
    }
    pub fn atmosphere(self, atmosphere: AtmosphereBuilder) -> Self {
        Self { atmosphere, ..self }
    }
    pub fn telescope(self, telescope: TelescopeBuilder) -> Self {
        Self { telescope, ..self }
    }
    pub fn corrector(self, corrector: CorrectorKind) -> Self {
        Self { corrector, ..self }
    }
    pub fn shack_hartmann(self, shack_hartmann: ShackHartmannBuilder) -> Self {
        Self {
            shack_hartmann,
            ..self
        }
    }
    pub fn ccd(self, ccd: CcdBuilder) -> Self {
        Self { ccd, ..self }
    }
    pub fn disturbance(self, disturbance: Disturbance) -> Self {
        Self {
            disturbance,
            ..self
        }
    }
    pub fn error_source(self, error_source: ErrorSource) -> Self {
        Self {
            error_source,
            ..self
        }
    }
    /// Sets the time between 2 frames in seconds
    pub fn interval(self, interval: f64) -> Self {
        Self { interval, ..self }
    }
    pub fn snapshot_prefix<P: Into<PathBuf>>(self, prefix: P) -> Self {
        Self {
            snapshot_prefix: prefix.into(),
            ..self
        }
    }
    pub fn seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }
    /// Sets the atmosphere phase screen from an image in memory
    pub fn phase_screen(self, image: ImageData) -> Self {
        Self {
            atmosphere: self.atmosphere.phase_screen(image),
            ..self
        }
    }
    /// Sets the wind in pixels per frame
    pub fn wind(self, vx: i32, vy: i32) -> Self {
        Self {
            atmosphere: self.atmosphere.wind(vx, vy),
            ..self
        }
    }
    pub fn wind_mode(self, wind_mode: WindMode) -> Self {
        Self {
            atmosphere: self.atmosphere.wind_mode(wind_mode),
            ..self
        }
    }
    /// Sets a circular telescope pupil, see [TelescopeBuilder::circular]
    pub fn circular_aperture(self, radius: f64) -> Self {
        Self {
            telescope: self.telescope.circular(radius),
            ..self
        }
    }
    /// Sets the telescope pupil from an image in memory
    pub fn aperture_mask(self, mask: ImageData) -> Self {
        Self {
            telescope: self.telescope.mask(mask),
            ..self
        }
    }
    /// Sets the deformable mirror influence pattern from an image in memory
    ///
    /// The pattern is ignored if the corrector is a tip-tilt stage
    pub fn influence(self, image: ImageData) -> Self {
        match self.corrector {
            CorrectorKind::DeformableMirror(dm) => Self {
                corrector: CorrectorKind::DeformableMirror(dm.influence(image)),
                ..self
            },
            CorrectorKind::TipTilt => {
                log::warn!("no influence pattern for a tip-tilt corrector");
                self
            }
        }
    }
    /// Tiles the frame with `nx`x`ny` Shack-Hartmann subapertures
    pub fn regular_grid(self, nx: usize, ny: usize) -> Self {
        Self {
            shack_hartmann: self.shack_hartmann.regular_grid(nx, ny),
            ..self
        }
    }
    pub fn seeing(self, seeing: f64) -> Self {
        Self {
            shack_hartmann: self.shack_hartmann.seeing(seeing),
            ..self
        }
    }
    pub fn noise(self, noise: f64) -> Self {
        Self {
            ccd: self.ccd.noise(noise),
            ..self
        }
    }
}
impl Builder for SimulatorBuilder {
    type Component = Simulator;
    fn build(self) -> crate::Result<Simulator> {
        if !(self.interval.is_finite() && self.interval >= 0.) {
            return Err(SimulatorBuilderError::Interval(self.interval).into());
        }
        let (width, height) = self.resolution;
        let seed = self.seed;

        let atmosphere = self
            .atmosphere
            .frame(width, height)
            .seed(seed)
            .build()?;
        let telescope = self.telescope.resolution(width, height).build()?;
        let corrector_kind = match self.corrector {
            CorrectorKind::DeformableMirror(dm) => {
                CorrectorKind::DeformableMirror(dm.resolution(width, height).pupil(&telescope))
            }
            CorrectorKind::TipTilt => CorrectorKind::TipTilt,
        };
        let corrector = corrector_kind.build()?;
        let error_corrector = corrector_kind.build()?;
        let wfs = self
            .shack_hartmann
            .resolution(width, height)
            .pupil(&telescope)
            .build()?;
        let ccd = self.ccd.seed(seed.wrapping_add(1)).build()?;
        let n_actuator = corrector.n_actuator();
        let injector = WfcErrorInjector::new(self.disturbance, n_actuator, seed.wrapping_add(2));

        log::info!(
            "Simulator: {}x{} frames, {} with {} actuators, error source: {:?}",
            width,
            height,
            corrector.name(),
            n_actuator,
            self.error_source
        );
        Ok(Simulator {
            atmosphere,
            telescope,
            corrector,
            error_corrector,
            injector,
            wfs,
            ccd,
            wavefront: Wavefront::new(width, height),
            control: vec![0f32; n_actuator],
            error_source: self.error_source,
            calibration: None,
            interval: Duration::from_secs_f64(self.interval),
            snapshot: Snapshot {
                prefix: self.snapshot_prefix,
                remaining: 0,
            },
            frame_count: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeformableMirrorBuilder, FromBuilder, SimError};

    #[test]
    fn toml() {
        let path = std::env::temp_dir().join("aosim-simulator-builder.toml");
        let builder = Simulator::builder()
            .resolution(128, 96)
            .corrector(CorrectorKind::DeformableMirror(
                DeformableMirrorBuilder::default().actuator_grid(5, 4),
            ))
            .wind(3, -2)
            .wind_mode(WindMode::Random)
            .seeing(0.6)
            .noise(4.)
            .disturbance(Disturbance::RandomWalk { step: 0.025 })
            .error_source(ErrorSource::Wfc)
            .interval(0.02)
            .seed(7);
        builder.save(&path).unwrap();
        let loaded = SimulatorBuilder::load(&path).unwrap();
        assert_eq!(loaded, builder);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn tiptilt_toml() {
        let builder = Simulator::builder().corrector(CorrectorKind::TipTilt);
        let loaded: SimulatorBuilder =
            toml::from_str(&toml::to_string_pretty(&builder).unwrap()).unwrap();
        assert_eq!(loaded.corrector, CorrectorKind::TipTilt);
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            SimulatorBuilder::load("does/not/exist.toml"),
            Err(SimulatorBuilderError::Open(..))
        ));
    }

    #[test]
    fn negative_interval() {
        let sim = Simulator::builder().interval(-1.).build();
        assert!(matches!(
            sim,
            Err(SimError::Simulator(SimulatorBuilderError::Interval(_)))
        ));
    }

    #[test]
    fn missing_phase_screen() {
        assert!(matches!(
            Simulator::builder().build(),
            Err(SimError::Atmosphere(_))
        ));
    }
}
