use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{image_io::ImageData, Builder, DeformableMirrorError, Telescope};

use super::{
    default_max_iterations, sor_omega, DeformableMirror, InfluencePattern, SolveReport,
    AMPLITUDE, CONVERGENCE_LIMIT,
};

/// Origin of the actuator influence pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSource {
    /// 8 bits image where each pixel is an actuator id
    File(PathBuf),
    /// regular grid of `nx`x`ny` square actuators
    Grid(usize, usize),
}

/// [`DeformableMirror`] builder type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeformableMirrorBuilder {
    /// Frame resolution as (width,height)
    pub resolution: (usize, usize),
    pub pattern: PatternSource,
    /// Mirror figure to phase scaling
    pub amplitude: f32,
    /// Maximum number of SOR sweeps, defaults to `2*sqrt(width*height)`
    pub max_iterations: Option<usize>,
    pub convergence_limit: f64,
    /// Removes the forcing of the bias voltage such as a zero command is a flat mirror
    pub subtract_bias: bool,
    #[serde(skip)]
    influence: Option<ImageData>,
    #[serde(skip)]
    pupil: Option<Vec<bool>>,
}
/// Default properties:
///  * resolution        : 256x256
///  * pattern           : 6x6 actuator grid
///  * amplitude         : 5
///  * max iterations    : 2*sqrt(256*256)
///  * convergence limit : 1e-8
///  * subtract bias     : true
impl Default for DeformableMirrorBuilder {
    fn default() -> Self {
        Self {
            resolution: (256, 256),
            pattern: PatternSource::Grid(6, 6),
            amplitude: AMPLITUDE,
            max_iterations: None,
            convergence_limit: CONVERGENCE_LIMIT,
            subtract_bias: true,
            influence: None,
            pupil: None,
        }
    }
}
impl DeformableMirrorBuilder {
    pub fn resolution(self, width: usize, height: usize) -> Self {
        Self {
            resolution: (width, height),
            ..self
        }
    }
    /// Sets the influence pattern image file
    pub fn pattern_file<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            pattern: PatternSource::File(path.into()),
            ..self
        }
    }
    /// Sets a regular grid of `nx`x`ny` actuators
    pub fn actuator_grid(self, nx: usize, ny: usize) -> Self {
        Self {
            pattern: PatternSource::Grid(nx, ny),
            ..self
        }
    }
    /// Sets the influence pattern from an image in memory, takes precedence over the pattern source
    pub fn influence(self, image: ImageData) -> Self {
        Self {
            influence: Some(image),
            ..self
        }
    }
    /// Pins the mirror outside the telescope pupil
    pub fn pupil(self, telescope: &Telescope) -> Self {
        Self {
            pupil: Some(telescope.mask().to_vec()),
            ..self
        }
    }
    pub fn amplitude(self, amplitude: f32) -> Self {
        Self { amplitude, ..self }
    }
    pub fn max_iterations(self, max_iterations: usize) -> Self {
        Self {
            max_iterations: Some(max_iterations),
            ..self
        }
    }
    pub fn convergence_limit(self, convergence_limit: f64) -> Self {
        Self {
            convergence_limit,
            ..self
        }
    }
    /// Uses the raw electrostatic forcing, a zero command then bends the mirror
    pub fn raw_forcing(self) -> Self {
        Self {
            subtract_bias: false,
            ..self
        }
    }
}
impl Builder for DeformableMirrorBuilder {
    type Component = DeformableMirror;
    fn build(self) -> crate::Result<DeformableMirror> {
        let (width, height) = self.resolution;
        let pattern = match (self.influence, &self.pattern) {
            (Some(image), _) => InfluencePattern::from(image),
            (None, PatternSource::File(path)) => InfluencePattern::from(ImageData::load(path)?),
            (None, PatternSource::Grid(nx, ny)) => InfluencePattern::grid(width, height, *nx, *ny)?,
        };
        if pattern.resolution() != self.resolution {
            return Err(DeformableMirrorError::Size {
                pattern: pattern.resolution(),
                frame: self.resolution,
            }
            .into());
        }
        let n_actuator = pattern.n_actuator();
        if n_actuator == 0 {
            return Err(DeformableMirrorError::NoActuator.into());
        }
        let pupil = match self.pupil {
            Some(pupil) if pupil.len() == width * height => pupil,
            Some(pupil) => {
                log::warn!(
                    "DeformableMirror: pupil with {} pixels ignored, expected {}",
                    pupil.len(),
                    width * height
                );
                vec![true; width * height]
            }
            None => vec![true; width * height],
        };
        let max_iterations = self
            .max_iterations
            .unwrap_or_else(|| default_max_iterations(width, height));
        log::info!(
            "DeformableMirror: {} actuators, {}x{} figure, {} SOR sweeps max.",
            n_actuator,
            width,
            height,
            max_iterations
        );
        Ok(DeformableMirror {
            width,
            height,
            pattern,
            pupil,
            n_actuator,
            amplitude: self.amplitude,
            max_iterations,
            limit: self.convergence_limit,
            subtract_bias: self.subtract_bias,
            omega: sor_omega(width, height),
            commands: vec![0f32; n_actuator],
            forcing: vec![0f32; width * height],
            resp: vec![0f32; width * height],
            report: SolveReport::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FromBuilder, SimError};

    #[test]
    fn omega() {
        let dm = DeformableMirror::builder()
            .resolution(64, 64)
            .build()
            .unwrap();
        assert!(dm.omega() > 1. && dm.omega() < 2.);
        assert_eq!(dm.max_iterations, 128);
    }

    #[test]
    fn influence_image() {
        let mut samples = vec![0u8; 64];
        samples[9] = 3;
        samples[10] = 1;
        let dm = DeformableMirror::builder()
            .resolution(8, 8)
            .influence(ImageData::new(samples, 8, 8).unwrap())
            .build()
            .unwrap();
        assert_eq!(dm.n_actuator, 3);
        assert_eq!(dm.commands().len(), 3);
    }

    #[test]
    fn empty_pattern() {
        let dm = DeformableMirror::builder()
            .resolution(8, 8)
            .influence(ImageData::filled(8, 8, 0))
            .build();
        assert!(matches!(
            dm,
            Err(SimError::DeformableMirror(DeformableMirrorError::NoActuator))
        ));
    }

    #[test]
    fn toml() {
        let builder = DeformableMirrorBuilder::default()
            .pattern_file("dm37.pgm")
            .max_iterations(10)
            .raw_forcing();
        let loaded: DeformableMirrorBuilder =
            toml::from_str(&toml::to_string(&builder).unwrap()).unwrap();
        assert_eq!(loaded, builder);
    }
}
