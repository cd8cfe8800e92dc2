//!
//! # Wavefront correctors
//!
//! A wavefront corrector turns a vector of actuator commands into a wavefront shape.
//! The simulator uses one corrector to correct the wavefront and a second one of the same
//! kind to inject errors into it.

use serde::{Deserialize, Serialize};

use crate::{Builder, DeformableMirror, DeformableMirrorBuilder, TipTilt, Wavefront};

/// Corrector actuation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActuationMode {
    /// the corrector shape overwrites the wavefront
    #[default]
    Set,
    /// the corrector shape is added to the wavefront
    Add,
}

/// Wavefront corrector interface
pub trait WavefrontCorrector {
    /// Number of actuators
    fn n_actuator(&self) -> usize;
    /// Shapes the corrector according to `control` and applies it to the wavefront
    fn actuate(&mut self, control: &[f32], mode: ActuationMode, wavefront: &mut Wavefront);
    /// Brings the corrector back to rest
    fn reset(&mut self);
}

/// Corrector types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectorKind {
    TipTilt,
    DeformableMirror(DeformableMirrorBuilder),
}
impl Default for CorrectorKind {
    fn default() -> Self {
        Self::DeformableMirror(Default::default())
    }
}
impl CorrectorKind {
    /// Builds a corrector
    pub fn build(&self) -> crate::Result<Corrector> {
        Ok(match self {
            Self::TipTilt => Corrector::TipTilt(TipTilt::new()),
            Self::DeformableMirror(builder) => {
                Corrector::DeformableMirror(Box::new(builder.clone().build()?))
            }
        })
    }
}

/// Either a tip-tilt stage or a deformable mirror
pub enum Corrector {
    TipTilt(TipTilt),
    DeformableMirror(Box<DeformableMirror>),
}
impl Corrector {
    /// Returns the corrector name
    pub fn name(&self) -> &str {
        match self {
            Self::TipTilt(_) => "tip-tilt",
            Self::DeformableMirror(_) => "deformable mirror",
        }
    }
    pub fn as_deformable_mirror(&self) -> Option<&DeformableMirror> {
        match self {
            Self::DeformableMirror(dm) => Some(&**dm),
            _ => None,
        }
    }
}
impl WavefrontCorrector for Corrector {
    fn n_actuator(&self) -> usize {
        match self {
            Self::TipTilt(tt) => tt.n_actuator(),
            Self::DeformableMirror(dm) => dm.n_actuator(),
        }
    }
    fn actuate(&mut self, control: &[f32], mode: ActuationMode, wavefront: &mut Wavefront) {
        match self {
            Self::TipTilt(tt) => tt.actuate(control, mode, wavefront),
            Self::DeformableMirror(dm) => dm.actuate(control, mode, wavefront),
        }
    }
    fn reset(&mut self) {
        match self {
            Self::TipTilt(tt) => WavefrontCorrector::reset(tt),
            Self::DeformableMirror(dm) => WavefrontCorrector::reset(&mut **dm),
        }
    }
}
