//!
//! # Adaptive optics simulator
//!
//! `aosim` stands in for the optical train of an adaptive optics system: a turbulent
//! phase screen scrolled by the wind, the telescope pupil, a tip-tilt stage or a
//! deformable mirror, a Shack-Hartmann wavefront sensor and its CCD.
//! Elements are created using the builder associated to each element and a
//! [`Wavefront`] is propagated through them:
//! ```
//! use aosim::{ActuationMode, Builder, FromBuilder, Telescope, TipTilt, Wavefront, WavefrontCorrector};
//! let mut tel = Telescope::builder().resolution(64, 64).circular(0.9).build().unwrap();
//! let mut tt = TipTilt::new();
//! let mut wf = Wavefront::new(64, 64);
//! tt.actuate(&[0.2, -0.1], ActuationMode::Set, &mut wf);
//! wf.through(&mut tel);
//! println!("wavefront: {:?}", wf.stats());
//! ```
//! The complete pipeline is assembled by the [`Simulator`] and driven frame after frame
//! by the acquisition thread of a [`Camera`].

pub mod atmosphere;
pub mod calibration;
pub mod camera;
pub mod ccd;
pub mod corrector;
pub mod deformable_mirror;
pub mod error;
pub mod error_injector;
pub mod frame;
pub mod image_io;
pub mod shackhartmann;
pub mod simulator;
pub mod telescope;
pub mod tiptilt;
pub mod wavefront;
pub mod wfc;

#[doc(inline)]
pub use self::atmosphere::{
    Atmosphere, AtmosphereBuilder, AtmosphereError, PhaseScreen, Viewport, WindMode, WindVector,
};
#[doc(inline)]
pub use self::calibration::{CalibrationError, CalibrationField};
#[doc(inline)]
pub use self::camera::{Camera, CameraBackend, CameraError, CameraMode};
#[doc(inline)]
pub use self::ccd::{Ccd, CcdBuilder, CcdError};
#[doc(inline)]
pub use self::corrector::{ActuationMode, Corrector, CorrectorKind, WavefrontCorrector};
#[doc(inline)]
pub use self::deformable_mirror::{
    DeformableMirror, DeformableMirrorBuilder, DeformableMirrorError, InfluencePattern,
    PatternSource, SolveReport,
};
#[doc(inline)]
pub use self::error::SimError;
#[doc(inline)]
pub use self::error_injector::{Disturbance, WfcErrorInjector};
#[doc(inline)]
pub use self::frame::{Frame, Stats};
#[doc(inline)]
pub use self::image_io::{ImageData, ImageError};
#[doc(inline)]
pub use self::shackhartmann::{
    GridLayout, GridShape, GridSource, ShackHartmann, ShackHartmannBuilder, ShackHartmannError,
    Subaperture, SubapertureGrid,
};
#[doc(inline)]
pub use self::simulator::{
    CalibrationMode, ErrorSource, Simulator, SimulatorBuilder, SimulatorBuilderError,
};
#[doc(inline)]
pub use self::telescope::{Aperture, Telescope, TelescopeBuilder, TelescopeError};
#[doc(inline)]
pub use self::tiptilt::TipTilt;
#[doc(inline)]
pub use self::wavefront::{Propagation, Wavefront};
#[doc(inline)]
pub use self::wfc::{Gain, Wfc, WfcError};

/// Simulator element macro builder
///
/// Builds an element with its default builder, optionally calling some of the builder setters
///
/// # Examples
///
/// ```
/// use aosim::aosim;
/// let tel = aosim!(TelescopeBuilder, resolution = [64, 64], circular = [0.5]);
/// assert!(tel.n_inside() > 0);
/// ```
#[macro_export]
macro_rules! aosim {
    ($element:ident) => {
        $crate::Builder::build(<$crate::$element as $crate::Builder>::new()).unwrap()
    };
    ($element:ident, $($arg:ident = [$($val:expr),*]),*) => {
        $crate::Builder::build(<$crate::$element as $crate::Builder>::new()$(.$arg($($val),*))*).unwrap()
    };
}

pub type Result<T> = std::result::Result<T, SimError>;

/// Simulator element builder type trait
pub trait Builder: Default {
    type Component;
    fn new() -> Self {
        Default::default()
    }
    fn build(self) -> Result<Self::Component>;
}

/// Gives access to the builder of a simulator element
pub trait FromBuilder: Sized {
    type ComponentBuilder: Builder<Component = Self>;
    fn builder() -> Self::ComponentBuilder {
        Self::ComponentBuilder::default()
    }
}
