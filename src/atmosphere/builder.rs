use std::path::PathBuf;

use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{image_io::ImageData, AtmosphereError, Builder, SimError};

use super::{Atmosphere, PhaseScreen, Viewport, WindMode, WindVector};

/// [`Atmosphere`] builder type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtmosphereBuilder {
    /// Phase screen image file
    pub wavefront_file: Option<PathBuf>,
    /// Frame resolution as (width,height)
    pub frame: (usize, usize),
    /// Initial viewport origin
    pub origin: Viewport,
    pub wind: WindVector,
    pub wind_mode: WindMode,
    pub seed: u64,
    #[serde(skip)]
    phase_screen: Option<ImageData>,
}
/// Default properties:
///  * wavefront file : none
///  * frame          : 256x256
///  * origin         : (0,0)
///  * wind           : (5,5) pixels/frame
///  * wind mode      : linear
///  * seed           : 0
impl Default for AtmosphereBuilder {
    fn default() -> Self {
        Self {
            wavefront_file: None,
            frame: (256, 256),
            origin: Viewport::default(),
            wind: WindVector::new(5, 5),
            wind_mode: WindMode::Linear,
            seed: 0,
            phase_screen: None,
        }
    }
}

/// ## `Atmosphere` builder
impl AtmosphereBuilder {
    /// Sets the phase screen image file
    pub fn wavefront_file<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            wavefront_file: Some(path.into()),
            ..self
        }
    }
    /// Sets the phase screen from an image in memory, takes precedence over the image file
    pub fn phase_screen(self, image: ImageData) -> Self {
        Self {
            phase_screen: Some(image),
            ..self
        }
    }
    /// Sets the frame resolution
    pub fn frame(self, width: usize, height: usize) -> Self {
        Self {
            frame: (width, height),
            ..self
        }
    }
    /// Sets the initial viewport origin
    pub fn origin(self, x: i32, y: i32) -> Self {
        Self {
            origin: Viewport::new(x, y),
            ..self
        }
    }
    /// Sets the wind in pixels per frame
    pub fn wind(self, vx: i32, vy: i32) -> Self {
        Self {
            wind: WindVector::new(vx, vy),
            ..self
        }
    }
    pub fn wind_mode(self, wind_mode: WindMode) -> Self {
        Self { wind_mode, ..self }
    }
    /// Sets the seed of the random wind generator
    pub fn seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }
}
impl Builder for AtmosphereBuilder {
    type Component = Atmosphere;
    /// Builds the `Atmosphere`
    fn build(self) -> crate::Result<Atmosphere> {
        let image = match (self.phase_screen, &self.wavefront_file) {
            (Some(image), _) => image,
            (None, Some(path)) => ImageData::load(path)?,
            (None, None) => return Err(AtmosphereError::NoScreen.into()),
        };
        let screen = PhaseScreen::from(image);
        let (screen_width, screen_height) = screen.resolution();
        let (width, height) = self.frame;
        if screen_width < width || screen_height < height {
            return Err(AtmosphereError::ScreenTooSmall {
                screen: screen.resolution(),
                frame: self.frame,
            }
            .into());
        }
        let Viewport { x, y } = self.origin;
        if x < 0
            || y < 0
            || x as usize + width > screen_width
            || y as usize + height > screen_height
        {
            return Err(SimError::from(AtmosphereError::Viewport {
                origin: self.origin,
                frame: self.frame,
                screen: screen.resolution(),
            }));
        }
        log::info!(
            "Atmosphere: {}x{} phase screen, {}x{} frame, wind {:?} ({:?})",
            screen_width,
            screen_height,
            width,
            height,
            self.wind,
            self.wind_mode
        );
        let mut atm = Atmosphere {
            screen,
            frame: self.frame,
            origin: self.origin,
            speed: WindVector::default(),
            wind: WindVector::default(),
            wind_mode: self.wind_mode,
            rng: StdRng::seed_from_u64(self.seed),
        };
        atm.set_wind(self.wind);
        Ok(atm)
    }
}
