//!
//! # Atmospheric turbulence
//!
//! A static phase screen, much larger than the detector frame, is scrolled across the
//! telescope pupil by the wind: every frame, the viewport origin moves by the wind vector
//! and the frame size window at the origin is cropped into the [Wavefront].
//! When the viewport would leave the screen along an axis, the wind is reflected on that axis.

use rand::{rngs::StdRng, Rng};
use serde::{Deserialize, Serialize};

use crate::{image_io::ImageData, FromBuilder, Propagation, Wavefront};

mod builder;
pub use builder::AtmosphereBuilder;

#[derive(Debug, thiserror::Error)]
pub enum AtmosphereError {
    #[error("no phase screen given to `::aosim::AtmosphereBuilder`")]
    NoScreen,
    #[error("phase screen {screen:?} is smaller than the frame {frame:?}")]
    ScreenTooSmall {
        screen: (usize, usize),
        frame: (usize, usize),
    },
    #[error("viewport at {origin:?} puts frame {frame:?} outside the phase screen {screen:?}")]
    Viewport {
        origin: Viewport,
        frame: (usize, usize),
        screen: (usize, usize),
    },
}
pub type Result<T> = std::result::Result<T, AtmosphereError>;

/// Wind velocity in pixels per frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WindVector {
    pub vx: i32,
    pub vy: i32,
}
impl WindVector {
    pub fn new(vx: i32, vy: i32) -> Self {
        Self { vx, vy }
    }
    pub fn is_zero(&self) -> bool {
        self.vx == 0 && self.vy == 0
    }
}

/// Origin of the frame window into the phase screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
}
impl Viewport {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Scanning method of the phase screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindMode {
    /// constant wind, reflected at the screen edges
    #[default]
    Linear,
    /// a new step is drawn every frame within the wind speed bounds
    Random,
}

/// Turbulence phase screen
///
/// The screen is loaded once and is never modified afterwards
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PhaseScreen {
    samples: Vec<f32>,
    width: usize,
    height: usize,
}
impl PhaseScreen {
    /// Returns the screen resolution as (width,height)
    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}
impl From<ImageData> for PhaseScreen {
    fn from(image: ImageData) -> Self {
        Self {
            samples: image.samples.into_iter().map(|x| x as f32).collect(),
            width: image.width,
            height: image.height,
        }
    }
}

/// Phase screen scroller
pub struct Atmosphere {
    screen: PhaseScreen,
    frame: (usize, usize),
    origin: Viewport,
    // wind speed bounds as configured
    speed: WindVector,
    // current wind, its sign flips at the screen edges
    wind: WindVector,
    wind_mode: WindMode,
    rng: StdRng,
}
impl FromBuilder for Atmosphere {
    type ComponentBuilder = AtmosphereBuilder;
}
impl Atmosphere {
    /// Returns the phase screen
    pub fn screen(&self) -> &PhaseScreen {
        &self.screen
    }
    /// Returns the frame resolution as (width,height)
    pub fn frame(&self) -> (usize, usize) {
        self.frame
    }
    /// Returns the viewport origin
    pub fn origin(&self) -> Viewport {
        self.origin
    }
    /// Returns the current wind vector
    pub fn wind(&self) -> WindVector {
        self.wind
    }
    pub fn wind_mode(&self) -> WindMode {
        self.wind_mode
    }
    pub fn set_wind_mode(&mut self, wind_mode: WindMode) -> &mut Self {
        self.wind_mode = wind_mode;
        self
    }
    /// Sets the wind vector
    ///
    /// The wind is set to zero along any axis where the phase screen is not at least
    /// as large as the frame plus twice the wind speed
    pub fn set_wind(&mut self, wind: WindVector) -> &mut Self {
        let (screen_width, screen_height) = self.screen.resolution();
        let (width, height) = self.frame;
        let mut wind = wind;
        if screen_width < width + 2 * wind.vx.unsigned_abs() as usize {
            log::warn!(
                "phase screen too small ({}px) for x-wind ({}px/frame), setting to zero",
                screen_width,
                wind.vx
            );
            wind.vx = 0;
        }
        if screen_height < height + 2 * wind.vy.unsigned_abs() as usize {
            log::warn!(
                "phase screen too small ({}px) for y-wind ({}px/frame), setting to zero",
                screen_height,
                wind.vy
            );
            wind.vy = 0;
        }
        self.speed = wind;
        self.wind = wind;
        self
    }
    /// Moves the viewport origin by the wind vector
    ///
    /// If the viewport leaves the phase screen along an axis, the wind is reversed along that
    /// axis and the origin moves twice in the new direction to cancel the step just taken
    pub fn advance(&mut self) -> &mut Self {
        if self.speed.is_zero() {
            return self;
        }
        if let WindMode::Random = self.wind_mode {
            let (sx, sy) = (self.speed.vx.abs(), self.speed.vy.abs());
            self.wind = WindVector::new(
                self.rng.gen_range(-sx..=sx),
                self.rng.gen_range(-sy..=sy),
            );
        }
        let (screen_width, screen_height) = self.screen.resolution();
        let (width, height) = self.frame;
        self.origin.x += self.wind.vx;
        self.origin.y += self.wind.vy;
        if self.origin.x as i64 + width as i64 >= screen_width as i64 {
            self.wind.vx *= -1;
            self.origin.x += 2 * self.wind.vx;
        }
        if self.origin.x < 0 {
            self.wind.vx *= -1;
            self.origin.x += 2 * self.wind.vx;
        }
        if self.origin.y as i64 + height as i64 >= screen_height as i64 {
            self.wind.vy *= -1;
            self.origin.y += 2 * self.wind.vy;
        }
        if self.origin.y < 0 {
            self.wind.vy *= -1;
            self.origin.y += 2 * self.wind.vy;
        }
        log::trace!("viewport origin: {:?}", self.origin);
        self
    }
    /// Copies the frame window at the viewport origin into the wavefront
    pub fn crop(&self, wavefront: &mut Wavefront) {
        let (width, height) = self.frame;
        let (screen_width, _) = self.screen.resolution();
        let (x0, y0) = (self.origin.x as usize, self.origin.y as usize);
        wavefront.resize(width, height);
        wavefront
            .phase_mut()
            .chunks_mut(width)
            .enumerate()
            .for_each(|(i, row)| {
                let k = (y0 + i) * screen_width + x0;
                row.copy_from_slice(&self.screen.samples[k..k + width]);
            });
    }
}
impl Propagation for Atmosphere {
    /// Scrolls the screen and crops the new window into the wavefront
    fn propagate(&mut self, wavefront: &mut Wavefront) {
        self.advance().crop(wavefront);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Builder;

    fn ramp_screen(width: usize, height: usize) -> ImageData {
        ImageData::new(
            (0..width * height).map(|i| (i % 251) as u8).collect(),
            width,
            height,
        )
        .unwrap()
    }

    fn atmosphere(screen: (usize, usize), frame: (usize, usize), wind: (i32, i32)) -> Atmosphere {
        Atmosphere::builder()
            .phase_screen(ramp_screen(screen.0, screen.1))
            .frame(frame.0, frame.1)
            .wind(wind.0, wind.1)
            .seed(7)
            .build()
            .unwrap()
    }

    #[test]
    fn no_wind_is_noop() {
        let mut atm = atmosphere((64, 64), (16, 16), (0, 0));
        let origin = atm.origin();
        for _ in 0..10 {
            atm.advance();
        }
        assert_eq!(atm.origin(), origin);
    }

    #[test]
    fn reflection_keeps_viewport_in_screen() {
        for (wind, origin) in [((5, 3), (0, 0)), ((-4, 7), (20, 30)), ((9, -9), (48, 40))] {
            let mut atm = Atmosphere::builder()
                .phase_screen(ramp_screen(128, 96))
                .frame(32, 32)
                .wind(wind.0, wind.1)
                .origin(origin.0, origin.1)
                .build()
                .unwrap();
            for _ in 0..1000 {
                let Viewport { x, y } = atm.advance().origin();
                assert!(x >= 0 && x + 32 <= 128, "x origin out of bounds: {x}");
                assert!(y >= 0 && y + 32 <= 96, "y origin out of bounds: {y}");
            }
        }
    }

    #[test]
    fn random_wind_stays_in_screen() {
        let mut atm = atmosphere((80, 80), (32, 32), (6, 6));
        atm.set_wind_mode(WindMode::Random);
        for _ in 0..1000 {
            let Viewport { x, y } = atm.advance().origin();
            assert!(x >= 0 && x + 32 <= 80);
            assert!(y >= 0 && y + 32 <= 80);
            assert!(atm.wind().vx.abs() <= 6 && atm.wind().vy.abs() <= 6);
        }
    }

    #[test]
    fn wind_does_not_oscillate() {
        let mut atm = atmosphere((512, 512), (32, 32), (5, 2));
        let mut flips = 0;
        let mut previous = atm.wind();
        for _ in 0..500 {
            let wind = atm.advance().wind();
            if wind.vx != previous.vx {
                flips += 1;
            }
            previous = wind;
        }
        // 500 steps of 5px over a 480px range
        assert!(flips <= 6, "{flips} wind flips");
    }

    #[test]
    fn wind_too_large_is_zeroed() {
        let atm = atmosphere((64, 40), (32, 32), (10, 5));
        assert_eq!(atm.wind(), WindVector::new(10, 0));
    }

    #[test]
    fn crop_copies_window() {
        let mut atm = atmosphere((64, 48), (8, 4), (3, 2));
        let mut wf = Wavefront::default();
        wf.through(&mut atm);
        let Viewport { x, y } = atm.origin();
        assert_eq!((x, y), (3, 2));
        assert_eq!(wf.resolution(), (8, 4));
        for i in 0..4 {
            for j in 0..8 {
                let k = (y as usize + i) * 64 + x as usize + j;
                assert_eq!(wf.phase()[i * 8 + j], (k % 251) as f32);
            }
        }
    }

    #[test]
    fn screen_smaller_than_frame() {
        let atm = Atmosphere::builder()
            .phase_screen(ramp_screen(16, 16))
            .frame(32, 8)
            .build();
        assert!(atm.is_err());
    }
}
