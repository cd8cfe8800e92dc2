//!
//! # Wavefront corrector error injection
//!
//! For closed loop self-tests, the wavefront error is produced by a second corrector of the
//! same kind as the one in the loop, driven by a synthetic disturbance.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    corrector::{ActuationMode, WavefrontCorrector},
    Wavefront,
};

/// Synthetic actuator disturbances
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disturbance {
    /// all the actuators follow the same triangular wave of `period` frames
    Periodic { period: u64 },
    /// every actuator steps uniformly within [-step,step] each frame
    RandomWalk { step: f32 },
}
impl Default for Disturbance {
    fn default() -> Self {
        Self::Periodic { period: 40 }
    }
}

/// Actuator disturbance generator
#[derive(Debug, Clone)]
pub struct WfcErrorInjector {
    disturbance: Disturbance,
    tick: u64,
    control: Vec<f32>,
    rng: StdRng,
}
impl WfcErrorInjector {
    /// Creates an injector for `n_actuator` actuators
    pub fn new(disturbance: Disturbance, n_actuator: usize, seed: u64) -> Self {
        Self {
            disturbance,
            tick: 0,
            control: vec![0f32; n_actuator],
            rng: StdRng::seed_from_u64(seed),
        }
    }
    pub fn disturbance(&self) -> Disturbance {
        self.disturbance
    }
    pub fn set_disturbance(&mut self, disturbance: Disturbance) -> &mut Self {
        self.disturbance = disturbance;
        self
    }
    /// Returns the current actuator disturbance
    pub fn control(&self) -> &[f32] {
        &self.control
    }
    /// Resizes the disturbance vector, new actuators start at 0
    pub fn resize(&mut self, n_actuator: usize) -> &mut Self {
        self.control.resize(n_actuator, 0.);
        self
    }
    /// Zeroes the disturbance and restarts the periodic wave
    pub fn reset(&mut self) -> &mut Self {
        self.tick = 0;
        self.control.fill(0.);
        self
    }
    /// Computes the next disturbance
    pub fn next(&mut self) -> &[f32] {
        match self.disturbance {
            Disturbance::Periodic { period } => {
                let period = period.max(1);
                self.tick += 1;
                let phase = (self.tick % period) as f32 / period as f32;
                let value = ((phase * 2. - 1.).abs() * 2. - 1.).clamp(-1., 1.);
                self.control.fill(value);
            }
            Disturbance::RandomWalk { step } => {
                let step = step.abs();
                for c in self.control.iter_mut() {
                    let delta = if step > 0. {
                        self.rng.gen_range(-step..=step)
                    } else {
                        0.
                    };
                    *c = (*c + delta).clamp(-1., 1.);
                }
            }
        }
        &self.control
    }
    /// Drives the error `corrector` with the next disturbance, overwriting the wavefront
    pub fn inject<C>(&mut self, corrector: &mut C, wavefront: &mut Wavefront)
    where
        C: WavefrontCorrector + ?Sized,
    {
        if self.control.len() != corrector.n_actuator() {
            self.resize(corrector.n_actuator());
        }
        self.next();
        corrector.actuate(&self.control, ActuationMode::Set, wavefront);
    }
}
