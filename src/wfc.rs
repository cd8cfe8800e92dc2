//!
//! # Wavefront corrector control
//!
//! [Wfc] holds the control state of a wavefront corrector: the target actuator values, an
//! offset added to the target and the control vector sent to the actuators.
//! The control vector is `M·(target + offset)` where `M` is an optional actuation matrix
//! mapping virtual actuators onto the physical ones, and it is always within [-1,1].
//! The target follows the wavefront error through a PID update.
//!
//! ```
//! use aosim::{Gain, Wfc};
//! let mut wfc = Wfc::new(4);
//! wfc.update_control(&[0.5, -0.5, 0., 2.], Gain::proportional(0.5), 1.).unwrap();
//! assert_eq!(wfc.control(), &[0.25, -0.25, 0., 1.]);
//! ```

use nalgebra::{DMatrix, DVector};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum WfcError {
    #[error("actuator #{index} does not exist, there are {n_actuator} actuators")]
    ActuatorIndex { index: usize, n_actuator: usize },
    #[error("no waffle pattern")]
    NoWaffle,
    #[error("expected {expected} values, found {found}")]
    Size { expected: usize, found: usize },
}
type Result<T> = std::result::Result<T, WfcError>;

/// Control loop gains
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Gain {
    pub p: f32,
    pub i: f32,
    pub d: f32,
}
impl Gain {
    /// Proportional only gain
    pub fn proportional(p: f32) -> Self {
        Self { p, ..Default::default() }
    }
}

/// Wavefront corrector control state
#[derive(Debug, Clone)]
pub struct Wfc {
    actuation: Option<DMatrix<f32>>,
    target: DVector<f32>,
    offset: DVector<f32>,
    previous: DVector<f32>,
    integral: DVector<f32>,
    last_error: DVector<f32>,
    ctrl: DVector<f32>,
    max_act: f32,
    waffle_even: Vec<usize>,
    waffle_odd: Vec<usize>,
    rng: StdRng,
}
impl Wfc {
    /// Creates the control state of a corrector with `n_actuator` actuators
    pub fn new(n_actuator: usize) -> Self {
        Self {
            actuation: None,
            target: DVector::zeros(n_actuator),
            offset: DVector::zeros(n_actuator),
            previous: DVector::zeros(n_actuator),
            integral: DVector::zeros(n_actuator),
            last_error: DVector::zeros(n_actuator),
            ctrl: DVector::zeros(n_actuator),
            max_act: 1.,
            waffle_even: vec![],
            waffle_odd: vec![],
            rng: StdRng::seed_from_u64(0),
        }
    }
    /// Maps virtual actuators onto the physical ones with a `n_actuator`x`n_virtual` matrix
    pub fn with_actuation_map(self, actuation: DMatrix<f32>) -> Result<Self> {
        if actuation.nrows() != self.n_actuator() {
            return Err(WfcError::Size {
                expected: self.n_actuator(),
                found: actuation.nrows(),
            });
        }
        let n_virtual = actuation.ncols();
        log::info!(
            "Wfc: {} virtual actuators mapped onto {}",
            n_virtual,
            actuation.nrows()
        );
        Ok(Self {
            actuation: Some(actuation),
            target: DVector::zeros(n_virtual),
            offset: DVector::zeros(n_virtual),
            previous: DVector::zeros(n_virtual),
            integral: DVector::zeros(n_virtual),
            last_error: DVector::zeros(n_virtual),
            ..self
        })
    }
    /// Sets the actuators of the waffle pattern
    pub fn with_waffle(self, even: Vec<usize>, odd: Vec<usize>) -> Result<Self> {
        let n_actuator = self.n_actuator();
        if let Some(&index) = even.iter().chain(&odd).find(|&&i| i >= n_actuator) {
            return Err(WfcError::ActuatorIndex { index, n_actuator });
        }
        Ok(Self {
            waffle_even: even,
            waffle_odd: odd,
            ..self
        })
    }
    /// Seeds the random pattern generator
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..self
        }
    }
    /// Number of physical actuators
    pub fn n_actuator(&self) -> usize {
        self.ctrl.len()
    }
    /// Number of virtual actuators
    pub fn n_virtual(&self) -> usize {
        self.target.len()
    }
    /// Returns the control vector
    pub fn control(&self) -> &[f32] {
        self.ctrl.as_slice()
    }
    pub fn target(&self) -> &[f32] {
        self.target.as_slice()
    }
    /// Returns the target before the last control update
    pub fn previous(&self) -> &[f32] {
        self.previous.as_slice()
    }
    pub fn offset(&self) -> &[f32] {
        self.offset.as_slice()
    }
    pub fn set_offset(&mut self, offset: &[f32]) -> Result<&[f32]> {
        self.check(offset)?;
        self.offset.copy_from_slice(offset);
        Ok(self.apply())
    }
    pub fn max_act(&self) -> f32 {
        self.max_act
    }
    /// Sets the largest absolute target value
    pub fn set_max_act(&mut self, max_act: f32) -> &mut Self {
        self.max_act = max_act.abs();
        self
    }
    fn check(&self, values: &[f32]) -> Result<()> {
        if values.len() != self.n_virtual() {
            Err(WfcError::Size {
                expected: self.n_virtual(),
                found: values.len(),
            })
        } else {
            Ok(())
        }
    }
    // ctrl = M·(target + offset), clamped to [-1,1]
    fn apply(&mut self) -> &[f32] {
        let work = &self.target + &self.offset;
        self.ctrl = match &self.actuation {
            Some(m) => m * work,
            None => work,
        };
        self.ctrl.apply(|x| *x = x.clamp(-1., 1.));
        self.ctrl.as_slice()
    }
    /// Updates the target with the wavefront `error`
    ///
    /// `target = retain·target + gain.p·error + gain.i·Σerror + gain.d·(error - last error)`,
    /// the target is clamped to `±max_act`
    pub fn update_control(&mut self, error: &[f32], gain: Gain, retain: f32) -> Result<&[f32]> {
        self.check(error)?;
        let error = DVector::from_column_slice(error);
        self.previous.copy_from(&self.target);
        if retain == 0. {
            self.target.fill(0.);
        } else if retain != 1. {
            self.target *= retain;
        }
        if gain.p != 0. {
            self.target.axpy(gain.p, &error, 1.);
        }
        self.integral += &error;
        if gain.i != 0. {
            self.target.axpy(gain.i, &self.integral, 1.);
        }
        if gain.d != 0. {
            self.target.axpy(gain.d, &(&error - &self.last_error), 1.);
        }
        self.last_error = error;
        let max_act = self.max_act;
        self.target.apply(|x| *x = x.clamp(-max_act, max_act));
        Ok(self.apply())
    }
    /// Sets the target
    pub fn set_control(&mut self, target: &[f32]) -> Result<&[f32]> {
        self.check(target)?;
        self.target.copy_from_slice(target);
        Ok(self.apply())
    }
    /// Sets all the target values to `value`
    pub fn set_control_all(&mut self, value: f32) -> &[f32] {
        self.target.fill(value);
        self.apply()
    }
    /// Sets the target value of actuator `index`
    pub fn set_control_act(&mut self, value: f32, index: usize) -> Result<&[f32]> {
        let n_actuator = self.n_virtual();
        *self
            .target
            .get_mut(index)
            .ok_or(WfcError::ActuatorIndex { index, n_actuator })? = value;
        Ok(self.apply())
    }
    /// Returns the target value of actuator `index`
    pub fn control_act(&self, index: usize) -> Result<f32> {
        self.target
            .get(index)
            .copied()
            .ok_or(WfcError::ActuatorIndex {
                index,
                n_actuator: self.n_virtual(),
            })
    }
    /// Sets the target to random values within `[-max_value,max_value]`
    pub fn set_random_pattern(&mut self, max_value: f32) -> &[f32] {
        let max_value = max_value.abs();
        for x in self.target.iter_mut() {
            *x = (self.rng.gen::<f32>() * 2. - 1.) * max_value;
        }
        self.apply()
    }
    /// Sets the even waffle actuators to `value` and the odd ones to `-value`
    ///
    /// The pattern is written directly into the control vector
    pub fn set_waffle_pattern(&mut self, value: f32) -> Result<&[f32]> {
        if self.waffle_even.is_empty() && self.waffle_odd.is_empty() {
            log::warn!("Wfc: no waffle pattern");
            return Err(WfcError::NoWaffle);
        }
        let value = value.clamp(-1., 1.);
        self.ctrl.fill(0.);
        self.waffle_even.iter().for_each(|&i| self.ctrl[i] = value);
        self.waffle_odd.iter().for_each(|&i| self.ctrl[i] = -value);
        Ok(self.ctrl.as_slice())
    }
    /// Zeroes the target, the control and the error history
    pub fn reset(&mut self) -> &[f32] {
        self.target.fill(0.);
        self.previous.fill(0.);
        self.integral.fill(0.);
        self.last_error.fill(0.);
        self.ctrl.fill(0.);
        self.ctrl.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_with_retain() {
        let mut wfc = Wfc::new(3);
        wfc.set_control(&[0.4, 0.2, -0.2]).unwrap();
        wfc.update_control(&[0.2, 0.2, 0.2], Gain::proportional(1.), 0.5).unwrap();
        assert_eq!(wfc.previous(), &[0.4, 0.2, -0.2]);
        let expected = [0.4, 0.3, 0.1];
        wfc.control()
            .iter()
            .zip(expected)
            .for_each(|(c, e)| assert!((c - e).abs() < 1e-6));
        wfc.update_control(&[1., 1., 1.], Gain::proportional(1.), 0.).unwrap();
        assert_eq!(wfc.control(), &[1., 1., 1.]);
    }

    #[test]
    fn integral_term() {
        let mut wfc = Wfc::new(2);
        let gain = Gain {
            i: 0.1,
            ..Default::default()
        };
        for _ in 0..3 {
            wfc.update_control(&[1., -0.5], gain, 0.).unwrap();
        }
        // 0.1·(3, -1.5)
        assert!((wfc.target()[0] - 0.3).abs() < 1e-6);
        assert!((wfc.target()[1] + 0.15).abs() < 1e-6);
        wfc.reset();
        wfc.update_control(&[1., -0.5], gain, 0.).unwrap();
        assert!((wfc.target()[0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn derivative_term() {
        let mut wfc = Wfc::new(1);
        let gain = Gain {
            d: 0.5,
            ..Default::default()
        };
        wfc.update_control(&[0.4], gain, 0.).unwrap();
        assert!((wfc.target()[0] - 0.2).abs() < 1e-6);
        // a steady error has no derivative
        wfc.update_control(&[0.4], gain, 0.).unwrap();
        assert_eq!(wfc.target(), &[0.]);
        wfc.update_control(&[0.], gain, 0.).unwrap();
        assert!((wfc.target()[0] + 0.2).abs() < 1e-6);
    }

    #[test]
    fn max_act() {
        let mut wfc = Wfc::new(2);
        wfc.set_max_act(0.3);
        wfc.update_control(&[1., -1.], Gain::proportional(1.), 1.).unwrap();
        assert_eq!(wfc.target(), &[0.3, -0.3]);
    }

    #[test]
    fn offset_and_clamp() {
        let mut wfc = Wfc::new(2);
        wfc.set_offset(&[0.5, -0.5]).unwrap();
        wfc.set_control(&[0.75, 0.25]).unwrap();
        assert_eq!(wfc.control(), &[1., -0.25]);
    }

    #[test]
    fn actuation_map() {
        // 2 virtual actuators onto 3 physical ones
        let m = DMatrix::from_row_slice(3, 2, &[1., 0., 0., 1., 0.5, 0.5]);
        let mut wfc = Wfc::new(3).with_actuation_map(m).unwrap();
        assert_eq!(wfc.n_virtual(), 2);
        wfc.set_control(&[0.2, 0.6]).unwrap();
        let c = wfc.control();
        assert!((c[0] - 0.2).abs() < 1e-6 && (c[1] - 0.6).abs() < 1e-6);
        assert!((c[2] - 0.4).abs() < 1e-6);
        assert!(wfc.set_control(&[0.; 3]).is_err());
    }

    #[test]
    fn single_actuator() {
        let mut wfc = Wfc::new(4);
        wfc.set_control_act(-0.5, 2).unwrap();
        assert_eq!(wfc.control(), &[0., 0., -0.5, 0.]);
        assert_eq!(wfc.control_act(2).unwrap(), -0.5);
        assert!(matches!(
            wfc.set_control_act(0.1, 4),
            Err(WfcError::ActuatorIndex { index: 4, .. })
        ));
    }

    #[test]
    fn patterns() {
        let mut wfc = Wfc::new(4).with_seed(5);
        assert!(matches!(wfc.set_waffle_pattern(0.5), Err(WfcError::NoWaffle)));
        let random = wfc.set_random_pattern(0.2).to_vec();
        assert!(random.iter().all(|x| x.abs() <= 0.2));
        assert!(random.iter().any(|&x| x != 0.));
        let mut wfc = wfc.with_waffle(vec![0, 3], vec![1, 2]).unwrap();
        assert_eq!(wfc.set_waffle_pattern(0.5).unwrap(), &[0.5, -0.5, -0.5, 0.5]);
        assert_eq!(wfc.reset(), &[0.; 4]);
        assert!(Wfc::new(2).with_waffle(vec![2], vec![]).is_err());
    }
}
