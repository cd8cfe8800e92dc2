//!
//! # Calibration fields
//!
//! Dark and flat fields are the pixel averages of a series of calibration frames.
//! A field is stored to and loaded from a pickle file.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{Frame, Stats};

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("cannot open calibration field file: {1}")]
    File(#[source] std::io::Error, PathBuf),
    #[error("cannot (de)serialize calibration field")]
    Pickle(#[from] serde_pickle::Error),
    #[error("cannot average less than 1 frame")]
    NoFrame,
    #[error("frame {0}x{1} does not match the {2}x{3} calibration field")]
    Size(usize, usize, usize, usize),
}

/// Average of calibration frames
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationField {
    pub width: usize,
    pub height: usize,
    /// Averaged pixel values, row major
    pub data: Vec<f32>,
}
impl CalibrationField {
    /// Creates a zero field
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.; width * height],
        }
    }
    /// Averages the frames pixel by pixel
    ///
    /// The field takes the resolution of the first frame, the other frames must match it
    pub fn average<'a, I>(frames: I) -> Result<Self, CalibrationError>
    where
        I: IntoIterator<Item = &'a Frame>,
    {
        let mut field: Option<Self> = None;
        let mut n = 0usize;
        for frame in frames {
            let field = field.get_or_insert_with(|| Self::new(frame.width, frame.height));
            field.accumulate(frame)?;
            n += 1;
        }
        let mut field = field.ok_or(CalibrationError::NoFrame)?;
        field.scale(n);
        log::debug!("average of {} frames: {:?}", n, field.stats());
        Ok(field)
    }
    /// Adds the frame pixel values to the field
    pub fn accumulate(&mut self, frame: &Frame) -> Result<&mut Self, CalibrationError> {
        if frame.resolution() != self.resolution() || frame.data.len() != self.data.len() {
            return Err(CalibrationError::Size(
                frame.width,
                frame.height,
                self.width,
                self.height,
            ));
        }
        self.data
            .iter_mut()
            .zip(&frame.data)
            .for_each(|(f, &x)| *f += x as f32);
        Ok(self)
    }
    pub(crate) fn scale(&mut self, n: usize) {
        let n = n as f32;
        self.data.iter_mut().for_each(|x| *x /= n);
    }
    /// Returns the field resolution as (width,height)
    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }
    pub fn stats(&self) -> Stats {
        Stats::from_values(self.data.iter().map(|&x| x as f64))
    }
    /// Stores the field into a pickle file
    pub fn store<P: AsRef<Path>>(&self, path: P) -> Result<(), CalibrationError> {
        let path = path.as_ref();
        let mut file =
            File::create(path).map_err(|e| CalibrationError::File(e, path.to_path_buf()))?;
        serde_pickle::to_writer(&mut file, self, Default::default())?;
        log::info!("calibration field stored to {:?}", path);
        Ok(())
    }
    /// Loads a field from a pickle file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CalibrationError::File(e, path.to_path_buf()))?;
        let field: Self = serde_pickle::from_reader(file, Default::default())?;
        log::info!(
            "{}x{} calibration field loaded from {:?}",
            field.width,
            field.height,
            path
        );
        Ok(field)
    }
}
