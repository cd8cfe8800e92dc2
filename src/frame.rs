use std::path::Path;

use crate::image_io::{self, ImageError};

/// Minimum, maximum and mean of a set of samples
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}
impl Stats {
    /// Computes the statistics of the samples, all zeros if there is none
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut n = 0usize;
        let mut sum = 0f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for value in values {
            n += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }
        if n == 0 {
            return Default::default();
        }
        Self {
            min,
            max,
            mean: sum / n as f64,
        }
    }
}

/// Camera frame
///
/// The pixel values are bounded by the bit depth of the detector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    /// Pixel values, row major
    pub data: Vec<u16>,
    pub width: usize,
    pub height: usize,
    /// Detector bit depth
    pub bit_depth: u8,
    /// Frame counter, starts at 1 for the first published frame
    pub number: u64,
    /// Pixel statistics
    pub stats: Stats,
}
impl Frame {
    /// Creates a blank frame
    pub fn new(width: usize, height: usize, bit_depth: u8) -> Self {
        Self {
            data: vec![0; width * height],
            width,
            height,
            bit_depth,
            ..Default::default()
        }
    }
    /// Returns the frame resolution as (width,height)
    pub fn resolution(&self) -> (usize, usize) {
        (self.width, self.height)
    }
    /// Resizes the frame, the pixels are zeroed only if the size changes
    pub fn resize(&mut self, width: usize, height: usize, bit_depth: u8) {
        if self.width != width || self.height != height {
            self.data = vec![0; width * height];
            self.width = width;
            self.height = height;
        }
        self.bit_depth = bit_depth;
    }
    /// Updates the pixel statistics
    pub fn update_stats(&mut self) -> &Stats {
        self.stats = Stats::from_values(self.data.iter().map(|&x| x as f64));
        &self.stats
    }
    /// Saves the frame into a PGM (or PNG) file
    ///
    /// Frames up to 8 bits are written with 1 byte per pixel, deeper frames with 2 bytes
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ImageError> {
        if self.bit_depth <= 8 {
            let bytes: Vec<u8> = self.data.iter().map(|&x| x.min(255) as u8).collect();
            image_io::save_u8_image(&bytes, self.width, self.height, path)
        } else {
            image_io::save_u16_image(&self.data, self.width, self.height, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats() {
        let stats = Stats::from_values([1., 2., 3., 6.]);
        assert_eq!(stats.min, 1.);
        assert_eq!(stats.max, 6.);
        assert_eq!(stats.mean, 3.);
        assert_eq!(Stats::from_values(Vec::<f64>::new()), Stats::default());
    }

    #[test]
    fn resize_keeps_data() {
        let mut frame = Frame::new(4, 4, 8);
        frame.data[5] = 7;
        frame.resize(4, 4, 12);
        assert_eq!(frame.data[5], 7);
        assert_eq!(frame.bit_depth, 12);
        frame.resize(8, 2, 12);
        assert!(frame.data.iter().all(|&x| x == 0));
        assert_eq!(frame.data.len(), 16);
    }
}
