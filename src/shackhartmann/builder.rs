use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Builder, ShackHartmannError, Telescope};

use super::{FftPlanCache, GridLayout, ShackHartmann, SubapertureGrid};

/// Origin of the subaperture grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridSource {
    /// `nx`x`ny` contiguous subapertures tiling the frame
    Regular(usize, usize),
    /// generated from a lenslet array layout
    Layout(GridLayout),
    /// CSV file with the columns `idx,x0,y0,x1,y1`
    File(PathBuf),
}

/// [`ShackHartmann`] builder type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShackHartmannBuilder {
    /// Frame resolution as (width,height)
    pub resolution: (usize, usize),
    pub grid: GridSource,
    /// Phase to field scaling, in [0,1]
    pub seeing: f64,
    /// FFT wisdom file
    pub wisdom_file: Option<PathBuf>,
    #[serde(skip)]
    subapertures: Option<SubapertureGrid>,
    #[serde(skip)]
    pupil: Option<Vec<bool>>,
}
/// Default properties:
///  * resolution  : 256x256
///  * grid        : 8x8 subapertures
///  * seeing      : 0.3
///  * wisdom file : none
impl Default for ShackHartmannBuilder {
    fn default() -> Self {
        Self {
            resolution: (256, 256),
            grid: GridSource::Regular(8, 8),
            seeing: 0.3,
            wisdom_file: None,
            subapertures: None,
            pupil: None,
        }
    }
}
impl ShackHartmannBuilder {
    pub fn resolution(self, width: usize, height: usize) -> Self {
        Self {
            resolution: (width, height),
            ..self
        }
    }
    /// Tiles the frame with `nx`x`ny` subapertures
    pub fn regular_grid(self, nx: usize, ny: usize) -> Self {
        Self {
            grid: GridSource::Regular(nx, ny),
            ..self
        }
    }
    /// Generates the subapertures from a lenslet array layout
    pub fn layout(self, layout: GridLayout) -> Self {
        Self {
            grid: GridSource::Layout(layout),
            ..self
        }
    }
    /// Reads the subapertures from a CSV file
    pub fn grid_file<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            grid: GridSource::File(path.into()),
            ..self
        }
    }
    /// Sets the subapertures, takes precedence over the grid source
    pub fn subapertures(self, subapertures: SubapertureGrid) -> Self {
        Self {
            subapertures: Some(subapertures),
            ..self
        }
    }
    /// Uses the telescope pupil to discard the subapertures of a generated layout
    pub fn pupil(self, telescope: &Telescope) -> Self {
        Self {
            pupil: Some(telescope.mask().to_vec()),
            ..self
        }
    }
    pub fn seeing(self, seeing: f64) -> Self {
        Self { seeing, ..self }
    }
    pub fn wisdom_file<P: Into<PathBuf>>(self, path: P) -> Self {
        Self {
            wisdom_file: Some(path.into()),
            ..self
        }
    }
}
impl Builder for ShackHartmannBuilder {
    type Component = ShackHartmann;
    fn build(self) -> crate::Result<ShackHartmann> {
        let (width, height) = self.resolution;
        if !(0. ..=1.).contains(&self.seeing) {
            return Err(ShackHartmannError::Seeing(self.seeing).into());
        }
        let grid = match (self.subapertures, &self.grid) {
            (Some(grid), _) => grid,
            (None, GridSource::Regular(nx, ny)) => {
                SubapertureGrid::regular(width, height, *nx, *ny)
            }
            (None, GridSource::Layout(layout)) => {
                SubapertureGrid::generate(width, height, layout, self.pupil.as_deref())
            }
            (None, GridSource::File(path)) => SubapertureGrid::load(path)?,
        };
        if grid.is_empty() {
            return Err(ShackHartmannError::NoSubaperture.into());
        }
        if let Some((i, subaperture)) = grid
            .iter()
            .enumerate()
            .find(|(_, s)| !s.fits(width, height))
        {
            return Err(ShackHartmannError::Grid(i, *subaperture, self.resolution).into());
        }
        if let Some(subaperture) = grid.iter().find(|s| s.area() == 0) {
            return Err(ShackHartmannError::EmptySubaperture(subaperture.corner).into());
        }

        let mut plans = FftPlanCache::new();
        let mut imported = false;
        if let Some(path) = &self.wisdom_file {
            if path.exists() {
                match plans.import_wisdom(path) {
                    Ok(n) => {
                        log::info!("imported {} FFT plans from {:?}", n, path);
                        imported = true;
                    }
                    Err(e) => log::warn!("FFT wisdom import from {:?} failed: {}", path, e),
                }
            }
        }
        for subaperture in grid.iter() {
            let (sx, sy) = subaperture.size;
            plans.plan(2 * sx, 2 * sy);
        }
        if let (Some(path), false) = (&self.wisdom_file, imported) {
            match plans.export_wisdom(path) {
                Ok(_) => log::info!("FFT wisdom saved to {:?}", path),
                Err(e) => log::warn!("FFT wisdom export to {:?} failed: {}", path, e),
            }
        }

        log::info!(
            "ShackHartmann: {} subapertures over a {}x{} frame, seeing factor: {}",
            grid.len(),
            width,
            height,
            self.seeing
        );
        Ok(ShackHartmann {
            width,
            height,
            grid,
            seeing: self.seeing,
            plans,
            field: vec![],
            image: vec![0f32; width * height],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{shackhartmann::Subaperture, FromBuilder, SimError};

    #[test]
    fn subaperture_outside_frame() {
        let sh = ShackHartmann::builder()
            .resolution(32, 32)
            .subapertures(SubapertureGrid::new(vec![Subaperture::new((20, 0), (16, 16))]))
            .build();
        assert!(matches!(
            sh,
            Err(SimError::ShackHartmann(ShackHartmannError::Grid(0, ..)))
        ));
    }

    #[test]
    fn seeing_out_of_range() {
        let sh = ShackHartmann::builder().seeing(1.5).build();
        assert!(matches!(
            sh,
            Err(SimError::ShackHartmann(ShackHartmannError::Seeing(_)))
        ));
    }

    #[test]
    fn wisdom_is_saved_then_imported() {
        let path = std::env::temp_dir().join("aosim-sh-builder-wisdom.pkl");
        let _ = std::fs::remove_file(&path);
        let sh = ShackHartmann::builder()
            .resolution(64, 64)
            .regular_grid(4, 4)
            .wisdom_file(&path)
            .build()
            .unwrap();
        assert!(path.exists());
        assert_eq!(sh.plans().sizes(), vec![(32, 32)]);
        let sh = ShackHartmann::builder()
            .resolution(64, 64)
            .regular_grid(4, 4)
            .wisdom_file(&path)
            .build()
            .unwrap();
        assert_eq!(sh.plans().sizes(), vec![(32, 32)]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn corrupted_wisdom_is_replanned() {
        let path = std::env::temp_dir().join("aosim-sh-builder-corrupted-wisdom.pkl");
        std::fs::write(&path, b"not a pickle").unwrap();
        let sh = ShackHartmann::builder()
            .resolution(32, 32)
            .regular_grid(2, 2)
            .wisdom_file(&path)
            .build()
            .unwrap();
        assert_eq!(sh.plans().sizes(), vec![(32, 32)]);
        // the corrupted file was replaced
        let mut cache = FftPlanCache::new();
        assert_eq!(cache.import_wisdom(&path).unwrap(), 1);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn toml() {
        let builder = ShackHartmannBuilder::default()
            .layout(GridLayout {
                row_offset: 0.5,
                ..Default::default()
            })
            .wisdom_file("wisdom.pkl");
        let loaded: ShackHartmannBuilder =
            toml::from_str(&toml::to_string(&builder).unwrap()).unwrap();
        assert_eq!(loaded, builder);
    }
}
