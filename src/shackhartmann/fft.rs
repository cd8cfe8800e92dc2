use std::{collections::HashMap, fs::File, path::Path, sync::Arc};

use rustfft::{num_complex::Complex64, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use super::ShackHartmannError;

/// 2D forward Fourier transform of a `nx`x`ny` row major buffer
pub struct Fft2 {
    nx: usize,
    ny: usize,
    rows: Arc<dyn Fft<f64>>,
    columns: Arc<dyn Fft<f64>>,
    scratch: Vec<Complex64>,
    transposed: Vec<Complex64>,
}
impl Fft2 {
    pub fn new(planner: &mut FftPlanner<f64>, nx: usize, ny: usize) -> Self {
        let rows = planner.plan_fft_forward(nx);
        let columns = planner.plan_fft_forward(ny);
        let n_scratch = rows
            .get_inplace_scratch_len()
            .max(columns.get_inplace_scratch_len());
        Self {
            nx,
            ny,
            rows,
            columns,
            scratch: vec![Complex64::default(); n_scratch],
            transposed: vec![Complex64::default(); nx * ny],
        }
    }
    /// Returns the transform size as (nx,ny)
    pub fn size(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }
    /// Transforms `data` in place
    pub fn forward(&mut self, data: &mut [Complex64]) {
        let (nx, ny) = (self.nx, self.ny);
        debug_assert_eq!(data.len(), nx * ny);
        self.rows.process_with_scratch(data, &mut self.scratch);
        for i in 0..ny {
            for j in 0..nx {
                self.transposed[j * ny + i] = data[i * nx + j];
            }
        }
        self.columns
            .process_with_scratch(&mut self.transposed, &mut self.scratch);
        for j in 0..nx {
            for i in 0..ny {
                data[i * nx + j] = self.transposed[j * ny + i];
            }
        }
    }
}

/// FFT wisdom file content: the sizes of the transforms to plan ahead
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wisdom {
    pub sizes: Vec<(usize, usize)>,
}

/// 2D FFT plans indexed by their size
#[derive(Default)]
pub struct FftPlanCache {
    plans: HashMap<(usize, usize), Fft2>,
}
impl FftPlanCache {
    pub fn new() -> Self {
        Default::default()
    }
    /// Returns the plan for a `nx`x`ny` transform, planning it if needed
    pub fn plan(&mut self, nx: usize, ny: usize) -> &mut Fft2 {
        self.plans.entry((nx, ny)).or_insert_with(|| {
            log::debug!("planning {}x{} FFT", nx, ny);
            Fft2::new(&mut FftPlanner::new(), nx, ny)
        })
    }
    /// Returns the sizes of the planned transforms
    pub fn sizes(&self) -> Vec<(usize, usize)> {
        let mut sizes: Vec<_> = self.plans.keys().copied().collect();
        sizes.sort_unstable();
        sizes
    }
    /// Plans ahead the transforms listed in a wisdom file, returns the number of plans
    pub fn import_wisdom<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, ShackHartmannError> {
        let path = path.as_ref();
        let file =
            File::open(path).map_err(|e| ShackHartmannError::WisdomFile(e, path.to_path_buf()))?;
        let wisdom: Wisdom = serde_pickle::from_reader(file, Default::default())?;
        for &(nx, ny) in &wisdom.sizes {
            self.plan(nx, ny);
        }
        Ok(wisdom.sizes.len())
    }
    /// Writes the sizes of the planned transforms into a wisdom file
    pub fn export_wisdom<P: AsRef<Path>>(&self, path: P) -> Result<(), ShackHartmannError> {
        let path = path.as_ref();
        let mut file = File::create(path)
            .map_err(|e| ShackHartmannError::WisdomFile(e, path.to_path_buf()))?;
        let wisdom = Wisdom {
            sizes: self.sizes(),
        };
        serde_pickle::to_writer(&mut file, &wisdom, Default::default())?;
        Ok(())
    }
}
