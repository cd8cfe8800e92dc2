use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::ShackHartmannError;

/// Subaperture of the lenslet array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subaperture {
    /// Upper left corner pixel as (x,y)
    pub corner: (usize, usize),
    /// Subaperture size as (width,height)
    pub size: (usize, usize),
}
impl Subaperture {
    pub fn new(corner: (usize, usize), size: (usize, usize)) -> Self {
        Self { corner, size }
    }
    /// Returns the pixel after the lower right corner as (x,y)
    pub fn end(&self) -> (usize, usize) {
        (self.corner.0 + self.size.0, self.corner.1 + self.size.1)
    }
    /// Returns the number of pixels in the subaperture
    pub fn area(&self) -> usize {
        self.size.0 * self.size.1
    }
    /// Returns true if the subaperture lies within a `width`x`height` frame
    pub fn fits(&self, width: usize, height: usize) -> bool {
        let (x1, y1) = self.end();
        x1 <= width && y1 <= height
    }
    /// Iterator over the row major indices of the subaperture pixels in a frame of width `width`
    pub fn pixels(&self, width: usize) -> impl Iterator<Item = usize> + '_ {
        let (x0, y0) = self.corner;
        let (sx, sy) = self.size;
        (y0..y0 + sy).flat_map(move |i| (x0..x0 + sx).map(move |j| i * width + j))
    }
}

/// Shape of the lenslet array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridShape {
    #[default]
    Square,
    /// only the subapertures with their center inside the circle inscribed in the frame
    Circular,
}

/// Lenslet array layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridLayout {
    /// Subaperture size as (width,height)
    pub size: (usize, usize),
    /// Distance between subapertures as (x,y)
    pub pitch: (usize, usize),
    /// Displacement of the grid with respect to the frame origin as (x,y)
    pub displacement: (i64, i64),
    /// Horizontal shift of the odd rows as a fraction of the pitch
    pub row_offset: f64,
    pub shape: GridShape,
    /// Minimum fraction of a subaperture inside the pupil
    pub overlap: f64,
}
impl Default for GridLayout {
    fn default() -> Self {
        Self {
            size: (32, 32),
            pitch: (32, 32),
            displacement: (0, 0),
            row_offset: 0.,
            shape: GridShape::Square,
            overlap: 0.,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GridRecord {
    idx: usize,
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

/// Ordered list of subapertures
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubapertureGrid {
    subapertures: Vec<Subaperture>,
}
impl SubapertureGrid {
    pub fn new(subapertures: Vec<Subaperture>) -> Self {
        Self { subapertures }
    }
    /// Tiles a `width`x`height` frame with `nx`x`ny` contiguous subapertures
    pub fn regular(width: usize, height: usize, nx: usize, ny: usize) -> Self {
        if nx == 0 || ny == 0 {
            return Default::default();
        }
        let size = (width / nx, height / ny);
        let subapertures = (0..ny)
            .flat_map(|i| (0..nx).map(move |j| (i, j)))
            .map(|(i, j)| Subaperture::new((j * size.0, i * size.1), size))
            .collect();
        Self { subapertures }
    }
    /// Generates the subapertures of `layout` within a `width`x`height` frame
    ///
    /// If a `pupil` mask is given, subapertures with less than `layout.overlap` of their
    /// pixels inside the pupil are discarded
    pub fn generate(
        width: usize,
        height: usize,
        layout: &GridLayout,
        pupil: Option<&[bool]>,
    ) -> Self {
        let (sx, sy) = layout.size;
        let (px, py) = (layout.pitch.0.max(1) as i64, layout.pitch.1.max(1) as i64);
        let (dx, dy) = layout.displacement;
        let (w, h) = (width as i64, height as i64);
        let radius = width.min(height) as f64 * 0.5;
        let (xc, yc) = (width as f64 * 0.5, height as f64 * 0.5);
        let mut subapertures = vec![];
        if sx == 0 || sy == 0 {
            return Self { subapertures };
        }
        for i in -(h / py + 1)..=(h / py + 1) {
            let y = dy + i * py;
            if y < 0 || y + sy as i64 > h {
                continue;
            }
            let shift = if i.rem_euclid(2) == 1 {
                (layout.row_offset * px as f64).round() as i64
            } else {
                0
            };
            for j in -(w / px + 1)..=(w / px + 1) {
                let x = dx + shift + j * px;
                if x < 0 || x + sx as i64 > w {
                    continue;
                }
                let subaperture = Subaperture::new((x as usize, y as usize), layout.size);
                if let GridShape::Circular = layout.shape {
                    let cx = x as f64 + sx as f64 * 0.5;
                    let cy = y as f64 + sy as f64 * 0.5;
                    if (cx - xc).hypot(cy - yc) > radius {
                        continue;
                    }
                }
                if let Some(pupil) = pupil {
                    let inside = subaperture
                        .pixels(width)
                        .filter(|&k| pupil.get(k).copied().unwrap_or(false))
                        .count();
                    if (inside as f64) < layout.overlap * subaperture.area() as f64 {
                        continue;
                    }
                }
                subapertures.push(subaperture);
            }
        }
        log::info!("generated {} subapertures", subapertures.len());
        Self { subapertures }
    }
    pub fn len(&self) -> usize {
        self.subapertures.len()
    }
    pub fn is_empty(&self) -> bool {
        self.subapertures.is_empty()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Subaperture> {
        self.subapertures.iter()
    }
    pub fn as_slice(&self) -> &[Subaperture] {
        &self.subapertures
    }
    /// Writes the grid into a CSV file with the columns `idx,x0,y0,x1,y1`
    pub fn store<P: AsRef<Path>>(&self, path: P) -> Result<(), ShackHartmannError> {
        let path = path.as_ref();
        let to_err = |e| ShackHartmannError::GridFile(e, path.to_path_buf());
        let mut wtr = csv::Writer::from_path(path).map_err(to_err)?;
        for (idx, subaperture) in self.subapertures.iter().enumerate() {
            let (x1, y1) = subaperture.end();
            wtr.serialize(GridRecord {
                idx,
                x0: subaperture.corner.0,
                y0: subaperture.corner.1,
                x1,
                y1,
            })
            .map_err(to_err)?;
        }
        wtr.flush().map_err(|e| to_err(csv::Error::from(e)))?;
        Ok(())
    }
    /// Reads a grid from a CSV file written by [SubapertureGrid::store]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ShackHartmannError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let mut rdr = csv::Reader::from_path(&path)
            .map_err(|e| ShackHartmannError::GridFile(e, path.clone()))?;
        let mut subapertures = vec![];
        for record in rdr.deserialize::<GridRecord>() {
            let GridRecord { x0, y0, x1, y1, .. } =
                record.map_err(|e| ShackHartmannError::GridFile(e, path.clone()))?;
            if x1 <= x0 || y1 <= y0 {
                return Err(ShackHartmannError::EmptySubaperture((x0, y0)));
            }
            subapertures.push(Subaperture::new((x0, y0), (x1 - x0, y1 - y0)));
        }
        Ok(Self { subapertures })
    }
}
impl<'a> IntoIterator for &'a SubapertureGrid {
    type Item = &'a Subaperture;
    type IntoIter = std::slice::Iter<'a, Subaperture>;
    fn into_iter(self) -> Self::IntoIter {
        self.subapertures.iter()
    }
}
