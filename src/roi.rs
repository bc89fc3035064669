//! Freehand region of interest: polygon rasterization and statistics.
//!
//! Vertices are continuous pixel coordinates; pixel `(i, j)` covers
//! `[i, i + 1) x [j, j + 1)` and belongs to the region when its centre does.

use crate::frame::RawFrame;
use crate::image_pipeline::ModalityLut;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoiError {
    #[error("ROI needs at least 3 distinct vertices, got {found}")]
    InsufficientVertices { found: usize },

    #[error("ROI contains no pixels")]
    EmptyRoi,

    #[error("Mask is {mask_width}x{mask_height} but the frame is {frame_width}x{frame_height}")]
    MaskMismatch {
        mask_width: u32,
        mask_height: u32,
        frame_width: u32,
        frame_height: u32,
    },
}

/// Which values the statistics run over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueMode {
    #[default]
    Stored,
    /// After the modality LUT (Hounsfield units for CT).
    Mapped,
}

/// Row-major pixel mask sized to a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.bits[(y * self.width + x) as usize]
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|bit| **bit).count()
    }

    /// Row-major indices of the pixels inside the mask.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(index, bit)| bit.then_some(index))
    }
}

/// Even-odd scanline fill of the closed polygon through `vertices`.
///
/// Non-finite vertices are ignored. Vertices are clamped to the frame after
/// the distinct-vertex check.
pub fn rasterize(vertices: &[(f64, f64)], width: u32, height: u32) -> Result<Mask, RoiError> {
    let finite: Vec<(f64, f64)> = vertices
        .iter()
        .copied()
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect();
    let mut distinct: Vec<(f64, f64)> = Vec::with_capacity(finite.len());
    for vertex in &finite {
        if !distinct.contains(vertex) {
            distinct.push(*vertex);
        }
    }
    if distinct.len() < 3 {
        return Err(RoiError::InsufficientVertices {
            found: distinct.len(),
        });
    }

    let polygon: Vec<(f64, f64)> = finite
        .iter()
        .map(|(x, y)| (x.clamp(0.0, f64::from(width)), y.clamp(0.0, f64::from(height))))
        .collect();

    let mut bits = vec![false; width as usize * height as usize];
    let mut crossings = Vec::new();
    for row in 0..height {
        let y = f64::from(row) + 0.5;
        crossings.clear();
        for (index, &(x0, y0)) in polygon.iter().enumerate() {
            let (x1, y1) = polygon[(index + 1) % polygon.len()];
            if (y0 > y) != (y1 > y) {
                crossings.push(x0 + (y - y0) * (x1 - x0) / (y1 - y0));
            }
        }
        crossings.sort_by(f64::total_cmp);

        for span in crossings.chunks_exact(2) {
            let start = column(span[0], width);
            let end = column(span[1], width);
            let offset = row as usize * width as usize;
            for col in start..end {
                bits[offset + col] = true;
            }
        }
    }

    Ok(Mask {
        width,
        height,
        bits,
    })
}

/// First column whose centre lies at or right of `x`.
fn column(x: f64, width: u32) -> usize {
    (x - 0.5).ceil().clamp(0.0, f64::from(width)) as usize
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiStats {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation.
    pub std: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub min: f64,
    pub max: f64,
}

impl RoiStats {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

impl fmt::Display for RoiStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "N={}  μ={:.2}  σ={:.2}  med={:.2}  IQR={:.2}",
            self.count,
            self.mean,
            self.std,
            self.median,
            self.iqr()
        )
    }
}

/// Linear interpolation at rank `p * (n - 1)` of an ascending slice.
pub(crate) fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = p.clamp(0.0, 1.0) * last as f64;
    let below = rank.floor() as usize;
    let above = rank.ceil() as usize;
    let fraction = rank - below as f64;
    Some(sorted[below] + (sorted[above] - sorted[below]) * fraction)
}

/// Descriptive statistics of `values`; non-finite values are dropped first.
pub fn compute_statistics(values: &[f64]) -> Result<RoiStats, RoiError> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return Err(RoiError::EmptyRoi);
    }
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    let quantile = |p| percentile(&sorted, p).unwrap_or(mean);

    Ok(RoiStats {
        count,
        mean,
        std: variance.sqrt(),
        median: quantile(0.5),
        q1: quantile(0.25),
        q3: quantile(0.75),
        min: sorted[0],
        max: sorted[count - 1],
    })
}

/// Values of the masked pixels. Colour frames contribute the mean of their channels.
pub fn masked_values(
    raw: &RawFrame,
    lut: &ModalityLut,
    mask: &Mask,
    mode: ValueMode,
) -> Result<Vec<f64>, RoiError> {
    if mask.width != raw.width() || mask.height != raw.height() {
        return Err(RoiError::MaskMismatch {
            mask_width: mask.width,
            mask_height: mask.height,
            frame_width: raw.width(),
            frame_height: raw.height(),
        });
    }

    let channels = raw.channels();
    let samples = raw.samples();
    Ok(mask
        .indices()
        .map(|index| {
            let pixel = &samples[index * channels..(index + 1) * channels];
            match (channels, mode) {
                (3, _) => pixel.iter().copied().map(f64::from).sum::<f64>() / 3.0,
                (_, ValueMode::Stored) => f64::from(pixel[0]),
                (_, ValueMode::Mapped) => lut.apply(pixel[0]),
            }
        })
        .collect())
}

/// A finished region on one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiResult {
    pub vertices: Vec<(f64, f64)>,
    pub mask: Mask,
    pub mode: ValueMode,
    pub stats: RoiStats,
}

impl RoiResult {
    pub fn finalize(
        vertices: Vec<(f64, f64)>,
        raw: &RawFrame,
        lut: &ModalityLut,
        mode: ValueMode,
    ) -> Result<Self, RoiError> {
        let mask = rasterize(&vertices, raw.width(), raw.height())?;
        let values = masked_values(raw, lut, &mask, mode)?;
        let stats = compute_statistics(&values)?;
        log::debug!("ROI over {} pixel(s): {stats}", stats.count);
        Ok(Self {
            vertices,
            mask,
            mode,
            stats,
        })
    }
}
