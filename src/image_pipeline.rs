use crate::frame::{DisplayBuffer, Photometric, RawFrame};
use crate::model::{DataElement, Instance};
use crate::roi::percentile;
use dicom::dictionary_std::tags;
use std::fmt;
use thiserror::Error;

/// Top of the 8-bit display range.
pub const DISPLAY_MAX: f64 = 255.0;

/// Soft-tissue window used when neither the header nor the pixels give one.
pub const FALLBACK_WINDOW: (f64, f64) = (40.0, 400.0);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("Invalid window: center {center}, width {width}")]
    InvalidWindow { center: f64, width: f64 },

    #[error("Pixel ({x}, {y}) is outside the {width}x{height} frame")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

/// Window center and width, in modality units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    center: f64,
    width: f64,
}

impl Window {
    /// # Errors
    /// `InvalidWindow` when the width is not positive or either value is not finite.
    pub fn new(center: f64, width: f64) -> Result<Self, TransformError> {
        if !center.is_finite() || !width.is_finite() || width <= 0.0 {
            return Err(TransformError::InvalidWindow { center, width });
        }
        Ok(Self { center, width })
    }

    pub fn center(&self) -> f64 {
        self.center
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn lower(&self) -> f64 {
        self.center - self.width / 2.0
    }

    pub fn upper(&self) -> f64 {
        self.center + self.width / 2.0
    }
}

impl Default for Window {
    fn default() -> Self {
        Self {
            center: FALLBACK_WINDOW.0,
            width: FALLBACK_WINDOW.1,
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C: {:.1}  W: {:.1}", self.center, self.width)
    }
}

/// Stored value to modality value mapping of one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ModalityLut {
    Identity,
    Linear { slope: f64, intercept: f64 },
    /// Lookup table; stored values below `first_mapped` use the first entry
    /// and values past the end use the last.
    Table { first_mapped: i64, entries: Vec<u16> },
}

impl ModalityLut {
    /// Rescale slope and intercept win over a Modality LUT Sequence. Both are
    /// resolved per frame, so enhanced objects pick up functional group values.
    pub fn for_frame(instance: &Instance, frame: u32) -> Self {
        let number = |tag| {
            instance
                .resolve(tag, frame)
                .and_then(DataElement::to_f64)
                .filter(|value| value.is_finite())
        };
        let slope = number(tags::RESCALE_SLOPE);
        let intercept = number(tags::RESCALE_INTERCEPT);
        if slope.is_some() || intercept.is_some() {
            return ModalityLut::Linear {
                slope: slope.filter(|slope| *slope != 0.0).unwrap_or(1.0),
                intercept: intercept.unwrap_or(0.0),
            };
        }

        if let Some(table) = instance
            .resolve(tags::MODALITY_LUT_SEQUENCE, frame)
            .and_then(DataElement::items)
            .and_then(|items| items.first())
            .and_then(|item| {
                let descriptor = item.get(tags::LUT_DESCRIPTOR)?.to_f64s();
                let entries = item.get(tags::LUT_DATA)?.words()?;
                Some((descriptor, entries))
            })
        {
            let (descriptor, entries) = table;
            let signed = instance.int(tags::PIXEL_REPRESENTATION) == Some(1);
            if let Some(lut) = table_lut(&descriptor, entries, signed) {
                return lut;
            }
            log::warn!(
                "Ignoring malformed Modality LUT in {}",
                instance.sop_instance_uid()
            );
        }

        ModalityLut::Identity
    }

    pub fn apply(&self, raw: i32) -> f64 {
        match self {
            ModalityLut::Identity => f64::from(raw),
            ModalityLut::Linear { slope, intercept } => f64::from(raw) * slope + intercept,
            ModalityLut::Table {
                first_mapped,
                entries,
            } => {
                let last = entries.len().saturating_sub(1) as i64;
                let index = (i64::from(raw) - first_mapped).clamp(0, last) as usize;
                entries.get(index).copied().map_or(0.0, f64::from)
            }
        }
    }
}

fn table_lut(descriptor: &[f64], mut entries: Vec<u16>, signed: bool) -> Option<ModalityLut> {
    let [count, first, ..] = descriptor else {
        return None;
    };
    let count = if *count == 0.0 { 65536 } else { *count as usize };
    let first = *first as i64;
    // The first mapped value is written as US even for signed pixels.
    let first_mapped = if signed && first > i64::from(i16::MAX) {
        first - 65536
    } else {
        first
    };
    if entries.is_empty() {
        return None;
    }
    entries.truncate(count);
    Some(ModalityLut::Table {
        first_mapped,
        entries,
    })
}

/// Modality value of one stored value of `frame`.
pub fn modality_lut(instance: &Instance, frame: u32, raw: i32) -> f64 {
    ModalityLut::for_frame(instance, frame).apply(raw)
}

/// Linear window: at or below the lower edge maps to 0, at or above the
/// upper edge to `display_max`.
pub fn window_level(value: f64, window: Window, display_max: f64) -> f64 {
    let lower = window.lower();
    if value <= lower {
        0.0
    } else if value >= window.upper() {
        display_max
    } else {
        (value - lower) / window.width() * display_max
    }
}

/// Windowed display value of one stored monochrome sample, inverted for
/// MONOCHROME1.
fn display_value(raw: i32, lut: &ModalityLut, window: Window, photometric: Photometric) -> f64 {
    let value = window_level(lut.apply(raw), window, DISPLAY_MAX);
    if photometric == Photometric::Monochrome1 {
        DISPLAY_MAX - value
    } else {
        value
    }
}

/// Renders a frame to 8-bit display samples.
///
/// Colour frames ignore the LUT and window: they pass through when every
/// sample already fits 8 bits and are stretched per channel otherwise.
pub fn render_frame(raw: &RawFrame, lut: &ModalityLut, window: Window) -> DisplayBuffer {
    let data = if raw.photometric().is_color() {
        color_to_display(raw.samples())
    } else {
        raw.samples()
            .iter()
            .map(|&sample| {
                display_value(sample, lut, window, raw.photometric())
                    .round()
                    .clamp(0.0, DISPLAY_MAX) as u8
            })
            .collect()
    };
    DisplayBuffer::new(raw.width(), raw.height(), raw.channels(), data)
}

fn color_to_display(samples: &[i32]) -> Vec<u8> {
    if samples.iter().all(|sample| (0..=255).contains(sample)) {
        return samples.iter().map(|&sample| sample as u8).collect();
    }

    let mut ranges = [(i32::MAX, i32::MIN); 3];
    for chunk in samples.chunks_exact(3) {
        for (range, &value) in ranges.iter_mut().zip(chunk) {
            range.0 = range.0.min(value);
            range.1 = range.1.max(value);
        }
    }
    samples
        .chunks_exact(3)
        .flat_map(|chunk| {
            [0, 1, 2].map(|channel| normalize(chunk[channel], ranges[channel].0, ranges[channel].1))
        })
        .collect()
}

fn normalize(value: i32, min: i32, max: i32) -> u8 {
    if max <= min {
        return 0;
    }
    let range = f64::from(max) - f64::from(min);
    let normalized = (f64::from(value) - f64::from(min)) / range;
    (normalized * DISPLAY_MAX).clamp(0.0, DISPLAY_MAX).round() as u8
}

/// Rec. 709 luma of an RGB triple.
pub fn luminance(rgb: &[i32]) -> f64 {
    match rgb {
        [r, g, b, ..] => 0.2126 * f64::from(*r) + 0.7152 * f64::from(*g) + 0.0722 * f64::from(*b),
        [value, ..] => f64::from(*value),
        [] => 0.0,
    }
}

/// Readout of a single pixel. For colour frames `mapped` and `display` are
/// the luminance of the stored and displayed samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelProbe {
    pub x: u32,
    pub y: u32,
    pub raw: Vec<i32>,
    pub mapped: f64,
    pub display: f64,
}

impl fmt::Display for PixelProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = self
            .raw
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "({}, {})  raw {raw}  value {:.1}  display {:.1}",
            self.x, self.y, self.mapped, self.display
        )
    }
}

pub fn pixel_probe(
    raw: &RawFrame,
    lut: &ModalityLut,
    window: Window,
    x: u32,
    y: u32,
) -> Result<PixelProbe, TransformError> {
    let samples = raw.pixel(x, y).ok_or(TransformError::OutOfBounds {
        x,
        y,
        width: raw.width(),
        height: raw.height(),
    })?;

    let (mapped, display) = if raw.photometric().is_color() {
        let shown: Vec<i32> = color_to_display(raw.samples())
            .chunks_exact(3)
            .nth(y as usize * raw.width() as usize + x as usize)
            .map(|chunk| chunk.iter().map(|&value| i32::from(value)).collect())
            .unwrap_or_default();
        (luminance(samples), luminance(&shown))
    } else {
        let sample = samples[0];
        (
            lut.apply(sample),
            display_value(sample, lut, window, raw.photometric()),
        )
    };

    Ok(PixelProbe {
        x,
        y,
        raw: samples.to_vec(),
        mapped,
        display,
    })
}

/// Initial window for a frame: the header's Window Center/Width when valid,
/// else the 1st to 99th percentile of the mapped values, else the fallback.
pub fn default_window(instance: &Instance, frame: u32, raw: &RawFrame) -> Window {
    let first = |tag| instance.resolve(tag, frame).and_then(DataElement::to_f64);
    if let (Some(center), Some(width)) = (first(tags::WINDOW_CENTER), first(tags::WINDOW_WIDTH)) {
        if let Ok(window) = Window::new(center, width) {
            return window;
        }
    }

    let lut = ModalityLut::for_frame(instance, frame);
    let mut values: Vec<f64> = if raw.photometric().is_color() {
        raw.samples().chunks_exact(3).map(luminance).collect()
    } else {
        raw.samples().iter().map(|&sample| lut.apply(sample)).collect()
    };
    values.retain(|value| value.is_finite());
    values.sort_by(f64::total_cmp);

    if let (Some(low), Some(high)) = (percentile(&values, 0.01), percentile(&values, 0.99)) {
        if let Ok(window) = Window::new((low + high) / 2.0, (high - low).max(1.0)) {
            return window;
        }
    }
    Window::default()
}
