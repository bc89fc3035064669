use crate::decode::DecodeError;
use dicom::pixeldata::PhotometricInterpretation;

/// Photometric interpretation of a decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Photometric {
    /// Minimum sample is white.
    Monochrome1,
    #[default]
    Monochrome2,
    /// Three interleaved samples per pixel.
    Rgb,
}

impl Photometric {
    /// Maps a decoded interpretation. Colour models other than monochrome
    /// reach the cache already converted to RGB.
    pub fn from_interpretation(interpretation: &PhotometricInterpretation) -> Self {
        match interpretation {
            PhotometricInterpretation::Monochrome1 => Photometric::Monochrome1,
            other if other.is_monochrome() => Photometric::Monochrome2,
            _ => Photometric::Rgb,
        }
    }

    pub fn is_color(self) -> bool {
        self == Photometric::Rgb
    }
}

/// Stored pixel values of one frame, samples interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    width: u32,
    height: u32,
    photometric: Photometric,
    samples: Vec<i32>,
}

impl RawFrame {
    /// # Errors
    /// `CorruptData` when the sample count does not match the geometry.
    pub fn new(
        width: u32,
        height: u32,
        photometric: Photometric,
        samples: Vec<i32>,
    ) -> Result<Self, DecodeError> {
        let channels = if photometric.is_color() { 3 } else { 1 };
        let expected = width as usize * height as usize * channels;
        if samples.len() != expected {
            return Err(DecodeError::CorruptData(format!(
                "{width}x{height} frame with {channels} sample(s) per pixel needs {expected} values, got {}",
                samples.len()
            )));
        }
        Ok(Self {
            width,
            height,
            photometric,
            samples,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn photometric(&self) -> Photometric {
        self.photometric
    }

    pub fn channels(&self) -> usize {
        if self.photometric.is_color() {
            3
        } else {
            1
        }
    }

    pub fn samples(&self) -> &[i32] {
        &self.samples
    }

    /// Samples of the pixel at column `x`, row `y`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[i32]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = self.channels();
        let start = (y as usize * self.width as usize + x as usize) * channels;
        self.samples.get(start..start + channels)
    }
}

/// 8-bit display samples, one or three per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayBuffer {
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<u8>,
}

impl DisplayBuffer {
    pub(crate) fn new(width: u32, height: u32, channels: usize, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * self.channels;
        self.data.get(start..start + self.channels)
    }

    /// Opaque RGBA bytes, ready for an image handle.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut rgba = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        if self.channels == 3 {
            for chunk in self.data.chunks_exact(3) {
                rgba.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
            }
        } else {
            for &gray in &self.data {
                rgba.extend_from_slice(&[gray, gray, gray, 255]);
            }
        }
        rgba
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_is_checked() {
        assert!(RawFrame::new(2, 2, Photometric::Monochrome2, vec![0; 4]).is_ok());
        assert!(matches!(
            RawFrame::new(2, 2, Photometric::Rgb, vec![0; 4]),
            Err(DecodeError::CorruptData(_))
        ));
    }

    #[test]
    fn pixels_index_row_major() {
        let frame = RawFrame::new(3, 2, Photometric::Monochrome2, (0..6).collect()).unwrap();
        assert_eq!(frame.pixel(1, 1), Some(&[4][..]));
        assert_eq!(frame.pixel(3, 0), None);

        let color = RawFrame::new(1, 2, Photometric::Rgb, (0..6).collect()).unwrap();
        assert_eq!(color.pixel(0, 1), Some(&[3, 4, 5][..]));
    }

    #[test]
    fn rgba_expands_gray() {
        let buffer = DisplayBuffer::new(2, 1, 1, vec![7, 9]);
        assert_eq!(buffer.to_rgba(), vec![7, 7, 7, 255, 9, 9, 9, 255]);
        assert_eq!(buffer.pixel(1, 0), Some(&[9][..]));
    }

    #[test]
    fn photometric_from_interpretation() {
        assert_eq!(
            Photometric::from_interpretation(&PhotometricInterpretation::Monochrome1),
            Photometric::Monochrome1
        );
        assert_eq!(
            Photometric::from_interpretation(&PhotometricInterpretation::Monochrome2),
            Photometric::Monochrome2
        );
        assert_eq!(
            Photometric::from_interpretation(&PhotometricInterpretation::YbrFull),
            Photometric::Rgb
        );
    }
}
