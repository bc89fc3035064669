use crate::frame::{Photometric, RawFrame};
use crate::model::{Instance, PixelData};
use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("Corrupt pixel data: {0}")]
    CorruptData(String),

    #[error("Instance has no pixel data")]
    NoPixelData,

    #[error("Requested frame {frame}, but only {frames} frame(s) are available")]
    FrameOutOfRange { frame: u32, frames: u32 },
}

/// Produces the stored pixel values of one frame. The pixel cache calls this
/// on a miss, possibly from several threads at once.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, instance: &Instance, frame: u32) -> Result<RawFrame, DecodeError>;
}

impl<F> FrameDecoder for F
where
    F: Fn(&Instance, u32) -> Result<RawFrame, DecodeError> + Send + Sync,
{
    fn decode(&self, instance: &Instance, frame: u32) -> Result<RawFrame, DecodeError> {
        self(instance, frame)
    }
}

/// Decodes frames through dicom-rs, native and encapsulated alike.
///
/// Monochrome frames keep their stored values; colour frames are converted
/// to interleaved RGB by the pixel data crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardDecoder;

impl FrameDecoder for StandardDecoder {
    fn decode(&self, instance: &Instance, frame: u32) -> Result<RawFrame, DecodeError> {
        check_frame(instance, frame)?;
        let encapsulated = match instance.pixel_data() {
            Some(PixelData::Encapsulated { .. }) => true,
            Some(PixelData::Native) => false,
            None => return Err(DecodeError::NoPixelData),
        };
        // A native stream that fails to decode has inconsistent pixel
        // attributes; an encapsulated one may also lack a codec.
        let failure = |message: String| {
            if encapsulated {
                DecodeError::UnsupportedCodec(format!(
                    "{}: {message}",
                    instance.transfer_syntax().uid()
                ))
            } else {
                DecodeError::CorruptData(message)
            }
        };

        let decoded = instance
            .object()
            .decode_pixel_data_frame(frame)
            .map_err(|err| failure(format!("failed to decode pixel data ({err})")))?;
        let photometric = Photometric::from_interpretation(decoded.photometric_interpretation());

        let samples: Vec<i32> = if photometric.is_color() {
            decoded
                .to_dynamic_image(0)
                .map_err(|err| failure(format!("failed to convert colour frame ({err})")))?
                .into_rgb8()
                .into_raw()
                .into_iter()
                .map(i32::from)
                .collect()
        } else {
            let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
            decoded
                .to_vec_frame_with_options(0, &options)
                .map_err(|err| {
                    DecodeError::CorruptData(format!("failed to materialize frame ({err})"))
                })?
        };
        RawFrame::new(decoded.columns(), decoded.rows(), photometric, samples)
    }
}

fn check_frame(instance: &Instance, frame: u32) -> Result<(), DecodeError> {
    if frame >= instance.frames() {
        return Err(DecodeError::FrameOutOfRange {
            frame,
            frames: instance.frames(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        file, mono16, text, u16_pixels, us, Node, EXPLICIT_BE, EXPLICIT_LE, JPEG_BASELINE,
    };
    use dicom::dictionary_std::tags;

    fn mono(values: &[u16], signed: bool, big_endian: bool, frames: Option<&str>) -> Instance {
        let mut nodes = mono16(2, 2, signed);
        if let Some(frames) = frames {
            nodes.push(text(tags::NUMBER_OF_FRAMES, "IS", frames));
        }
        let syntax = if big_endian { EXPLICIT_BE } else { EXPLICIT_LE };
        Instance::parse(file(syntax, &nodes, Some(&u16_pixels(values, big_endian)))).unwrap()
    }

    #[test]
    fn reads_signed_and_unsigned_words() {
        let unsigned = mono(&[0, 1, 1024, 65535], false, false, None);
        let frame = StandardDecoder.decode(&unsigned, 0).unwrap();
        assert_eq!(frame.samples(), &[0, 1, 1024, 65535]);

        let signed = mono(&[0, 1, 1024, 65535], true, true, None);
        let frame = StandardDecoder.decode(&signed, 0).unwrap();
        assert_eq!(frame.samples(), &[0, 1, 1024, -1]);
        assert_eq!(frame.photometric(), Photometric::Monochrome2);
    }

    #[test]
    fn selects_frames_of_a_multiframe_object() {
        let values: Vec<u16> = (0..8).collect();
        let instance = mono(&values, false, false, Some("2"));
        assert_eq!(StandardDecoder.decode(&instance, 1).unwrap().samples(), &[4, 5, 6, 7]);
        assert_eq!(
            StandardDecoder.decode(&instance, 2),
            Err(DecodeError::FrameOutOfRange { frame: 2, frames: 2 })
        );
    }

    #[test]
    fn short_pixel_data_is_corrupt() {
        let instance = mono(&[1, 2, 3], false, false, None);
        assert!(matches!(
            StandardDecoder.decode(&instance, 0),
            Err(DecodeError::CorruptData(_))
        ));
    }

    #[test]
    fn missing_pixel_data() {
        let instance = Instance::parse(file(EXPLICIT_LE, &mono16(2, 2, false), None)).unwrap();
        assert_eq!(
            StandardDecoder.decode(&instance, 0),
            Err(DecodeError::NoPixelData)
        );
    }

    #[test]
    fn planar_color_is_interleaved() {
        let nodes = vec![
            us(tags::SAMPLES_PER_PIXEL, 3),
            text(tags::PHOTOMETRIC_INTERPRETATION, "CS", "RGB"),
            us(tags::PLANAR_CONFIGURATION, 1),
            us(tags::ROWS, 1),
            us(tags::COLUMNS, 2),
            us(tags::BITS_ALLOCATED, 8),
            us(tags::BITS_STORED, 8),
            us(tags::HIGH_BIT, 7),
            us(tags::PIXEL_REPRESENTATION, 0),
        ];
        let pixels = [10u8, 11, 20, 21, 30, 31];
        let mut bytes = file(EXPLICIT_LE, &nodes, None);
        bytes.extend_from_slice(&[0xE0, 0x7F, 0x10, 0x00, b'O', b'B', 0, 0]);
        bytes.extend_from_slice(&(pixels.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&pixels);

        let instance = Instance::parse(bytes).unwrap();
        let frame = StandardDecoder.decode(&instance, 0).unwrap();
        assert_eq!(frame.photometric(), Photometric::Rgb);
        assert_eq!(frame.samples(), &[10, 20, 30, 11, 21, 31]);
    }

    #[test]
    fn closures_are_decoders() {
        let decoder = |_: &Instance, _: u32| -> Result<RawFrame, DecodeError> {
            Err(DecodeError::NoPixelData)
        };
        let instance = mono(&[0; 4], false, false, None);
        assert_eq!(decoder.decode(&instance, 0), Err(DecodeError::NoPixelData));
    }

    #[test]
    fn encapsulated_garbage_fails_cleanly() {
        let nodes: Vec<Node> = mono16(1, 1, false);
        let mut bytes = file(JPEG_BASELINE, &nodes, None);
        bytes.extend_from_slice(&[0xE0, 0x7F, 0x10, 0x00, b'O', b'B', 0, 0]);
        bytes.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        bytes.extend_from_slice(&[0xFE, 0xFF, 0x00, 0xE0, 0, 0, 0, 0]);
        bytes.extend_from_slice(&[0xFE, 0xFF, 0x00, 0xE0, 4, 0, 0, 0, 1, 2, 3, 4]);
        bytes.extend_from_slice(&[0xFE, 0xFF, 0xDD, 0xE0, 0, 0, 0, 0]);

        let instance = Instance::parse(bytes).unwrap();
        assert!(matches!(
            StandardDecoder.decode(&instance, 0),
            Err(DecodeError::UnsupportedCodec(_))
        ));
    }
}
