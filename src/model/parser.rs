use super::element::{DataElement, Item, Value};
use dicom::core::header::Header;
use dicom::core::value::{PrimitiveValue, Value as DicomValue};
use dicom::core::VR;
use dicom::dictionary_std::tags;
use dicom::encoding::transfer_syntax::TransferSyntaxIndex;
use dicom::object::file::ReadPreamble;
use dicom::object::{DefaultDicomObject, FileMetaTable, InMemDicomObject, OpenFileOptions, ReadError};
use dicom::transfer_syntax::TransferSyntaxRegistry;
use std::error::Error as StdError;
use std::io;
use thiserror::Error;

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";
const MAX_DEPTH: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Not DICOM: missing preamble or DICM magic")]
    NotDicom,

    #[error("Truncated data: {context}")]
    TruncatedData { context: String },

    #[error("Unsupported transfer syntax: {0}")]
    UnsupportedTransferSyntax(String),

    #[error("Malformed data: {context}")]
    Malformed { context: String },
}

/// Transfer syntax of a stream, as known to the dicom-rs registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSyntax {
    uid: String,
    name: String,
}

impl TransferSyntax {
    /// Looks up a transfer syntax UID in the registry.
    ///
    /// # Errors
    /// `UnsupportedTransferSyntax` for UIDs the registry does not know.
    pub fn from_uid(uid: &str) -> Result<Self, ParseError> {
        let uid = uid.trim_end_matches(['\0', ' ']);
        TransferSyntaxRegistry
            .get(uid)
            .map(|syntax| Self {
                uid: syntax.uid().to_string(),
                name: syntax.name().to_string(),
            })
            .ok_or_else(|| ParseError::UnsupportedTransferSyntax(uid.to_string()))
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// How the top-level Pixel Data element is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelData {
    Native,
    Encapsulated { fragments: usize },
}

/// Everything read out of one stream.
#[derive(Debug)]
pub(crate) struct ParsedStream {
    pub object: DefaultDicomObject,
    pub dataset: Item,
    pub transfer_syntax: TransferSyntax,
    pub pixel_data: Option<PixelData>,
}

/// Returns whether `bytes` starts with a preamble followed by the DICM magic.
pub fn has_dicom_magic(bytes: &[u8]) -> bool {
    bytes.len() >= PREAMBLE_LEN + MAGIC.len()
        && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] == MAGIC
}

pub(crate) fn parse_stream(bytes: &[u8]) -> Result<ParsedStream, ParseError> {
    if !has_dicom_magic(bytes) {
        return Err(ParseError::NotDicom);
    }

    let meta = FileMetaTable::from_reader(&bytes[PREAMBLE_LEN..])
        .map_err(|err| stream_error("file meta group", &err))?;
    let transfer_syntax = TransferSyntax::from_uid(meta.transfer_syntax())?;

    let object = OpenFileOptions::new()
        .read_preamble(ReadPreamble::Always)
        .from_reader(bytes)
        .map_err(|err| match err {
            ReadError::ReadUnsupportedTransferSyntax { uid, .. } => {
                ParseError::UnsupportedTransferSyntax(uid)
            }
            err @ ReadError::PrematureEnd { .. } => ParseError::TruncatedData {
                context: format!("data set: {err}"),
            },
            other => stream_error("data set", &other),
        })?;

    let pixel_data = object
        .element(tags::PIXEL_DATA)
        .ok()
        .map(|element| match element.value() {
            DicomValue::PixelSequence(sequence) => PixelData::Encapsulated {
                fragments: sequence.fragments().len(),
            },
            _ => PixelData::Native,
        });
    let dataset = convert_object(&object, 0)?;

    Ok(ParsedStream {
        object,
        dataset,
        transfer_syntax,
        pixel_data,
    })
}

/// Classifies a dicom-rs read failure: running out of bytes anywhere in the
/// cause chain means the stream was cut short.
fn stream_error(context: &str, error: &(dyn StdError + 'static)) -> ParseError {
    let context = format!("{context}: {error}");
    let truncated = std::iter::successors(Some(error), |&err| err.source()).any(|err| {
        err.downcast_ref::<io::Error>()
            .is_some_and(|io| io.kind() == io::ErrorKind::UnexpectedEof)
    });
    if truncated {
        ParseError::TruncatedData { context }
    } else {
        ParseError::Malformed { context }
    }
}

/// Copies a dicom-rs object into the header tree. Top-level Pixel Data stays
/// in the object.
fn convert_object(object: &InMemDicomObject, depth: usize) -> Result<Item, ParseError> {
    if depth > MAX_DEPTH {
        return Err(ParseError::Malformed {
            context: format!("sequences nested deeper than {MAX_DEPTH} levels"),
        });
    }

    let mut item = Item::new();
    for element in object.iter() {
        let tag = element.tag();
        if depth == 0 && tag == tags::PIXEL_DATA {
            continue;
        }
        let value = match element.value() {
            DicomValue::Primitive(primitive) => primitive_value(primitive, element.vr()),
            DicomValue::Sequence(sequence) => Value::Sequence(
                sequence
                    .items()
                    .iter()
                    .map(|nested| convert_object(nested, depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            DicomValue::PixelSequence(_) => continue,
        };
        item.insert(DataElement::new(tag, element.vr(), value));
    }
    Ok(item)
}

fn primitive_value(primitive: &PrimitiveValue, vr: VR) -> Value {
    if primitive.multiplicity() == 0 {
        return Value::Empty;
    }

    match vr {
        VR::US | VR::SS | VR::UL | VR::SL | VR::FL | VR::FD | VR::SV | VR::UV => primitive
            .to_multi_float64()
            .map(|values| Value::Numbers(values.into_iter().collect()))
            .unwrap_or_else(|_| binary(primitive)),
        VR::OB | VR::OW | VR::OF | VR::OD | VR::OL | VR::OV | VR::UN | VR::AT | VR::SQ => {
            binary(primitive)
        }
        VR::LT | VR::ST | VR::UT | VR::UR => Value::Strings(vec![primitive
            .to_str()
            .trim_end_matches(['\0', ' '])
            .to_string()]),
        _ => Value::Strings(
            primitive
                .to_multi_str()
                .iter()
                .map(|value| value.trim_matches(['\0', ' ']).to_string())
                .collect(),
        ),
    }
}

/// Raw bytes of a bulk value, words written little endian.
fn binary(primitive: &PrimitiveValue) -> Value {
    let bytes = match primitive {
        PrimitiveValue::Tags(values) => values
            .iter()
            .flat_map(|tag| [tag.group().to_le_bytes(), tag.element().to_le_bytes()])
            .flatten()
            .collect(),
        PrimitiveValue::U16(words) => words.iter().flat_map(|word| word.to_le_bytes()).collect(),
        other => other.to_bytes().into_owned(),
    };
    Value::Binary(bytes)
}
