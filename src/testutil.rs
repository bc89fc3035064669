//! Synthetic DICOM streams for tests.

use dicom::core::Tag;
use dicom::dictionary_std::tags;

use dicom::dictionary_std::uids;

const UNDEFINED: u32 = 0xFFFF_FFFF;
const SECONDARY_CAPTURE: &str = "1.2.840.10008.5.1.4.1.1.7";
const IMPLEMENTATION_CLASS: &str = "1.2.826.0.1.3680043.10.1";

#[derive(Debug, Clone, Copy)]
pub(crate) struct Syntax {
    pub uid: &'static str,
    pub explicit: bool,
    pub big_endian: bool,
}

pub(crate) const EXPLICIT_LE: Syntax = Syntax {
    uid: uids::EXPLICIT_VR_LITTLE_ENDIAN,
    explicit: true,
    big_endian: false,
};

pub(crate) const IMPLICIT_LE: Syntax = Syntax {
    uid: uids::IMPLICIT_VR_LITTLE_ENDIAN,
    explicit: false,
    big_endian: false,
};

pub(crate) const EXPLICIT_BE: Syntax = Syntax {
    uid: uids::EXPLICIT_VR_BIG_ENDIAN,
    explicit: true,
    big_endian: true,
};

pub(crate) const JPEG_BASELINE: Syntax = Syntax {
    uid: "1.2.840.10008.1.2.4.50",
    explicit: true,
    big_endian: false,
};

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Text(Tag, &'static str, String),
    U16(Tag, u16),
    F64(Tag, f64),
    Bytes(Tag, &'static str, Vec<u8>),
    /// Undefined-length sequence with delimited items.
    Seq(Tag, Vec<Vec<Node>>),
    /// Defined-length sequence with defined-length items.
    SeqDefined(Tag, Vec<Vec<Node>>),
}

pub(crate) fn text(tag: Tag, vr: &'static str, value: &str) -> Node {
    Node::Text(tag, vr, value.to_string())
}

pub(crate) fn us(tag: Tag, value: u16) -> Node {
    Node::U16(tag, value)
}

pub(crate) fn fd(tag: Tag, value: f64) -> Node {
    Node::F64(tag, value)
}

pub(crate) fn seq(tag: Tag, items: Vec<Vec<Node>>) -> Node {
    Node::Seq(tag, items)
}

/// A complete Part 10 stream: preamble, magic, meta group, dataset and an
/// optional native Pixel Data element. The meta group echoes the dataset's
/// SOP Instance UID, or leaves it empty.
pub(crate) fn file(syntax: Syntax, dataset: &[Node], pixel_data: Option<&[u8]>) -> Vec<u8> {
    let mut out = vec![0u8; 128];
    out.extend_from_slice(b"DICM");

    let sop_instance_uid = dataset
        .iter()
        .find_map(|node| match node {
            Node::Text(tag, _, value) if *tag == tags::SOP_INSTANCE_UID => Some(value.as_str()),
            _ => None,
        })
        .unwrap_or("");
    let mut meta = Vec::new();
    write_nodes(
        &mut meta,
        &[
            Node::Bytes(tags::FILE_META_INFORMATION_VERSION, "OB", vec![0, 1]),
            text(tags::MEDIA_STORAGE_SOP_CLASS_UID, "UI", SECONDARY_CAPTURE),
            text(tags::MEDIA_STORAGE_SOP_INSTANCE_UID, "UI", sop_instance_uid),
            text(tags::TRANSFER_SYNTAX_UID, "UI", syntax.uid),
            text(tags::IMPLEMENTATION_CLASS_UID, "UI", IMPLEMENTATION_CLASS),
        ],
        EXPLICIT_LE,
    );
    header(&mut out, tags::FILE_META_INFORMATION_GROUP_LENGTH, "UL", 4, EXPLICIT_LE);
    out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
    out.extend_from_slice(&meta);

    write_nodes(&mut out, dataset, syntax);
    if let Some(pixels) = pixel_data {
        header(&mut out, tags::PIXEL_DATA, "OW", pixels.len() as u32, syntax);
        out.extend_from_slice(pixels);
    }
    out
}

/// Identifiers every hierarchy needs.
pub(crate) fn identity(study: &str, series: &str, sop: &str, number: Option<i32>) -> Vec<Node> {
    let mut nodes = vec![
        text(tags::SOP_INSTANCE_UID, "UI", sop),
        text(tags::STUDY_INSTANCE_UID, "UI", study),
        text(tags::SERIES_INSTANCE_UID, "UI", series),
    ];
    if let Some(number) = number {
        nodes.push(text(tags::INSTANCE_NUMBER, "IS", &number.to_string()));
    }
    nodes
}

/// Monochrome 16-bit image description for a rows x columns frame.
pub(crate) fn mono16(rows: u16, columns: u16, signed: bool) -> Vec<Node> {
    vec![
        us(tags::SAMPLES_PER_PIXEL, 1),
        text(tags::PHOTOMETRIC_INTERPRETATION, "CS", "MONOCHROME2"),
        us(tags::ROWS, rows),
        us(tags::COLUMNS, columns),
        us(tags::BITS_ALLOCATED, 16),
        us(tags::BITS_STORED, 16),
        us(tags::HIGH_BIT, 15),
        us(tags::PIXEL_REPRESENTATION, u16::from(signed)),
    ]
}

pub(crate) fn u16_pixels(values: &[u16], big_endian: bool) -> Vec<u8> {
    values
        .iter()
        .flat_map(|value| {
            if big_endian {
                value.to_be_bytes()
            } else {
                value.to_le_bytes()
            }
        })
        .collect()
}

fn write_nodes(out: &mut Vec<u8>, nodes: &[Node], syntax: Syntax) {
    for node in nodes {
        write_node(out, node, syntax);
    }
}

fn write_node(out: &mut Vec<u8>, node: &Node, syntax: Syntax) {
    match node {
        Node::Text(tag, vr, value) => {
            let mut bytes = value.as_bytes().to_vec();
            if bytes.len() % 2 == 1 {
                bytes.push(if *vr == "UI" { 0 } else { b' ' });
            }
            header(out, *tag, vr, bytes.len() as u32, syntax);
            out.extend_from_slice(&bytes);
        }
        Node::U16(tag, value) => {
            header(out, *tag, "US", 2, syntax);
            out.extend_from_slice(&u16_bytes(*value, syntax));
        }
        Node::F64(tag, value) => {
            header(out, *tag, "FD", 8, syntax);
            if syntax.big_endian {
                out.extend_from_slice(&value.to_be_bytes());
            } else {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        Node::Bytes(tag, vr, bytes) => {
            header(out, *tag, vr, bytes.len() as u32, syntax);
            out.extend_from_slice(bytes);
        }
        Node::Seq(tag, items) => {
            header(out, *tag, "SQ", UNDEFINED, syntax);
            for item in items {
                raw_header(out, Tag(0xFFFE, 0xE000), UNDEFINED, syntax);
                write_nodes(out, item, syntax);
                raw_header(out, Tag(0xFFFE, 0xE00D), 0, syntax);
            }
            raw_header(out, Tag(0xFFFE, 0xE0DD), 0, syntax);
        }
        Node::SeqDefined(tag, items) => {
            let mut body = Vec::new();
            for item in items {
                let mut content = Vec::new();
                write_nodes(&mut content, item, syntax);
                raw_header(&mut body, Tag(0xFFFE, 0xE000), content.len() as u32, syntax);
                body.extend_from_slice(&content);
            }
            header(out, *tag, "SQ", body.len() as u32, syntax);
            out.extend_from_slice(&body);
        }
    }
}

fn u16_bytes(value: u16, syntax: Syntax) -> [u8; 2] {
    if syntax.big_endian {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    }
}

fn u32_bytes(value: u32, syntax: Syntax) -> [u8; 4] {
    if syntax.big_endian {
        value.to_be_bytes()
    } else {
        value.to_le_bytes()
    }
}

fn raw_header(out: &mut Vec<u8>, tag: Tag, length: u32, syntax: Syntax) {
    out.extend_from_slice(&u16_bytes(tag.group(), syntax));
    out.extend_from_slice(&u16_bytes(tag.element(), syntax));
    out.extend_from_slice(&u32_bytes(length, syntax));
}

fn header(out: &mut Vec<u8>, tag: Tag, vr: &str, length: u32, syntax: Syntax) {
    if !syntax.explicit {
        raw_header(out, tag, length, syntax);
        return;
    }
    out.extend_from_slice(&u16_bytes(tag.group(), syntax));
    out.extend_from_slice(&u16_bytes(tag.element(), syntax));
    out.extend_from_slice(vr.as_bytes());
    if matches!(
        vr,
        "OB" | "OD" | "OF" | "OL" | "OV" | "OW" | "SQ" | "SV" | "UC" | "UN" | "UR" | "UT" | "UV"
    ) {
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&u32_bytes(length, syntax));
    } else {
        out.extend_from_slice(&u16_bytes(length as u16, syntax));
    }
}
