use dicom::core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom::core::{Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use std::collections::BTreeMap;

/// Value of a single data element.
///
/// Textual VRs keep their backslash-separated values as strings, binary
/// numeric VRs are widened to `f64`, and bulk binary VRs keep their bytes
/// normalized to little endian.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Empty,
    Strings(Vec<String>),
    Numbers(Vec<f64>),
    Binary(Vec<u8>),
    Sequence(Vec<Item>),
}

impl Value {
    pub fn multiplicity(&self) -> usize {
        match self {
            Value::Empty => 0,
            Value::Strings(values) => values.len(),
            Value::Numbers(values) => values.len(),
            Value::Binary(_) => 1,
            Value::Sequence(items) => items.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataElement {
    tag: Tag,
    vr: VR,
    value: Value,
}

impl DataElement {
    pub fn new(tag: Tag, vr: VR, value: Value) -> Self {
        Self { tag, vr, value }
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn vr(&self) -> VR {
        self.vr
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Items of a sequence element, `None` for any other value.
    pub fn items(&self) -> Option<&[Item]> {
        match &self.value {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn first_str(&self) -> Option<&str> {
        match &self.value {
            Value::Strings(values) => values.first().map(String::as_str),
            _ => None,
        }
    }

    /// All values rendered as text and joined with a backslash.
    pub fn to_str(&self) -> Option<String> {
        match &self.value {
            Value::Strings(values) => Some(values.join("\\")),
            Value::Numbers(values) => Some(
                values
                    .iter()
                    .map(f64::to_string)
                    .collect::<Vec<_>>()
                    .join("\\"),
            ),
            _ => None,
        }
    }

    /// Every value that can be read as a number. Decimal and integer strings
    /// are parsed; unparseable entries are skipped.
    pub fn to_f64s(&self) -> Vec<f64> {
        match &self.value {
            Value::Numbers(values) => values.clone(),
            Value::Strings(values) => values
                .iter()
                .filter_map(|value| value.trim().parse::<f64>().ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn to_f64(&self) -> Option<f64> {
        match &self.value {
            Value::Numbers(values) => values.first().copied(),
            Value::Strings(values) => values.first()?.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn to_int(&self) -> Option<i64> {
        let value = self.to_f64()?;
        if value.is_finite() && value.fract() == 0.0 {
            Some(value as i64)
        } else {
            None
        }
    }

    /// Values as unsigned 16-bit words, whether they were stored as `US`
    /// numbers or as an `OW` blob.
    pub fn words(&self) -> Option<Vec<u16>> {
        match &self.value {
            Value::Numbers(values) => Some(values.iter().map(|value| *value as u16).collect()),
            Value::Binary(bytes) => Some(
                bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// One dataset or sequence item: an ordered map of tag to element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Item {
    elements: BTreeMap<Tag, DataElement>,
}

impl Item {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an element, returning the one it replaced.
    pub fn insert(&mut self, element: DataElement) -> Option<DataElement> {
        self.elements.insert(element.tag, element)
    }

    pub fn remove(&mut self, tag: Tag) -> Option<DataElement> {
        self.elements.remove(&tag)
    }

    pub fn get(&self, tag: Tag) -> Option<&DataElement> {
        self.elements.get(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataElement> {
        self.elements.values()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn items(&self, tag: Tag) -> Option<&[Item]> {
        self.get(tag)?.items()
    }

    /// Follows a chain of tags through nested sequences, entering the first
    /// item of every intermediate sequence.
    pub fn lookup_path(&self, path: &[Tag]) -> Option<&DataElement> {
        let (last, parents) = path.split_last()?;
        let mut cursor = self;
        for tag in parents {
            cursor = cursor.items(*tag)?.first()?;
        }
        cursor.get(*last)
    }

    /// Looks for `tag` among this item's own elements, then inside the items
    /// of its sequences one level down. Functional group items wrap every
    /// attribute in a single-item macro sequence, so this is how a value is
    /// found inside a Shared or Per-frame group.
    pub fn find_in_groups(&self, tag: Tag) -> Option<&DataElement> {
        self.get(tag).or_else(|| {
            self.iter()
                .filter_map(DataElement::items)
                .flat_map(|items| items.iter())
                .find_map(|nested| nested.get(tag))
        })
    }
}

/// Resolves a standard dictionary keyword such as `DiffusionBValue`.
pub fn keyword_tag(keyword: &str) -> Option<Tag> {
    StandardDataDictionary
        .by_name(keyword)
        .map(|entry| entry.tag())
}

/// Keyword of a tag in the standard dictionary.
pub fn keyword_of(tag: Tag) -> Option<&'static str> {
    StandardDataDictionary.by_tag(tag).map(|entry| entry.alias)
}
