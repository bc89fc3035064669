use super::element::{keyword_tag, DataElement, Item};
use super::parser::{parse_stream, ParseError, PixelData, TransferSyntax};
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{DefaultDicomObject, FileMetaTable};
use std::fmt;

pub const UNKNOWN_STUDY: &str = "unknown-study";
pub const UNKNOWN_SERIES: &str = "unknown-series";

/// Where a lookup looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Top-level elements of the dataset.
    Dataset,
    /// The single item of the Shared Functional Groups Sequence.
    Shared,
    /// The Per-frame Functional Groups item of one frame.
    PerFrame(u32),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Dataset => f.write_str("Dataset"),
            Scope::Shared => f.write_str("Shared"),
            Scope::PerFrame(frame) => write!(f, "Per-frame {}", frame + 1),
        }
    }
}

/// One parsed DICOM object.
///
/// The functional group sequences are lifted out of the dataset into their
/// own scopes. Pixel Data is not copied into the header tree; it stays in the
/// dicom-rs object, which the frame decoder reads from.
#[derive(Debug)]
pub struct Instance {
    sop_instance_uid: String,
    study_instance_uid: String,
    series_instance_uid: String,
    dataset: Item,
    shared: Option<Item>,
    per_frame: Vec<Item>,
    frames: u32,
    transfer_syntax: TransferSyntax,
    pixel_data: Option<PixelData>,
    object: DefaultDicomObject,
}

impl Instance {
    /// Parses a complete Part 10 stream.
    ///
    /// # Errors
    /// Any [`ParseError`] raised while reading the stream. Missing optional
    /// elements never fail.
    pub fn parse(bytes: impl AsRef<[u8]>) -> Result<Self, ParseError> {
        let bytes = bytes.as_ref();
        let parsed = parse_stream(bytes)?;
        let mut dataset = parsed.dataset;

        let shared = dataset
            .remove(tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE)
            .and_then(|element| element.items().and_then(|items| items.first().cloned()));
        let per_frame = dataset
            .remove(tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE)
            .and_then(|element| element.items().map(<[Item]>::to_vec))
            .unwrap_or_default();

        let declared = dataset
            .get(tags::NUMBER_OF_FRAMES)
            .and_then(DataElement::to_int)
            .filter(|count| *count > 0)
            .and_then(|count| u32::try_from(count).ok());
        let frames = match declared {
            Some(count) => count,
            None => u32::try_from(per_frame.len()).unwrap_or(u32::MAX).max(1),
        };

        let study_instance_uid =
            uid(&dataset, tags::STUDY_INSTANCE_UID).unwrap_or_else(|| UNKNOWN_STUDY.to_string());
        let series_instance_uid =
            uid(&dataset, tags::SERIES_INSTANCE_UID).unwrap_or_else(|| UNKNOWN_SERIES.to_string());
        let sop_instance_uid = uid(&dataset, tags::SOP_INSTANCE_UID)
            .or_else(|| {
                let media = parsed.object.meta().media_storage_sop_instance_uid();
                let media = media.trim_matches(['\0', ' ']);
                (!media.is_empty()).then(|| media.to_string())
            })
            .unwrap_or_else(|| format!("unknown-sop-{:016x}", content_hash(bytes)));

        log::debug!(
            "Parsed {sop_instance_uid}: {} element(s), {frames} frame(s), transfer syntax {}",
            dataset.len(),
            parsed.transfer_syntax.uid()
        );

        Ok(Self {
            sop_instance_uid,
            study_instance_uid,
            series_instance_uid,
            dataset,
            shared,
            per_frame,
            frames,
            transfer_syntax: parsed.transfer_syntax,
            pixel_data: parsed.pixel_data,
            object: parsed.object,
        })
    }

    pub fn sop_instance_uid(&self) -> &str {
        &self.sop_instance_uid
    }

    pub fn study_instance_uid(&self) -> &str {
        &self.study_instance_uid
    }

    pub fn series_instance_uid(&self) -> &str {
        &self.series_instance_uid
    }

    /// Number of frames; at least one.
    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn transfer_syntax(&self) -> &TransferSyntax {
        &self.transfer_syntax
    }

    pub fn pixel_data(&self) -> Option<PixelData> {
        self.pixel_data
    }

    /// The dicom-rs object the header tree was read from.
    pub fn object(&self) -> &DefaultDicomObject {
        &self.object
    }

    pub fn meta(&self) -> &FileMetaTable {
        self.object.meta()
    }

    pub fn dataset(&self) -> &Item {
        &self.dataset
    }

    pub fn shared(&self) -> Option<&Item> {
        self.shared.as_ref()
    }

    pub fn per_frame(&self, frame: u32) -> Option<&Item> {
        self.per_frame.get(frame as usize)
    }

    pub fn per_frame_count(&self) -> usize {
        self.per_frame.len()
    }

    /// The item a scope reads from, if the object has one.
    pub fn scope_item(&self, scope: Scope) -> Option<&Item> {
        match scope {
            Scope::Dataset => Some(&self.dataset),
            Scope::Shared => self.shared.as_ref(),
            Scope::PerFrame(frame) => self.per_frame(frame),
        }
    }

    /// Looks up `tag` in exactly one scope. Functional group scopes also look
    /// one level into their macro sequences.
    pub fn lookup(&self, scope: Scope, tag: Tag) -> Option<&DataElement> {
        match scope {
            Scope::Dataset => self.dataset.get(tag),
            Scope::Shared | Scope::PerFrame(_) => self.scope_item(scope)?.find_in_groups(tag),
        }
    }

    /// Effective value of `tag` for `frame`: the frame's own group wins over
    /// the shared group, which wins over the dataset.
    pub fn resolve(&self, tag: Tag, frame: u32) -> Option<&DataElement> {
        [Scope::PerFrame(frame), Scope::Shared, Scope::Dataset]
            .into_iter()
            .find_map(|scope| self.lookup(scope, tag))
    }

    pub fn resolve_keyword(&self, keyword: &str, frame: u32) -> Option<&DataElement> {
        self.resolve(keyword_tag(keyword)?, frame)
    }

    /// Follows `path` through nested sequences of one scope.
    pub fn lookup_path(&self, scope: Scope, path: &[Tag]) -> Option<&DataElement> {
        self.scope_item(scope)?.lookup_path(path)
    }

    /// Trimmed first string of a top-level element; empty strings count as missing.
    pub fn text(&self, tag: Tag) -> Option<String> {
        self.dataset
            .get(tag)
            .and_then(DataElement::to_str)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn int(&self, tag: Tag) -> Option<i64> {
        self.dataset.get(tag).and_then(DataElement::to_int)
    }

    pub fn instance_number(&self) -> Option<i64> {
        self.int(tags::INSTANCE_NUMBER)
    }

    pub fn modality(&self) -> Option<String> {
        self.text(tags::MODALITY)
    }
}

/// 64-bit FNV-1a; stable across runs and toolchains.
fn content_hash(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

fn uid(item: &Item, tag: Tag) -> Option<String> {
    item.get(tag)
        .and_then(DataElement::first_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{file, identity, seq, text, Node, EXPLICIT_LE, IMPLICIT_LE};

    fn transformation(slope: Option<&str>, intercept: &str) -> Node {
        let mut values = vec![text(tags::RESCALE_INTERCEPT, "DS", intercept)];
        if let Some(slope) = slope {
            values.push(text(tags::RESCALE_SLOPE, "DS", slope));
        }
        seq(tags::PIXEL_VALUE_TRANSFORMATION_SEQUENCE, vec![values])
    }

    fn enhanced() -> Vec<Node> {
        let mut nodes = identity("1.2", "1.2.3", "1.2.3.4", Some(1));
        nodes.push(text(tags::MODALITY, "CS", "MR"));
        nodes.push(text(tags::NUMBER_OF_FRAMES, "IS", "3"));
        nodes.push(seq(
            tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE,
            vec![vec![transformation(Some("2"), "-5")]],
        ));
        nodes.push(seq(
            tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE,
            vec![vec![], vec![transformation(None, "10")], vec![]],
        ));
        nodes
    }

    fn intercept(instance: &Instance, frame: u32) -> Option<f64> {
        instance
            .resolve(tags::RESCALE_INTERCEPT, frame)
            .and_then(DataElement::to_f64)
    }

    #[test]
    fn shared_values_apply_to_every_frame() {
        let instance = Instance::parse(file(EXPLICIT_LE, &enhanced(), None)).unwrap();
        assert_eq!(instance.frames(), 3);
        for frame in 0..3 {
            let slope = instance
                .resolve(tags::RESCALE_SLOPE, frame)
                .and_then(DataElement::to_f64);
            assert_eq!(slope, Some(2.0));
            assert_eq!(
                instance.resolve(tags::MODALITY, frame).and_then(DataElement::first_str),
                Some("MR")
            );
        }
    }

    #[test]
    fn per_frame_override_only_changes_its_frame() {
        let instance = Instance::parse(file(IMPLICIT_LE, &enhanced(), None)).unwrap();
        assert_eq!(intercept(&instance, 0), Some(-5.0));
        assert_eq!(intercept(&instance, 1), Some(10.0));
        assert_eq!(intercept(&instance, 2), Some(-5.0));
        assert!(instance.lookup(Scope::Dataset, tags::RESCALE_INTERCEPT).is_none());
        assert!(instance.lookup(Scope::PerFrame(0), tags::RESCALE_INTERCEPT).is_none());
        assert!(instance
            .dataset()
            .get(tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE)
            .is_none());
    }

    #[test]
    fn paths_and_keywords_resolve() {
        let instance = Instance::parse(file(EXPLICIT_LE, &enhanced(), None)).unwrap();
        let path = [
            tags::PIXEL_VALUE_TRANSFORMATION_SEQUENCE,
            tags::RESCALE_INTERCEPT,
        ];
        assert_eq!(
            instance
                .lookup_path(Scope::PerFrame(1), &path)
                .and_then(DataElement::to_f64),
            Some(10.0)
        );
        assert!(instance.lookup_path(Scope::PerFrame(7), &path).is_none());
        assert_eq!(
            instance
                .resolve_keyword("RescaleSlope", 1)
                .and_then(DataElement::to_f64),
            Some(2.0)
        );
        assert!(instance.resolve_keyword("NotAKeyword", 0).is_none());
    }

    #[test]
    fn missing_identifiers_fall_back() {
        let bytes = file(EXPLICIT_LE, &[text(tags::MODALITY, "CS", "CT")], None);
        let first = Instance::parse(bytes.clone()).unwrap();
        let second = Instance::parse(bytes).unwrap();
        assert_eq!(first.study_instance_uid(), UNKNOWN_STUDY);
        assert_eq!(first.series_instance_uid(), UNKNOWN_SERIES);
        assert!(first.sop_instance_uid().starts_with("unknown-sop-"));
        assert_eq!(first.sop_instance_uid(), second.sop_instance_uid());
        assert_eq!(first.frames(), 1);
        assert!(first.pixel_data().is_none());
    }

    #[test]
    fn fallback_keys_hash_the_whole_stream() {
        assert_eq!(content_hash(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(content_hash(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(content_hash(b"foobar"), 0x8594_4171_f739_67e8);

        let bytes = file(EXPLICIT_LE, &[text(tags::MODALITY, "CS", "CT")], None);
        let instance = Instance::parse(&bytes).unwrap();
        assert_eq!(
            instance.sop_instance_uid(),
            format!("unknown-sop-{:016x}", content_hash(&bytes))
        );
        let other = Instance::parse(file(EXPLICIT_LE, &[text(tags::MODALITY, "CS", "MR")], None))
            .unwrap();
        assert_ne!(instance.sop_instance_uid(), other.sop_instance_uid());
    }
}
