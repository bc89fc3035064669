use super::element::{keyword_of, DataElement, Item};
use super::instance::Instance;
use crate::utils::{format_tag, value_to_string};
use dicom::core::Tag;
use dicom::dictionary_std::tags;
use std::fmt;

/// Which part of an instance the header panel lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderScope {
    #[default]
    Dataset,
    Shared,
    /// The current frame's own group followed by the shared group.
    FrameCombined,
    FramePerFrame,
    FrameShared,
}

impl HeaderScope {
    pub const ALL: [HeaderScope; 5] = [
        HeaderScope::Dataset,
        HeaderScope::Shared,
        HeaderScope::FrameCombined,
        HeaderScope::FramePerFrame,
        HeaderScope::FrameShared,
    ];

    pub fn label(self) -> &'static str {
        match self {
            HeaderScope::Dataset => "Dataset",
            HeaderScope::Shared => "Shared Functional Groups",
            HeaderScope::FrameCombined => "Frame: Combined",
            HeaderScope::FramePerFrame => "Frame: Per-frame only",
            HeaderScope::FrameShared => "Frame: Shared only",
        }
    }
}

impl fmt::Display for HeaderScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One line of the flattened header tree. Section and item rows leave
/// `tag`, `vr` and `value` empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRow {
    pub depth: usize,
    pub label: String,
    pub tag: String,
    pub vr: String,
    pub value: String,
}

impl HeaderRow {
    fn section(depth: usize, label: impl Into<String>) -> Self {
        Self {
            depth,
            label: label.into(),
            tag: String::new(),
            vr: String::new(),
            value: String::new(),
        }
    }

    fn element(depth: usize, element: &DataElement) -> Self {
        let tag = format_tag(element.tag());
        Self {
            depth,
            label: keyword_of(element.tag())
                .map(str::to_string)
                .unwrap_or_else(|| tag.clone()),
            tag,
            vr: element.vr().to_string().to_owned(),
            value: value_to_string(element.value(), element.vr()),
        }
    }

    fn matches(&self, pattern: &str) -> bool {
        pattern.is_empty()
            || [&self.label, &self.tag, &self.value]
                .iter()
                .any(|field| field.to_lowercase().contains(pattern))
    }
}

const SUMMARY: [Tag; 8] = [
    tags::PATIENT_NAME,
    tags::PATIENT_ID,
    tags::STUDY_DATE,
    tags::MODALITY,
    tags::STUDY_DESCRIPTION,
    tags::SERIES_DESCRIPTION,
    tags::SERIES_NUMBER,
    tags::INSTANCE_NUMBER,
];

/// Flattens the chosen scope into rows. A non-empty `filter` keeps elements
/// whose keyword, tag or value contains it (case-insensitive), together with
/// the sections and sequences leading to them.
pub fn header_rows(
    instance: &Instance,
    scope: HeaderScope,
    frame: u32,
    filter: &str,
) -> Vec<HeaderRow> {
    let pattern = filter.trim().to_lowercase();
    let mut rows = Vec::new();

    match scope {
        HeaderScope::Dataset => {
            let mark = rows.len();
            rows.push(HeaderRow::section(0, "Summary"));
            let mut any = false;
            for tag in SUMMARY {
                if let Some(element) = instance.dataset().get(tag) {
                    let row = HeaderRow::element(1, element);
                    if row.matches(&pattern) {
                        rows.push(row);
                        any = true;
                    }
                }
            }
            if !any {
                rows.truncate(mark);
            }
            push_section(&mut rows, 0, "Dataset", instance.dataset(), &pattern);
        }
        HeaderScope::Shared => match instance.shared() {
            Some(shared) => {
                push_section(&mut rows, 0, "Shared Functional Groups", shared, &pattern);
            }
            None => rows.push(HeaderRow::section(0, "Shared Functional Groups: (absent)")),
        },
        HeaderScope::FrameCombined | HeaderScope::FramePerFrame | HeaderScope::FrameShared => {
            rows.push(HeaderRow::section(0, format!("Frame {}", frame + 1)));
            let mark = rows.len();

            if scope != HeaderScope::FrameShared {
                match instance.per_frame(frame) {
                    Some(item) => {
                        push_section(&mut rows, 1, "Per-frame Functional Groups", item, &pattern);
                    }
                    None if scope == HeaderScope::FramePerFrame => rows.push(HeaderRow::section(
                        1,
                        "Per-frame Functional Groups: (absent)",
                    )),
                    None => {}
                }
            }
            if scope != HeaderScope::FramePerFrame {
                match instance.shared() {
                    Some(item) => {
                        push_section(&mut rows, 1, "Shared Functional Groups", item, &pattern);
                    }
                    None if scope == HeaderScope::FrameShared => {
                        rows.push(HeaderRow::section(1, "Shared Functional Groups: (absent)"))
                    }
                    None => {}
                }
            }

            if rows.len() == mark {
                rows.clear();
            }
        }
    }
    rows
}

/// Pushes a titled section, dropping it again when nothing inside survives the filter.
fn push_section(rows: &mut Vec<HeaderRow>, depth: usize, title: &str, item: &Item, pattern: &str) {
    let mark = rows.len();
    rows.push(HeaderRow::section(depth, title));
    if !push_item(rows, item, depth + 1, pattern) {
        rows.truncate(mark);
    }
}

fn push_item(rows: &mut Vec<HeaderRow>, item: &Item, depth: usize, pattern: &str) -> bool {
    let mut inserted_any = false;
    for element in item.iter() {
        let row = HeaderRow::element(depth, element);
        let matches_self = row.matches(pattern);

        let Some(items) = element.items() else {
            if matches_self {
                rows.push(row);
                inserted_any = true;
            }
            continue;
        };

        let mark = rows.len();
        rows.push(row);
        let mut inserted_children = false;
        for (index, nested) in items.iter().enumerate() {
            let item_mark = rows.len();
            rows.push(HeaderRow::section(depth + 1, format!("Item {}", index + 1)));
            if push_item(rows, nested, depth + 2, pattern) {
                inserted_children = true;
            } else {
                rows.truncate(item_mark);
            }
        }

        if matches_self || inserted_children {
            inserted_any = true;
        } else {
            rows.truncate(mark);
        }
    }
    inserted_any
}
