use crate::model::{DataElement, Instance, Item};
use dicom::dictionary_std::tags;
use std::fmt;

/// Diffusion encoding of one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffusionInfo {
    pub b_value: Option<f64>,
    pub directionality: Option<String>,
    pub gradient: Option<[f64; 3]>,
}

impl DiffusionInfo {
    fn from_item(item: &Item) -> Self {
        let gradient = item
            .lookup_path(&[
                tags::DIFFUSION_GRADIENT_DIRECTION_SEQUENCE,
                tags::DIFFUSION_GRADIENT_ORIENTATION,
            ])
            .or_else(|| item.get(tags::DIFFUSION_GRADIENT_ORIENTATION))
            .map(DataElement::to_f64s)
            .and_then(|values| match values.as_slice() {
                [x, y, z, ..] => Some([*x, *y, *z]),
                _ => None,
            });

        Self {
            b_value: item
                .get(tags::DIFFUSION_B_VALUE)
                .and_then(DataElement::to_f64),
            directionality: item
                .get(tags::DIFFUSION_DIRECTIONALITY)
                .and_then(DataElement::first_str)
                .map(str::to_string)
                .filter(|value| !value.is_empty()),
            gradient,
        }
    }

    /// Single-line annotation drawn over the image.
    pub fn overlay_text(&self) -> String {
        let b_value = self
            .b_value
            .map_or_else(|| String::from("n/a"), |b| format!("{b:.1}"));
        let direction = self.directionality.as_deref().unwrap_or("n/a");
        format!("Diffusion: b={b_value} | Dir={direction}")
    }
}

impl fmt::Display for DiffusionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.overlay_text())?;
        if let Some([x, y, z]) = self.gradient {
            write!(f, " | Grad=[{x:.3}, {y:.3}, {z:.3}]")?;
        }
        Ok(())
    }
}

/// Diffusion attributes of `frame`: the frame's MR Diffusion Sequence, then
/// the shared one, then one at dataset level. The b-value is resolved on its
/// own, so a frame item without one still shows the shared or dataset value.
/// Objects that only carry a bare Diffusion b-value report just that.
pub fn diffusion_info(instance: &Instance, frame: u32) -> Option<DiffusionInfo> {
    let b_value = b_value(instance, frame);
    if let Some(item) = instance
        .resolve(tags::MR_DIFFUSION_SEQUENCE, frame)
        .and_then(DataElement::items)
        .and_then(|items| items.first())
    {
        return Some(DiffusionInfo {
            b_value,
            ..DiffusionInfo::from_item(item)
        });
    }

    Some(DiffusionInfo {
        b_value: Some(b_value?),
        directionality: instance.text(tags::DIFFUSION_DIRECTIONALITY),
        gradient: None,
    })
}

/// Effective Diffusion b-value of `frame`, looked up tag by tag through the
/// per-frame, shared and dataset scopes.
pub fn b_value(instance: &Instance, frame: u32) -> Option<f64> {
    instance
        .resolve(tags::DIFFUSION_B_VALUE, frame)
        .and_then(DataElement::to_f64)
}

/// Header summary shown in the image corner.
pub fn metadata_lines(instance: &Instance, frame: u32) -> Vec<String> {
    let field = |tag| instance.text(tag).unwrap_or_else(|| String::from("N/A"));
    vec![
        format!("Image type: {}", field(tags::IMAGE_TYPE)),
        format!("Study Date: {}", field(tags::STUDY_DATE)),
        format!("Series: {}", field(tags::SERIES_DESCRIPTION)),
        format!("Series No: {}", field(tags::SERIES_NUMBER)),
        format!("Instance: {}", field(tags::INSTANCE_NUMBER)),
        format!("matrix: {} x {}", field(tags::ROWS), field(tags::COLUMNS)),
        format!("Frame: {}/{}", frame + 1, instance.frames()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{fd, file, identity, seq, text, us, Node, EXPLICIT_LE, IMPLICIT_LE};

    fn diffusion(b: f64, direction: &str, gradient: Option<[f64; 3]>) -> Node {
        let mut values = vec![
            fd(tags::DIFFUSION_B_VALUE, b),
            text(tags::DIFFUSION_DIRECTIONALITY, "CS", direction),
        ];
        if let Some(gradient) = gradient {
            let bytes = gradient.iter().flat_map(|v| v.to_le_bytes()).collect();
            values.push(seq(
                tags::DIFFUSION_GRADIENT_DIRECTION_SEQUENCE,
                vec![vec![Node::Bytes(tags::DIFFUSION_GRADIENT_ORIENTATION, "FD", bytes)]],
            ));
        }
        seq(tags::MR_DIFFUSION_SEQUENCE, vec![values])
    }

    fn enhanced() -> Instance {
        let mut nodes = identity("1", "1.1", "1.1.1", Some(1));
        nodes.push(text(tags::NUMBER_OF_FRAMES, "IS", "3"));
        nodes.push(seq(
            tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE,
            vec![vec![diffusion(0.0, "NONE", None)]],
        ));
        nodes.push(seq(
            tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE,
            vec![
                vec![],
                vec![diffusion(1000.0, "DIRECTIONAL", Some([1.0, 0.0, 0.0]))],
                vec![],
            ],
        ));
        Instance::parse(file(EXPLICIT_LE, &nodes, None)).unwrap()
    }

    #[test]
    fn per_frame_diffusion_overrides_shared() {
        let instance = enhanced();
        assert_eq!(b_value(&instance, 0), Some(0.0));
        assert_eq!(b_value(&instance, 1), Some(1000.0));
        assert_eq!(b_value(&instance, 2), Some(0.0));

        let info = diffusion_info(&instance, 1).unwrap();
        assert_eq!(info.gradient, Some([1.0, 0.0, 0.0]));
        assert_eq!(info.overlay_text(), "Diffusion: b=1000.0 | Dir=DIRECTIONAL");
        assert_eq!(
            info.to_string(),
            "Diffusion: b=1000.0 | Dir=DIRECTIONAL | Grad=[1.000, 0.000, 0.000]"
        );
    }

    #[test]
    fn frame_items_without_b_value_fall_through() {
        let mut nodes = identity("1", "1.1", "1.1.4", Some(1));
        nodes.push(text(tags::NUMBER_OF_FRAMES, "IS", "2"));
        nodes.push(seq(
            tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE,
            vec![vec![diffusion(800.0, "DIRECTIONAL", None)]],
        ));
        nodes.push(seq(
            tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE,
            vec![
                vec![seq(
                    tags::MR_DIFFUSION_SEQUENCE,
                    vec![vec![text(tags::DIFFUSION_DIRECTIONALITY, "CS", "ISOTROPIC")]],
                )],
                vec![],
            ],
        ));
        let instance = Instance::parse(file(EXPLICIT_LE, &nodes, None)).unwrap();

        assert_eq!(b_value(&instance, 0), Some(800.0));
        let info = diffusion_info(&instance, 0).unwrap();
        assert_eq!(info.overlay_text(), "Diffusion: b=800.0 | Dir=ISOTROPIC");
        assert_eq!(
            diffusion_info(&instance, 1).unwrap().overlay_text(),
            "Diffusion: b=800.0 | Dir=DIRECTIONAL"
        );
    }

    #[test]
    fn classic_objects_use_dataset_values() {
        let mut nodes = identity("1", "1.1", "1.1.2", None);
        nodes.push(fd(tags::DIFFUSION_B_VALUE, 500.0));
        let instance = Instance::parse(file(IMPLICIT_LE, &nodes, None)).unwrap();
        let info = diffusion_info(&instance, 0).unwrap();
        assert_eq!(info.overlay_text(), "Diffusion: b=500.0 | Dir=n/a");

        let plain = Instance::parse(file(EXPLICIT_LE, &identity("1", "1.1", "1.1.3", None), None))
            .unwrap();
        assert!(diffusion_info(&plain, 0).is_none());
        assert!(b_value(&plain, 0).is_none());
    }

    #[test]
    fn metadata_lines_fill_gaps() {
        let mut nodes = identity("1", "1.1", "1.1.1", Some(4));
        nodes.push(us(tags::ROWS, 256));
        nodes.push(us(tags::COLUMNS, 128));
        nodes.push(text(tags::IMAGE_TYPE, "CS", "ORIGINAL\\PRIMARY"));
        let instance = Instance::parse(file(EXPLICIT_LE, &nodes, None)).unwrap();
        let lines = metadata_lines(&instance, 0);
        assert_eq!(lines[0], "Image type: ORIGINAL\\PRIMARY");
        assert_eq!(lines[1], "Study Date: N/A");
        assert_eq!(lines[4], "Instance: 4");
        assert_eq!(lines[5], "matrix: 256 x 128");
        assert_eq!(lines[6], "Frame: 1/1");
    }
}
