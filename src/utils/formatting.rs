use crate::model::element::Value;
use dicom::core::{Tag, VR};

const MAX_VALUE_LEN: usize = 120;

/// One-line rendering of an element value for the header panel.
pub fn value_to_string(value: &Value, vr: VR) -> String {
    let rendered = match value {
        Value::Empty => String::from("(empty)"),
        Value::Strings(values) => values.join("\\"),
        Value::Numbers(values) => values
            .iter()
            .map(|value| format_number(*value))
            .collect::<Vec<_>>()
            .join("\\"),
        Value::Binary(bytes) if vr == VR::AT => bytes
            .chunks_exact(4)
            .map(|raw| {
                format_tag(Tag(
                    u16::from_le_bytes([raw[0], raw[1]]),
                    u16::from_le_bytes([raw[2], raw[3]]),
                ))
            })
            .collect::<Vec<_>>()
            .join("\\"),
        Value::Binary(bytes) => format!("Binary data ({} bytes)", bytes.len()),
        Value::Sequence(items) => {
            let count = items.len();
            let suffix = if count == 1 { "" } else { "s" };
            format!("Sequence ({count} item{suffix})")
        }
    };

    if rendered.chars().count() > MAX_VALUE_LEN {
        let mut truncated = rendered.chars().take(MAX_VALUE_LEN).collect::<String>();
        truncated.push('…');
        truncated
    } else {
        rendered
    }
}

pub fn format_tag(tag: Tag) -> String {
    format!("{:04X},{:04X}", tag.group(), tag.element())
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_values() {
        assert_eq!(value_to_string(&Value::Empty, VR::LO), "(empty)");
        assert_eq!(
            value_to_string(&Value::Numbers(vec![512.0, 0.5]), VR::FD),
            "512\\0.5"
        );
        assert_eq!(
            value_to_string(&Value::Binary(vec![0; 6]), VR::OB),
            "Binary data (6 bytes)"
        );
        assert_eq!(
            value_to_string(&Value::Binary(vec![0x28, 0, 0x10, 0]), VR::AT),
            "0028,0010"
        );
        assert_eq!(
            value_to_string(&Value::Sequence(Vec::new()), VR::SQ),
            "Sequence (0 items)"
        );
    }

    #[test]
    fn long_values_are_truncated() {
        let long = Value::Strings(vec!["x".repeat(200)]);
        let rendered = value_to_string(&long, VR::LT);
        assert_eq!(rendered.chars().count(), MAX_VALUE_LEN + 1);
        assert!(rendered.ends_with('…'));
    }
}
