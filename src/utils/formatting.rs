use crate::model::ColumnValue;
use dicom::core::value::{PrimitiveValue, Value};
use dicom::core::{Tag, VR};

/// Renders an attribute value as a column value. Sequences, pixel data and
/// binary payloads have no column representation and come out empty.
pub fn value_to_column<I, P>(value: &Value<I, P>, vr: VR) -> ColumnValue {
    match value {
        Value::Primitive(primitive) => format_primitive_value(primitive, vr),
        Value::Sequence(_) | Value::PixelSequence(_) => ColumnValue::empty(),
    }
}

pub fn format_tag(tag: Tag) -> String {
    format!("({:04X},{:04X})", tag.group(), tag.element())
}

fn format_primitive_value(value: &PrimitiveValue, vr: VR) -> ColumnValue {
    match value {
        PrimitiveValue::Empty => ColumnValue::empty(),
        PrimitiveValue::Tags(values) => ColumnValue::List(
            values
                .iter()
                .map(|tag| ColumnValue::Text(format!("{:04X}{:04X}", tag.group(), tag.element())))
                .collect(),
        ),
        _ if is_binary_vr(vr) => ColumnValue::empty(),
        _ if value.multiplicity() > 1 => {
            let rendered = value.to_str();
            ColumnValue::List(
                rendered
                    .split('\\')
                    .map(|part| ColumnValue::Text(clean_text(part)))
                    .collect(),
            )
        }
        _ => ColumnValue::Text(clean_text(&value.to_str())),
    }
}

/// Drops the padding DICOM puts on odd length text.
fn clean_text(text: &str) -> String {
    text.trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

fn is_binary_vr(vr: VR) -> bool {
    matches!(
        vr,
        VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN
    )
}
