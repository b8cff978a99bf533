use super::{ColumnValue, ExtractedRow, HierarchyKey, TableDefinition};
use crate::model::tags;
use crate::utils::value_to_column;
use dicom::core::header::Header;
use dicom::core::Tag;
use dicom::object::InMemDicomObject;

/// Builds the row of one table from a record. Attributes the record lacks, or
/// holds in a form that has no column representation, come out as empty text.
pub fn extract(table: &TableDefinition, record: &InMemDicomObject) -> ExtractedRow {
    table
        .mappings()
        .iter()
        .map(|mapping| {
            (
                mapping.column.replace('"', ""),
                attribute_value(record, mapping.tag),
            )
        })
        .collect()
}

pub fn attribute_value(record: &InMemDicomObject, tag: Tag) -> ColumnValue {
    match record.element(tag) {
        Ok(element) => value_to_column(element.value(), element.vr()),
        Err(_) => ColumnValue::empty(),
    }
}

/// Trimmed text of a single attribute, `None` when absent or blank.
pub fn attribute_text(record: &InMemDicomObject, tag: Tag) -> Option<String> {
    record
        .element(tag)
        .ok()
        .and_then(|element| element.to_str().ok())
        .map(|value| {
            value
                .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                .to_string()
        })
        .filter(|value| !value.is_empty())
}

pub fn sequence_items(record: &InMemDicomObject, tag: Tag) -> Option<&[InMemDicomObject]> {
    record.element(tag).ok().and_then(|element| element.items())
}

pub fn first_item(record: &InMemDicomObject, tag: Tag) -> Option<&InMemDicomObject> {
    sequence_items(record, tag).and_then(|items| items.first())
}

pub fn hierarchy_key(record: &InMemDicomObject) -> HierarchyKey {
    HierarchyKey {
        patient: attribute_text(record, tags::PATIENT_ID),
        study: attribute_text(record, tags::STUDY_INSTANCE_UID),
        series: attribute_text(record, tags::SERIES_INSTANCE_UID),
        image: attribute_text(record, tags::SOP_INSTANCE_UID),
    }
}
