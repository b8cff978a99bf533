//! Columns computed from record content rather than copied through the schema.

use super::extractor::{attribute_text, first_item, sequence_items};
use super::row::{
    DATABASE_TIMESTAMP, ELEMENT_COUNT, ELEMENT_LIST, HASH, NFRACTIONS, REFERENCED_SERIES_UID,
    UNIQUE_FOR_UID,
};
use super::{ColumnValue, ExtractedRow};
use crate::model::tags;
use crate::utils::format_tag;
use crate::utils::hashing::{hash_items, hash_payload};
use dicom::core::Tag;
use dicom::object::InMemDicomObject;
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    StructureSet,
    Plan,
    Dose,
    Other,
}

impl ContentType {
    pub fn of(record: &InMemDicomObject) -> Self {
        match attribute_text(record, tags::MODALITY).as_deref() {
            Some("RTSTRUCT") => ContentType::StructureSet,
            Some("RTPLAN") => ContentType::Plan,
            Some("RTDOSE") => ContentType::Dose,
            _ => ContentType::Other,
        }
    }
}

/// Seconds since the epoch, the unit deployed stores keep in `DatabaseTimeStamp`.
pub fn timestamp_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}

/// Attributes that point at another instance. They are blanked when hashing so
/// that identical contours hash alike whichever images they were drawn on.
pub fn is_instance_reference(tag: Tag) -> bool {
    tag == tags::REFERENCED_SOP_INSTANCE_UID
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedAttributes {
    compute_hash: bool,
}

impl DerivedAttributes {
    pub fn new(compute_hash: bool) -> Self {
        Self { compute_hash }
    }

    /// Never fails: a missing nested attribute omits its column and is logged.
    pub fn derive(&self, record: &InMemDicomObject) -> ExtractedRow {
        let mut row = ExtractedRow::new();
        row.insert(DATABASE_TIMESTAMP, timestamp_now());

        match ContentType::of(record) {
            ContentType::StructureSet => self.structure_set(record, &mut row),
            ContentType::Plan => self.plan(record, &mut row),
            ContentType::Dose => self.dose(record, &mut row),
            ContentType::Other => {}
        }
        row
    }

    fn structure_set(&self, record: &InMemDicomObject, row: &mut ExtractedRow) {
        match sequence_items(record, tags::STRUCTURE_SET_ROI_SEQUENCE) {
            Some(regions) => {
                let names: Vec<String> = regions
                    .iter()
                    .map(|region| attribute_text(region, tags::ROI_NAME).unwrap_or_default())
                    .collect();
                let frames: BTreeSet<String> = regions
                    .iter()
                    .map(|region| {
                        attribute_text(region, tags::REFERENCED_FRAME_OF_REFERENCE_UID)
                            .unwrap_or_default()
                    })
                    .collect();

                row.insert(ELEMENT_COUNT, names.len() as i64);
                row.insert(ELEMENT_LIST, names);

                let mut frames = frames.into_iter();
                let unique = match (frames.next(), frames.next()) {
                    (Some(only), None) => only,
                    _ => String::new(),
                };
                row.insert(UNIQUE_FOR_UID, unique);
            }
            None => missing(tags::STRUCTURE_SET_ROI_SEQUENCE, "structure set"),
        }

        if self.compute_hash {
            match sequence_items(record, tags::ROI_CONTOUR_SEQUENCE) {
                Some(contours) => row.insert(HASH, hash_items(contours, &is_instance_reference)),
                None => missing(tags::ROI_CONTOUR_SEQUENCE, "structure set"),
            }
        }

        match referenced_series(record) {
            Some(series) => row.insert(REFERENCED_SERIES_UID, series),
            None => log::warn!("Could not resolve the series referenced by the structure set"),
        }
    }

    fn plan(&self, record: &InMemDicomObject, row: &mut ExtractedRow) {
        match sequence_items(record, tags::FRACTION_GROUP_SEQUENCE) {
            Some(groups) => {
                let fractions = groups
                    .iter()
                    .map(|group| integer_attribute(group, tags::NUMBER_OF_FRACTIONS_PLANNED))
                    .collect();
                let beams = groups
                    .iter()
                    .map(|group| integer_attribute(group, tags::NUMBER_OF_BEAMS))
                    .collect();
                row.insert(NFRACTIONS, single_or_list(fractions));
                row.insert(ELEMENT_COUNT, single_or_list(beams));
            }
            None => missing(tags::FRACTION_GROUP_SEQUENCE, "plan"),
        }

        if self.compute_hash {
            match sequence_items(record, tags::BEAM_SEQUENCE) {
                Some(beams) => row.insert(HASH, hash_items(beams, &|_| false)),
                None => missing(tags::BEAM_SEQUENCE, "plan"),
            }
        }
    }

    fn dose(&self, record: &InMemDicomObject, row: &mut ExtractedRow) {
        if !self.compute_hash {
            return;
        }
        match record.element(tags::PIXEL_DATA) {
            Ok(pixels) => row.insert(HASH, hash_payload(pixels.value())),
            Err(_) => missing(tags::PIXEL_DATA, "dose"),
        }
    }
}

fn referenced_series(record: &InMemDicomObject) -> Option<String> {
    let frame = first_item(record, tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE)?;
    let study = first_item(frame, tags::RT_REFERENCED_STUDY_SEQUENCE)?;
    let series = first_item(study, tags::RT_REFERENCED_SERIES_SEQUENCE)?;
    attribute_text(series, tags::SERIES_INSTANCE_UID)
}

fn integer_attribute(record: &InMemDicomObject, tag: Tag) -> ColumnValue {
    record
        .element(tag)
        .ok()
        .and_then(|element| element.to_int::<i64>().ok())
        .map(ColumnValue::Integer)
        .unwrap_or_else(ColumnValue::empty)
}

/// Single fraction group plans store plain numbers; others keep every group.
fn single_or_list(mut values: Vec<ColumnValue>) -> ColumnValue {
    if values.len() == 1 {
        values.remove(0)
    } else {
        ColumnValue::List(values)
    }
}

fn missing(tag: Tag, kind: &str) {
    log::warn!("No {} in {kind} record, derived column omitted", format_tag(tag));
}
