#![allow(dead_code)]

use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, Length, PrimitiveValue, Tag, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use pacs_index::model::tags;
use pacs_index::{Archive, ArchiveConfig};
use std::path::{Path, PathBuf};

pub const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
pub const RT_STRUCTURE_SET_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.481.3";
const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
const SOP_CLASS_UID: Tag = Tag(0x0008, 0x0016);

pub fn text(tag: Tag, vr: VR, value: &str) -> DataElement<InMemDicomObject> {
    DataElement::new(tag, vr, PrimitiveValue::from(value))
}

pub fn sequence(tag: Tag, items: Vec<InMemDicomObject>) -> DataElement<InMemDicomObject> {
    DataElement::new(tag, VR::SQ, DataSetSequence::new(items, Length::UNDEFINED))
}

pub fn ct(patient: &str, study: &str, series: &str, sop: &str) -> InMemDicomObject {
    InMemDicomObject::from_element_iter([
        text(SOP_CLASS_UID, VR::UI, CT_IMAGE_STORAGE),
        text(tags::SOP_INSTANCE_UID, VR::UI, sop),
        text(tags::MODALITY, VR::CS, "CT"),
        text(tags::PATIENT_ID, VR::LO, patient),
        text(tags::STUDY_INSTANCE_UID, VR::UI, study),
        text(tags::SERIES_INSTANCE_UID, VR::UI, series),
        text(tags::FRAME_OF_REFERENCE_UID, VR::UI, "1.2.840.99.9"),
    ])
}

/// Structure set whose regions lie in the given frames of reference and which
/// references `image_series` through the frame/study/series chain.
pub fn structure_set(
    patient: &str,
    study: &str,
    series: &str,
    sop: &str,
    frames: &[&str],
    image_series: &str,
) -> InMemDicomObject {
    let regions = frames
        .iter()
        .enumerate()
        .map(|(index, frame)| {
            InMemDicomObject::from_element_iter([
                text(tags::REFERENCED_FRAME_OF_REFERENCE_UID, VR::UI, frame),
                text(tags::ROI_NAME, VR::LO, &format!("ROI{index}")),
            ])
        })
        .collect();
    let series_ref =
        InMemDicomObject::from_element_iter([text(tags::SERIES_INSTANCE_UID, VR::UI, image_series)]);
    let study_ref = InMemDicomObject::from_element_iter([sequence(
        tags::RT_REFERENCED_SERIES_SEQUENCE,
        vec![series_ref],
    )]);
    let frame_ref = InMemDicomObject::from_element_iter([sequence(
        tags::RT_REFERENCED_STUDY_SEQUENCE,
        vec![study_ref],
    )]);

    InMemDicomObject::from_element_iter([
        text(SOP_CLASS_UID, VR::UI, RT_STRUCTURE_SET_STORAGE),
        text(tags::SOP_INSTANCE_UID, VR::UI, sop),
        text(tags::MODALITY, VR::CS, "RTSTRUCT"),
        text(tags::PATIENT_ID, VR::LO, patient),
        text(tags::STUDY_INSTANCE_UID, VR::UI, study),
        text(tags::SERIES_INSTANCE_UID, VR::UI, series),
        sequence(tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE, vec![frame_ref]),
        sequence(tags::STRUCTURE_SET_ROI_SEQUENCE, regions),
    ])
}

/// Writes `record` as a part 10 file.
pub fn write_record(path: &Path, record: &InMemDicomObject, sop_class: &str, sop: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    record
        .clone()
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(sop_class)
                .media_storage_sop_instance_uid(sop),
        )
        .unwrap()
        .write_to_file(path)
        .unwrap();
    path.to_path_buf()
}

/// Config rooted in a scratch directory, with no schema file so the built-in
/// layout applies.
pub fn config(root: &Path) -> ArchiveConfig {
    ArchiveConfig::default()
        .with_data_dir(root.join("data"))
        .with_schema_file(root.join("absent.sql"))
        .with_database(root.join("index.db"))
}

pub fn open(root: &Path) -> Archive {
    Archive::open(config(root)).unwrap()
}

pub fn count(archive: &Archive, table: &str) -> usize {
    archive
        .execute_query(&format!("SELECT * FROM {table}"))
        .unwrap()
        .len()
}
