mod common;

use common::{count, ct, open, structure_set, write_record, CT_IMAGE_STORAGE};
use pacs_index::store::LevelAction;
use pacs_index::transfer::{STATUS_PROCESSING_FAILURE, STATUS_SUCCESS};
use pacs_index::{ArchiveError, PeerAddress, ReceivedRecordHandler, RecordSender, Selection};
use std::path::PathBuf;

#[test]
fn one_row_per_level_for_a_series_of_images() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open(dir.path());
    let mut session = archive.session();
    for index in 0..5 {
        let sop = format!("1.2.3.1.{index}");
        session
            .sync(&ct("P1", "1.2", "1.2.3", &sop), &format!("P1/{sop}.dcm"), true)
            .unwrap();
    }

    assert_eq!(count(&archive, "DICOMimages"), 5);
    assert_eq!(count(&archive, "DICOMseries"), 1);
    assert_eq!(count(&archive, "DICOMstudies"), 1);
    assert_eq!(count(&archive, "DICOMpatients"), 1);
}

#[test]
fn interleaved_series_still_deduplicate() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open(dir.path());
    let mut session = archive.session();
    for (series, sop) in [("1.2.3", "a"), ("1.2.4", "b"), ("1.2.3", "c"), ("1.2.4", "d")] {
        session
            .sync(&ct("P1", "1.2", series, sop), &format!("P1/{sop}"), true)
            .unwrap();
    }
    assert_eq!(count(&archive, "DICOMseries"), 2);
    assert_eq!(count(&archive, "DICOMstudies"), 1);
}

#[test]
fn resync_changes_only_the_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open(dir.path());
    let record = ct("P1", "1.2", "1.2.3", "1.2.3.1");
    archive.write_record(&record, "P1/a.dcm", true).unwrap();
    let before = archive.execute_query("SELECT * FROM DICOMimages").unwrap();

    let outcome = archive.write_record(&record, "P1/a.dcm", true).unwrap();
    assert_eq!(outcome.image, LevelAction::Refreshed);

    let after = archive.execute_query("SELECT * FROM DICOMimages").unwrap();
    assert_eq!(after.len(), 1);
    let unchanged = |row: &pacs_index::store::QueryRow| {
        row.iter()
            .filter(|(column, _)| *column != "DatabaseTimeStamp")
            .map(|(column, value)| (column.to_string(), value.map(str::to_string)))
            .collect::<Vec<_>>()
    };
    assert_eq!(unchanged(&before[0]), unchanged(&after[0]));
    assert!(after[0].get("DatabaseTimeStamp").is_some());
}

#[test]
fn structure_set_facts_reach_the_series_row() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open(dir.path());
    let rtstruct = structure_set("P1", "1.2", "1.2.9", "1.2.9.1", &["9.9", "9.9"], "1.2.3");
    archive.write_record(&rtstruct, "P1/rs.dcm", true).unwrap();

    let series = archive
        .execute_query("SELECT FrameOfRef, Referenced FROM DICOMseries WHERE SeriesInst = '1.2.9'")
        .unwrap();
    assert_eq!(series[0].get("FrameOfRef"), Some("9.9"));
    assert_eq!(series[0].get("Referenced"), Some("1.2.3"));

    let image = archive
        .execute_query("SELECT ElementCount, ElementList, UniqueFOR_UID FROM DICOMimages")
        .unwrap();
    assert_eq!(image[0].get("ElementCount"), Some("2"));
    assert_eq!(image[0].get("ElementList"), Some(r#"["ROI0","ROI1"]"#));
    assert_eq!(image[0].get("UniqueFOR_UID"), Some("9.9"));
}

#[test]
fn mixed_frames_leave_the_series_frame_empty() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open(dir.path());
    let rtstruct = structure_set("P1", "1.2", "1.2.9", "1.2.9.1", &["9.9", "9.8"], "1.2.3");
    archive.write_record(&rtstruct, "P1/rs.dcm", true).unwrap();

    let series = archive
        .execute_query("SELECT FrameOfRef FROM DICOMseries")
        .unwrap();
    assert_eq!(series[0].get("FrameOfRef"), Some(""));
}

#[test]
fn delete_cascades_and_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open(dir.path());
    let mut session = archive.session();
    session.sync(&ct("P1", "1.2", "1.2.3", "a"), "P1/a", true).unwrap();
    session.sync(&ct("P1", "1.2", "1.2.4", "b"), "P1/b", true).unwrap();
    session.sync(&ct("P2", "2.2", "2.2.3", "c"), "P2/c", true).unwrap();
    drop(session);

    let report = archive.delete(&Selection::series("1.2.3"), false).unwrap();
    assert_eq!((report.images, report.series, report.studies), (1, 1, 0));
    assert_eq!(count(&archive, "DICOMstudies"), 2);

    let report = archive
        .delete(
            &Selection::Query("SELECT SeriesInst FROM DICOMseries WHERE SeriesPat = 'P1'".into()),
            false,
        )
        .unwrap();
    assert_eq!((report.studies, report.patients), (1, 1));
    assert_eq!(count(&archive, "DICOMpatients"), 1);

    let again = archive.delete(&Selection::series("1.2.3"), false).unwrap();
    assert_eq!(again, Default::default());
    assert_eq!(count(&archive, "DICOMimages"), 1);
}

#[test]
fn patient_delete_refuses_file_removal() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open(dir.path());
    archive
        .write_record(&ct("P1", "1.2", "1.2.3", "a"), "P1/a", true)
        .unwrap();

    let err = archive
        .delete(&Selection::Patient("P1".into()), true)
        .unwrap_err();
    assert!(matches!(err, ArchiveError::ConflictingOptions(_)));
    assert_eq!(count(&archive, "DICOMimages"), 1);
}

#[test]
fn stored_files_land_under_the_patient_and_can_be_removed() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open(dir.path());
    let source = write_record(
        &dir.path().join("incoming/ct1.dcm"),
        &ct("P1", "1.2", "1.2.3", "1.2.3.1"),
        CT_IMAGE_STORAGE,
        "1.2.3.1",
    );

    let stored = archive
        .store_directory(&dir.path().join("incoming"), true)
        .unwrap();
    assert_eq!(stored, 1);
    assert!(!source.exists());
    let target = dir.path().join("data/P1/ct1.dcm");
    assert!(target.exists());
    assert_eq!(
        archive.store().query_column("SELECT ObjectFile FROM DICOMimages", "ObjectFile"),
        Some(vec!["P1/ct1.dcm".to_string()])
    );

    let report = archive.delete(&Selection::series("1.2.3"), true).unwrap();
    assert_eq!(report.files, 1);
    assert!(!target.exists());
}

#[test]
fn rebuild_indexes_files_and_skips_known_patients() {
    let dir = tempfile::tempdir().unwrap();
    for (patient, sop) in [("P1", "1.1"), ("P1", "1.2"), ("P2", "2.1")] {
        write_record(
            &dir.path().join(format!("data/{patient}/{sop}.dcm")),
            &ct(patient, &format!("{patient}.1"), &format!("{patient}.1.1"), sop),
            CT_IMAGE_STORAGE,
            sop,
        );
    }
    let archive = open(dir.path());

    assert_eq!(archive.rebuild_from_files(Some("P1"), true, true).unwrap(), 2);
    assert_eq!(count(&archive, "DICOMpatients"), 1);

    assert_eq!(archive.rebuild_from_files(None, true, true).unwrap(), 1);
    assert_eq!(count(&archive, "DICOMpatients"), 2);
    assert_eq!(count(&archive, "DICOMimages"), 3);

    assert_eq!(archive.rebuild_from_files(None, false, true).unwrap(), 3);
    assert_eq!(count(&archive, "DICOMimages"), 3);

    assert_eq!(archive.rebuild_from_files(Some("P9"), true, true).unwrap(), 0);
}

#[test]
fn delete_inside_a_session_keeps_ancestors_for_later_records() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open(dir.path());
    let mut session = archive.session();
    session.sync(&ct("P1", "1.2", "1.2.3", "a"), "P1/a", true).unwrap();

    archive.delete(&Selection::series("1.2.3"), false).unwrap();
    let outcome = session.sync(&ct("P1", "1.2", "1.2.3", "b"), "P1/b", true).unwrap();

    assert_eq!(outcome.series, LevelAction::Inserted);
    assert_eq!(count(&archive, "DICOMimages"), 1);
    assert_eq!(count(&archive, "DICOMseries"), 1);
    assert_eq!(count(&archive, "DICOMstudies"), 1);
    assert_eq!(count(&archive, "DICOMpatients"), 1);
}

#[test]
fn failing_selection_query_deletes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open(dir.path());
    archive
        .write_record(&ct("P1", "1.2", "1.2.3", "a"), "P1/a", true)
        .unwrap();

    let selection = Selection::Query("SELECT SeriesInst FROM no_such_table".into());
    assert!(archive.delete(&selection, false).is_err());
    assert!(archive
        .copy_files(&selection, &dir.path().join("out"), true, false)
        .is_err());
    assert_eq!(count(&archive, "DICOMseries"), 1);
}

#[test]
fn added_columns_are_filled_for_new_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut archive = open(dir.path());
    archive
        .add_column(
            pacs_index::model::Level::Image,
            pacs_index::model::AttributeMapping::new(0x0008, 0x0060, "ImgModal"),
        )
        .unwrap();
    archive
        .write_record(&ct("P1", "1.2", "1.2.3", "a"), "P1/a", true)
        .unwrap();
    assert_eq!(
        archive.store().query_column("SELECT ImgModal FROM DICOMimages", "ImgModal"),
        Some(vec!["CT".to_string()])
    );
}

#[test]
fn copy_groups_files_by_patient() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open(dir.path());
    for (patient, sop) in [("P1", "1.1"), ("P2", "2.1")] {
        let path = write_record(
            &dir.path().join(format!("in/{sop}.dcm")),
            &ct(patient, "9.1", "9.1.1", sop),
            CT_IMAGE_STORAGE,
            sop,
        );
        archive.store_file(&path, false).unwrap();
    }

    let dest = dir.path().join("out");
    let copied = archive
        .copy_files(&Selection::series("9.1.1"), &dest, true, true)
        .unwrap();
    assert_eq!(copied, 2);
    assert!(dest.join("P1/1.1.dcm").exists());
    assert!(dest.join("P2/2.1.dcm").exists());
}

struct RecordingSender {
    seen: Vec<PathBuf>,
}

impl RecordSender for RecordingSender {
    fn send(&mut self, _peer: &PeerAddress, files: &[PathBuf]) -> Vec<Result<(), String>> {
        self.seen.extend(files.iter().cloned());
        files
            .iter()
            .enumerate()
            .map(|(index, _)| {
                if index == 0 {
                    Err("association rejected".to_string())
                } else {
                    Ok(())
                }
            })
            .collect()
    }
}

#[test]
fn send_reports_per_file_results() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open(dir.path());
    let mut session = archive.session();
    session.sync(&ct("P1", "1.2", "1.2.3", "a"), "P1/a.dcm", true).unwrap();
    session.sync(&ct("P1", "1.2", "1.2.3", "b"), "P1/b.dcm", true).unwrap();
    drop(session);

    let mut sender = RecordingSender { seen: Vec::new() };
    let report = archive
        .send(&Selection::Patient("P1".into()), &PeerAddress::default(), &mut sender)
        .unwrap();
    assert_eq!((report.sent, report.failed), (1, 1));
    assert_eq!(
        sender.seen,
        [
            dir.path().join("data").join("P1/a.dcm"),
            dir.path().join("data").join("P1/b.dcm")
        ]
    );
}

/// Transport that gives up after the first file, like a rejected association.
struct RejectingSender;

impl RecordSender for RejectingSender {
    fn send(&mut self, _peer: &PeerAddress, _files: &[PathBuf]) -> Vec<Result<(), String>> {
        vec![Err("association rejected".to_string())]
    }
}

#[test]
fn files_without_a_status_count_as_failed() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open(dir.path());
    let mut session = archive.session();
    for sop in ["a", "b", "c"] {
        session
            .sync(&ct("P1", "1.2", "1.2.3", sop), &format!("P1/{sop}.dcm"), true)
            .unwrap();
    }
    drop(session);

    let report = archive
        .send(&Selection::series("1.2.3"), &PeerAddress::default(), &mut RejectingSender)
        .unwrap();
    assert_eq!((report.sent, report.failed), (0, 3));
}

#[test]
fn received_records_are_indexed_through_a_second_connection() {
    let dir = tempfile::tempdir().unwrap();
    let archive = open(dir.path());
    let handler = ReceivedRecordHandler::new(common::config(dir.path()));
    let record = ct("P1", "1.2", "1.2.3", "1.2.3.7");

    let path = handler.received_path(&record).unwrap();
    write_record(&path, &record, CT_IMAGE_STORAGE, "1.2.3.7");
    assert_eq!(handler.on_record_received(&record, &path), STATUS_SUCCESS);

    assert_eq!(
        archive.store().query_column("SELECT ObjectFile FROM DICOMimages", "ObjectFile"),
        Some(vec!["P1/1.2.3.7.dcm".to_string()])
    );

    let mut anonymous = record.clone();
    anonymous.remove_element(pacs_index::model::tags::PATIENT_ID);
    assert_eq!(
        handler.on_record_received(&anonymous, &path),
        STATUS_PROCESSING_FAILURE
    );
}
