//! End-to-end upload tests against a file-backed database and real
//! staging and documents directories.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use bandstand_core::model::{Key, Tune, TuneId, User, UserId};
use bandstand_core::{Database, Error};
use bandstand_ingest::{
    delete_document, open_document, IngestError, IngestionPipeline, StagingArea, UploadPart,
};
use tempfile::TempDir;

const PDF: &[u8] = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\n%%EOF\n";

struct Harness {
    _dir: TempDir,
    db: Database,
    pipeline: IngestionPipeline,
    member: UserId,
    outsider: UserId,
    tune: TuneId,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("bandstand.db")).unwrap();
    let staging =
        StagingArea::new(dir.path().join("staging"), dir.path().join("documents")).unwrap();
    let pipeline = IngestionPipeline::new(staging, Duration::from_secs(3600));

    let mut ids = Vec::new();
    for name in ["member", "outsider"] {
        let mut user = User::new(name, format!("{name}@example.com"));
        db.users().insert(&mut user).unwrap();
        ids.push(user.id);
    }
    let band = db.memberships().create_band("Riverbend", ids[0]).unwrap();
    let tune = db
        .catalog()
        .create_tune(
            Tune::new(band.id, "Salt Creek", vec![Key::from("A major")]),
            ids[0],
        )
        .unwrap();

    Harness {
        _dir: dir,
        db,
        pipeline,
        member: ids[0],
        outsider: ids[1],
        tune: tune.id,
    }
}

fn info(tune: TuneId) -> String {
    format!(r#"{{"tune_id":{tune},"file_type":"pdf","title":"Lead sheet"}}"#)
}

fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

fn document_rows(db: &Database) -> i64 {
    db.conn()
        .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
        .unwrap()
}

#[test]
fn test_member_upload_round_trip() {
    let h = harness();
    let body = info(h.tune);

    let doc = h
        .pipeline
        .ingest(
            &h.db,
            h.member,
            [
                UploadPart::new("info", body.as_bytes()),
                UploadPart::new("file", PDF),
            ],
        )
        .unwrap();

    assert_eq!(doc.owner_id, h.member);
    assert_eq!(doc.tune_id, h.tune);
    assert_eq!(count_files(h.pipeline.staging().documents_dir()), 1);
    assert_eq!(count_files(h.pipeline.staging().staging_dir()), 0);
    assert_eq!(document_rows(&h.db), 1);
    assert_eq!(fs::read(&doc.file_path).unwrap(), PDF);
    assert!(doc.file_path.starts_with(h.pipeline.staging().documents_dir()));

    let json = serde_json::to_value(&doc).unwrap();
    assert!(json.get("file_path").is_none());
}

#[test]
fn test_file_part_may_come_first() {
    let h = harness();
    let body = info(h.tune);

    h.pipeline
        .ingest(
            &h.db,
            h.member,
            [
                UploadPart::new("file", PDF),
                UploadPart::new("info", body.as_bytes()),
            ],
        )
        .unwrap();
    assert_eq!(count_files(h.pipeline.staging().documents_dir()), 1);
}

#[test]
fn test_non_member_upload_is_not_promoted() {
    let h = harness();
    let body = info(h.tune);

    let err = h
        .pipeline
        .ingest(
            &h.db,
            h.outsider,
            [
                UploadPart::new("file", PDF),
                UploadPart::new("info", body.as_bytes()),
            ],
        )
        .unwrap_err();

    assert!(matches!(err, IngestError::Core(Error::NotPermitted(_))));
    assert_eq!(err.status_code(), 403);
    assert_eq!(count_files(h.pipeline.staging().documents_dir()), 0);
    assert_eq!(count_files(h.pipeline.staging().staging_dir()), 0);
    assert_eq!(document_rows(&h.db), 0);
}

#[test]
fn test_invalid_uploader_is_not_permitted() {
    let h = harness();
    let body = info(h.tune);

    let err = h
        .pipeline
        .ingest(
            &h.db,
            UserId::new(0),
            [
                UploadPart::new("info", body.as_bytes()),
                UploadPart::new("file", PDF),
            ],
        )
        .unwrap_err();

    assert!(matches!(err, IngestError::Core(Error::NotPermitted(_))));
    assert_eq!(err.status_code(), 403);
    assert_eq!(count_files(h.pipeline.staging().documents_dir()), 0);
}

#[test]
fn test_unknown_tune_is_not_found() {
    let h = harness();
    let body = info(TuneId::new(404));

    let err = h
        .pipeline
        .ingest(
            &h.db,
            h.member,
            [
                UploadPart::new("info", body.as_bytes()),
                UploadPart::new("file", PDF),
            ],
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[test]
fn test_shape_errors() {
    let h = harness();
    let body = info(h.tune);

    let err = h
        .pipeline
        .ingest(&h.db, h.member, [UploadPart::new("file", PDF)])
        .unwrap_err();
    assert!(matches!(err, IngestError::WrongPartCount { count: 1 }));

    let err = h
        .pipeline
        .ingest(
            &h.db,
            h.member,
            [
                UploadPart::new("info", body.as_bytes()),
                UploadPart::new("attachment", PDF),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, IngestError::MissingFile));

    let err = h
        .pipeline
        .ingest(
            &h.db,
            h.member,
            [
                UploadPart::new("file", PDF),
                UploadPart::new("notes", &b"hello"[..]),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, IngestError::MissingMetadata));

    let err = h
        .pipeline
        .ingest(
            &h.db,
            h.member,
            [
                UploadPart::new("info", body.as_bytes()),
                UploadPart::new("file", PDF),
                UploadPart::new("file", PDF),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, IngestError::WrongPartCount { count: 3 }));
    assert_eq!(err.status_code(), 400);

    assert_eq!(count_files(h.pipeline.staging().documents_dir()), 0);
    assert_eq!(count_files(h.pipeline.staging().staging_dir()), 0);
    assert_eq!(document_rows(&h.db), 0);
}

#[test]
fn test_malformed_and_invalid_info() {
    let h = harness();

    let err = h
        .pipeline
        .ingest(
            &h.db,
            h.member,
            [
                UploadPart::new("info", &br#"{"tune_id":1,"extra":true}"#[..]),
                UploadPart::new("file", PDF),
            ],
        )
        .unwrap_err();
    assert!(matches!(err, IngestError::MalformedMetadata(_)));
    assert_eq!(err.status_code(), 400);

    let body = format!(r#"{{"tune_id":{},"file_type":"docx","title":""}}"#, h.tune);
    let err = h
        .pipeline
        .ingest(
            &h.db,
            h.member,
            [
                UploadPart::new("file", PDF),
                UploadPart::new("info", body.as_bytes()),
            ],
        )
        .unwrap_err();
    assert_eq!(err.status_code(), 422);
    let fields = err.report().fields.unwrap();
    assert!(fields.contains("file_type"));
    assert!(fields.contains("title"));
    assert_eq!(count_files(h.pipeline.staging().staging_dir()), 0);
}

#[test]
fn test_failed_insert_removes_promoted_file() {
    let h = harness();
    h.db.conn()
        .execute_batch(
            "CREATE TEMP TRIGGER fail_document BEFORE INSERT ON documents
             BEGIN SELECT RAISE(ABORT, 'forced failure'); END;",
        )
        .unwrap();
    let body = info(h.tune);

    let err = h
        .pipeline
        .ingest(
            &h.db,
            h.member,
            [
                UploadPart::new("info", body.as_bytes()),
                UploadPart::new("file", PDF),
            ],
        )
        .unwrap_err();

    assert!(err.is_infrastructure());
    let public = err.report();
    assert_eq!(public.status, 500);
    assert!(!public.message.contains("forced"));
    assert_eq!(count_files(h.pipeline.staging().documents_dir()), 0);
    assert_eq!(document_rows(&h.db), 0);
}

#[test]
fn test_open_and_delete_document() {
    let h = harness();
    let body = info(h.tune);
    let doc = h
        .pipeline
        .ingest(
            &h.db,
            h.member,
            [
                UploadPart::new("info", body.as_bytes()),
                UploadPart::new("file", PDF),
            ],
        )
        .unwrap();

    let (_, mut file) = open_document(&h.db, doc.id, h.member).unwrap();
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).unwrap();
    assert_eq!(bytes, PDF);

    let err = open_document(&h.db, doc.id, h.outsider).unwrap_err();
    assert_eq!(err.status_code(), 404);

    delete_document(&h.db, doc.id, h.member).unwrap();
    assert!(!doc.file_path.exists());
    assert_eq!(document_rows(&h.db), 0);
}

#[test]
fn test_sweep_staging_runs_synchronously() {
    let h = harness();
    let leftover = h.pipeline.staging().staging_dir().join("abandoned.part");
    fs::write(&leftover, b"partial").unwrap();

    // Younger than the configured max age, so it stays
    assert_eq!(h.pipeline.sweep_staging().unwrap(), 0);
    assert!(leftover.exists());

    let eager = IngestionPipeline::new(h.pipeline.staging().clone(), Duration::ZERO);
    assert_eq!(eager.sweep_staging().unwrap(), 1);
    assert!(!leftover.exists());
}
