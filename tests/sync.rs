mod common;

use std::fs;

use assert_matches::assert_matches;

use beneuro_data::domain::{Modality, ModalitySelection, StorageKind};
use beneuro_data::error::BndError;
use beneuro_data::inspect::InspectPolicy;
use beneuro_data::output::JsonOutput;
use beneuro_data::sync::{
    CompareMode, FileOutcome, REASON_DIFFERS, REASON_IDENTICAL, REASON_SOURCE_MISSING,
    SyncEngine, SyncOptions,
};

use common::{Fixture, SESSION, SUBJECT, read, write};

#[test]
fn upload_copies_a_valid_session() {
    let fixture = Fixture::new();
    let dir = fixture.valid_session(StorageKind::Local, SESSION);
    write(&dir.join("comment.txt"), "good session");

    let result = fixture
        .app()
        .upload_session(&dir, SUBJECT, &SyncOptions::default(), &JsonOutput)
        .unwrap();
    let report = &result.report;
    assert_eq!(report.copied.len(), 7);
    assert!(report.failed.is_empty());
    assert!(result.conflict_error().is_none());

    let remote = fixture.session_dir(StorageKind::Remote, SESSION);
    assert_eq!(result.destination, remote.to_string());
    assert_eq!(read(&remote.join(format!("{SESSION}_comment.txt"))), "good session");
    assert_eq!(
        read(&remote.join(format!("video/{SESSION}_cameras/{SESSION}_camera_0.avi"))),
        "frames"
    );
    // copies go through temp files that never stay behind
    let leftovers: Vec<_> = fs::read_dir(remote.join("behavior"))
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(".bnd-copy"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn second_upload_skips_identical_files() {
    let fixture = Fixture::new();
    let dir = fixture.valid_session(StorageKind::Local, SESSION);
    let app = fixture.app();
    let options = SyncOptions::default();
    app.upload_session(&dir, SUBJECT, &options, &JsonOutput).unwrap();

    let again = app.upload_session(&dir, SUBJECT, &options, &JsonOutput).unwrap();
    assert!(again.report.copied.is_empty());
    assert_eq!(again.report.skipped.len(), 6);
    assert!(
        again
            .report
            .skipped
            .iter()
            .all(|outcome| outcome.reason == REASON_IDENTICAL)
    );
    assert_eq!(again.report.bytes_copied, 0);
}

#[test]
fn differing_remote_file_blocks_the_whole_upload() {
    let fixture = Fixture::new();
    let dir = fixture.valid_session(StorageKind::Local, SESSION);
    let app = fixture.app();
    let options = SyncOptions::default();
    app.upload_session(&dir, SUBJECT, &options, &JsonOutput).unwrap();

    let remote = fixture.session_dir(StorageKind::Remote, SESSION);
    let log = format!("behavior/{SESSION}_task.txt");
    write(&remote.join(&log), "EVENTS");
    let video = format!("video/{SESSION}_cameras/{SESSION}_camera_0.avi");
    fs::remove_file(remote.join(&video)).unwrap();

    let result = app.upload_session(&dir, SUBJECT, &options, &JsonOutput).unwrap();
    assert_eq!(
        result.report.failed,
        vec![FileOutcome {
            path: log.clone(),
            reason: REASON_DIFFERS.to_string(),
        }]
    );
    assert!(result.report.copied.is_empty());
    assert!(!remote.join(&video).exists());
    assert_eq!(read(&remote.join(&log)), "EVENTS");
    assert_matches!(
        result.conflict_error(),
        Some(BndError::AlreadyExists(ref paths)) if paths == &vec![log.clone()]
    );
}

#[test]
fn size_comparison_misses_same_length_edits() {
    let fixture = Fixture::new();
    let dir = fixture.valid_session(StorageKind::Local, SESSION);
    let app = fixture.app();
    app.upload_session(&dir, SUBJECT, &SyncOptions::default(), &JsonOutput)
        .unwrap();
    let remote = fixture.session_dir(StorageKind::Remote, SESSION);
    write(&remote.join(format!("behavior/{SESSION}_task.txt")), "EVENTS");

    let options = SyncOptions {
        compare: CompareMode::Size,
        ..SyncOptions::default()
    };
    let result = app.upload_session(&dir, SUBJECT, &options, &JsonOutput).unwrap();
    assert!(result.report.failed.is_empty());
}

#[test]
fn invalid_session_is_never_uploaded() {
    let fixture = Fixture::new();
    let dir = fixture.valid_session(StorageKind::Local, SESSION);
    fs::remove_dir_all(dir.join("ephys")).unwrap();

    let err = fixture
        .app()
        .upload_session(&dir, SUBJECT, &SyncOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, BndError::ValidationFailed { .. });
    assert!(!fixture.root.join("remote/raw/M020").exists());
}

#[test]
fn upload_renames_loose_videos_first() {
    let fixture = Fixture::new();
    let dir = fixture.valid_session(StorageKind::Local, SESSION);
    fs::remove_dir_all(dir.join("video")).unwrap();
    write(&dir.join("Camera_0.avi"), "frames");

    let result = fixture
        .app()
        .upload_session(&dir, SUBJECT, &SyncOptions::default(), &JsonOutput)
        .unwrap();
    let expected = format!("video/{SESSION}_cameras/{SESSION}_camera_0.avi");
    assert!(result.report.copied.contains(&expected));
    assert!(fixture.session_dir(StorageKind::Remote, SESSION).join(&expected).exists());
}

#[test]
fn upload_only_the_selected_modalities() {
    let fixture = Fixture::new();
    let dir = fixture.valid_session(StorageKind::Local, SESSION);
    fs::remove_dir_all(dir.join("video")).unwrap();

    let selection = ModalitySelection::only(&[Modality::Behavior, Modality::Ephys]).unwrap();
    let err = fixture
        .app()
        .upload_session(
            &dir,
            SUBJECT,
            &SyncOptions {
                selection: selection.clone(),
                ..SyncOptions::default()
            },
            &JsonOutput,
        )
        .unwrap_err();
    assert_matches!(err, BndError::InvalidConfig(_));

    let options = SyncOptions {
        selection,
        rename_videos_first: false,
        ..SyncOptions::default()
    };
    let result = fixture
        .app()
        .upload_session(&dir, SUBJECT, &options, &JsonOutput)
        .unwrap();
    assert_eq!(result.report.copied.len(), 5);
    assert!(result.report.copied.iter().all(|path| !path.starts_with("video")));
}

#[test]
fn upload_needs_the_remote_raw_folder() {
    let fixture = Fixture::new();
    let dir = fixture.valid_session(StorageKind::Local, SESSION);
    fs::remove_dir_all(fixture.root.join("remote/raw")).unwrap();

    let err = fixture
        .app()
        .upload_session(&dir, SUBJECT, &SyncOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, BndError::MissingDirectory(_));
}

#[test]
fn remote_sessions_cannot_be_uploaded() {
    let fixture = Fixture::new();
    let dir = fixture.valid_session(StorageKind::Remote, SESSION);
    let err = fixture
        .app()
        .upload_session(&dir, SUBJECT, &SyncOptions::default(), &JsonOutput)
        .unwrap_err();
    assert_matches!(err, BndError::NotRawSession { .. });
}

#[test]
fn upload_last_picks_the_latest_session() {
    let fixture = Fixture::new();
    fixture.valid_session(StorageKind::Local, "M020_2024-05-01_s1");
    fixture.valid_session(StorageKind::Local, "M020_2024-05-03_s1");

    let result = fixture
        .app()
        .upload_last(SUBJECT, &SyncOptions::default(), &JsonOutput)
        .unwrap();
    assert_eq!(result.report.session, "M020_2024-05-03_s1");
    assert!(
        !fixture
            .session_dir(StorageKind::Remote, "M020_2024-05-01_s1")
            .exists()
    );
}

fn download_options() -> SyncOptions {
    SyncOptions {
        rename_videos_first: false,
        rename_extra_files_first: false,
        ..SyncOptions::default()
    }
}

#[test]
fn download_skips_modalities_missing_at_the_source() {
    let fixture = Fixture::new();
    let remote = fixture.valid_session(StorageKind::Remote, SESSION);
    fs::remove_dir_all(remote.join("video")).unwrap();

    let result = fixture
        .app()
        .download_session(&remote, SUBJECT, &download_options(), &JsonOutput)
        .unwrap();
    assert!(result.report.skipped.contains(&FileOutcome {
        path: "video".to_string(),
        reason: REASON_SOURCE_MISSING.to_string(),
    }));
    assert_eq!(result.report.copied.len(), 5);
    assert_eq!(result.report.warnings.len(), 1);

    let local = fixture.session_dir(StorageKind::Local, SESSION);
    assert!(local.join(format!("behavior/{SESSION}_task.txt")).exists());
    assert!(!local.join("video").exists());
}

#[test]
fn download_skips_invalid_modalities() {
    let fixture = Fixture::new();
    let remote = fixture.valid_session(StorageKind::Remote, SESSION);
    fs::remove_file(remote.join(format!("behavior/{SESSION}_task_MotSen1-Y.pca"))).unwrap();

    let result = fixture
        .app()
        .download_session(&remote, SUBJECT, &download_options(), &JsonOutput)
        .unwrap();
    let behavior = result
        .report
        .skipped
        .iter()
        .find(|outcome| outcome.path == "behavior")
        .unwrap();
    assert!(behavior.reason.starts_with("invalid at source"));
    assert!(
        !fixture
            .session_dir(StorageKind::Local, SESSION)
            .join("behavior")
            .exists()
    );
}

#[test]
fn download_never_overwrites_local_files() {
    let fixture = Fixture::new();
    let remote = fixture.valid_session(StorageKind::Remote, SESSION);
    let local = fixture.session_dir(StorageKind::Local, SESSION);
    let log = format!("behavior/{SESSION}_task.txt");
    write(&local.join(&log), "local edits");

    let result = fixture
        .app()
        .download_session(&remote, SUBJECT, &download_options(), &JsonOutput)
        .unwrap();
    assert_eq!(read(&local.join(&log)), "local edits");
    assert!(result.report.skipped.contains(&FileOutcome {
        path: log.clone(),
        reason: format!("conflict: {REASON_DIFFERS}"),
    }));
    assert_eq!(result.report.copied.len(), 5);
}

#[test]
fn download_last_uses_the_remote_listing() {
    let fixture = Fixture::new();
    fixture.valid_session(StorageKind::Remote, "M020_2024-05-02_s1");
    fixture.valid_session(StorageKind::Remote, "M020_2024-05-02_s2");

    let result = fixture
        .app()
        .download_last(SUBJECT, &download_options(), &JsonOutput)
        .unwrap();
    assert_eq!(result.report.session, "M020_2024-05-02_s2");
    assert!(
        fixture
            .session_dir(StorageKind::Local, "M020_2024-05-02_s2")
            .join("ephys")
            .exists()
    );
}

#[test]
fn plan_covers_root_extras_and_selected_modalities() {
    let fixture = Fixture::new();
    let dir = fixture.valid_session(StorageKind::Local, SESSION);
    write(&dir.join(format!("{SESSION}_comment.txt")), "c");
    write(&dir.join("scratch.txt"), "not whitelisted");

    let engine = SyncEngine::new(&fixture.config, InspectPolicy::FirstProblem);
    let session = engine.resolver().locate(&dir, SUBJECT).unwrap();
    let remote = engine.resolver().mirror(&session, StorageKind::Remote);
    let plan = engine
        .plan(
            &session,
            &remote,
            &ModalitySelection::only(&[Modality::Video]).unwrap(),
            CompareMode::Content,
        )
        .unwrap();
    let paths: Vec<String> = plan
        .entries
        .iter()
        .map(|entry| entry.relative_path.to_string())
        .collect();
    assert_eq!(
        paths,
        vec![
            format!("video/{SESSION}_cameras/{SESSION}_camera_0.avi"),
            format!("{SESSION}_comment.txt"),
        ]
    );
    assert_eq!(plan.bytes_to_copy(), 7);
}
