mod common;

use std::fs;

use assert_matches::assert_matches;
use camino::Utf8Path;
use chrono::NaiveDate;

use beneuro_data::domain::{ProcessingLevel, StorageKind};
use beneuro_data::error::BndError;
use beneuro_data::paths::PathResolver;

use common::{Fixture, SESSION, SUBJECT};

#[test]
fn resolve_checks_subject_and_parent() {
    let identity = PathResolver::resolve(Utf8Path::new("M020/M020_2024-05-01_s1"), SUBJECT).unwrap();
    assert_eq!(identity.label(), "s1");

    let err = PathResolver::resolve(Utf8Path::new("M021_2024-05-01_s1"), SUBJECT).unwrap_err();
    assert_matches!(err, BndError::SubjectMismatch { .. });

    let err = PathResolver::resolve(Utf8Path::new("M021/M020_2024-05-01_s1"), SUBJECT).unwrap_err();
    assert_matches!(err, BndError::SubjectMismatch { ref found, .. } if found == "M021");

    let err = PathResolver::resolve(Utf8Path::new("M020/M020_20240501"), SUBJECT).unwrap_err();
    assert_matches!(err, BndError::MalformedSessionName(_));
}

#[test]
fn locate_finds_root_and_level() {
    let fixture = Fixture::new();
    let resolver = PathResolver::new(&fixture.config);

    let local = fixture.session_dir(StorageKind::Local, SESSION);
    let session = resolver.locate(&local, SUBJECT).unwrap();
    assert_eq!(session.kind(), StorageKind::Local);
    assert_eq!(session.level(), ProcessingLevel::Raw);
    assert_eq!(session.path(), local);
    assert_eq!(resolver.mirror(&session, StorageKind::Local), session);

    let remote = fixture.session_dir(StorageKind::Remote, SESSION);
    let session = resolver.locate(&remote, SUBJECT).unwrap();
    assert_eq!(session.kind(), StorageKind::Remote);
    assert_eq!(resolver.mirror(&session, StorageKind::Local).path(), local);

    let processed = fixture.root.join("local/processed/M020").join(SESSION);
    let session = resolver.locate(&processed, SUBJECT).unwrap();
    assert_eq!(session.level(), ProcessingLevel::Processed);
}

#[test]
fn locate_rejects_paths_outside_the_roots() {
    let fixture = Fixture::new();
    let resolver = PathResolver::new(&fixture.config);

    let elsewhere = fixture.root.join("elsewhere/M020").join(SESSION);
    assert_matches!(
        resolver.locate(&elsewhere, SUBJECT),
        Err(BndError::OutsideStorageRoot(_))
    );

    let too_deep = fixture.root.join("local/raw/extra/M020").join(SESSION);
    assert_matches!(
        resolver.locate(&too_deep, SUBJECT),
        Err(BndError::OutsideStorageRoot(_))
    );
}

#[test]
fn last_session_orders_labels_naturally() {
    let fixture = Fixture::new();
    let subject_dir = fixture.root.join("local/raw/M020");
    for name in [
        "M020_2024-04-30_s99",
        "M020_2024-05-01_s2",
        "M020_2024-05-01_s10",
        "treadmill-calibration",
        "notes",
    ] {
        fs::create_dir_all(subject_dir.join(name)).unwrap();
    }
    fs::write(subject_dir.join("M020_2024-06-01_s1"), "a file, not a session").unwrap();

    let resolver = PathResolver::new(&fixture.config);
    let last = resolver.last_session(StorageKind::Local, SUBJECT).unwrap();
    assert_eq!(last.name(), "M020_2024-05-01_s10");

    let sessions = resolver
        .list_subject_sessions(StorageKind::Local, SUBJECT)
        .unwrap();
    let names: Vec<String> = sessions.valid.iter().map(|session| session.name()).collect();
    assert_eq!(
        names,
        vec![
            "M020_2024-04-30_s99",
            "M020_2024-05-01_s2",
            "M020_2024-05-01_s10"
        ]
    );
    assert_eq!(sessions.invalid, vec!["notes"]);
}

#[test]
fn missing_subject_has_no_sessions() {
    let fixture = Fixture::new();
    let resolver = PathResolver::new(&fixture.config);
    assert_matches!(
        resolver.last_session(StorageKind::Remote, "M999"),
        Err(BndError::NoSessionsFound { .. })
    );

    fs::create_dir_all(fixture.root.join("remote/raw/M999")).unwrap();
    assert_matches!(
        resolver.last_session(StorageKind::Remote, "M999"),
        Err(BndError::NoSessionsFound { .. })
    );
}

#[test]
fn sessions_on_day_spans_subjects() {
    let fixture = Fixture::new();
    for name in [
        "M020_2024-05-01_s1",
        "M020_2024-05-02_s1",
        "M021_2024-05-01_s1",
    ] {
        fs::create_dir_all(fixture.session_dir(StorageKind::Local, name)).unwrap();
    }
    let resolver = PathResolver::new(&fixture.config);
    let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

    let all = resolver
        .sessions_on_day(StorageKind::Local, None, day)
        .unwrap();
    let names: Vec<String> = all.iter().map(|session| session.name()).collect();
    assert_eq!(names, vec!["M020_2024-05-01_s1", "M021_2024-05-01_s1"]);

    let one = resolver
        .sessions_on_day(StorageKind::Local, Some("M021"), day)
        .unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(resolver.list_subjects(StorageKind::Local).unwrap(), vec!["M020", "M021"]);
}
