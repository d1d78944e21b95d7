use std::cmp::Ordering;

use assert_matches::assert_matches;
use chrono::NaiveDate;

use beneuro_data::domain::{
    Modality, ModalityFlags, ModalitySelection, SessionIdentity, natural_cmp,
};
use beneuro_data::error::BndError;

#[test]
fn parse_session_identity() {
    let id: SessionIdentity = "M017_2024-03-12_mouse-run2".parse().unwrap();
    assert_eq!(id.subject(), "M017");
    assert_eq!(id.date(), NaiveDate::from_ymd_opt(2024, 3, 12).unwrap());
    assert_eq!(id.label(), "mouse-run2");
    assert_eq!(id.to_string(), "M017_2024-03-12_mouse-run2");
}

#[test]
fn parse_session_identity_invalid() {
    for name in [
        "M017_2024-02-30_s1",
        "M017_2024-3-12_s1",
        "M017_2024-03-12",
        "M017_2024-03-12_",
        "M017_2024-03-12_s1_extra",
    ] {
        let err = name.parse::<SessionIdentity>().unwrap_err();
        assert_matches!(err, BndError::MalformedSessionName(_), "{name}");
    }
}

#[test]
fn identities_sort_by_date_then_label() {
    let mut ids: Vec<SessionIdentity> = [
        "M017_2024-03-12_s10",
        "M017_2024-03-13_s1",
        "M017_2024-03-12_s2",
    ]
    .iter()
    .map(|name| name.parse().unwrap())
    .collect();
    ids.sort();
    let labels: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    assert_eq!(
        labels,
        vec![
            "M017_2024-03-12_s2",
            "M017_2024-03-12_s10",
            "M017_2024-03-13_s1"
        ]
    );
}

#[test]
fn natural_ordering() {
    assert_eq!(natural_cmp("s2", "s10"), Ordering::Less);
    assert_eq!(natural_cmp("s02", "s2"), Ordering::Equal);
    assert_eq!(natural_cmp("run", "run1"), Ordering::Less);
    assert_eq!(natural_cmp("b", "a9"), Ordering::Greater);
}

#[test]
fn modality_flags() {
    let all = ModalitySelection::from_flags(ModalityFlags::default()).unwrap();
    assert_eq!(all, ModalitySelection::all());

    let no_video = ModalitySelection::from_flags(ModalityFlags {
        ignore_videos: true,
        ..ModalityFlags::default()
    })
    .unwrap();
    assert!(no_video.contains(Modality::Ephys));
    assert!(!no_video.contains(Modality::Video));

    let err = ModalitySelection::from_flags(ModalityFlags {
        check_ephys: true,
        ignore_ephys: true,
        ..ModalityFlags::default()
    })
    .unwrap_err();
    assert_matches!(err, BndError::ConflictingModalityFlags(Modality::Ephys));

    let err = ModalitySelection::from_flags(ModalityFlags {
        ignore_behavior: true,
        ignore_ephys: true,
        ignore_videos: true,
        ..ModalityFlags::default()
    })
    .unwrap_err();
    assert_matches!(err, BndError::NoModalitiesSelected);
}
