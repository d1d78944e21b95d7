use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::BndError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Behavior,
    Ephys,
    Video,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Behavior, Modality::Ephys, Modality::Video];

    /// Name of the modality's folder inside a session.
    pub fn dir_name(self) -> &'static str {
        match self {
            Modality::Behavior => "behavior",
            Modality::Ephys => "ephys",
            Modality::Video => "video",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Behavior => write!(f, "behavior"),
            Modality::Ephys => write!(f, "ephys"),
            Modality::Video => write!(f, "videos"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingLevel {
    Raw,
    Processed,
}

impl ProcessingLevel {
    pub fn dir_name(self) -> &'static str {
        match self {
            ProcessingLevel::Raw => "raw",
            ProcessingLevel::Processed => "processed",
        }
    }
}

impl fmt::Display for ProcessingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Remote,
}

impl StorageKind {
    pub fn other(self) -> StorageKind {
        match self {
            StorageKind::Local => StorageKind::Remote,
            StorageKind::Remote => StorageKind::Local,
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Local => write!(f, "local"),
            StorageKind::Remote => write!(f, "remote"),
        }
    }
}

/// Subject, date and label of one recording session, parsed from its folder name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionIdentity {
    subject: String,
    date: NaiveDate,
    label: String,
}

impl SessionIdentity {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The canonical folder name, `<subject>_<date>_<label>`.
    pub fn session_name(&self) -> String {
        format!(
            "{}_{}_{}",
            self.subject,
            self.date.format(DATE_FORMAT),
            self.label
        )
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.session_name())
    }
}

impl Ord for SessionIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| natural_cmp(&self.label, &other.label))
            .then_with(|| self.label.cmp(&other.label))
            .then_with(|| self.subject.cmp(&other.subject))
    }
}

impl PartialOrd for SessionIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn session_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9-]+)_(\d{4}-\d{2}-\d{2})_([A-Za-z0-9][A-Za-z0-9-]*)$")
            .expect("session name regex")
    })
}

impl FromStr for SessionIdentity {
    type Err = BndError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let caps = session_name_regex()
            .captures(value)
            .ok_or_else(|| BndError::MalformedSessionName(value.to_string()))?;
        let date_str = &caps[2];
        let date = NaiveDate::parse_from_str(date_str, DATE_FORMAT)
            .map_err(|_| BndError::MalformedSessionName(value.to_string()))?;
        // reject dates chrono accepts loosely but that would not round-trip
        if date.format(DATE_FORMAT).to_string() != date_str {
            return Err(BndError::MalformedSessionName(value.to_string()));
        }
        Ok(Self {
            subject: caps[1].to_string(),
            date,
            label: caps[3].to_string(),
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

fn chunks(value: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = value.as_bytes();
    while start < bytes.len() {
        let digit = bytes[start].is_ascii_digit();
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() == digit {
            end += 1;
        }
        let part = &value[start..end];
        out.push(if digit {
            Chunk::Digits(part)
        } else {
            Chunk::Text(part)
        });
        start = end;
    }
    out
}

/// Orders labels with digit runs compared by value, so `s2` sorts before `s10`.
pub fn natural_cmp(left: &str, right: &str) -> Ordering {
    let left = chunks(left);
    let right = chunks(right);
    for (a, b) in left.iter().zip(right.iter()) {
        let ord = match (a, b) {
            (Chunk::Digits(x), Chunk::Digits(y)) => {
                let x = x.trim_start_matches('0');
                let y = y.trim_start_matches('0');
                x.len().cmp(&y.len()).then_with(|| x.cmp(y))
            }
            (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
            (Chunk::Text(x), Chunk::Text(y)) => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len())
}

/// Per-modality `--check-*` / `--ignore-*` flags as given on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModalityFlags {
    pub check_behavior: bool,
    pub ignore_behavior: bool,
    pub check_ephys: bool,
    pub ignore_ephys: bool,
    pub check_videos: bool,
    pub ignore_videos: bool,
}

/// The set of modalities a validation or transfer covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModalitySelection(BTreeSet<Modality>);

impl ModalitySelection {
    pub fn all() -> Self {
        Self(Modality::ALL.into_iter().collect())
    }

    pub fn only(modalities: &[Modality]) -> Result<Self, BndError> {
        if modalities.is_empty() {
            return Err(BndError::NoModalitiesSelected);
        }
        Ok(Self(modalities.iter().copied().collect()))
    }

    pub fn from_flags(flags: ModalityFlags) -> Result<Self, BndError> {
        let pairs = [
            (Modality::Behavior, flags.check_behavior, flags.ignore_behavior),
            (Modality::Ephys, flags.check_ephys, flags.ignore_ephys),
            (Modality::Video, flags.check_videos, flags.ignore_videos),
        ];
        let mut included = BTreeSet::new();
        for (modality, check, ignore) in pairs {
            if check && ignore {
                return Err(BndError::ConflictingModalityFlags(modality));
            }
            if !ignore {
                included.insert(modality);
            }
        }
        if included.is_empty() {
            return Err(BndError::NoModalitiesSelected);
        }
        Ok(Self(included))
    }

    pub fn contains(&self, modality: Modality) -> bool {
        self.0.contains(&modality)
    }

    pub fn iter(&self) -> impl Iterator<Item = Modality> + '_ {
        self.0.iter().copied()
    }
}

impl Default for ModalitySelection {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_session_name() {
        let id: SessionIdentity = "M020_2024-05-01_s1".parse().unwrap();
        assert_eq!(id.subject(), "M020");
        assert_eq!(id.date(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(id.label(), "s1");
        assert_eq!(id.session_name(), "M020_2024-05-01_s1");
    }

    #[test]
    fn parse_rejects_impossible_dates() {
        let err = "M020_2024-02-30_s1".parse::<SessionIdentity>().unwrap_err();
        assert_matches!(err, BndError::MalformedSessionName(_));
    }

    #[test]
    fn parse_rejects_missing_label() {
        assert!("M020_2024-05-01".parse::<SessionIdentity>().is_err());
        assert!("M020_2024-05-01_".parse::<SessionIdentity>().is_err());
        assert!("M020_2024_05_01_s1".parse::<SessionIdentity>().is_err());
    }

    #[test]
    fn labels_sort_naturally() {
        assert_eq!(natural_cmp("s2", "s10"), Ordering::Less);
        assert_eq!(natural_cmp("s10", "s9"), Ordering::Greater);
        assert_eq!(natural_cmp("a", "b"), Ordering::Less);
        assert_eq!(natural_cmp("s01", "s1"), Ordering::Equal);
    }

    #[test]
    fn identities_order_by_date_then_label() {
        let a: SessionIdentity = "M1_2024-05-01_s10".parse().unwrap();
        let b: SessionIdentity = "M1_2024-05-02_s1".parse().unwrap();
        let c: SessionIdentity = "M1_2024-05-01_s9".parse().unwrap();
        let mut ids = vec![a.clone(), b.clone(), c.clone()];
        ids.sort();
        assert_eq!(ids, vec![c, a, b]);
    }

    #[test]
    fn conflicting_flags_are_rejected() {
        let flags = ModalityFlags {
            check_ephys: true,
            ignore_ephys: true,
            ..Default::default()
        };
        assert_matches!(
            ModalitySelection::from_flags(flags),
            Err(BndError::ConflictingModalityFlags(Modality::Ephys))
        );
    }

    #[test]
    fn ignoring_everything_is_rejected() {
        let flags = ModalityFlags {
            ignore_behavior: true,
            ignore_ephys: true,
            ignore_videos: true,
            ..Default::default()
        };
        assert_matches!(
            ModalitySelection::from_flags(flags),
            Err(BndError::NoModalitiesSelected)
        );
    }

    #[test]
    fn default_flags_select_all() {
        let selection = ModalitySelection::from_flags(ModalityFlags::default()).unwrap();
        assert_eq!(selection, ModalitySelection::all());
    }
}
