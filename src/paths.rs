use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{Modality, ProcessingLevel, SessionIdentity, StorageKind};
use crate::error::BndError;
use crate::fs_util;
use crate::store::{StorageRoot, Store};

/// A session identity bound to a storage root and processing level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionPath {
    identity: SessionIdentity,
    root: StorageRoot,
    level: ProcessingLevel,
}

impl SessionPath {
    pub fn new(identity: SessionIdentity, root: StorageRoot, level: ProcessingLevel) -> Self {
        Self {
            identity,
            root,
            level,
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    pub fn kind(&self) -> StorageKind {
        self.root.kind
    }

    pub fn level(&self) -> ProcessingLevel {
        self.level
    }

    pub fn name(&self) -> String {
        self.identity.session_name()
    }

    /// `<base>/<level>/<subject>/<session>`
    pub fn path(&self) -> Utf8PathBuf {
        self.root
            .subject_dir(self.level, self.identity.subject())
            .join(self.identity.session_name())
    }

    pub fn modality_dir(&self, modality: Modality) -> Utf8PathBuf {
        self.path().join(modality.dir_name())
    }
}

/// Session folders found in one subject directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubjectSessions {
    pub valid: Vec<SessionPath>,
    /// Folder names that do not parse as a session of this subject.
    pub invalid: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    store: Store,
    ignored_dirs: Vec<String>,
}

impl PathResolver {
    pub fn new(config: &ResolvedConfig) -> Self {
        Self {
            store: Store::new(config),
            ignored_dirs: config.ignored_subject_level_dirs.clone(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Parses the session folder name at the end of `path`.
    ///
    /// Only the last two path segments are looked at. The folder name must be a well-formed
    /// session name of `expected_subject`, and its parent folder, when there is one, must be
    /// the subject folder.
    pub fn resolve(path: &Utf8Path, expected_subject: &str) -> Result<SessionIdentity, BndError> {
        let name = path
            .file_name()
            .ok_or_else(|| BndError::MalformedSessionName(path.to_string()))?;
        let identity: SessionIdentity = name.parse()?;
        if identity.subject() != expected_subject {
            return Err(BndError::SubjectMismatch {
                expected: expected_subject.to_string(),
                found: identity.subject().to_string(),
            });
        }
        if let Some(parent) = path.parent().and_then(Utf8Path::file_name)
            && parent != identity.subject()
        {
            return Err(BndError::SubjectMismatch {
                expected: identity.subject().to_string(),
                found: parent.to_string(),
            });
        }
        Ok(identity)
    }

    /// Resolves `path` and finds which storage root and level it lives under.
    pub fn locate(&self, path: &Utf8Path, expected_subject: &str) -> Result<SessionPath, BndError> {
        let identity = Self::resolve(path, expected_subject)?;
        let absolute = absolutize(path)?;
        for kind in [StorageKind::Local, StorageKind::Remote] {
            let root = self.store.root(kind);
            let Ok(rest) = absolute.strip_prefix(&root.base) else {
                continue;
            };
            let parts: Vec<&str> = rest
                .components()
                .filter_map(|component| match component {
                    Utf8Component::Normal(part) => Some(part),
                    _ => None,
                })
                .collect();
            if parts.len() != 3 {
                continue;
            }
            let level = match parts[0] {
                "raw" => ProcessingLevel::Raw,
                "processed" => ProcessingLevel::Processed,
                _ => continue,
            };
            return Ok(SessionPath::new(identity, root.clone(), level));
        }
        Err(BndError::OutsideStorageRoot(absolute.to_string()))
    }

    pub fn session_path(
        &self,
        kind: StorageKind,
        level: ProcessingLevel,
        identity: SessionIdentity,
    ) -> SessionPath {
        SessionPath::new(identity, self.store.root(kind).clone(), level)
    }

    /// The same session under the `target` root.
    pub fn mirror(&self, session: &SessionPath, target: StorageKind) -> SessionPath {
        SessionPath::new(
            session.identity.clone(),
            self.store.root(target).clone(),
            session.level,
        )
    }

    pub fn list_subject_sessions(
        &self,
        kind: StorageKind,
        subject: &str,
    ) -> Result<SubjectSessions, BndError> {
        let root = self.store.root(kind);
        let subject_dir = root.subject_dir(ProcessingLevel::Raw, subject);
        if !subject_dir.as_std_path().is_dir() {
            return Err(BndError::NoSessionsFound {
                subject: subject.to_string(),
                path: subject_dir.to_string(),
            });
        }

        let mut sessions = SubjectSessions::default();
        for entry in fs_util::read_dir_sorted(&subject_dir)? {
            if !entry.is_dir || self.is_ignored(&entry.name) {
                continue;
            }
            match entry.name.parse::<SessionIdentity>() {
                Ok(identity) if identity.subject() == subject => sessions.valid.push(
                    SessionPath::new(identity, root.clone(), ProcessingLevel::Raw),
                ),
                _ => sessions.invalid.push(entry.name),
            }
        }
        sessions
            .valid
            .sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(sessions)
    }

    /// The latest raw session of `subject` by date, then label.
    pub fn last_session(&self, kind: StorageKind, subject: &str) -> Result<SessionPath, BndError> {
        let sessions = self.list_subject_sessions(kind, subject)?;
        sessions
            .valid
            .into_iter()
            .max_by(|a, b| a.identity.cmp(&b.identity))
            .ok_or_else(|| BndError::NoSessionsFound {
                subject: subject.to_string(),
                path: self
                    .store
                    .root(kind)
                    .subject_dir(ProcessingLevel::Raw, subject)
                    .to_string(),
            })
    }

    /// Raw sessions recorded on `day`, for one subject or for every subject under the root.
    pub fn sessions_on_day(
        &self,
        kind: StorageKind,
        subject: Option<&str>,
        day: NaiveDate,
    ) -> Result<Vec<SessionPath>, BndError> {
        let subjects = match subject {
            Some(subject) => vec![subject.to_string()],
            None => self.list_subjects(kind)?,
        };
        let mut found = Vec::new();
        for subject in subjects {
            let sessions = self.list_subject_sessions(kind, &subject)?;
            found.extend(
                sessions
                    .valid
                    .into_iter()
                    .filter(|session| session.identity.date() == day),
            );
        }
        Ok(found)
    }

    pub fn today_sessions(
        &self,
        kind: StorageKind,
        subject: Option<&str>,
    ) -> Result<Vec<SessionPath>, BndError> {
        self.sessions_on_day(kind, subject, Local::now().date_naive())
    }

    /// Subject folder names under `<root>/raw`, sorted.
    pub fn list_subjects(&self, kind: StorageKind) -> Result<Vec<String>, BndError> {
        let raw_dir = self.store.root(kind).level_dir(ProcessingLevel::Raw);
        if !raw_dir.as_std_path().is_dir() {
            return Err(BndError::MissingDirectory(raw_dir.to_string()));
        }
        Ok(fs_util::read_dir_sorted(&raw_dir)?
            .into_iter()
            .filter(|entry| entry.is_dir && !self.is_ignored(&entry.name))
            .map(|entry| entry.name)
            .collect())
    }

    fn is_ignored(&self, name: &str) -> bool {
        name.ends_with(".profile") || self.ignored_dirs.iter().any(|ignored| ignored == name)
    }
}

fn absolutize(path: &Utf8Path) -> Result<Utf8PathBuf, BndError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|err| BndError::io(path, err))?;
    let cwd = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|_| BndError::Filesystem("non-utf8 working directory".to_string()))?;
    Ok(cwd.join(path))
}
