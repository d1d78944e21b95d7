use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::Modality;

#[derive(Debug, Error, Diagnostic)]
pub enum BndError {
    #[error("config file not found at {0} (run `bnd init` to create one)")]
    #[diagnostic(code(bnd::config::missing))]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    #[diagnostic(code(bnd::config::read))]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    #[diagnostic(code(bnd::config::parse))]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    #[diagnostic(code(bnd::config::invalid))]
    InvalidConfig(String),

    #[error("both --check-{0} and --ignore-{0} were given")]
    #[diagnostic(code(bnd::config::modality_flags))]
    ConflictingModalityFlags(Modality),

    #[error("at least one data type must be checked")]
    #[diagnostic(code(bnd::config::no_modalities))]
    NoModalitiesSelected,

    #[error("malformed session name: {0}")]
    #[diagnostic(
        code(bnd::path::malformed_session),
        help("session folders are named <subject>_<YYYY-MM-DD>_<label>, e.g. M020_2024-05-01_s1")
    )]
    MalformedSessionName(String),

    #[error("subject mismatch: expected {expected}, found {found}")]
    #[diagnostic(code(bnd::path::subject_mismatch))]
    SubjectMismatch { expected: String, found: String },

    #[error("no sessions found for subject {subject} in {path}")]
    #[diagnostic(code(bnd::path::no_sessions))]
    NoSessionsFound { subject: String, path: String },

    #[error("{0} is not a session folder under the local or remote root")]
    #[diagnostic(code(bnd::path::outside_root))]
    OutsideStorageRoot(String),

    #[error("only raw data is supported here, got {0}")]
    #[diagnostic(code(bnd::path::processing_level))]
    UnsupportedProcessingLevel(String),

    #[error("rename conflict: {to} already exists (while renaming {from})")]
    #[diagnostic(code(bnd::rename::conflict))]
    RenameConflict { from: String, to: String },

    #[error("video files found in more than one folder: {}", .0.join(", "))]
    #[diagnostic(code(bnd::rename::ambiguous_video_folders))]
    AmbiguousVideoFolders(Vec<String>),

    #[error("cannot infer camera index from video file name: {0}")]
    #[diagnostic(code(bnd::rename::video_name))]
    UnrecognizedVideoName(String),

    #[error("session {session} is invalid: {detail}")]
    #[diagnostic(code(bnd::validate::invalid))]
    ValidationFailed { session: String, detail: String },

    #[error("destination already has different versions of {} file(s): {}", .0.len(), .0.join(", "))]
    #[diagnostic(
        code(bnd::sync::already_exists),
        help("authoritative raw data is never overwritten; resolve the differences by hand")
    )]
    AlreadyExists(Vec<String>),

    #[error("verification after transfer failed for {session}: {detail}")]
    #[diagnostic(code(bnd::sync::verification))]
    VerificationFailed { session: String, detail: String },

    #[error("required directory does not exist: {0}")]
    #[diagnostic(code(bnd::sync::missing_directory))]
    MissingDirectory(String),

    #[error("expected a raw session under the {expected} root: {path}")]
    #[diagnostic(code(bnd::sync::not_raw))]
    NotRawSession { expected: String, path: String },

    #[error("filesystem error: {0}")]
    #[diagnostic(code(bnd::io))]
    Filesystem(String),
}

impl BndError {
    pub(crate) fn io(path: impl std::fmt::Display, err: std::io::Error) -> Self {
        BndError::Filesystem(format!("{path}: {err}"))
    }
}
