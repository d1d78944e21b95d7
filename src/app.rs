use std::time::Duration;

use camino::Utf8Path;
use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{ModalitySelection, StorageKind};
use crate::error::BndError;
use crate::fs_util;
use crate::inspect::InspectPolicy;
use crate::paths::{PathResolver, SessionPath};
use crate::rename::{self, RenameAction};
use crate::sync::{SyncEngine, SyncOptions, SyncReport};
use crate::validate::{SessionValidator, SubjectValidation, ValidationReport};

#[derive(Debug, Clone, Serialize)]
pub struct ValidateResult {
    pub reports: Vec<ValidationReport>,
}

impl ValidateResult {
    pub fn first_invalid(&self) -> Option<&ValidationReport> {
        self.reports.iter().find(|report| !report.is_valid())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TodayEntry {
    pub subject: String,
    pub session: String,
    pub path: String,
    pub size_bytes: u64,
    pub size: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListTodayResult {
    pub day: NaiveDate,
    pub sessions: Vec<TodayEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameResult {
    pub session: String,
    pub dry_run: bool,
    pub actions: Vec<RenameAction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub source: String,
    pub destination: String,
    pub report: SyncReport,
}

impl SyncResult {
    /// Upload conflicts become an error after the report has been shown.
    pub fn conflict_error(&self) -> Option<BndError> {
        if self.report.failed.is_empty() {
            return None;
        }
        Some(BndError::AlreadyExists(
            self.report
                .failed
                .iter()
                .map(|outcome| outcome.path.clone())
                .collect(),
        ))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ProgressSinkKind {
    Upload,
    Download,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App {
    config: ResolvedConfig,
    validator: SessionValidator,
    engine: SyncEngine,
}

impl App {
    pub fn new(config: ResolvedConfig, policy: InspectPolicy) -> Self {
        let validator = SessionValidator::new(&config, policy);
        let engine = SyncEngine::new(&config, policy);
        Self {
            config,
            validator,
            engine,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn resolver(&self) -> &PathResolver {
        self.engine.resolver()
    }

    pub fn validate_session(
        &self,
        path: &Utf8Path,
        subject: &str,
        selection: &ModalitySelection,
        sink: &dyn ProgressSink,
    ) -> Result<ValidateResult, BndError> {
        let session = self.locate(path, subject, sink)?;
        self.validate_all(vec![session], selection, sink)
    }

    pub fn validate_last(
        &self,
        subject: &str,
        selection: &ModalitySelection,
        sink: &dyn ProgressSink,
    ) -> Result<ValidateResult, BndError> {
        emit(sink, "Resolve", format!("finding last session of {subject}"));
        let session = self.resolver().last_session(StorageKind::Local, subject)?;
        self.validate_all(vec![session], selection, sink)
    }

    pub fn validate_today(
        &self,
        subject: Option<&str>,
        selection: &ModalitySelection,
        sink: &dyn ProgressSink,
    ) -> Result<ValidateResult, BndError> {
        emit(sink, "Resolve", "finding today's sessions".to_string());
        let sessions = self.resolver().today_sessions(StorageKind::Local, subject)?;
        self.validate_all(sessions, selection, sink)
    }

    pub fn validate_sessions(
        &self,
        subject: &str,
        selection: &ModalitySelection,
        sink: &dyn ProgressSink,
    ) -> Result<SubjectValidation, BndError> {
        emit(sink, "Validate", format!("validating every session of {subject}"));
        self.validator
            .validate_sessions(self.resolver(), subject, selection)
    }

    pub fn list_today(
        &self,
        subject: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<ListTodayResult, BndError> {
        let day = Local::now().date_naive();
        emit(sink, "Resolve", format!("listing sessions of {day}"));
        let sessions = self
            .resolver()
            .sessions_on_day(StorageKind::Local, subject, day)?;
        let mut entries = Vec::with_capacity(sessions.len());
        for session in sessions {
            let path = session.path();
            let size_bytes = fs_util::dir_size(&path)?;
            entries.push(TodayEntry {
                subject: session.identity().subject().to_string(),
                session: session.name(),
                path: path.to_string(),
                size_bytes,
                size: fs_util::bytes_to_human(size_bytes),
            });
        }
        Ok(ListTodayResult {
            day,
            sessions: entries,
        })
    }

    pub fn rename_videos(
        &self,
        path: &Utf8Path,
        subject: &str,
        dry_run: bool,
        sink: &dyn ProgressSink,
    ) -> Result<RenameResult, BndError> {
        let session = self.locate(path, subject, sink)?;
        emit(sink, "Rename", format!("normalizing videos of {}", session.name()));
        let actions = rename::normalize_videos(&session, dry_run)?;
        Ok(RenameResult {
            session: session.name(),
            dry_run,
            actions,
        })
    }

    pub fn rename_extra_files(
        &self,
        path: &Utf8Path,
        subject: &str,
        dry_run: bool,
        sink: &dyn ProgressSink,
    ) -> Result<RenameResult, BndError> {
        let session = self.locate(path, subject, sink)?;
        emit(
            sink,
            "Rename",
            format!("normalizing extra files of {}", session.name()),
        );
        let actions = rename::normalize_extra_files(
            &session,
            &self.config.whitelisted_files_in_root,
            &self.config.extensions_to_rename_and_upload,
            dry_run,
        )?;
        Ok(RenameResult {
            session: session.name(),
            dry_run,
            actions,
        })
    }

    pub fn upload_session(
        &self,
        path: &Utf8Path,
        subject: &str,
        options: &SyncOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SyncResult, BndError> {
        let session = self.locate(path, subject, sink)?;
        self.upload(session, options, sink)
    }

    pub fn upload_last(
        &self,
        subject: &str,
        options: &SyncOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SyncResult, BndError> {
        emit(sink, "Resolve", format!("finding last local session of {subject}"));
        let session = self.resolver().last_session(StorageKind::Local, subject)?;
        self.upload(session, options, sink)
    }

    pub fn download_session(
        &self,
        path: &Utf8Path,
        subject: &str,
        options: &SyncOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SyncResult, BndError> {
        let session = self.locate(path, subject, sink)?;
        self.download(session, options, sink)
    }

    pub fn download_last(
        &self,
        subject: &str,
        options: &SyncOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SyncResult, BndError> {
        emit(sink, "Resolve", format!("finding last remote session of {subject}"));
        let session = self.resolver().last_session(StorageKind::Remote, subject)?;
        self.download(session, options, sink)
    }

    fn upload(
        &self,
        session: SessionPath,
        options: &SyncOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SyncResult, BndError> {
        let remote = self.resolver().mirror(&session, StorageKind::Remote);
        let report = self.engine.upload(&session, options, sink)?;
        Ok(SyncResult {
            source: session.path().to_string(),
            destination: remote.path().to_string(),
            report,
        })
    }

    fn download(
        &self,
        session: SessionPath,
        options: &SyncOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SyncResult, BndError> {
        let local = self.resolver().mirror(&session, StorageKind::Local);
        let report = self.engine.download(&session, options, sink)?;
        Ok(SyncResult {
            source: session.path().to_string(),
            destination: local.path().to_string(),
            report,
        })
    }

    fn locate(
        &self,
        path: &Utf8Path,
        subject: &str,
        sink: &dyn ProgressSink,
    ) -> Result<SessionPath, BndError> {
        emit(sink, "Resolve", format!("resolving {path}"));
        self.resolver().locate(path, subject)
    }

    fn validate_all(
        &self,
        sessions: Vec<SessionPath>,
        selection: &ModalitySelection,
        sink: &dyn ProgressSink,
    ) -> Result<ValidateResult, BndError> {
        let mut reports = Vec::with_capacity(sessions.len());
        for session in &sessions {
            emit(sink, "Validate", format!("validating {}", session.name()));
            reports.push(self.validator.validate_session(session, selection)?);
        }
        Ok(ValidateResult { reports })
    }
}

fn emit(sink: &dyn ProgressSink, phase: &str, text: String) {
    sink.event(ProgressEvent {
        message: format!("phase={phase}; {text}"),
        elapsed: None,
    });
}
