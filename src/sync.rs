use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::ResolvedConfig;
use crate::domain::{Modality, ModalitySelection, ProcessingLevel, StorageKind};
use crate::error::BndError;
use crate::fs_util;
use crate::inspect::InspectPolicy;
use crate::paths::{PathResolver, SessionPath};
use crate::rename;
use crate::store::Store;
use crate::validate::SessionValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CopyAction {
    Copy,
    SkipExists,
    Conflict,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    /// Relative to the session folder.
    pub relative_path: Utf8PathBuf,
    pub action: CopyAction,
    pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CopyPlan {
    pub entries: Vec<PlanEntry>,
}

impl CopyPlan {
    pub fn with_action(&self, action: CopyAction) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(move |entry| entry.action == action)
    }

    pub fn has_conflicts(&self) -> bool {
        self.with_action(CopyAction::Conflict).next().is_some()
    }

    pub fn bytes_to_copy(&self) -> u64 {
        self.with_action(CopyAction::Copy).map(|entry| entry.size).sum()
    }
}

/// How an existing destination file is compared with its source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ValueEnum)]
pub enum CompareMode {
    /// Size check, then byte comparison.
    #[default]
    Content,
    Size,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub selection: ModalitySelection,
    pub rename_videos_first: bool,
    pub rename_extra_files_first: bool,
    pub compare: CompareMode,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            selection: ModalitySelection::all(),
            rename_videos_first: true,
            rename_extra_files_first: true,
            compare: CompareMode::Content,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub session: String,
    pub direction: Direction,
    pub copied: Vec<String>,
    pub skipped: Vec<FileOutcome>,
    pub failed: Vec<FileOutcome>,
    pub warnings: Vec<String>,
    pub bytes_copied: u64,
}

impl SyncReport {
    fn new(session: &SessionPath, direction: Direction) -> Self {
        Self {
            session: session.name(),
            direction,
            copied: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            warnings: Vec::new(),
            bytes_copied: 0,
        }
    }

    fn skip(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(FileOutcome {
            path: path.into(),
            reason: reason.into(),
        });
    }
}

pub const REASON_IDENTICAL: &str = "identical at destination";
pub const REASON_SOURCE_MISSING: &str = "source missing";
pub const REASON_DIFFERS: &str = "destination differs";

pub struct SyncEngine {
    resolver: PathResolver,
    validator: SessionValidator,
    whitelisted_files_in_root: Vec<String>,
    extensions: Vec<String>,
}

impl SyncEngine {
    pub fn new(config: &ResolvedConfig, policy: InspectPolicy) -> Self {
        Self {
            resolver: PathResolver::new(config),
            validator: SessionValidator::new(config, policy),
            whitelisted_files_in_root: config.whitelisted_files_in_root.clone(),
            extensions: config.extensions_to_rename_and_upload.clone(),
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn store(&self) -> &Store {
        self.resolver.store()
    }

    /// Creates the subject folder at the other root, see [`Store::sync_subject_dir`].
    pub fn sync_subject_dir(
        &self,
        source: StorageKind,
        subject: &str,
    ) -> Result<Utf8PathBuf, BndError> {
        self.store()
            .sync_subject_dir(source, ProcessingLevel::Raw, subject)
    }

    /// Files of `source` that a transfer of `modalities` covers, relative to the session.
    ///
    /// Renamed extra files in the session root always belong to the scope.
    pub fn scope(
        &self,
        source: &SessionPath,
        modalities: &[Modality],
    ) -> Result<Vec<Utf8PathBuf>, BndError> {
        let session_dir = source.path();
        let mut files = Vec::new();
        for modality in modalities {
            let dir = source.modality_dir(*modality);
            if !dir.as_std_path().is_dir() {
                continue;
            }
            for file in fs_util::walk_files_sorted(&dir)? {
                files.push(relative_to(&file, &session_dir)?);
            }
        }
        for extra in self.root_extra_files(source) {
            files.push(Utf8PathBuf::from(extra));
        }
        Ok(files)
    }

    /// Recursive diff of the selected part of two mirrored session trees.
    pub fn plan(
        &self,
        source: &SessionPath,
        dest: &SessionPath,
        selection: &ModalitySelection,
        compare: CompareMode,
    ) -> Result<CopyPlan, BndError> {
        let modalities: Vec<Modality> = selection.iter().collect();
        let files = self.scope(source, &modalities)?;
        plan_files(&source.path(), &dest.path(), files, compare)
    }

    /// Copies a local raw session to the remote root.
    ///
    /// Nothing is written remotely unless renaming, validation and the conflict check all
    /// pass. Conflicts come back as `failed` entries of an otherwise empty report.
    pub fn upload(
        &self,
        session: &SessionPath,
        options: &SyncOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SyncReport, BndError> {
        require_raw(session, StorageKind::Local)?;
        if options.rename_videos_first && !options.selection.contains(Modality::Video) {
            return Err(BndError::InvalidConfig(
                "renaming videos before upload requires videos to be included".to_string(),
            ));
        }

        if options.rename_videos_first {
            phase(sink, "Rename", "normalizing video names");
            rename::normalize_videos(session, false)?;
        }
        if options.rename_extra_files_first {
            phase(sink, "Rename", "normalizing extra file names");
            rename::normalize_extra_files(
                session,
                &self.whitelisted_files_in_root,
                &self.extensions,
                false,
            )?;
        }

        phase(sink, "Validate", &format!("validating {}", session.name()));
        let report = self
            .validator
            .validate_session(session, &options.selection)?;
        if !report.is_valid() {
            return Err(report.into_error());
        }

        let remote = self.resolver.mirror(session, StorageKind::Remote);
        phase(sink, "Plan", &format!("comparing with {}", remote.path()));
        let plan = self.plan(session, &remote, &options.selection, options.compare)?;
        let mut result = SyncReport::new(session, Direction::Upload);
        for entry in plan.with_action(CopyAction::SkipExists) {
            result.skip(entry.relative_path.to_string(), REASON_IDENTICAL);
        }
        if plan.has_conflicts() {
            for entry in plan.with_action(CopyAction::Conflict) {
                tracing::warn!(path = %entry.relative_path, "remote file differs");
                result.failed.push(FileOutcome {
                    path: entry.relative_path.to_string(),
                    reason: REASON_DIFFERS.to_string(),
                });
            }
            return Ok(result);
        }

        self.sync_subject_dir(StorageKind::Local, session.identity().subject())?;
        self.execute(session, &remote, &plan, &mut result, sink)?;

        phase(sink, "Verify", "validating the remote copy");
        self.verify_upload(&remote, &plan, &options.selection)?;
        Ok(result)
    }

    /// Copies a remote raw session into the local root.
    ///
    /// Missing or invalid modalities and conflicting files are skipped with a warning;
    /// existing local files are never replaced.
    pub fn download(
        &self,
        session: &SessionPath,
        options: &SyncOptions,
        sink: &dyn ProgressSink,
    ) -> Result<SyncReport, BndError> {
        require_raw(session, StorageKind::Remote)?;
        let local = self.resolver.mirror(session, StorageKind::Local);
        let mut result = SyncReport::new(session, Direction::Download);

        phase(sink, "Validate", &format!("checking {} on the remote", session.name()));
        let mut modalities = Vec::new();
        for modality in options.selection.iter() {
            if !session.modality_dir(modality).as_std_path().is_dir() {
                let warning = format!("skipping {modality} because {REASON_SOURCE_MISSING}");
                tracing::warn!(session = %session.name(), "{warning}");
                result.skip(modality.dir_name(), REASON_SOURCE_MISSING);
                result.warnings.push(warning);
                continue;
            }
            let only = ModalitySelection::only(&[modality])?;
            let report = self.validator.validate_session(session, &only)?;
            match report.first_violation() {
                Some(violation) => {
                    let warning = format!("skipping {modality} because it is invalid: {violation}");
                    tracing::warn!(session = %session.name(), "{warning}");
                    result.skip(
                        modality.dir_name(),
                        format!("invalid at source: {}", violation.detail),
                    );
                    result.warnings.push(warning);
                }
                None => modalities.push(modality),
            }
        }

        self.sync_subject_dir(StorageKind::Remote, session.identity().subject())?;

        phase(sink, "Plan", &format!("comparing with {}", local.path()));
        let files = self.scope(session, &modalities)?;
        let plan = plan_files(&session.path(), &local.path(), files, options.compare)?;
        for entry in &plan.entries {
            match entry.action {
                CopyAction::SkipExists => {
                    result.skip(entry.relative_path.to_string(), REASON_IDENTICAL)
                }
                CopyAction::Conflict => {
                    tracing::warn!(path = %entry.relative_path, "local file differs, not overwriting");
                    result.skip(
                        entry.relative_path.to_string(),
                        format!("conflict: {REASON_DIFFERS}"),
                    );
                    result
                        .warnings
                        .push(format!("{} differs locally, kept the local copy", entry.relative_path));
                }
                CopyAction::Copy => {}
            }
        }
        self.execute(session, &local, &plan, &mut result, sink)?;

        phase(sink, "Verify", "checking the local copy");
        if !modalities.is_empty() {
            let downloaded = ModalitySelection::only(&modalities)?;
            let report = self.validator.validate_session(&local, &downloaded)?;
            for violation in report.violations() {
                result
                    .warnings
                    .push(format!("local copy after download: {violation}"));
            }
        }
        Ok(result)
    }

    fn execute(
        &self,
        source: &SessionPath,
        dest: &SessionPath,
        plan: &CopyPlan,
        result: &mut SyncReport,
        sink: &dyn ProgressSink,
    ) -> Result<(), BndError> {
        let source_dir = source.path();
        let dest_dir = dest.path();
        let total = plan.with_action(CopyAction::Copy).count();
        tracing::info!(
            session = %source.name(),
            files = total,
            bytes = plan.bytes_to_copy(),
            "transferring"
        );
        let start = Instant::now();
        for (index, entry) in plan.with_action(CopyAction::Copy).enumerate() {
            let from = source_dir.join(&entry.relative_path);
            let to = dest_dir.join(&entry.relative_path);
            let copied = Store::copy_file_noclobber(&from, &to)?;
            tracing::debug!(path = %entry.relative_path, bytes = copied, "copied");
            result.copied.push(entry.relative_path.to_string());
            result.bytes_copied += copied;
            sink.event(ProgressEvent {
                message: format!(
                    "phase=Transfer; [{}/{}] {} ({})",
                    index + 1,
                    total,
                    entry.relative_path,
                    fs_util::bytes_to_human(copied)
                ),
                elapsed: Some(start.elapsed()),
            });
        }
        Ok(())
    }

    fn verify_upload(
        &self,
        remote: &SessionPath,
        plan: &CopyPlan,
        selection: &ModalitySelection,
    ) -> Result<(), BndError> {
        let remote_dir = remote.path();
        for entry in &plan.entries {
            let path = remote_dir.join(&entry.relative_path);
            let size = fs_util::file_size(&path).ok();
            if size != Some(entry.size) {
                return Err(BndError::VerificationFailed {
                    session: remote.name(),
                    detail: format!("{} is missing or has the wrong size", entry.relative_path),
                });
            }
        }
        let report = self.validator.validate_session(remote, selection)?;
        if let Some(violation) = report.first_violation() {
            return Err(BndError::VerificationFailed {
                session: remote.name(),
                detail: violation.to_string(),
            });
        }
        Ok(())
    }

    /// Root files named `<session>_<whitelisted name>`.
    fn root_extra_files(&self, session: &SessionPath) -> Vec<String> {
        let session_dir = session.path();
        let name = session.name();
        self.whitelisted_files_in_root
            .iter()
            .map(|file| format!("{name}_{file}"))
            .filter(|file| session_dir.join(file).as_std_path().is_file())
            .collect()
    }
}

/// Classifies each of `files` by comparing `source_dir/file` with `dest_dir/file`.
pub fn plan_files(
    source_dir: &Utf8Path,
    dest_dir: &Utf8Path,
    files: Vec<Utf8PathBuf>,
    compare: CompareMode,
) -> Result<CopyPlan, BndError> {
    let mut entries = Vec::with_capacity(files.len());
    for relative_path in files {
        let source = source_dir.join(&relative_path);
        let dest = dest_dir.join(&relative_path);
        let size = fs_util::file_size(&source)?;
        let action = if !dest.as_std_path().exists() {
            CopyAction::Copy
        } else if !dest.as_std_path().is_file() {
            CopyAction::Conflict
        } else {
            let same = match compare {
                CompareMode::Size => fs_util::file_size(&dest)? == size,
                CompareMode::Content => fs_util::files_identical(&source, &dest)?,
            };
            if same {
                CopyAction::SkipExists
            } else {
                CopyAction::Conflict
            }
        };
        entries.push(PlanEntry {
            relative_path,
            action,
            size,
        });
    }
    Ok(CopyPlan { entries })
}

fn require_raw(session: &SessionPath, expected: StorageKind) -> Result<(), BndError> {
    if session.kind() != expected || session.level() != ProcessingLevel::Raw {
        return Err(BndError::NotRawSession {
            expected: expected.to_string(),
            path: session.path().to_string(),
        });
    }
    Ok(())
}

fn relative_to(path: &Utf8Path, base: &Utf8Path) -> Result<Utf8PathBuf, BndError> {
    path.strip_prefix(base)
        .map(Utf8Path::to_path_buf)
        .map_err(|_| BndError::Filesystem(format!("{path} is not inside {base}")))
}

fn phase(sink: &dyn ProgressSink, phase: &str, text: &str) {
    sink.event(ProgressEvent {
        message: format!("phase={phase}; {text}"),
        elapsed: None,
    });
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn plan_classifies_by_content() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let (src, dst) = (root.join("src"), root.join("dst"));
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        for (name, content) in [("new", "a"), ("same", "b"), ("diff", "c")] {
            fs::write(src.join(name), content).unwrap();
        }
        fs::write(dst.join("same"), "b").unwrap();
        fs::write(dst.join("diff"), "x").unwrap();

        let files = vec!["new".into(), "same".into(), "diff".into()];
        let plan = plan_files(&src, &dst, files.clone(), CompareMode::Content).unwrap();
        let actions: Vec<_> = plan.entries.iter().map(|entry| entry.action).collect();
        assert_eq!(
            actions,
            vec![CopyAction::Copy, CopyAction::SkipExists, CopyAction::Conflict]
        );
        assert_eq!(plan.bytes_to_copy(), 1);

        // same length, different bytes: only content comparison notices
        let plan = plan_files(&src, &dst, files, CompareMode::Size).unwrap();
        assert_eq!(plan.entries[2].action, CopyAction::SkipExists);
    }
}
