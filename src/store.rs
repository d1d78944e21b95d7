use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tempfile::Builder;

use crate::config::ResolvedConfig;
use crate::domain::{ProcessingLevel, StorageKind};
use crate::error::BndError;

/// A filesystem base path, either on the recording computer or on the archive server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageRoot {
    pub kind: StorageKind,
    pub base: Utf8PathBuf,
}

impl StorageRoot {
    pub fn level_dir(&self, level: ProcessingLevel) -> Utf8PathBuf {
        self.base.join(level.dir_name())
    }

    pub fn subject_dir(&self, level: ProcessingLevel, subject: &str) -> Utf8PathBuf {
        self.level_dir(level).join(subject)
    }
}

/// The pair of storage roots a run operates on. Read-only once built.
#[derive(Debug, Clone)]
pub struct Store {
    local: StorageRoot,
    remote: StorageRoot,
}

impl Store {
    pub fn new(config: &ResolvedConfig) -> Self {
        Self::new_with_paths(config.local_path.clone(), config.remote_path.clone())
    }

    pub fn new_with_paths(local_root: Utf8PathBuf, remote_root: Utf8PathBuf) -> Self {
        Self {
            local: StorageRoot {
                kind: StorageKind::Local,
                base: local_root,
            },
            remote: StorageRoot {
                kind: StorageKind::Remote,
                base: remote_root,
            },
        }
    }

    pub fn root(&self, kind: StorageKind) -> &StorageRoot {
        match kind {
            StorageKind::Local => &self.local,
            StorageKind::Remote => &self.remote,
        }
    }

    pub fn local(&self) -> &StorageRoot {
        &self.local
    }

    pub fn remote(&self) -> &StorageRoot {
        &self.remote
    }

    /// Makes sure the subject folder exists at `source` and creates it at the other root.
    ///
    /// The destination's `<root>/<level>` folder must already exist; only the subject
    /// folder below it is ever created.
    pub fn sync_subject_dir(
        &self,
        source: StorageKind,
        level: ProcessingLevel,
        subject: &str,
    ) -> Result<Utf8PathBuf, BndError> {
        let source_root = self.root(source);
        let dest_root = self.root(source.other());

        let source_level = source_root.level_dir(level);
        if !source_level.as_std_path().is_dir() {
            return Err(BndError::MissingDirectory(format!(
                "{source} '{level}' directory {source_level}"
            )));
        }
        let source_subject = source_root.subject_dir(level, subject);
        if !source_subject.as_std_path().is_dir() {
            return Err(BndError::MissingDirectory(format!(
                "{source} subject directory {source_subject}"
            )));
        }

        let dest_level = dest_root.level_dir(level);
        if !dest_level.as_std_path().is_dir() {
            return Err(BndError::MissingDirectory(format!(
                "{} '{level}' directory {dest_level}",
                source.other()
            )));
        }
        let dest_subject = dest_root.subject_dir(level, subject);
        if !dest_subject.as_std_path().exists() {
            fs::create_dir(dest_subject.as_std_path())
                .map_err(|err| BndError::io(&dest_subject, err))?;
            tracing::info!(path = %dest_subject, "created subject directory");
        }
        Ok(dest_subject)
    }

    /// Copies `source` to `dest` through a temp file in the destination folder.
    ///
    /// The final rename refuses to replace an existing file, so a file that appeared at
    /// `dest` after planning surfaces as an error instead of being overwritten.
    pub fn copy_file_noclobber(source: &Utf8Path, dest: &Utf8Path) -> Result<u64, BndError> {
        let parent = dest
            .parent()
            .ok_or_else(|| BndError::Filesystem(format!("invalid destination path {dest}")))?;
        fs::create_dir_all(parent.as_std_path()).map_err(|err| BndError::io(parent, err))?;
        let temp = Builder::new()
            .prefix(".bnd-copy")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| BndError::io(parent, err))?;
        let copied =
            fs::copy(source.as_std_path(), temp.path()).map_err(|err| BndError::io(source, err))?;
        temp.persist_noclobber(dest.as_std_path())
            .map_err(|err| BndError::io(dest, err.error))?;
        Ok(copied)
    }
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), BndError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path()).map_err(|err| BndError::io(parent, err))?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(tmp_path.as_std_path(), content).map_err(|err| BndError::io(&tmp_path, err))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| BndError::io(path, err))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_paths("/data/local".into(), "/mnt/remote".into());
        let subject = store.remote().subject_dir(ProcessingLevel::Raw, "M020");
        assert_eq!(subject, Utf8PathBuf::from("/mnt/remote/raw/M020"));
        let processed = store.local().level_dir(ProcessingLevel::Processed);
        assert!(processed.ends_with("processed"));
    }

    #[test]
    fn noclobber_copy_keeps_existing_file() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::write(root.join("src.bin"), b"new").unwrap();
        fs::write(root.join("dst.bin"), b"old").unwrap();

        let err = Store::copy_file_noclobber(&root.join("src.bin"), &root.join("dst.bin"))
            .unwrap_err();
        assert_matches!(err, BndError::Filesystem(_));
        assert_eq!(fs::read(root.join("dst.bin")).unwrap(), b"old");

        Store::copy_file_noclobber(&root.join("src.bin"), &root.join("sub/copy.bin")).unwrap();
        assert_eq!(fs::read(root.join("sub/copy.bin")).unwrap(), b"new");
    }
}
