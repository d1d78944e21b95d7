use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::Modality;
use crate::error::BndError;
use crate::fs_util;
use crate::paths::SessionPath;

pub const VIDEO_EXTENSION: &str = "avi";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameAction {
    pub from: Utf8PathBuf,
    pub to: Utf8PathBuf,
}

/// Canonical name of the camera folder inside `video/`.
pub fn cameras_dir_name(session_name: &str) -> String {
    format!("{session_name}_cameras")
}

/// Moves the session's videos into `video/<session>_cameras/` and renames each file to
/// `<session>_camera_<i>.avi`, where `i` is the number after the last `_` of the old name.
///
/// A second run on the result does nothing.
pub fn normalize_videos(
    session: &SessionPath,
    dry_run: bool,
) -> Result<Vec<RenameAction>, BndError> {
    let session_dir = session.path();
    let name = session.name();
    let video_dir = session.modality_dir(Modality::Video);
    let target_dir = video_dir.join(cameras_dir_name(&name));

    let videos: Vec<Utf8PathBuf> = fs_util::walk_files_sorted(&session_dir)?
        .into_iter()
        .filter(|path| path.extension() == Some(VIDEO_EXTENSION))
        .collect();
    if videos.is_empty() {
        return Ok(Vec::new());
    }

    let folders: BTreeSet<Utf8PathBuf> = videos
        .iter()
        .filter_map(|path| path.parent().map(Utf8Path::to_path_buf))
        .collect();
    if folders.len() > 1 {
        return Err(BndError::AmbiguousVideoFolders(
            folders
                .iter()
                .map(|folder| relative(folder, &session_dir))
                .collect(),
        ));
    }
    let Some(source_dir) = folders.into_iter().next() else {
        return Ok(Vec::new());
    };

    let mut actions = Vec::new();
    // file name -> current location, tracked by name so dry runs see the planned state
    let mut names: BTreeMap<String, Utf8PathBuf> = BTreeMap::new();

    if source_dir == target_dir {
        for entry in fs_util::read_dir_sorted(&target_dir)? {
            names.insert(entry.name, entry.path);
        }
    } else if source_dir == session_dir || source_dir == video_dir {
        // loose videos: the containing folder stays, the files move
        let existing: BTreeSet<String> = if target_dir.as_std_path().is_dir() {
            fs_util::read_dir_sorted(&target_dir)?
                .into_iter()
                .map(|entry| entry.name)
                .collect()
        } else {
            BTreeSet::new()
        };
        for video in &videos {
            let file_name = file_name(video)?;
            let to = target_dir.join(&file_name);
            if existing.contains(&file_name) {
                return Err(conflict(video, &to));
            }
            actions.push(RenameAction {
                from: video.clone(),
                to: to.clone(),
            });
            names.insert(file_name, to);
        }
        for name in existing {
            let path = target_dir.join(&name);
            names.insert(name, path);
        }
    } else {
        if target_dir.as_std_path().exists() {
            return Err(conflict(&source_dir, &target_dir));
        }
        actions.push(RenameAction {
            from: source_dir.clone(),
            to: target_dir.clone(),
        });
        for entry in fs_util::read_dir_sorted(&source_dir)? {
            names.insert(entry.name.clone(), target_dir.join(&entry.name));
        }
    }

    let current: Vec<String> = names
        .keys()
        .filter(|name| name.ends_with(&format!(".{VIDEO_EXTENSION}")))
        .cloned()
        .collect();
    for old_name in current {
        let new_name = canonical_video_name(&name, &old_name)?;
        if new_name == old_name {
            continue;
        }
        let from = target_dir.join(&old_name);
        let to = target_dir.join(&new_name);
        if names.contains_key(&new_name) {
            return Err(conflict(&from, &to));
        }
        names.remove(&old_name);
        names.insert(new_name, to.clone());
        actions.push(RenameAction { from, to });
    }

    // applied only once every conflict check has passed
    if !dry_run {
        apply(&actions, &video_dir)?;
    }
    for action in &actions {
        tracing::info!(from = %action.from, to = %action.to, dry_run, "rename video");
    }
    Ok(actions)
}

/// `<session>_camera_<i>.avi` for a file whose stem ends in `_<i>`.
pub fn canonical_video_name(session_name: &str, file_name: &str) -> Result<String, BndError> {
    let stem = file_name
        .strip_suffix(&format!(".{VIDEO_EXTENSION}"))
        .unwrap_or(file_name);
    let camera: usize = stem
        .rsplit('_')
        .next()
        .and_then(|last| last.parse().ok())
        .ok_or_else(|| BndError::UnrecognizedVideoName(file_name.to_string()))?;
    Ok(format!("{session_name}_camera_{camera}.{VIDEO_EXTENSION}"))
}

/// Prefixes whitelisted files in the session root and files with the configured extensions
/// inside `ephys/` with `<session>_`. Files that already carry the prefix are left alone.
pub fn normalize_extra_files(
    session: &SessionPath,
    whitelisted_files_in_root: &[String],
    extensions: &[String],
    dry_run: bool,
) -> Result<Vec<RenameAction>, BndError> {
    let session_dir = session.path();
    let prefix = format!("{}_", session.name());
    let mut actions = Vec::new();

    for file_name in whitelisted_files_in_root {
        let from = session_dir.join(file_name);
        if !from.as_std_path().is_file() || file_name.starts_with(&prefix) {
            continue;
        }
        actions.push(prefixed(&from, &prefix)?);
    }

    let ephys_dir = session.modality_dir(Modality::Ephys);
    if ephys_dir.as_std_path().is_dir() {
        for path in fs_util::walk_files_sorted(&ephys_dir)? {
            let file_name = file_name(&path)?;
            if file_name.starts_with(&prefix)
                || !extensions.iter().any(|ext| file_name.ends_with(ext.as_str()))
            {
                continue;
            }
            actions.push(prefixed(&path, &prefix)?);
        }
    }

    for action in &actions {
        tracing::info!(from = %action.from, to = %action.to, dry_run, "rename extra file");
        if !dry_run {
            fs::rename(action.from.as_std_path(), action.to.as_std_path())
                .map_err(|err| BndError::io(&action.from, err))?;
        }
    }
    Ok(actions)
}

fn prefixed(from: &Utf8Path, prefix: &str) -> Result<RenameAction, BndError> {
    let to = from.with_file_name(format!("{prefix}{}", file_name(from)?));
    if to.as_std_path().exists() && !fs_util::same_file(from, &to) {
        return Err(conflict(from, &to));
    }
    Ok(RenameAction {
        from: from.to_path_buf(),
        to,
    })
}

fn apply(actions: &[RenameAction], video_dir: &Utf8Path) -> Result<(), BndError> {
    if !actions.is_empty() {
        fs::create_dir_all(video_dir.as_std_path()).map_err(|err| BndError::io(video_dir, err))?;
    }
    for action in actions {
        if let Some(parent) = action.to.parent() {
            fs::create_dir_all(parent.as_std_path()).map_err(|err| BndError::io(parent, err))?;
        }
        fs::rename(action.from.as_std_path(), action.to.as_std_path())
            .map_err(|err| BndError::io(&action.from, err))?;
    }
    Ok(())
}

fn file_name(path: &Utf8Path) -> Result<String, BndError> {
    path.file_name()
        .map(str::to_string)
        .ok_or_else(|| BndError::Filesystem(format!("path has no file name: {path}")))
}

fn relative(path: &Utf8Path, base: &Utf8Path) -> String {
    path.strip_prefix(base)
        .map(|rest| rest.to_string())
        .unwrap_or_else(|_| path.to_string())
}

fn conflict(from: &Utf8Path, to: &Utf8Path) -> BndError {
    BndError::RenameConflict {
        from: from.to_string(),
        to: to.to_string(),
    }
}
