use std::fs;
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

use crate::error::BndError;

const COMPARE_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub path: Utf8PathBuf,
    pub is_dir: bool,
}

pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Lists a directory sorted by name, skipping hidden entries.
///
/// Filesystem listing order is unspecified, so every walk that produces diagnostics
/// goes through this function.
pub fn read_dir_sorted(dir: &Utf8Path) -> Result<Vec<Entry>, BndError> {
    let mut entries = Vec::new();
    let listing = fs::read_dir(dir.as_std_path()).map_err(|err| BndError::io(dir, err))?;
    for entry in listing {
        let entry = entry.map_err(|err| BndError::io(dir, err))?;
        let name = entry
            .file_name()
            .into_string()
            .map_err(|_| BndError::Filesystem(format!("non-utf8 file name in {dir}")))?;
        if is_hidden(&name) {
            continue;
        }
        // symlinks are never folders here, linked trees are not walked
        let is_dir = entry
            .file_type()
            .map_err(|err| BndError::io(dir, err))?
            .is_dir();
        let path = dir.join(&name);
        entries.push(Entry { name, path, is_dir });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// All non-hidden regular files below `root`, depth-first in sorted order.
///
/// Symlinks are not followed.
pub fn walk_files_sorted(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, BndError> {
    let walker = WalkDir::new(root.as_std_path())
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !entry.file_name().to_str().is_some_and(is_hidden)
        });
    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|err| BndError::Filesystem(format!("{root}: {err}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = Utf8PathBuf::from_path_buf(entry.into_path()).map_err(|path| {
            BndError::Filesystem(format!("non-utf8 file name: {}", path.display()))
        })?;
        files.push(path);
    }
    Ok(files)
}

pub fn file_size(path: &Utf8Path) -> Result<u64, BndError> {
    fs::metadata(path.as_std_path())
        .map(|meta| meta.len())
        .map_err(|err| BndError::io(path, err))
}

pub fn dir_size(path: &Utf8Path) -> Result<u64, BndError> {
    let mut total = 0u64;
    for file in walk_files_sorted(path)? {
        total = total.saturating_add(file_size(&file)?);
    }
    Ok(total)
}

/// Byte-for-byte comparison; files of different length are never read.
pub fn files_identical(left: &Utf8Path, right: &Utf8Path) -> Result<bool, BndError> {
    if file_size(left)? != file_size(right)? {
        return Ok(false);
    }
    let mut a = fs::File::open(left.as_std_path()).map_err(|err| BndError::io(left, err))?;
    let mut b = fs::File::open(right.as_std_path()).map_err(|err| BndError::io(right, err))?;
    let mut buf_a = vec![0u8; COMPARE_CHUNK];
    let mut buf_b = vec![0u8; COMPARE_CHUNK];
    loop {
        let n = read_full(&mut a, &mut buf_a).map_err(|err| BndError::io(left, err))?;
        let m = read_full(&mut b, &mut buf_b).map_err(|err| BndError::io(right, err))?;
        if n != m || buf_a[..n] != buf_b[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// True when both paths name the same file on disk (e.g. on a case-insensitive filesystem).
pub fn same_file(left: &Utf8Path, right: &Utf8Path) -> bool {
    match (
        fs::canonicalize(left.as_std_path()),
        fs::canonicalize(right.as_std_path()),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

pub fn bytes_to_human(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let value = bytes as f64;
    if value >= GB {
        format!("{:.1} GB", value / GB)
    } else if value >= MB {
        format!("{:.1} MB", value / MB)
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{bytes} B")
    }
}
