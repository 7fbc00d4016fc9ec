//! Filesystem steps of a migration: backup copy and marker rename.
//!
//! Both steps only ever add files. An existing file at a target name is
//! never overwritten unless it already holds identical bytes.

use crate::core::error::{StateDbError, StateDbResult};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// How many numbered alternatives to try before giving up on a name.
const MAX_NAME_CANDIDATES: u32 = 1000;

/// Append a suffix to the full file name (`worker.db` + `.bak`).
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Candidate names for `base`: `base`, `base.1`, `base.2`, ...
fn candidates(base: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    (0..MAX_NAME_CANDIDATES).map(move |n| {
        if n == 0 {
            base.to_path_buf()
        } else {
            with_suffix(base, &format!(".{}", n))
        }
    })
}

/// Find a backup of `contents` under `base`, if one was already written.
pub fn existing_backup(base: &Path, contents: &[u8]) -> io::Result<Option<PathBuf>> {
    for candidate in candidates(base) {
        match fs::read(&candidate) {
            Ok(existing) if existing == contents => return Ok(Some(candidate)),
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// Copy `original` byte-for-byte to a backup under `base`.
///
/// An identical backup left by an earlier attempt is reused. A different
/// file already at `base` is kept and the copy goes to the next free
/// numbered name. Returns the backup path and whether it was written now.
pub fn write_backup(original: &Path, base: &Path) -> StateDbResult<(PathBuf, bool)> {
    let contents = fs::read(original).map_err(|e| StateDbError::BackupWriteFailed {
        path: base.to_path_buf(),
        source: e,
    })?;

    let backup_failed = |path: &Path, source: io::Error| StateDbError::BackupWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(existing) = existing_backup(base, &contents).map_err(|e| backup_failed(base, e))? {
        return Ok((existing, false));
    }

    let target = free_name(base).map_err(|e| backup_failed(base, e))?;
    let tmp = with_suffix(&target, ".tmp");
    let written = write_synced(&tmp, &contents).and_then(|_| fs::rename(&tmp, &target));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(backup_failed(&target, e));
    }
    Ok((target, true))
}

/// Rename `original` to a marker name under `base`.
pub fn rename_to_marker(original: &Path, base: &Path) -> StateDbResult<PathBuf> {
    let rename_failed = |to: &Path, source: io::Error| StateDbError::FinalizeRenameFailed {
        from: original.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    let target = free_name(base).map_err(|e| rename_failed(base, e))?;
    fs::rename(original, &target).map_err(|e| rename_failed(&target, e))?;
    Ok(target)
}

/// First candidate name under `base` that does not exist yet.
fn free_name(base: &Path) -> io::Result<PathBuf> {
    for candidate in candidates(base) {
        match fs::symlink_metadata(&candidate) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(candidate),
            Err(e) => return Err(e),
            Ok(_) => continue,
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free name left for {}", base.display()),
    ))
}

fn write_synced(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn suffix_appends_to_file_name() {
        assert_eq!(
            with_suffix(Path::new("/var/lib/worker.db"), ".bak"),
            PathBuf::from("/var/lib/worker.db.bak")
        );
    }

    #[test]
    fn identical_backup_is_reused() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("worker.db");
        fs::write(&original, b"state").unwrap();
        let base = with_suffix(&original, ".bak");

        let (first, written) = write_backup(&original, &base).unwrap();
        assert!(written);
        let (second, written) = write_backup(&original, &base).unwrap();
        assert!(!written);
        assert_eq!(first, second);
        assert!(!with_suffix(&base, ".1").exists());
    }

    #[test]
    fn different_backup_is_kept() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("worker.db");
        let base = with_suffix(&original, ".bak");
        fs::write(&base, b"older state").unwrap();
        fs::write(&original, b"newer state").unwrap();

        let (path, _) = write_backup(&original, &base).unwrap();
        assert_eq!(path, with_suffix(&base, ".1"));
        assert_eq!(fs::read(&base).unwrap(), b"older state");
        assert_eq!(fs::read(&path).unwrap(), b"newer state");
    }

    #[test]
    fn marker_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("worker.db");
        let base = with_suffix(&original, ".migrated");
        fs::write(&base, b"first").unwrap();
        fs::write(&original, b"second").unwrap();

        let marker = rename_to_marker(&original, &base).unwrap();
        assert_eq!(marker, with_suffix(&base, ".1"));
        assert!(!original.exists());
        assert_eq!(fs::read(&base).unwrap(), b"first");
    }
}
