//! Staged output writing
//!
//! Every output of a run is first written to a temporary sibling of its
//! destination. Nothing appears at a destination path until the whole run
//! commits; an uncommitted stage removes its temporaries when dropped.
//!
//! A commit replaces destinations one rename at a time. If one of them
//! fails, the destinations already replaced in that commit are rolled
//! back: new files are removed and overwritten ones are restored.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile, TempPath};

/// A set of outputs written to temporary paths, renamed into place on commit
#[derive(Debug, Default)]
pub struct OutputStage {
    staged: Vec<(NamedTempFile, PathBuf)>,
}

impl OutputStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a temporary file next to `target` and return its path.
    ///
    /// The extension of `target` is kept so format drivers that sniff it
    /// still pick the right codec.
    pub fn stage(&mut self, target: impl AsRef<Path>) -> Result<PathBuf> {
        let target = target.as_ref();
        let dir = parent_dir(target);
        let suffix = target
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let tmp = Builder::new()
            .prefix(".riskalloc-")
            .suffix(&suffix)
            .tempfile_in(&dir)?;
        let path = tmp.path().to_path_buf();
        self.staged.push((tmp, target.to_path_buf()));
        Ok(path)
    }

    /// Number of staged outputs
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Move every staged file onto its destination, in staging order.
    ///
    /// On failure every destination already replaced by this commit is
    /// put back the way it was before the commit started.
    pub fn commit(self) -> Result<Vec<PathBuf>> {
        let mut placed: Vec<Placed> = Vec::with_capacity(self.staged.len());
        for (tmp, target) in self.staged {
            let previous = match set_aside(&target) {
                Ok(previous) => previous,
                Err(e) => return Err(roll_back(placed, e)),
            };
            if let Err(e) = tmp.persist(&target) {
                placed.push(Placed {
                    target: target.clone(),
                    previous,
                    written: false,
                });
                return Err(roll_back(placed, Error::Io(e.error)));
            }
            placed.push(Placed {
                target,
                previous,
                written: true,
            });
        }
        Ok(placed.into_iter().map(|p| p.target).collect())
    }
}

/// A destination touched by a commit
struct Placed {
    target: PathBuf,
    /// The file the destination held before, moved aside
    previous: Option<TempPath>,
    /// Whether the staged file reached the destination
    written: bool,
}

fn parent_dir(target: &Path) -> PathBuf {
    match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Move an existing destination to a temporary sibling; dropped with the commit
fn set_aside(target: &Path) -> Result<Option<TempPath>> {
    if !target.exists() {
        return Ok(None);
    }
    let backup = Builder::new()
        .prefix(".riskalloc-prev-")
        .tempfile_in(parent_dir(target))?
        .into_temp_path();
    std::fs::rename(target, &backup)?;
    Ok(Some(backup))
}

/// Undo a partial commit, newest first, and return the error that stopped it
fn roll_back(placed: Vec<Placed>, cause: Error) -> Error {
    let mut failed = Vec::new();
    for p in placed.into_iter().rev() {
        let undone = match (p.previous, p.written) {
            (Some(previous), _) => previous.persist(&p.target).map_err(|e| e.error),
            (None, true) => std::fs::remove_file(&p.target),
            (None, false) => Ok(()),
        };
        if let Err(e) = undone {
            failed.push(format!("{}: {}", p.target.display(), e));
        }
    }
    if failed.is_empty() {
        cause
    } else {
        Error::Other(format!("{}; could not roll back {}", cause, failed.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_commit_moves_into_place() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("table.csv");

        let mut stage = OutputStage::new();
        let tmp = stage.stage(&target).unwrap();
        assert_eq!(tmp.extension().unwrap(), "csv");
        std::fs::write(&tmp, "ID\n1001\n").unwrap();
        assert!(!target.exists());

        let written = stage.commit().unwrap();
        assert_eq!(written, vec![target.clone()]);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "ID\n1001\n");
        assert!(!tmp.exists());
    }

    #[test]
    fn test_drop_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("density.tif");
        {
            let mut stage = OutputStage::new();
            let tmp = stage.stage(&target).unwrap();
            std::fs::write(&tmp, b"partial").unwrap();
        }
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let dir = tempdir().unwrap();
        let existing = dir.path().join("table.csv");
        let fresh = dir.path().join("bins.tif");
        let sub = dir.path().join("out");
        std::fs::create_dir(&sub).unwrap();
        let unreachable = sub.join("density.tif");
        std::fs::write(&existing, "old").unwrap();

        let mut stage = OutputStage::new();
        std::fs::write(stage.stage(&existing).unwrap(), "new").unwrap();
        std::fs::write(stage.stage(&fresh).unwrap(), b"bins").unwrap();
        std::fs::write(stage.stage(&unreachable).unwrap(), b"density").unwrap();
        std::fs::remove_dir_all(&sub).unwrap();

        assert!(matches!(stage.commit(), Err(Error::Io(_))));
        assert_eq!(std::fs::read_to_string(&existing).unwrap(), "old");
        assert!(!fresh.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
