use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::report::{Event, Reporter};

/// Final decision for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing occupies this path; commit here.
    Target(PathBuf),
    /// This path already holds the same content; nothing to do.
    Duplicate(PathBuf),
}

/// Finds a safe target for each file, renaming with `_N` suffixes on
/// collision.
///
/// Occupied paths are whatever exists on disk plus paths claimed by dry-run
/// commits earlier in the same run.
#[derive(Debug, Default)]
pub struct ConflictResolver {
    /// target -> source whose content stands in for it
    claimed: HashMap<PathBuf, PathBuf>,
}

impl ConflictResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `target` is taken by `source` without anything being
    /// written to disk.
    pub fn claim(&mut self, target: &Path, source: &Path) {
        self.claimed
            .entry(target.to_path_buf())
            .or_insert_with(|| source.to_path_buf());
    }

    pub fn resolve(
        &self,
        source: &Path,
        initial: &Path,
        reporter: &dyn Reporter,
    ) -> io::Result<Resolution> {
        let mut candidate = initial.to_path_buf();
        let mut attempt: u64 = 0;

        loop {
            let Some(occupant) = self.occupant(&candidate) else {
                return Ok(Resolution::Target(candidate));
            };
            if files_identical(source, &occupant)? {
                return Ok(Resolution::Duplicate(candidate));
            }

            reporter.report(Event::Collision {
                source,
                occupied: &candidate,
            });
            attempt += 1;
            candidate = suffixed_path(initial, attempt);
        }
    }

    /// File whose content currently lives at `candidate`, if any.
    fn occupant(&self, candidate: &Path) -> Option<PathBuf> {
        if let Some(source) = self.claimed.get(candidate) {
            return Some(source.clone());
        }
        // symlink_metadata so dangling links count as taken
        fs::symlink_metadata(candidate)
            .is_ok()
            .then(|| candidate.to_path_buf())
    }
}

/// `dir/<stem>_<n><.ext>`, always built from the given path's own stem.
///
/// `photo.jpg` gives `photo_1.jpg`, `photo_2.jpg`, ...; `photo_2.jpg` gives
/// `photo_2_1.jpg`: an existing `_N` is part of the name, not a counter.
pub fn suffixed_path(path: &Path, n: u64) -> PathBuf {
    let mut name: OsString = path.file_stem().unwrap_or_default().to_os_string();
    name.push(format!("_{n}"));
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// Byte-for-byte equality of two files (size check, then SHA-256).
///
/// A missing or non-regular `b` is never identical.
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    let meta_a = fs::metadata(a)?;
    let meta_b = match fs::metadata(b) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if !meta_b.is_file() || meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    if fs::canonicalize(a)? == fs::canonicalize(b)? {
        return Ok(true);
    }

    Ok(file_digest(a)? == file_digest(b)?)
}

fn file_digest(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}
