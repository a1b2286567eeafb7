use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use filetime::FileTime;

use crate::report::{Action, Outcome};
use crate::Options;

/// Put `source` at `target` according to the run options.
///
/// `target` must be a path the conflict resolver found free. Missing parent
/// directories are created. An existing file at `target` is never replaced:
/// the call fails with `AlreadyExists` instead.
pub fn commit(source: &Path, target: &Path, options: &Options) -> io::Result<Outcome> {
    let action = options.action();
    if options.dry_run {
        return Ok(Outcome::DryRun(action));
    }

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    match action {
        Action::Copy => {
            copy_preserving(source, target)?;
            Ok(Outcome::Copied)
        }
        Action::Move => {
            move_file(source, target)?;
            Ok(Outcome::Moved)
        }
    }
}

/// Copy contents, permissions and access/modification times.
fn copy_preserving(source: &Path, target: &Path) -> io::Result<()> {
    let meta = fs::metadata(source)?;
    let mut reader = File::open(source)?;
    let out = OpenOptions::new().write(true).create_new(true).open(target)?;

    let written = write_copy(&mut reader, out, target, &meta);
    if written.is_err() {
        // don't leave a truncated copy behind
        let _ = fs::remove_file(target);
    }
    written
}

fn write_copy(reader: &mut File, out: File, target: &Path, meta: &fs::Metadata) -> io::Result<()> {
    let mut writer = BufWriter::new(out);
    io::copy(reader, &mut writer)?;
    writer.flush()?;
    drop(writer);

    let atime = FileTime::from_last_access_time(meta);
    let mtime = FileTime::from_last_modification_time(meta);
    filetime::set_file_times(target, atime, mtime)?;
    fs::set_permissions(target, meta.permissions())
}

fn move_file(source: &Path, target: &Path) -> io::Result<()> {
    if fs::symlink_metadata(target).is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("refusing to overwrite {}", target.display()),
        ));
    }

    match fs::rename(source, target) {
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            copy_then_remove(source, target, |path| fs::remove_file(path))
        }
        result => result,
    }
}

/// Move by copying. If the source can't be removed the copy is deleted
/// again, so a failed move leaves nothing at `target`.
fn copy_then_remove<F>(source: &Path, target: &Path, remove: F) -> io::Result<()>
where
    F: FnOnce(&Path) -> io::Result<()>,
{
    copy_preserving(source, target)?;
    if let Err(err) = remove(source) {
        let _ = fs::remove_file(target);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options(root: &Path) -> Options {
        Options::new(root.join("in"), root.join("out"))
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.jpg");
        fs::write(&source, b"data").unwrap();
        let target = dir.path().join("out").join("2012").join("02").join("a.jpg");

        for copy in [true, false] {
            let opts = options(dir.path()).with_dry_run(true).with_copy(copy);
            let outcome = commit(&source, &target, &opts).unwrap();
            let expected = if copy { Action::Copy } else { Action::Move };
            assert_eq!(outcome, Outcome::DryRun(expected));
        }

        assert!(source.exists());
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_copy_creates_dirs_and_preserves_mtime() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.jpg");
        fs::write(&source, b"pixels").unwrap();
        let mtime = FileTime::from_unix_time(1_328_263_200, 0);
        filetime::set_file_mtime(&source, mtime).unwrap();
        let target = dir.path().join("out").join("2012").join("02").join("a.jpg");

        let outcome = commit(&source, &target, &options(dir.path()).with_copy(true)).unwrap();
        assert_eq!(outcome, Outcome::Copied);
        assert_eq!(fs::read(&target).unwrap(), b"pixels");
        assert!(source.exists());

        let copied = fs::metadata(&target).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&copied), mtime);
    }

    #[test]
    fn test_move_removes_source() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.jpg");
        fs::write(&source, b"pixels").unwrap();
        let target = dir.path().join("out").join("no-info").join("a.jpg");

        let outcome = commit(&source, &target, &options(dir.path())).unwrap();
        assert_eq!(outcome, Outcome::Moved);
        assert!(!source.exists());
        assert_eq!(fs::read(&target).unwrap(), b"pixels");
    }

    #[test]
    fn test_never_overwrites() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.jpg");
        let target = dir.path().join("b.jpg");
        fs::write(&source, b"new").unwrap();
        fs::write(&target, b"old").unwrap();

        for copy in [true, false] {
            let err = commit(&source, &target, &options(dir.path()).with_copy(copy)).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        }
        assert_eq!(fs::read(&target).unwrap(), b"old");
        assert_eq!(fs::read(&source).unwrap(), b"new");
    }

    #[test]
    fn test_failed_rename_does_not_copy() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.jpg");
        let blocker = dir.path().join("blocker");
        fs::write(&source, b"pixels").unwrap();
        fs::write(&blocker, b"not a dir").unwrap();
        let target = blocker.join("a.jpg");

        assert!(move_file(&source, &target).is_err());
        assert!(!target.exists());
        assert_eq!(fs::read(&source).unwrap(), b"pixels");
    }

    #[test]
    fn test_copy_then_remove_cleans_up_when_source_stays() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.jpg");
        let target = dir.path().join("b.jpg");
        fs::write(&source, b"pixels").unwrap();

        let err = copy_then_remove(&source, &target, |_| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only source"))
        })
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(!target.exists());
        assert_eq!(fs::read(&source).unwrap(), b"pixels");

        copy_then_remove(&source, &target, |path| fs::remove_file(path)).unwrap();
        assert!(!source.exists());
        assert_eq!(fs::read(&target).unwrap(), b"pixels");
    }

    #[test]
    fn test_missing_source_fails() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("gone.jpg");
        let target = dir.path().join("out").join("gone.jpg");

        assert!(commit(&source, &target, &options(dir.path())).is_err());
        assert!(commit(&source, &target, &options(dir.path()).with_copy(true)).is_err());
        assert!(!target.exists());
    }
}
