use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use thiserror::Error;

use crate::record::MetadataRecord;
use crate::report::{Event, Reporter};
use crate::Options;

/// Reasons a metadata source produced no usable records.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid metadata JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no files to process")]
    Empty,
}

/// Anything that can describe the files under a directory.
pub trait MetadataSource {
    fn extract(&self, dir: &Path, recursive: bool) -> Result<Vec<MetadataRecord>, MetadataError>;
}

/// Decode `exiftool -j` output: a JSON array of objects with `SourceFile`.
pub fn decode_records(bytes: &[u8]) -> Result<Vec<MetadataRecord>, MetadataError> {
    if bytes.trim_ascii().is_empty() {
        return Err(MetadataError::Empty);
    }
    let records: Vec<MetadataRecord> = serde_json::from_slice(bytes)?;
    if records.is_empty() {
        return Err(MetadataError::Empty);
    }
    Ok(records)
}

/// Extract records for the run, treating every failure as "nothing to do".
///
/// The reason is passed to the reporter as [`Event::NothingToProcess`].
pub fn load_records(
    source: &dyn MetadataSource,
    options: &Options,
    reporter: &dyn Reporter,
) -> Vec<MetadataRecord> {
    match source.extract(&options.source, options.recursive) {
        Ok(records) => records,
        Err(reason) => {
            reporter.report(Event::NothingToProcess { reason: &reason });
            Vec::new()
        }
    }
}

/// Runs `exiftool -j -a -G [-r] <dir>` once and decodes its output.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
    save_to: Option<PathBuf>,
}

impl Default for ExifTool {
    fn default() -> Self {
        Self::new("exiftool")
    }
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            save_to: None,
        }
    }

    /// Also write the raw JSON to `path`, so later runs can use [`JsonFile`].
    pub fn save_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_to = Some(path.into());
        self
    }

    fn args(dir: &Path, recursive: bool) -> Vec<&OsStr> {
        let mut args = vec![OsStr::new("-j"), OsStr::new("-a"), OsStr::new("-G")];
        if recursive {
            args.push(OsStr::new("-r"));
        }
        args.push(dir.as_os_str());
        args
    }
}

impl MetadataSource for ExifTool {
    fn extract(&self, dir: &Path, recursive: bool) -> Result<Vec<MetadataRecord>, MetadataError> {
        // absolute dir -> absolute SourceFile values
        let dir = fs::canonicalize(dir)?;
        let program = self.program.display().to_string();

        let output = Command::new(&self.program)
            .args(Self::args(&dir, recursive))
            .output()
            .map_err(|source| MetadataError::Spawn {
                program: program.clone(),
                source,
            })?;

        // exiftool exits non-zero when some files fail but still prints the rest
        if output.stdout.trim_ascii().is_empty() && !output.status.success() {
            return Err(MetadataError::Failed {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if let Some(path) = &self.save_to {
            fs::write(path, &output.stdout)?;
        }

        decode_records(&output.stdout)
    }
}

/// Reads a metadata file saved by an earlier run.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MetadataSource for JsonFile {
    fn extract(&self, _dir: &Path, _recursive: bool) -> Result<Vec<MetadataRecord>, MetadataError> {
        decode_records(&fs::read(&self.path)?)
    }
}

/// Fixed record set, mainly for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemory(pub Vec<MetadataRecord>);

impl MetadataSource for InMemory {
    fn extract(&self, _dir: &Path, _recursive: bool) -> Result<Vec<MetadataRecord>, MetadataError> {
        if self.0.is_empty() {
            return Err(MetadataError::Empty);
        }
        Ok(self.0.clone())
    }
}
