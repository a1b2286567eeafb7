use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::date::{self, ResolvedTimestamp};
use crate::record::MetadataRecord;
use crate::report::{NullReporter, Reporter};
use crate::{Options, OptionsError};

/// Subdirectory for files without any usable timestamp.
pub const NO_INFO_DIR: &str = "no-info";

/// strftime template for the dated part of a target path, e.g. `%Y/%m`.
///
/// Both `/` and `\` act as directory separators, so templates written for
/// either platform work everywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirPattern {
    raw: String,
}

impl DirPattern {
    pub fn parse(raw: &str) -> Result<Self, OptionsError> {
        if StrftimeItems::new(raw).any(|item| matches!(item, Item::Error)) {
            return Err(OptionsError::Pattern(raw.to_string()));
        }
        Ok(Self { raw: raw.to_string() })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Relative directory for `time`. Empty, `.` and `..` segments are
    /// dropped so the result always stays below the destination root.
    pub fn render(&self, time: &DateTime<FixedOffset>) -> Result<PathBuf, OptionsError> {
        let mut formatted = String::new();
        write!(formatted, "{}", time.format(&self.raw))
            .map_err(|_| OptionsError::Pattern(self.raw.clone()))?;

        Ok(formatted
            .split(['/', '\\'])
            .filter(|segment| !segment.is_empty())
            .map(Path::new)
            .filter(|segment| matches!(segment.components().next(), Some(Component::Normal(_))))
            .collect())
    }
}

/// Where a file falls in the destination tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Bucket {
    Dated(ResolvedTimestamp),
    NoInfo,
}

/// Initial destination for one source file, before collision handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathPlan {
    pub source: PathBuf,
    pub target: PathBuf,
    pub bucket: Bucket,
}

impl PathPlan {
    pub fn resolved(&self) -> Option<&ResolvedTimestamp> {
        match &self.bucket {
            Bucket::Dated(resolved) => Some(resolved),
            Bucket::NoInfo => None,
        }
    }
}

/// Compute the initial target: `destination/<pattern>/<basename>`, or
/// `destination/no-info/<basename>` when no timestamp was resolved.
pub fn plan(
    source: &Path,
    resolved: Option<ResolvedTimestamp>,
    destination: &Path,
    pattern: &DirPattern,
) -> anyhow::Result<PathPlan> {
    let basename = source
        .file_name()
        .with_context(|| format!("source path has no file name: {}", source.display()))?;

    let (dir, bucket) = match resolved {
        Some(resolved) => (
            destination.join(pattern.render(&resolved.time)?),
            Bucket::Dated(resolved),
        ),
        None => (destination.join(NO_INFO_DIR), Bucket::NoInfo),
    };

    Ok(PathPlan {
        source: source.to_path_buf(),
        target: dir.join(basename),
        bucket,
    })
}

/// Select a timestamp for `record` and plan its target.
pub fn plan_record(
    record: &MetadataRecord,
    options: &Options,
    pattern: &DirPattern,
    reporter: &dyn Reporter,
) -> anyhow::Result<PathPlan> {
    let source = record.source_path(&options.source);
    let resolved = date::select_timestamp_with(record, &options.fields, &source, reporter);
    plan(&source, resolved, &options.destination, pattern)
}

/// Plan every record without touching the filesystem.
pub fn plan_all(records: &[MetadataRecord], options: &Options) -> anyhow::Result<Vec<PathPlan>> {
    let pattern = options.validate()?;
    records
        .iter()
        .map(|record| plan_record(record, options, &pattern, &NullReporter))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date::parse_timestamp;

    fn resolved(raw: &str) -> Option<ResolvedTimestamp> {
        Some(ResolvedTimestamp {
            time: parse_timestamp(raw).unwrap(),
            field: "EXIF:DateTimeOriginal".to_string(),
        })
    }

    #[test]
    fn test_year_month_pattern() {
        let pattern = DirPattern::parse("%Y/%m").unwrap();
        let plan = plan(
            Path::new("/in/IMG_0001.jpg"),
            resolved("2012:02:03 10:00:00"),
            Path::new("/out"),
            &pattern,
        )
        .unwrap();

        assert_eq!(plan.target, Path::new("/out").join("2012").join("02").join("IMG_0001.jpg"));
        assert_eq!(plan.resolved().unwrap().field, "EXIF:DateTimeOriginal");
    }

    #[test]
    fn test_no_timestamp_goes_to_no_info() {
        let pattern = DirPattern::parse("%Y/%m").unwrap();
        let plan = plan(Path::new("/in/clip.MOV"), None, Path::new("/out"), &pattern).unwrap();

        assert_eq!(plan.target, Path::new("/out").join(NO_INFO_DIR).join("clip.MOV"));
        assert_eq!(plan.bucket, Bucket::NoInfo);
    }

    #[test]
    fn test_backslash_and_named_patterns() {
        let time = parse_timestamp("2012:02:03 10:00:00").unwrap();

        let windows = DirPattern::parse(r"%Y\%m").unwrap();
        assert_eq!(windows.render(&time).unwrap(), Path::new("2012").join("02"));

        let named = DirPattern::parse("%Y/%m %B/%d").unwrap();
        assert_eq!(
            named.render(&time).unwrap(),
            Path::new("2012").join("02 February").join("03")
        );
    }

    #[test]
    fn test_render_never_escapes_destination() {
        let time = parse_timestamp("2012:02:03 10:00:00").unwrap();
        let pattern = DirPattern::parse("../%Y//./%m/").unwrap();
        assert_eq!(pattern.render(&time).unwrap(), Path::new("2012").join("02"));

        let flat = DirPattern::parse("").unwrap();
        assert_eq!(flat.render(&time).unwrap(), PathBuf::new());
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(matches!(DirPattern::parse("%Y/%"), Err(OptionsError::Pattern(_))));
    }

    #[test]
    fn test_plan_all_uses_source_root() {
        let records = vec![
            MetadataRecord::new("IMG_0001.jpg").with_field("EXIF:DateTimeOriginal", "2012:02:03 10:00:00"),
            MetadataRecord::new("sub/notes.mp4"),
        ];
        let options = Options::new("/in", "/out");

        let plans = plan_all(&records, &options).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].source, Path::new("/in").join("IMG_0001.jpg"));
        assert_eq!(plans[0].target, Path::new("/out").join("2012").join("02").join("IMG_0001.jpg"));
        assert_eq!(plans[1].target, Path::new("/out").join(NO_INFO_DIR).join("notes.mp4"));
    }
}
