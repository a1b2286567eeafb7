pub mod conflict;
pub mod date;
pub mod planner;
pub mod record;
pub mod report;
pub mod source;
pub mod writer;

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use conflict::{ConflictResolver, Resolution};
pub use date::{parse_timestamp, select_timestamp, ResolvedTimestamp};
pub use planner::{plan, plan_all, Bucket, DirPattern, PathPlan, NO_INFO_DIR};
pub use record::MetadataRecord;
pub use report::{Action, Event, NullReporter, Outcome, ReportEntry, Reporter};
pub use source::{load_records, ExifTool, InMemory, JsonFile, MetadataError, MetadataSource};

/// Default directory layout: year, then month number.
pub const DEFAULT_PATTERN: &str = "%Y/%m";

/// Candidate timestamp fields, in priority order.
pub const DEFAULT_FIELDS: &[&str] = &[
    "File:FileModifyDate",
    "File:FileAccessDate",
    "File:FileCreateDate",
    "EXIF:ModifyDate",
    "EXIF:DateTimeOriginal",
    "EXIF:CreateDate",
];

fn default_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

fn default_fields() -> Vec<String> {
    DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect()
}

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("invalid directory pattern {0:?}")]
    Pattern(String),

    #[error("no candidate metadata fields configured")]
    NoFields,
}

/// Settings for one run. Built once, never changed while organizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(default)]
    pub recursive: bool,
    /// Copy instead of move
    #[serde(default)]
    pub copy: bool,
    #[serde(default)]
    pub dry_run: bool,
    /// strftime template for the dated subdirectories
    #[serde(default = "default_pattern")]
    pub pattern: String,
    /// Candidate timestamp fields
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,
}

impl Options {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            recursive: false,
            copy: false,
            dry_run: false,
            pattern: default_pattern(),
            fields: default_fields(),
        }
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_copy(mut self, copy: bool) -> Self {
        self.copy = copy;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn action(&self) -> Action {
        if self.copy {
            Action::Copy
        } else {
            Action::Move
        }
    }

    /// Check the settings and return the parsed directory pattern.
    pub fn validate(&self) -> Result<DirPattern, OptionsError> {
        if self.fields.is_empty() {
            return Err(OptionsError::NoFields);
        }
        DirPattern::parse(&self.pattern)
    }
}

/// Summary of a run: per-outcome counts plus one entry per source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizeResult {
    pub total: u64,
    pub copied: u64,
    pub moved: u64,
    pub duplicates: u64,
    pub dry_run: u64,
    pub failed: u64,
    /// Files without a usable timestamp (any outcome)
    pub no_info: u64,
    pub entries: Vec<ReportEntry>,
}

impl OrganizeResult {
    fn push(&mut self, entry: ReportEntry) {
        self.total += 1;
        match entry.outcome {
            Outcome::Copied => self.copied += 1,
            Outcome::Moved => self.moved += 1,
            Outcome::Duplicate => self.duplicates += 1,
            Outcome::DryRun(_) => self.dry_run += 1,
            Outcome::Failed(_) => self.failed += 1,
        }
        if entry.field.is_none() {
            self.no_info += 1;
        }
        self.entries.push(entry);
    }
}

/// Runs the timestamp -> path -> conflict -> commit pipeline, one file at a
/// time, in record order.
pub struct Organizer<'a> {
    options: &'a Options,
    pattern: DirPattern,
    reporter: &'a dyn Reporter,
    resolver: ConflictResolver,
}

impl<'a> Organizer<'a> {
    pub fn new(options: &'a Options, reporter: &'a dyn Reporter) -> Result<Self, OptionsError> {
        Ok(Self {
            pattern: options.validate()?,
            options,
            reporter,
            resolver: ConflictResolver::new(),
        })
    }

    /// Organize every record. Per-file failures end up in the result; only
    /// an uncreatable destination root aborts the run.
    pub fn run(mut self, records: &[MetadataRecord]) -> anyhow::Result<OrganizeResult> {
        if !self.options.dry_run {
            fs::create_dir_all(&self.options.destination).with_context(|| {
                format!(
                    "failed to create destination {}",
                    self.options.destination.display()
                )
            })?;
        }

        let total = records.len();
        let mut result = OrganizeResult::default();
        for (index, record) in records.iter().enumerate() {
            let entry = self.organize_one(index, total, record);
            self.reporter.report(Event::Finished {
                index,
                total,
                entry: &entry,
            });
            result.push(entry);
        }

        Ok(result)
    }

    fn organize_one(&mut self, index: usize, total: usize, record: &MetadataRecord) -> ReportEntry {
        let plan = match planner::plan_record(record, self.options, &self.pattern, self.reporter) {
            Ok(plan) => plan,
            Err(err) => {
                return ReportEntry {
                    source: record.source_path(&self.options.source),
                    target: None,
                    outcome: Outcome::Failed(format!("{err:#}")),
                    field: None,
                    timestamp: None,
                }
            }
        };
        self.reporter.report(Event::Planned {
            index,
            total,
            plan: &plan,
        });

        let (target, outcome) = match self.resolver.resolve(&plan.source, &plan.target, self.reporter) {
            Ok(Resolution::Duplicate(path)) => (path, Outcome::Duplicate),
            Ok(Resolution::Target(path)) => {
                let outcome = match writer::commit(&plan.source, &path, self.options) {
                    Ok(outcome) => outcome,
                    Err(err) => Outcome::Failed(format!("{:?} failed: {err}", self.options.action())),
                };
                if let Outcome::DryRun(_) = outcome {
                    self.resolver.claim(&path, &plan.source);
                }
                (path, outcome)
            }
            Err(err) => (plan.target.clone(), Outcome::Failed(format!("conflict check failed: {err}"))),
        };

        let resolved = plan.resolved();
        ReportEntry {
            source: plan.source.clone(),
            target: Some(target),
            outcome,
            field: resolved.map(|r| r.field.clone()),
            timestamp: resolved.map(|r| r.time),
        }
    }
}

/// Extract metadata from `source` and organize everything it describes.
///
/// An empty or failed extraction is not an error: the result has zero files.
pub fn organize(
    source: &dyn MetadataSource,
    options: &Options,
    reporter: &dyn Reporter,
) -> anyhow::Result<OrganizeResult> {
    let organizer = Organizer::new(options, reporter)?;
    let records = load_records(source, options, reporter);
    if records.is_empty() {
        return Ok(OrganizeResult::default());
    }
    organizer.run(&records)
}
