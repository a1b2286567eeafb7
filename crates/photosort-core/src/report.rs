use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::planner::PathPlan;
use crate::source::MetadataError;

/// Filesystem action applied to a file that has a free target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Copy,
    Move,
}

/// What happened to one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "kebab-case")]
pub enum Outcome {
    Copied,
    Moved,
    /// Target already holds identical content; source left untouched.
    Duplicate,
    /// Nothing written; carries the action a real run would take.
    DryRun(Action),
    Failed(String),
}

/// One line of the run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub source: PathBuf,
    /// Final target, or the last candidate tried when the file failed.
    /// `None` if no target could be planned at all.
    pub target: Option<PathBuf>,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Metadata field the timestamp came from (`None` = no-info bucket)
    pub field: Option<String>,
    pub timestamp: Option<DateTime<FixedOffset>>,
}

/// Progress and diagnostics emitted while organizing.
#[derive(Debug)]
pub enum Event<'a> {
    /// Metadata source produced nothing usable; the run has zero files.
    NothingToProcess { reason: &'a MetadataError },
    /// A candidate field was examined.
    Candidate {
        source: &'a Path,
        field: &'a str,
        value: &'a str,
        parsed: Option<DateTime<FixedOffset>>,
    },
    Planned {
        index: usize,
        total: usize,
        plan: &'a PathPlan,
    },
    /// A different file already occupies `occupied`; a suffixed name is next.
    Collision { source: &'a Path, occupied: &'a Path },
    Finished {
        index: usize,
        total: usize,
        entry: &'a ReportEntry,
    },
}

/// Receiver for [`Event`]s. Passed explicitly into every component that logs.
pub trait Reporter {
    fn report(&self, event: Event<'_>);
}

impl<F> Reporter for F
where
    F: Fn(Event<'_>),
{
    fn report(&self, event: Event<'_>) {
        self(event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _event: Event<'_>) {}
}
