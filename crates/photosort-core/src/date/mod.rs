pub mod parse;

pub use parse::parse_timestamp;

use std::path::Path;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::record::MetadataRecord;
use crate::report::{Event, NullReporter, Reporter};

/// The timestamp chosen for a file, with the field it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTimestamp {
    pub time: DateTime<FixedOffset>,
    pub field: String,
}

/// Pick the earliest parseable timestamp among the candidate `fields`.
///
/// Fields are visited in record order; on equal instants the first one seen
/// wins. File-system dates (modify/access/create) only move forward when a
/// file is copied around, so the minimum over all candidates is the best
/// approximation of the capture time.
pub fn select_timestamp(record: &MetadataRecord, fields: &[String]) -> Option<ResolvedTimestamp> {
    select_timestamp_with(record, fields, Path::new(&record.source_file), &NullReporter)
}

/// Same as [`select_timestamp`], reporting every examined candidate.
pub fn select_timestamp_with(
    record: &MetadataRecord,
    fields: &[String],
    source: &Path,
    reporter: &dyn Reporter,
) -> Option<ResolvedTimestamp> {
    let mut best: Option<ResolvedTimestamp> = None;

    for (field, value) in record.text_fields() {
        if !fields.iter().any(|f| f == field) {
            continue;
        }

        let parsed = parse_timestamp(value);
        reporter.report(Event::Candidate {
            source,
            field,
            value,
            parsed,
        });

        let Some(time) = parsed else { continue };
        if best.as_ref().map_or(true, |b| time < b.time) {
            best = Some(ResolvedTimestamp {
                time,
                field: field.to_string(),
            });
        }
    }

    best
}
