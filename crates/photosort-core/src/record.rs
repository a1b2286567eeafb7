use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata for one source file, as emitted by `exiftool -j -a -G`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Path of the file the record describes (relative or absolute)
    #[serde(rename = "SourceFile")]
    pub source_file: String,
    /// Remaining `Group:Field` entries, in the order they were emitted
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl MetadataRecord {
    pub fn new(source_file: impl Into<String>) -> Self {
        Self {
            source_file: source_file.into(),
            fields: Map::new(),
        }
    }

    /// Add a text field, keeping insertion order.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Value::String(value.into()));
        self
    }

    /// Text value of a field. Numbers, lists and objects yield `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// All text fields in record order.
    pub fn text_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter_map(|(name, value)| value.as_str().map(|v| (name.as_str(), v)))
    }

    /// Absolute location of the source file. Relative `SourceFile` values are
    /// taken relative to the source root.
    pub fn source_path(&self, source_root: &Path) -> PathBuf {
        let path = Path::new(&self.source_file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            source_root.join(path)
        }
    }
}
