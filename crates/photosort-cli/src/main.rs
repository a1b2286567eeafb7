use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use photosort_core::{
    load_records, Event, ExifTool, JsonFile, MetadataSource, Options, OrganizeResult, Organizer,
    Outcome, Reporter, DEFAULT_FIELDS, DEFAULT_PATTERN,
};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "photosort", version, about = "Organize photos and videos into date folders using exiftool metadata")]
struct Cli {
    /// Directory with the files to organize
    source: PathBuf,

    /// Root of the organized tree
    destination: PathBuf,

    /// Search the source directory recursively
    #[arg(short, long)]
    recursive: bool,

    /// Copy files instead of moving them
    #[arg(short, long)]
    copy: bool,

    /// Only report what would happen; no files are copied or moved
    #[arg(long)]
    dry_run: bool,

    /// Destination folder layout as a strftime pattern, e.g. "%Y/%m %B"
    #[arg(long, value_name = "PATTERN", default_value = DEFAULT_PATTERN)]
    sort: String,

    /// Candidate timestamp field (repeatable, replaces the default list)
    #[arg(long = "field", value_name = "NAME")]
    fields: Vec<String>,

    /// exiftool executable
    #[arg(long, value_name = "PATH", default_value = "exiftool")]
    exiftool: PathBuf,

    /// Where extracted metadata is saved (--keep-meta) or read from (--skip-meta)
    #[arg(long, value_name = "PATH", default_value = "image_meta.json")]
    meta_file: PathBuf,

    /// Keep the extracted metadata JSON after the run
    #[arg(short, long)]
    keep_meta: bool,

    /// Only extract and save metadata, don't organize anything
    #[arg(short, long, conflicts_with = "skip_meta")]
    meta_only: bool,

    /// Read metadata from --meta-file instead of running exiftool
    #[arg(long)]
    skip_meta: bool,

    /// Write a JSON report of every file's outcome
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,

    /// Write log lines to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Log every examined metadata field
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> Options {
        let fields: Vec<String> = if self.fields.is_empty() {
            DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect()
        } else {
            self.fields.clone()
        };

        Options::new(&self.source, &self.destination)
            .with_recursive(self.recursive)
            .with_copy(self.copy)
            .with_dry_run(self.dry_run)
            .with_pattern(&self.sort)
            .with_fields(fields)
    }

    fn metadata_source(&self) -> Box<dyn MetadataSource> {
        if self.skip_meta {
            return Box::new(JsonFile::new(&self.meta_file));
        }
        let exiftool = ExifTool::new(&self.exiftool);
        if self.keep_meta || self.meta_only {
            Box::new(exiftool.save_to(&self.meta_file))
        } else {
            Box::new(exiftool)
        }
    }
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact();

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}

/// Logs pipeline events and drives the progress bar.
struct CliReporter {
    bar: ProgressBar,
}

impl CliReporter {
    fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Reporter for CliReporter {
    fn report(&self, event: Event<'_>) {
        match event {
            Event::NothingToProcess { reason } => {
                self.bar.suspend(|| warn!("No files to process: {reason}"));
            }
            Event::Candidate {
                source,
                field,
                value,
                parsed,
            } => {
                self.bar.suspend(|| match parsed {
                    Some(dt) => debug!("{}: {field} = {value} -> {dt}", source.display()),
                    None => debug!("{}: {field} = {value} (unparseable)", source.display()),
                });
            }
            Event::Planned { plan, .. } => {
                self.bar.suspend(|| debug!("{} planned at {}", plan.source.display(), plan.target.display()));
            }
            Event::Collision { source, occupied } => {
                self.bar.suspend(|| {
                    info!("{}: file with same name at {}", source.display(), occupied.display())
                });
            }
            Event::Finished { index, total, entry } => {
                self.bar.set_length(total as u64);
                self.bar.set_position(index as u64 + 1);

                let source = entry.source.display();
                let target = entry
                    .target
                    .as_deref()
                    .map(|t| t.display().to_string())
                    .unwrap_or_else(|| "-".to_string());
                self.bar.suspend(|| match &entry.outcome {
                    Outcome::Copied => info!("Copied {source} -> {target}"),
                    Outcome::Moved => info!("Moved {source} -> {target}"),
                    Outcome::Duplicate => info!("Identical file found {target}, skipped {source}"),
                    Outcome::DryRun(action) => info!("Dry-run {action:?} {source} -> {target}"),
                    Outcome::Failed(err) => warn!("Failed {source} -> {target}: {err}"),
                });
            }
        }
    }
}

fn write_report(path: &Path, result: &OrganizeResult) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create report {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), result)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file.as_deref())?;
    let t_total = std::time::Instant::now();

    let options = cli.options();
    let source = cli.metadata_source();

    if cli.meta_only {
        info!("Running exiftool on {}", options.source.display());
        match source.extract(&options.source, options.recursive) {
            Ok(records) => info!(
                "Saved metadata for {} files to {}",
                records.len(),
                cli.meta_file.display()
            ),
            Err(err) => warn!("No files to process: {err}"),
        }
        return Ok(());
    }

    let bar = ProgressBar::new(0);
    bar.set_style(ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} organizing files")?);
    let reporter = CliReporter::new(bar.clone());

    // Validate before the (slow) exiftool run.
    let organizer = Organizer::new(&options, &reporter)?;
    info!("Reading metadata for {}", options.source.display());
    let records = load_records(source.as_ref(), &options, &reporter);
    let result = if records.is_empty() {
        OrganizeResult::default()
    } else {
        organizer.run(&records)?
    };
    bar.finish_and_clear();

    if let Some(path) = &cli.report {
        write_report(path, &result)?;
    }

    info!(
        "Done! {} files: {} moved, {} copied, {} duplicates, {} dry-run, {} failed, {} without date ({:.2}s)",
        result.total,
        result.moved,
        result.copied,
        result.duplicates,
        result.dry_run,
        result.failed,
        result.no_info,
        t_total.elapsed().as_secs_f64()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use photosort_core::{Action, ReportEntry};
    use tempfile::tempdir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults_map_to_options() {
        let cli = Cli::try_parse_from(["photosort", "in", "out"]).unwrap();
        let options = cli.options();
        assert_eq!(options.source, PathBuf::from("in"));
        assert_eq!(options.destination, PathBuf::from("out"));
        assert_eq!(options.pattern, DEFAULT_PATTERN);
        assert_eq!(options.fields.len(), DEFAULT_FIELDS.len());
        assert_eq!(options.action(), Action::Move);
        assert!(!options.recursive && !options.dry_run);
        assert_eq!(cli.meta_file, PathBuf::from("image_meta.json"));
    }

    #[test]
    fn test_flags_map_to_options() {
        let cli = Cli::try_parse_from([
            "photosort",
            "in",
            "out",
            "-r",
            "-c",
            "--dry-run",
            "--sort",
            "%Y/%m %B",
            "--field",
            "EXIF:DateTimeOriginal",
            "--field",
            "EXIF:CreateDate",
        ])
        .unwrap();
        let options = cli.options();
        assert!(options.recursive && options.copy && options.dry_run);
        assert_eq!(options.pattern, "%Y/%m %B");
        assert_eq!(options.fields, ["EXIF:DateTimeOriginal", "EXIF:CreateDate"]);
    }

    #[test]
    fn test_meta_only_conflicts_with_skip_meta() {
        assert!(Cli::try_parse_from(["photosort", "in", "out", "-m", "--skip-meta"]).is_err());
    }

    #[test]
    fn test_report_written_as_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let result = OrganizeResult {
            total: 1,
            duplicates: 1,
            entries: vec![ReportEntry {
                source: PathBuf::from("in/a.jpg"),
                target: Some(PathBuf::from("out/2012/02/a.jpg")),
                outcome: Outcome::Duplicate,
                field: Some("EXIF:DateTimeOriginal".to_string()),
                timestamp: None,
            }],
            ..OrganizeResult::default()
        };

        write_report(&path, &result).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["duplicates"], 1);
        assert_eq!(value["entries"][0]["outcome"], "duplicate");
        assert_eq!(value["entries"][0]["target"], "out/2012/02/a.jpg");
    }
}
