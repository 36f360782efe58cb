use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustyingest::config::{Config, SourceKind};
use rustyingest::extract::{
    Extractor, Paragraph, ParagraphExtractor, ParagraphPolicy, Section, SectionExtractor,
};
use rustyingest::logging;
use rustyingest::pipeline::{Pipeline, PipelineSettings};
use rustyingest::source::{Enumerator, Fetcher, LocalDirectory, ObjectStore};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "rustyingest",
    about = "Extract paragraphs or Markdown sections from many documents concurrently"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Root directory for the local source.
    #[arg(long, global = true)]
    dir: Option<PathBuf>,
    /// Item source: `local` or `remote`.
    #[arg(long, global = true, value_parser = parse_source)]
    source: Option<SourceKind>,
    /// Descend into subdirectories of the local source.
    #[arg(long, global = true)]
    recursive: bool,
    /// Number of concurrent workers.
    #[arg(long, global = true, value_parser = parse_positive)]
    workers: Option<usize>,
    /// Only process identifiers ending with this suffix.
    #[arg(long, global = true)]
    suffix: Option<String>,
    /// Maximum number of buffered units.
    #[arg(long, global = true, value_parser = parse_positive)]
    buffer: Option<usize>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Emit one record per plain-text paragraph.
    Paragraphs,
    /// Emit one record per Markdown heading section.
    Sections,
}

impl Command {
    fn default_suffix(self) -> &'static str {
        match self {
            Self::Paragraphs => ".txt",
            Self::Sections => ".md",
        }
    }
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.dir {
            config.local_dir = dir.clone();
        }
        if let Some(source) = self.source {
            config.source = source;
        }
        if self.recursive {
            config.recursive = true;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.buffer.is_some() {
            config.buffer_capacity = self.buffer;
        }
    }
}

#[derive(Serialize)]
struct Record<'a, U> {
    fingerprint: String,
    #[serde(flatten)]
    unit: &'a U,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load().context("Failed to load configuration")?;
    logging::init_tracing(&config.log_file);
    cli.apply(&mut config);

    let suffix = cli
        .suffix
        .clone()
        .unwrap_or_else(|| cli.command.default_suffix().to_string());
    let settings = config.pipeline_settings(suffix);

    match config.source {
        SourceKind::Local => {
            let source = Arc::new(
                LocalDirectory::new(config.local_dir.clone()).recursive(config.recursive),
            );
            dispatch(cli.command, source, ParagraphPolicy::BlankLine, settings).await
        }
        SourceKind::Remote => {
            let store = ObjectStore::new(config.object_store_settings()?)
                .context("Failed to build object store client")?;
            dispatch(cli.command, Arc::new(store), ParagraphPolicy::DoubleBreak, settings).await
        }
    }
}

async fn dispatch<S>(
    command: Command,
    source: Arc<S>,
    policy: ParagraphPolicy,
    settings: PipelineSettings,
) -> Result<()>
where
    S: Enumerator + Fetcher + 'static,
{
    match command {
        Command::Paragraphs => {
            ingest(source, ParagraphExtractor::new(policy), settings, Paragraph::fingerprint).await
        }
        Command::Sections => {
            ingest(source, SectionExtractor::new(), settings, Section::fingerprint).await
        }
    }
}

async fn ingest<S, E>(
    source: Arc<S>,
    extractor: E,
    settings: PipelineSettings,
    fingerprint: fn(&E::Unit) -> String,
) -> Result<()>
where
    S: Enumerator + Fetcher + 'static,
    E: Extractor,
    E::Unit: Serialize,
{
    let pipeline = Pipeline::new(Arc::clone(&source), extractor, settings)?;
    let mut run = pipeline
        .run_from(source.as_ref())
        .await
        .context("Failed to start pipeline")?;

    let mut out = BufWriter::new(std::io::stdout());
    while let Some(unit) = run.next().await {
        let record = Record {
            fingerprint: fingerprint(&unit),
            unit: &unit,
        };
        serde_json::to_writer(&mut out, &record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    let report = run.finish().await;
    tracing::info!(
        items = report.items_total,
        completed = report.counts.items_completed,
        failed = report.counts.items_failed,
        units = report.counts.units_emitted,
        workers = report.workers,
        elapsed_ms = report.elapsed_ms,
        "Ingestion finished"
    );
    Ok(())
}

fn parse_source(value: &str) -> Result<SourceKind, String> {
    value
        .parse()
        .map_err(|()| format!("unknown source '{value}', expected 'local' or 'remote'"))
}

fn parse_positive(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(format!("expected a positive integer, got '{value}'")),
    }
}
