use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use search_core::persist::{load_snapshot, save_snapshot};
use search_core::{Artifact, FuzzyOptions, IndexingError, SearchIndex, SearchOptions};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and query search index snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a snapshot from JSON/JSONL artifact files or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output snapshot path (.bin for bincode, otherwise JSON)
        #[arg(long)]
        output: String,
    },
    /// Run a query against a snapshot and print the results as JSON
    Search {
        #[arg(long)]
        snapshot: String,
        #[arg(long)]
        q: String,
        #[arg(long, value_enum, default_value_t = Mode::Exact)]
        mode: Mode,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print index statistics for a snapshot
    Stats {
        #[arg(long)]
        snapshot: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Exact,
    Advanced,
    Fuzzy,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output } => build_index(&input, &output),
        Commands::Search { snapshot, q, mode, limit } => {
            let index = open_snapshot(&snapshot)?;
            let options = SearchOptions { limit: limit.max(1), ..Default::default() };
            let results = match mode {
                Mode::Exact => index.search(&q, &options),
                Mode::Advanced => index.advanced_search(&q, &options),
                Mode::Fuzzy => index.fuzzy_search(&q, &FuzzyOptions { search: options, ..Default::default() }),
            };
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Commands::Stats { snapshot } => {
            let index = open_snapshot(&snapshot)?;
            println!("{}", serde_json::to_string_pretty(&index.stats())?);
            Ok(())
        }
    }
}

fn open_snapshot(path: &str) -> Result<SearchIndex> {
    let snapshot = load_snapshot(path).with_context(|| format!("reading snapshot {path}"))?;
    let mut index = SearchIndex::new();
    index.import_snapshot(snapshot)?;
    Ok(index)
}

fn build_index(input: &str, output: &str) -> Result<()> {
    let input_path = Path::new(input);

    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    } else {
        anyhow::bail!("input path {input} does not exist");
    }
    files.sort();

    let mut artifacts = Vec::new();
    let mut failures: Vec<IndexingError> = Vec::new();
    for file in files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file, &mut artifacts, &mut failures)?;
        } else {
            read_json(&file, &mut artifacts, &mut failures)?;
        }
    }

    let mut index = SearchIndex::new();
    let report = index.index_batch(artifacts);
    failures.extend(report.errors);
    for failure in &failures {
        tracing::warn!(id = %failure.id, error = %failure.error, "skipped artifact");
    }
    let stats = index.stats();
    tracing::info!(
        num_docs = stats.total_artifacts,
        num_terms = stats.total_terms,
        failed = failures.len(),
        "ingested artifacts"
    );

    save_snapshot(output, &index.export_snapshot())?;
    tracing::info!(output, "snapshot written");
    Ok(())
}

fn read_jsonl(file: &Path, artifacts: &mut Vec<Artifact>, failures: &mut Vec<IndexingError>) -> Result<()> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        match serde_json::from_str::<Artifact>(&line) {
            Ok(artifact) => artifacts.push(artifact),
            Err(err) => failures.push(IndexingError {
                id: format!("{}:{}", file.display(), lineno + 1),
                error: err.to_string(),
            }),
        }
    }
    Ok(())
}

fn read_json(file: &Path, artifacts: &mut Vec<Artifact>, failures: &mut Vec<IndexingError>) -> Result<()> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    let json: serde_json::Value = serde_json::from_reader(reader)
        .with_context(|| format!("parsing {}", file.display()))?;
    let values = match json {
        serde_json::Value::Array(arr) => arr,
        obj @ serde_json::Value::Object(_) => vec![obj],
        _ => Vec::new(),
    };
    for (pos, v) in values.into_iter().enumerate() {
        match serde_json::from_value::<Artifact>(v) {
            Ok(artifact) => artifacts.push(artifact),
            Err(err) => failures.push(IndexingError {
                id: format!("{}[{pos}]", file.display()),
                error: err.to_string(),
            }),
        }
    }
    Ok(())
}
