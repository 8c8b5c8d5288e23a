use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use search_core::document::{read_json, read_jsonl};
use search_core::persist::{save_index_set, IndexPaths};
use search_core::{DocStore, Document, IndexSet, MatchMode, RankingWeights, SearchEngine, SynonymTable, DEFAULT_ATTRIBUTES, DEFAULT_TOP_K};
use serde_json::{Map, Value};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

mod enrich;

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build product search indexes from crawled JSONL and query them offline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add `id_product` and `variant` fields derived from each record's URL
    Enrich {
        /// Input JSONL file
        #[arg(long)]
        input: PathBuf,
        /// Output JSONL file
        #[arg(long)]
        output: PathBuf,
    },
    /// Build the index artifacts from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Output index directory
        #[arg(long)]
        output: PathBuf,
        /// Attributes to index (comma separated)
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_ATTRIBUTES.iter().map(|s| s.to_string()).collect::<Vec<_>>())]
        attributes: Vec<String>,
        /// Build in parallel over this many shards (1 = sequential)
        #[arg(long, default_value_t = 1)]
        shards: usize,
    },
    /// Run one query against a built index and print or save the JSON response
    Search {
        /// Index directory
        #[arg(long, default_value = "./index")]
        index: PathBuf,
        /// Synonym table (JSON object: term -> alternates)
        #[arg(long)]
        synonyms: Option<PathBuf>,
        /// Ranking weights override (JSON)
        #[arg(long)]
        weights: Option<PathBuf>,
        #[arg(long)]
        query: String,
        /// any | all
        #[arg(long, default_value = "any")]
        mode: MatchMode,
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Write the response here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Enrich { input, output } => enrich_file(&input, &output),
        Commands::Build { input, output, attributes, shards } => build_index(&input, &output, &attributes, shards),
        Commands::Search { index, synonyms, weights, query, mode, top_k, out } => {
            let engine = open_engine(&index, synonyms.as_deref(), weights.as_deref())?;
            let response = engine.search(&query, mode, top_k);
            let json = serde_json::to_string_pretty(&response)?;
            match out {
                Some(path) => {
                    if let Some(dir) = path.parent() {
                        fs::create_dir_all(dir)?;
                    }
                    fs::write(&path, json)?;
                    tracing::info!(path = %path.display(), hits = response.ranked_results.len(), "search results saved");
                }
                None => println!("{json}"),
            }
            Ok(())
        }
    }
}

/// Load synonyms and weights, then the index itself. Any failure here is fatal.
fn open_engine(index: &Path, synonyms: Option<&Path>, weights: Option<&Path>) -> Result<SearchEngine> {
    let synonyms = match synonyms {
        Some(path) => SynonymTable::load(path)?,
        None => SynonymTable::default(),
    };
    let weights = match weights {
        Some(path) => RankingWeights::load(path)?,
        None => RankingWeights::default(),
    };
    SearchEngine::open(&IndexPaths::new(index), synonyms, weights)
        .with_context(|| format!("loading index from {}", index.display()))
}

fn collect_inputs(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

fn load_documents(input: &Path) -> Result<Vec<Document>> {
    let files = collect_inputs(input);
    anyhow::ensure!(!files.is_empty(), "no .json or .jsonl input found at {}", input.display());
    let mut documents = Vec::new();
    for file in files {
        let docs = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file)
        } else {
            read_json(&file)
        }
        .with_context(|| format!("reading {}", file.display()))?;
        tracing::info!(file = %file.display(), records = docs.len(), "ingested file");
        documents.extend(docs);
    }
    Ok(documents)
}

fn build_index(input: &Path, output: &Path, attributes: &[String], shards: usize) -> Result<()> {
    let documents = load_documents(input)?;
    let indexes = if shards > 1 {
        IndexSet::build_parallel(&documents, attributes, shards)
    } else {
        IndexSet::build(&documents, attributes)
    };
    let docs = DocStore::from_documents(&documents);
    let meta = save_index_set(&IndexPaths::new(output), &indexes, &docs)?;
    tracing::info!(output = %output.display(), num_docs = meta.num_docs, records = documents.len(), "index build complete");
    Ok(())
}

fn enrich_file(input: &Path, output: &Path) -> Result<()> {
    if let Some(dir) = output.parent() {
        fs::create_dir_all(dir)?;
    }
    let reader = BufReader::new(File::open(input).with_context(|| format!("opening {}", input.display()))?);
    let mut out = BufWriter::new(File::create(output)?);
    let mut written = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut record: Map<String, Value> = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(line = line_no + 1, %err, "skipping malformed record");
                continue;
            }
        };
        let url = record.get("url").and_then(Value::as_str).unwrap_or_default().to_string();
        let (id_product, variant) = enrich::product_identity(&url);
        record.insert("id_product".into(), id_product);
        record.insert("variant".into(), Value::String(variant));
        serde_json::to_writer(&mut out, &record)?;
        out.write_all(b"\n")?;
        written += 1;
    }
    out.flush()?;
    tracing::info!(output = %output.display(), written, "enriched records");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn enrich_adds_identity_and_skips_bad_lines() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("products.jsonl");
        let output = dir.path().join("out/enriched.jsonl");
        fs::write(
            &input,
            concat!(
                r#"{"url":"https://web-scraping.dev/product/4?variant=orange-large","title":"Box"}"#,
                "\nnot json\n\n",
                r#"{"url":"https://web-scraping.dev/products","title":"Listing"}"#,
                "\n"
            ),
        )
        .unwrap();

        enrich_file(&input, &output).unwrap();
        let lines: Vec<Value> = fs::read_to_string(&output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id_product"], 4);
        assert_eq!(lines[0]["variant"], "orange-large");
        assert_eq!(lines[0]["title"], "Box");
        assert_eq!(lines[1]["id_product"], "No id");
        assert_eq!(lines[1]["variant"], "No variant");
    }

    #[test]
    fn build_then_search_from_a_directory() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("data");
        fs::create_dir_all(input.join("nested")).unwrap();
        fs::write(
            input.join("a.jsonl"),
            r#"{"url":"u1","title":"Red Sneakers","description":"light","product_features":{"brand":"Acme"}}"#,
        )
        .unwrap();
        fs::write(input.join("nested/b.json"), r#"[{"url":"u2","title":"Boots","description":"warm"}]"#).unwrap();
        fs::write(input.join("notes.txt"), "ignored").unwrap();

        let index = dir.path().join("index");
        build_index(&input, &index, &["brand".to_string()], 2).unwrap();

        let engine = open_engine(&index, None, None).unwrap();
        assert_eq!(engine.corpus_size(), 2);
        let response = engine.search("acme boots", MatchMode::Any, DEFAULT_TOP_K);
        let ids: Vec<&str> = response.ranked_results.iter().map(|h| h.document_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"u1") && ids.contains(&"u2"));
    }

    #[test]
    fn empty_input_directory_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(build_index(dir.path(), &dir.path().join("index"), &[], 1).is_err());
    }
}
