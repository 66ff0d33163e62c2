use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use search_core::index::build_all;
use search_core::pagerank::{compare_engines, compute_authority, EngineKind};
use search_core::persist::{load_meta, load_store, save_store, IndexPaths};
use search_core::store::MemoryStore;
use search_core::{Config, DocId, LinkGraph, QueryEngine, Strategy};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct InputDoc {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default, alias = "body")]
    content: String,
    #[serde(default)]
    links: Vec<String>,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build a link-aware TF-IDF index, rank it and query it", long_about = None)]
struct Cli {
    /// JSON config file; flags override its values
    #[arg(long, global = true)]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum EngineArg {
    Pregel,
    Mapreduce,
    Both,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest JSON/JSONL documents (file or directory) and build the index
    Build {
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
    },
    /// Compute authority scores and store them in the index
    Rank {
        #[arg(long, default_value = "./index")]
        index: String,
        /// Engine to run; `both` also reports how far the two disagree
        #[arg(long, value_enum)]
        engine: Option<EngineArg>,
        #[arg(long)]
        damping: Option<f64>,
        #[arg(long)]
        max_iterations: Option<u32>,
        #[arg(long)]
        tolerance: Option<f64>,
        /// Number of top documents to print
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    /// Run a query against the index
    Search {
        #[arg(long, default_value = "./index")]
        index: String,
        #[arg(long)]
        query: String,
        /// term or document
        #[arg(long, default_value = "term")]
        strategy: String,
        /// Rank on TF-IDF alone
        #[arg(long, default_value_t = false)]
        no_authority: bool,
        /// Run both strategies and check that they score identically
        #[arg(long, default_value_t = false)]
        compare: bool,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print index statistics
    Stats {
        #[arg(long, default_value = "./index")]
        index: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Build { input, output } => build(&input, &output, &config),
        Commands::Rank { index, engine, damping, max_iterations, tolerance, top } => {
            let mut config = config;
            if let Some(d) = damping { config.pagerank.damping = d; }
            if let Some(m) = max_iterations { config.pagerank.max_iterations = m; }
            if let Some(t) = tolerance { config.pagerank.tolerance = t; }
            config.validate()?;
            rank(&index, engine, &config, top)
        }
        Commands::Search { index, query, strategy, no_authority, compare, limit } => {
            let mut config = config;
            if let Some(l) = limit { config.search.results_per_page = l; }
            config.validate()?;
            search(&index, &query, Strategy::parse_lenient(&strategy), !no_authority, compare, &config)
        }
        Commands::Stats { index } => stats(&index),
    }
}

fn build(input: &str, output: &str, config: &Config) -> Result<()> {
    let files = input_files(Path::new(input));
    if files.is_empty() {
        bail!("no .json or .jsonl files found at {input}");
    }

    let mut docs = Vec::new();
    for file in &files {
        docs.extend(read_docs(file)?);
    }
    let mut store = MemoryStore::new();
    ingest(&mut store, &docs)?;

    let report = build_all(&mut store, &config.stop_words())?;
    let stats = store.stats();
    tracing::info!(
        num_docs = stats.documents,
        num_terms = stats.terms,
        links = stats.links,
        resolved = stats.resolved_links,
        failed = report.failed.len(),
        "ingested documents"
    );

    save_store(&IndexPaths::new(output), &store)?;
    tracing::info!(output, "index build complete");
    Ok(())
}

fn input_files(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

fn read_docs(file: &Path) -> Result<Vec<InputDoc>> {
    let reader = BufReader::new(File::open(file)?);
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut docs = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            docs.push(serde_json::from_str(&line)?);
        }
        return Ok(docs);
    }
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    Ok(match json {
        serde_json::Value::Array(arr) => arr.into_iter().map(serde_json::from_value).collect::<Result<_, _>>()?,
        obj @ serde_json::Value::Object(_) => vec![serde_json::from_value(obj)?],
        _ => Vec::new(),
    })
}

/// Add every document first so links between them resolve, then the links.
fn ingest(store: &mut MemoryStore, docs: &[InputDoc]) -> Result<Vec<DocId>> {
    let ids: Vec<DocId> = docs.iter().map(|d| store.add_document(&d.url, &d.title, &d.content)).collect();
    for (doc, id) in docs.iter().zip(&ids) {
        for link in &doc.links {
            store.add_link(*id, link)?;
        }
    }
    Ok(ids)
}

fn rank(index: &str, engine: Option<EngineArg>, config: &Config, top: usize) -> Result<()> {
    let paths = IndexPaths::new(index);
    let mut store = load_store(&paths)?;

    let kind = match engine {
        Some(EngineArg::Pregel) => EngineKind::Pregel,
        Some(EngineArg::Mapreduce) => EngineKind::MapReduce,
        Some(EngineArg::Both) => {
            let graph = LinkGraph::from_store(&store)?;
            let cmp = compare_engines(&graph, &config.pagerank);
            println!(
                "pregel: {} supersteps (halted: {}), mapreduce: {} iterations (converged: {})",
                cmp.pregel.iteration, cmp.pregel.converged, cmp.mapreduce.iteration, cmp.mapreduce.converged
            );
            println!("max difference {:.3e}, error bound {:.3e}, agree: {}", cmp.max_difference, cmp.bound, cmp.agrees());
            config.engine
        }
        None => config.engine,
    };

    let scores = compute_authority(&mut store, kind, &config.pagerank)?;
    save_store(&paths, &store)?;

    println!("=== Authority ({kind}) after {} iterations, converged: {} ===", scores.iteration, scores.converged);
    for (doc_id, score) in scores.top(top) {
        let (url, title) = store.get(doc_id).map(|d| (d.url.as_str(), d.title.as_str())).unwrap_or(("?", "?"));
        println!("{doc_id:>6}  {score:.6}  {title}  <{url}>");
    }
    Ok(())
}

fn search(index: &str, query: &str, strategy: Strategy, use_authority: bool, compare: bool, config: &Config) -> Result<()> {
    let store = load_store(&IndexPaths::new(index))?;
    let engine = QueryEngine::new(&store, config.search.clone(), config.stop_words())?;

    let hits = engine.search(query, strategy, use_authority)?;
    println!("=== {} results for {query:?} ({strategy}-at-a-time, authority: {use_authority}) ===", hits.len());
    for (rank, hit) in hits.iter().enumerate() {
        println!("\n{}. [{}] {}\n   {}\n   score {:.6}\n   {}", rank + 1, hit.doc_id, hit.title, hit.url, hit.score, hit.snippet);
    }

    if compare {
        let other = match strategy {
            Strategy::TermAtATime => Strategy::DocumentAtATime,
            Strategy::DocumentAtATime => Strategy::TermAtATime,
        };
        let theirs = engine.search(query, other, use_authority)?;
        let pairs = |h: &[search_core::SearchHit]| h.iter().map(|x| (x.doc_id, x.score)).collect::<Vec<_>>();
        println!("\n{strategy} vs {other}: identical = {}", pairs(&hits) == pairs(&theirs));
    }
    Ok(())
}

fn stats(index: &str) -> Result<()> {
    let paths = IndexPaths::new(index);
    let meta = load_meta(&paths)?;
    let store = load_store(&paths)?;
    println!("created_at: {}", meta.created_at);
    println!("{}", serde_json::to_string_pretty(&store.stats())?);
    Ok(())
}
