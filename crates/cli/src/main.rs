use anyhow::{Context as AnyhowContext, Result};
use clap::{Parser, Subcommand};
use duchain::{read_lock, DeclarationKindTag, Severity};
use duchain_builder::LanguageFlags;
use duchain_indexer::{Indexer, IndexerConfig, JobOutcome, ParseJob};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "duchain")]
#[command(about = "Incremental semantic index for C sources", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for output)
    #[arg(long, global = true)]
    quiet: bool,

    /// Emit machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Upper bound on concurrent parse jobs
    #[arg(long, global = true, default_value_t = 4)]
    jobs: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Index every C source under a directory and print statistics
    Index {
        /// Project root to scan
        path: PathBuf,
    },
    /// Index one file and list its declarations
    Symbols {
        /// C source file
        file: PathBuf,
    },
    /// Index one file and list its problems
    Problems {
        /// C source file
        file: PathBuf,

        /// Also report names that do not resolve
        #[arg(long)]
        unresolved: bool,
    },
}

#[derive(Serialize)]
struct SymbolRow {
    name: String,
    kind: &'static str,
    line: u32,
    column: u32,
    definition: bool,
}

#[derive(Serialize)]
struct ProblemRow {
    severity: &'static str,
    message: String,
    line: u32,
    column: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match &cli.command {
        Commands::Index { path } => index(&cli, path).await,
        Commands::Symbols { file } => symbols(&cli, file, false).await,
        Commands::Problems { file, unresolved } => problems(&cli, file, *unresolved).await,
    }
}

fn indexer_for(cli: &Cli, report_unresolved: bool) -> Indexer {
    Indexer::new(IndexerConfig {
        parallelism: cli.jobs.max(1),
        flags: LanguageFlags::default(),
        report_unresolved,
    })
}

async fn index(cli: &Cli, path: &PathBuf) -> Result<()> {
    let indexer = indexer_for(cli, false);
    let stats = indexer
        .index_all(path)
        .await
        .with_context(|| format!("indexing {}", path.display()))?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("documents:    {}", stats.documents);
        println!("contexts:     {}", stats.contexts);
        println!("declarations: {}", stats.declarations);
        println!("uses:         {}", stats.uses);
        println!("problems:     {}", stats.problems);
        for error in &stats.errors {
            println!("error: {error}");
        }
    }
    Ok(())
}

async fn index_one(indexer: &Indexer, file: &PathBuf) -> Result<String> {
    let document = file.to_string_lossy().into_owned();
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    indexer.open_document(&document, content);
    let outcome = indexer.run_job(&ParseJob::new(document.clone())).await?;
    debug_assert!(matches!(outcome, JobOutcome::Completed { .. }));
    Ok(document)
}

async fn symbols(cli: &Cli, file: &PathBuf, report_unresolved: bool) -> Result<()> {
    let indexer = indexer_for(cli, report_unresolved);
    let document = index_one(&indexer, file).await?;
    let top = indexer.top_context(&document)?;
    let top = read_lock(&top);
    let rows: Vec<SymbolRow> = top
        .declarations()
        .map(|(_, decl)| SymbolRow {
            name: decl.identifier.to_string(),
            kind: kind_name(decl.kind_tag()),
            line: decl.range.start.line + 1,
            column: decl.range.start.column + 1,
            definition: decl.is_definition,
        })
        .collect();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            let marker = if row.definition { "def" } else { "   " };
            println!("{}:{}\t{}\t{}\t{}", row.line, row.column, marker, row.kind, row.name);
        }
    }
    Ok(())
}

async fn problems(cli: &Cli, file: &PathBuf, unresolved: bool) -> Result<()> {
    let indexer = indexer_for(cli, unresolved);
    let document = index_one(&indexer, file).await?;
    let rows: Vec<ProblemRow> = indexer
        .problems_for(&document)
        .into_iter()
        .map(|p| ProblemRow {
            severity: severity_name(p.severity),
            message: p.message,
            line: p.range.start.line + 1,
            column: p.range.start.column + 1,
        })
        .collect();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("no problems");
    } else {
        for row in &rows {
            println!("{}:{}\t{}\t{}", row.line, row.column, row.severity, row.message);
        }
    }
    Ok(())
}

fn kind_name(tag: DeclarationKindTag) -> &'static str {
    match tag {
        DeclarationKindTag::Type => "type",
        DeclarationKindTag::ForwardType => "forward",
        DeclarationKindTag::Instance => "variable",
        DeclarationKindTag::Function => "function",
        DeclarationKindTag::NamespaceAlias => "namespace-alias",
        DeclarationKindTag::Alias => "typedef",
    }
}

fn severity_name(severity: Severity) -> &'static str {
    match severity {
        Severity::Hint => "hint",
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}
