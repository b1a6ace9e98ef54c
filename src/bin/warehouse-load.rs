//! CLI binary for loading JSON batches into the warehouse

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use warehouse_loader::config::{CONFIG_FILENAME, LoaderConfig, sample_config};
use warehouse_loader::{
    Batch, DuckDbStore, LoadContext, LoadOrchestrator, LoadSummary, SchemaRegistry, TableBatch,
};

#[derive(Parser)]
#[command(name = "warehouse-load")]
#[command(about = "Load transformed batches into a star-schema warehouse")]
#[command(version)]
struct Cli {
    /// Workspace directory holding .warehouse-loader.toml
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sample configuration file to the workspace
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },
    /// Load every `<table>.json` file in a directory
    Load {
        /// Directory of JSON files, each an array of row objects
        input: PathBuf,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the DDL of every table in the schema
    Schema,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => handle_init(&cli.workspace, force),
        Commands::Load { input, json } => handle_load(&cli.workspace, &input, json),
        Commands::Schema => handle_schema(&cli.workspace),
    }
}

fn handle_init(workspace: &Path, force: bool) -> Result<()> {
    let path = workspace.join(CONFIG_FILENAME);
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    std::fs::write(&path, sample_config())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn load_registry(workspace: &Path, config: &LoaderConfig) -> Result<SchemaRegistry> {
    match config.get_schema_path(workspace) {
        Some(path) => SchemaRegistry::load(&path)
            .with_context(|| format!("Failed to load schema {}", path.display())),
        None => Ok(SchemaRegistry::sample()?),
    }
}

fn handle_schema(workspace: &Path) -> Result<()> {
    let config = LoaderConfig::load(workspace)?;
    let registry = load_registry(workspace, &config)?;

    for table in registry.tables() {
        println!("-- {} ({})", table.name, table.kind);
        println!("{}\n", registry.create_table_sql(&table.name)?);
    }
    Ok(())
}

fn read_batches(input: &Path) -> Result<Vec<TableBatch>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(input)
        .with_context(|| format!("Failed to read {}", input.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut batches = Vec::with_capacity(files.len());
    for path in files {
        let Some(table) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let rows: Vec<serde_json::Value> = serde_json::from_str(&content)
            .with_context(|| format!("{} is not a JSON array", path.display()))?;
        batches.push(TableBatch::new(table, Batch::from_json_rows(&rows)?));
    }
    Ok(batches)
}

fn print_summary(summary: &LoadSummary) {
    println!("Run:            {}", summary.run_id);
    println!("Tables loaded:  {}", summary.tables_loaded);
    println!("Rows loaded:    {}", summary.rows_loaded);
    println!("Rows updated:   {}", summary.rows_updated);
    println!("Rows skipped:   {}", summary.rows_skipped);
    println!("Duration:       {} ms", summary.duration_ms);

    for table in &summary.tables {
        println!(
            "  {:<24} {:<9} loaded {:>6}  updated {:>6}  skipped {:>6}",
            table.table,
            table.kind.to_string(),
            table.rows_loaded,
            table.rows_updated,
            table.rows_skipped
        );
        for issue in &table.issues {
            println!("    row {}: {}", issue.row, issue.message);
        }
    }
}

fn handle_load(workspace: &Path, input: &Path, json: bool) -> Result<()> {
    let config = LoaderConfig::load(workspace)?;
    let registry = load_registry(workspace, &config)?;
    let batches = read_batches(input)?;
    if batches.is_empty() {
        bail!("No .json batches found in {}", input.display());
    }

    let store = DuckDbStore::new(config.get_duckdb_path(workspace))?;
    let ctx = LoadContext::new(&store, &registry).with_settings(config.load_settings());

    match LoadOrchestrator::new(&ctx).run(&batches) {
        Ok(summary) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
            Ok(())
        }
        Err(failure) => {
            print_summary(&failure.summary);
            Err(failure.into())
        }
    }
}
