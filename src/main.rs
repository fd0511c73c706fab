// 🎮 Movedex CLI - Move container generation and learnset build
// Thin driver: reads the files, runs the library engines, writes artifacts
// only after every fatal check has passed.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use movedex_builder::{
    build_learnsets, build_move_prompt, carry_forward_reviews, container_names, file_digest,
    load_distribution_records, load_move_records, load_roster, merge_entries,
    parse_move_container, read_review_list, select_records, write_learnset_table,
    write_move_container, write_review_list, GeminiClient, GenerationPipeline,
    GenerationSettings, KeyedEntry, Overrides, Provenance, Selection,
};

/// Build the move database and learnset table from spreadsheet exports
#[derive(Parser, Debug)]
#[command(name = "movedex")]
#[command(version)]
struct Cli {
    /// Maintainer override tables (moves, species, duplicates)
    #[arg(long, default_value = "overrides.toml", global = true)]
    overrides: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate move DSL entries with the text generator
    Moves(MovesArgs),
    /// Build per-species learnsets from the distribution sheet
    Learnsets(LearnsetArgs),
}

#[derive(Args, Debug)]
struct MovesArgs {
    /// Move spreadsheet export
    #[arg(long, default_value = "move_data.csv")]
    csv: PathBuf,

    /// Move container to merge into and overwrite
    #[arg(long, default_value = "data/moves/index.js")]
    output: PathBuf,

    /// Manual review list (rewritten each run; rows not re-run keep their entries)
    #[arg(long, default_value = "data/moves/manual_review.json")]
    review: PathBuf,

    /// Only process the row with this display name
    #[arg(long)]
    single: Option<String>,

    /// Regenerate rows already present in the container
    #[arg(long)]
    all: bool,

    /// Build requests without calling the generator or writing files
    #[arg(long)]
    dry_run: bool,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "MOVEDEX_MODEL", default_value = "gemini-2.0-flash")]
    model: String,

    #[arg(long, default_value_t = 10)]
    concurrency: usize,

    /// Attempts per record when rate-limited
    #[arg(long, default_value_t = 5)]
    max_attempts: usize,

    #[arg(long, default_value_t = 10)]
    cooldown_secs: u64,

    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    #[arg(long, default_value_t = 2048)]
    max_output_tokens: u32,
}

#[derive(Args, Debug)]
struct LearnsetArgs {
    /// Distribution spreadsheet export
    #[arg(long, default_value = "技制限.csv")]
    csv: PathBuf,

    /// Move spreadsheet export (row order must match the container)
    #[arg(long, default_value = "move_data.csv")]
    move_csv: PathBuf,

    /// Generated move container
    #[arg(long, default_value = "data/moves/index.js")]
    moves: PathBuf,

    /// Species roster JSON (`[{ "id", "name" }]`)
    #[arg(long, default_value = "data/species.json")]
    roster: PathBuf,

    #[arg(long, default_value = "data/learnsets/index.js")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "movedex=info,movedex_builder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let overrides = Overrides::load(&cli.overrides)?;

    match cli.command {
        Command::Moves(args) => run_moves(args).await,
        Command::Learnsets(args) => run_learnsets(args, &overrides),
    }
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Existing container entries; empty when there is no container yet
fn load_existing_container(path: &Path) -> Result<Vec<KeyedEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_move_container(&text)
        .with_context(|| format!("Could not locate moves object in {}", path.display()))
}

async fn run_moves(args: MovesArgs) -> Result<()> {
    let records = load_move_records(&args.csv)?;
    let existing = load_existing_container(&args.output)?;
    let existing_names: HashSet<String> = container_names(&existing);
    let previous_review = read_review_list(&args.review)?;
    info!(rows = records.len(), existing = existing.len(), "Loaded move sources");

    let selection = match (&args.single, args.all) {
        (Some(name), _) => Selection::Single(name.clone()),
        (None, true) => Selection::All,
        (None, false) => Selection::Missing,
    };
    let selected = select_records(&records, &existing_names, &selection);
    if selected.is_empty() {
        println!("✨ No new moves to process");
        return Ok(());
    }
    info!(selected = selected.len(), ?selection, "Selected rows for generation");

    if args.dry_run {
        for record in &selected {
            let prompt = build_move_prompt(record, &existing);
            info!(move_name = %record.display_name(), prompt_len = prompt.len(), "Dry run: request built");
        }
        println!("🏃 Dry run: {} requests built, nothing written", selected.len());
        return Ok(());
    }

    let api_key = args
        .api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow!("GEMINI_API_KEY environment variable is not set"))?;

    let client = GeminiClient::new(api_key, args.model.clone(), Duration::from_secs(args.timeout_secs))?
        .with_sampling(args.temperature, args.max_output_tokens);
    let settings = GenerationSettings {
        concurrency: args.concurrency,
        max_attempts: args.max_attempts,
        cooldown: Duration::from_secs(args.cooldown_secs),
    };
    let pipeline = GenerationPipeline::new(Arc::new(client), settings).with_examples(existing.clone());

    let report = pipeline.run(&selected).await;
    let merged = merge_entries(&records, existing, report.accepted_by_name());
    let review = carry_forward_reviews(&records, previous_review, &report);

    let provenance = Provenance::new(&source_name(&args.csv), Some(file_digest(&args.csv)?));
    write_move_container(&args.output, &merged, &provenance)?;
    write_review_list(&args.review, &review)?;
    info!(entries = merged.len(), review = review.len(), "Move container written");

    println!("✅ {}", report.summary());
    println!("   Wrote {} moves to {}", merged.len(), args.output.display());
    println!("   Manual review list: {} ({} entries)", args.review.display(), review.len());
    Ok(())
}

fn run_learnsets(args: LearnsetArgs, overrides: &Overrides) -> Result<()> {
    let distribution = load_distribution_records(&args.csv)?;
    let move_rows = load_move_records(&args.move_csv)?;
    let container = fs::read_to_string(&args.moves)
        .with_context(|| format!("Missing generated moves: {}", args.moves.display()))?;
    let roster = load_roster(&args.roster)?;

    let result = build_learnsets(&container, &move_rows, &distribution, &roster, overrides)?;

    let provenance = Provenance::new(&source_name(&args.csv), Some(file_digest(&args.csv)?));
    write_learnset_table(&args.output, &result.learnsets, &provenance)?;
    info!(
        species = result.species_count(),
        skipped_moves = result.missing_moves.len(),
        "Learnset table written"
    );

    println!(
        "✅ Wrote learnsets for {} species to {}",
        result.species_count(),
        args.output.display()
    );
    if !result.missing_moves.is_empty() {
        println!(
            "⚠️  Skipped {} moves not present in the move container: {}",
            result.missing_moves.len(),
            result.missing_moves.join(", ")
        );
    }
    Ok(())
}
