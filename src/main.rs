use caseindex::classifier::StaticFacts;
use caseindex::cli::batch::{evaluate, run_batch};
use caseindex::cli::{parse_category, AppContext, Cli, Commands, ConfigAction};
use caseindex::config::{Config, ConfigValidator};
use caseindex::embedding::{EmbeddingBackfill, EmbeddingProvider, FastEmbedProvider};
use caseindex::error::{CaseIndexError, Result};
use caseindex::model::QueryResult;
use caseindex::query::StatuteReference;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    // Parse first so --verbose can raise the log level
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Config { action } => {
            cmd_config(cli.config, cli.profile, action)?;
        }
        command => {
            let config = load_config(cli.config, cli.profile)?;
            let context = AppContext::open(config)?;
            run_command(&context, command)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "caseindex=debug" } else { "caseindex=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_command(context: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Build => cmd_build(context),
        Commands::Query {
            text,
            category,
            k,
            statutes,
            json,
        } => cmd_query(context, &text, category.as_deref(), k, statutes, json),
        Commands::Classify {
            narrative,
            facts,
            facts_text,
            json,
        } => cmd_classify(context, &narrative, facts, facts_text, json),
        Commands::Batch { input, output, k } => cmd_batch(context, &input, output, k),
        Commands::Evaluate { input, json } => cmd_evaluate(context, &input, json),
        Commands::Embed => cmd_embed(context),
        Commands::Stats => cmd_stats(context),
        Commands::Config { .. } => Ok(()),
    }
}

fn cmd_build(context: &AppContext) -> Result<()> {
    let partitions = context.manager.build_all_partitions()?;

    println!("✓ Built {} partitions", partitions.len());
    for (key, partition) in &partitions {
        println!("  {:<40} {:>6} cases", key.to_string(), partition.len());
    }
    Ok(())
}

fn cmd_query(
    context: &AppContext,
    text: &str,
    category: Option<&str>,
    k: Option<usize>,
    statutes: bool,
    json: bool,
) -> Result<()> {
    let engine = context.query_engine(embedder(&context.config)?);
    let k = k.unwrap_or(context.config.query.default_k);

    let results = match category {
        Some(value) => engine.query_by_category(text, parse_category(value)?, k)?,
        None => engine.query_global(text, k)?,
    };

    let references = if statutes {
        engine.statutes_for(&results)?
    } else {
        Vec::new()
    };

    print_query(&results, &references, json)
}

fn print_query(results: &[QueryResult], statutes: &[StatuteReference], json: bool) -> Result<()> {
    if json {
        let value = serde_json::json!({
            "results": results,
            "statutes": statutes,
        });
        println!("{}", to_pretty_json(&value)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No matching cases");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        println!(
            "{:>2}. case {} (distance {:.4})",
            rank + 1,
            result.case_id,
            result.distance
        );
        println!("    {}", result.text);
    }

    if !statutes.is_empty() {
        println!("\nCited statutes:");
        for reference in statutes {
            println!("  case {}: {}", reference.case_id, reference.statutes);
        }
    }
    Ok(())
}

fn cmd_classify(
    context: &AppContext,
    narrative: &str,
    facts: Option<PathBuf>,
    facts_text: Option<String>,
    json: bool,
) -> Result<()> {
    let extraction = match (facts, facts_text) {
        (Some(path), _) => read_to_string(&path)?,
        (None, Some(text)) => text,
        (None, None) => {
            return Err(CaseIndexError::InvalidQuery(
                "Provide the extraction text with --facts or --facts-text".to_string(),
            ))
        }
    };

    let engine = Arc::new(context.query_engine(embedder(&context.config)?));
    let classifier = context.classifier(engine, Arc::new(StaticFacts::new(extraction)))?;
    let classification = classifier.classify_detailed(narrative)?;

    if json {
        println!("{}", to_pretty_json(&classification)?);
    } else {
        println!("{}", classification.category);
        for (category, score) in &classification.scores {
            println!("  {:<40} {:.2}", category.to_string(), score);
        }
    }
    Ok(())
}

fn cmd_batch(
    context: &AppContext,
    input: &Path,
    output: Option<PathBuf>,
    k: Option<usize>,
) -> Result<()> {
    let engine = Arc::new(context.query_engine(embedder(&context.config)?));
    // Every batch record carries its own extraction text
    let classifier = context.classifier(engine.clone(), Arc::new(StaticFacts::new("")))?;
    let k = k.unwrap_or(context.config.query.default_k);
    let reader = BufReader::new(open_file(input)?);

    let summary = match output {
        Some(path) => {
            let file = File::create(&path).map_err(|e| CaseIndexError::Io {
                source: e,
                context: format!("Failed to create output file: {}", path.display()),
            })?;
            let mut writer = BufWriter::new(file);
            let summary = run_batch(reader, &mut writer, &classifier, &engine, k)?;
            writer.flush().map_err(|e| CaseIndexError::Io {
                source: e,
                context: format!("Failed to flush output file: {}", path.display()),
            })?;
            summary
        }
        None => run_batch(reader, std::io::stdout().lock(), &classifier, &engine, k)?,
    };

    eprintln!(
        "✓ Batch complete: {} succeeded, {} failed",
        summary.succeeded, summary.failed
    );
    Ok(())
}

fn cmd_evaluate(context: &AppContext, input: &Path, json: bool) -> Result<()> {
    let engine = Arc::new(context.query_engine(embedder(&context.config)?));
    let classifier = context.classifier(engine, Arc::new(StaticFacts::new("")))?;
    let report = evaluate(BufReader::new(open_file(input)?), &classifier)?;

    if json {
        println!("{}", to_pretty_json(&report)?);
        return Ok(());
    }

    println!("Evaluation ({:?} strategy)", classifier.strategy());
    println!("==========");
    println!(
        "Accuracy: {:.2}% ({}/{}, {} failed)",
        report.accuracy * 100.0,
        report.correct,
        report.total,
        report.failed
    );
    for (category, tally) in &report.per_category {
        println!(
            "  {:<40} {}/{}",
            category.to_string(),
            tally.correct,
            tally.expected
        );
    }
    Ok(())
}

fn cmd_embed(context: &AppContext) -> Result<()> {
    let backfill = EmbeddingBackfill::new(
        embedder(&context.config)?,
        context.store.clone(),
        context.config.embedding.batch_size,
    );
    let result = backfill.run()?;

    println!(
        "✓ Embedded {} cases ({} failed) in {}ms",
        result.processed, result.failed, result.duration_ms
    );
    if result.processed > 0 {
        println!("  Run 'caseindex build' to refresh the partition indexes");
    }
    Ok(())
}

fn cmd_stats(context: &AppContext) -> Result<()> {
    let stats = context.store.stats()?;
    let persisted = context.manager.list_persisted()?;

    println!("caseindex Status");
    println!("================");
    println!("\nCases: {} ({} embedded)", stats.case_count, stats.embedded_count);
    for (category, count) in &stats.by_category {
        println!("  {:<40} {:>6}", category.to_string(), count);
    }

    println!(
        "\nPersisted partitions: {} in {}",
        persisted.len(),
        context.manager.index_dir().display()
    );
    for key in persisted {
        println!("  {}", key);
    }
    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path, profile)?;
            println!("{}", to_pretty_json(&config)?);
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CaseIndexError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'caseindex config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        return Ok(config);
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load(&path),
    }
}

fn embedder(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(FastEmbedProvider::new(&config.embedding.model)?))
}

fn open_file(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| CaseIndexError::Io {
        source: e,
        context: format!("Failed to open {}", path.display()),
    })
}

fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| CaseIndexError::Io {
        source: e,
        context: format!("Failed to read {}", path.display()),
    })
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| CaseIndexError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })
}
