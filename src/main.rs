use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use war_intel::config::AppConfig;
use war_intel::engine::WarIntelligenceEngine;
use war_intel::models::{
    WarIntelligenceMetrics, WarIntelligenceOptions, WarIntelligenceResult, WarSummary,
};
use war_intel::storage::{self, JsonlSource, StorageConfig};

/// Config file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_PATH: &str = "./war-intel.toml";

#[derive(Parser)]
#[command(name = "war-intel")]
#[command(about = "War performance intelligence for clan dashboards")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory path (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct QueryArgs {
    /// Clan tag, with or without the leading '#'
    #[arg(long)]
    clan: String,

    /// Look-back window in days
    #[arg(long)]
    days_back: Option<u32>,

    /// Minimum wars for a player to be ranked
    #[arg(long)]
    min_wars: Option<u32>,

    /// Evaluate as of this instant (RFC 3339) instead of now
    #[arg(long)]
    as_of: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank the clan's players by war performance
    Report {
        #[command(flatten)]
        query: QueryArgs,

        /// Only score this player
        #[arg(long)]
        player: Option<String>,
    },

    /// Show the latest war summary
    Spotlight {
        #[command(flatten)]
        query: QueryArgs,
    },

    /// Show one player's week-by-week trend
    Weekly {
        #[command(flatten)]
        query: QueryArgs,

        /// Player tag
        #[arg(long)]
        player: String,
    },

    /// Check every data file for unparseable rows
    ValidateData,
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            AppConfig::from_file(Path::new(DEFAULT_CONFIG_PATH))
                .with_context(|| format!("Failed to load config {}", DEFAULT_CONFIG_PATH))?
        }
        None => AppConfig::default(),
    };

    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

fn build_options(
    config: &AppConfig,
    query: &QueryArgs,
    player: Option<&str>,
) -> Result<WarIntelligenceOptions> {
    let mut options = WarIntelligenceOptions::new(query.clan.as_str())
        .with_days_back(query.days_back.unwrap_or(config.engine.days_back))
        .with_min_wars(query.min_wars.unwrap_or(config.engine.min_wars));

    if let Some(player) = player {
        options = options.with_player(player);
    }
    if let Some(raw) = &query.as_of {
        let at = DateTime::parse_from_rfc3339(raw)
            .with_context(|| format!("Invalid --as-of timestamp (expected RFC 3339): {}", raw))?;
        options = options.as_of(at.with_timezone(&Utc));
    }
    Ok(options)
}

async fn run_query(
    config: &AppConfig,
    query: &QueryArgs,
    player: Option<&str>,
) -> Result<WarIntelligenceResult> {
    let options = build_options(config, query, player)?;
    let source = JsonlSource::open(StorageConfig::new(config.data_dir.clone()))
        .with_context(|| format!("Failed to open data directory {:?}", config.data_dir))?;
    let engine = WarIntelligenceEngine::new(source).with_settings(config.engine.settings());

    Ok(engine.compute(&options).await?)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_spotlight(summary: &WarSummary) {
    let start = summary
        .start_time
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let result = summary
        .result
        .map(|r| r.to_string())
        .unwrap_or_else(|| "in progress".to_string());

    println!(
        "=== Latest War vs {} ({}) ===",
        summary.opponent_name.as_deref().unwrap_or("unknown opponent"),
        start
    );
    println!(
        "Result:           {} ({} - {})",
        result, summary.clan_stars, summary.opponent_stars
    );
    println!(
        "Attacks:          {}/{} ({} missed)",
        summary.attacks_used, summary.attacks_available, summary.missed_attacks
    );
    println!("Average stars:    {:.2}", summary.average_stars);
    for (i, a) in summary.top_attackers.iter().enumerate() {
        println!(
            "  {}. {:<16} {} {:>2}★ {:>6.1}% over {} attacks",
            i + 1,
            a.player_name,
            a.player_tag,
            a.stars,
            a.destruction,
            a.attacks
        );
    }
}

fn print_player_row(rank: usize, m: &WarIntelligenceMetrics) {
    let hold = m
        .defensive_hold_rate
        .map(|h| format!("{:>5.1}%", h * 100.0))
        .unwrap_or_else(|| "    - ".to_string());
    println!(
        "{:>3}. {:<16} {:<12} {:>5.1} {:<15} AEI {:>5.1} CONS {:>5.1} HOLD {} TIME {:>5.1}  {}W {}A {:.2}★",
        rank,
        m.player_name,
        m.player_tag.as_str(),
        m.overall_score,
        m.tier.to_string(),
        m.attack_efficiency_index,
        m.consistency_score,
        hold,
        m.attack_timing_score,
        m.total_wars,
        m.total_attacks,
        m.average_stars
    );
}

fn print_report(result: &WarIntelligenceResult) {
    println!(
        "=== War Intelligence: {} ({} to {}) ===",
        result.clan_tag,
        result.period_start.date_naive(),
        result.period_end.date_naive()
    );
    println!("Wars in window:   {}", result.total_wars);

    if result.is_insufficient() {
        println!("\nNot enough war data to rank players.");
    } else {
        let avg = &result.clan_averages;
        println!(
            "Clan averages:    overall {:.1}, AEI {:.1}, consistency {:.1}, hold {:.1}%\n",
            avg.average_overall_score,
            avg.average_aei,
            avg.average_consistency,
            avg.average_hold_rate * 100.0
        );
        for (i, m) in result.metrics.iter().enumerate() {
            print_player_row(i + 1, m);
        }
    }

    if let Some(summary) = &result.latest_war_summary {
        println!();
        print_spotlight(summary);
    }
}

fn print_weekly(m: &WarIntelligenceMetrics) {
    println!("=== Weekly trend: {} ({}) ===", m.player_name, m.player_tag);
    for w in &m.weekly {
        println!(
            "  {}  {:>2}A {:>3}★  overall {:>5.1}  {}",
            w.week_start, w.attacks, w.stars, w.overall_score, w.tier
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_tracing(&config.log_level, cli.json_logs);
    tracing::info!("Starting war-intel v{}", env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Report { query, player } => {
            let result = run_query(&config, query, player.as_deref()).await?;
            if query.json {
                print_json(&result)?;
            } else {
                print_report(&result);
            }
        }
        Commands::Spotlight { query } => {
            let result = run_query(&config, query, None).await?;
            match &result.latest_war_summary {
                Some(summary) if query.json => print_json(summary)?,
                Some(summary) => print_spotlight(summary),
                None => println!(
                    "No wars in the last {} days.",
                    query.days_back.unwrap_or(config.engine.days_back)
                ),
            }
        }
        Commands::Weekly { query, player } => {
            let result = run_query(&config, query, Some(player.as_str())).await?;
            match result.metrics.first() {
                Some(m) if query.json => print_json(&m.weekly)?,
                Some(m) => print_weekly(m),
                None => println!(
                    "{} has fewer than {} wars or no attacks in the window.",
                    player,
                    query.min_wars.unwrap_or(config.engine.min_wars)
                ),
            }
        }
        Commands::ValidateData => {
            let storage_config = StorageConfig::new(config.data_dir.clone());
            let reports = storage::validate(&storage_config)?;

            println!("=== Data files in {:?} ===", config.data_dir);
            let mut broken = 0;
            for (entity, report) in &reports {
                if !report.exists {
                    println!("  {:<24} missing", entity.filename());
                    continue;
                }
                println!(
                    "  {:<24} {:>7} rows, {} unparseable",
                    entity.filename(),
                    report.valid,
                    report.invalid_lines.len()
                );
                if !report.is_clean() {
                    broken += 1;
                    let shown: Vec<String> = report
                        .invalid_lines
                        .iter()
                        .take(10)
                        .map(|n| n.to_string())
                        .collect();
                    println!("    bad lines: {}", shown.join(", "));
                }
            }
            if broken > 0 {
                anyhow::bail!("{} data file(s) contain unparseable rows", broken);
            }
        }
    }

    Ok(())
}
