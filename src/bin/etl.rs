//! Offline tooling: sync from the game API, import CSV exports, rebuild
//! player history and export JSON snapshots for the API server (or flatten
//! them back to CSV).

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use sqlx::PgPool;
use tracing::{error, info};

use draft_planner::config::{self, Config};
use draft_planner::db;
use draft_planner::fpl::FplClient;
use draft_planner::pipeline::{self, CurrentSeason, ExportSummary, HistoryInputs};
use draft_planner::snapshot::SnapshotStore;

#[derive(Parser)]
#[command(name = "draft-planner-etl")]
#[command(about = "Build draft planner snapshots from the game API, CSV exports and Postgres", long_about = None)]
struct Cli {
    /// Snapshot directory (overrides DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the current-season teams, players and fixtures from the game API
    Sync,

    /// Upsert team_stats_{home,away,overall}.csv into the database
    ImportTeamStats {
        /// Directory holding the team stats CSVs
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },

    /// Write teams, players, fixtures, team stats and rankings snapshots
    Export,

    /// Flatten the JSON snapshots into CSV files
    ExportCsv {
        /// Output directory (defaults to the snapshot directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Reconcile last season with this one and write player-history.json
    RebuildHistory {
        #[arg(long)]
        historical_teams: PathBuf,

        #[arg(long)]
        historical_players: PathBuf,

        /// Current-season teams CSV; omit with --current-players to use the game API
        #[arg(long, requires = "current_players")]
        current_teams: Option<PathBuf>,

        #[arg(long, requires = "current_teams")]
        current_players: Option<PathBuf>,

        /// Per-player gameweek stats of the historical season
        #[arg(long)]
        gameweek_stats: PathBuf,

        /// Label of the historical season in logs
        #[arg(long, default_value = "2024")]
        historical_season: String,

        /// Spot-check a pairing after the rebuild, as NAME:OPPONENT_ID (repeatable)
        #[arg(long = "verify")]
        verify: Vec<String>,
    },

    /// Write team-rankings.json from a team stats CSV, without a database
    RankCsv {
        #[arg(long, default_value = "team_stats_overall.csv")]
        stats: PathBuf,
    },

    /// Check every snapshot for presence, freshness and structure
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    config::load_dotenv();
    draft_planner::init_tracing();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn connect(config: &Config) -> Result<PgPool> {
    let pool = db::connect_with_retry(config.require_database_url()?, 5).await?;
    db::ensure_schema(&pool, &config.season).await?;
    Ok(pool)
}

fn report_exports(summary: &ExportSummary) -> Result<()> {
    for file in &summary.succeeded {
        info!("  ok      {}", file);
    }
    for (file, reason) in &summary.failed {
        error!("  failed  {}: {}", file, reason);
    }
    if !summary.is_success() {
        return Err(anyhow!("{} of the exports failed", summary.failed.len()));
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let store = SnapshotStore::new(&config.data_dir);

    match cli.command {
        Commands::Sync => {
            let client = FplClient::new(&config.fpl_api_base)?;
            let bootstrap = client.bootstrap().await?;
            let fixtures = client.fixtures().await?;
            let pool = connect(&config).await?;
            let counts = db::replace_current_season(&pool, &config.season, &bootstrap, &fixtures)
                .await
                .context("Sync failed; previous season data left untouched")?;
            info!(
                "Sync complete: {} teams, {} players, {} fixtures",
                counts.teams, counts.players, counts.fixtures
            );
        }

        Commands::ImportTeamStats { dir } => {
            let pool = connect(&config).await?;
            let rows = pipeline::import_team_stats(&pool, &dir).await?;
            info!("Imported {} team stats rows from {}", rows, dir.display());
        }

        Commands::Export => {
            let pool = connect(&config).await?;
            let summary = pipeline::export_all(&pool, &config.season, &store).await;
            report_exports(&summary)?;
        }

        Commands::ExportCsv { out } => {
            let out = out.unwrap_or_else(|| config.data_dir.clone());
            let summary = pipeline::export_csv(&store, &out).await?;
            report_exports(&summary)?;
        }

        Commands::RebuildHistory {
            historical_teams,
            historical_players,
            current_teams,
            current_players,
            gameweek_stats,
            historical_season,
            verify,
        } => {
            let checks = verify
                .iter()
                .map(|raw| pipeline::parse_spot_check(raw))
                .collect::<Result<Vec<_>>>()?;

            let current = match (current_teams, current_players) {
                (Some(teams), Some(players)) => CurrentSeason::Csv { teams, players },
                _ => {
                    info!("No current-season CSVs given; reading identities from the game API");
                    let bootstrap = FplClient::new(&config.fpl_api_base)?.bootstrap().await?;
                    let registry = bootstrap
                        .registry(&config.season)
                        .context("Invalid current registry from the game API")?;
                    CurrentSeason::Registry(registry)
                }
            };

            let inputs = HistoryInputs {
                historical_teams,
                historical_players,
                current,
                gameweek_stats,
                historical_label: historical_season,
                current_label: config.season.clone(),
            };
            let summary = pipeline::rebuild_history(&inputs, &store).await?;
            info!(
                "Rebuilt {}: {} players, {}/{} records kept",
                summary.path.display(),
                summary.players_written,
                summary.records_matched,
                summary.records_total
            );

            if !checks.is_empty() {
                pipeline::verify_history(&store, &checks).await?;
            }
        }

        Commands::RankCsv { stats } => {
            let rankings = pipeline::rank_from_csv(&stats, &store).await?;
            for r in rankings.attack.iter().take(5) {
                info!("  attack #{} {} ({:.3})", r.rank, r.team_name, r.weighted_score);
            }
        }

        Commands::Validate => {
            let checks = pipeline::validate_snapshots(&store).await;
            let failed = checks.iter().filter(|c| !c.is_ok()).count();
            if failed > 0 {
                return Err(anyhow!("{} of {} snapshots failed validation", failed, checks.len()));
            }
            info!("All {} snapshots valid", checks.len());
        }
    }

    Ok(())
}
