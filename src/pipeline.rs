//! Offline steps run by `draft-planner-etl`: history rebuild, snapshot export,
//! CSV ranking, team-stats import and snapshot validation.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::aggregate::aggregate;
use crate::csv_import;
use crate::db;
use crate::history::{self, PlayerHistoryData};
use crate::matcher::{match_seasons, MatchReport};
use crate::model::{HistoryEntry, Location, Team, TeamStats};
use crate::ranking::{annotate_ranks, rank_lookup, rank_teams, Rankings, UNRANKED_DEFAULT};
use crate::registry::IdentityRegistry;
use crate::snapshot::{
    Envelope, SnapshotStore, FIXTURES_FILE, PLAYERS_FILE, PLAYER_HISTORY_FILE, TEAMS_FILE,
    TEAM_RANKINGS_FILE, TEAM_STATS_FILE,
};

/// Where the current season's identities come from.
#[derive(Debug, Clone)]
pub enum CurrentSeason {
    /// Team and player CSV exports, labelled with `HistoryInputs::current_label`.
    Csv { teams: PathBuf, players: PathBuf },
    /// A registry built elsewhere, typically from the game API's bootstrap.
    Registry(IdentityRegistry),
}

/// Inputs of a history rebuild.
#[derive(Debug, Clone)]
pub struct HistoryInputs {
    pub historical_teams: PathBuf,
    pub historical_players: PathBuf,
    pub current: CurrentSeason,
    pub gameweek_stats: PathBuf,
    pub historical_label: String,
    pub current_label: String,
}

#[derive(Debug, Clone)]
pub struct RebuildSummary {
    pub report: MatchReport,
    pub records_total: usize,
    pub records_matched: usize,
    pub players_written: usize,
    pub path: PathBuf,
}

fn load_registry(label: &str, teams: &Path, players: &Path) -> Result<IdentityRegistry> {
    let teams = csv_import::read_teams(teams)?;
    let players = csv_import::read_players(players)?;
    IdentityRegistry::new(label, teams, players)
        .with_context(|| format!("Invalid {} registry", label))
}

/// Rebuild `player-history.json` from the previous season's CSV exports.
///
/// Nothing is written unless every input loads.
pub async fn rebuild_history(inputs: &HistoryInputs, store: &SnapshotStore) -> Result<RebuildSummary> {
    let historical = load_registry(
        &inputs.historical_label,
        &inputs.historical_teams,
        &inputs.historical_players,
    )?;
    let current = match &inputs.current {
        CurrentSeason::Csv { teams, players } => load_registry(&inputs.current_label, teams, players)?,
        CurrentSeason::Registry(registry) => registry.clone(),
    };
    info!(
        "Loaded {} teams / {} players ({}) and {} teams / {} players ({})",
        historical.teams().len(),
        historical.players().len(),
        historical.label(),
        current.teams().len(),
        current.players().len(),
        current.label()
    );

    let outcome = match_seasons(&historical, &current);
    let report = &outcome.report;
    info!(
        "Teams matched: {}, unmatched: {:?}",
        report.teams_matched, report.teams_unmatched
    );
    info!(
        "Players matched: {} ({} exact, {} substring), unmatched: {}",
        report.players_matched(),
        report.players_exact,
        report.players_substring,
        report.players_unmatched
    );

    let records = csv_import::read_fixture_records(&inputs.gameweek_stats)?;
    let aggregation = aggregate(&records, &outcome.mapping);
    info!(
        "Fixture records: {} matched, {} unmatched of {}",
        aggregation.matched,
        aggregation.unmatched(),
        aggregation.total()
    );

    let data = history::build_history(&aggregation, &current);
    let players_written = data.len();
    let path = store.write_envelope(PLAYER_HISTORY_FILE, &data).await?;
    info!("History written for {} players", players_written);

    Ok(RebuildSummary {
        report: outcome.report,
        records_total: aggregation.total(),
        records_matched: aggregation.matched,
        players_written,
        path,
    })
}

/// `NAME:OPPONENT` → (name, opponent key). The name may itself contain colons.
pub fn parse_spot_check(raw: &str) -> Result<(String, String)> {
    let (name, opponent) = raw
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("expected NAME:OPPONENT, got '{}'", raw))?;
    let (name, opponent) = (name.trim(), opponent.trim());
    if name.is_empty() || opponent.is_empty() {
        return Err(anyhow!("expected NAME:OPPONENT, got '{}'", raw));
    }
    Ok((name.to_string(), opponent.to_string()))
}

/// Look each pairing up in the written history snapshot and log the result.
pub async fn verify_history(
    store: &SnapshotStore,
    checks: &[(String, String)],
) -> Result<Vec<HistoryEntry>> {
    let doc: Envelope<PlayerHistoryData> = store.read(PLAYER_HISTORY_FILE).await?;
    let mut results = Vec::with_capacity(checks.len());

    for (name, opponent) in checks {
        let entry = history::lookup(&doc.data, name, opponent);
        if entry.is_new_player {
            warn!("{} vs {}: not in history", name, opponent);
        } else {
            let points: i32 = entry.fixtures.iter().map(|f| f.total_points).sum();
            info!(
                "{} vs {}: {} fixtures, {} points",
                name,
                opponent,
                entry.fixtures.len(),
                points
            );
        }
        results.push(entry);
    }
    Ok(results)
}

/// Rank teams from a `team_stats_overall.csv` export and write the rankings.
pub async fn rank_from_csv(stats_csv: &Path, store: &SnapshotStore) -> Result<Rankings> {
    let stats = csv_import::read_team_stats(stats_csv)?;
    let rankings = rank_teams(&stats);
    if rankings.attack.is_empty() {
        warn!("No team in {} has played a game", stats_csv.display());
    }
    store.write_rankings(&rankings).await?;
    info!(
        "Ranked {} of {} teams",
        rankings.attack.len(),
        stats.len()
    );
    Ok(rankings)
}

/// Import `team_stats_{home,away,overall}.csv` from `dir`. Missing files are
/// skipped with a warning.
pub async fn import_team_stats(pool: &PgPool, dir: &Path) -> Result<usize> {
    let mut imported = 0;
    for location in Location::ALL {
        let path = dir.join(format!("team_stats_{}.csv", location.as_str()));
        if !path.exists() {
            warn!("{} not found, skipping {} stats", path.display(), location.as_str());
            continue;
        }
        let rows = csv_import::read_team_stats(&path)?;
        imported += db::upsert_team_stats(pool, location, &rows).await?;
    }
    Ok(imported)
}

/// One `teams.json` row: the club plus its home/away attack and defense ranks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamSnapshotRow {
    pub id: u32,
    pub name: String,
    pub short_name: String,
    pub code: String,
    pub strength: Option<i32>,
    pub atk_h_rank: u32,
    pub atk_a_rank: u32,
    pub def_h_rank: u32,
    pub def_a_rank: u32,
}

/// Attach home and away ranks to each team; unranked teams get the default.
pub fn team_rows(teams: &[Team], home: &[TeamStats], away: &[TeamStats]) -> Vec<TeamSnapshotRow> {
    let home = rank_teams(home);
    let away = rank_teams(away);
    let (atk_h, def_h) = (rank_lookup(&home.attack), rank_lookup(&home.defense));
    let (atk_a, def_a) = (rank_lookup(&away.attack), rank_lookup(&away.defense));
    let rank = |m: &std::collections::HashMap<u32, u32>, id: u32| {
        m.get(&id).copied().unwrap_or(UNRANKED_DEFAULT)
    };

    teams
        .iter()
        .map(|t| TeamSnapshotRow {
            id: t.id,
            name: t.name.clone(),
            short_name: t.short_name.clone(),
            code: t.code.clone(),
            strength: t.strength,
            atk_h_rank: rank(&atk_h, t.id),
            atk_a_rank: rank(&atk_a, t.id),
            def_h_rank: rank(&def_h, t.id),
            def_a_rank: rank(&def_a, t.id),
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct ExportSummary {
    pub succeeded: Vec<&'static str>,
    pub failed: Vec<(&'static str, String)>,
}

impl ExportSummary {
    fn record(&mut self, file: &'static str, result: Result<()>) {
        match result {
            Ok(()) => self.succeeded.push(file),
            Err(e) => {
                error!("Export of {} failed: {:#}", file, e);
                self.failed.push((file, format!("{:#}", e)));
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Export every database-backed snapshot. Each export runs regardless of
/// whether the others failed.
pub async fn export_all(pool: &PgPool, season: &str, store: &SnapshotStore) -> ExportSummary {
    let mut summary = ExportSummary::default();
    summary.record(TEAMS_FILE, export_teams(pool, season, store).await);
    summary.record(PLAYERS_FILE, export_players(pool, season, store).await);
    summary.record(FIXTURES_FILE, export_fixtures(pool, season, store).await);
    summary.record(TEAM_STATS_FILE, export_team_stats(pool, season, store).await);
    summary.record(TEAM_RANKINGS_FILE, export_rankings(pool, season, store).await);

    info!(
        "Export finished: {}/{} snapshots written",
        summary.succeeded.len(),
        summary.succeeded.len() + summary.failed.len()
    );
    summary
}

async fn export_teams(pool: &PgPool, season: &str, store: &SnapshotStore) -> Result<()> {
    let teams = db::load_teams(pool, season).await?;
    let home = db::load_team_stats(pool, season, Location::Home).await?;
    let away = db::load_team_stats(pool, season, Location::Away).await?;
    store
        .write_envelope(TEAMS_FILE, team_rows(&teams, &home, &away))
        .await?;
    Ok(())
}

async fn export_players(pool: &PgPool, season: &str, store: &SnapshotStore) -> Result<()> {
    let players = db::load_players(pool, season).await?;
    store.write_envelope(PLAYERS_FILE, players).await?;
    Ok(())
}

async fn export_fixtures(pool: &PgPool, season: &str, store: &SnapshotStore) -> Result<()> {
    let fixtures = db::load_fixtures(pool, season).await?;
    store.write_envelope(FIXTURES_FILE, fixtures).await?;
    Ok(())
}

async fn export_team_stats(pool: &PgPool, season: &str, store: &SnapshotStore) -> Result<()> {
    let mut home = db::load_team_stats(pool, season, Location::Home).await?;
    let mut away = db::load_team_stats(pool, season, Location::Away).await?;
    let mut overall = db::load_team_stats(pool, season, Location::Overall).await?;
    for block in [&mut home, &mut away, &mut overall] {
        annotate_ranks(block);
    }
    store.write_team_stats(home, away, overall).await?;
    Ok(())
}

async fn export_rankings(pool: &PgPool, season: &str, store: &SnapshotStore) -> Result<()> {
    let overall = db::load_team_stats(pool, season, Location::Overall).await?;
    store.write_rankings(&rank_teams(&overall)).await?;
    Ok(())
}

const TEAM_COLUMNS: &[&str] = &["id", "name", "short_name", "code"];
const PLAYER_COLUMNS: &[&str] = &["id", "web_name", "element_type", "team_id"];
const FIXTURE_COLUMNS: &[&str] = &["id", "event", "team_h", "team_a"];
const TEAM_STATS_COLUMNS: &[&str] = &["team_id", "team_name"];
const RANKING_COLUMNS: &[&str] = &["rank", "team_id", "team_name"];
const HISTORY_COLUMNS: &[&str] = &["player_name", "opponent_team_id", "gameweek"];

/// Flatten the JSON snapshots into CSV files under `out_dir`.
///
/// One CSV per row list: `team-stats.json` becomes `team-stats-{location}.csv`,
/// `team-rankings.json` becomes `team-rankings-{attack,defense}.csv`, and the
/// history tree becomes one row per fixture. Each snapshot is exported
/// independently.
pub async fn export_csv(store: &SnapshotStore, out_dir: &Path) -> Result<ExportSummary> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let mut summary = ExportSummary::default();
    for (file, columns) in [
        (PLAYERS_FILE, PLAYER_COLUMNS),
        (TEAMS_FILE, TEAM_COLUMNS),
        (FIXTURES_FILE, FIXTURE_COLUMNS),
    ] {
        let result = export_rows_csv(store, file, columns, out_dir).await;
        summary.record(file, result);
    }

    let stats_blocks = Location::ALL.map(Location::as_str);
    let result =
        export_blocks_csv(store, TEAM_STATS_FILE, &stats_blocks, TEAM_STATS_COLUMNS, out_dir).await;
    summary.record(TEAM_STATS_FILE, result);

    let result = export_blocks_csv(
        store,
        TEAM_RANKINGS_FILE,
        &["attack", "defense"],
        RANKING_COLUMNS,
        out_dir,
    )
    .await;
    summary.record(TEAM_RANKINGS_FILE, result);

    summary.record(PLAYER_HISTORY_FILE, export_history_csv(store, out_dir).await);

    info!(
        "CSV export finished: {}/{} snapshots exported to {}",
        summary.succeeded.len(),
        summary.succeeded.len() + summary.failed.len(),
        out_dir.display()
    );
    Ok(summary)
}

fn csv_stem(file: &str) -> &str {
    file.strip_suffix(".json").unwrap_or(file)
}

fn list<'a>(doc: &'a Value, key: &str) -> Result<&'a [Value]> {
    doc.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| anyhow!("missing {} list", key))
}

async fn export_rows_csv(
    store: &SnapshotStore,
    file: &str,
    columns: &[&str],
    out_dir: &Path,
) -> Result<()> {
    let doc = store.read_value(file).await?;
    let path = out_dir.join(format!("{}.csv", csv_stem(file)));
    let written = write_csv(&path, columns, list(&doc, "data")?)?;
    info!("Exported {} rows to {}", written, path.display());
    Ok(())
}

async fn export_blocks_csv(
    store: &SnapshotStore,
    file: &str,
    blocks: &[&str],
    columns: &[&str],
    out_dir: &Path,
) -> Result<()> {
    let doc = store.read_value(file).await?;
    for block in blocks {
        let path = out_dir.join(format!("{}-{}.csv", csv_stem(file), block));
        let written = write_csv(&path, columns, list(&doc, block)?)?;
        info!("Exported {} rows to {}", written, path.display());
    }
    Ok(())
}

async fn export_history_csv(store: &SnapshotStore, out_dir: &Path) -> Result<()> {
    let doc = store.read_value(PLAYER_HISTORY_FILE).await?;
    let data = doc
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("data is not an object"))?;

    let mut rows = Vec::new();
    for (player, opponents) in data {
        let Some(opponents) = opponents.as_object() else {
            continue;
        };
        for (opponent, entry) in opponents {
            let fixtures = entry.get("fixtures").and_then(Value::as_array);
            for fixture in fixtures.into_iter().flatten() {
                let mut row = serde_json::Map::new();
                row.insert("player_name".to_string(), Value::from(player.as_str()));
                row.insert("opponent_team_id".to_string(), Value::from(opponent.as_str()));
                if let Some(fields) = fixture.as_object() {
                    row.extend(fields.clone());
                }
                rows.push(Value::Object(row));
            }
        }
    }

    let path = out_dir.join(format!("{}.csv", csv_stem(PLAYER_HISTORY_FILE)));
    let written = write_csv(&path, HISTORY_COLUMNS, &rows)?;
    info!("Exported {} history rows to {}", written, path.display());
    Ok(())
}

/// `columns` lead; any other key seen in the rows follows in first-seen order.
fn write_csv(path: &Path, columns: &[&str], rows: &[Value]) -> Result<usize> {
    let mut header: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
    for fields in rows.iter().filter_map(Value::as_object) {
        for key in fields.keys() {
            if !header.contains(key) {
                header.push(key.clone());
            }
        }
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(&header)?;
    for row in rows {
        writer.write_record(header.iter().map(|column| cell(row.get(column.as_str()))))?;
    }
    writer.flush()?;
    Ok(rows.len())
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Validation outcome for one snapshot file.
#[derive(Debug, Clone)]
pub struct FileCheck {
    pub file: &'static str,
    pub problems: Vec<String>,
}

impl FileCheck {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

enum Shape {
    /// `data` is a non-empty list whose rows carry these fields.
    Rows(&'static [&'static str]),
    /// These top-level keys are non-empty lists.
    Blocks(&'static [&'static str]),
    /// `data` is a non-empty object.
    Keyed,
}

const CHECKS: [(&str, Shape); 6] = [
    (TEAMS_FILE, Shape::Rows(TEAM_COLUMNS)),
    (PLAYERS_FILE, Shape::Rows(PLAYER_COLUMNS)),
    (FIXTURES_FILE, Shape::Rows(FIXTURE_COLUMNS)),
    (TEAM_STATS_FILE, Shape::Blocks(&["home", "away", "overall"])),
    (TEAM_RANKINGS_FILE, Shape::Blocks(&["attack", "defense"])),
    (PLAYER_HISTORY_FILE, Shape::Keyed),
];

/// A snapshot whose `last_updated` is older than this is stale.
fn max_snapshot_age() -> Duration {
    Duration::days(1)
}

/// Check every snapshot for presence, a recent timestamp and the expected
/// structure.
pub async fn validate_snapshots(store: &SnapshotStore) -> Vec<FileCheck> {
    let now = Utc::now();
    let mut checks = Vec::with_capacity(CHECKS.len());
    for (file, shape) in &CHECKS {
        let problems = match store.read_value(file).await {
            Ok(doc) => check_document(&doc, shape, now),
            Err(e) => vec![e.to_string()],
        };
        if problems.is_empty() {
            info!("{}: ok", file);
        } else {
            for p in &problems {
                warn!("{}: {}", file, p);
            }
        }
        checks.push(FileCheck { file: *file, problems });
    }
    checks
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|t| t.and_utc())
        })
}

fn check_document(doc: &Value, shape: &Shape, now: DateTime<Utc>) -> Vec<String> {
    let mut problems = Vec::new();
    match doc.get("last_updated").and_then(Value::as_str) {
        None => problems.push("missing last_updated".to_string()),
        Some(raw) => match parse_timestamp(raw) {
            None => problems.push(format!("last_updated is not a timestamp: '{}'", raw)),
            Some(at) if now - at > max_snapshot_age() => problems.push(format!(
                "stale: last_updated {} ({} days old)",
                raw,
                (now - at).num_days()
            )),
            Some(_) => {}
        },
    }

    match shape {
        Shape::Rows(fields) => match doc.get("data").and_then(Value::as_array) {
            Some(rows) if rows.is_empty() => problems.push("data is empty".to_string()),
            Some(rows) => {
                for (i, row) in rows.iter().enumerate() {
                    if let Some(field) = fields.iter().find(|f| row.get(**f).is_none()) {
                        problems.push(format!("row {} missing required field: {}", i, field));
                        break;
                    }
                }
            }
            None => problems.push("data is not a list".to_string()),
        },
        Shape::Blocks(keys) => {
            for key in keys.iter() {
                match doc.get(*key).and_then(Value::as_array) {
                    Some(list) if !list.is_empty() => {}
                    Some(_) => problems.push(format!("{} is empty", key)),
                    None => problems.push(format!("missing {} list", key)),
                }
            }
        }
        Shape::Keyed => match doc.get("data").and_then(Value::as_object) {
            Some(map) if !map.is_empty() => {}
            Some(_) => problems.push("data is empty".to_string()),
            None => problems.push("data is not an object".to_string()),
        },
    }
    problems
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn team(id: u32, short: &str) -> Team {
        Team {
            id,
            name: short.to_string(),
            short_name: short.to_string(),
            code: (id * 10).to_string(),
            strength: Some(3),
        }
    }

    fn stats(id: u32, gp: u32, gs: u32, gc: u32) -> TeamStats {
        TeamStats {
            team_id: id,
            team_name: format!("T{id}"),
            games_played: gp,
            goals_scored: gs,
            goals_conceded: gc,
            clean_sheets: 0,
            expected_goals: f64::from(gs),
            expected_goals_conceded: f64::from(gc),
            wins: 0,
            draws: 0,
            losses: 0,
            points: 0,
            saves: 0,
            attack_rank: None,
            defense_rank: None,
        }
    }

    #[test]
    fn spot_checks_split_on_last_colon() {
        assert_eq!(
            parse_spot_check("M.Salah:4").unwrap(),
            ("M.Salah".to_string(), "4".to_string())
        );
        assert_eq!(parse_spot_check("A:B:7").unwrap().0, "A:B");
        assert!(parse_spot_check("M.Salah").is_err());
        assert!(parse_spot_check(":4").is_err());
    }

    #[test]
    fn team_rows_fall_back_to_default_rank() {
        let teams = vec![team(1, "ARS"), team(2, "BOU"), team(3, "SUN")];
        let home = vec![stats(1, 5, 12, 3), stats(2, 5, 6, 8)];
        let away = vec![stats(1, 5, 4, 9), stats(2, 5, 9, 2), stats(3, 0, 0, 0)];

        let rows = team_rows(&teams, &home, &away);
        assert_eq!((rows[0].atk_h_rank, rows[0].def_h_rank), (1, 1));
        assert_eq!((rows[1].atk_h_rank, rows[1].def_h_rank), (2, 2));
        assert_eq!((rows[0].atk_a_rank, rows[1].atk_a_rank), (2, 1));
        assert_eq!(rows[2].atk_h_rank, UNRANKED_DEFAULT);
        assert_eq!(rows[2].def_a_rank, UNRANKED_DEFAULT);
    }

    fn at(raw: &str) -> DateTime<Utc> {
        parse_timestamp(raw).unwrap()
    }

    #[test]
    fn document_checks_report_missing_fields() {
        let now = at("2025-08-10T12:00:00+00:00");
        let good = json!({ "last_updated": "2025-08-10T09:30:00+00:00", "data": [{ "id": 1, "name": "A", "short_name": "A", "code": "3" }] });
        assert!(check_document(&good, &CHECKS[0].1, now).is_empty());

        let bad = json!({ "data": [{ "id": 1, "name": "A" }] });
        let problems = check_document(&bad, &CHECKS[0].1, now);
        assert_eq!(problems.len(), 2);
        assert!(problems[1].contains("short_name"));

        let blocks = json!({ "last_updated": "2025-08-10T11:00:00.123456", "attack": [1], "defense": [] });
        assert_eq!(
            check_document(&blocks, &CHECKS[4].1, now),
            vec!["defense is empty".to_string()]
        );
    }

    #[test]
    fn old_snapshots_are_stale() {
        let now = at("2025-08-10T12:00:00+00:00");
        let doc = |stamp: &str| json!({ "last_updated": stamp, "data": { "Saka": {} } });

        assert!(check_document(&doc("2025-08-09T13:00:00Z"), &CHECKS[5].1, now).is_empty());

        let problems = check_document(&doc("2025-08-07T12:00:00+00:00"), &CHECKS[5].1, now);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("stale"), "{:?}", problems);
        assert!(problems[0].contains("3 days old"));

        let problems = check_document(&doc("yesterday"), &CHECKS[5].1, now);
        assert!(problems[0].contains("not a timestamp"));
    }

    #[tokio::test]
    async fn validation_flags_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        store
            .write_envelope(FIXTURES_FILE, json!([{ "id": 1, "event": null, "team_h": 1, "team_a": 2 }]))
            .await
            .unwrap();

        let checks = validate_snapshots(&store).await;
        assert_eq!(checks.len(), 6);
        let fixtures = checks.iter().find(|c| c.file == FIXTURES_FILE).unwrap();
        assert!(fixtures.is_ok(), "{:?}", fixtures.problems);
        assert!(!checks.iter().find(|c| c.file == TEAMS_FILE).unwrap().is_ok());
    }

    #[tokio::test]
    async fn csv_rankings_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("team_stats_overall.csv");
        std::fs::write(
            &csv,
            "team_id,team_name,games_played,goals_scored,goals_conceded,clean_sheets,expected_goals,expected_goals_conceded\n\
             1,Arsenal,10,20,9,5,19.3,9.5\n\
             2,Bournemouth,10,14,15,2,15.1,13.0\n\
             3,Sunderland,0,0,0,0,0,0\n",
        )
        .unwrap();

        let store = SnapshotStore::new(dir.path());
        let rankings = rank_from_csv(&csv, &store).await.unwrap();
        assert_eq!(rankings.attack.len(), 2);
        assert_eq!(rankings.attack[0].team_name, "Arsenal");

        let doc = store.read_value(TEAM_RANKINGS_FILE).await.unwrap();
        assert_eq!(doc["defense"][0]["team_id"], json!(1));
    }

    async fn write_all_snapshots(store: &SnapshotStore) {
        store
            .write_envelope(
                PLAYERS_FILE,
                json!([{ "id": 381, "web_name": "M.Salah", "element_type": 3, "team_id": 12, "now_cost": 145 }]),
            )
            .await
            .unwrap();
        store
            .write_envelope(TEAMS_FILE, team_rows(&[team(1, "ARS")], &[], &[]))
            .await
            .unwrap();
        store
            .write_envelope(
                FIXTURES_FILE,
                json!([{ "id": 1, "event": null, "team_h": 1, "team_a": 12, "kickoff_time": null }]),
            )
            .await
            .unwrap();
        let block = vec![stats(1, 5, 12, 3), stats(12, 5, 9, 4)];
        store
            .write_team_stats(block.clone(), block.clone(), block.clone())
            .await
            .unwrap();
        store.write_rankings(&rank_teams(&block)).await.unwrap();
        store
            .write_envelope(
                PLAYER_HISTORY_FILE,
                json!({ "M.Salah": { "4": { "is_new_player": false, "fixtures": [
                    { "gameweek": 14, "total_points": 16, "was_home": false },
                    { "gameweek": 33, "total_points": 2, "was_home": true }
                ] } } }),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn snapshots_flatten_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("data"));
        write_all_snapshots(&store).await;

        let out = dir.path().join("csv");
        let summary = export_csv(&store, &out).await.unwrap();
        assert!(summary.is_success(), "{:?}", summary.failed);
        assert_eq!(summary.succeeded.len(), 6);

        let players = std::fs::read_to_string(out.join("players.csv")).unwrap();
        let mut lines = players.lines();
        assert_eq!(lines.next(), Some("id,web_name,element_type,team_id,now_cost"));
        assert_eq!(lines.next(), Some("381,M.Salah,3,12,145"));

        let fixtures = std::fs::read_to_string(out.join("fixtures.csv")).unwrap();
        assert!(fixtures.lines().nth(1).unwrap().starts_with("1,,1,12"));

        for name in [
            "teams.csv",
            "team-stats-home.csv",
            "team-stats-away.csv",
            "team-stats-overall.csv",
            "team-rankings-attack.csv",
            "team-rankings-defense.csv",
        ] {
            assert!(out.join(name).exists(), "{} missing", name);
        }

        let history = std::fs::read_to_string(out.join("player-history.csv")).unwrap();
        let rows: Vec<&str> = history.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("player_name,opponent_team_id,gameweek"));
        assert!(rows[1].starts_with("M.Salah,4,14"));
        assert!(rows[2].starts_with("M.Salah,4,33"));
    }

    #[tokio::test]
    async fn csv_export_continues_past_a_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        write_all_snapshots(&store).await;
        std::fs::remove_file(store.path(PLAYER_HISTORY_FILE)).unwrap();

        let summary = export_csv(&store, &dir.path().join("csv")).await.unwrap();
        assert!(!summary.is_success());
        assert_eq!(summary.succeeded.len(), 5);
        assert_eq!(summary.failed[0].0, PLAYER_HISTORY_FILE);
    }
}
