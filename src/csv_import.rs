//! CSV exports read by the offline tool.
//!
//! The first row that fails to parse aborts the read with its file and line.
//! Blank numeric cells read as zero; decimals must be finite.

use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::model::{FixtureRecord, Player, Position, Team, TeamStats};

fn open(path: &Path) -> Result<csv::Reader<File>> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = open(path)?;
    let mut rows = Vec::new();

    for (idx, record) in reader.deserialize::<T>().enumerate() {
        let row = record.map_err(|e| {
            // +2: header line and 1-based numbering
            let line = e.position().map_or(idx as u64 + 2, |p| p.line());
            anyhow::Error::new(e).context(format!("{}: bad row at line {}", path.display(), line))
        })?;
        rows.push(row);
    }

    debug!("{}: {} rows read", path.display(), rows.len());
    Ok(rows)
}

/// Blank cell → `T::default()`, otherwise `FromStr`.
fn blank_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
    T::Err: std::fmt::Display,
{
    let raw = String::deserialize(deserializer)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(T::default());
    }
    raw.parse().map_err(D::Error::custom)
}

/// Like `blank_as_default`, but `nan` and `inf` are rejected.
fn finite_decimal<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value: f64 = blank_as_default(deserializer)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(D::Error::custom(format!("non-finite decimal '{}'", value)))
    }
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        other => Err(D::Error::custom(format!("invalid boolean '{}'", other))),
    }
}

#[derive(Debug, Deserialize)]
struct TeamRow {
    id: u32,
    name: String,
    short_name: String,
    code: String,
}

#[derive(Debug, Deserialize)]
struct PlayerRow {
    id: u32,
    #[serde(alias = "display_name")]
    web_name: String,
    team_id: u32,
    #[serde(default)]
    element_type: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct GameweekRow {
    player_id: u32,
    opponent_team: u32,
    gameweek: u32,
    #[serde(deserialize_with = "lenient_bool")]
    was_home: bool,
    #[serde(default, deserialize_with = "blank_as_default")]
    total_points: i32,
    #[serde(default, deserialize_with = "blank_as_default")]
    minutes: i32,
    #[serde(default, deserialize_with = "blank_as_default")]
    goals_scored: i32,
    #[serde(default, deserialize_with = "blank_as_default")]
    assists: i32,
    #[serde(default, deserialize_with = "blank_as_default")]
    clean_sheets: i32,
    #[serde(default, deserialize_with = "blank_as_default")]
    goals_conceded: i32,
    #[serde(default, deserialize_with = "blank_as_default")]
    bonus: i32,
    #[serde(default, deserialize_with = "blank_as_default")]
    saves: i32,
    #[serde(default, deserialize_with = "finite_decimal")]
    expected_goals: f64,
    #[serde(default, deserialize_with = "finite_decimal")]
    expected_assists: f64,
    #[serde(default, deserialize_with = "finite_decimal")]
    expected_goals_conceded: f64,
}

#[derive(Debug, Deserialize)]
struct TeamStatsRow {
    team_id: u32,
    team_name: String,
    #[serde(default, deserialize_with = "blank_as_default")]
    games_played: u32,
    #[serde(default, deserialize_with = "blank_as_default")]
    goals_scored: u32,
    #[serde(default, deserialize_with = "blank_as_default")]
    goals_conceded: u32,
    #[serde(default, deserialize_with = "blank_as_default")]
    clean_sheets: u32,
    #[serde(default, deserialize_with = "finite_decimal")]
    expected_goals: f64,
    #[serde(default, deserialize_with = "finite_decimal")]
    expected_goals_conceded: f64,
    #[serde(default, deserialize_with = "blank_as_default")]
    wins: u32,
    #[serde(default, deserialize_with = "blank_as_default")]
    draws: u32,
    #[serde(default, deserialize_with = "blank_as_default")]
    losses: u32,
    #[serde(default, deserialize_with = "blank_as_default")]
    points: u32,
}

/// `id,name,short_name,code`
pub fn read_teams(path: &Path) -> Result<Vec<Team>> {
    let rows: Vec<TeamRow> = read_rows(path)?;
    Ok(rows
        .into_iter()
        .map(|r| Team {
            id: r.id,
            name: r.name,
            short_name: r.short_name,
            code: r.code,
            strength: None,
        })
        .collect())
}

/// `id,web_name,team_id[,element_type]`; extra columns are ignored.
pub fn read_players(path: &Path) -> Result<Vec<Player>> {
    let rows: Vec<PlayerRow> = read_rows(path)?;
    Ok(rows
        .into_iter()
        .map(|r| Player {
            id: r.id,
            display_name: r.web_name,
            team_id: r.team_id,
            position: r.element_type.and_then(Position::from_element_type),
        })
        .collect())
}

/// Per-player, per-fixture stat lines keyed by the export's own season ids.
pub fn read_fixture_records(path: &Path) -> Result<Vec<FixtureRecord>> {
    let rows: Vec<GameweekRow> = read_rows(path)?;
    Ok(rows
        .into_iter()
        .map(|r| FixtureRecord {
            player_id: r.player_id,
            opponent_team_id: r.opponent_team,
            gameweek: r.gameweek,
            was_home: r.was_home,
            total_points: r.total_points,
            minutes: r.minutes,
            goals_scored: r.goals_scored,
            assists: r.assists,
            clean_sheets: r.clean_sheets,
            goals_conceded: r.goals_conceded,
            bonus: r.bonus,
            saves: r.saves,
            expected_goals: r.expected_goals,
            expected_assists: r.expected_assists,
            expected_goals_conceded: r.expected_goals_conceded,
        })
        .collect())
}

/// One location block of team statistics.
pub fn read_team_stats(path: &Path) -> Result<Vec<TeamStats>> {
    let rows: Vec<TeamStatsRow> = read_rows(path)?;
    Ok(rows
        .into_iter()
        .map(|r| TeamStats {
            team_id: r.team_id,
            team_name: r.team_name,
            games_played: r.games_played,
            goals_scored: r.goals_scored,
            goals_conceded: r.goals_conceded,
            clean_sheets: r.clean_sheets,
            expected_goals: r.expected_goals,
            expected_goals_conceded: r.expected_goals_conceded,
            wins: r.wins,
            draws: r.draws,
            losses: r.losses,
            points: r.points,
            saves: 0,
            attack_rank: None,
            defense_rank: None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn csv_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn teams_keep_code_as_text() {
        let file = csv_file("id,name,short_name,code\n1,Arsenal,ARS,3\n4,Bournemouth,BOU,91\n");
        let teams = read_teams(file.path()).unwrap();
        assert_eq!(teams.len(), 2);
        assert_eq!(teams[1].code, "91");
        assert_eq!(teams[1].short_name, "BOU");
    }

    #[test]
    fn players_position_column_is_optional() {
        let with = csv_file("id,web_name,first_name,team_id,element_type\n381,M.Salah,Mohamed,12,3\n");
        let players = read_players(with.path()).unwrap();
        assert_eq!(players[0].position, Some(Position::Midfielder));
        assert_eq!(players[0].display_name, "M.Salah");

        let without = csv_file("id,web_name,team_id\n328,M.Salah,12\n");
        let players = read_players(without.path()).unwrap();
        assert_eq!(players[0].position, None);
        assert_eq!(players[0].team_id, 12);
    }

    #[test]
    fn gameweek_blanks_read_as_zero() {
        let file = csv_file(
            "player_id,opponent_team,gameweek,was_home,total_points,minutes,goals_scored,assists,clean_sheets,goals_conceded,bonus,saves,expected_goals,expected_assists,expected_goals_conceded\n\
             328,5,14,True,16,90,2,1,,1,3,,1.3,0.4,\n\
             328,7,15,0,2,90,0,0,0,2,0,0,0.1,0.0,1.8\n",
        );
        let records = read_fixture_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].was_home);
        assert_eq!(records[0].clean_sheets, 0);
        assert_eq!(records[0].saves, 0);
        assert_eq!(records[0].expected_goals_conceded, 0.0);
        assert_eq!(records[0].opponent_team_id, 5);
        assert!(!records[1].was_home);
    }

    #[test]
    fn bad_row_aborts_with_its_line() {
        let file = csv_file(
            "player_id,opponent_team,gameweek,was_home,total_points\n\
             1,2,4,false,6\n\
             1,2,3,maybe,4\n",
        );
        let err = read_fixture_records(file.path()).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("line 3"), "{}", message);
        assert!(message.contains(&file.path().display().to_string()));
    }

    #[test]
    fn non_finite_decimals_are_rejected() {
        let header = "team_id,team_name,games_played,goals_scored,goals_conceded,clean_sheets,expected_goals,expected_goals_conceded";
        for bad in ["nan", "inf", "-inf", "NaN"] {
            let file = csv_file(&format!("{header}\n4,Bournemouth,10,14,15,2,{bad},13.0\n"));
            assert!(read_team_stats(file.path()).is_err(), "{} was accepted", bad);
        }
        let file = csv_file(&format!("{header}\n4,Bournemouth,10,14,15,2,,13.0\n"));
        assert_eq!(read_team_stats(file.path()).unwrap()[0].expected_goals, 0.0);
    }

    #[test]
    fn team_stats_rows() {
        let file = csv_file(
            "team_id,team_name,games_played,goals_scored,goals_conceded,clean_sheets,expected_goals,expected_goals_conceded,wins,draws,losses,points\n\
             1,Arsenal,10,20,9,5,19.3,9.5,7,2,1,23\n",
        );
        let stats = read_team_stats(file.path()).unwrap();
        assert_eq!(stats[0].points, 23);
        assert_eq!(stats[0].expected_goals, 19.3);
        assert_eq!(stats[0].attack_rank, None);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_teams(Path::new("/nonexistent/teams.csv")).is_err());
    }
}
