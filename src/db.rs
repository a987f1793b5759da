//! Postgres access for the offline tool: schema, sync writes, export reads.
//!
//! Current-season tables carry the season as a suffix (`teams_2025`). The
//! suffix is validated as digits by the config layer before it reaches SQL.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{info, warn};

use crate::fpl::{ApiFixture, Bootstrap};
use crate::model::{Location, Team, TeamStats};

/// Connect with exponential backoff between attempts.
pub async fn connect_with_retry(url: &str, max_retries: u32) -> Result<PgPool> {
    let mut attempt = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
        {
            Ok(pool) => {
                info!("Connected to PostgreSQL");
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;
                if attempt >= max_retries {
                    return Err(anyhow!(
                        "Failed to connect to database after {} attempts: {}",
                        max_retries,
                        e
                    ));
                }
                warn!("Database connection attempt {} failed: {}. Retrying...", attempt, e);
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }
        }
    }
}

pub fn teams_table(season: &str) -> String {
    format!("teams_{}", season)
}

pub fn players_table(season: &str) -> String {
    format!("players_{}", season)
}

pub fn fixtures_table(season: &str) -> String {
    format!("fixtures_{}", season)
}

pub fn team_stats_table(location: Location) -> String {
    format!("team_stats_{}", location.as_str())
}

/// Previous season's player table; only `now_cost` is read from it.
const PREVIOUS_PLAYERS_TABLE: &str = "players";

/// Create every table the sync, import and export steps touch.
pub async fn ensure_schema(pool: &PgPool, season: &str) -> Result<()> {
    let mut statements = vec![
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                short_name VARCHAR(50) NOT NULL,
                code VARCHAR(10) NOT NULL,
                strength INTEGER,
                updated_at TIMESTAMPTZ DEFAULT now()
            )
            "#,
            teams_table(season)
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                web_name VARCHAR(100) NOT NULL,
                first_name VARCHAR(100),
                second_name VARCHAR(100),
                element_type INTEGER NOT NULL,
                now_cost INTEGER NOT NULL,
                team_id INTEGER NOT NULL,
                status VARCHAR(50),
                total_points INTEGER NOT NULL DEFAULT 0,
                minutes INTEGER NOT NULL DEFAULT 0,
                goals_scored INTEGER NOT NULL DEFAULT 0,
                assists INTEGER NOT NULL DEFAULT 0,
                clean_sheets INTEGER NOT NULL DEFAULT 0,
                goals_conceded INTEGER NOT NULL DEFAULT 0,
                saves INTEGER NOT NULL DEFAULT 0,
                bonus INTEGER NOT NULL DEFAULT 0,
                expected_goals DECIMAL(6,2) NOT NULL DEFAULT 0,
                expected_assists DECIMAL(6,2) NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ DEFAULT now()
            )
            "#,
            players_table(season)
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                event INTEGER,
                team_h INTEGER NOT NULL,
                team_a INTEGER NOT NULL,
                team_h_difficulty INTEGER,
                team_a_difficulty INTEGER,
                kickoff_time TIMESTAMPTZ,
                updated_at TIMESTAMPTZ DEFAULT now()
            )
            "#,
            fixtures_table(season)
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                web_name VARCHAR(100),
                team_id INTEGER,
                element_type INTEGER,
                now_cost INTEGER NOT NULL DEFAULT 0
            )
            "#,
            PREVIOUS_PLAYERS_TABLE
        ),
    ];

    for location in Location::ALL {
        statements.push(format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                team_id INTEGER PRIMARY KEY,
                team_name VARCHAR(100) NOT NULL,
                games_played INTEGER NOT NULL DEFAULT 0,
                goals_scored INTEGER NOT NULL DEFAULT 0,
                goals_conceded INTEGER NOT NULL DEFAULT 0,
                clean_sheets INTEGER NOT NULL DEFAULT 0,
                expected_goals DECIMAL(6,2) NOT NULL DEFAULT 0,
                expected_goals_conceded DECIMAL(6,2) NOT NULL DEFAULT 0,
                wins INTEGER NOT NULL DEFAULT 0,
                draws INTEGER NOT NULL DEFAULT 0,
                losses INTEGER NOT NULL DEFAULT 0,
                points INTEGER NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ DEFAULT now()
            )
            "#,
            team_stats_table(location)
        ));
    }

    for sql in &statements {
        sqlx::query(sql)
            .execute(pool)
            .await
            .context("Failed to create schema")?;
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncCounts {
    pub teams: usize,
    pub players: usize,
    pub fixtures: usize,
}

/// Game API timestamps are RFC 3339; anything else is stored as NULL.
pub fn parse_kickoff(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Replace the current-season teams, players and fixtures in one transaction.
pub async fn replace_current_season(
    pool: &PgPool,
    season: &str,
    bootstrap: &Bootstrap,
    fixtures: &[ApiFixture],
) -> Result<SyncCounts> {
    let teams = teams_table(season);
    let players = players_table(season);
    let fixtures_tbl = fixtures_table(season);
    let mut counts = SyncCounts::default();

    let mut tx = pool.begin().await?;

    for table in [&fixtures_tbl, &players, &teams] {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await?;
    }

    let insert_team = format!(
        "INSERT INTO {} (id, name, short_name, code, strength) VALUES ($1, $2, $3, $4, $5)",
        teams
    );
    for team in &bootstrap.teams {
        sqlx::query(&insert_team)
            .bind(team.id as i32)
            .bind(&team.name)
            .bind(&team.short_name)
            .bind(team.code.to_string())
            .bind(team.strength)
            .execute(&mut *tx)
            .await?;
        counts.teams += 1;
    }

    let insert_player = format!(
        r#"
        INSERT INTO {} (
            id, web_name, first_name, second_name, element_type, now_cost, team_id, status,
            total_points, minutes, goals_scored, assists, clean_sheets, goals_conceded,
            saves, bonus, expected_goals, expected_assists
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        "#,
        players
    );
    for p in bootstrap.players() {
        sqlx::query(&insert_player)
            .bind(p.id as i32)
            .bind(&p.web_name)
            .bind(&p.first_name)
            .bind(&p.second_name)
            .bind(i32::from(p.element_type))
            .bind(p.now_cost)
            .bind(p.team as i32)
            .bind(&p.status)
            .bind(p.total_points)
            .bind(p.minutes)
            .bind(p.goals_scored)
            .bind(p.assists)
            .bind(p.clean_sheets)
            .bind(p.goals_conceded)
            .bind(p.saves)
            .bind(p.bonus)
            .bind(p.expected_goals)
            .bind(p.expected_assists)
            .execute(&mut *tx)
            .await?;
        counts.players += 1;
    }

    let insert_fixture = format!(
        r#"
        INSERT INTO {} (id, event, team_h, team_a, team_h_difficulty, team_a_difficulty, kickoff_time)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
        fixtures_tbl
    );
    for f in fixtures {
        sqlx::query(&insert_fixture)
            .bind(f.id as i32)
            .bind(f.event.map(|e| e as i32))
            .bind(f.team_h as i32)
            .bind(f.team_a as i32)
            .bind(f.team_h_difficulty)
            .bind(f.team_a_difficulty)
            .bind(parse_kickoff(f.kickoff_time.as_deref()))
            .execute(&mut *tx)
            .await?;
        counts.fixtures += 1;
    }

    tx.commit().await?;
    info!(
        "Synced {} teams, {} players, {} fixtures into season {}",
        counts.teams, counts.players, counts.fixtures, season
    );
    Ok(counts)
}

/// Insert or update one location block of team statistics.
pub async fn upsert_team_stats(pool: &PgPool, location: Location, rows: &[TeamStats]) -> Result<usize> {
    let sql = format!(
        r#"
        INSERT INTO {} (
            team_id, team_name, games_played, goals_scored, goals_conceded, clean_sheets,
            expected_goals, expected_goals_conceded, wins, draws, losses, points
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (team_id) DO UPDATE SET
            team_name = EXCLUDED.team_name,
            games_played = EXCLUDED.games_played,
            goals_scored = EXCLUDED.goals_scored,
            goals_conceded = EXCLUDED.goals_conceded,
            clean_sheets = EXCLUDED.clean_sheets,
            expected_goals = EXCLUDED.expected_goals,
            expected_goals_conceded = EXCLUDED.expected_goals_conceded,
            wins = EXCLUDED.wins,
            draws = EXCLUDED.draws,
            losses = EXCLUDED.losses,
            points = EXCLUDED.points,
            updated_at = now()
        "#,
        team_stats_table(location)
    );

    let mut tx = pool.begin().await?;
    for row in rows {
        sqlx::query(&sql)
            .bind(row.team_id as i32)
            .bind(&row.team_name)
            .bind(row.games_played as i32)
            .bind(row.goals_scored as i32)
            .bind(row.goals_conceded as i32)
            .bind(row.clean_sheets as i32)
            .bind(row.expected_goals)
            .bind(row.expected_goals_conceded)
            .bind(row.wins as i32)
            .bind(row.draws as i32)
            .bind(row.losses as i32)
            .bind(row.points as i32)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!("Upserted {} rows into {}", rows.len(), team_stats_table(location));
    Ok(rows.len())
}

fn non_negative(v: i32) -> u32 {
    u32::try_from(v).unwrap_or(0)
}

#[derive(Debug, FromRow)]
struct TeamDbRow {
    id: i32,
    name: String,
    short_name: String,
    code: String,
    strength: Option<i32>,
}

pub async fn load_teams(pool: &PgPool, season: &str) -> Result<Vec<Team>> {
    let sql = format!(
        "SELECT id, name, short_name, code, strength FROM {} ORDER BY short_name",
        teams_table(season)
    );
    let rows: Vec<TeamDbRow> = sqlx::query_as(&sql).fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|r| Team {
            id: non_negative(r.id),
            name: r.name,
            short_name: r.short_name,
            code: r.code,
            strength: r.strength,
        })
        .collect())
}

/// One `players.json` row.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PlayerExportRow {
    pub id: i32,
    pub web_name: String,
    pub element_type: i32,
    pub now_cost: i32,
    pub team_id: i32,
    /// Short name of the player's club.
    pub team_name: String,
    pub total_points: i32,
    pub goals_scored: i32,
    pub assists: i32,
    pub expected_goals: f64,
    pub expected_assists: f64,
    pub clean_sheets: i32,
    pub goals_conceded: i32,
    pub bonus: i32,
    pub saves: i32,
    pub minutes: i32,
    /// Previous-season price, 0 when unknown or out of range.
    pub last_cost: i32,
    pub team_rank: Option<i32>,
}

pub async fn load_players(pool: &PgPool, season: &str) -> Result<Vec<PlayerExportRow>> {
    let sql = format!(
        r#"
        SELECT p.id, p.web_name, p.element_type, p.now_cost, p.team_id,
               t.short_name AS team_name, p.total_points,
               p.goals_scored, p.assists,
               p.expected_goals::float8 AS expected_goals,
               p.expected_assists::float8 AS expected_assists,
               p.clean_sheets, p.goals_conceded, p.bonus, p.saves, p.minutes,
               CASE
                   WHEN p_old.now_cost > 0 AND p_old.now_cost < 20 THEN p_old.now_cost
                   ELSE 0
               END AS last_cost,
               t.strength AS team_rank
        FROM {players} p
        JOIN {teams} t ON p.team_id = t.id
        LEFT JOIN {previous} p_old ON p.id = p_old.id
        WHERE p.element_type != 5
        ORDER BY t.name, p.web_name
        "#,
        players = players_table(season),
        teams = teams_table(season),
        previous = PREVIOUS_PLAYERS_TABLE,
    );
    Ok(sqlx::query_as(&sql).fetch_all(pool).await?)
}

/// One `fixtures.json` row.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FixtureExportRow {
    pub id: i32,
    pub event: Option<i32>,
    pub team_h: i32,
    pub team_a: i32,
    pub team_h_difficulty: Option<i32>,
    pub team_a_difficulty: Option<i32>,
    pub kickoff_time: Option<DateTime<Utc>>,
}

pub async fn load_fixtures(pool: &PgPool, season: &str) -> Result<Vec<FixtureExportRow>> {
    let sql = format!(
        r#"
        SELECT id, event, team_h, team_a, team_h_difficulty, team_a_difficulty, kickoff_time
        FROM {}
        ORDER BY event NULLS LAST, kickoff_time NULLS LAST, id
        "#,
        fixtures_table(season)
    );
    Ok(sqlx::query_as(&sql).fetch_all(pool).await?)
}

#[derive(Debug, FromRow)]
struct TeamStatsDbRow {
    team_id: i32,
    team_name: String,
    games_played: i32,
    goals_scored: i32,
    goals_conceded: i32,
    clean_sheets: i32,
    expected_goals: f64,
    expected_goals_conceded: f64,
    wins: i32,
    draws: i32,
    losses: i32,
    points: i32,
    saves: i32,
}

/// One location block, with goalkeeper saves summed per club.
/// Rows are returned unranked.
pub async fn load_team_stats(pool: &PgPool, season: &str, location: Location) -> Result<Vec<TeamStats>> {
    let sql = format!(
        r#"
        SELECT ts.team_id, ts.team_name, ts.games_played, ts.goals_scored,
               ts.goals_conceded, ts.clean_sheets,
               ts.expected_goals::float8 AS expected_goals,
               ts.expected_goals_conceded::float8 AS expected_goals_conceded,
               ts.wins, ts.draws, ts.losses, ts.points,
               COALESCE(gk.total_saves, 0)::int4 AS saves
        FROM {stats} ts
        JOIN {teams} t ON ts.team_id = t.id
        LEFT JOIN (
            SELECT team_id, SUM(saves) AS total_saves
            FROM {players}
            WHERE element_type = 1
            GROUP BY team_id
        ) gk ON ts.team_id = gk.team_id
        ORDER BY ts.team_name
        "#,
        stats = team_stats_table(location),
        teams = teams_table(season),
        players = players_table(season),
    );

    let rows: Vec<TeamStatsDbRow> = sqlx::query_as(&sql).fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|r| TeamStats {
            team_id: non_negative(r.team_id),
            team_name: r.team_name,
            games_played: non_negative(r.games_played),
            goals_scored: non_negative(r.goals_scored),
            goals_conceded: non_negative(r.goals_conceded),
            clean_sheets: non_negative(r.clean_sheets),
            expected_goals: r.expected_goals,
            expected_goals_conceded: r.expected_goals_conceded,
            wins: non_negative(r.wins),
            draws: non_negative(r.draws),
            losses: non_negative(r.losses),
            points: non_negative(r.points),
            saves: non_negative(r.saves),
            attack_rank: None,
            defense_rank: None,
        })
        .collect())
}
