//! Timestamped JSON snapshot documents, one per data domain.
//!
//! Teams, players, fixtures and player history use the
//! `{"last_updated", "data"}` envelope. Team stats and rankings put their
//! blocks (`home`/`away`/`overall`, `attack`/`defense`) at the top level next
//! to `last_updated` instead; the front end depends on both shapes.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use crate::error::SnapshotError;
use crate::model::{TeamRanking, TeamStats};
use crate::ranking::Rankings;

pub const TEAMS_FILE: &str = "teams.json";
pub const PLAYERS_FILE: &str = "players.json";
pub const FIXTURES_FILE: &str = "fixtures.json";
pub const TEAM_STATS_FILE: &str = "team-stats.json";
pub const TEAM_RANKINGS_FILE: &str = "team-rankings.json";
pub const PLAYER_HISTORY_FILE: &str = "player-history.json";

/// Files reported by the data-status endpoint, in report order.
pub const STATUS_FILES: [&str; 6] = [
    TEAMS_FILE,
    PLAYERS_FILE,
    FIXTURES_FILE,
    TEAM_STATS_FILE,
    TEAM_RANKINGS_FILE,
    PLAYER_HISTORY_FILE,
];

/// `{"last_updated": ..., "data": ...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub last_updated: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn now(data: T) -> Self {
        Self {
            last_updated: timestamp(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamStatsDocument {
    pub last_updated: String,
    pub home: Vec<TeamStats>,
    pub away: Vec<TeamStats>,
    pub overall: Vec<TeamStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingsDocument {
    pub last_updated: String,
    pub attack: Vec<TeamRanking>,
    pub defense: Vec<TeamRanking>,
}

impl RankingsDocument {
    pub fn into_rankings(self) -> Rankings {
        Rankings {
            attack: self.attack,
            defense: self.defense,
        }
    }
}

pub fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Directory of snapshot files. Cheap to clone; holds no open handles.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Read and parse a snapshot as untyped JSON.
    pub async fn read_value(&self, name: &str) -> Result<Value, SnapshotError> {
        self.read(name).await
    }

    /// Read and parse a snapshot into `T`.
    pub async fn read<T: DeserializeOwned>(&self, name: &str) -> Result<T, SnapshotError> {
        let path = self.path(name);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SnapshotError::Missing(path))
            }
            Err(source) => return Err(SnapshotError::Io { path, source }),
        };
        serde_json::from_str(&raw).map_err(|source| SnapshotError::Malformed { path, source })
    }

    /// Serialize `value` and replace `name` in one step.
    ///
    /// The document is written to a temporary sibling first and then renamed
    /// over the target, so readers see either the old file or the new one.
    pub async fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, SnapshotError> {
        let path = self.path(name);
        let tmp = self.dir.join(format!(".{name}.tmp"));
        let body = serde_json::to_vec_pretty(value).map_err(|source| SnapshotError::Malformed {
            path: path.clone(),
            source,
        })?;

        let io = |source| SnapshotError::Io {
            path: path.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(io)?;
        tokio::fs::write(&tmp, body).await.map_err(io)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io)?;

        info!("Wrote {}", path.display());
        Ok(path)
    }

    /// Wrap `data` in the `last_updated`/`data` envelope and write it.
    pub async fn write_envelope<T: Serialize>(
        &self,
        name: &str,
        data: T,
    ) -> Result<PathBuf, SnapshotError> {
        self.write(name, &Envelope::now(data)).await
    }

    pub async fn write_team_stats(
        &self,
        home: Vec<TeamStats>,
        away: Vec<TeamStats>,
        overall: Vec<TeamStats>,
    ) -> Result<PathBuf, SnapshotError> {
        let doc = TeamStatsDocument {
            last_updated: timestamp(),
            home,
            away,
            overall,
        };
        self.write(TEAM_STATS_FILE, &doc).await
    }

    pub async fn write_rankings(&self, rankings: &Rankings) -> Result<PathBuf, SnapshotError> {
        let doc = RankingsDocument {
            last_updated: timestamp(),
            attack: rankings.attack.clone(),
            defense: rankings.defense.clone(),
        };
        self.write(TEAM_RANKINGS_FILE, &doc).await
    }

    /// Per-file existence, `last_updated` and size.
    pub async fn data_status(&self) -> Value {
        let mut status = Map::new();
        for name in STATUS_FILES {
            let path = self.path(name);
            let size = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.len(),
                Err(_) => {
                    status.insert(name.to_string(), json!({ "exists": false }));
                    continue;
                }
            };

            let entry = match self.read_value(name).await {
                Ok(doc) => json!({
                    "exists": true,
                    "last_updated": doc.get("last_updated").cloned().unwrap_or_else(|| json!("Unknown")),
                    "size": size,
                }),
                Err(e) => json!({ "exists": true, "error": e.to_string() }),
            };
            status.insert(name.to_string(), entry);
        }
        Value::Object(status)
    }
}
