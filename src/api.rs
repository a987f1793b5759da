//! Read-only HTTP surface over the snapshot directory.
//!
//! Every request opens and parses its snapshot from disk; nothing is cached,
//! so a freshly written snapshot is served on the next request.

use axum::{
    extract::{Query, State},
    http::{HeaderValue, Method, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::Config;
use crate::error::{ApiError, SnapshotError};
use crate::filters::{filter_players, parse_positions};
use crate::history::{self, PlayerHistoryData};
use crate::model::{HistoryEntry, Location};
use crate::snapshot::{
    Envelope, SnapshotStore, FIXTURES_FILE, PLAYERS_FILE, PLAYER_HISTORY_FILE, TEAMS_FILE,
    TEAM_RANKINGS_FILE, TEAM_STATS_FILE,
};

pub const SERVICE_NAME: &str = "draft-planner";

/// Front-end entry page inside the static directory.
pub const INDEX_PAGE: &str = "fpl_draft_planner.html";

type ApiResult = Result<Json<Value>, ApiError>;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: SnapshotStore,
    pub synthesize_missing_history: bool,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        Self {
            store: SnapshotStore::new(&config.data_dir),
            synthesize_missing_history: config.synthesize_missing_history,
        }
    }

    async fn load(&self, domain: &'static str, file: &str) -> Result<Value, ApiError> {
        self.store
            .read_value(file)
            .await
            .map_err(|e| ApiError::from_snapshot(domain, e))
    }

    /// Load an enveloped snapshot and return its `data` payload.
    async fn load_data(&self, domain: &'static str, file: &str) -> Result<Value, ApiError> {
        match self.load(domain, file).await? {
            Value::Object(mut doc) => doc
                .remove("data")
                .ok_or_else(|| ApiError::Internal(format!("{} snapshot has no data field", domain))),
            _ => Err(ApiError::Internal(format!("{} snapshot is not an object", domain))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayersQuery {
    pub position: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LocationQuery {
    pub location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RankingQuery {
    #[serde(rename = "type")]
    pub ranking_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub player_name: Option<String>,
    pub opponent_team_id: Option<String>,
}

/// Build the application router: API routes, static front end, CORS.
pub fn router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/teams", get(get_teams))
        .route("/api/players", get(get_players))
        .route("/api/fixtures", get(get_fixtures))
        .route("/api/team-stats", get(get_team_stats))
        .route("/api/team-rankings", get(get_team_rankings))
        .route("/api/team-rankings-overall", get(get_team_rankings))
        .route("/api/player-fixture-history", get(get_player_fixture_history))
        .route("/api/team-fixture-history", get(get_team_fixture_history))
        .route("/api/team-saves", get(get_team_saves))
        .route("/api/data-status", get(get_data_status))
        .with_state(state)
        .route_service("/", ServeFile::new(config.static_dir.join(INDEX_PAGE)))
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::OPTIONS])
}

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let data_dir_present = tokio::fs::metadata(state.store.dir()).await.is_ok();
    (
        StatusCode::OK,
        Json(json!({
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "status": if data_dir_present { "ok" } else { "degraded" },
            "data_dir": state.store.dir().display().to_string(),
        })),
    )
}

pub async fn get_teams(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.load_data("Teams", TEAMS_FILE).await?))
}

/// Players, optionally narrowed by position. `location` is validated but
/// player totals are season-wide, so every location returns the same list.
pub async fn get_players(
    State(state): State<AppState>,
    Query(query): Query<PlayersQuery>,
) -> ApiResult {
    if let Some(loc) = query.location.as_deref() {
        if Location::parse(loc).is_none() {
            return Err(ApiError::NotFound(format!("Location {} not found", loc)));
        }
    }

    let players = match state.load_data("Players", PLAYERS_FILE).await? {
        Value::Array(list) => list,
        _ => return Err(ApiError::Internal("Players data is not a list".to_string())),
    };
    let positions = parse_positions(query.position.as_deref());
    Ok(Json(Value::Array(filter_players(players, positions.as_ref()))))
}

pub async fn get_fixtures(State(state): State<AppState>) -> ApiResult {
    Ok(Json(state.load_data("Fixtures", FIXTURES_FILE).await?))
}

pub async fn get_team_stats(
    State(state): State<AppState>,
    Query(query): Query<LocationQuery>,
) -> ApiResult {
    let requested = query.location.unwrap_or_else(|| "overall".to_string());
    let mut doc = state.load("Team stats", TEAM_STATS_FILE).await?;

    let block = Location::parse(&requested)
        .and_then(|loc| doc.get_mut(loc.as_str()))
        .map(Value::take);
    block
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Location {} not found", requested)))
}

pub async fn get_team_rankings(
    State(state): State<AppState>,
    Query(query): Query<RankingQuery>,
) -> ApiResult {
    let requested = query.ranking_type.unwrap_or_else(|| "attack".to_string());
    let mut doc = state.load("Team rankings", TEAM_RANKINGS_FILE).await?;

    let block = matches!(requested.as_str(), "attack" | "defense")
        .then(|| doc.get_mut(&requested).map(Value::take))
        .flatten();
    block
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Ranking type {} not found", requested)))
}

/// History of one player against one opponent (current team id).
pub async fn get_player_fixture_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryEntry>, ApiError> {
    let player_name = non_empty(query.player_name).ok_or(ApiError::MissingParameter("player_name"))?;
    let opponent =
        non_empty(query.opponent_team_id).ok_or(ApiError::MissingParameter("opponent_team_id"))?;

    let doc = state
        .store
        .read::<Envelope<PlayerHistoryData>>(PLAYER_HISTORY_FILE)
        .await;
    match doc {
        Ok(doc) => Ok(Json(history::lookup(&doc.data, &player_name, &opponent))),
        Err(SnapshotError::Missing(_)) if state.synthesize_missing_history => {
            Ok(Json(history::synthesize(&player_name, &opponent)))
        }
        Err(SnapshotError::Missing(_)) => Ok(Json(HistoryEntry::no_meetings())),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}

pub async fn get_team_fixture_history() -> Json<Value> {
    Json(json!({ "error": "Team fixture history not available in static mode" }))
}

pub async fn get_team_saves() -> Json<Value> {
    Json(json!([]))
}

pub async fn get_data_status(State(state): State<AppState>) -> Json<Value> {
    Json(state.store.data_status().await)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::timestamp;

    fn state(dir: &std::path::Path) -> AppState {
        AppState {
            store: SnapshotStore::new(dir),
            synthesize_missing_history: false,
        }
    }

    fn write(dir: &std::path::Path, name: &str, doc: Value) {
        std::fs::write(dir.join(name), serde_json::to_vec(&doc).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn missing_teams_snapshot_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let err = get_teams(State(state(dir.path()))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_snapshot_is_500() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FIXTURES_FILE), "[").unwrap();
        let err = get_fixtures(State(state(dir.path()))).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn teams_unwrap_the_envelope() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            TEAMS_FILE,
            json!({ "last_updated": timestamp(), "data": [{ "id": 1, "short_name": "ARS" }] }),
        );
        let Json(body) = get_teams(State(state(dir.path()))).await.unwrap();
        assert_eq!(body, json!([{ "id": 1, "short_name": "ARS" }]));
    }

    #[tokio::test]
    async fn team_stats_default_to_overall_and_reject_unknown_location() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            TEAM_STATS_FILE,
            json!({ "last_updated": timestamp(), "home": [1], "away": [2], "overall": [3] }),
        );
        let st = state(dir.path());

        let Json(body) = get_team_stats(State(st.clone()), Query(LocationQuery::default()))
            .await
            .unwrap();
        assert_eq!(body, json!([3]));

        let Json(body) = get_team_stats(
            State(st.clone()),
            Query(LocationQuery { location: Some("away".into()) }),
        )
        .await
        .unwrap();
        assert_eq!(body, json!([2]));

        let err = get_team_stats(
            State(st.clone()),
            Query(LocationQuery { location: Some("last_updated".into()) }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rankings_select_by_type() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            TEAM_RANKINGS_FILE,
            json!({ "last_updated": timestamp(), "attack": ["a"], "defense": ["d"] }),
        );
        let st = state(dir.path());

        let Json(body) = get_team_rankings(State(st.clone()), Query(RankingQuery::default()))
            .await
            .unwrap();
        assert_eq!(body, json!(["a"]));

        let err = get_team_rankings(
            State(st),
            Query(RankingQuery { ranking_type: Some("midfield".into()) }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn players_reject_unknown_location() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), PLAYERS_FILE, json!({ "last_updated": timestamp(), "data": [] }));
        let err = get_players(
            State(state(dir.path())),
            Query(PlayersQuery { position: None, location: Some("neutral".into()) }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_requires_both_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let err = get_player_fixture_history(
            State(state(dir.path())),
            Query(HistoryQuery { player_name: Some("M.Salah".into()), opponent_team_id: None }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = get_player_fixture_history(
            State(state(dir.path())),
            Query(HistoryQuery { player_name: Some(" ".into()), opponent_team_id: Some("4".into()) }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_without_snapshot_is_empty_or_synthesized() {
        let dir = tempfile::tempdir().unwrap();
        let query = || HistoryQuery {
            player_name: Some("Haaland".into()),
            opponent_team_id: Some("12".into()),
        };

        let Json(plain) = get_player_fixture_history(State(state(dir.path())), Query(query()))
            .await
            .unwrap();
        assert_eq!(plain, HistoryEntry::no_meetings());

        let synth_state = AppState {
            synthesize_missing_history: true,
            ..state(dir.path())
        };
        let Json(synth) = get_player_fixture_history(State(synth_state), Query(query()))
            .await
            .unwrap();
        assert_eq!(synth.fixtures.len(), 2);
        assert!(!synth.is_new_player);
    }

    #[tokio::test]
    async fn stub_routes_keep_their_shapes() {
        assert_eq!(get_team_saves().await.0, json!([]));
        assert!(get_team_fixture_history().await.0["error"].is_string());
    }
}
