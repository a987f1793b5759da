use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Violations of the one-season registry invariants.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate team id {0} in {1} registry")]
    DuplicateTeamId(u32, String),

    #[error("duplicate team code {0} in {1} registry")]
    DuplicateTeamCode(String, String),

    #[error("duplicate player id {0} in {1} registry")]
    DuplicatePlayerId(u32, String),
}

/// Failures reading or writing snapshot documents.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("malformed snapshot {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// HTTP-facing error taxonomy. Always rendered as `{"error": message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The snapshot file backing the route is absent.
    #[error("{0} data not found")]
    MissingSnapshot(&'static str),

    #[error("Missing {0} parameter")]
    MissingParameter(&'static str),

    /// A selector (location, ranking type) names a block the snapshot lacks.
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingSnapshot(_) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps a snapshot failure onto the HTTP taxonomy for the named domain.
    pub fn from_snapshot(domain: &'static str, err: SnapshotError) -> Self {
        match err {
            SnapshotError::Missing(_) => ApiError::MissingSnapshot(domain),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        assert_eq!(ApiError::MissingSnapshot("Teams").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::MissingParameter("player_name").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_snapshot_maps_to_404() {
        let err = ApiError::from_snapshot("Teams", SnapshotError::Missing("data/teams.json".into()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Teams data not found");
    }
}
