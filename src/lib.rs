//! Fantasy football draft planner.
//!
//! The offline side reconciles a previous season's players and clubs with
//! the current season and writes JSON snapshots; the server side answers
//! read-only queries from those snapshots.

pub mod aggregate;
pub mod api;
pub mod config;
pub mod csv_import;
pub mod db;
pub mod error;
pub mod filters;
pub mod fpl;
pub mod history;
pub mod matcher;
pub mod model;
pub mod pipeline;
pub mod ranking;
pub mod registry;
pub mod snapshot;

/// Install the `tracing` subscriber shared by both binaries.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("draft_planner=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
