//! Runtime configuration, read once from the environment and passed into
//! every server start and offline run.

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

pub const DEFAULT_FPL_API_BASE: &str = "https://fantasy.premierleague.com/api";

/// Origins the browser front end is served from in development.
const DEFAULT_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5000",
    "http://127.0.0.1:5000",
];

/// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the JSON snapshots.
    pub data_dir: PathBuf,
    /// Front-end assets served under `/` and `/static`.
    pub static_dir: PathBuf,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    /// Serve synthetic history while no history snapshot exists.
    pub synthesize_missing_history: bool,
    /// Only the offline tool needs a database.
    pub database_url: Option<String>,
    /// Suffix of the current-season tables (`teams_2025`, ...).
    pub season: String,
    pub fpl_api_base: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let season = env::var("SEASON").unwrap_or_else(|_| "2025".to_string());
        validate_season(&season)?;

        // Database URL: explicit, or assembled from parts when a password is given
        let database_url = match env::var("DATABASE_URL") {
            Ok(v) => Some(v),
            Err(_) => env::var("DB_PASSWORD").ok().map(|password| {
                let user = env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string());
                let host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
                let port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
                let name = env::var("DB_NAME").unwrap_or_else(|_| "postgres".to_string());
                format!("postgresql://{}:{}@{}:{}/{}", user, password, host, port, name)
            }),
        };

        let allowed_origins = match env::var("ALLOWED_ORIGINS") {
            Ok(v) if !v.trim().is_empty() => parse_origins(&v),
            _ => DEFAULT_ORIGINS.iter().map(|s| s.to_string()).collect(),
        };

        Ok(Self {
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            static_dir: env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("static")),
            port: env::var("PORT")
                .unwrap_or_else(|_| "5001".to_string())
                .parse()
                .unwrap_or(5001),
            allowed_origins,
            synthesize_missing_history: env::var("SYNTHESIZE_MISSING_HISTORY")
                .unwrap_or_else(|_| "false".to_string())
                .to_lowercase()
                == "true",
            database_url,
            season,
            fpl_api_base: env::var("FPL_API_BASE")
                .unwrap_or_else(|_| DEFAULT_FPL_API_BASE.to_string()),
        })
    }

    /// Checked only by the commands that connect, so the server starts
    /// whatever the database settings are.
    pub fn require_database_url(&self) -> Result<&str> {
        match self.database_url.as_deref() {
            Some(url) if !url.trim().is_empty() => Ok(url),
            Some(_) => Err(anyhow!("DATABASE_URL is set but empty")),
            None => Err(anyhow!("DATABASE_URL (or DB_PASSWORD) must be set for this command")),
        }
    }
}

/// Season suffixes end up in table names, so only digits are accepted.
pub fn validate_season(season: &str) -> Result<()> {
    if season.is_empty() || !season.chars().all(|c| c.is_ascii_digit()) {
        return Err(anyhow!("SEASON must be digits only, got '{}'", season));
    }
    Ok(())
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Load `.env` from the working directory or the crate directory, once.
pub fn load_dotenv() {
    static ONCE: std::sync::OnceLock<()> = std::sync::OnceLock::new();
    ONCE.get_or_init(|| {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Ok(cwd) = env::current_dir() {
            candidates.push(cwd.join(".env"));
        }
        candidates.push(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".env"));

        for p in candidates {
            if p.exists() && dotenvy::from_path(&p).is_ok() {
                tracing::debug!("Loaded .env from {}", p.display());
                return;
            }
        }
    });
}
