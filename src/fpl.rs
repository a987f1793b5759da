//! Client for the public fantasy game API.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::RegistryError;
use crate::model::{Player, Position, Team};
use crate::registry::IdentityRegistry;

/// Element type the game API uses for managers; never a squad player.
pub const MANAGER_ELEMENT_TYPE: u8 = 5;

const REQUESTS_PER_SECOND: u32 = 2;

/// Stats the API publishes as decimal strings (`"1.23"`) but sometimes as numbers.
fn decimal<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n.as_f64().unwrap_or_default()),
        Value::String(s) if s.trim().is_empty() => Ok(0.0),
        Value::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Value::Null => Ok(0.0),
        other => Err(serde::de::Error::custom(format!("expected decimal, got {}", other))),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTeam {
    pub id: u32,
    pub name: String,
    pub short_name: String,
    pub code: u32,
    #[serde(default)]
    pub strength: Option<i32>,
}

impl From<&ApiTeam> for Team {
    fn from(t: &ApiTeam) -> Self {
        Team {
            id: t.id,
            name: t.name.clone(),
            short_name: t.short_name.clone(),
            code: t.code.to_string(),
            strength: t.strength,
        }
    }
}

/// One `elements` entry from bootstrap-static.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiElement {
    pub id: u32,
    pub web_name: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub second_name: Option<String>,
    pub element_type: u8,
    pub now_cost: i32,
    pub team: u32,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_points: i32,
    #[serde(default)]
    pub minutes: i32,
    #[serde(default)]
    pub goals_scored: i32,
    #[serde(default)]
    pub assists: i32,
    #[serde(default)]
    pub clean_sheets: i32,
    #[serde(default)]
    pub goals_conceded: i32,
    #[serde(default)]
    pub saves: i32,
    #[serde(default)]
    pub bonus: i32,
    #[serde(default, deserialize_with = "decimal")]
    pub expected_goals: f64,
    #[serde(default, deserialize_with = "decimal")]
    pub expected_assists: f64,
}

impl ApiElement {
    pub fn is_manager(&self) -> bool {
        self.element_type == MANAGER_ELEMENT_TYPE
    }

    pub fn to_player(&self) -> Player {
        Player {
            id: self.id,
            display_name: self.web_name.clone(),
            team_id: self.team,
            position: Position::from_element_type(self.element_type),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Bootstrap {
    pub teams: Vec<ApiTeam>,
    pub elements: Vec<ApiElement>,
}

impl Bootstrap {
    /// Squad players only.
    pub fn players(&self) -> impl Iterator<Item = &ApiElement> {
        self.elements.iter().filter(|e| !e.is_manager())
    }

    /// Identity registry for the season this payload describes.
    pub fn registry(&self, label: &str) -> Result<IdentityRegistry, RegistryError> {
        IdentityRegistry::new(
            label,
            self.teams.iter().map(Team::from).collect(),
            self.players().map(ApiElement::to_player).collect(),
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiFixture {
    pub id: u32,
    /// Gameweek; unscheduled fixtures have none.
    pub event: Option<u32>,
    pub team_h: u32,
    pub team_a: u32,
    #[serde(default)]
    pub team_h_difficulty: Option<i32>,
    #[serde(default)]
    pub team_a_difficulty: Option<i32>,
    pub kickoff_time: Option<String>,
}

/// Rate-limited game API client
pub struct FplClient {
    base: String,
    http: reqwest::Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl FplClient {
    pub fn new(base: &str) -> Result<Self> {
        let per_second =
            NonZeroU32::new(REQUESTS_PER_SECOND).ok_or_else(|| anyhow!("rate limit must be non-zero"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            http,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/{}", self.base, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            return Err(anyhow!("Game API error (status {}) for {}: {}", status, url, body));
        }

        serde_json::from_str(&body).with_context(|| format!("Failed to parse {}", url))
    }

    pub async fn bootstrap(&self) -> Result<Bootstrap> {
        let data: Bootstrap = self.get_json("bootstrap-static/").await?;
        info!(
            "Fetched {} teams and {} elements from the game API",
            data.teams.len(),
            data.elements.len()
        );
        Ok(data)
    }

    pub async fn fixtures(&self) -> Result<Vec<ApiFixture>> {
        let fixtures: Vec<ApiFixture> = self.get_json("fixtures/").await?;
        info!("Fetched {} fixtures from the game API", fixtures.len());
        Ok(fixtures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOTSTRAP: &str = r#"{
        "teams": [
            {"id": 1, "name": "Arsenal", "short_name": "ARS", "code": 3, "strength": 5},
            {"id": 12, "name": "Liverpool", "short_name": "LIV", "code": 14, "strength": 5}
        ],
        "elements": [
            {"id": 381, "web_name": "M.Salah", "element_type": 3, "now_cost": 145, "team": 12,
             "total_points": 344, "expected_goals": "27.71", "expected_assists": 14.2},
            {"id": 700, "web_name": "Slot", "element_type": 5, "now_cost": 15, "team": 12,
             "expected_goals": ""}
        ],
        "events": []
    }"#;

    #[test]
    fn bootstrap_decodes_string_decimals() {
        let data: Bootstrap = serde_json::from_str(BOOTSTRAP).unwrap();
        assert_eq!(data.elements[0].expected_goals, 27.71);
        assert_eq!(data.elements[0].expected_assists, 14.2);
        assert_eq!(data.elements[1].expected_goals, 0.0);
    }

    #[test]
    fn managers_are_left_out_of_the_registry() {
        let data: Bootstrap = serde_json::from_str(BOOTSTRAP).unwrap();
        let registry = data.registry("2025").unwrap();
        assert_eq!(registry.players().len(), 1);
        assert_eq!(registry.team(12).map(|t| t.code.as_str()), Some("14"));
        assert_eq!(
            registry.player(381).and_then(|p| p.position),
            Some(Position::Midfielder)
        );
    }

    #[test]
    fn unscheduled_fixtures_have_no_event() {
        let raw = r#"[{"id": 5, "event": null, "team_h": 1, "team_a": 12,
                       "team_h_difficulty": 4, "team_a_difficulty": 3, "kickoff_time": null}]"#;
        let fixtures: Vec<ApiFixture> = serde_json::from_str(raw).unwrap();
        assert_eq!(fixtures[0].event, None);
        assert_eq!(fixtures[0].team_h_difficulty, Some(4));
    }

    #[test]
    fn base_url_is_normalised() {
        let client = FplClient::new("https://example.test/api/").unwrap();
        assert_eq!(client.base, "https://example.test/api");
    }
}
