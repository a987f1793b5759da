//! Domain values shared by the reconciliation pipeline and the snapshot API.

use serde::{Deserialize, Serialize};

/// Player position as published by the game API (`element_type` 1-4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    #[serde(rename = "GKP")]
    Goalkeeper,
    #[serde(rename = "DEF")]
    Defender,
    #[serde(rename = "MID")]
    Midfielder,
    #[serde(rename = "FWD")]
    Forward,
}

impl Position {
    pub const ALL: [Position; 4] = [
        Position::Goalkeeper,
        Position::Defender,
        Position::Midfielder,
        Position::Forward,
    ];

    /// Numeric element type used by the game API.
    pub fn element_type(self) -> u8 {
        match self {
            Position::Goalkeeper => 1,
            Position::Defender => 2,
            Position::Midfielder => 3,
            Position::Forward => 4,
        }
    }

    /// Element type 5 (managers) and anything else outside 1-4 has no position.
    pub fn from_element_type(element_type: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.element_type() == element_type)
    }

    pub fn code(self) -> &'static str {
        match self {
            Position::Goalkeeper => "GKP",
            Position::Defender => "DEF",
            Position::Midfielder => "MID",
            Position::Forward => "FWD",
        }
    }

    /// Accepts either a position code (any case) or its 1-4 numeric form.
    pub fn parse_token(token: &str) -> Option<Self> {
        let token = token.trim();
        if let Ok(n) = token.parse::<u8>() {
            return Self::from_element_type(n);
        }
        Self::ALL
            .into_iter()
            .find(|p| p.code().eq_ignore_ascii_case(token))
    }
}

/// One club within a single season.
///
/// `code` is the league-assigned club code and the only attribute that stays
/// stable across seasons; `id` is reassigned every season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: u32,
    pub name: String,
    pub short_name: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<i32>,
}

/// One player within a single season. `id` is season-local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: u32,
    pub display_name: String,
    pub team_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

/// One player's performance in one fixture, keyed by season-local ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub player_id: u32,
    pub opponent_team_id: u32,
    pub gameweek: u32,
    pub was_home: bool,
    pub total_points: i32,
    pub minutes: i32,
    pub goals_scored: i32,
    pub assists: i32,
    pub clean_sheets: i32,
    pub goals_conceded: i32,
    pub bonus: i32,
    pub saves: i32,
    pub expected_goals: f64,
    pub expected_assists: f64,
    pub expected_goals_conceded: f64,
}

/// Per-fixture stat line as published in the history snapshot.
///
/// Identity fields are dropped: the enclosing keys (player name, opponent)
/// already carry them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureLine {
    pub gameweek: u32,
    pub total_points: i32,
    pub minutes: i32,
    pub goals_scored: i32,
    pub assists: i32,
    pub clean_sheets: i32,
    pub goals_conceded: i32,
    pub bonus: i32,
    pub saves: i32,
    pub expected_goals: f64,
    pub expected_assists: f64,
    pub expected_goals_conceded: f64,
    pub was_home: bool,
}

impl From<&FixtureRecord> for FixtureLine {
    fn from(r: &FixtureRecord) -> Self {
        Self {
            gameweek: r.gameweek,
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
            was_home: r.was_home,
        }
    }
}

/// Response body of the player-vs-opponent history lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub fixtures: Vec<FixtureLine>,
    pub is_new_player: bool,
}

impl HistoryEntry {
    /// Known player, no meetings with the requested opponent.
    pub fn no_meetings() -> Self {
        Self {
            fixtures: Vec::new(),
            is_new_player: false,
        }
    }

    /// Player absent from the historical snapshot entirely.
    pub fn new_player() -> Self {
        Self {
            fixtures: Vec::new(),
            is_new_player: true,
        }
    }
}

/// Aggregate team statistics for one location block (home, away or overall).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    pub team_id: u32,
    pub team_name: String,
    pub games_played: u32,
    pub goals_scored: u32,
    pub goals_conceded: u32,
    pub clean_sheets: u32,
    pub expected_goals: f64,
    pub expected_goals_conceded: f64,
    #[serde(default)]
    pub wins: u32,
    #[serde(default)]
    pub draws: u32,
    #[serde(default)]
    pub losses: u32,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub saves: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defense_rank: Option<u32>,
}

/// One team's place in the attack or defense ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRanking {
    pub team_id: u32,
    pub team_name: String,
    pub rank: u32,
    pub weighted_score: f64,
}

/// Which aggregate block of team statistics a request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Home,
    Away,
    Overall,
}

impl Location {
    pub const ALL: [Location; 3] = [Location::Home, Location::Away, Location::Overall];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "home" => Some(Location::Home),
            "away" => Some(Location::Away),
            "overall" => Some(Location::Overall),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Location::Home => "home",
            Location::Away => "away",
            Location::Overall => "overall",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_tokens_accept_codes_and_numbers() {
        assert_eq!(Position::parse_token("gkp"), Some(Position::Goalkeeper));
        assert_eq!(Position::parse_token(" FWD "), Some(Position::Forward));
        assert_eq!(Position::parse_token("3"), Some(Position::Midfielder));
        assert_eq!(Position::parse_token("5"), None);
        assert_eq!(Position::parse_token("XXX"), None);
    }

    #[test]
    fn managers_have_no_position() {
        assert_eq!(Position::from_element_type(5), None);
        assert_eq!(Position::from_element_type(2), Some(Position::Defender));
    }

    #[test]
    fn location_is_case_sensitive() {
        assert_eq!(Location::parse("home"), Some(Location::Home));
        assert_eq!(Location::parse("Home"), None);
        assert_eq!(Location::parse("neutral"), None);
    }
}
