//! One season's known teams and players.

use std::collections::HashMap;

use crate::error::RegistryError;
use crate::model::{Player, Team};

/// Teams and players of a single season, indexed by id and team code.
///
/// Insertion order is kept so that exports and logs are reproducible, but
/// nothing downstream depends on it for correctness.
#[derive(Debug, Clone, Default)]
pub struct IdentityRegistry {
    label: String,
    teams: Vec<Team>,
    players: Vec<Player>,
    team_by_id: HashMap<u32, usize>,
    team_by_code: HashMap<String, usize>,
    player_by_id: HashMap<u32, usize>,
}

impl IdentityRegistry {
    /// Build a registry, rejecting duplicate team ids, team codes or player ids.
    pub fn new(
        label: impl Into<String>,
        teams: Vec<Team>,
        players: Vec<Player>,
    ) -> Result<Self, RegistryError> {
        let label = label.into();
        let mut team_by_id = HashMap::with_capacity(teams.len());
        let mut team_by_code = HashMap::with_capacity(teams.len());

        for (idx, team) in teams.iter().enumerate() {
            if team_by_id.insert(team.id, idx).is_some() {
                return Err(RegistryError::DuplicateTeamId(team.id, label));
            }
            if team_by_code.insert(team.code.clone(), idx).is_some() {
                return Err(RegistryError::DuplicateTeamCode(team.code.clone(), label));
            }
        }

        let mut player_by_id = HashMap::with_capacity(players.len());
        for (idx, player) in players.iter().enumerate() {
            if player_by_id.insert(player.id, idx).is_some() {
                return Err(RegistryError::DuplicatePlayerId(player.id, label));
            }
        }

        Ok(Self {
            label,
            teams,
            players,
            team_by_id,
            team_by_code,
            player_by_id,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn team(&self, id: u32) -> Option<&Team> {
        self.team_by_id.get(&id).map(|&i| &self.teams[i])
    }

    pub fn team_by_code(&self, code: &str) -> Option<&Team> {
        self.team_by_code.get(code).map(|&i| &self.teams[i])
    }

    pub fn player(&self, id: u32) -> Option<&Player> {
        self.player_by_id.get(&id).map(|&i| &self.players[i])
    }

    /// Stable club code of the team a player belongs to, if that team is known.
    pub fn team_code_of(&self, player: &Player) -> Option<&str> {
        self.team(player.team_id).map(|t| t.code.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(id: u32, code: &str) -> Team {
        Team {
            id,
            name: format!("Team {id}"),
            short_name: format!("T{id}"),
            code: code.to_string(),
            strength: None,
        }
    }

    fn player(id: u32, name: &str, team_id: u32) -> Player {
        Player {
            id,
            display_name: name.to_string(),
            team_id,
            position: None,
        }
    }

    #[test]
    fn lookups_by_id_and_code() {
        let reg = IdentityRegistry::new(
            "2025",
            vec![team(1, "3"), team(12, "14")],
            vec![player(7, "M.Salah", 12)],
        )
        .unwrap();

        assert_eq!(reg.team(12).map(|t| t.code.as_str()), Some("14"));
        assert_eq!(reg.team_by_code("3").map(|t| t.id), Some(1));
        assert!(reg.team_by_code("91").is_none());
        let salah = reg.player(7).unwrap();
        assert_eq!(reg.team_code_of(salah), Some("14"));
    }

    #[test]
    fn duplicate_code_is_rejected() {
        let err = IdentityRegistry::new("2024", vec![team(1, "3"), team(2, "3")], vec![])
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateTeamCode(code, _) if code == "3"));
    }

    #[test]
    fn duplicate_player_id_is_rejected() {
        let err = IdentityRegistry::new(
            "2024",
            vec![team(1, "3")],
            vec![player(5, "A", 1), player(5, "B", 1)],
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicatePlayerId(5, _)));
    }
}
