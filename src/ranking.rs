//! Weighted attack/defense scores and team orderings.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{TeamRanking, TeamStats};

const ATTACK_GOALS_WEIGHT: f64 = 0.7;
const ATTACK_XG_WEIGHT: f64 = 0.3;
const DEFENSE_CONCEDED_WEIGHT: f64 = 0.6;
const DEFENSE_XGC_WEIGHT: f64 = 0.2;
const DEFENSE_CLEAN_SHEET_WEIGHT: f64 = 0.2;

/// Rank given to a team that could not be ranked at a location.
pub const UNRANKED_DEFAULT: u32 = 10;

/// Attack and defense orderings over the same set of teams.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rankings {
    pub attack: Vec<TeamRanking>,
    pub defense: Vec<TeamRanking>,
}

/// Goals per game blended with expected goals. Higher is better.
/// `None` when the team has not played.
pub fn attack_score(stats: &TeamStats) -> Option<f64> {
    if stats.games_played == 0 {
        return None;
    }
    let weighted = ATTACK_GOALS_WEIGHT * f64::from(stats.goals_scored)
        + ATTACK_XG_WEIGHT * stats.expected_goals;
    Some(weighted / f64::from(stats.games_played))
}

/// Goals conceded per game blended with xGC, minus a clean-sheet credit.
/// Lower is better. `None` when the team has not played.
///
/// The clean-sheet term is a season total, not per game.
pub fn defense_score(stats: &TeamStats) -> Option<f64> {
    if stats.games_played == 0 {
        return None;
    }
    let weighted = DEFENSE_CONCEDED_WEIGHT * f64::from(stats.goals_conceded)
        + DEFENSE_XGC_WEIGHT * stats.expected_goals_conceded;
    Some(
        weighted / f64::from(stats.games_played)
            - DEFENSE_CLEAN_SHEET_WEIGHT * f64::from(stats.clean_sheets),
    )
}

/// Rank every team that has played at least one game and has a finite
/// score.
///
/// Both sorts are stable: teams with equal scores keep their input order.
pub fn rank_teams(stats: &[TeamStats]) -> Rankings {
    Rankings {
        attack: ordered(stats, attack_score, |a, b| b.total_cmp(&a)),
        defense: ordered(stats, defense_score, |a, b| a.total_cmp(&b)),
    }
}

fn ordered(
    stats: &[TeamStats],
    score: fn(&TeamStats) -> Option<f64>,
    order: fn(f64, f64) -> Ordering,
) -> Vec<TeamRanking> {
    let mut scored: Vec<(&TeamStats, f64)> = stats
        .iter()
        .filter_map(|s| score(s).map(|v| (s, v)))
        .filter(|(s, v)| {
            if !v.is_finite() {
                warn!("Leaving {} unranked: non-finite score {}", s.team_name, v);
            }
            v.is_finite()
        })
        .collect();
    scored.sort_by(|a, b| order(a.1, b.1));

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (s, v))| TeamRanking {
            team_id: s.team_id,
            team_name: s.team_name.clone(),
            rank: i as u32 + 1,
            weighted_score: v,
        })
        .collect()
}

/// Stamp `attack_rank`/`defense_rank` onto each row of one location block.
/// Teams with no games get no rank.
pub fn annotate_ranks(stats: &mut [TeamStats]) {
    let rankings = rank_teams(stats);
    let attack = rank_lookup(&rankings.attack);
    let defense = rank_lookup(&rankings.defense);

    for row in stats.iter_mut() {
        row.attack_rank = attack.get(&row.team_id).copied();
        row.defense_rank = defense.get(&row.team_id).copied();
    }
}

/// team id → rank
pub fn rank_lookup(ranking: &[TeamRanking]) -> HashMap<u32, u32> {
    ranking.iter().map(|r| (r.team_id, r.rank)).collect()
}
