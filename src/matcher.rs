//! Cross-season identity matching.
//!
//! Team ids are reassigned every season, so teams are matched through the
//! league club code. Player ids are season-local too; players are matched by
//! display name, exact first, then by substring containment.
//!
//! When several current players qualify, the winner is chosen by a total
//! order over candidates rather than by iteration order:
//! 1. exact name match before substring match
//! 2. same club (by code) before any other club
//! 3. smaller name-length difference
//! 4. lower-cased name, then current player id

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::model::Player;
use crate::registry::IdentityRegistry;

/// Substring matches on very short names ("Son", "Jo") are too loose below this.
pub const MIN_SUBSTRING_LEN: usize = 3;

/// How a historical player was tied to a current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    Exact,
    Substring,
}

/// Historical → current identity translation produced by one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct IdentityMapping {
    /// Historical club code → current team id.
    pub team_code_map: HashMap<String, u32>,
    /// Historical team id → current team id (derived through the code).
    pub team_id_map: HashMap<u32, u32>,
    /// Historical player id → current player id.
    pub player_name_map: HashMap<u32, u32>,
}

impl IdentityMapping {
    pub fn current_team(&self, historical_team_id: u32) -> Option<u32> {
        self.team_id_map.get(&historical_team_id).copied()
    }

    pub fn current_player(&self, historical_player_id: u32) -> Option<u32> {
        self.player_name_map.get(&historical_player_id).copied()
    }
}

/// Counts for observability; unmatched identities are never hard errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    pub teams_matched: usize,
    /// Short names of historical teams whose code is gone this season.
    pub teams_unmatched: Vec<String>,
    pub players_exact: usize,
    pub players_substring: usize,
    pub players_unmatched: usize,
}

impl MatchReport {
    pub fn players_matched(&self) -> usize {
        self.players_exact + self.players_substring
    }
}

#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub mapping: IdentityMapping,
    pub report: MatchReport,
}

/// Lower-case, trim and collapse internal whitespace.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Match a historical season's registry against the current one.
pub fn match_seasons(historical: &IdentityRegistry, current: &IdentityRegistry) -> MatchOutcome {
    let mut mapping = IdentityMapping::default();
    let mut report = MatchReport::default();

    // Teams: the club code is the only cross-season anchor
    for team in historical.teams() {
        match current.team_by_code(&team.code) {
            Some(now) => {
                mapping.team_code_map.insert(team.code.clone(), now.id);
                mapping.team_id_map.insert(team.id, now.id);
                report.teams_matched += 1;
            }
            None => {
                warn!(
                    "No {} team with code {} ({}); its fixtures will be dropped",
                    current.label(),
                    team.code,
                    team.name
                );
                report.teams_unmatched.push(team.short_name.clone());
            }
        }
    }

    // Players: index current names once so exact lookups avoid the full scan
    let candidates: Vec<(String, &Player)> = current
        .players()
        .iter()
        .map(|p| (normalize_name(&p.display_name), p))
        .collect();
    let mut by_exact_name: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, (name, _)) in candidates.iter().enumerate() {
        by_exact_name.entry(name.as_str()).or_default().push(idx);
    }

    for player in historical.players() {
        let name = normalize_name(&player.display_name);
        if name.is_empty() {
            report.players_unmatched += 1;
            continue;
        }

        // Current team the historical club became, if it is still in the league
        let home_team = historical
            .team_code_of(player)
            .and_then(|code| current.team_by_code(code))
            .map(|t| t.id);

        let best = match by_exact_name.get(name.as_str()) {
            Some(exact) => exact
                .iter()
                .map(|&i| Candidate::new(MatchKind::Exact, &name, &candidates[i], home_team))
                .min_by(Candidate::rank),
            None => candidates
                .iter()
                .filter(|(cand_name, cand)| {
                    is_substring_match(&name, cand_name)
                        && home_team.map_or(true, |tid| cand.team_id == tid)
                })
                .map(|c| Candidate::new(MatchKind::Substring, &name, c, home_team))
                .min_by(Candidate::rank),
        };

        match best {
            Some(winner) => {
                debug!(
                    "{} '{}' ({}) -> '{}' ({}) via {:?}",
                    historical.label(),
                    player.display_name,
                    player.id,
                    winner.player.display_name,
                    winner.player.id,
                    winner.kind
                );
                mapping.player_name_map.insert(player.id, winner.player.id);
                match winner.kind {
                    MatchKind::Exact => report.players_exact += 1,
                    MatchKind::Substring => report.players_substring += 1,
                }
            }
            None => report.players_unmatched += 1,
        }
    }

    info!(
        "Matched {}/{} teams and {}/{} players ({} exact, {} substring)",
        report.teams_matched,
        historical.teams().len(),
        report.players_matched(),
        historical.players().len(),
        report.players_exact,
        report.players_substring
    );

    MatchOutcome { mapping, report }
}

fn is_substring_match(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.chars().count() >= MIN_SUBSTRING_LEN && long.contains(short)
}

struct Candidate<'a> {
    kind: MatchKind,
    same_team: bool,
    len_diff: usize,
    name: &'a str,
    player: &'a Player,
}

impl<'a> Candidate<'a> {
    fn new(
        kind: MatchKind,
        wanted: &str,
        entry: &'a (String, &'a Player),
        home_team: Option<u32>,
    ) -> Self {
        let (name, player) = (&entry.0, entry.1);
        Self {
            kind,
            same_team: home_team == Some(player.team_id),
            len_diff: wanted.chars().count().abs_diff(name.chars().count()),
            name: name.as_str(),
            player,
        }
    }

    fn rank(a: &Self, b: &Self) -> Ordering {
        a.kind
            .cmp(&b.kind)
            .then_with(|| b.same_team.cmp(&a.same_team))
            .then_with(|| a.len_diff.cmp(&b.len_diff))
            .then_with(|| a.name.cmp(b.name))
            .then_with(|| a.player.id.cmp(&b.player.id))
    }
}
