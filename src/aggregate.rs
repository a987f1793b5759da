//! Rewrites historical fixture records into current-season identities.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::matcher::IdentityMapping;
use crate::model::FixtureRecord;

/// Grouping key: current player id and current opponent team id.
pub type HistoryKey = (u32, u32);

/// Result of one aggregation pass.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Records in current identities. Groups are ordered by key; records inside
    /// a group keep their input order (no re-sorting by gameweek).
    pub groups: BTreeMap<HistoryKey, Vec<FixtureRecord>>,
    pub matched: usize,
    pub unmatched_player: usize,
    pub unmatched_opponent: usize,
}

impl Aggregation {
    pub fn unmatched(&self) -> usize {
        self.unmatched_player + self.unmatched_opponent
    }

    pub fn total(&self) -> usize {
        self.matched + self.unmatched()
    }
}

/// Translate every record through `mapping` and group by (player, opponent).
///
/// Records whose player or opponent cannot be resolved are dropped and
/// counted; a record missing both is counted once, as an unmatched player.
pub fn aggregate<'a, I>(records: I, mapping: &IdentityMapping) -> Aggregation
where
    I: IntoIterator<Item = &'a FixtureRecord>,
{
    let mut out = Aggregation::default();

    for record in records {
        let Some(player_id) = mapping.current_player(record.player_id) else {
            out.unmatched_player += 1;
            continue;
        };
        let Some(opponent_id) = mapping.current_team(record.opponent_team_id) else {
            out.unmatched_opponent += 1;
            continue;
        };

        let remapped = FixtureRecord {
            player_id,
            opponent_team_id: opponent_id,
            ..record.clone()
        };
        out.groups
            .entry((player_id, opponent_id))
            .or_default()
            .push(remapped);
        out.matched += 1;
    }

    if out.unmatched() > 0 {
        warn!(
            "Dropped {} fixture records ({} unknown player, {} unknown opponent)",
            out.unmatched(),
            out.unmatched_player,
            out.unmatched_opponent
        );
    }
    info!(
        "Aggregated {} fixture records into {} player/opponent groups",
        out.matched,
        out.groups.len()
    );

    out
}
