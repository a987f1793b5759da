//! Query-string filters applied to snapshot payloads.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::model::Position;

/// Element types selected by a `position=` parameter.
///
/// Tokens are comma-separated codes (`GKP,DEF`) or numbers (`1,3`).
/// Unrecognised tokens are ignored; `None` means "no filtering".
pub fn parse_positions(param: Option<&str>) -> Option<BTreeSet<u8>> {
    let selected: BTreeSet<u8> = param?
        .split(',')
        .filter_map(Position::parse_token)
        .map(Position::element_type)
        .collect();
    (!selected.is_empty()).then_some(selected)
}

/// Keep players whose `element_type` is in `positions`.
pub fn filter_players(players: Vec<Value>, positions: Option<&BTreeSet<u8>>) -> Vec<Value> {
    let Some(positions) = positions else {
        return players;
    };
    players
        .into_iter()
        .filter(|p| {
            p.get("element_type")
                .and_then(Value::as_u64)
                .and_then(|t| u8::try_from(t).ok())
                .is_some_and(|t| positions.contains(&t))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn players() -> Vec<Value> {
        (1..=4)
            .map(|t| json!({ "id": t * 10, "web_name": format!("P{t}"), "element_type": t }))
            .collect()
    }

    fn types(list: &[Value]) -> Vec<u64> {
        list.iter().map(|p| p["element_type"].as_u64().unwrap()).collect()
    }

    #[test]
    fn codes_and_numbers_select_the_same_types() {
        let by_code = parse_positions(Some("GKP,DEF"));
        assert_eq!(types(&filter_players(players(), by_code.as_ref())), vec![1, 2]);

        let by_number = parse_positions(Some("1,3"));
        assert_eq!(types(&filter_players(players(), by_number.as_ref())), vec![1, 3]);
    }

    #[test]
    fn invalid_tokens_are_ignored() {
        assert_eq!(parse_positions(Some("XXX")), None);
        assert_eq!(filter_players(players(), None).len(), 4);

        let mixed = parse_positions(Some("XXX, fwd ,9"));
        assert_eq!(types(&filter_players(players(), mixed.as_ref())), vec![4]);
    }

    #[test]
    fn absent_or_empty_param_means_everything() {
        assert_eq!(parse_positions(None), None);
        assert_eq!(parse_positions(Some("")), None);
    }
}
