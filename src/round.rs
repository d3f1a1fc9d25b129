use std::collections::BTreeMap;

use crate::model::{Fixture, StoredMatch};

/// Per league, the matches of the lowest round number still in the store.
///
/// Played rounds are expected to have been pruned upstream, so the lowest
/// remaining round is the one about to be played.
pub fn select_current_round(matches: &[StoredMatch]) -> BTreeMap<String, Vec<StoredMatch>> {
    let mut by_league: BTreeMap<String, Vec<&StoredMatch>> = BTreeMap::new();
    for m in matches {
        by_league.entry(m.league_id.clone()).or_default().push(m);
    }

    by_league
        .into_iter()
        .filter_map(|(league_id, group)| {
            let lowest = group.iter().map(|m| m.match_round_number).min()?;
            let current = group
                .into_iter()
                .filter(|m| m.match_round_number == lowest)
                .cloned()
                .collect::<Vec<_>>();
            Some((league_id, current))
        })
        .collect()
}

pub fn fixtures_for_round(rounds: &BTreeMap<String, Vec<StoredMatch>>) -> Vec<Fixture> {
    rounds
        .values()
        .flat_map(|matches| matches.iter().map(Fixture::from))
        .collect()
}
