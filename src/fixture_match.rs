use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::team_alias::AliasTable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalFixture {
    pub match_number: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedCandidate {
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub external_match_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePolicy {
    #[default]
    FirstSeen,
    LastSeen,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchStatus {
    Matched { external_match_id: String },
    Unmatched,
}

impl MatchStatus {
    pub fn external_match_id(&self) -> Option<&str> {
        match self {
            MatchStatus::Matched { external_match_id } => Some(external_match_id),
            MatchStatus::Unmatched => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureMatch {
    pub match_number: String,
    pub resolved_home: String,
    pub resolved_away: String,
    pub status: MatchStatus,
    pub ignored_duplicates: usize,
}

/// Link each canonical fixture to a scraped candidate by resolved team names.
///
/// League names are not part of the key; the two sources spell them differently.
/// Output order follows `fixtures`.
pub fn match_fixtures(
    fixtures: &[CanonicalFixture],
    candidates: &[ScrapedCandidate],
    aliases: &AliasTable,
    policy: CandidatePolicy,
) -> Vec<FixtureMatch> {
    let mut by_pair: HashMap<(String, String), Vec<&ScrapedCandidate>> = HashMap::new();
    for candidate in candidates {
        let key = (
            aliases.resolve(&candidate.home_team),
            aliases.resolve(&candidate.away_team),
        );
        by_pair.entry(key).or_default().push(candidate);
    }

    let mut out = Vec::with_capacity(fixtures.len());
    for fixture in fixtures {
        let home = aliases.resolve(&fixture.home_team);
        let away = aliases.resolve(&fixture.away_team);
        let hits = by_pair
            .get(&(home.clone(), away.clone()))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let chosen = match policy {
            CandidatePolicy::FirstSeen => hits.first(),
            CandidatePolicy::LastSeen => hits.last(),
        };
        let status = match chosen {
            Some(candidate) => {
                info!(
                    match_number = %fixture.match_number,
                    %home,
                    %away,
                    id = %candidate.external_match_id,
                    "fixture matched"
                );
                MatchStatus::Matched {
                    external_match_id: candidate.external_match_id.clone(),
                }
            }
            None => {
                debug!(
                    match_number = %fixture.match_number,
                    raw_home = %fixture.home_team,
                    raw_away = %fixture.away_team,
                    %home,
                    %away,
                    "fixture unmatched"
                );
                MatchStatus::Unmatched
            }
        };
        let ignored_duplicates = hits.len().saturating_sub(1);
        if ignored_duplicates > 0 {
            warn!(
                match_number = %fixture.match_number,
                ignored_duplicates,
                ?policy,
                "several candidates share the resolved team pair"
            );
        }

        out.push(FixtureMatch {
            match_number: fixture.match_number.clone(),
            resolved_home: home,
            resolved_away: away,
            status,
            ignored_duplicates,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{CandidatePolicy, CanonicalFixture, MatchStatus, ScrapedCandidate, match_fixtures};
    use crate::team_alias::{AliasTable, DuplicatePolicy};

    fn fixture(num: &str, home: &str, away: &str) -> CanonicalFixture {
        CanonicalFixture {
            match_number: num.to_string(),
            league: "英超".to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
        }
    }

    fn candidate(home: &str, away: &str, id: &str) -> ScrapedCandidate {
        ScrapedCandidate {
            league: "英格兰超级联赛".to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            external_match_id: id.to_string(),
        }
    }

    #[test]
    fn matches_on_resolved_names_ignoring_league() {
        let aliases = AliasTable::from_pairs([("曼彻斯特联", "曼联")], DuplicatePolicy::LastWins);
        let fixtures = vec![fixture("1", "曼彻斯特联", "切尔西")];
        let candidates = vec![candidate("曼联[6]", "切尔西", "2590001")];
        let out = match_fixtures(&fixtures, &candidates, &aliases, CandidatePolicy::FirstSeen);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].status.external_match_id(), Some("2590001"));
        assert_eq!(out[0].resolved_home, "曼联");
    }

    #[test]
    fn swapped_sides_do_not_match() {
        let fixtures = vec![fixture("2", "利物浦", "埃弗顿")];
        let candidates = vec![candidate("埃弗顿", "利物浦", "9")];
        let out = match_fixtures(
            &fixtures,
            &candidates,
            &AliasTable::default(),
            CandidatePolicy::FirstSeen,
        );
        assert_eq!(out[0].status, MatchStatus::Unmatched);
    }

    #[test]
    fn duplicate_candidates_follow_policy() {
        let fixtures = vec![fixture("3", "国米", "米兰")];
        let candidates = vec![candidate("国米", "米兰", "100"), candidate("国米", "米兰", "200")];
        let aliases = AliasTable::default();

        let first = match_fixtures(&fixtures, &candidates, &aliases, CandidatePolicy::FirstSeen);
        assert_eq!(first[0].status.external_match_id(), Some("100"));
        assert_eq!(first[0].ignored_duplicates, 1);

        let last = match_fixtures(&fixtures, &candidates, &aliases, CandidatePolicy::LastSeen);
        assert_eq!(last[0].status.external_match_id(), Some("200"));
    }

    #[test]
    fn rerunning_the_same_inputs_gives_the_same_mapping() {
        let aliases = AliasTable::from_pairs([("曼彻斯特联", "曼联")], DuplicatePolicy::LastWins);
        let fixtures = vec![
            fixture("1", "曼彻斯特联", "切尔西"),
            fixture("2", "国米", "米兰"),
            fixture("3", "皇马", "巴萨"),
        ];
        let candidates = vec![
            candidate("国米", "米兰", "200"),
            candidate("曼联", "切尔西", "100"),
            candidate("国米", "米兰", "201"),
        ];
        for policy in [CandidatePolicy::FirstSeen, CandidatePolicy::LastSeen] {
            let first = match_fixtures(&fixtures, &candidates, &aliases, policy);
            let second = match_fixtures(&fixtures, &candidates, &aliases, policy);
            assert_eq!(first, second);
            assert_eq!(first[2].status, MatchStatus::Unmatched);
        }
    }
}
