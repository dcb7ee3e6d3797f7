use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::analytics::{Analytics, LeanTieBreak, analyze};
use crate::bookmaker::{OddsRow, TargetProviders, select_from_cells};
use crate::error::Degradation;
use crate::fixture_match::{
    CandidatePolicy, CanonicalFixture, MatchStatus, ScrapedCandidate, match_fixtures,
};
use crate::lottery_feed::FeedFixture;
use crate::snapshot::{FixtureRecord, LinkStatus, SnapshotFields, SnapshotStage, convert_odds_row};
use crate::store::SnapshotStore;
use crate::team_alias::AliasTable;
use crate::titan_pages::{
    EuropeRow, PageSource, asian_live_layout, asian_odds_url, asian_opening_layout,
    candidates_url, europe_live_layout, europe_odds_url, history_layout, parse_asian_rows,
    parse_candidates_html, parse_europe_rows, parse_history_opening,
};

const ANALYTICS_THREADS: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct PassReport {
    pub pass: String,
    pub visited: usize,
    pub filled: usize,
    pub skipped: usize,
    pub degradations: Vec<Degradation>,
}

impl PassReport {
    pub fn new(pass: impl Into<String>) -> Self {
        Self {
            pass: pass.into(),
            ..Self::default()
        }
    }

    pub fn degrade(&mut self, d: Degradation) {
        warn!(kind = d.kind(), "{d}");
        self.degradations.push(d);
    }

    pub fn counts_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut out = BTreeMap::new();
        for d in &self.degradations {
            *out.entry(d.kind()).or_insert(0) += 1;
        }
        out
    }
}

pub fn seed_fixtures(store: &mut SnapshotStore, fixtures: &[FeedFixture]) -> Result<PassReport> {
    let mut report = PassReport::new("fixtures");
    for f in fixtures {
        let mut rec = FixtureRecord::new(
            &f.issue,
            &f.match_number,
            &f.league,
            &f.home_team,
            &f.away_team,
        );
        rec.kickoff = f.kickoff.clone();
        let outcome = store.upsert_fixture(&rec)?;
        report.visited += 1;
        report.filled += outcome.filled;
    }
    info!(fixtures = report.visited, "seeded fixtures");
    Ok(report)
}

pub fn fetch_candidates(
    source: &dyn PageSource,
    date: &str,
    report: &mut PassReport,
) -> Vec<ScrapedCandidate> {
    let url = candidates_url(date);
    let parsed = source.fetch(&url).and_then(|html| parse_candidates_html(&html));
    match parsed {
        Ok(rows) => {
            info!(date, candidates = rows.len(), "loaded candidate fixtures");
            rows
        }
        Err(err) => {
            report.degrade(Degradation::FetchFailure {
                target: url,
                reason: format!("{err:#}"),
            });
            Vec::new()
        }
    }
}

pub fn match_pass(
    store: &mut SnapshotStore,
    issue: &str,
    source: &dyn PageSource,
    date: &str,
    aliases: &AliasTable,
    policy: CandidatePolicy,
) -> Result<PassReport> {
    let mut report = PassReport::new("match");
    let candidates = fetch_candidates(source, date, &mut report);
    let records = store.load_issue(issue)?;
    let canonical: Vec<_> = records
        .iter()
        .map(|r| CanonicalFixture {
            match_number: r.match_number.clone(),
            league: r.league.clone(),
            home_team: r.home_team.clone(),
            away_team: r.away_team.clone(),
        })
        .collect();
    let already_matched: HashSet<&str> = records
        .iter()
        .filter(|r| r.link_status == LinkStatus::Matched)
        .map(|r| r.match_number.as_str())
        .collect();

    for m in match_fixtures(&canonical, &candidates, aliases, policy) {
        report.visited += 1;
        let changed = match &m.status {
            MatchStatus::Matched { external_match_id } => {
                let url = asian_odds_url(external_match_id);
                store.record_link(
                    issue,
                    &m.match_number,
                    LinkStatus::Matched,
                    Some(external_match_id),
                    Some(&url),
                )?
            }
            MatchStatus::Unmatched if already_matched.contains(m.match_number.as_str()) => {
                debug!(match_number = %m.match_number, "no candidate today, keeping earlier link");
                false
            }
            MatchStatus::Unmatched => {
                report.degrade(Degradation::FixtureUnmatched {
                    match_number: m.match_number.clone(),
                    home: m.resolved_home.clone(),
                    away: m.resolved_away.clone(),
                });
                store.record_link(issue, &m.match_number, LinkStatus::Unmatched, None, None)?
            }
        };
        if changed {
            report.filled += 1;
        }
    }
    Ok(report)
}

pub fn snapshot_pass(
    store: &mut SnapshotStore,
    issue: &str,
    stage: SnapshotStage,
    source: &dyn PageSource,
    targets: &TargetProviders,
) -> Result<PassReport> {
    let mut report = PassReport::new(format!("snapshot:{}", stage.key()));
    let records = store.load_issue(issue)?;
    for rec in &records {
        let Some(match_id) = rec.external_match_id.as_deref().filter(|id| !id.is_empty()) else {
            debug!(match_number = %rec.match_number, "no external id, skipping");
            report.skipped += 1;
            continue;
        };
        report.visited += 1;

        let mut incoming = SnapshotFields::default();
        if let Some(handicap) = capture_handicap(source, rec, match_id, stage, targets, &mut report) {
            incoming.merge_from(&handicap);
        }
        if let Some(odds) = capture_odds(source, rec, match_id, stage, targets, &mut report) {
            incoming.merge_from(&odds);
        }

        let outcome = store.merge_stage(issue, &rec.match_number, stage, &incoming)?;
        if outcome.conflicts > 0 {
            debug!(
                match_number = %rec.match_number,
                conflicts = outcome.conflicts,
                "kept earlier values"
            );
        }
        info!(
            match_number = %rec.match_number,
            stage = %stage,
            filled = outcome.filled,
            "snapshot merged"
        );
        report.filled += outcome.filled;
    }
    Ok(report)
}

fn capture_handicap(
    source: &dyn PageSource,
    rec: &FixtureRecord,
    match_id: &str,
    stage: SnapshotStage,
    targets: &TargetProviders,
    report: &mut PassReport,
) -> Option<SnapshotFields> {
    let url = asian_odds_url(match_id);
    let rows = match source.fetch(&url).and_then(|html| parse_asian_rows(&html)) {
        Ok(rows) => rows,
        Err(err) => {
            report.degrade(Degradation::FetchFailure {
                target: url,
                reason: format!("{err:#}"),
            });
            return None;
        }
    };
    let layout = match stage {
        SnapshotStage::Opening => asian_opening_layout(),
        _ => asian_live_layout(),
    };
    let Some(row) = select_from_cells(&rows, &layout, targets) else {
        report.degrade(Degradation::NoUsableOddsRow {
            match_number: rec.match_number.clone(),
            stage,
            page: "asian",
        });
        return None;
    };
    debug!(provider = %row.provider_name, "handicap row selected");
    Some(convert_row(rec, stage, &row, report))
}

fn capture_odds(
    source: &dyn PageSource,
    rec: &FixtureRecord,
    match_id: &str,
    stage: SnapshotStage,
    targets: &TargetProviders,
    report: &mut PassReport,
) -> Option<SnapshotFields> {
    let url = europe_odds_url(match_id);
    let rows = match source.fetch(&url).and_then(|html| parse_europe_rows(&html)) {
        Ok(rows) => rows,
        Err(err) => {
            report.degrade(Degradation::FetchFailure {
                target: url,
                reason: format!("{err:#}"),
            });
            return None;
        }
    };
    let selected = match stage {
        SnapshotStage::Opening => opening_from_history(source, &rows, targets, report),
        _ => {
            let cells: Vec<Vec<String>> = rows.into_iter().map(|r| r.cells).collect();
            select_from_cells(&cells, &europe_live_layout(), targets)
        }
    };
    let Some(row) = selected else {
        report.degrade(Degradation::NoUsableOddsRow {
            match_number: rec.match_number.clone(),
            stage,
            page: "1x2",
        });
        return None;
    };
    debug!(provider = %row.provider_name, "1x2 row selected");
    Some(convert_row(rec, stage, &row, report))
}

// Target providers in listing order, then every other linked provider until one history
// page yields a usable opening row.
fn opening_from_history(
    source: &dyn PageSource,
    rows: &[EuropeRow],
    targets: &TargetProviders,
    report: &mut PassReport,
) -> Option<OddsRow> {
    let (mut order, others): (Vec<&EuropeRow>, Vec<&EuropeRow>) = rows
        .iter()
        .filter(|r| r.history.is_some())
        .partition(|r| targets.matches(r.provider()));
    order.extend(others);

    let layout = history_layout();
    for row in order {
        let Some(link) = row.history.as_ref() else {
            continue;
        };
        let url = link.url();
        let cells = match source.fetch(&url).and_then(|html| parse_history_opening(&html)) {
            Ok(Some(cells)) => cells,
            Ok(None) => {
                debug!(provider = row.provider(), "history page has no opening row");
                continue;
            }
            Err(err) => {
                report.degrade(Degradation::FetchFailure {
                    target: url,
                    reason: format!("{err:#}"),
                });
                continue;
            }
        };
        if let Some(mut odds) = layout.extract(&cells) {
            odds.provider_name = row.provider().to_string();
            if odds.is_usable() {
                return Some(odds);
            }
        }
    }
    None
}

fn convert_row(
    rec: &FixtureRecord,
    stage: SnapshotStage,
    row: &OddsRow,
    report: &mut PassReport,
) -> SnapshotFields {
    let converted = convert_odds_row(row);
    if let Some(err) = converted.unrecognized_handicap {
        report.degrade(Degradation::UnrecognizedHandicap {
            match_number: rec.match_number.clone(),
            stage,
            text: err.text,
        });
    }
    converted.fields
}

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub record: FixtureRecord,
    pub analytics: Analytics,
}

pub fn build_report_rows(
    records: Vec<FixtureRecord>,
    tie: LeanTieBreak,
) -> (Vec<ReportRow>, PassReport) {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ANALYTICS_THREADS)
        .build()
        .ok();
    let compute = || {
        records
            .par_iter()
            .map(|r| analyze(&r.opening, tie))
            .collect::<Vec<_>>()
    };
    let analytics = match pool.as_ref() {
        Some(pool) => pool.install(compute),
        None => compute(),
    };

    let mut report = PassReport::new("report");
    let rows: Vec<ReportRow> = records
        .into_iter()
        .zip(analytics)
        .map(|(record, analytics)| {
            report.visited += 1;
            if analytics == Analytics::Unavailable {
                report.degrade(Degradation::InsufficientAnalyticsInput {
                    match_number: record.match_number.clone(),
                });
            }
            ReportRow { record, analytics }
        })
        .collect();
    (rows, report)
}

#[cfg(test)]
mod tests {
    use super::{PassReport, build_report_rows, opening_from_history};
    use crate::analytics::{Analytics, LeanTieBreak};
    use crate::bookmaker::TargetProviders;
    use crate::error::Degradation;
    use crate::snapshot::{FixtureRecord, SnapshotFields};
    use crate::titan_pages::{EuropeRow, HistoryLink, SavedPages};

    fn linked_row(provider: &str, cid: &str) -> EuropeRow {
        EuropeRow {
            cells: vec!["1".to_string(), provider.to_string()],
            history: Some(HistoryLink {
                id: "99001".to_string(),
                sid: "2590001".to_string(),
                cid: cid.to_string(),
            }),
        }
    }

    const WILLIAM_HILL_HISTORY: &str = "<table>\
        <tr><td>2.40</td><td>3.20</td><td>2.90</td><td>40</td><td>30</td><td>33</td><td>94</td><td>0.95</td><td>0.93</td><td>0.94</td><td>05-02 21:45</td></tr>\
        <tr><td>2.50</td><td>3.10</td><td>2.80</td><td>38</td><td>31</td><td>34</td><td>94</td><td>0.96</td><td>0.91</td><td>0.93</td><td>04-28 10:00(初盘)</td></tr>\
        </table>";

    #[test]
    fn opening_falls_through_every_linked_provider() {
        let rows = vec![
            linked_row("Pinnacle", "177"),
            linked_row("Bet365", "281"),
            linked_row("William Hill", "115"),
        ];
        let pinnacle = rows[0].history.as_ref().map(HistoryLink::url).unwrap_or_default();
        let william_hill = rows[2].history.as_ref().map(HistoryLink::url).unwrap_or_default();
        // Pinnacle has no opening row; Bet365's page is missing.
        let pages = SavedPages::new()
            .with(pinnacle, "<table><tr><td>2.10</td></tr></table>")
            .with(william_hill, WILLIAM_HILL_HISTORY);
        let mut report = PassReport::new("snapshot");

        let row = opening_from_history(&pages, &rows, &TargetProviders::new(["Crown"]), &mut report)
            .expect("later provider should supply the opening row");
        assert_eq!(row.provider_name, "William Hill");
        assert_eq!(row.home_odds.as_deref(), Some("2.50"));
        assert_eq!(row.away_kelly.as_deref(), Some("0.93"));
        assert_eq!(report.counts_by_kind().get("fetch_failure"), Some(&1));
    }

    #[test]
    fn opening_tries_targets_before_listing_order() {
        let rows = vec![linked_row("Pinnacle", "177"), linked_row("Crown", "3")];
        let pinnacle = rows[0].history.as_ref().map(HistoryLink::url).unwrap_or_default();
        let crown = rows[1].history.as_ref().map(HistoryLink::url).unwrap_or_default();
        let pages = SavedPages::new()
            .with(pinnacle, "<table></table>")
            .with(crown, WILLIAM_HILL_HISTORY);
        let mut report = PassReport::new("snapshot");

        let row = opening_from_history(&pages, &rows, &TargetProviders::new(["Crown"]), &mut report)
            .expect("target row");
        assert_eq!(row.provider_name, "Crown");
        assert!(report.degradations.is_empty());
    }

    #[test]
    fn report_rows_keep_order_and_flag_missing_input() {
        let mut a = FixtureRecord::new("25048", "1", "英超", "曼联", "切尔西");
        a.opening = SnapshotFields {
            handicap_line: Some(0.1),
            home_odds: Some(3.2),
            draw_odds: Some(3.0),
            away_odds: Some(2.1),
            home_kelly: Some(0.96),
            draw_kelly: Some(0.5),
            away_kelly: Some(0.4),
        };
        let b = FixtureRecord::new("25048", "2", "英超", "阿森纳", "热刺");
        let (rows, report) = build_report_rows(vec![a, b], LeanTieBreak::Away);
        assert_eq!(rows[0].record.match_number, "1");
        assert!(matches!(rows[0].analytics, Analytics::Available(_)));
        assert_eq!(rows[1].analytics, Analytics::Unavailable);
        assert_eq!(report.visited, 2);
        assert_eq!(
            report.degradations,
            vec![Degradation::InsufficientAnalyticsInput {
                match_number: "2".to_string()
            }]
        );
    }

    #[test]
    fn degradations_group_by_kind() {
        let mut report = PassReport::new("t");
        for n in ["1", "2"] {
            report.degrade(Degradation::InsufficientAnalyticsInput {
                match_number: n.to_string(),
            });
        }
        assert_eq!(report.counts_by_kind().get("insufficient_analytics_input"), Some(&2));
    }
}
