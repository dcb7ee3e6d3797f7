use std::fs;
use std::path::PathBuf;

use odds_radar::analytics::{BettingLean, LeanTieBreak, StrategyClass};
use odds_radar::bookmaker::TargetProviders;
use odds_radar::error::Degradation;
use odds_radar::fixture_match::CandidatePolicy;
use odds_radar::lottery_feed::parse_issue_fixtures_json;
use odds_radar::pipeline::{build_report_rows, match_pass, seed_fixtures, snapshot_pass};
use odds_radar::report::write_dashboard;
use odds_radar::snapshot::{LinkStatus, SnapshotStage};
use odds_radar::store::SnapshotStore;
use odds_radar::team_alias::{AliasTable, DuplicatePolicy};
use odds_radar::titan_pages::{
    SavedPages, asian_odds_url, candidates_url, europe_odds_url,
};
use odds_radar::xlsx_export::export_workbook;

const ISSUE: &str = "25048";
const DATE: &str = "20250502";

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn saved_site() -> SavedPages {
    SavedPages::new()
        .with(candidates_url(DATE), read_fixture("next_listing.htm"))
        .with(asian_odds_url("2590001"), read_fixture("asian_2590001.htm"))
        .with(asian_odds_url("2590002"), read_fixture("asian_2590002.htm"))
        .with(europe_odds_url("2590001"), read_fixture("oddslist_2590001.htm"))
        .with(
            "https://1x2.titan007.com/OddsHistory.aspx?id=99001&sid=2590001&cid=281&l=0",
            read_fixture("history_bet365_2590001.htm"),
        )
}

fn seeded_and_matched(store: &mut SnapshotStore, site: &SavedPages) {
    let fixtures =
        parse_issue_fixtures_json(ISSUE, &read_fixture("sporttery_issue.json")).expect("feed");
    let seeded = seed_fixtures(store, &fixtures).expect("seed");
    assert_eq!(seeded.visited, 3);

    let aliases = AliasTable::parse_csv(&read_fixture("team_aliases.csv"), DuplicatePolicy::LastWins);
    let matched = match_pass(store, ISSUE, site, DATE, &aliases, CandidatePolicy::FirstSeen)
        .expect("match");
    assert_eq!(matched.visited, 3);
    assert_eq!(
        matched.degradations,
        vec![Degradation::FixtureUnmatched {
            match_number: "3".to_string(),
            home: "皇家马德里".to_string(),
            away: "巴塞罗那".to_string(),
        }]
    );
}

#[test]
fn match_pass_links_fixtures_through_aliases() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = SnapshotStore::open(&dir.path().join("snapshots.sqlite")).expect("store");
    let site = saved_site();
    seeded_and_matched(&mut store, &site);

    let first = store.load(ISSUE, "1").expect("load").expect("record");
    assert_eq!(first.link_status, LinkStatus::Matched);
    assert_eq!(first.external_match_id.as_deref(), Some("2590001"));
    assert_eq!(
        first.external_url.as_deref(),
        Some("https://vip.titan007.com/AsianOdds_n.aspx?id=2590001")
    );

    // First-seen candidate wins over the later duplicate listing.
    let second = store.load(ISSUE, "2").expect("load").expect("record");
    assert_eq!(second.external_match_id.as_deref(), Some("2590002"));

    let third = store.load(ISSUE, "3").expect("load").expect("record");
    assert_eq!(third.link_status, LinkStatus::Unmatched);
    assert_eq!(third.external_match_id, None);
}

#[test]
fn opening_pass_reads_history_and_degrades_per_fixture() {
    let mut store = SnapshotStore::open_in_memory().expect("store");
    let site = saved_site();
    seeded_and_matched(&mut store, &site);

    let report = snapshot_pass(
        &mut store,
        ISSUE,
        SnapshotStage::Opening,
        &site,
        &TargetProviders::default(),
    )
    .expect("opening pass");
    assert_eq!(report.visited, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.filled, 7);
    let kinds = report.counts_by_kind();
    assert_eq!(kinds.get("unrecognized_handicap"), Some(&1));
    assert_eq!(kinds.get("fetch_failure"), Some(&1));

    let first = store.load(ISSUE, "1").expect("load").expect("record");
    assert_eq!(first.opening.handicap_line, Some(-0.25));
    assert_eq!(first.opening.home_odds, Some(3.2));
    assert_eq!(first.opening.away_kelly, Some(0.4));
    assert!(first.opening.is_complete());

    let second = store.load(ISSUE, "2").expect("load").expect("record");
    assert!(second.opening.is_empty());
}

#[test]
fn closing_pass_is_idempotent() {
    let mut store = SnapshotStore::open_in_memory().expect("store");
    let site = saved_site();
    seeded_and_matched(&mut store, &site);
    let targets = TargetProviders::default();

    let first = snapshot_pass(&mut store, ISSUE, SnapshotStage::Closing, &site, &targets)
        .expect("closing pass");
    assert_eq!(first.filled, 8);
    let after_first = store.load_issue(ISSUE).expect("load");

    let second = snapshot_pass(&mut store, ISSUE, SnapshotStage::Closing, &site, &targets)
        .expect("closing pass");
    assert_eq!(second.filled, 0);
    assert_eq!(store.load_issue(ISSUE).expect("load"), after_first);

    let rec = &after_first[0];
    assert_eq!(rec.closing.handicap_line, Some(-0.75));
    assert_eq!(rec.closing.home_odds, Some(2.1));
    assert_eq!(rec.closing.draw_kelly, Some(0.93));
    assert!(rec.opening.is_empty());
    assert_eq!(after_first[1].closing.handicap_line, Some(0.5));
}

#[test]
fn report_and_export_render_computed_signals() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = SnapshotStore::open(&dir.path().join("snapshots.sqlite")).expect("store");
    let site = saved_site();
    seeded_and_matched(&mut store, &site);
    snapshot_pass(
        &mut store,
        ISSUE,
        SnapshotStage::Opening,
        &site,
        &TargetProviders::default(),
    )
    .expect("opening pass");

    let records = store.load_issue(ISSUE).expect("load");
    let (rows, report) = build_report_rows(records, LeanTieBreak::Away);
    assert_eq!(report.degradations.len(), 2);

    let signals = rows[0].analytics.result().copied().expect("available");
    assert!((signals.volatility_score - 41.5).abs() < 1e-9);
    assert!(signals.kelly_anomaly);
    assert!(signals.cold_signal);
    assert_eq!(signals.strategy_class, StrategyClass::ShallowLineColdGuard);
    assert_eq!(signals.betting_lean, BettingLean::GuardDraw);

    let html_path = dir.path().join("out").join("output_25048.html");
    write_dashboard(&html_path, ISSUE, &rows).expect("dashboard");
    let html = fs::read_to_string(&html_path).expect("html");
    assert!(html.contains("<td>41.50</td>"));
    assert!(html.contains("防平局"));
    assert!(html.contains("查看盘口"));

    let xlsx_path = dir.path().join("25048").join("export.xlsx");
    let export = export_workbook(&xlsx_path, ISSUE, &rows).expect("workbook");
    assert_eq!(export.fixtures, 3);
    assert_eq!(export.linked, 2);
    assert!(xlsx_path.exists());
}
