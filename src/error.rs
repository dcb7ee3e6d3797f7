use thiserror::Error;

use crate::snapshot::SnapshotStage;

/// Non-fatal problems. Each one degrades a single field or fixture and never aborts a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Degradation {
    #[error("match {match_number}: unrecognized {stage} handicap {text:?}")]
    UnrecognizedHandicap {
        match_number: String,
        stage: SnapshotStage,
        text: String,
    },

    #[error("match {match_number}: no usable {stage} odds row on {page}")]
    NoUsableOddsRow {
        match_number: String,
        stage: SnapshotStage,
        page: &'static str,
    },

    #[error("match {match_number}: no scraped fixture for {home} vs {away}")]
    FixtureUnmatched {
        match_number: String,
        home: String,
        away: String,
    },

    #[error("fetch failed for {target}: {reason}")]
    FetchFailure { target: String, reason: String },

    #[error("match {match_number}: opening snapshot incomplete, analytics unavailable")]
    InsufficientAnalyticsInput { match_number: String },
}

impl Degradation {
    pub fn kind(&self) -> &'static str {
        match self {
            Degradation::UnrecognizedHandicap { .. } => "unrecognized_handicap",
            Degradation::NoUsableOddsRow { .. } => "no_usable_odds_row",
            Degradation::FixtureUnmatched { .. } => "fixture_unmatched",
            Degradation::FetchFailure { .. } => "fetch_failure",
            Degradation::InsufficientAnalyticsInput { .. } => "insufficient_analytics_input",
        }
    }
}
