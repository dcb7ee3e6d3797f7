use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bookmaker::OddsRow;
use crate::handicap::{UnrecognizedHandicap, normalize_handicap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStage {
    Opening,
    Mid,
    Late,
    Closing,
}

impl SnapshotStage {
    pub const ALL: [SnapshotStage; 4] = [
        SnapshotStage::Opening,
        SnapshotStage::Mid,
        SnapshotStage::Late,
        SnapshotStage::Closing,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SnapshotStage::Opening => "opening",
            SnapshotStage::Mid => "mid",
            SnapshotStage::Late => "late",
            SnapshotStage::Closing => "closing",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SnapshotStage::Opening => "初盘",
            SnapshotStage::Mid => "中盘",
            SnapshotStage::Late => "临盘",
            SnapshotStage::Closing => "封盘",
        }
    }
}

impl fmt::Display for SnapshotStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for SnapshotStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        SnapshotStage::ALL
            .into_iter()
            .find(|stage| stage.key().eq_ignore_ascii_case(t) || stage.label() == t)
            .ok_or_else(|| format!("unknown snapshot stage {t:?}, expected opening|mid|late|closing"))
    }
}

/// Numbers captured at one snapshot stage. `None` is "not captured", never zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFields {
    pub handicap_line: Option<f64>,
    pub home_odds: Option<f64>,
    pub draw_odds: Option<f64>,
    pub away_odds: Option<f64>,
    pub home_kelly: Option<f64>,
    pub draw_kelly: Option<f64>,
    pub away_kelly: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub filled: usize,
    pub conflicts: usize,
}

impl MergeOutcome {
    pub fn absorb(&mut self, other: MergeOutcome) {
        self.filled += other.filled;
        self.conflicts += other.conflicts;
    }
}

impl SnapshotFields {
    pub fn is_empty(&self) -> bool {
        self.slots().iter().all(|v| v.is_none())
    }

    pub fn is_complete(&self) -> bool {
        self.slots().iter().all(|v| v.is_some())
    }

    pub fn slots(&self) -> [Option<f64>; 7] {
        [
            self.handicap_line,
            self.home_odds,
            self.draw_odds,
            self.away_odds,
            self.home_kelly,
            self.draw_kelly,
            self.away_kelly,
        ]
    }

    fn slots_mut(&mut self) -> [&mut Option<f64>; 7] {
        [
            &mut self.handicap_line,
            &mut self.home_odds,
            &mut self.draw_odds,
            &mut self.away_odds,
            &mut self.home_kelly,
            &mut self.draw_kelly,
            &mut self.away_kelly,
        ]
    }

    /// Fill-only merge: unset slots take the incoming value; set slots never change.
    pub fn merge_from(&mut self, incoming: &SnapshotFields) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for (slot, new) in self.slots_mut().into_iter().zip(incoming.slots()) {
            let Some(new) = new else {
                continue;
            };
            match slot {
                None => {
                    *slot = Some(new);
                    outcome.filled += 1;
                }
                Some(existing) if *existing != new => outcome.conflicts += 1,
                Some(_) => {}
            }
        }
        outcome
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedRow {
    pub fields: SnapshotFields,
    pub unrecognized_handicap: Option<UnrecognizedHandicap>,
}

pub fn convert_odds_row(row: &OddsRow) -> ConvertedRow {
    let mut unrecognized_handicap = None;
    let handicap_line = match row.handicap_text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => match normalize_handicap(text) {
            Ok(value) => Some(value),
            Err(err) => {
                unrecognized_handicap = Some(err);
                None
            }
        },
        _ => None,
    };
    ConvertedRow {
        fields: SnapshotFields {
            handicap_line,
            home_odds: parse_decimal(row.home_odds.as_deref()),
            draw_odds: parse_decimal(row.draw_odds.as_deref()),
            away_odds: parse_decimal(row.away_odds.as_deref()),
            home_kelly: parse_decimal(row.home_kelly.as_deref()),
            draw_kelly: parse_decimal(row.draw_kelly.as_deref()),
            away_kelly: parse_decimal(row.away_kelly.as_deref()),
        },
        unrecognized_handicap,
    }
}

fn parse_decimal(raw: Option<&str>) -> Option<f64> {
    let v = raw?.trim().parse::<f64>().ok()?;
    v.is_finite().then_some(v)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    #[default]
    Pending,
    Matched,
    Unmatched,
}

impl LinkStatus {
    pub fn label(self) -> &'static str {
        match self {
            LinkStatus::Pending => "待匹配",
            LinkStatus::Matched => "成功",
            LinkStatus::Unmatched => "未匹配",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Matched => "matched",
            LinkStatus::Unmatched => "unmatched",
        }
    }

    pub fn from_key(key: &str) -> Self {
        match key {
            "matched" => LinkStatus::Matched,
            "unmatched" => LinkStatus::Unmatched,
            _ => LinkStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub issue: String,
    pub match_number: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: Option<String>,
    pub external_match_id: Option<String>,
    pub external_url: Option<String>,
    pub link_status: LinkStatus,
    pub opening: SnapshotFields,
    pub mid: SnapshotFields,
    pub late: SnapshotFields,
    pub closing: SnapshotFields,
}

impl FixtureRecord {
    pub fn new(issue: &str, match_number: &str, league: &str, home: &str, away: &str) -> Self {
        Self {
            issue: issue.to_string(),
            match_number: match_number.to_string(),
            league: league.to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            ..Self::default()
        }
    }

    pub fn stage(&self, stage: SnapshotStage) -> &SnapshotFields {
        match stage {
            SnapshotStage::Opening => &self.opening,
            SnapshotStage::Mid => &self.mid,
            SnapshotStage::Late => &self.late,
            SnapshotStage::Closing => &self.closing,
        }
    }

    pub fn stage_mut(&mut self, stage: SnapshotStage) -> &mut SnapshotFields {
        match stage {
            SnapshotStage::Opening => &mut self.opening,
            SnapshotStage::Mid => &mut self.mid,
            SnapshotStage::Late => &mut self.late,
            SnapshotStage::Closing => &mut self.closing,
        }
    }

    pub fn merge_stage(&mut self, stage: SnapshotStage, incoming: &SnapshotFields) -> MergeOutcome {
        self.stage_mut(stage).merge_from(incoming)
    }

    /// Record a matcher verdict. A matched fixture stays matched; its id and reference
    /// only fill when unset. Returns whether anything changed.
    pub fn record_link(
        &mut self,
        status: LinkStatus,
        external_match_id: Option<&str>,
        external_url: Option<&str>,
    ) -> bool {
        let before = (
            self.link_status,
            self.external_match_id.clone(),
            self.external_url.clone(),
        );
        match status {
            LinkStatus::Matched => {
                self.link_status = LinkStatus::Matched;
                fill_string(&mut self.external_match_id, &external_match_id.map(str::to_string));
                fill_string(&mut self.external_url, &external_url.map(str::to_string));
            }
            LinkStatus::Unmatched if self.link_status != LinkStatus::Matched => {
                self.link_status = LinkStatus::Unmatched;
            }
            _ => {}
        }
        before
            != (
                self.link_status,
                self.external_match_id.clone(),
                self.external_url.clone(),
            )
    }

    pub fn merge_record(&mut self, other: &FixtureRecord) -> MergeOutcome {
        fill_string(&mut self.kickoff, &other.kickoff);
        fill_string(&mut self.external_match_id, &other.external_match_id);
        fill_string(&mut self.external_url, &other.external_url);
        if self.link_status == LinkStatus::Pending {
            self.link_status = other.link_status;
        }
        let mut outcome = MergeOutcome::default();
        for stage in SnapshotStage::ALL {
            outcome.absorb(self.merge_stage(stage, other.stage(stage)));
        }
        outcome
    }
}

fn fill_string(slot: &mut Option<String>, incoming: &Option<String>) {
    if slot.as_deref().is_none_or(str::is_empty)
        && let Some(v) = incoming.as_deref().filter(|v| !v.is_empty())
    {
        *slot = Some(v.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::{
        FixtureRecord, LinkStatus, OddsRow, SnapshotFields, SnapshotStage, convert_odds_row,
    };

    fn full(h: f64, odds: f64) -> SnapshotFields {
        SnapshotFields {
            handicap_line: Some(h),
            home_odds: Some(odds),
            draw_odds: Some(odds),
            away_odds: Some(odds),
            home_kelly: Some(0.9),
            draw_kelly: Some(0.9),
            away_kelly: Some(0.9),
        }
    }

    #[test]
    fn empty_merge_is_a_no_op() {
        let mut rec = FixtureRecord::new("25048", "1", "英超", "曼联", "切尔西");
        rec.opening = full(-0.5, 2.1);
        let before = rec.clone();
        let out = rec.merge_stage(SnapshotStage::Opening, &SnapshotFields::default());
        assert_eq!(out.filled, 0);
        assert_eq!(rec, before);
    }

    #[test]
    fn merge_fills_only_unset_slots_and_first_write_wins() {
        let mut rec = FixtureRecord::new("25048", "1", "英超", "曼联", "切尔西");
        rec.mid.home_odds = Some(2.0);
        rec.mid.handicap_line = Some(-0.25);

        let out = rec.merge_stage(SnapshotStage::Mid, &full(-1.0, 3.3));
        assert_eq!(out.filled, 5);
        assert_eq!(out.conflicts, 2);
        assert_eq!(rec.mid.home_odds, Some(2.0));
        assert_eq!(rec.mid.handicap_line, Some(-0.25));
        assert_eq!(rec.mid.draw_odds, Some(3.3));
        assert!(rec.mid.is_complete());
        assert!(rec.late.is_empty());
    }

    #[test]
    fn merge_record_keeps_existing_reference() {
        let mut rec = FixtureRecord::new("25048", "1", "英超", "曼联", "切尔西");
        rec.external_url = Some("https://example/1".to_string());
        let mut other = rec.clone();
        other.external_url = None;
        other.external_match_id = Some("1".to_string());
        rec.merge_record(&other);
        assert_eq!(rec.external_url.as_deref(), Some("https://example/1"));
        assert_eq!(rec.external_match_id.as_deref(), Some("1"));
    }

    #[test]
    fn matched_link_is_never_downgraded() {
        let mut rec = FixtureRecord::new("25048", "1", "英超", "曼联", "切尔西");
        assert!(rec.record_link(LinkStatus::Unmatched, None, None));
        assert!(rec.record_link(LinkStatus::Matched, Some("2590001"), Some("https://x?id=2590001")));
        assert!(!rec.record_link(LinkStatus::Unmatched, None, None));
        assert!(!rec.record_link(LinkStatus::Matched, Some("999"), None));
        assert_eq!(rec.link_status, LinkStatus::Matched);
        assert_eq!(rec.external_match_id.as_deref(), Some("2590001"));
    }

    #[test]
    fn convert_keeps_bad_cells_unset() {
        let row = OddsRow {
            provider_name: "Crown".to_string(),
            handicap_text: Some("怪异".to_string()),
            home_odds: Some("2.05".to_string()),
            draw_odds: Some("-".to_string()),
            away_odds: Some(String::new()),
            ..OddsRow::default()
        };
        let converted = convert_odds_row(&row);
        assert_eq!(converted.fields.home_odds, Some(2.05));
        assert_eq!(converted.fields.draw_odds, None);
        assert_eq!(converted.fields.away_odds, None);
        assert_eq!(converted.fields.handicap_line, None);
        assert!(converted.unrecognized_handicap.is_some());
    }

    #[test]
    fn stage_parses_key_and_label() {
        assert_eq!("closing".parse::<SnapshotStage>(), Ok(SnapshotStage::Closing));
        assert_eq!("初盘".parse::<SnapshotStage>(), Ok(SnapshotStage::Opening));
        assert!("final".parse::<SnapshotStage>().is_err());
    }
}
