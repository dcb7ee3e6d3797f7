use serde::{Deserialize, Serialize};

pub const DEFAULT_TARGET_PROVIDERS: &[&str] = &["36", "Bet365", "Crown", "澳门", "澳彩"];

/// One bookmaker's quote as scraped. `None` means the page kind carries no such column;
/// `Some("")` means the column exists but the cell was blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OddsRow {
    pub provider_name: String,
    pub handicap_text: Option<String>,
    pub home_odds: Option<String>,
    pub draw_odds: Option<String>,
    pub away_odds: Option<String>,
    pub home_kelly: Option<String>,
    pub draw_kelly: Option<String>,
    pub away_kelly: Option<String>,
}

impl OddsRow {
    fn fields(&self) -> [&Option<String>; 7] {
        [
            &self.handicap_text,
            &self.home_odds,
            &self.draw_odds,
            &self.away_odds,
            &self.home_kelly,
            &self.draw_kelly,
            &self.away_kelly,
        ]
    }

    pub fn is_usable(&self) -> bool {
        let present: Vec<&String> = self.fields().into_iter().flatten().collect();
        !present.is_empty() && present.iter().all(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetProviders(Vec<String>);

impl TargetProviders {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            fragments
                .into_iter()
                .map(Into::into)
                .filter(|f: &String| !f.is_empty())
                .collect(),
        )
    }

    pub fn matches(&self, provider_name: &str) -> bool {
        self.0.iter().any(|f| provider_name.contains(f.as_str()))
    }
}

impl Default for TargetProviders {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_PROVIDERS.iter().copied())
    }
}

/// Select the first usable row from a target provider, else the first usable row of
/// any provider. Never prefers a later non-target row over an earlier one.
pub fn select_odds_row(rows: &[OddsRow], targets: &TargetProviders) -> Option<OddsRow> {
    let mut fallback: Option<&OddsRow> = None;
    for row in rows {
        if !row.is_usable() {
            continue;
        }
        if targets.matches(&row.provider_name) {
            return Some(row.clone());
        }
        if fallback.is_none() {
            fallback = Some(row);
        }
    }
    fallback.cloned()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OddsColumns {
    pub provider: usize,
    pub handicap: Option<usize>,
    pub home_odds: Option<usize>,
    pub draw_odds: Option<usize>,
    pub away_odds: Option<usize>,
    pub home_kelly: Option<usize>,
    pub draw_kelly: Option<usize>,
    pub away_kelly: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowLayout {
    pub primary: OddsColumns,
    pub secondary: Option<OddsColumns>,
    pub min_cells: usize,
}

impl RowLayout {
    /// Build an `OddsRow` from raw cell texts, reading each field from the primary offset
    /// and only falling back to the secondary offset when the primary cell is empty.
    pub fn extract(&self, cells: &[String]) -> Option<OddsRow> {
        if cells.len() < self.min_cells {
            return None;
        }
        let p = &self.primary;
        let s = self.secondary.as_ref();
        let field = |pick: fn(&OddsColumns) -> Option<usize>| -> Option<String> {
            let primary = pick(p)?;
            let value = cell_text(cells, primary);
            if !value.is_empty() {
                return Some(value);
            }
            let alt = s.and_then(pick).map(|idx| cell_text(cells, idx));
            Some(alt.unwrap_or(value))
        };
        Some(OddsRow {
            provider_name: cell_text(cells, p.provider),
            handicap_text: field(|c| c.handicap),
            home_odds: field(|c| c.home_odds),
            draw_odds: field(|c| c.draw_odds),
            away_odds: field(|c| c.away_odds),
            home_kelly: field(|c| c.home_kelly),
            draw_kelly: field(|c| c.draw_kelly),
            away_kelly: field(|c| c.away_kelly),
        })
    }
}

pub fn select_from_cells(
    raw_rows: &[Vec<String>],
    layout: &RowLayout,
    targets: &TargetProviders,
) -> Option<OddsRow> {
    let rows: Vec<OddsRow> = raw_rows.iter().filter_map(|r| layout.extract(r)).collect();
    select_odds_row(&rows, targets)
}

fn cell_text(cells: &[String], idx: usize) -> String {
    cells.get(idx).map(|c| c.trim().to_string()).unwrap_or_default()
}
