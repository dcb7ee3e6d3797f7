use std::cell::Cell;
use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::bookmaker::{OddsColumns, RowLayout};
use crate::fixture_match::ScrapedCandidate;
use crate::http_client::fetch_text;

pub const CANDIDATE_MIN_CELLS: usize = 7;
pub const ASIAN_MIN_CELLS: usize = 7;
pub const EUROPE_MIN_CELLS: usize = 12;
pub const HISTORY_MIN_CELLS: usize = 11;
pub const HISTORY_OPENING_MARKER: &str = "(初盘)";

static ASIAN_ODDS_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"AsianOdds\((\d+)\)").expect("asian odds regex literal"));
static HISTORY_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"OddsHistory\('/OddsHistory\.aspx\?id=(\d+)&sid=(\d+)&cid=(\d+)")
        .expect("history link regex literal")
});

pub fn candidates_url(date: &str) -> String {
    format!("https://bf.titan007.com/football/Next_{date}.htm")
}

pub fn asian_odds_url(match_id: &str) -> String {
    format!("https://vip.titan007.com/AsianOdds_n.aspx?id={match_id}")
}

pub fn europe_odds_url(match_id: &str) -> String {
    format!("https://1x2.titan007.com/oddslist/{match_id}.htm")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLink {
    pub id: String,
    pub sid: String,
    pub cid: String,
}

impl HistoryLink {
    pub fn url(&self) -> String {
        format!(
            "https://1x2.titan007.com/OddsHistory.aspx?id={}&sid={}&cid={}&l=0",
            self.id, self.sid, self.cid
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EuropeRow {
    pub cells: Vec<String>,
    pub history: Option<HistoryLink>,
}

impl EuropeRow {
    pub fn provider(&self) -> &str {
        self.cells.get(1).map(|c| c.as_str()).unwrap_or_default()
    }
}

pub fn asian_opening_layout() -> RowLayout {
    RowLayout {
        primary: OddsColumns {
            provider: 0,
            handicap: Some(3),
            ..OddsColumns::default()
        },
        secondary: None,
        min_cells: ASIAN_MIN_CELLS,
    }
}

/// Asian handicap page, live line. After closing the site hides the middle cells and the
/// line moves to cell 9.
pub fn asian_live_layout() -> RowLayout {
    RowLayout {
        primary: OddsColumns {
            provider: 0,
            handicap: Some(6),
            ..OddsColumns::default()
        },
        secondary: Some(OddsColumns {
            provider: 0,
            handicap: Some(9),
            ..OddsColumns::default()
        }),
        min_cells: ASIAN_MIN_CELLS,
    }
}

pub fn europe_live_layout() -> RowLayout {
    RowLayout {
        primary: OddsColumns {
            provider: 1,
            handicap: None,
            home_odds: Some(2),
            draw_odds: Some(3),
            away_odds: Some(4),
            home_kelly: Some(9),
            draw_kelly: Some(10),
            away_kelly: Some(11),
        },
        secondary: None,
        min_cells: EUROPE_MIN_CELLS,
    }
}

/// The history row carries no company cell; callers set the provider name.
pub fn history_layout() -> RowLayout {
    RowLayout {
        primary: OddsColumns {
            provider: usize::MAX,
            handicap: None,
            home_odds: Some(0),
            draw_odds: Some(1),
            away_odds: Some(2),
            home_kelly: Some(7),
            draw_kelly: Some(8),
            away_kelly: Some(9),
        },
        secondary: None,
        min_cells: HISTORY_MIN_CELLS,
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector {css:?}: {e}"))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

fn row_cells(row: ElementRef<'_>, td: &Selector) -> Vec<String> {
    row.select(td).map(cell_text).collect()
}

pub fn parse_candidates_html(html: &str) -> Result<Vec<ScrapedCandidate>> {
    let doc = Html::parse_document(html);
    let tr = selector("tr")?;
    let td = selector("td")?;

    let mut out = Vec::new();
    for row in doc.select(&tr) {
        let cells: Vec<ElementRef<'_>> = row.select(&td).collect();
        if cells.len() < CANDIDATE_MIN_CELLS {
            continue;
        }
        let home_team = cell_text(cells[3]);
        let away_team = cell_text(cells[5]);
        let Some(external_match_id) = ASIAN_ODDS_ID
            .captures(&row.html())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
        else {
            continue;
        };
        if home_team.is_empty() || away_team.is_empty() {
            continue;
        }
        out.push(ScrapedCandidate {
            league: cell_text(cells[1]),
            home_team,
            away_team,
            external_match_id,
        });
    }
    Ok(out)
}

pub fn parse_asian_rows(html: &str) -> Result<Vec<Vec<String>>> {
    let doc = Html::parse_document(html);
    let tr = selector("table#odds tr")?;
    let td = selector("td")?;
    Ok(doc
        .select(&tr)
        .map(|row| row_cells(row, &td))
        .filter(|cells| !cells.is_empty())
        .collect())
}

pub fn parse_europe_rows(html: &str) -> Result<Vec<EuropeRow>> {
    let doc = Html::parse_document(html);
    let tr = selector("table#oddsList_tab tr")?;
    let td = selector("td")?;

    let mut out = Vec::new();
    for row in doc.select(&tr) {
        let cells: Vec<ElementRef<'_>> = row.select(&td).collect();
        if cells.len() < EUROPE_MIN_CELLS {
            continue;
        }
        let history = cells
            .iter()
            .filter_map(|c| c.value().attr("onclick"))
            .find(|onclick| onclick.contains("OddsHistory"))
            .and_then(parse_history_link);
        out.push(EuropeRow {
            cells: cells.into_iter().map(cell_text).collect(),
            history,
        });
    }
    Ok(out)
}

pub fn parse_history_link(onclick: &str) -> Option<HistoryLink> {
    let caps = HISTORY_LINK.captures(onclick)?;
    Some(HistoryLink {
        id: caps.get(1)?.as_str().to_string(),
        sid: caps.get(2)?.as_str().to_string(),
        cid: caps.get(3)?.as_str().to_string(),
    })
}

pub fn parse_history_opening(html: &str) -> Result<Option<Vec<String>>> {
    let doc = Html::parse_document(html);
    let tr = selector("table tr")?;
    let td = selector("td")?;
    let rows: Vec<ElementRef<'_>> = doc.select(&tr).collect();
    for row in rows.into_iter().rev() {
        let text = row.text().collect::<String>();
        if !text.contains(HISTORY_OPENING_MARKER) {
            continue;
        }
        let cells = row_cells(row, &td);
        if cells.len() >= HISTORY_MIN_CELLS {
            return Ok(Some(cells));
        }
    }
    Ok(None)
}

pub trait PageSource {
    fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpPageSource {
    client: Client,
    pacing: Duration,
    last_fetch: Cell<Option<Instant>>,
}

impl HttpPageSource {
    pub fn new(client: Client, pacing_ms: u64) -> Self {
        Self {
            client,
            pacing: Duration::from_millis(pacing_ms),
            last_fetch: Cell::new(None),
        }
    }

    fn wait_turn(&self) {
        if let Some(last) = self.last_fetch.get() {
            let elapsed = last.elapsed();
            if elapsed < self.pacing {
                thread::sleep(self.pacing - elapsed);
            }
        }
        self.last_fetch.set(Some(Instant::now()));
    }
}

impl PageSource for HttpPageSource {
    fn fetch(&self, url: &str) -> Result<String> {
        self.wait_turn();
        debug!(url, "fetching page");
        fetch_text(&self.client, url)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SavedPages {
    pages: HashMap<String, String>,
}

impl SavedPages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, body: impl Into<String>) {
        self.pages.insert(url.into(), body.into());
    }

    pub fn with(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(url, body);
        self
    }
}

impl PageSource for SavedPages {
    fn fetch(&self, url: &str) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("no saved page for {url}"))
    }
}
