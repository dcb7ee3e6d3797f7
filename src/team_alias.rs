use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// Venue/country qualifiers the feeds append, e.g. "曼联[英超]" or "湘南比马【日职】".
static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]|【[^】]*】").expect("bracket regex literal"));

const KNOWN_HEADERS: &[[&str; 2]] = &[
    ["excel_team", "titan007_team"],
    ["external_name", "canonical_name"],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    FirstWins,
    #[default]
    LastWins,
}

#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: HashMap<String, String>,
    duplicates: Vec<String>,
}

impl AliasTable {
    pub fn from_pairs<I, K, V>(pairs: I, policy: DuplicatePolicy) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut entries = HashMap::new();
        let mut duplicates = Vec::new();
        for (from, to) in pairs {
            let key = clean_team_name(from.as_ref());
            let value = clean_team_name(to.as_ref());
            if key.is_empty() || value.is_empty() {
                continue;
            }
            if entries.contains_key(&key) {
                duplicates.push(key.clone());
                if policy == DuplicatePolicy::FirstWins {
                    continue;
                }
            }
            entries.insert(key, value);
        }
        Self {
            entries,
            duplicates,
        }
    }

    /// Parse the two-column alias table. A header row is recognized and skipped; rows
    /// with an empty cell are dropped.
    pub fn parse_csv(text: &str, policy: DuplicatePolicy) -> Self {
        let mut rows = text
            .lines()
            .map(split_csv_line)
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .peekable();
        if let Some(first) = rows.peek()
            && is_header(first)
        {
            rows.next();
        }
        let pairs = rows.filter_map(|row| {
            let mut cells = row.into_iter();
            let from = cells.next()?;
            let to = cells.next()?;
            Some((from, to))
        });
        let table = Self::from_pairs(pairs, policy);
        if !table.duplicates.is_empty() {
            warn!(
                count = table.duplicates.len(),
                ?policy,
                "alias table has duplicate keys"
            );
        }
        table
    }

    pub fn load_csv(path: &Path, policy: DuplicatePolicy) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "alias table not found, using identity names");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read alias table {}", path.display()))?;
        let raw = raw.trim_start_matches('\u{feff}');
        let table = Self::parse_csv(raw, policy);
        debug!(entries = table.len(), path = %path.display(), "alias table loaded");
        Ok(table)
    }

    pub fn resolve(&self, raw: &str) -> String {
        let key = clean_team_name(raw);
        match self.entries.get(&key) {
            Some(canonical) => canonical.clone(),
            None => key,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn duplicate_keys(&self) -> &[String] {
        &self.duplicates
    }
}

pub fn clean_team_name(raw: &str) -> String {
    BRACKETED
        .replace_all(raw, "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

fn is_header(row: &[String]) -> bool {
    KNOWN_HEADERS.iter().any(|header| {
        row.len() >= 2
            && row[0].trim().eq_ignore_ascii_case(header[0])
            && row[1].trim().eq_ignore_ascii_case(header[1])
    })
}

// Quote-tolerant single-line split; alias names never span lines.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && matches!(chars.peek(), Some('"')) => {
                chars.next();
                field.push('"');
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => cells.push(std::mem::take(&mut field)),
            _ => field.push(ch),
        }
    }
    cells.push(field);
    cells
}

#[cfg(test)]
mod tests {
    use super::{AliasTable, DuplicatePolicy, clean_team_name};

    #[test]
    fn brackets_and_whitespace_are_stripped() {
        assert_eq!(clean_team_name("曼联[英超]"), "曼联");
        assert_eq!(clean_team_name(" 皇家 马德里 "), "皇家马德里");
        assert_eq!(clean_team_name("湘南比马【日职】"), "湘南比马");
        assert_eq!(clean_team_name("[中]北京国安[1]"), "北京国安");
    }

    #[test]
    fn resolve_falls_back_to_identity() {
        let table = AliasTable::default();
        assert_eq!(table.resolve("曼联[英超]"), "曼联");
    }

    #[test]
    fn resolve_uses_mapping() {
        let table = AliasTable::from_pairs([("曼联联队", "曼联")], DuplicatePolicy::LastWins);
        assert_eq!(table.resolve("曼联联队"), "曼联");
        assert_eq!(table.resolve(" 曼联 联队 [英]"), "曼联");
    }

    #[test]
    fn duplicate_policy_is_explicit() {
        let pairs = [("阿森纳", "阿仙奴"), ("阿森纳", "兵工厂")];
        let last = AliasTable::from_pairs(pairs, DuplicatePolicy::LastWins);
        assert_eq!(last.resolve("阿森纳"), "兵工厂");
        assert_eq!(last.duplicate_keys(), ["阿森纳".to_string()]);

        let first = AliasTable::from_pairs(pairs, DuplicatePolicy::FirstWins);
        assert_eq!(first.resolve("阿森纳"), "阿仙奴");
    }

    #[test]
    fn parse_csv_skips_header_and_blank_cells() {
        let text = "excel_team,titan007_team\r\n曼彻斯特联,曼联\n空白,\n,无名\n\"国际米兰\",国米\n";
        let table = AliasTable::parse_csv(text, DuplicatePolicy::LastWins);
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve("曼彻斯特联"), "曼联");
        assert_eq!(table.resolve("国际米兰"), "国米");
        assert_eq!(table.resolve("空白"), "空白");
    }

    #[test]
    fn parse_csv_without_header_keeps_first_row() {
        let table = AliasTable::parse_csv("拜仁慕尼黑,拜仁\n", DuplicatePolicy::LastWins);
        assert_eq!(table.resolve("拜仁慕尼黑"), "拜仁");
    }
}
