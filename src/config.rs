use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::analytics::LeanTieBreak;
use crate::bookmaker::{DEFAULT_TARGET_PROVIDERS, TargetProviders};
use crate::fixture_match::CandidatePolicy;
use crate::http_client::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::team_alias::DuplicatePolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";
pub const DEFAULT_DB_PATH: &str = "足彩分析/{issue}/snapshots.sqlite";
pub const DEFAULT_ALIAS_CSV: &str = "球队名称映射表.csv";
pub const DEFAULT_EXCEL_PATH: &str = "足彩分析/{issue}/传统足彩{issue}期盘口数据.xlsx";
pub const DEFAULT_OUTPUT_HTML: &str = "output_{issue}.html";
pub const DEFAULT_PACING_MS: u64 = 1000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const ENV_ISSUE: &str = "ODDS_RADAR_ISSUE";
pub const ENV_DATE: &str = "ODDS_RADAR_DATE";
pub const ENV_PACING_MS: &str = "ODDS_RADAR_PACING_MS";
pub const ENV_LOG: &str = "ODDS_RADAR_LOG";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    issue: Option<String>,
    date: Option<String>,
    db_path: Option<String>,
    alias_csv: Option<String>,
    excel_path: Option<String>,
    output_html: Option<String>,
    pacing_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    target_providers: Option<Vec<String>>,
    alias_duplicates: Option<DuplicatePolicy>,
    candidate_duplicates: Option<CandidatePolicy>,
    lean_tie: Option<LeanTieBreak>,
    log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub issue: String,
    pub date: String,
    pub db_path: PathBuf,
    pub alias_csv: PathBuf,
    pub excel_path: PathBuf,
    pub output_html: PathBuf,
    pub pacing_ms: u64,
    pub request_timeout_secs: u64,
    pub target_providers: TargetProviders,
    pub alias_duplicates: DuplicatePolicy,
    pub candidate_duplicates: CandidatePolicy,
    pub lean_tie: LeanTieBreak,
    pub log_level: String,
}

impl Config {
    /// Read `path` (a missing file counts as empty), then apply env overrides and finally
    /// `overrides`, keyed by the same variable names.
    pub fn load(path: &Path, overrides: &HashMap<String, String>) -> Result<Self> {
        let raw = read_raw(path)?;
        let mut env: HashMap<String, String> = [ENV_ISSUE, ENV_DATE, ENV_PACING_MS, ENV_LOG]
            .into_iter()
            .filter_map(|k| std::env::var(k).ok().map(|v| (k.to_string(), v)))
            .collect();
        env.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self::resolve(raw, &env)
    }

    pub fn from_json(text: &str, env: &HashMap<String, String>) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(text).context("invalid config json")?;
        Self::resolve(raw, env)
    }

    fn resolve(raw: RawConfig, env: &HashMap<String, String>) -> Result<Self> {
        let env_str = |key: &str| env.get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let issue = env_str(ENV_ISSUE)
            .or(raw.issue.map(|v| v.trim().to_string()))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("config is missing required field `issue`"))?;
        let date = env_str(ENV_DATE)
            .or(raw.date.map(|v| v.trim().to_string()))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("config is missing required field `date`"))?;

        let pacing_ms = match env_str(ENV_PACING_MS) {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("{ENV_PACING_MS} must be milliseconds, got {v:?}"))?,
            None => raw.pacing_ms.unwrap_or(DEFAULT_PACING_MS),
        };

        let template = |value: Option<String>, default: &str| {
            PathBuf::from(fill_issue(value.as_deref().unwrap_or(default), &issue))
        };

        let target_providers = match raw.target_providers {
            Some(list) => TargetProviders::new(list),
            None => TargetProviders::new(DEFAULT_TARGET_PROVIDERS.iter().copied()),
        };

        Ok(Self {
            db_path: template(raw.db_path, DEFAULT_DB_PATH),
            alias_csv: template(raw.alias_csv, DEFAULT_ALIAS_CSV),
            excel_path: template(raw.excel_path, DEFAULT_EXCEL_PATH),
            output_html: template(raw.output_html, DEFAULT_OUTPUT_HTML),
            pacing_ms,
            request_timeout_secs: raw
                .request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            target_providers,
            alias_duplicates: raw.alias_duplicates.unwrap_or_default(),
            candidate_duplicates: raw.candidate_duplicates.unwrap_or_default(),
            lean_tie: raw.lean_tie.unwrap_or_default(),
            log_level: env_str(ENV_LOG)
                .or(raw.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            issue,
            date,
        })
    }
}

fn read_raw(path: &Path) -> Result<RawConfig> {
    if !path.exists() {
        return Ok(RawConfig::default());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed reading config {}", path.display()))?;
    serde_json::from_str(text.trim_start_matches('\u{feff}'))
        .with_context(|| format!("invalid config json in {}", path.display()))
}

pub fn fill_issue(template: &str, issue: &str) -> String {
    template.replace("{issue}", issue)
}
