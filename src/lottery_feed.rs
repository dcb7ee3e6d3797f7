use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde::Deserialize;

use crate::http_client::fetch_text;

const SPORTTERY_URL: &str = "https://webapi.sporttery.cn/gateway/lottery/getFootBallMatchV1.qry";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFixture {
    pub issue: String,
    pub match_number: String,
    pub kickoff: Option<String>,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    value: Option<FeedValue>,
}

#[derive(Debug, Deserialize)]
struct FeedValue {
    #[serde(rename = "sfclist", default)]
    issues: Vec<String>,
    #[serde(rename = "sfcMatch")]
    sfc_match: Option<FeedMatchBlock>,
}

#[derive(Debug, Deserialize)]
struct FeedMatchBlock {
    #[serde(rename = "matchList", default)]
    match_list: Vec<FeedMatch>,
}

#[derive(Debug, Deserialize)]
struct FeedMatch {
    #[serde(rename = "matchNum")]
    match_num: Option<serde_json::Value>,
    #[serde(rename = "startTime")]
    start_time: Option<String>,
    #[serde(rename = "matchName")]
    match_name: Option<String>,
    #[serde(rename = "masterTeamAllName")]
    home: Option<String>,
    #[serde(rename = "guestTeamAllName")]
    away: Option<String>,
}

fn feed_url(issue: &str) -> String {
    format!("{SPORTTERY_URL}?param=90,0&lotteryDrawNum={issue}&sellStatus=0&termLimits=10")
}

pub fn fetch_recent_issues(client: &Client) -> Result<Vec<String>> {
    let body = fetch_text(client, &feed_url("")).context("issue list request failed")?;
    parse_issue_list_json(&body)
}

pub fn fetch_issue_fixtures(client: &Client, issue: &str) -> Result<Vec<FeedFixture>> {
    let body = fetch_text(client, &feed_url(issue)).context("issue fixtures request failed")?;
    parse_issue_fixtures_json(issue, &body)
}

pub fn parse_issue_list_json(raw: &str) -> Result<Vec<String>> {
    let resp = parse_response(raw)?;
    Ok(resp
        .value
        .map(|v| v.issues)
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Fixtures of an issue, sorted by match number. Rows without a number or team are dropped.
pub fn parse_issue_fixtures_json(issue: &str, raw: &str) -> Result<Vec<FeedFixture>> {
    let resp = parse_response(raw)?;
    let matches = resp
        .value
        .and_then(|v| v.sfc_match)
        .map(|b| b.match_list)
        .unwrap_or_default();

    let mut out: Vec<FeedFixture> = matches
        .into_iter()
        .filter_map(|m| {
            let match_number = m.match_num.as_ref().and_then(value_to_string)?;
            let home_team = non_empty(m.home)?;
            let away_team = non_empty(m.away)?;
            Some(FeedFixture {
                issue: issue.to_string(),
                match_number,
                kickoff: non_empty(m.start_time),
                league: m.match_name.unwrap_or_default().trim().to_string(),
                home_team,
                away_team,
            })
        })
        .collect();
    out.sort_by(|a, b| match_number_key(&a.match_number).cmp(&match_number_key(&b.match_number)));
    Ok(out)
}

fn parse_response(raw: &str) -> Result<FeedResponse> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(FeedResponse { value: None });
    }
    serde_json::from_str(trimmed).context("invalid lottery feed json")
}

// Numeric order when the numbers parse, so "10" sorts after "9".
fn match_number_key(raw: &str) -> (u64, String) {
    (raw.parse::<u64>().unwrap_or(u64::MAX), raw.to_string())
}

fn value_to_string(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => non_empty(Some(s.clone())),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::{parse_issue_fixtures_json, parse_issue_list_json};

    #[test]
    fn null_body_is_empty() {
        assert!(parse_issue_list_json("null").expect("parse").is_empty());
        assert!(parse_issue_fixtures_json("1", "").expect("parse").is_empty());
    }

    #[test]
    fn numeric_match_numbers_sort_numerically() {
        let raw = r#"{"value":{"sfcMatch":{"matchList":[
            {"matchNum":10,"matchName":"意甲","masterTeamAllName":"国际米兰","guestTeamAllName":"AC米兰"},
            {"matchNum":"9","matchName":"英超","masterTeamAllName":"曼联","guestTeamAllName":"切尔西"},
            {"matchNum":"11","matchName":"英超","masterTeamAllName":"","guestTeamAllName":"切尔西"}
        ]}}}"#;
        let rows = parse_issue_fixtures_json("25048", raw).expect("parse");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].match_number, "9");
        assert_eq!(rows[1].match_number, "10");
        assert_eq!(rows[1].issue, "25048");
    }
}
