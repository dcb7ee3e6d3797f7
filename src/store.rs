use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction, params};

use crate::snapshot::{FixtureRecord, LinkStatus, MergeOutcome, SnapshotFields, SnapshotStage};

pub struct SnapshotStore {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCounts {
    pub complete: usize,
    pub partial: usize,
    pub empty: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssueStatus {
    pub fixtures: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub pending: usize,
    pub stages: Vec<(SnapshotStage, StageCounts)>,
}

impl SnapshotStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create db directory {}", parent.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn upsert_fixture(&mut self, record: &FixtureRecord) -> Result<MergeOutcome> {
        let tx = self.conn.transaction().context("begin store transaction")?;
        let outcome = match load_record(&tx, &record.issue, &record.match_number)? {
            Some(mut existing) => {
                let outcome = existing.merge_record(record);
                write_record(&tx, &existing)?;
                outcome
            }
            None => {
                write_record(&tx, record)?;
                MergeOutcome {
                    filled: SnapshotStage::ALL
                        .iter()
                        .map(|s| record.stage(*s).slots().iter().flatten().count())
                        .sum(),
                    conflicts: 0,
                }
            }
        };
        tx.commit().context("commit store transaction")?;
        Ok(outcome)
    }

    pub fn merge_stage(
        &mut self,
        issue: &str,
        match_number: &str,
        stage: SnapshotStage,
        incoming: &SnapshotFields,
    ) -> Result<MergeOutcome> {
        self.mutate(issue, match_number, |rec| rec.merge_stage(stage, incoming))
    }

    pub fn record_link(
        &mut self,
        issue: &str,
        match_number: &str,
        status: LinkStatus,
        external_match_id: Option<&str>,
        external_url: Option<&str>,
    ) -> Result<bool> {
        self.mutate(issue, match_number, |rec| {
            rec.record_link(status, external_match_id, external_url)
        })
    }

    fn mutate<T>(
        &mut self,
        issue: &str,
        match_number: &str,
        apply: impl FnOnce(&mut FixtureRecord) -> T,
    ) -> Result<T> {
        let tx = self.conn.transaction().context("begin store transaction")?;
        let mut rec = load_record(&tx, issue, match_number)?
            .ok_or_else(|| anyhow!("no fixture {match_number} in issue {issue}"))?;
        let out = apply(&mut rec);
        write_record(&tx, &rec)?;
        tx.commit().context("commit store transaction")?;
        Ok(out)
    }

    pub fn load(&self, issue: &str, match_number: &str) -> Result<Option<FixtureRecord>> {
        load_record(&self.conn, issue, match_number)
    }

    pub fn load_issue(&self, issue: &str) -> Result<Vec<FixtureRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT match_number FROM fixtures
                WHERE issue = ?1
                ORDER BY CAST(match_number AS INTEGER), match_number
                "#,
            )
            .context("prepare issue query")?;
        let numbers = stmt
            .query_map(params![issue], |row| row.get::<_, String>(0))
            .context("query issue fixtures")?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("decode fixture keys")?;

        let mut out = Vec::with_capacity(numbers.len());
        for number in numbers {
            if let Some(rec) = load_record(&self.conn, issue, &number)? {
                out.push(rec);
            }
        }
        Ok(out)
    }

    pub fn issue_status(&self, issue: &str) -> Result<IssueStatus> {
        let records = self.load_issue(issue)?;
        let mut status = IssueStatus {
            fixtures: records.len(),
            ..IssueStatus::default()
        };
        for rec in &records {
            match rec.link_status {
                LinkStatus::Matched => status.matched += 1,
                LinkStatus::Unmatched => status.unmatched += 1,
                LinkStatus::Pending => status.pending += 1,
            }
        }
        for stage in SnapshotStage::ALL {
            let mut counts = StageCounts::default();
            for rec in &records {
                let fields = rec.stage(stage);
                if fields.is_complete() {
                    counts.complete += 1;
                } else if fields.is_empty() {
                    counts.empty += 1;
                } else {
                    counts.partial += 1;
                }
            }
            status.stages.push((stage, counts));
        }
        Ok(status)
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS fixtures (
            issue TEXT NOT NULL,
            match_number TEXT NOT NULL,
            league TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            kickoff TEXT NULL,
            external_match_id TEXT NULL,
            external_url TEXT NULL,
            link_status TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (issue, match_number)
        );

        CREATE TABLE IF NOT EXISTS snapshots (
            issue TEXT NOT NULL,
            match_number TEXT NOT NULL,
            stage TEXT NOT NULL,
            handicap_line REAL NULL,
            home_odds REAL NULL,
            draw_odds REAL NULL,
            away_odds REAL NULL,
            home_kelly REAL NULL,
            draw_kelly REAL NULL,
            away_kelly REAL NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (issue, match_number, stage)
        );
        CREATE INDEX IF NOT EXISTS idx_snapshots_issue ON snapshots(issue);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

fn load_record(
    conn: &Connection,
    issue: &str,
    match_number: &str,
) -> Result<Option<FixtureRecord>> {
    let base = conn
        .query_row(
            r#"
            SELECT league, home_team, away_team, kickoff,
                   external_match_id, external_url, link_status
            FROM fixtures WHERE issue = ?1 AND match_number = ?2
            "#,
            params![issue, match_number],
            |row| {
                Ok(FixtureRecord {
                    issue: issue.to_string(),
                    match_number: match_number.to_string(),
                    league: row.get(0)?,
                    home_team: row.get(1)?,
                    away_team: row.get(2)?,
                    kickoff: row.get(3)?,
                    external_match_id: row.get(4)?,
                    external_url: row.get(5)?,
                    link_status: LinkStatus::from_key(&row.get::<_, String>(6)?),
                    ..FixtureRecord::default()
                })
            },
        )
        .optional()
        .context("load fixture row")?;
    let Some(mut rec) = base else {
        return Ok(None);
    };

    let mut stmt = conn
        .prepare(
            r#"
            SELECT stage, handicap_line, home_odds, draw_odds, away_odds,
                   home_kelly, draw_kelly, away_kelly
            FROM snapshots WHERE issue = ?1 AND match_number = ?2
            "#,
        )
        .context("prepare snapshot query")?;
    let rows = stmt
        .query_map(params![issue, match_number], |row| {
            Ok((
                row.get::<_, String>(0)?,
                SnapshotFields {
                    handicap_line: row.get(1)?,
                    home_odds: row.get(2)?,
                    draw_odds: row.get(3)?,
                    away_odds: row.get(4)?,
                    home_kelly: row.get(5)?,
                    draw_kelly: row.get(6)?,
                    away_kelly: row.get(7)?,
                },
            ))
        })
        .context("query snapshots")?;
    for row in rows {
        let (stage, fields) = row.context("decode snapshot row")?;
        if let Ok(stage) = stage.parse::<SnapshotStage>() {
            *rec.stage_mut(stage) = fields;
        }
    }
    Ok(Some(rec))
}

fn write_record(tx: &Transaction<'_>, rec: &FixtureRecord) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    tx.execute(
        r#"
        INSERT INTO fixtures (
            issue, match_number, league, home_team, away_team, kickoff,
            external_match_id, external_url, link_status, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        ON CONFLICT(issue, match_number) DO UPDATE SET
            league = excluded.league,
            home_team = excluded.home_team,
            away_team = excluded.away_team,
            kickoff = excluded.kickoff,
            external_match_id = excluded.external_match_id,
            external_url = COALESCE(fixtures.external_url, excluded.external_url),
            link_status = excluded.link_status,
            updated_at = excluded.updated_at
        "#,
        params![
            rec.issue,
            rec.match_number,
            rec.league,
            rec.home_team,
            rec.away_team,
            rec.kickoff,
            rec.external_match_id,
            rec.external_url,
            rec.link_status.key(),
            now,
        ],
    )
    .context("upsert fixture")?;

    for stage in SnapshotStage::ALL {
        let f = rec.stage(stage);
        if f.is_empty() {
            continue;
        }
        tx.execute(
            r#"
            INSERT INTO snapshots (
                issue, match_number, stage, handicap_line, home_odds, draw_odds,
                away_odds, home_kelly, draw_kelly, away_kelly, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(issue, match_number, stage) DO UPDATE SET
                handicap_line = COALESCE(snapshots.handicap_line, excluded.handicap_line),
                home_odds = COALESCE(snapshots.home_odds, excluded.home_odds),
                draw_odds = COALESCE(snapshots.draw_odds, excluded.draw_odds),
                away_odds = COALESCE(snapshots.away_odds, excluded.away_odds),
                home_kelly = COALESCE(snapshots.home_kelly, excluded.home_kelly),
                draw_kelly = COALESCE(snapshots.draw_kelly, excluded.draw_kelly),
                away_kelly = COALESCE(snapshots.away_kelly, excluded.away_kelly),
                updated_at = excluded.updated_at
            "#,
            params![
                rec.issue,
                rec.match_number,
                stage.key(),
                f.handicap_line,
                f.home_odds,
                f.draw_odds,
                f.away_odds,
                f.home_kelly,
                f.draw_kelly,
                f.away_kelly,
                now,
            ],
        )
        .context("upsert snapshot")?;
    }
    Ok(())
}
