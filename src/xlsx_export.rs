use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Url, Workbook, Worksheet};

use crate::analytics::{ANALYTICS_HEADERS, UNAVAILABLE};
use crate::pipeline::ReportRow;
use crate::report::{BASE_HEADERS, stage_headers};
use crate::snapshot::SnapshotStage;

pub const LINK_TEXT: &str = "查看盘口";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub fixtures: usize,
    pub linked: usize,
}

pub fn header_row() -> Vec<String> {
    let mut out: Vec<String> = BASE_HEADERS.iter().map(|h| h.to_string()).collect();
    out.push("开赛时间".to_string());
    out.push("比赛ID".to_string());
    out.push("匹配状态".to_string());
    for stage in SnapshotStage::ALL {
        out.extend(stage_headers(stage));
    }
    out.extend(ANALYTICS_HEADERS.iter().map(|h| h.to_string()));
    out
}

const LINK_COL: u16 = 5;

pub fn export_workbook(path: &Path, issue: &str, rows: &[ReportRow]) -> Result<ExportReport> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export directory {}", parent.display()))?;
    }

    let mut workbook = Workbook::new();
    let mut report = ExportReport::default();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(issue)?;
        write_header(sheet, &header_row())?;
        for (idx, row) in rows.iter().enumerate() {
            let linked = write_fixture(sheet, idx as u32 + 1, row)?;
            report.fixtures += 1;
            if linked {
                report.linked += 1;
            }
        }
        sheet.set_freeze_panes(1, 0)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    Ok(report)
}

fn write_header(sheet: &mut Worksheet, headers: &[String]) -> Result<()> {
    let bold = Format::new().set_bold();
    for (col, value) in headers.iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, value, &bold)
            .with_context(|| format!("write header ({col})"))?;
    }
    Ok(())
}

fn write_fixture(sheet: &mut Worksheet, row_idx: u32, row: &ReportRow) -> Result<bool> {
    let rec = &row.record;
    let identity = [
        rec.match_number.as_str(),
        rec.league.as_str(),
        rec.home_team.as_str(),
        rec.away_team.as_str(),
        rec.kickoff.as_deref().unwrap_or(UNAVAILABLE),
    ];
    for (col, value) in identity.iter().enumerate() {
        sheet
            .write_string(row_idx, col as u16, *value)
            .with_context(|| format!("write cell ({row_idx},{col})"))?;
    }

    let linked = match rec.external_url.as_deref() {
        Some(url) if !url.is_empty() => {
            sheet
                .write_url(row_idx, LINK_COL, Url::new(url).set_text(LINK_TEXT))
                .with_context(|| format!("write link ({row_idx})"))?;
            true
        }
        _ => {
            sheet.write_string(row_idx, LINK_COL, UNAVAILABLE)?;
            false
        }
    };
    sheet.write_string(row_idx, LINK_COL + 1, rec.link_status.label())?;

    let mut col = LINK_COL + 2;
    for stage in SnapshotStage::ALL {
        for value in rec.stage(stage).slots() {
            match value {
                Some(v) => sheet.write_number(row_idx, col, v)?,
                None => sheet.write_string(row_idx, col, UNAVAILABLE)?,
            };
            col += 1;
        }
    }
    for cell in row.analytics.cells() {
        sheet.write_string(row_idx, col, &cell)?;
        col += 1;
    }
    Ok(linked)
}

#[cfg(test)]
mod tests {
    use super::header_row;

    #[test]
    fn header_lists_every_stage_group() {
        let headers = header_row();
        assert_eq!(headers.len(), 4 + 3 + 28 + 5);
        assert_eq!(headers[5], "比赛ID");
        assert_eq!(headers[7], "初盘盘口");
        assert_eq!(headers[34], "封盘客凯利");
        assert_eq!(headers.last().map(String::as_str), Some("投注倾向"));
    }
}
