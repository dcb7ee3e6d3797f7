use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::analytics::{ANALYTICS_HEADERS, UNAVAILABLE};
use crate::handicap::handicap_label;
use crate::pipeline::ReportRow;
use crate::snapshot::{SnapshotFields, SnapshotStage};

pub const BASE_HEADERS: [&str; 4] = ["场次", "联赛", "主队", "客队"];
pub const STAGE_FIELD_NAMES: [&str; 7] =
    ["盘口", "主胜赔率", "平局赔率", "客胜赔率", "主凯利", "平凯利", "客凯利"];

pub fn stage_headers(stage: SnapshotStage) -> Vec<String> {
    STAGE_FIELD_NAMES
        .iter()
        .map(|name| format!("{}{}", stage.label(), name))
        .collect()
}

pub fn stage_cells(fields: &SnapshotFields) -> Vec<String> {
    fields
        .slots()
        .iter()
        .map(|v| match v {
            Some(v) => format_number(*v),
            None => UNAVAILABLE.to_string(),
        })
        .collect()
}

fn format_number(v: f64) -> String {
    let s = format!("{v:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

fn stage_title(stage: SnapshotStage) -> &'static str {
    match stage {
        SnapshotStage::Opening => "📊 初盘数据",
        SnapshotStage::Mid => "⏱️ 中盘数据",
        SnapshotStage::Late => "⏳ 临盘数据",
        SnapshotStage::Closing => "🔚 封盘数据",
    }
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_dashboard(issue: &str, rows: &[ReportRow]) -> String {
    let columns = BASE_HEADERS.len() + ANALYTICS_HEADERS.len() + 1;
    let mut body = String::new();
    for row in rows {
        let rec = &row.record;
        body.push_str("<tr class='main-row'>");
        let base = [
            rec.match_number.as_str(),
            rec.league.as_str(),
            rec.home_team.as_str(),
            rec.away_team.as_str(),
        ];
        for cell in base {
            let _ = write!(body, "<td>{}</td>", escape_html(cell));
        }
        for cell in row.analytics.cells() {
            let _ = write!(body, "<td>{}</td>", escape_html(&cell));
        }
        body.push_str("<td><button class='expand-btn'>＋</button></td></tr>");

        let _ = write!(
            body,
            "<tr class='detail-row' style='display:none'><td colspan='{columns}'><div style='padding:10px'>"
        );
        if let Some(url) = rec.external_url.as_deref() {
            let _ = write!(
                body,
                "<div><a href='{}' target='_blank'>查看盘口</a> · {}</div>",
                escape_html(url),
                rec.link_status.label()
            );
        }
        for stage in SnapshotStage::ALL {
            body.push_str(&stage_block(stage, rec.stage(stage)));
        }
        body.push_str("</div></td></tr>");
    }

    let header: String = BASE_HEADERS
        .iter()
        .chain(ANALYTICS_HEADERS.iter())
        .map(|h| format!("<th>{h}</th>"))
        .collect();

    format!(
        r#"<html>
<head>
<meta charset="utf-8">
<title>足彩智能雷达仪表盘 {issue}</title>
<style>
body {{ font-family: "Microsoft YaHei", sans-serif; padding: 20px; }}
table {{ border-collapse: collapse; width: 100%; }}
th, td {{ border: 1px solid #ccc; padding: 5px; text-align: center; }}
.expand-btn {{ background: #3498db; color: white; border: none; padding: 5px 10px; border-radius: 3px; cursor: pointer; }}
.detail-row td {{ background: #f9f9f9; }}
.inner {{ margin: 10px 0; width: 100%; border: 1px solid #ddd; }}
</style>
</head>
<body>
<h2>足彩盘口智能雷达仪表盘 第{issue}期</h2>
<table>
<thead><tr>{header}<th>更多</th></tr></thead>
<tbody>{body}</tbody>
</table>
<script>
document.querySelectorAll('.expand-btn').forEach(btn => {{
  btn.addEventListener('click', () => {{
    const detail = btn.parentElement.parentElement.nextElementSibling;
    const open = detail.style.display === 'table-row';
    detail.style.display = open ? 'none' : 'table-row';
    btn.textContent = open ? '＋' : '－';
  }});
}});
</script>
</body>
</html>
"#,
        issue = escape_html(issue),
    )
}

fn stage_block(stage: SnapshotStage, fields: &SnapshotFields) -> String {
    let header: String = stage_headers(stage)
        .iter()
        .map(|h| format!("<th>{h}</th>"))
        .collect();
    let label = fields.handicap_line.and_then(handicap_label);
    let values: String = stage_cells(fields)
        .iter()
        .enumerate()
        .map(|(idx, v)| match label {
            Some(label) if idx == 0 => format!("<td title='{label}'>{}</td>", escape_html(v)),
            _ => format!("<td>{}</td>", escape_html(v)),
        })
        .collect();
    format!(
        "<div><b>{}</b><table class='inner'><tr>{header}</tr><tr>{values}</tr></table></div>",
        stage_title(stage)
    )
}

pub fn write_dashboard(path: &Path, issue: &str, rows: &[ReportRow]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create report directory {}", parent.display()))?;
    }
    let html = render_dashboard(issue, rows);
    let tmp = path.with_extension("html.tmp");
    fs::write(&tmp, html).with_context(|| format!("failed writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("failed moving report to {}", path.display()))?;
    Ok(())
}
