//! Aggregation of result records into per-model summary rows.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BenchError, BenchResult};
use crate::result::{ResultRecord, RESULT_FILE_NAME};

/// JSON summary written by [`write_report`]
pub const REPORT_JSON_NAME: &str = "tts_results.json";

/// Markdown table written by [`write_report`]
pub const REPORT_MARKDOWN_NAME: &str = "tts_report.md";

/// Tokens-per-second chart written by [`write_report`]
pub const TOK_CHART_NAME: &str = "android_tts_tok_per_sec.svg";

/// Real-time factor chart written by [`write_report`]
pub const RTF_CHART_NAME: &str = "android_tts_rtf.svg";

const CHART_MAX_WIDTH: usize = 780;
const CHART_BAR_HEIGHT: usize = 18;
const CHART_GAP: usize = 8;
const CHART_LEFT: usize = 260;
const CHART_TOP: usize = 60;

/// Files produced by [`write_report`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    /// `tts_results.json`
    pub json: PathBuf,
    /// `tts_report.md`
    pub markdown: PathBuf,
    /// Tokens-per-second bar chart
    pub tok_chart: PathBuf,
    /// Real-time factor bar chart
    pub rtf_chart: PathBuf,
}

impl ReportPaths {
    /// All paths in the order they are written
    #[must_use]
    pub fn all(&self) -> [&Path; 4] {
        [&self.markdown, &self.json, &self.tok_chart, &self.rtf_chart]
    }
}

/// Summary of every record of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Model id
    pub model_id: String,
    /// Engine id
    pub engine: String,
    /// Model display name
    pub model_name: String,
    /// Suite of the first record
    pub prompt_set: String,
    /// Number of records
    pub count: usize,
    /// Median over non-zero load times
    pub median_load_ms: f64,
    /// Median synthesis time
    pub median_synth_ms: f64,
    /// 95th percentile synthesis time (nearest rank)
    pub p95_synth_ms: f64,
    /// Median tokens per second
    pub median_tok_per_s: f64,
    /// Median over positive real-time factors
    pub median_rtf: f64,
    /// `PASS` when there is at least one record
    pub status: String,
}

/// Statistical median: mean of the two middle values for even counts
fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Nearest-rank 95th percentile
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn p95(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (0.95 * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

/// Group records by model and summarize each group, fastest first
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize(records: &[ResultRecord]) -> Vec<SummaryRow> {
    let mut grouped: BTreeMap<&str, Vec<&ResultRecord>> = BTreeMap::new();
    for record in records.iter().filter(|r| !r.model.id.is_empty()) {
        grouped.entry(record.model.id.as_str()).or_default().push(record);
    }

    let mut rows: Vec<SummaryRow> = grouped
        .into_iter()
        .map(|(model_id, group)| {
            let first = group[0];
            let loads: Vec<f64> = group
                .iter()
                .map(|r| r.timing_ms.load as f64)
                .filter(|&ms| ms > 0.0)
                .collect();
            let synth: Vec<f64> = group.iter().map(|r| r.timing_ms.synthesis as f64).collect();
            let tok: Vec<f64> = group.iter().map(|r| r.metrics.tokens_per_second).collect();
            let rtf: Vec<f64> = group
                .iter()
                .map(|r| r.metrics.rtf)
                .filter(|&x| x > 0.0)
                .collect();

            SummaryRow {
                model_id: model_id.to_string(),
                engine: first.model.engine.clone(),
                model_name: if first.model.name.is_empty() {
                    model_id.to_string()
                } else {
                    first.model.name.clone()
                },
                prompt_set: first.input.suite_id.clone(),
                count: group.len(),
                median_load_ms: median(&loads),
                median_synth_ms: median(&synth),
                p95_synth_ms: p95(&synth),
                median_tok_per_s: median(&tok),
                median_rtf: median(&rtf),
                status: if group.is_empty() { "FAIL" } else { "PASS" }.to_string(),
            }
        })
        .collect();

    // Zero RTF means unmeasured and sorts last.
    let rtf_key = |r: &SummaryRow| if r.median_rtf > 0.0 { r.median_rtf } else { f64::MAX };
    rows.sort_by(|a, b| {
        rtf_key(a)
            .total_cmp(&rtf_key(b))
            .then_with(|| b.median_tok_per_s.total_cmp(&a.median_tok_per_s))
    });
    rows
}

/// Load every `result.json` under `root`, optionally restricted to one run.
///
/// Unparseable files are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the search pattern is invalid.
pub fn collect_records(root: &Path, run_id: Option<&str>) -> BenchResult<Vec<ResultRecord>> {
    let base = match run_id {
        Some(run) => root.join(run),
        None => root.to_path_buf(),
    };
    let pattern = base.join("**").join(RESULT_FILE_NAME);
    let pattern = pattern.to_string_lossy();

    let mut paths: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| BenchError::invalid_input(format!("bad results pattern {pattern}: {e}")))?
        .filter_map(Result::ok)
        .collect();
    paths.sort();

    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        match ResultRecord::load(&path) {
            Ok(record) => records.push(record),
            Err(e) => warn!(category = e.category(), "Skipping {}: {}", path.display(), e),
        }
    }
    info!("Collected {} result records under {}", records.len(), base.display());
    Ok(records)
}

/// Markdown table of `rows`
#[must_use]
pub fn render_markdown(rows: &[SummaryRow], source: &Path) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Offline TTS Benchmark Report\n");
    let _ = writeln!(out, "Input dir: `{}`\n", source.display());
    out.push_str(
        "| Model ID | Engine | Prompt set | Median load (ms) | Median synth (ms) | P95 synth (ms) | Median tok/s | Median RTF | Count | Status |\n",
    );
    out.push_str("|---|---|---|---:|---:|---:|---:|---:|---:|---|\n");
    for r in rows {
        let _ = writeln!(
            out,
            "| `{}` | `{}` | {} | {:.0} | {:.0} | {:.0} | {:.2} | {:.3} | {} | {} |",
            r.model_id,
            r.engine,
            r.prompt_set,
            r.median_load_ms,
            r.median_synth_ms,
            r.p95_synth_ms,
            r.median_tok_per_s,
            r.median_rtf,
            r.count,
            r.status
        );
    }
    out
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Horizontal SVG bar chart of `(label, value)` pairs, in the given order.
///
/// Bars are scaled to the largest value. An empty item list renders an
/// empty string.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn render_bar_chart(items: &[(String, f64)], title: &str, unit: &str) -> String {
    if items.is_empty() {
        return String::new();
    }
    let max_val = items.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let max_val = if max_val > 0.0 { max_val } else { 1.0 };
    let width = CHART_LEFT + CHART_MAX_WIDTH + 40;
    let height = CHART_TOP + items.len() * (CHART_BAR_HEIGHT + CHART_GAP) + 40;

    let mut parts = vec![
        format!(r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}">"#),
        r##"<rect width="100%" height="100%" fill="#ffffff"/>"##.to_string(),
        format!(
            r##"<text x="20" y="30" font-family="ui-sans-serif, system-ui" font-size="18" fill="#111827">{}</text>"##,
            escape_xml(title)
        ),
        format!(
            r##"<text x="20" y="50" font-family="ui-sans-serif, system-ui" font-size="12" fill="#6b7280">Unit: {}</text>"##,
            escape_xml(unit)
        ),
    ];

    let mut y = CHART_TOP;
    for (label, value) in items {
        let frac = (value / max_val).max(0.0);
        let bar_w = (CHART_MAX_WIDTH as f64 * frac) as usize;
        parts.push(format!(
            r##"<text x="20" y="{}" font-family="ui-monospace, SFMono-Regular, Menlo, monospace" font-size="12" fill="#111827">{}</text>"##,
            y + 13,
            escape_xml(label)
        ));
        parts.push(format!(
            r##"<rect x="{CHART_LEFT}" y="{y}" width="{bar_w}" height="{CHART_BAR_HEIGHT}" rx="3" fill="#2563eb"/>"##
        ));
        parts.push(format!(
            r##"<text x="{}" y="{}" font-family="ui-sans-serif, system-ui" font-size="12" fill="#111827">{value:.3}</text>"##,
            CHART_LEFT + bar_w + 8,
            y + 13
        ));
        y += CHART_BAR_HEIGHT + CHART_GAP;
    }
    parts.push("</svg>".to_string());

    let mut out = parts.join("\n");
    out.push('\n');
    out
}

/// Chart items by median tokens per second, highest first
#[must_use]
pub fn tok_chart_items(rows: &[SummaryRow]) -> Vec<(String, f64)> {
    let mut sorted: Vec<&SummaryRow> = rows.iter().collect();
    sorted.sort_by(|a, b| b.median_tok_per_s.total_cmp(&a.median_tok_per_s));
    sorted
        .into_iter()
        .map(|r| (r.model_id.clone(), r.median_tok_per_s))
        .collect()
}

/// Chart items by median RTF, lowest first with unmeasured models last
#[must_use]
pub fn rtf_chart_items(rows: &[SummaryRow]) -> Vec<(String, f64)> {
    let key = |r: &SummaryRow| if r.median_rtf > 0.0 { r.median_rtf } else { f64::MAX };
    let mut sorted: Vec<&SummaryRow> = rows.iter().collect();
    sorted.sort_by(|a, b| key(a).total_cmp(&key(b)));
    sorted
        .into_iter()
        .map(|r| (r.model_id.clone(), r.median_rtf))
        .collect()
}

/// Write the JSON summary, the markdown table and both bar charts into `out_dir`
///
/// # Errors
///
/// Returns an error if the directory or any file cannot be written.
pub fn write_report(rows: &[SummaryRow], source: &Path, out_dir: &Path) -> BenchResult<ReportPaths> {
    std::fs::create_dir_all(out_dir)?;
    let paths = ReportPaths {
        json: out_dir.join(REPORT_JSON_NAME),
        markdown: out_dir.join(REPORT_MARKDOWN_NAME),
        tok_chart: out_dir.join(TOK_CHART_NAME),
        rtf_chart: out_dir.join(RTF_CHART_NAME),
    };

    std::fs::write(&paths.json, serde_json::to_string_pretty(rows)?)?;
    std::fs::write(&paths.markdown, render_markdown(rows, source))?;
    std::fs::write(
        &paths.tok_chart,
        render_bar_chart(&tok_chart_items(rows), "Median tok/s (tokens = words)", "words/sec"),
    )?;
    std::fs::write(
        &paths.rtf_chart,
        render_bar_chart(&rtf_chart_items(rows), "Median RTF (lower is faster)", "rtf"),
    )?;
    info!("Wrote report files to {}", out_dir.display());
    Ok(paths)
}
