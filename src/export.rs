use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rust_xlsxwriter::{Workbook, Worksheet};
use serde::Serialize;

use crate::error::ScrapeResult;
use crate::model::{AggregatedStats, Side, StatSeries};
use crate::summary::summarize_strings;

const OVERVIEW_SHEET: &str = "Overview";
const SUMMARY_HEADER: [&str; 5] = [
    "Statistic",
    "Value",
    "Minimum Value",
    "Average Value",
    "Maximum Value",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFiles {
    pub excel: PathBuf,
    pub json: PathBuf,
}

/// `"{home} - {away}"` with characters that would split the path replaced.
pub fn export_name(stats: &AggregatedStats) -> String {
    stats
        .display_name()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            other => other,
        })
        .collect()
}

pub fn excel_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir
        .join("excel")
        .join("stats")
        .join(name)
        .join(format!("{name}.xlsx"))
}

pub fn json_path(data_dir: &Path, name: &str) -> PathBuf {
    data_dir
        .join("json")
        .join("stats")
        .join(name)
        .join(format!("{name}.json"))
}

fn sheet_name(side: Side) -> &'static str {
    match side {
        Side::Home => "Home Team Prior Stats",
        Side::Away => "Away Team Prior Stats",
    }
}

/// Header row plus one row per statistic: the comma-joined series and its
/// min / average / max.
pub fn summary_rows(series: &StatSeries) -> ScrapeResult<Vec<Vec<String>>> {
    let mut rows = vec![SUMMARY_HEADER.iter().map(|h| h.to_string()).collect()];
    for (stat, values) in series.iter() {
        let summary = summarize_strings(values)?;
        rows.push(vec![
            stat.to_string(),
            values.join(","),
            summary.minimum_display(),
            summary.average_display(),
            summary.maximum_display(),
        ]);
    }
    Ok(rows)
}

fn overview_rows(stats: &AggregatedStats, id: usize) -> Vec<Vec<String>> {
    vec![
        ["ID", "matchId", "leagueId", "homeTeamName", "awayTeamName"]
            .iter()
            .map(|h| h.to_string())
            .collect(),
        vec![
            id.to_string(),
            stats.match_id().to_string(),
            stats.league_id().to_string(),
            stats.home_team_name().to_string(),
            stats.away_team_name().to_string(),
        ],
    ]
}

/// Summaries are computed before any file is touched, so a series that cannot
/// be summarized leaves nothing half-written.
pub fn build_sheets(stats: &AggregatedStats) -> ScrapeResult<[(String, Vec<Vec<String>>); 2]> {
    Ok([
        (
            sheet_name(Side::Home).to_string(),
            summary_rows(stats.stats_for(Side::Home))?,
        ),
        (
            sheet_name(Side::Away).to_string(),
            summary_rows(stats.stats_for(Side::Away))?,
        ),
    ])
}

pub fn write_stats_excel(
    path: &Path,
    stats: &AggregatedStats,
    id: usize,
    sheets: &[(String, Vec<Vec<String>>)],
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export dir {}", parent.display()))?;
    }

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name(OVERVIEW_SHEET)?;
        write_rows(sheet, &overview_rows(stats, id))?;
    }
    for (name, rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(name)?;
        write_rows(sheet, rows)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;
    Ok(())
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    #[serde(rename = "ID")]
    id: usize,
    #[serde(flatten)]
    stats: &'a AggregatedStats,
}

pub fn write_stats_json(path: &Path, stats: &AggregatedStats, id: usize) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export dir {}", parent.display()))?;
    }
    let records = [JsonRecord { id, stats }];
    let body = serde_json::to_string_pretty(&records).context("serialize stats export")?;
    std::fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{excel_path, export_name, json_path, summary_rows};
    use crate::error::ScrapeError;
    use crate::model::{AggregatedStatsBuilder, PriorMatchRef, StatSeries};

    #[test]
    fn names_cannot_escape_the_export_dir() {
        let prior = PriorMatchRef {
            match_id: "m".to_string(),
            league_id: "L".to_string(),
            home_team_name: "Inter/Milan".to_string(),
            away_team_name: "AC Milan".to_string(),
            home_team_prior_match_ids: Vec::new(),
            away_team_prior_match_ids: Vec::new(),
        };
        let stats = AggregatedStatsBuilder::new(&prior).seal();
        let name = export_name(&stats);
        assert_eq!(name, "Inter_Milan - AC Milan");
        assert_eq!(
            excel_path(Path::new("data"), &name),
            Path::new("data/excel/stats/Inter_Milan - AC Milan/Inter_Milan - AC Milan.xlsx")
        );
        assert_eq!(
            json_path(Path::new("data"), &name),
            Path::new("data/json/stats/Inter_Milan - AC Milan/Inter_Milan - AC Milan.json")
        );
    }

    #[test]
    fn rows_join_values_and_summarize() {
        let mut series = StatSeries::new();
        for v in ["59%", "29%", "44%"] {
            series.append("Ball Possession", v);
        }
        let rows = summary_rows(&series).expect("valid");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "Statistic");
        assert_eq!(
            rows[1],
            vec!["Ball Possession", "59%,29%,44%", "29%", "44.00%", "59%"]
        );
    }

    #[test]
    fn unsummarizable_series_is_an_error() {
        let mut series = StatSeries::new();
        series.append("Shots", "4");
        series.append("Shots", "40%");
        assert!(matches!(
            summary_rows(&series),
            Err(ScrapeError::InconsistentUnits { .. })
        ));
    }
}
