use std::path::PathBuf;

use rusqlite::Connection;
use thiserror::Error;
use tracing::info;

use crate::error::ScrapeError;
use crate::export::{
    ExportedFiles, build_sheets, excel_path, export_name, json_path, write_stats_excel,
    write_stats_json,
};
use crate::model::AggregatedStats;
use crate::store::upsert_stats;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The record's values cannot be summarized. Halts the run.
    #[error("cannot summarize {match_id}: {source}")]
    Summary {
        match_id: String,
        #[source]
        source: ScrapeError,
    },

    /// Storage or file-system failure for this record only.
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

impl SinkError {
    pub fn halts_run(&self) -> bool {
        matches!(self, Self::Summary { .. })
    }
}

pub trait StatsSink {
    fn name(&self) -> &'static str;
    fn accept(&mut self, stats: &AggregatedStats) -> Result<(), SinkError>;
}

pub struct SqliteSink<'c> {
    conn: &'c Connection,
    saved: usize,
}

impl<'c> SqliteSink<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn, saved: 0 }
    }

    pub fn saved(&self) -> usize {
        self.saved
    }
}

impl StatsSink for SqliteSink<'_> {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn accept(&mut self, stats: &AggregatedStats) -> Result<(), SinkError> {
        upsert_stats(self.conn, stats)?;
        self.saved += 1;
        Ok(())
    }
}

pub struct FileExportSink {
    data_dir: PathBuf,
    next_id: usize,
    written: Vec<ExportedFiles>,
}

impl FileExportSink {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            next_id: 1,
            written: Vec::new(),
        }
    }

    pub fn written(&self) -> &[ExportedFiles] {
        &self.written
    }
}

impl StatsSink for FileExportSink {
    fn name(&self) -> &'static str {
        "export"
    }

    fn accept(&mut self, stats: &AggregatedStats) -> Result<(), SinkError> {
        let sheets = build_sheets(stats).map_err(|source| SinkError::Summary {
            match_id: stats.match_id().to_string(),
            source,
        })?;

        let name = export_name(stats);
        let files = ExportedFiles {
            excel: excel_path(&self.data_dir, &name),
            json: json_path(&self.data_dir, &name),
        };
        write_stats_excel(&files.excel, stats, self.next_id, &sheets)?;
        write_stats_json(&files.json, stats, self.next_id)?;
        info!(
            match_id = stats.match_id(),
            excel = %files.excel.display(),
            json = %files.json.display(),
            "exported fixture statistics"
        );

        self.next_id += 1;
        self.written.push(files);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{FileExportSink, SinkError, SqliteSink, StatsSink};
    use crate::model::{AggregatedStats, AggregatedStatsBuilder, PriorMatchRef, Side, StatMap};
    use crate::store::{count_stats, open_in_memory};

    fn record(home_shots: &[&str]) -> AggregatedStats {
        let prior = PriorMatchRef {
            match_id: "m1".to_string(),
            league_id: "L".to_string(),
            home_team_name: "Arsenal".to_string(),
            away_team_name: "Chelsea".to_string(),
            home_team_prior_match_ids: Vec::new(),
            away_team_prior_match_ids: Vec::new(),
        };
        let mut builder = AggregatedStatsBuilder::new(&prior);
        for shots in home_shots {
            builder.merge(Side::Home, &[("Shots", *shots)].into_iter().collect::<StatMap>());
        }
        builder.seal()
    }

    #[test]
    fn sqlite_sink_counts_saved_records() {
        let conn = open_in_memory().expect("db");
        let mut sink = SqliteSink::new(&conn);
        sink.accept(&record(&["5"])).expect("saved");
        assert_eq!(sink.saved(), 1);
        assert_eq!(count_stats(&conn).expect("count"), 1);
    }

    #[test]
    fn export_sink_writes_both_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = FileExportSink::new(dir.path());
        sink.accept(&record(&["5", "7"])).expect("exported");

        let files = &sink.written()[0];
        assert!(files.excel.ends_with("excel/stats/Arsenal - Chelsea/Arsenal - Chelsea.xlsx"));
        assert!(files.excel.exists());
        let body = std::fs::read_to_string(&files.json).expect("json");
        let parsed: serde_json::Value = serde_json::from_str(&body).expect("valid json");
        assert_eq!(parsed[0]["ID"], 1);
        assert_eq!(parsed[0]["matchId"], "m1");
        assert_eq!(parsed[0]["homeTeamPriorMatchStats"]["Shots"][1], "7");
    }

    #[test]
    fn summary_defect_halts_and_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut sink = FileExportSink::new(dir.path());
        let err = sink.accept(&record(&["5", "50%"])).expect_err("mixed units");
        assert!(matches!(err, SinkError::Summary { .. }));
        assert!(err.halts_run());
        assert!(sink.written().is_empty());
        assert!(!dir.path().join("excel").exists());
    }
}
