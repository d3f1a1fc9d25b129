use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{error, info, warn};

use crate::aggregate::{FixtureReport, aggregate, aggregate_parallel};
use crate::config::ScraperConfig;
use crate::error::ScrapeResult;
use crate::http_client::{PageFetcher, PageSession};
use crate::model::Fixture;
use crate::round::{fixtures_for_round, select_current_round};
use crate::sink::{SinkError, StatsSink};
use crate::store::{begin_run, finish_run, load_matches};

#[derive(Debug, Default)]
pub struct RunSummary {
    pub fixtures: usize,
    pub aggregated: usize,
    /// Records every sink accepted.
    pub records_saved: usize,
    pub no_history: usize,
    pub fully_failed: usize,
    pub failures: Vec<String>,
    pub halted: Option<SinkError>,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.halted.is_none()
    }

    fn error_lines(&self) -> Vec<String> {
        let mut lines = self.failures.clone();
        if let Some(err) = &self.halted {
            lines.push(format!("halted: {err}"));
        }
        lines
    }
}

pub struct Pipeline<'a> {
    config: &'a ScraperConfig,
    sinks: Vec<Box<dyn StatsSink + 'a>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a ScraperConfig) -> Self {
        Self {
            config,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: impl StatsSink + 'a) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn plan(&self, conn: &Connection) -> Result<Vec<Fixture>> {
        let matches = load_matches(conn)?;
        let rounds = select_current_round(&matches);
        for (league_id, group) in &rounds {
            let Some(first) = group.first() else {
                continue;
            };
            info!(
                league_id = %league_id,
                league = %first.league_name,
                round = first.match_round_number,
                fixtures = group.len(),
                "selected current round"
            );
        }
        Ok(fixtures_for_round(&rounds))
    }

    /// Aggregates every fixture of the current rounds and hands each record to
    /// the sinks. A record that cannot be summarized stops the run; any other
    /// sink failure is recorded and the next record proceeds.
    pub fn run<F, O>(&mut self, conn: &Connection, open_session: O) -> Result<RunSummary>
    where
        F: PageFetcher,
        O: Fn() -> ScrapeResult<PageSession<F>> + Sync + Send,
    {
        let fixtures = self.plan(conn)?;
        let run_id = begin_run(conn, fixtures.len())?;
        let mut summary = RunSummary {
            fixtures: fixtures.len(),
            ..RunSummary::default()
        };
        info!(
            fixtures = fixtures.len(),
            parallelism = self.config.parallelism,
            sinks = self.sinks.len(),
            "pipeline started"
        );

        if fixtures.is_empty() {
            info!("no fixtures in the current rounds");
        } else if self.config.parallelism > 1 {
            for report in aggregate_parallel(&fixtures, self.config, open_session) {
                if !self.deliver(report, &mut summary) {
                    break;
                }
            }
        } else {
            let session = match open_session() {
                Ok(session) => session,
                Err(err) => {
                    summary.failures.push(format!("session: {err}"));
                    finish_run(conn, run_id, 0, &summary.error_lines())?;
                    return Err(err).context("open page session");
                }
            };
            let config = self.config;
            session.scoped(|session| {
                // Lazy: a halt stops further navigation too.
                for report in aggregate(session, config, fixtures) {
                    if !self.deliver(report, &mut summary) {
                        break;
                    }
                }
            });
        }

        finish_run(conn, run_id, summary.records_saved, &summary.error_lines())?;
        if summary.halted.is_some() {
            error!(
                aggregated = summary.aggregated,
                records_saved = summary.records_saved,
                "pipeline halted"
            );
        } else {
            info!(
                fixtures = summary.fixtures,
                aggregated = summary.aggregated,
                records_saved = summary.records_saved,
                no_history = summary.no_history,
                fully_failed = summary.fully_failed,
                failures = summary.failures.len(),
                "pipeline finished"
            );
        }
        Ok(summary)
    }

    /// Returns false once the run must stop.
    fn deliver(&mut self, report: FixtureReport, summary: &mut RunSummary) -> bool {
        summary.aggregated += 1;
        if report.had_no_history() {
            summary.no_history += 1;
        }
        if report.all_failed() {
            summary.fully_failed += 1;
        }
        let match_id = report.stats.match_id();
        for failure in &report.failures {
            summary.failures.push(format!("{match_id}: {failure}"));
        }

        let mut accepted_everywhere = true;
        for sink in &mut self.sinks {
            match sink.accept(&report.stats) {
                Ok(()) => {}
                Err(err) if err.halts_run() => {
                    error!(match_id, sink = sink.name(), error = %err, "stopping run");
                    summary.halted = Some(err);
                    return false;
                }
                Err(err) => {
                    warn!(match_id, sink = sink.name(), error = %err, "sink failed, continuing");
                    summary
                        .failures
                        .push(format!("{} {match_id}: {err:#}", sink.name()));
                    accepted_everywhere = false;
                }
            }
        }
        if !self.sinks.is_empty() && accepted_everywhere {
            summary.records_saved += 1;
        }
        true
    }
}
