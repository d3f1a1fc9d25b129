use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::config::ScraperConfig;
use crate::error::ScrapeResult;
use crate::extract::fetch_match_stats;
use crate::http_client::{PageFetcher, PageSession};
use crate::model::{AggregatedStats, AggregatedStatsBuilder, Fixture, PriorMatchRef, Side};
use crate::resolve::resolve_prior_match_ids;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Session,
    Resolve,
    Extract,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    pub stage: FailureStage,
    pub side: Option<Side>,
    pub prior_match_id: Option<String>,
    pub message: String,
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let side = self.side.map(Side::label).unwrap_or("-");
        match &self.prior_match_id {
            Some(id) => write!(f, "{:?} {side} {id}: {}", self.stage, self.message),
            None => write!(f, "{:?} {side}: {}", self.stage, self.message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixtureReport {
    pub prior: PriorMatchRef,
    pub stats: AggregatedStats,
    pub extracted: usize,
    pub failures: Vec<FetchFailure>,
}

impl FixtureReport {
    pub fn attempted(&self) -> usize {
        self.prior.home_team_prior_match_ids.len() + self.prior.away_team_prior_match_ids.len()
    }

    /// No prior match existed for either team and nothing failed.
    pub fn had_no_history(&self) -> bool {
        self.attempted() == 0 && self.failures.is_empty()
    }

    /// There was something to fetch and none of it came back.
    pub fn all_failed(&self) -> bool {
        !self.failures.is_empty() && self.extracted == 0
    }
}

/// Resolves both teams' recent results. A failed team defaults to no history
/// so the other team's data survives.
pub fn resolve_fixture<F: PageFetcher>(
    session: &mut PageSession<F>,
    config: &ScraperConfig,
    fixture: &Fixture,
    failures: &mut Vec<FetchFailure>,
) -> PriorMatchRef {
    let mut resolve_side = |side: Side, team: &str, url: &str| -> Vec<String> {
        match resolve_prior_match_ids(session, url, config.prior_match_limit) {
            Ok(ids) => ids,
            Err(err) => {
                warn!(
                    match_id = %fixture.match_id,
                    side = side.label(),
                    team,
                    error = %err,
                    "prior match resolution failed, continuing without history"
                );
                failures.push(FetchFailure {
                    stage: FailureStage::Resolve,
                    side: Some(side),
                    prior_match_id: None,
                    message: err.to_string(),
                });
                Vec::new()
            }
        }
    };

    let home_ids = resolve_side(Side::Home, &fixture.home_team_name, &fixture.home_team_url);
    let away_ids = resolve_side(Side::Away, &fixture.away_team_name, &fixture.away_team_url);

    PriorMatchRef {
        match_id: fixture.match_id.clone(),
        league_id: fixture.league_id.clone(),
        home_team_name: fixture.home_team_name.clone(),
        away_team_name: fixture.away_team_name.clone(),
        home_team_prior_match_ids: home_ids,
        away_team_prior_match_ids: away_ids,
    }
}

/// Extracts every prior match of both teams and merges the values into one
/// sealed record. A broken historical page is logged and skipped.
pub fn aggregate_prior_matches<F: PageFetcher>(
    session: &mut PageSession<F>,
    config: &ScraperConfig,
    prior: PriorMatchRef,
    mut failures: Vec<FetchFailure>,
) -> FixtureReport {
    let mut builder = AggregatedStatsBuilder::new(&prior);
    let mut extracted = 0usize;

    let sides = [
        (Side::Home, &prior.home_team_name, &prior.home_team_prior_match_ids),
        (Side::Away, &prior.away_team_name, &prior.away_team_prior_match_ids),
    ];
    for (side, team, ids) in sides {
        for id in ids {
            let url = config.match_stats_url(id);
            match fetch_match_stats(session, &url, team) {
                Ok(stats) => {
                    builder.merge(side, &stats);
                    extracted += 1;
                }
                Err(err) => {
                    warn!(
                        match_id = %prior.match_id,
                        prior_match_id = %id,
                        side = side.label(),
                        error = %err,
                        "prior match statistics failed, skipping"
                    );
                    failures.push(FetchFailure {
                        stage: FailureStage::Extract,
                        side: Some(side),
                        prior_match_id: Some(id.clone()),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    FixtureReport {
        stats: builder.seal(),
        prior,
        extracted,
        failures,
    }
}

pub fn aggregate_fixture<F: PageFetcher>(
    session: &mut PageSession<F>,
    config: &ScraperConfig,
    fixture: &Fixture,
) -> FixtureReport {
    info!(
        match_id = %fixture.match_id,
        home = %fixture.home_team_name,
        away = %fixture.away_team_name,
        "aggregating fixture"
    );
    let mut failures = Vec::new();
    let prior = resolve_fixture(session, config, fixture, &mut failures);
    let report = aggregate_prior_matches(session, config, prior, failures);

    if report.all_failed() {
        error!(
            match_id = %fixture.match_id,
            failures = report.failures.len(),
            "every prior match fetch failed"
        );
    } else {
        info!(
            match_id = %fixture.match_id,
            extracted = report.extracted,
            attempted = report.attempted(),
            failures = report.failures.len(),
            "fixture aggregated"
        );
    }
    report
}

pub fn aggregate<'a, F: PageFetcher + 'a>(
    session: &'a mut PageSession<F>,
    config: &'a ScraperConfig,
    fixtures: Vec<Fixture>,
) -> impl Iterator<Item = FixtureReport> + 'a {
    fixtures
        .into_iter()
        .map(move |fixture| aggregate_fixture(&mut *session, config, &fixture))
}

/// Splits fixtures into `config.parallelism` contiguous chunks, each driven by
/// its own session, so at most that many sessions are ever open. Output keeps
/// input order.
pub fn aggregate_parallel<F, O>(
    fixtures: &[Fixture],
    config: &ScraperConfig,
    open_session: O,
) -> Vec<FixtureReport>
where
    F: PageFetcher,
    O: Fn() -> ScrapeResult<PageSession<F>> + Sync + Send,
{
    if fixtures.is_empty() {
        return Vec::new();
    }
    let workers = config.parallelism.max(1);
    let chunk_size = fixtures.len().div_ceil(workers);

    let run = || {
        fixtures
            .par_chunks(chunk_size)
            .map(|chunk| match open_session() {
                Ok(mut session) => chunk
                    .iter()
                    .map(|fixture| aggregate_fixture(&mut session, config, fixture))
                    .collect::<Vec<_>>(),
                Err(err) => {
                    error!(error = %err, fixtures = chunk.len(), "could not open page session");
                    chunk
                        .iter()
                        .map(|fixture| session_failure_report(fixture, &err.to_string()))
                        .collect()
                }
            })
            .collect::<Vec<_>>()
    };

    let chunks = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(run),
        Err(_) => run(),
    };
    chunks.into_iter().flatten().collect()
}

fn session_failure_report(fixture: &Fixture, message: &str) -> FixtureReport {
    let prior = PriorMatchRef {
        match_id: fixture.match_id.clone(),
        league_id: fixture.league_id.clone(),
        home_team_name: fixture.home_team_name.clone(),
        away_team_name: fixture.away_team_name.clone(),
        home_team_prior_match_ids: Vec::new(),
        away_team_prior_match_ids: Vec::new(),
    };
    FixtureReport {
        stats: AggregatedStatsBuilder::new(&prior).seal(),
        prior,
        extracted: 0,
        failures: vec![FetchFailure {
            stage: FailureStage::Session,
            side: None,
            prior_match_id: None,
            message: message.to_string(),
        }],
    }
}
