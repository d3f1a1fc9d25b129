use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tracing::debug;

use crate::config::team_results_url;
use crate::error::ScrapeResult;
use crate::http_client::{PageFetcher, PageSession};

static EVENT_MATCH: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.event__match").unwrap_or_else(|_| unreachable!())
});

/// Result rows carry ids like `g_1_KpLZ3bTd`; the match id follows the prefix.
const EVENT_ID_PREFIX_LEN: usize = 4;

pub fn parse_prior_match_ids(html: &str, limit: usize) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&EVENT_MATCH)
        .take(limit)
        .filter_map(|el| el.value().id())
        .filter_map(|id| id.get(EVENT_ID_PREFIX_LEN..))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn resolve_prior_match_ids<F: PageFetcher>(
    session: &mut PageSession<F>,
    team_url: &str,
    limit: usize,
) -> ScrapeResult<Vec<String>> {
    let url = team_results_url(team_url);
    let html = session.navigate(&url)?;
    let ids = parse_prior_match_ids(&html, limit);
    debug!(url = %url, found = ids.len(), "resolved prior matches");
    Ok(ids)
}
