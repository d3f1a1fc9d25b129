use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::{ScrapeError, ScrapeResult};
use crate::http_client::{PageFetcher, PageSession};
use crate::model::StatMap;

const HOME_LABEL: &str = "div.duelParticipant__home";
const AWAY_LABEL: &str = "div.duelParticipant__away";
// The class carries a build hash suffix (`_categoryName_11si3_5`) that changes
// between site releases, so match on the stable part only.
const STAT_CATEGORY: &str = r#"div[class*="categoryName"]"#;

pub const EXPECTED_GOALS: &str = "Expected Goals";

static HOME_SELECTOR: Lazy<Selector> = Lazy::new(|| parse_selector(HOME_LABEL));
static AWAY_SELECTOR: Lazy<Selector> = Lazy::new(|| parse_selector(AWAY_LABEL));
static CATEGORY_SELECTOR: Lazy<Selector> = Lazy::new(|| parse_selector(STAT_CATEGORY));

fn parse_selector(css: &'static str) -> Selector {
    Selector::parse(css).unwrap_or_else(|_| unreachable!("static selector {css} is valid"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatRow {
    pub label: String,
    pub home: String,
    pub away: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchStatsPage {
    pub home_team: String,
    pub away_team: String,
    pub rows: Vec<StatRow>,
}

impl MatchStatsPage {
    /// Values attributed to `team`: the home column when `team` is the page's
    /// home label (exact match), otherwise the away column.
    pub fn stats_for(&self, team: &str) -> StatMap {
        let is_home = self.home_team == team;
        self.rows
            .iter()
            .map(|row| {
                let value = if is_home { &row.home } else { &row.away };
                (canonical_label(&row.label), value.clone())
            })
            .collect()
    }
}

/// The site varies the xG label ("Expected Goals (xG)", "Expected Goals xG", ...).
pub fn canonical_label(label: &str) -> String {
    if label.contains(EXPECTED_GOALS) {
        EXPECTED_GOALS.to_string()
    } else {
        label.to_string()
    }
}

pub fn parse_match_stats_page(html: &str, url: &str) -> ScrapeResult<MatchStatsPage> {
    let document = Html::parse_document(html);

    let home_team = document
        .select(&HOME_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>())
        .ok_or_else(|| ScrapeError::page_structure(url, HOME_LABEL))?;
    let away_team = document
        .select(&AWAY_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>())
        .ok_or_else(|| ScrapeError::page_structure(url, AWAY_LABEL))?;

    let mut rows = Vec::new();
    for category in document.select(&CATEGORY_SELECTOR) {
        let label = element_text(&category);
        let home = previous_element(&category)
            .map(|el| element_text(&el))
            .ok_or_else(|| ScrapeError::page_structure(url, "home statistic value"))?;
        let away = next_element(&category)
            .map(|el| element_text(&el))
            .ok_or_else(|| ScrapeError::page_structure(url, "away statistic value"))?;
        rows.push(StatRow { label, home, away });
    }

    Ok(MatchStatsPage {
        home_team,
        away_team,
        rows,
    })
}

pub fn extract_stats(html: &str, team: &str, url: &str) -> ScrapeResult<StatMap> {
    let page = parse_match_stats_page(html, url)?;
    Ok(page.stats_for(team))
}

pub fn fetch_match_stats<F: PageFetcher>(
    session: &mut PageSession<F>,
    stats_url: &str,
    team: &str,
) -> ScrapeResult<StatMap> {
    let html = session.navigate(stats_url)?;
    let stats = extract_stats(&html, team, stats_url)?;
    debug!(url = stats_url, team, stats = stats.len(), "extracted match statistics");
    Ok(stats)
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn previous_element<'a>(el: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    el.prev_siblings().find_map(ElementRef::wrap)
}

fn next_element<'a>(el: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    el.next_siblings().find_map(ElementRef::wrap)
}

#[cfg(test)]
mod tests {
    use super::{canonical_label, extract_stats, parse_match_stats_page};
    use crate::error::ScrapeError;

    const WRAPPED_LABEL_PAGE: &str = r#"
<html><body>
  <div class="duelParticipant__home"><a>Arsenal</a></div>
  <div class="duelParticipant__away"><a>Chelsea</a></div>
  <div class="_row_bn1w5_8">
    <div class="_value_7ptpb_4 _homeValue_7ptpb_9">1.84</div>
    <div class="_category_1haer_4"><div class="_categoryName_11si3_5">Expected Goals (xG)</div></div>
    <div class="_value_7ptpb_4 _awayValue_7ptpb_13">0.62</div>
  </div>
</body></html>
"#;

    #[test]
    fn xg_label_is_canonicalized() {
        assert_eq!(canonical_label("Expected Goals (xG)"), "Expected Goals");
        assert_eq!(canonical_label("Ball Possession"), "Ball Possession");
    }

    #[test]
    fn sibling_values_are_read_around_the_label() {
        let page = r#"
<div class="duelParticipant__home">Arsenal</div>
<div class="duelParticipant__away">Chelsea</div>
<div class="row"><div>61%</div><div class="_categoryName_11si3_5">Ball Possession</div><div>39%</div></div>
<div class="row"><div>1.84</div><div class="_categoryName_11si3_5">Expected Goals (xG)</div><div>0.62</div></div>
"#;
        let home = extract_stats(page, "Arsenal", "u").expect("valid page");
        assert_eq!(home.get("Ball Possession"), Some("61%"));
        assert_eq!(home.get("Expected Goals"), Some("1.84"));
        let away = extract_stats(page, "Chelsea", "u").expect("valid page");
        assert_eq!(away.get("Ball Possession"), Some("39%"));
        assert_eq!(away.get("Expected Goals"), Some("0.62"));
    }

    #[test]
    fn colliding_labels_keep_every_value() {
        let page = r#"
<div class="duelParticipant__home">Arsenal</div>
<div class="duelParticipant__away">Chelsea</div>
<div class="row"><div>1.84</div><div class="_categoryName_11si3_5">Expected Goals (xG)</div><div>0.62</div></div>
<div class="row"><div>1.10</div><div class="_categoryName_11si3_5">Expected Goals on Target (xGOT)</div><div>0.40</div></div>
<div class="row"><div>61%</div><div class="_categoryName_11si3_5">Ball Possession</div><div>39%</div></div>
<div class="row"><div>58%</div><div class="_categoryName_11si3_5">Ball Possession</div><div>42%</div></div>
"#;
        let home = extract_stats(page, "Arsenal", "u").expect("valid page");
        assert_eq!(home.len(), 4);
        assert_eq!(home.get_all("Expected Goals"), vec!["1.84", "1.10"]);
        assert_eq!(home.get_all("Ball Possession"), vec!["61%", "58%"]);
    }

    #[test]
    fn nested_category_without_siblings_is_a_structure_error() {
        // The label sits alone inside its wrapper, so it has no value siblings.
        let err = parse_match_stats_page(WRAPPED_LABEL_PAGE, "u").expect_err("no siblings");
        assert!(matches!(err, ScrapeError::PageStructure { .. }));
    }

    #[test]
    fn missing_team_labels_fail() {
        let err = extract_stats("<html><body></body></html>", "Arsenal", "u")
            .expect_err("no labels");
        assert!(matches!(err, ScrapeError::PageStructure { .. }));
    }

    #[test]
    fn no_rows_is_empty_not_error() {
        let page = r#"<div class="duelParticipant__home">A</div><div class="duelParticipant__away">B</div>"#;
        let stats = extract_stats(page, "A", "u").expect("valid page");
        assert!(stats.is_empty());
    }
}
