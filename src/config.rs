use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::pacing::{PacingPolicy, RetryPolicy};

const APP_DIR: &str = "soccer_scraper";
const DB_FILE: &str = "soccer_scraper.sqlite";
const DEFAULT_BASE_URL: &str = "https://www.flashscore.com";

pub const MAX_PRIOR_MATCHES: usize = 10;

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub base_url: String,
    pub navigation_timeout: Duration,
    pub pacing: PacingPolicy,
    pub retry: RetryPolicy,
    pub prior_match_limit: usize,
    pub parallelism: usize,
    pub db_path: Option<PathBuf>,
    pub data_dir: PathBuf,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            navigation_timeout: Duration::from_secs(60),
            pacing: PacingPolicy::new(Duration::from_millis(1000), Duration::from_millis(3000)),
            retry: RetryPolicy::new(3, Duration::from_millis(500), Duration::from_millis(8000)),
            prior_match_limit: MAX_PRIOR_MATCHES,
            parallelism: 1,
            db_path: default_db_path(),
            data_dir: PathBuf::from("data"),
        }
    }
}

impl ScraperConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url = env::var("SCRAPER_BASE_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.base_url);

        let navigation_timeout =
            Duration::from_secs(env_u64("SCRAPER_NAV_TIMEOUT_SECS").unwrap_or(60).clamp(5, 600));

        let pacing_min = env_u64("SCRAPER_PACING_MIN_MS").unwrap_or(1000);
        let pacing_max = env_u64("SCRAPER_PACING_MAX_MS")
            .unwrap_or(3000)
            .max(pacing_min);

        let attempts = env_u64("SCRAPER_RETRY_ATTEMPTS").unwrap_or(3).clamp(1, 10) as u32;
        let retry_base = env_u64("SCRAPER_RETRY_BASE_MS").unwrap_or(500);
        let retry_max = env_u64("SCRAPER_RETRY_MAX_MS")
            .unwrap_or(8000)
            .max(retry_base);

        let prior_match_limit = env_u64("SCRAPER_PRIOR_MATCH_LIMIT")
            .map(|v| v as usize)
            .unwrap_or(MAX_PRIOR_MATCHES)
            .clamp(1, MAX_PRIOR_MATCHES);

        let parallelism = env_u64("FETCH_PARALLELISM")
            .map(|v| v as usize)
            .unwrap_or(1)
            .clamp(1, 8);

        let db_path = env_path("SCRAPER_DB_PATH").or(defaults.db_path);
        let data_dir = env_path("SCRAPER_DATA_DIR").unwrap_or(defaults.data_dir);

        Self {
            base_url,
            navigation_timeout,
            pacing: PacingPolicy::new(
                Duration::from_millis(pacing_min),
                Duration::from_millis(pacing_max),
            ),
            retry: RetryPolicy::new(
                attempts,
                Duration::from_millis(retry_base),
                Duration::from_millis(retry_max),
            ),
            prior_match_limit,
            parallelism,
            db_path,
            data_dir,
        }
    }

    pub fn match_stats_url(&self, match_id: &str) -> String {
        format!(
            "{}/match/{match_id}/#/match-summary/match-statistics/0",
            self.base_url
        )
    }
}

pub fn team_results_url(team_url: &str) -> String {
    let trimmed = team_url.trim();
    if trimmed.ends_with('/') {
        format!("{trimmed}results")
    } else {
        format!("{trimmed}/results")
    }
}

pub fn app_data_dir() -> Option<PathBuf> {
    if let Ok(base) = env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(APP_DIR));
        }
    }
    let home = env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(APP_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join(DB_FILE))
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.trim().parse::<u64>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::{ScraperConfig, team_results_url};

    #[test]
    fn results_url_appends_segment() {
        assert_eq!(
            team_results_url("https://www.flashscore.com/team/arsenal/hA1Zm19f/"),
            "https://www.flashscore.com/team/arsenal/hA1Zm19f/results"
        );
        assert_eq!(
            team_results_url("https://www.flashscore.com/team/arsenal/hA1Zm19f"),
            "https://www.flashscore.com/team/arsenal/hA1Zm19f/results"
        );
    }

    #[test]
    fn match_stats_url_uses_base() {
        let config = ScraperConfig {
            base_url: "http://localhost:8080".to_string(),
            ..ScraperConfig::default()
        };
        assert_eq!(
            config.match_stats_url("AbC123"),
            "http://localhost:8080/match/AbC123/#/match-summary/match-statistics/0"
        );
    }
}
