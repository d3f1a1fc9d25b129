use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use tracing::{debug, info};

use crate::config::ScraperConfig;
use crate::error::{ScrapeError, ScrapeResult};
use crate::pacing::{PacingPolicy, RetryPolicy};

const REFERRERS: &[&str] = &[
    "https://www.google.com",
    "https://www.facebook.com",
    "https://www.instagram.com",
    "https://www.youtube.com",
    "https://www.amazon.com",
    "https://www.wikipedia.org",
    "https://www.yahoo.com",
    "https://www.twitter.com",
    "https://www.microsoft.com",
    "https://www.apple.com",
    "https://www.cnn.com",
    "https://www.bbc.com",
    "https://www.espn.com",
    "https://www.reddit.com",
    "https://www.twitch.tv",
    "https://www.theguardian.com",
    "https://www.nytimes.com",
    "https://www.bbc.co.uk",
    "https://www.amazon.de",
    "https://www.amazon.co.jp",
];

const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
];

pub fn random_referrer() -> &'static str {
    REFERRERS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(REFERRERS[0])
}

fn random_user_agent() -> &'static str {
    DESKTOP_USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

pub trait PageFetcher {
    fn fetch(&mut self, url: &str, referrer: &str) -> ScrapeResult<String>;

    fn close(&mut self) {}
}

/// Plain GET with browser-like headers. The server never sees the `#...`
/// fragment of a URL and no script runs, so pages that only render their
/// statistics client-side come back without them; use `DirFetcher` with
/// pages saved from a rendering browser for those.
pub struct HttpFetcher {
    client: Client,
    user_agent: &'static str,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> ScrapeResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ScrapeError::ClientBuild)?;
        Ok(Self {
            client,
            user_agent: random_user_agent(),
        })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&mut self, url: &str, referrer: &str) -> ScrapeResult<String> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent)
            .header(REFERER, referrer)
            .header(ACCEPT_LANGUAGE, "en-GB,en;q=0.9")
            .send()
            .map_err(|err| ScrapeError::Navigation {
                url: url.to_string(),
                retryable: err.is_timeout() || err.is_connect() || err.is_request(),
                message: err.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::Navigation {
                url: url.to_string(),
                message: format!("http {status}"),
                retryable: status_is_retryable(status),
            });
        }

        resp.text().map_err(|err| ScrapeError::Navigation {
            url: url.to_string(),
            message: format!("failed reading body: {err}"),
            retryable: true,
        })
    }
}

pub fn status_is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub struct DirFetcher {
    dir: PathBuf,
}

impl DirFetcher {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn page_path(&self, url: &str) -> PathBuf {
        self.dir.join(page_file_name(url))
    }
}

impl PageFetcher for DirFetcher {
    fn fetch(&mut self, url: &str, _referrer: &str) -> ScrapeResult<String> {
        let path = self.page_path(url);
        std::fs::read_to_string(&path).map_err(|err| ScrapeError::Navigation {
            url: url.to_string(),
            message: format!("{}: {err}", path.display()),
            retryable: false,
        })
    }
}

/// `https://host/a/b/?x#y` becomes `host_a_b__x_y.html`.
pub fn page_file_name(url: &str) -> String {
    let stripped = url
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let mut name = stripped
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect::<String>();
    name.push_str(".html");
    name
}

/// In-memory pages keyed by URL. URLs listed in `broken` fail with a fatal
/// navigation error, the rest of the unknown URLs with a page-structure error.
/// A flaky URL fails with a retryable error a set number of times first.
#[derive(Debug, Clone, Default)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
    broken: HashSet<String>,
    flaky: HashMap<String, usize>,
    pub requests: Vec<(String, String)>,
    pub closed: bool,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }

    pub fn with_broken(mut self, url: impl Into<String>) -> Self {
        self.broken.insert(url.into());
        self
    }

    pub fn with_flaky(mut self, url: impl Into<String>, failures: usize) -> Self {
        self.flaky.insert(url.into(), failures);
        self
    }
}

impl PageFetcher for StaticFetcher {
    fn fetch(&mut self, url: &str, referrer: &str) -> ScrapeResult<String> {
        self.requests.push((url.to_string(), referrer.to_string()));
        if self.broken.contains(url) {
            return Err(ScrapeError::Navigation {
                url: url.to_string(),
                message: "connection reset".to_string(),
                retryable: false,
            });
        }
        if let Some(remaining) = self.flaky.get_mut(url)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ScrapeError::Navigation {
                url: url.to_string(),
                message: "http 503 Service Unavailable".to_string(),
                retryable: true,
            });
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ScrapeError::page_structure(url, "document"))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// The one browsing handle a worker navigates with. Closed on drop.
pub struct PageSession<F: PageFetcher> {
    fetcher: Option<F>,
    pacing: PacingPolicy,
    retry: RetryPolicy,
    navigations: usize,
}

impl PageSession<HttpFetcher> {
    pub fn open(config: &ScraperConfig) -> ScrapeResult<Self> {
        let fetcher = HttpFetcher::new(config.navigation_timeout)?;
        info!(
            timeout_secs = config.navigation_timeout.as_secs(),
            "opened page session"
        );
        Ok(Self::new(fetcher, config.pacing, config.retry))
    }
}

impl<F: PageFetcher> PageSession<F> {
    pub fn new(fetcher: F, pacing: PacingPolicy, retry: RetryPolicy) -> Self {
        Self {
            fetcher: Some(fetcher),
            pacing,
            retry,
            navigations: 0,
        }
    }

    /// A session that never sleeps; for tests and offline pages.
    pub fn unpaced(fetcher: F) -> Self {
        Self::new(fetcher, PacingPolicy::disabled(), RetryPolicy::immediate(1))
    }

    pub fn is_open(&self) -> bool {
        self.fetcher.is_some()
    }

    pub fn navigations(&self) -> usize {
        self.navigations
    }

    pub fn fetcher(&self) -> Option<&F> {
        self.fetcher.as_ref()
    }

    pub fn navigate(&mut self, url: &str) -> ScrapeResult<String> {
        let pacing = self.pacing;
        let retry = self.retry;
        let fetcher = self
            .fetcher
            .as_mut()
            .ok_or(ScrapeError::ResourceUnavailable("page session is closed"))?;
        let mut attempts = 0usize;
        let result = retry.run(url, || {
            pacing.pause();
            attempts += 1;
            fetcher.fetch(url, random_referrer())
        });
        self.navigations += attempts;
        debug!(url, attempts, ok = result.is_ok(), "navigation finished");
        result
    }

    pub fn close(&mut self) {
        if let Some(mut fetcher) = self.fetcher.take() {
            fetcher.close();
            debug!(navigations = self.navigations, "closed page session");
        }
    }

    /// Runs `body` with the session and closes it on every exit path.
    pub fn scoped<T>(mut self, body: impl FnOnce(&mut Self) -> T) -> T {
        let out = body(&mut self);
        self.close();
        out
    }

    pub fn into_closed(mut self) -> Option<F> {
        let mut fetcher = self.fetcher.take()?;
        fetcher.close();
        Some(fetcher)
    }
}

impl<F: PageFetcher> Drop for PageSession<F> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::{PageSession, StaticFetcher, page_file_name, status_is_retryable};
    use crate::error::ScrapeError;
    use crate::pacing::{PacingPolicy, RetryPolicy};

    fn retrying(fetcher: StaticFetcher, attempts: u32) -> PageSession<StaticFetcher> {
        PageSession::new(fetcher, PacingPolicy::disabled(), RetryPolicy::immediate(attempts))
    }

    #[test]
    fn rate_limits_and_server_errors_are_retryable() {
        assert!(status_is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(status_is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(status_is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!status_is_retryable(StatusCode::NOT_FOUND));
        assert!(!status_is_retryable(StatusCode::FORBIDDEN));
    }

    #[test]
    fn transient_failures_are_retried_until_success() {
        let fetcher = StaticFetcher::new().with_page("u", "ok").with_flaky("u", 2);
        let mut session = retrying(fetcher, 3);
        assert_eq!(session.navigate("u").expect("third attempt"), "ok");
        assert_eq!(session.navigations(), 3);
        assert_eq!(session.fetcher().expect("open").requests.len(), 3);
    }

    #[test]
    fn retries_stop_at_max_attempts() {
        let fetcher = StaticFetcher::new().with_page("u", "ok").with_flaky("u", 5);
        let mut session = retrying(fetcher, 3);
        let err = session.navigate("u").expect_err("still failing");
        assert!(err.is_retryable());
        assert_eq!(session.navigations(), 3);
    }

    #[test]
    fn fatal_failures_are_not_retried() {
        let fetcher = StaticFetcher::new().with_broken("u");
        let mut session = retrying(fetcher, 3);
        assert!(session.navigate("u").is_err());
        assert_eq!(session.navigations(), 1);
    }

    #[test]
    fn closed_session_is_unavailable() {
        let mut session = PageSession::unpaced(StaticFetcher::new().with_page("u", "<html></html>"));
        assert!(session.navigate("u").is_ok());
        session.close();
        assert!(!session.is_open());
        assert!(matches!(
            session.navigate("u"),
            Err(ScrapeError::ResourceUnavailable(_))
        ));
    }

    #[test]
    fn every_navigation_sends_a_referrer() {
        let mut session = PageSession::unpaced(StaticFetcher::new().with_page("u", "x"));
        session.navigate("u").expect("page exists");
        let fetcher = session.fetcher().expect("open");
        assert_eq!(fetcher.requests.len(), 1);
        assert!(fetcher.requests[0].1.starts_with("https://"));
    }

    #[test]
    fn file_names_are_path_safe() {
        assert_eq!(
            page_file_name("https://www.flashscore.com/team/x/AbC/results"),
            "www.flashscore.com_team_x_AbC_results.html"
        );
    }
}
