//! GameBanana author lookup.
//!
//! A single [`AuthorExtractor`] holds every pattern used to pull a
//! submitter's name out of a mod page. [`AuthorScraper`] pairs it with an
//! HTTP client.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("xxmm/", env!("CARGO_PKG_VERSION"));
const MAX_TIMEOUT_SECS: u64 = 60;

static JSON_LD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("Invalid JSON-LD selector")
});

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("unsupported URL: {0}")]
    UnsupportedUrl(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("server returned {0}")]
    Status(reqwest::StatusCode),

    #[error("no author found on page")]
    NoAuthor,
}

/// Anything that can look up the author of a mod page.
pub trait AuthorSource {
    fn fetch_author(&self, url: &str) -> impl Future<Output = Option<String>> + Send;
}

/// One way of locating the author on a page.
#[derive(Debug)]
enum AuthorRule {
    /// An attribute of, or the text inside, the first matching element
    Element {
        selector: Selector,
        attr: Option<&'static str>,
    },
    /// First capture group of a pattern over the raw page
    Pattern(Regex),
}

impl AuthorRule {
    fn element(css: &str, attr: Option<&'static str>) -> Self {
        Self::Element {
            selector: Selector::parse(css).expect("Invalid author selector"),
            attr,
        }
    }

    fn apply(&self, document: &Html, raw: &str) -> Option<String> {
        match self {
            Self::Element { selector, attr } => document
                .select(selector)
                .filter_map(|element| match attr {
                    Some(attr) => element.value().attr(attr).map(collapse_whitespace),
                    None => Some(element_text(element)),
                })
                .find(|name| !name.is_empty()),
            Self::Pattern(pattern) => pattern
                .captures(raw)
                .and_then(|caps| caps.get(1))
                .map(|m| decode_entities(m.as_str().trim()))
                .filter(|name| !name.is_empty()),
        }
    }
}

/// Ordered author rules, tried first to last.
#[derive(Debug)]
pub struct AuthorExtractor {
    rules: Vec<AuthorRule>,
}

impl AuthorExtractor {
    pub fn new() -> Self {
        let rules = vec![
            AuthorRule::element(r#"meta[name="author"]"#, Some("content")),
            // Submitter / uploader module
            AuthorRule::element(r#"[class*="Submitter"] a, [class*="Uploader"] a"#, None),
            AuthorRule::element(r#"span[class*="SubmitterName"]"#, None),
            // Embedded API data
            AuthorRule::Pattern(
                Regex::new(r#"(?s)"_aSubmitter"\s*:\s*\{.*?"_sName"\s*:\s*"([^"]+)""#)
                    .expect("Invalid author regex"),
            ),
            // Any member profile link
            AuthorRule::element(r#"a[href*="gamebanana.com/members/"]"#, None),
        ];
        Self { rules }
    }

    /// Author name found in `html`, if any.
    pub fn extract_author(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        self.rules
            .iter()
            .find_map(|rule| rule.apply(&document, html))
            .or_else(|| json_ld_author(&document))
    }
}

impl Default for AuthorExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// `author.name`, `author` or the first named entry of an `author` array in
/// any JSON-LD block.
fn json_ld_author(document: &Html) -> Option<String> {
    document
        .select(&JSON_LD)
        .filter_map(|script| serde_json::from_str::<Value>(script.text().collect::<String>().trim()).ok())
        .find_map(|doc| author_from_value(doc.get("author")?))
        .map(|name| decode_entities(&name))
}

fn author_from_value(author: &Value) -> Option<String> {
    match author {
        Value::String(name) => Some(name.trim().to_string()).filter(|name| !name.is_empty()),
        Value::Object(map) => map.get("name").and_then(author_from_value),
        Value::Array(items) => items.iter().find_map(author_from_value),
        _ => None,
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode HTML character references in text taken from outside the DOM
/// (script bodies, embedded API data).
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let fragment = Html::parse_fragment(text);
    fragment.root_element().text().collect::<String>().trim().to_string()
}

/// HTTP author lookup for GameBanana pages.
#[derive(Debug, Clone)]
pub struct AuthorScraper {
    client: reqwest::Client,
    extractor: std::sync::Arc<AuthorExtractor>,
}

impl AuthorScraper {
    /// Client with a request timeout, capped at one minute.
    pub fn new(timeout_secs: u64) -> Result<Self, ScrapeError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs.clamp(1, MAX_TIMEOUT_SECS)))
            .build()?;

        Ok(Self {
            client,
            extractor: std::sync::Arc::new(AuthorExtractor::new()),
        })
    }

    pub fn extractor(&self) -> &AuthorExtractor {
        &self.extractor
    }

    pub async fn fetch_html(&self, url: &str) -> Result<String, ScrapeError> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ScrapeError::UnsupportedUrl(url.to_string()));
        }

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ScrapeError::Status(response.status()));
        }
        Ok(response.text().await?)
    }

    pub async fn scrape(&self, url: &str) -> Result<String, ScrapeError> {
        let html = self.fetch_html(url).await?;
        self.extractor
            .extract_author(&html)
            .ok_or(ScrapeError::NoAuthor)
    }

    /// Author for `url`; every failure is logged and yields `None`.
    pub async fn fetch(&self, url: &str) -> Option<String> {
        match self.scrape(url).await {
            Ok(author) => Some(author),
            Err(e) => {
                tracing::debug!("Author lookup failed for {}: {}", url, e);
                None
            }
        }
    }
}

impl AuthorSource for AuthorScraper {
    fn fetch_author(&self, url: &str) -> impl Future<Output = Option<String>> + Send {
        let url = url.to_string();
        async move { self.fetch(&url).await }
    }
}
