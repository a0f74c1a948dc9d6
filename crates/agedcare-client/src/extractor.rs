//! Field extraction from the provider directory's HTML.
//!
//! Search-result pages are parsed with `scraper` for detail links. Detail
//! pages are reduced to their visible text (via the [`Cleaner`]) and the
//! contact fields are pulled out with regular expressions, since the markup
//! around them is not stable enough for selectors.

use std::sync::LazyLock;

use agedcare_core::error::AppError;
use agedcare_core::models::ProviderDetails;
use agedcare_core::traits::{Cleaner, ProviderExtractor};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::cleaner::HtmdCleaner;

/// Host of the directory itself; never reported as a provider website.
pub const DIRECTORY_HOST: &str = "myagedcare.gov.au";

/// Detail pages with less visible text than this are treated as empty.
const MIN_CONTENT_CHARS: usize = 100;
const MAX_NAME_CHARS: usize = 100;

const NOT_FOUND_MARKERS: [&str; 2] = ["Sorry, we can't find", "Page not found"];
const SEARCH_FORM_HEADING: &str = "Find aged care providers to support your needs";
const NAV_WORDS: [&str; 5] = ["home", "find a provider", "search", "print", "share"];

static PROVIDER_LINK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href*='/find-a-provider/']").expect("valid provider link selector")
});
static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid title selector"));
static HEADING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("valid heading selector"));
static CONTENT_ROOTS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["main", "[role='main']", "article", "#content", "body"]
        .iter()
        .map(|s| Selector::parse(s).expect("valid content selector"))
        .collect()
});

/// Tried in order; the first pattern with an acceptable match wins.
static PHONE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b\d{2} \d{4} \d{4}\b",
        r"\b\d{4} \d{3} \d{3}\b",
        r"\b\d{2}-\d{4}-\d{4}\b",
        r"\b\d{4}-\d{3}-\d{3}\b",
        r"\b\d{8}\b",
        r"\b\d{10}\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid phone regex"))
    .collect()
});
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid email regex")
});
static WEBSITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:[-\w.]|%[\da-fA-F]{2})+[/\w.-]*\??[/\w.:;=&%-]*")
        .expect("valid website regex")
});
// Matched against upper-cased text: "1 CRANBROOK ROAD, ROSE BAY 2029 NSW".
static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+[\sA-Z]+,?\s+[A-Z\s]+\s+\d{4}\s+(?:ACT|NSW|NT|QLD|SA|TAS|VIC|WA)\b")
        .expect("valid address regex")
});
static MARKDOWN_LINK_TARGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\]\([^)]*\)").expect("valid link target regex"));
static MARKDOWN_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\([\\`*_{}\[\]()#+\-.!|])").expect("valid escape regex"));

/// [`ProviderExtractor`] for the My Aged Care directory markup.
#[derive(Clone, Default)]
pub struct HtmlProviderExtractor<C: Cleaner = HtmdCleaner> {
    cleaner: C,
}

impl HtmlProviderExtractor<HtmdCleaner> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: Cleaner> HtmlProviderExtractor<C> {
    /// Visible text of the page's main content, one block per line.
    fn visible_text(&self, document: &Html) -> Result<String, AppError> {
        let mut fallback = None;
        for selector in CONTENT_ROOTS.iter() {
            let Some(root) = document.select(selector).next() else {
                continue;
            };
            let text = self.root_text(root)?;
            if text.chars().count() > MIN_CONTENT_CHARS {
                return Ok(text);
            }
            fallback.get_or_insert(text);
        }
        Ok(fallback.unwrap_or_default())
    }

    fn root_text(&self, root: ElementRef<'_>) -> Result<String, AppError> {
        let markdown = self.cleaner.clean(&root.html())?;
        let text = MARKDOWN_LINK_TARGET.replace_all(&markdown, "]");
        let text = MARKDOWN_ESCAPE.replace_all(&text, "$1");
        Ok(text.trim().to_string())
    }
}

impl<C: Cleaner> ProviderExtractor for HtmlProviderExtractor<C> {
    fn extract_links(&self, html: &str, page_url: &str) -> Result<Vec<String>, AppError> {
        let base = Url::parse(page_url)
            .map_err(|e| AppError::ExtractionError(format!("Invalid page URL {page_url}: {e}")))?;
        let document = Html::parse_document(html);

        let mut links: Vec<String> = Vec::new();
        for anchor in document.select(&PROVIDER_LINK) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Ok(mut url) = base.join(href.trim()) else {
                tracing::debug!(%href, "Unparsable provider link");
                continue;
            };
            url.set_fragment(None);
            if !is_detail_link(&url) {
                continue;
            }
            let url = url.to_string();
            if !links.contains(&url) {
                links.push(url);
            }
        }

        tracing::debug!(count = links.len(), %page_url, "Extracted provider links");
        Ok(links)
    }

    fn extract_provider(&self, html: &str, page_url: &str) -> Result<ProviderDetails, AppError> {
        let document = Html::parse_document(html);
        let reject = |reason: &str| AppError::ExtractionError(format!("{reason}: {page_url}"));

        let title = first_text(&document, &TITLE);
        if title.contains("404") || NOT_FOUND_MARKERS.iter().any(|m| title.contains(m)) {
            return Err(reject("Broken link (404 page)"));
        }

        let text = self.visible_text(&document)?;
        if NOT_FOUND_MARKERS.iter().any(|m| text.contains(m)) {
            return Err(reject("Broken link (404 page)"));
        }
        if text.chars().count() < MIN_CONTENT_CHARS {
            return Err(reject("Page has no meaningful content"));
        }
        if text.contains(SEARCH_FORM_HEADING) {
            return Err(reject("Search form, not a provider page"));
        }

        let company_name = heading_name(&document)
            .or_else(|| name_from_text(&text))
            .filter(|name| name != SEARCH_FORM_HEADING)
            .ok_or_else(|| reject("No company name"))?;

        let telephone = extract_telephone(&text).ok_or_else(|| reject("No telephone"))?;

        Ok(ProviderDetails {
            company_name,
            address: extract_address(&text).unwrap_or_default(),
            telephone,
            email: extract_email(&text).unwrap_or_default(),
            website: extract_website(&text).unwrap_or_default(),
        })
    }
}

/// Provider detail pages live under `/find-a-provider/`, but so do the
/// search form and result listings.
fn is_detail_link(url: &Url) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let s = url.as_str();
    if s.contains("results") {
        return false;
    }
    let path = url.path().trim_end_matches('/');
    !(path.ends_with("/find-a-provider") || path.ends_with("/find-a-provider/search"))
}

fn first_text(document: &Html, selector: &Selector) -> String {
    document
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>())
        .unwrap_or_default()
}

fn heading_name(document: &Html) -> Option<String> {
    let text = first_text(document, &HEADING);
    let line = text.lines().map(collapse_whitespace).find(|l| !l.is_empty())?;
    (line.chars().count() < MAX_NAME_CHARS).then_some(line)
}

/// First short, capitalised line that isn't navigation chrome.
fn name_from_text(text: &str) -> Option<String> {
    text.lines()
        .map(|l| collapse_whitespace(l.trim_start_matches(['#', '*', '-', ' '])))
        .find(|line| {
            let len = line.chars().count();
            if len <= 3 || len >= MAX_NAME_CHARS {
                return false;
            }
            let capitalised = line
                .split_whitespace()
                .any(|w| w.chars().next().is_some_and(char::is_uppercase));
            let lower = line.to_lowercase();
            capitalised && !NAV_WORDS.iter().any(|w| lower.contains(w))
        })
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First phone-shaped number, by pattern priority. Numbers starting with
/// `202` are years in dates ("20240115"), not phones.
pub fn extract_telephone(text: &str) -> Option<String> {
    PHONE_PATTERNS.iter().find_map(|re| {
        re.find_iter(text)
            .map(|m| m.as_str().trim())
            .find(|m| !m.starts_with("202"))
            .map(str::to_string)
    })
}

pub fn extract_email(text: &str) -> Option<String> {
    EMAIL.find(text).map(|m| m.as_str().to_string())
}

/// First http(s) URL that doesn't point back at the directory.
pub fn extract_website(text: &str) -> Option<String> {
    WEBSITE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':']))
        .find(|url| !url.contains(DIRECTORY_HOST))
        .map(str::to_string)
}

pub fn extract_address(text: &str) -> Option<String> {
    ADDRESS
        .find(&text.to_uppercase())
        .map(|m| collapse_whitespace(m.as_str()))
}
