//! HTML extraction for front pages and post pages.
//!
//! Both entry points are pure and never fail: malformed or partial markup
//! just yields fewer candidates or the sentinel values from [`crate::models`].

use crate::models::{ArticleDetails, NO_CONTENT, PostCandidate, UNKNOWN_DATE};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

static POST_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("h2 a, h3 a, article a").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static OG_IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:image"]"#).unwrap());
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static IMG: Lazy<Selector> = Lazy::new(|| Selector::parse("img[src]").unwrap());

/// Link text must have more than this many words to count as a post title.
const MIN_TITLE_WORDS: usize = 3;

/// Collapse an element's text nodes into a single space-separated string.
fn visible_text(element: &ElementRef) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

/// Resolve `href` against the front page. Absolute http(s) URLs pass through.
fn resolve_href(base_url: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    base_url
        .join(href)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|u| u.to_string())
}

/// Image and date hints from the `<article>` enclosing a link, if any.
fn article_hints(link: &ElementRef, base_url: &Url) -> (Option<String>, Option<String>) {
    let Some(article) = link
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "article")
    else {
        return (None, None);
    };

    let image_url = article
        .select(&IMG)
        .filter_map(|img| img.value().attr("src"))
        .find_map(|src| resolve_href(base_url, src));
    let publish_date = article
        .select(&TIME)
        .find_map(|t| t.value().attr("datetime"))
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    (image_url, publish_date)
}

/// Scan a front page for post links, in document order, stopping at `limit`.
///
/// A link counts only if it has an `href` and visible text of more than
/// three words, which skips navigation and "read more" links. A title seen
/// earlier on the same page is skipped.
#[instrument(level = "debug", skip(html), fields(base = %base_url))]
pub fn extract_posts(html: &str, base_url: &Url, limit: usize) -> Vec<PostCandidate> {
    let document = Html::parse_document(html);
    let mut candidates: Vec<PostCandidate> = Vec::new();

    for link in document.select(&POST_LINK) {
        if candidates.len() >= limit {
            break;
        }
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let title = visible_text(&link);
        if title.split_whitespace().count() <= MIN_TITLE_WORDS {
            continue;
        }
        if candidates.iter().any(|c| c.title == title) {
            continue;
        }
        let Some(url) = resolve_href(base_url, href) else {
            debug!(%href, "Skipping unresolvable link");
            continue;
        };
        let (image_url, publish_date) = article_hints(&link, base_url);
        candidates.push(PostCandidate {
            title,
            url,
            image_url,
            publish_date,
        });
    }

    debug!(count = candidates.len(), "Extracted post candidates");
    candidates
}

/// Pull paragraph text, Open-Graph image and `<time>` date out of a post page.
pub fn extract_article(html: &str) -> ArticleDetails {
    let document = Html::parse_document(html);

    let text = document
        .select(&PARAGRAPH)
        .map(|p| visible_text(&p))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let image_url = document
        .select(&OG_IMAGE)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let publish_date = document
        .select(&TIME)
        .next()
        .and_then(|t| t.value().attr("datetime"))
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| UNKNOWN_DATE.to_string());

    ArticleDetails {
        text: if text.is_empty() {
            NO_CONTENT.to_string()
        } else {
            text
        },
        image_url,
        publish_date,
    }
}
