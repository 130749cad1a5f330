//! Keyword trends per source.
//!
//! Titles are tokenized, stop words and short tokens dropped, and the
//! resulting counts compared against the counts recorded for the same
//! source on the previous run.

use crate::models::{EnrichedPost, KeywordSnapshot, KeywordTrend, Trend};
use crate::scoring::words;
use once_cell::sync::Lazy;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

/// How many keywords are reported per source.
pub const TOP_KEYWORDS: usize = 5;

/// Tokens must be longer than this to count as keywords.
const MIN_KEYWORD_LEN: usize = 3;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "and", "but", "if", "or", "because", "as", "what", "which", "is", "are",
        "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did", "for",
        "with", "about", "against", "between", "into", "through", "during", "before", "after",
        "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over", "under",
        "again", "further", "then", "once", "here", "there", "when", "where", "why", "how", "all",
        "any", "both", "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not",
        "only", "own", "same", "so", "than", "too", "very", "s", "t", "can", "will", "just", "don",
        "should", "now", "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "couldn", "didn",
        "doesn", "hadn", "hasn", "haven", "isn", "ma", "mightn", "mustn", "needn", "shan",
        "shouldn", "wasn", "weren", "won", "wouldn", "your", "b2b", "marketing", "content", "you",
        "of", "at", "by", "its", "vs",
    ]
    .into_iter()
    .collect()
});

/// Keyword counts over all post titles, with each keyword's first position.
fn count_keywords(posts: &[EnrichedPost]) -> Vec<(String, u32)> {
    let mut counts: HashMap<String, (u32, usize)> = HashMap::new();
    let tokens = posts
        .iter()
        .flat_map(|p| words(&p.title))
        .filter(|w| w.chars().count() > MIN_KEYWORD_LEN && !STOP_WORDS.contains(w.as_str()));

    for (position, token) in tokens.enumerate() {
        counts.entry(token).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, u32, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by_key(|(_, count, first)| (Reverse(*count), *first));
    ranked.into_iter().map(|(word, count, _)| (word, count)).collect()
}

fn label(current: u32, previous: Option<u32>) -> Trend {
    match previous {
        None => Trend::New,
        Some(prev) if current > prev => Trend::Up,
        Some(prev) if current < prev => Trend::Down,
        Some(_) => Trend::Stable,
    }
}

/// Top keywords of one source with their trend, plus the full count map
/// that replaces this source's entry in the next snapshot.
pub fn compute_trends(
    source_name: &str,
    posts: &[EnrichedPost],
    previous: &KeywordSnapshot,
) -> (Vec<KeywordTrend>, BTreeMap<String, u32>) {
    let ranked = count_keywords(posts);
    let previous_counts = previous.counts_for(source_name);

    let trends = ranked
        .iter()
        .take(TOP_KEYWORDS)
        .map(|(keyword, count)| KeywordTrend {
            keyword: keyword.clone(),
            trend: label(*count, previous_counts.and_then(|c| c.get(keyword)).copied()),
        })
        .collect();

    (trends, ranked.into_iter().collect())
}
