//! Title sentiment and summary readability.
//!
//! Both scores are pure functions of their input text.

use crate::models::{Readability, Sentiment};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").unwrap());

static POSITIVE_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "amazing", "growth", "success", "effective", "powerful", "boost", "win", "improve",
        "best", "top", "new", "innovative",
    ]
    .into_iter()
    .collect()
});

static NEGATIVE_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "mistakes", "avoid", "bad", "fail", "problem", "risk", "warning", "stop", "decline",
        "worst", "never",
    ]
    .into_iter()
    .collect()
});

/// Lower-cased word tokens of `text`.
pub(crate) fn words(text: &str) -> Vec<String> {
    WORD.find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// +1 for each distinct positive word, -1 for each distinct negative word.
pub fn sentiment(title: &str) -> Sentiment {
    let distinct: HashSet<String> = words(title).into_iter().collect();
    let score: i32 = distinct
        .iter()
        .map(|w| {
            if POSITIVE_WORDS.contains(w.as_str()) {
                1
            } else if NEGATIVE_WORDS.contains(w.as_str()) {
                -1
            } else {
                0
            }
        })
        .sum();

    match score {
        s if s > 0 => Sentiment::Positive,
        s if s < 0 => Sentiment::Negative,
        _ => Sentiment::Neutral,
    }
}

/// Vowel-group syllable estimate, minimum one.
fn count_syllables(word: &str) -> i32 {
    let chars: Vec<char> = word.to_lowercase().chars().collect();
    let is_vowel = |c: char| "aeiouy".contains(c);

    let mut count = 0;
    if chars.first().is_some_and(|&c| is_vowel(c)) {
        count += 1;
    }
    for pair in chars.windows(2) {
        if is_vowel(pair[1]) && !is_vowel(pair[0]) {
            count += 1;
        }
    }
    if chars.last() == Some(&'e') {
        count -= 1;
    }
    if count == 0 {
        count += 1;
    }
    count
}

/// Flesch-Kincaid grade of `text`, bucketed.
pub fn readability(text: &str) -> Readability {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Readability::NotAvailable;
    }
    let sentences = text.chars().filter(|c| matches!(c, '.' | '!' | '?')).count().max(1);
    let syllables: i32 = words.iter().map(|w| count_syllables(w)).sum();

    let num_words = words.len() as f64;
    let score = 0.39 * (num_words / sentences as f64) + 11.8 * (f64::from(syllables) / num_words)
        - 15.59;
    let grade = score.round_ties_even();

    match grade {
        g if g >= 16.0 => Readability::PostGraduate,
        g if g >= 13.0 => Readability::CollegeLevel,
        g if g >= 9.0 => Readability::HighSchool,
        g if g >= 6.0 => Readability::MiddleSchool,
        _ => Readability::EasyToRead,
    }
}
