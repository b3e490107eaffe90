//! Page analysis: HTML cleaning, word statistics, and assembly of the
//! per-page analysis document handed to the document store.

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::Html;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const PREVIEW_CHARS: usize = 1000;
const ELEMENT_PREVIEW_CHARS: usize = 500;
const TOP_WORD_COUNT: usize = 10;

/// Strip markup, drop punctuation, collapse whitespace, lowercase.
pub fn clean_text(raw_html: &str) -> String {
    let document = Html::parse_document(raw_html);
    let mut text = document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");

    if let Ok(re) = Regex::new(r"[^\w\s]") {
        text = re.replace_all(&text, " ").into_owned();
    }
    if let Ok(re) = Regex::new(r"\s+") {
        text = re.replace_all(&text, " ").into_owned();
    }
    text.trim().to_lowercase()
}

pub fn word_count(cleaned: &str) -> usize {
    cleaned.split_whitespace().count()
}

/// The `n` most frequent words, ties broken alphabetically so the output
/// is deterministic.
pub fn top_words(cleaned: &str, n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in cleaned.split_whitespace() {
        *counts.entry(word).or_insert(0) += 1;
    }
    let mut pairs: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(word, count)| (word.to_string(), count))
        .collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs.truncate(n);
    pairs
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPreview {
    pub text: String,
    pub length: usize,
}

/// Enriched per-page record stored as a JSON document.
#[derive(Debug, Clone, Serialize)]
pub struct PageAnalysis {
    pub url: String,
    pub analyzed_at: DateTime<Utc>,
    pub html_length: usize,
    pub cleaned_preview: String,
    pub word_count: usize,
    pub top_words: Vec<(String, usize)>,
    pub text_elements: BTreeMap<String, TextPreview>,
}

impl PageAnalysis {
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Analyze one page's HTML plus its extracted text elements.
pub fn analyze_page(
    url: &str,
    html: &str,
    texts: &BTreeMap<String, String>,
) -> PageAnalysis {
    let cleaned = clean_text(html);
    let text_elements = texts
        .iter()
        .map(|(selector, text)| {
            (
                selector.clone(),
                TextPreview {
                    text: truncate_chars(text, ELEMENT_PREVIEW_CHARS),
                    length: text.chars().count(),
                },
            )
        })
        .collect();

    PageAnalysis {
        url: url.to_string(),
        analyzed_at: Utc::now(),
        html_length: html.len(),
        cleaned_preview: truncate_chars(&cleaned, PREVIEW_CHARS),
        word_count: word_count(&cleaned),
        top_words: top_words(&cleaned, TOP_WORD_COUNT),
        text_elements,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
