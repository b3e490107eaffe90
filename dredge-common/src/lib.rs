//! Common types and utilities shared across Dredge crates.
//!
//! This crate defines the flat page record exchanged between the scraper,
//! exporters, and persistence layers, plus the centralised tracing/logging
//! initialiser. It is intentionally lightweight and dependency-minimal so
//! that all crates can depend on it without heavy transitive costs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod observability;

/// Flat record describing one scraped page, as handed to exporters and the
/// relational store.
///
/// The HTML body itself is not carried here, only its length; the full
/// source stays with the controller until an analysis pass asks for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageRecord {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub title: String,
    pub html_length: usize,
    /// Selector → extracted text, in insertion-stable order.
    pub texts: BTreeMap<String, String>,
}

impl PageRecord {
    /// Short single-line summary for REPL output.
    pub fn summary(&self) -> String {
        format!(
            "{} | title: {} | html: {} | texts: {}",
            self.url,
            if self.title.is_empty() { "-" } else { &self.title },
            if self.html_length > 0 {
                "retrieved"
            } else {
                "missing"
            },
            self.texts.len()
        )
    }
}
