use chrono::{DateTime, Utc};
use dredge_common::PageRecord;
use std::collections::BTreeMap;

/// Everything collected for one visited URL.
///
/// Created on navigate, filled in by `get_html`/`get_text`, dropped only
/// by a full-session clear.
#[derive(Debug, Clone)]
pub struct ScrapedPage {
    pub url: String,
    pub fetched_at: DateTime<Utc>,
    pub title: String,
    pub html: Option<String>,
    pub texts: BTreeMap<String, String>,
}

impl ScrapedPage {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            fetched_at: Utc::now(),
            title: title.into(),
            html: None,
            texts: BTreeMap::new(),
        }
    }

    /// Flatten into the record shape exporters and the store consume.
    pub fn record(&self) -> PageRecord {
        PageRecord {
            url: self.url.clone(),
            fetched_at: self.fetched_at,
            title: self.title.clone(),
            html_length: self.html.as_ref().map(String::len).unwrap_or(0),
            texts: self.texts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_reports_html_length_not_content() {
        let mut page = ScrapedPage::new("https://example.org", "Example");
        page.html = Some("<html>hello</html>".to_string());
        page.texts.insert("h1".into(), "hello".into());

        let record = page.record();
        assert_eq!(record.html_length, 18);
        assert_eq!(record.texts.len(), 1);
        assert_eq!(record.title, "Example");
    }

    #[test]
    fn fresh_page_has_no_html() {
        let page = ScrapedPage::new("https://example.org", "");
        assert_eq!(page.record().html_length, 0);
    }
}
