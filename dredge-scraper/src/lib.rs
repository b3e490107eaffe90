//! Scraper controller: browser operations with automatic CAPTCHA handling.
//!
//! [`Controller`] wraps an exclusively-owned browser [`Session`] and runs a
//! detect-and-solve pass after navigations, clicks, and login submissions.
//! It also owns the per-URL [`ScrapedPage`] collection that the REPL's
//! `get_html`/`get_text`/`save` commands read and write.
//!
//! [`Session`]: dredge_browser::Session

mod controller;
mod page;

pub use controller::{Controller, LoginReport, ScrapeError, SolvePass};
pub use page::ScrapedPage;
