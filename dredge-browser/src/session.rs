//! The `Session` trait and the types shared by its implementations.

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// How to address an element on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Css(String),
    Id(String),
    XPath(String),
}

impl Selector {
    pub fn css(s: impl Into<String>) -> Self {
        Self::Css(s.into())
    }

    pub fn id(s: impl Into<String>) -> Self {
        Self::Id(s.into())
    }

    pub fn xpath(s: impl Into<String>) -> Self {
        Self::XPath(s.into())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(s) => write!(f, "css:{s}"),
            Selector::Id(s) => write!(f, "id:{s}"),
            Selector::XPath(s) => write!(f, "xpath:{s}"),
        }
    }
}

/// Outcome of an element lookup. Absence is a value, not an error.
#[derive(Debug, Clone)]
pub enum Lookup<E> {
    Found(E),
    NotFound,
}

impl<E> Lookup<E> {
    pub fn found(self) -> Option<E> {
        match self {
            Lookup::Found(e) => Some(e),
            Lookup::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// Errors from a browser session.
///
/// `Command` covers per-operation failures (stale element, script error,
/// driver rejecting an argument) that callers recover from locally.
/// `Fatal` means the driver connection itself is gone and the session is
/// unusable; it propagates uncaught.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("browser command failed: {0}")]
    Command(String),
    #[error("browser session lost: {0}")]
    Fatal(String),
}

impl SessionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Fatal(_))
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Capability interface over a live browser page.
///
/// The associated `Element` type is an opaque handle owned by the session;
/// callers borrow it back into session operations and never inspect it.
#[async_trait]
pub trait Session: Send + Sync {
    type Element: Clone + Send + Sync;

    async fn navigate(&self, url: &str) -> SessionResult<()>;

    async fn find_element(&self, selector: &Selector) -> SessionResult<Lookup<Self::Element>>;

    async fn find_elements(&self, selector: &Selector) -> SessionResult<Vec<Self::Element>>;

    /// Bounded wait for an element to appear. `NotFound` on timeout.
    async fn wait_for_element(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> SessionResult<Lookup<Self::Element>>;

    async fn click(&self, element: &Self::Element) -> SessionResult<()>;

    async fn send_keys(&self, element: &Self::Element, text: &str) -> SessionResult<()>;

    async fn clear(&self, element: &Self::Element) -> SessionResult<()>;

    /// Capture a PNG of just this element into `path`.
    async fn screenshot(&self, element: &Self::Element, path: &Path) -> SessionResult<()>;

    async fn execute_script(&self, code: &str) -> SessionResult<serde_json::Value>;

    async fn page_source(&self) -> SessionResult<String>;

    async fn element_text(&self, element: &Self::Element) -> SessionResult<String>;

    /// Serialized outer HTML of the element.
    async fn element_html(&self, element: &Self::Element) -> SessionResult<String>;

    async fn current_url(&self) -> SessionResult<String>;

    async fn title(&self) -> SessionResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_display_is_prefixed() {
        assert_eq!(Selector::css("div.g-recaptcha").to_string(), "css:div.g-recaptcha");
        assert_eq!(Selector::id("captcha").to_string(), "id:captcha");
        assert_eq!(
            Selector::xpath("//img[contains(@alt,'captcha')]").to_string(),
            "xpath://img[contains(@alt,'captcha')]"
        );
    }

    #[test]
    fn lookup_found_unwraps() {
        let l: Lookup<u8> = Lookup::Found(7);
        assert!(l.is_found());
        assert_eq!(l.found(), Some(7));
        assert!(Lookup::<u8>::NotFound.found().is_none());
    }
}
