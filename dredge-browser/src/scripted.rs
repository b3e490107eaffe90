//! Scripted in-memory [`Session`] used by tests across the workspace.
//!
//! Elements are declared up front against the selectors that should find
//! them; every mutating operation is journaled so tests can assert on what
//! the code under test actually did to the page.

use crate::session::{Lookup, Selector, Session, SessionError, SessionResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Opaque element handle handed out by [`ScriptedSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedElement {
    pub id: String,
}

#[derive(Default)]
struct State {
    // selector -> (handle, outer html)
    elements: Vec<(Selector, ScriptedElement, String)>,
    texts: Vec<(String, String)>,
    script_results: VecDeque<serde_json::Value>,
    url: String,
    source: String,
    title: String,
    screenshot_png: Vec<u8>,

    navigations: Vec<String>,
    clicks: Vec<String>,
    typed: Vec<(String, String)>,
    cleared: Vec<String>,
    screenshots: Vec<PathBuf>,
    scripts: Vec<String>,
}

/// Scripted session. Construct with the builder methods, then hand a
/// shared reference to the code under test.
pub struct ScriptedSession {
    state: Mutex<State>,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                url: "https://example.test/".to_string(),
                ..State::default()
            }),
        }
    }

    /// Declare an element reachable through `selector`, with the given
    /// handle id and serialized outer HTML.
    pub fn with_element(self, selector: Selector, id: &str, outer_html: &str) -> Self {
        self.state.lock().unwrap().elements.push((
            selector,
            ScriptedElement { id: id.to_string() },
            outer_html.to_string(),
        ));
        self
    }

    pub fn with_text(self, id: &str, text: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .texts
            .push((id.to_string(), text.to_string()));
        self
    }

    /// Queue a result for the next `execute_script` call.
    pub fn with_script_result(self, value: serde_json::Value) -> Self {
        self.state.lock().unwrap().script_results.push_back(value);
        self
    }

    pub fn with_url(self, url: &str) -> Self {
        self.state.lock().unwrap().url = url.to_string();
        self
    }

    pub fn with_source(self, source: &str) -> Self {
        self.state.lock().unwrap().source = source.to_string();
        self
    }

    pub fn with_title(self, title: &str) -> Self {
        self.state.lock().unwrap().title = title.to_string();
        self
    }

    /// Bytes written to disk when an element screenshot is requested.
    pub fn with_screenshot_png(self, png: &[u8]) -> Self {
        self.state.lock().unwrap().screenshot_png = png.to_vec();
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().typed.clone()
    }

    pub fn cleared(&self) -> Vec<String> {
        self.state.lock().unwrap().cleared.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().screenshots.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().unwrap().scripts.clone()
    }
}

#[async_trait]
impl Session for ScriptedSession {
    type Element = ScriptedElement;

    async fn navigate(&self, url: &str) -> SessionResult<()> {
        let mut state = self.state.lock().unwrap();
        state.navigations.push(url.to_string());
        state.url = url.to_string();
        Ok(())
    }

    async fn find_element(&self, selector: &Selector) -> SessionResult<Lookup<ScriptedElement>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .elements
            .iter()
            .find(|(s, _, _)| s == selector)
            .map(|(_, e, _)| Lookup::Found(e.clone()))
            .unwrap_or(Lookup::NotFound))
    }

    async fn find_elements(&self, selector: &Selector) -> SessionResult<Vec<ScriptedElement>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .elements
            .iter()
            .filter(|(s, _, _)| s == selector)
            .map(|(_, e, _)| e.clone())
            .collect())
    }

    async fn wait_for_element(
        &self,
        selector: &Selector,
        _timeout: Duration,
    ) -> SessionResult<Lookup<ScriptedElement>> {
        // No clock in the scripted session; presence is immediate.
        self.find_element(selector).await
    }

    async fn click(&self, element: &ScriptedElement) -> SessionResult<()> {
        self.state.lock().unwrap().clicks.push(element.id.clone());
        Ok(())
    }

    async fn send_keys(&self, element: &ScriptedElement, text: &str) -> SessionResult<()> {
        self.state
            .lock()
            .unwrap()
            .typed
            .push((element.id.clone(), text.to_string()));
        Ok(())
    }

    async fn clear(&self, element: &ScriptedElement) -> SessionResult<()> {
        self.state.lock().unwrap().cleared.push(element.id.clone());
        Ok(())
    }

    async fn screenshot(&self, _element: &ScriptedElement, path: &Path) -> SessionResult<()> {
        let png = {
            let mut state = self.state.lock().unwrap();
            state.screenshots.push(path.to_path_buf());
            state.screenshot_png.clone()
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SessionError::Command(e.to_string()))?;
        }
        tokio::fs::write(path, png)
            .await
            .map_err(|e| SessionError::Command(e.to_string()))
    }

    async fn execute_script(&self, code: &str) -> SessionResult<serde_json::Value> {
        let mut state = self.state.lock().unwrap();
        state.scripts.push(code.to_string());
        Ok(state
            .script_results
            .pop_front()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn page_source(&self) -> SessionResult<String> {
        Ok(self.state.lock().unwrap().source.clone())
    }

    async fn element_text(&self, element: &ScriptedElement) -> SessionResult<String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .texts
            .iter()
            .find(|(id, _)| id == &element.id)
            .map(|(_, t)| t.clone())
            .unwrap_or_default())
    }

    async fn element_html(&self, element: &ScriptedElement) -> SessionResult<String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .elements
            .iter()
            .find(|(_, e, _)| e.id == element.id)
            .map(|(_, _, html)| html.clone())
            .unwrap_or_default())
    }

    async fn current_url(&self) -> SessionResult<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn title(&self) -> SessionResult<String> {
        Ok(self.state.lock().unwrap().title.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_elements_returns_every_declared_match() {
        let session = ScriptedSession::new()
            .with_element(Selector::css("input[type='submit']"), "s1", "<input>")
            .with_element(Selector::css("input[type='submit']"), "s2", "<input>")
            .with_element(Selector::id("other"), "o1", "<div>");

        let found = session
            .find_elements(&Selector::css("input[type='submit']"))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "s1");
    }

    #[tokio::test]
    async fn mutating_operations_are_journaled() {
        let session = ScriptedSession::new()
            .with_element(Selector::id("field"), "f1", "<input>")
            .with_text("f1", "hello");

        session.navigate("https://example.org").await.unwrap();
        let el = session
            .find_element(&Selector::id("field"))
            .await
            .unwrap()
            .found()
            .unwrap();
        session.clear(&el).await.unwrap();
        session.send_keys(&el, "abc").await.unwrap();
        session.click(&el).await.unwrap();

        assert_eq!(session.navigations(), vec!["https://example.org".to_string()]);
        assert_eq!(session.cleared(), vec!["f1".to_string()]);
        assert_eq!(session.typed(), vec![("f1".to_string(), "abc".to_string())]);
        assert_eq!(session.clicks(), vec!["f1".to_string()]);
        assert_eq!(session.element_text(&el).await.unwrap(), "hello");
        assert_eq!(session.current_url().await.unwrap(), "https://example.org");
    }
}
