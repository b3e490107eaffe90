use crate::page::ScrapedPage;
use dredge_browser::{first_match, Selector, Session, SessionError};
use dredge_captcha::{SolveOutcome, Solver};
use dredge_common::PageRecord;
use dredge_config::CaptchaConfig;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Candidate selectors for login form fields, highest priority first.
fn username_candidates() -> Vec<Selector> {
    vec![
        Selector::css("input[name='username']"),
        Selector::css("input[name='email']"),
        Selector::css("input[name='login']"),
        Selector::css("input[id='username']"),
        Selector::css("input[id='email']"),
    ]
}

fn password_candidates() -> Vec<Selector> {
    vec![
        Selector::css("input[name='password']"),
        Selector::css("input[id='password']"),
        Selector::css("input[type='password']"),
    ]
}

fn login_submit_candidates() -> Vec<Selector> {
    vec![
        Selector::css("input[type='submit']"),
        Selector::css("button[type='submit']"),
        Selector::xpath("//button[contains(.,'Login')]"),
        Selector::xpath("//button[contains(.,'Sign in')]"),
    ]
}

/// Errors surfaced to the REPL by controller operations.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("no page loaded; navigate first")]
    NoCurrentPage,
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Result of one automatic detect-and-solve pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolvePass {
    /// Auto-solve is disabled.
    Skipped,
    /// No CAPTCHA on the page.
    Clear,
    Solved,
    Unsolved(String),
}

impl fmt::Display for SolvePass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolvePass::Skipped => write!(f, "captcha check skipped"),
            SolvePass::Clear => write!(f, "no captcha detected"),
            SolvePass::Solved => write!(f, "captcha solved"),
            SolvePass::Unsolved(reason) => write!(f, "captcha unsolved: {reason}"),
        }
    }
}

/// What the login flow did.
#[derive(Debug, Clone)]
pub struct LoginReport {
    pub pre_submit: SolvePass,
    pub post_submit: SolvePass,
    /// Whether the login submit control was clicked by the flow itself.
    /// False when a pre-submit CAPTCHA was present; solving it is
    /// expected to trigger the submission.
    pub submitted: bool,
}

/// Wraps the browser session; every navigation and click runs a settle
/// delay followed by a CAPTCHA detect-and-solve pass when auto-solve is
/// enabled.
pub struct Controller<S: Session> {
    session: S,
    solver: Solver,
    captcha: CaptchaConfig,
    pages: BTreeMap<String, ScrapedPage>,
    current_url: Option<String>,
}

impl<S: Session> Controller<S> {
    pub fn new(session: S, solver: Solver, captcha: CaptchaConfig) -> Self {
        Self {
            session,
            solver,
            captcha,
            pages: BTreeMap::new(),
            current_url: None,
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Give the session back, e.g. to close it on shutdown.
    pub fn into_session(self) -> S {
        self.session
    }

    /// Navigate and start a [`ScrapedPage`] for the URL.
    pub async fn navigate(&mut self, url: &str) -> Result<SolvePass, ScrapeError> {
        info!(%url, "scrape.navigate");
        self.session.navigate(url).await?;

        let pass = self.auto_solve_pass().await?;
        if pass == SolvePass::Solved {
            // Let the page reload after the solved form submission.
            sleep(Duration::from_millis(self.captcha.post_solve_delay_ms)).await;
        }

        let title = self.session.title().await?;
        self.pages
            .insert(url.to_string(), ScrapedPage::new(url, title));
        self.current_url = Some(url.to_string());
        Ok(pass)
    }

    /// Click the first element matching `css`.
    pub async fn click(&mut self, css: &str) -> Result<SolvePass, ScrapeError> {
        let selector = Selector::css(css);
        let element = self
            .session
            .find_element(&selector)
            .await?
            .found()
            .ok_or_else(|| ScrapeError::ElementNotFound(css.to_string()))?;
        self.session.click(&element).await?;
        debug!(%css, "scrape.click");

        self.auto_solve_pass().await
    }

    /// Fetch the page source and record it on the current page.
    pub async fn get_html(&mut self) -> Result<String, ScrapeError> {
        let url = self.current_url.clone().ok_or(ScrapeError::NoCurrentPage)?;
        let html = self.session.page_source().await?;
        if let Some(page) = self.pages.get_mut(&url) {
            page.html = Some(html.clone());
        }
        debug!(%url, bytes = html.len(), "scrape.get_html");
        Ok(html)
    }

    /// Read an element's text and record it on the current page.
    pub async fn get_text(&mut self, css: &str) -> Result<String, ScrapeError> {
        let url = self.current_url.clone().ok_or(ScrapeError::NoCurrentPage)?;
        let selector = Selector::css(css);
        let element = self
            .session
            .find_element(&selector)
            .await?
            .found()
            .ok_or_else(|| ScrapeError::ElementNotFound(css.to_string()))?;
        let text = self.session.element_text(&element).await?;
        if let Some(page) = self.pages.get_mut(&url) {
            page.texts.insert(css.to_string(), text.clone());
        }
        Ok(text)
    }

    /// Best-effort login: fill the first matching username/password
    /// candidates, then submit. When a CAPTCHA stands in front of the
    /// form, solving it carries the submission instead.
    pub async fn login(
        &mut self,
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<LoginReport, ScrapeError> {
        self.navigate(url).await?;

        if !self.fill_first(&username_candidates(), username).await? {
            warn!("scrape.login.username_field_missing");
        }
        if !self.fill_first(&password_candidates(), password).await? {
            warn!("scrape.login.password_field_missing");
        }

        // Pre-submit check runs regardless of the auto-solve flag; a form
        // guarded by a CAPTCHA cannot be submitted around it.
        let pre_submit = self.solve_now().await?;
        let mut submitted = false;
        if matches!(pre_submit, SolvePass::Clear) {
            if let Some(submit) = first_match(&self.session, &login_submit_candidates()).await? {
                self.session.click(&submit.element).await?;
                submitted = true;
            } else {
                warn!("scrape.login.submit_missing");
            }
        }

        // Form submission gets a longer settle than a plain click.
        sleep(Duration::from_millis(
            self.captcha.settle_delay_ms.saturating_mul(2),
        ))
        .await;
        let post_submit = self.solve_now().await?;

        info!(pre = %pre_submit, post = %post_submit, submitted, "scrape.login.finished");
        Ok(LoginReport {
            pre_submit,
            post_submit,
            submitted,
        })
    }

    /// Flatten all pages for export/persistence, in URL order.
    pub fn records(&self) -> Vec<PageRecord> {
        self.pages.values().map(ScrapedPage::record).collect()
    }

    pub fn page(&self, url: &str) -> Option<&ScrapedPage> {
        self.pages.get(url)
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Drop every collected page.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.current_url = None;
    }

    async fn auto_solve_pass(&mut self) -> Result<SolvePass, ScrapeError> {
        if !self.captcha.auto_solve {
            return Ok(SolvePass::Skipped);
        }
        sleep(Duration::from_millis(self.captcha.settle_delay_ms)).await;
        self.solve_now().await
    }

    async fn solve_now(&mut self) -> Result<SolvePass, ScrapeError> {
        let outcome = self.solver.solve(&self.session, None).await?;
        Ok(match outcome {
            SolveOutcome::Clear => SolvePass::Clear,
            SolveOutcome::Solved => SolvePass::Solved,
            SolveOutcome::Unsolved { reason } => SolvePass::Unsolved(reason),
        })
    }

    async fn fill_first(
        &mut self,
        candidates: &[Selector],
        value: &str,
    ) -> Result<bool, ScrapeError> {
        match first_match(&self.session, candidates).await? {
            Some(hit) => {
                self.session.clear(&hit.element).await?;
                self.session.send_keys(&hit.element, value).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
