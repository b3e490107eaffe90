//! Solve dispatcher: one strategy pass per detected CAPTCHA.

use crate::detect::Detector;
use crate::ocr::{Recognize, TesseractOcr};
use crate::service::{Challenge, ServiceClient};
use crate::{AttemptOutcome, CaptchaInstance, CaptchaKind, SolveAttempt, SolveOutcome, Strategy};
use chrono::Utc;
use dredge_browser::{first_match, Selector, Session, SessionError};
use dredge_config::CaptchaConfig;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// OCR results shorter than this are treated as noise.
const OCR_CONFIDENCE_FLOOR: usize = 3;

/// Candidate selectors for the CAPTCHA solution input field.
pub fn input_candidates() -> Vec<Selector> {
    vec![
        Selector::id("captcha-input"),
        Selector::css("input[name='captcha']"),
        Selector::css("input[placeholder*='captcha' i]"),
        Selector::css("input[name*='captcha' i]"),
    ]
}

/// Candidate selectors for the form's submit control.
pub fn submit_candidates() -> Vec<Selector> {
    vec![
        Selector::css("input[type='submit']"),
        Selector::css("button[type='submit']"),
        Selector::xpath("//button[contains(.,'Submit')]"),
        Selector::xpath("//button[contains(.,'Verify')]"),
    ]
}

/// Flow-internal failure split: recoverable failures become
/// [`SolveOutcome::Unsolved`]; fatal session losses propagate.
enum FlowError {
    Recoverable(String),
    Fatal(SessionError),
}

impl From<SessionError> for FlowError {
    fn from(e: SessionError) -> Self {
        if e.is_fatal() {
            FlowError::Fatal(e)
        } else {
            FlowError::Recoverable(e.to_string())
        }
    }
}

type FlowResult<T> = Result<T, FlowError>;

/// Dispatches a detected CAPTCHA to the appropriate solving strategy and
/// submits the solution.
pub struct Solver {
    config: CaptchaConfig,
    service: Option<ServiceClient>,
    recognizer: Box<dyn Recognize>,
}

impl Solver {
    pub fn new(config: CaptchaConfig) -> Self {
        let service = config
            .service_api_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .map(|key| {
                ServiceClient::new(
                    config.service_base_url.clone(),
                    key.clone(),
                    Duration::from_millis(config.poll_interval_ms),
                )
            });
        Self {
            config,
            service,
            recognizer: Box::new(TesseractOcr),
        }
    }

    /// Swap the OCR backend (tests).
    pub fn with_recognizer(mut self, recognizer: Box<dyn Recognize>) -> Self {
        self.recognizer = recognizer;
        self
    }

    /// Solve `instance`, or detect-then-solve when none is supplied.
    ///
    /// No CAPTCHA on the page is a success ([`SolveOutcome::Clear`]).
    /// Recoverable failures (unusable solution, missing input or submit
    /// control, service rejection or timeout, per-command browser errors)
    /// come back as [`SolveOutcome::Unsolved`] with a diagnostic reason.
    /// Only a fatal session loss returns `Err`.
    pub async fn solve<S: Session>(
        &self,
        session: &S,
        instance: Option<CaptchaInstance<S::Element>>,
    ) -> Result<SolveOutcome, SessionError> {
        let instance = match instance {
            Some(instance) => instance,
            None => {
                let detector =
                    Detector::new(Duration::from_secs(self.config.detect_timeout_secs));
                match detector.detect(session).await? {
                    Some(instance) => instance,
                    None => return Ok(SolveOutcome::Clear),
                }
            }
        };

        info!(kind = %instance.kind, "captcha.solve.start");
        let flow = match instance.kind {
            CaptchaKind::Image => self.image_flow(session, &instance.element).await,
            kind => self.widget_flow(session, kind).await,
        };

        match flow {
            Ok(outcome) => {
                info!(kind = %instance.kind, outcome = ?outcome, "captcha.solve.finished");
                Ok(outcome)
            }
            Err(FlowError::Recoverable(reason)) => {
                warn!(kind = %instance.kind, %reason, "captcha.solve.failed");
                Ok(SolveOutcome::Unsolved { reason })
            }
            Err(FlowError::Fatal(e)) => Err(e),
        }
    }

    /// Image CAPTCHAs: local OCR first, remote service as fallback, then
    /// type the solution into the form and submit it.
    async fn image_flow<S: Session>(
        &self,
        session: &S,
        element: &S::Element,
    ) -> FlowResult<SolveOutcome> {
        let shot = self.capture(session, element).await?;

        let mut attempt = SolveAttempt::new(CaptchaKind::Image, Strategy::LocalOcr);
        let recognized = self.recognizer.recognize(&shot).await;

        let solution = match recognized {
            Some(text) if text.chars().count() >= OCR_CONFIDENCE_FLOOR => {
                debug!(chars = text.len(), "captcha.ocr.accepted");
                attempt.outcome = AttemptOutcome::Solved(text.clone());
                log_attempt(&attempt);
                text
            }
            weak => {
                debug!(result = ?weak, "captcha.ocr.below_confidence_floor");
                attempt.outcome =
                    AttemptOutcome::Failed("ocr result below confidence floor".to_string());
                log_attempt(&attempt);

                let Some(service) = &self.service else {
                    return Ok(SolveOutcome::unsolved("no fallback available"));
                };

                let png = tokio::fs::read(&shot).await.map_err(|e| {
                    FlowError::Recoverable(format!("captcha capture unreadable: {e}"))
                })?;
                let mut remote = SolveAttempt::new(CaptchaKind::Image, Strategy::RemoteService);
                let solved = service.submit_and_poll(&mut remote, Challenge::image(png)).await;
                log_attempt(&remote);
                match solved {
                    Some(solution) => solution,
                    None => {
                        return Ok(SolveOutcome::unsolved(
                            "solving service returned no solution",
                        ))
                    }
                }
            }
        };

        let Some(input) = first_match(session, &input_candidates()).await? else {
            return Ok(SolveOutcome::unsolved("input field not found"));
        };
        session.clear(&input.element).await?;
        session.send_keys(&input.element, &solution).await?;

        let Some(submit) = first_match(session, &submit_candidates()).await? else {
            return Ok(SolveOutcome::unsolved("submit control not found"));
        };
        session.click(&submit.element).await?;

        Ok(SolveOutcome::Solved)
    }

    /// Widget CAPTCHAs: remote service only, then plant the token in the
    /// hidden response field and submit.
    async fn widget_flow<S: Session>(
        &self,
        session: &S,
        kind: CaptchaKind,
    ) -> FlowResult<SolveOutcome> {
        let Some(service) = &self.service else {
            return Ok(SolveOutcome::unsolved(format!(
                "cannot solve {kind} without a service API key"
            )));
        };

        let Some(site_key) = self.extract_site_key(session, kind).await? else {
            return Ok(SolveOutcome::unsolved("site key not found"));
        };
        let page_url = session.current_url().await?;

        let challenge = match kind {
            CaptchaKind::Recaptcha => Challenge::recaptcha(site_key, page_url),
            CaptchaKind::Hcaptcha => Challenge::hcaptcha(site_key, page_url),
            CaptchaKind::Image => {
                return Ok(SolveOutcome::unsolved("not a widget challenge"));
            }
        };

        let mut attempt = SolveAttempt::new(kind, Strategy::RemoteService);
        let token = service.submit_and_poll(&mut attempt, challenge).await;
        log_attempt(&attempt);
        let Some(token) = token else {
            return Ok(SolveOutcome::unsolved(
                "solving service returned no solution",
            ));
        };

        self.inject_token(session, kind, &token).await?;

        let Some(submit) = first_match(session, &submit_candidates()).await? else {
            return Ok(SolveOutcome::unsolved("submit control not found"));
        };
        session.click(&submit.element).await?;

        Ok(SolveOutcome::Solved)
    }

    /// Capture the CAPTCHA element into the temp directory. The file is
    /// OCR/upload input only and is never cleaned up here.
    async fn capture<S: Session>(
        &self,
        session: &S,
        element: &S::Element,
    ) -> FlowResult<PathBuf> {
        // FIXME: second-resolution names collide when two attempts land in
        // the same second; add a per-session counter to the filename.
        let path = self
            .config
            .temp_dir
            .join(format!("captcha_{}.png", Utc::now().timestamp()));
        session.screenshot(element, &path).await?;
        debug!(path = %path.display(), "captcha.capture.written");
        Ok(path)
    }

    async fn extract_site_key<S: Session>(
        &self,
        session: &S,
        kind: CaptchaKind,
    ) -> FlowResult<Option<String>> {
        let script = match kind {
            CaptchaKind::Recaptcha => {
                "return document.querySelector('.g-recaptcha').getAttribute('data-sitekey')"
            }
            _ => "return document.querySelector('div[data-sitekey]').getAttribute('data-sitekey')",
        };
        let value = session.execute_script(script).await?;
        Ok(value
            .as_str()
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty()))
    }

    /// Plant the service token in the widget's hidden response field.
    ///
    /// Sites that verify only through their own widget callback may ignore
    /// a token planted this way; submission still goes through the regular
    /// submit control.
    async fn inject_token<S: Session>(
        &self,
        session: &S,
        kind: CaptchaKind,
        token: &str,
    ) -> FlowResult<()> {
        let field = match kind {
            CaptchaKind::Recaptcha => "g-recaptcha-response",
            _ => "h-captcha-response",
        };
        let escaped = token.replace('\\', "\\\\").replace('\'', "\\'");
        let script = format!("document.getElementById('{field}').innerHTML = '{escaped}'");
        session.execute_script(&script).await?;
        Ok(())
    }
}

fn log_attempt(attempt: &SolveAttempt) {
    debug!(
        kind = %attempt.kind,
        strategy = ?attempt.strategy,
        job_id = ?attempt.job_id,
        polls = attempt.polls,
        outcome = ?attempt.outcome,
        "captcha.attempt.finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use dredge_browser::scripted::{ScriptedElement, ScriptedSession};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeOcr {
        result: Option<String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Recognize for FakeOcr {
        async fn recognize(&self, _image: &Path) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn test_config(temp: &tempfile::TempDir) -> CaptchaConfig {
        CaptchaConfig {
            temp_dir: temp.path().to_path_buf(),
            detect_timeout_secs: 1,
            poll_interval_ms: 1,
            ..CaptchaConfig::default()
        }
    }

    fn solver_with_ocr(
        config: CaptchaConfig,
        result: Option<&str>,
    ) -> (Solver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let solver = Solver::new(config).with_recognizer(Box::new(FakeOcr {
            result: result.map(str::to_string),
            calls: calls.clone(),
        }));
        (solver, calls)
    }

    fn image_captcha_page() -> ScriptedSession {
        ScriptedSession::new()
            .with_element(Selector::id("captcha"), "captcha-img", r#"<img src="/captcha.png">"#)
            .with_element(Selector::id("captcha-input"), "solution-input", "<input>")
            .with_element(Selector::css("input[type='submit']"), "submit-btn", "<input>")
            .with_screenshot_png(b"png-bytes")
    }

    #[tokio::test]
    async fn clean_page_is_clear_with_zero_ocr_calls() {
        let temp = tempfile::tempdir().unwrap();
        let (solver, ocr_calls) = solver_with_ocr(test_config(&temp), Some("7x9k2"));
        let session = ScriptedSession::new();

        let outcome = solver.solve(&session, None).await.unwrap();

        assert_eq!(outcome, SolveOutcome::Clear);
        assert!(outcome.succeeded());
        assert_eq!(ocr_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn confident_ocr_fills_input_and_submits() {
        let temp = tempfile::tempdir().unwrap();
        let (solver, ocr_calls) = solver_with_ocr(test_config(&temp), Some("7x9k2"));
        let session = image_captcha_page();

        let outcome = solver.solve(&session, None).await.unwrap();

        assert_eq!(outcome, SolveOutcome::Solved);
        assert_eq!(ocr_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.cleared(), vec!["solution-input".to_string()]);
        assert_eq!(
            session.typed(),
            vec![("solution-input".to_string(), "7x9k2".to_string())]
        );
        assert_eq!(session.clicks(), vec!["submit-btn".to_string()]);
        // One diagnostic screenshot was written into the temp dir.
        assert_eq!(session.screenshots().len(), 1);
        assert!(session.screenshots()[0].starts_with(temp.path()));
    }

    #[tokio::test]
    async fn weak_ocr_without_api_key_fails_without_fallback() {
        let temp = tempfile::tempdir().unwrap();
        let (solver, ocr_calls) = solver_with_ocr(test_config(&temp), Some("ab"));
        let session = image_captcha_page();

        let outcome = solver.solve(&session, None).await.unwrap();

        assert_eq!(outcome, SolveOutcome::unsolved("no fallback available"));
        assert_eq!(ocr_calls.load(Ordering::SeqCst), 1);
        // Nothing was typed or clicked.
        assert!(session.typed().is_empty());
        assert!(session.clicks().is_empty());
    }

    #[tokio::test]
    async fn empty_ocr_counts_as_weak() {
        let temp = tempfile::tempdir().unwrap();
        let (solver, _) = solver_with_ocr(test_config(&temp), None);
        let session = image_captcha_page();

        let outcome = solver.solve(&session, None).await.unwrap();
        assert_eq!(outcome, SolveOutcome::unsolved("no fallback available"));
    }

    #[tokio::test]
    async fn missing_input_field_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let (solver, _) = solver_with_ocr(test_config(&temp), Some("7x9k2"));
        let session = ScriptedSession::new()
            .with_element(Selector::id("captcha"), "captcha-img", r#"<img>"#)
            .with_element(Selector::css("input[type='submit']"), "submit-btn", "<input>");

        let outcome = solver.solve(&session, None).await.unwrap();
        assert_eq!(outcome, SolveOutcome::unsolved("input field not found"));
        assert!(session.clicks().is_empty());
    }

    #[tokio::test]
    async fn missing_submit_control_is_reported() {
        let temp = tempfile::tempdir().unwrap();
        let (solver, _) = solver_with_ocr(test_config(&temp), Some("7x9k2"));
        let session = ScriptedSession::new()
            .with_element(Selector::id("captcha"), "captcha-img", r#"<img>"#)
            .with_element(Selector::id("captcha-input"), "solution-input", "<input>");

        let outcome = solver.solve(&session, None).await.unwrap();
        assert_eq!(outcome, SolveOutcome::unsolved("submit control not found"));
        // The solution was typed before the submit lookup failed.
        assert_eq!(
            session.typed(),
            vec![("solution-input".to_string(), "7x9k2".to_string())]
        );
    }

    #[tokio::test]
    async fn widget_without_api_key_fails_fast() {
        let temp = tempfile::tempdir().unwrap();
        let (solver, ocr_calls) = solver_with_ocr(test_config(&temp), Some("unused"));
        let session = ScriptedSession::new().with_element(
            Selector::css("div.g-recaptcha"),
            "widget",
            r#"<div class="g-recaptcha" data-sitekey="k"></div>"#,
        );

        let outcome = solver.solve(&session, None).await.unwrap();

        assert!(!outcome.succeeded());
        assert_eq!(ocr_calls.load(Ordering::SeqCst), 0);
        // Fail-fast: no site-key extraction, no injection, no clicks.
        assert!(session.scripts().is_empty());
        assert!(session.clicks().is_empty());
    }

    #[tokio::test]
    async fn supplied_instance_skips_detection() {
        let temp = tempfile::tempdir().unwrap();
        let (solver, _) = solver_with_ocr(test_config(&temp), Some("7x9k2"));
        // No captcha markers declared; the instance is handed in directly.
        let session = ScriptedSession::new()
            .with_element(Selector::id("captcha-input"), "solution-input", "<input>")
            .with_element(Selector::css("input[type='submit']"), "submit-btn", "<input>");

        let instance = CaptchaInstance {
            element: ScriptedElement {
                id: "handed-in".to_string(),
            },
            kind: CaptchaKind::Image,
        };
        let outcome = solver.solve(&session, Some(instance)).await.unwrap();
        assert_eq!(outcome, SolveOutcome::Solved);
    }
}
