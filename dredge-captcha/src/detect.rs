//! Page scanning for known CAPTCHA markers.

use crate::{CaptchaInstance, CaptchaKind};
use dredge_browser::{first_match_waiting, Selector, Session, SessionResult};
use std::time::Duration;
use tracing::{debug, info};

/// Ordered marker patterns. Order encodes priority, not exhaustiveness:
/// the first pattern that resolves wins, and simultaneous CAPTCHAs are not
/// distinguished.
pub fn captcha_markers() -> Vec<Selector> {
    vec![
        Selector::id("captcha"),
        Selector::id("captchaimg"),
        Selector::css("img[src*='captcha']"),
        Selector::css("div.g-recaptcha"),
        Selector::css("iframe[src*='recaptcha']"),
        Selector::css("iframe[src*='captcha']"),
        Selector::xpath("//img[contains(@alt,'captcha')]"),
    ]
}

/// Scans the page for CAPTCHA markers and classifies a hit.
pub struct Detector {
    per_pattern_timeout: Duration,
}

impl Detector {
    pub fn new(per_pattern_timeout: Duration) -> Self {
        Self {
            per_pattern_timeout,
        }
    }

    /// Check whether the current page contains a CAPTCHA.
    ///
    /// Each marker gets an independent bounded wait. `None` means no
    /// marker matched, which is a normal outcome, not a failure.
    pub async fn detect<S: Session>(
        &self,
        session: &S,
    ) -> SessionResult<Option<CaptchaInstance<S::Element>>> {
        let markers = captcha_markers();
        let Some(hit) = first_match_waiting(session, &markers, self.per_pattern_timeout).await?
        else {
            debug!("captcha.detect.none");
            return Ok(None);
        };

        // Classification failures fall back to the plainest kind; only a
        // fatal session loss propagates.
        let html = match session.element_html(&hit.element).await {
            Ok(html) => html,
            Err(e) if e.is_fatal() => return Err(e),
            Err(_) => String::new(),
        };
        let kind = classify(&html);
        info!(kind = %kind, selector = %hit.selector, "captcha.detect.hit");

        Ok(Some(CaptchaInstance {
            element: hit.element,
            kind,
        }))
    }
}

/// Classify a matched marker by its serialized markup.
fn classify(outer_html: &str) -> CaptchaKind {
    if outer_html.contains("g-recaptcha") {
        CaptchaKind::Recaptcha
    } else if outer_html.contains("hcaptcha") {
        CaptchaKind::Hcaptcha
    } else {
        CaptchaKind::Image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dredge_browser::scripted::ScriptedSession;

    #[test]
    fn classify_prefers_recaptcha_marker() {
        assert_eq!(
            classify(r#"<div class="g-recaptcha" data-sitekey="k"></div>"#),
            CaptchaKind::Recaptcha
        );
        assert_eq!(
            classify(r#"<iframe src="https://hcaptcha.com/x"></iframe>"#),
            CaptchaKind::Hcaptcha
        );
        assert_eq!(classify(r#"<img src="/captcha.png">"#), CaptchaKind::Image);
    }

    #[tokio::test]
    async fn absent_markers_mean_no_captcha() {
        let session = ScriptedSession::new();
        let detector = Detector::new(Duration::from_millis(5));
        assert!(detector.detect(&session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn first_marker_in_priority_order_wins() {
        // Page carries both an image marker and a recaptcha widget; the
        // id pattern sits earlier in the list and must win.
        let session = ScriptedSession::new()
            .with_element(
                Selector::css("div.g-recaptcha"),
                "widget",
                r#"<div class="g-recaptcha"></div>"#,
            )
            .with_element(Selector::id("captcha"), "img", r#"<img src="/captcha.png">"#);

        let detector = Detector::new(Duration::from_millis(5));
        let instance = detector.detect(&session).await.unwrap().expect("detected");
        assert_eq!(instance.element.id, "img");
        assert_eq!(instance.kind, CaptchaKind::Image);
    }

    #[tokio::test]
    async fn widget_markup_classifies_the_hit() {
        let session = ScriptedSession::new().with_element(
            Selector::css("div.g-recaptcha"),
            "widget",
            r#"<div class="g-recaptcha" data-sitekey="site-1"></div>"#,
        );
        let detector = Detector::new(Duration::from_millis(5));
        let instance = detector.detect(&session).await.unwrap().expect("detected");
        assert_eq!(instance.kind, CaptchaKind::Recaptcha);
    }
}
