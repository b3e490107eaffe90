//! End-to-end solver flows against a scripted session and a mock solving
//! service.

use dredge_browser::scripted::ScriptedSession;
use dredge_browser::Selector;
use dredge_captcha::ocr::Recognize;
use dredge_captcha::{SolveOutcome, Solver};
use dredge_config::CaptchaConfig;
use serde_json::json;
use std::path::Path;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct FixedOcr(Option<&'static str>);

#[async_trait::async_trait]
impl Recognize for FixedOcr {
    async fn recognize(&self, _image: &Path) -> Option<String> {
        self.0.map(str::to_string)
    }
}

fn config_with_service(temp: &tempfile::TempDir, server: &MockServer) -> CaptchaConfig {
    CaptchaConfig {
        service_api_key: Some("test-key".to_string()),
        service_base_url: server.uri(),
        temp_dir: temp.path().to_path_buf(),
        detect_timeout_secs: 1,
        poll_interval_ms: 1,
        ..CaptchaConfig::default()
    }
}

#[tokio::test]
async fn confident_ocr_never_reaches_the_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/in.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK|1"))
        .expect(0)
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let solver = Solver::new(config_with_service(&temp, &server))
        .with_recognizer(Box::new(FixedOcr(Some("7x9k2"))));

    let session = ScriptedSession::new()
        .with_element(Selector::id("captcha"), "captcha-img", r#"<img>"#)
        .with_element(Selector::id("captcha-input"), "solution-input", "<input>")
        .with_element(Selector::css("input[type='submit']"), "submit-btn", "<input>")
        .with_screenshot_png(b"png");

    let outcome = solver.solve(&session, None).await.unwrap();

    assert_eq!(outcome, SolveOutcome::Solved);
    assert_eq!(
        session.typed(),
        vec![("solution-input".to_string(), "7x9k2".to_string())]
    );
}

#[tokio::test]
async fn weak_ocr_falls_back_to_the_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/in.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK|5150"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/res.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK|xyz123"))
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let solver = Solver::new(config_with_service(&temp, &server))
        .with_recognizer(Box::new(FixedOcr(Some("ab"))));

    let session = ScriptedSession::new()
        .with_element(Selector::id("captcha"), "captcha-img", r#"<img>"#)
        .with_element(Selector::id("captcha-input"), "solution-input", "<input>")
        .with_element(Selector::css("input[type='submit']"), "submit-btn", "<input>")
        .with_screenshot_png(b"png");

    let outcome = solver.solve(&session, None).await.unwrap();

    assert_eq!(outcome, SolveOutcome::Solved);
    assert_eq!(
        session.typed(),
        vec![("solution-input".to_string(), "xyz123".to_string())]
    );
    assert_eq!(session.clicks(), vec!["submit-btn".to_string()]);
}

#[tokio::test]
async fn recaptcha_token_is_injected_and_submitted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/in.php"))
        .and(body_string_contains("method=userrecaptcha"))
        .and(body_string_contains("googlekey=site-123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK|777"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/res.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK|tok-1"))
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let solver = Solver::new(config_with_service(&temp, &server))
        .with_recognizer(Box::new(FixedOcr(None)));

    let session = ScriptedSession::new()
        .with_element(
            Selector::css("div.g-recaptcha"),
            "widget",
            r#"<div class="g-recaptcha" data-sitekey="site-123"></div>"#,
        )
        .with_element(Selector::css("input[type='submit']"), "submit-btn", "<input>")
        .with_url("https://example.org/login")
        // Site-key extraction result.
        .with_script_result(json!("site-123"));

    let outcome = solver.solve(&session, None).await.unwrap();

    assert_eq!(outcome, SolveOutcome::Solved);
    let scripts = session.scripts();
    assert_eq!(scripts.len(), 2);
    assert!(scripts[0].contains("data-sitekey"));
    assert!(scripts[1].contains("g-recaptcha-response"));
    assert!(scripts[1].contains("tok-1"));
    assert_eq!(session.clicks(), vec!["submit-btn".to_string()]);
}

#[tokio::test]
async fn widget_service_timeout_is_unsolved() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/in.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK|9"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/res.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("CAPCHA_NOT_READY"))
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let solver = Solver::new(config_with_service(&temp, &server))
        .with_recognizer(Box::new(FixedOcr(None)));

    let session = ScriptedSession::new()
        .with_element(
            Selector::css("div.g-recaptcha"),
            "widget",
            r#"<div class="g-recaptcha"></div>"#,
        )
        .with_element(Selector::css("input[type='submit']"), "submit-btn", "<input>")
        .with_script_result(json!("site-123"));

    let outcome = solver.solve(&session, None).await.unwrap();

    assert_eq!(
        outcome,
        SolveOutcome::unsolved("solving service returned no solution")
    );
    // The widget was never submitted.
    assert!(session.clicks().is_empty());
}

#[tokio::test]
async fn missing_site_key_is_unsolved_before_any_submission() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/in.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK|1"))
        .expect(0)
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let solver = Solver::new(config_with_service(&temp, &server))
        .with_recognizer(Box::new(FixedOcr(None)));

    // Script result queue is empty, so extraction yields null.
    let session = ScriptedSession::new().with_element(
        Selector::css("div.g-recaptcha"),
        "widget",
        r#"<div class="g-recaptcha"></div>"#,
    );

    let outcome = solver.solve(&session, None).await.unwrap();
    assert_eq!(outcome, SolveOutcome::unsolved("site key not found"));
}
