//! Remote solving-service strategy: submit a challenge, poll for the
//! solution.
//!
//! One submit/poll/timeout implementation serves all three challenge
//! shapes; only the payload and the poll budget vary. The protocol is
//! line-oriented and pipe-delimited: `OK|<id>` on acceptance, then
//! `OK|<solution>`, the literal not-ready sentinel, or a terminal error
//! code on each poll.

use crate::{AttemptOutcome, SolveAttempt};
use reqwest::multipart;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const IMAGE_POLL_BUDGET: u32 = 30;
const WIDGET_POLL_BUDGET: u32 = 60;
const NOT_READY: &str = "CAPCHA_NOT_READY";

/// A challenge payload for the solving service.
pub enum Challenge {
    Image {
        png: Vec<u8>,
    },
    Widget {
        method: &'static str,
        key_param: &'static str,
        site_key: String,
        page_url: String,
    },
}

impl Challenge {
    pub fn image(png: Vec<u8>) -> Self {
        Challenge::Image { png }
    }

    pub fn recaptcha(site_key: String, page_url: String) -> Self {
        Challenge::Widget {
            method: "userrecaptcha",
            key_param: "googlekey",
            site_key,
            page_url,
        }
    }

    pub fn hcaptcha(site_key: String, page_url: String) -> Self {
        Challenge::Widget {
            method: "hcaptcha",
            key_param: "sitekey",
            site_key,
            page_url,
        }
    }

    fn poll_budget(&self) -> u32 {
        match self {
            Challenge::Image { .. } => IMAGE_POLL_BUDGET,
            Challenge::Widget { .. } => WIDGET_POLL_BUDGET,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Challenge::Image { .. } => "image",
            Challenge::Widget { method, .. } => method,
        }
    }
}

enum Reply<'a> {
    Ok(&'a str),
    NotReady,
    Error(&'a str),
}

fn parse_reply(text: &str) -> Reply<'_> {
    if let Some(rest) = text.strip_prefix("OK|") {
        Reply::Ok(rest)
    } else if text.trim() == NOT_READY {
        Reply::NotReady
    } else {
        Reply::Error(text)
    }
}

/// Client for the asynchronous solving service.
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
}

impl ServiceClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            poll_interval,
        }
    }

    /// Submit `challenge` and poll until a solution, a terminal error, or
    /// the poll budget runs out. `attempt` is updated in place: job id on
    /// acceptance, one poll count per retrieval call, terminal outcome at
    /// the end.
    ///
    /// `None` covers rejection, terminal poll errors, timeouts, and
    /// transport failures alike; the distinction lives in `attempt` and
    /// the log.
    pub async fn submit_and_poll(
        &self,
        attempt: &mut SolveAttempt,
        challenge: Challenge,
    ) -> Option<String> {
        let label = challenge.label();
        let budget = challenge.poll_budget();

        let job_id = match self.submit(challenge).await {
            Ok(id) => id,
            Err(reason) => {
                warn!(challenge = label, %reason, "service.submit.rejected");
                attempt.outcome = AttemptOutcome::Failed(reason);
                return None;
            }
        };
        info!(challenge = label, job_id = %job_id, "service.submit.accepted");
        attempt.job_id = Some(job_id.clone());

        for _ in 0..budget {
            sleep(self.poll_interval).await;
            attempt.polls += 1;

            let text = match self.fetch_status(&job_id).await {
                Ok(text) => text,
                Err(reason) => {
                    warn!(job_id = %job_id, %reason, "service.poll.transport_error");
                    attempt.outcome = AttemptOutcome::Failed(reason);
                    return None;
                }
            };

            match parse_reply(&text) {
                Reply::Ok(solution) => {
                    info!(job_id = %job_id, polls = attempt.polls, "service.poll.solved");
                    attempt.outcome = AttemptOutcome::Solved(solution.to_string());
                    return Some(solution.to_string());
                }
                Reply::NotReady => {
                    debug!(job_id = %job_id, polls = attempt.polls, "service.poll.not_ready");
                }
                Reply::Error(code) => {
                    warn!(job_id = %job_id, code = %code, "service.poll.error");
                    attempt.outcome = AttemptOutcome::Failed(code.to_string());
                    return None;
                }
            }
        }

        warn!(polls = attempt.polls, "service.poll.budget_exhausted");
        attempt.outcome = AttemptOutcome::Failed("poll budget exhausted".to_string());
        None
    }

    async fn submit(&self, challenge: Challenge) -> Result<String, String> {
        let url = format!("{}/in.php", self.base_url);
        let response = match challenge {
            Challenge::Image { png } => {
                let form = multipart::Form::new()
                    .text("key", self.api_key.clone())
                    .part(
                        "file",
                        multipart::Part::bytes(png).file_name("captcha.png"),
                    );
                self.http.post(&url).multipart(form).send().await
            }
            Challenge::Widget {
                method,
                key_param,
                site_key,
                page_url,
            } => {
                let params = [
                    ("key", self.api_key.as_str()),
                    ("method", method),
                    (key_param, site_key.as_str()),
                    ("pageurl", page_url.as_str()),
                ];
                self.http.post(&url).form(&params).send().await
            }
        };

        let text = response
            .map_err(|e| format!("submission failed: {e}"))?
            .text()
            .await
            .map_err(|e| format!("submission body unreadable: {e}"))?;

        match parse_reply(&text) {
            Reply::Ok(id) => Ok(id.to_string()),
            _ => Err(text),
        }
    }

    async fn fetch_status(&self, job_id: &str) -> Result<String, String> {
        let url = format!("{}/res.php", self.base_url);
        self.http
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("action", "get"),
                ("id", job_id),
            ])
            .send()
            .await
            .map_err(|e| format!("poll failed: {e}"))?
            .text()
            .await
            .map_err(|e| format!("poll body unreadable: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_parsing_covers_all_shapes() {
        assert!(matches!(parse_reply("OK|998877"), Reply::Ok("998877")));
        assert!(matches!(parse_reply("OK|a1b2c3"), Reply::Ok("a1b2c3")));
        assert!(matches!(parse_reply("CAPCHA_NOT_READY"), Reply::NotReady));
        assert!(matches!(
            parse_reply("ERROR_WRONG_USER_KEY"),
            Reply::Error("ERROR_WRONG_USER_KEY")
        ));
    }

    #[test]
    fn widget_budget_doubles_image_budget() {
        assert_eq!(Challenge::image(vec![]).poll_budget(), 30);
        assert_eq!(
            Challenge::recaptcha("k".into(), "u".into()).poll_budget(),
            60
        );
        assert_eq!(Challenge::hcaptcha("k".into(), "u".into()).poll_budget(), 60);
    }

    #[test]
    fn widget_methods_carry_their_key_param() {
        match Challenge::recaptcha("k".into(), "u".into()) {
            Challenge::Widget {
                method, key_param, ..
            } => {
                assert_eq!(method, "userrecaptcha");
                assert_eq!(key_param, "googlekey");
            }
            _ => unreachable!(),
        }
        match Challenge::hcaptcha("k".into(), "u".into()) {
            Challenge::Widget {
                method, key_param, ..
            } => {
                assert_eq!(method, "hcaptcha");
                assert_eq!(key_param, "sitekey");
            }
            _ => unreachable!(),
        }
    }
}
