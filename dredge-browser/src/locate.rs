//! Priority-ordered element lookup.
//!
//! Detection, CAPTCHA input-field lookup, and submit-control lookup all
//! share the same shape: walk an ordered candidate list and take the first
//! selector that resolves to a present element. Order encodes priority,
//! not exhaustiveness.

use crate::session::{Lookup, Selector, Session, SessionResult};
use std::time::Duration;
use tracing::debug;

/// A successful candidate-list lookup: which selector hit, and its element.
#[derive(Debug, Clone)]
pub struct Match<E> {
    pub selector: Selector,
    pub element: E,
}

/// Return the first candidate that resolves to a present element.
///
/// Per-candidate command errors are treated like absence and the walk
/// continues; fatal session errors propagate.
pub async fn first_match<S>(
    session: &S,
    candidates: &[Selector],
) -> SessionResult<Option<Match<S::Element>>>
where
    S: Session + ?Sized,
{
    for selector in candidates {
        match session.find_element(selector).await {
            Ok(Lookup::Found(element)) => {
                debug!(selector = %selector, "locate.hit");
                return Ok(Some(Match {
                    selector: selector.clone(),
                    element,
                }));
            }
            Ok(Lookup::NotFound) => continue,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!(selector = %selector, error = %e, "locate.candidate_error");
                continue;
            }
        }
    }
    Ok(None)
}

/// Like [`first_match`], but each candidate gets an independent bounded
/// wait instead of a single immediate probe.
pub async fn first_match_waiting<S>(
    session: &S,
    candidates: &[Selector],
    per_candidate_timeout: Duration,
) -> SessionResult<Option<Match<S::Element>>>
where
    S: Session + ?Sized,
{
    for selector in candidates {
        match session.wait_for_element(selector, per_candidate_timeout).await {
            Ok(Lookup::Found(element)) => {
                debug!(selector = %selector, "locate.hit");
                return Ok(Some(Match {
                    selector: selector.clone(),
                    element,
                }));
            }
            Ok(Lookup::NotFound) => continue,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                debug!(selector = %selector, error = %e, "locate.candidate_error");
                continue;
            }
        }
    }
    Ok(None)
}
