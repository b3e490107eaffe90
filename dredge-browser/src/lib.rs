//! Browser session capability interface and its WebDriver implementation.
//!
//! The scraping core never talks to `fantoccini` directly; it consumes the
//! [`Session`] trait defined here, which models the handful of driver
//! operations the tool needs (navigate, locate, click, type, screenshot,
//! script execution, source/text reads). Element absence is an explicit
//! [`Lookup::NotFound`] value rather than an error, so callers are forced
//! to handle it.
//!
//! [`locate::first_match`] implements the shared "first matching selector
//! from an ordered candidate list" idiom used by CAPTCHA detection, input
//! field lookup, and submit-control lookup.

pub mod locate;
pub mod scripted;
pub mod session;
pub mod webdriver;

pub use locate::{first_match, first_match_waiting, Match};
pub use session::{Lookup, Selector, Session, SessionError, SessionResult};
pub use webdriver::WebDriverSession;
