//! Acquisition collaborators.
//!
//! The scrapers themselves stay outside warmcache. A resource is wired to
//! one of these adapters, which reach the scraper over a narrow channel:
//!
//! - [`HttpJsonAcquirer`]: GET a URL that answers with the JSON payload
//! - [`CommandAcquirer`]: run a program that prints the JSON payload
//!
//! [`InstrumentedAcquirer`] wraps either one to record acquisition metrics.

pub mod command;
pub mod http;
pub mod instrumented;

pub use command::CommandAcquirer;
pub use http::HttpJsonAcquirer;
pub use instrumented::InstrumentedAcquirer;

use crate::constants::MAX_ERROR_EXCERPT_BYTES;

/// Trim collaborator output for inclusion in an error message.
pub(crate) fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.len() <= MAX_ERROR_EXCERPT_BYTES {
        return text.to_string();
    }
    let mut end = MAX_ERROR_EXCERPT_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
