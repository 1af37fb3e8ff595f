//! Classifying backend errors.
//!
//! OCR servers and PDF tools don't give us structured errors for "that page
//! doesn't exist" or "slow down". So we match on the message text. This is a
//! loose heuristic, and it lives here so that the patterns can be tested
//! against real messages without involving any retry logic.

use std::sync::LazyLock;

use regex::Regex;
use reqwest::StatusCode;

use super::BackendError;

/// What a backend error means for the page loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSignal {
    /// We asked for a page past the end of the document.
    EndOfDocument,
    /// The server wants us to slow down.
    RateLimited,
    /// Anything else. The page is skipped.
    Other,
}

/// Messages meaning "there is no such page".
///
/// The last pattern matches Poppler's `Wrong page range given: the first page
/// (5) can not be after the last page (4).`
static END_OF_DOCUMENT_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?is)page.*(not found|invalid|out of range)",
        r"(?is)(not found|invalid|out of range).*page",
        r"(?is)index.*range",
        r"(?is)range.*index",
        r"(?i)wrong page range",
        r"(?is)first page.*after the last page",
    ]
    .into_iter()
    .map(|re| Regex::new(re).expect("failed to compile regex"))
    .collect()
});

/// Messages meaning "too many requests".
static RATE_LIMITED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b429\b|rate[ _-]?limit|too many requests|quota")
        .expect("failed to compile regex")
});

/// HTTP statuses that mean "too many requests".
fn is_rate_limit_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
}

/// Classify a message (and optional status) from a backend.
///
/// End-of-document takes priority, because a page-range error is final no
/// matter what else the message says.
pub fn classify_message(status: Option<StatusCode>, message: &str) -> ErrorSignal {
    if END_OF_DOCUMENT_REGEXES.iter().any(|re| re.is_match(message)) {
        ErrorSignal::EndOfDocument
    } else if status.is_some_and(is_rate_limit_status) || RATE_LIMITED_REGEX.is_match(message)
    {
        ErrorSignal::RateLimited
    } else {
        ErrorSignal::Other
    }
}

/// Classify a [`BackendError`].
pub fn classify_error(err: &BackendError) -> ErrorSignal {
    classify_message(err.status(), &err.message())
}
