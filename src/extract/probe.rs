//! The page-probing state machine.
//!
//! We don't know how many pages a document has, so we ask for page 1, 2, 3...
//! until the backend tells us the page doesn't exist. This module decides what
//! happens after each attempt. It does no I/O and never sleeps, which lets us
//! test the retry rules without a backend. The caller performs the requests
//! and any sleeping, based on the [`Transition`]s returned here.

use crate::{backend::ErrorSignal, prelude::*};

/// Where we are in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    /// About to make the first attempt on `page`.
    Probing { page: u32 },
    /// `page` was rate limited `attempt` times, and will be tried again after
    /// a backoff.
    Backoff { page: u32, attempt: u32 },
    /// No more requests.
    Done,
}

/// The result of one attempt on one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// The backend returned text, which may be blank.
    Text(String),
    /// The backend failed.
    Failed(ErrorSignal),
}

/// What happened as a result of recording a [`PageOutcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The page was read. `kept` is false if it was blank.
    PageRead { page: u32, kept: bool },
    /// The page failed with an ordinary error and was skipped.
    Skipped { page: u32 },
    /// The page was rate limited and should be retried after backing off.
    Backoff { page: u32, attempt: u32 },
    /// The page was rate limited too many times and was skipped.
    GaveUp { page: u32, attempts: u32 },
    /// The page doesn't exist, so the previous page was the last one.
    EndOfDocument { page: u32 },
}

/// Why probing stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The backend reported a page past the end.
    EndOfDocument,
    /// We reached the configured page limit.
    PageLimit,
    /// Too many pages in a row failed.
    FailureLimit,
}

/// Everything collected while probing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Non-blank page texts, trimmed, in page order.
    pub pages: Vec<String>,
    /// Pages that were skipped because of errors.
    pub skipped_pages: Vec<u32>,
    /// How many pages came back blank.
    pub blank_pages: usize,
    /// How many pages exist, as far as we know.
    pub pages_probed: u32,
    /// Why we stopped.
    pub stop_reason: StopReason,
}

/// Tracks progress through one document.
#[derive(Debug)]
pub struct PageProber {
    state: ProbeState,
    max_retries: u32,
    max_pages: Option<u32>,
    failure_limit: Option<u32>,
    consecutive_failures: u32,
    pages: Vec<String>,
    skipped_pages: Vec<u32>,
    blank_pages: usize,
    stop: Option<(StopReason, u32)>,
}

impl PageProber {
    /// Start at page 1. A rate-limited page is attempted at most `max_retries`
    /// times. If `max_pages` is set, we stop after that page.
    pub fn new(max_retries: u32, max_pages: Option<u32>) -> Self {
        Self {
            state: ProbeState::Probing { page: 1 },
            max_retries: max_retries.max(1),
            max_pages,
            failure_limit: None,
            consecutive_failures: 0,
            pages: vec![],
            skipped_pages: vec![],
            blank_pages: 0,
            stop: None,
        }
    }

    /// Give up on the document after `limit` pages in a row have been
    /// skipped.
    pub fn with_failure_limit(mut self, limit: u32) -> Self {
        self.failure_limit = Some(limit.max(1));
        self
    }

    /// Our current state.
    pub fn state(&self) -> ProbeState {
        self.state
    }

    /// The page to request next, or `None` if we're done.
    pub fn current_page(&self) -> Option<u32> {
        match self.state {
            ProbeState::Probing { page } | ProbeState::Backoff { page, .. } => Some(page),
            ProbeState::Done => None,
        }
    }

    /// Record the outcome of an attempt on [`Self::current_page`].
    pub fn record(&mut self, outcome: PageOutcome) -> Result<Transition> {
        let (page, attempt) = match self.state {
            ProbeState::Probing { page } => (page, 0),
            ProbeState::Backoff { page, attempt } => (page, attempt),
            ProbeState::Done => bail!("page outcome recorded after probing finished"),
        };

        let transition = match outcome {
            PageOutcome::Text(text) => {
                let text = text.trim();
                let kept = !text.is_empty();
                if kept {
                    self.pages.push(text.to_owned());
                } else {
                    self.blank_pages += 1;
                }
                self.consecutive_failures = 0;
                self.advance(page);
                Transition::PageRead { page, kept }
            }
            PageOutcome::Failed(ErrorSignal::EndOfDocument) => {
                self.state = ProbeState::Done;
                self.stop = Some((StopReason::EndOfDocument, page - 1));
                Transition::EndOfDocument { page }
            }
            PageOutcome::Failed(ErrorSignal::RateLimited) => {
                let attempt = attempt + 1;
                if attempt >= self.max_retries {
                    self.skip(page);
                    Transition::GaveUp {
                        page,
                        attempts: attempt,
                    }
                } else {
                    self.state = ProbeState::Backoff { page, attempt };
                    Transition::Backoff { page, attempt }
                }
            }
            PageOutcome::Failed(ErrorSignal::Other) => {
                self.skip(page);
                Transition::Skipped { page }
            }
        };
        Ok(transition)
    }

    /// Skip `page` after a failure, and stop if too many pages in a row have
    /// failed.
    fn skip(&mut self, page: u32) {
        self.skipped_pages.push(page);
        self.consecutive_failures += 1;
        if self
            .failure_limit
            .is_some_and(|limit| self.consecutive_failures >= limit)
        {
            self.state = ProbeState::Done;
            self.stop = Some((StopReason::FailureLimit, page));
        } else {
            self.advance(page);
        }
    }

    /// Move past `page`, unless it was the last page we're allowed to probe.
    fn advance(&mut self, page: u32) {
        if self.max_pages.is_some_and(|max| page >= max) {
            self.state = ProbeState::Done;
            self.stop = Some((StopReason::PageLimit, page));
        } else {
            self.state = ProbeState::Probing { page: page + 1 };
        }
    }

    /// Finish probing and return what we collected.
    pub fn finish(self) -> Result<ProbeResult> {
        let Some((stop_reason, pages_probed)) = self.stop else {
            bail!("probing finished before reaching the end of the document");
        };
        Ok(ProbeResult {
            pages: self.pages,
            skipped_pages: self.skipped_pages,
            blank_pages: self.blank_pages,
            pages_probed,
            stop_reason,
        })
    }
}
