//! Request pacing for a shared per-key OCR quota.
//!
//! Worker processes never talk to each other. Instead, each one spaces out its
//! requests, and adds a small worker-specific offset to every backoff so that
//! several workers throttled at the same moment don't all retry in lockstep.

use std::{fmt, time::Duration};

use clap::Args;

use crate::prelude::*;

/// Identifies one independently-run worker process. Used for log attribution
/// and jitter only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId(String);

impl WorkerId {
    /// Create a new worker ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A stable value in `0..10` derived from the worker ID.
    ///
    /// This uses 64-bit FNV-1a, so the same ID gets the same offset on every
    /// run and every platform.
    pub fn jitter_slot(&self) -> u32 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in self.0.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        (hash % 10) as u32
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rate-limit options, as passed on the command line.
#[derive(Args, Clone, Debug)]
pub struct ThrottleOpts {
    /// Minimum delay between page requests, in seconds.
    #[clap(long, default_value = "0.4")]
    pub min_delay: f64,

    /// Maximum random jitter added to the delay between page requests, in
    /// seconds.
    #[clap(long, default_value = "0.1")]
    pub page_jitter: f64,

    /// Maximum number of attempts for a page that keeps getting rate limited.
    /// After this many attempts, the page is skipped.
    #[clap(long, default_value = "5")]
    pub max_retries: u32,

    /// Delay between documents, in seconds. A small worker-specific offset is
    /// added.
    #[clap(long, default_value = "0.2")]
    pub file_delay: f64,

    /// Stop probing a document after this many pages. By default, we keep
    /// going until the backend reports that the page does not exist.
    #[clap(long)]
    pub max_pages: Option<u32>,

    /// Give up on a document after this many pages in a row have failed.
    #[clap(long, default_value = "10")]
    pub max_consecutive_failures: u32,
}

impl ThrottleOpts {
    /// Validate our options and convert them to a [`ThrottleConfig`].
    pub fn to_config(&self) -> Result<ThrottleConfig> {
        let secs = |name: &str, value: f64| -> Result<Duration> {
            Duration::try_from_secs_f64(value)
                .with_context(|| format!("invalid --{name}: {value}"))
        };
        if self.max_retries == 0 {
            bail!("--max-retries must be at least 1");
        }
        if self.max_pages == Some(0) {
            bail!("--max-pages must be at least 1");
        }
        if self.max_consecutive_failures == 0 {
            bail!("--max-consecutive-failures must be at least 1");
        }
        Ok(ThrottleConfig {
            min_delay: secs("min-delay", self.min_delay)?,
            page_jitter: secs("page-jitter", self.page_jitter)?,
            max_retries: self.max_retries,
            backoff_base: Duration::from_secs(2),
            worker_jitter_step: Duration::from_millis(100),
            file_delay: secs("file-delay", self.file_delay)?,
            file_jitter_step: Duration::from_millis(20),
            max_pages: self.max_pages,
            max_consecutive_failures: self.max_consecutive_failures,
        })
    }
}

/// Pacing and retry settings for the extractor.
#[derive(Clone, Debug, PartialEq)]
pub struct ThrottleConfig {
    /// Minimum delay before each request for page 2 and later.
    pub min_delay: Duration,
    /// Upper bound of the uniform jitter added to `min_delay`.
    pub page_jitter: Duration,
    /// Attempts allowed per page while rate limited.
    pub max_retries: u32,
    /// Backoff before retry `n` is `backoff_base ^ n` seconds, so this is
    /// interpreted as a whole number of seconds.
    pub backoff_base: Duration,
    /// Backoff offset per worker jitter slot.
    pub worker_jitter_step: Duration,
    /// Delay between documents.
    pub file_delay: Duration,
    /// Delay offset per worker jitter slot between documents.
    pub file_jitter_step: Duration,
    /// Optional cap on pages probed per document.
    pub max_pages: Option<u32>,
    /// Pages in a row that may fail before we give up on a document.
    pub max_consecutive_failures: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(400),
            page_jitter: Duration::from_millis(100),
            max_retries: 5,
            backoff_base: Duration::from_secs(2),
            worker_jitter_step: Duration::from_millis(100),
            file_delay: Duration::from_millis(200),
            file_jitter_step: Duration::from_millis(20),
            max_pages: None,
            max_consecutive_failures: 10,
        }
    }
}

impl fmt::Display for ThrottleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}s between requests, max {} retries per page",
            self.min_delay.as_secs_f64(),
            self.max_retries
        )
    }
}

/// Computes the actual delays for one worker.
#[derive(Debug)]
pub struct Pacer {
    config: ThrottleConfig,
    jitter_slot: u32,
    rng: fastrand::Rng,
}

impl Pacer {
    /// Create a pacer with a randomly seeded generator.
    pub fn new(config: ThrottleConfig, worker: &WorkerId) -> Self {
        Self::with_rng(config, worker, fastrand::Rng::new())
    }

    /// Create a pacer with a specific generator, for reproducible tests.
    pub fn with_rng(config: ThrottleConfig, worker: &WorkerId, rng: fastrand::Rng) -> Self {
        Self {
            config,
            jitter_slot: worker.jitter_slot(),
            rng,
        }
    }

    /// Our configuration.
    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Delay before a request for any page after the first.
    pub fn page_delay(&mut self) -> Duration {
        self.config.min_delay + self.config.page_jitter.mul_f64(self.rng.f64())
    }

    /// Delay before retrying a rate-limited page. `attempt` counts the
    /// rate-limited attempts so far, starting at 1.
    pub fn backoff_delay(&mut self, attempt: u32) -> Duration {
        let base = self.config.backoff_base.as_secs_f64().powi(attempt as i32);
        Duration::from_secs_f64(base)
            + self.config.worker_jitter_step * self.jitter_slot
            + Duration::from_secs_f64(self.rng.f64())
    }

    /// Delay between two documents.
    pub fn file_delay(&self) -> Duration {
        self.config.file_delay + self.config.file_jitter_step * self.jitter_slot
    }
}
