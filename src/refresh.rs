//!
//! keyward key cache refresher
//! ---------------------------
//! Background maintenance of the resolved key text. Each pass walks every
//! declared user's entries: literal entries copy their text through, remote
//! entries are fetched over HTTP with a bounded per-request timeout. A pass
//! works on a private clone of the users table and installs it wholesale at
//! the end, so readers see either the whole previous pass or the whole new
//! one, never a mix.
//!
//! Failure policy: a fetch that errors, times out or returns a non-2xx
//! status leaves the previous resolved value in place for that entry. The
//! cache degrades to last-known-good, not to empty.
//!
//! The run loop is a plain periodic poll. No jitter, no backoff; a failing
//! upstream is retried at the next tick like any other entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::directory::{Directory, KeySource, User};
use crate::error::{Error, Result};
use crate::metrics::Metrics;

pub struct Refresher {
    directory: Arc<Directory>,
    metrics: Arc<Metrics>,
    client: reqwest::Client,
    /// Cancellation signal: the sender side dropping ends the run loop and
    /// abandons any in-progress pass without installing it.
    cancel: watch::Receiver<()>,
}

impl Refresher {
    pub fn new(
        directory: Arc<Directory>,
        metrics: Arc<Metrics>,
        fetch_timeout: Duration,
        cancel: watch::Receiver<()>,
    ) -> anyhow::Result<Refresher> {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()?;
        Ok(Refresher { directory, metrics, client, cancel })
    }

    /// Run one refresh pass to completion and install the result.
    ///
    /// Called once synchronously at startup before the server accepts
    /// requests, then from the run loop on every tick.
    pub async fn refresh_once(&self) {
        let started = Instant::now();
        let mut table: HashMap<String, User> = self.directory.snapshot().as_ref().clone();
        let mut fetched = 0usize;
        let mut failed = 0usize;

        for (username, user) in table.iter_mut() {
            for entry in user.entries.iter_mut() {
                if self.cancel.has_changed().is_err() {
                    info!("refresh cancelled, abandoning pass");
                    return;
                }
                match &entry.source {
                    KeySource::Literal(text) => entry.resolved = text.clone(),
                    KeySource::Remote(url) => match self.fetch(url).await {
                        Ok(body) => {
                            entry.resolved = body;
                            fetched += 1;
                        }
                        Err(err) => {
                            failed += 1;
                            self.metrics.key_fetch_failures.inc();
                            error!(user = %username, %err, "keeping previous cached value");
                        }
                    },
                }
            }
        }

        self.directory.install(table);
        debug!(
            remote_fetched = fetched,
            failed = failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "refresh pass complete"
        );
    }

    /// Periodic refresh until cancelled. The startup pass has already run,
    /// so the interval's immediate first tick is skipped. A zero period
    /// degrades to a tight poll rather than stopping refresh.
    pub async fn run(mut self, period: Duration) {
        // tokio's interval panics on a zero period.
        let mut ticker = interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh_once().await,
                _ = self.cancel.changed() => {
                    info!("refresher shutting down");
                    break;
                }
            }
        }
    }

    /// Fetch one remote key source, returning the body with surrounding
    /// whitespace trimmed.
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| Error::RemoteFetch { url: url.to_string(), reason: err.to_string() })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::RemoteFetch {
                url: url.to_string(),
                reason: format!("status not successful: {status}"),
            });
        }
        let body = resp
            .text()
            .await
            .map_err(|err| Error::RemoteFetch { url: url.to_string(), reason: err.to_string() })?;
        Ok(body.trim().to_string())
    }
}
