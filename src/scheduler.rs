//! # Refresh Scheduler
//!
//! Drives the fetch → build → publish cycle.
//!
//! - The first cycle runs as soon as [`Refresher::run`] is called.
//! - The next cycle starts `interval` after the previous one *completed*, so
//!   a slow upstream pushes the schedule back instead of stacking cycles.
//! - A failed cycle is logged and leaves the published document untouched.
//! - [`Refresher::run_cycle`] is single-flight; overlapping calls are refused.
//! - [`Refresher::run`] stops at the next cancellation point once the shutdown
//!   channel flips to `true`.
use crate::error::RefreshError;
use crate::kml::DocumentBuilder;
use crate::source::NodeSource;
use crate::store::DocumentStore;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Running,
}

/// Summary of a successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub placemarks: usize,
    pub generation: u64,
}

pub struct Refresher<S> {
    source: S,
    builder: DocumentBuilder,
    store: Arc<DocumentStore>,
    interval: Duration,
    output_path: Option<PathBuf>,
    running: AtomicBool,
}

/// Clears the in-flight flag even if the cycle future is dropped midway.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<S: NodeSource> Refresher<S> {
    pub fn new(source: S, store: Arc<DocumentStore>, interval: Duration) -> Self {
        Refresher {
            source,
            builder: DocumentBuilder::default(),
            store,
            interval,
            output_path: None,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_builder(mut self, builder: DocumentBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Also write every published document to `path`.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> CycleState {
        if self.running.load(Ordering::Acquire) {
            CycleState::Running
        } else {
            CycleState::Idle
        }
    }

    /// Runs one fetch → build → publish cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport, RefreshError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(RefreshError::AlreadyRunning);
        }
        let _in_flight = InFlight(&self.running);

        log::info!("Fetching node data...");
        let records = self.source.fetch().await?;
        log::info!("Got {} entries, building KML...", records.len());

        let now = Utc::now();
        let document = self.builder.build(&records, now);
        let snapshot = self.store.replace(document, now);
        log::info!(
            "Published KML generation {} with {} placemarks",
            snapshot.generation,
            snapshot.document.len()
        );

        if let Some(path) = &self.output_path {
            match tokio::fs::write(path, snapshot.kml.as_bytes()).await {
                Ok(()) => log::info!("KML written to {}", path.display()),
                Err(e) => log::warn!("Failed to write KML to {}: {}", path.display(), e),
            }
        }

        Ok(CycleReport {
            fetched: records.len(),
            placemarks: snapshot.document.len(),
            generation: snapshot.generation,
        })
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.run_cycle().await {
                log::error!("Refresh failed: {}", e);
            }

            if wait_or_shutdown(self.interval, &mut shutdown).await {
                break;
            }
        }
        log::info!("Refresh loop stopped");
    }
}

/// Sleeps for `interval`. Returns `true` if shutdown was requested first.
/// A dropped sender counts as shutdown.
async fn wait_or_shutdown(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}
