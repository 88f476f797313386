//! Single-writer, multi-reader holder of the latest generated document.
//!
//! Readers get an `Arc` to a complete snapshot and never observe a
//! half-built document. Replacing the snapshot is one `watch::Sender::send`.
use crate::error::StoreError;
use crate::kml::GeoDocument;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// A published document together with its rendered KML.
#[derive(Debug)]
pub struct Snapshot {
    pub document: GeoDocument,
    pub kml: String,
    pub built_at: DateTime<Utc>,
    pub generation: u64,
}

pub struct DocumentStore {
    tx: watch::Sender<Option<Arc<Snapshot>>>,
    rx: watch::Receiver<Option<Arc<Snapshot>>>,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self { tx, rx }
    }

    /// Renders `document` and swaps it in. Returns the published snapshot.
    pub fn replace(&self, document: GeoDocument, built_at: DateTime<Utc>) -> Arc<Snapshot> {
        let kml = document.to_kml();
        let generation = self.generation() + 1;
        let snapshot = Arc::new(Snapshot {
            document,
            kml,
            built_at,
            generation,
        });
        // send_replace never fails, even with no live receivers
        self.tx.send_replace(Some(snapshot.clone()));
        snapshot
    }

    pub fn current(&self) -> Result<Arc<Snapshot>, StoreError> {
        self.rx.borrow().clone().ok_or(StoreError::NotYetAvailable)
    }

    /// Number of documents published so far.
    pub fn generation(&self) -> u64 {
        self.rx.borrow().as_ref().map_or(0, |s| s.generation)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.tx.subscribe()
    }
}
