//! Processed markers
//!
//! The provider's `processed_at` column is the primary marker store. When
//! that write fails the id goes into a local JSON file instead, and ids in
//! that file are dropped from later fetches. Provider calls share the
//! poller's call timeout; a timed-out marker call counts as a failed one.

use super::{bounded, ComplianceResultProvider, PollerConfig};
use leadflow_common::{ComplianceCheckRecord, Error, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// File-backed set of processed result ids
#[derive(Debug)]
pub struct LocalMarkerFile {
    path: PathBuf,
    ids: Mutex<BTreeSet<String>>,
}

impl LocalMarkerFile {
    /// Open the marker file; a missing file is an empty set.
    ///
    /// An unreadable or corrupt file is logged and treated as empty so the
    /// poller still starts; the provider column remains authoritative.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let ids = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<BTreeSet<String>>(&content) {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Marker file is corrupt, starting empty");
                    BTreeSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Marker file unreadable, starting empty");
                BTreeSet::new()
            }
        };
        debug!(path = %path.display(), count = ids.len(), "Loaded local processed markers");

        Self {
            path,
            ids: Mutex::new(ids),
        }
    }

    pub async fn contains(&self, result_id: &str) -> bool {
        self.ids.lock().await.contains(result_id)
    }

    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    /// Add an id and persist the whole set (temp file + rename)
    pub async fn insert(&self, result_id: &str) -> Result<()> {
        let mut ids = self.ids.lock().await;
        if !ids.insert(result_id.to_string()) {
            return Ok(());
        }

        let json = serde_json::to_vec_pretty(&*ids)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let written = async {
            tokio::fs::write(&tmp, &json).await?;
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(e) = written {
            // Keep memory and disk in agreement
            ids.remove(result_id);
            return Err(Error::Io(e));
        }
        Ok(())
    }
}

/// Where a marker ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkedIn {
    Provider,
    LocalFile,
}

/// Marker store: provider column first, local file as fallback
pub struct ProcessedMarkers {
    provider: Arc<dyn ComplianceResultProvider>,
    local: LocalMarkerFile,
    call_timeout: Duration,
}

impl ProcessedMarkers {
    pub fn new(provider: Arc<dyn ComplianceResultProvider>, local: LocalMarkerFile) -> Self {
        Self {
            provider,
            local,
            call_timeout: PollerConfig::default().call_timeout,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn local(&self) -> &LocalMarkerFile {
        &self.local
    }

    /// True when either store has the id.
    ///
    /// A provider error counts as "not processed": re-applying a status is
    /// harmless, skipping one is not.
    pub async fn is_processed(&self, result_id: &str) -> bool {
        if self.local.contains(result_id).await {
            return true;
        }
        let checked = bounded("is_processed", self.call_timeout, self.provider.is_processed(result_id)).await;
        match checked {
            Ok(processed) => processed,
            Err(e) => {
                warn!(result_id, error = %e, "Could not check processed marker");
                false
            }
        }
    }

    /// Record a result as processed
    pub async fn mark(&self, result_id: &str) -> Result<MarkedIn> {
        let marked = bounded("mark_processed", self.call_timeout, self.provider.mark_processed(result_id)).await;
        match marked {
            Ok(()) => Ok(MarkedIn::Provider),
            Err(e) => {
                warn!(result_id, error = %e, "Provider marker write failed, using local marker file");
                self.local.insert(result_id).await?;
                Ok(MarkedIn::LocalFile)
            }
        }
    }

    /// Drop results already recorded in the local file
    pub async fn drop_locally_marked(&self, results: Vec<ComplianceCheckRecord>) -> Vec<ComplianceCheckRecord> {
        let ids = self.local.ids.lock().await;
        if ids.is_empty() {
            return results;
        }
        let before = results.len();
        let kept: Vec<_> = results.into_iter().filter(|r| !ids.contains(&r.id)).collect();
        if kept.len() < before {
            debug!(dropped = before - kept.len(), "Skipped results marked in local file");
        }
        kept
    }
}
