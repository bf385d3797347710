//! Signal sources feeding the evaluator.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::types::SignalSnapshot;

/// Outcome of a snapshot fetch. Unavailability is data, not an error: the
/// evaluator maps it to an `Unknown` reading.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalFetch {
    Snapshot(SignalSnapshot),
    Unavailable(String),
}

/// Supplies the latest snapshot for an entity.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn fetch_snapshot(&self, entity_id: &str) -> SignalFetch;
}

/// Reads `<dir>/<entity_id>.json` snapshots written by platform collectors.
#[derive(Debug, Clone)]
pub struct FileSignalSource {
    dir: PathBuf,
}

impl FileSignalSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, entity_id: &str) -> Option<PathBuf> {
        let safe = !entity_id.is_empty()
            && entity_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
            && !entity_id.starts_with('.');
        safe.then(|| self.dir.join(format!("{entity_id}.json")))
    }
}

#[async_trait]
impl SignalSource for FileSignalSource {
    async fn fetch_snapshot(&self, entity_id: &str) -> SignalFetch {
        let Some(path) = self.path_for(entity_id) else {
            return SignalFetch::Unavailable(format!("unsupported entity id '{entity_id}'"));
        };
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return SignalFetch::Unavailable(format!("no snapshot at {}", path.display()));
            }
            Err(e) => {
                return SignalFetch::Unavailable(format!("cannot read {}: {e}", path.display()));
            }
        };
        match serde_json::from_slice::<SignalSnapshot>(&bytes) {
            Ok(snapshot) => {
                debug!(entity = entity_id, captured_at = snapshot.captured_at, "snapshot loaded");
                SignalFetch::Snapshot(snapshot)
            }
            Err(e) => SignalFetch::Unavailable(format!("malformed snapshot {}: {e}", path.display())),
        }
    }
}
