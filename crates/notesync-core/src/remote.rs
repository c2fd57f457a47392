//! Remote note store seam. The engine only ever talks to this trait;
//! the HTTP client lives in the binary crate and [`InMemoryRemote`]
//! backs the tests.

use crate::note::NoteRecord;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote request failed: {0}")]
    Request(String),
    #[error("remote returned malformed data: {0}")]
    Malformed(String),
}

/// Wire shape of one note write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteWrite {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "systemTags", default)]
    pub system_tags: Vec<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(rename = "modificationDate", skip_serializing_if = "Option::is_none")]
    pub modification_date: Option<f64>,
    #[serde(rename = "creationDate", skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<f64>,
}

impl RemoteWrite {
    /// Build a write from a record, overriding its tags with the
    /// effective tag set computed by the push planner.
    pub fn from_record(note: &NoteRecord, tags: Vec<String>) -> Self {
        RemoteWrite {
            content: note.content.clone(),
            tags,
            system_tags: note.system_tags.clone(),
            deleted: note.deleted,
            modification_date: note.modification_time,
            creation_date: None,
        }
    }
}

/// Outcome of one note inside a batch write.
#[derive(Debug)]
pub struct BatchItemResult {
    pub id: String,
    pub result: Result<(), RemoteError>,
}

/// The full remote interface the engine needs: a one-shot index fetch
/// and a batched upsert with per-item outcomes.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch every note, trashed ones included.
    async fn fetch_all(&self) -> Result<Vec<NoteRecord>, RemoteError>;

    /// Create or overwrite each note in `batch` under its id. The
    /// top-level error is reserved for failures that sink the whole
    /// batch; everything else comes back per item.
    async fn apply_batch(
        &self,
        batch: &BTreeMap<String, RemoteWrite>,
    ) -> Result<Vec<BatchItemResult>, RemoteError>;
}

#[async_trait]
impl<R: RemoteStore> RemoteStore for Arc<R> {
    async fn fetch_all(&self) -> Result<Vec<NoteRecord>, RemoteError> {
        self.as_ref().fetch_all().await
    }

    async fn apply_batch(
        &self,
        batch: &BTreeMap<String, RemoteWrite>,
    ) -> Result<Vec<BatchItemResult>, RemoteError> {
        self.as_ref().apply_batch(batch).await
    }
}

/// In-memory remote store for tests.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    notes: RwLock<BTreeMap<String, RemoteWrite>>,
    /// Ids whose writes fail with a simulated request error.
    fail_ids: RwLock<HashSet<String>>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, id: &str, note: RemoteWrite) {
        self.notes.write().unwrap().insert(id.to_string(), note);
    }

    pub fn fail_writes_for(&self, id: &str) {
        self.fail_ids.write().unwrap().insert(id.to_string());
    }

    pub fn get(&self, id: &str) -> Option<RemoteWrite> {
        self.notes.read().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.notes.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.read().unwrap().is_empty()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn fetch_all(&self) -> Result<Vec<NoteRecord>, RemoteError> {
        let notes = self.notes.read().unwrap();
        Ok(notes
            .iter()
            .map(|(id, w)| NoteRecord {
                id: Some(id.clone()),
                content: w.content.clone(),
                tags: w.tags.clone(),
                system_tags: w.system_tags.clone(),
                deleted: w.deleted,
                modification_time: w.modification_date,
            })
            .collect())
    }

    async fn apply_batch(
        &self,
        batch: &BTreeMap<String, RemoteWrite>,
    ) -> Result<Vec<BatchItemResult>, RemoteError> {
        let fail_ids = self.fail_ids.read().unwrap().clone();
        let mut notes = self.notes.write().unwrap();

        Ok(batch
            .iter()
            .map(|(id, write)| {
                let result = if fail_ids.contains(id) {
                    Err(RemoteError::Request(format!("simulated failure for {id}")))
                } else {
                    notes.insert(id.clone(), write.clone());
                    Ok(())
                };
                BatchItemResult {
                    id: id.clone(),
                    result,
                }
            })
            .collect())
    }
}
