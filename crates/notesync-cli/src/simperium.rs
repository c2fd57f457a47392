//! Simperium-backed [`RemoteStore`] implementation.
//!
//! The index endpoint pages with an opaque `mark` cursor;
//! `fetch_all` follows it until the server stops returning one.

use async_trait::async_trait;
use notesync_core::note::NoteRecord;
use notesync_core::remote::{BatchItemResult, RemoteError, RemoteStore, RemoteWrite};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::config::Config;

const TOKEN_HEADER: &str = "X-Simperium-Token";
const PAGE_LIMIT: usize = 100;

/// HTTP client for one Simperium note bucket.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct IndexPage {
    index: Vec<IndexEntry>,
    #[serde(default)]
    mark: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    id: String,
    d: NoteData,
}

#[derive(Debug, Deserialize)]
struct NoteData {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(rename = "systemTags", default)]
    system_tags: Vec<String>,
    #[serde(default)]
    deleted: bool,
    #[serde(rename = "modificationDate", default)]
    modification_date: Option<f64>,
}

impl HttpRemote {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("https://api.simperium.com/1/{}/note", config.app_id),
            token: config.token.clone(),
        }
    }

    async fn fetch_page(&self, mark: Option<&str>) -> Result<IndexPage, RemoteError> {
        let limit = PAGE_LIMIT.to_string();
        let mut request = self
            .client
            .get(format!("{}/index", self.base_url))
            .header(TOKEN_HEADER, &self.token)
            .query(&[("data", "true"), ("limit", limit.as_str())]);
        if let Some(mark) = mark {
            request = request.query(&[("mark", mark)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Request(e.to_string()))?;
        let response = response
            .error_for_status()
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| RemoteError::Malformed(e.to_string()))
    }

    async fn write_one(&self, id: &str, note: &RemoteWrite) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(format!("{}/i/{}", self.base_url, id))
            .header(TOKEN_HEADER, &self.token)
            .json(note)
            .send()
            .await
            .map_err(|e| RemoteError::Request(e.to_string()))?;

        response
            .error_for_status()
            .map(|_| ())
            .map_err(|e| RemoteError::Request(e.to_string()))
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn fetch_all(&self) -> Result<Vec<NoteRecord>, RemoteError> {
        let mut notes = Vec::new();
        let mut mark: Option<String> = None;

        loop {
            let page = self.fetch_page(mark.as_deref()).await?;
            tracing::debug!("Fetched index page with {} notes", page.index.len());

            for entry in page.index {
                notes.push(NoteRecord {
                    id: Some(entry.id),
                    content: entry.d.content,
                    tags: entry.d.tags,
                    system_tags: entry.d.system_tags,
                    deleted: entry.d.deleted,
                    modification_time: entry.d.modification_date,
                });
            }

            match page.mark {
                Some(next) => mark = Some(next),
                None => break,
            }
        }

        tracing::info!("Fetched {} notes from remote", notes.len());
        Ok(notes)
    }

    /// The API has no multi-note endpoint, so a batch is one POST per
    /// note with the outcome captured per item.
    async fn apply_batch(
        &self,
        batch: &BTreeMap<String, RemoteWrite>,
    ) -> Result<Vec<BatchItemResult>, RemoteError> {
        let mut results = Vec::with_capacity(batch.len());

        for (id, note) in batch {
            let result = self.write_one(id, note).await;
            results.push(BatchItemResult {
                id: id.clone(),
                result,
            });
        }

        Ok(results)
    }
}
