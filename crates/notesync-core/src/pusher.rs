//! Push direction: reconcile the remote store toward the local
//! corpus. Planning is pure; execution batches writes and keeps going
//! past per-item failures.

use crate::fs::FileSystem;
use crate::note::{self, NoteRecord};
use crate::remote::{RemoteStore, RemoteWrite};
use crate::scanner::{Corpus, LocalFile};

use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// Notes per remote batch.
pub const PUSH_BATCH_SIZE: usize = 50;

/// Local file with no remote counterpart. The identifier is minted at
/// execution time and written back into the file.
#[derive(Debug, Clone)]
pub struct PlannedCreate {
    pub path: String,
    pub write: RemoteWrite,
    pub note: NoteRecord,
}

/// Local file whose matched remote note needs overwriting.
#[derive(Debug, Clone)]
pub struct PlannedUpdate {
    pub path: String,
    pub id: String,
    pub write: RemoteWrite,
}

/// Classified output of one push planning pass.
#[derive(Debug, Default)]
pub struct PushPlan {
    pub creates: Vec<PlannedCreate>,
    /// Content differs; the local bytes win.
    pub content_updates: Vec<PlannedUpdate>,
    /// Content matches but the effective tag set differs.
    pub tag_updates: Vec<PlannedUpdate>,
    pub unchanged: Vec<String>,

    pub local_count: usize,
    pub remote_count: usize,
}

impl PushPlan {
    pub fn is_converged(&self) -> bool {
        self.creates.is_empty() && self.content_updates.is_empty() && self.tag_updates.is_empty()
    }
}

/// Bookkeeping for one push execution.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PushSummary {
    pub created: usize,
    pub updated: usize,
    pub retagged: usize,
    pub unchanged: usize,
    pub errors: usize,
}

/// The tag set a local file asserts: its directory tag when it has
/// one, otherwise the tags parsed from its trailer.
fn effective_tags(file: &LocalFile) -> Vec<String> {
    match &file.dir_tag {
        Some(tag) => vec![tag.clone()],
        None => file.note.tags.clone(),
    }
}

fn same_tag_set(a: &[String], b: &[String]) -> bool {
    let mut a: Vec<&String> = a.iter().collect();
    let mut b: Vec<&String> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}

/// Classify every non-trash local file against the remote set.
///
/// Matching mirrors the pull direction: embedded identifier first,
/// then byte-equal content, then title, each remote note claimable at
/// most once. Remote notes are scanned in id order so ties resolve the
/// same way on every run.
pub fn plan_push(remote: &[NoteRecord], corpus: &Corpus) -> PushPlan {
    let mut plan = PushPlan {
        local_count: corpus.active_count(),
        remote_count: remote.iter().filter(|n| !n.deleted).count(),
        ..Default::default()
    };

    let mut sorted: Vec<&NoteRecord> = remote.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let by_id: HashMap<&str, &NoteRecord> = sorted
        .iter()
        .filter_map(|n| n.id.as_deref().map(|id| (id, *n)))
        .collect();

    let mut matched_ids: HashSet<String> = HashSet::new();

    for file in corpus.files.values() {
        if file.is_trash {
            continue;
        }

        let found = find_remote(file, &sorted, &by_id, &matched_ids);
        match found {
            Some(remote_note) => {
                let id = remote_note.id.clone().unwrap_or_default();
                matched_ids.insert(id.clone());

                if remote_note.deleted {
                    // Trashed remotely; the pull direction owns this
                    // file's fate.
                    plan.unchanged.push(file.path.clone());
                    continue;
                }

                let tags = effective_tags(file);
                if remote_note.content != file.note.content {
                    plan.content_updates.push(PlannedUpdate {
                        path: file.path.clone(),
                        write: RemoteWrite::from_record(&file.note, tags),
                        id,
                    });
                } else if !same_tag_set(&tags, &remote_note.tags) {
                    plan.tag_updates.push(PlannedUpdate {
                        path: file.path.clone(),
                        write: RemoteWrite::from_record(&file.note, tags),
                        id,
                    });
                } else {
                    plan.unchanged.push(file.path.clone());
                }
            }
            None => {
                let tags = effective_tags(file);
                plan.creates.push(PlannedCreate {
                    path: file.path.clone(),
                    write: RemoteWrite::from_record(&file.note, tags),
                    note: file.note.clone(),
                });
            }
        }
    }

    plan
}

fn find_remote<'a>(
    file: &LocalFile,
    sorted: &[&'a NoteRecord],
    by_id: &HashMap<&str, &'a NoteRecord>,
    matched_ids: &HashSet<String>,
) -> Option<&'a NoteRecord> {
    if let Some(id) = &file.note.id
        && let Some(found) = by_id.get(id.as_str()).copied()
        && !matched_ids.contains(id)
    {
        return Some(found);
    }

    let unmatched = |n: &&&NoteRecord| {
        n.id.as_deref()
            .is_none_or(|id| !matched_ids.contains(id))
    };

    if let Some(found) = sorted
        .iter()
        .filter(unmatched)
        .find(|n| n.content == file.note.content)
        .copied()
    {
        return Some(found);
    }

    let title = file.title();
    sorted
        .iter()
        .filter(unmatched)
        .find(|n| note::title(&n.content) == title)
        .copied()
}

enum Outgoing {
    /// Freshly minted id to embed into the file on success.
    Create { path: String, note: NoteRecord },
    Update { path: String, retag: bool },
}

/// Execute a push plan: mint identifiers for creates, overwrite
/// matched notes in fixed-size batches, and embed minted identifiers
/// back into the local files. A failed item or batch is counted and
/// the remaining batches still go out.
pub async fn push<F, R>(fs: &F, remote: &R, plan: &PushPlan, dry_run: bool) -> PushSummary
where
    F: FileSystem,
    R: RemoteStore,
{
    let mut summary = PushSummary {
        unchanged: plan.unchanged.len(),
        ..Default::default()
    };

    if dry_run {
        tracing::info!("Dry run: no notes will be pushed");
        summary.created = plan.creates.len();
        summary.updated = plan.content_updates.len();
        summary.retagged = plan.tag_updates.len();
        return summary;
    }

    // Queue every write with a minted or known id, keyed for the
    // per-item results coming back.
    let mut queue: Vec<(String, RemoteWrite, Outgoing)> = Vec::new();
    for item in &plan.creates {
        let id = Uuid::new_v4().simple().to_string();
        queue.push((
            id,
            item.write.clone(),
            Outgoing::Create {
                path: item.path.clone(),
                note: item.note.clone(),
            },
        ));
    }
    for item in &plan.content_updates {
        queue.push((
            item.id.clone(),
            item.write.clone(),
            Outgoing::Update {
                path: item.path.clone(),
                retag: false,
            },
        ));
    }
    for item in &plan.tag_updates {
        queue.push((
            item.id.clone(),
            item.write.clone(),
            Outgoing::Update {
                path: item.path.clone(),
                retag: true,
            },
        ));
    }

    let batch_count = queue.len().div_ceil(PUSH_BATCH_SIZE);
    for (n, chunk) in queue.chunks(PUSH_BATCH_SIZE).enumerate() {
        tracing::info!("Pushing batch {}/{} ({} notes)", n + 1, batch_count, chunk.len());

        let batch: BTreeMap<String, RemoteWrite> = chunk
            .iter()
            .map(|(id, write, _)| (id.clone(), write.clone()))
            .collect();
        let meta: HashMap<&str, &Outgoing> = chunk
            .iter()
            .map(|(id, _, out)| (id.as_str(), out))
            .collect();

        let results = match remote.apply_batch(&batch).await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!("Batch {}/{} failed: {}", n + 1, batch_count, e);
                summary.errors += chunk.len();
                continue;
            }
        };

        for item in results {
            let Some(out) = meta.get(item.id.as_str()) else {
                continue;
            };
            match (item.result, out) {
                (Ok(()), Outgoing::Create { path, note }) => {
                    tracing::info!("Created remote note {} for {}", item.id, path);
                    summary.created += 1;
                    if let Err(e) = embed_id(fs, path, note, &item.id).await {
                        tracing::error!("Failed to embed id into {}: {}", path, e);
                        summary.errors += 1;
                    }
                }
                (Ok(()), Outgoing::Update { path, retag }) => {
                    tracing::info!("Updated remote note {} from {}", item.id, path);
                    if *retag {
                        summary.retagged += 1;
                    } else {
                        summary.updated += 1;
                    }
                }
                (Err(e), out) => {
                    let path = match out {
                        Outgoing::Create { path, .. } | Outgoing::Update { path, .. } => path,
                    };
                    tracing::error!("Failed to push {}: {}", path, e);
                    summary.errors += 1;
                }
            }
        }
    }

    summary
}

/// Rewrite a local file with the identifier minted for it, so the
/// next run matches it by id.
async fn embed_id<F: FileSystem>(
    fs: &F,
    path: &str,
    original: &NoteRecord,
    id: &str,
) -> Result<(), crate::fs::FsError> {
    let note = NoteRecord {
        id: Some(id.to_string()),
        ..original.clone()
    };
    fs.write(path, note.render().as_bytes()).await
}
