//! Drives the matcher across the whole remote set and the whole local
//! corpus, producing the classified change set one apply pass
//! consumes.

use crate::matcher::{MatchKind, find_match};
use crate::note::NoteRecord;
use crate::scanner::Corpus;

use std::collections::HashSet;

/// Identical content, different directory. Carries the full record so
/// the applier can relocate without re-reading.
#[derive(Debug, Clone)]
pub struct TagChange {
    pub path: String,
    pub old_tag: Option<String>,
    pub new_tag: Option<String>,
    pub note: NoteRecord,
}

/// Matched by id or title with differing content.
#[derive(Debug, Clone)]
pub struct ContentChange {
    pub path: String,
    pub old_tag: Option<String>,
    pub new_tag: Option<String>,
    pub note: NoteRecord,
}

/// Remote note with no local counterpart.
#[derive(Debug, Clone)]
pub struct NewNote {
    pub note: NoteRecord,
    pub dir_tag: Option<String>,
}

/// Deleted remote note matching a non-trash local file.
#[derive(Debug, Clone)]
pub struct TrashMove {
    pub path: String,
    pub title: String,
}

/// Local file matched to no remote note.
#[derive(Debug, Clone)]
pub struct Orphan {
    pub path: String,
    pub title: String,
}

/// Classified output of one diff pass. Immutable; input to exactly
/// one apply pass.
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub tag_changes: Vec<TagChange>,
    pub content_changes: Vec<ContentChange>,
    pub new_notes: Vec<NewNote>,
    pub to_trash: Vec<TrashMove>,
    pub orphaned: Vec<Orphan>,
    pub identical: Vec<String>,

    pub remote_active: usize,
    pub remote_trashed: usize,
    pub local_count: usize,
}

impl ChangeSet {
    /// True when a run would change nothing: every bucket except
    /// `identical` is empty.
    pub fn is_converged(&self) -> bool {
        self.tag_changes.is_empty()
            && self.content_changes.is_empty()
            && self.new_notes.is_empty()
            && self.to_trash.is_empty()
            && self.orphaned.is_empty()
    }
}

/// Classify every remote note and every local file.
///
/// Remote notes are processed in id order so the claim sequence, and
/// therefore the whole change set, is reproducible across runs.
pub fn diff(remote: &[NoteRecord], corpus: &Corpus) -> ChangeSet {
    let mut changes = ChangeSet {
        local_count: corpus.active_count(),
        ..Default::default()
    };

    let mut active: Vec<&NoteRecord> = remote.iter().filter(|n| !n.deleted).collect();
    let mut trashed: Vec<&NoteRecord> = remote.iter().filter(|n| n.deleted).collect();
    active.sort_by(|a, b| a.id.cmp(&b.id));
    trashed.sort_by(|a, b| a.id.cmp(&b.id));

    changes.remote_active = active.len();
    changes.remote_trashed = trashed.len();

    let mut claimed: HashSet<String> = HashSet::new();

    for note in active {
        let remote_dir_tag = note.dir_tag().map(String::from);

        match find_match(note, corpus, &claimed) {
            Some((path, kind)) => {
                let path = path.to_string();
                claimed.insert(path.clone());
                let local = &corpus.files[&path];

                match kind {
                    MatchKind::Identical => {
                        if remote_dir_tag != local.dir_tag {
                            changes.tag_changes.push(TagChange {
                                path,
                                old_tag: local.dir_tag.clone(),
                                new_tag: remote_dir_tag,
                                note: note.clone(),
                            });
                        } else {
                            changes.identical.push(path);
                        }
                    }
                    MatchKind::IdMatch | MatchKind::TitleMatch => {
                        changes.content_changes.push(ContentChange {
                            path,
                            old_tag: local.dir_tag.clone(),
                            new_tag: remote_dir_tag,
                            note: note.clone(),
                        });
                    }
                }
            }
            None => {
                changes.new_notes.push(NewNote {
                    dir_tag: remote_dir_tag,
                    note: note.clone(),
                });
            }
        }
    }

    for note in trashed {
        if let Some((path, _)) = find_match(note, corpus, &claimed) {
            let local = &corpus.files[path];
            if !local.is_trash {
                let path = path.to_string();
                claimed.insert(path.clone());
                changes.to_trash.push(TrashMove {
                    title: local.title().to_string(),
                    path,
                });
            }
        }
    }

    for (path, local) in &corpus.files {
        if !claimed.contains(path) && !local.is_trash {
            changes.orphaned.push(Orphan {
                path: path.clone(),
                title: local.title().to_string(),
            });
        }
    }

    changes
}
