//! Matches one remote note against the local corpus.
//!
//! Priority order, first hit wins, claimed paths skipped in every
//! tier:
//! 1. embedded identifier equals the remote id
//! 2. byte-equal content
//! 3. equal title (first content line)
//!
//! Tiers 2-3 iterate in path-lexical order so ties resolve the same
//! way on every run.

use crate::note::{self, NoteRecord};
use crate::scanner::Corpus;

use std::collections::HashSet;

/// How a remote note corresponds to a local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Byte-equal content (found by id or by content).
    Identical,
    /// Same embedded identifier, different content.
    IdMatch,
    /// Same title, different content. Legacy fallback for files
    /// without an identifier marker.
    TitleMatch,
}

/// Find the local file corresponding to `remote`, if any.
///
/// A path in `claimed` was already attributed to another remote note
/// this run and is never matched again.
pub fn find_match<'a>(
    remote: &NoteRecord,
    corpus: &'a Corpus,
    claimed: &HashSet<String>,
) -> Option<(&'a str, MatchKind)> {
    // Tier 1: embedded identifier.
    if let Some(id) = &remote.id
        && let Some(path) = corpus.by_id.get(id)
        && !claimed.contains(path)
    {
        let local = &corpus.files[path];
        let kind = if local.note.content == remote.content {
            MatchKind::Identical
        } else {
            MatchKind::IdMatch
        };
        return Some((path.as_str(), kind));
    }

    // Tier 2: byte-equal content.
    for (path, local) in &corpus.files {
        if claimed.contains(path) {
            continue;
        }
        if local.note.content == remote.content {
            return Some((path.as_str(), MatchKind::Identical));
        }
    }

    // Tier 3: equal title.
    let remote_title = note::title(&remote.content);
    for (path, local) in &corpus.files {
        if claimed.contains(path) {
            continue;
        }
        if local.title() == remote_title {
            return Some((path.as_str(), MatchKind::TitleMatch));
        }
    }

    None
}
