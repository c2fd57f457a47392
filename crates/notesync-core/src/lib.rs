//! notesync-core: reconciliation engine between a remote note store
//! and a local markdown directory.
//!
//! This crate provides the core functionality for:
//! - Parsing/serializing notes in the canonical on-disk format
//! - Scanning a local corpus into an indexed snapshot
//! - Matching remote notes to local files and classifying differences
//! - Applying a change set to the filesystem (pull direction)
//! - Planning and executing writes to the remote store (push direction)
//! - Curating untagged root files (tagging, renaming, organizing)
//! - FileSystem and RemoteStore trait abstractions

pub mod applier;
pub mod differ;
pub mod fs;
pub mod matcher;
pub mod note;
pub mod organizer;
pub mod pusher;
pub mod remote;
pub mod scanner;

pub use applier::{ApplyOptions, Summary, apply};
pub use differ::{ChangeSet, diff};
pub use fs::{FileEntry, FileStat, FileSystem, FsError, InMemoryFs};
pub use matcher::{MatchKind, find_match};
pub use note::NoteRecord;
pub use organizer::{
    OrganizeSummary, RootFile, apply_tag, existing_tags, organize, rename_note, root_files,
    unclassified,
};
pub use pusher::{PushPlan, PushSummary, plan_push, push};
pub use remote::{BatchItemResult, InMemoryRemote, RemoteError, RemoteStore, RemoteWrite};
pub use scanner::{Corpus, LocalFile, ScanError, scan};
