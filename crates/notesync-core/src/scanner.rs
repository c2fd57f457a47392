//! Local corpus scanner: walks the corpus root and parses every note
//! file into a [`LocalFile`], building the path and identifier
//! indexes the matcher runs against.

use crate::fs::{FileSystem, FsError};
use crate::note::{self, NOTE_EXT, NoteRecord};

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Reserved directory for logically-deleted and trashed notes.
pub const TRASH_DIR: &str = "TRASH";

/// A note file that could not be taken into the corpus. Recorded,
/// never fatal.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: FsError,
    },
    /// The engine rewrites matched files wholesale, so a file it
    /// cannot decode losslessly must stay out of the corpus.
    #[error("skipping {path}: not valid UTF-8")]
    NotUtf8 { path: String },
}

/// A note record bound to a filesystem path.
#[derive(Debug, Clone)]
pub struct LocalFile {
    /// Relative `/`-separated path under the corpus root.
    pub path: String,
    pub note: NoteRecord,
    /// Structural tag: the immediate parent directory name, unless
    /// that parent is the corpus root or the trash directory.
    pub dir_tag: Option<String>,
    /// Whether the file lives under the reserved trash directory.
    pub is_trash: bool,
}

impl LocalFile {
    pub fn title(&self) -> &str {
        self.note.title()
    }

    /// Last path component.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Snapshot of the local file set, built once per run and read-only
/// during matching and diffing.
#[derive(Debug, Default)]
pub struct Corpus {
    /// path -> file, in lexical path order for deterministic matching.
    pub files: BTreeMap<String, LocalFile>,
    /// Embedded identifier -> path.
    pub by_id: HashMap<String, String>,
    /// Files skipped because they could not be read.
    pub errors: Vec<ScanError>,
}

impl Corpus {
    /// Number of non-trash files.
    pub fn active_count(&self) -> usize {
        self.files.values().filter(|f| !f.is_trash).count()
    }
}

/// Walk the corpus root and parse every note file.
///
/// Trash files are included but flagged. A file that cannot be read
/// is recorded on the corpus and skipped; only a failure to list a
/// directory aborts the scan.
pub async fn scan<F: FileSystem>(fs: &F) -> Result<Corpus, FsError> {
    let mut corpus = Corpus::default();
    let mut dirs_to_visit = vec![String::new()];

    while let Some(dir) = dirs_to_visit.pop() {
        for entry in fs.list(&dir).await? {
            if entry.name.starts_with('.') {
                continue;
            }
            let path = if dir.is_empty() {
                entry.name.clone()
            } else {
                format!("{}/{}", dir, entry.name)
            };

            if entry.is_dir {
                dirs_to_visit.push(path);
            } else if path.ends_with(NOTE_EXT) {
                match fs.read(&path).await {
                    Ok(bytes) => match String::from_utf8(bytes) {
                        Ok(text) => insert_file(&mut corpus, path, &text),
                        Err(_) => {
                            tracing::warn!("Skipping {}: not valid UTF-8", path);
                            corpus.errors.push(ScanError::NotUtf8 { path });
                        }
                    },
                    Err(source) => {
                        tracing::warn!("Skipping unreadable file {}: {}", path, source);
                        corpus.errors.push(ScanError::Read { path, source });
                    }
                }
            }
        }
    }

    Ok(corpus)
}

fn insert_file(corpus: &mut Corpus, path: String, text: &str) {
    let note = note::parse(text);

    let file = LocalFile {
        dir_tag: dir_tag_of(&path),
        is_trash: is_trash_path(&path),
        note,
        path: path.clone(),
    };

    if let Some(id) = &file.note.id {
        // First file wins on duplicate markers; later copies will
        // still match by content or title.
        corpus.by_id.entry(id.clone()).or_insert_with(|| path.clone());
    }
    corpus.files.insert(path, file);
}

/// Directory tag of a path: its immediate parent directory name, or
/// None when the parent is the corpus root or the trash directory.
fn dir_tag_of(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = path.split('/').collect();
    parts.pop(); // file name
    match parts.last() {
        Some(&parent) if parent != TRASH_DIR => Some(parent.to_string()),
        _ => None,
    }
}

fn is_trash_path(path: &str) -> bool {
    path.split('/').any(|part| part == TRASH_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;

    #[tokio::test]
    async fn scan_builds_corpus_with_dir_tags() {
        let fs = InMemoryFs::new();
        fs.write("Loose note.md", b"Loose note\nbody\n").await.unwrap();
        fs.write("work/Report.md", b"Report\nbody\n\nTags: work\n")
            .await
            .unwrap();
        fs.write("TRASH/Old.md", b"Old\n").await.unwrap();
        fs.write("not-a-note.txt", b"ignored").await.unwrap();

        let corpus = scan(&fs).await.unwrap();

        assert_eq!(corpus.files.len(), 3);
        assert!(corpus.errors.is_empty());

        let loose = &corpus.files["Loose note.md"];
        assert_eq!(loose.dir_tag, None);
        assert!(!loose.is_trash);
        assert_eq!(loose.title(), "Loose note");

        let report = &corpus.files["work/Report.md"];
        assert_eq!(report.dir_tag.as_deref(), Some("work"));
        assert_eq!(report.note.tags, vec!["work"]);

        let old = &corpus.files["TRASH/Old.md"];
        assert!(old.is_trash);
        assert_eq!(old.dir_tag, None);

        assert_eq!(corpus.active_count(), 2);
    }

    #[tokio::test]
    async fn scan_indexes_embedded_identifiers() {
        let fs = InMemoryFs::new();
        let id = "0123456789abcdef0123456789abcdef";
        fs.write(
            "work/Tracked.md",
            format!("<!-- note-id: {} -->\nTracked\nbody\n", id).as_bytes(),
        )
        .await
        .unwrap();
        fs.write("Untracked.md", b"Untracked\n").await.unwrap();

        let corpus = scan(&fs).await.unwrap();

        assert_eq!(corpus.by_id.get(id).map(String::as_str), Some("work/Tracked.md"));
        assert_eq!(corpus.files["work/Tracked.md"].note.id.as_deref(), Some(id));
        assert_eq!(corpus.files["Untracked.md"].note.id, None);
    }

    #[tokio::test]
    async fn scan_records_non_utf8_files_and_skips_them() {
        let fs = InMemoryFs::new();
        fs.write("bad.md", &[0xff, 0xfe, 0x41]).await.unwrap();
        fs.write("good.md", b"Good\nbody\n").await.unwrap();

        let corpus = scan(&fs).await.unwrap();

        // The undecodable file never enters the corpus, so nothing
        // can match it and rewrite its bytes.
        assert_eq!(corpus.files.len(), 1);
        assert!(corpus.files.contains_key("good.md"));
        assert_eq!(corpus.errors.len(), 1);
        assert!(matches!(&corpus.errors[0], ScanError::NotUtf8 { path } if path == "bad.md"));
    }

    #[tokio::test]
    async fn scan_skips_hidden_entries() {
        let fs = InMemoryFs::new();
        fs.write(".hidden/secret.md", b"nope").await.unwrap();
        fs.write(".dotfile.md", b"nope").await.unwrap();
        fs.write("visible.md", b"yes\n").await.unwrap();

        let corpus = scan(&fs).await.unwrap();
        assert_eq!(corpus.files.len(), 1);
        assert!(corpus.files.contains_key("visible.md"));
    }

    #[test]
    fn dir_tag_uses_immediate_parent() {
        assert_eq!(dir_tag_of("note.md"), None);
        assert_eq!(dir_tag_of("work/note.md"), Some("work".to_string()));
        assert_eq!(dir_tag_of("TRASH/note.md"), None);
        assert_eq!(dir_tag_of("a/b/note.md"), Some("b".to_string()));
    }
}
