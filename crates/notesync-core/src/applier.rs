//! Executes one change set against the corpus filesystem.
//!
//! Mutation order per run: trash-moves, orphan-moves (optional),
//! tag/directory moves, content updates, creations, then pruning of
//! empty non-reserved directories. Dry-run walks the identical
//! bookkeeping without touching the filesystem.

use crate::differ::ChangeSet;
use crate::fs::{FileSystem, FsError};
use crate::note::{self, NOTE_EXT, NoteRecord};
use crate::scanner::TRASH_DIR;

use std::time::{SystemTime, UNIX_EPOCH};

/// Knobs for one apply pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Report decisions without mutating anything.
    pub dry_run: bool,
    /// Also move orphaned local files into the trash directory.
    pub trash_orphans: bool,
}

/// Bookkeeping for one apply pass. Identical between dry and real
/// runs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub trashed: usize,
    pub moved: usize,
    pub updated: usize,
    pub created: usize,
    /// New notes that landed in the root for lack of a directory tag.
    pub untagged: usize,
    /// Orphans left in place (zero when `trash_orphans` is set).
    pub orphaned: usize,
    /// Items that failed and were skipped; the run continues.
    pub errors: usize,
}

/// Apply a change set to the filesystem rooted at `fs`.
///
/// Every item is independent: a failed move or write is counted and
/// logged, and the run proceeds. A file is either fully rewritten or
/// untouched.
pub async fn apply<F: FileSystem>(fs: &F, changes: &ChangeSet, opts: ApplyOptions) -> Summary {
    let mut summary = Summary::default();

    if opts.dry_run {
        tracing::info!("Dry run: no changes will be made");
    }

    // Deleted on the remote side: isolate, never delete.
    for item in &changes.to_trash {
        match move_into_dir(fs, &item.path, TRASH_DIR, opts.dry_run).await {
            Ok(dest) => {
                tracing::info!("Moved to trash: {} -> {}", item.path, dest);
                summary.trashed += 1;
            }
            Err(e) => {
                tracing::error!("Failed to trash {}: {}", item.path, e);
                summary.errors += 1;
            }
        }
    }

    if opts.trash_orphans {
        for item in &changes.orphaned {
            match move_into_dir(fs, &item.path, TRASH_DIR, opts.dry_run).await {
                Ok(dest) => {
                    tracing::info!("Moved orphan to trash: {} -> {}", item.path, dest);
                    summary.trashed += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to trash orphan {}: {}", item.path, e);
                    summary.errors += 1;
                }
            }
        }
    } else {
        summary.orphaned = changes.orphaned.len();
    }

    // Directory relocations for identical content.
    for item in &changes.tag_changes {
        let dest_dir = item.new_tag.as_deref().unwrap_or("");
        match move_into_dir(fs, &item.path, dest_dir, opts.dry_run).await {
            Ok(dest) => {
                tracing::info!(
                    "Tag changed: {} ({}/ -> {}/)",
                    dest,
                    item.old_tag.as_deref().unwrap_or("root"),
                    item.new_tag.as_deref().unwrap_or("root"),
                );
                summary.moved += 1;
            }
            Err(e) => {
                tracing::error!("Failed to move {}: {}", item.path, e);
                summary.errors += 1;
            }
        }
    }

    // Content updates, relocating first when the tag changed too.
    for item in &changes.content_changes {
        match update_content(fs, item, opts.dry_run).await {
            Ok(path) => {
                tracing::info!("Updated: {}", path);
                summary.updated += 1;
            }
            Err(e) => {
                tracing::error!("Failed to update {}: {}", item.path, e);
                summary.errors += 1;
            }
        }
    }

    // Brand-new remote notes.
    for item in &changes.new_notes {
        let untagged = item.dir_tag.is_none();
        match create_note(fs, &item.note, item.dir_tag.as_deref(), opts.dry_run).await {
            Ok(path) => {
                tracing::info!(
                    "Created: {} [{}]",
                    path,
                    item.dir_tag.as_deref().unwrap_or("untagged"),
                );
                summary.created += 1;
                if untagged {
                    summary.untagged += 1;
                }
            }
            Err(e) => {
                tracing::error!("Failed to create note '{}': {}", item.note.title(), e);
                summary.errors += 1;
            }
        }
    }

    if !opts.dry_run
        && let Err(e) = prune_empty_dirs(fs).await
    {
        tracing::warn!("Failed to prune empty directories: {}", e);
        summary.errors += 1;
    }

    summary
}

/// Allocate a free path in `dir` for `stem` + `ext`, appending `_1`,
/// `_2`, ... before the extension until no file is in the way. Pure
/// given the filesystem state; never overwrites.
pub async fn allocate_unique<F: FileSystem>(
    fs: &F,
    dir: &str,
    stem: &str,
    ext: &str,
) -> Result<String, FsError> {
    let candidate = join(dir, &format!("{stem}{ext}"));
    if !fs.exists(&candidate).await? {
        return Ok(candidate);
    }
    let mut counter = 1;
    loop {
        let candidate = join(dir, &format!("{stem}_{counter}{ext}"));
        if !fs.exists(&candidate).await? {
            return Ok(candidate);
        }
        counter += 1;
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_suffix(NOTE_EXT).unwrap_or(name)
}

/// Move `path` into `dir` at a unique destination, keeping its stem.
async fn move_into_dir<F: FileSystem>(
    fs: &F,
    path: &str,
    dir: &str,
    dry_run: bool,
) -> Result<String, FsError> {
    if !dry_run && !dir.is_empty() {
        fs.mkdir(dir).await?;
    }
    let dest = allocate_unique(fs, dir, file_stem(path), NOTE_EXT).await?;
    if !dry_run {
        fs.rename(path, &dest).await?;
    }
    Ok(dest)
}

/// Rewrite a matched file with the remote record, relocating it first
/// when the directory tag changed.
async fn update_content<F: FileSystem>(
    fs: &F,
    item: &crate::differ::ContentChange,
    dry_run: bool,
) -> Result<String, FsError> {
    let path = if item.new_tag != item.old_tag {
        let dest_dir = item.new_tag.as_deref().unwrap_or("");
        if !dry_run && !dest_dir.is_empty() {
            fs.mkdir(dest_dir).await?;
        }
        let dest = allocate_unique(fs, dest_dir, file_stem(&item.path), NOTE_EXT).await?;
        // Relocate by rename before rewriting: if the write below
        // fails, the old bytes are still on disk at the destination.
        if !dry_run {
            fs.rename(&item.path, &dest).await?;
        }
        dest
    } else {
        item.path.clone()
    };

    write_note(fs, &path, &item.note, dry_run).await?;
    Ok(path)
}

/// Create a file for a remote note with no local counterpart.
async fn create_note<F: FileSystem>(
    fs: &F,
    note: &NoteRecord,
    dir_tag: Option<&str>,
    dry_run: bool,
) -> Result<String, FsError> {
    let fallback = note.id.as_deref().unwrap_or("new_note");
    let stem = note::safe_filename(&note.content, fallback);
    let dir = dir_tag.unwrap_or("");
    if !dry_run && !dir.is_empty() {
        fs.mkdir(dir).await?;
    }
    let path = allocate_unique(fs, dir, &stem, NOTE_EXT).await?;
    write_note(fs, &path, note, dry_run).await?;
    Ok(path)
}

/// Fully rewrite `path` in the canonical on-disk format and stamp the
/// note's modification time onto it.
async fn write_note<F: FileSystem>(
    fs: &F,
    path: &str,
    note: &NoteRecord,
    dry_run: bool,
) -> Result<(), FsError> {
    if dry_run {
        return Ok(());
    }
    fs.write(path, note.render().as_bytes()).await?;
    let mtime = note.modification_time.unwrap_or_else(now_secs);
    fs.set_mtime(path, mtime).await
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Remove top-level directories left empty by the moves above. The
/// trash directory is reserved and never pruned.
async fn prune_empty_dirs<F: FileSystem>(fs: &F) -> Result<(), FsError> {
    for entry in fs.list("").await? {
        if !entry.is_dir || entry.name == TRASH_DIR {
            continue;
        }
        if fs.list(&entry.name).await?.is_empty() {
            fs.delete(&entry.name).await?;
            tracing::info!("Removed empty directory: {}/", entry.name);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::diff;
    use crate::fs::InMemoryFs;
    use crate::scanner::scan;

    fn remote_note(id: &str, content: &str, tags: &[&str], deleted: bool) -> NoteRecord {
        NoteRecord {
            id: Some(id.repeat(32)),
            content: content.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            deleted,
            modification_time: Some(1_700_000_000.0),
            ..Default::default()
        }
    }

    async fn run<F: FileSystem>(
        fs: &F,
        remote: &[NoteRecord],
        opts: ApplyOptions,
    ) -> (ChangeSet, Summary) {
        let corpus = scan(fs).await.unwrap();
        let changes = diff(remote, &corpus);
        let summary = apply(fs, &changes, opts).await;
        (changes, summary)
    }

    #[tokio::test]
    async fn allocate_unique_appends_counters() {
        let fs = InMemoryFs::new();
        assert_eq!(
            allocate_unique(&fs, "", "note", ".md").await.unwrap(),
            "note.md"
        );

        fs.write("note.md", b"x").await.unwrap();
        assert_eq!(
            allocate_unique(&fs, "", "note", ".md").await.unwrap(),
            "note_1.md"
        );

        fs.write("note_1.md", b"x").await.unwrap();
        assert_eq!(
            allocate_unique(&fs, "", "note", ".md").await.unwrap(),
            "note_2.md"
        );
    }

    #[tokio::test]
    async fn creates_new_note_in_tag_directory() {
        // Scenario A: one remote note, empty corpus.
        let fs = InMemoryFs::new();
        let id = "a".repeat(32);
        let remote = vec![remote_note("a", "Title\nBody", &["work"], false)];

        let (_, summary) = run(&fs, &remote, ApplyOptions::default()).await;
        assert_eq!(summary.created, 1);
        assert_eq!(summary.untagged, 0);

        let written = String::from_utf8(fs.read("work/Title.md").await.unwrap()).unwrap();
        assert_eq!(
            written,
            format!("<!-- note-id: {} -->\nTitle\nBody\n\nTags: work\n", id)
        );
        // Modification time stamped from the record.
        assert_eq!(fs.stat("work/Title.md").await.unwrap().mtime, 1_700_000_000.0);
    }

    #[tokio::test]
    async fn moves_file_on_tag_change() {
        // Scenario B: identical content, new directory tag.
        let fs = InMemoryFs::new();
        fs.write("misc/Title.md", b"Title\nBody\n").await.unwrap();
        let remote = vec![remote_note("a", "Title\nBody", &["personal"], false)];

        let (_, summary) = run(&fs, &remote, ApplyOptions::default()).await;
        assert_eq!(summary.moved, 1);
        assert!(!fs.exists("misc/Title.md").await.unwrap());
        assert_eq!(fs.read("personal/Title.md").await.unwrap(), b"Title\nBody\n");
        // The emptied source directory is pruned.
        assert!(!fs.exists("misc").await.unwrap());
    }

    #[tokio::test]
    async fn trashes_locally_when_remote_deleted() {
        // Scenario C: deleted remote note, matching local file.
        let fs = InMemoryFs::new();
        fs.write("Title.md", b"Title\nBody\n").await.unwrap();
        let remote = vec![remote_note("a", "Title\nBody", &[], true)];

        let (_, summary) = run(&fs, &remote, ApplyOptions::default()).await;
        assert_eq!(summary.trashed, 1);
        assert!(!fs.exists("Title.md").await.unwrap());
        assert_eq!(fs.read("TRASH/Title.md").await.unwrap(), b"Title\nBody\n");
    }

    #[tokio::test]
    async fn orphans_left_in_place_by_default() {
        // Scenario D.
        let fs = InMemoryFs::new();
        fs.write("Lonely.md", b"Lonely\n").await.unwrap();

        let (_, summary) = run(&fs, &[], ApplyOptions::default()).await;
        assert_eq!(summary.orphaned, 1);
        assert!(fs.exists("Lonely.md").await.unwrap());

        let opts = ApplyOptions {
            trash_orphans: true,
            ..Default::default()
        };
        let (_, summary) = run(&fs, &[], opts).await;
        assert_eq!(summary.orphaned, 0);
        assert_eq!(summary.trashed, 1);
        assert!(fs.exists("TRASH/Lonely.md").await.unwrap());
    }

    #[tokio::test]
    async fn content_update_rewrites_in_place() {
        let fs = InMemoryFs::new();
        fs.write("Title.md", b"Title\nold\n").await.unwrap();
        let remote = vec![remote_note("a", "Title\nnew", &[], false)];

        let (_, summary) = run(&fs, &remote, ApplyOptions::default()).await;
        assert_eq!(summary.updated, 1);

        let written = String::from_utf8(fs.read("Title.md").await.unwrap()).unwrap();
        assert!(written.contains("Title\nnew\n"));
        // The remote id is now embedded for future id-first matching.
        assert!(written.starts_with(&format!("<!-- note-id: {} -->", "a".repeat(32))));
    }

    #[tokio::test]
    async fn content_update_relocates_when_tag_differs() {
        let fs = InMemoryFs::new();
        fs.write("old/Title.md", b"Title\nold\n").await.unwrap();
        let remote = vec![remote_note("a", "Title\nnew", &["new"], false)];

        let (_, summary) = run(&fs, &remote, ApplyOptions::default()).await;
        assert_eq!(summary.updated, 1);
        assert!(!fs.exists("old/Title.md").await.unwrap());
        assert!(fs.exists("new/Title.md").await.unwrap());
    }

    /// Reads, moves and listings work; every write is refused.
    struct WriteFailFs {
        inner: InMemoryFs,
    }

    #[async_trait::async_trait]
    impl FileSystem for WriteFailFs {
        async fn read(&self, path: &str) -> crate::fs::Result<Vec<u8>> {
            self.inner.read(path).await
        }
        async fn write(&self, _path: &str, _content: &[u8]) -> crate::fs::Result<()> {
            Err(FsError::Io("write refused".to_string()))
        }
        async fn list(&self, path: &str) -> crate::fs::Result<Vec<crate::fs::FileEntry>> {
            self.inner.list(path).await
        }
        async fn delete(&self, path: &str) -> crate::fs::Result<()> {
            self.inner.delete(path).await
        }
        async fn exists(&self, path: &str) -> crate::fs::Result<bool> {
            self.inner.exists(path).await
        }
        async fn stat(&self, path: &str) -> crate::fs::Result<crate::fs::FileStat> {
            self.inner.stat(path).await
        }
        async fn mkdir(&self, path: &str) -> crate::fs::Result<()> {
            self.inner.mkdir(path).await
        }
        async fn rename(&self, from: &str, to: &str) -> crate::fs::Result<()> {
            self.inner.rename(from, to).await
        }
        async fn set_mtime(&self, path: &str, mtime: f64) -> crate::fs::Result<()> {
            self.inner.set_mtime(path, mtime).await
        }
    }

    #[tokio::test]
    async fn failed_update_write_never_loses_the_note() {
        let fs = WriteFailFs {
            inner: InMemoryFs::new(),
        };
        fs.inner.write("old/Title.md", b"Title\nold\n").await.unwrap();
        let remote = vec![remote_note("a", "Title\nnew", &["new"], false)];

        let (_, summary) = run(&fs, &remote, ApplyOptions::default()).await;
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.updated, 0);

        // The relocation happened, the rewrite failed, the old bytes
        // are still on disk.
        assert!(!fs.exists("old/Title.md").await.unwrap());
        assert_eq!(fs.read("new/Title.md").await.unwrap(), b"Title\nold\n");
    }

    #[tokio::test]
    async fn unique_allocation_on_name_collision() {
        let fs = InMemoryFs::new();
        fs.write("work/Title.md", b"Title\nexisting\n").await.unwrap();
        // Unrelated remote note with the same derived filename. A
        // second note claims the existing file by title, so give the
        // local file a marker binding it to note "b".
        let remote = vec![
            NoteRecord {
                id: Some("a".repeat(32)),
                content: "Title\nfresh".to_string(),
                tags: vec!["work".to_string()],
                ..Default::default()
            },
            NoteRecord {
                id: Some("b".repeat(32)),
                content: "Title\nexisting".to_string(),
                tags: vec!["work".to_string()],
                ..Default::default()
            },
        ];

        let (changes, summary) = run(&fs, &remote, ApplyOptions::default()).await;
        assert_eq!(changes.new_notes.len(), 1);
        assert_eq!(summary.created, 1);
        assert!(fs.exists("work/Title_1.md").await.unwrap());
    }

    #[tokio::test]
    async fn empty_note_falls_back_to_id_stem() {
        let fs = InMemoryFs::new();
        let remote = vec![remote_note("c", "", &[], false)];

        let (_, summary) = run(&fs, &remote, ApplyOptions::default()).await;
        assert_eq!(summary.created, 1);
        assert!(fs.exists(&format!("{}.md", "c".repeat(32))).await.unwrap());
    }

    #[tokio::test]
    async fn dry_run_reports_without_mutating() {
        let fs = InMemoryFs::new();
        fs.write("misc/Title.md", b"Title\nBody\n").await.unwrap();
        fs.write("Lonely.md", b"Lonely\n").await.unwrap();
        let remote = vec![
            remote_note("a", "Title\nBody", &["personal"], false),
            remote_note("b", "Brand new\nnote", &[], false),
        ];

        let opts = ApplyOptions {
            dry_run: true,
            ..Default::default()
        };
        let (_, summary) = run(&fs, &remote, opts).await;

        // Same bookkeeping as a real run...
        assert_eq!(summary.moved, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.untagged, 1);
        assert_eq!(summary.orphaned, 1);

        // ...but nothing moved.
        assert!(fs.exists("misc/Title.md").await.unwrap());
        assert!(!fs.exists("personal/Title.md").await.unwrap());
        assert!(!fs.exists("Brand new.md").await.unwrap());
    }

    #[tokio::test]
    async fn resync_is_idempotent() {
        let fs = InMemoryFs::new();
        fs.write("misc/Title.md", b"Title\nBody\n").await.unwrap();
        let remote = vec![
            remote_note("a", "Title\nBody", &["personal"], false),
            remote_note("b", "Other\nnote", &["work"], false),
            remote_note("c", "Gone\nnote", &[], true),
        ];
        fs.write("Gone.md", b"Gone\nnote\n").await.unwrap();

        let (_, first) = run(&fs, &remote, ApplyOptions::default()).await;
        assert!(first.trashed + first.moved + first.created > 0);

        let (changes, second) = run(&fs, &remote, ApplyOptions::default()).await;
        assert!(changes.is_converged(), "second diff: {:?}", changes);
        assert_eq!(second, Summary::default());
    }
}
