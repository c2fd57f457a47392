//! Curation of root-level files: surveying what still needs a tag or
//! a readable name, moving already-tagged files into their tag
//! directories, and applying tags or titles to individual files.
//!
//! Everything here is local-only; the remote store learns about the
//! results on the next push.

use crate::fs::{FileSystem, FsError};
use crate::note::{self, NOTE_EXT};
use crate::scanner::{Corpus, TRASH_DIR};

use crate::applier::allocate_unique;

/// One root-level file and what it still needs.
#[derive(Debug, Clone)]
pub struct RootFile {
    pub path: String,
    pub title: String,
    pub tags: Vec<String>,
    /// No tags at all.
    pub needs_tag: bool,
    /// Filename stem is a bare 32-hex identifier.
    pub needs_rename: bool,
}

/// Every note file sitting directly in the corpus root.
pub fn root_files(corpus: &Corpus) -> Vec<RootFile> {
    corpus
        .files
        .values()
        .filter(|f| !f.path.contains('/'))
        .map(|f| {
            let stem = f.path.strip_suffix(NOTE_EXT).unwrap_or(&f.path);
            RootFile {
                path: f.path.clone(),
                title: f.title().to_string(),
                tags: f.note.tags.clone(),
                needs_tag: f.note.tags.is_empty(),
                needs_rename: note::is_note_id(stem),
            }
        })
        .collect()
}

/// Root files that still need curation: untagged or identifier-named.
pub fn unclassified(corpus: &Corpus) -> Vec<RootFile> {
    root_files(corpus)
        .into_iter()
        .filter(|f| f.needs_tag || f.needs_rename)
        .collect()
}

/// Names of the existing tag directories, sorted.
pub async fn existing_tags<F: FileSystem>(fs: &F) -> Result<Vec<String>, FsError> {
    let mut tags: Vec<String> = fs
        .list("")
        .await?
        .into_iter()
        .filter(|e| e.is_dir && e.name != TRASH_DIR && !e.name.starts_with('.'))
        .map(|e| e.name)
        .collect();
    tags.sort();
    Ok(tags)
}

/// Bookkeeping for one organize pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OrganizeSummary {
    pub moved: usize,
    pub errors: usize,
}

/// Move every tagged root file into its first tag's directory,
/// keeping the file bytes untouched. Failed moves are counted and the
/// pass continues.
pub async fn organize<F: FileSystem>(fs: &F, corpus: &Corpus) -> OrganizeSummary {
    let mut summary = OrganizeSummary::default();

    for file in root_files(corpus) {
        let Some(first_tag) = file.tags.first() else {
            continue;
        };

        match move_into_tag_dir(fs, &file.path, first_tag).await {
            Ok(dest) => {
                tracing::info!("Organized: {} -> {}", file.path, dest);
                summary.moved += 1;
            }
            Err(e) => {
                tracing::error!("Failed to organize {}: {}", file.path, e);
                summary.errors += 1;
            }
        }
    }

    summary
}

async fn move_into_tag_dir<F: FileSystem>(
    fs: &F,
    path: &str,
    tag: &str,
) -> Result<String, FsError> {
    fs.mkdir(tag).await?;
    let stem = path.strip_suffix(NOTE_EXT).unwrap_or(path);
    let dest = allocate_unique(fs, tag, stem, NOTE_EXT).await?;
    fs.rename(path, &dest).await?;
    Ok(dest)
}

/// Tag one root file: append `tag` to its tag list, rewrite the
/// metadata tail, and move it into the tag directory. An
/// identifier-named file is renamed after its title on the way. The
/// file's modification time is preserved.
pub async fn apply_tag<F: FileSystem>(fs: &F, path: &str, tag: &str) -> Result<String, FsError> {
    let bytes = fs.read(path).await?;
    let text = String::from_utf8(bytes).map_err(|_| FsError::Io(format!("{path}: not UTF-8")))?;
    let mut note = note::parse(&text);

    if !note.tags.iter().any(|t| t == tag) {
        note.tags.push(tag.to_string());
    }

    let old_stem = path.strip_suffix(NOTE_EXT).unwrap_or(path);
    let stem = if note::is_note_id(old_stem) {
        note::safe_filename(&note.content, old_stem)
    } else {
        old_stem.to_string()
    };

    fs.mkdir(tag).await?;
    let dest = allocate_unique(fs, tag, &stem, NOTE_EXT).await?;

    let mtime = fs.stat(path).await?.mtime;
    fs.write(&dest, note.render().as_bytes()).await?;
    fs.set_mtime(&dest, mtime).await?;
    fs.delete(path).await?;

    tracing::info!("Moved: {} -> {}", path, dest);
    Ok(dest)
}

/// Rename a root file after a new title, sanitized the same way as
/// derived filenames. The contents are untouched.
pub async fn rename_note<F: FileSystem>(
    fs: &F,
    path: &str,
    new_title: &str,
) -> Result<String, FsError> {
    if !fs.exists(path).await? {
        return Err(FsError::NotFound(path.to_string()));
    }
    let stem = note::safe_filename(new_title, "note");
    let dest = allocate_unique(fs, "", &stem, NOTE_EXT).await?;
    fs.rename(path, &dest).await?;

    tracing::info!("Renamed: {} -> {}", path, dest);
    Ok(dest)
}
