//! Native filesystem implementation using tokio::fs.

use async_trait::async_trait;
use filetime::FileTime;
use notesync_core::fs::{FileEntry, FileStat, FileSystem, FsError, Result};
use std::path::PathBuf;
use tokio::fs;

fn map_err(path: &str, e: std::io::Error) -> FsError {
    if e.kind() == std::io::ErrorKind::NotFound {
        FsError::NotFound(path.to_string())
    } else {
        FsError::Io(e.to_string())
    }
}

/// Native filesystem rooted at the corpus directory.
pub struct NativeFs {
    base_path: PathBuf,
}

impl NativeFs {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }
}

#[async_trait]
impl FileSystem for NativeFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        fs::read(self.full_path(path))
            .await
            .map_err(|e| map_err(path, e))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| map_err(path, e))?;
        }

        fs::write(&full_path, content)
            .await
            .map_err(|e| map_err(path, e))
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let mut entries = Vec::new();

        let mut dir = fs::read_dir(self.full_path(path))
            .await
            .map_err(|e| map_err(path, e))?;

        while let Some(entry) = dir.next_entry().await.map_err(|e| map_err(path, e))? {
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = entry.metadata().await.map_err(|e| map_err(path, e))?;

            entries.push(FileEntry {
                name,
                is_dir: metadata.is_dir(),
            });
        }

        Ok(entries)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        let metadata = fs::metadata(&full_path)
            .await
            .map_err(|e| map_err(path, e))?;

        if metadata.is_dir() {
            fs::remove_dir(&full_path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::DirectoryNotEmpty {
                    FsError::NotEmpty(path.to_string())
                } else {
                    map_err(path, e)
                }
            })
        } else {
            fs::remove_file(&full_path)
                .await
                .map_err(|e| map_err(path, e))
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.full_path(path).exists())
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        let metadata = fs::metadata(self.full_path(path))
            .await
            .map_err(|e| map_err(path, e))?;

        let mtime = metadata
            .modified()
            .map(|t| {
                t.duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or(0.0)
            })
            .unwrap_or(0.0);

        Ok(FileStat {
            mtime,
            size: metadata.len(),
            is_dir: metadata.is_dir(),
        })
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.full_path(path))
            .await
            .map_err(|e| map_err(path, e))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let dest = self.full_path(to);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.map_err(|e| map_err(to, e))?;
        }
        fs::rename(self.full_path(from), dest)
            .await
            .map_err(|e| map_err(from, e))
    }

    async fn set_mtime(&self, path: &str, mtime: f64) -> Result<()> {
        let full_path = self.full_path(path);
        let secs = mtime.trunc() as i64;
        let nanos = (mtime.fract() * 1e9) as u32;
        let ft = FileTime::from_unix_time(secs, nanos);
        // filetime is synchronous; timestamp updates are cheap enough
        // to run inline.
        filetime::set_file_mtime(&full_path, ft).map_err(|e| map_err(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn write_read_and_list() {
        let tmp = TempDir::new().unwrap();
        let fs = NativeFs::new(tmp.path().to_path_buf());

        fs.write("work/Note.md", b"Note\nbody\n").await.unwrap();
        assert_eq!(fs.read("work/Note.md").await.unwrap(), b"Note\nbody\n");

        let root = fs.list("").await.unwrap();
        assert_eq!(root.len(), 1);
        assert!(root[0].is_dir);
        assert_eq!(root[0].name, "work");
    }

    #[tokio::test]
    async fn rename_creates_destination_parents() {
        let tmp = TempDir::new().unwrap();
        let fs = NativeFs::new(tmp.path().to_path_buf());

        fs.write("Note.md", b"x").await.unwrap();
        fs.rename("Note.md", "deep/nested/Note.md").await.unwrap();
        assert!(!fs.exists("Note.md").await.unwrap());
        assert_eq!(fs.read("deep/nested/Note.md").await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn set_mtime_is_visible_through_stat() {
        let tmp = TempDir::new().unwrap();
        let fs = NativeFs::new(tmp.path().to_path_buf());

        fs.write("Note.md", b"x").await.unwrap();
        fs.set_mtime("Note.md", 1_600_000_000.5).await.unwrap();

        let stat = fs.stat("Note.md").await.unwrap();
        assert!((stat.mtime - 1_600_000_000.5).abs() < 0.01);
    }

    #[tokio::test]
    async fn delete_refuses_non_empty_directory() {
        let tmp = TempDir::new().unwrap();
        let fs = NativeFs::new(tmp.path().to_path_buf());

        fs.write("dir/Note.md", b"x").await.unwrap();
        assert!(fs.delete("dir").await.is_err());

        fs.delete("dir/Note.md").await.unwrap();
        fs.delete("dir").await.unwrap();
        assert!(!fs.exists("dir").await.unwrap());
    }

    #[tokio::test]
    async fn missing_file_maps_to_not_found() {
        let tmp = TempDir::new().unwrap();
        let fs = NativeFs::new(tmp.path().to_path_buf());

        match fs.read("nope.md").await {
            Err(FsError::NotFound(path)) => assert_eq!(path, "nope.md"),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }
}
