//! Capture a local folder into a tree.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use synctool_common::{Error, File, Result, SyncPath};

use crate::tree::Directory;

/// Scan the folder at `root` into a `Directory`.
///
/// Symbolic links and entries whose names are not valid UTF-8 are skipped.
///
/// # Errors
/// - `root` is not a directory
/// - I/O errors while reading entries
pub async fn scan_directory(root: &Path) -> Result<Directory> {
    let metadata = fs::metadata(root).await?;
    if !metadata.is_dir() {
        return Err(Error::InvalidInput(format!(
            "Not a directory: {}",
            root.display()
        )));
    }

    let mut tree = Directory::new();
    let mut pending: Vec<(PathBuf, SyncPath)> = vec![(root.to_path_buf(), SyncPath::root())];

    while let Some((dir, path)) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(String::from) else {
                warn!("Skipping non UTF-8 name in {}", dir.display());
                continue;
            };

            let file_type = entry.file_type().await?;
            if file_type.is_symlink() {
                debug!("Skipping symlink {}", entry.path().display());
                continue;
            }

            let entry_path = path.join(&name)?;
            if file_type.is_dir() {
                tree.create_directory(&entry_path)?;
                pending.push((entry.path(), entry_path));
            } else if file_type.is_file() {
                let metadata = entry.metadata().await?;
                let modified: DateTime<Utc> = metadata.modified()?.into();
                tree.add_file(&File::new(entry_path, modified, metadata.len()))?;
            }
        }
    }

    debug!(
        "Scanned {}: {} files, {} bytes",
        root.display(),
        tree.file_count(),
        tree.total_size()
    );
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_scan_directory() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("docs/empty")).unwrap();
        std::fs::write(temp.path().join("docs/a.txt"), b"hello").unwrap();
        std::fs::write(temp.path().join("b.bin"), b"xy").unwrap();

        let tree = scan_directory(temp.path()).await.unwrap();

        assert_eq!(tree.file_count(), 2);
        assert_eq!(tree.total_size(), 7);
        let a = tree.file(&SyncPath::parse("/docs/a.txt").unwrap()).unwrap();
        assert_eq!(a.length, 5);
        assert!(tree.directory(&SyncPath::parse("/docs/empty").unwrap()).is_some());
    }

    #[tokio::test]
    async fn test_scan_rejects_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f");
        std::fs::write(&file, b"x").unwrap();

        assert!(matches!(
            scan_directory(&file).await,
            Err(Error::InvalidInput(_))
        ));
    }
}
