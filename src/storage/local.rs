use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::storage::ObjectStorage;

/// Object storage backed by a directory tree: `<root>/<bucket>/<path>`.
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: PathBuf, public_base_url: &str) -> Result<Self> {
        fs::create_dir_all(&root)?;
        info!("Object storage at {}", root.display());
        Ok(Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe || bucket.contains(|c: char| c == '/' || c == '\\') {
            return Err(Error::Storage(format!("Invalid object path {bucket}/{path}")));
        }
        Ok(self.root.join(bucket).join(relative))
    }
}

impl ObjectStorage for LocalObjectStorage {
    fn upload(&self, bucket: &str, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let target = self.resolve(bucket, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to prepare {}: {e}", parent.display())))?;
        }
        fs::write(&target, bytes)
            .map_err(|e| Error::Storage(format!("Failed to write {}: {e}", target.display())))?;
        debug!("Stored {} bytes ({}) at {}", bytes.len(), content_type, target.display());
        Ok(())
    }

    fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        for path in paths {
            let target = self.resolve(bucket, path)?;
            match fs::remove_file(&target) {
                Ok(()) => debug!("Removed {}", target.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!("{} already absent", target.display())
                }
                Err(e) => {
                    return Err(Error::Storage(format!(
                        "Failed to remove {}: {e}",
                        target.display()
                    )))
                }
            }
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{bucket}/{path}", self.public_base_url)
    }
}
