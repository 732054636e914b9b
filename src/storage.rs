//! Flat file storage shared by staged videos and thumbnails.
//!
//! Names are `<unix-millis>-<random token>[.<ext>]`. Uniqueness relies on the
//! token; there is no locking around the directory.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

const TOKEN_LEN: usize = 12;
const MAX_EXTENSION_LEN: usize = 10;

/// Generate a collision-resistant storage name with an optional extension.
pub fn generate_name(extension: Option<&str>) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let token = Uuid::new_v4().simple().to_string();
    let token = &token[..TOKEN_LEN];

    match extension {
        Some(ext) if !ext.is_empty() => format!("{}-{}.{}", millis, token, ext),
        _ => format!("{}-{}", millis, token),
    }
}

/// Extension of a client-supplied file name, if it is safe to keep.
pub fn extension_of(original_name: &str) -> Option<String> {
    let ext = Path::new(original_name).extension()?.to_str()?;
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage directory. Called once at startup.
    pub async fn ensure(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Remove a stored file. Returns `Ok(false)` if it was already gone.
    pub async fn remove_if_present(&self, name: &str) -> io::Result<bool> {
        match tokio::fs::remove_file(self.path(name)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
