//! Collection directories: one per job, named after the page.

use crate::config::CollectionNaming;
use crate::error::Sheet2PdfError;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// One lock per collection directory in this process.
static COLLECTION_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static SEPARATOR_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-~()]+").unwrap());

/// Collapse every run of whitespace, `-`, `~`, `(` and `)` into one `_`.
///
/// Leading and trailing underscores are dropped, so
/// `"Listen To Your Heart (Cover)"` becomes `"Listen_To_Your_Heart_Cover"`.
pub fn sanitize_title(title: &str) -> String {
    SEPARATOR_RUNS
        .replace_all(title, "_")
        .trim_matches('_')
        .to_string()
}

/// Short, stable fingerprint of the page URL.
pub fn url_fingerprint(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..8].to_string()
}

/// Directory name for a job's collection.
///
/// The sanitised title is made filesystem-safe (no path separators, no
/// leading dots). Under [`CollectionNaming::TitleWithUrlHash`] a URL
/// fingerprint is appended so two pages with the same title never share a
/// directory.
pub fn collection_name(title: &str, url: &str, naming: CollectionNaming) -> String {
    let mut name: String = sanitize_title(title)
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    name = name.trim_start_matches('.').to_string();
    if name.is_empty() {
        name = "untitled".to_string();
    }
    match naming {
        CollectionNaming::Title => name,
        CollectionNaming::TitleWithUrlHash => format!("{}_{}", name, url_fingerprint(url)),
    }
}

/// Create `root/name` unless it already exists.
///
/// Calling this twice with the same name is safe; an existing directory is
/// reused as-is.
pub async fn ensure_collection(root: &Path, name: &str) -> Result<PathBuf, Sheet2PdfError> {
    let dir = root.join(name);
    match tokio::fs::metadata(&dir).await {
        Ok(meta) if meta.is_dir() => {
            debug!("Reusing collection {}", dir.display());
            return Ok(dir);
        }
        Ok(_) => {
            return Err(Sheet2PdfError::fs(
                &dir,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "exists and is not a directory",
                ),
            ))
        }
        Err(_) => {}
    }

    // `create_dir_all` tolerates a concurrent creator winning the race.
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| Sheet2PdfError::fs(&dir, e))?;
    debug!("Created collection {}", dir.display());
    Ok(dir)
}

/// Take exclusive use of the collection at `dir`.
///
/// Jobs resolving to the same directory (the same URL twice, or equal
/// titles under [`CollectionNaming::Title`]) would otherwise delete each
/// other's intermediates. The second job waits until the guard of the first
/// is dropped.
pub async fn lock_collection(dir: &Path) -> OwnedMutexGuard<()> {
    let lock = {
        let mut locks = COLLECTION_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(dir.to_path_buf()).or_default())
    };
    if lock.try_lock().is_err() {
        debug!("Waiting for collection {}", dir.display());
    }
    lock.lock_owned().await
}
