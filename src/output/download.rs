//! Embedded file materialization
//!
//! Files are stored flat under `<output>/files/`, named by the SHA-256 of their
//! URL. Inline assets share the URL of the page they were found on, so they are
//! named by the hash of their content instead.

use crate::crawler::Session;
use crate::model::File;
use crate::Result;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Writes file contents to disk, each distinct file once
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    stored: HashMap<String, PathBuf>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stored: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of distinct files written so far
    pub fn len(&self) -> usize {
        self.stored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }

    /// Name a file is stored under
    pub fn file_name(file: &File) -> String {
        let digest = match &file.content {
            Some(content) => Sha256::digest(content),
            None => Sha256::digest(file.url.as_bytes()),
        };
        hex::encode(digest)
    }

    /// Downloads `file` unless its content is already known, writes it, and sets `os_path`
    ///
    /// # Arguments
    ///
    /// * `session` - Session used for the download
    /// * `file` - The file record to materialize
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The file is on disk and `file.os_path` points at it
    /// * `Err(ForumError)` - Download or write failed; `file` is left unchanged
    pub async fn materialize(&mut self, session: &Session, file: &mut File) -> Result<()> {
        let name = Self::file_name(file);

        if let Some(path) = self.stored.get(&name) {
            file.os_path = Some(path.clone());
            return Ok(());
        }

        let content = match &file.content {
            Some(content) => content.clone(),
            None => {
                let response = session.get(&file.url).await?;
                if file.content_type.is_none() {
                    file.content_type = response.content_type().map(str::to_string);
                }
                response.content
            }
        };

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(&name);
        tokio::fs::write(&path, &content).await?;
        tracing::debug!("Stored {} as {}", file.url, path.display());

        self.stored.insert(name, path.clone());
        file.os_path = Some(path);
        Ok(())
    }
}
