//! Keyed JSON record storage.
//!
//! Records live in three collections (`users`, `tokens`, `checks`). The store
//! keeps writes to a single key whole but offers no transactions across keys.

use async_trait::async_trait;
use serde_json::Value;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

use crate::{
    error::{Error, Result},
    models::Collection,
};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store a new record. Fails if the key is already taken.
    async fn create(&self, collection: Collection, key: &str, record: &Value) -> Result<()>;

    /// Read a record, `Error::NotFound` if there is none.
    async fn read(&self, collection: Collection, key: &str) -> Result<Value>;

    /// Replace an existing record. Never creates one.
    async fn update(&self, collection: Collection, key: &str, record: &Value) -> Result<()>;

    async fn delete(&self, collection: Collection, key: &str) -> Result<()>;

    /// All keys of a collection. Failures surface as `Error::Enumeration`.
    async fn list(&self, collection: Collection) -> Result<Vec<String>>;
}

/// One JSON file per record under `<base_dir>/<collection>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    /// Create the directories for every collection.
    pub async fn init(&self) -> Result<()> {
        for collection in [Collection::Users, Collection::Tokens, Collection::Checks] {
            fs::create_dir_all(self.collection_dir(collection)).await?;
        }
        Ok(())
    }

    fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.base_dir.join(collection.as_str())
    }

    fn record_path(&self, collection: Collection, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.collection_dir(collection).join(format!("{key}.json")))
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
        return Err(Error::validation(format!("invalid record key: {key:?}")));
    }
    Ok(())
}

async fn write_replacing(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp, path).await
}

#[async_trait]
impl RecordStore for FileStore {
    async fn create(&self, collection: Collection, key: &str, record: &Value) -> Result<()> {
        let path = self.record_path(collection, key)?;
        let bytes = serde_json::to_vec(record)?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => Error::store(format!("{collection}/{key} already exists")),
                _ => Error::store(format!("could not create {collection}/{key}: {e}")),
            })?;
        file.write_all(&bytes)
            .await
            .map_err(|e| Error::store(format!("could not write {collection}/{key}: {e}")))?;

        debug!(%collection, key, "record created");
        Ok(())
    }

    async fn read(&self, collection: Collection, key: &str) -> Result<Value> {
        let path = self.record_path(collection, key)?;
        let raw = fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::not_found(format!("{collection}/{key}")),
            _ => Error::store(format!("could not read {collection}/{key}: {e}")),
        })?;

        serde_json::from_str(&raw)
            .map_err(|e| Error::store(format!("{collection}/{key} is not valid JSON: {e}")))
    }

    async fn update(&self, collection: Collection, key: &str, record: &Value) -> Result<()> {
        let path = self.record_path(collection, key)?;
        if let Err(e) = fs::metadata(&path).await {
            return Err(match e.kind() {
                ErrorKind::NotFound => Error::store(format!("{collection}/{key} does not exist")),
                _ => Error::store(format!("could not open {collection}/{key}: {e}")),
            });
        }

        let bytes = serde_json::to_vec(record)?;
        write_replacing(&path, &bytes)
            .await
            .map_err(|e| Error::store(format!("could not update {collection}/{key}: {e}")))?;

        debug!(%collection, key, "record updated");
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<()> {
        let path = self.record_path(collection, key)?;
        fs::remove_file(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::not_found(format!("{collection}/{key}")),
            _ => Error::store(format!("could not delete {collection}/{key}: {e}")),
        })
    }

    async fn list(&self, collection: Collection) -> Result<Vec<String>> {
        let dir = self.collection_dir(collection);
        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| Error::enumeration(format!("could not list {collection}: {e}")))?;

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::enumeration(format!("could not list {collection}: {e}")))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
