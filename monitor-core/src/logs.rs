//! Per-check line-delimited logs and their compressed archives.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use std::{
    io::{ErrorKind, Read, Write},
    path::PathBuf,
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

use crate::error::{Error, Result};

const LOG_EXT: &str = ".log";
const ARCHIVE_EXT: &str = ".gz.b64";

/// Result of compressing a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archive {
    Written,
    /// The source log held nothing, no archive was created.
    Empty,
}

#[async_trait]
pub trait LogSink: Send + Sync {
    /// Append one line to `<name>.log`, creating the log if needed.
    async fn append(&self, name: &str, line: &str) -> Result<()>;

    /// Names of the open logs, plus the archives when `include_compressed`.
    async fn list(&self, include_compressed: bool) -> Result<Vec<String>>;

    /// Write the contents of log `name` into archive `new_name`.
    async fn compress(&self, name: &str, new_name: &str) -> Result<Archive>;

    /// Contents of archive `name` as text.
    async fn decompress(&self, name: &str) -> Result<String>;

    /// Empty log `name`.
    async fn truncate(&self, name: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileLogSink {
    base_dir: PathBuf,
}

impl FileLogSink {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }

    fn path(&self, name: &str, ext: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(Error::validation(format!("invalid log name: {name:?}")));
        }
        Ok(self.base_dir.join(format!("{name}{ext}")))
    }
}

fn gzip_base64(input: &[u8]) -> std::io::Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(input)?;
    Ok(STANDARD.encode(encoder.finish()?))
}

fn gunzip_base64(input: &str) -> std::io::Result<String> {
    let bytes = STANDARD
        .decode(input.trim())
        .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
    let mut out = String::new();
    GzDecoder::new(bytes.as_slice()).read_to_string(&mut out)?;
    Ok(out)
}

#[async_trait]
impl LogSink for FileLogSink {
    async fn append(&self, name: &str, line: &str) -> Result<()> {
        let path = self.path(name, LOG_EXT)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Error::log_sink(format!("could not open {name} for appending: {e}")))?;

        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| Error::log_sink(format!("could not append to {name}: {e}")))?;
        file.flush().await?;
        Ok(())
    }

    async fn list(&self, include_compressed: bool) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(&self.base_dir)
            .await
            .map_err(|e| Error::log_sink(format!("could not list logs: {e}")))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else { continue };

            if let Some(name) = file_name.strip_suffix(LOG_EXT) {
                names.push(name.to_string());
            } else if include_compressed {
                if let Some(name) = file_name.strip_suffix(ARCHIVE_EXT) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn compress(&self, name: &str, new_name: &str) -> Result<Archive> {
        let source = self.path(name, LOG_EXT)?;
        let dest = self.path(new_name, ARCHIVE_EXT)?;

        let input = fs::read(&source)
            .await
            .map_err(|e| Error::log_sink(format!("could not read {name}: {e}")))?;
        if input.is_empty() {
            return Ok(Archive::Empty);
        }

        let encoded = tokio::task::spawn_blocking(move || gzip_base64(&input))
            .await
            .map_err(|e| Error::log_sink(format!("compression task failed: {e}")))?
            .map_err(|e| Error::log_sink(format!("could not compress {name}: {e}")))?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&dest)
            .await
            .map_err(|e| Error::log_sink(format!("could not create archive {new_name}: {e}")))?;
        file.write_all(encoded.as_bytes()).await?;
        file.sync_all().await?;

        debug!(log = name, archive = new_name, "log compressed");
        Ok(Archive::Written)
    }

    async fn decompress(&self, name: &str) -> Result<String> {
        let path = self.path(name, ARCHIVE_EXT)?;
        let raw = fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::not_found(format!("archive {name}")),
            _ => Error::log_sink(format!("could not read archive {name}: {e}")),
        })?;

        tokio::task::spawn_blocking(move || gunzip_base64(&raw))
            .await
            .map_err(|e| Error::log_sink(format!("decompression task failed: {e}")))?
            .map_err(|e| Error::log_sink(format!("could not decompress {name}: {e}")))
    }

    async fn truncate(&self, name: &str) -> Result<()> {
        let path = self.path(name, LOG_EXT)?;
        let file = fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .map_err(|e| Error::log_sink(format!("could not open {name} for truncation: {e}")))?;
        file.set_len(0)
            .await
            .map_err(|e| Error::log_sink(format!("could not truncate {name}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn sink() -> (tempfile::TempDir, FileLogSink) {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileLogSink::new(dir.path());
        sink.init().await.unwrap();
        (dir, sink)
    }

    #[tokio::test]
    async fn compress_then_truncate_keeps_contents_in_archive() {
        let (dir, sink) = sink().await;
        sink.append("check1", r#"{"n":1}"#).await.unwrap();
        sink.append("check1", r#"{"n":2}"#).await.unwrap();

        assert_eq!(sink.compress("check1", "check1-100").await.unwrap(), Archive::Written);
        sink.truncate("check1").await.unwrap();

        assert_eq!(sink.decompress("check1-100").await.unwrap(), "{\"n\":1}\n{\"n\":2}\n");
        let log = std::fs::read_to_string(dir.path().join("check1.log")).unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn list_only_includes_archives_on_request() {
        let (_dir, sink) = sink().await;
        sink.append("a", "x").await.unwrap();
        sink.append("b", "y").await.unwrap();
        sink.compress("a", "a-1").await.unwrap();

        assert_eq!(sink.list(false).await.unwrap(), vec!["a", "b"]);
        assert_eq!(sink.list(true).await.unwrap(), vec!["a", "a-1", "b"]);
    }

    #[tokio::test]
    async fn empty_log_produces_no_archive() {
        let (dir, sink) = sink().await;
        sink.append("a", "x").await.unwrap();
        sink.truncate("a").await.unwrap();

        assert_eq!(sink.compress("a", "a-1").await.unwrap(), Archive::Empty);
        assert!(!dir.path().join("a-1.gz.b64").exists());
    }

    #[tokio::test]
    async fn compress_never_overwrites_an_archive() {
        let (_dir, sink) = sink().await;
        sink.append("a", "x").await.unwrap();
        sink.compress("a", "a-1").await.unwrap();

        assert!(matches!(sink.compress("a", "a-1").await, Err(Error::LogSink(_))));
    }
}
