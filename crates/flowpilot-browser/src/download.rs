//! Saving generated videos to disk

use crate::error::{FlowError, Result};
use crate::human::Human;
use flowpilot_core::Snapshot;
use std::path::{Path, PathBuf};
use tracing::info;

/// `<prefix>_<unix-ms>_<index>.mp4`, index starting at 1
pub fn artifact_file_name(prefix: &str, timestamp_ms: i64, index: usize) -> String {
    format!("{}_{}_{}.mp4", prefix, timestamp_ms, index)
}

/// Fetches result URLs into a download directory
pub struct Downloader {
    client: reqwest::Client,
    dir: PathBuf,
    human: Human,
}

impl Downloader {
    pub fn new(dir: impl Into<PathBuf>, human: Human) -> Self {
        Self {
            client: reqwest::Client::new(),
            dir: dir.into(),
            human,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Download every URL in order, pausing briefly between files
    pub async fn download_all(&self, urls: &Snapshot, prefix: &str) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut saved = Vec::with_capacity(urls.len());
        for (i, url) in urls.iter().enumerate() {
            let name = artifact_file_name(prefix, chrono::Utc::now().timestamp_millis(), i + 1);
            let path = self.dir.join(&name);
            info!("Downloading ({}/{}): {}", i + 1, urls.len(), name);

            self.download_file(url, &path).await?;
            saved.push(path);
            self.human.pause(300, 600).await;
        }

        if !saved.is_empty() {
            info!("All downloads saved to {}", self.dir.display());
        }
        Ok(saved)
    }

    /// Fetch one URL and write the body to `path`
    pub async fn download_file(&self, url: &str, path: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FlowError::Download(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FlowError::Download(format!("{}: HTTP {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FlowError::Download(format!("{}: {}", url, e)))?;
        tokio::fs::write(path, &bytes).await?;
        Ok(())
    }
}
