//! Fetch pipeline: pull audio for each link into the staging directory
//!
//! Extraction is retried per link under a fixed backoff. The extractor reports
//! the media title but not the file it wrote, so each success is reconciled
//! against the staging directory by normalized title.

mod ytdlp;

pub use ytdlp::YtDlpExtractor;

use crate::config::RetryConfig;
use crate::error::FetchError;
use crate::retry::with_retry;
use crate::utils::normalize_title;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// Metadata reported by an extractor for one link
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct MediaInfo {
    /// Media title, if the source reported one
    #[serde(default)]
    pub title: Option<String>,
}

/// Per-job extraction options
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchOptions {
    /// Audio quality in kbit/s, passed through untouched
    pub bitrate: String,
    /// Target audio container/codec (e.g. `mp3`)
    pub audio_format: String,
}

/// Source of audio files for links
///
/// Implementations write the audio into `dest_dir` and return what they know
/// about it. An empty or unparseable answer should be an error so the pipeline
/// retries it.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Fetch `url` into `dest_dir`
    async fn extract(
        &self,
        url: &Url,
        dest_dir: &Path,
        options: &FetchOptions,
    ) -> std::result::Result<MediaInfo, FetchError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Outcome of fetching a batch of links
///
/// Covers every distinct input link exactly once, in input order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchResult {
    entries: Vec<(Url, Option<PathBuf>)>,
}

impl FetchResult {
    /// Record the outcome for `link`; a link already present is ignored
    pub fn insert(&mut self, link: Url, path: Option<PathBuf>) {
        if !self.contains(&link) {
            self.entries.push((link, path));
        }
    }

    /// Whether `link` has an entry
    pub fn contains(&self, link: &Url) -> bool {
        self.entries.iter().any(|(l, _)| l == link)
    }

    /// Local file for `link`, `None` when it failed or is not in the result
    pub fn get(&self, link: &Url) -> Option<&Path> {
        self.entries
            .iter()
            .find(|(l, _)| l == link)
            .and_then(|(_, p)| p.as_deref())
    }

    /// All entries in input order
    pub fn iter(&self) -> impl Iterator<Item = (&Url, Option<&Path>)> {
        self.entries.iter().map(|(l, p)| (l, p.as_deref()))
    }

    /// Local files of the successful links, in input order
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().filter_map(|(_, p)| p.as_deref())
    }

    /// Number of links covered
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no link was covered at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of links that produced a file
    pub fn fetched_count(&self) -> usize {
        self.files().count()
    }

    /// Number of links that did not
    pub fn failed_count(&self) -> usize {
        self.len() - self.fetched_count()
    }
}

/// Retrying, reconciling front end over a [`MediaExtractor`]
#[derive(Clone)]
pub struct FetchPipeline {
    extractor: Arc<dyn MediaExtractor>,
    retry: RetryConfig,
}

impl FetchPipeline {
    /// Create a pipeline; `retry.max_attempts` is the per-link attempt budget
    pub fn new(extractor: Arc<dyn MediaExtractor>, retry: RetryConfig) -> Self {
        Self { extractor, retry }
    }

    /// Fetch every link into `dest_dir`
    ///
    /// Never fails as a whole: a link whose extraction keeps failing, whose
    /// answer has no title, or whose file cannot be found afterwards maps to
    /// `None`.
    pub async fn fetch(&self, links: &[Url], dest_dir: &Path, options: &FetchOptions) -> FetchResult {
        let mut result = FetchResult::default();

        if let Err(e) = tokio::fs::create_dir_all(dest_dir).await {
            tracing::error!(path = %dest_dir.display(), error = %e, "Cannot create staging directory");
            for link in links {
                result.insert(link.clone(), None);
            }
            return result;
        }

        for link in links {
            if result.contains(link) {
                tracing::debug!(url = %link, "Skipping duplicate link");
                continue;
            }
            let path = self.fetch_one(link, dest_dir, options).await;
            result.insert(link.clone(), path);
        }

        tracing::info!(
            fetched = result.fetched_count(),
            failed = result.failed_count(),
            extractor = self.extractor.name(),
            "Fetch finished"
        );
        result
    }

    async fn fetch_one(&self, link: &Url, dest_dir: &Path, options: &FetchOptions) -> Option<PathBuf> {
        let info = match with_retry(&self.retry, || self.extractor.extract(link, dest_dir, options)).await {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(url = %link, error = %e, "Extraction failed");
                return None;
            }
        };

        let Some(title) = info.title else {
            tracing::warn!(url = %link, "Extractor reported no title");
            return None;
        };

        match reconcile(dest_dir, &title).await {
            Some(path) => {
                tracing::info!(url = %link, title = %title, path = %path.display(), "Fetched");
                Some(path)
            }
            None => {
                tracing::warn!(url = %link, title = %title, "No staged file matches title");
                None
            }
        }
    }
}

/// Find the staged file for `title`
///
/// Returns the first file, in directory-listing order, whose normalized name
/// contains the normalized title. A title that normalizes to nothing matches
/// nothing.
pub async fn reconcile(dir: &Path, title: &str) -> Option<PathBuf> {
    let wanted = normalize_title(title);
    if wanted.is_empty() {
        return None;
    }

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(path = %dir.display(), error = %e, "Cannot list staging directory");
            return None;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let name = entry.file_name();
        if normalize_title(&name.to_string_lossy()).contains(&wanted) {
            return Some(entry.path());
        }
    }
    None
}
