//! Extractor backed by the external yt-dlp binary

use super::{FetchOptions, MediaExtractor, MediaInfo};
use crate::config::FetchConfig;
use crate::error::FetchError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use url::Url;

const BINARY_NAME: &str = "yt-dlp";

/// [`MediaExtractor`] that shells out to `yt-dlp`
///
/// Audio is extracted and converted by yt-dlp itself (which needs ffmpeg on
/// the host). The info JSON printed with `-j --no-simulate` supplies the
/// title; the file name on disk is whatever yt-dlp settled on.
///
/// # Examples
///
/// ```no_run
/// use audio_relay::fetch::YtDlpExtractor;
///
/// let extractor = YtDlpExtractor::from_path()
///     .expect("yt-dlp not found in PATH");
/// ```
pub struct YtDlpExtractor {
    binary_path: PathBuf,
}

impl YtDlpExtractor {
    /// Create an extractor with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Look `yt-dlp` up in PATH
    pub fn from_path() -> Option<Self> {
        which::which(BINARY_NAME).ok().map(Self::new)
    }

    /// Use the configured binary, else PATH, else the bare name
    ///
    /// When nothing is found the bare name is kept so that the failure shows
    /// up per job as [`FetchError::ToolNotFound`].
    pub fn from_config(config: &FetchConfig) -> Self {
        if let Some(path) = &config.binary_path {
            return Self::new(path.clone());
        }
        Self::from_path().unwrap_or_else(|| {
            tracing::warn!("yt-dlp not found in PATH, fetches will fail until it is installed");
            Self::new(PathBuf::from(BINARY_NAME))
        })
    }

    /// Binary this extractor runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    fn build_args(url: &Url, dest_dir: &Path, options: &FetchOptions) -> Vec<OsString> {
        let mut template = dest_dir.as_os_str().to_owned();
        template.push("/%(title)s.%(ext)s");

        vec![
            "-x".into(),
            "--audio-format".into(),
            options.audio_format.clone().into(),
            "--audio-quality".into(),
            format!("{}K", options.bitrate).into(),
            "--no-playlist".into(),
            "-o".into(),
            template,
            "-j".into(),
            "--no-simulate".into(),
            url.as_str().into(),
        ]
    }
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn extract(
        &self,
        url: &Url,
        dest_dir: &Path,
        options: &FetchOptions,
    ) -> std::result::Result<MediaInfo, FetchError> {
        let output = Command::new(&self.binary_path)
            .args(Self::build_args(url, dest_dir, options))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    FetchError::ToolNotFound(self.binary_path.display().to_string())
                }
                _ => FetchError::Extraction {
                    url: url.to_string(),
                    reason: format!("failed to execute yt-dlp: {}", e),
                },
            })?;

        if !output.status.success() {
            return Err(FetchError::Extraction {
                url: url.to_string(),
                reason: last_error_line(&output.stderr)
                    .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status)),
            });
        }

        parse_info(&output.stdout)
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

/// Parse the first JSON object printed by `yt-dlp -j`
pub(crate) fn parse_info(stdout: &[u8]) -> std::result::Result<MediaInfo, FetchError> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| FetchError::InvalidOutput("empty output".to_string()))?;

    let info: MediaInfo =
        serde_json::from_str(line).map_err(|e| FetchError::InvalidOutput(e.to_string()))?;
    // An empty title is as good as none
    Ok(MediaInfo {
        title: info.title.filter(|t| !t.trim().is_empty()),
    })
}

fn last_error_line(stderr: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args() {
        let url = Url::parse("https://www.youtube.com/watch?v=abc").unwrap();
        let options = FetchOptions {
            bitrate: "128".to_string(),
            audio_format: "mp3".to_string(),
        };
        let args = YtDlpExtractor::build_args(&url, Path::new("/srv/data"), &options);
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(args[0], "-x");
        assert!(args.windows(2).any(|w| w == ["--audio-format", "mp3"]));
        assert!(args.windows(2).any(|w| w == ["--audio-quality", "128K"]));
        assert!(args.windows(2).any(|w| w == ["-o", "/srv/data/%(title)s.%(ext)s"]));
        assert!(args.contains(&"-j".to_string()));
        assert!(args.contains(&"--no-simulate".to_string()));
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc");
    }

    #[test]
    fn test_parse_info() {
        let info = parse_info(b"{\"id\":\"abc\",\"title\":\"Song Title\",\"ext\":\"webm\"}\n").unwrap();
        assert_eq!(info.title.as_deref(), Some("Song Title"));

        let info = parse_info(b"{\"id\":\"abc\"}").unwrap();
        assert_eq!(info.title, None);

        let info = parse_info(b"{\"title\":\"  \"}").unwrap();
        assert_eq!(info.title, None);
    }

    #[test]
    fn test_parse_info_rejects_garbage() {
        assert!(matches!(parse_info(b""), Err(FetchError::InvalidOutput(_))));
        assert!(matches!(parse_info(b"\n  \n"), Err(FetchError::InvalidOutput(_))));
        assert!(matches!(parse_info(b"ERROR: nope"), Err(FetchError::InvalidOutput(_))));
    }

    #[test]
    fn test_last_error_line() {
        let stderr = b"WARNING: something\nERROR: [youtube] abc: Video unavailable\n\n";
        assert_eq!(
            last_error_line(stderr).as_deref(),
            Some("ERROR: [youtube] abc: Video unavailable")
        );
        assert_eq!(last_error_line(b""), None);
    }

    #[test]
    fn test_from_config_prefers_configured_path() {
        let config = FetchConfig {
            binary_path: Some(PathBuf::from("/opt/bin/yt-dlp")),
            ..FetchConfig::default()
        };
        let extractor = YtDlpExtractor::from_config(&config);
        assert_eq!(extractor.binary_path(), Path::new("/opt/bin/yt-dlp"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_not_found() {
        let extractor = YtDlpExtractor::new(PathBuf::from("/nonexistent/yt-dlp-xyz"));
        let url = Url::parse("http://a").unwrap();
        let options = FetchOptions {
            bitrate: "96".to_string(),
            audio_format: "mp3".to_string(),
        };
        let err = extractor
            .extract(&url, Path::new("/tmp"), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::ToolNotFound(_)));
    }
}
