//! WebDAV storage backend
//!
//! Login is an authenticated `PROPFIND` on the account root. Capacity comes
//! from the RFC 4331 quota properties. Folders are collections addressed by
//! path below the root, so a folder handle is simply its URL.

use super::{FolderId, StorageBackend, StorageSession, StorageSpace, UploadedFile};
use crate::config::RelayConfig;
use crate::error::RelayError;
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Method, StatusCode};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use url::Url;

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:resourcetype/>
    <d:getcontentlength/>
    <d:quota-available-bytes/>
    <d:quota-used-bytes/>
  </d:prop>
</d:propfind>"#;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// [`StorageBackend`] for a WebDAV account (Nextcloud, ownCloud, Apache mod_dav...)
#[derive(Clone)]
pub struct WebDavBackend {
    client: reqwest::Client,
    root: Url,
    username: String,
    password: String,
}

impl WebDavBackend {
    /// Build a backend from the relay configuration
    pub fn new(config: &RelayConfig) -> std::result::Result<Self, RelayError> {
        let mut root = Url::parse(&config.base_url)
            .map_err(|e| RelayError::Connection(format!("invalid base url {}: {}", config.base_url, e)))?;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RelayError::Connection(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            root,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait]
impl StorageBackend for WebDavBackend {
    async fn login(&self) -> std::result::Result<Box<dyn StorageSession>, RelayError> {
        let session = WebDavSession {
            backend: self.clone(),
        };

        let response = session
            .propfind(&self.root)
            .await
            .map_err(|e| RelayError::Connection(e.to_string()))?;

        match response.status() {
            StatusCode::MULTI_STATUS | StatusCode::OK => Ok(Box::new(session)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RelayError::Connection(
                format!("authentication rejected for {}", self.username),
            )),
            status => Err(RelayError::Connection(format!(
                "unexpected status {} from {}",
                status, self.root
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "webdav"
    }
}

/// Authenticated WebDAV session
pub struct WebDavSession {
    backend: WebDavBackend,
}

impl WebDavSession {
    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.backend
            .client
            .request(method, url)
            .basic_auth(&self.backend.username, Some(&self.backend.password))
    }

    async fn propfind(&self, url: &Url) -> reqwest::Result<reqwest::Response> {
        self.request(propfind_method(), url.clone())
            .header("Depth", "0")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(PROPFIND_BODY)
            .send()
            .await
    }

    async fn propfind_body(&self, url: &Url) -> std::result::Result<Option<String>, RelayError> {
        let response = self
            .propfind(url)
            .await
            .map_err(|e| RelayError::Protocol(e.to_string()))?;
        match response.status() {
            StatusCode::MULTI_STATUS | StatusCode::OK => response
                .text()
                .await
                .map(Some)
                .map_err(|e| RelayError::Protocol(e.to_string())),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(RelayError::Protocol(format!("PROPFIND {} returned {}", url, status))),
        }
    }

    /// Collection URL for a slash-separated folder name
    fn folder_url(&self, name: &str) -> std::result::Result<Url, RelayError> {
        let mut url = self.backend.root.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RelayError::Protocol(format!("{} cannot be a base", self.backend.root)))?;
            segments
                .pop_if_empty()
                .extend(name.split('/').filter(|s| !s.is_empty()))
                .push("");
        }
        Ok(url)
    }
}

#[async_trait]
impl StorageSession for WebDavSession {
    async fn storage_space(&self) -> std::result::Result<StorageSpace, RelayError> {
        let body = self
            .propfind_body(&self.backend.root)
            .await?
            .ok_or_else(|| RelayError::Protocol("account root not found".to_string()))?;

        let used = dav_property(&body, "quota-used-bytes").unwrap_or(0);
        // Servers without quota support report nothing (or a negative value)
        let total = match dav_property(&body, "quota-available-bytes") {
            Some(available) => available.saturating_add(used),
            None => u64::MAX,
        };
        Ok(StorageSpace { total, used })
    }

    async fn find(&self, name: &str) -> std::result::Result<Option<FolderId>, RelayError> {
        let url = self.folder_url(name)?;
        Ok(self
            .propfind_body(&url)
            .await?
            .map(|_| FolderId(url.to_string())))
    }

    async fn create_folder(&self, name: &str) -> std::result::Result<Option<FolderId>, RelayError> {
        let segments: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Ok(None);
        }

        for depth in 1..=segments.len() {
            let url = self.folder_url(&segments[..depth].join("/"))?;
            let response = self
                .request(mkcol_method(), url.clone())
                .send()
                .await
                .map_err(|e| RelayError::Protocol(e.to_string()))?;

            match response.status() {
                StatusCode::CREATED => tracing::debug!(url = %url, "Collection created"),
                // Already there
                StatusCode::METHOD_NOT_ALLOWED => {}
                status => {
                    return Err(RelayError::Protocol(format!("MKCOL {} returned {}", url, status)));
                }
            }
        }

        Ok(Some(FolderId(self.folder_url(name)?.to_string())))
    }

    async fn upload(
        &self,
        path: &Path,
        parent: &FolderId,
    ) -> std::result::Result<UploadedFile, RelayError> {
        let transfer_error = |reason: String| RelayError::Transfer {
            path: path.to_path_buf(),
            reason,
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| transfer_error("path has no file name".to_string()))?;

        let mut target = Url::parse(&parent.0)
            .map_err(|e| RelayError::Protocol(format!("bad folder handle {}: {}", parent, e)))?;
        target
            .path_segments_mut()
            .map_err(|_| RelayError::Protocol(format!("bad folder handle {}", parent)))?
            .pop_if_empty()
            .push(&file_name);

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| transfer_error(e.to_string()))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| transfer_error(e.to_string()))?
            .len();

        // Streamed from disk; media files can be large
        let response = self
            .request(Method::PUT, target.clone())
            .header(CONTENT_LENGTH, length)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await
            .map_err(|e| transfer_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(transfer_error(format!("PUT returned {}", status)));
        }

        // The size check is advisory, so a failed PROPFIND just leaves it unknown
        let size = match self.propfind_body(&target).await {
            Ok(Some(body)) => dav_property(&body, "getcontentlength"),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(url = %target, error = %e, "Could not read uploaded size");
                None
            }
        };

        Ok(UploadedFile { size })
    }
}

fn propfind_method() -> Method {
    static PROPFIND: OnceLock<Method> = OnceLock::new();
    PROPFIND
        .get_or_init(|| Method::from_bytes(b"PROPFIND").unwrap_or(Method::GET))
        .clone()
}

fn mkcol_method() -> Method {
    static MKCOL: OnceLock<Method> = OnceLock::new();
    MKCOL
        .get_or_init(|| Method::from_bytes(b"MKCOL").unwrap_or(Method::PUT))
        .clone()
}

/// First non-negative integer value of a DAV property in a multistatus body
fn dav_property(body: &str, property: &str) -> Option<u64> {
    static PROPERTY: OnceLock<Option<Regex>> = OnceLock::new();
    let re = PROPERTY
        .get_or_init(|| {
            Regex::new(r"<(?:[A-Za-z][\w.-]*:)?([a-z-]+)(?:\s[^>]*)?>\s*(-?\d+)\s*</").ok()
        })
        .as_ref()?;

    re.captures_iter(body)
        .filter(|c| &c[1] == property)
        .find_map(|c| c[2].parse::<u64>().ok())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{basic_auth, body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn multistatus(props: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:">
  <d:response>
    <d:href>/remote.php/webdav/</d:href>
    <d:propstat>
      <d:prop>{}</d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>
</d:multistatus>"#,
            props
        )
    }

    fn backend(server: &MockServer) -> WebDavBackend {
        let config = RelayConfig {
            base_url: format!("{}/dav", server.uri()),
            username: "alice".to_string(),
            password: "secret".to_string(),
            ..RelayConfig::default()
        };
        WebDavBackend::new(&config).unwrap()
    }

    async fn mount_root(server: &MockServer) {
        Mock::given(method("PROPFIND"))
            .and(path("/dav/"))
            .and(basic_auth("alice", "secret"))
            .and(header("Depth", "0"))
            .respond_with(ResponseTemplate::new(207).set_body_string(multistatus(
                "<d:quota-available-bytes>1000</d:quota-available-bytes>\
                 <d:quota-used-bytes>24</d:quota-used-bytes>",
            )))
            .mount(server)
            .await;
    }

    #[test]
    fn test_dav_property() {
        let body = multistatus(
            "<d:getcontentlength>123</d:getcontentlength>\
             <d:quota-available-bytes>-3</d:quota-available-bytes>\
             <quota-used-bytes xmlns=\"DAV:\">7</quota-used-bytes>",
        );
        assert_eq!(dav_property(&body, "getcontentlength"), Some(123));
        assert_eq!(dav_property(&body, "quota-available-bytes"), None);
        assert_eq!(dav_property(&body, "quota-used-bytes"), Some(7));
        assert_eq!(dav_property(&body, "missing"), None);
    }

    #[tokio::test]
    async fn test_login_and_capacity() {
        let server = MockServer::start().await;
        mount_root(&server).await;

        let session = backend(&server).login().await.unwrap();
        let space = session.storage_space().await.unwrap();
        assert_eq!(space, StorageSpace { total: 1024, used: 24 });
        assert_eq!(space.free(), 1000);
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("PROPFIND"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = backend(&server).login().await.err().unwrap();
        assert!(matches!(err, RelayError::Connection(_)));
    }

    #[tokio::test]
    async fn test_find_folder() {
        let server = MockServer::start().await;
        mount_root(&server).await;
        Mock::given(method("PROPFIND"))
            .and(path("/dav/Music/"))
            .respond_with(ResponseTemplate::new(207).set_body_string(multistatus("<d:resourcetype><d:collection/></d:resourcetype>")))
            .mount(&server)
            .await;
        Mock::given(method("PROPFIND"))
            .and(path("/dav/temp/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let session = backend(&server).login().await.unwrap();
        let found = session.find("Music").await.unwrap().unwrap();
        assert_eq!(found.0, format!("{}/dav/Music/", server.uri()));
        assert!(session.find("temp").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_nested_folder() {
        let server = MockServer::start().await;
        mount_root(&server).await;
        Mock::given(method("MKCOL"))
            .and(path("/dav/Music/"))
            .respond_with(ResponseTemplate::new(405))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("MKCOL"))
            .and(path("/dav/Music/2024/"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let session = backend(&server).login().await.unwrap();
        let id = session.create_folder("Music/2024").await.unwrap().unwrap();
        assert_eq!(id.0, format!("{}/dav/Music/2024/", server.uri()));
    }

    #[tokio::test]
    async fn test_create_folder_error() {
        let server = MockServer::start().await;
        mount_root(&server).await;
        Mock::given(method("MKCOL"))
            .respond_with(ResponseTemplate::new(507))
            .mount(&server)
            .await;

        let session = backend(&server).login().await.unwrap();
        assert!(session.create_folder("temp").await.is_err());
    }

    #[tokio::test]
    async fn test_upload_reports_remote_size() {
        let server = MockServer::start().await;
        mount_root(&server).await;
        Mock::given(method("PUT"))
            .and(path("/dav/temp/Pesnya_Title.mp3"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PROPFIND"))
            .and(path("/dav/temp/Pesnya_Title.mp3"))
            .respond_with(ResponseTemplate::new(207).set_body_string(multistatus(
                "<d:getcontentlength>5</d:getcontentlength>",
            )))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("Pesnya_Title.mp3");
        std::fs::write(&file, b"audio").unwrap();

        let session = backend(&server).login().await.unwrap();
        let parent = FolderId(format!("{}/dav/temp/", server.uri()));
        let uploaded = session.upload(&file, &parent).await.unwrap();
        assert_eq!(uploaded.size, Some(5));
    }

    #[tokio::test]
    async fn test_upload_streams_whole_file() {
        let server = MockServer::start().await;
        mount_root(&server).await;

        // Larger than a single read buffer
        let content: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        Mock::given(method("PUT"))
            .and(path("/dav/temp/long.mp3"))
            .and(header("content-length", "300000"))
            .and(body_bytes(content.clone()))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("long.mp3");
        std::fs::write(&file, &content).unwrap();

        let session = backend(&server).login().await.unwrap();
        let parent = FolderId(format!("{}/dav/temp/", server.uri()));
        assert!(session.upload(&file, &parent).await.is_ok());
    }

    #[tokio::test]
    async fn test_upload_of_missing_file_is_transfer_error() {
        let server = MockServer::start().await;
        mount_root(&server).await;

        let dir = tempfile::TempDir::new().unwrap();
        let session = backend(&server).login().await.unwrap();
        let parent = FolderId(format!("{}/dav/temp/", server.uri()));
        let err = session
            .upload(&dir.path().join("gone.mp3"), &parent)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Transfer { .. }));
    }

    #[tokio::test]
    async fn test_upload_failure_is_transfer_error() {
        let server = MockServer::start().await;
        mount_root(&server).await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("a.mp3");
        std::fs::write(&file, b"audio").unwrap();

        let session = backend(&server).login().await.unwrap();
        let parent = FolderId(format!("{}/dav/temp/", server.uri()));
        let err = session.upload(&file, &parent).await.unwrap_err();
        assert!(matches!(err, RelayError::Transfer { .. }));
    }
}
