//! Job requests and validated job descriptors

use crate::config::Config;
use crate::error::ValidationError;
use crate::utils::parse_http_link;
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

/// Most links a single job may carry
pub const MAX_LINKS: usize = 9;

/// The only media source kind jobs are accepted for
pub const SOURCE_KIND: &str = "youtube";

/// Raw job submission as delivered by the web layer
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobRequest {
    /// Gate slot key for the submitting session
    pub session_key: String,

    /// Media links, in submission order
    #[serde(default)]
    pub links: Vec<String>,

    /// Remote folder name (empty uses the configured default)
    #[serde(default)]
    pub path: String,

    /// Audio quality in kbit/s (empty uses the configured default)
    #[serde(default)]
    pub bitrate: String,

    /// Convert Cyrillic file names to Latin before upload
    #[serde(default = "default_transliterate")]
    pub transliterate: bool,

    /// Media source kind
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_transliterate() -> bool {
    true
}

fn default_source() -> String {
    SOURCE_KIND.to_string()
}

/// A validated job, owned by the orchestrator run that executes it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobDescriptor {
    /// Gate slot key
    pub session_key: String,
    /// 1..=9 http(s) links
    pub links: Vec<Url>,
    /// Remote folder name, never empty
    pub destination_path: String,
    /// Audio quality hint handed to the extractor as-is
    pub bitrate: String,
    /// Run the transliteration step of the sanitizer
    pub transliterate: bool,
}

impl JobDescriptor {
    /// Validate a raw request, filling empty fields from `config`
    ///
    /// Blank entries and anything that is not an absolute http(s) URL are
    /// dropped. A request with more than [`MAX_LINKS`] entries is refused
    /// outright, before filtering.
    pub fn from_request(
        request: JobRequest,
        config: &Config,
    ) -> std::result::Result<Self, ValidationError> {
        let session_key = request.session_key.trim().to_string();
        if session_key.is_empty() {
            return Err(ValidationError::MissingSessionKey);
        }

        if request.source != SOURCE_KIND {
            return Err(ValidationError::UnsupportedSource(request.source));
        }

        if request.links.len() > MAX_LINKS {
            return Err(ValidationError::TooManyLinks {
                count: request.links.len(),
                max: MAX_LINKS,
            });
        }

        let links: Vec<Url> = request
            .links
            .iter()
            .filter_map(|raw| parse_http_link(raw))
            .collect();
        if links.is_empty() {
            return Err(ValidationError::NoValidLinks);
        }

        let destination_path = match request.path.trim() {
            "" => config.relay.default_folder.clone(),
            path => path.to_string(),
        };
        let bitrate = match request.bitrate.trim() {
            "" => config.fetch.default_bitrate.clone(),
            bitrate => bitrate.to_string(),
        };

        Ok(Self {
            session_key,
            links,
            destination_path,
            bitrate,
            transliterate: request.transliterate,
        })
    }
}
