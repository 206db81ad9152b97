//! GitHub gist client holding the synced collection.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::SyncPayload;
use crate::util::{compact_text, is_http_url, normalize_text_option};

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
/// Well-known gist file name used by every device of the same user.
pub const GIST_FILE_NAME: &str = "cmdkeep-commands.json";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const GIST_DESCRIPTION: &str = "cmdkeep command collection";
const GITHUB_API_VERSION: &str = "2022-11-28";
const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("cmdkeep/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid gist configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Gist HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Gist API error: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid gist payload: {0}")]
    InvalidPayload(String),
}

impl TransportError {
    /// HTTP status of an API error, if any.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Clone)]
pub struct GistConfig {
    pub api_base_url: String,
    pub token: String,
    pub timeout: Duration,
}

impl GistConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            token: token.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for GistConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("GistConfig")
            .field("api_base_url", &self.api_base_url)
            .field("token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Client for the single gist that stores the collection.
///
/// The gist id is plain instance state: it is injected at construction and
/// read back through [`GistClient::gist_id`] after every call, so the caller
/// decides where it is persisted.
#[derive(Clone)]
pub struct GistClient {
    api_base_url: String,
    token: String,
    gist_id: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for GistClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("GistClient")
            .field("api_base_url", &self.api_base_url)
            .field("token", &"[REDACTED]")
            .field("gist_id", &self.gist_id)
            .finish_non_exhaustive()
    }
}

impl GistClient {
    pub fn new(config: GistConfig, gist_id: Option<String>) -> TransportResult<Self> {
        let api_base_url = normalize_base_url(config.api_base_url)?;
        let token = normalize_text_option(Some(config.token)).ok_or_else(|| {
            TransportError::InvalidConfiguration("access token must not be empty".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            api_base_url,
            token,
            gist_id: normalize_text_option(gist_id),
            client,
        })
    }

    pub fn gist_id(&self) -> Option<&str> {
        self.gist_id.as_deref()
    }

    pub const fn has_known_gist(&self) -> bool {
        self.gist_id.is_some()
    }

    pub fn clear_known_gist(&mut self) {
        self.gist_id = None;
    }

    /// Upload `payload` as a new secret gist and adopt its id.
    pub async fn create(&mut self, payload: &SyncPayload) -> TransportResult<()> {
        let body = GistWriteRequest {
            description: Some(GIST_DESCRIPTION),
            public: Some(false),
            files: payload_files(payload)?,
        };

        let response = self
            .request(reqwest::Method::POST, &self.gists_url())
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let gist = response.json::<GistResponse>().await?;

        let id = normalize_text_option(Some(gist.id)).ok_or_else(|| {
            TransportError::InvalidPayload("create response did not include an id".to_string())
        })?;
        tracing::info!(gist_id = %id, "Created sync gist");
        self.gist_id = Some(id);
        Ok(())
    }

    /// Overwrite the gist content, creating the gist when none is known.
    ///
    /// A 404 means the gist was removed out of band: the id is dropped and
    /// the payload is uploaded to a fresh gist exactly once.
    pub async fn update(&mut self, payload: &SyncPayload) -> TransportResult<()> {
        let Some(gist_id) = self.gist_id.clone() else {
            return self.create(payload).await;
        };

        let body = GistWriteRequest {
            description: None,
            public: None,
            files: payload_files(payload)?,
        };
        let response = self
            .request(reqwest::Method::PATCH, &self.gist_url(&gist_id))
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::warn!(gist_id = %gist_id, "Sync gist no longer exists; creating a new one");
            self.clear_known_gist();
            return self.create(payload).await;
        }

        ensure_success(response).await?;
        tracing::debug!(gist_id = %gist_id, "Updated sync gist");
        Ok(())
    }

    /// Download and parse the remote payload.
    ///
    /// Returns `None` when no gist is known, when the gist is gone (the id
    /// is cleared) or when the gist does not hold the collection file yet.
    pub async fn fetch(&mut self) -> TransportResult<Option<SyncPayload>> {
        let Some(gist_id) = self.gist_id.clone() else {
            return Ok(None);
        };

        let response = self
            .request(reqwest::Method::GET, &self.gist_url(&gist_id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::warn!(gist_id = %gist_id, "Sync gist not found; forgetting it");
            self.clear_known_gist();
            return Ok(None);
        }

        let response = ensure_success(response).await?;
        let gist = response.json::<GistResponse>().await?;
        let Some(file) = gist.files.get(GIST_FILE_NAME) else {
            tracing::warn!(gist_id = %gist_id, "Sync gist has no {GIST_FILE_NAME} file");
            return Ok(None);
        };

        let content = match (&file.content, file.truncated, &file.raw_url) {
            (Some(content), false, _) => content.clone(),
            (_, _, Some(raw_url)) => self.fetch_raw(raw_url).await?,
            (Some(content), true, None) => content.clone(),
            (None, _, None) => {
                return Err(TransportError::InvalidPayload(
                    "gist file has neither content nor raw_url".to_string(),
                ))
            }
        };

        SyncPayload::parse(&content)
            .map(Some)
            .map_err(TransportError::InvalidPayload)
    }

    /// Look through the user's gists for the collection file and adopt the first match.
    ///
    /// Best effort: any failure is logged and reported as `false`.
    pub async fn discover(&mut self) -> bool {
        match self.find_existing_gist().await {
            Ok(Some(id)) => {
                tracing::info!(gist_id = %id, "Found existing sync gist");
                self.gist_id = Some(id);
                true
            }
            Ok(None) => false,
            Err(error) => {
                tracing::warn!(error = %error, "Gist discovery failed");
                false
            }
        }
    }

    async fn find_existing_gist(&self) -> TransportResult<Option<String>> {
        let url = format!("{}?per_page=100", self.gists_url());
        let response = self.request(reqwest::Method::GET, &url).send().await?;
        let response = ensure_success(response).await?;
        let gists = response.json::<Vec<GistResponse>>().await?;

        Ok(gists
            .into_iter()
            .find(|gist| gist.files.contains_key(GIST_FILE_NAME))
            .map(|gist| gist.id))
    }

    async fn fetch_raw(&self, raw_url: &str) -> TransportResult<String> {
        if !is_http_url(raw_url) {
            return Err(TransportError::InvalidPayload(format!(
                "unexpected raw_url '{raw_url}'"
            )));
        }
        // Raw URLs of secret gists carry their own access token; ours only
        // goes to the API origin.
        let request = if same_origin(raw_url, &self.api_base_url) {
            self.request(reqwest::Method::GET, raw_url)
        } else {
            self.client.get(raw_url)
        };
        let response = ensure_success(request.send().await?).await?;
        Ok(response.text().await?)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", GITHUB_ACCEPT)
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
    }

    fn gists_url(&self) -> String {
        format!("{}/gists", self.api_base_url)
    }

    fn gist_url(&self, gist_id: &str) -> String {
        format!(
            "{}/gists/{}",
            self.api_base_url,
            urlencoding::encode(gist_id)
        )
    }
}

#[derive(Debug, Serialize)]
struct GistWriteRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public: Option<bool>,
    files: BTreeMap<&'static str, GistFileContent>,
}

#[derive(Debug, Serialize)]
struct GistFileContent {
    content: String,
}

#[derive(Debug, Deserialize)]
struct GistResponse {
    id: String,
    #[serde(default)]
    files: BTreeMap<String, GistFile>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    truncated: bool,
    #[serde(default)]
    raw_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubErrorBody {
    message: Option<String>,
    error: Option<String>,
}

fn payload_files(
    payload: &SyncPayload,
) -> TransportResult<BTreeMap<&'static str, GistFileContent>> {
    let content = payload
        .to_json()
        .map_err(|error| TransportError::InvalidPayload(error.to_string()))?;
    Ok(BTreeMap::from([(GIST_FILE_NAME, GistFileContent { content })]))
}

async fn ensure_success(response: reqwest::Response) -> TransportResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::Api {
        status: status.as_u16(),
        message: parse_api_error(status, &body),
    })
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<GithubErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn same_origin(left: &str, right: &str) -> bool {
    match (reqwest::Url::parse(left), reqwest::Url::parse(right)) {
        (Ok(left), Ok(right)) => left.origin() == right.origin(),
        _ => false,
    }
}

fn normalize_base_url(raw: String) -> TransportResult<String> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        TransportError::InvalidConfiguration("API base URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(TransportError::InvalidConfiguration(
            "API base URL must include http:// or https://".to_string(),
        ))
    }
}
