//! GitHub client for the files that hold tasks.
//!
//! Tasks live as YAML files in a repository. This module wraps the pieces of
//! the GitHub API the server needs:
//! - the REST contents API for single-file create, read, update and delete
//! - the GraphQL API to read every file of a directory in one request
//!
//! # Architecture
//!
//! The [`GitHubClient`] is shared across the application (via `Arc`) and
//! handles all communication with GitHub. It includes:
//! - Configurable timeouts (15 seconds for requests)
//! - Retry logic with exponential backoff for startup reads
//! - Structured error handling with [`GitHubError`]
//!
//! A move is two commits, a create at the target followed by a delete of the
//! source. GitHub offers no atomic rename through the contents API.

use std::time::Duration;

use base64::prelude::*;
use rand::Rng;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::GitHubConfig;

/// Default timeout for GitHub API requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum number of retry attempts for startup operations.
const MAX_RETRY_ATTEMPTS: u32 = 5;

/// Base delay for exponential backoff (100ms).
const BASE_BACKOFF_MS: u64 = 100;

/// Maximum delay cap for exponential backoff (10 seconds).
const MAX_BACKOFF_MS: u64 = 10_000;

/// Maximum jitter to add to backoff delay (100ms).
const MAX_JITTER_MS: u64 = 100;

/// REST API version pinned in every request.
const API_VERSION: &str = "2022-11-28";

const USER_AGENT: &str = concat!("todolist-server/", env!("CARGO_PKG_VERSION"));

const DIRECTORY_QUERY: &str = r"
query ($owner: String!, $repo: String!, $expr: String!) {
  repository(owner: $owner, name: $repo) {
    object(expression: $expr) {
      ... on Tree {
        entries {
          name
          path
          type
          object {
            ... on Blob {
              oid
              text
            }
          }
        }
      }
    }
  }
}
";

/// Errors that can occur when talking to GitHub.
///
/// The variants map onto HTTP responses of the task API: missing files to
/// 404, stale shas to 409, everything upstream to 502.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// The file does not exist on the branch.
    #[error("not found: {0}")]
    NotFound(String),

    /// The supplied sha no longer matches the file, or the file already
    /// exists on create.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The token was rejected or lacks access.
    #[error("unauthorized: GitHub rejected the token ({0})")]
    Unauthorized(u16),

    /// GitHub answered with an unexpected status.
    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The GraphQL endpoint reported errors.
    #[error("GitHub GraphQL errors: {0}")]
    GraphQl(String),

    /// The path exists but is not a regular file.
    #[error("path is not a file: {0}")]
    NotAFile(String),

    /// The path does not resolve to a directory on the branch.
    #[error("path is not a directory: {0}")]
    NotADirectory(String),

    /// The request to GitHub timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// GitHub is unreachable.
    #[error("GitHub unavailable: {0}")]
    Unavailable(String),

    /// Failed to parse or decode the response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Client configuration error.
    #[error("client configuration error: {0}")]
    Configuration(String),

    /// All retry attempts have been exhausted.
    #[error("all {attempts} retry attempts failed: {last_error}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The last error encountered.
        last_error: String,
    },
}

/// A file read from or written to the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    /// Repository-relative path.
    pub path: String,
    /// Blob sha, required for updates and deletes.
    pub sha: String,
    /// Decoded UTF-8 content.
    pub content: String,
    pub download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    sha: String,
    #[serde(default)]
    content: String,
    encoding: Option<String>,
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    content: Option<WrittenContent>,
}

#[derive(Debug, Deserialize)]
struct WrittenContent {
    path: Option<String>,
    sha: Option<String>,
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    commit: Option<CommitInfo>,
}

#[derive(Debug, Deserialize)]
struct CommitInfo {
    sha: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    errors: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    object: Option<BlobObject>,
}

#[derive(Debug, Deserialize)]
struct BlobObject {
    oid: Option<String>,
    text: Option<String>,
}

/// Client for the task repository.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    /// The underlying HTTP client.
    http_client: Client,

    /// API base URL without trailing slash.
    base_url: String,

    owner: String,
    repo: String,
    token: String,
    branch: String,
}

impl GitHubClient {
    /// Creates a new GitHub client.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] if the owner or repository is
    /// empty or the HTTP client cannot be created.
    pub fn new(config: &GitHubConfig) -> Result<Self, GitHubError> {
        if config.owner.is_empty() || config.repo.is_empty() {
            return Err(GitHubError::Configuration(
                "both owner and repo are required".to_string(),
            ));
        }

        let http_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GitHubError::Configuration(format!("failed to create HTTP client: {e}")))?;

        let client = Self {
            http_client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            token: config.token.clone(),
            branch: config.branch.clone(),
        };

        info!(
            owner = %client.owner,
            repo = %client.repo,
            branch = %client.branch,
            base_url = %client.base_url,
            "GitHub client initialized"
        );

        Ok(client)
    }

    /// Returns the branch all operations target.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Returns the API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates a new file.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Conflict`] if the file already exists, or any
    /// transport or API error.
    pub async fn create_file(
        &self,
        path: &str,
        content: &str,
        message: Option<&str>,
    ) -> Result<FileContent, GitHubError> {
        let message = message.map_or_else(|| format!("Create {path}"), str::to_string);
        let file = self.put_contents(path, content, &message, None).await?;
        info!(action = "create", path = %path, sha = %file.sha, "Created file");
        Ok(file)
    }

    /// Reads a single file.
    ///
    /// # Errors
    ///
    /// - [`GitHubError::NotFound`] - The file does not exist
    /// - [`GitHubError::NotAFile`] - The path is a directory or submodule
    /// - [`GitHubError::InvalidResponse`] - The content could not be decoded
    pub async fn read_file(&self, path: &str) -> Result<FileContent, GitHubError> {
        let url = self.contents_url(path);
        let response = self
            .send(
                self.request(Method::GET, &url)
                    .query(&[("ref", self.branch.as_str())]),
                path,
            )
            .await?;

        let contents: ContentsResponse = response.json().await.map_err(|e| {
            GitHubError::InvalidResponse(format!("failed to parse contents response: {e}"))
        })?;

        if contents.kind != "file" {
            return Err(GitHubError::NotAFile(path.to_string()));
        }
        match contents.encoding.as_deref() {
            Some("base64") => {}
            other => {
                return Err(GitHubError::InvalidResponse(format!(
                    "unexpected encoding for {path}: {other:?}"
                )))
            }
        }

        Ok(FileContent {
            path: contents.path,
            sha: contents.sha,
            content: decode_content(&contents.content)?,
            download_url: contents.download_url,
        })
    }

    /// Reads every file directly inside `directory` in one GraphQL request.
    ///
    /// Subdirectories and binary blobs are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::NotADirectory`] when the path does not resolve
    /// to a tree on the branch, or [`GitHubError::GraphQl`] when GitHub
    /// reports query errors.
    pub async fn read_directory_files(
        &self,
        directory: &str,
    ) -> Result<Vec<FileContent>, GitHubError> {
        let normalized = directory.trim_matches('/');
        let expression = format!("{}:{}", self.branch, normalized);
        let data = self
            .graphql(
                DIRECTORY_QUERY,
                json!({
                    "owner": self.owner,
                    "repo": self.repo,
                    "expr": expression,
                }),
            )
            .await?;

        let entries = data
            .pointer("/repository/object/entries")
            .cloned()
            .filter(|entries| !entries.is_null())
            .ok_or_else(|| GitHubError::NotADirectory(directory.to_string()))?;
        let entries: Vec<TreeEntry> = serde_json::from_value(entries).map_err(|e| {
            GitHubError::InvalidResponse(format!("failed to parse tree entries: {e}"))
        })?;

        let files: Vec<FileContent> = entries
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .filter_map(|entry| {
                let blob = entry.object?;
                let content = blob.text?;
                let download_url = Some(self.raw_download_url(&entry.path));
                Some(FileContent {
                    path: entry.path,
                    sha: blob.oid.unwrap_or_default(),
                    content,
                    download_url,
                })
            })
            .collect();

        info!(
            action = "read_directory",
            directory = %directory,
            file_count = files.len(),
            "Read directory files"
        );

        Ok(files)
    }

    /// Reads a directory with retry logic for startup.
    ///
    /// Delays follow:
    ///
    /// ```text
    /// delay = min(2^attempt * 100ms + random(0, 100ms), 10s)
    /// ```
    ///
    /// A missing directory is not retried.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::NotADirectory`] immediately, or
    /// [`GitHubError::RetriesExhausted`] if all retry attempts fail.
    pub async fn read_directory_files_with_retry(
        &self,
        directory: &str,
    ) -> Result<Vec<FileContent>, GitHubError> {
        let mut last_error = String::new();

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            match self.read_directory_files(directory).await {
                Ok(files) => {
                    if attempt > 0 {
                        info!(
                            attempt = attempt + 1,
                            "Directory read succeeded after retry"
                        );
                    }
                    return Ok(files);
                }
                Err(e @ GitHubError::NotADirectory(_)) => return Err(e),
                Err(e) => {
                    last_error = e.to_string();

                    if attempt < MAX_RETRY_ATTEMPTS - 1 {
                        let delay = calculate_backoff_delay(attempt);
                        warn!(
                            attempt = attempt + 1,
                            max_attempts = MAX_RETRY_ATTEMPTS,
                            delay_ms = delay.as_millis(),
                            error = %e,
                            "Directory read failed, retrying"
                        );
                        sleep(delay).await;
                    } else {
                        error!(
                            attempts = MAX_RETRY_ATTEMPTS,
                            error = %e,
                            "Directory read failed, no more retries"
                        );
                    }
                }
            }
        }

        Err(GitHubError::RetriesExhausted {
            attempts: MAX_RETRY_ATTEMPTS,
            last_error,
        })
    }

    /// Replaces the content of an existing file.
    ///
    /// When `sha` is `None` the current sha is fetched first.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Conflict`] when `sha` is stale.
    pub async fn update_file(
        &self,
        path: &str,
        content: &str,
        sha: Option<&str>,
        message: Option<&str>,
    ) -> Result<FileContent, GitHubError> {
        let sha = match sha {
            Some(sha) => sha.to_string(),
            None => self.read_file(path).await?.sha,
        };
        let message = message.map_or_else(|| format!("Update {path}"), str::to_string);
        let file = self.put_contents(path, content, &message, Some(&sha)).await?;
        info!(action = "update", path = %path, sha = %file.sha, "Updated file");
        Ok(file)
    }

    /// Deletes a file, returning the commit sha.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::NotFound`] when the file is already gone.
    pub async fn delete_file(
        &self,
        path: &str,
        sha: Option<&str>,
        message: Option<&str>,
    ) -> Result<String, GitHubError> {
        let sha = match sha {
            Some(sha) => sha.to_string(),
            None => self.read_file(path).await?.sha,
        };
        let message = message.map_or_else(|| format!("Delete {path}"), str::to_string);
        let body = json!({
            "message": message,
            "branch": self.branch,
            "sha": sha,
        });

        let url = self.contents_url(path);
        let response = self
            .send(self.request(Method::DELETE, &url).json(&body), path)
            .await?;
        let deleted: DeleteResponse = response.json().await.map_err(|e| {
            GitHubError::InvalidResponse(format!("failed to parse delete response: {e}"))
        })?;
        let commit_sha = deleted.commit.and_then(|c| c.sha).unwrap_or_default();

        info!(
            action = "delete",
            path = %path,
            sha = %sha,
            commit_sha = %commit_sha,
            "Deleted file"
        );
        Ok(commit_sha)
    }

    /// Moves a file by creating the target and deleting the source.
    ///
    /// Moving a path onto itself only reads it. A 404 on the source delete
    /// counts as success.
    ///
    /// # Errors
    ///
    /// Returns the read error for a missing source, or the create error when
    /// the target cannot be written. Nothing is deleted in either case.
    pub async fn move_file(
        &self,
        source_path: &str,
        target_path: &str,
        message: Option<&str>,
    ) -> Result<FileContent, GitHubError> {
        if source_path == target_path {
            info!(
                action = "move",
                from = %source_path,
                to = %target_path,
                "Move skipped; source and target are identical"
            );
            return self.read_file(source_path).await;
        }

        let source = self.read_file(source_path).await?;
        let commit_message = message.map_or_else(
            || format!("Move {source_path} -> {target_path}"),
            str::to_string,
        );

        let moved = self
            .put_contents(target_path, &source.content, &commit_message, None)
            .await?;

        let delete_message = format!("{commit_message} (remove source)");
        let deleted_source = match self
            .delete_file(source_path, Some(&source.sha), Some(&delete_message))
            .await
        {
            Ok(_) => true,
            Err(GitHubError::NotFound(_)) => {
                info!(
                    action = "move",
                    from = %source_path,
                    to = %target_path,
                    "Source already absent after move"
                );
                true
            }
            Err(e) => {
                error!(
                    action = "move",
                    from = %source_path,
                    to = %target_path,
                    error = %e,
                    "Failed to delete source after move"
                );
                return Err(e);
            }
        };

        info!(
            action = "move",
            from = %source_path,
            to = %target_path,
            sha = %moved.sha,
            deleted_source,
            "Moved file"
        );
        Ok(moved)
    }

    async fn put_contents(
        &self,
        path: &str,
        content: &str,
        message: &str,
        sha: Option<&str>,
    ) -> Result<FileContent, GitHubError> {
        let mut body = json!({
            "message": message,
            "branch": self.branch,
            "content": BASE64_STANDARD.encode(content.as_bytes()),
        });
        if let Some(sha) = sha {
            body["sha"] = Value::String(sha.to_string());
        }

        let url = self.contents_url(path);
        let response = self
            .send(self.request(Method::PUT, &url).json(&body), path)
            .await?;
        let written: WriteResponse = response.json().await.map_err(|e| {
            GitHubError::InvalidResponse(format!("failed to parse write response: {e}"))
        })?;
        let info = written.content;

        Ok(FileContent {
            path: info
                .as_ref()
                .and_then(|c| c.path.clone())
                .unwrap_or_else(|| path.to_string()),
            sha: info
                .as_ref()
                .and_then(|c| c.sha.clone())
                .unwrap_or_default(),
            content: content.to_string(),
            download_url: info.and_then(|c| c.download_url),
        })
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, GitHubError> {
        let url = format!("{}/graphql", self.base_url);
        let body = json!({ "query": query, "variables": variables });
        let response = self
            .send(self.request(Method::POST, &url).json(&body), "graphql")
            .await?;

        let payload: GraphQlResponse = response.json().await.map_err(|e| {
            GitHubError::InvalidResponse(format!("failed to parse GraphQL response: {e}"))
        })?;

        if let Some(errors) = payload.errors.filter(|e| !e.is_null()) {
            error!(errors = %errors, "GitHub GraphQL reported errors");
            return Err(GitHubError::GraphQl(errors.to_string()));
        }

        Ok(payload.data.unwrap_or(Value::Null))
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Sends a request and maps transport failures and error statuses.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        subject: &str,
    ) -> Result<reqwest::Response, GitHubError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GitHubError::Timeout(REQUEST_TIMEOUT)
            } else if e.is_connect() {
                GitHubError::Unavailable(format!("connection failed: {e}"))
            } else {
                GitHubError::Unavailable(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(subject = %subject, status = %status, "GitHub request succeeded");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = match status {
            StatusCode::NOT_FOUND => GitHubError::NotFound(subject.to_string()),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                GitHubError::Conflict(format!("{subject}: {}", api_message(&body)))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                GitHubError::Unauthorized(status.as_u16())
            }
            _ => GitHubError::Api {
                status: status.as_u16(),
                message: api_message(&body),
            },
        };

        if matches!(err, GitHubError::NotFound(_)) {
            debug!(subject = %subject, "GitHub returned 404");
        } else {
            error!(subject = %subject, status = %status, body = %body, "GitHub API status error");
        }
        Err(err)
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.base_url,
            self.owner,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    fn raw_download_url(&self, path: &str) -> String {
        format!(
            "https://raw.githubusercontent.com/{}/{}/{}/{}",
            self.owner,
            self.repo,
            self.branch,
            path.trim_start_matches('/')
        )
    }
}

/// Decodes contents API base64, which GitHub wraps at 60 columns.
fn decode_content(encoded: &str) -> Result<String, GitHubError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64_STANDARD
        .decode(compact)
        .map_err(|e| GitHubError::InvalidResponse(format!("invalid base64 content: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|e| GitHubError::InvalidResponse(format!("content is not UTF-8: {e}")))
}

/// Pulls `message` out of a GitHub error body, falling back to the raw text.
fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

/// Calculates the backoff delay for a given retry attempt.
///
/// Uses exponential backoff with jitter:
/// `delay = min(2^attempt * 100ms + random(0, 100ms), 10s)`
fn calculate_backoff_delay(attempt: u32) -> Duration {
    let exponential_ms = BASE_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt));
    let jitter_ms = rand::rng().random_range(0..=MAX_JITTER_MS);
    let total_ms = exponential_ms.saturating_add(jitter_ms).min(MAX_BACKOFF_MS);
    Duration::from_millis(total_ms)
}
