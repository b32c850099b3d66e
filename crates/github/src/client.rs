//! [`GitHubClient`]: the REST implementation of [`CodeRepository`].

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use pipeline::{
    BranchName, ChangeSet, CodeRepository, CommitSha, DocumentPath, FileDiff, FileStatus,
    FileWrite, NewPullRequest, PullRequestNumber, PullRequestRef, RemoteError, RepositoryRef,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::status::classify;
use crate::wire;

/// Public GitHub API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// The compare endpoint lists at most this many files. A response this long
/// may be truncated and is flagged as such, even when the comparison has
/// exactly this many files.
pub const MAX_COMPARE_FILES: usize = 300;

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("autodoc/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("GitHub token contains characters not allowed in an HTTP header")]
    InvalidToken,

    #[error("invalid GitHub API URL '{0}'")]
    InvalidApiUrl(String),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// GitHub REST client authenticated with a bearer token.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: Url,
}

impl GitHubClient {
    /// Builds a client for `api_url` (normally [`DEFAULT_API_URL`]).
    pub fn new(token: &str, api_url: impl Into<String>) -> Result<Self, ClientBuildError> {
        let api_url = api_url.into();
        let api_url = match Url::parse(api_url.trim_end_matches('/')) {
            Ok(url) if !url.cannot_be_a_base() => url,
            _ => return Err(ClientBuildError::InvalidApiUrl(api_url)),
        };

        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ClientBuildError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self { http, api_url })
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_str()
    }

    /// `{api}/repos/{owner}/{name}/...` with every segment percent-encoded.
    /// Each `tail` entry is split on `/`, so branch names and nested paths keep
    /// their hierarchy while `#`, `?` and `%` stay inside their segment.
    fn repo_url(&self, repo: &RepositoryRef, tail: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.api_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| RemoteError::Malformed {
                message: format!("API URL {} cannot carry a path", self.api_url),
            })?;
            segments
                .pop_if_empty()
                .extend(["repos", repo.owner.as_str(), repo.name.as_str()]);
            for part in tail {
                segments.extend(part.split('/'));
            }
        }
        Ok(url)
    }

    /// Sends `request`; non-success statuses become [`RemoteError`]s.
    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Response, RemoteError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!(%status, url = %response.url(), "GitHub response");

        if status.is_success() {
            return Ok(response);
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, &headers, &body, resource))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<T, RemoteError> {
        let response = self.send(request, resource).await?;
        response.json::<T>().await.map_err(|e| RemoteError::Malformed {
            message: format!("{resource}: {e}"),
        })
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    RemoteError::Transport {
        message: err.to_string(),
    }
}

fn commit_sha(raw: String, resource: &str) -> Result<CommitSha, RemoteError> {
    CommitSha::new(raw).ok_or_else(|| RemoteError::Malformed {
        message: format!("{resource}: empty commit SHA"),
    })
}

fn pull_request_ref(pr: wire::PullRequest) -> Result<PullRequestRef, RemoteError> {
    let number = PullRequestNumber::new(pr.number).ok_or_else(|| RemoteError::Malformed {
        message: "pull request number 0".into(),
    })?;
    Ok(PullRequestRef {
        number,
        url: pr.html_url,
    })
}

fn file_diff(file: wire::CompareFile) -> FileDiff {
    let status = FileStatus::from_github(&file.status).unwrap_or_else(|| {
        warn!(path = %file.filename, status = %file.status, "unknown file status, treating as modified");
        FileStatus::Modified
    });
    FileDiff {
        path: file.filename,
        status,
        additions: file.additions,
        deletions: file.deletions,
        patch: file.patch,
        previous_path: file.previous_filename,
    }
}

#[async_trait]
impl CodeRepository for GitHubClient {
    #[instrument(skip_all, fields(repository = %repo, base = %base, head = %head))]
    async fn compare(
        &self,
        repo: &RepositoryRef,
        base: &CommitSha,
        head: &CommitSha,
    ) -> Result<ChangeSet, RemoteError> {
        let range = format!("{base}...{head}");
        let url = self.repo_url(repo, &["compare", range.as_str()])?;
        let resource = format!("comparison {base}...{head} in {repo}");
        let body: wire::CompareResponse = self.send_json(self.http.get(url), &resource).await?;

        let truncated = body.files.len() >= MAX_COMPARE_FILES;
        Ok(ChangeSet {
            files: body.files.into_iter().map(file_diff).collect(),
            truncated,
        })
    }

    #[instrument(skip_all, fields(repository = %repo, branch = %branch))]
    async fn branch_tip(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<CommitSha, RemoteError> {
        let url = self.repo_url(repo, &["git/ref/heads", branch.as_str()])?;
        let resource = format!("branch {branch} in {repo}");
        let body: wire::GitRef = self.send_json(self.http.get(url), &resource).await?;
        commit_sha(body.object.sha, &resource)
    }

    #[instrument(skip_all, fields(repository = %repo, branch = %branch, at = %at))]
    async fn create_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
        at: &CommitSha,
    ) -> Result<(), RemoteError> {
        let payload = wire::CreateRef {
            git_ref: branch.to_ref(),
            sha: at.as_str(),
        };
        let resource = format!("commit {at} in {repo}");
        let url = self.repo_url(repo, &["git/refs"])?;
        self.send(self.http.post(url).json(&payload), &resource).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(repository = %repo, branch = %branch))]
    async fn delete_branch(
        &self,
        repo: &RepositoryRef,
        branch: &BranchName,
    ) -> Result<(), RemoteError> {
        let url = self.repo_url(repo, &["git/refs/heads", branch.as_str()])?;
        let resource = format!("branch {branch} in {repo}");
        self.send(self.http.delete(url), &resource).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(repository = %repo, path = %path, branch = %branch))]
    async fn file_blob(
        &self,
        repo: &RepositoryRef,
        path: &DocumentPath,
        branch: &BranchName,
    ) -> Result<Option<String>, RemoteError> {
        let url = self.repo_url(repo, &["contents", path.as_str()])?;
        let resource = format!("{path}@{branch} in {repo}");
        let request = self.http.get(url).query(&[("ref", branch.as_str())]);

        let entry: wire::ContentEntry = match self.send_json(request, &resource).await {
            Ok(entry) => entry,
            Err(RemoteError::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(err),
        };
        if entry.kind != "file" {
            return Err(RemoteError::Malformed {
                message: format!("{resource}: expected a file, found {}", entry.kind),
            });
        }
        Ok(Some(entry.sha))
    }

    #[instrument(skip_all, fields(repository = %repo, path = %write.path, branch = %write.branch))]
    async fn write_file(
        &self,
        repo: &RepositoryRef,
        write: &FileWrite,
    ) -> Result<CommitSha, RemoteError> {
        let payload = wire::PutContents {
            message: &write.message,
            content: general_purpose::STANDARD.encode(write.content.as_bytes()),
            branch: write.branch.as_str(),
            sha: write.existing_blob.as_deref(),
        };
        let url = self.repo_url(repo, &["contents", write.path.as_str()])?;
        let resource = format!("{}@{} in {repo}", write.path, write.branch);
        let body: wire::PutContentsResponse =
            self.send_json(self.http.put(url).json(&payload), &resource).await?;
        commit_sha(body.commit.sha, &resource)
    }

    #[instrument(skip_all, fields(repository = %repo, head = %request.head, base = %request.base))]
    async fn create_pull_request(
        &self,
        repo: &RepositoryRef,
        request: &NewPullRequest,
    ) -> Result<PullRequestRef, RemoteError> {
        let payload = wire::CreatePull {
            title: &request.title,
            body: &request.body,
            head: request.head.as_str(),
            base: request.base.as_str(),
        };
        let resource = format!("branch {} or {} in {repo}", request.head, request.base);
        let url = self.repo_url(repo, &["pulls"])?;
        let pr: wire::PullRequest = self
            .send_json(self.http.post(url).json(&payload), &resource)
            .await?;
        pull_request_ref(pr)
    }

    #[instrument(skip_all, fields(repository = %repo, head = %head, base = %base))]
    async fn find_open_pull_request(
        &self,
        repo: &RepositoryRef,
        head: &BranchName,
        base: &BranchName,
    ) -> Result<Option<PullRequestRef>, RemoteError> {
        let qualified_head = format!("{}:{}", repo.owner.as_str(), head);
        let request = self.http.get(self.repo_url(repo, &["pulls"])?).query(&[
            ("head", qualified_head.as_str()),
            ("base", base.as_str()),
            ("state", "open"),
        ]);
        let resource = format!("pull requests of {repo}");
        let pulls: Vec<wire::PullRequest> = self.send_json(request, &resource).await?;
        pulls.into_iter().next().map(pull_request_ref).transpose()
    }
}

