//! Request and response bodies of the GitHub REST endpoints in use.
//!
//! Only the fields the adapter reads are declared; everything else in the
//! payloads is ignored.

use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub(crate) struct CompareResponse {
    #[serde(default)]
    pub files: Vec<CompareFile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompareFile {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub additions: u32,
    #[serde(default)]
    pub deletions: u32,
    pub patch: Option<String>,
    pub previous_filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitRef {
    pub object: GitObject,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitObject {
    pub sha: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRef<'a> {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: &'a str,
}

/// `GET contents/{path}` for a file. Directories come back as an array and
/// fail to deserialize into this type.
#[derive(Debug, Deserialize)]
pub(crate) struct ContentEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PutContents<'a> {
    pub message: &'a str,
    pub content: String,
    pub branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PutContentsResponse {
    pub commit: GitObject,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePull<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub head: &'a str,
    pub base: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRequest {
    pub number: u64,
    pub html_url: String,
}
