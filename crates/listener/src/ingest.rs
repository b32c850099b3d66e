//! Validation of push deliveries and their acknowledgements.

use std::fmt;

use pipeline::{
    BranchName, CommitSha, PushEvent, RepositoryName, RepositoryOwner, RepositoryRef,
    TriggerConfig, ValidationError,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::payload::{PushPayload, RepositoryPayload};

/// The only event type that can start a run.
pub const PUSH_EVENT: &str = "push";

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// One webhook delivery as received over HTTP.
#[derive(Debug, Clone, Copy)]
pub struct WebhookDelivery<'a> {
    /// `X-GitHub-Event`. Absent is treated as `push`.
    pub event_type: Option<&'a str>,
    /// `X-GitHub-Delivery`.
    pub delivery_id: Option<&'a str>,
    pub body: &'a [u8],
}

/// Why a well-formed delivery does not start a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    UnsupportedEvent(String),
    BranchDeleted,
    /// A new branch has no previous commit to diff against.
    BranchCreated,
    NoRelevantChanges,
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedEvent(kind) => write!(f, "event type '{kind}' is not handled"),
            Self::BranchDeleted => f.write_str("branch deletion"),
            Self::BranchCreated => f.write_str("branch creation has no base commit"),
            Self::NoRelevantChanges => f.write_str("no tracked files changed"),
        }
    }
}

/// Result of ingesting one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    Accepted(PushEvent),
    Ignored {
        reason: IgnoreReason,
        delivery_id: Option<String>,
    },
    Rejected {
        error: ValidationError,
        delivery_id: Option<String>,
    },
}

/// HTTP acknowledgement for a delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookAck {
    pub status_code: u16,
    pub body: serde_json::Value,
}

impl Ingested {
    pub fn ack(&self) -> WebhookAck {
        match self {
            Self::Accepted(event) => WebhookAck {
                status_code: 202,
                body: json!({
                    "ok": true,
                    "delivery": event.delivery_id,
                    "total_commits": event.commit_messages.len(),
                }),
            },
            Self::Ignored {
                reason,
                delivery_id,
            } => WebhookAck {
                status_code: 200,
                body: json!({
                    "ok": true,
                    "delivery": delivery_id,
                    "ignored": reason.to_string(),
                }),
            },
            Self::Rejected { error, delivery_id } => WebhookAck {
                status_code: 400,
                body: json!({
                    "ok": false,
                    "delivery": delivery_id,
                    "error": error.to_string(),
                }),
            },
        }
    }
}

/// Validates `delivery` and applies the trigger filter.
pub fn ingest(delivery: WebhookDelivery<'_>, trigger: &TriggerConfig) -> Ingested {
    let delivery_id = delivery.delivery_id.map(str::to_owned);
    let event_type = delivery.event_type.unwrap_or(PUSH_EVENT);

    if event_type != PUSH_EVENT {
        debug!(event_type, "ignoring non-push delivery");
        return Ingested::Ignored {
            reason: IgnoreReason::UnsupportedEvent(event_type.to_owned()),
            delivery_id,
        };
    }

    let payload: PushPayload = match serde_json::from_slice(delivery.body) {
        Ok(payload) => payload,
        Err(e) => {
            let error = ValidationError::InvalidJson {
                message: e.to_string(),
            };
            warn!(delivery = ?delivery_id, %error, "rejecting delivery");
            return Ingested::Rejected { error, delivery_id };
        }
    };

    match classify(&payload, delivery_id.clone(), trigger) {
        Ok(Ok(event)) => {
            info!(
                delivery = ?delivery_id,
                repository = %event.repository,
                branch = %event.base_branch,
                commits = event.commit_messages.len(),
                "push accepted"
            );
            Ingested::Accepted(event)
        }
        Ok(Err(reason)) => {
            info!(delivery = ?delivery_id, %reason, "push ignored");
            Ingested::Ignored {
                reason,
                delivery_id,
            }
        }
        Err(error) => {
            warn!(delivery = ?delivery_id, %error, "rejecting delivery");
            Ingested::Rejected { error, delivery_id }
        }
    }
}

/// Outer `Err` is a validation failure; inner `Err` is a well-formed push
/// that should not start a run.
fn classify(
    payload: &PushPayload,
    delivery_id: Option<String>,
    trigger: &TriggerConfig,
) -> Result<Result<PushEvent, IgnoreReason>, ValidationError> {
    let repository = repository(payload.repository.as_ref())?;
    let base_branch = branch(payload.git_ref.as_deref())?;
    let before = sha(payload.before.as_deref(), "before")?;
    let after = sha(payload.after.as_deref(), "after")?;

    if payload.deleted || after.is_null() {
        return Ok(Err(IgnoreReason::BranchDeleted));
    }
    if payload.created || before.is_null() {
        return Ok(Err(IgnoreReason::BranchCreated));
    }

    let pusher = payload
        .pusher
        .as_ref()
        .and_then(|p| p.name.as_deref())
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ValidationError::missing("pusher.name"))?;

    for commit in &payload.commits {
        debug!(
            commit = commit.id.get(..7).unwrap_or(&commit.id),
            author = commit.author.as_ref().and_then(|a| a.name.as_deref()).unwrap_or("unknown"),
            added = commit.added.len(),
            modified = commit.modified.len(),
            removed = commit.removed.len(),
            "commit in push"
        );
    }
    if !trigger.matches(payload.changed_paths()) {
        return Ok(Err(IgnoreReason::NoRelevantChanges));
    }

    Ok(Ok(PushEvent {
        repository,
        base_branch,
        before,
        after,
        commit_messages: payload.commits.iter().map(|c| c.message.clone()).collect(),
        pusher: pusher.to_owned(),
        compare_url: payload.compare.clone().filter(|u| !u.is_empty()),
        delivery_id,
    }))
}

fn repository(payload: Option<&RepositoryPayload>) -> Result<RepositoryRef, ValidationError> {
    let repo = payload.ok_or_else(|| ValidationError::missing("repository"))?;

    if let Some(full_name) = repo.full_name.as_deref().filter(|n| !n.trim().is_empty()) {
        return RepositoryRef::parse_full_name(full_name);
    }

    let owner = repo
        .owner
        .as_ref()
        .and_then(|o| o.login.as_deref().or(o.name.as_deref()))
        .and_then(RepositoryOwner::new)
        .ok_or_else(|| ValidationError::missing("repository.owner.login"))?;
    let name = repo
        .name
        .as_deref()
        .and_then(RepositoryName::new)
        .ok_or_else(|| ValidationError::missing("repository.name"))?;
    Ok(RepositoryRef::new(owner, name))
}

fn branch(git_ref: Option<&str>) -> Result<BranchName, ValidationError> {
    let git_ref = git_ref
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| ValidationError::missing("ref"))?;
    git_ref
        .strip_prefix(BRANCH_REF_PREFIX)
        .and_then(BranchName::new)
        .ok_or_else(|| ValidationError::malformed("ref", git_ref))
}

fn sha(value: Option<&str>, field: &'static str) -> Result<CommitSha, ValidationError> {
    let value = value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ValidationError::missing(field))?;
    if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ValidationError::malformed(field, value));
    }
    CommitSha::new(value).ok_or_else(|| ValidationError::missing(field))
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn payload() -> Value {
        json!({
            "ref": "refs/heads/main",
            "before": "a1a1a1a1a1a1",
            "after": "b2b2b2b2b2b2",
            "created": false,
            "deleted": false,
            "compare": "https://github.com/acme/widgets/compare/a1a1a1a1a1a1...b2b2b2b2b2b2",
            "repository": {
                "full_name": "acme/widgets",
                "name": "widgets",
                "owner": {"login": "acme", "name": "acme"}
            },
            "pusher": {"name": "octocat", "email": "octocat@example.com"},
            "commits": [
                {
                    "id": "b2b2b2b2b2b2",
                    "message": "fix bug",
                    "author": {"name": "Octo Cat"},
                    "added": [],
                    "modified": ["widgets/core.py"],
                    "removed": []
                }
            ]
        })
    }

    fn run(event_type: Option<&str>, body: &Value) -> Ingested {
        let bytes = serde_json::to_vec(body).unwrap();
        ingest(
            WebhookDelivery {
                event_type,
                delivery_id: Some("d-1"),
                body: &bytes,
            },
            &TriggerConfig::default(),
        )
    }

    fn rejected_field(result: Ingested) -> ValidationError {
        match result {
            Ingested::Rejected { error, .. } => error,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn valid_push_becomes_an_event() {
        let Ingested::Accepted(event) = run(Some("push"), &payload()) else {
            panic!("expected acceptance");
        };
        assert_eq!(event.repository.full_name(), "acme/widgets");
        assert_eq!(event.base_branch.as_str(), "main");
        assert_eq!(event.before.as_str(), "a1a1a1a1a1a1");
        assert_eq!(event.after.as_str(), "b2b2b2b2b2b2");
        assert_eq!(event.commit_messages, vec!["fix bug".to_owned()]);
        assert_eq!(event.pusher, "octocat");
        assert_eq!(event.delivery_id.as_deref(), Some("d-1"));
        assert!(event.compare_url.is_some());
    }

    #[test]
    fn branch_names_keep_embedded_slashes() {
        let mut body = payload();
        body["ref"] = json!("refs/heads/feature/docs");
        let Ingested::Accepted(event) = run(None, &body) else {
            panic!("expected acceptance");
        };
        assert_eq!(event.base_branch.as_str(), "feature/docs");
    }

    #[test]
    fn other_event_types_are_ignored() {
        let result = run(Some("issues"), &json!({}));
        assert_eq!(result.ack().status_code, 200);
        assert!(matches!(
            result,
            Ingested::Ignored {
                reason: IgnoreReason::UnsupportedEvent(_),
                ..
            }
        ));
    }

    #[test]
    fn missing_repository_is_rejected() {
        let mut body = payload();
        body.as_object_mut().unwrap().remove("repository");
        assert_eq!(
            rejected_field(run(Some("push"), &body)),
            ValidationError::missing("repository")
        );
    }

    #[test]
    fn missing_shas_are_rejected() {
        let mut body = payload();
        body.as_object_mut().unwrap().remove("after");
        assert_eq!(
            rejected_field(run(Some("push"), &body)),
            ValidationError::missing("after")
        );

        let mut body = payload();
        body["before"] = json!("");
        assert_eq!(
            rejected_field(run(Some("push"), &body)),
            ValidationError::missing("before")
        );
    }

    #[test]
    fn non_hex_sha_is_malformed() {
        let mut body = payload();
        body["after"] = json!("not-a-sha");
        assert!(matches!(
            rejected_field(run(Some("push"), &body)),
            ValidationError::Malformed { field: "after", .. }
        ));
    }

    #[test]
    fn tag_refs_are_malformed() {
        let mut body = payload();
        body["ref"] = json!("refs/tags/v1.0");
        assert!(matches!(
            rejected_field(run(Some("push"), &body)),
            ValidationError::Malformed { field: "ref", .. }
        ));
    }

    #[test]
    fn missing_pusher_is_rejected() {
        let mut body = payload();
        body["pusher"] = json!({});
        assert_eq!(
            rejected_field(run(Some("push"), &body)),
            ValidationError::missing("pusher.name")
        );
    }

    #[test]
    fn repository_falls_back_to_owner_and_name() {
        let mut body = payload();
        body["repository"] = json!({"name": "widgets", "owner": {"name": "acme"}});
        let Ingested::Accepted(event) = run(Some("push"), &body) else {
            panic!("expected acceptance");
        };
        assert_eq!(event.repository.full_name(), "acme/widgets");
    }

    #[test]
    fn invalid_json_is_rejected() {
        let result = ingest(
            WebhookDelivery {
                event_type: Some("push"),
                delivery_id: None,
                body: b"{not json",
            },
            &TriggerConfig::default(),
        );
        assert!(matches!(
            rejected_field(result.clone()),
            ValidationError::InvalidJson { .. }
        ));
        assert_eq!(result.ack().status_code, 400);
    }

    #[test]
    fn deletions_and_creations_are_ignored() {
        let mut body = payload();
        body["deleted"] = json!(true);
        body["after"] = json!("0000000000000000000000000000000000000000");
        assert!(matches!(
            run(Some("push"), &body),
            Ingested::Ignored {
                reason: IgnoreReason::BranchDeleted,
                ..
            }
        ));

        let mut body = payload();
        body["before"] = json!("0000000000000000000000000000000000000000");
        assert!(matches!(
            run(Some("push"), &body),
            Ingested::Ignored {
                reason: IgnoreReason::BranchCreated,
                ..
            }
        ));
    }

    #[test]
    fn irrelevant_changes_are_ignored() {
        let mut body = payload();
        body["commits"][0]["modified"] = json!(["Cargo.lock", "docs/guide.txt"]);
        let result = run(Some("push"), &body);
        assert!(matches!(
            result,
            Ingested::Ignored {
                reason: IgnoreReason::NoRelevantChanges,
                ..
            }
        ));
    }

    #[test]
    fn empty_suffix_list_accepts_any_change() {
        let mut body = payload();
        body["commits"][0]["modified"] = json!(["Cargo.lock"]);
        let bytes = serde_json::to_vec(&body).unwrap();
        let result = ingest(
            WebhookDelivery {
                event_type: Some("push"),
                delivery_id: None,
                body: &bytes,
            },
            &TriggerConfig {
                path_suffixes: Vec::new(),
            },
        );
        assert!(matches!(result, Ingested::Accepted(_)));
    }

    #[test]
    fn accepted_ack_reports_delivery_and_commit_count() {
        let ack = run(Some("push"), &payload()).ack();
        assert_eq!(ack.status_code, 202);
        assert_eq!(
            ack.body,
            json!({"ok": true, "delivery": "d-1", "total_commits": 1})
        );
    }
}
