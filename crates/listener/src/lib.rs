//! AutoDoc trigger event source.
//!
//! Turns a GitHub `push` webhook delivery (event type header, delivery id,
//! JSON body) into a validated [`pipeline::PushEvent`], or explains why the
//! delivery does not start a run. Every delivery gets a [`WebhookAck`] the
//! HTTP front end can return as-is.
//!
//! | Delivery | Result | Ack |
//! |----------|--------|-----|
//! | `push` to a branch touching a tracked path | [`Ingested::Accepted`] | `202` |
//! | other event type, branch creation or deletion, no tracked path changed | [`Ingested::Ignored`] | `200` |
//! | missing or malformed fields, invalid JSON | [`Ingested::Rejected`] | `400` |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Payload shapes and header names live here. The
//! [`pipeline`] crate sees only [`pipeline::PushEvent`] and
//! [`pipeline::ValidationError`].

mod ingest;
mod payload;

pub use ingest::{ingest, IgnoreReason, Ingested, WebhookAck, WebhookDelivery, PUSH_EVENT};
pub use payload::{
    AuthorPayload, CommitPayload, OwnerPayload, PushPayload, PusherPayload, RepositoryPayload,
};
