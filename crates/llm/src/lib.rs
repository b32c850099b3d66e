//! AutoDoc text-generation infrastructure adapter.
//!
//! Implements the [`pipeline::TextGenerator`] port with the OpenAI chat
//! completions API. Other providers are added as new implementations in this
//! crate without any changes to the `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing
//! and rate-limit headers live here. The [`pipeline`] crate sees only
//! [`pipeline::TextGenerator`] and [`pipeline::GenerationError`].

mod openai;

pub use openai::{
    GeneratorBuildError, OpenAiGenerator, OpenAiSettings, DEFAULT_BASE_URL, DEFAULT_MODEL,
    DEFAULT_TEMPERATURE,
};
