//! # chat-query core
//!
//! Runtime-free logic for chat-query: the request/response data model,
//! the [`llm::LanguageModel`] and [`store::DocumentStore`] traits,
//! system prompts and model-output parsing, a Mongo-style filter and
//! aggregation evaluator, and the filter policy applied to model-generated
//! queries.
//!
//! This crate contains no tokio, HTTP, or database driver dependencies.
//! The `chat-query` crate wires these pieces to OpenAI, MongoDB, SQLite,
//! and an axum server.

pub mod llm;
pub mod models;
pub mod parse;
pub mod policy;
pub mod prompts;
pub mod query;
pub mod store;
