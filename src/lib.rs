//! # Chat Query
//!
//! Answer natural-language questions about a document database.
//!
//! A question travels through three language-model calls around a single
//! database query:
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌────────────┐   ┌──────────┐   ┌──────────┐
//! │ question │──▶│ clarification │──▶│ query plan │──▶│  store   │──▶│ insights │──▶ JSON
//! └──────────┘   └──────┬────────┘   └────────────┘   │ find/agg │   └──────────┘
//!                       │                             └──────────┘
//!                       └──▶ clarifying questions
//! ```
//!
//! The pure parts (data model, model-output parsing, the filter evaluator,
//! the filter policy) live in the `chat-query-core` crate. This crate adds
//! the I/O: the OpenAI client, MongoDB and SQLite stores, the cached
//! connection, the HTTP server and the CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=...
//! export MONGODB_URI=mongodb://localhost:27017
//! chat-query check
//! chat-query ask "How many click events did Acme have last week?"
//! chat-query serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`handler`] | The request pipeline |
//! | [`cache`] | Process-wide store connection |
//! | [`db`] | Connection strings and backend selection |
//! | [`mongo_store`] | MongoDB backend |
//! | [`sqlite_store`] | SQLite backend for local use and tests |
//! | [`openai`] | Chat-completions client |
//! | [`throttle`] | Minimum gap between model calls |
//! | [`server`] | HTTP server |
//! | [`import`] | Seed a collection from JSON |
//! | [`error`] | Error taxonomy and HTTP mapping |
//! | [`logging`] | `tracing` subscriber setup |

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handler;
pub mod import;
pub mod logging;
pub mod mongo_store;
pub mod openai;
pub mod server;
pub mod sqlite_store;
pub mod throttle;
