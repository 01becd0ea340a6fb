//! # Prompt Studio
//!
//! Turns a set of uploaded documents and an expected-output template into an
//! optimized RAG prompt.
//!
//! Documents are extracted, chunked, embedded, and stored in a SQLite-backed
//! vector index. Optimization designs a retrieval query from the template,
//! retrieves context, assembles a chat prompt, generates an answer, and has
//! a judge model score it against the template, refining the query until the
//! score clears the configured threshold or the iteration cap is reached.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────┐
//! │  Uploads    │──▶│ Extract + Chunk   │──▶│  SQLite   │
//! │ PDF/DOCX/MD │   │ + Embed           │   │ docs+vecs │
//! └─────────────┘   └──────────────────┘   └────┬─────┘
//!                                               │
//!                     ┌─────────────────────────┤
//!                     ▼                         ▼
//!               ┌──────────┐             ┌────────────┐
//!               │   CLI    │             │    HTTP    │
//!               │(pstudio) │             │   (axum)   │
//!               └──────────┘             └────────────┘
//! ```
//!
//! The model-agnostic pieces (chunking, template analysis, the vector index,
//! prompt assembly, and the optimization controller) live in the
//! `prompt-studio-core` crate. This crate supplies storage, model clients,
//! file extraction, and the two front ends.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`documents`] | Document registry |
//! | [`persistence`] | SQLite persistence for the vector index |
//! | [`extract`] | PDF, DOCX, and text extraction |
//! | [`settings`] | Runtime-mutable chat model settings |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | OpenAI-compatible chat client |
//! | [`evaluator`] | Judge model for outputs and retrieved context |
//! | [`query_designer`] | Retrieval query design and refinement |
//! | [`studio`] | Service facade used by the CLI and HTTP API |
//! | [`commands`] | CLI command implementations |
//! | [`server`] | HTTP API |
//! | [`logging`] | `tracing` subscriber setup |

pub mod commands;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod evaluator;
pub mod extract;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod persistence;
pub mod query_designer;
pub mod server;
pub mod settings;
pub mod studio;
