//! # Prompt Studio Core
//!
//! Runtime-agnostic logic for Prompt Studio: data models, sentence-aligned
//! chunking, template analysis, the embedding-backed vector index, prompt
//! assembly, and the optimization controller that drives the
//! retrieve → assemble → generate → evaluate → refine loop.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or HTTP clients.
//! Every external collaborator (embedding model, generator, evaluator,
//! query designer, index persistence) is reached through a trait defined
//! here and implemented by the `prompt-studio` application crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod optimize;
pub mod prompt;
pub mod providers;
pub mod template;

pub use error::{Result, StudioError};
