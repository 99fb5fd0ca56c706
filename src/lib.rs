//! patchwise: LLM-driven pull request review and issue-driven code edits
//! (library crate).
//!
//! Re-exports public modules for the binary and integration tests.

pub mod agent;
pub mod config;
pub mod constants;
pub mod context;
pub mod diff;
pub mod editor;
pub mod env;
pub mod hosting;
pub mod llm;
pub mod models;
pub mod partition;
pub mod prompts;
pub mod review;
pub mod scope;
pub mod vote;
