//! LLM provider integration
//!
//! A non-streaming client for an Anthropic-style Messages API plus the
//! prompt templates and lenient JSON parsing the workflow agents use.

pub mod client;
pub mod parse;
pub mod prompts;

pub use client::{Completion, LlmClient, LlmError};
