//! # Leslie
//!
//! A mental health counselor agent served over HTTP.
//!
//! This library provides:
//! - The counselor's declaration: persona instruction, model and tools
//! - A run loop that calls Gemini and dispatches tool calls
//! - In-memory conversation sessions
//! - An HTTP API with CORS and an optional bundled web UI
//!
//! ## Example
//!
//! ```rust,ignore
//! use leslie::{agent::AgentDefinition, api, config::Config};
//!
//! let config = Config::from_env()?;
//! let handle = api::serve(config, AgentDefinition::mental_health_counselor()).await?;
//! handle.run_until(shutdown_signal()).await?;
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod llm;
pub mod session;
pub mod tools;

pub use config::Config;
