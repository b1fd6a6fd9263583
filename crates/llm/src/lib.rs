//! LLM provider implementations for the GraphRAG orchestration core.
//!
//! This crate owns the `ChatModel` trait and every concrete backend, plus
//! the fault-tolerant [`chain::ProviderChain`] that the ingestion pipeline
//! and query path use to call out to a primary/fallback pair of providers.
//!
//! # Local Providers
//!
//! - **Ollama** - local LLM runner
//!
//! # Remote Providers
//!
//! - **Claude** - Anthropic's Claude models
//!
//! # Example
//!
//! ```rust,ignore
//! use llm::chain::create_provider_with_failover;
//! use llm::config::RemoteLlmConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let primary = RemoteLlmConfig::from_env("ANTHROPIC_API_KEY", "https://api.anthropic.com", "claude-3-opus-20240229")?;
//!     let chain = create_provider_with_failover(
//!         "claude", Some(primary),
//!         "ollama", None,
//!         5, Duration::from_secs(30),
//!     )?;
//!
//!     let answer = chain.ainvoke("What is Rust?").await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```

pub mod chain;
pub mod chat;
pub mod circuit;
pub mod config;
pub mod error;
pub mod provider_utils;

#[macro_use]
mod provider_macros;

#[cfg(feature = "local")]
pub mod local;

#[cfg(feature = "remote")]
pub mod remote;

pub use chain::ProviderChain;
pub use chat::{ChatConfig, ChatModel, ChatRequest, ChatResponse, Message, MessageContent, MessageRole, UsageMetadata};
pub use config::{LocalLlmConfig, RemoteLlmConfig};
pub use error::{LlmError, Result};
pub use provider_utils::{ModelInfo, ProviderUtils};
