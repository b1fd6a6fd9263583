//! Remote LLM provider implementations.
//!
//! Cloud-hosted backends reached over HTTPS; require an API key, offer no
//! local hardware requirements.

pub mod claude;

pub use claude::ClaudeClient;
