//! Local LLM provider implementations.
//!
//! Backends running on localhost or the local network; no API key, lower
//! latency, data stays local.

pub mod ollama;

pub use ollama::OllamaClient;
