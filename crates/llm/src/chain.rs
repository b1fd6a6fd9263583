//! Fault-tolerant provider chain: per-backend circuit breaker plus an
//! ordered fallback list.

use std::sync::Arc;
use std::time::Duration;

use crate::chat::{ChatModel, ChatRequest, Message};
use crate::circuit::{call_guarded, CircuitBreaker};
use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::local::OllamaClient;
use crate::remote::ClaudeClient;

struct Backend {
    model: Box<dyn ChatModel>,
    breaker: Arc<CircuitBreaker>,
}

/// Wraps an ordered list of backends, each behind its own circuit breaker.
/// `ainvoke`/`ainvoke_messages`/`ainvoke_structured` all share the same
/// try-in-order, first-success discipline.
pub struct ProviderChain {
    backends: Vec<Backend>,
}

impl ProviderChain {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
        }
    }

    /// Wrap `model` in a circuit breaker and append it to the chain.
    pub fn with_provider(
        mut self,
        model: Box<dyn ChatModel>,
        failure_threshold: u32,
        reset_timeout: Duration,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            model.name().to_string(),
            failure_threshold,
            reset_timeout,
        ));
        self.backends.push(Backend { model, breaker });
        self
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    async fn try_chat(&self, request: ChatRequest) -> Result<crate::chat::ChatResponse> {
        if self.backends.is_empty() {
            return Err(LlmError::ConfigError("no providers configured".into()));
        }

        let mut last_error: Option<LlmError> = None;
        for backend in &self.backends {
            let req = request.clone();
            let model = &backend.model;
            let outcome = call_guarded(&backend.breaker, || async move { model.chat(req).await }).await;
            match outcome {
                Ok(resp) => return Ok(resp),
                Err(err) => {
                    tracing::warn!(provider = %backend.model.name(), error = %err, "provider failed, trying next");
                    last_error = Some(err);
                }
            }
        }

        Err(LlmError::AllProvidersFailed(
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    /// Single free-text prompt in, free-text answer out.
    pub async fn ainvoke(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest::new(vec![Message::human(prompt)]);
        let response = self.try_chat(request).await?;
        Ok(response.message.text().unwrap_or_default().to_string())
    }

    /// Full message history in, assistant message out.
    pub async fn ainvoke_messages(&self, messages: Vec<Message>) -> Result<Message> {
        let request = ChatRequest::new(messages);
        let response = self.try_chat(request).await?;
        Ok(response.message)
    }

    /// Prompt plus history, returning the raw text for a caller-side
    /// structured-JSON extraction pass (see `extract_json_object`).
    pub async fn ainvoke_structured(&self, prompt: &str, history: Vec<Message>) -> Result<String> {
        let mut messages = history;
        messages.push(Message::human(prompt));
        let request = ChatRequest::new(messages);
        let response = self.try_chat(request).await?;
        Ok(response.message.text().unwrap_or_default().to_string())
    }
}

impl Default for ProviderChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors the factory treats as "this backend could not be constructed",
/// distinct from a runtime call failure.
fn is_construction_error(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::ApiKeyNotFound(_) | LlmError::ConfigError(_)
    )
}

/// Wrap one named backend in a circuit breaker.
pub fn create_provider(
    name: &str,
    config: RemoteLlmConfig,
    failure_threshold: u32,
    reset_timeout: Duration,
) -> Result<ProviderChain> {
    let model: Box<dyn ChatModel> = match name {
        "claude" => Box::new(ClaudeClient::new(config)),
        other => return Err(LlmError::ConfigError(format!("unknown provider: {other}"))),
    };
    Ok(ProviderChain::new().with_provider(model, failure_threshold, reset_timeout))
}

/// Build a primary/fallback pair, skipping any backend whose construction
/// fails with a recognized config error. Raises if neither is constructible.
pub fn create_provider_with_failover(
    primary_name: &str,
    primary_config: Option<RemoteLlmConfig>,
    fallback_name: &str,
    fallback_config: Option<RemoteLlmConfig>,
    failure_threshold: u32,
    reset_timeout: Duration,
) -> Result<ProviderChain> {
    let mut chain = ProviderChain::new();
    let mut built_any = false;

    if let Some(cfg) = primary_config {
        match build_backend(primary_name, cfg) {
            Ok(model) => {
                chain = chain.with_provider(model, failure_threshold, reset_timeout);
                built_any = true;
            }
            Err(err) if is_construction_error(&err) => {
                tracing::warn!(provider = primary_name, error = %err, "skipping unconstructible primary");
            }
            Err(err) => return Err(err),
        }
    }

    if let Some(cfg) = fallback_config {
        match build_backend(fallback_name, cfg) {
            Ok(model) => {
                chain = chain.with_provider(model, failure_threshold, reset_timeout);
                built_any = true;
            }
            Err(err) if is_construction_error(&err) => {
                tracing::warn!(provider = fallback_name, error = %err, "skipping unconstructible fallback");
            }
            Err(err) => return Err(err),
        }
    }

    if !built_any {
        return Err(LlmError::Other(
            "neither primary nor fallback provider could be constructed".into(),
        ));
    }

    Ok(chain)
}

fn build_backend(name: &str, config: RemoteLlmConfig) -> Result<Box<dyn ChatModel>> {
    match name {
        "claude" => Ok(Box::new(ClaudeClient::new(config))),
        "ollama" => Ok(Box::new(OllamaClient::new(crate::config::LocalLlmConfig::new(
            config.base_url,
            config.model,
        )))),
        other => Err(LlmError::ConfigError(format!("unknown provider: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyOnce {
        name: String,
        calls: Arc<AtomicUsize>,
        fail_first: bool,
    }

    #[async_trait]
    impl ChatModel for FlakyOnce {
        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(LlmError::Other("generic failure".into()));
            }
            Ok(ChatResponse {
                message: Message::assistant("ok"),
                usage: None,
                metadata: Default::default(),
            })
        }

        fn clone_box(&self) -> Box<dyn ChatModel> {
            Box::new(FlakyOnce {
                name: self.name.clone(),
                calls: self.calls.clone(),
                fail_first: self.fail_first,
            })
        }

        fn name(&self) -> &str {
            &self.name
        }
    }

    #[tokio::test]
    async fn failover_tries_next_backend_on_failure() {
        let primary_calls = Arc::new(AtomicUsize::new(0));
        let fallback_calls = Arc::new(AtomicUsize::new(0));

        let primary = Box::new(FlakyOnce {
            name: "primary".into(),
            calls: primary_calls.clone(),
            fail_first: true,
        });
        let fallback = Box::new(FlakyOnce {
            name: "fallback".into(),
            calls: fallback_calls.clone(),
            fail_first: false,
        });

        let chain = ProviderChain::new()
            .with_provider(primary, 5, Duration::from_secs(30))
            .with_provider(fallback, 5, Duration::from_secs(30));

        let result = chain.ainvoke("x").await.unwrap();
        assert_eq!(result, "ok");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_providers_failing_raises_llm_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let only = Box::new(FlakyOnce {
            name: "only".into(),
            calls: calls.clone(),
            fail_first: true,
        });
        // fail_first only fails the very first call; force every call to fail instead.
        struct AlwaysFail;
        #[async_trait]
        impl ChatModel for AlwaysFail {
            async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
                Err(LlmError::Other("down".into()))
            }
            fn clone_box(&self) -> Box<dyn ChatModel> {
                Box::new(AlwaysFail)
            }
            fn name(&self) -> &str {
                "always-fail"
            }
        }
        let _ = only;
        let chain = ProviderChain::new().with_provider(Box::new(AlwaysFail), 5, Duration::from_secs(30));
        let result = chain.ainvoke("x").await;
        assert!(matches!(result, Err(LlmError::AllProvidersFailed(_))));
    }
}
