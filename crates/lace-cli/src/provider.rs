//! Provider resolution (§6 "Environment variables", §7 configuration
//! errors). Concrete vendor wire protocols are an external collaborator of
//! the conversation engine (§1, §4.F); this module recognizes provider
//! *names* and either returns the in-process echo test provider or a
//! `ConfigurationError` explaining what's missing, exactly as §6's "exit
//! code 1: configuration error (missing API key, unknown provider)" names.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use lace_provider::{Message, ProviderError, ProviderPort, ProviderResult, Response, Role, TokenSender, ToolDefinition};
use tokio_util::sync::CancellationToken;

use crate::error::CliError;

/// A provider that echoes the most recent user message back, prefixed.
/// Exists so the CLI (and its test suite, via `LACE_TEST_MODE`) has a real
/// `ProviderPort` to drive end to end without a vendor adapter compiled in.
pub struct EchoProvider {
    model: String,
}

impl EchoProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into() }
    }
}

impl Default for EchoProvider {
    fn default() -> Self {
        Self::new("echo-1")
    }
}

fn echo_reply(messages: &[Message]) -> String {
    match messages.iter().rev().find(|m| m.role == Role::User) {
        Some(m) => format!("echo: {}", m.content),
        None => "echo: (no user message)".to_string(),
    }
}

#[async_trait]
impl ProviderPort for EchoProvider {
    fn provider_name(&self) -> &str {
        "echo"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn create_response(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        cancel: &CancellationToken,
    ) -> ProviderResult<Response> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        Ok(Response { content: echo_reply(messages), ..Default::default() })
    }

    async fn create_streaming_response(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        cancel: &CancellationToken,
        tokens: TokenSender,
    ) -> ProviderResult<Response> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        let content = echo_reply(messages);
        for word in content.split_whitespace() {
            if cancel.is_cancelled() {
                break;
            }
            tokens.send(format!("{word} "));
        }
        Ok(Response { content, ..Default::default() })
    }
}

/// Resolves a `--provider` name (or a delegate's `provider:model` override)
/// to a concrete `ProviderPort`, also serving as the `delegate` tool's
/// `lace_agent::ProviderFactory`.
pub struct CliProviderFactory;

impl CliProviderFactory {
    pub fn resolve(&self, name: &str, model: Option<&str>) -> Result<Arc<dyn ProviderPort>, String> {
        match name {
            "echo" | "test" => Ok(Arc::new(EchoProvider::new(model.unwrap_or("echo-1"))) as Arc<dyn ProviderPort>),
            "anthropic" => {
                if env::var("ANTHROPIC_KEY").is_err() {
                    return Err("missing API key: set ANTHROPIC_KEY to use --provider anthropic".to_string());
                }
                Err(no_adapter("anthropic"))
            }
            "openai" => {
                if env::var("OPENAI_API_KEY").is_err() && env::var("OPENAI_KEY").is_err() {
                    return Err(
                        "missing API key: set OPENAI_API_KEY or OPENAI_KEY to use --provider openai".to_string(),
                    );
                }
                Err(no_adapter("openai"))
            }
            other => Err(format!("unknown provider '{other}'")),
        }
    }

    pub fn resolve_cli(&self, name: &str, model: Option<&str>) -> Result<Arc<dyn ProviderPort>, CliError> {
        self.resolve(name, model).map_err(CliError::Configuration)
    }
}

impl lace_agent::ProviderFactory for CliProviderFactory {
    fn create(&self, provider_name: &str, model: &str) -> Result<Arc<dyn ProviderPort>, String> {
        self.resolve(provider_name, Some(model))
    }
}

fn no_adapter(name: &str) -> String {
    format!(
        "no vendor wire adapter is linked into this build for '{name}'; only the echo test provider is available"
    )
}
