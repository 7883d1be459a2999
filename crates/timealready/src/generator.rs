//! Model-backed [`FixGenerator`] over OpenAI-compatible endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use coordination::escalation::{FixGenerator, GenerationError, GenerationTier};
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use tracing::{debug, warn};

use crate::config::{HealerConfig, TierEndpoint};

pub const SMART_PREAMBLE: &str =
    "You are an expert debugger. Fix the code and return ONLY the fixed code, no explanations.";

/// Retries per tier on transient transport errors.
const MAX_RETRIES: u32 = 1;

struct TierClient {
    client: openai::CompletionsClient,
    model: String,
}

impl TierClient {
    fn build(endpoint: &TierEndpoint, tier: GenerationTier) -> Result<Self> {
        let api_key = endpoint
            .api_key
            .as_deref()
            .with_context(|| format!("No API key for the {tier} tier"))?;
        let client = openai::CompletionsClient::builder()
            .api_key(api_key)
            .base_url(&endpoint.url)
            .build()
            .with_context(|| format!("Failed to build {tier} tier client ({})", endpoint.url))?;
        Ok(Self {
            client,
            model: endpoint.model.clone(),
        })
    }
}

/// Cheap and smart tier clients, one per endpoint.
pub struct RigFixGenerator {
    cheap: TierClient,
    smart: TierClient,
}

impl RigFixGenerator {
    pub fn from_config(config: &HealerConfig) -> Result<Self> {
        Ok(Self {
            cheap: TierClient::build(&config.cheap, GenerationTier::Cheap)?,
            smart: TierClient::build(&config.smart, GenerationTier::Smart)?,
        })
    }

    async fn prompt_tier(&self, prompt: &str, tier: GenerationTier) -> Result<String, String> {
        match tier {
            GenerationTier::Cheap => {
                let agent = self
                    .cheap
                    .client
                    .agent(&self.cheap.model)
                    .temperature(0.1)
                    .max_tokens(2048)
                    .build();
                prompt_with_retry(&agent, prompt, MAX_RETRIES).await
            }
            GenerationTier::Smart => {
                let agent = self
                    .smart
                    .client
                    .agent(&self.smart.model)
                    .preamble(SMART_PREAMBLE)
                    .max_tokens(8192)
                    .build();
                prompt_with_retry(&agent, prompt, MAX_RETRIES).await
            }
        }
    }
}

#[async_trait]
impl FixGenerator for RigFixGenerator {
    async fn generate(&self, prompt: &str, tier: GenerationTier) -> Result<String, GenerationError> {
        debug!(%tier, prompt_chars = prompt.len(), "Requesting candidate");
        let response = self
            .prompt_tier(prompt, tier)
            .await
            .map_err(|message| GenerationError::Request { tier, message })?;
        if response.trim().is_empty() {
            return Err(GenerationError::EmptyResponse { tier });
        }
        Ok(response)
    }
}

/// Prompt with exponential backoff (2s, 4s, ...) on transient errors only.
async fn prompt_with_retry(
    agent: &impl Prompt,
    prompt: &str,
    max_retries: u32,
) -> Result<String, String> {
    let mut attempt = 0;
    loop {
        match agent.prompt(prompt).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                let err_str = e.to_string();
                if !is_transient_error(&err_str) || attempt >= max_retries {
                    return Err(err_str);
                }
                let backoff = Duration::from_secs(2u64.pow(attempt + 1));
                warn!(
                    attempt = attempt + 1,
                    max_retries,
                    backoff_secs = backoff.as_secs(),
                    error = %err_str,
                    "Transient error, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

pub fn is_transient_error(err_str: &str) -> bool {
    let lower = err_str.to_ascii_lowercase();
    err_str.contains("502")
        || err_str.contains("503")
        || err_str.contains("429")
        || lower.contains("connection")
        || lower.contains("timed out")
        || lower.contains("error sending request")
        || lower.contains("reset by peer")
}
