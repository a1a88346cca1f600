//! OpenAI chat-completions generator with structured output.

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default, env_parse, env_required};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::RecipeGenerator;
use super::prompts::{SYSTEM_PROMPT, human_prompt, response_schema};
use crate::error::{RecipeError, RecipeResult};
use crate::models::{RecipeSummary, RecommendationJob, RecommendationResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl GeneratorConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 5000,
            timeout_secs: 120,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl FromEnv for GeneratorConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_key = env_required("OPENAI_API_KEY")?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::invalid("OPENAI_API_KEY", "must not be empty"));
        }

        Ok(Self {
            api_key,
            base_url: env_or_default("OPENAI_BASE_URL", DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: env_or_default("OPENAI_MODEL", DEFAULT_MODEL),
            temperature: env_parse("OPENAI_TEMPERATURE", 0.3)?,
            max_tokens: env_parse("OPENAI_MAX_TOKENS", 5000)?,
            timeout_secs: env_parse("OPENAI_TIMEOUT_SECS", 120)?,
        })
    }
}

/// Generates recommendations through the chat-completions API
pub struct OpenAiRecipeGenerator {
    config: GeneratorConfig,
    client: Client,
}

impl OpenAiRecipeGenerator {
    pub fn new(config: GeneratorConfig) -> RecipeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        info!(model = %config.model, "Recipe generator initialized");
        Ok(Self { config, client })
    }

    fn request_body(&self, job: &RecommendationJob, candidates: &[RecipeSummary]) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: human_prompt(&job.items, candidates),
                },
            ],
            response_format: json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "recipe_response",
                    "strict": true,
                    "schema": response_schema(),
                }
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
    response_format: Value,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    refusal: Option<String>,
}

/// Missing choice, refusal and null content all yield `None`
fn parse_completion(response: ChatResponse) -> RecipeResult<Option<RecommendationResult>> {
    let Some(choice) = response.choices.into_iter().next() else {
        warn!("Completion returned no choices");
        return Ok(None);
    };

    if let Some(refusal) = choice.message.refusal {
        warn!(refusal = %refusal, "Model refused to generate recipes");
        return Ok(None);
    }

    match choice.message.content.as_deref().map(str::trim) {
        None | Some("") | Some("null") => Ok(None),
        Some(content) => serde_json::from_str(content)
            .map(Some)
            .map_err(|e| RecipeError::Generation(format!("malformed recipe output: {}", e))),
    }
}

#[async_trait]
impl RecipeGenerator for OpenAiRecipeGenerator {
    async fn generate(
        &self,
        job: &RecommendationJob,
        candidates: &[RecipeSummary],
    ) -> RecipeResult<Option<RecommendationResult>> {
        debug!(
            ingredients = job.items.len(),
            candidates = candidates.len(),
            model = %self.config.model,
            "Requesting recipe generation"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(job, candidates))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, error = %body, "Recipe generation request failed");
            return Err(RecipeError::Generation(format!("API returned {}: {}", status, body)));
        }

        let completion: ChatResponse = response.json().await?;
        let result = parse_completion(completion)?;

        if let Some(result) = &result {
            info!(recipes = result.recipes.len(), "Recipes generated");
        }
        Ok(result)
    }
}
