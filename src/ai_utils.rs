use std::{
    collections::BTreeMap,
    sync::{Arc, LazyLock},
    time::Duration,
};

use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{ChatCompletionRequestMessage, CreateChatCompletionRequestArgs},
};
use futures::future::BoxFuture;
use regex::Regex;
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;
use utoipa::ToSchema;

use crate::config::{AiConfig, CompletionParams};

/// What a completion is used for, drives model and parameter selection
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum UseCase {
    RoadmapGeneration,
    LessonContent,
    AssessmentGeneration,
}

/// Where a piece of content came from: the AI, a fixed fallback, or the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
#[repr(i64)]
pub enum ContentSource {
    Ai = 0,
    Fallback = 1,
    Provided = 2,
}

impl From<i64> for ContentSource {
    fn from(value: i64) -> Self {
        match value {
            0 => ContentSource::Ai,
            2 => ContentSource::Provided,
            _ => ContentSource::Fallback,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Generated<T> {
    pub value: T,
    pub source: ContentSource,
}

impl<T> Generated<T> {
    pub fn ai(value: T) -> Self {
        Self {
            value,
            source: ContentSource::Ai,
        }
    }
    pub fn fallback(value: T) -> Self {
        Self {
            value,
            source: ContentSource::Fallback,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatCompletionRequestMessage>,
    pub params: CompletionParams,
}

/// Text completion provider. Best effort: any call may fail.
pub trait Completer: Send + Sync {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, anyhow::Result<String>>;
}

pub struct OpenAiCompleter {
    client: Client<OpenAIConfig>,
}

impl OpenAiCompleter {
    pub fn new(api_key: &str, base_url: &str) -> Self {
        let config = OpenAIConfig::default()
            .with_api_base(base_url)
            .with_api_key(api_key);
        Self {
            client: Client::with_config(config),
        }
    }

    /// Reads `OPENAI_API_KEY` and `OPENAI_BASE_URL`
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let api_key = dotenvy::var("OPENAI_API_KEY")
            .map_err(|e| anyhow::anyhow!("OPENAI_API_KEY not set: {}", e))?;
        let base_url = dotenvy::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        Ok(Self::new(&api_key, &base_url))
    }
}

impl Completer for OpenAiCompleter {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, anyhow::Result<String>> {
        Box::pin(async move {
            let chat_request = CreateChatCompletionRequestArgs::default()
                .model(request.model)
                .messages(request.messages)
                .temperature(request.params.temperature)
                .max_completion_tokens(request.params.max_tokens)
                .build()?;
            let response = self.client.chat().create(chat_request).await?;
            let content = response
                .choices
                .first()
                .ok_or(anyhow::anyhow!("No response from OpenAI"))?
                .message
                .content
                .clone()
                .ok_or(anyhow::anyhow!("No content in OpenAI response"))?;
            Ok(content)
        })
    }
}

/// Picks the model for a use case: explicit override first, default model otherwise
#[derive(Debug, Clone)]
pub struct ModelSelector {
    default_model: String,
    models: BTreeMap<UseCase, String>,
}

impl ModelSelector {
    pub fn new(default_model: impl Into<String>, models: BTreeMap<UseCase, String>) -> Self {
        Self {
            default_model: default_model.into(),
            models,
        }
    }

    pub fn select_model(&self, use_case: UseCase) -> &str {
        self.models
            .get(&use_case)
            .map(String::as_str)
            .unwrap_or(&self.default_model)
    }
}

#[derive(Clone)]
pub struct AiCollaborator {
    completer: Arc<dyn Completer>,
    selector: ModelSelector,
    params: BTreeMap<UseCase, CompletionParams>,
    timeout: Duration,
}

impl AiCollaborator {
    pub fn new(completer: Arc<dyn Completer>, config: &AiConfig) -> Self {
        Self {
            completer,
            selector: ModelSelector::new(config.default_model.clone(), config.models.clone()),
            params: config.params.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub async fn generate(
        &self,
        use_case: UseCase,
        system: &str,
        prompt: String,
    ) -> anyhow::Result<String> {
        let params = self
            .params
            .get(&use_case)
            .copied()
            .unwrap_or(CompletionParams {
                temperature: 0.7,
                max_tokens: 2000,
            });
        let request = CompletionRequest {
            model: self.selector.select_model(use_case).to_string(),
            messages: vec![
                ChatCompletionRequestMessage::System(system.to_string().into()),
                ChatCompletionRequestMessage::User(prompt.into()),
            ],
            params,
        };
        debug!("AI completion for {:?} with model {}", use_case, request.model);
        let content = tokio::time::timeout(self.timeout, self.completer.complete(request))
            .await
            .map_err(|_| anyhow::anyhow!("AI completion timed out after {:?}", self.timeout))??;
        if content.trim().is_empty() {
            anyhow::bail!("AI returned empty content");
        }
        Ok(content)
    }

    /// Asks for JSON matching `T`'s schema and parses the answer defensively
    pub async fn generate_structured<T: DeserializeOwned + JsonSchema>(
        &self,
        use_case: UseCase,
        system: &str,
        prompt: String,
    ) -> anyhow::Result<T> {
        let schema = serde_json::to_string_pretty(&schema_for!(T))?;
        let prompt = format!(
            "{prompt}\n\nRespond with a single JSON value matching this JSON schema, without any additional text:\n{schema}"
        );
        let raw = self.generate(use_case, system, prompt).await?;
        parse_structured(&raw).ok_or(anyhow::anyhow!(
            "AI output is not valid {} JSON",
            T::schema_name()
        ))
    }
}

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("valid fence regex")
});

/// Returns the body of the first Markdown code fence, or the trimmed input
pub fn strip_code_fences(raw: &str) -> &str {
    match CODE_FENCE.captures(raw).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim(),
        None => raw.trim(),
    }
}

pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let body = strip_code_fences(raw);
    if let Ok(value) = serde_json::from_str(body) {
        return Some(value);
    }
    // prose around the JSON value
    let start = body.find(['{', '['])?;
    let end = body.rfind(['}', ']'])?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&body[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingCompleter, ScriptedCompleter};

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"name\": \"a\", \"count\": 1}\n```";
        assert_eq!(strip_code_fences(raw), "{\"name\": \"a\", \"count\": 1}");
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }

    #[test]
    fn parses_fenced_and_wrapped_output() {
        let fenced = "Here you go:\n```\n{\"name\": \"x\", \"count\": 2}\n```\nEnjoy";
        assert_eq!(
            parse_structured::<Sample>(fenced),
            Some(Sample {
                name: "x".to_string(),
                count: 2
            })
        );
        let prose = "Sure! {\"name\": \"y\", \"count\": 3} hope that helps";
        assert_eq!(parse_structured::<Sample>(prose).map(|s| s.count), Some(3));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_structured::<Sample>("not json at all").is_none());
        assert!(parse_structured::<Sample>("} backwards {").is_none());
    }

    #[test]
    fn model_selection_prefers_override() {
        let selector = ModelSelector::new(
            "base",
            BTreeMap::from([(UseCase::LessonContent, "writer".to_string())]),
        );
        assert_eq!(selector.select_model(UseCase::LessonContent), "writer");
        assert_eq!(selector.select_model(UseCase::RoadmapGeneration), "base");
    }

    #[tokio::test]
    async fn structured_generation_parses_reply() {
        let completer = ScriptedCompleter::new(["```json\n{\"name\": \"z\", \"count\": 9}\n```"]);
        let ai = AiCollaborator::new(Arc::new(completer), &AiConfig::default());
        let sample: Sample = ai
            .generate_structured(UseCase::AssessmentGeneration, "system", "prompt".into())
            .await
            .unwrap();
        assert_eq!(sample.count, 9);
    }

    #[tokio::test]
    async fn structured_generation_surfaces_failures() {
        let ai = AiCollaborator::new(Arc::new(FailingCompleter), &AiConfig::default());
        let result = ai
            .generate_structured::<Sample>(UseCase::AssessmentGeneration, "system", "p".into())
            .await;
        assert!(result.is_err());

        let ai = AiCollaborator::new(
            Arc::new(ScriptedCompleter::new(["no json here"])),
            &AiConfig::default(),
        );
        let result = ai
            .generate_structured::<Sample>(UseCase::AssessmentGeneration, "system", "p".into())
            .await;
        assert!(result.is_err());
    }
}
