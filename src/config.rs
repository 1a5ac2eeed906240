use std::{collections::BTreeMap, path::Path, path::PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{ai_utils::UseCase, assessment::grading::ScoringPolicy};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub progression: ProgressionConfig,
    pub assessment: AssessmentConfig,
    pub ai: AiConfig,
}

impl Config {
    /// Load from a TOML file, or defaults when no path is given.
    /// `AI_MODEL` in the environment overrides the default model.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                toml::from_str::<Config>(&content)
                    .with_context(|| format!("failed to parse config {}", path.display()))?
            }
            None => Config::default(),
        };
        if let Ok(model) = dotenvy::var("AI_MODEL") {
            config.ai.default_model = model;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let threshold = self.progression.mastery_threshold;
        if !(0..=100).contains(&threshold) {
            anyhow::bail!("mastery_threshold must be within 0..=100, got {threshold}");
        }
        if self.progression.attempt_limit < 1 {
            anyhow::bail!("attempt_limit must be at least 1");
        }
        if self.assessment.question_count == 0 {
            anyhow::bail!("question_count must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database: PathBuf,
    pub session_ttl_days: i64,
    pub request_timeout_secs: u64,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database: PathBuf::from("database/tutor.db"),
            session_ttl_days: 5,
            request_timeout_secs: 120,
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl ServerConfig {
    /// Certificate and key paths when both are configured
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls_paths().is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    /// percentage a step's assessment must reach, used when a step carries no own threshold
    pub mastery_threshold: i64,
    /// failed submissions after which a step needs review
    pub attempt_limit: i64,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            mastery_threshold: 70,
            attempt_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentConfig {
    pub question_count: usize,
    pub scoring: ScoringPolicy,
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            question_count: 4,
            scoring: ScoringPolicy::Graded,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub default_model: String,
    pub timeout_secs: u64,
    /// per use case model, e.g. `lesson_content = "gpt-4o"`
    pub models: BTreeMap<UseCase, String>,
    pub params: BTreeMap<UseCase, CompletionParams>,
}

impl Default for AiConfig {
    fn default() -> Self {
        let params = BTreeMap::from([
            (
                UseCase::RoadmapGeneration,
                CompletionParams {
                    temperature: 0.7,
                    max_tokens: 2000,
                },
            ),
            (
                UseCase::LessonContent,
                CompletionParams {
                    temperature: 0.7,
                    max_tokens: 2500,
                },
            ),
            (
                UseCase::AssessmentGeneration,
                CompletionParams {
                    temperature: 0.5,
                    max_tokens: 1500,
                },
            ),
        ]);
        Self {
            default_model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
            models: BTreeMap::new(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [assessment]
            scoring = "legacy"

            [ai.models]
            lesson_content = "big-model"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.progression.mastery_threshold, 70);
        assert_eq!(config.progression.attempt_limit, 3);
        assert_eq!(config.assessment.question_count, 4);
        assert_eq!(config.assessment.scoring, ScoringPolicy::Legacy);
        assert_eq!(
            config.ai.models.get(&UseCase::LessonContent).map(String::as_str),
            Some("big-model")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.progression.mastery_threshold = 120;
        assert!(config.validate().is_err());
    }
}
