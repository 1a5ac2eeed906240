use std::{sync::Arc, time::Duration};

use moka::future::Cache;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    ai_utils::{AiCollaborator, ContentSource, UseCase},
    error::{Error, Result},
    roadmap::{self, Roadmap, Step},
    store::Store,
};

/// Lessons by step id. Only persisted content lands here.
pub type LessonCache = Cache<i64, Arc<Lesson>>;

const SYSTEM_PROMPT: &str = "You are a patient tutor writing self-study lessons in Markdown. \
    Explain concepts step by step with short examples.";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Lesson {
    pub step_id: i64,
    /// Markdown
    pub content: String,
    pub source: ContentSource,
}

pub fn lesson_cache() -> LessonCache {
    Cache::builder()
        .max_capacity(1_000)
        .time_to_idle(Duration::from_secs(60 * 60))
        .build()
}

#[derive(Debug, thiserror::Error)]
enum LessonError {
    #[error("lesson generation failed: {0}")]
    Generation(anyhow::Error),
    #[error(transparent)]
    Store(#[from] Error),
}

fn build_prompt(roadmap: &Roadmap, step: &Step) -> String {
    let resources = if step.resources.is_empty() {
        String::new()
    } else {
        format!("\nSuggested resources: {}", step.resources.join(", "))
    };
    format!(
        "Write a lesson for step {} of the learning roadmap '{}' (subject: {}).\n\
        Step title: {}\nStep description: {}\nDifficulty: {}\nTarget length: about {} minutes of study.{}\n\n\
        Structure the lesson with an overview, key concepts, a worked example and a short summary.",
        step.order,
        roadmap.title,
        roadmap.subject,
        step.title,
        step.description,
        step.difficulty.as_str(),
        step.estimated_minutes,
        resources
    )
}

/// Fixed lesson used when the AI is unavailable
pub fn fallback_lesson(step: &Step) -> Lesson {
    let content = format!(
        "# {title}\n\n{description}\n\n\
        ## Overview\n\n\
        This lesson introduces {title}. Work through the points below, then take the assessment to check your understanding.\n\n\
        ## Key Points\n\n\
        - Read the step description carefully and note any unfamiliar terms.\n\
        - Find one worked example of {title} and follow it step by step.\n\
        - Summarize what you learned in a few sentences of your own.\n\n\
        ## Next Steps\n\n\
        When you feel confident, take the assessment. A score of {threshold}% or higher completes this step.\n",
        title = step.title,
        description = step.description,
        threshold = step.mastery_threshold,
    );
    Lesson {
        step_id: step.id,
        content,
        source: ContentSource::Fallback,
    }
}

async fn load_or_generate(
    store: &Store,
    ai: &AiCollaborator,
    roadmap: &Roadmap,
    step: &Step,
) -> Result<Arc<Lesson>, LessonError> {
    if let Some(content) = store.get_step_content(step.id).await? {
        return Ok(Arc::new(Lesson {
            step_id: step.id,
            content,
            source: ContentSource::Ai,
        }));
    }
    let content = ai
        .generate(UseCase::LessonContent, SYSTEM_PROMPT, build_prompt(roadmap, step))
        .await
        .map_err(LessonError::Generation)?;
    let content = store.save_step_content(step.id, content.trim()).await?;
    info!("generated lesson for step {}", step.id);
    Ok(Arc::new(Lesson {
        step_id: step.id,
        content,
        source: ContentSource::Ai,
    }))
}

/// Lesson for a step the user owns. Generated once and reused afterwards;
/// concurrent first requests share one generation.
pub async fn get_lesson(
    store: &Store,
    ai: &AiCollaborator,
    cache: &LessonCache,
    user_id: i64,
    step_id: i64,
) -> Result<Lesson> {
    let (roadmap, step) = roadmap::load_owned_step(store, user_id, step_id).await?;
    match cache
        .try_get_with(step.id, load_or_generate(store, ai, &roadmap, &step))
        .await
    {
        Ok(lesson) => Ok(lesson.as_ref().clone()),
        Err(e) => match e.as_ref() {
            LessonError::Generation(_) => {
                warn!("{} for step {}, serving fallback lesson", e, step.id);
                Ok(fallback_lesson(&step))
            }
            LessonError::Store(_) => Err(Error::Fatal(anyhow::anyhow!(
                "failed to load lesson for step {}: {}",
                step.id,
                e
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::{
        config::{AiConfig, ProgressionConfig},
        roadmap::{CreateRoadmapRequest, create_roadmap, generator::RoadmapRequest},
        testing::{ScriptedCompleter, failing_ai, learner, memory_store},
    };

    async fn first_step(store: &Store, user: i64) -> Step {
        create_roadmap(
            store,
            &failing_ai(),
            &ProgressionConfig::default(),
            user,
            CreateRoadmapRequest {
                request: RoadmapRequest {
                    subject: "Music".to_string(),
                    ..Default::default()
                },
                title: None,
                description: None,
                difficulty: None,
                steps: None,
            },
        )
        .await
        .unwrap()
        .detail
        .steps
        .remove(0)
    }

    #[test]
    fn generation_error_names_its_cause_once() {
        let e = LessonError::Generation(anyhow::anyhow!("completion timed out"));
        let message = format!("{} for step {}, serving fallback lesson", e, 7);
        assert_eq!(message.matches("completion timed out").count(), 1);
    }

    #[tokio::test]
    async fn lesson_is_generated_once() {
        let store = memory_store().await;
        let user = learner(&store, "m@example.com").await;
        let step = first_step(&store, user).await;
        let completer = ScriptedCompleter::new(["# Scales\n\nA scale is...", "# Other"]);
        let calls = completer.call_counter();
        let ai = AiCollaborator::new(Arc::new(completer), &AiConfig::default());
        let cache = lesson_cache();

        let first = get_lesson(&store, &ai, &cache, user, step.id).await.unwrap();
        assert_eq!(first.source, ContentSource::Ai);
        assert!(first.content.starts_with("# Scales"));
        let second = get_lesson(&store, &ai, &cache, user, step.id).await.unwrap();
        assert_eq!(second.content, first.content);

        // a fresh cache reads the persisted lesson instead of asking again
        let third = get_lesson(&store, &ai, &lesson_cache(), user, step.id)
            .await
            .unwrap();
        assert_eq!(third.content, first.content);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_is_not_persisted() {
        let store = memory_store().await;
        let user = learner(&store, "n@example.com").await;
        let step = first_step(&store, user).await;
        let cache = lesson_cache();

        let lesson = get_lesson(&store, &failing_ai(), &cache, user, step.id)
            .await
            .unwrap();
        assert_eq!(lesson.source, ContentSource::Fallback);
        assert!(lesson.content.contains(&step.title));
        assert_eq!(lesson.content, fallback_lesson(&step).content);
        assert!(store.get_step_content(step.id).await.unwrap().is_none());

        let ai = AiCollaborator::new(
            Arc::new(ScriptedCompleter::new(["# Rhythm"])),
            &AiConfig::default(),
        );
        let retry = get_lesson(&store, &ai, &cache, user, step.id).await.unwrap();
        assert_eq!(retry.source, ContentSource::Ai);
        assert_eq!(retry.content, "# Rhythm");
    }

    #[tokio::test]
    async fn foreign_step_is_not_found() {
        let store = memory_store().await;
        let owner = learner(&store, "o@example.com").await;
        let other = learner(&store, "p@example.com").await;
        let step = first_step(&store, owner).await;
        let result = get_lesson(&store, &failing_ai(), &lesson_cache(), other, step.id).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }
}
