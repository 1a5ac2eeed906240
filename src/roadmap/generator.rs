use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use super::Difficulty;
use crate::ai_utils::{AiCollaborator, Generated, UseCase};

const SYSTEM_PROMPT: &str = "You are an expert curriculum designer. You break learning goals \
    into an ordered sequence of focused, assessable steps. Each step builds on earlier ones.";

/// What the learner wants to learn and how much time they have
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RoadmapRequest {
    pub subject: String,
    #[serde(default)]
    pub current_level: Option<String>,
    #[serde(default)]
    pub target_level: Option<String>,
    #[serde(default)]
    pub hours_per_week: Option<f64>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// A generated learning roadmap
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct RoadmapDraft {
    /// Short title of the roadmap
    pub title: String,
    /// One or two sentences describing the roadmap
    #[serde(default)]
    pub description: String,
    /// Number of steps in the roadmap
    #[serde(default, alias = "totalSteps")]
    pub total_steps: usize,
    /// Total estimated study time in hours
    #[serde(default, alias = "estimatedHours")]
    pub estimated_hours: f64,
    /// Overall difficulty: beginner, intermediate or advanced
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Ordered steps, the first step has no prerequisites
    pub steps: Vec<StepDraft>,
}

/// One step of a generated roadmap
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, ToSchema)]
pub struct StepDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Kind of step, e.g. lesson, practice or project
    #[serde(default = "default_step_type", rename = "type", alias = "step_type")]
    pub step_type: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default = "default_minutes", alias = "estimatedMinutes")]
    pub estimated_minutes: i64,
    /// 1-based positions of earlier steps that must be completed first
    #[serde(default)]
    pub prerequisites: Vec<i64>,
    #[serde(default)]
    pub resources: Vec<String>,
    /// Percentage needed to pass this step's assessment
    #[serde(default, alias = "masteryThreshold")]
    pub mastery_threshold: Option<i64>,
}

fn default_step_type() -> String {
    "lesson".to_string()
}

fn default_minutes() -> i64 {
    45
}

/// Upper bound for a single step's duration, one week of minutes
pub const MAX_STEP_MINUTES: i64 = 7 * 24 * 60;

impl StepDraft {
    /// Declared duration clamped to `0..=MAX_STEP_MINUTES`
    pub fn minutes(&self) -> i64 {
        self.estimated_minutes.clamp(0, MAX_STEP_MINUTES)
    }
}

pub fn total_hours(steps: &[StepDraft]) -> f64 {
    steps.iter().map(StepDraft::minutes).sum::<i64>() as f64 / 60.0
}

impl RoadmapDraft {
    fn normalized(mut self) -> Self {
        self.total_steps = self.steps.len();
        if !(self.estimated_hours > 0.0 && self.estimated_hours.is_finite()) {
            self.estimated_hours = total_hours(&self.steps);
        }
        self
    }
}

pub fn build_prompt(req: &RoadmapRequest) -> String {
    let mut prompt = format!("Create a personalized learning roadmap for: {}\n", req.subject);
    if let Some(level) = &req.current_level {
        prompt.push_str(&format!("Current level: {level}\n"));
    }
    if let Some(level) = &req.target_level {
        prompt.push_str(&format!("Target level: {level}\n"));
    }
    if let Some(hours) = req.hours_per_week {
        prompt.push_str(&format!("Time commitment: {hours} hours per week\n"));
    }
    if let Some(goal) = &req.goal {
        prompt.push_str(&format!("Learning goal: {goal}\n"));
    }
    if !req.topics.is_empty() {
        prompt.push_str(&format!("Topics to cover: {}\n", req.topics.join(", ")));
    }
    prompt.push_str(
        "\nProduce between 5 and 12 steps ordered from foundations to advanced material. \
        Reference prerequisites by the 1-based position of earlier steps.",
    );
    prompt
}

pub async fn generate_roadmap(ai: &AiCollaborator, req: &RoadmapRequest) -> Generated<RoadmapDraft> {
    match ai
        .generate_structured::<RoadmapDraft>(UseCase::RoadmapGeneration, SYSTEM_PROMPT, build_prompt(req))
        .await
    {
        Ok(draft) if !draft.steps.is_empty() => {
            info!("generated roadmap '{}' with {} steps", draft.title, draft.steps.len());
            Generated::ai(draft.normalized())
        }
        Ok(_) => {
            warn!("AI roadmap for '{}' has no steps, using fallback", req.subject);
            Generated::fallback(fallback_roadmap(req))
        }
        Err(e) => {
            warn!("roadmap generation for '{}' failed, using fallback: {}", req.subject, e);
            Generated::fallback(fallback_roadmap(req))
        }
    }
}

/// Fixed five step curriculum phrased around the subject
pub fn fallback_roadmap(req: &RoadmapRequest) -> RoadmapDraft {
    let subject = req.subject.trim();
    let step = |title: String, description: String, difficulty, minutes, order: i64| StepDraft {
        title,
        description,
        step_type: default_step_type(),
        difficulty,
        estimated_minutes: minutes,
        prerequisites: if order > 1 { vec![order - 1] } else { vec![] },
        resources: vec![],
        mastery_threshold: None,
    };
    let steps = vec![
        step(
            format!("Introduction to {subject}"),
            format!("What {subject} is, why it matters and the key vocabulary."),
            Difficulty::Beginner,
            30,
            1,
        ),
        step(
            format!("{subject} Fundamentals"),
            format!("The basic building blocks of {subject} and how they fit together."),
            Difficulty::Beginner,
            45,
            2,
        ),
        step(
            format!("Core Concepts of {subject}"),
            format!("The central ideas of {subject} explored in depth with examples."),
            Difficulty::Intermediate,
            60,
            3,
        ),
        step(
            format!("Practical {subject} Applications"),
            format!("Applying {subject} to realistic problems and exercises."),
            Difficulty::Intermediate,
            60,
            4,
        ),
        step(
            format!("Advanced {subject} Topics"),
            format!("Advanced techniques and next directions in {subject}."),
            Difficulty::Advanced,
            90,
            5,
        ),
    ];
    RoadmapDraft {
        title: format!("{subject} Learning Roadmap"),
        description: format!("A structured path from the basics of {subject} to advanced topics."),
        total_steps: 0,
        estimated_hours: 0.0,
        difficulty: Difficulty::Beginner,
        steps,
    }
    .normalized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_utils::ContentSource;
    use crate::testing::{failing_ai, scripted_ai};

    fn request() -> RoadmapRequest {
        RoadmapRequest {
            subject: "Rust".to_string(),
            goal: Some("write a CLI".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn ai_failure_yields_fixed_fallback() {
        let generated = generate_roadmap(&failing_ai(), &request()).await;
        assert_eq!(generated.source, ContentSource::Fallback);
        let draft = generated.value;
        assert_eq!(draft.total_steps, 5);
        assert_eq!(draft.steps.len(), 5);
        assert_eq!(draft.steps[0].title, "Introduction to Rust");
        assert!(draft.steps[0].prerequisites.is_empty());
        assert_eq!(draft.steps[4].prerequisites, vec![4]);
        assert_eq!(draft.estimated_hours, 285.0 / 60.0);

        // deterministic
        let again = generate_roadmap(&failing_ai(), &request()).await.value;
        assert_eq!(
            serde_json::to_value(&draft).unwrap(),
            serde_json::to_value(&again).unwrap()
        );
    }

    #[tokio::test]
    async fn parses_fenced_camel_case_output() {
        let reply = r#"```json
{
  "title": "Rust CLI",
  "description": "From zero to a CLI",
  "totalSteps": 99,
  "estimatedHours": 6,
  "difficulty": "Intermediate",
  "steps": [
    {"title": "Ownership", "type": "lesson", "estimatedMinutes": 60, "prerequisites": []},
    {"title": "Clap", "difficulty": "ADVANCED", "prerequisites": [1], "resources": ["docs.rs/clap"]}
  ]
}
```"#;
        let generated = generate_roadmap(&scripted_ai([reply]), &request()).await;
        assert_eq!(generated.source, ContentSource::Ai);
        let draft = generated.value;
        assert_eq!(draft.total_steps, 2);
        assert_eq!(draft.difficulty, Difficulty::Intermediate);
        assert_eq!(draft.steps[0].estimated_minutes, 60);
        assert_eq!(draft.steps[1].difficulty, Difficulty::Advanced);
        assert_eq!(draft.steps[1].estimated_minutes, 45);
        assert_eq!(draft.steps[1].resources, vec!["docs.rs/clap".to_string()]);
    }

    #[tokio::test]
    async fn oversized_durations_do_not_overflow() {
        let reply = r#"{"title": "Forever", "steps": [
            {"title": "a", "estimatedMinutes": 9223372036854775807},
            {"title": "b", "estimatedMinutes": 9223372036854775807}
        ]}"#;
        let draft = generate_roadmap(&scripted_ai([reply]), &request()).await.value;
        assert_eq!(draft.steps[0].minutes(), MAX_STEP_MINUTES);
        assert_eq!(draft.estimated_hours, (2 * MAX_STEP_MINUTES) as f64 / 60.0);
    }

    #[tokio::test]
    async fn empty_step_list_is_rejected() {
        let reply = r#"{"title": "Nothing", "steps": []}"#;
        let generated = generate_roadmap(&scripted_ai([reply]), &request()).await;
        assert_eq!(generated.source, ContentSource::Fallback);
        assert_eq!(generated.value.steps.len(), 5);
    }

    #[test]
    fn prompt_mentions_constraints() {
        let mut req = request();
        req.topics = vec!["traits".into(), "async".into()];
        req.hours_per_week = Some(5.0);
        let prompt = build_prompt(&req);
        assert!(prompt.contains("Rust"));
        assert!(prompt.contains("traits, async"));
        assert!(prompt.contains("5 hours per week"));
        assert!(prompt.contains("write a CLI"));
    }
}
