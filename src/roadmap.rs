pub mod generator;

use std::collections::BTreeSet;

use generator::{RoadmapDraft, RoadmapRequest, StepDraft};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::info;
use utoipa::ToSchema;

use crate::{
    ai_utils::{AiCollaborator, ContentSource, Generated},
    config::ProgressionConfig,
    error::{Error, Result},
    progress::{self, StepStatus},
    store::{NewRoadmap, NewStep, Store},
};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, ToSchema,
)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl From<String> for Difficulty {
    fn from(value: String) -> Self {
        Difficulty::from(value.as_str())
    }
}

impl From<&str> for Difficulty {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "beginner" | "easy" | "basic" => Difficulty::Beginner,
            "advanced" | "hard" | "expert" => Difficulty::Advanced,
            _ => Difficulty::Intermediate,
        }
    }
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i64)]
pub enum RoadmapStatus {
    Active = 0,
    Completed = 1,
    Archived = 2,
}

impl TryFrom<i64> for RoadmapStatus {
    type Error = anyhow::Error;
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => RoadmapStatus::Active,
            1 => RoadmapStatus::Completed,
            2 => RoadmapStatus::Archived,
            _ => anyhow::bail!("unknown roadmap status {}", value),
        })
    }
}

/// A learner's curriculum instance
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Roadmap {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub difficulty: Difficulty,
    pub total_steps: i64,
    pub estimated_hours: f64,
    pub status: RoadmapStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One ordered unit of a roadmap
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Step {
    pub id: i64,
    pub roadmap_id: i64,
    /// 1-based position, unique within the roadmap
    pub order: i64,
    pub title: String,
    pub description: String,
    pub step_type: String,
    pub difficulty: Difficulty,
    pub estimated_minutes: i64,
    pub mastery_threshold: i64,
    /// ids of steps that must be completed before this one unlocks
    pub prerequisites: BTreeSet<i64>,
    pub resources: Vec<String>,
    /// score of the most recent attempt
    pub current_score: Option<i64>,
    pub attempts: i64,
    pub status: StepStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoadmapDetail {
    pub roadmap: Roadmap,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CreatedRoadmap {
    #[serde(flatten)]
    pub detail: RoadmapDetail,
    /// where the step list came from
    pub source: ContentSource,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateRoadmapRequest {
    #[serde(flatten)]
    pub request: RoadmapRequest,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    /// explicit steps; generated from the request when absent
    #[serde(default)]
    pub steps: Option<Vec<StepDraft>>,
}

pub async fn create_roadmap(
    store: &Store,
    ai: &AiCollaborator,
    progression: &ProgressionConfig,
    user_id: i64,
    req: CreateRoadmapRequest,
) -> Result<CreatedRoadmap> {
    if req.request.subject.trim().is_empty() {
        return Err(Error::BadRequest("subject must not be empty".to_string()));
    }
    let generated = match req.steps {
        Some(steps) if !steps.is_empty() => {
            let subject = req.request.subject.trim();
            Generated {
                value: RoadmapDraft {
                    title: format!("{subject} Learning Roadmap"),
                    description: String::new(),
                    total_steps: steps.len(),
                    estimated_hours: generator::total_hours(&steps),
                    difficulty: Difficulty::default(),
                    steps,
                },
                source: ContentSource::Provided,
            }
        }
        _ => generator::generate_roadmap(ai, &req.request).await,
    };
    let Generated { value: draft, source } = generated;

    let new_roadmap = NewRoadmap {
        user_id,
        title: req.title.unwrap_or(draft.title),
        description: req.description.unwrap_or(draft.description),
        subject: req.request.subject.trim().to_string(),
        difficulty: req.difficulty.unwrap_or(draft.difficulty),
        estimated_hours: draft.estimated_hours,
    };
    let steps = plan_steps(draft.steps, progression);
    let (roadmap, steps) = store.create_roadmap(&new_roadmap, &steps).await?;
    info!(
        "user {} created roadmap {} with {} steps ({:?})",
        user_id,
        roadmap.id,
        steps.len(),
        source
    );
    Ok(CreatedRoadmap {
        detail: RoadmapDetail { roadmap, steps },
        source,
    })
}

/// Orders drafts, assigns initial statuses and prerequisite positions
pub fn plan_steps(drafts: Vec<StepDraft>, progression: &ProgressionConfig) -> Vec<NewStep> {
    drafts
        .into_iter()
        .enumerate()
        .map(|(idx, draft)| {
            let order = idx as i64 + 1;
            NewStep {
                order,
                estimated_minutes: draft.minutes(),
                prerequisite_orders: progress::normalize_prerequisites(order, &draft.prerequisites),
                status: progress::initial_status(order),
                mastery_threshold: draft
                    .mastery_threshold
                    .unwrap_or(progression.mastery_threshold)
                    .clamp(0, 100),
                title: draft.title,
                description: draft.description,
                step_type: draft.step_type,
                difficulty: draft.difficulty,
                resources: draft.resources,
            }
        })
        .collect()
}

pub async fn list_roadmaps(store: &Store, user_id: i64) -> Result<Vec<Roadmap>> {
    store.list_roadmaps(user_id).await
}

/// Loads a roadmap the user owns; other users' roadmaps look missing
pub async fn load_owned_roadmap(store: &Store, user_id: i64, roadmap_id: i64) -> Result<Roadmap> {
    match store.get_roadmap(roadmap_id).await? {
        Some(roadmap) if roadmap.user_id == user_id => Ok(roadmap),
        _ => Err(Error::not_found("roadmap", roadmap_id)),
    }
}

pub async fn load_owned_step(store: &Store, user_id: i64, step_id: i64) -> Result<(Roadmap, Step)> {
    let step = store
        .get_step(step_id)
        .await?
        .ok_or(Error::not_found("step", step_id))?;
    match store.get_roadmap(step.roadmap_id).await? {
        Some(roadmap) if roadmap.user_id == user_id => Ok((roadmap, step)),
        _ => Err(Error::not_found("step", step_id)),
    }
}

pub async fn get_roadmap_detail(
    store: &Store,
    user_id: i64,
    roadmap_id: i64,
) -> Result<RoadmapDetail> {
    let roadmap = load_owned_roadmap(store, user_id, roadmap_id).await?;
    let steps = store.list_steps(roadmap.id).await?;
    Ok(RoadmapDetail { roadmap, steps })
}

pub async fn archive_roadmap(store: &Store, user_id: i64, roadmap_id: i64) -> Result<Roadmap> {
    let roadmap = load_owned_roadmap(store, user_id, roadmap_id).await?;
    store
        .set_roadmap_status(roadmap.id, RoadmapStatus::Archived)
        .await?;
    load_owned_roadmap(store, user_id, roadmap_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{failing_ai, learner, memory_store};

    fn request(subject: &str) -> CreateRoadmapRequest {
        CreateRoadmapRequest {
            request: RoadmapRequest {
                subject: subject.to_string(),
                ..Default::default()
            },
            title: None,
            description: None,
            difficulty: None,
            steps: None,
        }
    }

    #[test]
    fn difficulty_is_lenient() {
        assert_eq!(Difficulty::from("BEGINNER"), Difficulty::Beginner);
        assert_eq!(Difficulty::from(" Hard "), Difficulty::Advanced);
        assert_eq!(Difficulty::from("whatever"), Difficulty::Intermediate);
        let d: Difficulty = serde_json::from_str("\"Advanced\"").unwrap();
        assert_eq!(d, Difficulty::Advanced);
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"advanced\"");
    }

    #[tokio::test]
    async fn new_roadmap_has_one_available_step() {
        let store = memory_store().await;
        let user = learner(&store, "a@example.com").await;
        let created = create_roadmap(
            &store,
            &failing_ai(),
            &ProgressionConfig::default(),
            user,
            request("Chemistry"),
        )
        .await
        .unwrap();
        assert_eq!(created.source, ContentSource::Fallback);
        let RoadmapDetail { roadmap, steps } = created.detail;
        assert_eq!(roadmap.total_steps, 5);
        assert_eq!(roadmap.status, RoadmapStatus::Active);
        assert_eq!(steps.len(), 5);
        for (idx, step) in steps.iter().enumerate() {
            assert_eq!(step.order, idx as i64 + 1);
            assert_eq!(step.mastery_threshold, 70);
            assert_eq!(step.attempts, 0);
            assert_eq!(step.current_score, None);
            if step.order == 1 {
                assert_eq!(step.status, StepStatus::Available);
                assert!(step.prerequisites.is_empty());
            } else {
                assert_eq!(step.status, StepStatus::Locked);
                assert_eq!(
                    step.prerequisites,
                    BTreeSet::from([steps[idx - 1].id]),
                    "prerequisites are step ids of the previous step"
                );
            }
        }
    }

    #[tokio::test]
    async fn explicit_steps_keep_declared_prerequisites() {
        let store = memory_store().await;
        let user = learner(&store, "b@example.com").await;
        let draft = |title: &str, prerequisites: Vec<i64>| StepDraft {
            title: title.to_string(),
            description: String::new(),
            step_type: "lesson".to_string(),
            difficulty: Difficulty::Beginner,
            estimated_minutes: 30,
            prerequisites,
            resources: vec![],
            mastery_threshold: Some(80),
        };
        let mut req = request("Go");
        req.title = Some("My Go".to_string());
        req.steps = Some(vec![
            draft("a", vec![]),
            draft("b", vec![1]),
            draft("c", vec![1]),
            draft("d", vec![2, 3]),
        ]);
        let created = create_roadmap(
            &store,
            &failing_ai(),
            &ProgressionConfig::default(),
            user,
            req,
        )
        .await
        .unwrap();
        assert_eq!(created.source, ContentSource::Provided);
        let steps = created.detail.steps;
        assert_eq!(created.detail.roadmap.title, "My Go");
        assert_eq!(steps[3].prerequisites, BTreeSet::from([steps[1].id, steps[2].id]));
        assert_eq!(steps[2].prerequisites, BTreeSet::from([steps[0].id]));
        assert!(steps.iter().all(|s| s.mastery_threshold == 80));
    }

    #[tokio::test]
    async fn huge_step_durations_are_clamped() {
        let store = memory_store().await;
        let user = learner(&store, "m@example.com").await;
        let draft = |minutes: i64| StepDraft {
            title: "long".to_string(),
            description: String::new(),
            step_type: "lesson".to_string(),
            difficulty: Difficulty::Beginner,
            estimated_minutes: minutes,
            prerequisites: vec![],
            resources: vec![],
            mastery_threshold: None,
        };
        let mut req = request("Patience");
        req.steps = Some(vec![draft(i64::MAX), draft(i64::MAX), draft(-5)]);
        let created = create_roadmap(
            &store,
            &failing_ai(),
            &ProgressionConfig::default(),
            user,
            req,
        )
        .await
        .unwrap();
        let steps = created.detail.steps;
        assert_eq!(steps[0].estimated_minutes, generator::MAX_STEP_MINUTES);
        assert_eq!(steps[1].estimated_minutes, generator::MAX_STEP_MINUTES);
        assert_eq!(steps[2].estimated_minutes, 0);
        assert_eq!(
            created.detail.roadmap.estimated_hours,
            (2 * generator::MAX_STEP_MINUTES) as f64 / 60.0
        );
    }

    #[tokio::test]
    async fn other_users_roadmaps_are_hidden() {
        let store = memory_store().await;
        let owner = learner(&store, "owner@example.com").await;
        let other = learner(&store, "other@example.com").await;
        let created = create_roadmap(
            &store,
            &failing_ai(),
            &ProgressionConfig::default(),
            owner,
            request("Art"),
        )
        .await
        .unwrap();
        let id = created.detail.roadmap.id;
        assert!(get_roadmap_detail(&store, owner, id).await.is_ok());
        assert!(matches!(
            get_roadmap_detail(&store, other, id).await,
            Err(Error::NotFound { .. })
        ));
        assert!(list_roadmaps(&store, other).await.unwrap().is_empty());

        let archived = archive_roadmap(&store, owner, id).await.unwrap();
        assert_eq!(archived.status, RoadmapStatus::Archived);
    }

    #[tokio::test]
    async fn empty_subject_is_rejected() {
        let store = memory_store().await;
        let user = learner(&store, "c@example.com").await;
        let result = create_roadmap(
            &store,
            &failing_ai(),
            &ProgressionConfig::default(),
            user,
            request("  "),
        )
        .await;
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }
}
