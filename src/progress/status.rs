use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unlock state of a roadmap step
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i64)]
pub enum StepStatus {
    Locked = 0,
    Available = 1,
    InProgress = 2,
    Completed = 3,
    NeedsReview = 4,
    TutorRequired = 5,
}

impl TryFrom<i64> for StepStatus {
    type Error = anyhow::Error;
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => StepStatus::Locked,
            1 => StepStatus::Available,
            2 => StepStatus::InProgress,
            3 => StepStatus::Completed,
            4 => StepStatus::NeedsReview,
            5 => StepStatus::TutorRequired,
            _ => anyhow::bail!("unknown step status {}", value),
        })
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepStatus::Locked => "LOCKED",
            StepStatus::Available => "AVAILABLE",
            StepStatus::InProgress => "IN_PROGRESS",
            StepStatus::Completed => "COMPLETED",
            StepStatus::NeedsReview => "NEEDS_REVIEW",
            StepStatus::TutorRequired => "TUTOR_REQUIRED",
        };
        f.write_str(name)
    }
}
