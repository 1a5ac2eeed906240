//! SQLite persistence for accounts, roadmaps, steps, attempts and tutor assignments.

mod schema;

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use sqlx::{
    FromRow, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use time::OffsetDateTime;
use tracing::info;

use crate::{
    ai_utils::ContentSource,
    assessment::{AssessmentAttempt, questions::{Question, QuestionSet}},
    error::{Error, Result},
    progress::StepStatus,
    roadmap::{Difficulty, Roadmap, RoadmapStatus, Step},
    tutor::{AssignmentStatus, TutorAssignment},
    user::{Role, UserInfo},
    utils::now,
};

#[derive(Debug, Clone)]
pub struct NewRoadmap {
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub subject: String,
    pub difficulty: Difficulty,
    pub estimated_hours: f64,
}

#[derive(Debug, Clone)]
pub struct NewStep {
    pub order: i64,
    pub title: String,
    pub description: String,
    pub step_type: String,
    pub difficulty: Difficulty,
    pub estimated_minutes: i64,
    pub mastery_threshold: i64,
    /// orders of prerequisite steps, resolved to ids on insert
    pub prerequisite_orders: BTreeSet<i64>,
    pub resources: Vec<String>,
    pub status: StepStatus,
}

/// Everything written for one assessment submission
#[derive(Debug, Clone)]
pub struct SubmissionRecord<'a> {
    pub user_id: i64,
    pub step_id: i64,
    pub roadmap_id: i64,
    /// attempt count the decision was based on
    pub expected_attempts: i64,
    /// step status the decision was based on
    pub expected_status: StepStatus,
    pub score: i64,
    pub passed: bool,
    pub answers: &'a BTreeMap<String, String>,
    pub time_spent_secs: Option<i64>,
    pub status: StepStatus,
    pub unlock: &'a [i64],
}

#[derive(Debug, Clone)]
pub struct SubmissionWrite {
    pub attempt: AssessmentAttempt,
    pub unlocked: Vec<i64>,
    pub roadmap_completed: bool,
}

/// A step status change that only applies if the step is still in `from`
#[derive(Debug, Clone, Copy)]
pub struct StatusChange {
    pub step_id: i64,
    pub from: StepStatus,
    pub to: StepStatus,
}

#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: i64,
}

#[derive(FromRow)]
struct RoadmapRow {
    id: i64,
    user_id: i64,
    title: String,
    description: String,
    subject: String,
    difficulty: String,
    total_steps: i64,
    estimated_hours: f64,
    status: i64,
    created_at: OffsetDateTime,
}

impl TryFrom<RoadmapRow> for Roadmap {
    type Error = Error;
    fn try_from(row: RoadmapRow) -> Result<Self> {
        Ok(Roadmap {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            description: row.description,
            subject: row.subject,
            difficulty: Difficulty::from(row.difficulty),
            total_steps: row.total_steps,
            estimated_hours: row.estimated_hours,
            status: RoadmapStatus::try_from(row.status)?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct StepRow {
    id: i64,
    roadmap_id: i64,
    order_index: i64,
    title: String,
    description: String,
    step_type: String,
    difficulty: String,
    estimated_minutes: i64,
    mastery_threshold: i64,
    prerequisites: String,
    resources: String,
    current_score: Option<i64>,
    attempts: i64,
    status: i64,
    updated_at: OffsetDateTime,
}

impl TryFrom<StepRow> for Step {
    type Error = Error;
    fn try_from(row: StepRow) -> Result<Self> {
        Ok(Step {
            id: row.id,
            roadmap_id: row.roadmap_id,
            order: row.order_index,
            title: row.title,
            description: row.description,
            step_type: row.step_type,
            difficulty: Difficulty::from(row.difficulty),
            estimated_minutes: row.estimated_minutes,
            mastery_threshold: row.mastery_threshold,
            prerequisites: serde_json::from_str(&row.prerequisites)?,
            resources: serde_json::from_str(&row.resources)?,
            current_score: row.current_score,
            attempts: row.attempts,
            status: StepStatus::try_from(row.status)?,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AttemptRow {
    id: i64,
    user_id: i64,
    step_id: i64,
    score: i64,
    passed: bool,
    answers: String,
    time_spent_secs: Option<i64>,
    attempt_number: i64,
    created_at: OffsetDateTime,
}

impl TryFrom<AttemptRow> for AssessmentAttempt {
    type Error = Error;
    fn try_from(row: AttemptRow) -> Result<Self> {
        Ok(AssessmentAttempt {
            id: row.id,
            user_id: row.user_id,
            step_id: row.step_id,
            score: row.score,
            passed: row.passed,
            answers: serde_json::from_str(&row.answers)?,
            time_spent_secs: row.time_spent_secs,
            attempt_number: row.attempt_number,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct AssignmentRow {
    id: i64,
    student_id: i64,
    tutor_id: Option<i64>,
    roadmap_id: i64,
    step_ids: String,
    reason: String,
    status: i64,
    session_count: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<AssignmentRow> for TutorAssignment {
    type Error = Error;
    fn try_from(row: AssignmentRow) -> Result<Self> {
        Ok(TutorAssignment {
            id: row.id,
            student_id: row.student_id,
            tutor_id: row.tutor_id,
            roadmap_id: row.roadmap_id,
            step_ids: serde_json::from_str(&row.step_ids)?,
            reason: row.reason,
            status: AssignmentStatus::try_from(row.status)?,
            session_count: row.session_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const STEP_COLUMNS: &str = "id, roadmap_id, order_index, title, description, step_type, difficulty, \
    estimated_minutes, mastery_threshold, prerequisites, resources, current_score, attempts, status, updated_at";
const ROADMAP_COLUMNS: &str = "id, user_id, title, description, subject, difficulty, total_steps, \
    estimated_hours, status, created_at";
const ATTEMPT_COLUMNS: &str = "id, user_id, step_id, score, passed, answers, time_spent_secs, \
    attempt_number, created_at";
const ASSIGNMENT_COLUMNS: &str = "id, student_id, tutor_id, roadmap_id, step_ids, reason, status, \
    session_count, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct Store {
    pub database: SqlitePool,
}

impl Store {
    pub fn new(database: SqlitePool) -> Self {
        Self { database }
    }

    /// Opens (creating if missing) the database file with foreign keys on
    pub async fn connect(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let database = SqlitePoolOptions::new().connect_with(options).await?;
        info!("connected to database {}", path.display());
        Ok(Self::new(database))
    }

    pub async fn init_schema(&self) -> Result<()> {
        for statement in schema::SCHEMA {
            sqlx::query(statement).execute(&self.database).await?;
        }
        Ok(())
    }

    // ---- accounts ----

    pub async fn insert_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<i64> {
        let id = sqlx::query(
            "INSERT INTO user_account (name, email, password, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(role as i64)
        .bind(now())
        .execute(&self.database)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, password, role FROM user_account WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.database)
        .await?;
        Ok(user)
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<UserInfo>> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, password, role FROM user_account WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.database)
        .await?;
        user.map(UserInfo::try_from).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<UserInfo>> {
        sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, password, role FROM user_account ORDER BY id",
        )
        .fetch_all(&self.database)
        .await?
        .into_iter()
        .map(UserInfo::try_from)
        .collect()
    }

    // ---- roadmaps and steps ----

    pub async fn create_roadmap(
        &self,
        new: &NewRoadmap,
        steps: &[NewStep],
    ) -> Result<(Roadmap, Vec<Step>)> {
        let now = now();
        let mut tx = self.database.begin().await?;
        let roadmap_id = sqlx::query(
            "INSERT INTO roadmap (user_id, title, description, subject, difficulty, total_steps, \
            estimated_hours, status, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.user_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(&new.subject)
        .bind(new.difficulty.as_str())
        .bind(steps.len() as i64)
        .bind(new.estimated_hours)
        .bind(RoadmapStatus::Active as i64)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let mut ids = BTreeMap::new();
        for step in steps {
            let resources = serde_json::to_string(&step.resources)?;
            let id = sqlx::query(
                "INSERT INTO step (roadmap_id, order_index, title, description, step_type, difficulty, \
                estimated_minutes, mastery_threshold, prerequisites, resources, attempts, status, updated_at) \
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, '[]', ?, 0, ?, ?)",
            )
            .bind(roadmap_id)
            .bind(step.order)
            .bind(&step.title)
            .bind(&step.description)
            .bind(&step.step_type)
            .bind(step.difficulty.as_str())
            .bind(step.estimated_minutes)
            .bind(step.mastery_threshold)
            .bind(resources)
            .bind(step.status as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
            ids.insert(step.order, id);
        }
        for step in steps {
            let prerequisites: BTreeSet<i64> = step
                .prerequisite_orders
                .iter()
                .filter_map(|order| ids.get(order).copied())
                .collect();
            if prerequisites.is_empty() {
                continue;
            }
            sqlx::query("UPDATE step SET prerequisites = ? WHERE id = ?")
                .bind(serde_json::to_string(&prerequisites)?)
                .bind(ids[&step.order])
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        let roadmap = self
            .get_roadmap(roadmap_id)
            .await?
            .ok_or(Error::not_found("roadmap", roadmap_id))?;
        let steps = self.list_steps(roadmap_id).await?;
        Ok((roadmap, steps))
    }

    pub async fn get_roadmap(&self, id: i64) -> Result<Option<Roadmap>> {
        sqlx::query_as::<_, RoadmapRow>(&format!(
            "SELECT {ROADMAP_COLUMNS} FROM roadmap WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.database)
        .await?
        .map(Roadmap::try_from)
        .transpose()
    }

    pub async fn list_roadmaps(&self, user_id: i64) -> Result<Vec<Roadmap>> {
        sqlx::query_as::<_, RoadmapRow>(&format!(
            "SELECT {ROADMAP_COLUMNS} FROM roadmap WHERE user_id = ? ORDER BY id"
        ))
        .bind(user_id)
        .fetch_all(&self.database)
        .await?
        .into_iter()
        .map(Roadmap::try_from)
        .collect()
    }

    pub async fn set_roadmap_status(&self, id: i64, status: RoadmapStatus) -> Result<()> {
        sqlx::query("UPDATE roadmap SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status as i64)
            .bind(now())
            .bind(id)
            .execute(&self.database)
            .await?;
        Ok(())
    }

    pub async fn get_step(&self, id: i64) -> Result<Option<Step>> {
        sqlx::query_as::<_, StepRow>(&format!("SELECT {STEP_COLUMNS} FROM step WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.database)
            .await?
            .map(Step::try_from)
            .transpose()
    }

    pub async fn get_step_by_order(&self, roadmap_id: i64, order: i64) -> Result<Option<Step>> {
        sqlx::query_as::<_, StepRow>(&format!(
            "SELECT {STEP_COLUMNS} FROM step WHERE roadmap_id = ? AND order_index = ?"
        ))
        .bind(roadmap_id)
        .bind(order)
        .fetch_optional(&self.database)
        .await?
        .map(Step::try_from)
        .transpose()
    }

    pub async fn list_steps(&self, roadmap_id: i64) -> Result<Vec<Step>> {
        sqlx::query_as::<_, StepRow>(&format!(
            "SELECT {STEP_COLUMNS} FROM step WHERE roadmap_id = ? ORDER BY order_index"
        ))
        .bind(roadmap_id)
        .fetch_all(&self.database)
        .await?
        .into_iter()
        .map(Step::try_from)
        .collect()
    }

    /// Moves a step from `from` to `to`; false if it was no longer in `from`
    pub async fn transition_step(&self, id: i64, from: StepStatus, to: StepStatus) -> Result<bool> {
        let result =
            sqlx::query("UPDATE step SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                .bind(to as i64)
                .bind(now())
                .bind(id)
                .bind(from as i64)
                .execute(&self.database)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    // ---- lesson content and question sets ----

    pub async fn get_step_content(&self, step_id: i64) -> Result<Option<String>> {
        let content = sqlx::query_scalar::<_, String>("SELECT content FROM step_content WHERE step_id = ?")
            .bind(step_id)
            .fetch_optional(&self.database)
            .await?;
        Ok(content)
    }

    /// Stores content unless some is already stored; returns the stored content
    pub async fn save_step_content(&self, step_id: i64, content: &str) -> Result<String> {
        sqlx::query("INSERT OR IGNORE INTO step_content (step_id, content, created_at) VALUES (?, ?, ?)")
            .bind(step_id)
            .bind(content)
            .bind(now())
            .execute(&self.database)
            .await?;
        self.get_step_content(step_id)
            .await?
            .ok_or(Error::not_found("step content", step_id))
    }

    pub async fn get_question_set(&self, step_id: i64) -> Result<Option<QuestionSet>> {
        let row = sqlx::query_as::<_, (String, i64, OffsetDateTime)>(
            "SELECT questions, source, created_at FROM step_assessment WHERE step_id = ?",
        )
        .bind(step_id)
        .fetch_optional(&self.database)
        .await?;
        let Some((questions, source, created_at)) = row else {
            return Ok(None);
        };
        Ok(Some(QuestionSet {
            step_id,
            questions: serde_json::from_str(&questions)?,
            source: ContentSource::from(source),
            created_at,
        }))
    }

    /// First writer wins; returns the stored set
    pub async fn save_question_set(
        &self,
        step_id: i64,
        questions: &[Question],
        source: ContentSource,
    ) -> Result<QuestionSet> {
        sqlx::query(
            "INSERT OR IGNORE INTO step_assessment (step_id, questions, source, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(step_id)
        .bind(serde_json::to_string(questions)?)
        .bind(source as i64)
        .bind(now())
        .execute(&self.database)
        .await?;
        self.get_question_set(step_id)
            .await?
            .ok_or(Error::not_found("question set", step_id))
    }

    // ---- assessment attempts ----

    /// Writes the attempt and the step update atomically. The step update is a
    /// compare-and-swap on the attempt count and the status, so a concurrent
    /// submission, escalation or open makes this one fail with `Conflict`
    /// instead of overwriting it.
    pub async fn record_submission(&self, record: SubmissionRecord<'_>) -> Result<SubmissionWrite> {
        let now = now();
        let mut tx = self.database.begin().await?;
        let updated = sqlx::query(
            "UPDATE step SET attempts = attempts + 1, current_score = ?, status = ?, updated_at = ? \
            WHERE id = ? AND attempts = ? AND status = ?",
        )
        .bind(record.score)
        .bind(record.status as i64)
        .bind(now)
        .bind(record.step_id)
        .bind(record.expected_attempts)
        .bind(record.expected_status as i64)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() != 1 {
            return Err(Error::Conflict(format!(
                "step {} changed while the submission was graded, please retry",
                record.step_id
            )));
        }

        let attempt_number = record.expected_attempts + 1;
        let attempt_id = sqlx::query(
            "INSERT INTO assessment_attempt (user_id, step_id, score, passed, answers, time_spent_secs, \
            attempt_number, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.user_id)
        .bind(record.step_id)
        .bind(record.score)
        .bind(record.passed)
        .bind(serde_json::to_string(record.answers)?)
        .bind(record.time_spent_secs)
        .bind(attempt_number)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let mut unlocked = Vec::new();
        for id in record.unlock {
            let result = sqlx::query(
                "UPDATE step SET status = ?, updated_at = ? WHERE id = ? AND roadmap_id = ? AND status = ?",
            )
            .bind(StepStatus::Available as i64)
            .bind(now)
            .bind(*id)
            .bind(record.roadmap_id)
            .bind(StepStatus::Locked as i64)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 1 {
                unlocked.push(*id);
            }
        }

        let mut roadmap_completed = false;
        if record.status == StepStatus::Completed {
            let remaining = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM step WHERE roadmap_id = ? AND status != ?",
            )
            .bind(record.roadmap_id)
            .bind(StepStatus::Completed as i64)
            .fetch_one(&mut *tx)
            .await?;
            if remaining == 0 {
                let result = sqlx::query(
                    "UPDATE roadmap SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
                )
                .bind(RoadmapStatus::Completed as i64)
                .bind(now)
                .bind(record.roadmap_id)
                .bind(RoadmapStatus::Active as i64)
                .execute(&mut *tx)
                .await?;
                roadmap_completed = result.rows_affected() == 1;
            }
        }
        tx.commit().await?;

        let attempt = AssessmentAttempt {
            id: attempt_id,
            user_id: record.user_id,
            step_id: record.step_id,
            score: record.score,
            passed: record.passed,
            answers: record.answers.clone(),
            time_spent_secs: record.time_spent_secs,
            attempt_number,
            created_at: now,
        };
        Ok(SubmissionWrite {
            attempt,
            unlocked,
            roadmap_completed,
        })
    }

    pub async fn list_attempts(&self, user_id: i64, step_id: i64) -> Result<Vec<AssessmentAttempt>> {
        sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM assessment_attempt WHERE user_id = ? AND step_id = ? \
            ORDER BY attempt_number"
        ))
        .bind(user_id)
        .bind(step_id)
        .fetch_all(&self.database)
        .await?
        .into_iter()
        .map(AssessmentAttempt::try_from)
        .collect()
    }

    // ---- tutor assignments ----

    /// Creates the assignment and blocks the step in one transaction
    pub async fn create_tutor_assignment(
        &self,
        student_id: i64,
        roadmap_id: i64,
        change: StatusChange,
        reason: &str,
    ) -> Result<TutorAssignment> {
        let now = now();
        let mut tx = self.database.begin().await?;
        let open = sqlx::query_scalar::<_, String>(
            "SELECT step_ids FROM tutor_assignment WHERE student_id = ? AND status != ?",
        )
        .bind(student_id)
        .bind(AssignmentStatus::Completed as i64)
        .fetch_all(&mut *tx)
        .await?;
        for step_ids in open {
            let step_ids: BTreeSet<i64> = serde_json::from_str(&step_ids)?;
            if step_ids.contains(&change.step_id) {
                return Err(Error::Conflict(format!(
                    "step {} already has an open tutor assignment",
                    change.step_id
                )));
            }
        }

        let updated =
            sqlx::query("UPDATE step SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                .bind(change.to as i64)
                .bind(now)
                .bind(change.step_id)
                .bind(change.from as i64)
                .execute(&mut *tx)
                .await?;
        if updated.rows_affected() != 1 {
            return Err(Error::Conflict(format!(
                "step {} changed while requesting a tutor",
                change.step_id
            )));
        }

        let step_ids = serde_json::to_string(&BTreeSet::from([change.step_id]))?;
        let id = sqlx::query(
            "INSERT INTO tutor_assignment (student_id, tutor_id, roadmap_id, step_ids, reason, status, \
            session_count, created_at, updated_at) VALUES (?, NULL, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(student_id)
        .bind(roadmap_id)
        .bind(step_ids)
        .bind(reason)
        .bind(AssignmentStatus::Assigned as i64)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        tx.commit().await?;

        self.get_assignment(id)
            .await?
            .ok_or(Error::not_found("tutor assignment", id))
    }

    pub async fn get_assignment(&self, id: i64) -> Result<Option<TutorAssignment>> {
        sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM tutor_assignment WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.database)
        .await?
        .map(TutorAssignment::try_from)
        .transpose()
    }

    pub async fn list_assignments(
        &self,
        status: Option<AssignmentStatus>,
    ) -> Result<Vec<TutorAssignment>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, AssignmentRow>(&format!(
                    "SELECT {ASSIGNMENT_COLUMNS} FROM tutor_assignment WHERE status = ? ORDER BY id"
                ))
                .bind(status as i64)
                .fetch_all(&self.database)
                .await?
            }
            None => {
                sqlx::query_as::<_, AssignmentRow>(&format!(
                    "SELECT {ASSIGNMENT_COLUMNS} FROM tutor_assignment ORDER BY id"
                ))
                .fetch_all(&self.database)
                .await?
            }
        };
        rows.into_iter().map(TutorAssignment::try_from).collect()
    }

    pub async fn list_student_assignments(&self, student_id: i64) -> Result<Vec<TutorAssignment>> {
        sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM tutor_assignment WHERE student_id = ? ORDER BY id"
        ))
        .bind(student_id)
        .fetch_all(&self.database)
        .await?
        .into_iter()
        .map(TutorAssignment::try_from)
        .collect()
    }

    /// Claims the assignment if unclaimed, sets it in progress and counts the session.
    /// Returns false if the assignment was no longer in `from`.
    pub async fn record_tutor_session(
        &self,
        id: i64,
        tutor_id: i64,
        from: AssignmentStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tutor_assignment SET status = ?, tutor_id = COALESCE(tutor_id, ?), \
            session_count = session_count + 1, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(AssignmentStatus::InProgress as i64)
        .bind(tutor_id)
        .bind(now())
        .bind(id)
        .bind(from as i64)
        .execute(&self.database)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Completes the assignment and applies the step releases; returns released step ids
    pub async fn complete_tutor_assignment(
        &self,
        id: i64,
        tutor_id: i64,
        from: AssignmentStatus,
        releases: &[StatusChange],
    ) -> Result<Vec<i64>> {
        let now = now();
        let mut tx = self.database.begin().await?;
        let result = sqlx::query(
            "UPDATE tutor_assignment SET status = ?, tutor_id = COALESCE(tutor_id, ?), updated_at = ? \
            WHERE id = ? AND status = ?",
        )
        .bind(AssignmentStatus::Completed as i64)
        .bind(tutor_id)
        .bind(now)
        .bind(id)
        .bind(from as i64)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() != 1 {
            return Err(Error::Conflict(format!(
                "tutor assignment {} changed while completing it",
                id
            )));
        }
        let mut released = Vec::new();
        for change in releases {
            let result =
                sqlx::query("UPDATE step SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
                    .bind(change.to as i64)
                    .bind(now)
                    .bind(change.step_id)
                    .bind(change.from as i64)
                    .execute(&mut *tx)
                    .await?;
            if result.rows_affected() == 1 {
                released.push(change.step_id);
            }
        }
        tx.commit().await?;
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{learner, memory_store};

    fn new_step(order: i64, prerequisite_orders: &[i64]) -> NewStep {
        NewStep {
            order,
            title: format!("step {order}"),
            description: String::new(),
            step_type: "lesson".to_string(),
            difficulty: Difficulty::Beginner,
            estimated_minutes: 30,
            mastery_threshold: 70,
            prerequisite_orders: prerequisite_orders.iter().copied().collect(),
            resources: vec!["book".to_string()],
            status: crate::progress::initial_status(order),
        }
    }

    async fn roadmap(store: &Store, user_id: i64) -> (Roadmap, Vec<Step>) {
        let new = NewRoadmap {
            user_id,
            title: "t".to_string(),
            description: "d".to_string(),
            subject: "s".to_string(),
            difficulty: Difficulty::Beginner,
            estimated_hours: 1.5,
        };
        store
            .create_roadmap(&new, &[new_step(1, &[]), new_step(2, &[1])])
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn steps_are_keyed_by_order() {
        let store = memory_store().await;
        let user = learner(&store, "s@example.com").await;
        let (roadmap, steps) = roadmap(&store, user).await;
        let second = store.get_step_by_order(roadmap.id, 2).await.unwrap().unwrap();
        assert_eq!(second.id, steps[1].id);
        assert_eq!(second.resources, vec!["book".to_string()]);
        assert!(store.get_step_by_order(roadmap.id, 3).await.unwrap().is_none());
        assert!(store.get_step(9999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_submission_is_a_conflict() {
        let store = memory_store().await;
        let user = learner(&store, "c@example.com").await;
        let (roadmap, steps) = roadmap(&store, user).await;
        let answers = BTreeMap::new();
        let record = SubmissionRecord {
            user_id: user,
            step_id: steps[0].id,
            roadmap_id: roadmap.id,
            expected_attempts: 0,
            expected_status: StepStatus::Available,
            score: 10,
            passed: false,
            answers: &answers,
            time_spent_secs: None,
            status: StepStatus::Available,
            unlock: &[],
        };
        let write = store.record_submission(record.clone()).await.unwrap();
        assert_eq!(write.attempt.attempt_number, 1);
        // same expected count again: someone else already submitted
        assert!(matches!(
            store.record_submission(record).await,
            Err(Error::Conflict(_))
        ));
        let attempts = store.list_attempts(user, steps[0].id).await.unwrap();
        assert_eq!(attempts.len(), 1);
        let step = store.get_step(steps[0].id).await.unwrap().unwrap();
        assert_eq!(step.attempts, 1);
    }

    #[tokio::test]
    async fn escalation_between_grading_and_write_wins() {
        let store = memory_store().await;
        let user = learner(&store, "e@example.com").await;
        let (roadmap, steps) = roadmap(&store, user).await;
        // the step is escalated after the submission read it as AVAILABLE
        store
            .create_tutor_assignment(
                user,
                roadmap.id,
                StatusChange {
                    step_id: steps[0].id,
                    from: StepStatus::Available,
                    to: StepStatus::TutorRequired,
                },
                "stuck",
            )
            .await
            .unwrap();
        let answers = BTreeMap::new();
        let result = store
            .record_submission(SubmissionRecord {
                user_id: user,
                step_id: steps[0].id,
                roadmap_id: roadmap.id,
                expected_attempts: 0,
                expected_status: StepStatus::Available,
                score: 10,
                passed: false,
                answers: &answers,
                time_spent_secs: None,
                status: StepStatus::Available,
                unlock: &[],
            })
            .await;
        assert!(matches!(result, Err(Error::Conflict(_))));
        let step = store.get_step(steps[0].id).await.unwrap().unwrap();
        assert_eq!(step.status, StepStatus::TutorRequired);
        assert_eq!(step.attempts, 0);
        assert!(store.list_attempts(user, steps[0].id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn content_is_written_once() {
        let store = memory_store().await;
        let user = learner(&store, "w@example.com").await;
        let (_, steps) = roadmap(&store, user).await;
        let first = store.save_step_content(steps[0].id, "first").await.unwrap();
        let second = store.save_step_content(steps[0].id, "second").await.unwrap();
        assert_eq!(first, "first");
        assert_eq!(second, "first");
    }
}
