// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, types::Json};

use super::{
    ARCHIVED_EDIT, ATTEMPTED_REWRITE, AssessmentStore, AttemptStore, CourseStore, EnrollmentStore,
    KEY_CHANGED, UserStore,
};
use crate::{
    error::AppError,
    models::{
        assessment::{
            AnalyticsSummary, Assessment, AssessmentChanges, AssessmentStatus, NewAssessment,
            PolicySet, Question, total_points,
        },
        attempt::{AnswerEntry, Attempt, FinalizedAttempt, NewAttempt, ScoreSummary},
        course::{Course, NewCourse},
        enrollment::{Enrollment, EnrollmentStatus, NewEnrollment},
        user::{NewUser, User},
    },
};

/// Postgres-backed store. Queries are checked at runtime, so the crate builds without a
/// live database.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Stored enum text that no longer parses means the row is corrupt.
fn corrupt(column: &str, err: String) -> AppError {
    tracing::error!("Corrupt {} column: {}", column, err);
    AppError::InternalServerError(format!("corrupt {} column: {}", column, err))
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    password: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password: row.password,
            role: row.role.parse().map_err(|e| corrupt("users.role", e))?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct CourseRow {
    id: i64,
    teacher_id: i64,
    title: String,
    category: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<CourseRow> for Course {
    fn from(row: CourseRow) -> Self {
        Course {
            id: row.id,
            teacher_id: row.teacher_id,
            title: row.title,
            category: row.category,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct EnrollmentRow {
    id: i64,
    student_id: i64,
    course_id: i64,
    category: String,
    status: String,
    is_active: bool,
    payment_proof_url: Option<String>,
    created_at: DateTime<Utc>,
    reviewed_at: Option<DateTime<Utc>>,
}

impl TryFrom<EnrollmentRow> for Enrollment {
    type Error = AppError;

    fn try_from(row: EnrollmentRow) -> Result<Self, Self::Error> {
        Ok(Enrollment {
            id: row.id,
            student_id: row.student_id,
            course_id: row.course_id,
            category: row.category,
            status: row.status.parse().map_err(|e| corrupt("enrollments.status", e))?,
            is_active: row.is_active,
            payment_proof_url: row.payment_proof_url,
            created_at: row.created_at,
            reviewed_at: row.reviewed_at,
        })
    }
}

#[derive(FromRow)]
struct AssessmentRow {
    id: i64,
    kind: String,
    course_id: i64,
    teacher_id: i64,
    category: String,
    title: String,
    topic: String,
    description: Option<String>,
    questions: Json<Vec<Question>>,
    total_points: i32,
    policy: Json<PolicySet>,
    status: String,
    analytics: Json<AnalyticsSummary>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssessmentRow> for Assessment {
    type Error = AppError;

    fn try_from(row: AssessmentRow) -> Result<Self, Self::Error> {
        Ok(Assessment {
            id: row.id,
            kind: row.kind.parse().map_err(|e| corrupt("assessments.kind", e))?,
            course_id: row.course_id,
            teacher_id: row.teacher_id,
            category: row.category,
            title: row.title,
            topic: row.topic,
            description: row.description,
            questions: row.questions.0,
            total_points: row.total_points,
            policy: row.policy.0,
            status: row.status.parse().map_err(|e| corrupt("assessments.status", e))?,
            analytics: row.analytics.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AttemptRow {
    id: i64,
    assessment_id: i64,
    student_id: i64,
    student_email: String,
    attempt_number: i32,
    answers: Json<Vec<AnswerEntry>>,
    score: Json<ScoreSummary>,
    status: String,
    is_late: bool,
    feedback: Option<String>,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    feedback_at: Option<DateTime<Utc>>,
}

impl TryFrom<AttemptRow> for Attempt {
    type Error = AppError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Attempt {
            id: row.id,
            assessment_id: row.assessment_id,
            student_id: row.student_id,
            student_email: row.student_email,
            attempt_number: row.attempt_number,
            answers: row.answers.0,
            score: row.score.0,
            status: row.status.parse().map_err(|e| corrupt("attempts.status", e))?,
            is_late: row.is_late,
            feedback: row.feedback,
            started_at: row.started_at,
            submitted_at: row.submitted_at,
            feedback_at: row.feedback_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, AppError>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}

const USER_COLUMNS: &str = "id, name, email, password, role, created_at";
const COURSE_COLUMNS: &str = "id, teacher_id, title, category, description, created_at";
const ENROLLMENT_COLUMNS: &str = "id, student_id, course_id, category, status, is_active, \
     payment_proof_url, created_at, reviewed_at";
const ASSESSMENT_COLUMNS: &str = "id, kind, course_id, teacher_id, category, title, topic, \
     description, questions, total_points, policy, status, analytics, created_at, updated_at";
const ATTEMPT_COLUMNS: &str = "id, assessment_id, student_id, student_email, attempt_number, \
     answers, score, status, is_late, feedback, started_at, submitted_at, feedback_at";

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, new: NewUser) -> Result<User, AppError> {
        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (name, email, password, role) VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("Email '{}' already exists", new.email))
            }
            other => {
                tracing::error!("Failed to create user: {:?}", other);
                other
            }
        })?;
        row.try_into()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(User::try_from).transpose()
    }
}

#[async_trait]
impl CourseStore for PgStore {
    async fn create_course(&self, new: NewCourse) -> Result<Course, AppError> {
        let row: CourseRow = sqlx::query_as(&format!(
            "INSERT INTO courses (teacher_id, title, category, description) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            COURSE_COLUMNS
        ))
        .bind(new.teacher_id)
        .bind(&new.title)
        .bind(&new.category)
        .bind(&new.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_course(&self, id: i64) -> Result<Option<Course>, AppError> {
        let row: Option<CourseRow> =
            sqlx::query_as(&format!("SELECT {} FROM courses WHERE id = $1", COURSE_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Course::from))
    }

    async fn list_courses(&self) -> Result<Vec<Course>, AppError> {
        let rows: Vec<CourseRow> =
            sqlx::query_as(&format!("SELECT {} FROM courses ORDER BY id DESC", COURSE_COLUMNS))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Course::from).collect())
    }
}

#[async_trait]
impl EnrollmentStore for PgStore {
    async fn create_enrollment(&self, new: NewEnrollment) -> Result<Enrollment, AppError> {
        let row: EnrollmentRow = sqlx::query_as(&format!(
            "INSERT INTO enrollments (student_id, course_id, category, payment_proof_url) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            ENROLLMENT_COLUMNS
        ))
        .bind(new.student_id)
        .bind(new.course_id)
        .bind(&new.category)
        .bind(&new.payment_proof_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict("Already enrolled in this course".to_string())
            }
            other => other,
        })?;
        row.try_into()
    }

    async fn get_enrollment(&self, id: i64) -> Result<Option<Enrollment>, AppError> {
        let row: Option<EnrollmentRow> =
            sqlx::query_as(&format!("SELECT {} FROM enrollments WHERE id = $1", ENROLLMENT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Enrollment::try_from).transpose()
    }

    async fn review_enrollment(
        &self,
        id: i64,
        status: EnrollmentStatus,
        is_active: bool,
        reviewed_at: DateTime<Utc>,
    ) -> Result<Option<Enrollment>, AppError> {
        let row: Option<EnrollmentRow> = sqlx::query_as(&format!(
            "UPDATE enrollments SET status = $2, is_active = $3, reviewed_at = $4 \
             WHERE id = $1 RETURNING {}",
            ENROLLMENT_COLUMNS
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(is_active)
        .bind(reviewed_at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Enrollment::try_from).transpose()
    }

    async fn list_enrollments_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<Enrollment>, AppError> {
        let rows: Vec<EnrollmentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM enrollments WHERE student_id = $1 ORDER BY created_at DESC",
            ENROLLMENT_COLUMNS
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn enrolled_categories(&self, student_id: i64) -> Result<Vec<String>, AppError> {
        let categories: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT category FROM enrollments \
             WHERE student_id = $1 AND status = 'verified' AND is_active ORDER BY category",
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(categories.into_iter().map(|(c,)| c).collect())
    }

    async fn is_enrolled(&self, student_id: i64, category: &str) -> Result<bool, AppError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM enrollments \
             WHERE student_id = $1 AND category = $2 AND status = 'verified' AND is_active)",
        )
        .bind(student_id)
        .bind(category)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl AssessmentStore for PgStore {
    async fn insert_assessment(&self, new: NewAssessment) -> Result<Assessment, AppError> {
        let points = total_points(&new.questions);
        let row: AssessmentRow = sqlx::query_as(&format!(
            "INSERT INTO assessments \
             (kind, course_id, teacher_id, category, title, topic, description, questions, \
              total_points, policy, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {}",
            ASSESSMENT_COLUMNS
        ))
        .bind(new.kind.as_str())
        .bind(new.course_id)
        .bind(new.teacher_id)
        .bind(&new.category)
        .bind(&new.title)
        .bind(&new.topic)
        .bind(&new.description)
        .bind(Json(&new.questions))
        .bind(points)
        .bind(Json(&new.policy))
        .bind(new.status.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert assessment: {:?}", e);
            AppError::from(e)
        })?;
        row.try_into()
    }

    async fn get_assessment(&self, id: i64) -> Result<Option<Assessment>, AppError> {
        let row: Option<AssessmentRow> =
            sqlx::query_as(&format!("SELECT {} FROM assessments WHERE id = $1", ASSESSMENT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Assessment::try_from).transpose()
    }

    async fn update_assessment(
        &self,
        id: i64,
        changes: AssessmentChanges,
    ) -> Result<Assessment, AppError> {
        let mut tx = self.pool.begin().await?;

        // Row lock first: a concurrent start holds FOR SHARE on the same row, so the
        // attempts check below sees every attempt committed against the old key.
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM assessments WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let (status,) =
            status.ok_or_else(|| AppError::NotFound("Assessment not found".to_string()))?;
        if status == AssessmentStatus::Archived.as_str() {
            return Err(AppError::Conflict(ARCHIVED_EDIT.to_string()));
        }

        if changes.questions.is_some() {
            let (attempted,): (bool,) =
                sqlx::query_as("SELECT EXISTS (SELECT 1 FROM attempts WHERE assessment_id = $1)")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            if attempted {
                return Err(AppError::Conflict(ATTEMPTED_REWRITE.to_string()));
            }
        }

        let points = changes.questions.as_deref().map(total_points);
        let row: AssessmentRow = sqlx::query_as(&format!(
            "UPDATE assessments SET \
             title = COALESCE($2, title), \
             topic = COALESCE($3, topic), \
             description = COALESCE($4, description), \
             questions = COALESCE($5, questions), \
             total_points = COALESCE($6, total_points), \
             policy = COALESCE($7, policy), \
             updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            ASSESSMENT_COLUMNS
        ))
        .bind(id)
        .bind(&changes.title)
        .bind(&changes.topic)
        .bind(&changes.description)
        .bind(changes.questions.as_ref().map(Json))
        .bind(points)
        .bind(changes.policy.as_ref().map(Json))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn set_assessment_status(
        &self,
        id: i64,
        from: AssessmentStatus,
        to: AssessmentStatus,
    ) -> Result<Option<Assessment>, AppError> {
        let row: Option<AssessmentRow> = sqlx::query_as(&format!(
            "UPDATE assessments SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2 RETURNING {}",
            ASSESSMENT_COLUMNS
        ))
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Assessment::try_from).transpose()
    }

    async fn list_assessments_by_teacher(
        &self,
        teacher_id: i64,
    ) -> Result<Vec<Assessment>, AppError> {
        let rows: Vec<AssessmentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM assessments WHERE teacher_id = $1 ORDER BY created_at DESC",
            ASSESSMENT_COLUMNS
        ))
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn list_published_in_categories(
        &self,
        categories: &[String],
    ) -> Result<Vec<Assessment>, AppError> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<AssessmentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM assessments WHERE status = 'published' AND category = ANY($1) \
             ORDER BY created_at DESC",
            ASSESSMENT_COLUMNS
        ))
        .bind(categories)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn store_analytics(
        &self,
        assessment_id: i64,
        analytics: &AnalyticsSummary,
    ) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE assessments SET analytics = $2 WHERE id = $1")
            .bind(assessment_id)
            .bind(Json(analytics))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Assessment not found".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for PgStore {
    async fn insert_attempt(&self, new: NewAttempt) -> Result<Attempt, AppError> {
        // FOR SHARE blocks a concurrent key rewrite until this insert commits, and a
        // rewrite that committed first fails the length check, so no row is inserted.
        // uq_attempt_number turns a lost numbering race into a Conflict.
        let row: Option<AttemptRow> = sqlx::query_as(&format!(
            "WITH current_key AS ( \
                 SELECT id FROM assessments \
                 WHERE id = $1 AND jsonb_array_length(questions) = $9 \
                 FOR SHARE \
             ) \
             INSERT INTO attempts \
             (assessment_id, student_id, student_email, attempt_number, answers, score, \
              status, is_late, started_at) \
             SELECT current_key.id, $2::BIGINT, $3::TEXT, $4::INT, $5::JSONB, $6::JSONB, \
                    'in_progress', $7::BOOLEAN, $8::TIMESTAMPTZ \
             FROM current_key RETURNING {}",
            ATTEMPT_COLUMNS
        ))
        .bind(new.assessment_id)
        .bind(new.student_id)
        .bind(&new.student_email)
        .bind(new.attempt_number)
        .bind(Json(&new.answers))
        .bind(Json(ScoreSummary::default()))
        .bind(new.is_late)
        .bind(new.started_at)
        .bind(new.answers.len() as i32)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| AppError::Conflict(KEY_CHANGED.to_string()))?
            .try_into()
    }

    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError> {
        let row: Option<AttemptRow> =
            sqlx::query_as(&format!("SELECT {} FROM attempts WHERE id = $1", ATTEMPT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Attempt::try_from).transpose()
    }

    async fn list_attempts(
        &self,
        assessment_id: i64,
        student_id: i64,
    ) -> Result<Vec<Attempt>, AppError> {
        let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {} FROM attempts WHERE assessment_id = $1 AND student_id = $2 \
             ORDER BY attempt_number",
            ATTEMPT_COLUMNS
        ))
        .bind(assessment_id)
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn list_attempts_for_assessment(
        &self,
        assessment_id: i64,
    ) -> Result<Vec<Attempt>, AppError> {
        let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {} FROM attempts WHERE assessment_id = $1 ORDER BY started_at",
            ATTEMPT_COLUMNS
        ))
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn list_attempts_for_student(&self, student_id: i64) -> Result<Vec<Attempt>, AppError> {
        let rows: Vec<AttemptRow> = sqlx::query_as(&format!(
            "SELECT {} FROM attempts WHERE student_id = $1 ORDER BY started_at DESC",
            ATTEMPT_COLUMNS
        ))
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn finalize_attempt(
        &self,
        id: i64,
        result: FinalizedAttempt,
    ) -> Result<Option<Attempt>, AppError> {
        // The status predicate makes the scoring event at-most-once under concurrent submits.
        let row: Option<AttemptRow> = sqlx::query_as(&format!(
            "UPDATE attempts SET answers = $2, score = $3, status = $4, submitted_at = $5 \
             WHERE id = $1 AND status = 'in_progress' RETURNING {}",
            ATTEMPT_COLUMNS
        ))
        .bind(id)
        .bind(Json(&result.answers))
        .bind(Json(&result.score))
        .bind(result.status.as_str())
        .bind(result.submitted_at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Attempt::try_from).transpose()
    }

    async fn set_feedback(
        &self,
        id: i64,
        feedback: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Attempt>, AppError> {
        let row: Option<AttemptRow> = sqlx::query_as(&format!(
            "UPDATE attempts SET feedback = $2, feedback_at = $3 WHERE id = $1 RETURNING {}",
            ATTEMPT_COLUMNS
        ))
        .bind(id)
        .bind(feedback)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Attempt::try_from).transpose()
    }
}
