// src/store/mod.rs

//! Persistence seams. Handlers and the engine only see these traits;
//! `PgStore` backs production, `MemoryStore` backs tests and database-less runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        assessment::{
            AnalyticsSummary, Assessment, AssessmentChanges, AssessmentStatus, NewAssessment,
        },
        attempt::{Attempt, FinalizedAttempt, NewAttempt},
        course::{Course, NewCourse},
        enrollment::{Enrollment, EnrollmentStatus, NewEnrollment},
        user::{NewUser, User},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

const ARCHIVED_EDIT: &str = "Archived assessments cannot be edited";
const ATTEMPTED_REWRITE: &str =
    "Questions cannot change once students have attempted this assessment";
const KEY_CHANGED: &str = "The assessment changed while the attempt was starting";

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email is taken.
    async fn create_user(&self, new: NewUser) -> Result<User, AppError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait CourseStore: Send + Sync {
    async fn create_course(&self, new: NewCourse) -> Result<Course, AppError>;
    async fn get_course(&self, id: i64) -> Result<Option<Course>, AppError>;
    async fn list_courses(&self) -> Result<Vec<Course>, AppError>;
}

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Fails with `Conflict` when the student already holds an enrollment for the course.
    async fn create_enrollment(&self, new: NewEnrollment) -> Result<Enrollment, AppError>;
    async fn get_enrollment(&self, id: i64) -> Result<Option<Enrollment>, AppError>;
    async fn review_enrollment(
        &self,
        id: i64,
        status: EnrollmentStatus,
        is_active: bool,
        reviewed_at: DateTime<Utc>,
    ) -> Result<Option<Enrollment>, AppError>;
    async fn list_enrollments_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<Enrollment>, AppError>;

    /// Categories the student holds a verified, active enrollment in.
    async fn enrolled_categories(&self, student_id: i64) -> Result<Vec<String>, AppError> {
        let mut categories: Vec<String> = self
            .list_enrollments_for_student(student_id)
            .await?
            .into_iter()
            .filter(|e| e.grants(&e.category))
            .map(|e| e.category)
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    async fn is_enrolled(&self, student_id: i64, category: &str) -> Result<bool, AppError> {
        Ok(self
            .list_enrollments_for_student(student_id)
            .await?
            .iter()
            .any(|e| e.grants(category)))
    }
}

#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn insert_assessment(&self, new: NewAssessment) -> Result<Assessment, AppError>;
    async fn get_assessment(&self, id: i64) -> Result<Option<Assessment>, AppError>;
    /// Applies an edit in one step against the current row.
    ///
    /// Fails with `Conflict` when the assessment is archived, or when the edit replaces
    /// the questions and any attempt exists. Status is left untouched.
    async fn update_assessment(
        &self,
        id: i64,
        changes: AssessmentChanges,
    ) -> Result<Assessment, AppError>;
    /// Compare-and-set on status. Returns `None` when the stored status is not `from`.
    async fn set_assessment_status(
        &self,
        id: i64,
        from: AssessmentStatus,
        to: AssessmentStatus,
    ) -> Result<Option<Assessment>, AppError>;
    async fn list_assessments_by_teacher(
        &self,
        teacher_id: i64,
    ) -> Result<Vec<Assessment>, AppError>;
    async fn list_published_in_categories(
        &self,
        categories: &[String],
    ) -> Result<Vec<Assessment>, AppError>;
    /// Overwrites the cached rollup. Last writer wins.
    async fn store_analytics(
        &self,
        assessment_id: i64,
        analytics: &AnalyticsSummary,
    ) -> Result<(), AppError>;
}

#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Fails with `Conflict` when `(assessment, student, attempt_number)` already exists,
    /// or when the answer slots no longer match the assessment's question count.
    async fn insert_attempt(&self, new: NewAttempt) -> Result<Attempt, AppError>;
    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError>;
    async fn list_attempts(
        &self,
        assessment_id: i64,
        student_id: i64,
    ) -> Result<Vec<Attempt>, AppError>;
    async fn list_attempts_for_assessment(
        &self,
        assessment_id: i64,
    ) -> Result<Vec<Attempt>, AppError>;
    async fn list_attempts_for_student(&self, student_id: i64) -> Result<Vec<Attempt>, AppError>;
    /// Applies the scoring event only if the attempt is still in progress.
    /// Returns `None` when it was not (already finalized or missing).
    async fn finalize_attempt(
        &self,
        id: i64,
        result: FinalizedAttempt,
    ) -> Result<Option<Attempt>, AppError>;
    async fn set_feedback(
        &self,
        id: i64,
        feedback: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Attempt>, AppError>;
}

/// Everything the service needs from persistence.
pub trait Store: UserStore + CourseStore + EnrollmentStore + AssessmentStore + AttemptStore {}

impl<T> Store for T where
    T: UserStore + CourseStore + EnrollmentStore + AssessmentStore + AttemptStore
{
}
