// src/store/memory.rs

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    ARCHIVED_EDIT, ATTEMPTED_REWRITE, AssessmentStore, AttemptStore, CourseStore, EnrollmentStore,
    KEY_CHANGED, UserStore,
};
use crate::{
    error::AppError,
    models::{
        assessment::{
            AnalyticsSummary, Assessment, AssessmentChanges, AssessmentStatus, NewAssessment,
            total_points,
        },
        attempt::{Attempt, AttemptStatus, FinalizedAttempt, NewAttempt, ScoreSummary},
        course::{Course, NewCourse},
        enrollment::{Enrollment, EnrollmentStatus, NewEnrollment},
        user::{NewUser, User},
    },
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    courses: BTreeMap<i64, Course>,
    enrollments: BTreeMap<i64, Enrollment>,
    assessments: BTreeMap<i64, Assessment>,
    attempts: BTreeMap<i64, Attempt>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process store with the same uniqueness rules as the Postgres schema.
/// Each operation holds the lock for its whole read-modify-write.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables
            .lock()
            .map_err(|_| AppError::InternalServerError("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, new: NewUser) -> Result<User, AppError> {
        let mut t = self.lock()?;
        if t.users.values().any(|u| u.email.eq_ignore_ascii_case(&new.email)) {
            return Err(AppError::Conflict(format!("Email '{}' already exists", new.email)));
        }
        let id = t.next_id();
        let user = User {
            id,
            name: new.name,
            email: new.email,
            password: new.password_hash,
            role: new.role,
            created_at: Utc::now(),
        };
        t.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let t = self.lock()?;
        Ok(t.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }
}

#[async_trait]
impl CourseStore for MemoryStore {
    async fn create_course(&self, new: NewCourse) -> Result<Course, AppError> {
        let mut t = self.lock()?;
        let id = t.next_id();
        let course = Course {
            id,
            teacher_id: new.teacher_id,
            title: new.title,
            category: new.category,
            description: new.description,
            created_at: Utc::now(),
        };
        t.courses.insert(id, course.clone());
        Ok(course)
    }

    async fn get_course(&self, id: i64) -> Result<Option<Course>, AppError> {
        Ok(self.lock()?.courses.get(&id).cloned())
    }

    async fn list_courses(&self) -> Result<Vec<Course>, AppError> {
        Ok(self.lock()?.courses.values().cloned().collect())
    }
}

#[async_trait]
impl EnrollmentStore for MemoryStore {
    async fn create_enrollment(&self, new: NewEnrollment) -> Result<Enrollment, AppError> {
        let mut t = self.lock()?;
        if t
            .enrollments
            .values()
            .any(|e| e.student_id == new.student_id && e.course_id == new.course_id)
        {
            return Err(AppError::Conflict("Already enrolled in this course".to_string()));
        }
        let id = t.next_id();
        let enrollment = Enrollment {
            id,
            student_id: new.student_id,
            course_id: new.course_id,
            category: new.category,
            status: EnrollmentStatus::Pending,
            is_active: false,
            payment_proof_url: new.payment_proof_url,
            created_at: Utc::now(),
            reviewed_at: None,
        };
        t.enrollments.insert(id, enrollment.clone());
        Ok(enrollment)
    }

    async fn get_enrollment(&self, id: i64) -> Result<Option<Enrollment>, AppError> {
        Ok(self.lock()?.enrollments.get(&id).cloned())
    }

    async fn review_enrollment(
        &self,
        id: i64,
        status: EnrollmentStatus,
        is_active: bool,
        reviewed_at: DateTime<Utc>,
    ) -> Result<Option<Enrollment>, AppError> {
        let mut t = self.lock()?;
        Ok(t.enrollments.get_mut(&id).map(|e| {
            e.status = status;
            e.is_active = is_active;
            e.reviewed_at = Some(reviewed_at);
            e.clone()
        }))
    }

    async fn list_enrollments_for_student(
        &self,
        student_id: i64,
    ) -> Result<Vec<Enrollment>, AppError> {
        let t = self.lock()?;
        Ok(t.enrollments
            .values()
            .filter(|e| e.student_id == student_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AssessmentStore for MemoryStore {
    async fn insert_assessment(&self, new: NewAssessment) -> Result<Assessment, AppError> {
        let mut t = self.lock()?;
        let id = t.next_id();
        let now = Utc::now();
        let assessment = Assessment {
            id,
            kind: new.kind,
            course_id: new.course_id,
            teacher_id: new.teacher_id,
            category: new.category,
            title: new.title,
            topic: new.topic,
            description: new.description,
            total_points: total_points(&new.questions),
            questions: new.questions,
            policy: new.policy,
            status: new.status,
            analytics: AnalyticsSummary::default(),
            created_at: now,
            updated_at: now,
        };
        t.assessments.insert(id, assessment.clone());
        Ok(assessment)
    }

    async fn get_assessment(&self, id: i64) -> Result<Option<Assessment>, AppError> {
        Ok(self.lock()?.assessments.get(&id).cloned())
    }

    async fn update_assessment(
        &self,
        id: i64,
        changes: AssessmentChanges,
    ) -> Result<Assessment, AppError> {
        let mut t = self.lock()?;
        let attempted = t.attempts.values().any(|a| a.assessment_id == id);
        let stored = t
            .assessments
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Assessment not found".to_string()))?;

        if stored.status == AssessmentStatus::Archived {
            return Err(AppError::Conflict(ARCHIVED_EDIT.to_string()));
        }
        if changes.questions.is_some() && attempted {
            return Err(AppError::Conflict(ATTEMPTED_REWRITE.to_string()));
        }

        changes.apply_to(stored);
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn set_assessment_status(
        &self,
        id: i64,
        from: AssessmentStatus,
        to: AssessmentStatus,
    ) -> Result<Option<Assessment>, AppError> {
        let mut t = self.lock()?;
        Ok(match t.assessments.get_mut(&id) {
            Some(a) if a.status == from => {
                a.status = to;
                a.updated_at = Utc::now();
                Some(a.clone())
            }
            _ => None,
        })
    }

    async fn list_assessments_by_teacher(
        &self,
        teacher_id: i64,
    ) -> Result<Vec<Assessment>, AppError> {
        let t = self.lock()?;
        Ok(t.assessments
            .values()
            .filter(|a| a.teacher_id == teacher_id)
            .cloned()
            .collect())
    }

    async fn list_published_in_categories(
        &self,
        categories: &[String],
    ) -> Result<Vec<Assessment>, AppError> {
        let t = self.lock()?;
        Ok(t.assessments
            .values()
            .filter(|a| {
                a.status == AssessmentStatus::Published && categories.contains(&a.category)
            })
            .cloned()
            .collect())
    }

    async fn store_analytics(
        &self,
        assessment_id: i64,
        analytics: &AnalyticsSummary,
    ) -> Result<(), AppError> {
        let mut t = self.lock()?;
        let stored = t
            .assessments
            .get_mut(&assessment_id)
            .ok_or_else(|| AppError::NotFound("Assessment not found".to_string()))?;
        stored.analytics = analytics.clone();
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn insert_attempt(&self, new: NewAttempt) -> Result<Attempt, AppError> {
        let mut t = self.lock()?;
        let key_len = t
            .assessments
            .get(&new.assessment_id)
            .map(|a| a.questions.len())
            .ok_or_else(|| AppError::NotFound("Assessment not found".to_string()))?;
        if key_len != new.answers.len() {
            return Err(AppError::Conflict(KEY_CHANGED.to_string()));
        }

        let taken = t.attempts.values().any(|a| {
            a.assessment_id == new.assessment_id
                && a.student_id == new.student_id
                && a.attempt_number == new.attempt_number
        });
        if taken {
            return Err(AppError::Conflict(format!(
                "Attempt number {} already exists",
                new.attempt_number
            )));
        }
        let id = t.next_id();
        let attempt = Attempt {
            id,
            assessment_id: new.assessment_id,
            student_id: new.student_id,
            student_email: new.student_email,
            attempt_number: new.attempt_number,
            answers: new.answers,
            score: ScoreSummary::default(),
            status: AttemptStatus::InProgress,
            is_late: new.is_late,
            feedback: None,
            started_at: new.started_at,
            submitted_at: None,
            feedback_at: None,
        };
        t.attempts.insert(id, attempt.clone());
        Ok(attempt)
    }

    async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>, AppError> {
        Ok(self.lock()?.attempts.get(&id).cloned())
    }

    async fn list_attempts(
        &self,
        assessment_id: i64,
        student_id: i64,
    ) -> Result<Vec<Attempt>, AppError> {
        let t = self.lock()?;
        let mut attempts: Vec<Attempt> = t
            .attempts
            .values()
            .filter(|a| a.assessment_id == assessment_id && a.student_id == student_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.attempt_number);
        Ok(attempts)
    }

    async fn list_attempts_for_assessment(
        &self,
        assessment_id: i64,
    ) -> Result<Vec<Attempt>, AppError> {
        let t = self.lock()?;
        Ok(t.attempts
            .values()
            .filter(|a| a.assessment_id == assessment_id)
            .cloned()
            .collect())
    }

    async fn list_attempts_for_student(&self, student_id: i64) -> Result<Vec<Attempt>, AppError> {
        let t = self.lock()?;
        Ok(t.attempts
            .values()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn finalize_attempt(
        &self,
        id: i64,
        result: FinalizedAttempt,
    ) -> Result<Option<Attempt>, AppError> {
        let mut t = self.lock()?;
        match t.attempts.get_mut(&id) {
            Some(a) if a.status == AttemptStatus::InProgress => {
                a.answers = result.answers;
                a.score = result.score;
                a.status = result.status;
                a.submitted_at = Some(result.submitted_at);
                Ok(Some(a.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn set_feedback(
        &self,
        id: i64,
        feedback: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Attempt>, AppError> {
        let mut t = self.lock()?;
        Ok(t.attempts.get_mut(&id).map(|a| {
            a.feedback = Some(feedback.to_string());
            a.feedback_at = Some(at);
            a.clone()
        }))
    }
}
