// src/models/assessment.rs

use std::{collections::HashSet, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    config::{MAX_ASSIGNMENT_QUESTIONS, MAX_LATE_PENALTY, MAX_QUIZ_QUESTIONS},
    error::AppError,
};

/// Quizzes and assignments share one model; the kind selects the policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentKind {
    Quiz,
    Assignment,
}

impl AssessmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentKind::Quiz => "quiz",
            AssessmentKind::Assignment => "assignment",
        }
    }

    pub fn max_questions(&self) -> usize {
        match self {
            AssessmentKind::Quiz => MAX_QUIZ_QUESTIONS,
            AssessmentKind::Assignment => MAX_ASSIGNMENT_QUESTIONS,
        }
    }
}

impl fmt::Display for AssessmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssessmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quiz" => Ok(AssessmentKind::Quiz),
            "assignment" => Ok(AssessmentKind::Assignment),
            other => Err(format!("unknown assessment kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentStatus {
    Draft,
    Published,
    Archived,
}

impl AssessmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentStatus::Draft => "draft",
            AssessmentStatus::Published => "published",
            AssessmentStatus::Archived => "archived",
        }
    }

    /// Allowed moves: draft -> published, draft|published -> archived.
    pub fn can_transition_to(&self, next: AssessmentStatus) -> bool {
        matches!(
            (self, next),
            (AssessmentStatus::Draft, AssessmentStatus::Published)
                | (AssessmentStatus::Draft, AssessmentStatus::Archived)
                | (AssessmentStatus::Published, AssessmentStatus::Archived)
        )
    }
}

impl FromStr for AssessmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(AssessmentStatus::Draft),
            "published" => Ok(AssessmentStatus::Published),
            "archived" => Ok(AssessmentStatus::Archived),
            other => Err(format!("unknown assessment status '{}'", other)),
        }
    }
}

/// One of the four option labels every question carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionLabel {
    A,
    B,
    C,
    D,
}

/// The four option texts, keyed by label on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct QuestionOptions {
    #[serde(rename = "A")]
    #[validate(length(min = 1, max = 1000, message = "Option A must not be empty"))]
    pub a: String,
    #[serde(rename = "B")]
    #[validate(length(min = 1, max = 1000, message = "Option B must not be empty"))]
    pub b: String,
    #[serde(rename = "C")]
    #[validate(length(min = 1, max = 1000, message = "Option C must not be empty"))]
    pub c: String,
    #[serde(rename = "D")]
    #[validate(length(min = 1, max = 1000, message = "Option D must not be empty"))]
    pub d: String,
}

/// One entry of an answer key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Question {
    /// 1-based position; the numbers of a key form a permutation of 1..=N.
    pub number: i32,
    #[validate(length(
        min = 1,
        max = 2000,
        message = "Question text length must be between 1 and 2000 chars"
    ))]
    pub text: String,
    #[validate(nested)]
    pub options: QuestionOptions,
    pub correct_option: OptionLabel,
    #[validate(range(min = 1, max = 100, message = "Points must be between 1 and 100"))]
    pub points: i32,
    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
}

/// Question as shown to students before submission: no correct option, no explanation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub number: i32,
    pub text: String,
    pub options: QuestionOptions,
    pub points: i32,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            number: q.number,
            text: q.text.clone(),
            options: q.options.clone(),
            points: q.points,
        }
    }
}

/// Rules governing attempts, lateness and availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PolicySet {
    #[validate(range(min = 1, max = 100, message = "max_attempts must be between 1 and 100"))]
    pub max_attempts: i32,
    #[serde(default)]
    pub allow_late_submission: bool,
    /// Percentage removed from earned points on late submissions.
    #[serde(default)]
    pub late_submission_penalty: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Due date for assignments, end date for quizzes.
    #[serde(default, alias = "end_date")]
    pub due_date: Option<DateTime<Utc>>,
    /// Quizzes only, in minutes. Advisory: not enforced at submit time.
    #[serde(default)]
    #[validate(range(
        min = 1,
        max = 1440,
        message = "time_limit must be between 1 and 1440 minutes"
    ))]
    pub time_limit: Option<i32>,
}

fn default_true() -> bool {
    true
}

impl Default for PolicySet {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            allow_late_submission: false,
            late_submission_penalty: 0,
            is_active: true,
            due_date: None,
            time_limit: None,
        }
    }
}

impl PolicySet {
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.due_date.is_some_and(|due| now > due)
    }

    /// Kind-specific checks the derive cannot express.
    pub fn check_for(&self, kind: AssessmentKind) -> Result<(), AppError> {
        if kind == AssessmentKind::Assignment && self.time_limit.is_some() {
            return Err(AppError::BadRequest(
                "time_limit is only supported for quizzes".to_string(),
            ));
        }
        if !(0..=MAX_LATE_PENALTY).contains(&self.late_submission_penalty) {
            return Err(AppError::BadRequest(format!(
                "late_submission_penalty must be between 0 and {}",
                MAX_LATE_PENALTY
            )));
        }
        Ok(())
    }
}

/// Rollup cached on the assessment after each submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_attempts: i32,
    pub submissions_on_time: i32,
    pub submissions_late: i32,
    pub average_score: f64,
    pub highest_score: i32,
    pub lowest_score: i32,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Represents the 'assessments' table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub id: i64,
    pub kind: AssessmentKind,
    pub course_id: i64,
    pub teacher_id: i64,
    /// Course category at creation time; not kept in sync with later course edits.
    pub category: String,
    pub title: String,
    pub topic: String,
    pub description: Option<String>,
    pub questions: Vec<Question>,
    /// Sum of question points, recomputed whenever questions are written.
    pub total_points: i32,
    pub policy: PolicySet,
    pub status: AssessmentStatus,
    pub analytics: AnalyticsSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assessment {
    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.teacher_id == user_id
    }

    /// Replaces the answer key and keeps `total_points` consistent with it.
    pub fn set_questions(&mut self, questions: Vec<Question>) {
        self.total_points = total_points(&questions);
        self.questions = questions;
    }
}

pub fn total_points(questions: &[Question]) -> i32 {
    questions.iter().map(|q| q.points).sum()
}

/// Structural checks on an answer key: count within the kind's range and
/// numbers forming a permutation of 1..=N. Per-question field checks are in the derive.
pub fn validate_answer_key(kind: AssessmentKind, questions: &[Question]) -> Result<(), AppError> {
    let count = questions.len();
    if count == 0 || count > kind.max_questions() {
        return Err(AppError::BadRequest(format!(
            "A {} must have between 1 and {} questions",
            kind,
            kind.max_questions()
        )));
    }

    let mut seen = HashSet::with_capacity(count);
    for q in questions {
        if q.number < 1 || q.number as usize > count || !seen.insert(q.number) {
            return Err(AppError::BadRequest(format!(
                "Question numbers must be unique and run from 1 to {}",
                count
            )));
        }
        q.validate()?;
    }
    Ok(())
}

/// Assessment as listed for students: answer key redacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicAssessment {
    pub id: i64,
    pub kind: AssessmentKind,
    pub course_id: i64,
    pub category: String,
    pub title: String,
    pub topic: String,
    pub description: Option<String>,
    pub questions: Vec<PublicQuestion>,
    pub total_points: i32,
    pub max_attempts: i32,
    pub allow_late_submission: bool,
    pub late_submission_penalty: i32,
    pub due_date: Option<DateTime<Utc>>,
    pub time_limit: Option<i32>,
}

impl From<&Assessment> for PublicAssessment {
    fn from(a: &Assessment) -> Self {
        let mut questions: Vec<PublicQuestion> =
            a.questions.iter().map(PublicQuestion::from).collect();
        questions.sort_by_key(|q| q.number);
        Self {
            id: a.id,
            kind: a.kind,
            course_id: a.course_id,
            category: a.category.clone(),
            title: a.title.clone(),
            topic: a.topic.clone(),
            description: a.description.clone(),
            questions,
            total_points: a.total_points,
            max_attempts: a.policy.max_attempts,
            allow_late_submission: a.policy.allow_late_submission,
            late_submission_penalty: a.policy.late_submission_penalty,
            due_date: a.policy.due_date,
            time_limit: a.policy.time_limit,
        }
    }
}

/// Insert payload for a new assessment.
#[derive(Debug, Clone)]
pub struct NewAssessment {
    pub kind: AssessmentKind,
    pub course_id: i64,
    pub teacher_id: i64,
    pub category: String,
    pub title: String,
    pub topic: String,
    pub description: Option<String>,
    pub questions: Vec<Question>,
    pub policy: PolicySet,
    pub status: AssessmentStatus,
}

/// DTO for creating an assessment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAssessmentRequest {
    pub kind: AssessmentKind,
    pub course_id: i64,
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title length must be between 1 and 200 chars"
    ))]
    pub title: String,
    #[validate(length(
        min = 1,
        max = 200,
        message = "Topic length must be between 1 and 200 chars"
    ))]
    pub topic: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub questions: Vec<Question>,
    #[validate(nested)]
    #[serde(default)]
    pub policy: PolicySet,
    /// Create directly in `published` instead of `draft`.
    #[serde(default)]
    pub publish: bool,
}

/// DTO for updating an assessment. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAssessmentRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub topic: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub questions: Option<Vec<Question>>,
    pub policy: Option<PolicySet>,
}

impl UpdateAssessmentRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.topic.is_none()
            && self.description.is_none()
            && self.questions.is_none()
            && self.policy.is_none()
    }
}

/// A validated, sanitised edit. The store applies it atomically against the current row;
/// `None` leaves a field as it is. Status is never part of an edit.
#[derive(Debug, Clone, Default)]
pub struct AssessmentChanges {
    pub title: Option<String>,
    pub topic: Option<String>,
    pub description: Option<String>,
    pub policy: Option<PolicySet>,
    /// Replaces the answer key. Refused once any attempt exists.
    pub questions: Option<Vec<Question>>,
}

impl AssessmentChanges {
    pub fn apply_to(self, assessment: &mut Assessment) {
        if let Some(title) = self.title {
            assessment.title = title;
        }
        if let Some(topic) = self.topic {
            assessment.topic = topic;
        }
        if let Some(description) = self.description {
            assessment.description = Some(description);
        }
        if let Some(policy) = self.policy {
            assessment.policy = policy;
        }
        if let Some(questions) = self.questions {
            assessment.set_questions(questions);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::question;
    use super::*;

    #[test]
    fn answer_key_numbers_must_be_a_permutation() {
        let ok = vec![question(2, OptionLabel::A, 1), question(1, OptionLabel::B, 1)];
        assert!(validate_answer_key(AssessmentKind::Quiz, &ok).is_ok());

        let gap = vec![question(1, OptionLabel::A, 1), question(3, OptionLabel::B, 1)];
        assert!(validate_answer_key(AssessmentKind::Quiz, &gap).is_err());

        let dup = vec![question(1, OptionLabel::A, 1), question(1, OptionLabel::B, 1)];
        assert!(validate_answer_key(AssessmentKind::Quiz, &dup).is_err());
    }

    #[test]
    fn question_count_limit_depends_on_kind() {
        let key: Vec<Question> = (1..=21).map(|n| question(n, OptionLabel::A, 1)).collect();
        assert!(validate_answer_key(AssessmentKind::Quiz, &key).is_ok());
        assert!(validate_answer_key(AssessmentKind::Assignment, &key).is_err());
        assert!(validate_answer_key(AssessmentKind::Quiz, &[]).is_err());
    }

    #[test]
    fn empty_option_is_rejected() {
        let mut q = question(1, OptionLabel::A, 1);
        q.options.c = String::new();
        assert!(validate_answer_key(AssessmentKind::Assignment, &[q]).is_err());
    }

    #[test]
    fn correct_option_outside_a_to_d_fails_to_parse() {
        let raw = serde_json::json!({
            "number": 1,
            "text": "?",
            "options": {"A": "a", "B": "b", "C": "c", "D": "d"},
            "correct_option": "E",
            "points": 1
        });
        assert!(serde_json::from_value::<Question>(raw).is_err());
    }

    #[test]
    fn total_points_follows_question_rewrites() {
        let mut a = fixtures::assessment(
            AssessmentKind::Quiz,
            vec![question(1, OptionLabel::A, 2), question(2, OptionLabel::B, 3)],
            PolicySet::default(),
        );
        assert_eq!(a.total_points, 5);
        a.set_questions(vec![question(1, OptionLabel::C, 4)]);
        assert_eq!(a.total_points, 4);
    }

    #[test]
    fn time_limit_is_quiz_only() {
        let policy = PolicySet {
            time_limit: Some(30),
            ..PolicySet::default()
        };
        assert!(policy.check_for(AssessmentKind::Quiz).is_ok());
        assert!(policy.check_for(AssessmentKind::Assignment).is_err());
    }

    #[test]
    fn penalty_above_cap_is_rejected() {
        let policy = PolicySet {
            late_submission_penalty: 60,
            ..PolicySet::default()
        };
        assert!(policy.check_for(AssessmentKind::Assignment).is_err());
    }

    #[test]
    fn lifecycle_transitions() {
        use AssessmentStatus::*;
        assert!(Draft.can_transition_to(Published));
        assert!(Published.can_transition_to(Archived));
        assert!(!Archived.can_transition_to(Published));
        assert!(!Published.can_transition_to(Draft));
    }

    #[test]
    fn public_view_hides_the_key() {
        let a = fixtures::assessment(
            AssessmentKind::Quiz,
            vec![question(1, OptionLabel::A, 2)],
            PolicySet::default(),
        );
        let json = serde_json::to_value(PublicAssessment::from(&a)).unwrap();
        let q = &json["questions"][0];
        assert!(q.get("correct_option").is_none());
        assert!(q.get("explanation").is_none());
        assert_eq!(q["options"]["A"], "first");
    }
}
