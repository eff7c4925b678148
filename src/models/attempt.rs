// src/models/attempt.rs

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::assessment::{OptionLabel, PublicAssessment, Question};

/// Persisted attempt states. `InProgress` is the only non-terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    Late,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::Late => "late",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }
}

impl FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "submitted" => Ok(AttemptStatus::Submitted),
            "late" => Ok(AttemptStatus::Late),
            other => Err(format!("unknown attempt status '{}'", other)),
        }
    }
}

/// Status shown to clients. Derived at read time, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    InProgress,
    Submitted,
    Late,
    Missed,
    PendingLate,
    Timeout,
}

/// One slot of the answers array, parallel to the answer key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question_number: i32,
    pub selected_option: Option<OptionLabel>,
    pub is_correct: bool,
    pub points_earned: i32,
}

impl AnswerEntry {
    pub fn blank(question_number: i32) -> Self {
        Self {
            question_number,
            selected_option: None,
            is_correct: false,
            points_earned: 0,
        }
    }
}

/// Derived grading output. Never set directly by a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub total_questions: i32,
    pub correct_answers: i32,
    pub wrong_answers: i32,
    pub unattempted: i32,
    pub total_points: i32,
    pub earned_points: i32,
    pub percentage: i32,
    pub late_penalty: f64,
    pub final_score: f64,
}

/// Represents the 'attempts' table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub assessment_id: i64,
    pub student_id: i64,
    pub student_email: String,
    /// 1-based, strictly increasing per (student, assessment).
    pub attempt_number: i32,
    pub answers: Vec<AnswerEntry>,
    pub score: ScoreSummary,
    pub status: AttemptStatus,
    /// Assignments fix lateness when the attempt starts.
    pub is_late: bool,
    pub feedback: Option<String>,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub feedback_at: Option<DateTime<Utc>>,
}

/// Insert payload produced once the access gate admits a start.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub assessment_id: i64,
    pub student_id: i64,
    pub student_email: String,
    pub attempt_number: i32,
    pub answers: Vec<AnswerEntry>,
    pub is_late: bool,
    pub started_at: DateTime<Utc>,
}

/// Fields written by the single scoring event of an attempt.
#[derive(Debug, Clone)]
pub struct FinalizedAttempt {
    pub answers: Vec<AnswerEntry>,
    pub score: ScoreSummary,
    pub status: AttemptStatus,
    pub submitted_at: DateTime<Utc>,
}

/// A student's answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub question_number: i32,
    #[serde(default)]
    pub selected_option: Option<OptionLabel>,
}

/// DTO for submitting an attempt.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAttemptRequest {
    #[validate(length(max = 50, message = "Too many responses"))]
    pub responses: Vec<QuestionResponse>,
}

/// DTO for teacher feedback on an attempt.
#[derive(Debug, Deserialize, Validate)]
pub struct FeedbackRequest {
    #[validate(length(
        min = 1,
        max = 5000,
        message = "Feedback length must be between 1 and 5000 chars"
    ))]
    pub feedback: String,
}

/// Attempt together with its read-time status.
#[derive(Debug, Serialize)]
pub struct AttemptView {
    #[serde(flatten)]
    pub attempt: Attempt,
    pub display_status: DisplayStatus,
}

/// Response for a freshly started attempt.
#[derive(Debug, Serialize)]
pub struct StartAttemptResponse {
    pub attempt: Attempt,
    pub assessment: PublicAssessment,
    /// Advisory end of the quiz time window.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Response for a graded submission: the key is revealed.
#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub attempt: Attempt,
    pub score: ScoreSummary,
    pub answer_key: Vec<Question>,
}
