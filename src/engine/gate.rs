// src/engine/gate.rs

use chrono::{DateTime, Utc};

use crate::{
    error::AppError,
    models::{
        assessment::{Assessment, AssessmentKind, AssessmentStatus},
        attempt::{Attempt, AttemptStatus},
    },
};

/// Why a new attempt may not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    NotPublished,
    Inactive,
    DeadlinePassed,
    MaxAttemptsReached,
    AlreadySubmitted,
}

impl Denial {
    pub fn reason(&self) -> &'static str {
        match self {
            Denial::NotPublished => "This assessment is not open for attempts",
            Denial::Inactive => "This assessment is currently inactive",
            Denial::DeadlinePassed => "The due date has passed",
            Denial::MaxAttemptsReached => "Maximum attempts reached",
            Denial::AlreadySubmitted => "You have already submitted this assignment",
        }
    }
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        AppError::PolicyViolation(denial.reason().to_string())
    }
}

/// Admission decision for a new attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow {
        attempt_number: i32,
        /// Fixed at start for assignments; quizzes never carry it.
        is_late: bool,
    },
    Deny(Denial),
}

/// Decides whether a student may start another attempt.
///
/// `existing` are the student's attempts on this assessment. Checks run in order:
/// availability, deadline, attempt count, then (assignments only) prior submission.
/// Enrollment is checked by the caller.
pub fn can_start_attempt(
    assessment: &Assessment,
    existing: &[Attempt],
    now: DateTime<Utc>,
) -> GateDecision {
    let policy = &assessment.policy;

    if assessment.status != AssessmentStatus::Published {
        return GateDecision::Deny(Denial::NotPublished);
    }
    if !policy.is_active {
        return GateDecision::Deny(Denial::Inactive);
    }

    let past_deadline = policy.deadline_passed(now);
    if past_deadline && !policy.allow_late_submission {
        return GateDecision::Deny(Denial::DeadlinePassed);
    }

    let count = existing.len() as i32;
    if count >= policy.max_attempts {
        return GateDecision::Deny(Denial::MaxAttemptsReached);
    }

    if assessment.kind == AssessmentKind::Assignment
        && existing.iter().any(|a| a.status.is_terminal())
    {
        return GateDecision::Deny(Denial::AlreadySubmitted);
    }

    GateDecision::Allow {
        attempt_number: count + 1,
        is_late: assessment.kind == AssessmentKind::Assignment && past_deadline,
    }
}

/// Whether a submission at `now` counts as late.
pub fn submission_is_late(attempt: &Attempt, assessment: &Assessment, now: DateTime<Utc>) -> bool {
    attempt.is_late || assessment.policy.deadline_passed(now)
}

/// Guard for the submit transition.
pub fn check_can_submit(
    attempt: &Attempt,
    assessment: &Assessment,
    now: DateTime<Utc>,
) -> Result<bool, AppError> {
    if attempt.status != AttemptStatus::InProgress {
        return Err(AppError::PolicyViolation(
            "This attempt has already been submitted".to_string(),
        ));
    }
    let late = submission_is_late(attempt, assessment, now);
    if late && !assessment.policy.allow_late_submission {
        return Err(AppError::PolicyViolation(
            "Late submissions are not accepted for this assessment".to_string(),
        ));
    }
    Ok(late)
}


#[cfg(test)]
mod tests {
    use super::test_support::attempt;
    use super::*;
    use crate::models::assessment::{OptionLabel, PolicySet, fixtures};
    use chrono::Duration;

    fn assessment(kind: AssessmentKind, policy: PolicySet) -> Assessment {
        fixtures::assessment(kind, vec![fixtures::question(1, OptionLabel::A, 1)], policy)
    }

    #[test]
    fn first_attempt_is_number_one() {
        let a = assessment(AssessmentKind::Quiz, PolicySet::default());
        assert_eq!(
            can_start_attempt(&a, &[], Utc::now()),
            GateDecision::Allow {
                attempt_number: 1,
                is_late: false
            }
        );
    }

    #[test]
    fn max_attempts_is_enforced() {
        let a = assessment(AssessmentKind::Quiz, PolicySet::default());
        let existing = vec![attempt(1, AttemptStatus::Submitted)];
        assert_eq!(
            can_start_attempt(&a, &existing, Utc::now()),
            GateDecision::Deny(Denial::MaxAttemptsReached)
        );
    }

    #[test]
    fn quizzes_allow_retakes_until_the_limit() {
        let a = assessment(
            AssessmentKind::Quiz,
            PolicySet {
                max_attempts: 3,
                ..PolicySet::default()
            },
        );
        let existing = vec![attempt(1, AttemptStatus::Submitted)];
        assert_eq!(
            can_start_attempt(&a, &existing, Utc::now()),
            GateDecision::Allow {
                attempt_number: 2,
                is_late: false
            }
        );
    }

    #[test]
    fn assignments_block_restart_after_submission() {
        let a = assessment(
            AssessmentKind::Assignment,
            PolicySet {
                max_attempts: 3,
                ..PolicySet::default()
            },
        );
        let existing = vec![attempt(1, AttemptStatus::Late)];
        assert_eq!(
            can_start_attempt(&a, &existing, Utc::now()),
            GateDecision::Deny(Denial::AlreadySubmitted)
        );

        let unfinished = vec![attempt(1, AttemptStatus::InProgress)];
        assert!(matches!(
            can_start_attempt(&a, &unfinished, Utc::now()),
            GateDecision::Allow { attempt_number: 2, .. }
        ));
    }

    #[test]
    fn deadline_without_late_allowance_denies() {
        let now = Utc::now();
        let a = assessment(
            AssessmentKind::Assignment,
            PolicySet {
                due_date: Some(now - Duration::hours(1)),
                ..PolicySet::default()
            },
        );
        assert_eq!(
            can_start_attempt(&a, &[], now),
            GateDecision::Deny(Denial::DeadlinePassed)
        );
    }

    #[test]
    fn late_assignment_start_is_flagged() {
        let now = Utc::now();
        let a = assessment(
            AssessmentKind::Assignment,
            PolicySet {
                due_date: Some(now - Duration::hours(1)),
                allow_late_submission: true,
                late_submission_penalty: 20,
                ..PolicySet::default()
            },
        );
        assert_eq!(
            can_start_attempt(&a, &[], now),
            GateDecision::Allow {
                attempt_number: 1,
                is_late: true
            }
        );
    }

    #[test]
    fn unpublished_and_inactive_are_denied() {
        let mut a = assessment(AssessmentKind::Quiz, PolicySet::default());
        a.status = AssessmentStatus::Draft;
        assert_eq!(
            can_start_attempt(&a, &[], Utc::now()),
            GateDecision::Deny(Denial::NotPublished)
        );

        let inactive = assessment(
            AssessmentKind::Quiz,
            PolicySet {
                is_active: false,
                ..PolicySet::default()
            },
        );
        assert_eq!(
            can_start_attempt(&inactive, &[], Utc::now()),
            GateDecision::Deny(Denial::Inactive)
        );
    }

    #[test]
    fn submit_guard_rejects_terminal_and_unallowed_late() {
        let now = Utc::now();
        let open = assessment(AssessmentKind::Quiz, PolicySet::default());
        assert!(check_can_submit(&attempt(1, AttemptStatus::Submitted), &open, now).is_err());
        let in_progress = attempt(1, AttemptStatus::InProgress);
        assert!(!check_can_submit(&in_progress, &open, now).unwrap());

        let closed = assessment(
            AssessmentKind::Quiz,
            PolicySet {
                due_date: Some(now - Duration::minutes(5)),
                ..PolicySet::default()
            },
        );
        assert!(matches!(
            check_can_submit(&attempt(1, AttemptStatus::InProgress), &closed, now),
            Err(AppError::PolicyViolation(_))
        ));
    }
}
