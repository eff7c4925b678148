// src/engine/lifecycle.rs

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};

use super::{
    analytics,
    gate::{self, GateDecision},
    grading::{self, ScoringBasis},
};
use crate::{
    config::START_ATTEMPT_RETRIES,
    error::AppError,
    models::{
        assessment::{Assessment, AssessmentKind},
        attempt::{
            AnswerEntry, Attempt, AttemptStatus, DisplayStatus, FinalizedAttempt, NewAttempt,
            QuestionResponse,
        },
    },
    store::Store,
};

/// Caller identity as far as attempts are concerned.
#[derive(Debug, Clone)]
pub struct Student {
    pub id: i64,
    pub email: String,
}

fn blank_answers(assessment: &Assessment) -> Vec<AnswerEntry> {
    let mut blank: Vec<AnswerEntry> = assessment
        .questions
        .iter()
        .map(|q| AnswerEntry::blank(q.number))
        .collect();
    blank.sort_by_key(|a| a.question_number);
    blank
}

/// Creates the next attempt for `student`.
///
/// The gate is evaluated against the current attempt list, then the insert relies on the
/// store's `(assessment, student, attempt_number)` uniqueness and its check that the answer
/// slots still match the key. A `Conflict` from either reloads the assessment and re-runs
/// the gate, so concurrent starts never exceed `max_attempts`, duplicate a number, or hold
/// a stale key.
pub async fn start_attempt(
    store: &dyn Store,
    assessment: &Assessment,
    student: &Student,
    now: DateTime<Utc>,
) -> Result<Attempt, AppError> {
    let mut current = assessment.clone();

    for round in 0..=START_ATTEMPT_RETRIES {
        if round > 0 {
            current = store
                .get_assessment(assessment.id)
                .await?
                .ok_or(AppError::NotFound("Assessment not found".to_string()))?;
        }

        let existing = store.list_attempts(current.id, student.id).await?;
        let (attempt_number, is_late) = match gate::can_start_attempt(&current, &existing, now) {
            GateDecision::Allow {
                attempt_number,
                is_late,
            } => (attempt_number, is_late),
            GateDecision::Deny(denial) => {
                tracing::debug!(
                    "Start denied for student {} on assessment {}: {:?}",
                    student.id,
                    current.id,
                    denial
                );
                return Err(denial.into());
            }
        };

        let new = NewAttempt {
            assessment_id: current.id,
            student_id: student.id,
            student_email: student.email.clone(),
            attempt_number,
            answers: blank_answers(&current),
            is_late,
            started_at: now,
        };

        match store.insert_attempt(new).await {
            Ok(attempt) => {
                tracing::info!(
                    "Student {} started attempt {} on assessment {}",
                    student.id,
                    attempt.attempt_number,
                    current.id
                );
                return Ok(attempt);
            }
            Err(AppError::Conflict(reason)) => {
                tracing::warn!(
                    "Start of attempt {} for student {} on assessment {} lost a race ({}), \
                     retrying",
                    attempt_number,
                    student.id,
                    current.id,
                    reason
                );
            }
            Err(e) => return Err(e),
        }
    }

    Err(AppError::Conflict(
        "Could not reserve an attempt number, please retry".to_string(),
    ))
}

/// Grades and finalizes an in-progress attempt, then refreshes the assessment's analytics.
///
/// An attempt that is no longer in progress fails with `PolicyViolation` before anything
/// else is looked at, and its stored answers and score stay untouched. Duplicate question
/// numbers are a validation error.
pub async fn submit_attempt(
    store: &dyn Store,
    assessment: &Assessment,
    attempt: &Attempt,
    responses: &[QuestionResponse],
    basis: ScoringBasis,
    now: DateTime<Utc>,
) -> Result<Attempt, AppError> {
    let is_late = gate::check_can_submit(attempt, assessment, now)?;

    let mut seen = HashSet::with_capacity(responses.len());
    if let Some(dup) = responses.iter().find(|r| !seen.insert(r.question_number)) {
        return Err(AppError::BadRequest(format!(
            "Question {} was answered more than once",
            dup.question_number
        )));
    }

    let graded = grading::grade(
        responses,
        &assessment.questions,
        &assessment.policy,
        is_late,
        basis,
    );

    if graded.answers.len() != attempt.answers.len() {
        // Key rewrites are refused once an attempt exists, so this is corrupt data.
        return Err(AppError::InternalServerError(format!(
            "attempt {} has {} answer slots but the key has {} questions",
            attempt.id,
            attempt.answers.len(),
            graded.answers.len()
        )));
    }

    let result = FinalizedAttempt {
        answers: graded.answers,
        score: graded.score,
        status: if is_late {
            AttemptStatus::Late
        } else {
            AttemptStatus::Submitted
        },
        submitted_at: now,
    };

    let finalized = store
        .finalize_attempt(attempt.id, result)
        .await?
        .ok_or_else(|| {
            AppError::PolicyViolation("This attempt has already been submitted".to_string())
        })?;

    tracing::info!(
        "Attempt {} on assessment {} graded: {}/{} points ({}%)",
        finalized.id,
        assessment.id,
        finalized.score.earned_points,
        finalized.score.total_points,
        finalized.score.percentage
    );

    refresh_analytics(store, assessment.id, now).await;

    Ok(finalized)
}

/// Recomputes and caches the rollup. Failures are logged and swallowed:
/// the submission has already been committed.
pub async fn refresh_analytics(store: &dyn Store, assessment_id: i64, now: DateTime<Utc>) {
    let result = async {
        let attempts = store.list_attempts_for_assessment(assessment_id).await?;
        let summary = analytics::summarize(&attempts, now);
        store.store_analytics(assessment_id, &summary).await
    }
    .await;

    if let Err(e) = result {
        tracing::warn!("Analytics refresh failed for assessment {}: {:?}", assessment_id, e);
    }
}

/// End of the advisory quiz window, if the quiz has a time limit.
pub fn expires_at(attempt: &Attempt, assessment: &Assessment) -> Option<DateTime<Utc>> {
    match (assessment.kind, assessment.policy.time_limit) {
        (AssessmentKind::Quiz, Some(minutes)) => {
            Some(attempt.started_at + Duration::minutes(minutes as i64))
        }
        _ => None,
    }
}

/// Read-time label for an attempt. Never written back.
pub fn display_status(
    attempt: &Attempt,
    assessment: &Assessment,
    now: DateTime<Utc>,
) -> DisplayStatus {
    match attempt.status {
        AttemptStatus::Submitted => DisplayStatus::Submitted,
        AttemptStatus::Late => DisplayStatus::Late,
        AttemptStatus::InProgress => {
            if assessment.policy.deadline_passed(now) {
                if assessment.policy.allow_late_submission {
                    DisplayStatus::PendingLate
                } else {
                    DisplayStatus::Missed
                }
            } else if expires_at(attempt, assessment).is_some_and(|end| now > end) {
                DisplayStatus::Timeout
            } else {
                DisplayStatus::InProgress
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        engine::gate::test_support::attempt,
        models::assessment::{
            AssessmentChanges, AssessmentStatus, NewAssessment, OptionLabel, PolicySet, fixtures,
        },
        store::{AssessmentStore, AttemptStore, MemoryStore},
    };

    async fn seeded(store: &MemoryStore, kind: AssessmentKind, policy: PolicySet) -> Assessment {
        store
            .insert_assessment(NewAssessment {
                kind,
                course_id: 1,
                teacher_id: 100,
                category: "rust".into(),
                title: "Traits".into(),
                topic: "dispatch".into(),
                description: None,
                questions: vec![
                    fixtures::question(1, OptionLabel::A, 2),
                    fixtures::question(2, OptionLabel::B, 3),
                ],
                policy,
                status: AssessmentStatus::Published,
            })
            .await
            .unwrap()
    }

    fn student() -> Student {
        Student {
            id: 7,
            email: "s@example.com".into(),
        }
    }

    fn answers(picks: &[(i32, OptionLabel)]) -> Vec<QuestionResponse> {
        picks
            .iter()
            .map(|&(n, o)| QuestionResponse {
                question_number: n,
                selected_option: Some(o),
            })
            .collect()
    }

    #[tokio::test]
    async fn attempts_are_numbered_without_gaps() {
        let store = MemoryStore::new();
        let policy = PolicySet {
            max_attempts: 3,
            ..PolicySet::default()
        };
        let a = seeded(&store, AssessmentKind::Quiz, policy).await;
        let now = Utc::now();

        let mut numbers = Vec::new();
        for _ in 0..3 {
            let attempt = start_attempt(&store, &a, &student(), now).await.unwrap();
            assert_eq!(attempt.answers.len(), 2);
            assert!(attempt.answers.iter().all(|e| e.selected_option.is_none() && !e.is_correct));
            numbers.push(attempt.attempt_number);
        }
        assert_eq!(numbers, vec![1, 2, 3]);

        let err = start_attempt(&store, &a, &student(), now).await.unwrap_err();
        assert!(matches!(err, AppError::PolicyViolation(msg) if msg.contains("Maximum attempts")));
    }

    #[tokio::test]
    async fn second_submit_is_rejected_and_changes_nothing() {
        let store = MemoryStore::new();
        let a = seeded(&store, AssessmentKind::Quiz, PolicySet::default()).await;
        let now = Utc::now();
        let started = start_attempt(&store, &a, &student(), now).await.unwrap();

        let first = submit_attempt(
            &store,
            &a,
            &started,
            &answers(&[(1, OptionLabel::A), (2, OptionLabel::C)]),
            ScoringBasis::AnswerKey,
            now,
        )
        .await
        .unwrap();
        assert_eq!(first.status, AttemptStatus::Submitted);
        assert_eq!(first.score.earned_points, 2);

        // Stale in-progress copy, as a racing duplicate request would hold.
        let err = submit_attempt(
            &store,
            &a,
            &started,
            &answers(&[(1, OptionLabel::A), (2, OptionLabel::B)]),
            ScoringBasis::AnswerKey,
            now,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::PolicyViolation(_)));

        let stored = store.get_attempt(started.id).await.unwrap().unwrap();
        assert_eq!(stored.score, first.score);
        assert_eq!(stored.answers, first.answers);
    }

    #[tokio::test]
    async fn max_one_attempt_blocks_restart_after_submit() {
        let store = MemoryStore::new();
        let a = seeded(&store, AssessmentKind::Quiz, PolicySet::default()).await;
        let now = Utc::now();
        let started = start_attempt(&store, &a, &student(), now).await.unwrap();
        submit_attempt(&store, &a, &started, &[], ScoringBasis::AnswerKey, now)
            .await
            .unwrap();

        let err = start_attempt(&store, &a, &student(), now).await.unwrap_err();
        assert!(matches!(err, AppError::PolicyViolation(_)));
    }

    #[tokio::test]
    async fn concurrent_starts_admit_exactly_one() {
        let store = Arc::new(MemoryStore::new());
        let a = seeded(&store, AssessmentKind::Assignment, PolicySet::default()).await;
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let a = a.clone();
            handles.push(tokio::spawn(async move {
                start_attempt(store.as_ref(), &a, &student(), now).await
            }));
        }

        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(store.list_attempts(a.id, 7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn late_submission_applies_penalty_and_status() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let a = seeded(
            &store,
            AssessmentKind::Assignment,
            PolicySet {
                due_date: Some(now - Duration::days(1)),
                allow_late_submission: true,
                late_submission_penalty: 20,
                ..PolicySet::default()
            },
        )
        .await;

        let started = start_attempt(&store, &a, &student(), now).await.unwrap();
        assert!(started.is_late);

        let done = submit_attempt(
            &store,
            &a,
            &started,
            &answers(&[(1, OptionLabel::A), (2, OptionLabel::B)]),
            ScoringBasis::AnswerKey,
            now,
        )
        .await
        .unwrap();
        assert_eq!(done.status, AttemptStatus::Late);
        assert_eq!(done.score.earned_points, 5);
        assert_eq!(done.score.late_penalty, 1.0);
        assert_eq!(done.score.final_score, 4.0);
    }

    #[tokio::test]
    async fn duplicate_responses_are_a_validation_error() {
        let store = MemoryStore::new();
        let a = seeded(&store, AssessmentKind::Quiz, PolicySet::default()).await;
        let started = start_attempt(&store, &a, &student(), Utc::now()).await.unwrap();
        let err = submit_attempt(
            &store,
            &a,
            &started,
            &answers(&[(1, OptionLabel::A), (1, OptionLabel::B)]),
            ScoringBasis::AnswerKey,
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn finished_attempt_fails_on_status_before_response_checks() {
        let store = MemoryStore::new();
        let a = seeded(&store, AssessmentKind::Quiz, PolicySet::default()).await;
        let now = Utc::now();
        let started = start_attempt(&store, &a, &student(), now).await.unwrap();
        let done = submit_attempt(&store, &a, &started, &[], ScoringBasis::AnswerKey, now)
            .await
            .unwrap();

        let err = submit_attempt(
            &store,
            &a,
            &done,
            &answers(&[(1, OptionLabel::A), (1, OptionLabel::B)]),
            ScoringBasis::AnswerKey,
            now,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::PolicyViolation(_)));
    }

    #[tokio::test]
    async fn start_with_stale_key_retries_against_the_rewritten_one() {
        let store = MemoryStore::new();
        let stale = seeded(&store, AssessmentKind::Quiz, PolicySet::default()).await;

        let rewrite = AssessmentChanges {
            questions: Some(vec![
                fixtures::question(1, OptionLabel::A, 1),
                fixtures::question(2, OptionLabel::B, 1),
                fixtures::question(3, OptionLabel::C, 1),
            ]),
            ..AssessmentChanges::default()
        };
        store.update_assessment(stale.id, rewrite).await.unwrap();

        let now = Utc::now();
        let started = start_attempt(&store, &stale, &student(), now).await.unwrap();
        assert_eq!(started.answers.len(), 3);

        let current = store.get_assessment(stale.id).await.unwrap().unwrap();
        let done = submit_attempt(
            &store,
            &current,
            &started,
            &answers(&[(3, OptionLabel::C)]),
            ScoringBasis::AnswerKey,
            now,
        )
        .await
        .unwrap();
        assert_eq!(done.score.earned_points, 1);
        assert_eq!(done.score.total_points, 3);
    }

    #[tokio::test]
    async fn submit_refreshes_analytics() {
        let store = MemoryStore::new();
        let a = seeded(&store, AssessmentKind::Quiz, PolicySet::default()).await;
        let now = Utc::now();
        let started = start_attempt(&store, &a, &student(), now).await.unwrap();
        submit_attempt(
            &store,
            &a,
            &started,
            &answers(&[(1, OptionLabel::A)]),
            ScoringBasis::AnswerKey,
            now,
        )
        .await
        .unwrap();

        let cached = store.get_assessment(a.id).await.unwrap().unwrap().analytics;
        assert_eq!(cached.total_attempts, 1);
        assert_eq!(cached.average_score, 40.0);
        assert_eq!(cached.highest_score, 40);
    }

    #[tokio::test]
    async fn analytics_failure_does_not_fail_the_caller() {
        let store = MemoryStore::new();
        // No such assessment: store_analytics errors, refresh just logs.
        refresh_analytics(&store, 9999, Utc::now()).await;
    }

    #[test]
    fn display_status_derivation() {
        let now = Utc::now();
        let open = fixtures::assessment(
            AssessmentKind::Quiz,
            vec![fixtures::question(1, OptionLabel::A, 1)],
            PolicySet {
                time_limit: Some(10),
                ..PolicySet::default()
            },
        );
        let mut running = attempt(1, AttemptStatus::InProgress);
        running.started_at = now - Duration::minutes(5);
        assert_eq!(display_status(&running, &open, now), DisplayStatus::InProgress);

        running.started_at = now - Duration::minutes(30);
        assert_eq!(display_status(&running, &open, now), DisplayStatus::Timeout);

        let closed = fixtures::assessment(
            AssessmentKind::Assignment,
            vec![fixtures::question(1, OptionLabel::A, 1)],
            PolicySet {
                due_date: Some(now - Duration::hours(1)),
                ..PolicySet::default()
            },
        );
        assert_eq!(display_status(&running, &closed, now), DisplayStatus::Missed);

        let lenient = fixtures::assessment(
            AssessmentKind::Assignment,
            vec![fixtures::question(1, OptionLabel::A, 1)],
            PolicySet {
                due_date: Some(now - Duration::hours(1)),
                allow_late_submission: true,
                ..PolicySet::default()
            },
        );
        assert_eq!(display_status(&running, &lenient, now), DisplayStatus::PendingLate);

        let done = attempt(2, AttemptStatus::Late);
        assert_eq!(display_status(&done, &closed, now), DisplayStatus::Late);
    }
}
