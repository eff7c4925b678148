// src/handlers/attempt.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use validator::Validate;

use super::assessment::owned_assessment;
use crate::{
    config::Config,
    engine::lifecycle::{self, Student},
    error::AppError,
    models::{
        assessment::{Assessment, PublicAssessment},
        attempt::{
            Attempt, AttemptView, FeedbackRequest, StartAttemptResponse, SubmissionResponse,
            SubmitAttemptRequest,
        },
    },
    state::SharedStore,
    utils::{html::clean_html, jwt::Claims},
};

/// Loads an attempt that belongs to the caller, with its assessment.
/// Other students' attempts read as missing.
async fn own_attempt(
    store: &SharedStore,
    claims: &Claims,
    id: i64,
) -> Result<(Attempt, Assessment), AppError> {
    let not_found = || AppError::NotFound("Attempt not found".to_string());

    let attempt = store.get_attempt(id).await?.ok_or_else(not_found)?;
    if attempt.student_id != claims.user_id()? {
        return Err(not_found());
    }
    let assessment = store.get_assessment(attempt.assessment_id).await?.ok_or_else(not_found)?;
    Ok((attempt, assessment))
}

/// Starts a new attempt.
///
/// * Requires a verified, active enrollment in the assessment's category.
/// * The access gate enforces availability, deadline and attempt limits.
/// * Returns the blank attempt and the redacted assessment.
pub async fn start_attempt(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(assessment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student = Student {
        id: claims.user_id()?,
        email: claims.email.clone(),
    };

    let assessment = store
        .get_assessment(assessment_id)
        .await?
        .ok_or(AppError::NotFound("Assessment not found".to_string()))?;

    if !store.is_enrolled(student.id, &assessment.category).await? {
        return Err(AppError::Forbidden(
            "You are not enrolled in this course category".to_string(),
        ));
    }

    let attempt =
        lifecycle::start_attempt(store.as_ref(), &assessment, &student, Utc::now()).await?;

    // The key is frozen once an attempt exists, so this copy matches the answer slots
    // even if the start had to retry against a rewritten key.
    let assessment = store
        .get_assessment(assessment_id)
        .await?
        .ok_or(AppError::NotFound("Assessment not found".to_string()))?;
    let expires_at = lifecycle::expires_at(&attempt, &assessment);

    Ok((
        StatusCode::CREATED,
        Json(StartAttemptResponse {
            attempt,
            assessment: PublicAssessment::from(&assessment),
            expires_at,
        }),
    ))
}

/// Submits responses for grading. The answer key is revealed in the response.
pub async fn submit_attempt(
    State(store): State<SharedStore>,
    State(config): State<Config>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let (attempt, assessment) = own_attempt(&store, &claims, id).await?;

    let finalized = lifecycle::submit_attempt(
        store.as_ref(),
        &assessment,
        &attempt,
        &payload.responses,
        config.scoring_basis,
        Utc::now(),
    )
    .await?;

    let mut answer_key = assessment.questions;
    answer_key.sort_by_key(|q| q.number);

    Ok(Json(SubmissionResponse {
        score: finalized.score.clone(),
        attempt: finalized,
        answer_key,
    }))
}

/// Returns one of the caller's attempts with its display status.
pub async fn get_attempt(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let (attempt, assessment) = own_attempt(&store, &claims, id).await?;
    Ok(Json(AttemptView {
        display_status: lifecycle::display_status(&attempt, &assessment, Utc::now()),
        attempt,
    }))
}

/// Lists all of the caller's attempts, newest first.
pub async fn list_my_attempts(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let mut attempts = store.list_attempts_for_student(claims.user_id()?).await?;
    attempts.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    let mut views = Vec::with_capacity(attempts.len());
    for attempt in attempts {
        let display_status = match store.get_assessment(attempt.assessment_id).await? {
            Some(assessment) => lifecycle::display_status(&attempt, &assessment, now),
            None => {
                tracing::warn!("Attempt {} points at a missing assessment", attempt.id);
                continue;
            }
        };
        views.push(AttemptView {
            attempt,
            display_status,
        });
    }

    Ok(Json(views))
}

/// Attaches teacher feedback to an attempt. Only the owner of the backing assessment may do so.
pub async fn provide_feedback(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let not_found = || AppError::NotFound("Attempt not found".to_string());

    let attempt = store.get_attempt(id).await?.ok_or_else(not_found)?;
    match owned_assessment(&store, &claims, attempt.assessment_id).await {
        Err(AppError::NotFound(_)) => return Err(not_found()),
        other => other?,
    };

    let updated = store
        .set_feedback(id, &clean_html(&payload.feedback), Utc::now())
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(updated))
}
