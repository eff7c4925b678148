// src/handlers/assessment.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use validator::Validate;

use crate::{
    engine::{analytics, lifecycle},
    error::AppError,
    models::{
        assessment::{
            Assessment, AssessmentChanges, AssessmentStatus, CreateAssessmentRequest,
            NewAssessment, PublicAssessment, UpdateAssessmentRequest, validate_answer_key,
        },
        attempt::AttemptView,
    },
    state::SharedStore,
    utils::{
        html::{clean_html, clean_questions},
        jwt::Claims,
    },
};

/// Loads an assessment the caller owns. Someone else's assessment reads as missing.
pub(crate) async fn owned_assessment(
    store: &SharedStore,
    claims: &Claims,
    id: i64,
) -> Result<Assessment, AppError> {
    let assessment = store
        .get_assessment(id)
        .await?
        .ok_or(AppError::NotFound("Assessment not found".to_string()))?;

    if !claims.is_admin() && !assessment.is_owned_by(claims.user_id()?) {
        return Err(AppError::NotFound("Assessment not found".to_string()));
    }
    Ok(assessment)
}

/// Creates a quiz or assignment on a course the caller owns.
///
/// * Validates metadata, policy and the answer key.
/// * Copies the course category onto the assessment.
/// * `total_points` is derived from the questions, never taken from the request.
pub async fn create_assessment(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Json(mut payload): Json<CreateAssessmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    validate_answer_key(payload.kind, &payload.questions)?;
    payload.policy.check_for(payload.kind)?;

    let teacher_id = claims.user_id()?;
    let course = store
        .get_course(payload.course_id)
        .await?
        .ok_or(AppError::NotFound("Course not found".to_string()))?;

    if !claims.is_admin() && course.teacher_id != teacher_id {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    clean_questions(&mut payload.questions);

    let assessment = store
        .insert_assessment(NewAssessment {
            kind: payload.kind,
            course_id: course.id,
            teacher_id: course.teacher_id,
            category: course.category,
            title: clean_html(payload.title.trim()),
            topic: clean_html(payload.topic.trim()),
            description: payload.description.as_deref().map(clean_html),
            questions: payload.questions,
            policy: payload.policy,
            status: if payload.publish {
                AssessmentStatus::Published
            } else {
                AssessmentStatus::Draft
            },
        })
        .await?;

    tracing::info!(
        "Teacher {} created {} {} with {} questions",
        teacher_id,
        assessment.kind,
        assessment.id,
        assessment.questions.len()
    );

    Ok((StatusCode::CREATED, Json(assessment)))
}

/// Lists the caller's own assessments, answer keys included.
pub async fn list_my_assessments(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let assessments = store.list_assessments_by_teacher(claims.user_id()?).await?;
    Ok(Json(assessments))
}

/// Updates metadata, questions or policy. Owner only.
///
/// Archived assessments are frozen, and the answer key cannot be rewritten once
/// students have attempts against it. Both rules are enforced by the store in the
/// same step as the write.
pub async fn update_assessment(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateAssessmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let assessment = owned_assessment(&store, &claims, id).await?;

    if payload.is_empty() {
        return Ok(Json(assessment));
    }

    if let Some(policy) = &payload.policy {
        policy.validate()?;
        policy.check_for(assessment.kind)?;
    }
    let questions = match payload.questions {
        Some(mut questions) => {
            validate_answer_key(assessment.kind, &questions)?;
            clean_questions(&mut questions);
            Some(questions)
        }
        None => None,
    };

    let changes = AssessmentChanges {
        title: payload.title.map(|t| clean_html(t.trim())),
        topic: payload.topic.map(|t| clean_html(t.trim())),
        description: payload.description.as_deref().map(clean_html),
        policy: payload.policy,
        questions,
    };

    let saved = store.update_assessment(id, changes).await?;
    Ok(Json(saved))
}

async fn transition(
    store: &SharedStore,
    claims: &Claims,
    id: i64,
    next: AssessmentStatus,
) -> Result<Assessment, AppError> {
    let assessment = owned_assessment(store, claims, id).await?;

    if !assessment.status.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "Cannot move assessment from {} to {}",
            assessment.status.as_str(),
            next.as_str()
        )));
    }

    let saved = store
        .set_assessment_status(id, assessment.status, next)
        .await?
        .ok_or_else(|| {
            AppError::Conflict("Assessment status changed concurrently, please retry".to_string())
        })?;
    tracing::info!("Assessment {} is now {}", saved.id, saved.status.as_str());
    Ok(saved)
}

/// draft -> published.
pub async fn publish_assessment(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(transition(&store, &claims, id, AssessmentStatus::Published).await?))
}

/// draft|published -> archived. Attempts are kept.
pub async fn archive_assessment(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(transition(&store, &claims, id, AssessmentStatus::Archived).await?))
}

/// All attempts on an assessment plus a fresh rollup. Owner only.
pub async fn list_assessment_attempts(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let assessment = owned_assessment(&store, &claims, id).await?;
    let now = Utc::now();

    let attempts = store.list_attempts_for_assessment(id).await?;
    let analytics = analytics::summarize(&attempts, now);

    let attempts: Vec<AttemptView> = attempts
        .into_iter()
        .map(|attempt| AttemptView {
            display_status: lifecycle::display_status(&attempt, &assessment, now),
            attempt,
        })
        .collect();

    Ok(Json(json!({
        "assessment_id": assessment.id,
        "attempts": attempts,
        "analytics": analytics,
    })))
}

/// Published, active assessments in the categories the student is enrolled in.
/// Answer keys are redacted.
pub async fn list_available_assessments(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let categories = store.enrolled_categories(claims.user_id()?).await?;
    if categories.is_empty() {
        return Ok(Json(Vec::<PublicAssessment>::new()));
    }

    let available: Vec<PublicAssessment> = store
        .list_published_in_categories(&categories)
        .await?
        .iter()
        .filter(|a| a.policy.is_active)
        .map(PublicAssessment::from)
        .collect();

    Ok(Json(available))
}
