// src/handlers/enrollment.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppError,
    models::enrollment::{EnrollRequest, EnrollmentStatus, NewEnrollment, ReviewEnrollmentRequest},
    state::SharedStore,
    utils::jwt::Claims,
};

/// A student asks to join a course, attaching the payment proof link.
/// The enrollment stays `pending` until the course teacher reviews it.
pub async fn request_enrollment(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<EnrollRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let course = store
        .get_course(payload.course_id)
        .await?
        .ok_or(AppError::NotFound("Course not found".to_string()))?;

    let enrollment = store
        .create_enrollment(NewEnrollment {
            student_id: claims.user_id()?,
            course_id: course.id,
            category: course.category,
            payment_proof_url: payload.payment_proof_url,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// Lists the caller's enrollments.
pub async fn list_my_enrollments(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let enrollments = store.list_enrollments_for_student(claims.user_id()?).await?;
    Ok(Json(enrollments))
}

/// Verifies or rejects an enrollment.
/// Only the teacher owning the course (or an admin) may review it.
pub async fn review_enrollment(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<ReviewEnrollmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let not_found = || AppError::NotFound("Enrollment not found".to_string());

    let enrollment = store.get_enrollment(id).await?.ok_or_else(not_found)?;
    let course = store.get_course(enrollment.course_id).await?.ok_or_else(not_found)?;

    if !claims.is_admin() && course.teacher_id != claims.user_id()? {
        return Err(not_found());
    }

    let (status, is_active) = if payload.approve {
        (EnrollmentStatus::Verified, true)
    } else {
        (EnrollmentStatus::Rejected, false)
    };

    let updated = store
        .review_enrollment(id, status, is_active, Utc::now())
        .await?
        .ok_or_else(not_found)?;

    tracing::info!(
        "Enrollment {} for student {} marked {}",
        updated.id,
        updated.student_id,
        updated.status.as_str()
    );

    Ok((StatusCode::OK, Json(updated)))
}
