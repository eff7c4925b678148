// src/handlers/course.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use validator::Validate;

use crate::{
    error::AppError,
    models::course::{CreateCourseRequest, NewCourse},
    state::SharedStore,
    utils::{html::clean_html, jwt::Claims},
};

/// Lists all courses.
pub async fn list_courses(State(store): State<SharedStore>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(store.list_courses().await?))
}

/// Creates a course owned by the calling teacher.
pub async fn create_course(
    State(store): State<SharedStore>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let course = store
        .create_course(NewCourse {
            teacher_id: claims.user_id()?,
            title: clean_html(payload.title.trim()),
            category: payload.category.trim().to_string(),
            description: payload.description.as_deref().map(clean_html),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(course)))
}
