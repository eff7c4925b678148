// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{assessment, attempt, auth, course, enrollment},
    state::AppState,
    utils::jwt::{auth_middleware, student_middleware, teacher_middleware},
};

/// Assembles the main application router.
///
/// * Public routes: auth, course catalogue.
/// * Teacher routes: authoring, enrollment review, attempt review and feedback.
/// * Student routes: enrollment requests, available assessments, attempts.
/// * Applies global middleware (Trace, CORS) and injects `AppState`.
pub fn create_router(state: AppState) -> Router {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_layer = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let course_routes = Router::new()
        .route("/", get(course::list_courses))
        .merge(
            Router::new()
                .route("/", post(course::create_course))
                .layer(middleware::from_fn(teacher_middleware))
                .layer(auth_layer.clone()),
        );

    // Teacher-only routes. Auth runs first, then the role check.
    let teacher_routes = Router::new()
        .route("/assessments", post(assessment::create_assessment))
        .route("/assessments/mine", get(assessment::list_my_assessments))
        .route("/assessments/{id}", put(assessment::update_assessment))
        .route("/assessments/{id}/publish", post(assessment::publish_assessment))
        .route("/assessments/{id}/archive", post(assessment::archive_assessment))
        .route("/assessments/{id}/attempts", get(assessment::list_assessment_attempts))
        .route("/attempts/{id}/feedback", put(attempt::provide_feedback))
        .route("/enrollments/{id}/review", put(enrollment::review_enrollment))
        .layer(middleware::from_fn(teacher_middleware))
        .layer(auth_layer.clone());

    let student_routes = Router::new()
        .route("/enrollments", post(enrollment::request_enrollment))
        .route("/enrollments/mine", get(enrollment::list_my_enrollments))
        .route("/assessments/available", get(assessment::list_available_assessments))
        .route("/assessments/{id}/start", post(attempt::start_attempt))
        .route("/attempts/mine", get(attempt::list_my_attempts))
        .route("/attempts/{id}", get(attempt::get_attempt))
        .route("/attempts/{id}/submit", post(attempt::submit_attempt))
        .layer(middleware::from_fn(student_middleware))
        .layer(auth_layer);

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/courses", course_routes)
        .nest("/api", teacher_routes.merge(student_routes))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
