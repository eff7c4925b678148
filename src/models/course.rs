// src/models/course.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Represents the 'courses' table in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    /// Owning teacher.
    pub teacher_id: i64,
    pub title: String,
    /// Enrollment and assessment visibility are matched on this value.
    pub category: String,
    pub description: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCourse {
    pub teacher_id: i64,
    pub title: String,
    pub category: String,
    pub description: Option<String>,
}

/// DTO for creating a new course.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Title length must be between 1 and 200 chars"
    ))]
    pub title: String,
    #[validate(length(
        min = 1,
        max = 100,
        message = "Category length must be between 1 and 100 chars"
    ))]
    pub category: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
}
