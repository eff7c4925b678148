// src/models/enrollment.rs

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    Pending,
    Verified,
    Rejected,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Verified => "verified",
            EnrollmentStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for EnrollmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EnrollmentStatus::Pending),
            "verified" => Ok(EnrollmentStatus::Verified),
            "rejected" => Ok(EnrollmentStatus::Rejected),
            other => Err(format!("unknown enrollment status '{}'", other)),
        }
    }
}

/// Represents the 'enrollments' table.
/// A student gains access to a category's assessments once a teacher verifies the payment proof.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub student_id: i64,
    pub course_id: i64,
    /// Copied from the course when the enrollment is requested.
    pub category: String,
    pub status: EnrollmentStatus,
    pub is_active: bool,
    pub payment_proof_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub reviewed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Enrollment {
    /// Whether this enrollment grants access to `category`.
    pub fn grants(&self, category: &str) -> bool {
        self.status == EnrollmentStatus::Verified && self.is_active && self.category == category
    }
}

#[derive(Debug, Clone)]
pub struct NewEnrollment {
    pub student_id: i64,
    pub course_id: i64,
    pub category: String,
    pub payment_proof_url: Option<String>,
}

/// DTO for a student requesting enrollment.
#[derive(Debug, Deserialize, Validate)]
pub struct EnrollRequest {
    pub course_id: i64,

    /// Link to the uploaded payment screenshot.
    #[validate(length(max = 2048), custom(function = validate_proof_url))]
    pub payment_proof_url: Option<String>,
}

fn validate_proof_url(url: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_payment_proof_url"));
    }
    Ok(())
}

/// DTO for the teacher's verdict on an enrollment.
#[derive(Debug, Deserialize)]
pub struct ReviewEnrollmentRequest {
    pub approve: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn enrollment(status: EnrollmentStatus, is_active: bool) -> Enrollment {
        Enrollment {
            id: 1,
            student_id: 7,
            course_id: 3,
            category: "rust".into(),
            status,
            is_active,
            payment_proof_url: None,
            created_at: Utc::now(),
            reviewed_at: None,
        }
    }

    #[test]
    fn only_verified_active_enrollments_grant_access() {
        assert!(enrollment(EnrollmentStatus::Verified, true).grants("rust"));
        assert!(!enrollment(EnrollmentStatus::Verified, true).grants("go"));
        assert!(!enrollment(EnrollmentStatus::Verified, false).grants("rust"));
        assert!(!enrollment(EnrollmentStatus::Pending, true).grants("rust"));
    }

    #[test]
    fn proof_url_must_parse() {
        let bad = EnrollRequest {
            course_id: 1,
            payment_proof_url: Some("not a url".into()),
        };
        assert!(bad.validate().is_err());

        let good = EnrollRequest {
            course_id: 1,
            payment_proof_url: Some("https://cdn.example.com/proof.png".into()),
        };
        assert!(good.validate().is_ok());
    }
}
