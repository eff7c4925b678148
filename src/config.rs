// src/config.rs

use std::env;
use dotenvy::dotenv;

use crate::engine::grading::ScoringBasis;

/// Upper bound on questions in a quiz answer key.
pub const MAX_QUIZ_QUESTIONS: usize = 50;

/// Upper bound on questions in an assignment answer key.
pub const MAX_ASSIGNMENT_QUESTIONS: usize = 20;

/// Late penalties are percentages capped at this value.
pub const MAX_LATE_PENALTY: i32 = 50;

/// How many times `start_attempt` re-runs the gate after losing an attempt-number race.
pub const START_ATTEMPT_RETRIES: usize = 3;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. When absent the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub log_dir: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub scoring_basis: ScoringBasis,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let jwt_secret = env::var("JWT_SECRET")
            .expect("JWT_SECRET must be set");

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(86_400);

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string());

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ]
            });

        let scoring_basis = match env::var("SCORING_BASIS") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("Unknown SCORING_BASIS '{}', falling back to answer_key", raw);
                ScoringBasis::default()
            }),
            Err(_) => ScoringBasis::default(),
        };

        Self {
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            log_dir,
            port,
            cors_origins,
            scoring_basis,
            admin_email: env::var("ADMIN_EMAIL").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
        }
    }
}
