// src/engine/analytics.rs

use chrono::{DateTime, Utc};

use crate::models::{
    assessment::AnalyticsSummary,
    attempt::{Attempt, AttemptStatus},
};

/// Full re-aggregation over the finalized attempts of one assessment.
/// In-progress attempts are skipped. All figures are 0 when nothing is finalized.
pub fn summarize(attempts: &[Attempt], now: DateTime<Utc>) -> AnalyticsSummary {
    let finalized: Vec<&Attempt> = attempts.iter().filter(|a| a.status.is_terminal()).collect();

    let submissions_late = finalized
        .iter()
        .filter(|a| a.status == AttemptStatus::Late)
        .count() as i32;
    let total_attempts = finalized.len() as i32;

    let scores: Vec<i32> = finalized.iter().map(|a| a.score.percentage).collect();
    let average_score = if scores.is_empty() {
        0.0
    } else {
        let mean = scores.iter().map(|&s| s as f64).sum::<f64>() / scores.len() as f64;
        (mean * 100.0).round() / 100.0
    };

    AnalyticsSummary {
        total_attempts,
        submissions_on_time: total_attempts - submissions_late,
        submissions_late,
        average_score,
        highest_score: scores.iter().copied().max().unwrap_or(0),
        lowest_score: scores.iter().copied().min().unwrap_or(0),
        updated_at: Some(now),
    }
}
