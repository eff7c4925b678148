// src/engine/grading.rs

//! Scores a set of responses against an answer key.
//!
//! Everything here is pure: no clock, no I/O. Identical inputs give identical output.

use std::{collections::HashMap, str::FromStr};

use crate::models::{
    assessment::{PolicySet, Question},
    attempt::{AnswerEntry, QuestionResponse, ScoreSummary},
};

/// Which denominator `percentage` is computed against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScoringBasis {
    /// Sum of every question's points in the answer key.
    #[default]
    AnswerKey,
    /// Sum of the points actually earned. Reproduces the legacy LMS figures,
    /// which report 100% whenever every answered question scored.
    EarnedOnly,
}

impl FromStr for ScoringBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "answer_key" => Ok(ScoringBasis::AnswerKey),
            "earned_only" => Ok(ScoringBasis::EarnedOnly),
            other => Err(format!("unknown scoring basis '{}'", other)),
        }
    }
}

/// Output of grading: the filled answers array and its summary.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedAttempt {
    pub answers: Vec<AnswerEntry>,
    pub score: ScoreSummary,
}

/// Grades `responses` against `key`.
///
/// The answers array is built parallel to the key (sorted by question number).
/// Responses naming a question the key does not have are ignored. When several
/// responses name the same question the last one wins; callers reject duplicates
/// before getting here.
pub fn grade(
    responses: &[QuestionResponse],
    key: &[Question],
    policy: &PolicySet,
    is_late: bool,
    basis: ScoringBasis,
) -> GradedAttempt {
    let selected: HashMap<i32, _> = responses
        .iter()
        .map(|r| (r.question_number, r.selected_option))
        .collect();

    let mut ordered: Vec<&Question> = key.iter().collect();
    ordered.sort_by_key(|q| q.number);

    let answers: Vec<AnswerEntry> = ordered
        .iter()
        .map(|q| {
            let selected_option = selected.get(&q.number).copied().flatten();
            let is_correct = selected_option == Some(q.correct_option);
            AnswerEntry {
                question_number: q.number,
                selected_option,
                is_correct,
                points_earned: if is_correct { q.points } else { 0 },
            }
        })
        .collect();

    let score = summarize(&answers, key, policy, is_late, basis);
    GradedAttempt { answers, score }
}

fn summarize(
    answers: &[AnswerEntry],
    key: &[Question],
    policy: &PolicySet,
    is_late: bool,
    basis: ScoringBasis,
) -> ScoreSummary {
    let correct_answers = answers.iter().filter(|a| a.is_correct).count() as i32;
    let unattempted = answers.iter().filter(|a| a.selected_option.is_none()).count() as i32;
    let wrong_answers = answers
        .iter()
        .filter(|a| a.selected_option.is_some() && !a.is_correct)
        .count() as i32;

    let earned_points: i32 = answers.iter().map(|a| a.points_earned).sum();
    let total_points: i32 = match basis {
        ScoringBasis::AnswerKey => key.iter().map(|q| q.points).sum(),
        ScoringBasis::EarnedOnly => answers
            .iter()
            .filter(|a| a.points_earned > 0)
            .map(|a| a.points_earned)
            .sum(),
    };

    let percentage = if total_points > 0 {
        (100.0 * earned_points as f64 / total_points as f64).round() as i32
    } else {
        0
    };

    let (late_penalty, final_score) = apply_late_penalty(earned_points, policy, is_late);

    ScoreSummary {
        total_questions: answers.len() as i32,
        correct_answers,
        wrong_answers,
        unattempted,
        total_points,
        earned_points,
        percentage,
        late_penalty,
        final_score,
    }
}

/// Returns `(late_penalty, final_score)`. The final score never drops below zero.
pub fn apply_late_penalty(earned_points: i32, policy: &PolicySet, is_late: bool) -> (f64, f64) {
    let earned = earned_points as f64;
    if !is_late {
        return (0.0, earned);
    }
    let penalty = earned * policy.late_submission_penalty as f64 / 100.0;
    (penalty, (earned - penalty).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::assessment::{OptionLabel, fixtures::question};

    fn two_question_key() -> Vec<Question> {
        vec![question(1, OptionLabel::A, 2), question(2, OptionLabel::B, 3)]
    }

    fn respond(picks: &[Option<OptionLabel>]) -> Vec<QuestionResponse> {
        picks
            .iter()
            .enumerate()
            .map(|(i, pick)| QuestionResponse {
                question_number: i as i32 + 1,
                selected_option: *pick,
            })
            .collect()
    }

    #[test]
    fn one_right_one_wrong_earned_only() {
        let graded = grade(
            &respond(&[Some(OptionLabel::A), Some(OptionLabel::C)]),
            &two_question_key(),
            &PolicySet::default(),
            false,
            ScoringBasis::EarnedOnly,
        );
        let s = graded.score;
        assert_eq!(s.correct_answers, 1);
        assert_eq!(s.wrong_answers, 1);
        assert_eq!(s.unattempted, 0);
        assert_eq!(s.earned_points, 2);
        assert_eq!(s.total_points, 2);
        assert_eq!(s.percentage, 100);
    }

    #[test]
    fn unanswered_question_under_both_bases() {
        let responses = respond(&[Some(OptionLabel::A), None]);
        let key = two_question_key();
        let policy = PolicySet::default();

        let legacy = grade(&responses, &key, &policy, false, ScoringBasis::EarnedOnly).score;
        assert_eq!(legacy.unattempted, 1);
        assert_eq!(legacy.earned_points, 2);
        assert_eq!(legacy.percentage, 100);

        let corrected = grade(&responses, &key, &policy, false, ScoringBasis::AnswerKey).score;
        assert_eq!(corrected.unattempted, 1);
        assert_eq!(corrected.total_points, 5);
        assert_eq!(corrected.percentage, 40);
    }

    #[test]
    fn late_penalty_is_a_percentage_of_earned_points() {
        let key: Vec<Question> = (1..=5).map(|n| question(n, OptionLabel::D, 2)).collect();
        let policy = PolicySet {
            allow_late_submission: true,
            late_submission_penalty: 20,
            ..PolicySet::default()
        };
        let all_d = respond(&[Some(OptionLabel::D); 5]);

        let s = grade(&all_d, &key, &policy, true, ScoringBasis::AnswerKey).score;
        assert_eq!(s.earned_points, 10);
        assert_eq!(s.late_penalty, 2.0);
        assert_eq!(s.final_score, 8.0);

        let on_time = grade(&all_d, &key, &policy, false, ScoringBasis::AnswerKey).score;
        assert_eq!(on_time.late_penalty, 0.0);
        assert_eq!(on_time.final_score, 10.0);
    }

    #[test]
    fn unknown_question_numbers_are_ignored() {
        let mut responses = respond(&[Some(OptionLabel::A)]);
        responses.push(QuestionResponse {
            question_number: 99,
            selected_option: Some(OptionLabel::B),
        });
        let graded = grade(
            &responses,
            &two_question_key(),
            &PolicySet::default(),
            false,
            ScoringBasis::AnswerKey,
        );
        assert_eq!(graded.answers.len(), 2);
        assert_eq!(graded.answers[1].selected_option, None);
        assert_eq!(graded.score.unattempted, 1);
    }

    #[test]
    fn answers_follow_key_order_even_if_key_is_unsorted() {
        let key = vec![question(2, OptionLabel::B, 3), question(1, OptionLabel::A, 2)];
        let graded = grade(
            &respond(&[Some(OptionLabel::A), Some(OptionLabel::B)]),
            &key,
            &PolicySet::default(),
            false,
            ScoringBasis::AnswerKey,
        );
        let numbers: Vec<i32> = graded.answers.iter().map(|a| a.question_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(graded.score.percentage, 100);
    }

    #[test]
    fn percentage_stays_within_bounds() {
        let key: Vec<Question> = (1..=4).map(|n| question(n, OptionLabel::B, n)).collect();
        let picks = [
            None,
            Some(OptionLabel::A),
            Some(OptionLabel::B),
            Some(OptionLabel::C),
            Some(OptionLabel::D),
        ];
        for basis in [ScoringBasis::AnswerKey, ScoringBasis::EarnedOnly] {
            for a in picks {
                for b in picks {
                    let responses = respond(&[a, b, Some(OptionLabel::B), None]);
                    let s = grade(&responses, &key, &PolicySet::default(), false, basis).score;
                    assert!((0..=100).contains(&s.percentage), "{:?}", s);
                    assert_eq!(
                        s.correct_answers + s.wrong_answers + s.unattempted,
                        s.total_questions
                    );
                }
            }
        }
    }

    #[test]
    fn grading_is_deterministic() {
        let responses = respond(&[Some(OptionLabel::A), Some(OptionLabel::D)]);
        let key = two_question_key();
        let policy = PolicySet {
            late_submission_penalty: 15,
            ..PolicySet::default()
        };
        let first = grade(&responses, &key, &policy, true, ScoringBasis::AnswerKey);
        let second = grade(&responses, &key, &policy, true, ScoringBasis::AnswerKey);
        assert_eq!(first, second);
    }

    #[test]
    fn final_score_does_not_increase_with_penalty() {
        let mut previous = f64::INFINITY;
        for penalty in 0..=50 {
            let policy = PolicySet {
                late_submission_penalty: penalty,
                ..PolicySet::default()
            };
            let (_, final_score) = apply_late_penalty(7, &policy, true);
            assert!(final_score <= previous);
            assert!(final_score >= 0.0);
            previous = final_score;
        }
    }

    #[test]
    fn empty_key_scores_zero_percent() {
        let s = grade(&[], &[], &PolicySet::default(), false, ScoringBasis::AnswerKey).score;
        assert_eq!(s.percentage, 0);
        assert_eq!(s.total_questions, 0);
    }

    #[test]
    fn scoring_basis_parses_from_config_values() {
        assert_eq!("answer_key".parse::<ScoringBasis>().unwrap(), ScoringBasis::AnswerKey);
        assert_eq!("earned_only".parse::<ScoringBasis>().unwrap(), ScoringBasis::EarnedOnly);
        assert!("everything".parse::<ScoringBasis>().is_err());
    }
}
