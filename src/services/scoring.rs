// src/services/scoring.rs

use std::collections::HashSet;

use crate::models::attempt::Answer;
use crate::models::question::Question;

/// Result of scoring one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreCard {
    pub correct_count: usize,
    pub total_questions: usize,
    /// Percentage, rounded to the nearest integer.
    pub score: i64,
    pub passed: bool,
}

/// Scores a submission against the course's question snapshot.
///
/// Pure and total: an answer earns credit iff its question id exists in
/// the snapshot and the chosen index equals the correct option. Unknown
/// ids, out-of-range choices and duplicate answers for one question
/// (only the first counts) are all zero-credit, never errors. An empty
/// snapshot scores 0 and cannot pass.
pub fn score_submission(answers: &[Answer], questions: &[Question], pass_score: i64) -> ScoreCard {
    let total_questions = questions.len();
    if total_questions == 0 {
        return ScoreCard {
            correct_count: 0,
            total_questions: 0,
            score: 0,
            passed: false,
        };
    }

    let mut seen: HashSet<i64> = HashSet::new();
    let mut correct_count = 0;
    for answer in answers {
        if !seen.insert(answer.question_id) {
            continue;
        }
        let matched = questions
            .iter()
            .any(|q| q.id == answer.question_id && q.correct_option == answer.choice_index);
        if matched {
            correct_count += 1;
        }
    }

    let score = ((correct_count as f64 / total_questions as f64) * 100.0).round() as i64;
    ScoreCard {
        correct_count,
        total_questions,
        score,
        passed: score >= pass_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: i64, correct: i32) -> Question {
        Question {
            id,
            course_id: 1,
            question_number: id as i32,
            text: format!("Question {}", id),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_option: correct,
        }
    }

    fn answer(question_id: i64, choice_index: i32) -> Answer {
        Answer {
            question_id,
            choice_index,
        }
    }

    #[test]
    fn three_of_four_scores_seventy_five() {
        let questions: Vec<_> = (1..=4).map(|i| question(i, 0)).collect();
        let answers = vec![answer(1, 0), answer(2, 0), answer(3, 0), answer(4, 2)];

        let card = score_submission(&answers, &questions, 60);
        assert_eq!(card.correct_count, 3);
        assert_eq!(card.total_questions, 4);
        assert_eq!(card.score, 75);
        assert!(card.passed);
    }

    #[test]
    fn score_is_rounded_to_nearest_integer() {
        // 1 of 3 correct = 33.33... -> 33; 2 of 3 = 66.66... -> 67.
        let questions: Vec<_> = (1..=3).map(|i| question(i, 1)).collect();

        let card = score_submission(&[answer(1, 1)], &questions, 60);
        assert_eq!(card.score, 33);
        assert!(!card.passed);

        let card = score_submission(&[answer(1, 1), answer(2, 1)], &questions, 60);
        assert_eq!(card.score, 67);
        assert!(card.passed);
    }

    #[test]
    fn pass_is_inclusive_of_the_threshold() {
        let questions: Vec<_> = (1..=5).map(|i| question(i, 0)).collect();
        let answers: Vec<_> = (1..=3).map(|i| answer(i, 0)).collect();

        let card = score_submission(&answers, &questions, 60);
        assert_eq!(card.score, 60);
        assert!(card.passed);

        let card = score_submission(&answers, &questions, 61);
        assert!(!card.passed);
    }

    #[test]
    fn unknown_and_malformed_answers_earn_nothing() {
        let questions = vec![question(1, 2), question(2, 3)];
        let answers = vec![
            answer(99, 2),  // unknown question
            answer(1, -1),  // out of range
            answer(2, 3),   // correct
        ];

        let card = score_submission(&answers, &questions, 60);
        assert_eq!(card.correct_count, 1);
        assert_eq!(card.score, 50);
    }

    #[test]
    fn duplicate_answers_count_once() {
        let questions = vec![question(1, 0), question(2, 0)];
        let answers = vec![answer(1, 0), answer(1, 0), answer(1, 0)];

        let card = score_submission(&answers, &questions, 60);
        assert_eq!(card.correct_count, 1);
        assert_eq!(card.score, 50);
    }

    #[test]
    fn empty_snapshot_scores_zero_and_fails() {
        let card = score_submission(&[answer(1, 0)], &[], 0);
        assert_eq!(card.score, 0);
        assert_eq!(card.total_questions, 0);
        assert!(!card.passed);
    }

    #[test]
    fn empty_submission_scores_zero() {
        let questions: Vec<_> = (1..=4).map(|i| question(i, 0)).collect();
        let card = score_submission(&[], &questions, 60);
        assert_eq!(card.correct_count, 0);
        assert_eq!(card.score, 0);
        assert!(!card.passed);
    }
}
