// src/models/question.rs

use serde::{Deserialize, Serialize};

/// A multiple-choice question as stored, answer key included.
///
/// This struct never crosses the API boundary before submission; the
/// learner-facing shape is [`PublicQuestion`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub course_id: i64,

    /// Position of the question within the paper.
    pub question_number: i32,

    pub text: String,

    /// 2 to 6 options.
    pub options: Vec<String>,

    /// Index into `options` of the correct answer.
    pub correct_option: i32,
}

impl Question {
    pub fn public(&self) -> PublicQuestion {
        PublicQuestion {
            id: self.id,
            question_number: self.question_number,
            text: self.text.clone(),
            options: self.options.clone(),
        }
    }
}

/// DTO for sending a question to the learner (answer key withheld).
#[derive(Debug, Clone, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub question_number: i32,
    pub text: String,
    pub options: Vec<String>,
}

/// The paper served when a learner opens an exam.
#[derive(Debug, Clone, Serialize)]
pub struct ExamPaper {
    pub course_id: i64,
    pub course_title: String,
    pub exam_duration_minutes: i64,
    pub pass_score: i64,
    pub total_questions: usize,
    pub questions: Vec<PublicQuestion>,
}
