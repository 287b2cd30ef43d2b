// src/models/course.rs

use serde::{Deserialize, Serialize};

/// The slice of a course the exam engine needs: its title for the
/// certificate, and the exam parameters. Content modeling lives in the
/// surrounding application.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseExam {
    pub id: i64,
    pub title: String,
    pub exam_duration_minutes: i64,
    pub exam_pass_score: i64,
}
