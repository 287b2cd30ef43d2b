// src/models/user.rs

use serde::{Deserialize, Serialize};

/// Certificate recipient identity. Account management is the
/// surrounding application's concern; the engine only reads this.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Learner {
    pub id: i64,
    pub name: String,
    pub email: String,
}
