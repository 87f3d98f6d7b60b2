use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::db::PgRow;

/// One flag submission. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub user_id: String,
    pub challenge_id: String,
    pub flag: String,
    pub is_correct: bool,
    pub points: i32,
    pub submitted_at: DateTime<Utc>,
}

impl Submission {
    pub fn from_row(row: PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            challenge_id: row.try_get("challenge_id")?,
            flag: row.try_get("flag")?,
            is_correct: row.try_get("is_correct")?,
            points: row.try_get("points")?,
            submitted_at: row.try_get("submitted_at")?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitFlagRequest {
    pub challenge_id: String,
    pub flag: String,
}
