use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::db::PgRow;

pub const CATEGORIES: &[&str] = &["Web", "Pwn", "Crypto", "Reverse", "Misc"];
pub const DIFFICULTIES: &[&str] = &["Easy", "Medium", "Hard"];

/// A challenge template: image, port, points and the flag template. The flag
/// never serializes on the user surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub title: String,
    pub description: String,
    pub hint: String,
    pub category: String,
    pub difficulty: String,
    /// Image short form, kept alongside `image_id` for compatibility.
    pub image: String,
    pub image_id: String,
    pub docker_host_id: String,
    pub port: i32,
    pub memory_limit: i64,
    pub cpu_limit: f64,
    pub privileged: bool,
    #[serde(skip_serializing)]
    pub flag: String,
    pub points: i32,
    pub status: String,
    pub published_at: Option<DateTime<Utc>>,
    pub unpublished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Challenge {
    pub fn from_row(row: PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            hint: row.try_get("hint")?,
            category: row.try_get("category")?,
            difficulty: row.try_get("difficulty")?,
            image: row.try_get("image")?,
            image_id: row.try_get("image_id")?,
            docker_host_id: row.try_get("docker_host_id")?,
            port: row.try_get("port")?,
            memory_limit: row.try_get("memory_limit")?,
            cpu_limit: row.try_get("cpu_limit")?,
            privileged: row.try_get("privileged")?,
            flag: row.try_get("flag")?,
            points: row.try_get("points")?,
            status: row.try_get("status")?,
            published_at: row.try_get("published_at")?,
            unpublished_at: row.try_get("unpublished_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Administrative view: same row, flag included.
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeAdminView {
    #[serde(flatten)]
    pub challenge: Challenge,
    pub flag: String,
}

impl From<Challenge> for ChallengeAdminView {
    fn from(challenge: Challenge) -> Self {
        let flag = challenge.flag.clone();
        Self { challenge, flag }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChallengeRequest {
    pub title: String,
    #[serde(rename = "descriptionHtml", default)]
    pub description_html: String,
    #[serde(rename = "hintHtml", default)]
    pub hint_html: String,
    pub category: String,
    pub difficulty: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub image_id: String,
    #[serde(default)]
    pub docker_host_id: String,
    pub port: i32,
    #[serde(default)]
    pub memory_limit: i64,
    #[serde(default)]
    pub cpu_limit: f64,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub flag: String,
    pub points: i32,
    #[serde(default)]
    pub status: String,
}

impl ChallengeRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("题目标题不能为空".to_string());
        }
        if !CATEGORIES.iter().any(|c| c.eq_ignore_ascii_case(&self.category)) {
            return Err("题目分类无效".to_string());
        }
        if !DIFFICULTIES.iter().any(|d| d.eq_ignore_ascii_case(&self.difficulty)) {
            return Err("难度级别无效".to_string());
        }
        if !(1..=65535).contains(&self.port) {
            return Err("端口必须在 1-65535 之间".to_string());
        }
        if !(1..=10000).contains(&self.points) {
            return Err("分值必须在 1-10000 之间".to_string());
        }
        if !self.status.is_empty() && self.status != "published" && self.status != "unpublished" {
            return Err("状态必须是 published 或 unpublished".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChallengeStatusRequest {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ChallengeRequest {
        ChallengeRequest {
            title: "SQL 注入入门".to_string(),
            description_html: String::new(),
            hint_html: String::new(),
            category: "Web".to_string(),
            difficulty: "Easy".to_string(),
            image: "nginx:alpine".to_string(),
            image_id: String::new(),
            docker_host_id: String::new(),
            port: 80,
            memory_limit: 0,
            cpu_limit: 0.0,
            privileged: false,
            flag: "flag{template}".to_string(),
            points: 100,
            status: String::new(),
        }
    }

    #[test]
    fn accepts_sane_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn category_is_case_insensitive() {
        let mut req = request();
        req.category = "web".to_string();
        assert!(req.validate().is_ok());
        req.category = "Trivia".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_points_and_port() {
        let mut req = request();
        req.points = 0;
        assert!(req.validate().is_err());
        req.points = 10001;
        assert!(req.validate().is_err());

        let mut req = request();
        req.port = 0;
        assert!(req.validate().is_err());
        req.port = 70000;
        assert!(req.validate().is_err());
    }

    #[test]
    fn rejects_unknown_status() {
        let mut req = request();
        req.status = "archived".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn user_serialization_hides_flag() {
        let challenge = Challenge {
            id: "c1".to_string(),
            title: "t".to_string(),
            description: String::new(),
            hint: String::new(),
            category: "Web".to_string(),
            difficulty: "Easy".to_string(),
            image: "nginx:alpine".to_string(),
            image_id: String::new(),
            docker_host_id: String::new(),
            port: 80,
            memory_limit: 0,
            cpu_limit: 0.0,
            privileged: false,
            flag: "flag{secret}".to_string(),
            points: 100,
            status: "published".to_string(),
            published_at: None,
            unpublished_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let user_json = serde_json::to_value(&challenge).unwrap();
        assert!(user_json.get("flag").is_none());

        let admin_json = serde_json::to_value(ChallengeAdminView::from(challenge)).unwrap();
        assert_eq!(admin_json["flag"], "flag{secret}");
    }
}
