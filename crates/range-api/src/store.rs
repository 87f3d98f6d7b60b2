//! Query layer over the authoritative store. Row mapping lives on the
//! models; this module owns the SQL.

use chrono::Utc;
use serde::Serialize;
use sqlx::{Postgres, QueryBuilder, Row};

use crate::db::PgPool;
use crate::models::admin::Admin;
use crate::models::challenge::Challenge;
use crate::models::host::DockerHost;
use crate::models::image::DockerImage;
use crate::models::instance::{Instance, InstanceWithChallenge};
use crate::models::submission::Submission;

// ===== Docker hosts =====

pub async fn get_host(pool: &PgPool, id: &str) -> Result<Option<DockerHost>, sqlx::Error> {
    sqlx::query("SELECT * FROM docker_hosts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(DockerHost::from_row)
        .transpose()
}

/// The single enabled default host. The default predicate never matches more
/// than one row; writes clear competing flags in the same transaction.
pub async fn get_default_host(pool: &PgPool) -> Result<Option<DockerHost>, sqlx::Error> {
    sqlx::query("SELECT * FROM docker_hosts WHERE is_default = TRUE AND enabled = TRUE")
        .fetch_optional(pool)
        .await?
        .map(DockerHost::from_row)
        .transpose()
}

pub async fn list_hosts(
    pool: &PgPool,
    enabled_only: bool,
) -> Result<Vec<DockerHost>, sqlx::Error> {
    let sql = if enabled_only {
        "SELECT * FROM docker_hosts WHERE enabled = TRUE ORDER BY is_default DESC, created_at ASC"
    } else {
        "SELECT * FROM docker_hosts ORDER BY is_default DESC, created_at ASC"
    };
    sqlx::query(sql)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(DockerHost::from_row)
        .collect()
}

pub async fn insert_host(pool: &PgPool, host: &DockerHost) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    if host.is_default {
        sqlx::query("UPDATE docker_hosts SET is_default = FALSE WHERE is_default = TRUE")
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query(
        r#"INSERT INTO docker_hosts
           (id, name, host, tls_verify, cert_path, port_range_min, port_range_max,
            memory_limit, cpu_limit, enabled, is_default, description, created_at, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
    )
    .bind(&host.id)
    .bind(&host.name)
    .bind(&host.host)
    .bind(host.tls_verify)
    .bind(&host.cert_path)
    .bind(host.port_range_min)
    .bind(host.port_range_max)
    .bind(host.memory_limit)
    .bind(host.cpu_limit)
    .bind(host.enabled)
    .bind(host.is_default)
    .bind(&host.description)
    .bind(host.created_at)
    .bind(host.updated_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await
}

pub async fn update_host(pool: &PgPool, host: &DockerHost) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    if host.is_default {
        sqlx::query("UPDATE docker_hosts SET is_default = FALSE WHERE is_default = TRUE AND id != $1")
            .bind(&host.id)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query(
        r#"UPDATE docker_hosts SET
           name = $2, host = $3, tls_verify = $4, cert_path = $5, port_range_min = $6,
           port_range_max = $7, memory_limit = $8, cpu_limit = $9, enabled = $10,
           is_default = $11, description = $12, updated_at = now()
           WHERE id = $1"#,
    )
    .bind(&host.id)
    .bind(&host.name)
    .bind(&host.host)
    .bind(host.tls_verify)
    .bind(&host.cert_path)
    .bind(host.port_range_min)
    .bind(host.port_range_max)
    .bind(host.memory_limit)
    .bind(host.cpu_limit)
    .bind(host.enabled)
    .bind(host.is_default)
    .bind(&host.description)
    .execute(&mut *tx)
    .await?;
    tx.commit().await
}

pub async fn delete_host(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM docker_hosts WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn toggle_host(pool: &PgPool, id: &str) -> Result<Option<DockerHost>, sqlx::Error> {
    sqlx::query(
        "UPDATE docker_hosts SET enabled = NOT enabled, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .map(DockerHost::from_row)
    .transpose()
}

pub async fn count_challenges_for_host(pool: &PgPool, host_id: &str) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) FROM challenges WHERE docker_host_id = $1")
        .bind(host_id)
        .fetch_one(pool)
        .await?;
    row.try_get(0)
}

// ===== Challenges =====

pub async fn get_challenge(pool: &PgPool, id: &str) -> Result<Option<Challenge>, sqlx::Error> {
    sqlx::query("SELECT * FROM challenges WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Challenge::from_row)
        .transpose()
}

pub async fn list_published_challenges(pool: &PgPool) -> Result<Vec<Challenge>, sqlx::Error> {
    sqlx::query("SELECT * FROM challenges WHERE status = 'published' ORDER BY created_at ASC")
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Challenge::from_row)
        .collect()
}

#[derive(Debug, Default, Clone)]
pub struct ChallengeFilter {
    pub category: Option<String>,
    pub difficulty: Option<String>,
    pub status: Option<String>,
    /// Substring match on the title.
    pub search: Option<String>,
}

fn push_challenge_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ChallengeFilter) {
    if let Some(category) = &filter.category {
        qb.push(" AND category = ").push_bind(category.clone());
    }
    if let Some(difficulty) = &filter.difficulty {
        qb.push(" AND difficulty = ").push_bind(difficulty.clone());
    }
    if let Some(status) = &filter.status {
        qb.push(" AND status = ").push_bind(status.clone());
    }
    if let Some(search) = &filter.search {
        qb.push(" AND title LIKE ").push_bind(format!("%{search}%"));
    }
}

pub async fn list_challenges(
    pool: &PgPool,
    filter: &ChallengeFilter,
    page: i64,
    page_size: i64,
) -> Result<(Vec<Challenge>, i64), sqlx::Error> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM challenges WHERE 1=1");
    push_challenge_filters(&mut count_qb, filter);
    let total: i64 = count_qb.build().fetch_one(pool).await?.try_get(0)?;

    let mut qb = QueryBuilder::new("SELECT * FROM challenges WHERE 1=1");
    push_challenge_filters(&mut qb, filter);
    qb.push(" ORDER BY created_at DESC LIMIT ")
        .push_bind(page_size)
        .push(" OFFSET ")
        .push_bind((page - 1) * page_size);

    let challenges = qb
        .build()
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Challenge::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((challenges, total))
}

pub async fn insert_challenge(pool: &PgPool, challenge: &Challenge) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO challenges
           (id, title, description, hint, category, difficulty, image, image_id,
            docker_host_id, port, memory_limit, cpu_limit, privileged, flag, points,
            status, published_at, unpublished_at, created_at, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                   $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)"#,
    )
    .bind(&challenge.id)
    .bind(&challenge.title)
    .bind(&challenge.description)
    .bind(&challenge.hint)
    .bind(&challenge.category)
    .bind(&challenge.difficulty)
    .bind(&challenge.image)
    .bind(&challenge.image_id)
    .bind(&challenge.docker_host_id)
    .bind(challenge.port)
    .bind(challenge.memory_limit)
    .bind(challenge.cpu_limit)
    .bind(challenge.privileged)
    .bind(&challenge.flag)
    .bind(challenge.points)
    .bind(&challenge.status)
    .bind(challenge.published_at)
    .bind(challenge.unpublished_at)
    .bind(challenge.created_at)
    .bind(challenge.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_challenge(pool: &PgPool, challenge: &Challenge) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE challenges SET
           title = $2, description = $3, hint = $4, category = $5, difficulty = $6,
           image = $7, image_id = $8, docker_host_id = $9, port = $10, memory_limit = $11,
           cpu_limit = $12, privileged = $13, flag = $14, points = $15, status = $16,
           updated_at = now()
           WHERE id = $1"#,
    )
    .bind(&challenge.id)
    .bind(&challenge.title)
    .bind(&challenge.description)
    .bind(&challenge.hint)
    .bind(&challenge.category)
    .bind(&challenge.difficulty)
    .bind(&challenge.image)
    .bind(&challenge.image_id)
    .bind(&challenge.docker_host_id)
    .bind(challenge.port)
    .bind(challenge.memory_limit)
    .bind(challenge.cpu_limit)
    .bind(challenge.privileged)
    .bind(&challenge.flag)
    .bind(challenge.points)
    .bind(&challenge.status)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_challenge(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM challenges WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Flip publish state, stamping the matching timestamp.
pub async fn set_challenge_status(
    pool: &PgPool,
    id: &str,
    status: &str,
) -> Result<u64, sqlx::Error> {
    let sql = if status == "published" {
        "UPDATE challenges SET status = $2, published_at = now(), updated_at = now() WHERE id = $1"
    } else {
        "UPDATE challenges SET status = $2, unpublished_at = now(), updated_at = now() WHERE id = $1"
    };
    let result = sqlx::query(sql).bind(id).bind(status).execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn count_running_instances_for_challenge(
    pool: &PgPool,
    challenge_id: &str,
) -> Result<i64, sqlx::Error> {
    let row =
        sqlx::query("SELECT COUNT(*) FROM instances WHERE challenge_id = $1 AND status = 'running'")
            .bind(challenge_id)
            .fetch_one(pool)
            .await?;
    row.try_get(0)
}

pub async fn count_challenges_for_image(
    pool: &PgPool,
    image_id: &str,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) FROM challenges WHERE image_id = $1")
        .bind(image_id)
        .fetch_one(pool)
        .await?;
    row.try_get(0)
}

// ===== Docker images =====

pub async fn list_images(pool: &PgPool) -> Result<Vec<DockerImage>, sqlx::Error> {
    sqlx::query("SELECT * FROM docker_images WHERE is_available = TRUE ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(DockerImage::from_row)
        .collect()
}

pub async fn get_image(pool: &PgPool, id: &str) -> Result<Option<DockerImage>, sqlx::Error> {
    sqlx::query("SELECT * FROM docker_images WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(DockerImage::from_row)
        .transpose()
}

pub async fn get_image_by_name(
    pool: &PgPool,
    name: &str,
    tag: &str,
) -> Result<Option<DockerImage>, sqlx::Error> {
    sqlx::query("SELECT * FROM docker_images WHERE name = $1 AND tag = $2")
        .bind(name)
        .bind(tag)
        .fetch_optional(pool)
        .await?
        .map(DockerImage::from_row)
        .transpose()
}

pub async fn insert_image(pool: &PgPool, image: &DockerImage) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO docker_images
           (id, name, tag, registry, size, digest, architecture, recommended_memory,
            recommended_cpu, is_available, last_sync_at, description, created_at, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"#,
    )
    .bind(&image.id)
    .bind(&image.name)
    .bind(&image.tag)
    .bind(&image.registry)
    .bind(image.size)
    .bind(&image.digest)
    .bind(&image.architecture)
    .bind(image.recommended_memory)
    .bind(image.recommended_cpu)
    .bind(image.is_available)
    .bind(image.last_sync_at)
    .bind(&image.description)
    .bind(image.created_at)
    .bind(image.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn touch_image_sync(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE docker_images SET last_sync_at = now(), updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn touch_image(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE docker_images SET updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn delete_image(pool: &PgPool, id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM docker_images WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// ===== Instances =====

pub async fn insert_instance(pool: &PgPool, instance: &Instance) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO instances
           (id, user_id, challenge_id, container_id, docker_host_id, flag, port,
            status, expires_at, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
    )
    .bind(&instance.id)
    .bind(&instance.user_id)
    .bind(&instance.challenge_id)
    .bind(&instance.container_id)
    .bind(&instance.docker_host_id)
    .bind(&instance.flag)
    .bind(instance.port)
    .bind(&instance.status)
    .bind(instance.expires_at)
    .bind(instance.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_instance(pool: &PgPool, id: &str) -> Result<Option<Instance>, sqlx::Error> {
    sqlx::query("SELECT * FROM instances WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Instance::from_row)
        .transpose()
}

pub async fn set_instance_status(
    pool: &PgPool,
    id: &str,
    status: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE instances SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[derive(Debug, Default, Clone)]
pub struct InstanceFilter {
    pub status: Option<String>,
    pub challenge_id: Option<String>,
}

fn push_instance_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &InstanceFilter) {
    if let Some(status) = &filter.status {
        qb.push(" AND i.status = ").push_bind(status.clone());
    }
    if let Some(challenge_id) = &filter.challenge_id {
        qb.push(" AND i.challenge_id = ").push_bind(challenge_id.clone());
    }
}

pub async fn list_instances(
    pool: &PgPool,
    filter: &InstanceFilter,
    page: i64,
    page_size: i64,
) -> Result<(Vec<InstanceWithChallenge>, i64), sqlx::Error> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM instances i WHERE 1=1");
    push_instance_filters(&mut count_qb, filter);
    let total: i64 = count_qb.build().fetch_one(pool).await?.try_get(0)?;

    let mut qb = QueryBuilder::new(
        "SELECT i.*, COALESCE(c.title, '') AS challenge_title \
         FROM instances i LEFT JOIN challenges c ON c.id = i.challenge_id WHERE 1=1",
    );
    push_instance_filters(&mut qb, filter);
    qb.push(" ORDER BY i.created_at DESC LIMIT ")
        .push_bind(page_size)
        .push(" OFFSET ")
        .push_bind((page - 1) * page_size);

    let rows = qb.build().fetch_all(pool).await?;
    let mut instances = Vec::with_capacity(rows.len());
    for row in rows {
        let challenge_title: String = row.try_get("challenge_title")?;
        instances.push(InstanceWithChallenge {
            instance: Instance::from_row(row)?,
            challenge_title,
        });
    }
    Ok((instances, total))
}

// ===== Users =====

/// Atomic point credit; the expression update avoids read-modify-write.
pub async fn add_user_points(
    pool: &PgPool,
    user_id: &str,
    points: i32,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET total_points = total_points + $2, updated_at = now() WHERE id = $1",
    )
    .bind(user_id)
    .bind(points)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

// ===== Submissions =====

pub async fn insert_submission(pool: &PgPool, submission: &Submission) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO submissions (id, user_id, challenge_id, flag, is_correct, points, submitted_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
    )
    .bind(&submission.id)
    .bind(&submission.user_id)
    .bind(&submission.challenge_id)
    .bind(&submission.flag)
    .bind(submission.is_correct)
    .bind(submission.points)
    .bind(submission.submitted_at)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, Default, Clone)]
pub struct SubmissionFilter {
    pub user_id: Option<String>,
    pub challenge_id: Option<String>,
    pub correct: Option<bool>,
}

fn push_submission_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &SubmissionFilter) {
    if let Some(user_id) = &filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.clone());
    }
    if let Some(challenge_id) = &filter.challenge_id {
        qb.push(" AND challenge_id = ").push_bind(challenge_id.clone());
    }
    if let Some(correct) = filter.correct {
        qb.push(" AND is_correct = ").push_bind(correct);
    }
}

pub async fn list_submissions(
    pool: &PgPool,
    filter: &SubmissionFilter,
    page: i64,
    page_size: i64,
) -> Result<(Vec<Submission>, i64), sqlx::Error> {
    let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM submissions WHERE 1=1");
    push_submission_filters(&mut count_qb, filter);
    let total: i64 = count_qb.build().fetch_one(pool).await?.try_get(0)?;

    let mut qb = QueryBuilder::new("SELECT * FROM submissions WHERE 1=1");
    push_submission_filters(&mut qb, filter);
    qb.push(" ORDER BY submitted_at DESC LIMIT ")
        .push_bind(page_size)
        .push(" OFFSET ")
        .push_bind((page - 1) * page_size);

    let submissions = qb
        .build()
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(Submission::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((submissions, total))
}

// ===== Overview =====

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentSubmission {
    pub id: String,
    pub user_display_name: String,
    pub challenge_title: String,
    /// "correct" or "wrong".
    pub result: String,
    pub created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HotChallenge {
    pub title: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewStats {
    pub today_instances: i64,
    pub running_instances: i64,
    pub today_submissions: i64,
    pub today_correct_rate: i64,
    pub recent_submissions: Vec<RecentSubmission>,
    pub hot_challenges: Vec<HotChallenge>,
}

async fn scalar(pool: &PgPool, sql: &str) -> Result<i64, sqlx::Error> {
    sqlx::query(sql).fetch_one(pool).await?.try_get(0)
}

pub async fn overview_stats(pool: &PgPool) -> Result<OverviewStats, sqlx::Error> {
    let today_instances = scalar(
        pool,
        "SELECT COUNT(*) FROM instances WHERE created_at >= CURRENT_DATE",
    )
    .await?;
    let running_instances =
        scalar(pool, "SELECT COUNT(*) FROM instances WHERE status = 'running'").await?;
    let today_submissions = scalar(
        pool,
        "SELECT COUNT(*) FROM submissions WHERE submitted_at >= CURRENT_DATE",
    )
    .await?;
    let today_correct = scalar(
        pool,
        "SELECT COUNT(*) FROM submissions WHERE submitted_at >= CURRENT_DATE AND is_correct = TRUE",
    )
    .await?;

    let today_correct_rate = if today_submissions > 0 {
        today_correct * 100 / today_submissions
    } else {
        0
    };

    let recent_rows = sqlx::query(
        r#"SELECT s.id, COALESCE(u.username, '') AS username,
                  COALESCE(c.title, '') AS title, s.is_correct, s.submitted_at
           FROM submissions s
           LEFT JOIN users u ON u.id = s.user_id
           LEFT JOIN challenges c ON c.id = s.challenge_id
           ORDER BY s.submitted_at DESC
           LIMIT 8"#,
    )
    .fetch_all(pool)
    .await?;

    let mut recent_submissions = Vec::with_capacity(recent_rows.len());
    for row in recent_rows {
        let is_correct: bool = row.try_get("is_correct")?;
        recent_submissions.push(RecentSubmission {
            id: row.try_get("id")?,
            user_display_name: row.try_get("username")?,
            challenge_title: row.try_get("title")?,
            result: if is_correct { "correct" } else { "wrong" }.to_string(),
            created_at: row.try_get("submitted_at")?,
        });
    }

    let hot_rows = sqlx::query(
        r#"SELECT COALESCE(c.title, '') AS title, COUNT(*) AS count
           FROM submissions s
           LEFT JOIN challenges c ON c.id = s.challenge_id
           GROUP BY s.challenge_id, c.title
           ORDER BY count DESC
           LIMIT 5"#,
    )
    .fetch_all(pool)
    .await?;

    let mut hot_challenges = Vec::with_capacity(hot_rows.len());
    for row in hot_rows {
        hot_challenges.push(HotChallenge {
            title: row.try_get("title")?,
            count: row.try_get("count")?,
        });
    }

    Ok(OverviewStats {
        today_instances,
        running_instances,
        today_submissions,
        today_correct_rate,
        recent_submissions,
        hot_challenges,
    })
}

// ===== Admins =====

pub async fn get_admin_by_username(
    pool: &PgPool,
    username: &str,
) -> Result<Option<Admin>, sqlx::Error> {
    sqlx::query("SELECT * FROM admins WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await?
        .map(Admin::from_row)
        .transpose()
}

pub async fn insert_admin(pool: &PgPool, admin: &Admin) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO admins (id, username, email, password_hash, name, is_active, created_at, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
    )
    .bind(&admin.id)
    .bind(&admin.username)
    .bind(&admin.email)
    .bind(&admin.password_hash)
    .bind(&admin.name)
    .bind(admin.is_active)
    .bind(admin.created_at)
    .bind(admin.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn touch_admin_login(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE admins SET last_login_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_admins(pool: &PgPool) -> Result<i64, sqlx::Error> {
    scalar(pool, "SELECT COUNT(*) FROM admins").await
}
