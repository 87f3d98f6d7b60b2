//! Instance lifecycle: admission, flag minting, container start, the
//! dual-store bookkeeping and idempotent teardown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::db::PgPool;
use crate::engine::{ContainerSpec, EnginePool};
use crate::error::ApiError;
use crate::index::{find_by_user_and_challenge, InstanceIndex, InstanceRecord};
use crate::models::instance::Instance;
use crate::models::submission::Submission;
use crate::store;

#[derive(Clone)]
pub struct InstanceService {
    db: PgPool,
    engines: Arc<EnginePool>,
    index: Arc<dyn InstanceIndex>,
    ttl: Duration,
}

impl InstanceService {
    pub fn new(
        db: PgPool,
        engines: Arc<EnginePool>,
        index: Arc<dyn InstanceIndex>,
        ttl: Duration,
    ) -> Self {
        Self {
            db,
            engines,
            index,
            ttl,
        }
    }

    /// Launch an isolated container for (actor, challenge) and record it in
    /// both stores. At most one running instance per (actor, challenge);
    /// distinct challenges may run concurrently.
    pub async fn start(&self, user_id: &str, challenge_id: &str) -> Result<Instance, ApiError> {
        let challenge = store::get_challenge(&self.db, challenge_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("题目不存在".to_string()))?;

        if find_by_user_and_challenge(self.index.as_ref(), user_id, challenge_id)
            .await?
            .is_some()
        {
            return Err(ApiError::BadRequest(
                "你已经启动了该题目的实例，请先停止后再重新启动".to_string(),
            ));
        }

        let host = if challenge.docker_host_id.is_empty() {
            store::get_default_host(&self.db)
                .await?
                .ok_or_else(|| ApiError::BadRequest("未找到启用的默认 Docker 主机".to_string()))?
        } else {
            store::get_host(&self.db, &challenge.docker_host_id)
                .await?
                .ok_or_else(|| ApiError::BadRequest("Docker 主机配置不存在".to_string()))?
        };

        if !host.enabled {
            return Err(ApiError::BadRequest(format!(
                "Docker 主机已禁用: {}",
                host.name
            )));
        }

        let engine = self.engines.get_or_create(&host).await?;

        // Prefer the linked image row; fall back to the challenge's short
        // form when the link is stale.
        let mut image_name = challenge.image.clone();
        if !challenge.image_id.is_empty() {
            match store::get_image(&self.db, &challenge.image_id).await? {
                Some(image) => image_name = image.full_name(),
                None => tracing::warn!(
                    image_id = %challenge.image_id,
                    challenge_id = %challenge_id,
                    "Linked image row missing, falling back to challenge.image"
                ),
            }
        }

        let flag = mint_flag(user_id);
        tracing::debug!(user_id = %user_id, "Minted instance flag");

        let spec = ContainerSpec {
            image: image_name,
            env: vec![format!("FLAG={flag}")],
            container_port: challenge.port.clamp(1, 65535) as u16,
            privileged: challenge.privileged,
            memory_limit: challenge.memory_limit,
            cpu_limit: challenge.cpu_limit,
        };
        let (container_id, port) = engine.start_container(&spec).await?;

        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(self.ttl)
                .map_err(|err| ApiError::Internal(err.to_string()))?;
        let instance = Instance {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            challenge_id: challenge_id.to_string(),
            container_id: container_id.clone(),
            docker_host_id: host.id.clone(),
            flag: flag.clone(),
            port: i32::from(port),
            status: "running".to_string(),
            expires_at,
            created_at: now,
        };

        let record = InstanceRecord {
            user_id: instance.user_id.clone(),
            challenge_id: instance.challenge_id.clone(),
            container_id: container_id.clone(),
            flag,
            port: instance.port,
            expires_at: expires_at.timestamp(),
        };
        if let Err(err) = self.index.store_instance(&instance.id, record).await {
            // Roll back the container so a failed index write cannot leak it.
            if let Err(stop_err) = engine.stop_container(&container_id).await {
                tracing::error!(
                    container_id = %container_id,
                    error = %stop_err,
                    "Rollback stop failed after index write failure"
                );
            }
            return Err(err.into());
        }

        // The index is authoritative for liveness; a failed row write keeps
        // the instance and only loses history.
        if let Err(err) = store::insert_instance(&self.db, &instance).await {
            tracing::warn!(instance_id = %instance.id, error = %err, "Failed to persist instance row");
        }

        tracing::info!(
            instance_id = %instance.id,
            user_id = %user_id,
            challenge_id = %challenge_id,
            host = %host.name,
            port = port,
            "Instance started"
        );
        Ok(instance)
    }

    /// Stop and remove the actor's instance of a challenge. Safe against the
    /// reaper running concurrently: a missing container counts as stopped.
    pub async fn stop(&self, user_id: &str, challenge_id: &str) -> Result<(), ApiError> {
        let (instance_id, record) =
            find_by_user_and_challenge(self.index.as_ref(), user_id, challenge_id)
                .await?
                .ok_or_else(|| {
                    ApiError::NotFound("no active instance found for this challenge".to_string())
                })?;

        // The authoritative row carries the host binding.
        let row = match store::get_instance(&self.db, &instance_id).await? {
            Some(row) => row,
            None => {
                tracing::warn!(instance_id = %instance_id, "Instance row missing, clearing index only");
                self.index.delete_instance(&instance_id, user_id).await?;
                return Err(ApiError::NotFound(
                    "instance not found in database".to_string(),
                ));
            }
        };

        let host = match store::get_host(&self.db, &row.docker_host_id).await? {
            Some(host) => host,
            None => {
                tracing::warn!(
                    instance_id = %instance_id,
                    docker_host_id = %row.docker_host_id,
                    "Docker host missing, cleaning up records only"
                );
                self.cleanup_records(&instance_id, user_id, "stopped").await;
                return Err(ApiError::BadRequest("Docker 主机配置不存在".to_string()));
            }
        };

        let engine = match self.engines.get_or_create(&host).await {
            Ok(engine) => engine,
            Err(err) => {
                tracing::warn!(host = %host.name, error = %err, "Failed to get engine client");
                self.cleanup_records(&instance_id, user_id, "stopped").await;
                return Err(err.into());
            }
        };

        let container_id = if record.container_id.is_empty() {
            row.container_id.clone()
        } else {
            record.container_id.clone()
        };
        if let Err(err) = engine.stop_container(&container_id).await {
            // Already reaped or never started; cleanup proceeds either way.
            tracing::warn!(container_id = %container_id, error = %err, "Container stop failed");
        }

        self.index.delete_instance(&instance_id, user_id).await?;
        if let Err(err) = store::set_instance_status(&self.db, &instance_id, "stopped").await {
            tracing::warn!(instance_id = %instance_id, error = %err, "Failed to mark instance stopped");
        }

        tracing::info!(instance_id = %instance_id, host = %host.name, "Instance stopped");
        Ok(())
    }

    async fn cleanup_records(&self, instance_id: &str, user_id: &str, status: &str) {
        if let Err(err) = self.index.delete_instance(instance_id, user_id).await {
            tracing::error!(instance_id = %instance_id, error = %err, "Failed to clear index");
        }
        if let Err(err) = store::set_instance_status(&self.db, instance_id, status).await {
            tracing::warn!(instance_id = %instance_id, error = %err, "Failed to update instance status");
        }
    }

    /// Score a submission against the actor's live instance flag.
    pub async fn verify_flag(
        &self,
        user_id: &str,
        challenge_id: &str,
        submitted: &str,
    ) -> Result<(bool, String), ApiError> {
        let found = find_by_user_and_challenge(self.index.as_ref(), user_id, challenge_id).await?;
        let Some((_, record)) = found else {
            return Ok((
                false,
                "No active instance found. Please start the challenge first.".to_string(),
            ));
        };

        let correct = flags_match(&record.flag, submitted);

        let challenge = store::get_challenge(&self.db, challenge_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("题目不存在".to_string()))?;

        let points = if correct { challenge.points } else { 0 };
        if correct {
            match store::add_user_points(&self.db, user_id, points).await {
                Ok(0) => tracing::warn!(user_id = %user_id, "No user row to credit points to"),
                Ok(_) => {}
                Err(err) => tracing::warn!(user_id = %user_id, error = %err, "Failed to credit points"),
            }
        }

        let submission = Submission {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            challenge_id: challenge_id.to_string(),
            flag: submitted.to_string(),
            is_correct: correct,
            points,
            submitted_at: Utc::now(),
        };
        if let Err(err) = store::insert_submission(&self.db, &submission).await {
            tracing::warn!(user_id = %user_id, error = %err, "Failed to record submission");
        }

        let message = if correct {
            "回答正确！你获得了积分。"
        } else {
            "Flag 错误，请重试。"
        };
        Ok((correct, message.to_string()))
    }
}

/// Per-instance flag: `flag{<user>_<unixSeconds>_<8 hex>}` from a
/// cryptographically seeded generator.
pub fn mint_flag(user_id: &str) -> String {
    let timestamp = Utc::now().timestamp();
    let random: [u8; 4] = rand::thread_rng().gen();
    format!("flag{{{}_{}_{}}}", user_id, timestamp, hex::encode(random))
}

/// Constant-time flag comparison.
pub fn flags_match(expected: &str, submitted: &str) -> bool {
    expected.as_bytes().ct_eq(submitted.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_flag_has_expected_shape() {
        let flag = mint_flag("user_123");
        assert!(flag.starts_with("flag{user_123_"));
        assert!(flag.ends_with('}'));

        let inner = &flag["flag{".len()..flag.len() - 1];
        let parts: Vec<&str> = inner.rsplitn(3, '_').collect();
        assert_eq!(parts.len(), 3);

        let random = parts[0];
        assert_eq!(random.len(), 8);
        assert!(random.chars().all(|c| c.is_ascii_hexdigit()));

        let timestamp: i64 = parts[1].parse().unwrap();
        assert!(timestamp > 0);
    }

    #[test]
    fn minted_flags_are_unique() {
        assert_ne!(mint_flag("u"), mint_flag("u"));
    }

    #[test]
    fn empty_user_still_produces_valid_flag() {
        let flag = mint_flag("");
        assert!(flag.starts_with("flag{_"));
        assert!(flag.ends_with('}'));
    }

    #[test]
    fn flag_comparison() {
        let flag = mint_flag("u1");
        assert!(flags_match(&flag, &flag));
        assert!(!flags_match(&flag, "flag{u1_0_00000000}"));
        assert!(!flags_match(&flag, &flag[..flag.len() - 1]));
        assert!(!flags_match(&flag, ""));
    }
}
