//! Operator accounts: login, creation and the first-boot seed.

use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::auth::jwt;
use crate::db::PgPool;
use crate::error::ApiError;
use crate::models::admin::Admin;
use crate::store;

#[derive(Clone)]
pub struct AdminService {
    db: PgPool,
    jwt_secret: String,
}

impl AdminService {
    pub fn new(db: PgPool, jwt_secret: String) -> Self {
        Self { db, jwt_secret }
    }

    /// Verify credentials and mint a session token. Unknown users and wrong
    /// passwords share one message.
    pub async fn login(&self, username: &str, password: &str) -> Result<(String, Admin), ApiError> {
        let admin = store::get_admin_by_username(&self.db, username)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("用户名或密码错误".to_string()))?;

        if !admin.is_active {
            return Err(ApiError::Unauthorized("账号已被禁用".to_string()));
        }

        let verified = bcrypt::verify(password, &admin.password_hash)
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        if !verified {
            return Err(ApiError::Unauthorized("用户名或密码错误".to_string()));
        }

        if let Err(err) = store::touch_admin_login(&self.db, &admin.id).await {
            tracing::warn!(admin_id = %admin.id, error = %err, "Failed to record login time");
        }

        let token = jwt::generate_admin_token(&self.jwt_secret, &admin.id, &admin.username)
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        Ok((token, admin))
    }

    pub async fn create_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<Admin, ApiError> {
        if store::get_admin_by_username(&self.db, username).await?.is_some() {
            return Err(ApiError::BadRequest("用户名已存在".to_string()));
        }

        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|err| ApiError::Internal(err.to_string()))?;

        let now = Utc::now();
        let admin = Admin {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            name: name.to_string(),
            is_active: true,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };
        store::insert_admin(&self.db, &admin).await?;
        Ok(admin)
    }

    /// First boot with an empty admins table seeds one operator. No known
    /// hash ships in the tree: the password comes from
    /// `ADMIN_INITIAL_PASSWORD`, which production requires; elsewhere a
    /// random one is generated and logged exactly once.
    pub async fn bootstrap(&self, production: bool) -> Result<(), ApiError> {
        if store::count_admins(&self.db).await? > 0 {
            return Ok(());
        }

        let password = match std::env::var("ADMIN_INITIAL_PASSWORD") {
            Ok(password) if !password.is_empty() => password,
            _ if production => {
                return Err(ApiError::Internal(
                    "ADMIN_INITIAL_PASSWORD is required for first boot in production".to_string(),
                ));
            }
            _ => {
                let random: [u8; 12] = rand::thread_rng().gen();
                let password = hex::encode(random);
                tracing::warn!(
                    username = "admin",
                    password = %password,
                    "Seeded initial operator account; rotate this password"
                );
                password
            }
        };

        self.create_admin("admin", "", &password, "Administrator").await?;
        tracing::info!(username = "admin", "Initial operator account created");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn bcrypt_round_trip() {
        let hash = bcrypt::hash("s3cret", 4).unwrap();
        assert!(bcrypt::verify("s3cret", &hash).unwrap());
        assert!(!bcrypt::verify("wrong", &hash).unwrap());
    }
}
