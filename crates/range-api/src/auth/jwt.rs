use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

const TOKEN_LIFETIME_SECS: i64 = 24 * 3600;

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminClaims {
    pub admin_id: String,
    pub username: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
}

/// Mint an operator session token (HS256, 24 h).
pub fn generate_admin_token(
    secret: &str,
    admin_id: &str,
    username: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = AdminClaims {
        admin_id: admin_id.to_string(),
        username: username.to_string(),
        exp: now + TOKEN_LIFETIME_SECS,
        iat: now,
        nbf: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Validate a token and return its claims. The default validation pins the
/// algorithm to HS256, so algorithm-confusion tokens are rejected.
pub fn parse_admin_token(
    secret: &str,
    token: &str,
) -> Result<AdminClaims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::default();
    validation.validate_nbf = true;
    decode::<AdminClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret";

    #[test]
    fn round_trip() {
        let token = generate_admin_token(SECRET, "admin-1", "root").unwrap();
        let claims = parse_admin_token(SECRET, &token).unwrap();
        assert_eq!(claims.admin_id, "admin-1");
        assert_eq!(claims.username, "root");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = generate_admin_token(SECRET, "admin-1", "root").unwrap();
        assert!(parse_admin_token("other-secret", &token).is_err());
    }

    #[test]
    fn rejects_tampered_token() {
        let token = generate_admin_token(SECRET, "admin-1", "root").unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('a') { 'b' } else { 'a' });
        assert!(parse_admin_token(SECRET, &tampered).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let now = Utc::now().timestamp();
        let claims = AdminClaims {
            admin_id: "admin-1".to_string(),
            username: "root".to_string(),
            exp: now - 90_000,
            iat: now - 180_000,
            nbf: now - 180_000,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(parse_admin_token(SECRET, &token).is_err());
    }
}
