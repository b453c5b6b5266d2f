use anyhow::anyhow;
use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use cardwall_types::api::Claims;
use cardwall_types::models::UserIdentity;

/// Credential capability: password hashing plus bearer token issue/verify.
pub trait AuthProvider: Send + Sync {
    fn issue_token(&self, identity: &UserIdentity) -> anyhow::Result<String>;

    /// Returns the user id carried by a valid, unexpired token.
    fn verify_token(&self, token: &str) -> Option<String>;

    fn hash_password(&self, password: &str) -> anyhow::Result<String>;

    fn verify_password(&self, password: &str, hash: &str) -> bool;
}

/// HS256 JWTs plus Argon2id password hashes.
pub struct JwtAuthProvider {
    secret: String,
    ttl: chrono::Duration,
}

impl JwtAuthProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self::with_ttl(secret, chrono::Duration::hours(24))
    }

    pub fn with_ttl(secret: impl Into<String>, ttl: chrono::Duration) -> Self {
        Self {
            secret: secret.into(),
            ttl,
        }
    }
}

impl AuthProvider for JwtAuthProvider {
    fn issue_token(&self, identity: &UserIdentity) -> anyhow::Result<String> {
        let claims = Claims {
            sub: identity.id.clone(),
            login: identity.login.clone(),
            exp: (chrono::Utc::now() + self.ttl).timestamp().max(0) as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        Ok(token)
    }

    fn verify_token(&self, token: &str) -> Option<String> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .ok()
        .map(|data| data.claims.sub)
    }

    fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("password hashing failed: {}", e))?
            .to_string();
        Ok(hash)
    }

    fn verify_password(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }
}
