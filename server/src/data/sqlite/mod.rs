//! SQLite-backed API key store
//!
//! Keys are persisted hashed (SHA-256 with a process-wide pepper); the
//! cleartext key exists only in the creation response. Rows are never
//! deleted: revocation stamps `revoked_at`, validation stamps
//! `last_used_at` fire-and-forget.

mod schema;
mod scopes;

pub use scopes::Scope;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::utils::api_key::{generate_api_key, hash_api_key, key_prefix};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid key")]
    InvalidKey,
    #[error("key revoked")]
    KeyRevoked,
    #[error("key expired")]
    KeyExpired,
    #[error("key not found")]
    KeyNotFound,
    #[error("auth database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// API key metadata; never carries the hash or the cleartext key
#[derive(Debug, Clone)]
pub struct KeyInfo {
    pub id: String,
    pub name: String,
    pub prefix: String,
    pub scopes: Scope,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

pub struct AuthStore {
    pool: SqlitePool,
    pepper: String,
}

impl AuthStore {
    /// Open (and initialize) the auth database. `:memory:` is accepted for
    /// tests and pins the pool to one connection.
    pub async fn open(db_path: &str, pepper: &str) -> Result<Self, AuthError> {
        let pool = if db_path == ":memory:" {
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(SqliteConnectOptions::new().in_memory(true))
                .await?
        } else {
            SqlitePoolOptions::new()
                .connect_with(
                    SqliteConnectOptions::new()
                        .filename(db_path)
                        .create_if_missing(true),
                )
                .await?
        };

        sqlx::raw_sql(schema::SCHEMA).execute(&pool).await?;

        Ok(Self {
            pool,
            pepper: pepper.to_string(),
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn hash_key(&self, key: &str) -> String {
        hash_api_key(key, &self.pepper)
    }

    /// Seed an admin key into an empty store. No-op when the bootstrap key
    /// is empty or any key already exists.
    pub async fn bootstrap(&self, bootstrap_key: &str) -> Result<(), AuthError> {
        if bootstrap_key.is_empty() {
            return Ok(());
        }

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys")
            .fetch_one(&self.pool)
            .await?;
        if count > 0 {
            return Ok(());
        }

        self.insert_key("bootstrap-admin", Scope::ADMIN, None, bootstrap_key, "system")
            .await?;
        tracing::warn!("bootstrap admin key created; unset MO11Y_BOOTSTRAP_KEY for security");
        Ok(())
    }

    /// Validate a key and return its metadata. Updates `last_used_at` on a
    /// background task; that write failing is tolerated.
    pub async fn validate_key(&self, key: &str) -> Result<KeyInfo, AuthError> {
        let hash = self.hash_key(key);

        let row: Option<(
            String,
            String,
            String,
            i64,
            String,
            Option<String>,
            Option<String>,
        )> = sqlx::query_as(
            "SELECT id, name, key_prefix, scopes, created_at, expires_at, revoked_at
             FROM api_keys WHERE key_hash = ?",
        )
        .bind(&hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, name, prefix, scopes, created_at, expires_at, revoked_at)) = row else {
            return Err(AuthError::InvalidKey);
        };

        if revoked_at.is_some() {
            return Err(AuthError::KeyRevoked);
        }

        let expires_at = expires_at.as_deref().map(parse_rfc3339);
        if let Some(exp) = expires_at {
            // Unparseable expiry counts as expired
            if exp.map(|t| Utc::now() > t).unwrap_or(true) {
                return Err(AuthError::KeyExpired);
            }
        }

        let pool = self.pool.clone();
        let key_id = id.clone();
        tokio::spawn(async move {
            let result = sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
                .bind(Utc::now().to_rfc3339())
                .bind(&key_id)
                .execute(&pool)
                .await;
            if let Err(e) = result {
                tracing::warn!(key_id = %key_id, error = %e, "failed to update last_used_at");
            }
        });

        Ok(KeyInfo {
            id,
            name,
            prefix,
            scopes: Scope::from_bits(scopes as u32),
            created_at: parse_rfc3339(&created_at).unwrap_or(DateTime::UNIX_EPOCH),
            expires_at: expires_at.flatten(),
            last_used_at: None,
            revoked: false,
        })
    }

    /// Create a new key; the returned string is the only copy of the
    /// cleartext key.
    pub async fn create_key(
        &self,
        name: &str,
        scopes: Scope,
        expires_at: Option<DateTime<Utc>>,
        created_by: &str,
    ) -> Result<(String, KeyInfo), AuthError> {
        let key = generate_api_key();
        let info = self
            .insert_key(name, scopes, expires_at, &key, created_by)
            .await?;
        Ok((key, info))
    }

    async fn insert_key(
        &self,
        name: &str,
        scopes: Scope,
        expires_at: Option<DateTime<Utc>>,
        key: &str,
        created_by: &str,
    ) -> Result<KeyInfo, AuthError> {
        let id = Uuid::new_v4().to_string();
        let hash = self.hash_key(key);
        let prefix = key_prefix(key);
        let created_at = Utc::now();

        sqlx::query(
            "INSERT INTO api_keys
                 (id, name, key_hash, key_prefix, scopes, created_at, expires_at, created_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(name)
        .bind(&hash)
        .bind(&prefix)
        .bind(scopes.bits() as i64)
        .bind(created_at.to_rfc3339())
        .bind(expires_at.map(|t| t.to_rfc3339()))
        .bind(created_by)
        .execute(&self.pool)
        .await?;

        Ok(KeyInfo {
            id,
            name: name.to_string(),
            prefix,
            scopes,
            created_at,
            expires_at,
            last_used_at: None,
            revoked: false,
        })
    }

    /// Revoke a key by id. Revoking an already-revoked key is a no-op;
    /// an unknown id is an error.
    pub async fn revoke_key(&self, key_id: &str) -> Result<(), AuthError> {
        let result = sqlx::query(
            "UPDATE api_keys SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(key_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM api_keys WHERE id = ?")
                .bind(key_id)
                .fetch_one(&self.pool)
                .await?;
            if count == 0 {
                return Err(AuthError::KeyNotFound);
            }
        }
        Ok(())
    }

    /// List all keys, newest first. No hashes, no key material.
    pub async fn list_keys(&self) -> Result<Vec<KeyInfo>, AuthError> {
        let rows: Vec<(
            String,
            String,
            String,
            i64,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
        )> = sqlx::query_as(
            "SELECT id, name, key_prefix, scopes, created_at, expires_at, revoked_at, last_used_at
             FROM api_keys ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, name, prefix, scopes, created_at, expires_at, revoked_at, last_used_at)| {
                    KeyInfo {
                        id,
                        name,
                        prefix,
                        scopes: Scope::from_bits(scopes as u32),
                        created_at: parse_rfc3339(&created_at).unwrap_or(DateTime::UNIX_EPOCH),
                        expires_at: expires_at.as_deref().and_then(parse_rfc3339),
                        last_used_at: last_used_at.as_deref().and_then(parse_rfc3339),
                        revoked: revoked_at.is_some(),
                    }
                },
            )
            .collect())
    }
}

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::sha256_hex;

    const PEPPER: &str = "0123456789abcdef0123456789abcdef";

    async fn test_store() -> AuthStore {
        AuthStore::open(":memory:", PEPPER).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_validate_round_trip() {
        let store = test_store().await;
        let (key, info) = store
            .create_key("ci-ingester", Scope::INGEST, None, "admin-1")
            .await
            .unwrap();

        assert!(key.starts_with("mo11y_"));
        assert_eq!(info.prefix.len(), 12);

        let validated = store.validate_key(&key).await.unwrap();
        assert_eq!(validated.id, info.id);
        assert_eq!(validated.name, "ci-ingester");
        assert!(validated.scopes.has(Scope::INGEST));
        assert!(!validated.scopes.has(Scope::READ));
    }

    #[tokio::test]
    async fn test_stored_hash_matches_pepper_recipe() {
        let store = test_store().await;
        let (key, _) = store
            .create_key("k", Scope::READ, None, "")
            .await
            .unwrap();

        let (hash,): (String,) = sqlx::query_as("SELECT key_hash FROM api_keys")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(hash, sha256_hex(&format!("{key}{PEPPER}")));
    }

    #[tokio::test]
    async fn test_unknown_key_is_invalid() {
        let store = test_store().await;
        let err = store
            .validate_key("mo11y_00000000000000000000000000000000")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidKey));
    }

    #[tokio::test]
    async fn test_revoked_key_distinguished() {
        let store = test_store().await;
        let (key, info) = store.create_key("k", Scope::READ, None, "").await.unwrap();
        store.revoke_key(&info.id).await.unwrap();

        let err = store.validate_key(&key).await.unwrap_err();
        assert!(matches!(err, AuthError::KeyRevoked));
    }

    #[tokio::test]
    async fn test_expired_key_distinguished() {
        let store = test_store().await;
        let past = Utc::now() - chrono::TimeDelta::hours(1);
        let (key, _) = store
            .create_key("k", Scope::READ, Some(past), "")
            .await
            .unwrap();

        let err = store.validate_key(&key).await.unwrap_err();
        assert!(matches!(err, AuthError::KeyExpired));
    }

    #[tokio::test]
    async fn test_future_expiry_still_valid() {
        let store = test_store().await;
        let future = Utc::now() + chrono::TimeDelta::hours(1);
        let (key, _) = store
            .create_key("k", Scope::READ, Some(future), "")
            .await
            .unwrap();
        store.validate_key(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_revoke_unknown_key_not_found() {
        let store = test_store().await;
        let err = store.revoke_key("no-such-id").await.unwrap_err();
        assert!(matches!(err, AuthError::KeyNotFound));
    }

    #[tokio::test]
    async fn test_revoke_twice_is_idempotent() {
        let store = test_store().await;
        let (_, info) = store.create_key("k", Scope::READ, None, "").await.unwrap();
        store.revoke_key(&info.id).await.unwrap();
        store.revoke_key(&info.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_keys_newest_first_without_secrets() {
        let store = test_store().await;
        store.create_key("first", Scope::READ, None, "").await.unwrap();
        store
            .create_key("second", Scope::INGEST, None, "")
            .await
            .unwrap();

        let keys = store.list_keys().await.unwrap();
        assert_eq!(keys.len(), 2);
        for key in &keys {
            // Only the display prefix survives
            assert_eq!(key.prefix.len(), 12);
            assert!(key.prefix.starts_with("mo11y_"));
        }
    }

    #[tokio::test]
    async fn test_list_marks_revoked() {
        let store = test_store().await;
        let (_, info) = store.create_key("k", Scope::READ, None, "").await.unwrap();
        store.revoke_key(&info.id).await.unwrap();

        let keys = store.list_keys().await.unwrap();
        assert!(keys[0].revoked);
    }

    #[tokio::test]
    async fn test_bootstrap_empty_store() {
        let store = test_store().await;
        store
            .bootstrap("mo11y_deadbeefdeadbeefdeadbeefdeadbeef")
            .await
            .unwrap();

        let keys = store.list_keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name, "bootstrap-admin");
        assert!(keys[0].scopes.has(Scope::ADMIN));

        let info = store
            .validate_key("mo11y_deadbeefdeadbeefdeadbeefdeadbeef")
            .await
            .unwrap();
        assert!(info.scopes.has(Scope::INGEST));
    }

    #[tokio::test]
    async fn test_bootstrap_second_run_is_noop() {
        let store = test_store().await;
        store
            .bootstrap("mo11y_deadbeefdeadbeefdeadbeefdeadbeef")
            .await
            .unwrap();
        store
            .bootstrap("mo11y_deadbeefdeadbeefdeadbeefdeadbeef")
            .await
            .unwrap();

        assert_eq!(store.list_keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_empty_key_is_noop() {
        let store = test_store().await;
        store.bootstrap("").await.unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_skipped_when_keys_exist() {
        let store = test_store().await;
        store.create_key("existing", Scope::READ, None, "").await.unwrap();
        store
            .bootstrap("mo11y_deadbeefdeadbeefdeadbeefdeadbeef")
            .await
            .unwrap();

        let keys = store.list_keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name, "existing");
    }
}
