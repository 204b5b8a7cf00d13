//! SQLite-backed identity provider.
//!
//! Resolves opaque portal tokens against the `portal_users` table. Tokens
//! are SHA-256 hashed before lookup, so the table never stores plaintext
//! credentials. Account management itself belongs to the wider portal;
//! this adapter only reads.

use hostdesk_core::identity::IdentityProvider;
use hostdesk_types::error::IdentityError;
use hostdesk_types::identity::{Identity, Role};
use sha2::{Digest, Sha256};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// Portal user directory backed by SQLite.
pub struct SqlitePortalDirectory {
    pool: DatabasePool,
}

impl SqlitePortalDirectory {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

/// Compute SHA-256 hash of a portal token (lowercase hex).
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{:x}", digest)
}

impl IdentityProvider for SqlitePortalDirectory {
    async fn resolve(&self, token: &str) -> Result<Identity, IdentityError> {
        let token_hash = hash_token(token);

        let row = sqlx::query(
            "SELECT id, role, display_name FROM portal_users WHERE token_hash = ?",
        )
        .bind(&token_hash)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| IdentityError::StorageError(e.to_string()))?;

        let Some(row) = row else {
            return Err(IdentityError::InvalidToken);
        };

        let id: String = row
            .try_get("id")
            .map_err(|e| IdentityError::StorageError(e.to_string()))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| IdentityError::StorageError(e.to_string()))?;
        let display_name: String = row
            .try_get("display_name")
            .map_err(|e| IdentityError::StorageError(e.to_string()))?;

        let user_id = Uuid::parse_str(&id)
            .map_err(|e| IdentityError::StorageError(format!("invalid user id: {e}")))?;
        let role: Role = role
            .parse()
            .map_err(|e: String| IdentityError::StorageError(e))?;

        Ok(Identity {
            user_id,
            role,
            display_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    async fn seed_user(pool: &DatabasePool, role: &str, token: &str) -> Uuid {
        let user_id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO portal_users (id, email, display_name, role, token_hash, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(user_id.to_string())
        .bind(format!("{user_id}@example.com"))
        .bind("Dana")
        .bind(role)
        .bind(hash_token(token))
        .bind(Utc::now().to_rfc3339())
        .execute(&pool.writer)
        .await
        .unwrap();
        user_id
    }

    #[tokio::test]
    async fn resolve_valid_token() {
        let pool = test_pool().await;
        let user_id = seed_user(&pool, "admin", "tok-abc").await;
        let directory = SqlitePortalDirectory::new(pool);

        let identity = directory.resolve("tok-abc").await.unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.role, Role::Admin);
        assert_eq!(identity.display_name, "Dana");
    }

    #[tokio::test]
    async fn resolve_unknown_token_fails() {
        let pool = test_pool().await;
        seed_user(&pool, "customer", "tok-abc").await;
        let directory = SqlitePortalDirectory::new(pool);

        let err = directory.resolve("tok-wrong").await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidToken));
    }

    #[test]
    fn hash_is_stable_hex() {
        let h1 = hash_token("tok");
        let h2 = hash_token("tok");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert!(h1.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
