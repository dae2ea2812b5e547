//! Users
//!
//! Only used to guard the API, there is no user management beyond the initial user and a
//! password change

use anyhow::Result;
use anyhow::anyhow;
use chrono::naive::NaiveDateTime;
use uuid::Uuid;

use crate::password::generate;
use crate::password::hash;
use crate::storage::CreateUserValues;
use crate::storage::Storage;
use crate::utils::env_var_or_else;

/// A user that can manage aliases
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct User {
    /// User ID
    pub id: Uuid,

    /// Session ID, rotated to invalidate issued tokens
    pub session_id: Uuid,

    /// Username
    pub username: String,

    /// Argon2 hash of the password
    pub hashed_password: String,

    /// Creation date
    pub created_at: NaiveDateTime,

    /// Last updated at
    pub updated_at: NaiveDateTime,
}

/// Make sure there is at least one user to login with
///
/// Uses `INITIAL_USERNAME` and `INITIAL_PASSWORD`, generated when not set
pub async fn ensure_initial_user(storage: &dyn Storage) -> Result<()> {
    if storage.find_any_single_user().await?.is_some() {
        return Ok(());
    }

    let username = env_var_or_else("INITIAL_USERNAME", || {
        let initial_username = Uuid::new_v4().to_string();
        tracing::info!("`INITIAL_USERNAME` not set, generating new username: {initial_username}");
        initial_username
    });

    let password = env_var_or_else("INITIAL_PASSWORD", || {
        let initial_password = generate();
        tracing::info!("`INITIAL_PASSWORD` not set, generating new password: {initial_password}");
        initial_password
    });

    let hashed_password =
        hash(&password).map_err(|err| anyhow!("Could not hash initial password: {err}"))?;

    let values = CreateUserValues {
        session_id: &Uuid::new_v4(),
        username: &username,
        hashed_password: &hashed_password,
    };

    storage.create_user(&values).await?;

    Ok(())
}
