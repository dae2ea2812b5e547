//! All things related to the storage of aliases, tags, users and settings

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

use crate::aliases::Alias;
use crate::settings::Settings;
use crate::tags::Tag;
use crate::users::User;
use crate::utils::env_var;

pub use memory::Memory;
pub use postgres::Postgres;

mod memory;
mod postgres;

/// Storage shared between the request handlers and the alias manager
pub type SharedStorage = Arc<dyn Storage>;

/// Storage errors
#[derive(Debug, Error)]
pub enum Error {
    /// A connection error with the storage
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for all storage interactions
pub type Result<T> = core::result::Result<T, Error>;

/// Setup the storage, Postgres when `DATABASE_URL` is set, memory otherwise
///
/// Migrations will be run for Postgres
pub async fn setup() -> anyhow::Result<SharedStorage> {
    if let Some(database_url) = env_var("DATABASE_URL") {
        let connection_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&database_url)
            .await?;

        Ok(Arc::new(Postgres::new_with_pool(connection_pool).await?))
    } else {
        tracing::warn!("`DATABASE_URL` not set, aliases are kept in memory only");

        Ok(Arc::new(Memory::new()))
    }
}

/// Values to create a User
pub struct CreateUserValues<'a> {
    /// The initial session ID for the user
    pub session_id: &'a Uuid,

    /// The username
    pub username: &'a str,

    /// The hashed password
    pub hashed_password: &'a str,
}

/// Values to change a password of a user
pub struct ChangePasswordValues<'a> {
    /// New session ID to invalidate current tokens
    pub session_id: &'a Uuid,

    /// The new hashed password
    pub hashed_password: &'a str,
}

/// Values to create or revive an alias
///
/// The alias is (re)activated, unpinned and gets a fresh creation date
pub struct UpsertAliasValues<'a> {
    /// Rule ID assigned by the provider
    pub id: &'a str,

    /// Email address of the alias, the upsert key
    pub address: &'a str,

    /// Address mail is forwarded to
    pub destination: &'a str,
}

/// Storage with all supported operations
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Find any single user
    async fn find_any_single_user(&self) -> Result<Option<User>>;

    /// Finds a single user by its username
    async fn find_single_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Finds a single user by its ID
    async fn find_single_user_by_id(&self, id: &Uuid) -> Result<Option<User>>;

    /// Create a single user
    async fn create_user(&self, values: &CreateUserValues<'_>) -> Result<User>;

    /// Change the password of a user
    async fn change_password(
        &self,
        user: &User,
        values: &ChangePasswordValues<'_>,
    ) -> Result<User>;

    /// Find the provider settings, if configured
    async fn find_settings(&self) -> Result<Option<Settings>>;

    /// Save the provider settings, replacing the current ones
    async fn save_settings(&self, settings: &Settings) -> Result<()>;

    /// Insert an alias or revive the existing one with the same address
    ///
    /// ID, destination, creation date, active and pinned are all overwritten
    async fn upsert_alias_by_address(&self, values: &UpsertAliasValues<'_>) -> Result<Alias>;

    /// Find a single alias by its ID, active or not
    async fn find_single_alias_by_id(&self, id: &str) -> Result<Option<Alias>>;

    /// Find a single alias by its address, active or not
    async fn find_single_alias_by_address(&self, address: &str) -> Result<Option<Alias>>;

    /// Mark an alias as (in)active, unknown IDs are ignored
    async fn set_alias_active(&self, id: &str, active: bool) -> Result<()>;

    /// Mark an alias as (un)pinned, unknown IDs are ignored
    async fn set_alias_pinned(&self, id: &str, pinned: bool) -> Result<()>;

    /// Overwrite the creation date of an alias
    async fn set_alias_created_at(&self, id: &str, created_at: NaiveDateTime) -> Result<()>;

    /// Find all active aliases, pinned first, then newest first
    async fn find_active_aliases(&self) -> Result<Vec<Alias>>;

    /// Find all aliases ever created, newest first
    async fn find_all_aliases(&self) -> Result<Vec<Alias>>;

    /// Find a tag by its (normalized) name or create it with the given color
    ///
    /// The color of an existing tag is never changed
    async fn find_or_create_tag(&self, name: &str, color: &str) -> Result<Tag>;

    /// Remove all tags from an alias
    async fn clear_tag_links(&self, alias_id: &str) -> Result<()>;

    /// Link a tag to an alias, linking twice is a no-op
    async fn add_tag_link(&self, alias_id: &str, tag_id: &Uuid) -> Result<()>;

    /// Find all tags of an alias, sorted by name
    async fn find_tags_by_alias(&self, alias_id: &str) -> Result<Vec<Tag>>;

    /// Find all tags, sorted by name
    async fn find_all_tags(&self) -> Result<Vec<Tag>>;
}

/// Convert any error to storage connection error
fn connection_error<E>(err: E) -> Error
where
    E: std::error::Error,
{
    Error::Connection(err.to_string())
}
