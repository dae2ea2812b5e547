//! Postgres storage

use async_trait::async_trait;
use chrono::NaiveDateTime;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use uuid::Uuid;

use crate::aliases::Alias;
use crate::settings::Settings;
use crate::tags::Tag;
use crate::users::User;

use super::ChangePasswordValues;
use super::CreateUserValues;
use super::Result;
use super::Storage;
use super::UpsertAliasValues;
use super::connection_error;

/// Migrator to run migrations on startup
static MIGRATOR: Migrator = sqlx::migrate!();

/// Postgres storage
#[derive(Clone)]
pub struct Postgres {
    /// Pool of connections
    connection_pool: PgPool,
}

impl Postgres {
    /// Create Postgres storage with existing pool
    ///
    /// Migrations will be run
    pub async fn new_with_pool(connection_pool: PgPool) -> Result<Self> {
        MIGRATOR
            .run(&connection_pool)
            .await
            .map_err(connection_error)?;

        Ok(Self { connection_pool })
    }
}

#[async_trait]
impl Storage for Postgres {
    async fn find_any_single_user(&self) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r"
            SELECT *
            FROM users
            LIMIT 1
            ",
        )
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)
    }

    async fn find_single_user_by_username(&self, username: &str) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r"
            SELECT *
            FROM users
            WHERE username = $1
            LIMIT 1
            ",
        )
        .bind(username)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)
    }

    async fn find_single_user_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r"
            SELECT *
            FROM users
            WHERE id = $1
            LIMIT 1
            ",
        )
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)
    }

    async fn create_user(&self, values: &CreateUserValues<'_>) -> Result<User> {
        sqlx::query_as::<_, User>(
            r"
            INSERT INTO users (id, session_id, username, hashed_password)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            ",
        )
        .bind(Uuid::new_v4())
        .bind(values.session_id)
        .bind(values.username)
        .bind(values.hashed_password)
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)
    }

    async fn change_password(
        &self,
        user: &User,
        values: &ChangePasswordValues<'_>,
    ) -> Result<User> {
        sqlx::query_as::<_, User>(
            r"
            UPDATE users
            SET session_id = $1, hashed_password = $2, updated_at = CURRENT_TIMESTAMP
            WHERE id = $3
            RETURNING *
            ",
        )
        .bind(values.session_id)
        .bind(values.hashed_password)
        .bind(user.id)
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)
    }

    async fn find_settings(&self) -> Result<Option<Settings>> {
        sqlx::query_as::<_, Settings>(
            r"
            SELECT api_token, zone_id, domain
            FROM settings
            WHERE id = 1
            ",
        )
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO settings (id, api_token, zone_id, domain)
            VALUES (1, $1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET api_token = excluded.api_token,
                zone_id = excluded.zone_id,
                domain = excluded.domain,
                updated_at = CURRENT_TIMESTAMP
            ",
        )
        .bind(&settings.api_token)
        .bind(&settings.zone_id)
        .bind(&settings.domain)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(())
    }

    async fn upsert_alias_by_address(&self, values: &UpsertAliasValues<'_>) -> Result<Alias> {
        sqlx::query_as::<_, Alias>(
            r"
            INSERT INTO aliases (id, address, destination, created_at, active, pinned)
            VALUES ($1, $2, $3, $4, TRUE, FALSE)
            ON CONFLICT (address) DO UPDATE
            SET id = excluded.id,
                destination = excluded.destination,
                created_at = excluded.created_at,
                active = TRUE,
                pinned = FALSE
            RETURNING id, address, destination, created_at, active, pinned
            ",
        )
        .bind(values.id)
        .bind(values.address)
        .bind(values.destination)
        .bind(Utc::now().naive_utc())
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)
    }

    async fn find_single_alias_by_id(&self, id: &str) -> Result<Option<Alias>> {
        sqlx::query_as::<_, Alias>(
            r"
            SELECT id, address, destination, created_at, active, pinned
            FROM aliases
            WHERE id = $1
            LIMIT 1
            ",
        )
        .bind(id)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)
    }

    async fn find_single_alias_by_address(&self, address: &str) -> Result<Option<Alias>> {
        sqlx::query_as::<_, Alias>(
            r"
            SELECT id, address, destination, created_at, active, pinned
            FROM aliases
            WHERE address = $1
            LIMIT 1
            ",
        )
        .bind(address)
        .fetch_optional(&self.connection_pool)
        .await
        .map_err(connection_error)
    }

    async fn set_alias_active(&self, id: &str, active: bool) -> Result<()> {
        sqlx::query(
            r"
            UPDATE aliases
            SET active = $1
            WHERE id = $2
            ",
        )
        .bind(active)
        .bind(id)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(())
    }

    async fn set_alias_pinned(&self, id: &str, pinned: bool) -> Result<()> {
        sqlx::query(
            r"
            UPDATE aliases
            SET pinned = $1
            WHERE id = $2
            ",
        )
        .bind(pinned)
        .bind(id)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(())
    }

    async fn set_alias_created_at(&self, id: &str, created_at: NaiveDateTime) -> Result<()> {
        sqlx::query(
            r"
            UPDATE aliases
            SET created_at = $1
            WHERE id = $2
            ",
        )
        .bind(created_at)
        .bind(id)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(())
    }

    async fn find_active_aliases(&self) -> Result<Vec<Alias>> {
        sqlx::query_as::<_, Alias>(
            r"
            SELECT id, address, destination, created_at, active, pinned
            FROM aliases
            WHERE active
            ORDER BY pinned DESC, created_at DESC
            ",
        )
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)
    }

    async fn find_all_aliases(&self) -> Result<Vec<Alias>> {
        sqlx::query_as::<_, Alias>(
            r"
            SELECT id, address, destination, created_at, active, pinned
            FROM aliases
            ORDER BY created_at DESC
            ",
        )
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)
    }

    async fn find_or_create_tag(&self, name: &str, color: &str) -> Result<Tag> {
        sqlx::query(
            r"
            INSERT INTO tags (id, name, color)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO NOTHING
            ",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(color)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        sqlx::query_as::<_, Tag>(
            r"
            SELECT id, name, color
            FROM tags
            WHERE name = $1
            ",
        )
        .bind(name)
        .fetch_one(&self.connection_pool)
        .await
        .map_err(connection_error)
    }

    async fn clear_tag_links(&self, alias_id: &str) -> Result<()> {
        sqlx::query(
            r"
            DELETE FROM alias_tags
            WHERE alias_id = $1
            ",
        )
        .bind(alias_id)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(())
    }

    async fn add_tag_link(&self, alias_id: &str, tag_id: &Uuid) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO alias_tags (alias_id, tag_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(alias_id)
        .bind(tag_id)
        .execute(&self.connection_pool)
        .await
        .map_err(connection_error)?;

        Ok(())
    }

    async fn find_tags_by_alias(&self, alias_id: &str) -> Result<Vec<Tag>> {
        sqlx::query_as::<_, Tag>(
            r"
            SELECT t.id, t.name, t.color
            FROM tags t
            JOIN alias_tags links ON links.tag_id = t.id
            WHERE links.alias_id = $1
            ORDER BY t.name
            ",
        )
        .bind(alias_id)
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)
    }

    async fn find_all_tags(&self) -> Result<Vec<Tag>> {
        sqlx::query_as::<_, Tag>(
            r"
            SELECT id, name, color
            FROM tags
            ORDER BY name
            ",
        )
        .fetch_all(&self.connection_pool)
        .await
        .map_err(connection_error)
    }
}
