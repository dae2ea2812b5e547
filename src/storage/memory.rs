//! Memory storage
//!
//! Will be destroyed on system shutdown

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use chrono::Utc;
use tokio::sync::Mutex;
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

/// An in-memory storage
///
/// Will be destroyed on system shutdown
#[derive(Clone, Debug, Default)]
pub struct Memory {
    /// All users in storage
    users: Arc<Mutex<HashMap<Uuid, User>>>,

    /// Provider settings
    settings: Arc<Mutex<Option<Settings>>>,

    /// All aliases in storage, keyed by address
    aliases: Arc<Mutex<HashMap<String, Alias>>>,

    /// All tags in storage
    tags: Arc<Mutex<HashMap<Uuid, Tag>>>,

    /// Alias ID and tag ID pairs
    tag_links: Arc<Mutex<BTreeSet<(String, Uuid)>>>,
}

impl Memory {
    /// Create a new empty Memory storage
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for Memory {
    async fn find_any_single_user(&self) -> Result<Option<User>> {
        Ok(self.users.lock().await.values().next().cloned())
    }

    async fn find_single_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_single_user_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        Ok(self.users.lock().await.get(id).cloned())
    }

    async fn create_user(&self, values: &CreateUserValues<'_>) -> Result<User> {
        let user = User {
            id: Uuid::new_v4(),
            session_id: *values.session_id,
            username: values.username.to_string(),
            hashed_password: values.hashed_password.to_string(),
            created_at: Utc::now().naive_utc(),
            updated_at: Utc::now().naive_utc(),
        };

        self.users.lock().await.insert(user.id, user.clone());

        Ok(user)
    }

    async fn change_password(
        &self,
        user: &User,
        values: &ChangePasswordValues<'_>,
    ) -> Result<User> {
        let mut users = self.users.lock().await;

        let user = users.entry(user.id).or_insert_with(|| user.clone());
        user.session_id = *values.session_id;
        user.hashed_password = values.hashed_password.to_string();
        user.updated_at = Utc::now().naive_utc();

        Ok(user.clone())
    }

    async fn find_settings(&self) -> Result<Option<Settings>> {
        Ok(self.settings.lock().await.clone())
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        *self.settings.lock().await = Some(settings.clone());

        Ok(())
    }

    async fn upsert_alias_by_address(&self, values: &UpsertAliasValues<'_>) -> Result<Alias> {
        let alias = Alias {
            id: values.id.to_string(),
            address: values.address.to_string(),
            destination: values.destination.to_string(),
            created_at: Utc::now().naive_utc(),
            active: true,
            pinned: false,
        };

        let previous = self
            .aliases
            .lock()
            .await
            .insert(alias.address.clone(), alias.clone());

        // links follow the alias to its new ID
        if let Some(previous) = previous.filter(|previous| previous.id != alias.id) {
            let mut tag_links = self.tag_links.lock().await;

            let moved = tag_links
                .iter()
                .filter(|(alias_id, _)| *alias_id == previous.id)
                .cloned()
                .collect::<Vec<_>>();

            for (_, tag_id) in moved {
                tag_links.remove(&(previous.id.clone(), tag_id));
                tag_links.insert((alias.id.clone(), tag_id));
            }
        }

        Ok(alias)
    }

    async fn find_single_alias_by_id(&self, id: &str) -> Result<Option<Alias>> {
        Ok(self
            .aliases
            .lock()
            .await
            .values()
            .find(|alias| alias.id == id)
            .cloned())
    }

    async fn find_single_alias_by_address(&self, address: &str) -> Result<Option<Alias>> {
        Ok(self.aliases.lock().await.get(address).cloned())
    }

    async fn set_alias_active(&self, id: &str, active: bool) -> Result<()> {
        if let Some(alias) = self
            .aliases
            .lock()
            .await
            .values_mut()
            .find(|alias| alias.id == id)
        {
            alias.active = active;
        }

        Ok(())
    }

    async fn set_alias_pinned(&self, id: &str, pinned: bool) -> Result<()> {
        if let Some(alias) = self
            .aliases
            .lock()
            .await
            .values_mut()
            .find(|alias| alias.id == id)
        {
            alias.pinned = pinned;
        }

        Ok(())
    }

    async fn set_alias_created_at(&self, id: &str, created_at: NaiveDateTime) -> Result<()> {
        if let Some(alias) = self
            .aliases
            .lock()
            .await
            .values_mut()
            .find(|alias| alias.id == id)
        {
            alias.created_at = created_at;
        }

        Ok(())
    }

    async fn find_active_aliases(&self) -> Result<Vec<Alias>> {
        let mut aliases = self
            .aliases
            .lock()
            .await
            .values()
            .filter(|alias| alias.active)
            .cloned()
            .collect::<Vec<_>>();

        aliases.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        Ok(aliases)
    }

    async fn find_all_aliases(&self) -> Result<Vec<Alias>> {
        let mut aliases = self
            .aliases
            .lock()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();

        aliases.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(aliases)
    }

    async fn find_or_create_tag(&self, name: &str, color: &str) -> Result<Tag> {
        let mut tags = self.tags.lock().await;

        if let Some(tag) = tags.values().find(|tag| tag.name == name) {
            return Ok(tag.clone());
        }

        let tag = Tag {
            id: Uuid::new_v4(),
            name: name.to_string(),
            color: color.to_string(),
        };

        tags.insert(tag.id, tag.clone());

        Ok(tag)
    }

    async fn clear_tag_links(&self, alias_id: &str) -> Result<()> {
        self.tag_links
            .lock()
            .await
            .retain(|(linked_alias_id, _)| linked_alias_id != alias_id);

        Ok(())
    }

    async fn add_tag_link(&self, alias_id: &str, tag_id: &Uuid) -> Result<()> {
        self.tag_links
            .lock()
            .await
            .insert((alias_id.to_string(), *tag_id));

        Ok(())
    }

    async fn find_tags_by_alias(&self, alias_id: &str) -> Result<Vec<Tag>> {
        let tag_ids = self
            .tag_links
            .lock()
            .await
            .iter()
            .filter(|(linked_alias_id, _)| linked_alias_id == alias_id)
            .map(|(_, tag_id)| *tag_id)
            .collect::<Vec<_>>();

        let tags = self.tags.lock().await;

        let mut tags = tag_ids
            .iter()
            .filter_map(|tag_id| tags.get(tag_id).cloned())
            .collect::<Vec<_>>();

        tags.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(tags)
    }

    async fn find_all_tags(&self) -> Result<Vec<Tag>> {
        let mut tags = self
            .tags
            .lock()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();

        tags.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(tags)
    }
}
