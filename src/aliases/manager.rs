//! Alias lifecycle
//!
//! ```text
//!          create
//!            |
//!            v
//!    +-> active, unpinned --(expired or deleted)--> inactive
//!    |        | pin
//!    |        v
//!    |   active, pinned --(deleted)--> inactive
//!    |        | unpin (new timer, new creation date)
//!    +--------+
//! ```
//!
//! Creating is fail-closed: nothing is stored when the provider refuses the rule. Deleting and
//! expiring are fail-open: the alias always ends up inactive locally, whatever the provider says.

use std::fmt;
use std::sync::Arc;
use std::sync::Weak;

use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::provider::SharedProvider;
use crate::settings::Settings;
use crate::storage::SharedStorage;
use crate::storage::UpsertAliasValues;
use crate::tags::Tag;
use crate::tags::normalize_tag_names;
use crate::tags::random_color;

use super::AddressStatus;
use super::Alias;
use super::AliasWithTags;
use super::EXPIRATION_TTL;
use super::Error;
use super::FunnyNames;
use super::NameGenerator;
use super::Result;
use super::timers::Expired;
use super::timers::ExpiryTimers;

/// Generated addresses tried before giving up
const MAX_NAME_ATTEMPTS: usize = 10;

/// Values to create an alias
pub struct CreateAliasValues<'a> {
    /// Requested address, generated when empty
    pub email: Option<&'a str>,

    /// Address mail is forwarded to
    pub destination: &'a str,

    /// Tag names, normalized before use
    pub tags: &'a [String],
}

/// Outcome of deactivating an alias
///
/// Local state always converges, the remote rule might not have been removed
#[derive(Debug)]
enum Convergence {
    /// The provider confirmed the rule removal
    Converged,

    /// The provider did not confirm, the rule might still exist remotely
    RemoteUncertain(String),
}

/// Why an alias is deactivated
#[derive(Clone, Copy, Debug)]
enum Reason {
    Deleted,
    Expired,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Deleted => f.write_str("deleted"),
            Reason::Expired => f.write_str("expired"),
        }
    }
}

impl Convergence {
    fn log(&self, id: &str, reason: Reason) {
        match self {
            Convergence::Converged => tracing::info!("Alias {id} {reason}"),
            Convergence::RemoteUncertain(err) => {
                tracing::warn!("Alias {id} {reason} locally, remote rule uncertain: {err}");
            }
        }
    }
}

/// Owner of the alias lifecycle
///
/// Cheap to clone, all clones share the same timers
#[derive(Clone)]
pub struct AliasManager {
    inner: Arc<Inner>,
}

struct Inner {
    storage: SharedStorage,
    provider: SharedProvider,
    names: Arc<dyn NameGenerator>,
    timers: ExpiryTimers,
}

impl AliasManager {
    /// Create the manager with funny generated names
    ///
    /// Spawns the expiry worker, must be called from within the runtime
    pub fn new(storage: SharedStorage, provider: SharedProvider) -> Self {
        Self::with_names(storage, provider, Arc::new(FunnyNames))
    }

    /// Create the manager with a custom name generator
    pub fn with_names(
        storage: SharedStorage,
        provider: SharedProvider,
        names: Arc<dyn NameGenerator>,
    ) -> Self {
        let (timers, expired_rx) = ExpiryTimers::new(EXPIRATION_TTL);

        let inner = Arc::new(Inner {
            storage,
            provider,
            names,
            timers,
        });

        tokio::spawn(process_expirations(Arc::downgrade(&inner), expired_rx));

        Self { inner }
    }

    async fn settings(&self) -> Result<Settings> {
        self.inner
            .storage
            .find_settings()
            .await?
            .ok_or(Error::NotFound("Configuration not found"))
    }

    /// Create an alias: remote rule first, then the local record, tags and expiry timer
    pub async fn create(&self, values: &CreateAliasValues<'_>) -> Result<AliasWithTags> {
        let destination = values.destination.trim();

        if destination.is_empty() {
            return Err(Error::Validation("Destination is required".to_string()));
        }

        let settings = self.settings().await?;

        let address = match values.email.map(str::trim).filter(|email| !email.is_empty()) {
            Some(email) => self.requested_address(email).await?,
            None => self.generate_address(&settings.domain).await?,
        };

        let id = self
            .inner
            .provider
            .create_rule(&settings, &address, destination)
            .await?;

        let upsert = UpsertAliasValues {
            id: &id,
            address: &address,
            destination,
        };

        let alias = match self.inner.storage.upsert_alias_by_address(&upsert).await {
            Ok(alias) => alias,
            Err(err) => {
                tracing::error!("Rule {id} for {address} created but not stored: {err}");

                if let Err(err) = self.inner.provider.delete_rule(&settings, &id).await {
                    tracing::error!("Rule {id} for {address} is orphaned: {err}");
                }

                return Err(err.into());
            }
        };

        let tags = self.link_tags(&alias.id, values.tags).await;

        self.inner.timers.restart(&alias.id).await;

        tracing::info!("Alias {address} ({id}) created, forwarding to {destination}");

        Ok(AliasWithTags { alias, tags })
    }

    /// Validate a requested address, inactive addresses can be reused
    async fn requested_address(&self, email: &str) -> Result<String> {
        let address = email.to_lowercase();

        let valid = address
            .split_once('@')
            .is_some_and(|(local, domain)| {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@')
            });

        if !valid {
            return Err(Error::Validation(format!("Invalid alias address: {email}")));
        }

        let existing = self
            .inner
            .storage
            .find_single_alias_by_address(&address)
            .await?;

        if existing.is_some_and(|alias| alias.active) {
            return Err(Error::Validation(format!(
                "Alias {address} already exists and is active"
            )));
        }

        Ok(address)
    }

    /// Find a generated address nobody used before
    async fn generate_address(&self, domain: &str) -> Result<String> {
        let domain = domain.trim().to_lowercase();

        for _ in 0..MAX_NAME_ATTEMPTS {
            let candidate = format!("{}@{domain}", self.inner.names.generate());

            let existing = self
                .inner
                .storage
                .find_single_alias_by_address(&candidate)
                .await?;

            if existing.is_none() {
                return Ok(candidate);
            }

            tracing::debug!("Generated address {candidate} already used");
        }

        Err(Error::ExhaustedNamespace)
    }

    /// Replace the tags of an alias
    ///
    /// Tags are nice to have: failures are logged and the tag is skipped
    async fn link_tags(&self, id: &str, names: &[String]) -> Vec<Tag> {
        let storage = &self.inner.storage;

        if let Err(err) = storage.clear_tag_links(id).await {
            tracing::warn!("Could not clear tags of alias {id}: {err}");
        }

        let mut tags = Vec::new();

        for name in normalize_tag_names(names) {
            let tag = match storage.find_or_create_tag(&name, random_color()).await {
                Ok(tag) => tag,
                Err(err) => {
                    tracing::warn!("Could not find or create tag {name}: {err}");
                    continue;
                }
            };

            match storage.add_tag_link(id, &tag.id).await {
                Ok(()) => tags.push(tag),
                Err(err) => tracing::warn!("Could not tag alias {id} with {name}: {err}"),
            }
        }

        tags.sort_by(|a, b| a.name.cmp(&b.name));

        tags
    }

    /// Pin or unpin an alias
    ///
    /// Pinning stops the expiry timer. Unpinning an active alias without a running timer starts
    /// a fresh one and resets the creation date, so the alias gets a full new lifetime.
    pub async fn pin(&self, id: &str, pinned: bool) -> Result<()> {
        self.settings().await?;

        let alias = self
            .inner
            .storage
            .find_single_alias_by_id(id)
            .await?
            .ok_or(Error::NotFound("Alias not found"))?;

        self.inner.storage.set_alias_pinned(id, pinned).await?;

        if pinned {
            if self.inner.timers.cancel(id).await {
                tracing::debug!("Alias {id} pinned, expiration suspended");
            }
        } else if !alias.active {
            tracing::debug!("Alias {id} unpinned while inactive, nothing to expire");
        } else if self.inner.timers.arm_if_idle(id).await {
            // a deactivation between the read above and arming found no timer to cancel
            if !self.is_active(id).await? {
                self.inner.timers.cancel(id).await;
                tracing::debug!("Alias {id} deactivated while unpinning, nothing to expire");
                return Ok(());
            }

            self.inner
                .storage
                .set_alias_created_at(id, Utc::now().naive_utc())
                .await?;

            tracing::debug!("Alias {id} unpinned, expiration restarted");
        }

        Ok(())
    }

    async fn is_active(&self, id: &str) -> Result<bool> {
        let alias = self.inner.storage.find_single_alias_by_id(id).await?;

        Ok(alias.is_some_and(|alias| alias.active))
    }

    /// Delete an alias
    ///
    /// Unknown and already inactive aliases are fine, the provider is always asked so a rule
    /// left behind earlier still gets a chance to be removed
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.deactivate(id, Reason::Deleted).await
    }

    /// Expire an alias, only as the result of a fired timer
    async fn expire(&self, expired: Expired) {
        if !self.inner.timers.claim(&expired).await {
            tracing::debug!("Expiry of alias {} was cancelled", expired.id);
            return;
        }

        if let Err(err) = self.deactivate(&expired.id, Reason::Expired).await {
            tracing::error!("Alias {} expired but is still active: {err}", expired.id);
        }
    }

    /// Remove the remote rule (best-effort), mark inactive and drop any timer
    ///
    /// Safe to run concurrently for the same ID, every step is idempotent
    async fn deactivate(&self, id: &str, reason: Reason) -> Result<()> {
        let convergence = match self.inner.storage.find_settings().await {
            Ok(Some(settings)) => match self.inner.provider.delete_rule(&settings, id).await {
                Ok(()) => Convergence::Converged,
                Err(err) => Convergence::RemoteUncertain(err.to_string()),
            },
            Ok(None) => Convergence::RemoteUncertain("provider is not configured".to_string()),
            Err(err) => Convergence::RemoteUncertain(err.to_string()),
        };

        self.inner.storage.set_alias_active(id, false).await?;

        // an unpin racing this deactivation might have started a new timer
        self.inner.timers.cancel(id).await;

        convergence.log(id, reason);

        Ok(())
    }

    /// Is the address used, and is it active
    pub async fn check(&self, email: &str) -> Result<AddressStatus> {
        let address = email.trim().to_lowercase();

        let alias = self
            .inner
            .storage
            .find_single_alias_by_address(&address)
            .await?;

        Ok(alias.map_or(AddressStatus::Unknown, |alias| AddressStatus::Known {
            active: alias.active,
        }))
    }

    /// Active aliases, pinned first, then newest first
    pub async fn list_active(&self) -> Result<Vec<AliasWithTags>> {
        let aliases = self.inner.storage.find_active_aliases().await?;

        self.with_tags(aliases).await
    }

    /// All aliases ever created, newest first
    pub async fn list_history(&self) -> Result<Vec<AliasWithTags>> {
        let aliases = self.inner.storage.find_all_aliases().await?;

        self.with_tags(aliases).await
    }

    /// All tags, sorted by name
    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        Ok(self.inner.storage.find_all_tags().await?)
    }

    async fn with_tags(&self, aliases: Vec<Alias>) -> Result<Vec<AliasWithTags>> {
        let mut with_tags = Vec::with_capacity(aliases.len());

        for alias in aliases {
            let tags = self.inner.storage.find_tags_by_alias(&alias.id).await?;

            with_tags.push(AliasWithTags { alias, tags });
        }

        Ok(with_tags)
    }

    /// Number of running expiry timers
    #[cfg(test)]
    pub(crate) async fn running_timers(&self) -> usize {
        self.inner.timers.len().await
    }

    /// Is an expiry timer running for the alias
    #[cfg(test)]
    pub(crate) async fn is_expiring(&self, id: &str) -> bool {
        self.inner.timers.is_armed(id).await
    }
}

/// Handle fired timers one at a time
///
/// Stops when the manager is gone
async fn process_expirations(inner: Weak<Inner>, mut expired_rx: UnboundedReceiver<Expired>) {
    while let Some(expired) = expired_rx.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };

        AliasManager { inner }.expire(expired).await;
    }

    tracing::debug!("Expiry worker stopped");
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use uuid::Uuid;

    use crate::provider::fake::FakeProvider;
    use crate::storage;
    use crate::storage::ChangePasswordValues;
    use crate::storage::CreateUserValues;
    use crate::storage::Memory;
    use crate::storage::Storage;
    use crate::tags::PALETTE;
    use crate::users::User;

    use super::*;

    const PAST_TTL: Duration = Duration::from_secs(5 * 60 + 1);

    /// Hands out names in order
    struct SequenceNames(Mutex<VecDeque<String>>);

    impl NameGenerator for SequenceNames {
        fn generate(&self) -> String {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "out-of-names".to_string())
        }
    }

    /// Memory storage where storing the pinned flag takes a while
    struct SlowPinning(Memory);

    #[async_trait]
    impl Storage for SlowPinning {
        async fn find_any_single_user(&self) -> storage::Result<Option<User>> {
            self.0.find_any_single_user().await
        }

        async fn find_single_user_by_username(
            &self,
            username: &str,
        ) -> storage::Result<Option<User>> {
            self.0.find_single_user_by_username(username).await
        }

        async fn find_single_user_by_id(&self, id: &Uuid) -> storage::Result<Option<User>> {
            self.0.find_single_user_by_id(id).await
        }

        async fn create_user(&self, values: &CreateUserValues<'_>) -> storage::Result<User> {
            self.0.create_user(values).await
        }

        async fn change_password(
            &self,
            user: &User,
            values: &ChangePasswordValues<'_>,
        ) -> storage::Result<User> {
            self.0.change_password(user, values).await
        }

        async fn find_settings(&self) -> storage::Result<Option<Settings>> {
            self.0.find_settings().await
        }

        async fn save_settings(&self, settings: &Settings) -> storage::Result<()> {
            self.0.save_settings(settings).await
        }

        async fn upsert_alias_by_address(
            &self,
            values: &UpsertAliasValues<'_>,
        ) -> storage::Result<Alias> {
            self.0.upsert_alias_by_address(values).await
        }

        async fn find_single_alias_by_id(&self, id: &str) -> storage::Result<Option<Alias>> {
            self.0.find_single_alias_by_id(id).await
        }

        async fn find_single_alias_by_address(
            &self,
            address: &str,
        ) -> storage::Result<Option<Alias>> {
            self.0.find_single_alias_by_address(address).await
        }

        async fn set_alias_active(&self, id: &str, active: bool) -> storage::Result<()> {
            self.0.set_alias_active(id, active).await
        }

        async fn set_alias_pinned(&self, id: &str, pinned: bool) -> storage::Result<()> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.0.set_alias_pinned(id, pinned).await
        }

        async fn set_alias_created_at(
            &self,
            id: &str,
            created_at: NaiveDateTime,
        ) -> storage::Result<()> {
            self.0.set_alias_created_at(id, created_at).await
        }

        async fn find_active_aliases(&self) -> storage::Result<Vec<Alias>> {
            self.0.find_active_aliases().await
        }

        async fn find_all_aliases(&self) -> storage::Result<Vec<Alias>> {
            self.0.find_all_aliases().await
        }

        async fn find_or_create_tag(&self, name: &str, color: &str) -> storage::Result<Tag> {
            self.0.find_or_create_tag(name, color).await
        }

        async fn clear_tag_links(&self, alias_id: &str) -> storage::Result<()> {
            self.0.clear_tag_links(alias_id).await
        }

        async fn add_tag_link(&self, alias_id: &str, tag_id: &Uuid) -> storage::Result<()> {
            self.0.add_tag_link(alias_id, tag_id).await
        }

        async fn find_tags_by_alias(&self, alias_id: &str) -> storage::Result<Vec<Tag>> {
            self.0.find_tags_by_alias(alias_id).await
        }

        async fn find_all_tags(&self) -> storage::Result<Vec<Tag>> {
            self.0.find_all_tags().await
        }
    }

    fn settings() -> Settings {
        Settings {
            api_token: "token".to_string(),
            zone_id: "zone".to_string(),
            domain: "example.com".to_string(),
        }
    }

    async fn setup_with_names(
        names: Arc<dyn NameGenerator>,
    ) -> (AliasManager, Arc<Memory>, Arc<FakeProvider>) {
        let storage = Arc::new(Memory::new());
        storage.save_settings(&settings()).await.unwrap();

        let provider = Arc::new(FakeProvider::new());

        let manager = AliasManager::with_names(storage.clone(), provider.clone(), names);

        (manager, storage, provider)
    }

    async fn setup() -> (AliasManager, Arc<Memory>, Arc<FakeProvider>) {
        setup_with_names(Arc::new(FunnyNames)).await
    }

    async fn setup_with_sequence(names: &[&str]) -> (AliasManager, Arc<Memory>, Arc<FakeProvider>) {
        let names = names.iter().map(ToString::to_string).collect();

        setup_with_names(Arc::new(SequenceNames(Mutex::new(names)))).await
    }

    async fn create(manager: &AliasManager, email: Option<&str>) -> AliasWithTags {
        manager
            .create(&CreateAliasValues {
                email,
                destination: "me@example.org",
                tags: &[],
            })
            .await
            .unwrap()
    }

    async fn is_active(storage: &Memory, id: &str) -> bool {
        storage
            .find_single_alias_by_id(id)
            .await
            .unwrap()
            .unwrap()
            .active
    }

    async fn seed(storage: &Memory, address: &str) {
        storage
            .upsert_alias_by_address(&UpsertAliasValues {
                id: &format!("seed-{address}"),
                address,
                destination: "me@example.org",
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_generates_address() {
        let (manager, _, provider) = setup().await;

        let created = create(&manager, None).await;

        assert!(created.alias.address.ends_with("@example.com"));
        assert!(created.alias.active);
        assert!(!created.alias.pinned);
        assert!(provider.has_rule(&created.alias.id));
        assert!(manager.is_expiring(&created.alias.id).await);
    }

    #[tokio::test]
    async fn test_create_skips_used_names() {
        let names = (0..10).map(|i| format!("name-{i}")).collect::<Vec<_>>();
        let names = names.iter().map(String::as_str).collect::<Vec<_>>();
        let (manager, storage, _) = setup_with_sequence(&names).await;

        for name in &names[..9] {
            seed(&storage, &format!("{name}@example.com")).await;
        }

        let created = create(&manager, None).await;
        assert_eq!("name-9@example.com", created.alias.address);
    }

    #[tokio::test]
    async fn test_create_exhausted_namespace_never_calls_provider() {
        let names = (0..10).map(|i| format!("name-{i}")).collect::<Vec<_>>();
        let names = names.iter().map(String::as_str).collect::<Vec<_>>();
        let (manager, storage, provider) = setup_with_sequence(&names).await;

        for name in &names {
            seed(&storage, &format!("{name}@example.com")).await;
        }

        let result = manager
            .create(&CreateAliasValues {
                email: None,
                destination: "me@example.org",
                tags: &[],
            })
            .await;

        assert!(matches!(result, Err(Error::ExhaustedNamespace)));
        assert_eq!(0, provider.create_calls());
    }

    #[tokio::test]
    async fn test_create_is_fail_closed() {
        let (manager, storage, provider) = setup().await;
        provider.fail_create(true);

        let result = manager
            .create(&CreateAliasValues {
                email: Some("hello@example.com"),
                destination: "me@example.org",
                tags: &["work".to_string()],
            })
            .await;

        assert!(matches!(result, Err(Error::Provider(_))));
        assert!(
            storage
                .find_single_alias_by_address("hello@example.com")
                .await
                .unwrap()
                .is_none()
        );
        assert!(storage.find_all_tags().await.unwrap().is_empty());
        assert_eq!(0, manager.running_timers().await);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (manager, _, provider) = setup().await;

        let result = manager
            .create(&CreateAliasValues {
                email: None,
                destination: "   ",
                tags: &[],
            })
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let result = manager
            .create(&CreateAliasValues {
                email: Some("not-an-address"),
                destination: "me@example.org",
                tags: &[],
            })
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));

        create(&manager, Some("Hello@Example.com")).await;
        let result = manager
            .create(&CreateAliasValues {
                email: Some("hello@example.com"),
                destination: "me@example.org",
                tags: &[],
            })
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));

        assert_eq!(1, provider.create_calls());
    }

    #[tokio::test]
    async fn test_generated_address_uses_lowercase_domain() {
        let (manager, storage, provider) = setup_with_sequence(&["walrus-grumpy-1"]).await;
        storage
            .save_settings(&Settings {
                domain: " Example.COM ".to_string(),
                ..settings()
            })
            .await
            .unwrap();

        let created = create(&manager, None).await;
        assert_eq!("walrus-grumpy-1@example.com", created.alias.address);

        assert_eq!(
            AddressStatus::Known { active: true },
            manager.check("walrus-grumpy-1@Example.COM").await.unwrap()
        );

        let result = manager
            .create(&CreateAliasValues {
                email: Some("walrus-grumpy-1@example.com"),
                destination: "me@example.org",
                tags: &[],
            })
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));

        assert_eq!(1, manager.list_history().await.unwrap().len());
        assert_eq!(1, provider.create_calls());
    }

    #[tokio::test]
    async fn test_create_links_normalized_tags() {
        let (manager, _, _) = setup().await;

        let tags = ["Work", " work ", "Urgent", ""].map(ToString::to_string);
        let created = manager
            .create(&CreateAliasValues {
                email: None,
                destination: "me@example.org",
                tags: &tags,
            })
            .await
            .unwrap();

        let names = created
            .tags
            .iter()
            .map(|tag| tag.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(vec!["urgent", "work"], names);
        assert!(created.tags.iter().all(|tag| PALETTE.contains(&tag.color.as_str())));

        let active = manager.list_active().await.unwrap();
        assert_eq!(1, active.len());
        assert_eq!(created.tags, active[0].tags);

        assert_eq!(2, manager.list_tags().await.unwrap().len());
    }

    #[tokio::test]
    async fn test_tag_color_is_stable() {
        let (manager, _, _) = setup().await;

        let tags = ["work".to_string()];
        let first = manager
            .create(&CreateAliasValues {
                email: None,
                destination: "me@example.org",
                tags: &tags,
            })
            .await
            .unwrap();
        let second = manager
            .create(&CreateAliasValues {
                email: None,
                destination: "me@example.org",
                tags: &tags,
            })
            .await
            .unwrap();

        assert_eq!(first.tags, second.tags);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpinned_alias_expires() {
        let (manager, storage, provider) = setup().await;

        let created = create(&manager, None).await;

        tokio::time::sleep(PAST_TTL).await;

        assert!(!is_active(&storage, &created.alias.id).await);
        assert!(!provider.has_rule(&created.alias.id));
        assert_eq!(0, manager.running_timers().await);
        assert!(manager.list_active().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pin_suspends_expiration() {
        let (manager, storage, provider) = setup().await;

        let created = create(&manager, None).await;
        let id = &created.alias.id;

        tokio::time::sleep(Duration::from_secs(60)).await;
        manager.pin(id, true).await.unwrap();
        assert!(!manager.is_expiring(id).await);

        tokio::time::sleep(PAST_TTL * 2).await;

        assert!(is_active(&storage, id).await);
        assert!(provider.has_rule(id));
        assert_eq!(0, provider.delete_calls());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpin_restarts_full_ttl() {
        let (manager, storage, _) = setup().await;

        let created = create(&manager, None).await;
        let id = &created.alias.id;

        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        manager.pin(id, true).await.unwrap();
        manager.pin(id, false).await.unwrap();

        let alias = storage.find_single_alias_by_id(id).await.unwrap().unwrap();
        assert!(alias.created_at > created.alias.created_at);
        assert!(!alias.pinned);

        // past the original expiry, within the new lifetime
        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        assert!(is_active(&storage, id).await);

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        assert!(!is_active(&storage, id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpin_never_adds_a_second_timer() {
        let (manager, storage, provider) = setup().await;

        let created = create(&manager, None).await;
        let id = &created.alias.id;
        let created_at = created.alias.created_at;

        // already expiring: unpin is a no-op
        manager.pin(id, false).await.unwrap();
        assert_eq!(1, manager.running_timers().await);
        let alias = storage.find_single_alias_by_id(id).await.unwrap().unwrap();
        assert_eq!(created_at, alias.created_at);

        manager.pin(id, true).await.unwrap();
        assert_eq!(0, manager.running_timers().await);

        let (a, b, c) = tokio::join!(
            manager.pin(id, false),
            manager.pin(id, false),
            manager.pin(id, false)
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();
        assert_eq!(1, manager.running_timers().await);

        tokio::time::sleep(PAST_TTL).await;
        assert!(!is_active(&storage, id).await);
        assert_eq!(1, provider.delete_calls());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_is_idempotent() {
        let (manager, storage, provider) = setup().await;

        let created = create(&manager, None).await;
        let id = &created.alias.id;

        manager.delete(id).await.unwrap();
        manager.delete(id).await.unwrap();
        manager.delete("unknown").await.unwrap();

        assert!(!is_active(&storage, id).await);
        assert!(!provider.has_rule(id));
        assert_eq!(0, manager.running_timers().await);

        // the cancelled timer never fires, unknown IDs are still sent to the provider
        tokio::time::sleep(PAST_TTL).await;
        assert_eq!(3, provider.delete_calls());
        assert!(!is_active(&storage, id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unpin_racing_delete_leaves_no_timer() {
        let storage = Arc::new(SlowPinning(Memory::new()));
        storage.save_settings(&settings()).await.unwrap();
        let provider = Arc::new(FakeProvider::new());
        let manager = AliasManager::new(storage.clone(), provider.clone());

        let created = create(&manager, None).await;
        let id = &created.alias.id;
        manager.pin(id, true).await.unwrap();
        assert_eq!(0, manager.running_timers().await);

        // the delete completes while the unpin is storing its flag
        let (unpinned, deleted) = tokio::join!(manager.pin(id, false), manager.delete(id));
        unpinned.unwrap();
        deleted.unwrap();

        let alias = storage.find_single_alias_by_id(id).await.unwrap().unwrap();
        assert!(!alias.active);
        assert!(!manager.is_expiring(id).await);
        assert_eq!(0, manager.running_timers().await);
        assert_eq!(created.alias.created_at, alias.created_at);

        tokio::time::sleep(PAST_TTL).await;
        assert_eq!(1, provider.delete_calls());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_racing_expiry() {
        let (manager, storage, provider) = setup().await;
        provider.delay_delete(Duration::from_secs(10));

        let created = create(&manager, None).await;
        let id = &created.alias.id;

        tokio::time::sleep(PAST_TTL - Duration::from_secs(5)).await;

        // the timer fires while the delete waits for the provider
        manager.delete(id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(!is_active(&storage, id).await);
        assert!(!provider.has_rule(id));
        assert_eq!(0, manager.running_timers().await);
        assert!(manager.list_active().await.unwrap().is_empty());
        assert_eq!(1, manager.list_history().await.unwrap().len());
        assert_eq!(2, provider.delete_calls());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_after_expiry() {
        let (manager, storage, _) = setup().await;

        let created = create(&manager, None).await;
        let id = &created.alias.id;

        tokio::time::sleep(PAST_TTL).await;
        assert!(!is_active(&storage, id).await);

        manager.delete(id).await.unwrap();
        assert!(!is_active(&storage, id).await);
        assert!(manager.list_active().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivation_ignores_provider_failures() {
        let (manager, storage, provider) = setup().await;
        provider.fail_delete(true);

        let expiring = create(&manager, None).await;
        let deleted = create(&manager, None).await;

        manager.delete(&deleted.alias.id).await.unwrap();
        assert!(!is_active(&storage, &deleted.alias.id).await);

        tokio::time::sleep(PAST_TTL).await;
        assert!(!is_active(&storage, &expiring.alias.id).await);

        // rules are left behind remotely
        assert_eq!(2, provider.rule_count());
    }

    #[tokio::test]
    async fn test_reissue_inactive_address() {
        let (manager, storage, _) = setup().await;

        let first = create(&manager, Some("hello@example.com")).await;
        manager.delete(&first.alias.id).await.unwrap();

        let second = create(&manager, Some("hello@example.com")).await;
        assert_ne!(first.alias.id, second.alias.id);
        assert!(second.alias.active);
        assert!(manager.is_expiring(&second.alias.id).await);

        let history = manager.list_history().await.unwrap();
        assert_eq!(1, history.len());
        assert_eq!(second.alias.id, history[0].alias.id);

        assert!(storage.find_single_alias_by_id(&first.alias.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_history_keeps_inactive_aliases() {
        let (manager, _, _) = setup().await;

        let deleted = create(&manager, None).await;
        let kept = create(&manager, None).await;
        manager.delete(&deleted.alias.id).await.unwrap();

        let active = manager.list_active().await.unwrap();
        assert_eq!(1, active.len());
        assert_eq!(kept.alias.id, active[0].alias.id);

        let history = manager.list_history().await.unwrap();
        assert_eq!(2, history.len());
        let entry = history
            .iter()
            .find(|entry| entry.alias.id == deleted.alias.id)
            .unwrap();
        assert!(!entry.alias.active);
    }

    #[tokio::test]
    async fn test_active_lists_pinned_first() {
        let (manager, _, _) = setup().await;

        let pinned = create(&manager, None).await;
        let newest = create(&manager, None).await;
        manager.pin(&pinned.alias.id, true).await.unwrap();

        let active = manager.list_active().await.unwrap();
        assert_eq!(2, active.len());
        assert_eq!(pinned.alias.id, active[0].alias.id);
        assert!(active[0].alias.pinned);
        assert_eq!(newest.alias.id, active[1].alias.id);
    }

    #[tokio::test]
    async fn test_check() {
        let (manager, _, _) = setup().await;

        assert_eq!(
            AddressStatus::Unknown,
            manager.check("hello@example.com").await.unwrap()
        );

        let created = create(&manager, Some("hello@example.com")).await;
        assert_eq!(
            AddressStatus::Known { active: true },
            manager.check(" HELLO@example.com ").await.unwrap()
        );

        manager.delete(&created.alias.id).await.unwrap();
        assert_eq!(
            AddressStatus::Known { active: false },
            manager.check("hello@example.com").await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_not_found() {
        let storage = Arc::new(Memory::new());
        let provider = Arc::new(FakeProvider::new());
        let manager = AliasManager::new(storage.clone(), provider);

        let result = manager.pin("rule-1", true).await;
        assert!(matches!(result, Err(Error::NotFound("Configuration not found"))));

        let result = manager
            .create(&CreateAliasValues {
                email: None,
                destination: "me@example.org",
                tags: &[],
            })
            .await;
        assert!(matches!(result, Err(Error::NotFound("Configuration not found"))));

        storage.save_settings(&settings()).await.unwrap();

        let result = manager.pin("rule-1", true).await;
        assert!(matches!(result, Err(Error::NotFound("Alias not found"))));
    }
}
