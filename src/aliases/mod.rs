//! Aliases
//!
//! Temporary email addresses forwarding to a destination, expiring after [`EXPIRATION_TTL`]
//! unless pinned

use std::time::Duration;

use chrono::naive::NaiveDateTime;
use thiserror::Error;

use crate::provider;
use crate::storage;
use crate::tags::Tag;

pub use manager::AliasManager;
pub use manager::CreateAliasValues;
pub use names::FunnyNames;
pub use names::NameGenerator;

mod manager;
mod names;
mod timers;

/// How long an unpinned alias lives
pub const EXPIRATION_TTL: Duration = Duration::from_secs(5 * 60);

/// Alias as stored
#[derive(Clone, Debug, PartialEq, Eq, sqlx::FromRow)]
pub struct Alias {
    /// Rule ID assigned by the provider
    pub id: String,

    /// The alias email address, unique over all aliases ever created
    pub address: String,

    /// Address mail is forwarded to
    pub destination: String,

    /// Creation date, reset when an unpin gives the alias a new lifetime
    pub created_at: NaiveDateTime,

    /// Cleared once expired or deleted, never set again for the same ID
    pub active: bool,

    /// Pinned aliases do not expire
    pub pinned: bool,
}

/// Alias together with its tags
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AliasWithTags {
    /// The alias
    pub alias: Alias,

    /// Its tags, sorted by name
    pub tags: Vec<Tag>,
}

/// Whether an address is known
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddressStatus {
    /// Never used
    Unknown,

    /// Used before, with its current active flag
    Known {
        /// Is the alias active
        active: bool,
    },
}

/// Alias lifecycle errors
#[derive(Debug, Error)]
pub enum Error {
    /// The provider refused or could not be reached
    #[error("Provider error: {0}")]
    Provider(#[from] provider::Error),

    /// No free generated address within the attempt budget
    #[error("Could not find an unused alias address")]
    ExhaustedNamespace,

    /// Alias or configuration does not exist
    #[error("{0}")]
    NotFound(&'static str),

    /// The request can not be processed as is
    #[error("{0}")]
    Validation(String),

    /// Local storage failed
    #[error(transparent)]
    Storage(#[from] storage::Error),
}

/// Result type for all alias lifecycle operations
pub type Result<T> = core::result::Result<T, Error>;
