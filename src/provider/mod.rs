//! Email routing provider
//!
//! The remote side of an alias: a forwarding rule that routes mail for the alias address to
//! its destination

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::settings::Settings;

pub use cloudflare::Cloudflare;
pub use cloudflare::DEFAULT_API_URL;

mod cloudflare;
#[cfg(test)]
pub mod fake;

/// Provider shared between the request handlers and the alias manager
pub type SharedProvider = Arc<dyn RuleProvider>;

/// Provider errors
#[derive(Debug, Error)]
pub enum Error {
    /// The request did not complete: connection, timeout or undecodable response
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an error
    #[error("Provider error: {0}")]
    Api(String),

    /// The endpoint URL could not be built
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type for all provider interactions
pub type Result<T> = core::result::Result<T, Error>;

/// Verified address mail can be forwarded to
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Destination {
    /// Provider identifier of the address
    pub id: String,

    /// The address
    pub email: String,

    /// When the owner verified the address, `None` while pending
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified: Option<String>,
}

/// Operations on the email routing provider
#[async_trait]
pub trait RuleProvider: Send + Sync + 'static {
    /// Create a forwarding rule for `address`, returns the rule ID
    async fn create_rule(
        &self,
        settings: &Settings,
        address: &str,
        destination: &str,
    ) -> Result<String>;

    /// Delete a forwarding rule
    async fn delete_rule(&self, settings: &Settings, rule_id: &str) -> Result<()>;

    /// List the destination addresses of the account owning the zone
    async fn list_destinations(&self, settings: &Settings) -> Result<Vec<Destination>>;

    /// Add a destination address, the provider sends a verification mail
    async fn create_destination(&self, settings: &Settings, email: &str) -> Result<()>;

    /// Remove a destination address
    async fn delete_destination(&self, settings: &Settings, destination_id: &str) -> Result<()>;

    /// Check the credentials can reach the zone
    async fn test_connection(&self, settings: &Settings) -> Result<()>;
}
