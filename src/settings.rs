//! Provider settings
//!
//! Credentials for the email routing provider and the domain aliases are created under

use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::storage::Storage;
use crate::utils::env_var;

/// Stored provider settings
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// API token with Email Routing edit permissions
    pub api_token: String,

    /// Zone the forwarding rules are created in
    pub zone_id: String,

    /// Domain of the zone, generated aliases use it as domain part
    pub domain: String,
}

impl Settings {
    /// Copy of the settings with the API token replaced by `*`s of the same length
    pub fn masked(&self) -> Self {
        Self {
            api_token: mask(&self.api_token),
            zone_id: self.zone_id.clone(),
            domain: self.domain.clone(),
        }
    }

    /// Merge submitted settings with the current ones
    ///
    /// A submitted token equal to the mask of the current token means "unchanged", the UI
    /// only ever sees the masked version
    pub fn merge_submitted(current: Option<&Self>, submitted: Self) -> Self {
        match current {
            Some(current)
                if !current.api_token.is_empty()
                    && submitted.api_token == mask(&current.api_token) =>
            {
                Self {
                    api_token: current.api_token.clone(),
                    ..submitted
                }
            }
            _ => submitted,
        }
    }
}

fn mask(token: &str) -> String {
    "*".repeat(token.chars().count())
}

/// Seed the stored settings from the environment
///
/// Only when `CLOUDFLARE_API_TOKEN`, `CLOUDFLARE_ZONE_ID` and `TEMPALIAS_DOMAIN` are all set,
/// otherwise the settings are managed through the API
pub async fn ensure_settings_from_env(storage: &dyn Storage) -> Result<()> {
    let (Some(api_token), Some(zone_id), Some(domain)) = (
        env_var("CLOUDFLARE_API_TOKEN"),
        env_var("CLOUDFLARE_ZONE_ID"),
        env_var("TEMPALIAS_DOMAIN"),
    ) else {
        tracing::debug!("Provider settings not in environment, keeping stored settings");
        return Ok(());
    };

    storage
        .save_settings(&Settings {
            api_token,
            zone_id,
            domain: domain.trim().to_lowercase(),
        })
        .await?;

    tracing::info!("Provider settings loaded from environment");

    Ok(())
}
