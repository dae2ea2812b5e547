//! Cloudflare Email Routing client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::Method;
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use crate::settings::Settings;

use super::Destination;
use super::Error;
use super::Result;
use super::RuleProvider;

/// Default API location
pub const DEFAULT_API_URL: &str = "https://api.cloudflare.com/client/v4/";

/// Upper bound for a single API call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Cloudflare API client
#[derive(Clone, Debug)]
pub struct Cloudflare {
    /// HTTP client with the request timeout applied
    http_client: Client,

    /// API base, ends with a `/`
    base_url: Url,
}

/// Every Cloudflare response is wrapped in this envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,

    #[serde(default)]
    errors: Vec<ApiMessage>,

    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct RuleResult {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ZoneResult {
    account: AccountResult,
}

#[derive(Debug, Deserialize)]
struct AccountResult {
    id: String,
}

#[derive(Debug, Deserialize)]
struct AddressResult {
    id: Option<String>,
    tag: Option<String>,
    email: String,
    verified: Option<String>,
}

impl<T> Envelope<T> {
    /// The result of a successful call, or the first reported error
    fn into_result(self, action: &str) -> Result<Option<T>> {
        if self.success {
            Ok(self.result)
        } else {
            Err(Error::Api(self.errors.into_iter().next().map_or_else(
                || format!("Could not {action}"),
                |error| error.message,
            )))
        }
    }
}

impl Cloudflare {
    /// Create a client for the given API location
    pub fn new(base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;

        // `Url::join` replaces the last segment unless the path ends with a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn request(&self, settings: &Settings, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(path)?;

        Ok(self
            .http_client
            .request(method, url)
            .bearer_auth(&settings.api_token))
    }

    async fn send<T>(&self, request: RequestBuilder, action: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await?;
        let status = response.status();

        let envelope = response.json::<Envelope<T>>().await.map_err(|err| {
            tracing::debug!("Undecodable response ({status}) trying to {action}: {err}");
            Error::from(err)
        })?;

        envelope.into_result(action)
    }

    /// Account owning the zone, destination addresses live on the account
    async fn account_id(&self, settings: &Settings) -> Result<String> {
        let request = self.request(settings, Method::GET, &format!("zones/{}", settings.zone_id))?;

        self.send::<ZoneResult>(request, "get the zone account")
            .await?
            .map(|zone| zone.account.id)
            .filter(|account_id| !account_id.is_empty())
            .ok_or_else(|| Error::Api("Zone has no account".to_string()))
    }
}

#[async_trait]
impl RuleProvider for Cloudflare {
    async fn create_rule(
        &self,
        settings: &Settings,
        address: &str,
        destination: &str,
    ) -> Result<String> {
        let body = json!({
            "enabled": true,
            "name": format!("Temporary alias {address}"),
            "matchers": [{ "type": "literal", "field": "to", "value": address }],
            "actions": [{ "type": "forward", "value": [destination] }],
        });

        let request = self
            .request(
                settings,
                Method::POST,
                &format!("zones/{}/email/routing/rules", settings.zone_id),
            )?
            .json(&body);

        self.send::<RuleResult>(request, "create rule")
            .await?
            .map(|rule| rule.id)
            .ok_or_else(|| Error::Api("Rule created without ID".to_string()))
    }

    async fn delete_rule(&self, settings: &Settings, rule_id: &str) -> Result<()> {
        let request = self.request(
            settings,
            Method::DELETE,
            &format!("zones/{}/email/routing/rules/{rule_id}", settings.zone_id),
        )?;

        self.send::<serde_json::Value>(request, "delete rule")
            .await
            .map(|_| ())
    }

    async fn list_destinations(&self, settings: &Settings) -> Result<Vec<Destination>> {
        let account_id = self.account_id(settings).await?;

        let request = self.request(
            settings,
            Method::GET,
            &format!("accounts/{account_id}/email/routing/addresses"),
        )?;

        let addresses = self
            .send::<Vec<AddressResult>>(request, "list destinations")
            .await?
            .unwrap_or_default();

        Ok(addresses
            .into_iter()
            .map(|address| Destination {
                id: address.id.or(address.tag).unwrap_or_default(),
                email: address.email,
                verified: address.verified,
            })
            .collect())
    }

    async fn create_destination(&self, settings: &Settings, email: &str) -> Result<()> {
        let account_id = self.account_id(settings).await?;

        let request = self
            .request(
                settings,
                Method::POST,
                &format!("accounts/{account_id}/email/routing/addresses"),
            )?
            .json(&json!({ "email": email }));

        self.send::<serde_json::Value>(request, "add destination")
            .await
            .map(|_| ())
    }

    async fn delete_destination(&self, settings: &Settings, destination_id: &str) -> Result<()> {
        let account_id = self.account_id(settings).await?;

        let request = self.request(
            settings,
            Method::DELETE,
            &format!("accounts/{account_id}/email/routing/addresses/{destination_id}"),
        )?;

        self.send::<serde_json::Value>(request, "delete destination")
            .await
            .map(|_| ())
    }

    async fn test_connection(&self, settings: &Settings) -> Result<()> {
        let account_id = self.account_id(settings).await?;

        tracing::debug!("Zone {} belongs to account {account_id}", settings.zone_id);

        Ok(())
    }
}
