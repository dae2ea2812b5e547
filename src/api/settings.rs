//! Provider settings API endpoints

use axum::Extension;
use serde::Deserialize;
use serde::Serialize;

use crate::provider::SharedProvider;
use crate::settings::Settings;
use crate::storage::SharedStorage;

use super::CurrentUser;
use super::Error;
use super::Form;
use super::Success;

/// Get the settings, with the API token masked
///
/// Request:
/// ```sh
/// curl -v -H 'Authorization: Bearer tokentokentoken' http://localhost:8080/api/config
/// ```
///
/// Response
/// ```json
/// { "apiToken": "******", "zoneId": "<zone id>", "domain": "example.com" }
/// ```
pub async fn single(
    Extension(storage): Extension<SharedStorage>,
    _current_user: CurrentUser,
) -> Result<Success<Settings>, Error> {
    let settings = storage
        .find_settings()
        .await
        .map_err(Error::internal_server_error)?
        .ok_or_else(|| Error::not_found("Configuration not found"))?;

    Ok(Success::ok(settings.masked()))
}

/// Save the settings
///
/// Sending back the masked token keeps the stored one
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -H 'Authorization: Bearer tokentokentoken' \
///     -d '{ "apiToken": "secret", "zoneId": "<zone id>", "domain": "example.com" }' \
///     http://localhost:8080/api/config
/// ```
pub async fn save(
    Extension(storage): Extension<SharedStorage>,
    _current_user: CurrentUser,
    Form(form): Form<Settings>,
) -> Result<Success<()>, Error> {
    let submitted = Settings {
        api_token: form.api_token.trim().to_string(),
        zone_id: form.zone_id.trim().to_string(),
        domain: form.domain.trim().to_lowercase(),
    };

    if submitted.api_token.is_empty() || submitted.zone_id.is_empty() || submitted.domain.is_empty()
    {
        return Err(Error::bad_request(
            "API token, zone ID and domain are required",
        ));
    }

    let current = storage
        .find_settings()
        .await
        .map_err(Error::internal_server_error)?;

    let settings = Settings::merge_submitted(current.as_ref(), submitted);

    storage
        .save_settings(&settings)
        .await
        .map_err(Error::internal_server_error)?;

    tracing::info!("Provider settings saved for {}", settings.domain);

    Ok(Success::empty())
}

/// What still needs to be done before aliases can be created
#[derive(Debug, Serialize)]
pub struct Status {
    /// A user exists
    setup_done: bool,

    /// Provider settings with an API token are stored
    config_done: bool,
}

/// Get the setup status, no token needed
///
/// Request:
/// ```sh
/// curl -v http://localhost:8080/api/status
/// ```
///
/// Response
/// ```json
/// { "setup_done": true, "config_done": false }
/// ```
pub async fn status(
    Extension(storage): Extension<SharedStorage>,
) -> Result<Success<Status>, Error> {
    let setup_done = storage
        .find_any_single_user()
        .await
        .map_err(Error::internal_server_error)?
        .is_some();

    let config_done = storage
        .find_settings()
        .await
        .map_err(Error::internal_server_error)?
        .is_some_and(|settings| !settings.api_token.is_empty());

    Ok(Success::ok(Status {
        setup_done,
        config_done,
    }))
}

/// Test connection form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConnectionForm {
    /// API token, the mask stands for the stored one
    api_token: String,

    /// Zone to look up
    zone_id: String,
}

/// Result of a successful connection test
#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    status: &'static str,
    message: &'static str,
}

/// Check credentials against the provider without saving them
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -H 'Authorization: Bearer tokentokentoken' \
///     -d '{ "apiToken": "secret", "zoneId": "<zone id>" }' \
///     http://localhost:8080/api/test-cf
/// ```
///
/// Response
/// ```json
/// { "status": "success", "message": "Connection OK" }
/// ```
pub async fn test_connection(
    Extension(storage): Extension<SharedStorage>,
    Extension(provider): Extension<SharedProvider>,
    _current_user: CurrentUser,
    Form(form): Form<TestConnectionForm>,
) -> Result<Success<ConnectionStatus>, Error> {
    let current = storage
        .find_settings()
        .await
        .map_err(Error::internal_server_error)?;

    let submitted = Settings {
        api_token: form.api_token.trim().to_string(),
        zone_id: form.zone_id.trim().to_string(),
        domain: current
            .as_ref()
            .map(|settings| settings.domain.clone())
            .unwrap_or_default(),
    };

    if submitted.api_token.is_empty() || submitted.zone_id.is_empty() {
        return Err(Error::bad_request("API token and zone ID are required"));
    }

    let settings = Settings::merge_submitted(current.as_ref(), submitted);

    if let Err(err) = provider.test_connection(&settings).await {
        tracing::info!("Connection test for zone {} failed: {err}", settings.zone_id);

        return Err(Error::bad_request("Connection failed").with_description(err));
    }

    Ok(Success::ok(ConnectionStatus {
        status: "success",
        message: "Connection OK",
    }))
}
