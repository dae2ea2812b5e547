//! Destinations API endpoints
//!
//! Addresses aliases can forward to, they have to be verified by their owner before use

use axum::Extension;
use serde::Deserialize;

use crate::provider::Destination;
use crate::provider::SharedProvider;
use crate::settings::Settings;
use crate::storage::SharedStorage;

use super::CurrentUser;
use super::Error;
use super::Form;
use super::QueryParameters;
use super::Success;

/// Fetch the settings, the provider can not be used without
async fn fetch_settings(storage: &SharedStorage) -> Result<Settings, Error> {
    storage
        .find_settings()
        .await
        .map_err(Error::internal_server_error)?
        .ok_or_else(|| Error::not_found("Configuration not found"))
}

/// List all destinations of the account
///
/// Request:
/// ```sh
/// curl -v -H 'Authorization: Bearer tokentokentoken' http://localhost:8080/api/destinations
/// ```
///
/// Response
/// ```json
/// [ { "id": "<id>", "email": "me@example.org", "verified": "2026-01-01T00:00:00Z" } ]
/// ```
pub async fn list(
    Extension(storage): Extension<SharedStorage>,
    Extension(provider): Extension<SharedProvider>,
    _current_user: CurrentUser,
) -> Result<Success<Vec<Destination>>, Error> {
    let settings = fetch_settings(&storage).await?;

    let destinations = provider.list_destinations(&settings).await?;

    Ok(Success::ok(destinations))
}

/// Create destination form
#[derive(Debug, Deserialize)]
pub struct CreateDestinationForm {
    /// The address
    email: String,
}

/// Add a destination, the provider sends a verification mail
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -H 'Authorization: Bearer tokentokentoken' \
///     -d '{ "email": "me@example.org" }' \
///     http://localhost:8080/api/destinations
/// ```
pub async fn create(
    Extension(storage): Extension<SharedStorage>,
    Extension(provider): Extension<SharedProvider>,
    _current_user: CurrentUser,
    Form(form): Form<CreateDestinationForm>,
) -> Result<Success<()>, Error> {
    let email = form.email.trim();

    if !email.contains('@') {
        return Err(Error::bad_request("Invalid destination address"));
    }

    let settings = fetch_settings(&storage).await?;

    provider.create_destination(&settings, email).await?;

    tracing::info!("Destination {email} added");

    Ok(Success::empty())
}

/// Delete destination query
#[derive(Debug, Deserialize)]
pub struct DeleteDestinationQuery {
    /// Provider identifier of the destination
    id: String,
}

/// Remove a destination
///
/// Request:
/// ```sh
/// curl -v -XDELETE -H 'Authorization: Bearer tokentokentoken' \
///     'http://localhost:8080/api/destinations?id=<id>'
/// ```
pub async fn delete(
    Extension(storage): Extension<SharedStorage>,
    Extension(provider): Extension<SharedProvider>,
    _current_user: CurrentUser,
    QueryParameters(query): QueryParameters<DeleteDestinationQuery>,
) -> Result<Success<()>, Error> {
    let settings = fetch_settings(&storage).await?;

    provider.delete_destination(&settings, &query.id).await?;

    tracing::info!("Destination {} removed", query.id);

    Ok(Success::empty())
}
