//! Aliases API endpoints
//!
//! Everything related to the aliases management

use axum::Extension;
use chrono::NaiveDateTime;
use serde::Deserialize;
use serde::Serialize;

use crate::aliases::AddressStatus;
use crate::aliases::AliasManager;
use crate::aliases::AliasWithTags;
use crate::aliases::CreateAliasValues;
use crate::tags::Tag;

use super::CurrentUser;
use super::Error;
use super::Form;
use super::QueryParameters;
use super::Success;

/// Alias response going to the user
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasResponse {
    /// Rule ID
    pub id: String,

    /// Alias address
    pub email: String,

    /// Address mail is forwarded to
    pub destination: String,

    /// Creation date
    pub created_at: NaiveDateTime,

    /// Still forwarding
    pub active: bool,

    /// Never expires
    pub pinned: bool,

    /// Tags, sorted by name
    pub tags: Vec<Tag>,
}

impl AliasResponse {
    fn from_alias(alias: AliasWithTags) -> Self {
        let AliasWithTags { alias, tags } = alias;

        Self {
            id: alias.id,
            email: alias.address,
            destination: alias.destination,
            created_at: alias.created_at,
            active: alias.active,
            pinned: alias.pinned,
            tags,
        }
    }

    fn from_alias_multiple(aliases: Vec<AliasWithTags>) -> Vec<Self> {
        aliases.into_iter().map(Self::from_alias).collect()
    }
}

/// Create alias form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAliasForm {
    /// Address mail is forwarded to
    destination: String,

    /// Requested alias address, generated when left out
    email: Option<String>,

    /// Tag names
    #[serde(default)]
    tags: Vec<String>,
}

/// Created alias
#[derive(Debug, Serialize)]
pub struct CreatedAlias {
    /// Rule ID
    id: String,

    /// Alias address
    email: String,
}

/// Create an alias, it expires after 5 minutes unless pinned
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -H 'Authorization: Bearer tokentokentoken' \
///     -d '{ "destination": "me@example.org", "tags": ["shopping"] }' \
///     http://localhost:8080/api/create
/// ```
///
/// Response
/// ```json
/// { "id": "<rule id>", "email": "otter-sleepy-42@example.com" }
/// ```
pub async fn create(
    Extension(manager): Extension<AliasManager>,
    _current_user: CurrentUser,
    Form(form): Form<CreateAliasForm>,
) -> Result<Success<CreatedAlias>, Error> {
    let values = CreateAliasValues {
        email: form.email.as_deref(),
        destination: &form.destination,
        tags: &form.tags,
    };

    let created = manager.create(&values).await?;

    Ok(Success::ok(CreatedAlias {
        id: created.alias.id,
        email: created.alias.address,
    }))
}

/// Pin form
#[derive(Debug, Deserialize)]
pub struct PinForm {
    /// Rule ID
    id: String,

    /// Pin or unpin
    pinned: bool,
}

/// Pin or unpin an alias
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -H 'Authorization: Bearer tokentokentoken' \
///     -d '{ "id": "<rule id>", "pinned": true }' \
///     http://localhost:8080/api/pin
/// ```
pub async fn pin(
    Extension(manager): Extension<AliasManager>,
    _current_user: CurrentUser,
    Form(form): Form<PinForm>,
) -> Result<Success<()>, Error> {
    manager.pin(&form.id, form.pinned).await?;

    Ok(Success::empty())
}

/// Check query
#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    /// Address to check
    email: String,
}

/// Whether an address is used
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    /// Used before
    exists: bool,

    /// Active flag, only for used addresses
    #[serde(skip_serializing_if = "Option::is_none")]
    active: Option<bool>,
}

/// Check whether an address was used before
///
/// Request:
/// ```sh
/// curl -v -H 'Authorization: Bearer tokentokentoken' \
///     'http://localhost:8080/api/check?email=otter-sleepy-42@example.com'
/// ```
///
/// Response
/// ```json
/// { "exists": true, "active": false }
/// ```
pub async fn check(
    Extension(manager): Extension<AliasManager>,
    _current_user: CurrentUser,
    QueryParameters(query): QueryParameters<CheckQuery>,
) -> Result<Success<CheckResponse>, Error> {
    if query.email.trim().is_empty() {
        return Err(Error::bad_request("Email required"));
    }

    let response = match manager.check(&query.email).await? {
        AddressStatus::Unknown => CheckResponse {
            exists: false,
            active: None,
        },
        AddressStatus::Known { active } => CheckResponse {
            exists: true,
            active: Some(active),
        },
    };

    Ok(Success::ok(response))
}

/// List active aliases, pinned first, then newest first
///
/// Request:
/// ```sh
/// curl -v -H 'Authorization: Bearer tokentokentoken' http://localhost:8080/api/active
/// ```
pub async fn active(
    Extension(manager): Extension<AliasManager>,
    _current_user: CurrentUser,
) -> Result<Success<Vec<AliasResponse>>, Error> {
    let aliases = manager.list_active().await?;

    Ok(Success::ok(AliasResponse::from_alias_multiple(aliases)))
}

/// List every alias ever created, newest first
///
/// Request:
/// ```sh
/// curl -v -H 'Authorization: Bearer tokentokentoken' http://localhost:8080/api/history
/// ```
pub async fn history(
    Extension(manager): Extension<AliasManager>,
    _current_user: CurrentUser,
) -> Result<Success<Vec<AliasResponse>>, Error> {
    let aliases = manager.list_history().await?;

    Ok(Success::ok(AliasResponse::from_alias_multiple(aliases)))
}

/// Delete query
#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    /// Rule ID
    id: String,
}

/// Delete an alias, deleting twice is fine
///
/// Request:
/// ```sh
/// curl -v -XDELETE -H 'Authorization: Bearer tokentokentoken' \
///     'http://localhost:8080/api/delete?id=<rule id>'
/// ```
pub async fn delete(
    Extension(manager): Extension<AliasManager>,
    _current_user: CurrentUser,
    QueryParameters(query): QueryParameters<DeleteQuery>,
) -> Result<Success<()>, Error> {
    manager.delete(&query.id).await?;

    Ok(Success::empty())
}
