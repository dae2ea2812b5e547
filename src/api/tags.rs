//! Tags API endpoints

use axum::Extension;

use crate::aliases::AliasManager;
use crate::tags::Tag;

use super::CurrentUser;
use super::Error;
use super::Success;

/// List all tags, sorted by name
///
/// Request:
/// ```sh
/// curl -v -H 'Authorization: Bearer tokentokentoken' http://localhost:8080/api/tags
/// ```
///
/// Response
/// ```json
/// [ { "id": "<uuid>", "name": "shopping", "color": "#10b981" } ]
/// ```
pub async fn list(
    Extension(manager): Extension<AliasManager>,
    _current_user: CurrentUser,
) -> Result<Success<Vec<Tag>>, Error> {
    let tags = manager.list_tags().await?;

    Ok(Success::ok(tags))
}
