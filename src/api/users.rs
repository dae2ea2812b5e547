//! User API
//!
//! Logging in and changing the password, nothing more

use axum::Extension;
use serde::Deserialize;
use uuid::Uuid;

use crate::password::hash;
use crate::password::verify;
use crate::storage::ChangePasswordValues;
use crate::storage::SharedStorage;

use super::CurrentUser;
use super::Error;
use super::Form;
use super::JwtKeys;
use super::Success;
use super::current_user::Token;
use super::current_user::generate_token;

/// Login form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginForm {
    /// Username of the user
    username: String,
    /// Password of the user
    password: String,
}

/// Get a token for a user "session"
///
/// The token can then be used to access the rest of the API routes by using it in the
/// `Authorization` header
///
/// Request:
/// ```sh
/// curl -v -H 'Content-Type: application/json' \
///     -d '{ "username": "admin", "password": "verysecret" }' \
///     http://localhost:8080/api/users/token
/// ```
///
/// Response
/// ```json
/// { "token_type": "Bearer", "expires_in": 3600, "access_token": "some token" }
/// ```
pub async fn token(
    Extension(jwt_keys): Extension<JwtKeys>,
    Extension(storage): Extension<SharedStorage>,
    Form(form): Form<LoginForm>,
) -> Result<Success<Token>, Error> {
    let user = storage
        .find_single_user_by_username(&form.username)
        .await
        .map_err(Error::internal_server_error)?;

    match user {
        Some(user) if verify(&user.hashed_password, &form.password) => {
            let token = generate_token(&jwt_keys, &user)?;

            Ok(Success::ok(token))
        }
        _ => Err(Error::bad_request("Invalid user")),
    }
}

/// Change password form
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordForm {
    /// Current password for verification
    current_password: String,
    /// New password
    password: String,
}

/// Change the password of the current user
///
/// Changing your password will invalidate your current access token
///
/// Request:
/// ```sh
/// curl -v -XPUT -H 'Content-Type: application/json' \
///     -H 'Authorization: Bearer tokentokentoken' \
///     -d '{ "currentPassword": "verysecret", "password": "veryverysecret" }' \
///     http://localhost:8080/api/users/me/password
/// ```
///
/// Response
/// ```json
/// { "token_type": "Bearer", "expires_in": 3600, "access_token": "some token" }
/// ```
pub async fn change_password(
    Extension(jwt_keys): Extension<JwtKeys>,
    Extension(storage): Extension<SharedStorage>,
    current_user: CurrentUser,
    Form(form): Form<ChangePasswordForm>,
) -> Result<Success<Token>, Error> {
    if !verify(&current_user.hashed_password, &form.current_password) {
        return Err(Error::bad_request("Invalid password"));
    }

    if form.password.is_empty() {
        return Err(Error::bad_request("Password can not be empty"));
    }

    let hashed_password = hash(&form.password).map_err(Error::internal_server_error)?;

    let values = ChangePasswordValues {
        session_id: &Uuid::new_v4(),
        hashed_password: &hashed_password,
    };

    let updated_user = storage
        .change_password(&current_user, &values)
        .await
        .map_err(Error::internal_server_error)?;

    tracing::info!("Password of {} changed", updated_user.username);

    let token = generate_token(&jwt_keys, &updated_user)?;

    Ok(Success::ok(token))
}
