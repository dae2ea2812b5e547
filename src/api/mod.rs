//! All API endpoint setup

use axum::Router;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;

pub use current_user::CurrentUser;
pub use current_user::JwtKeys;
pub use request::Form;
pub use request::QueryParameters;
pub use response::Error;
pub use response::Success;

mod aliases;
mod current_user;
mod destinations;
mod request;
mod response;
mod settings;
mod tags;
mod users;

/// Get the Axum router for all API routes
pub fn router() -> Router {
    let users = Router::new()
        .route("/token", post(users::token))
        .route("/me/password", put(users::change_password));

    Router::new()
        .route("/create", post(aliases::create))
        .route("/pin", post(aliases::pin))
        .route("/check", get(aliases::check))
        .route("/active", get(aliases::active))
        .route("/history", get(aliases::history))
        .route("/delete", get(aliases::delete).delete(aliases::delete))
        .route("/tags", get(tags::list))
        .route("/config", get(settings::single).post(settings::save))
        .route("/status", get(settings::status))
        .route("/test-cf", post(settings::test_connection))
        .route(
            "/destinations",
            get(destinations::list)
                .post(destinations::create)
                .delete(destinations::delete),
        )
        .nest("/users", users)
}
