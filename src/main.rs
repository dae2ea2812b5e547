#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
// easier to use when using the functions as callback of foreign functions
#![allow(clippy::needless_pass_by_value)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Extension;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::prelude::*;

use crate::aliases::AliasManager;
use crate::api::JwtKeys;
use crate::api::router;
use crate::provider::Cloudflare;
use crate::provider::DEFAULT_API_URL;
use crate::provider::SharedProvider;
use crate::settings::ensure_settings_from_env;
use crate::storage::SharedStorage;
use crate::storage::setup;
use crate::users::ensure_initial_user;
use crate::utils::env_var;
use crate::utils::env_var_or_else;

mod aliases;
mod api;
mod graceful_shutdown;
mod password;
mod provider;
mod settings;
mod storage;
mod tags;
mod users;
mod utils;

const DEFAULT_RUST_LOG: &str = "tempalias=debug,tower_http=debug";
const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> Result<()> {
    setup_environment();
    setup_tracing();

    let storage = setup().await?;
    let provider = setup_provider()?;
    let app = setup_app(storage, provider).await?;

    let address = setup_address()?;
    let listener = TcpListener::bind(&address).await?;
    tracing::info!("Listening on {}", address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful_shutdown::handler())
    .await?;

    Ok(())
}

/// Create and setup the app with its dependencies
///
/// # Errors
///
/// Will return `Err` if any of its dependencies fail to load:
/// - Initial user setup
/// - Provider settings from the environment
pub async fn setup_app(storage: SharedStorage, provider: SharedProvider) -> Result<Router> {
    ensure_initial_user(storage.as_ref()).await?;
    ensure_settings_from_env(storage.as_ref()).await?;

    let manager = AliasManager::new(storage.clone(), provider.clone());

    let jwt_keys = setup_jwt_keys();

    Ok(Router::new()
        .nest("/api", router())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(storage))
        .layer(Extension(provider))
        .layer(Extension(manager))
        .layer(Extension(jwt_keys)))
}

fn setup_environment() {
    dotenvy::dotenv().ok();
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::registry;

    registry()
        .with(EnvFilter::new(env_var_or_else("RUST_LOG", || {
            DEFAULT_RUST_LOG.to_string()
        })))
        .with(fmt::layer())
        .init();
}

fn setup_jwt_keys() -> JwtKeys {
    use crate::password::generate;

    let jwt_secret = env_var_or_else("JWT_SECRET", || {
        let jwt_secret = generate();
        tracing::info!("`JWT_SECRET` is not set, generating temporary one: {jwt_secret}");
        jwt_secret
    });

    JwtKeys::new(jwt_secret.as_bytes())
}

fn setup_provider() -> Result<SharedProvider> {
    let base_url = env_var_or_else("CLOUDFLARE_API_URL", || DEFAULT_API_URL.to_string());

    let cloudflare = Cloudflare::new(&base_url)?;

    Ok(Arc::new(cloudflare))
}

fn setup_address() -> Result<SocketAddr> {
    let mut address =
        env_var_or_else("ADDRESS", || String::from(DEFAULT_ADDRESS)).parse::<SocketAddr>()?;

    // optional override of just the port
    if let Some(port) = env_var("PORT") {
        let port = port.parse::<u16>()?;

        address.set_port(port);
    }

    Ok(address)
}
