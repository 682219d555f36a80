mod api;
mod auth;
mod config;
mod error;
mod questions;
mod rooms;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use warp::Filter;

use auth::{Gateway, OpenUserDirectory};
use config::Config;
use questions::InMemoryQuestionBank;
use rooms::store::InMemoryRoomStore;
use rooms::{Coordinator, Matchmaker};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("codepair_server=info,warp=info")),
        )
        .init();

    let config = Config::from_env();

    let store = InMemoryRoomStore::new();
    let questions = InMemoryQuestionBank::with_seed_questions();
    // User records live in the credential service; the gateway only checks
    // token signatures here.
    let users = Arc::new(OpenUserDirectory);

    let gateway = Gateway::new(
        config.auth.jwt_secret.clone(),
        config.auth.token_ttl_secs,
        config.auth.allowed_origins.clone(),
        users,
    );
    let matchmaker = Matchmaker::new(store.clone(), questions);
    let coordinator = Coordinator::new(
        store,
        config.realtime.heartbeat_interval,
        config.realtime.client_timeout,
    );
    coordinator.clone().start_heartbeat();

    let cors = warp::cors()
        .allow_origins(config.auth.allowed_origins.iter().map(|s| s.as_str()))
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"])
        .allow_headers(vec!["content-type", "authorization", "x-requested-with"])
        .allow_credentials(true)
        .max_age(600);

    let routes = api::routes::health_route()
        .or(api::routes::interview_routes(gateway, matchmaker, coordinator))
        .recover(api::routes::handle_rejection)
        .with(cors);

    let addr = config.bind_address();
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "CodePair server listening"
    );

    warp::serve(routes).run(addr).await;
}
