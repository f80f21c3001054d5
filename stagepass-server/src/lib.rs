use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use axum::routing::get;
use log::info;
use stagepass_core::{Gateway, GatewayConfig, MemoryDatabase, MemoryDirectory};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

mod access;
mod codes;
mod context;
mod docs;
mod errors;
mod rooms;
mod schemas;
mod serialized;
mod sse;

pub mod logging;

pub use context::*;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

/// Starts the stagepass server
pub async fn run_server() {
    let port = env::var("STAGEPASS_SERVER_PORT")
        .map(|x| x.parse::<u16>().expect("Port must be a number"))
        .unwrap_or(DEFAULT_PORT);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let directory = Arc::new(MemoryDirectory::new());
    let gateway: Arc<ServerGateway> = Arc::new(Gateway::with_shared(
        Arc::new(MemoryDatabase::new()),
        directory.clone(),
        GatewayConfig::default(),
    ));

    spawn_sweeper(gateway.clone());

    let context = ServerContext { gateway, directory };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .nest("/codes", codes::router())
        .nest("/access", access::router())
        .nest("/rooms", rooms::router())
        .route("/studios/:id/codes", get(codes::studio_codes))
        .route("/creators/:id/codes", get(codes::creator_codes));

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context);

    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {}", port);

    axum::serve(
        listener,
        root_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server runs");
}

/// Reaps graced-out and idle sessions in the background
fn spawn_sweeper(gateway: Arc<ServerGateway>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(gateway.config().sweep_interval);

        loop {
            interval.tick().await;
            gateway.access.sweep().await;
        }
    });
}
