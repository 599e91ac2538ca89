// Common test utilities

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;

use tradegate::{
    gate, CliArgs, Config, GateState, MemoryCounterStore, SessionResolver, SharedState,
};

/// A gate wired to an in-memory store, keeping the concrete store handle
/// around so tests can inspect counters, flags, and events.
pub struct TestGate {
    pub state: SharedState,
    pub store: Arc<MemoryCounterStore>,
}

/// Stock configuration pointed at the given mock servers.
pub fn test_config(upstream_url: &str, auth_service_url: &str) -> Config {
    let mut config = Config::load(&CliArgs::parse_from(["tradegate"])).unwrap();
    config.upstream_url = upstream_url.to_string();
    config.auth_service_url = auth_service_url.to_string();
    config
}

pub fn build_gate(config: &Config) -> TestGate {
    let store = Arc::new(MemoryCounterStore::new());
    let resolver = Arc::new(SessionResolver::new(config.auth_service_url.clone()));
    let state = Arc::new(GateState::new(config, store.clone(), resolver));
    TestGate { state, store }
}

/// Serve the gate on an ephemeral port and return its base URL.
pub async fn spawn_gate(state: SharedState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = gate::router(state);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    format!("http://{}", addr)
}
