use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use backend::routes;
use backend::state::AppState;
use backend::storage::MemoryStore;
use backend::SessionConfig;

mod telemetry;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    telemetry::init_tracing();

    // Environment variables must be set by the runtime environment:
    // - Docker: Set via docker-compose env_file or docker run --env-file
    // - Local dev: Source env files manually (e.g., set -a; . ./.env; set +a)
    let host = std::env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("BACKEND_PORT")
        .unwrap_or_else(|_| "3001".to_string())
        .parse::<u16>()
        .unwrap_or_else(|_| {
            eprintln!("❌ BACKEND_PORT must be a valid port number");
            std::process::exit(1);
        });

    println!("🚀 Starting Concord Orchestrator on http://{}:{}", host, port);

    // In-memory store seeded with the demo experiment; a persistent
    // adapter is substituted here without touching the core.
    let store = Arc::new(MemoryStore::new());
    store.insert_config("demo", SessionConfig::demo());

    let app_state = AppState::new(store);
    let data = web::Data::new(app_state);

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(routes::configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
