mod configuration;
mod error;
mod routes;
mod state;

use anyhow::Context;
use stockbot::{
    agent::Agent,
    providers::factory,
    tools::{search::TavilySearch, ToolRegistry},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::configuration::Settings;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine, the environment may already be set
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::new()?;
    let addr = settings
        .server
        .socket_addr()
        .context("Invalid server host or port")?;

    info!(provider = %settings.provider.provider_type(), "configuring agent");
    let provider = factory::get_provider(settings.provider.into_config())?;
    let registry = ToolRegistry::builder()
        .with_tool(TavilySearch::new(settings.search.into_config())?)
        .build()?;
    let agent_config = settings.agent.into_config(&registry.tools())?;
    let agent = Agent::new(provider, registry)?.with_config(agent_config);

    // Create router with CORS support
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::configure(AppState::new(agent)).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
