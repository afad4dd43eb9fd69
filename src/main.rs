use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rmcp::ServiceExt;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use tracing::{error, info, warn};

use image_gen_rmcp::{
    config::{Cli, ServerConfig, TransportKind},
    logging,
    mcp_server::ImageGenServer,
    tools::{self, ImageTools},
};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    logging::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("Failed to start MCP server: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ServerConfig::from_cli(&cli)?;
    let tools = Arc::new(ImageTools::from_config(&config)?);

    if cli.list_tools {
        let document = tools::discovery_document(tools.models());
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }
    if let Some(name) = cli.call.as_deref() {
        let arguments = serde_json::from_str(&cli.arguments).context("--arguments must be JSON")?;
        let result = tools::dispatch(&tools, name, arguments).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    info!(
        models = ?tools.models().names(),
        default_model = %tools.models().default_model(),
        "OpenAI image generation MCP server starting"
    );
    if tools.is_configured() {
        info!("OpenAI API key configured");
    } else {
        warn!("OpenAI API key not configured - tools will require configuration before use");
    }

    match config.transport {
        TransportKind::Stdio => serve_stdio(tools).await,
        TransportKind::Http => serve_http(tools, &config).await,
    }
}

async fn serve_stdio(tools: Arc<ImageTools>) -> Result<()> {
    let service = ImageGenServer::new(tools)
        .serve(rmcp::transport::io::stdio())
        .await
        .context("failed to start stdio transport")?;
    info!("MCP server listening on stdio");
    service.waiting().await?;
    Ok(())
}

async fn serve_http(tools: Arc<ImageTools>, config: &ServerConfig) -> Result<()> {
    let bind_address = SocketAddr::from(([0, 0, 0, 0], config.port));
    let mcp_path = config.mcp_path();
    let service = StreamableHttpService::new(
        move || Ok(ImageGenServer::new(tools.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );
    let router = axum::Router::new().nest_service(&mcp_path, service);
    let tcp_listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;

    info!("MCP HTTP server started at http://{bind_address}{mcp_path}");

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
