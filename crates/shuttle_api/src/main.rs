use clap::Parser;
use shuttle_api::app_state::AppState;
use shuttle_api::config::ServiceConfig;
use shuttle_api::create_app;
use std::path::PathBuf;

/// Command line arguments for the shuttle tracker server
#[derive(Parser, Debug)]
#[command(name = "shuttle-tracker")]
#[command(about = "Live shuttle location sharing and arrival estimates")]
struct Args {
    /// Path to the route configuration JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to bind the server to
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Tracker token, overrides the configured one
    #[arg(short, long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt().pretty().init();

    let mut config = match &args.config {
        Some(path) => {
            let config = ServiceConfig::load(path).await?;
            tracing::info!(
                "Loaded route config from {}: {}",
                path.display(),
                config.route_name
            );
            config
        }
        None => {
            tracing::info!("No config given, using the built-in campus route");
            ServiceConfig::default()
        }
    };
    if let Some(token) = args.token {
        config.tracker_token = token;
    }

    tracing::info!(
        "Route {} has {} stations, time zone {}",
        config.route_name,
        config.stations.len(),
        config.time_zone
    );

    let app = create_app(AppState::new(config));

    let bind_addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Starting server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", bind_addr, e))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    Ok(())
}
