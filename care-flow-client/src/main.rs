use care_flow_client::{ClientConfig, create_app};
use tokio::net::TcpListener;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = ClientConfig::from_env();
    info!("Analysis backend: {}", config.analysis_api_url);

    let app = create_app(&config)?;
    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("Patient Case Analysis Client starting on {}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Start analysis: POST http://{}/analysis/start", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
