use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use videotube::{
    config::{LogFormat, LoggingConfig},
    server, ApiResult, AppContext, ServerConfig,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    // Load configuration
    let config = ServerConfig::from_env()?;

    // Initialize logging
    init_tracing(&config.logging);

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}

/// `RUST_LOG` overrides the configured level
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
