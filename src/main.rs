use tracing_subscriber::EnvFilter;
use wallet_gate::create_rocket;
use wallet_gate::models::GateConfig;

#[rocket::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("Starting wallet gate...");

    let dsn = std::env::var("SENTRY_DSN")
        .ok()
        .and_then(|s| s.parse().ok());
    let _sentry = sentry::init(sentry::ClientOptions {
        dsn,
        release: sentry::release_name!(),
        ..Default::default()
    });

    let config = GateConfig::from_env()?;
    let rocket = create_rocket(config).await?;
    let _ = rocket.launch().await?;
    Ok(())
}
