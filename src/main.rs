use todo_starter::config::AppConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todo_starter=info,rocket=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        persistent = config.database.is_some(),
        "starting todo_starter"
    );

    todo_starter::rocket_instance(config)
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("Rocket server failed to launch: {e}"))?;

    tracing::info!("server shut down");
    Ok(())
}
