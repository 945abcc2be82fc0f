use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use shopfront_api::app::{build_app, services::AppServices};
use shopfront_infra::{db, AppConfig, PgStore, Stores};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shopfront_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    if config.uses_dev_secret() {
        warn!("admin tokens are signed with the development secret");
    }

    let stores = match &config.database_url {
        Some(url) => {
            let pool = db::connect(url, config.database_max_connections)
                .await
                .context("connecting to postgres")?;
            db::apply_schema(&pool).await.context("applying schema")?;
            info!("using postgres stores");
            Stores::from_shared(Arc::new(PgStore::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set; data lives in memory only");
            Stores::in_memory()
        }
    };

    let services = AppServices::from_config(&config, stores).context("wiring services")?;
    let app = build_app(Arc::new(services), config.jwt_secret.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
