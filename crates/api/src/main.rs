use std::sync::Arc;

use anyhow::Context;

use flowrack_infra::{AppConfig, InMemoryStore, PostgresStore, Services, store::SharedStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    flowrack_observability::init();

    let config = AppConfig::from_env().context("loading configuration")?;
    if config.uses_dev_secret() {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
    }

    let store: SharedStore = match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections)
                .await
                .context("connecting to postgres")?;
            store.migrate().await.context("running migrations")?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store, data is lost on exit");
            Arc::new(InMemoryStore::new())
        }
    };

    let services = Services::new(store, &config);
    if let Some(admin) = &config.bootstrap_admin {
        services
            .users
            .ensure_bootstrap_admin(admin)
            .await
            .context("creating bootstrap admin")?;
    }

    let app = flowrack_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
