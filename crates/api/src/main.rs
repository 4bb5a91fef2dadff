use std::sync::Arc;

use anyhow::Context;

use invoicer_api::app::{self, services::Collaborators, BackOffice};
use invoicer_infra::{BackOfficeConfig, PostgresStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    invoicer_observability::init();

    let config = BackOfficeConfig::from_env()?;
    let addr = config.bind_addr;
    let admin = config.admin_email.clone().zip(config.admin_password.clone());

    let services = match config.database_url.clone() {
        Some(url) => {
            let store = PostgresStore::connect(&url).await.context("connecting to postgres")?;
            BackOffice::with_store(Arc::new(store), config, Collaborators::default())
        }
        None => {
            tracing::warn!("DATABASE_URL not set, data is kept in memory only");
            BackOffice::new(config, Collaborators::default()).context("building back office")?
        }
    };
    if let Some((email, password)) = admin {
        services
            .provision_platform_admin(&email, &password)
            .await
            .context("provisioning platform admin")?;
    }

    let app = app::build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "invoicer api listening");
    axum::serve(listener, app).await.context("serving http")?;
    Ok(())
}
