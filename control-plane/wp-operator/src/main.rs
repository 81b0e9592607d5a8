use envconfig::Envconfig;
use kube::Client;
use tracing::info;
use wp_operator::{config::OperatorConfig, controller, init_tracing};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        // already installed
        tracing::debug!(?e, "CryptoProvider already installed; proceeding");
    }

    let cfg = OperatorConfig::init_from_env()?;
    info!(?cfg, "Starting wordpress operator");

    let client = Client::try_default().await?;
    controller::run_controller(client, cfg).await
}
