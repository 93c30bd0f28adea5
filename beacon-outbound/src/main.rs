use beacon_core::load_config;
use beacon_outbound::ApplicationBootstrap;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let app_config = load_config(Some(&config_path));

    ApplicationBootstrap::run(app_config).await
}
