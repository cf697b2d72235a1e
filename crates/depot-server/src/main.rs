use std::path::PathBuf;

use tracing::info;

use depot_server::{config::NodeConfig, startup};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    startup::init_logging();

    let config_path = PathBuf::from(
        std::env::var("DEPOT_CONFIG").unwrap_or_else(|_| "config/system.json".to_string()),
    );
    let mut config = NodeConfig::load(&config_path)?;

    let runtime = startup::bootstrap(&mut config, &config_path).await?;
    let node = runtime.state.worker.current_identity().await;
    info!(uid = %node.uid, zone = %node.zone, url = %node.base_url(), "Depot node listening");

    startup::run_server(runtime.state.clone(), &config.bind_ip, config.port).await?;
    runtime.shutdown();
    Ok(())
}
