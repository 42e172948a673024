use std::path::PathBuf;

use stormgrid_config::ServerConfig;
use stormgrid_server::{init_tracing, run};

#[tokio::main]
async fn main() {
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("STORMGRID_CONFIG").ok())
        .map(PathBuf::from);

    let config = match ServerConfig::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(config).await {
        eprintln!("server error: {err}");
        std::process::exit(1);
    }
}
