//! Server command — `fxgen serve`.

use anyhow::Result;
use fxgen::config::FxgenConfig;
use fxgen::server::{self, ServerConfig};

pub struct ServeArgs {
    pub port: Option<u16>,
    pub host: Option<String>,
    pub max_concurrent: Option<usize>,
    pub cors: bool,
}

pub async fn cmd_serve(mut config: FxgenConfig, args: ServeArgs) -> Result<()> {
    for warning in config.validate() {
        eprintln!("warning: {}", warning);
    }
    if let Some(n) = args.max_concurrent {
        config.toml.scheduler.max_concurrent = n;
    }

    let mut server_config = ServerConfig::from(&config.toml.server);
    if let Some(port) = args.port {
        server_config.port = port;
    }
    if let Some(host) = args.host {
        server_config.host = host;
    }
    server_config.cors = args.cors;

    let scheduler = super::build_scheduler(&config)?;
    server::start_server(server_config, scheduler).await
}
