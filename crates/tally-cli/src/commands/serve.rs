//! Server command implementation

use std::path::Path;

use anyhow::Result;

use super::build_analyzer;

pub async fn cmd_serve(
    config_path: Option<&Path>,
    host: &str,
    port: u16,
    cors_origins: Vec<String>,
) -> Result<()> {
    let analyzer = build_analyzer(config_path)?;

    println!("🚀 Starting tally web server...");
    println!("   Listening: http://{}:{}", host, port);
    if !cors_origins.is_empty() {
        println!("   CORS origins: {}", cors_origins.join(", "));
    }

    let config = tally_server::ServerConfig {
        allowed_origins: cors_origins,
    };
    tally_server::serve(analyzer, host, port, config).await
}
