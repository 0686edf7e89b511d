//! Serve command

use std::path::Path;

use anyhow::Result;

use piggy_server::ServerConfig;

use super::open_db;

/// `piggy serve`
pub async fn cmd_serve(db_path: &Path, host: &str, port: u16) -> Result<()> {
    let db = open_db(db_path)?;
    let config = ServerConfig::from_env();
    piggy_server::serve(db, host, port, config).await
}
