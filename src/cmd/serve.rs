//! Helpdesk server command: `helpdesk serve`.

use anyhow::Result;
use std::path::PathBuf;

use helpdesk::config::HelpdeskConfig;

pub async fn cmd_serve(
    config: &HelpdeskConfig,
    port: Option<u16>,
    db_path: Option<PathBuf>,
    dev: bool,
) -> Result<()> {
    let server = config.server_config(port, db_path, dev)?;
    helpdesk::crm::server::start_server(server).await
}
