//! Project initialization: `helpdesk init`.

use anyhow::{Context, Result};
use std::path::PathBuf;

use helpdesk::config::{HelpdeskConfig, HelpdeskToml};
use helpdesk::crm::db::CrmDb;

/// Create `.helpdesk/`, a default `helpdesk.toml` when none exists, and the
/// database. `seed` adds the default board columns to an empty board.
pub fn cmd_init(config: &HelpdeskConfig, db_path: Option<PathBuf>, seed: bool) -> Result<()> {
    std::fs::create_dir_all(&config.config_dir).with_context(|| {
        format!(
            "Failed to create config directory: {}",
            config.config_dir.display()
        )
    })?;

    let config_file = config.config_file();
    if !config_file.exists() {
        HelpdeskToml::default().save(&config_file)?;
        println!("Wrote {}", config_file.display());
    }

    let db_path = config.db_path(db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = CrmDb::new(&db_path).context("Failed to initialize helpdesk database")?;
    println!("Helpdesk database initialized at {}", db_path.display());

    if seed {
        match db.seed_default_columns()? {
            0 => println!("Board already has columns, nothing seeded"),
            n => println!("Seeded {} board columns", n),
        }
    }
    Ok(())
}
