use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use helpdesk::config::HelpdeskConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "helpdesk")]
#[command(version, about = "Customer-support CRM with a kanban triage board")]
pub struct Cli {
    /// Log at debug level (ignored when RUST_LOG is set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, env = "HELPDESK_PROJECT_DIR")]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and WebSocket server
    Serve {
        /// Port to listen on (default: 3000)
        #[arg(long)]
        port: Option<u16>,
        /// SQLite database file
        #[arg(long)]
        db_path: Option<PathBuf>,
        /// Bind to all interfaces and allow cross-origin requests
        #[arg(long)]
        dev: bool,
    },
    /// Create .helpdesk/ and the database
    Init {
        #[arg(long)]
        db_path: Option<PathBuf>,
        /// Add the default board columns
        #[arg(long)]
        seed: bool,
    },
    /// Inspect or rearrange the board of a running server
    Board {
        #[command(subcommand)]
        command: BoardCommands,
    },
}

#[derive(Subcommand, Clone)]
pub enum BoardCommands {
    /// Print every column and its tickets
    Show {
        /// Server base URL (default: http://127.0.0.1:3000)
        #[arg(long)]
        server: Option<String>,
    },
    /// Drop a ticket over a column or another ticket
    Move {
        /// Ticket being dragged
        ticket: String,
        /// Column or ticket it is dropped over
        over: String,
        #[arg(long)]
        server: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = HelpdeskConfig::new(project_dir)?;

    let filter = if cli.verbose {
        Some("helpdesk=debug,tower_http=debug")
    } else {
        config.toml.logging.filter.as_deref()
    };
    helpdesk::logging::init(config.toml.log_json(), filter)?;

    match &cli.command {
        Commands::Serve { port, db_path, dev } => {
            cmd::cmd_serve(&config, *port, db_path.clone(), *dev).await?;
        }
        Commands::Init { db_path, seed } => {
            cmd::cmd_init(&config, db_path.clone(), *seed)?;
        }
        Commands::Board { command } => match command {
            BoardCommands::Show { server } => {
                cmd::cmd_board_show(&config.server_url(server.clone())).await?;
            }
            BoardCommands::Move {
                ticket,
                over,
                server,
            } => {
                cmd::cmd_board_move(&config.server_url(server.clone()), ticket, over).await?;
            }
        },
    }

    Ok(())
}
