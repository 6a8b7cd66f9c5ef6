//! Koi Farm CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! koi-cli migrate
//!
//! # Bootstrap a manager account (password from KOI_MANAGER_PASSWORD)
//! koi-cli manager create -u owner -n "Farm Owner"
//!
//! # Upsert catalog fish from YAML
//! koi-cli seed fish demos/fish.yaml
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `manager create` - Create a manager account
//! - `seed fish` - Load the fish catalog

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "koi-cli")]
#[command(author, version, about = "Koi Farm CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage manager accounts
    Manager {
        #[command(subcommand)]
        action: ManagerAction,
    },
    /// Seed the database
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
}

#[derive(Subcommand)]
enum ManagerAction {
    /// Create a manager account
    Create {
        /// Login name
        #[arg(short, long)]
        username: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Contact email
        #[arg(short, long)]
        email: Option<String>,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Upsert catalog fish from a YAML file
    Fish {
        /// Path to the YAML file
        file: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Manager { action } => match action {
            ManagerAction::Create {
                username,
                name,
                email,
            } => {
                commands::manager::create(&username, &name, email).await?;
            }
        },
        Commands::Seed { target } => match target {
            SeedTarget::Fish { file } => commands::seed::fish(&file).await?,
        },
    }
    Ok(())
}
