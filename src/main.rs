use std::fs;
use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use referral_ledger::models::accounts::RegisterAccount;
use referral_ledger::repositories::{
    memory::MemoryLedgerStore, postgres::PgLedgerStore, LedgerStore,
};
use referral_ledger::services;
use referral_ledger::settings::{Settings, StorageBackend};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    #[arg(long, default_value = "log4rs.yaml")]
    log4rs: String,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Create an account that can toggle permissions and process withdrawals
    CreateSuperuser {
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long)]
        phone_number: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    let settings = Settings::new(&args.config).expect("Could not load config file.");

    init_logging(&args.log4rs).expect("Failed to initialize logging.");
    log::info!("Starting referral ledger.");

    match settings.storage.backend {
        StorageBackend::Postgres => {
            let conn = PgPoolOptions::new()
                .max_connections(settings.postgres.max_connections)
                .connect(&settings.postgres.url)
                .await
                .expect("Could not connect to database.");

            let store = PgLedgerStore::new(conn);
            store.migrate().await?;

            run(store, args.command, &settings).await
        }
        StorageBackend::Memory => {
            log::warn!("Using the in-memory store, nothing survives a restart.");
            run(MemoryLedgerStore::new(), args.command, &settings).await
        }
    }
}

async fn run<S: LedgerStore>(
    store: S,
    command: Option<Command>,
    settings: &Settings,
) -> Result<()> {
    match command.unwrap_or(Command::Serve) {
        Command::Serve => services::start_services(store, settings).await,
        Command::CreateSuperuser {
            username,
            email,
            phone_number,
        } => {
            let registration = RegisterAccount {
                username,
                email,
                phone_number,
                referral_code: None,
                referrer_code: None,
            };
            let account = services::accounts::create_superuser(&store, &registration).await?;
            println!("[*] Superuser created: {}", account.id);

            Ok(())
        }
    }
}

fn init_logging(path: &str) -> Result<(), anyhow::Error> {
    if !Path::new("logs").exists() {
        fs::create_dir("logs")?;
    }

    match log4rs::init_file(path, Default::default()) {
        Ok(_) => {
            println!("[*] Logging initialized successfully.");
            Ok(())
        }
        Err(e) => {
            println!("[ERROR] Failed to initialize logging: {}", e);
            Err(anyhow::anyhow!("Could not initialize logging: {}", e))
        }
    }
}
