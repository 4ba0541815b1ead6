use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dialoguer::{Input, Password};
use env_logger::{Builder, Target};
use log::LevelFilter;
use lumen_client::{
    AuthRetryExecutor, CredentialStore, EncryptedCredentialStore,
    HttpTransport, MediaRepository, MemoryCredentialStore, SecureCredential,
    SessionManager,
};
use lumen_config::{ClientConfig, ConfigLoader};
use lumen_model::{ItemId, ItemQuery, LibraryId, MediaItem};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "lumen", about = "Headless client for Jellyfin-style media servers")]
struct Cli {
    /// Config file (TOML or JSON)
    #[arg(long, global = true, env = "LUMEN_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Keep credentials in memory only
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Server URL (overrides config)
    #[arg(long, global = true)]
    server: Option<String>,

    #[arg(long, short, global = true, env = "LUMEN_USERNAME")]
    username: Option<String>,

    /// Password; saved credentials are used when omitted
    #[arg(long, global = true, env = "LUMEN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the server's public information
    Info,
    /// Sign in and save credentials for later runs
    Login {
        /// Do not save the password
        #[arg(long)]
        no_remember: bool,
    },
    /// List libraries
    Libraries,
    /// List items of a library
    Items {
        library_id: String,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        start: u32,
    },
    /// Search by name across all libraries
    Search {
        term: String,
        #[arg(long, default_value_t = 25)]
        limit: u32,
    },
    /// Partially watched items
    Continue,
    /// Mark an item watched
    Watched {
        item_id: String,
        /// Mark unwatched instead
        #[arg(long)]
        unset: bool,
    },
    /// Mark an item favorite
    Favorite {
        item_id: String,
        /// Remove from favorites instead
        #[arg(long)]
        unset: bool,
    },
    /// Sign out
    Logout {
        /// Also delete saved credentials
        #[arg(long)]
        forget: bool,
    },
}

fn init_logger() {
    Builder::new()
        .target(Target::Stderr)
        .filter_level(LevelFilter::Warn)
        .filter_module("lumen_client", LevelFilter::Debug)
        .filter_module("lumen", LevelFilter::Debug)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        init_logger();
    } else {
        env_logger::init();
    }

    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    let load = loader.load().context("failed to load configuration")?;
    for warning in &load.warnings {
        log::warn!("{}", warning);
    }
    let config = load.config;

    if cli.ephemeral {
        run(cli, &config, Arc::new(MemoryCredentialStore::new())).await
    } else {
        let store =
            EncryptedCredentialStore::new(&config.storage.credentials_dir);
        run(cli, &config, Arc::new(store)).await
    }
}

async fn run<S: CredentialStore>(
    cli: Cli,
    config: &ClientConfig,
    credentials: Arc<S>,
) -> Result<()> {
    let server_url = cli
        .server
        .clone()
        .or_else(|| config.server_url.clone())
        .context("no server given; pass --server or set LUMEN_SERVER_URL")?;

    let transport = Arc::new(HttpTransport::from_config(config));
    let manager = Arc::new(SessionManager::new(transport, credentials));

    if let Command::Info = cli.command {
        let info = manager.server_info(&server_url).await?;
        println!("{} {} ({})", info.server_name, info.version, info.id);
        return Ok(());
    }

    let username = match cli.username.clone() {
        Some(username) => username,
        None => Input::<String>::new().with_prompt("Username").interact_text()?,
    };

    if let Command::Logout { forget } = cli.command {
        if let Err(e) = manager.resume(&server_url, &username).await {
            log::debug!("No session to revoke: {}", e);
        }
        manager.logout(forget).await?;
        if forget {
            manager.forget_credentials(&server_url, &username).await?;
        }
        println!("Signed out");
        return Ok(());
    }

    let remember = !matches!(cli.command, Command::Login { no_remember: true });
    let session = match cli.password.clone() {
        Some(password) => {
            let password = SecureCredential::new(password);
            manager
                .login(&server_url, &username, &password, remember)
                .await?
        }
        None => match manager.resume(&server_url, &username).await {
            Ok(session) => session,
            Err(_) => {
                let password = SecureCredential::new(
                    Password::new().with_prompt("Password").interact()?,
                );
                manager
                    .login(&server_url, &username, &password, remember)
                    .await?
            }
        },
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let repository =
        MediaRepository::new(AuthRetryExecutor::new(manager)).scoped(cancel);

    match cli.command {
        Command::Login { .. } => {
            println!(
                "Signed in as {} on {}",
                session.username().unwrap_or(&username),
                session.server_url()
            );
        }
        Command::Libraries => {
            for library in repository.libraries().await? {
                println!(
                    "{:<36} {:<12} {}",
                    library.id.as_str(),
                    library.collection_type().display_name(),
                    library.name
                );
            }
        }
        Command::Items {
            library_id,
            limit,
            start,
        } => {
            let page = repository
                .library_items(
                    &LibraryId::new(library_id),
                    ItemQuery::new().page(start, limit),
                )
                .await?;
            print_items(&page.items);
            println!(
                "-- {} of {} (from {})",
                page.items.len(),
                page.total_record_count,
                page.start_index
            );
        }
        Command::Search { term, limit } => {
            print_items(&repository.search(&term, limit).await?);
        }
        Command::Continue => {
            print_items(&repository.continue_watching().await?);
        }
        Command::Watched { item_id, unset } => {
            let item_id = ItemId::new(item_id);
            let data = if unset {
                repository.mark_unwatched(&item_id).await?
            } else {
                repository.mark_watched(&item_id).await?
            };
            println!("{} played: {}", item_id, data.played);
        }
        Command::Favorite { item_id, unset } => {
            let item_id = ItemId::new(item_id);
            let data = repository.toggle_favorite(&item_id, !unset).await?;
            println!("{} favorite: {}", item_id, data.is_favorite);
        }
        Command::Info | Command::Logout { .. } => {
            bail!("command already handled")
        }
    }
    Ok(())
}

fn print_items(items: &[MediaItem]) {
    for item in items {
        let year = item
            .production_year
            .map(|y| format!(" ({y})"))
            .unwrap_or_default();
        let marker = if item.is_played() { "*" } else { " " };
        println!("{} {:<36} {}{}", marker, item.id.as_str(), item.name, year);
    }
}
