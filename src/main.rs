//! Odoo Session - command-line host for the session and config stores
//!
//! Run with `odoo-session --help` for usage.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, bail};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use odoo_session::{
    APP_NAME, ConfigStore, Enrichment, FileStore, OdooClient, Persistence, RequestContext,
    SessionStore, Settings, VERSION,
};

#[derive(Parser)]
#[command(name = APP_NAME)]
#[command(version = VERSION)]
#[command(about = "Session and server configuration for Odoo clients")]
#[command(long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the active server configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Log in and fetch an API token
    Login {
        /// Odoo login (usually an email address)
        user: String,

        /// Password
        #[arg(short, long, env = "ODOO_PASSWORD", hide_env_values = true)]
        password: String,

        /// Server URL (default: the stored one)
        #[arg(long)]
        url: Option<String>,

        /// Database (default: the stored one)
        #[arg(long)]
        db: Option<String>,
    },

    /// Show the stored server and last user
    Status,

    /// Remove the stored user profile
    Logout,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set the server URL and database
    Set { url: String, database: String },

    /// Show settings and the active server
    Show,

    /// Write a settings file with defaults
    Init,
}

fn setup_logging(debug: bool, log_file: Option<&PathBuf>) -> Result<()> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        // Use info level for our crate, warn for dependencies
        EnvFilter::new("info")
            .add_directive("reqwest=warn".parse()?)
            .add_directive("hyper=warn".parse()?)
    };

    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(file).with_target(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(filter)
            .init();
    }

    Ok(())
}

/// Everything the commands share, wired the way an application would at startup
struct Services {
    storage: Arc<FileStore>,
    config: ConfigStore,
    session: SessionStore,
    client: OdooClient,
}

impl Services {
    async fn start(settings: &Settings) -> Result<Self> {
        let storage = Arc::new(FileStore::from_settings(settings)?);
        let config = ConfigStore::new(storage.clone());
        config.restore_config().await;

        let client = OdooClient::new(config.clone(), settings)?;
        let session = SessionStore::new(Arc::new(client.clone()), storage.clone());

        Ok(Self {
            storage,
            config,
            session,
            client,
        })
    }
}

fn report_persistence(what: &str, persistence: &Persistence) {
    if let Persistence::Failed { reason } = persistence {
        eprintln!("Warning: {} kept in memory only: {}", what, reason);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install color-eyre error hooks
    color_eyre::install()?;

    let cli = Cli::parse();

    // Load settings
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load settings, using defaults: {}", e);
        Settings::default()
    });

    setup_logging(cli.debug || settings.debug, settings.log_file.as_ref())?;
    info!("Starting {} v{}", APP_NAME, VERSION);

    let services = Services::start(&settings).await?;

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Set { url, database } => {
                let persistence = services.config.set_config(&url, &database).await;
                report_persistence("server configuration", &persistence);
                println!("Server: {}", services.config.snapshot());
            }
            ConfigAction::Show => {
                println!("Settings:");
                println!("{}", toml::to_string_pretty(&settings)?);
                println!("Server: {}", services.config.snapshot());
                println!("Storage: {:?}", services.storage.path());
            }
            ConfigAction::Init => {
                let path = match &cli.config {
                    Some(path) => {
                        settings.save_to(path)?;
                        path.clone()
                    }
                    None => settings.save()?,
                };
                println!("Settings initialized at {:?}", path);
            }
        },

        Commands::Login {
            user,
            password,
            url,
            db,
        } => {
            if url.is_some() || db.is_some() {
                let url = url.unwrap_or_else(|| services.config.base_url());
                let db = db.unwrap_or_else(|| services.config.database());
                let persistence = services.config.set_config(&url, &db).await;
                report_persistence("server configuration", &persistence);
            }

            if !services.config.is_configured() {
                bail!("No server configured. Use 'config set <URL> <DB>' or pass --url and --db.");
            }

            let profile = services.client.authenticate(&user, &password).await?;
            let outcome = services.session.login(profile).await;

            let name = outcome
                .state
                .user
                .as_ref()
                .and_then(|u| u.name.clone())
                .unwrap_or_else(|| user.clone());
            println!("Logged in as {} on {}", name, services.config.snapshot());

            match &outcome.enrichment {
                Enrichment::Enriched => println!("API token issued"),
                Enrichment::Degraded { reason } => {
                    println!("Continuing without API token: {}", reason)
                }
                Enrichment::Skipped => println!("No user id returned; no API token requested"),
                Enrichment::Superseded => println!("Session changed before the token arrived"),
            }
            report_persistence("user profile", &outcome.persistence);

            let ctx = RequestContext::current(&services.config, &services.session)?;
            info!(
                "Request context ready for {} (authenticated: {})",
                ctx.database,
                ctx.is_authenticated()
            );
        }

        Commands::Status => {
            println!("Server: {}", services.config.snapshot());
            match services.session.restore_user().await {
                Some(user) => {
                    let id = user
                        .user_id()
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "Last user: {} (id {}, token: {}, keys: {})",
                        user.name.as_deref().unwrap_or("<unnamed>"),
                        id,
                        if user.has_token() { "yes" } else { "no" },
                        user.api_keys.len()
                    );
                }
                None => println!("Last user: none"),
            }
            println!("Login state lives in the running process; only the profile above is stored");
        }

        Commands::Logout => {
            if services.session.forget_user().await? {
                println!("Stored user profile removed");
            } else {
                println!("No stored user profile");
            }
        }
    }

    Ok(())
}
