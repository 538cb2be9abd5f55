use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lectern::auth::{SecretHasher, validate_password_policy};
use lectern::config::ServerConfig;
use lectern::server::{AppState, create_router};
use lectern::store::{SqliteStore, Store};
use lectern::system::backup::{create_pending_backup, run_backup};
use lectern::system::{
    DEFAULT_SETTINGS, Maintenance, NewUser, RuntimeSettings, cleanup_expired_shares,
    create_account, generate_password, seed_default_categories,
};
use lectern::types::{BackupStatus, Role};

const NOT_INITIALIZED: &str =
    "Server not initialized. Run 'lectern admin init' first to create the database and administrator.";

#[cfg(unix)]
fn set_restrictive_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        tracing::warn!("Failed to set permissions on {}: {e}", path.display());
    }
}

#[derive(Parser)]
#[command(name = "lectern")]
#[command(about = "A document management server for teaching departments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where to find configuration and data. Flags win over the config file.
#[derive(Args)]
struct Location {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for the database, files and backups
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

impl Location {
    fn resolve(&self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(data_dir) = &self.data_dir {
            config.data_dir.clone_from(data_dir);
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },

    /// Start the server
    Serve {
        #[command(flatten)]
        location: Location,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Initialize the server (create database and first administrator)
    Init {
        #[command(flatten)]
        location: Location,

        /// Administrator username
        #[arg(long, default_value = "admin")]
        username: String,

        /// Skip interactive prompts and generate a password
        #[arg(long)]
        non_interactive: bool,
    },

    /// Run a backup now
    Backup {
        #[command(flatten)]
        location: Location,

        /// Backup name
        #[arg(long, default_value = "manual")]
        name: String,
    },

    /// Deactivate expired share links
    CleanupShares {
        #[command(flatten)]
        location: Location,
    },

    /// Create the default document categories that are missing
    SeedCategories {
        #[command(flatten)]
        location: Location,

        /// Administrator recorded as the creator
        #[arg(long, default_value = "admin")]
        admin: String,
    },
}

fn open_store(config: &ServerConfig) -> anyhow::Result<SqliteStore> {
    fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;
    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;
    store.insert_missing_config(DEFAULT_SETTINGS)?;
    Ok(store)
}

/// Opens the store of a server that has been through `admin init`.
fn open_initialized(config: &ServerConfig) -> anyhow::Result<SqliteStore> {
    if !config.db_path().exists() {
        bail!(NOT_INITIALIZED);
    }
    let store = open_store(config)?;
    if !store.has_admin()? {
        bail!(NOT_INITIALIZED);
    }
    Ok(store)
}

fn prompt_password() -> anyhow::Result<String> {
    let password = inquire::Password::new("Administrator password:")
        .with_validator(|input: &str| match validate_password_policy(input) {
            Ok(()) => Ok(inquire::validator::Validation::Valid),
            Err(message) => Ok(inquire::validator::Validation::Invalid(message.into())),
        })
        .with_custom_confirmation_message("Confirm password:")
        .with_custom_confirmation_error_message("The passwords don't match.")
        .prompt()?;
    Ok(password)
}

fn run_init(config: &ServerConfig, username: String, non_interactive: bool) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let credentials = config.credentials_path();

    if store.has_admin()? {
        bail!(
            "Server already initialized. Administrator credentials were written to: {}",
            credentials.display()
        );
    }

    let password = if non_interactive {
        generate_password()
    } else {
        prompt_password()?
    };

    let settings = RuntimeSettings::load(&store)?;
    let admin = create_account(
        &store,
        &SecretHasher::new(),
        NewUser {
            employee_id: username.clone(),
            username,
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            department: String::new(),
            role: Role::Admin,
            password: password.clone(),
            storage_quota: settings.default_storage_quota_bytes(),
            must_change_password: non_interactive,
        },
    )?;

    let seeded = seed_default_categories(&store, &admin.id)?;

    fs::write(
        &credentials,
        format!("username: {}\npassword: {password}\n", admin.username),
    )?;

    #[cfg(unix)]
    set_restrictive_permissions(&credentials);

    println!();
    println!("========================================");
    println!("Administrator '{}' created.", admin.username);
    if non_interactive {
        println!();
        println!("  Password: {password}");
        println!();
        println!("The password must be changed at first login.");
    }
    println!("Created {seeded} default categories.");
    println!("Credentials written to: {}", credentials.display());
    println!("========================================");
    println!();

    Ok(())
}

fn run_seed_categories(config: &ServerConfig, username: &str) -> anyhow::Result<()> {
    let store = open_initialized(config)?;
    let admin = store
        .get_user_by_username(username)?
        .filter(|u| u.is_admin())
        .ok_or_else(|| anyhow::anyhow!("No administrator named '{username}'"))?;

    let created = seed_default_categories(&store, &admin.id)?;
    println!("Created {created} categor{}", if created == 1 { "y" } else { "ies" });
    Ok(())
}

fn run_backup_now(config: &ServerConfig, name: &str) -> anyhow::Result<()> {
    let store = open_initialized(config)?;
    let pending = create_pending_backup(&store, name, "Created from the command line", None)?;
    let backup = run_backup(&store, config, &pending.id)?;

    match backup.status {
        BackupStatus::Completed => {
            let file_name = backup.file_name.unwrap_or_default();
            println!(
                "Backup written to {}",
                config.backups_dir().join(file_name).display()
            );
            Ok(())
        }
        _ => bail!(
            "Backup failed: {}",
            backup.error_message.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}

async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let store = open_initialized(&config)?;
    info!("Data directory: {}", config.data_dir.display());

    let store: Arc<dyn Store> = Arc::new(store);
    let maintenance = Maintenance::new(Arc::clone(&store), config.clone()).start();

    let state = Arc::new(AppState::new(store, config.clone()));
    let app = create_router(state);
    let addr = config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    maintenance.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lectern=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Admin { command } => match command {
            AdminCommands::Init {
                location,
                username,
                non_interactive,
            } => {
                run_init(&location.resolve()?, username, non_interactive)?;
            }
            AdminCommands::Backup { location, name } => {
                run_backup_now(&location.resolve()?, &name)?;
            }
            AdminCommands::CleanupShares { location } => {
                let store = open_initialized(&location.resolve()?)?;
                let count = cleanup_expired_shares(&store, chrono::Utc::now())?;
                println!("Deactivated {count} expired share link(s)");
            }
            AdminCommands::SeedCategories { location, admin } => {
                run_seed_categories(&location.resolve()?, &admin)?;
            }
        },
        Commands::Serve {
            location,
            host,
            port,
        } => {
            let mut config = location.resolve()?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await?;
        }
    }

    Ok(())
}
