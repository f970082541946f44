use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use tracing::error;
use vigil_adapters::{
    configuration, telemetry, FileAccountRepository, SteamAuthGateway, SteamConfirmationTransport,
    SteamTimeEndpoint,
};
use vigil_core::clock::ClockSync;
use vigil_core::config::Settings;
use vigil_core::confirmations::ConfirmationEngine;
use vigil_core::entities::AccountId;
use vigil_core::guard_code::CodeGenerator;
use vigil_core::mafile::MaFileRecord;
use vigil_core::ports::AccountRepository;
use vigil_core::secret_store::SecretStore;
use vigil_core::session::SessionManager;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // --- Account commands ---
    /// List managed accounts
    Accounts,

    /// Import a single account record (.maFile)
    Import { path: PathBuf },

    /// Import every .maFile from a folder
    ImportFolder { path: PathBuf },

    /// Export an account record to a file
    Export {
        /// Account name
        username: String,

        /// Destination path
        output: PathBuf,
    },

    /// Remove a managed account and its stored record
    Remove {
        /// Account name
        username: String,

        /// Skip confirmation prompt
        #[arg(short, long, default_value = "false")]
        yes: bool,
    },

    // --- Authenticator commands ---
    /// Show the current guard code
    Code {
        /// Account name (optional when only one account is managed)
        #[arg(short, long)]
        username: Option<String>,

        /// Keep printing codes as they rotate
        #[arg(short, long, default_value = "false")]
        watch: bool,
    },

    /// Query the remote clock and show the applied offset
    SyncTime,

    /// Refresh the session's access token
    Refresh {
        /// Account name (optional when only one account is managed)
        #[arg(short, long)]
        username: Option<String>,
    },

    // --- Confirmation commands ---
    /// List pending confirmations
    Confirmations {
        /// Account name (optional when only one account is managed)
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Accept pending confirmations
    Accept {
        /// Account name (optional when only one account is managed)
        #[arg(short, long)]
        username: Option<String>,

        /// Confirmation id to accept (mutually exclusive with --all)
        #[arg(short, long)]
        id: Option<String>,

        /// Accept every pending confirmation
        #[arg(long, default_value = "false")]
        all: bool,

        /// Skip confirmation prompt
        #[arg(short, long, default_value = "false")]
        yes: bool,
    },

    /// Deny pending confirmations
    Deny {
        /// Account name (optional when only one account is managed)
        #[arg(short, long)]
        username: Option<String>,

        /// Confirmation id to deny (mutually exclusive with --all)
        #[arg(short, long)]
        id: Option<String>,

        /// Deny every pending confirmation
        #[arg(long, default_value = "false")]
        all: bool,

        /// Skip confirmation prompt
        #[arg(short, long, default_value = "false")]
        yes: bool,
    },
}

fn default_mafiles_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "vigil", "vigil")
        .map(|d| d.data_dir().join("maFiles"))
        .unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("vigil")
                .join("maFiles")
        })
}

/// The assembled engine for one CLI invocation.
struct App {
    settings: Settings,
    store: Arc<SecretStore>,
    repo: FileAccountRepository,
    sessions: Arc<SessionManager<SteamAuthGateway>>,
    clock: Arc<ClockSync<SteamTimeEndpoint>>,
}

impl App {
    async fn load(settings: Settings) -> anyhow::Result<Self> {
        let mafiles_dir = settings
            .mafiles_dir
            .clone()
            .unwrap_or_else(default_mafiles_dir);
        let repo = FileAccountRepository::new(mafiles_dir);

        let store = Arc::new(SecretStore::new());
        for record in repo.scan().await? {
            let name = record.account_name.clone();
            match record.into_account() {
                Ok(account) => {
                    store.put(account);
                }
                Err(e) => {
                    error!(account = %name, ?e, "skipping invalid account record");
                    println!("Warning: skipping invalid record for '{}': {}", name, e);
                }
            }
        }

        let gateway = Arc::new(SteamAuthGateway::new(&settings)?);
        let sessions = Arc::new(SessionManager::new(store.clone(), gateway));
        let endpoint = Arc::new(SteamTimeEndpoint::new(&settings)?);
        let clock = Arc::new(ClockSync::new(endpoint, settings.clock.max_age()));

        Ok(Self {
            settings,
            store,
            repo,
            sessions,
            clock,
        })
    }

    fn resolve_account(&self, username: Option<&str>) -> anyhow::Result<AccountId> {
        if let Some(username) = username {
            let id = AccountId::new(username);
            self.store.get(&id)?;
            return Ok(id);
        }

        let accounts = self.store.list();
        match accounts.len() {
            0 => anyhow::bail!("No accounts configured. Use 'import' first."),
            1 => Ok(accounts[0].id.clone()),
            _ => anyhow::bail!(
                "Multiple accounts configured ({}); pass --username.",
                accounts
                    .iter()
                    .map(|a| a.account_name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    fn generator(&self) -> CodeGenerator<SteamTimeEndpoint> {
        CodeGenerator::new(self.store.clone(), self.clock.clone())
    }

    fn engine(
        &self,
    ) -> anyhow::Result<
        ConfirmationEngine<SteamAuthGateway, SteamConfirmationTransport, SteamTimeEndpoint>,
    > {
        let transport = Arc::new(SteamConfirmationTransport::new(&self.settings)?);
        Ok(ConfirmationEngine::new(
            self.store.clone(),
            self.sessions.clone(),
            transport,
            self.clock.clone(),
        ))
    }

    /// Write the account's current state back to its maFile (the session may
    /// have been refreshed or cleared by the engine).
    async fn persist(&self, id: &AccountId) -> anyhow::Result<()> {
        let account = self.store.get(id)?;
        self.repo.save(&account.to_record()).await?;
        Ok(())
    }

    async fn import_record(&self, record: MaFileRecord) -> anyhow::Result<String> {
        let account = record.into_account()?;
        let name = account.account_name.clone();
        let record = account.to_record();
        self.repo.save(&record).await?;
        self.store.put(account);
        Ok(name)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let _guard = telemetry::init_subscriber("vigil_cli", "info");

    let settings = match configuration::get_configuration() {
        Ok(s) => s,
        Err(e) => {
            error!(?e, "failed to load configuration");
            return Err(anyhow::anyhow!("configuration loading failed"));
        }
    };

    let cli = Cli::parse();
    let app = App::load(settings).await?;

    match &cli.command {
        Commands::Accounts => {
            let accounts = app.store.list();
            if accounts.is_empty() {
                println!("No accounts configured.");
                println!("Use 'vigil_cli import <file.maFile>' to add one.");
            } else {
                println!("Managed accounts:");
                for account in &accounts {
                    let session_state = match &account.session {
                        None => "no session",
                        Some(s) if s.refresh_expired(unix_now()) => "session expired",
                        Some(s) if s.access_expired(unix_now()) => "session (needs refresh)",
                        Some(_) => "session active",
                    };
                    println!(
                        "  {} {}[{}]",
                        account.account_name,
                        if account.secrets.is_some() {
                            ""
                        } else {
                            "[read-only] "
                        },
                        session_state,
                    );
                }
            }
        }

        Commands::Import { path } => {
            let content = tokio::fs::read_to_string(path).await?;
            let record: MaFileRecord = serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("not a valid account record: {}", e))?;
            match app.import_record(record).await {
                Ok(name) => println!("Imported account '{}'.", name),
                Err(e) => {
                    println!("Import failed: {}", e);
                }
            }
        }

        Commands::ImportFolder { path } => {
            if !path.is_dir() {
                println!("Not a directory: {}", path.display());
                return Ok(());
            }

            let source = FileAccountRepository::new(path.clone());
            let records = source.scan().await?;
            if records.is_empty() {
                println!("No .maFile records found in {}", path.display());
                return Ok(());
            }

            let mut imported = 0usize;
            let mut failed = 0usize;
            for record in records {
                let name = record.account_name.clone();
                match app.import_record(record).await {
                    Ok(name) => {
                        println!("  Imported: {}", name);
                        imported += 1;
                    }
                    Err(e) => {
                        println!("  Failed ({}): {}", name, e);
                        failed += 1;
                    }
                }
            }
            println!("Imported {} account(s), {} failed.", imported, failed);
        }

        Commands::Export { username, output } => {
            let id = app.resolve_account(Some(username))?;
            let account = app.store.get(&id)?;
            let content = serde_json::to_string_pretty(&account.to_record())?;
            tokio::fs::write(output, content).await?;
            println!("Exported '{}' to {}", username, output.display());
        }

        Commands::Remove { username, yes } => {
            let id = app.resolve_account(Some(username))?;
            let account = app.store.get(&id)?;

            let confirmed = *yes
                || Confirm::new()
                    .with_prompt(format!(
                        "Remove account '{}' and delete its stored record?",
                        username
                    ))
                    .default(false)
                    .interact()?;
            if !confirmed {
                println!("Cancelled.");
                return Ok(());
            }

            app.repo.delete(&account.to_record()).await?;
            app.store.remove(&id)?;
            println!("Account '{}' removed.", username);
        }

        Commands::Code { username, watch } => {
            let id = app.resolve_account(username.as_deref())?;
            let generator = app.generator();

            if *watch {
                println!("Press Ctrl-C to stop.");
                let mut last = String::new();
                loop {
                    let guard_code = generator.current_code(&id).await?;
                    if guard_code.code != last {
                        println!("{}  (valid {:>2}s)", guard_code.code, guard_code.expires_in);
                        last = guard_code.code;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            } else {
                let guard_code = generator.current_code(&id).await?;
                println!("{}", guard_code.code);
                println!("Valid for {} more seconds.", guard_code.expires_in);
            }
        }

        Commands::SyncTime => {
            match app.clock.resync().await {
                Ok(offset) => {
                    println!("Clock offset: {:+} seconds", offset);
                }
                Err(e) => {
                    error!(?e, "clock sync failed");
                    println!("Clock sync failed: {}", e);
                    println!("Codes will use the local clock until the service is reachable.");
                }
            }
        }

        Commands::Refresh { username } => {
            let id = app.resolve_account(username.as_deref())?;
            match app.sessions.force_refresh(&id).await {
                Ok(_) => {
                    app.persist(&id).await?;
                    let session = app.store.get(&id)?.session;
                    if let Some(expiry) = session.and_then(|s| s.access_expires_at()) {
                        println!("Session refreshed; access token valid until {}.", expiry);
                    } else {
                        println!("Session refreshed.");
                    }
                }
                Err(e) => {
                    app.persist(&id).await?;
                    println!("Refresh failed: {}", e);
                }
            }
        }

        Commands::Confirmations { username } => {
            let id = app.resolve_account(username.as_deref())?;
            let engine = app.engine()?;

            let confirmations = engine.list(&id).await;
            app.persist(&id).await?;
            let confirmations = confirmations?;

            if confirmations.is_empty() {
                println!("No pending confirmations.");
            } else {
                println!("Pending confirmations:");
                for confirmation in &confirmations {
                    println!(
                        "  [{}] {}: {}",
                        confirmation.id, confirmation.kind, confirmation.headline
                    );
                    for line in &confirmation.summary {
                        println!("        {}", line);
                    }
                }
            }
        }

        Commands::Accept {
            username,
            id,
            all,
            yes,
        } => {
            respond(&app, username.as_deref(), id.as_deref(), *all, *yes, true).await?;
        }

        Commands::Deny {
            username,
            id,
            all,
            yes,
        } => {
            respond(&app, username.as_deref(), id.as_deref(), *all, *yes, false).await?;
        }
    }

    Ok(())
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Shared accept/deny flow: select the targets, confirm, resolve, report.
async fn respond(
    app: &App,
    username: Option<&str>,
    target_id: Option<&str>,
    all: bool,
    yes: bool,
    accept: bool,
) -> anyhow::Result<()> {
    let verb = if accept { "Accept" } else { "Deny" };

    if target_id.is_none() && !all {
        println!("Pass a confirmation id (--id) or --all.");
        return Ok(());
    }
    if target_id.is_some() && all {
        println!("--id and --all are mutually exclusive.");
        return Ok(());
    }

    let id = app.resolve_account(username)?;
    let engine = app.engine()?;

    let pending = engine.list(&id).await;
    if pending.is_err() {
        app.persist(&id).await?;
    }
    let pending = pending?;

    let targets: Vec<_> = match target_id {
        Some(target) => pending.into_iter().filter(|c| c.id == target).collect(),
        None => pending,
    };
    if targets.is_empty() {
        app.persist(&id).await?;
        println!("Nothing to do.");
        return Ok(());
    }

    println!("{} {} confirmation(s):", verb, targets.len());
    for confirmation in &targets {
        println!("  [{}] {}", confirmation.id, confirmation.headline);
    }

    let confirmed = yes
        || Confirm::new()
            .with_prompt(format!("{} the above?", verb))
            .default(false)
            .interact()?;
    if !confirmed {
        println!("Cancelled.");
        return Ok(());
    }

    let outcomes = engine.resolve_all(&id, &targets, accept).await;
    app.persist(&id).await?;

    let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
    println!("{} of {} succeeded.", succeeded, outcomes.len());
    for outcome in outcomes.iter().filter(|o| !o.succeeded()) {
        if let Err(e) = &outcome.result {
            println!("  [{}] failed: {}", outcome.confirmation_id, e);
        }
    }

    Ok(())
}
