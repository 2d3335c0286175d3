mod auth;
mod config;
mod error;
mod fetch;
mod record;
mod remote;
mod sanitize;
mod store;
mod summary;
mod sync;
mod writer;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auth::{CredentialProvider, TokenStore};
use config::Config;
use error::Error;
use remote::people::PeopleClient;
use sync::{ImportPlan, ImportSource, SyncEngine};
use writer::BatchWriter;

#[derive(Parser, Debug)]
#[command(name = "peoplesync", version, about = "Export and import Google contacts as JSON")]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export, import and clean contacts
    Contacts {
        #[command(subcommand)]
        command: ContactsCommand,
    },
    /// Inspect contact groups
    ContactGroups {
        #[command(subcommand)]
        command: GroupsCommand,
    },
    /// Offline helpers for exported data
    Utils {
        #[command(subcommand)]
        command: UtilsCommand,
    },
    /// Manage stored account sessions
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ContactsCommand {
    /// Write every contact of an account to a JSON file
    Export(ExportArgs),
    /// Create contacts in an account from a JSON file
    Import(ImportArgs),
    /// Remove external ids left behind by earlier imports
    Clean(AccountArgs),
}

#[derive(Subcommand, Debug)]
enum GroupsCommand {
    /// List the contact groups of an account
    List(ListGroupsArgs),
}

#[derive(Subcommand, Debug)]
enum UtilsCommand {
    /// Print statistics about an exported contacts file
    SummarizeData(SummarizeArgs),
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Authorize an account and store its session
    Login(AccountArgs),
}

#[derive(Args, Debug)]
struct AccountArgs {
    /// Account email address
    #[arg(long)]
    account: Option<String>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Account email address
    #[arg(long)]
    account: Option<String>,

    /// Destination JSON file
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Account receiving the contacts
    #[arg(long)]
    destination_account: Option<String>,

    /// JSON file produced by `contacts export`
    #[arg(long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Read contacts straight from another account
    #[arg(long)]
    source_account: Option<String>,

    /// Groups (names or resource names) added to every contact, comma separated
    #[arg(long, value_delimiter = ',')]
    contact_groups: Vec<String>,

    /// Only import the first N contacts
    #[arg(long)]
    limit: Option<usize>,

    /// Where contacts of failed batches are written
    #[arg(long, value_name = "FILE")]
    failed_output: Option<PathBuf>,

    /// Where the created contacts are written
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ListGroupsArgs {
    /// Account email address
    #[arg(long)]
    account: Option<String>,

    /// Also write the groups to a JSON file
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SummarizeArgs {
    /// Exported contacts file
    #[arg(long, value_name = "FILE")]
    file: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "peoplesync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Contacts { command } => match command {
            ContactsCommand::Export(args) => handle_export(args, config_path).await,
            ContactsCommand::Import(args) => handle_import(args, config_path).await,
            ContactsCommand::Clean(args) => {
                required(args.account, "account")?;
                Err(Error::Unimplemented("external id cleanup".into()).into())
            }
        },
        Command::ContactGroups { command } => match command {
            GroupsCommand::List(args) => handle_list_groups(args, config_path).await,
        },
        Command::Utils { command } => match command {
            UtilsCommand::SummarizeData(args) => handle_summarize(args),
        },
        Command::Auth { command } => match command {
            AuthCommand::Login(args) => handle_login(args, config_path).await,
        },
    }
}

/// Missing flags are reported by us rather than clap so they exit with 1
fn required<T>(value: Option<T>, flag: &str) -> Result<T, Error> {
    value.ok_or_else(|| Error::validation(format!("missing required flag --{flag}")))
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    let config = config::load(path.as_deref()).context("failed to load configuration")?;
    debug!(path = %config.config_path.display(), "configuration loaded");
    Ok(config)
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("peoplesync/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

/// Resolve the account's session once and bind a client to it
async fn connect(config: &Config, account: &str) -> Result<PeopleClient> {
    let http = http_client()?;
    let tokens = TokenStore::new(config.token_dir.clone(), config.oauth.clone(), http.clone());
    let credential = tokens
        .authorize(account)
        .await
        .with_context(|| format!("failed to authorize {account}"))?;
    Ok(PeopleClient::new(http, config.api.base_url.clone(), credential))
}

fn batch_writer(config: &Config) -> BatchWriter {
    BatchWriter::new(config.sync.batch_size, config.sync.batch_delay)
}

async fn handle_export(args: ExportArgs, config_path: Option<PathBuf>) -> Result<()> {
    let account = required(args.account, "account")?;
    let output = required(args.output, "output")?;

    let config = load_config(config_path)?;
    let client = connect(&config, &account).await?;
    let engine = SyncEngine::new(&client, batch_writer(&config));

    let result = engine
        .export(&output)
        .await
        .with_context(|| format!("failed to export contacts of {}", client.account()))?;

    println!(
        "Exported {} contact(s) from {} to {}",
        result.exported,
        client.account(),
        result.path.display()
    );
    Ok(())
}

async fn handle_import(args: ImportArgs, config_path: Option<PathBuf>) -> Result<()> {
    let destination = required(args.destination_account, "destination-account")?;
    let source = match (args.file, args.source_account) {
        (Some(_), Some(_)) => {
            return Err(
                Error::validation("--file and --source-account cannot be used together").into(),
            )
        }
        (Some(file), None) => ImportSource::File(file),
        (None, Some(account)) => ImportSource::Account(account),
        (None, None) => {
            return Err(Error::validation("missing required flag --file or --source-account").into())
        }
    };

    let records = sync::load_source(&source)?;
    let config = load_config(config_path)?;

    let plan = ImportPlan {
        limit: args.limit,
        groups: args.contact_groups,
        failed_output: args
            .failed_output
            .unwrap_or_else(|| config.sync.failed_output.clone()),
        output: args.output,
    };

    let client = connect(&config, &destination).await?;
    let engine = SyncEngine::new(&client, batch_writer(&config)).with_progress(true);

    let result = engine
        .import(records, &plan)
        .await
        .with_context(|| format!("failed to import contacts into {}", client.account()))?;

    result.print_summary();
    if let Some(err) = result.persist_errors.into_iter().next() {
        return Err(anyhow::Error::new(err)
            .context("contacts were imported but the results could not be saved"));
    }
    Ok(())
}

async fn handle_list_groups(args: ListGroupsArgs, config_path: Option<PathBuf>) -> Result<()> {
    let account = required(args.account, "account")?;

    let config = load_config(config_path)?;
    let client = connect(&config, &account).await?;
    let engine = SyncEngine::new(&client, batch_writer(&config));

    let groups = engine
        .list_groups()
        .await
        .with_context(|| format!("failed to list contact groups of {}", client.account()))?;

    if groups.is_empty() {
        println!("No contact groups for {}", client.account());
    } else {
        println!("{:<32} {:<12} {:>8}  {}", "NAME", "TYPE", "MEMBERS", "RESOURCE");
        for group in &groups {
            let name = group.formatted_name.as_deref().unwrap_or(&group.name);
            let members = group
                .member_count
                .map(|count| count.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:<32} {:<12} {:>8}  {}",
                name,
                group.group_type.label(),
                members,
                group.resource_name
            );
        }
    }

    if let Some(output) = args.output {
        store::write_json(&output, &groups)?;
        println!("Wrote {} group(s) to {}", groups.len(), output.display());
    }
    Ok(())
}

fn handle_summarize(args: SummarizeArgs) -> Result<()> {
    let file = required(args.file, "file")?;
    let records = store::read_records(&file)?;
    summary::summarize(&records).print();
    Ok(())
}

async fn handle_login(args: AccountArgs, config_path: Option<PathBuf>) -> Result<()> {
    let account = required(args.account, "account")?;

    let config = load_config(config_path)?;
    let tokens = TokenStore::new(config.token_dir.clone(), config.oauth.clone(), http_client()?);
    let session = tokens
        .login(&account)
        .await
        .with_context(|| format!("failed to authorize {account}"))?;

    println!(
        "Authorized {}; session stored at {} (access token valid until {})",
        session.account,
        tokens.session_path(&session.account).display(),
        session.expires_at_display()
    );
    Ok(())
}
