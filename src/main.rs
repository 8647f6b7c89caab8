use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use helpdesk_bridge::connections::ConnectionRole;
use helpdesk_bridge::db::{self, NewTicket, SqliteTicketStore};
use helpdesk_bridge::security::Authenticator;
use helpdesk_bridge::tickets::Priority;
use helpdesk_bridge::{Config, Daemon};

/// Helpdesk Bridge - remote diagnostics for an LLM support agent
#[derive(Parser)]
#[command(name = "helpdesk-bridge", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(long, env = "HELPDESK_PORT")]
    port: Option<u16>,

    /// Config file (defaults to ~/.config/helpdesk-bridge/config.toml)
    #[arg(short, long, env = "HELPDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bridge (default)
    Serve,
    /// Sign a connection token for a desktop agent or requester
    IssueToken {
        /// Subject the token authenticates as
        subject: String,
        /// Restrict the token to one role (desktop_agent or requester)
        #[arg(short, long)]
        role: Option<String>,
        /// Lifetime in seconds
        #[arg(long, default_value = "86400")]
        ttl: u64,
    },
    /// Mirror a ticket into the local store and print its ID
    CreateTicket {
        /// Requester the ticket belongs to
        #[arg(short, long)]
        requester: String,
        /// Ticket subject line
        subject: String,
        /// Initial priority
        #[arg(short, long, default_value = "Medium")]
        priority: String,
        /// Organization shown to the support agent
        #[arg(short, long)]
        organization: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,helpdesk_bridge=info",
        1 => "info,helpdesk_bridge=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    tracing::debug!(?config, "loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let daemon = Daemon::new(config)?;
            daemon.run().await?;
            Ok(())
        }
        Command::IssueToken { subject, role, ttl } => issue_token(&config, &subject, role.as_deref(), ttl),
        Command::CreateTicket {
            requester,
            subject,
            priority,
            organization,
        } => create_ticket(&config, requester, subject, &priority, organization),
    }
}

fn issue_token(config: &Config, subject: &str, role: Option<&str>, ttl: u64) -> anyhow::Result<()> {
    let role = role
        .map(|r| {
            ConnectionRole::parse(r)
                .ok_or_else(|| anyhow::anyhow!("unknown role '{r}', expected desktop_agent or requester"))
        })
        .transpose()?;

    let authenticator = Authenticator::new(config.auth.jwt_secret.as_ref(), std::collections::HashMap::new());
    if !authenticator.can_issue() {
        anyhow::bail!("set HELPDESK_JWT_SECRET or auth.jwt_secret to issue tokens");
    }
    let token = authenticator.issue(subject, role, Duration::from_secs(ttl))?;

    println!("{token}");
    Ok(())
}

fn create_ticket(
    config: &Config,
    requester: String,
    subject: String,
    priority: &str,
    organization: Option<String>,
) -> anyhow::Result<()> {
    let priority: Priority = priority.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let pool = db::init(&config.database_path)?;
    let store = SqliteTicketStore::new(pool);
    let ticket = store.create_ticket(NewTicket {
        requester_id: requester,
        subject,
        organization,
        priority,
    })?;

    println!("{}", ticket.id);
    Ok(())
}
