// GitHub Responder - command line entry point
//
// Registers a webhook on the given repository, serves its deliveries until
// interrupted, runs an action for each one, and removes the webhook on exit.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use github_responder::adapters::{ExecAction, GitHubClientConfig, GitHubWebhookClient, PrettyPrintAction};
use github_responder::application::Session;
use github_responder::config::{LogFormat, ResponderConfig, ServerConfig};
use github_responder::ports::DeliveryHandler;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Create and listen to GitHub webhooks
///
/// Settings come from `GITHUB_RESPONDER__*` environment variables (and a
/// `.env` file); flags given here override them.
#[derive(Parser, Debug)]
#[command(name = "github-responder")]
#[command(disable_version_flag = true)]
#[command(after_help = "Run ./handle_event.sh every time a webhook event is received:\n\n  \
    $ github-responder -r acme/widget -a -d example.com -m me@example.com ./handle_event.sh")]
struct Args {
    /// The GitHub repository to watch, in 'owner/repo' form
    #[arg(short, long)]
    repo: Option<String>,

    /// The webhook callback URL. Generated when not given.
    #[arg(long)]
    callback: Option<String>,

    /// Event types to listen for (repeatable, '*' for all)
    #[arg(short, long = "events")]
    events: Vec<String>,

    /// Address to listen on for HTTP traffic
    #[arg(long)]
    http: Option<String>,

    /// Address to listen on for TLS traffic
    #[arg(long)]
    https: Option<String>,

    /// Disable automatic TLS negotiation
    #[arg(long)]
    no_tls: bool,

    /// Domain to serve; a certificate is acquired for it
    #[arg(short, long)]
    domain: Option<String>,

    /// Email used for registration and recovery contact
    #[arg(short = 'm', long)]
    email: Option<String>,

    /// Accept the certificate authority's terms of service
    #[arg(short, long)]
    accept_tos: bool,

    /// ACME directory URL of the certificate authority
    #[arg(long)]
    ca: Option<String>,

    /// Directory used for storing account and certificate data
    #[arg(long)]
    path: Option<PathBuf>,

    /// Output extra logs
    #[arg(short = 'V', long)]
    verbose: bool,

    /// Print the version
    #[arg(short = 'v', long)]
    version: bool,

    /// Command run for each delivery, with the event type and delivery ID
    /// appended and the payload on stdin. Pretty-prints when omitted.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    action: Vec<String>,
}

impl Args {
    fn apply(&self, config: &mut ResponderConfig) {
        if let Some(repo) = &self.repo {
            config.github.repo = repo.clone();
        }
        if let Some(callback) = &self.callback {
            config.github.callback_url = Some(callback.clone());
        }
        if !self.events.is_empty() {
            config.github.events = self.events.clone();
        }
        if let Some(http) = &self.http {
            config.server.http_address = http.clone();
        }
        if let Some(https) = &self.https {
            config.server.https_address = https.clone();
        }
        if self.no_tls {
            config.tls.enabled = false;
        }
        if let Some(domain) = &self.domain {
            config.tls.domain = domain.clone();
        }
        if let Some(email) = &self.email {
            config.tls.email = Some(email.clone());
        }
        if self.accept_tos {
            config.tls.accept_tos = true;
        }
        if let Some(ca) = &self.ca {
            config.tls.ca_directory_url = ca.clone();
        }
        if let Some(path) = &self.path {
            config.tls.cache_path = path.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.version {
        println!("github-responder version {}", VERSION);
        return Ok(());
    }

    let mut config = ResponderConfig::load().context("Failed to load configuration")?;
    args.apply(&mut config);

    init_tracing(&config.server, args.verbose);
    info!(version = VERSION, "github-responder");

    let handler: Arc<dyn DeliveryHandler> = match ExecAction::from_command_line(&args.action) {
        Some(action) => Arc::new(action),
        None => {
            info!("No action command given, will pretty-print deliveries");
            Arc::new(PrettyPrintAction::new())
        }
    };

    let client = GitHubWebhookClient::new(GitHubClientConfig::from_config(&config.github))
        .context("Failed to create GitHub client")?;

    let shutdown = CancellationToken::new();
    let signals = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let running = Session::new(config, Arc::new(client), handler)
        .with_cancellation(&shutdown)
        .start()
        .await
        .context("Failed to start responder")?;
    info!(callback_url = %running.callback_url(), "Responder started");

    let result = running.wait().await;
    running.cleanup().await;
    signals.abort();

    result.context("Responder stopped with an error")
}

fn init_tracing(server: &ServerConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&server.log_level))
    };

    match server.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down gracefully"),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}
