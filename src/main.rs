//! Friday assistant - Main Entry Point

use clap::{Parser, Subcommand};
use friday_assistant::app::{build_app_state, build_services, create_provider};
use friday_assistant::config::AssistantConfig;
use friday_assistant::mail::{Mailer, OutgoingEmail, SmtpMailer, SmtpSettings};
use friday_assistant::oauth::ClientSecrets;
use friday_assistant::observability::{init_default_logging, init_logging, LogFormat};
use friday_assistant::server;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tracing::{error, info};

/// Personal automation assistant
#[derive(Parser)]
#[command(name = "friday")]
#[command(about = "Chat agent with email, calendar and Google OAuth tools")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "FRIDAY_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Print where to start an OAuth flow
    Authorize {
        /// Flow name from [[oauth.flows]]
        #[arg(long, default_value = "calendar")]
        flow: String,
    },
    /// Send a plain-text message to check SMTP settings
    SendTestEmail {
        #[arg(long)]
        to: String,
        #[arg(long, default_value = "Friday test email")]
        subject: String,
        #[arg(long, default_value = "SMTP settings are working.")]
        body: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_cli_logging(cli.verbose);

    info!("Starting Friday assistant v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => run_server(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Authorize { flow } => handle_authorize_command(&config, &flow).await,
        Commands::SendTestEmail { to, subject, body } => {
            send_test_email(&config, to, subject, body).await
        }
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

/// `-v` overrides LOG_LEVEL
fn init_cli_logging(verbose: u8) {
    let level = match verbose {
        0 => return init_default_logging(),
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    init_logging(level, LogFormat::parse(&format), false);
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<AssistantConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(AssistantConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["friday.toml", "config/friday.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(AssistantConfig::load_from_file(&path)?);
                }
            }

            Err("No configuration file found. Provide one with -c/--config or create friday.toml"
                .into())
        }
    }
}

async fn run_server(config: AssistantConfig) -> Result<(), Box<dyn std::error::Error>> {
    let llm = create_provider(&config)?;
    let services = build_services(&config)?;
    let state = build_app_state(&config, llm, services).await?;

    let host: IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(host, config.server.port);

    let (_bound, server) = server::serve(state, addr, shutdown_signal())?;
    server.await;

    info!("HTTP server stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

fn handle_config_command(
    config: &AssistantConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Check the flow's client secrets and print the login route that starts it
async fn handle_authorize_command(
    config: &AssistantConfig,
    flow_name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let flow = config
        .oauth_flow(flow_name)
        .ok_or_else(|| format!("Unknown OAuth flow: {flow_name}"))?;

    let secrets_path = flow
        .client_secrets_file
        .as_ref()
        .unwrap_or(&config.google.client_secrets_file);
    ClientSecrets::load(secrets_path).await?;

    let login = match flow.redirect_uri.strip_suffix("/callback") {
        Some(base) => format!("{base}/login"),
        None => format!(
            "http://{}:{}/oauth/{}/login",
            config.server.host, config.server.port, flow.name
        ),
    };

    println!("Start `friday serve`, then open this URL in a browser:");
    println!("{login}");
    Ok(())
}

async fn send_test_email(
    config: &AssistantConfig,
    to: String,
    subject: String,
    body: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let mailer = SmtpMailer::new(SmtpSettings::from_config(config));
    mailer.send(OutgoingEmail::text(&to, subject, body)).await?;

    println!("Test email sent to {to}");
    Ok(())
}
