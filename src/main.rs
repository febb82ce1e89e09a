use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use relay::agent::{Agent, ChatRequest};
use relay::config::Config;
use relay::llm::{Message, OpenAiClient, OpenAiConfig};
use relay::remote::{HttpConnector, ProviderPool};
use relay::tools::ToolRegistry;
use relay::turn::TurnReply;

fn setup_logging(level: Option<&str>) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("relay")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("relay.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        if let Some(level) = level {
            builder.parse_filters(level);
        }
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Cancel the token on Ctrl-C
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling turn");
            token.cancel();
        }
    });
    cancel
}

async fn run_application(cli: &Cli, config: Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Chat {
            message,
            conversation,
            no_stream,
        } => handle_chat_command(message, conversation, !*no_stream, config).await,
        Commands::Tools => handle_tools_command(config).await,
        Commands::Providers => handle_providers_command(config).await,
    }
}

async fn handle_chat_command(message: &str, conversation: &str, stream: bool, config: Config) -> Result<()> {
    info!("Chat in conversation '{}' (stream: {})", conversation, stream);

    let model = OpenAiClient::new(OpenAiConfig::from(&config.llm)).context("Failed to create model client")?;
    let agent = Agent::start(config, Arc::new(model), Arc::new(HttpConnector::new()))
        .await
        .context("Failed to start agent")?;

    let request = ChatRequest::new(format!("cli-{}", chrono::Utc::now().timestamp_millis()), vec![Message::user(message)])
        .with_conversation(conversation)
        .with_stream(stream);
    let cancel = cancel_on_interrupt();

    let result = if stream {
        print_streamed(&agent, &request, &cancel).await
    } else {
        match agent.chat(request, &cancel).await {
            Ok(reply) => {
                println!("{}", reply.message.content);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    };

    agent.shutdown().await;
    result.context("Chat turn failed")
}

async fn print_streamed(agent: &Agent, request: &ChatRequest, cancel: &CancellationToken) -> Result<()> {
    match agent.chat_stream(request, cancel).await? {
        TurnReply::Stream(mut stream) => {
            let mut stdout = std::io::stdout();
            while let Some(fragment) = stream.recv_or_cancel(cancel).await {
                let fragment = fragment?;
                write!(stdout, "{}", fragment.content)?;
                stdout.flush()?;
            }
            println!();
        }
        TurnReply::Message(message) => println!("{}", message.content),
    }
    Ok(())
}

async fn handle_tools_command(config: Config) -> Result<()> {
    info!("Listing tools");

    let registry = ToolRegistry::with_builtin_tools().context("Failed to register local tools")?;
    println!("{}", "Local tools:".green());
    for descriptor in registry.descriptors() {
        println!("  {} - {}", descriptor.name.cyan(), descriptor.description);
    }

    let pool = ProviderPool::new(config.providers, Arc::new(HttpConnector::new()));
    pool.initialize().await.context("Failed to initialize providers")?;
    println!("{}", "Remote tools:".green());
    for name in pool.namespaced_tool_names().await {
        println!("  {}", name.cyan());
    }
    pool.close().await;
    Ok(())
}

async fn handle_providers_command(config: Config) -> Result<()> {
    info!("Checking providers");

    if !config.providers.enabled {
        println!("{}", "Remote providers are disabled".yellow());
        return Ok(());
    }

    let configured: Vec<_> = config.providers.enabled_clients().map(|p| p.name.clone()).collect();
    let pool = ProviderPool::new(config.providers, Arc::new(HttpConnector::new()));
    pool.initialize().await.context("Failed to initialize providers")?;

    let statuses = pool.providers().await;
    for status in &statuses {
        let state = if status.tools > 0 {
            "healthy".green()
        } else {
            "degraded".yellow()
        };
        println!("{} {} {} ({} tools)", state, status.name, status.endpoint.dimmed(), status.tools);
        if !status.description.is_empty() {
            println!("    {}", status.description);
        }
    }
    for name in configured.iter().filter(|n| !statuses.iter().any(|s| &s.name == *n)) {
        println!("{} {}", "unreachable".red(), name);
    }
    pool.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging with the configured level unless RUST_LOG overrides it
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, config).await.context("Application failed")?;

    Ok(())
}
