use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};

use gemini_chat_agent::{LoopOptions, RunStatus, run_conversation};
use gemini_chat_core::config::Config;
use gemini_chat_core::types::StreamEvent;
use gemini_chat_gateway::{GatewayState, start_gateway};
use gemini_chat_providers::gemini::format_tools;
use gemini_chat_providers::{GeminiClient, ModelClient, SessionConfig};
use gemini_chat_tools::{ToolContext, builtin_registry};

mod logging;

#[derive(Parser)]
#[command(
    name = "gemini-chat",
    about = "Streaming Gemini chat server with local tools",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the chat server
    Serve {
        /// Port to listen on (default: 3000)
        #[arg(long)]
        port: Option<u16>,

        /// Do not serve the chat page
        #[arg(long)]
        no_ui: bool,
    },

    /// Send one message from the terminal
    Chat {
        /// Message to send
        #[arg(short, long)]
        message: String,

        /// Model override
        #[arg(long)]
        model: Option<String>,
    },

    /// Print the tool declarations sent to the model
    Tools,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show system status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_dir);
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    logging::init(&config.logging.clone().unwrap_or_default(), cli.verbose);

    match cli.command {
        Commands::Serve { port, no_ui } => {
            let (warnings, errors) = config.validate();
            for w in &warnings {
                warn!("{w}");
            }
            if !errors.is_empty() {
                bail!("Invalid config: {}", errors.join("; "));
            }

            let port = port.unwrap_or_else(|| config.gateway_port());
            let ui = config.ui_enabled() && !no_ui;
            let base_url = config.base_url();
            let client = GeminiClient::new(config.api_key().unwrap_or_default(), base_url.as_deref());
            info!(model = %config.default_model(), "Starting Gemini Chat on port {port}");

            let state = GatewayState::new(
                Arc::new(config),
                Arc::new(client),
                Arc::new(builtin_registry()),
            );
            start_gateway(Arc::new(state), port, ui).await?;
        }
        Commands::Chat { message, model } => {
            let Some(api_key) = config.api_key() else {
                bail!("No Gemini API key configured (set GEMINI_API_KEY)");
            };
            let model = model.unwrap_or_else(|| config.default_model());
            let tools = builtin_registry();
            let client = GeminiClient::new(api_key, config.base_url().as_deref());
            let mut session = client.open(
                Vec::new(),
                SessionConfig {
                    thinking: config.thinking_for(&model),
                    tools: tools.definitions(),
                    system_instruction: config.system_instruction(),
                    model,
                },
            );
            let context = ToolContext::new(config.workspace_dir(), config.restrict_to_workspace());
            let options = LoopOptions::from_config(&config);

            let (tx, rx) = mpsc::unbounded_channel();
            let (outcome, ()) = tokio::join!(
                run_conversation(session.as_mut(), &message, &tools, &context, &options, tx),
                print_events(rx),
            );
            info!(
                turns = outcome.turns,
                tool_calls = outcome.tool_calls,
                elapsed_ms = outcome.duration.as_millis() as u64,
                "Chat finished"
            );
            if outcome.status != RunStatus::Completed {
                bail!("Chat did not complete: {:?}", outcome.status);
            }
        }
        Commands::Tools => {
            let declarations = format_tools(&builtin_registry().definitions());
            println!("{}", serde_json::to_string_pretty(&declarations)?);
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let mut shown = config.clone();
                if let Some(model) = shown.model.as_mut() {
                    if model.api_key.is_some() {
                        model.api_key = Some("<redacted>".into());
                    }
                }
                println!("{}", serde_json::to_string_pretty(&shown)?);
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => println!("Key not found: {key}"),
            },
        },
        Commands::Status => {
            println!("Gemini Chat v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Workspace: {}", config.workspace_dir().display());
            println!("Gateway port: {}", config.gateway_port());
            println!("Default model: {}", config.default_model());
            println!(
                "API key: {}",
                if config.api_key().is_some() { "set" } else { "missing" }
            );

            let (warnings, errors) = config.validate();
            for w in warnings {
                println!("warning: {w}");
            }
            for e in errors {
                println!("error: {e}");
            }
        }
    }

    Ok(())
}

/// Render conversation events on the terminal: answer text on stdout,
/// everything else on stderr.
async fn print_events(mut rx: mpsc::UnboundedReceiver<StreamEvent>) {
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Thought(text) => eprint!("{text}"),
            StreamEvent::Text(text) => {
                print!("{text}");
                let _ = stdout.flush();
            }
            StreamEvent::Tool(call) => {
                eprintln!(
                    "\n[tool] {} {} -> {}",
                    call.name,
                    serde_json::Value::Object(call.args),
                    call.result
                );
            }
            StreamEvent::History(turns) => {
                println!();
                tracing::debug!(turns = turns.len(), "History received");
            }
            StreamEvent::Error(message) => eprintln!("\nError: {message}"),
        }
    }
}
