use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use bookbot::{chat, ingest, web_server, ChatService, Requester, RequesterConfig};
use clap::Parser;
use tracing::{error, info};

// Define the command-line interface structure using clap
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the BookBot web UI.
    Serve {
        #[arg(long, default_value_t = 9900, help = "Port for the web server.")]
        port: u16,
        #[arg(long, help = "Reading list CSV to load on startup.")]
        csv: Option<PathBuf>,
        #[command(flatten)]
        llm: LlmArgs,
    },
    /// Chat with BookBot in the terminal.
    Chat {
        #[arg(long, help = "Reading list CSV to load before chatting.")]
        csv: Option<PathBuf>,
        #[command(flatten)]
        llm: LlmArgs,
    },
    /// Parse a reading list CSV and print its records as JSON.
    Parse {
        #[arg(help = "Path to the CSV file.")]
        file: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct LlmArgs {
    #[arg(long, env = "BOOKBOT_API_URL", help = "Base URL of the messages API.")]
    api_url: Option<String>,
    #[arg(long, env = "BOOKBOT_MODEL", help = "Model used for recommendations.")]
    model: Option<String>,
    #[arg(long, env = "BOOKBOT_MAX_TOKENS", help = "Token budget for each reply.")]
    max_tokens: Option<u32>,
    #[arg(long, env = "BOOKBOT_RECORD_LIMIT", help = "Maximum number of books included in the prompt.")]
    record_limit: Option<usize>,
    #[arg(long, help = "Request timeout in seconds (defaults to the HTTP client's).")]
    timeout_secs: Option<u64>,
}

impl LlmArgs {
    fn into_config(self) -> RequesterConfig {
        let mut config = RequesterConfig::default();
        if let Some(api_url) = self.api_url {
            config.api_url = api_url;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(record_limit) = self.record_limit {
            config.record_limit = record_limit;
        }
        config.timeout = self.timeout_secs.map(std::time::Duration::from_secs);
        config
    }
}

async fn build_service(llm: LlmArgs, csv: Option<PathBuf>) -> Result<Arc<ChatService>> {
    let requester =
        Requester::new(llm.into_config()).context("Failed to build HTTP client")?;
    let service = Arc::new(ChatService::new(requester));
    if let Some(path) = csv {
        let (ok, turn) = service.upload_file(&path).await;
        if !ok {
            anyhow::bail!("{} ({})", turn.content, path.display());
        }
    }
    Ok(service)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (for ANTHROPIC_API_KEY and friends)
    dotenvy::dotenv().ok();

    // Reads log level from RUST_LOG (e.g., RUST_LOG=info,bookbot=debug)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("BookBot starting with command: {:?}", cli.command);

    match cli.command {
        Commands::Serve { port, csv, llm } => {
            let service = build_service(llm, csv).await?;

            let mut web_server_handle = tokio::spawn(async move {
                if let Err(e) = web_server::start_web_server(port, service).await {
                    error!("Web server failed: {:?}", e);
                }
            });

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);

            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Ctrl-C received, initiating shutdown...");
                }
                res = &mut web_server_handle => {
                    match res {
                        Ok(_) => info!("Web server task completed unexpectedly."),
                        Err(e) if e.is_panic() => error!("Web server task panicked: {:?}", e),
                        Err(e) => error!("Web server task failed: {:?}", e),
                    }
                }
            }

            if !web_server_handle.is_finished() {
                info!("Aborting web server task...");
                web_server_handle.abort();
            }
            info!("Shutdown complete.");
        }
        Commands::Chat { csv, llm } => {
            let service = build_service(llm, csv).await?;
            chat::run_terminal_chat(&service, tokio::io::stdin(), tokio::io::stdout())
                .await
                .context("Chat session failed")?;
        }
        Commands::Parse { file } => {
            let records = ingest::ingest_file(&file)
                .with_context(|| format!("Failed to ingest {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(records.records())?);
        }
    }

    Ok(())
}
